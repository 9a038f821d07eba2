//! Layered configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults, `config.toml`,
//! `config.<env>.toml` and `DOCQA_*` env vars (nested keys split on `__`,
//! e.g. `DOCQA_CHUNKING__CHUNK_SIZE=1000`). Provides helpers to expand `~`
//! and `${VAR}` and to resolve relative paths against a known base directory.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::chunker::ChunkingConfig;
use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("."))
    }

    pub fn load_from(base_dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("DOCQA_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(base_dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(base_dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(base_dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(base_dir.join("config.test.toml"))),
            other => tracing::warn!(env = other, "unknown DOCQA_ENV, using base config only"),
        }
        figment = figment.merge(Env::prefixed("DOCQA_").split("__"));

        Ok(Self::from_figment(figment, base_dir))
    }

    /// Wrap an already-assembled figment; relative paths resolve against `base_dir`.
    pub fn from_figment(figment: Figment, base_dir: impl Into<PathBuf>) -> Self {
        Self { figment, base_dir: base_dir.into() }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Extract, resolve and validate the typed settings.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.index.dir = resolve_with_base(&self.base_dir, settings.index.dir.to_string_lossy());
        settings.embedding.model_dir =
            resolve_with_base(&self.base_dir, settings.embedding.model_dir.to_string_lossy());
        settings.validate()?;
        Ok(settings)
    }
}

/// Every tunable of the ingestion/retrieval core, with documented defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub index: IndexSettings,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalSettings,
    pub embedding: EmbeddingSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.retrieval.validate()?;
        self.embedding.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexSettings {
    /// Directory owned by the vector index (generations + active pointer).
    pub dir: PathBuf,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self { dir: PathBuf::from("data/index") }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Chunks returned per query, 1..=50.
    pub top_k: usize,
    /// Candidates fetched per requested hit before tie-breaking re-sort.
    pub overfetch: usize,
}

pub const MAX_TOP_K: usize = 50;

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 3, overfetch: 10 }
    }
}

impl RetrievalSettings {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_TOP_K).contains(&self.top_k) {
            return Err(Error::InvalidConfig(format!(
                "retrieval.top_k must be in 1..={MAX_TOP_K}, got {}",
                self.top_k
            )));
        }
        if self.overfetch == 0 {
            return Err(Error::InvalidConfig("retrieval.overfetch must be >= 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Pretrained sentence-embedding checkpoint loaded from `model_dir`.
    Model,
    /// Deterministic token-hash vectors; no weights needed.
    Hash,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackend,
    /// Checked for existence when the model loads, not here.
    pub model_dir: PathBuf,
    pub max_len: usize,
    pub batch_size: usize,
    pub hash_dim: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Model,
            model_dir: PathBuf::from("models/paraphrase-MiniLM"),
            max_len: 256,
            batch_size: 32,
            hash_dim: 384,
        }
    }
}

impl EmbeddingSettings {
    pub fn validate(&self) -> Result<()> {
        if !(8..=8192).contains(&self.max_len) {
            return Err(Error::InvalidConfig(format!(
                "embedding.max_len must be in 8..=8192, got {}",
                self.max_len
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("embedding.batch_size must be >= 1".into()));
        }
        if self.hash_dim == 0 {
            return Err(Error::InvalidConfig("embedding.hash_dim must be >= 1".into()));
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
