use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use docqa_core::config::{Config, Settings};
use docqa_embed::default_embedder;
use docqa_pipeline::{IngestionPipeline, Retriever, NO_DOCUMENT_SENTINEL};
use docqa_vector::{IndexOptions, VectorIndex, VectorIndexHandle};

#[derive(Parser)]
#[command(name = "docqa", about = "Ingest one document and retrieve context from it", version)]
struct Cli {
    /// Directory holding config.toml (default: current directory)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replace the live index with a new document
    Ingest {
        path: PathBuf,
        /// Declared type (pdf, txt); inferred from the extension when omitted
        #[arg(long = "type")]
        file_type: Option<String>,
    },

    /// Print the top-k chunks for a query
    Retrieve {
        query: String,
        /// Override retrieval.top_k
        #[arg(long)]
        k: Option<usize>,
        /// Show page and score for each hit
        #[arg(long)]
        hits: bool,
    },

    /// Show the live index manifest
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config_dir {
        Some(dir) => Config::load_from(dir)?,
        None => Config::load()?,
    };
    let settings = config.settings()?;
    let index = VectorIndex::open(&settings.index.dir, IndexOptions { overfetch: settings.retrieval.overfetch }).await?;

    match cli.command {
        Command::Ingest { path, file_type } => ingest(&settings, index, path, file_type).await,
        Command::Retrieve { query, k, hits } => retrieve(&settings, index, &query, k, hits).await,
        Command::Status => status(index).await,
    }
}

async fn ingest(settings: &Settings, index: VectorIndexHandle, path: PathBuf, file_type: Option<String>) -> Result<()> {
    let embedder = default_embedder(&settings.embedding)?;
    let pipeline = IngestionPipeline::new(embedder, index, settings.chunking)?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(format!("Processing {}", path.display()));

    let result = match file_type {
        Some(t) => pipeline.process(&path, &t).await,
        None => pipeline.process_path(&path).await,
    };
    let handle = match result {
        Ok(h) => h,
        Err(e) => {
            pb.abandon_with_message("Ingestion failed");
            return Err(e.into());
        }
    };
    pb.finish_with_message("Document processed");
    if let Some(m) = handle.manifest().await {
        println!("Indexed {} chunks from {} (generation {})", m.entries, m.source, m.generation);
    }
    Ok(())
}

async fn retrieve(settings: &Settings, index: VectorIndexHandle, query: &str, k: Option<usize>, show_hits: bool) -> Result<()> {
    if index.is_empty().await {
        println!("{NO_DOCUMENT_SENTINEL}");
        return Ok(());
    }
    let embedder = default_embedder(&settings.embedding)?;
    let retriever = Retriever::new(index, embedder, k.unwrap_or(settings.retrieval.top_k))?;
    if !show_hits {
        println!("{}", retriever.retrieve(query).await?);
        return Ok(());
    }
    for (rank, hit) in retriever.retrieve_hits(query).await?.iter().enumerate() {
        let page = hit.meta.page.map(|p| format!("p.{p}")).unwrap_or_else(|| "-".to_string());
        println!("#{} {} {} score={:.4}", rank + 1, hit.meta.source, page, hit.score);
        println!("{}\n", hit.text);
    }
    Ok(())
}

async fn status(index: VectorIndexHandle) -> Result<()> {
    match index.manifest().await {
        Some(m) => {
            println!("Index:      {}", index.root().display());
            println!("Source:     {}", m.source);
            println!("Chunks:     {}", m.entries);
            println!("Embedder:   {} (dim {})", m.embedder_id, m.dim);
            println!("Generation: {}", m.generation);
            println!("Built at:   {} ms since epoch", m.created_at_ms);
        }
        None => println!("{NO_DOCUMENT_SENTINEL}"),
    }
    Ok(())
}
