use std::fs;

use docqa_core::{ChunkMeta, Error, IndexEntry};
use docqa_vector::{IndexOptions, VectorIndex, POINTER_FILE};
use tempfile::TempDir;

fn entry(source: &str, i: usize, text: &str, vector: Vec<f32>) -> IndexEntry {
    IndexEntry {
        text: text.to_string(),
        vector,
        meta: ChunkMeta { source: source.to_string(), page: Some(1), chunk_index: i, start_offset: i * 8 },
    }
}

fn axis(dim: usize, hot: usize) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    v[hot] = 1.0;
    v
}

fn generation_dirs(root: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(root)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|n| n.starts_with("gen-"))
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn search_before_rebuild_is_empty_index() {
    let tmp = TempDir::new().unwrap();
    let index = VectorIndex::open(tmp.path(), IndexOptions::default()).await.unwrap();
    assert!(index.is_empty().await);
    assert!(index.manifest().await.is_none());
    assert!(matches!(index.search(&[1.0, 0.0], 3).await, Err(Error::EmptyIndex)));
}

#[tokio::test]
async fn identical_vector_ranks_first() {
    let tmp = TempDir::new().unwrap();
    let index = VectorIndex::open(tmp.path(), IndexOptions::default()).await.unwrap();
    let entries = vec![
        entry("a.txt", 0, "north", axis(4, 0)),
        entry("a.txt", 1, "east", axis(4, 1)),
        entry("a.txt", 2, "south", axis(4, 2)),
        entry("a.txt", 3, "west", axis(4, 3)),
    ];
    let manifest = index.rebuild(&entries, "a.txt", "test:d4").await.expect("rebuild");
    assert_eq!(manifest.entries, 4);
    assert_eq!(manifest.dim, 4);
    assert_eq!(manifest.source, "a.txt");

    let hits = index.search(&axis(4, 2), 2).await.expect("search");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].text, "south");
    assert_eq!(hits[0].ordinal, 2);
    assert_eq!(hits[0].meta.chunk_index, 2);
    assert_eq!(hits[0].meta.page, Some(1));
    assert!((hits[0].score - 1.0).abs() < 1e-4, "score {}", hits[0].score);
    assert!(hits[0].score >= hits[1].score);
}

#[tokio::test]
async fn ties_break_by_insertion_order() {
    let tmp = TempDir::new().unwrap();
    let index = VectorIndex::open(tmp.path(), IndexOptions::default()).await.unwrap();
    let entries = vec![
        entry("a.txt", 0, "other", axis(3, 1)),
        entry("a.txt", 1, "first twin", axis(3, 0)),
        entry("a.txt", 2, "second twin", axis(3, 0)),
        entry("a.txt", 3, "third twin", axis(3, 0)),
    ];
    index.rebuild(&entries, "a.txt", "test:d3").await.unwrap();
    let hits = index.search(&axis(3, 0), 3).await.unwrap();
    let order: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
    assert_eq!(order, vec!["first twin", "second twin", "third twin"]);
}

#[tokio::test]
async fn k_bounds() {
    let tmp = TempDir::new().unwrap();
    let index = VectorIndex::open(tmp.path(), IndexOptions::default()).await.unwrap();
    index.rebuild(&[entry("a.txt", 0, "only", axis(2, 0))], "a.txt", "test:d2").await.unwrap();
    assert!(index.search(&axis(2, 0), 0).await.unwrap().is_empty());
    assert_eq!(index.search(&axis(2, 0), 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn rebuild_replaces_prior_document() {
    let tmp = TempDir::new().unwrap();
    let index = VectorIndex::open(tmp.path(), IndexOptions::default()).await.unwrap();
    index.rebuild(&[entry("a.txt", 0, "from a", axis(2, 0))], "a.txt", "test:d2").await.unwrap();
    let first = generation_dirs(tmp.path());
    assert_eq!(first.len(), 1);

    index
        .rebuild(&[entry("b.txt", 0, "from b", axis(2, 0)), entry("b.txt", 1, "also b", axis(2, 1))], "b.txt", "test:d2")
        .await
        .unwrap();
    let hits = index.search(&axis(2, 0), 5).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.meta.source == "b.txt"));
    assert_eq!(index.manifest().await.unwrap().source, "b.txt");

    let second = generation_dirs(tmp.path());
    assert_eq!(second.len(), 1, "old generation should be deleted: {second:?}");
    assert_ne!(first, second);
}

#[tokio::test]
async fn live_generation_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    let built = {
        let index = VectorIndex::open(tmp.path(), IndexOptions::default()).await.unwrap();
        index.rebuild(&[entry("keep.txt", 0, "persisted", axis(3, 1))], "keep.txt", "test:d3").await.unwrap()
    };
    assert!(tmp.path().join(POINTER_FILE).exists());

    let reopened = VectorIndex::open(tmp.path(), IndexOptions::default()).await.unwrap();
    assert_eq!(reopened.manifest().await, Some(built));
    let hits = reopened.search(&axis(3, 1), 1).await.unwrap();
    assert_eq!(hits[0].text, "persisted");
}

#[tokio::test]
async fn failed_rebuild_keeps_prior_generation() {
    let tmp = TempDir::new().unwrap();
    let index = VectorIndex::open(tmp.path(), IndexOptions::default()).await.unwrap();
    let live = index.rebuild(&[entry("a.txt", 0, "stable", axis(2, 0))], "a.txt", "test:d2").await.unwrap();

    assert!(matches!(index.rebuild(&[], "empty.txt", "test:d2").await, Err(Error::IndexWrite(_))));
    let ragged = vec![entry("b.txt", 0, "ok", axis(2, 0)), entry("b.txt", 1, "short", vec![1.0])];
    assert!(matches!(
        index.rebuild(&ragged, "b.txt", "test:d2").await,
        Err(Error::DimensionMismatch { expected: 2, actual: 1 })
    ));

    assert_eq!(index.manifest().await, Some(live.clone()));
    assert_eq!(index.search(&axis(2, 0), 1).await.unwrap()[0].text, "stable");
    assert_eq!(generation_dirs(tmp.path()), vec![live.generation]);
}

#[tokio::test]
async fn query_dimension_must_match() {
    let tmp = TempDir::new().unwrap();
    let index = VectorIndex::open(tmp.path(), IndexOptions::default()).await.unwrap();
    index.rebuild(&[entry("a.txt", 0, "x", axis(3, 0))], "a.txt", "test:d3").await.unwrap();
    assert!(matches!(
        index.search(&[1.0, 0.0], 1).await,
        Err(Error::DimensionMismatch { expected: 3, actual: 2 })
    ));
}

#[tokio::test]
async fn open_sweeps_orphaned_generations() {
    let tmp = TempDir::new().unwrap();
    let live = {
        let index = VectorIndex::open(tmp.path(), IndexOptions::default()).await.unwrap();
        index.rebuild(&[entry("a.txt", 0, "x", axis(2, 0))], "a.txt", "test:d2").await.unwrap()
    };
    fs::create_dir_all(tmp.path().join("gen-19700101T000000000-deadbeefdead/chunks.lance")).unwrap();
    fs::write(tmp.path().join(".tmpAbC123"), b"{").unwrap();
    fs::create_dir_all(tmp.path().join("unrelated")).unwrap();

    let index = VectorIndex::open(tmp.path(), IndexOptions::default()).await.unwrap();
    assert_eq!(generation_dirs(tmp.path()), vec![live.generation]);
    assert!(!tmp.path().join(".tmpAbC123").exists());
    assert!(tmp.path().join("unrelated").exists());
    assert!(!index.is_empty().await);
}

#[tokio::test]
async fn open_without_pointer_discards_leftovers() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("gen-20240101T000000000-000000000000")).unwrap();
    let index = VectorIndex::open(tmp.path(), IndexOptions::default()).await.unwrap();
    assert!(index.is_empty().await);
    assert!(generation_dirs(tmp.path()).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_searches_see_one_generation() {
    let tmp = TempDir::new().unwrap();
    let index = VectorIndex::open(tmp.path(), IndexOptions::default()).await.unwrap();
    let doc = |source: &str| -> Vec<IndexEntry> {
        (0..6).map(|i| entry(source, i, &format!("{source} #{i}"), axis(6, i))).collect()
    };
    index.rebuild(&doc("a.txt"), "a.txt", "test:d6").await.unwrap();

    let mut readers = Vec::new();
    for r in 0..8 {
        let index = index.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..20 {
                let hits = index.search(&axis(6, r % 6), 6).await.unwrap();
                let first = hits[0].meta.source.clone();
                assert!(hits.iter().all(|h| h.meta.source == first), "mixed sources in one search");
            }
        }));
    }
    for source in ["b.txt", "c.txt", "d.txt"] {
        index.rebuild(&doc(source), source, "test:d6").await.unwrap();
    }
    for reader in readers {
        reader.await.unwrap();
    }
    assert_eq!(index.manifest().await.unwrap().source, "d.txt");
    assert_eq!(generation_dirs(tmp.path()).len(), 1);
}

#[tokio::test]
async fn ties_beyond_overfetch_still_follow_insertion_order() {
    let tmp = TempDir::new().unwrap();
    let index = VectorIndex::open(tmp.path(), IndexOptions { overfetch: 2 }).await.unwrap();
    let mut entries: Vec<IndexEntry> = (0..100).map(|i| entry("a.txt", i, &format!("off {i}"), axis(4, 1))).collect();
    entries.extend((100..400).map(|i| entry("a.txt", i, &format!("twin {i}"), axis(4, 0))));
    index.rebuild(&entries, "a.txt", "test:d4").await.unwrap();

    let hits = index.search(&axis(4, 0), 3).await.unwrap();
    let ordinals: Vec<usize> = hits.iter().map(|h| h.ordinal).collect();
    assert_eq!(ordinals, vec![100, 101, 102]);
}

#[tokio::test]
async fn debug_names_the_root() {
    let tmp = TempDir::new().unwrap();
    let index = VectorIndex::open(tmp.path(), IndexOptions::default()).await.unwrap();
    let shown = format!("{index:?}");
    assert!(shown.starts_with("VectorIndex"), "{shown}");
    assert!(shown.contains(&tmp.path().display().to_string()), "{shown}");
}
