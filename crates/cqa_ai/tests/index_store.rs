use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cqa_ai::embeddings::{embed_normalized, Embedder, HashEmbedder};
use cqa_ai::index::{build_index_with_embedder, ArtifactStore, IndexBuildInput};
use cqa_ai::retrieve::Retriever;
use cqa_core::config::{RagConfig, RetrievalConfig};
use cqa_core::error::{codes, AppError};
use cqa_core::ingest::DocumentMap;
use pretty_assertions::assert_eq;

struct CountingEmbedder {
    inner: HashEmbedder,
    calls: AtomicUsize,
    batches: AtomicUsize,
}

impl CountingEmbedder {
    fn new() -> Self {
        Self {
            inner: HashEmbedder::new(128),
            calls: AtomicUsize::new(0),
            batches: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn batch_count(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }
}

impl Embedder for CountingEmbedder {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed(model, input)
    }

    fn embed_batch(&self, model: &str, inputs: &[&str]) -> Result<Vec<Vec<f32>>, AppError> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        inputs.iter().map(|s| self.embed(model, s)).collect()
    }
}

/// Returns one vector fewer than asked for.
struct ShortBatchEmbedder;

impl Embedder for ShortBatchEmbedder {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        HashEmbedder::new(16).embed(model, input)
    }

    fn embed_batch(&self, model: &str, inputs: &[&str]) -> Result<Vec<Vec<f32>>, AppError> {
        inputs
            .iter()
            .skip(1)
            .map(|s| self.embed(model, s))
            .collect()
    }
}

fn corpus() -> DocumentMap {
    let mut d = DocumentMap::new();
    d.insert(
        "admissions".to_string(),
        "Admissions open every quarter. Applicants submit a short essay and a transcript before the deadline."
            .to_string(),
    );
    d.insert(
        "fees".to_string(),
        "Tuition is paid per module. Scholarships cover up to half of the fee for eligible students."
            .to_string(),
    );
    d.insert(
        "support".to_string(),
        "Mentors hold office hours twice a week and answer questions in the community forum within a day."
            .to_string(),
    );
    d
}

fn input(model: &str) -> IndexBuildInput {
    IndexBuildInput {
        model: model.to_string(),
        built_at: "2026-01-01T00:00:00Z".to_string(),
    }
}

fn permissive_retrieval() -> RetrievalConfig {
    RetrievalConfig {
        min_chunk_chars: 0,
        link_only_max_chars: 0,
        boilerplate_markers: Vec::new(),
        byline_prefixes: Vec::new(),
        ..RetrievalConfig::default()
    }
}

#[test]
fn build_then_load_round_trips_and_self_query_ranks_first() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ArtifactStore::open(dir.path().join("faiss_store"));
    let embedder = HashEmbedder::new(128);

    let report = build_index_with_embedder(
        &store,
        &corpus(),
        &RagConfig::default(),
        &embedder,
        input("hash:128"),
    )
    .expect("build");
    assert_eq!(report.documents, 3);
    assert_eq!(report.chunks, 3);
    assert_eq!(report.info.dims, 128);
    assert!(store.presence().complete());

    let loaded = store.try_load().expect("load");
    assert!(!loaded.is_degraded());
    assert_eq!(loaded.info, report.info);
    assert_eq!(loaded.texts.len(), 3);
    assert_eq!(loaded.metas[1].source_id, "fees");

    for (i, text) in loaded.texts.iter().enumerate() {
        let q = embed_normalized(&embedder, "hash:128", text).unwrap();
        let hits = loaded.index.search(&q, 1).unwrap();
        assert_eq!(hits[0].vector_id, i);
        assert!((hits[0].score - 1.0).abs() < 1e-4);
    }

    let leftovers: Vec<_> = fs::read_dir(store.dir())
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn rebuild_is_deterministic() {
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    let embedder = HashEmbedder::new(64);
    let ra = build_index_with_embedder(
        &ArtifactStore::open(a.path().to_path_buf()),
        &corpus(),
        &RagConfig::default(),
        &embedder,
        input("hash:64"),
    )
    .unwrap();
    let rb = build_index_with_embedder(
        &ArtifactStore::open(b.path().to_path_buf()),
        &corpus(),
        &RagConfig::default(),
        &embedder,
        input("hash:64"),
    )
    .unwrap();
    assert_eq!(ra.info.build_id, rb.info.build_id);
    assert_eq!(
        fs::read(a.path().join("texts.json")).unwrap(),
        fs::read(b.path().join("texts.json")).unwrap()
    );
}

#[test]
fn rebuild_reuses_vectors_for_unchanged_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::open(dir.path().to_path_buf());
    let embedder = CountingEmbedder::new();

    build_index_with_embedder(&store, &corpus(), &RagConfig::default(), &embedder, input("mock"))
        .unwrap();
    assert_eq!(embedder.call_count(), 3);
    assert_eq!(embedder.batch_count(), 1);

    let report =
        build_index_with_embedder(&store, &corpus(), &RagConfig::default(), &embedder, input("mock"))
            .unwrap();
    assert_eq!(embedder.call_count(), 3);
    assert_eq!(embedder.batch_count(), 1);
    assert_eq!(report.reused_vectors, 3);

    let mut changed = corpus();
    changed.insert(
        "fees".to_string(),
        "Tuition is paid per module. Scholarships now cover the full fee for eligible students."
            .to_string(),
    );
    let report =
        build_index_with_embedder(&store, &changed, &RagConfig::default(), &embedder, input("mock"))
            .unwrap();
    assert_eq!(embedder.call_count(), 4);
    assert_eq!(embedder.batch_count(), 2);
    assert_eq!(report.reused_vectors, 2);

    // The re-embedded chunk lands at its own position, not at the front.
    let loaded = store.try_load().unwrap();
    let fees = HashEmbedder::new(128)
        .embed("mock", &loaded.texts[1])
        .unwrap();
    assert_eq!(loaded.metas[1].source_id, "fees");
    assert!((cqa_ai::index::similarity::dot(&loaded.index.vectors()[1], &fees) - 1.0).abs() < 1e-5);

    // A different model never reuses vectors.
    build_index_with_embedder(&store, &changed, &RagConfig::default(), &embedder, input("mock-2"))
        .unwrap();
    assert_eq!(embedder.call_count(), 7);
}

#[test]
fn missing_artifact_is_fatal_and_status_reports_it() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::open(dir.path().to_path_buf());
    let err = store.try_load().unwrap_err();
    assert_eq!(err.code, codes::INDEX_MISSING_ARTIFACT);

    let status = store.status();
    assert!(!status.ready);
    assert!(!status.presence.index);

    build_index_with_embedder(
        &store,
        &corpus(),
        &RagConfig::default(),
        &HashEmbedder::new(32),
        input("hash:32"),
    )
    .unwrap();
    fs::remove_file(dir.path().join("meta.json")).unwrap();
    let err = store.try_load().unwrap_err();
    assert_eq!(err.code, codes::INDEX_MISSING_ARTIFACT);
    assert!(err.details.unwrap_or_default().contains("meta=false"));
}

#[test]
fn size_mismatch_loads_degraded_and_drops_out_of_range_hits() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::open(dir.path().to_path_buf());
    let embedder = HashEmbedder::new(128);
    build_index_with_embedder(&store, &corpus(), &RagConfig::default(), &embedder, input("hash:128"))
        .unwrap();

    // Drop the last chunk text, leaving index and metadata at three entries.
    let texts_path = dir.path().join("texts.json");
    let mut texts: Vec<String> = serde_json::from_slice(&fs::read(&texts_path).unwrap()).unwrap();
    let dropped = texts.pop().unwrap();
    fs::write(&texts_path, serde_json::to_vec(&texts).unwrap()).unwrap();

    let loaded = store.try_load().expect("degraded load still succeeds");
    assert!(loaded.is_degraded());
    let warn_codes: Vec<&str> = loaded.warnings.iter().map(|w| w.code.as_str()).collect();
    assert!(warn_codes.contains(&codes::INDEX_ARTIFACT_SIZE_MISMATCH));
    assert!(warn_codes.contains(&codes::INDEX_CHECKSUM_MISMATCH));

    let retriever = Retriever::new(Arc::new(loaded), &permissive_retrieval());
    let q = embed_normalized(&embedder, "hash:128", &dropped).unwrap();
    let results = retriever.retrieve(&q, 10).unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.vector_id < 2));
    assert!(results.iter().all(|r| r.metadata.is_some()));

    let status = store.status();
    assert!(status.ready);
    assert!(status.degraded);
    assert_eq!(status.text_count, 2);
}

#[test]
fn empty_corpus_aborts_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::open(dir.path().join("faiss_store"));
    let mut docs = DocumentMap::new();
    docs.insert("tiny".to_string(), "too short".to_string());

    let err = build_index_with_embedder(
        &store,
        &docs,
        &RagConfig::default(),
        &HashEmbedder::default(),
        input("hash:256"),
    )
    .unwrap_err();
    assert_eq!(err.code, codes::CORPUS_EMPTY);
    assert!(!store.presence().index);

    let err = build_index_with_embedder(
        &store,
        &DocumentMap::new(),
        &RagConfig::default(),
        &HashEmbedder::default(),
        input("hash:256"),
    )
    .unwrap_err();
    assert_eq!(err.code, codes::CORPUS_EMPTY);
}

#[test]
fn corrupt_index_file_is_a_decode_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::open(dir.path().to_path_buf());
    build_index_with_embedder(
        &store,
        &corpus(),
        &RagConfig::default(),
        &HashEmbedder::new(16),
        input("hash:16"),
    )
    .unwrap();
    fs::write(dir.path().join("index.json"), b"{not json").unwrap();
    let err = store.try_load().unwrap_err();
    assert_eq!(err.code, codes::INDEX_DECODE_FAILED);
}

#[test]
fn divider_only_chunks_do_not_abort_the_build() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::open(dir.path().to_path_buf());
    let mut docs = DocumentMap::new();
    docs.insert(
        "page".to_string(),
        format!(
            "Admissions open every quarter and close two weeks before term.\n{}\nMentors answer forum questions within a day.",
            "-".repeat(3000)
        ),
    );

    let report = build_index_with_embedder(
        &store,
        &docs,
        &RagConfig::default(),
        &HashEmbedder::new(64),
        input("hash:64"),
    )
    .expect("divider windows still embed");
    assert!(report.chunks > 2);
    let loaded = store.try_load().unwrap();
    assert!(loaded.texts.iter().any(|t| !t.chars().any(char::is_alphanumeric)));
}

#[test]
fn short_embedding_batch_is_rejected_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::open(dir.path().to_path_buf());
    let err = build_index_with_embedder(
        &store,
        &corpus(),
        &RagConfig::default(),
        &ShortBatchEmbedder,
        input("short"),
    )
    .unwrap_err();
    assert_eq!(err.code, codes::EMBEDDINGS_FAILED);
    assert!(err.details.unwrap_or_default().contains("chunks_to_embed=3"));
    assert!(!store.presence().index);
}

#[test]
fn failed_staging_removes_partial_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::open(dir.path().to_path_buf());
    // A directory in the way makes the last staged write fail.
    fs::create_dir_all(dir.path().join("index.json.tmp")).unwrap();

    let err = build_index_with_embedder(
        &store,
        &corpus(),
        &RagConfig::default(),
        &HashEmbedder::new(32),
        input("hash:32"),
    )
    .unwrap_err();
    assert_eq!(err.code, codes::INDEX_WRITE_FAILED);

    let mut left: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    left.sort();
    assert_eq!(left, vec!["index.json.tmp".to_string()]);
    assert!(dir.path().join("index.json.tmp").is_dir());
}
