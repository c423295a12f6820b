use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use cqa_ai::budget::{select, select_context, CharTokenCounter, WordTokenCounter};
use cqa_ai::embeddings::HashEmbedder;
use cqa_ai::index::{build_index_with_embedder, ArtifactStore, IndexBuildInput};
use cqa_ai::llm::{GenerateOptions, Llm};
use cqa_ai::retrieve::RetrievalResult;
use cqa_ai::{AnswerOutcome, RagPipeline};
use cqa_core::config::RagConfig;
use cqa_core::error::{codes, AppError};
use cqa_core::ingest::DocumentMap;
use pretty_assertions::assert_eq;

const COURSE_X: &str = "Course X is a twelve week data science program covering Python, statistics and machine learning projects.";
const COURSE_Y: &str = "Course Y is a short web development bootcamp focused on HTML, CSS and JavaScript for beginners.";

enum Reply {
    Text(&'static str),
    Fail(AppError),
}

struct ScriptedLlm {
    reply: Reply,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
    last_options: Mutex<Option<GenerateOptions>>,
}

impl ScriptedLlm {
    fn new(reply: Reply) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
            last_options: Mutex::new(None),
        }
    }
}

impl Llm for ScriptedLlm {
    fn generate(
        &self,
        _model: &str,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        *self.last_options.lock().unwrap() = Some(options.clone());
        match &self.reply {
            Reply::Text(t) => Ok(t.to_string()),
            Reply::Fail(e) => Err(e.clone()),
        }
    }
}

fn courses() -> DocumentMap {
    let mut d = DocumentMap::new();
    d.insert("course_x".to_string(), COURSE_X.to_string());
    d.insert("course_y".to_string(), COURSE_Y.to_string());
    d
}

fn pipeline_with(
    dir: &std::path::Path,
    cfg: RagConfig,
    llm: Arc<ScriptedLlm>,
) -> RagPipeline {
    pipeline_over(dir, &courses(), cfg, llm)
}

fn pipeline_over(
    dir: &std::path::Path,
    docs: &DocumentMap,
    cfg: RagConfig,
    llm: Arc<ScriptedLlm>,
) -> RagPipeline {
    let store = ArtifactStore::open(dir.to_path_buf());
    let embedder = HashEmbedder::new(256);
    build_index_with_embedder(
        &store,
        docs,
        &cfg,
        &embedder,
        IndexBuildInput {
            model: embedder.model_name(),
            built_at: "2026-01-01T00:00:00Z".to_string(),
        },
    )
    .expect("build");
    let loaded = Arc::new(store.try_load().expect("load"));
    RagPipeline::new(cfg, loaded, Arc::new(embedder), llm).expect("pipeline")
}

#[test]
fn course_question_retrieves_its_chunk_and_answers_from_it() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(ScriptedLlm::new(Reply::Text(
        "<|assistant|> Course X covers Python,\n statistics and machine learning.</s><|user|> more?",
    )));
    let pipeline = pipeline_with(dir.path(), RagConfig::default(), llm.clone());

    let results = pipeline.retrieve("What does Course X cover?").unwrap();
    assert_eq!(results[0].source_id(), Some("course_x"));
    assert!(results[0].confidence > 50.0);
    assert!(results[0].confidence <= 100.0);

    let answer = pipeline.answer("What does Course X cover?").unwrap();
    assert_eq!(answer.text, "Course X covers Python, statistics and machine learning.");
    assert_eq!(answer.outcome, AnswerOutcome::Grounded);
    assert_eq!(answer.sources[0].source_id.as_deref(), Some("course_x"));
    assert!(answer.context_tokens > 0);
    assert!(answer.context_tokens <= 400);

    let prompt = llm.last_prompt.lock().unwrap().clone().unwrap();
    assert!(prompt.contains(COURSE_X));
    assert!(prompt.contains("I don't know."));
    assert!(prompt.contains("What does Course X cover?"));

    let opts = llm.last_options.lock().unwrap().clone().unwrap();
    assert_eq!(opts.max_tokens, 256);
    assert!(opts.stop.iter().any(|s| s == "<|user|>"));
}

#[test]
fn single_document_corpus_answers_from_its_only_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let text = "Course X covers Python basics. Course Y covers Java basics.";
    let mut docs = DocumentMap::new();
    docs.insert("courses".to_string(), text.to_string());
    let llm = Arc::new(ScriptedLlm::new(Reply::Text("Course X covers Python basics.")));
    let pipeline = pipeline_over(dir.path(), &docs, RagConfig::default(), llm.clone());
    assert_eq!(pipeline.index().texts, vec![text.to_string()]);

    let results = pipeline.retrieve("What does Course X cover?").unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].vector_id, 0);
    assert_eq!(results[0].text, text);
    assert!(results[0].confidence > 50.0);

    let answer = pipeline.answer("What does Course X cover?").unwrap();
    assert_eq!(answer.text, "Course X covers Python basics.");
    assert_eq!(answer.outcome, AnswerOutcome::Grounded);
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].source_id.as_deref(), Some("courses"));
    let prompt = llm.last_prompt.lock().unwrap().clone().unwrap();
    assert!(prompt.contains(text));
}

#[test]
fn no_usable_context_answers_unknown_without_calling_the_model() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = RagConfig::default();
    cfg.retrieval.min_confidence = 99.0;
    let llm = Arc::new(ScriptedLlm::new(Reply::Text("should not be used")));
    let pipeline = pipeline_with(dir.path(), cfg, llm.clone());

    let answer = pipeline.answer("What does Course X cover?").unwrap();
    assert_eq!(answer.text, "I don't know.");
    assert_eq!(answer.outcome, AnswerOutcome::NoContext);
    assert!(answer.sources.is_empty());
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn zero_budget_means_no_context() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = RagConfig::default();
    cfg.budget.token_budget = 0;
    let llm = Arc::new(ScriptedLlm::new(Reply::Text("unused")));
    let pipeline = pipeline_with(dir.path(), cfg, llm.clone());

    let answer = pipeline.answer("What does Course X cover?").unwrap();
    assert_eq!(answer.outcome, AnswerOutcome::NoContext);
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn model_declining_is_reported_as_unknown() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(ScriptedLlm::new(Reply::Text("I don't know.")));
    let pipeline = pipeline_with(dir.path(), RagConfig::default(), llm);
    let answer = pipeline.answer("What does Course X cover?").unwrap();
    assert_eq!(answer.outcome, AnswerOutcome::ModelUnknown);
}

#[test]
fn generator_transport_failure_surfaces_as_retryable_generator_error() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(ScriptedLlm::new(Reply::Fail(
        AppError::new(codes::OLLAMA_UNREACHABLE, "connection refused").with_retryable(true),
    )));
    let pipeline = pipeline_with(dir.path(), RagConfig::default(), llm);
    let err = pipeline.answer("What does Course X cover?").unwrap_err();
    assert_eq!(err.code, codes::GENERATOR_FAILED);
    assert!(err.retryable);

    // The shared index is untouched by the failure.
    assert_eq!(pipeline.index().texts.len(), 2);
    assert!(!pipeline.retrieve("What does Course X cover?").unwrap().is_empty());
}

#[test]
fn empty_generation_is_a_generator_error() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(ScriptedLlm::new(Reply::Text("<|assistant|>\n</s>")));
    let pipeline = pipeline_with(dir.path(), RagConfig::default(), llm);
    let err = pipeline.answer("What does Course X cover?").unwrap_err();
    assert_eq!(err.code, codes::GENERATOR_FAILED);
    assert!(!err.retryable);
}

#[test]
fn blank_query_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(ScriptedLlm::new(Reply::Text("unused")));
    let pipeline = pipeline_with(dir.path(), RagConfig::default(), llm);
    let err = pipeline.answer("   ").unwrap_err();
    assert_eq!(err.code, codes::RETRIEVAL_QUERY_EMPTY);
}

#[test]
fn pipeline_queries_with_the_model_recorded_at_build_time() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = RagConfig::default();
    cfg.ollama.embed_model = "something-else".to_string();
    let llm = Arc::new(ScriptedLlm::new(Reply::Text("unused")));
    let pipeline = pipeline_with(dir.path(), cfg, llm);
    assert_eq!(pipeline.embed_model(), "hash:256");
}

fn result(id: usize, text: &str) -> RetrievalResult {
    RetrievalResult {
        vector_id: id,
        raw_score: 0.5,
        confidence: 75.0,
        text: text.to_string(),
        metadata: None,
    }
}

#[test]
fn budgeter_stops_at_first_chunk_that_does_not_fit() {
    let results = vec![
        result(0, &"a".repeat(40)),  // 10 tokens
        result(1, &"b".repeat(80)),  // 20 tokens
        result(2, &"c".repeat(4)),   // 1 token
    ];
    let ctx = select_context(&results, 25, &CharTokenCounter);
    assert_eq!(ctx.chunks.len(), 1);
    assert_eq!(ctx.tokens_used, 10);

    let all = select(&results, 31, &CharTokenCounter);
    assert_eq!(all.len(), 3);

    assert!(select(&results, 0, &CharTokenCounter).is_empty());
    assert!(select(&[], 100, &WordTokenCounter).is_empty());
}

#[test]
fn budgeter_never_exceeds_budget() {
    let results: Vec<RetrievalResult> = (0..20)
        .map(|i| result(i, &"word ".repeat(i + 1)))
        .collect();
    for budget in 0..60 {
        let ctx = select_context(&results, budget, &WordTokenCounter);
        assert!(ctx.tokens_used <= budget);
        let ids: Vec<usize> = ctx.chunks.iter().map(|c| c.vector_id).collect();
        assert_eq!(ids, (0..ids.len()).collect::<Vec<_>>());
    }
}
