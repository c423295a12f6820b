use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use cqa_ai::answer::{Answer, AnswerOutcome, RagPipeline};
use cqa_ai::embeddings::{Embedder, HashEmbedder, OllamaEmbedder};
use cqa_ai::index::{build_index_with_embedder, ArtifactStore, IndexBuildInput, LoadedIndex};
use cqa_ai::llm::OllamaLlm;
use cqa_ai::ollama::OllamaClient;
use cqa_ai::retrieve::RetrievalResult;
use cqa_core::config::{ChunkMode, RagConfig};
use cqa_core::ingest::load_documents;

mod logging;

const PREVIEW_CHARS: usize = 300;
const EXIT_WORDS: [&str; 3] = ["exit", "quit", "bye"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmbedderKind {
    /// Local Ollama embeddings endpoint.
    Ollama,
    /// Offline hashed bag-of-words vectors.
    Hash,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Chars,
    Words,
    Recursive,
}

impl From<ModeArg> for ChunkMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Chars => ChunkMode::Chars,
            ModeArg::Words => ChunkMode::Words,
            ModeArg::Recursive => ChunkMode::Recursive,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "cqa")]
#[command(about = "Grounded question answering over a scraped document corpus")]
struct Cli {
    /// TOML configuration file. Defaults apply to anything it leaves out.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Artifact directory; overrides `store.index_dir`.
    #[arg(long, global = true)]
    index_dir: Option<PathBuf>,

    /// Embedder used when building. Queries follow whatever the index was built with.
    #[arg(long, global = true, value_enum, default_value_t = EmbedderKind::Ollama)]
    embedder: EmbedderKind,

    #[arg(long, global = true, default_value_t = 256)]
    hash_dims: usize,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Ingest documents, chunk, embed, and write the index artifacts.
    Build {
        /// Scraper JSON file, CSV table, or directory of .txt/.md files.
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        chunk_size: Option<usize>,
        #[arg(long)]
        overlap: Option<usize>,
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
    },
    /// Show artifact presence, counts and health warnings.
    Status,
    /// Print the retrieved chunks for a question without generating.
    Query {
        #[arg(long)]
        question: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Answer one question.
    Ask {
        #[arg(long)]
        question: String,
    },
    /// Interactive question loop; `exit`, `quit` or `bye` leaves.
    Chat,
}

fn load_config(cli: &Cli) -> Result<RagConfig> {
    let mut cfg = match &cli.config {
        Some(path) => RagConfig::load(path)?,
        None => RagConfig::default(),
    };
    if let Some(dir) = &cli.index_dir {
        cfg.store.index_dir = dir.clone();
    }
    Ok(cfg)
}

fn now_rfc3339() -> Result<String> {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .context("format build timestamp")
}

fn ollama_client(cfg: &RagConfig) -> Result<OllamaClient> {
    Ok(OllamaClient::from_config(&cfg.ollama)?)
}

/// Embedder and model name for a fresh build.
fn build_embedder(cli: &Cli, cfg: &RagConfig) -> Result<(Arc<dyn Embedder>, String)> {
    match cli.embedder {
        EmbedderKind::Hash => {
            let e = HashEmbedder::new(cli.hash_dims);
            let model = e.model_name();
            Ok((Arc::new(e), model))
        }
        EmbedderKind::Ollama => {
            let client = ollama_client(cfg)?;
            client
                .health_check()
                .context("Ollama must be running to build with --embedder ollama")?;
            Ok((Arc::new(OllamaEmbedder::new(client)), cfg.ollama.embed_model.clone()))
        }
    }
}

/// Embedder matching the model recorded in the loaded index.
fn query_embedder(cli: &Cli, cfg: &RagConfig, index: &LoadedIndex) -> Result<Arc<dyn Embedder>> {
    let recorded = index.info.embed_model.as_str();
    if let Some(e) = HashEmbedder::from_model_name(recorded) {
        if cli.embedder != EmbedderKind::Hash {
            tracing::info!(model = recorded, "index was built with hashed embeddings; using them");
        }
        return Ok(Arc::new(e));
    }
    Ok(Arc::new(OllamaEmbedder::new(ollama_client(cfg)?)))
}

fn load_index(cfg: &RagConfig) -> Result<Arc<LoadedIndex>> {
    let store = ArtifactStore::open(cfg.store.index_dir.clone());
    let loaded = store
        .try_load()
        .with_context(|| format!("load index from {}", store.dir().display()))?;
    for w in loaded.warnings.iter() {
        eprintln!("warning: [{}] {}", w.code, w.message);
    }
    Ok(Arc::new(loaded))
}

fn pipeline(cli: &Cli, cfg: &RagConfig) -> Result<RagPipeline> {
    let index = load_index(cfg)?;
    let embedder = query_embedder(cli, cfg, &index)?;
    let llm = Arc::new(OllamaLlm::new(ollama_client(cfg)?));
    Ok(RagPipeline::new(cfg.clone(), index, embedder, llm)?)
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(PREVIEW_CHARS) {
        Some((byte, _)) => format!("{}...", &flat[..byte]),
        None => flat,
    }
}

fn print_results(results: &[RetrievalResult]) {
    if results.is_empty() {
        println!("no relevant chunks found");
        return;
    }
    for r in results {
        println!(
            "{:.1}% idx={} src={}",
            r.confidence,
            r.vector_id,
            r.source_id().unwrap_or("-")
        );
        println!("    {}", preview(&r.text));
    }
}

fn print_answer(answer: &Answer, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(answer).context("encode answer")?);
        return Ok(());
    }
    println!("{}", answer.text);
    if answer.outcome != AnswerOutcome::NoContext && !answer.sources.is_empty() {
        let srcs: Vec<String> = answer
            .sources
            .iter()
            .map(|s| format!("{} ({:.1}%)", s.source_id.as_deref().unwrap_or("-"), s.confidence))
            .collect();
        println!("sources: {}", srcs.join(", "));
    }
    Ok(())
}

fn chat(pipeline: &RagPipeline, json: bool) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    println!("Ask a question ({} to leave).", EXIT_WORDS.join("/"));
    loop {
        print!("> ");
        stdout.flush().context("flush stdout")?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).context("read question")? == 0 {
            break;
        }
        let q = line.trim();
        if q.is_empty() {
            continue;
        }
        if EXIT_WORDS.iter().any(|w| q.eq_ignore_ascii_case(w)) {
            break;
        }
        // A failed turn is reported and the loop continues with the same index.
        match pipeline.answer(q) {
            Ok(answer) => print_answer(&answer, json)?,
            Err(e) => eprintln!("error: {e}"),
        }
    }
    Ok(())
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(&cli)?;

    match &cli.command {
        Commands::Build {
            input,
            chunk_size,
            overlap,
            mode,
        } => {
            let mut cfg = cfg.clone();
            if let Some(n) = chunk_size {
                cfg.chunking.chunk_size = *n;
            }
            if let Some(n) = overlap {
                cfg.chunking.overlap = *n;
            }
            if let Some(m) = mode {
                cfg.chunking.mode = (*m).into();
            }
            cfg.validate()?;

            let documents = load_documents(input)?;
            let (embedder, model) = build_embedder(&cli, &cfg)?;
            let store = ArtifactStore::open(cfg.store.index_dir.clone());
            let report = build_index_with_embedder(
                &store,
                &documents,
                &cfg,
                embedder.as_ref(),
                IndexBuildInput {
                    model,
                    built_at: now_rfc3339()?,
                },
            )?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report).context("encode report")?);
            } else {
                println!(
                    "documents={} chunks={} reused_vectors={} dims={} model={} build_id={} dir={}",
                    report.documents,
                    report.chunks,
                    report.reused_vectors,
                    report.info.dims,
                    report.info.embed_model,
                    report.info.build_id,
                    store.dir().display()
                );
            }
        }
        Commands::Status => {
            let status = ArtifactStore::open(cfg.store.index_dir.clone()).status();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status).context("encode status")?);
            } else {
                println!("index_dir={}", status.index_dir);
                println!(
                    "artifacts: index={} texts={} meta={}",
                    status.presence.index, status.presence.texts, status.presence.meta
                );
                println!("ready={} degraded={}", status.ready, status.degraded);
                if let Some(info) = &status.info {
                    println!(
                        "count={} texts={} meta={} dims={} metric={:?} model={} built_at={}",
                        info.count,
                        status.text_count,
                        status.meta_count,
                        info.dims,
                        info.metric,
                        info.embed_model,
                        info.built_at
                    );
                }
                for w in status.warnings.iter() {
                    match w.details.as_deref() {
                        Some(d) => println!("warning: [{}] {} ({d})", w.code, w.message),
                        None => println!("warning: [{}] {}", w.code, w.message),
                    }
                }
            }
        }
        Commands::Query { question, top_k } => {
            let mut cfg = cfg.clone();
            if let Some(k) = top_k {
                cfg.retrieval.top_k = *k;
            }
            let p = pipeline(&cli, &cfg)?;
            let results = p.retrieve(question)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&results).context("encode results")?);
            } else {
                print_results(&results);
            }
        }
        Commands::Ask { question } => {
            let p = pipeline(&cli, &cfg)?;
            let answer = p.answer(question)?;
            print_answer(&answer, cli.json)?;
        }
        Commands::Chat => {
            let p = pipeline(&cli, &cfg)?;
            chat(&p, cli.json)?;
        }
    }
    Ok(())
}

fn main() {
    logging::init("info");
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
