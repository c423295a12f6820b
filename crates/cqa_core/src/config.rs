//! Explicit pipeline configuration.
//!
//! Every component receives its settings from a [`RagConfig`] at construction
//! time. The embedder and generator handles are not part of this structure;
//! they are passed beside it to the pipeline constructor.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::SimilarityMetric;
use crate::error::{codes, AppError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChunkMode {
    /// Fixed windows over the character stream.
    #[default]
    Chars,
    /// Fixed windows over the whitespace-separated word stream.
    Words,
    /// Boundary-aware packing (paragraph, line, sentence, word, character).
    Recursive,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TokenCounterKind {
    #[default]
    Chars,
    Words,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
    /// Documents whose stripped text is shorter than this are skipped.
    pub min_document_chars: usize,
    pub mode: ChunkMode,
    pub clean_text: bool,
    pub dedup: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 700,
            overlap: 150,
            min_document_chars: 40,
            mode: ChunkMode::Chars,
            clean_text: true,
            dedup: false,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.chunk_size == 0 || self.overlap >= self.chunk_size {
            return Err(AppError::new(
                codes::CONFIG_CHUNK_PARAMS_INVALID,
                "Chunk overlap must be smaller than chunk size",
            )
            .with_details(format!(
                "chunk_size={}; overlap={}",
                self.chunk_size, self.overlap
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub metric: SimilarityMetric,
    pub min_chunk_chars: usize,
    /// Chunks that mention a link and are shorter than this are treated as link-only.
    pub link_only_max_chars: usize,
    pub boilerplate_markers: Vec<String>,
    pub byline_prefixes: Vec<String>,
    pub min_confidence: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            metric: SimilarityMetric::InnerProduct,
            min_chunk_chars: 50,
            link_only_max_chars: 200,
            boilerplate_markers: vec!["Blog Author".to_string()],
            byline_prefixes: vec!["By ".to_string()],
            min_confidence: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BudgetConfig {
    pub token_budget: usize,
    pub counter: TokenCounterKind,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            token_budget: 400,
            counter: TokenCounterKind::Chars,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub index_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("faiss_store"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
    pub embed_model: String,
    pub generate_model: String,
    pub embed_timeout_secs: u64,
    pub generate_timeout_secs: u64,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            embed_model: "all-minilm".to_string(),
            generate_model: "tinyllama".to_string(),
            embed_timeout_secs: 10,
            generate_timeout_secs: 120,
            max_output_tokens: 256,
            temperature: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PromptConfig {
    pub system_instructions: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_instructions: "You are a helpful assistant for the documentation corpus. \
                Use the retrieved context to answer questions."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RagConfig {
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub budget: BudgetConfig,
    pub store: StoreConfig,
    pub ollama: OllamaConfig,
    pub prompt: PromptConfig,
}

impl RagConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, AppError> {
        let cfg: RagConfig = toml::from_str(raw).map_err(|e| {
            AppError::new(codes::CONFIG_INVALID, "Failed to decode configuration")
                .with_details(e.to_string())
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            AppError::io(codes::CONFIG_READ_FAILED, "Failed to read configuration file", path, e)
        })?;
        Self::from_toml_str(&raw).map_err(|e| match e.details {
            Some(d) => AppError::new(e.code, e.message)
                .with_details(format!("path={}; {}", path.display(), d)),
            None => e.with_details(format!("path={}", path.display())),
        })
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.chunking.validate()?;
        if self.retrieval.top_k == 0 {
            return Err(AppError::new(codes::CONFIG_INVALID, "top_k must be at least 1"));
        }
        if !(0.0..=100.0).contains(&self.retrieval.min_confidence) {
            return Err(AppError::new(
                codes::CONFIG_INVALID,
                "min_confidence must be within 0..=100",
            )
            .with_details(format!("min_confidence={}", self.retrieval.min_confidence)));
        }
        if self.ollama.generate_timeout_secs == 0 {
            return Err(AppError::new(
                codes::CONFIG_INVALID,
                "generate_timeout_secs must be positive",
            ));
        }
        Ok(())
    }
}
