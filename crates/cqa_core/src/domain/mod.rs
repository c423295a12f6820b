use serde::{Deserialize, Serialize};

/// A raw unit of scraped content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub source_id: String,
    pub text: String,
}

impl Document {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ChunkMeta {
    // Older artifacts wrote the document id as `source`.
    #[serde(alias = "source", default)]
    pub source_id: String,
    #[serde(default)]
    pub chunk_index: u32,
    /// Character offsets of the window in the (cleaned) document text, end exclusive.
    #[serde(default)]
    pub char_start: u32,
    #[serde(default)]
    pub char_end: u32,
    #[serde(default)]
    pub text_sha256: String,
}

/// The retrieval unit. Its position in the persisted chunk sequence is its vector id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMeta,
}

/// Similarity metric recorded in every persisted index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Dot product on unit vectors (cosine similarity). Higher is better.
    #[default]
    InnerProduct,
    /// Squared euclidean distance. Lower is better.
    L2,
}

/// Non-fatal condition surfaced alongside a usable result (e.g. a degraded index load).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexWarning {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

impl IndexWarning {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}
