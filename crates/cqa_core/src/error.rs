use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Stable error codes shared by the library crates and the CLI.
pub mod codes {
    pub const INDEX_MISSING_ARTIFACT: &str = "INDEX_MISSING_ARTIFACT";
    pub const INDEX_ARTIFACT_SIZE_MISMATCH: &str = "INDEX_ARTIFACT_SIZE_MISMATCH";
    pub const INDEX_CHECKSUM_MISMATCH: &str = "INDEX_CHECKSUM_MISMATCH";
    pub const INDEX_DIMENSION_MISMATCH: &str = "INDEX_DIMENSION_MISMATCH";
    pub const INDEX_NOT_NORMALIZED: &str = "INDEX_NOT_NORMALIZED";
    pub const INDEX_DECODE_FAILED: &str = "INDEX_DECODE_FAILED";
    pub const INDEX_WRITE_FAILED: &str = "INDEX_WRITE_FAILED";
    pub const CORPUS_EMPTY: &str = "CORPUS_EMPTY";
    pub const CONFIG_CHUNK_PARAMS_INVALID: &str = "CONFIG_CHUNK_PARAMS_INVALID";
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";
    pub const CONFIG_READ_FAILED: &str = "CONFIG_READ_FAILED";
    pub const RETRIEVAL_NO_CONTEXT: &str = "RETRIEVAL_NO_CONTEXT";
    pub const RETRIEVAL_QUERY_EMPTY: &str = "RETRIEVAL_QUERY_EMPTY";
    pub const EMBEDDINGS_FAILED: &str = "EMBEDDINGS_FAILED";
    pub const GENERATOR_FAILED: &str = "GENERATOR_FAILED";
    pub const INGEST_READ_FAILED: &str = "INGEST_READ_FAILED";
    pub const INGEST_DECODE_FAILED: &str = "INGEST_DECODE_FAILED";
    pub const OLLAMA_REMOTE_NOT_ALLOWED: &str = "OLLAMA_REMOTE_NOT_ALLOWED";
    pub const OLLAMA_UNREACHABLE: &str = "OLLAMA_UNREACHABLE";
    pub const OLLAMA_UNHEALTHY: &str = "OLLAMA_UNHEALTHY";
}

/// Single structured error shape used by every layer, from chunking to the CLI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    /// Error for a failed filesystem operation, with the conventional `path=...; err=...` details.
    pub fn io(
        code: impl Into<String>,
        message: impl Into<String>,
        path: &Path,
        err: impl fmt::Display,
    ) -> Self {
        Self::new(code, message).with_details(format!("path={}; err={}", path.display(), err))
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(d) = self.details.as_deref() {
            write!(f, " ({d})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}
