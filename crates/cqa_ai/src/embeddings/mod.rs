use cqa_core::error::{codes, AppError};

use crate::index::similarity::normalize_l2;

pub mod hashing;
pub mod ollama_embed;

pub use hashing::HashEmbedder;
pub use ollama_embed::OllamaEmbedder;

pub trait Embedder: Send + Sync {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError>;

    fn embed_batch(&self, model: &str, inputs: &[&str]) -> Result<Vec<Vec<f32>>, AppError> {
        inputs.iter().map(|s| self.embed(model, s)).collect()
    }
}

/// Embed and scale to unit length. Corpus chunks and queries both go through
/// here so they share one normalization convention.
pub fn embed_normalized(
    embedder: &dyn Embedder,
    model: &str,
    input: &str,
) -> Result<Vec<f32>, AppError> {
    let mut v = embedder.embed(model, input)?;
    if v.is_empty() {
        return Err(AppError::new(codes::EMBEDDINGS_FAILED, "Embedding vector was empty"));
    }
    if !normalize_l2(&mut v) {
        return Err(AppError::new(
            codes::EMBEDDINGS_FAILED,
            "Embedding vector has zero or non-finite norm",
        )
        .with_details(format!("model={model}; dims={}", v.len())));
    }
    Ok(v)
}

pub fn embed_batch_normalized(
    embedder: &dyn Embedder,
    model: &str,
    inputs: &[&str],
) -> Result<Vec<Vec<f32>>, AppError> {
    let mut out = embedder.embed_batch(model, inputs)?;
    if out.len() != inputs.len() {
        return Err(AppError::new(
            codes::EMBEDDINGS_FAILED,
            "Embedder returned a different number of vectors than inputs",
        )
        .with_details(format!("inputs={}; vectors={}", inputs.len(), out.len())));
    }
    for (i, v) in out.iter_mut().enumerate() {
        if v.is_empty() || !normalize_l2(v) {
            return Err(AppError::new(
                codes::EMBEDDINGS_FAILED,
                "Embedding vector was empty or had zero norm",
            )
            .with_details(format!("model={model}; input={i}")));
        }
    }
    Ok(out)
}
