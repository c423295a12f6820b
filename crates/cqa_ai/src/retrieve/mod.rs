use std::sync::Arc;

use cqa_core::config::RetrievalConfig;
use cqa_core::domain::ChunkMeta;
use cqa_core::error::{codes, AppError};
use cqa_core::normalize::clean_text;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::corpus::NoiseFilter;
use crate::embeddings::{embed_normalized, Embedder};
use crate::index::{cosine_from_score, LoadedIndex};

/// Map a cosine similarity to a 0..=100 score with one decimal.
/// Out-of-range inputs are clamped; NaN maps to 0.
pub fn confidence_from_similarity(similarity: f32) -> f32 {
    if similarity.is_nan() {
        return 0.0;
    }
    let s = similarity.clamp(-1.0, 1.0);
    let pct = (s + 1.0) / 2.0 * 100.0;
    (pct * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    pub vector_id: usize,
    /// Score as returned by the index (inner product or squared distance).
    pub raw_score: f32,
    pub confidence: f32,
    pub text: String,
    /// `None` when the metadata sequence is shorter than the index. Written
    /// as an empty object so consumers always see a map.
    #[serde(
        default,
        serialize_with = "meta_or_empty",
        deserialize_with = "empty_as_none"
    )]
    pub metadata: Option<ChunkMeta>,
}

fn meta_or_empty<S: Serializer>(meta: &Option<ChunkMeta>, s: S) -> Result<S::Ok, S::Error> {
    match meta {
        Some(m) => m.serialize(s),
        None => s.serialize_map(Some(0))?.end(),
    }
}

fn empty_as_none<'de, D: Deserializer<'de>>(d: D) -> Result<Option<ChunkMeta>, D::Error> {
    match Option::<serde_json::Value>::deserialize(d)? {
        None => Ok(None),
        Some(serde_json::Value::Object(m)) if m.is_empty() => Ok(None),
        Some(v) => serde_json::from_value(v)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

impl RetrievalResult {
    pub fn source_id(&self) -> Option<&str> {
        self.metadata.as_ref().map(|m| m.source_id.as_str())
    }
}

/// Turns index hits into scored, screened chunks. Holds only shared read-only state.
#[derive(Debug, Clone)]
pub struct Retriever {
    index: Arc<LoadedIndex>,
    noise: NoiseFilter,
    min_confidence: f32,
    clean_text: bool,
}

impl Retriever {
    pub fn new(index: Arc<LoadedIndex>, cfg: &RetrievalConfig) -> Self {
        Self {
            index,
            noise: NoiseFilter::from_config(cfg),
            min_confidence: cfg.min_confidence,
            clean_text: false,
        }
    }

    /// Clean chunk text before the noise filter sees it, so length checks
    /// apply to the text that reaches the prompt.
    pub fn with_text_cleaning(mut self, on: bool) -> Self {
        self.clean_text = on;
        self
    }

    pub fn index(&self) -> &LoadedIndex {
        &self.index
    }

    /// Embed `query` through the shared normalization helper, then [`Self::retrieve`].
    pub fn retrieve_text(
        &self,
        embedder: &dyn Embedder,
        model: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievalResult>, AppError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::new(codes::RETRIEVAL_QUERY_EMPTY, "Query must not be empty"));
        }
        let v = embed_normalized(embedder, model, query)?;
        self.retrieve(&v, k)
    }

    /// Top-`k` search, then bounds check, optional cleaning, noise and
    /// confidence filtering. Output keeps the index's best-first order, so it
    /// may hold fewer than `k` results.
    pub fn retrieve(&self, query: &[f32], k: usize) -> Result<Vec<RetrievalResult>, AppError> {
        let loaded = self.index.as_ref();
        let metric = loaded.index.metric();
        let hits = loaded.index.search(query, k)?;

        let mut out = Vec::with_capacity(hits.len());
        for hit in hits {
            let Some(text) = loaded.text(hit.vector_id) else {
                tracing::warn!(
                    vector_id = hit.vector_id,
                    texts = loaded.texts.len(),
                    "dropping hit past the chunk text sequence"
                );
                continue;
            };
            let text = if self.clean_text {
                clean_text(text)
            } else {
                text.to_string()
            };
            if let Some(reason) = self.noise.classify(&text) {
                tracing::debug!(vector_id = hit.vector_id, ?reason, "dropping noisy chunk");
                continue;
            }
            let confidence = confidence_from_similarity(cosine_from_score(metric, hit.score));
            if confidence < self.min_confidence {
                tracing::debug!(vector_id = hit.vector_id, confidence, "below min_confidence");
                continue;
            }
            out.push(RetrievalResult {
                vector_id: hit.vector_id,
                raw_score: hit.score,
                confidence,
                text,
                metadata: loaded.meta(hit.vector_id).cloned(),
            });
        }
        tracing::debug!(k, returned = out.len(), "retrieval finished");
        Ok(out)
    }
}
