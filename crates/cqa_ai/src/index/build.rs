use std::collections::HashMap;

use cqa_core::config::RagConfig;
use cqa_core::error::{codes, AppError};
use cqa_core::ingest::DocumentMap;
use serde::{Deserialize, Serialize};

use super::store::{ArtifactStore, IndexInfo};
use super::VectorIndex;
use crate::corpus::chunk_documents;
use crate::embeddings::{embed_batch_normalized, Embedder};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexBuildInput {
    /// Embedding model name, recorded in `index.json` and reused at query time.
    pub model: String,
    pub built_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub documents: usize,
    pub chunks: usize,
    /// Vectors taken from the previous index instead of re-embedding.
    pub reused_vectors: usize,
    pub info: IndexInfo,
}

/// Vectors from the index currently on disk, keyed by chunk text hash, when
/// it was built with the same model.
fn reusable_vectors(store: &ArtifactStore, model: &str) -> HashMap<String, Vec<f32>> {
    let loaded = match store.try_load() {
        Ok(l) => l,
        Err(_) => return HashMap::new(),
    };
    if loaded.info.embed_model != model || loaded.is_degraded() {
        return HashMap::new();
    }
    loaded
        .metas
        .iter()
        .zip(loaded.index.vectors().iter())
        .filter(|(m, _)| !m.text_sha256.is_empty())
        .map(|(m, v)| (m.text_sha256.clone(), v.clone()))
        .collect()
}

/// Chunk, embed, index and persist a corpus as one batch job.
///
/// Nothing is written unless every step succeeds; the previous artifact set
/// stays in place on error.
pub fn build_index_with_embedder(
    store: &ArtifactStore,
    documents: &DocumentMap,
    cfg: &RagConfig,
    embedder: &dyn Embedder,
    input: IndexBuildInput,
) -> Result<BuildReport, AppError> {
    cfg.validate()?;

    let chunks = chunk_documents(documents, &cfg.chunking)?;
    if chunks.is_empty() {
        return Err(AppError::new(
            codes::CORPUS_EMPTY,
            "No chunks produced; the corpus is empty or every document is below the minimum length",
        )
        .with_details(format!(
            "documents={}; min_document_chars={}",
            documents.len(),
            cfg.chunking.min_document_chars
        )));
    }

    let cached = reusable_vectors(store, &input.model);
    let mut vectors: Vec<Option<Vec<f32>>> = chunks
        .iter()
        .map(|c| cached.get(&c.metadata.text_sha256).cloned())
        .collect();
    let reused = vectors.iter().filter(|v| v.is_some()).count();

    let missing: Vec<usize> = (0..chunks.len()).filter(|&i| vectors[i].is_none()).collect();
    if !missing.is_empty() {
        let inputs: Vec<&str> = missing.iter().map(|&i| chunks[i].text.as_str()).collect();
        let embedded = embed_batch_normalized(embedder, &input.model, &inputs).map_err(|e| {
            let details = format!(
                "chunks_to_embed={}; first_chunk={}; {}",
                missing.len(),
                missing[0],
                e.details.as_deref().unwrap_or("")
            );
            e.with_details(details)
        })?;
        for (&i, v) in missing.iter().zip(embedded) {
            vectors[i] = Some(v);
        }
    }
    let vectors: Vec<Vec<f32>> = vectors.into_iter().flatten().collect();

    let index = VectorIndex::build(vectors, cfg.retrieval.metric)?;
    let info = store.save(&index, &chunks, &input.model, &input.built_at)?;

    tracing::info!(
        documents = documents.len(),
        chunks = chunks.len(),
        reused_vectors = reused,
        model = %input.model,
        "index build finished"
    );

    Ok(BuildReport {
        documents: documents.len(),
        chunks: chunks.len(),
        reused_vectors: reused,
        info,
    })
}
