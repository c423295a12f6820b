use cqa_core::error::{codes, AppError};

use super::Embedder;
use crate::index::similarity::normalize_l2;

/// Model-name prefix recorded for indexes built with [`HashEmbedder`].
pub const HASH_MODEL_PREFIX: &str = "hash:";

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Deterministic bag-of-words embedder. Offline, no model download; quality
/// is lexical overlap only. Used for tests and air-gapped builds.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Model name to record in the index so queries pick the same embedder.
    pub fn model_name(&self) -> String {
        format!("{HASH_MODEL_PREFIX}{}", self.dims)
    }

    /// Parse dims back out of a recorded model name such as `hash:256`.
    pub fn from_model_name(model: &str) -> Option<Self> {
        model
            .strip_prefix(HASH_MODEL_PREFIX)
            .and_then(|d| d.parse::<usize>().ok())
            .filter(|d| *d > 0)
            .map(Self::new)
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

fn fnv1a(token: &str) -> u64 {
    let mut h = FNV_OFFSET;
    for b in token.as_bytes() {
        h ^= u64::from(*b);
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

impl HashEmbedder {
    fn accumulate<'a>(&self, v: &mut [f32], tokens: impl Iterator<Item = &'a str>) -> usize {
        let mut n = 0;
        for token in tokens {
            let h = fnv1a(token);
            let slot = (h % self.dims as u64) as usize;
            // High bit picks the sign so unrelated tokens partly cancel out.
            let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
            v[slot] += sign;
            n += 1;
        }
        n
    }
}

impl Embedder for HashEmbedder {
    /// Word tokens are alphanumeric runs. Input without any (dividers, table
    /// rules) is hashed by its whitespace-separated runs instead, so every
    /// non-blank input embeds.
    fn embed(&self, _model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(AppError::new(
                codes::EMBEDDINGS_FAILED,
                "Input has no tokens to embed",
            )
            .with_details(format!("chars={}", input.chars().count())));
        }

        let mut v = vec![0.0f32; self.dims];
        let lowered = trimmed.to_lowercase();
        let words = self.accumulate(
            &mut v,
            lowered
                .split(|c: char| !c.is_alphanumeric())
                .filter(|t| !t.is_empty()),
        );
        if words == 0 {
            self.accumulate(&mut v, lowered.split_whitespace());
        }
        if !normalize_l2(&mut v) {
            // Every token cancelled out; fall back to one slot for the whole input.
            let slot = (fnv1a(&lowered) % self.dims as u64) as usize;
            v.iter_mut().for_each(|x| *x = 0.0);
            v[slot] = 1.0;
        }
        Ok(v)
    }
}
