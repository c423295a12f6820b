//! Corpus preparation: chunking documents and screening retrieved chunks.

pub mod chunking;
pub mod noise;

pub use chunking::{chunk, chunk_documents};
pub use noise::{NoiseFilter, NoiseReason};
