pub mod answer;
pub mod budget;
pub mod corpus;
pub mod embeddings;
pub mod guardrails;
pub mod index;
pub mod llm;
pub mod ollama;
pub mod retrieve;

pub use answer::{Answer, AnswerOutcome, RagPipeline};
pub use index::{ArtifactStore, LoadedIndex, VectorIndex};
pub use retrieve::{RetrievalResult, Retriever};
