pub mod config;
pub mod digest;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod normalize;
