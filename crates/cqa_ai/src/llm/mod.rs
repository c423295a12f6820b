use cqa_core::error::AppError;

pub mod ollama_llm;

pub use ollama_llm::OllamaLlm;

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    pub stop: Vec<String>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_tokens: 256,
            temperature: 0.2,
            stop: Vec::new(),
        }
    }
}

pub trait Llm: Send + Sync {
    fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, AppError>;
}
