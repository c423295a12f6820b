//! Query-time glue: embed, retrieve, budget, prompt, generate.

use std::sync::Arc;

use cqa_core::config::RagConfig;
use cqa_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};

use crate::budget::{counter_for, select_context, PromptContext, TokenCounter};
use crate::embeddings::Embedder;
use crate::guardrails::{is_unknown_answer, postprocess_answer};
use crate::index::LoadedIndex;
use crate::llm::{GenerateOptions, Llm};
use crate::retrieve::{RetrievalResult, Retriever};

pub mod prompts;

use prompts::{build_prompt, default_stop_sequences, UNKNOWN_ANSWER};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// The model answered from retrieved context.
    Grounded,
    /// Nothing usable was retrieved; the model was not called.
    NoContext,
    /// The model was called and replied with the unknown marker.
    ModelUnknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerSource {
    pub vector_id: usize,
    pub source_id: Option<String>,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub text: String,
    pub outcome: AnswerOutcome,
    pub sources: Vec<AnswerSource>,
    pub context_tokens: usize,
}

impl Answer {
    fn no_context() -> Self {
        Self {
            text: UNKNOWN_ANSWER.to_string(),
            outcome: AnswerOutcome::NoContext,
            sources: Vec::new(),
            context_tokens: 0,
        }
    }
}

/// Everything a query needs, built once and shared across queries.
pub struct RagPipeline {
    config: RagConfig,
    retriever: Retriever,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn Llm>,
    embed_model: String,
    counter: Box<dyn TokenCounter>,
}

impl RagPipeline {
    pub fn new(
        config: RagConfig,
        index: Arc<LoadedIndex>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn Llm>,
    ) -> Result<Self, AppError> {
        config.validate()?;
        // Queries must be embedded with the model the index was built with.
        let embed_model = if index.info.embed_model.is_empty() {
            config.ollama.embed_model.clone()
        } else {
            index.info.embed_model.clone()
        };
        if index.is_degraded() {
            tracing::warn!(
                warnings = index.warnings.len(),
                "serving queries from a degraded index"
            );
        }
        Ok(Self {
            retriever: Retriever::new(index, &config.retrieval)
                .with_text_cleaning(config.chunking.clean_text),
            counter: counter_for(config.budget.counter),
            config,
            embedder,
            llm,
            embed_model,
        })
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn index(&self) -> &LoadedIndex {
        self.retriever.index()
    }

    pub fn embed_model(&self) -> &str {
        &self.embed_model
    }

    /// Embed `query` and return the screened top-k results.
    pub fn retrieve(&self, query: &str) -> Result<Vec<RetrievalResult>, AppError> {
        self.retriever.retrieve_text(
            self.embedder.as_ref(),
            &self.embed_model,
            query,
            self.config.retrieval.top_k,
        )
    }

    /// Retrieve and pack the context that would be sent to the generator.
    pub fn context_for(&self, query: &str) -> Result<PromptContext, AppError> {
        let results = self.retrieve(query)?;
        Ok(select_context(
            &results,
            self.config.budget.token_budget,
            self.counter.as_ref(),
        ))
    }

    pub fn answer(&self, query: &str) -> Result<Answer, AppError> {
        let ctx = self.context_for(query)?;
        if ctx.is_empty() {
            tracing::info!(code = codes::RETRIEVAL_NO_CONTEXT, "no usable context; answering unknown");
            return Ok(Answer::no_context());
        }

        let prompt = build_prompt(&self.config.prompt.system_instructions, &ctx.texts(), query);
        let options = GenerateOptions {
            max_tokens: self.config.ollama.max_output_tokens,
            temperature: self.config.ollama.temperature,
            stop: default_stop_sequences(),
        };
        tracing::debug!(
            chunks = ctx.chunks.len(),
            tokens = ctx.tokens_used,
            prompt_chars = prompt.chars().count(),
            "calling generator"
        );

        let raw = self
            .llm
            .generate(&self.config.ollama.generate_model, &prompt, &options)
            .map_err(|e| {
                if e.is(codes::GENERATOR_FAILED) {
                    e
                } else {
                    AppError::new(codes::GENERATOR_FAILED, "Generator call failed")
                        .with_details(e.to_string())
                        .with_retryable(e.retryable)
                }
            })?;

        let text = postprocess_answer(&raw);
        if text.is_empty() {
            return Err(AppError::new(
                codes::GENERATOR_FAILED,
                "Generator returned an empty answer",
            )
            .with_details(format!("raw_chars={}", raw.chars().count())));
        }

        let outcome = if is_unknown_answer(&text) {
            AnswerOutcome::ModelUnknown
        } else {
            AnswerOutcome::Grounded
        };
        let sources = ctx
            .chunks
            .iter()
            .map(|c| AnswerSource {
                vector_id: c.vector_id,
                source_id: c.source_id().map(|s| s.to_string()),
                confidence: c.confidence,
            })
            .collect();

        Ok(Answer {
            text,
            outcome,
            sources,
            context_tokens: ctx.tokens_used,
        })
    }
}
