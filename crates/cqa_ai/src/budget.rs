//! Token-budgeted context selection.

use cqa_core::config::TokenCounterKind;

use crate::retrieve::RetrievalResult;

/// Estimated token cost of a text. Counters must be deterministic.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

impl<F> TokenCounter for F
where
    F: Fn(&str) -> usize + Send + Sync,
{
    fn count(&self, text: &str) -> usize {
        self(text)
    }
}

/// Roughly four characters per token, rounded up.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharTokenCounter;

impl CharTokenCounter {
    pub const CHARS_PER_TOKEN: usize = 4;
}

impl TokenCounter for CharTokenCounter {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(Self::CHARS_PER_TOKEN)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WordTokenCounter;

impl TokenCounter for WordTokenCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

pub fn counter_for(kind: TokenCounterKind) -> Box<dyn TokenCounter> {
    match kind {
        TokenCounterKind::Chars => Box::new(CharTokenCounter),
        TokenCounterKind::Words => Box::new(WordTokenCounter),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptContext {
    /// Included results, in retrieval order.
    pub chunks: Vec<RetrievalResult>,
    pub tokens_used: usize,
}

impl PromptContext {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.chunks.iter().map(|c| c.text.as_str()).collect()
    }
}

/// Greedy selection in the given order. Stops at the first result whose cost
/// would push the running total past `budget`; later, smaller results are not
/// considered.
pub fn select_context(
    results: &[RetrievalResult],
    budget: usize,
    counter: &dyn TokenCounter,
) -> PromptContext {
    let mut ctx = PromptContext::default();
    for r in results {
        let cost = counter.count(&r.text);
        if ctx.tokens_used + cost > budget {
            tracing::debug!(
                vector_id = r.vector_id,
                cost,
                used = ctx.tokens_used,
                budget,
                "context budget reached"
            );
            break;
        }
        ctx.tokens_used += cost;
        ctx.chunks.push(r.clone());
    }
    ctx
}

/// Texts-only form of [`select_context`].
pub fn select(results: &[RetrievalResult], budget: usize, counter: &dyn TokenCounter) -> Vec<String> {
    select_context(results, budget, counter)
        .chunks
        .into_iter()
        .map(|c| c.text)
        .collect()
}
