use cqa_core::normalize::collapse_whitespace;

use crate::answer::prompts::{ASSISTANT_MARKER, DEFAULT_STOP, ROLE_MARKERS};

/// End-of-sequence tokens some local models leak into the response body.
const LEAKED_TOKENS: [&str; 2] = ["</s>", "<s>"];

/// Clean a raw generation: cut at the first turn marker the model emitted,
/// strip leftover role and end-of-sequence tokens, collapse whitespace.
pub fn postprocess_answer(raw: &str) -> String {
    let mut body = raw.trim_start();
    if let Some(rest) = body.strip_prefix(ASSISTANT_MARKER) {
        body = rest;
    }
    let cut = DEFAULT_STOP
        .iter()
        .filter_map(|m| body.find(m))
        .min()
        .unwrap_or(body.len());
    let mut text = body[..cut].to_string();
    for tok in ROLE_MARKERS.iter().chain(LEAKED_TOKENS.iter()) {
        text = text.replace(tok, " ");
    }
    collapse_whitespace(&text)
}

/// Whether the model declined to answer from the given context.
pub fn is_unknown_answer(answer: &str) -> bool {
    let a = answer
        .trim()
        .trim_end_matches(|c: char| c == '.' || c == '!')
        .to_lowercase()
        .replace('\u{2019}', "'");
    a == "i don't know" || a == "i do not know" || a.starts_with("i don't know,")
}
