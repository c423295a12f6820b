/// Exact reply the model is told to give when the context lacks the answer.
/// Also returned directly when retrieval finds nothing usable.
pub const UNKNOWN_ANSWER: &str = "I don't know.";

pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

pub const SYSTEM_MARKER: &str = "<|system|>";
pub const CONTEXT_MARKER: &str = "<|context|>";
pub const USER_MARKER: &str = "<|user|>";
pub const ASSISTANT_MARKER: &str = "<|assistant|>";

pub const ROLE_MARKERS: [&str; 4] = [SYSTEM_MARKER, CONTEXT_MARKER, USER_MARKER, ASSISTANT_MARKER];

/// Markers that end generation: anything after them is the model starting a new turn.
pub const DEFAULT_STOP: [&str; 3] = [USER_MARKER, SYSTEM_MARKER, CONTEXT_MARKER];

pub fn default_stop_sequences() -> Vec<String> {
    DEFAULT_STOP.iter().map(|s| s.to_string()).collect()
}

/// Render the grounded-answer prompt. Pure: same inputs, same bytes.
pub fn build_prompt(system_instructions: &str, context: &[&str], query: &str) -> String {
    let context_block = context
        .iter()
        .map(|c| c.trim())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);
    let system = system_instructions.trim();
    let query = query.trim();

    format!(
        r#"{SYSTEM_MARKER}
{system}

Rules (non-negotiable):
1) Answer ONLY from the context below. Do not invent facts.
2) If the context does not contain the answer, reply exactly: {UNKNOWN_ANSWER}
3) Keep the answer short and factual.
{CONTEXT_MARKER}
{context_block}
{USER_MARKER}
{query}
{ASSISTANT_MARKER}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_is_deterministic_and_grounded() {
        let a = build_prompt("Be helpful.", &["Course X teaches Python.", "Course Y teaches Java."], "What does Course X teach?");
        let b = build_prompt("Be helpful.", &["Course X teaches Python.", "Course Y teaches Java."], "What does Course X teach?");
        assert_eq!(a, b);
        assert!(a.contains("Course X teaches Python.\n\n---\n\nCourse Y teaches Java."));
        assert!(a.contains("reply exactly: I don't know."));
        assert!(a.trim_end().ends_with(ASSISTANT_MARKER));
    }

    #[test]
    fn grounding_clause_survives_empty_context() {
        let p = build_prompt("", &[], "anything?");
        assert!(p.contains("Answer ONLY from the context below"));
        assert!(p.contains(&format!("{CONTEXT_MARKER}\n\n{USER_MARKER}")));
    }
}
