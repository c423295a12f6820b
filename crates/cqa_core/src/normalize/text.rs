use std::sync::OnceLock;

use regex::Regex;

fn html_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^<>]*>").expect("html tag pattern"))
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\S+@\S+\.\S+").expect("email pattern"))
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\+?\d[\d\s-]{7,}\d").expect("phone pattern"))
}

fn reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[[^\[\]]*\]").expect("reference pattern"))
}

pub fn normalize_newlines(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n")
}

/// Collapse every whitespace run (including newlines) into a single space and trim.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip scraping residue: HTML tags, e-mail addresses, phone numbers and
/// bracketed references like `[1]`. Whitespace is collapsed last.
pub fn clean_text(s: &str) -> String {
    let s = html_tag_re().replace_all(s, " ");
    let s = email_re().replace_all(&s, "");
    let s = phone_re().replace_all(&s, "");
    let s = reference_re().replace_all(&s, "");
    collapse_whitespace(&s)
}

/// Like [`clean_text`] but keeps paragraph breaks, for boundary-aware chunking.
pub fn clean_text_keep_paragraphs(s: &str) -> String {
    normalize_newlines(s)
        .split("\n\n")
        .map(clean_text)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
