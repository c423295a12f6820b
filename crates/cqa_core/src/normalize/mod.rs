pub mod text;

pub use text::{clean_text, clean_text_keep_paragraphs, collapse_whitespace, normalize_newlines};
