//! Document sources for the build pipeline.
//!
//! Every loader yields a [`DocumentMap`]: `source_id -> text`, ordered by
//! `source_id` so downstream chunk order (and therefore vector ids) is stable.

use std::collections::BTreeMap;
use std::path::Path;

use crate::domain::Document;
use crate::error::{codes, AppError};

pub mod csv_table;
pub mod scraped_json;
pub mod text_dir;

pub type DocumentMap = BTreeMap<String, String>;

/// Load documents from a scraper JSON file, a CSV table, or a directory of text files.
pub fn load_documents(path: &Path) -> Result<DocumentMap, AppError> {
    if path.is_dir() {
        return text_dir::load_text_dir(path);
    }
    if !path.exists() {
        return Err(AppError::new(codes::INGEST_READ_FAILED, "Document source does not exist")
            .with_details(format!("path={}", path.display())));
    }
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase());
    match ext.as_deref() {
        Some("csv") => csv_table::load_csv_file(path),
        Some("json") => scraped_json::load_json_file(path),
        _ => Err(AppError::new(
            codes::INGEST_READ_FAILED,
            "Unsupported document source; expected a directory, .json or .csv",
        )
        .with_details(format!("path={}", path.display()))),
    }
}

/// Collect documents into a map. Empty ids are dropped; on duplicate ids the first wins.
pub fn into_document_map(docs: impl IntoIterator<Item = Document>) -> DocumentMap {
    let mut out = DocumentMap::new();
    for d in docs {
        let id = d.source_id.trim();
        if id.is_empty() {
            tracing::warn!("skipping document with empty source_id");
            continue;
        }
        if out.contains_key(id) {
            tracing::warn!(source_id = id, "duplicate source_id; keeping first occurrence");
            continue;
        }
        out.insert(id.to_string(), d.text);
    }
    out
}
