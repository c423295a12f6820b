use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::{into_document_map, DocumentMap};
use crate::domain::Document;
use crate::error::{codes, AppError};

/// Accepted scraper output layouts.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScrapedPayload {
    /// `{ "url": "cleaned text" }`
    Flat(DocumentMap),
    /// `{ "url": ["paragraph", "paragraph"] }`
    Paragraphs(std::collections::BTreeMap<String, Vec<String>>),
    /// `[ { "source_id": "...", "text": "..." } ]`
    Records(Vec<Document>),
}

pub fn parse_scraped_json(raw: &str) -> Result<DocumentMap, AppError> {
    let payload: ScrapedPayload = serde_json::from_str(raw).map_err(|e| {
        AppError::new(codes::INGEST_DECODE_FAILED, "Failed to decode scraped documents JSON")
            .with_details(e.to_string())
    })?;
    Ok(match payload {
        ScrapedPayload::Flat(map) => map,
        ScrapedPayload::Paragraphs(map) => map
            .into_iter()
            .map(|(id, paras)| {
                let text = paras
                    .iter()
                    .map(|p| p.trim())
                    .filter(|p| !p.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n\n");
                (id, text)
            })
            .collect(),
        ScrapedPayload::Records(docs) => into_document_map(docs),
    })
}

pub fn load_json_file(path: &Path) -> Result<DocumentMap, AppError> {
    let raw = fs::read_to_string(path).map_err(|e| {
        AppError::io(codes::INGEST_READ_FAILED, "Failed to read documents file", path, e)
    })?;
    parse_scraped_json(&raw).map_err(|e| {
        let details = format!("path={}; {}", path.display(), e.details.as_deref().unwrap_or(""));
        e.with_details(details)
    })
}
