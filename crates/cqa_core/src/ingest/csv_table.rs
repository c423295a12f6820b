use std::path::Path;

use super::{into_document_map, DocumentMap};
use crate::domain::Document;
use crate::error::{codes, AppError};

/// Parse a CSV table with `source_id` and `text` header columns (any order, extra columns ignored).
pub fn parse_documents_csv(raw: &str) -> Result<DocumentMap, AppError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(raw.as_bytes());

    let headers = rdr.headers().map_err(|e| {
        AppError::new(codes::INGEST_DECODE_FAILED, "Failed to read CSV headers")
            .with_details(e.to_string())
    })?
    .clone();
    let col = |name: &str| headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name));
    let (id_col, text_col) = match (col("source_id"), col("text")) {
        (Some(i), Some(t)) => (i, t),
        _ => {
            return Err(AppError::new(
                codes::INGEST_DECODE_FAILED,
                "CSV must have source_id and text columns",
            )
            .with_details(format!("headers={:?}", headers.iter().collect::<Vec<_>>())))
        }
    };

    let mut docs = Vec::new();
    for (row, rec) in rdr.records().enumerate() {
        let rec = rec.map_err(|e| {
            AppError::new(codes::INGEST_DECODE_FAILED, "Failed to read CSV row")
                .with_details(format!("row={}; err={}", row + 1, e))
        })?;
        let id = rec.get(id_col).unwrap_or("");
        let text = rec.get(text_col).unwrap_or("");
        docs.push(Document::new(id, text));
    }
    Ok(into_document_map(docs))
}

pub fn load_csv_file(path: &Path) -> Result<DocumentMap, AppError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        AppError::io(codes::INGEST_READ_FAILED, "Failed to read CSV file", path, e)
    })?;
    parse_documents_csv(&raw)
}
