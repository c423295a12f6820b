use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{into_document_map, DocumentMap};
use crate::domain::Document;
use crate::error::{codes, AppError};

fn is_text_file(p: &Path) -> bool {
    matches!(
        p.extension().and_then(|s| s.to_str()),
        Some("txt") | Some("md")
    )
}

/// Symlinks are not followed, so a link back to an ancestor cannot repeat the tree.
fn collect_text_files(root: &Path) -> Result<Vec<PathBuf>, AppError> {
    let mut out = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            AppError::new(codes::INGEST_READ_FAILED, "Failed to walk document directory")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        if entry.file_type().is_file() && is_text_file(entry.path()) {
            out.push(entry.into_path());
        }
    }
    out.sort();
    Ok(out)
}

/// Each `.txt`/`.md` file becomes one document; its id is the path relative to `root`.
pub fn load_text_dir(root: &Path) -> Result<DocumentMap, AppError> {
    let mut docs = Vec::new();
    for path in collect_text_files(root)? {
        let text = fs::read_to_string(&path).map_err(|e| {
            AppError::io(codes::INGEST_READ_FAILED, "Failed to read document file", &path, e)
        })?;
        let rel = path.strip_prefix(root).unwrap_or(&path);
        let id = rel.to_string_lossy().replace('\\', "/");
        docs.push(Document::new(id, text));
    }
    Ok(into_document_map(docs))
}
