//! Turns an uploaded file into document units.
//!
//! PDFs yield one unit per page (1-based page numbers); text files yield a
//! single unit and must be valid UTF-8.
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{DocumentUnit, FileType};

pub fn load(path: &Path, file_type: FileType) -> Result<Vec<DocumentUnit>> {
    let units = match file_type {
        FileType::Pdf => load_pdf(path)?,
        FileType::Text => vec![load_text(path)?],
    };
    tracing::debug!(path = %path.display(), %file_type, units = units.len(), "loaded document");
    Ok(units)
}

/// File name used to tag chunks, e.g. `report.pdf`.
pub fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

fn load_text(path: &Path) -> Result<DocumentUnit> {
    let bytes = fs::read(path).map_err(|e| Error::decode(path, e))?;
    let text = String::from_utf8(bytes).map_err(|e| {
        Error::decode(path, format!("invalid UTF-8 at byte {}", e.utf8_error().valid_up_to()))
    })?;
    Ok(DocumentUnit { text, page: None })
}

fn load_pdf(path: &Path) -> Result<Vec<DocumentUnit>> {
    let doc = lopdf::Document::load(path).map_err(|e| Error::decode(path, e))?;
    let mut units = Vec::new();
    for page in doc.get_pages().into_keys() {
        let text = doc
            .extract_text(&[page])
            .map_err(|e| Error::decode(path, format!("page {page}: {e}")))?;
        units.push(DocumentUnit { text, page: Some(page) });
    }
    if units.is_empty() {
        return Err(Error::decode(path, "PDF has no pages"));
    }
    Ok(units)
}
