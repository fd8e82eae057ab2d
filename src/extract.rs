//! Raw text extraction by file type.
//!
//! PDFs are extracted page by page, with `--- Page N ---` markers between
//! pages; pages with no extractable text are skipped with a warning rather
//! than failing the document. `pdf_extract` parses the whole document in
//! one call, so a malformed page fails the document as a whole — skipping
//! applies to empty pages only. Plain text files are read as-is. Any other
//! type is an [`PipelineError::UnsupportedType`] error.

use std::path::Path;

use tracing::warn;

use crate::error::PipelineError;

/// Extract raw text from a document file.
///
/// `file_type` is the normalized lowercase extension including the dot
/// (e.g. `".pdf"`), as stored on the document row.
pub fn extract_text(path: &Path, file_type: &str) -> Result<String, PipelineError> {
    match file_type {
        ".pdf" => extract_pdf(path),
        ".txt" => std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Extraction(format!("{}: {}", path.display(), e))),
        other => Err(PipelineError::UnsupportedType(other.to_string())),
    }
}

fn extract_pdf(path: &Path) -> Result<String, PipelineError> {
    let bytes = std::fs::read(path)
        .map_err(|e| PipelineError::Extraction(format!("{}: {}", path.display(), e)))?;

    let pages = pdf_extract::extract_text_from_mem_by_pages(&bytes)
        .map_err(|e| PipelineError::Extraction(format!("PDF extraction failed: {}", e)))?;

    let mut text = String::new();
    for (page_num, page) in pages.iter().enumerate() {
        if page.trim().is_empty() {
            warn!(page = page_num + 1, path = %path.display(), "no text on page, skipping");
            continue;
        }
        text.push_str(&format!("\n--- Page {} ---\n", page_num + 1));
        text.push_str(page);
    }

    Ok(text.trim().to_string())
}
