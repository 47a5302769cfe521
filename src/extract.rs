//! PDF text extraction.
//!
//! Thin wrapper over pdf-extract that keeps page boundaries: citations need
//! the page a chunk came from.

use anyhow::Result;

/// Extract per-page text from PDF bytes. Pages without extractable text come
/// back as empty strings so positions keep lining up with page numbers.
pub fn pdf_pages(bytes: &[u8]) -> Result<Vec<String>> {
    pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| anyhow::anyhow!("PDF extraction failed: {}", e))
}
