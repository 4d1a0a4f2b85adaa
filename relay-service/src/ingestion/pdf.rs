//! PDF text extraction via PDFium.

use std::path::Path;

use pdfium_render::prelude::*;
use tracing::{debug, warn};

use crate::error::ProcessingError;

/// Directories searched for libpdfium before the system library paths
const PDFIUM_SEARCH_DIRS: &[&str] = &["./", "./lib/"];

/// Bind PDFium at runtime.
fn create_pdfium() -> Result<Pdfium, ProcessingError> {
    let mut last_error = None;
    for dir in PDFIUM_SEARCH_DIRS {
        match Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)) {
            Ok(bindings) => return Ok(Pdfium::new(bindings)),
            Err(e) => last_error = Some(e),
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| {
        debug!(error = ?last_error, "PDFium not found in local directories");
        ProcessingError::extraction("pdf", format!("Failed to load PDFium library: {:?}", e))
    })?;

    Ok(Pdfium::new(bindings))
}

/// Extract the text of every page, pages separated by a newline.
pub fn extract_pdf(path: &Path) -> Result<String, ProcessingError> {
    let pdfium = create_pdfium()?;

    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| ProcessingError::extraction("pdf", format!("Failed to load PDF: {:?}", e)))?;

    let mut pages = Vec::new();
    for (page_index, page) in document.pages().iter().enumerate() {
        let page_num = page_index + 1;

        let text = page.text().map_err(|e| {
            warn!(page = page_num, error = ?e, "Failed to get text object for page");
            ProcessingError::extraction(
                "pdf",
                format!("Failed to extract text from page {}: {:?}", page_num, e),
            )
        })?;

        let page_text = text.all();
        let page_text = page_text.trim();
        if !page_text.is_empty() {
            pages.push(page_text.to_string());
        }
    }

    debug!(
        pages = document.pages().len(),
        pages_with_text = pages.len(),
        "PDF text extracted"
    );

    Ok(pages.join("\n"))
}
