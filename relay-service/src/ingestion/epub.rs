//! EPUB document extraction.

use std::path::Path;

use tracing::debug;

use crate::error::ProcessingError;

use super::html::html_to_text;

/// Extract the text of an EPUB file, spine documents in reading order,
/// chapters separated by a blank line.
pub fn extract_epub(path: &Path) -> Result<String, ProcessingError> {
    let mut archive =
        epub::doc::EpubDoc::new(path).map_err(|e| ProcessingError::extraction("epub", e))?;

    let mut chapters = Vec::new();

    loop {
        if let Some((content, _mime)) = archive.get_current_str() {
            let text = html_to_text(content.as_bytes());
            let text = text.trim();
            if !text.is_empty() {
                chapters.push(text.to_string());
            }
        }

        if !archive.go_next() {
            break;
        }
    }

    debug!(chapters = chapters.len(), "EPUB extracted");

    Ok(chapters.join("\n\n"))
}
