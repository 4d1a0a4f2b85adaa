//! HTML to text conversion.

use std::path::Path;

use crate::error::ProcessingError;

/// Column at which rendered HTML text is wrapped
pub const WRAP_WIDTH: usize = 130;

/// Extract readable text from an HTML file.
pub fn extract_html(path: &Path) -> Result<String, ProcessingError> {
    let bytes = std::fs::read(path).map_err(ProcessingError::Io)?;
    Ok(html_to_text(&bytes))
}

/// Render HTML markup as plain text.
pub fn html_to_text(html: &[u8]) -> String {
    html2text::from_read(html, WRAP_WIDTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_text() {
        let html = b"<html><head><title>t</title></head><body>\
            <h1>Release notes</h1><p>Fixed the parser &amp; the lexer.</p>\
            <ul><li>first</li><li>second</li></ul></body></html>";
        let text = html_to_text(html);

        assert!(text.contains("Release notes"));
        assert!(text.contains("Fixed the parser & the lexer."));
        assert!(text.contains("first"));
        assert!(text.contains("second"));
        assert!(!text.contains("<p>"));
    }

    #[test]
    fn test_html_wraps_long_lines() {
        let words = vec!["word"; 100].join(" ");
        let html = format!("<p>{}</p>", words);
        let text = html_to_text(html.as_bytes());

        assert!(text.lines().count() > 1);
        assert!(text.lines().all(|line| line.chars().count() <= WRAP_WIDTH));
    }
}
