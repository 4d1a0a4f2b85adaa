//! Plain text and JSON extraction.

use std::path::Path;

use crate::error::ProcessingError;

/// Read a plain text file. Invalid UTF-8 sequences are replaced rather than
/// rejected, and a leading byte-order mark is dropped.
pub fn extract_text(path: &Path) -> Result<String, ProcessingError> {
    let bytes = std::fs::read(path).map_err(ProcessingError::Io)?;
    Ok(decode_text(bytes))
}

/// Parse a JSON file and pretty-print it with two-space indentation.
pub fn extract_json(path: &Path) -> Result<String, ProcessingError> {
    let bytes = std::fs::read(path).map_err(ProcessingError::Io)?;
    let value: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(|e| ProcessingError::extraction("json", e))?;
    serde_json::to_string_pretty(&value).map_err(|e| ProcessingError::extraction("json", e))
}

pub(crate) fn decode_text(bytes: Vec<u8>) -> String {
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    };
    match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_extract_text() {
        let file = write_temp("\u{feff}line one\nline two\n".as_bytes());
        assert_eq!(extract_text(file.path()).unwrap(), "line one\nline two\n");
    }

    #[test]
    fn test_extract_text_invalid_utf8() {
        let file = write_temp(b"caf\xe9 au lait");
        let text = extract_text(file.path()).unwrap();
        assert!(text.starts_with("caf"));
        assert!(text.ends_with(" au lait"));
        assert!(text.contains('\u{fffd}'));
    }

    #[test]
    fn test_extract_json_pretty_prints_in_order() {
        let file = write_temp(br#"{"zeta":1,"alpha":[true,null]}"#);
        let text = extract_json(file.path()).unwrap();
        assert_eq!(
            text,
            "{\n  \"zeta\": 1,\n  \"alpha\": [\n    true,\n    null\n  ]\n}"
        );
    }

    #[test]
    fn test_extract_json_rejects_garbage() {
        let file = write_temp(b"{\"unterminated\": ");
        match extract_json(file.path()) {
            Err(ProcessingError::Extraction { format, .. }) => assert_eq!(format, "json"),
            other => panic!("expected extraction error, got {:?}", other),
        }
    }
}
