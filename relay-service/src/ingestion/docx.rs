//! DOCX (Office Open XML) text extraction.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::ProcessingError;

const DOCUMENT_PART: &str = "word/document.xml";

/// Extract the body text of a DOCX file, one line per paragraph.
pub fn extract_docx(path: &Path) -> Result<String, ProcessingError> {
    let file = File::open(path).map_err(ProcessingError::Io)?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .map_err(|e| ProcessingError::extraction("docx", e))?;

    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| ProcessingError::extraction("docx", format!("{}: {}", DOCUMENT_PART, e)))?
        .read_to_string(&mut xml)
        .map_err(ProcessingError::Io)?;

    document_xml_to_text(&xml)
}

/// Collect run text from WordprocessingML.
///
/// `w:t` contents are emitted verbatim, `w:tab` inside a run becomes a tab,
/// `w:br`/`w:cr` a newline, and every paragraph ends with a newline.
pub fn document_xml_to_text(xml: &str) -> Result<String, ProcessingError> {
    let mut reader = Reader::from_str(xml);
    let mut text = String::new();
    let mut in_run = false;
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:r" => in_run = true,
                b"w:t" => in_text = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:r" => in_run = false,
                b"w:t" => in_text = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" if in_run => text.push('\t'),
                b"w:br" | b"w:cr" if in_run => text.push('\n'),
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let unescaped = t
                    .unescape()
                    .map_err(|e| ProcessingError::extraction("docx", e))?;
                text.push_str(&unescaped);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ProcessingError::extraction(
                    "docx",
                    format!("malformed XML at byte {}: {}", reader.buffer_position(), e),
                ));
            }
            _ => {}
        }
    }

    Ok(text)
}
