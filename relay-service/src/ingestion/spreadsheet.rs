//! Spreadsheet extraction (XLSX and CSV).

use std::path::Path;

use calamine::{Data, Reader, Xlsx, XlsxError, open_workbook};
use tracing::debug;

use crate::error::ProcessingError;

/// Extract the first worksheet of an XLSX workbook: one line per row, cells
/// separated by tabs.
pub fn extract_xlsx(path: &Path) -> Result<String, ProcessingError> {
    let mut workbook: Xlsx<_> =
        open_workbook(path).map_err(|e: XlsxError| ProcessingError::extraction("xlsx", e))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ProcessingError::extraction("xlsx", "workbook has no worksheets"))?
        .map_err(|e| ProcessingError::extraction("xlsx", e))?;

    let mut text = String::new();
    for row in range.rows() {
        let cells: Vec<String> = row.iter().map(cell_text).collect();
        let used = cells
            .iter()
            .rposition(|c| !c.is_empty())
            .map_or(0, |last| last + 1);
        text.push_str(&cells[..used].join("\t"));
        text.push('\n');
    }

    debug!(
        rows = range.height(),
        columns = range.width(),
        "XLSX worksheet extracted"
    );

    Ok(text)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

/// Extract a CSV file. The first row is treated as the header; every data
/// row becomes one line with its values joined by a space.
///
/// Fields are decoded as lossy UTF-8, so legacy-encoded exports still yield
/// text.
pub fn extract_csv(path: &Path) -> Result<String, ProcessingError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| ProcessingError::extraction("csv", e))?;

    let mut text = String::new();
    let mut rows = 0usize;
    for record in reader.byte_records() {
        let record = record.map_err(|e| ProcessingError::extraction("csv", e))?;
        let fields: Vec<_> = record.iter().map(String::from_utf8_lossy).collect();
        text.push_str(&fields.join(" "));
        text.push('\n');
        rows += 1;
    }

    debug!(rows, "CSV extracted");

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use zip::write::SimpleFileOptions;

    const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <sheets>
    <sheet name="Inventory" sheetId="1" r:id="rId1"/>
    <sheet name="Other" sheetId="2" r:id="rId2"/>
  </sheets>
</workbook>"#;

    const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet2.xml"/>
</Relationships>"#;

    const SHEET1: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData>
    <row r="1">
      <c r="A1" t="inlineStr"><is><t>item</t></is></c>
      <c r="B1" t="inlineStr"><is><t>count</t></is></c>
    </row>
    <row r="2">
      <c r="A2" t="inlineStr"><is><t>bolts</t></is></c>
      <c r="B2"><v>42</v></c>
    </row>
  </sheetData>
</worksheet>"#;

    const SHEET2: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData>
    <row r="1"><c r="A1" t="inlineStr"><is><t>hidden second sheet</t></is></c></row>
  </sheetData>
</worksheet>"#;

    const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
  <Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
  <Override PartName="/xl/worksheets/sheet2.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
</Types>"#;

    const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#;

    fn build_xlsx() -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        let mut zip = zip::ZipWriter::new(file.reopen().unwrap());
        let options = SimpleFileOptions::default();
        for (name, body) in [
            ("[Content_Types].xml", CONTENT_TYPES),
            ("_rels/.rels", ROOT_RELS),
            ("xl/workbook.xml", WORKBOOK),
            ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
            ("xl/worksheets/sheet1.xml", SHEET1),
            ("xl/worksheets/sheet2.xml", SHEET2),
        ] {
            zip.start_file(name, options).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
        file
    }

    #[test]
    fn test_extract_xlsx_first_sheet_only() {
        let file = build_xlsx();
        let text = extract_xlsx(file.path()).unwrap();

        assert_eq!(text, "item\tcount\nbolts\t42\n");
        assert!(!text.contains("hidden second sheet"));
    }

    #[test]
    fn test_extract_xlsx_rejects_garbage() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"PK but not really").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            extract_xlsx(file.path()),
            Err(ProcessingError::Extraction { .. })
        ));
    }

    #[test]
    fn test_extract_csv_skips_header() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"name,role\nAda,engineer\nGrace,admiral\n")
            .unwrap();
        file.flush().unwrap();

        let text = extract_csv(file.path()).unwrap();
        assert_eq!(text, "Ada engineer\nGrace admiral\n");
    }

    #[test]
    fn test_extract_csv_ragged_rows_and_quotes() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"a,b,c\n1,\"two, quoted\"\n4,5,6,7\n").unwrap();
        file.flush().unwrap();

        let text = extract_csv(file.path()).unwrap();
        assert_eq!(text, "1 two, quoted\n4 5 6 7\n");
    }

    #[test]
    fn test_extract_csv_latin1_bytes() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"name,city\nJos\xe9,Montr\xe9al\n").unwrap();
        file.flush().unwrap();

        let text = extract_csv(file.path()).unwrap();
        assert_eq!(text, "Jos\u{FFFD} Montr\u{FFFD}al\n");
    }
}
