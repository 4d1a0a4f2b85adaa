//! ZIP archive extraction.
//!
//! Entries are unpacked into a scratch directory and each one is dispatched
//! by its file extension, so an archive may hold any mix of supported formats
//! (including further archives, up to the configured depth).

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::ProcessingError;

use super::{DocumentFormat, IngestionService};

/// Metadata directories written by archivers, never user content
const IGNORED_PREFIXES: &[&str] = &["__MACOSX/"];

/// Extract and concatenate the text of every supported entry.
///
/// `depth` counts this archive, so the outermost archive is depth 1. Every
/// byte unpacked here or in a nested archive is taken from `unpack_budget`.
pub fn extract_zip(
    ingestion: &IngestionService,
    path: &Path,
    depth: usize,
    unpack_budget: &mut u64,
) -> Result<String, ProcessingError> {
    let limits = ingestion.limits();
    if depth > limits.max_archive_depth {
        return Err(ProcessingError::extraction(
            "zip",
            format!(
                "archives nested deeper than {} levels",
                limits.max_archive_depth
            ),
        ));
    }

    let file = File::open(path).map_err(ProcessingError::Io)?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .map_err(|e| ProcessingError::extraction("zip", e))?;

    if archive.len() > limits.max_archive_entries {
        return Err(ProcessingError::extraction(
            "zip",
            format!(
                "archive has {} entries (max {})",
                archive.len(),
                limits.max_archive_entries
            ),
        ));
    }

    let scratch = tempfile::Builder::new()
        .prefix("archive-")
        .tempdir_in(ingestion.scratch_dir())
        .map_err(ProcessingError::Io)?;

    let mut unpacked: Vec<(PathBuf, PathBuf, DocumentFormat)> = Vec::new();
    let mut seen: HashSet<PathBuf> = HashSet::new();

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| ProcessingError::extraction("zip", e))?;

        if entry.is_dir() {
            continue;
        }

        let Some(relative) = entry.enclosed_name() else {
            warn!(entry = %entry.name(), "Skipping archive entry with unsafe path");
            continue;
        };

        let name = relative.to_string_lossy().replace('\\', "/");
        if IGNORED_PREFIXES.iter().any(|p| name.starts_with(p)) {
            continue;
        }

        let Some(format) = DocumentFormat::from_path(&relative) else {
            warn!(entry = %name, "Skipping unsupported archive entry");
            continue;
        };

        // `a.txt`, `./a.txt` and `a//a.txt`-style aliases land on one file.
        let destination = scratch.path().join(&relative);
        if !seen.insert(destination.clone()) {
            warn!(entry = %name, "Skipping duplicate archive entry");
            continue;
        }

        let remaining = *unpack_budget;
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).map_err(ProcessingError::Io)?;
        }
        let mut output = File::create(&destination).map_err(ProcessingError::Io)?;
        let written = io::copy(&mut (&mut entry).take(remaining.saturating_add(1)), &mut output)
            .map_err(ProcessingError::Io)?;

        if written > remaining {
            return Err(ProcessingError::FileTooLarge {
                max: limits.max_archive_unpacked_bytes,
            });
        }
        *unpack_budget -= written;

        unpacked.push((relative, destination, format));
    }

    unpacked.sort_by(|a, b| a.0.cmp(&b.0));

    let mut content = String::new();
    let mut extracted = 0usize;
    for (relative, destination, format) in &unpacked {
        match ingestion.extract_nested(destination, *format, depth, unpack_budget) {
            Ok(text) => {
                content.push_str(&text);
                content.push('\n');
                extracted += 1;
            }
            Err(e @ ProcessingError::FileTooLarge { .. }) => return Err(e),
            Err(e) => {
                warn!(
                    entry = %relative.display(),
                    format = %format,
                    error = %e,
                    "Skipping archive entry that could not be extracted"
                );
            }
        }
    }

    debug!(
        entries = archive.len(),
        candidates = unpacked.len(),
        extracted,
        depth,
        "ZIP archive extracted"
    );

    if extracted == 0 {
        return Err(ProcessingError::EmptyDocument {
            format: "zip".to_string(),
        });
    }

    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimitsConfig;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(body).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    fn extract(
        ingestion: &IngestionService,
        bytes: &[u8],
    ) -> Result<String, ProcessingError> {
        ingestion.extract_bytes(bytes, Some("bundle.zip"), DocumentFormat::Zip)
    }

    #[test]
    fn test_mixed_entries_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let ingestion = IngestionService::new(LimitsConfig::default(), dir.path().to_path_buf());

        let bytes = zip_bytes(&[
            ("b/data.json", br#"{"k":"v"}"#),
            ("a-notes.txt", b"first file"),
            ("picture.png", b"\x89PNG"),
            ("__MACOSX/._a-notes.txt", b"resource fork"),
            ("broken.json", b"{"),
        ]);

        let text = extract(&ingestion, &bytes).unwrap();
        assert_eq!(text, "first file\n{\n  \"k\": \"v\"\n}\n");

        // Scratch files and directories are gone afterwards.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_nested_archive_within_depth() {
        let dir = tempfile::tempdir().unwrap();
        let ingestion = IngestionService::new(LimitsConfig::default(), dir.path().to_path_buf());

        let inner = zip_bytes(&[("inner.txt", b"from the inside")]);
        let outer = zip_bytes(&[("outer.txt", b"outside"), ("nested.zip", &inner)]);

        let text = extract(&ingestion, &outer).unwrap();
        assert!(text.contains("from the inside"));
        assert!(text.contains("outside"));
    }

    #[test]
    fn test_nesting_beyond_depth_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let limits = LimitsConfig {
            max_archive_depth: 1,
            ..LimitsConfig::default()
        };
        let ingestion = IngestionService::new(limits, dir.path().to_path_buf());

        let inner = zip_bytes(&[("inner.txt", b"too deep")]);
        let outer = zip_bytes(&[("outer.txt", b"shallow"), ("nested.zip", &inner)]);

        let text = extract(&ingestion, &outer).unwrap();
        assert_eq!(text, "shallow\n");
    }

    #[test]
    fn test_archive_without_supported_entries() {
        let dir = tempfile::tempdir().unwrap();
        let ingestion = IngestionService::new(LimitsConfig::default(), dir.path().to_path_buf());

        let bytes = zip_bytes(&[("image.png", b"\x89PNG"), ("tool.exe", b"MZ")]);
        match extract(&ingestion, &bytes) {
            Err(ProcessingError::EmptyDocument { format }) => assert_eq!(format, "zip"),
            other => panic!("expected empty document, got {:?}", other),
        }
    }

    #[test]
    fn test_entry_limits() {
        let dir = tempfile::tempdir().unwrap();
        let limits = LimitsConfig {
            max_archive_entries: 1,
            ..LimitsConfig::default()
        };
        let ingestion = IngestionService::new(limits, dir.path().to_path_buf());
        let bytes = zip_bytes(&[("a.txt", b"a"), ("b.txt", b"b")]);
        assert!(matches!(
            extract(&ingestion, &bytes),
            Err(ProcessingError::Extraction { .. })
        ));

        let limits = LimitsConfig {
            max_archive_unpacked_bytes: 8,
            ..LimitsConfig::default()
        };
        let ingestion = IngestionService::new(limits, dir.path().to_path_buf());
        let bytes = zip_bytes(&[("big.txt", b"more than eight bytes")]);
        assert!(matches!(
            extract(&ingestion, &bytes),
            Err(ProcessingError::FileTooLarge { max: 8 })
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_not_a_zip() {
        let dir = tempfile::tempdir().unwrap();
        let ingestion = IngestionService::new(LimitsConfig::default(), dir.path().to_path_buf());
        assert!(matches!(
            extract(&ingestion, b"not a zip at all"),
            Err(ProcessingError::Extraction { .. })
        ));
    }

    #[test]
    fn test_unpack_budget_shared_with_nested_archives() {
        let dir = tempfile::tempdir().unwrap();
        let limits = LimitsConfig {
            max_archive_unpacked_bytes: 1000,
            ..LimitsConfig::default()
        };
        let ingestion = IngestionService::new(limits, dir.path().to_path_buf());

        let body = [b'x'; 900];
        let inner = zip_bytes(&[("inner.txt", &body)]);
        assert!(inner.len() < 200);
        let outer = zip_bytes(&[
            ("one.zip", &inner),
            ("two.zip", &inner),
            ("three.zip", &inner),
            ("four.zip", &inner),
            ("five.zip", &inner),
        ]);

        assert!(matches!(
            extract(&ingestion, &outer),
            Err(ProcessingError::FileTooLarge { max: 1000 })
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_duplicate_entry_paths_extracted_once() {
        let dir = tempfile::tempdir().unwrap();
        let ingestion = IngestionService::new(LimitsConfig::default(), dir.path().to_path_buf());

        let bytes = zip_bytes(&[("dup.txt", b"first copy"), ("./dup.txt", b"second copy")]);

        let text = extract(&ingestion, &bytes).unwrap();
        assert_eq!(text, "first copy\n");
    }
}
