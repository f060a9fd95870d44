//! Source loading, PDF validation, and directory discovery.

use super::types::{DocumentSource, ExtractionError};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const PDF_MAGIC: &[u8] = b"%PDF-";

impl DocumentSource {
    /// Identifier recorded in element provenance.
    ///
    /// Paths use their file name; unnamed uploads fall back to a short content digest so that
    /// the same bytes always map to the same identifier.
    pub fn display_name(&self) -> String {
        match self {
            Self::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            Self::Bytes {
                name: Some(name), ..
            } if !name.trim().is_empty() => name.trim().to_string(),
            Self::Bytes { data, .. } => format!("upload-{}", content_digest(data)),
        }
    }

    /// Read the document and verify that it is a PDF.
    pub async fn load_pdf(&self) -> Result<Vec<u8>, ExtractionError> {
        let source_name = self.display_name();
        let data = match self {
            Self::Path(path) => {
                if !has_pdf_extension(path) {
                    return Err(ExtractionError::UnsupportedInput {
                        source_name,
                        reason: "expected a .pdf file".into(),
                    });
                }
                tokio::fs::read(path)
                    .await
                    .map_err(|error| ExtractionError::Io {
                        source_name: source_name.clone(),
                        error,
                    })?
            }
            Self::Bytes { data, .. } => data.clone(),
        };

        ensure_pdf_bytes(&source_name, &data)?;
        Ok(data)
    }
}

/// Reject payloads that do not start with the PDF header.
pub fn ensure_pdf_bytes(source_name: &str, data: &[u8]) -> Result<(), ExtractionError> {
    if data.is_empty() {
        return Err(ExtractionError::UnsupportedInput {
            source_name: source_name.to_string(),
            reason: "file is empty".into(),
        });
    }
    // Some writers emit a BOM or whitespace before the header; PDF readers tolerate up to
    // 1024 leading bytes.
    let window = &data[..data.len().min(1024)];
    if !window
        .windows(PDF_MAGIC.len())
        .any(|candidate| candidate == PDF_MAGIC)
    {
        return Err(ExtractionError::UnsupportedInput {
            source_name: source_name.to_string(),
            reason: "missing %PDF- header".into(),
        });
    }
    Ok(())
}

/// Expand a file or directory path into the PDF sources it contains, sorted by path.
///
/// A single file is returned as-is (validation happens at extraction time so the caller gets a
/// typed `UnsupportedInput`); directories are walked recursively for `*.pdf`.
pub fn collect_pdf_sources(path: &Path) -> std::io::Result<Vec<DocumentSource>> {
    if path.is_file() {
        return Ok(vec![DocumentSource::Path(path.to_path_buf())]);
    }
    if !path.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("path does not exist: {}", path.display()),
        ));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(error) => {
                tracing::warn!(error = %error, "Skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && has_pdf_extension(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();

    tracing::debug!(dir = %path.display(), pdfs = files.len(), "Collected PDF sources");
    Ok(files.into_iter().map(DocumentSource::Path).collect())
}

fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

fn content_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hex::encode(hasher.finalize());
    digest[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_pdf_bytes() {
        let error = ensure_pdf_bytes("notes.txt", b"hello world").unwrap_err();
        assert!(matches!(error, ExtractionError::UnsupportedInput { .. }));
        assert!(ensure_pdf_bytes("doc.pdf", b"%PDF-1.7\n...").is_ok());
        assert!(ensure_pdf_bytes("empty.pdf", b"").is_err());
    }

    #[test]
    fn unnamed_uploads_get_stable_digest_names() {
        let a = DocumentSource::Bytes {
            name: None,
            data: b"%PDF-1.4 a".to_vec(),
        };
        let b = DocumentSource::Bytes {
            name: Some("  ".into()),
            data: b"%PDF-1.4 a".to_vec(),
        };
        assert_eq!(a.display_name(), b.display_name());
        assert!(a.display_name().starts_with("upload-"));
    }

    #[tokio::test]
    async fn path_sources_require_pdf_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, b"%PDF-1.4").expect("write");
        let error = DocumentSource::Path(file).load_pdf().await.unwrap_err();
        assert!(matches!(error, ExtractionError::UnsupportedInput { .. }));
    }

    #[test]
    fn directory_walk_finds_nested_pdfs_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("nested")).expect("mkdir");
        std::fs::write(dir.path().join("b.pdf"), b"%PDF-1.4").expect("write");
        std::fs::write(dir.path().join("nested/a.PDF"), b"%PDF-1.4").expect("write");
        std::fs::write(dir.path().join("readme.md"), b"# hi").expect("write");

        let sources = collect_pdf_sources(dir.path()).expect("walk");
        let names: Vec<String> = sources.iter().map(DocumentSource::display_name).collect();
        assert_eq!(names, vec!["b.pdf".to_string(), "a.PDF".to_string()]);
    }
}
