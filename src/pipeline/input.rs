//! Input validation: make sure a source path is a readable PDF.
//!
//! pdfium's own error for a non-PDF file is an opaque "format error"; checking
//! the `%PDF` magic bytes first gives the failure log a meaningful reason.

use crate::error::ExtractionError;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Check existence, read permission and PDF magic bytes.
pub fn validate_pdf(path: &Path) -> Result<(), ExtractionError> {
    if !path.exists() {
        return Err(ExtractionError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
                return Err(ExtractionError::NotAPdf {
                    path: path.to_path_buf(),
                    magic,
                });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ExtractionError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(ExtractionError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    debug!("Validated PDF: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn accepts_pdf_magic() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("CN1A.pdf");
        std::fs::write(&p, b"%PDF-1.7\n...").unwrap();
        assert!(validate_pdf(&p).is_ok());
    }

    #[test]
    fn rejects_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = validate_pdf(&dir.path().join("absent.pdf")).unwrap_err();
        assert!(matches!(err, ExtractionError::FileNotFound { .. }));
    }

    #[test]
    fn rejects_non_pdf_and_truncated_files() {
        let dir = TempDir::new().unwrap();
        let html = dir.path().join("error.pdf");
        std::fs::write(&html, b"<html>404</html>").unwrap();
        assert!(matches!(
            validate_pdf(&html),
            Err(ExtractionError::NotAPdf { magic, .. }) if &magic == b"<htm"
        ));

        let empty = dir.path().join("empty.pdf");
        std::fs::write(&empty, b"").unwrap();
        assert!(matches!(validate_pdf(&empty), Err(ExtractionError::NotAPdf { .. })));
    }
}
