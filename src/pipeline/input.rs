//! Input discovery: find the PDFs of a folder and validate each one.
//!
//! pdfium gives poor diagnostics for non-PDF input, so every file is checked
//! for the `%PDF` magic bytes before it is handed over.

use crate::error::KgError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// List `*.pdf` files (case-insensitive extension) directly inside `dir`, in
/// lexical path order.
pub fn discover_pdfs(dir: &Path) -> Result<Vec<PathBuf>, KgError> {
    if !dir.is_dir() {
        return Err(KgError::NotFound {
            path: dir.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|e| KgError::io(dir, e))?;
    let mut pdfs = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| KgError::io(dir, e))?.path();
        let is_pdf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if is_pdf && path.is_file() {
            pdfs.push(path);
        }
    }
    pdfs.sort();

    info!("Found {} PDFs in {}", pdfs.len(), dir.display());
    Ok(pdfs)
}

/// Validate existence and PDF magic bytes of a local file.
pub fn check_pdf(path: &Path) -> Result<(), KgError> {
    if !path.exists() {
        return Err(KgError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let mut file = std::fs::File::open(path).map_err(|e| KgError::io(path, e))?;
    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
        return Err(KgError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }

    debug!("Validated PDF: {}", path.display());
    Ok(())
}
