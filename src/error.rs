//! Error types for the textbook-kg library.
//!
//! Two error types reflect two failure modes with different blast radius:
//!
//! * [`KgError`] is **fatal**: the current run cannot continue (missing input
//!   folder, corrupt PDF, an image artifact or record file that cannot be
//!   written). Downstream stages read complete files, so these propagate and
//!   halt the batch.
//!
//! * [`TransportError`] is **non-fatal**: one network attempt against the
//!   extraction endpoint failed. The extraction client retries at most once
//!   and then degrades the chunk to an empty result; the error never escapes
//!   [`crate::pipeline::llm::ExtractionClient::extract`].
//!
//! Malformed model output is not an error at all: it is repaired or replaced
//! by an empty result inside [`crate::pipeline::repair`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the textbook-kg library.
#[derive(Debug, Error)]
pub enum KgError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file or folder was not found at the given path.
    #[error("Path not found: '{path}'\nCheck the path exists and is readable.")]
    NotFound { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// pdfium could not open the document.
    #[error("PDF '{path}' could not be opened: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// pdfium failed on a specific page (text, objects or rendering).
    #[error("Page {page} of '{path}' failed: {detail}")]
    PageFailed {
        path: PathBuf,
        page: u32,
        detail: String,
    },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or place the library next to the binary."
    )]
    PdfiumBindingFailed(String),

    // ── Output errors ─────────────────────────────────────────────────────
    /// A harvested image could not be encoded or written.
    #[error("Failed to write image artifact '{path}': {source}")]
    ImageWriteFailed {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// A record file (JSONL, graph snapshot, HTML) could not be read or written.
    #[error("I/O failure on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted record line could not be decoded.
    #[error("Malformed record at '{path}' line {line}: {source}")]
    RecordDecode {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// A record could not be serialised.
    #[error("Failed to serialise record: {0}")]
    RecordEncode(#[from] serde_json::Error),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl KgError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        KgError::Io {
            path: path.into(),
            source,
        }
    }
}

/// One failed attempt against the extraction endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum TransportError {
    /// The endpoint answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The call exceeded the configured timeout.
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Connection refused, DNS failure, broken pipe and similar.
    #[error("request failed: {0}")]
    Request(String),

    /// The endpoint answered 2xx but the envelope was not the expected JSON.
    #[error("undecodable endpoint response: {0}")]
    Envelope(String),
}

impl TransportError {
    /// Diagnostic body kept in `ExtractionResult::raw_response` when every
    /// attempt failed. It parses as a JSON object without `entities` or
    /// `relations`, so validation yields an empty result.
    pub fn fallback_body(&self) -> String {
        serde_json::json!({ "error": self.to_string() }).to_string()
    }
}
