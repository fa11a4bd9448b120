//! Error types for the edgequake-any2md library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Any2MdError`]: **Fatal** for one request; the input cannot be
//!   resolved, no converter exists, the converter failed, or the result
//!   cannot be persisted. The orchestrator turns these into a failure-shaped
//!   [`crate::output::CanonicalResult`]; the persistence stage returns them
//!   as `Err`.
//!
//! * [`ItemError`]: **Non-fatal**; a single image or extra file could not
//!   be written, but the main document is fine. Collected into
//!   [`crate::output::PersistedOutput::skipped`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-any2md library.
#[derive(Debug, Error)]
pub enum Any2MdError {
    // ── Resolution errors ─────────────────────────────────────────────────
    /// No type token could be derived from the input and declared hints.
    #[error("Could not determine the file type of '{name}'")]
    UnresolvableType { name: String },

    /// A type token was derived but no converter handles it.
    #[error("Unsupported file type: {token}")]
    UnsupportedFileType { token: String },

    /// Still no converter after every lookup attempt.
    #[error("No converter available for '{token}' after {attempts} attempts")]
    ConverterNotFound { token: String, attempts: usize },

    /// Buffer inputs carry no path, so the caller must name them.
    #[error("originalFileName is required when converting an in-memory buffer")]
    MissingFileName,

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Input file exists but could not be read.
    #[error("Failed to read input '{path}': {source}")]
    InputReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// The converter rejected the content during validation.
    #[error("Invalid {kind} content in '{name}'")]
    ValidationFailed { kind: String, name: String },

    /// Input exceeds the converter's declared maximum size.
    #[error("'{name}' is {size} bytes; the {kind} converter accepts at most {max} bytes")]
    FileTooLarge {
        kind: String,
        name: String,
        size: usize,
        max: usize,
    },

    // ── Registry errors ───────────────────────────────────────────────────
    /// The registry could not be assembled. The next call retries.
    #[error("Converter registry initialisation failed: {0}")]
    RegistryInit(String),

    // ── Converter errors ──────────────────────────────────────────────────
    /// A converter failed; `kind` is the upper-cased type token.
    #[error("{kind} conversion failed: {reason}")]
    ConversionFailed { kind: String, reason: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Persistence errors ────────────────────────────────────────────────
    /// A field without any sane default was missing from a save request.
    #[error("Missing required field for saving: {0}")]
    MissingField(&'static str),

    /// Could not create the output directory.
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write the main Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Any2MdError {
    /// Wrap a converter's internal error with the uniform type prefix.
    pub fn conversion_failed(kind: &str, reason: impl std::fmt::Display) -> Self {
        Any2MdError::ConversionFailed {
            kind: kind.to_uppercase(),
            reason: reason.to_string(),
        }
    }
}

/// A non-fatal error for a single image or extra output file.
///
/// The save continues; the error is reported in
/// [`crate::output::PersistedOutput::skipped`].
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// Image payload was not valid base64 / data-URL.
    #[error("Image '{path}': could not decode payload: {detail}")]
    ImageDecodeFailed { path: String, detail: String },

    /// Image bytes could not be written.
    #[error("Image '{path}': write failed: {detail}")]
    ImageWriteFailed { path: String, detail: String },

    /// An image or file path escapes the output directory.
    #[error("'{path}' is not a relative path inside the output directory")]
    UnsafePath { path: String },

    /// An extra (multi-file mode) document could not be written.
    #[error("File '{path}': write failed: {detail}")]
    FileWriteFailed { path: String, detail: String },
}
