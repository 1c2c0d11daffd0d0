//! Error types for the recibo-core library.

use thiserror::Error;

/// Main error type for the recibo library.
#[derive(Error, Debug)]
pub enum ReciboError {
    /// Document extraction (OCR service) error.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Field structuring (LLM service) error.
    #[error("structuring error: {0}")]
    Structuring(#[from] StructuringError),

    /// Spreadsheet export error.
    #[error("export error: {0}")]
    Export(#[from] ExportError),

    /// Batch was rejected before processing.
    #[error("batch error: {0}")]
    Batch(#[from] BatchError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by the document extraction client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// Network failure, timeout, throttling or a server-side error. Worth retrying.
    #[error("transient extraction failure: {0}")]
    Transient(String),

    /// The document or the credentials were rejected. Retrying will not help.
    #[error("extraction failed: {0}")]
    Permanent(String),
}

/// Errors returned by the field structuring client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuringError {
    /// The model answered with something that is not a JSON object.
    #[error("malformed model response: {0}")]
    BadShape(String),

    /// The model answered with an object that has none of the required fields.
    #[error("model response has no required field (expected one of: {})", .missing.join(", "))]
    Incomplete { missing: Vec<String> },

    /// Network failure, timeout, throttling or a server-side error. Worth retrying.
    #[error("transient structuring failure: {0}")]
    Transient(String),

    /// The request was rejected (bad key, bad model, bad request).
    #[error("structuring failed: {0}")]
    Permanent(String),
}

/// Why a single file of a batch did not produce a record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FileError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Structuring(#[from] StructuringError),

    /// The batch was cancelled before this file finished.
    #[error("cancelled")]
    Cancelled,

    /// The worker processing this file stopped unexpectedly.
    #[error("worker aborted: {0}")]
    Aborted(String),
}

/// Errors that reject a whole batch up front.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    /// More files than the configured maximum.
    #[error("batch has {count} files, the maximum is {max}")]
    TooManyFiles { count: usize, max: usize },
}

/// Errors raised while writing spreadsheets.
#[derive(Error, Debug)]
pub enum ExportError {
    /// The xlsx writer failed.
    #[error("xlsx error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    /// Writing the output file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration and credential errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required secret is not set in the environment.
    #[error("missing environment variable {0}")]
    MissingSecret(String),

    /// A configuration value is out of range or malformed.
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    /// The HTTP client could not be built.
    #[error("HTTP client setup failed: {0}")]
    Http(String),
}

/// Result type for the recibo library.
pub type Result<T> = std::result::Result<T, ReciboError>;
