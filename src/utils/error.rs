// src/utils/error.rs
use thiserror::Error;

// Define specific error types for different parts of the application

/// A document that cannot be read at the byte level. The pipeline skips the
/// whole document and keeps going with the others.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF could not be parsed: {0}")]
    Pdf(String),

    #[error("PDF text extraction panicked for {0}")]
    ExtractorPanic(String),

    #[error("Document {0} has no extractable text (scanned or empty PDF?)")]
    NoText(String),
}

/// Why a single value token could not be normalized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("token '{0}' is not numeric")]
    NonNumeric(String),

    #[error("token '{0}' has malformed digit grouping")]
    MalformedGrouping(String),

    #[error("token '{0}' is marked not applicable")]
    NotApplicable(String),

    #[error("token '{0}' is too large for its unit scale")]
    OutOfRange(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error), // Automatically convert IO errors

    #[error("Document could not be loaded: {0}")]
    Document(#[from] DocumentError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Data processing failed: {0}")]
    Processing(String),
}
