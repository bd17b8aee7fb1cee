//! Error types and Result aliases for docindex.
//!
//! This module defines the error hierarchy used throughout the crate.
//! All public functions return `Result<T, Error>` or `Result<T>`.

use thiserror::Error;

/// Result type alias using docindex's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for docindex operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Change-detection store error.
    #[error("comparer error: {0}")]
    Comparer(#[from] ComparerError),

    /// Search index error.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// Job execution error.
    #[error("job error: {0}")]
    Job(#[from] JobError),

    /// Server/API error.
    #[error("server error: {0}")]
    Server(#[from] ServerError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Comparer store errors.
#[derive(Error, Debug)]
pub enum ComparerError {
    /// Backing file could not be read or written.
    #[error("failed to access comparer file '{path}': {reason}")]
    Access { path: String, reason: String },
}

/// Search index errors.
#[derive(Error, Debug)]
pub enum IndexError {
    /// Transport-level failure talking to the index service.
    #[error("request to index service failed: {0}")]
    Transport(String),

    /// The index service answered with an error status.
    #[error("index service returned {status} for {operation}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// Index does not exist.
    #[error("index '{0}' does not exist")]
    Missing(String),
}

/// Document decoding errors.
///
/// Never converted into [`Error`]: the pipeline drops the document and counts it.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The file could not be read.
    #[error("failed to read '{path}': {reason}")]
    Read { path: String, reason: String },

    /// The file was read but its content could not be decoded.
    #[error("unsupported or corrupt document '{path}': {reason}")]
    Format { path: String, reason: String },
}

/// Job execution errors.
#[derive(Error, Debug)]
pub enum JobError {
    /// The scan root is missing or not a directory.
    #[error("scan root '{path}' is not accessible: {reason}")]
    ScanRoot { path: String, reason: String },

    /// A pipeline stage task failed.
    #[error("pipeline stage '{stage}' failed: {reason}")]
    Stage { stage: &'static str, reason: String },
}

/// Server/API errors.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {address}: {reason}")]
    BindFailed { address: String, reason: String },

    /// Request handling error.
    #[error("request error: {0}")]
    Request(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl ComparerError {
    /// Create an access error for the given path.
    pub fn access(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        Self::Access {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }
}

impl DecodeError {
    /// Create a read error for the given path.
    pub fn read(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        Self::Read {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }

    /// Create a format error for the given path.
    pub fn format(path: &std::path::Path, reason: impl Into<String>) -> Self {
        Self::Format {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for IndexError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests;
