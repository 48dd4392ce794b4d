// src/error.rs

use thiserror::Error;

/// Core error types for VMaaS
#[derive(Error, Debug)]
pub enum Error {
    /// Input cannot be split into name, epoch, version, release and arch
    #[error("Malformed package identifier: {0}")]
    MalformedNevra(String),

    /// A lookup pattern failed to compile
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// A query arrived before the first snapshot was published
    #[error("Cache is not ready yet")]
    CacheNotReady,

    /// Raw dataset records cannot form a consistent snapshot
    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Dump decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unexpected fault while executing a query
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the caller is at fault (bad identifier or pattern)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::MalformedNevra(_) | Error::InvalidPattern { .. })
    }

    /// HTTP-equivalent status code for the transport layer
    pub fn status_code(&self) -> u16 {
        match self {
            Error::MalformedNevra(_) | Error::InvalidPattern { .. } => 400,
            Error::CacheNotReady => 503,
            _ => 500,
        }
    }

    /// Message safe to hand back to a caller.
    ///
    /// Server-side faults are reduced to a generic message; their detail
    /// belongs in the logs only.
    pub fn public_message(&self) -> String {
        match self {
            Error::MalformedNevra(_) | Error::InvalidPattern { .. } | Error::CacheNotReady => {
                self.to_string()
            }
            _ => "Internal server error".to_string(),
        }
    }
}

/// Result type alias using VMaaS's Error type
pub type Result<T> = std::result::Result<T, Error>;
