//! Error types for postveil.
//!
//! This module defines all error types used throughout the postveil crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for postveil operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Rule Errors ===
    /// A rule phrase failed to compile as a regular expression.
    ///
    /// Detected when a rule set is saved, never during matching.
    #[error("invalid regex in rule '{phrase}': {source}")]
    InvalidRule {
        /// The offending rule phrase.
        phrase: String,
        /// The underlying parse error.
        #[source]
        source: Box<regex::Error>,
    },

    // === Store Errors ===
    /// The rule store could not serve a read or write.
    #[error("rule store unavailable: {message}")]
    Store {
        /// Description of what went wrong.
        message: String,
    },

    /// Failed to read or write the persisted rule document.
    #[error("failed to access rule document at {path}: {source}")]
    StoreIo {
        /// Path to the rule document.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The persisted rule document could not be decoded.
    #[error("malformed rule document at {path}: {source}")]
    StoreDecode {
        /// Path to the rule document.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },

    // === Surface Errors ===
    /// An element handle refers to a node that no longer exists.
    #[error("element is detached from the page")]
    DetachedElement,

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for postveil operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new store error.
    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create an invalid-rule error for the given phrase.
    #[must_use]
    pub fn invalid_rule(phrase: impl Into<String>, source: regex::Error) -> Self {
        Self::InvalidRule {
            phrase: phrase.into(),
            source: Box::new(source),
        }
    }

    /// Check if this error means the rule store could not be reached.
    #[must_use]
    pub fn is_store_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Store { .. } | Self::StoreIo { .. } | Self::StoreDecode { .. }
        )
    }

    /// Check if this error is a rule validation failure.
    #[must_use]
    pub fn is_invalid_rule(&self) -> bool {
        matches!(self, Self::InvalidRule { .. })
    }
}
