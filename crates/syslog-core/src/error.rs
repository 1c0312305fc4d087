//! Error types for the syslog collector
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for collector operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the syslog collector
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Socket and file I/O errors
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No factory registered under the requested module name
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    /// A registered factory failed to build its module
    #[error("Module construction failed ({module}): {message}")]
    ModuleConstruction {
        /// Module name
        module: String,
        /// Error message
        message: String,
    },

    /// A parser module rejected a message
    #[error("Parse error ({module}): {message}")]
    Parse {
        /// Module name
        module: String,
        /// Error message
        message: String,
    },

    /// A storer module failed to persist a batch
    #[error("Store error ({module}): {message}")]
    Store {
        /// Module name
        module: String,
        /// Error message
        message: String,
    },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a "module not found" error
    pub fn module_not_found(name: impl Into<String>) -> Self {
        Self::ModuleNotFound(name.into())
    }

    /// Create a module construction error
    pub fn construction(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModuleConstruction {
            module: module.into(),
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            module: module.into(),
            message: message.into(),
        }
    }

    /// Create a store error
    pub fn store(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            module: module.into(),
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
