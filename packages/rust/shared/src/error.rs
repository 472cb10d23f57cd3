//! Error types for SiteForge.
//!
//! Library crates use [`SiteForgeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for configuration, brief handling, and provider plumbing.
#[derive(Debug, thiserror::Error)]
pub enum SiteForgeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A brief failed validation (schema, enum membership, length rules).
    #[error("invalid brief: {message}")]
    InvalidBrief { message: String },

    /// Network/HTTP error talking to an external provider.
    #[error("network error: {0}")]
    Network(String),

    /// JSON/TOML (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SiteForgeError>;

impl SiteForgeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a brief validation error from any displayable message.
    pub fn invalid_brief(msg: impl Into<String>) -> Self {
        Self::InvalidBrief {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = SiteForgeError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = SiteForgeError::invalid_brief("projectName must be at least 2 characters");
        assert!(err.to_string().starts_with("invalid brief:"));
        assert!(err.to_string().contains("projectName"));
    }
}
