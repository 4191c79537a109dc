//! Error types for annodemo.
//!
//! Library crates use [`AnnoDemoError`] via `thiserror`.
//! App crates (cli/tui) wrap this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all annodemo operations.
#[derive(Debug, thiserror::Error)]
pub enum AnnoDemoError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP transport error while downloading or calling the backend.
    #[error("network error: {0}")]
    Network(String),

    /// The backend answered with a non-success status.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Credential exchange failed or no credentials were configured.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Content or response parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (state mismatch, failed checks, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Citation detector failure.
    #[error("citation detection error: {0}")]
    Citation(String),

    /// `annotate`/`validate` was run before `load`.
    #[error("dataset '{dataset}' has not been loaded yet; run `load` first")]
    NotLoaded { dataset: String },

    /// `load` was run before `download`.
    #[error("dataset '{dataset}' has not been downloaded yet; run `download` first")]
    NotDownloaded { dataset: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AnnoDemoError>;

impl AnnoDemoError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
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
        let err = AnnoDemoError::config("missing backend url");
        assert_eq!(err.to_string(), "config error: missing backend url");

        let err = AnnoDemoError::Api {
            status: 404,
            message: "resource not found".into(),
        };
        assert_eq!(err.to_string(), "API error (HTTP 404): resource not found");

        let err = AnnoDemoError::NotLoaded {
            dataset: "citizens-united".into(),
        };
        assert!(err.to_string().contains("run `load` first"));
    }
}
