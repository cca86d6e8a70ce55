// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for code-intelligence operations.

use thiserror::Error;

/// Errors a code-intelligence backend can report.
#[derive(Error, Debug)]
pub enum LspError {
    /// Backend failed to start.
    #[error("Failed to start code-intelligence backend: {0}")]
    StartupFailed(String),

    /// Backend is not ready for requests.
    #[error("Code-intelligence backend not ready: {0}")]
    NotReady(String),

    /// Request timed out.
    #[error("Code-intelligence request timed out after {0}ms")]
    Timeout(u64),

    /// Backend returned an error response.
    #[error("Code-intelligence error response: {message}")]
    ServerError { code: i32, message: String },

    /// Invalid response from the backend.
    #[error("Invalid code-intelligence response: {0}")]
    InvalidResponse(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Language not supported: {0}")]
    UnsupportedLanguage(String),

    /// The backend does not implement this request.
    #[error("Capability not supported: {0}")]
    UnsupportedCapability(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl LspError {
    /// Create a server error from an error response.
    pub fn server_error(code: i32, message: impl Into<String>) -> Self {
        Self::ServerError {
            code,
            message: message.into(),
        }
    }

    /// Check if the error is transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::NotReady(_))
    }

    /// Check if the backend simply lacks the capability.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedCapability(_) | Self::UnsupportedLanguage(_)
        )
    }
}

/// Result type for code-intelligence operations.
pub type LspResult<T> = std::result::Result<T, LspError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error() {
        let err = LspError::server_error(-32601, "Method not found");
        match err {
            LspError::ServerError { code, message } => {
                assert_eq!(code, -32601);
                assert_eq!(message, "Method not found");
            }
            _ => panic!("Expected ServerError"),
        }
    }

    #[test]
    fn test_classification() {
        assert!(LspError::Timeout(5000).is_retryable());
        assert!(!LspError::FileNotFound("/foo".to_string()).is_retryable());
        assert!(LspError::UnsupportedCapability("workspace/symbol".to_string()).is_unsupported());
        assert!(!LspError::NotReady("starting".to_string()).is_unsupported());
    }
}
