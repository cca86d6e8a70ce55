// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the Codi runtime.
//!
//! Each concern gets its own `thiserror` enum. Public runtime entry points do
//! not return these directly: they convert them into the `error` string of a
//! typed result so callers can always inspect partial progress. Only
//! construction-time misconfiguration surfaces as `Err`.

use thiserror::Error;

/// Failure taxonomy for runtime operations.
///
/// These values are rendered into the `error` field of
/// [`ActionResult`](crate::orchestrator::ActionResult),
/// [`CodeQueryResult`](crate::router::CodeQueryResult) and
/// [`DelegationResult`](crate::delegate::DelegationResult).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// A backend is absent or not ready. Triggers fallback or read-only mode.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The operation is blocked because the action backend is not available.
    #[error("Read-only mode: {0}")]
    ReadOnly(String),

    /// Steps still need approval before they can be applied.
    #[error("Approval required: {pending} step(s) still pending")]
    ApprovalRequired { pending: usize },

    /// A single step failed while being applied.
    #[error("Step {step_id} failed: {message}")]
    ActionApplication { step_id: String, message: String },

    /// A post-condition did not hold after a step was applied.
    #[error("Verification failed for step {step_id}: {message}")]
    VerificationFailure { step_id: String, message: String },

    /// A delegated task did not finish in time.
    #[error("Subagent timed out after {0}s")]
    DelegationTimeout(f64),

    /// A delegation limit was hit.
    #[error("Subagent limit reached: {limit_name}={limit}")]
    DelegationLimitExceeded { limit_name: &'static str, limit: usize },

    /// The query could not be mapped to an intent.
    #[error("Could not determine intent for query: {0}")]
    UnknownIntent(String),
}

impl RuntimeError {
    /// Check if the caller can recover by retrying after taking action
    /// (approving steps, adjusting limits, waiting for a backend).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ApprovalRequired { .. }
                | Self::DelegationTimeout(_)
                | Self::DelegationLimitExceeded { .. }
                | Self::BackendUnavailable(_)
        )
    }
}

/// Errors from the capability layer (shell, text search, filesystem).
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Security violation: {0}")]
    SecurityViolation(String),
}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::FileNotFound(err.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl ConfigError {
    /// Create an invalid-value error.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Errors raised by a delegated agent's `chat` call.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Agent request failed: {0}")]
    RequestFailed(String),

    #[error("Maximum steps exceeded: {0}")]
    MaxStepsExceeded(u32),

    #[error("User cancelled operation")]
    Cancelled,
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;
