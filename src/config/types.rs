// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! [`RuntimeConfigFile`] is the partial, on-disk shape (every field optional,
//! JSON or YAML). [`RuntimeConfig`] is the fully resolved configuration the
//! runtime components are constructed from.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::delegate::DelegationConfig;
use crate::error::ConfigError;

/// Default startup timeout for a backend.
pub const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 30_000;

/// Fixed timeout for shell steps.
pub const DEFAULT_SHELL_TIMEOUT_MS: u64 = 60_000;

/// Default cap on text-search hits per query.
pub const DEFAULT_SEARCH_MAX_RESULTS: usize = 200;

// ============================================================================
// Approval Mode
// ============================================================================

/// Approval policy for mutating steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalMode {
    /// Approve everything. Also the explicit override that permits writes
    /// when the action backend is absent.
    Auto,
    /// Approve everything except dangerous steps (delete, shell).
    Scoped,
    /// Approve nothing automatically.
    #[default]
    Manual,
}

impl ApprovalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Scoped => "scoped",
            Self::Manual => "manual",
        }
    }

    /// Whether this mode overrides read-only mode.
    pub fn is_auto_override(&self) -> bool {
        matches!(self, Self::Auto)
    }
}

impl FromStr for ApprovalMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "scoped" => Ok(Self::Scoped),
            "manual" => Ok(Self::Manual),
            other => Err(ConfigError::invalid(
                "approvalMode",
                format!("expected auto, scoped or manual, got '{other}'"),
            )),
        }
    }
}

impl std::fmt::Display for ApprovalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which text-search implementation to use for router fallbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackend {
    /// Use ripgrep when it is installed, the built-in walker otherwise.
    #[default]
    Auto,
    Ripgrep,
    Builtin,
}

// ============================================================================
// On-disk (partial) configuration
// ============================================================================

/// Runtime configuration as stored in `.codi/runtime.json` or YAML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfigFile {
    /// Workspace directory (created on start if missing).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<PathBuf>,

    /// Approval policy for mutating steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_mode: Option<ApprovalMode>,

    /// Code-intelligence backend settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lsp: Option<BackendSettingsPartial>,

    /// Action-execution backend settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acp: Option<BackendSettingsPartial>,

    /// Timeout for shell steps in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell_timeout_ms: Option<u64>,

    /// Text search settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchSettingsPartial>,

    /// Subagent delegation limits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegation: Option<DelegationConfigPartial>,

    /// Runtime trace settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<TraceSettingsPartial>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendSettingsPartial {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startup_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSettingsPartial {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<SearchBackend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationConfigPartial {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_subagents: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_total_subagents: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_timeout_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_timeout_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps_per_subagent: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceSettingsPartial {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

// ============================================================================
// Resolved configuration
// ============================================================================

/// Settings for one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendSettings {
    pub enabled: bool,
    pub startup_timeout_ms: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            startup_timeout_ms: DEFAULT_STARTUP_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSettings {
    pub backend: SearchBackend,
    pub max_results: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            backend: SearchBackend::Auto,
            max_results: DEFAULT_SEARCH_MAX_RESULTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceSettings {
    pub enabled: bool,
    /// Where the trace is written on stop. `None` keeps it in memory only.
    pub path: Option<PathBuf>,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    pub workspace: PathBuf,
    pub approval_mode: ApprovalMode,
    pub lsp: BackendSettings,
    pub acp: BackendSettings,
    pub shell_timeout_ms: u64,
    pub search: SearchSettings,
    pub delegation: DelegationConfig,
    pub trace: TraceSettings,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            approval_mode: ApprovalMode::default(),
            lsp: BackendSettings::default(),
            acp: BackendSettings::default(),
            shell_timeout_ms: DEFAULT_SHELL_TIMEOUT_MS,
            search: SearchSettings::default(),
            delegation: DelegationConfig::default(),
            trace: TraceSettings::default(),
        }
    }
}

impl RuntimeConfig {
    /// Create a config rooted at the given workspace with defaults elsewhere.
    pub fn for_workspace(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            ..Default::default()
        }
    }

    pub fn with_approval_mode(mut self, mode: ApprovalMode) -> Self {
        self.approval_mode = mode;
        self
    }

    pub fn with_acp_enabled(mut self, enabled: bool) -> Self {
        self.acp.enabled = enabled;
        self
    }

    pub fn with_trace_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.trace.path = Some(path.into());
        self
    }

    /// Check values that would make the runtime unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workspace.as_os_str().is_empty() {
            return Err(ConfigError::invalid("workspace", "must not be empty"));
        }
        if self.shell_timeout_ms == 0 {
            return Err(ConfigError::invalid("shellTimeoutMs", "must be greater than zero"));
        }
        if self.search.max_results == 0 {
            return Err(ConfigError::invalid("search.maxResults", "must be greater than zero"));
        }
        self.delegation.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approval_mode_parse() {
        assert_eq!("auto".parse::<ApprovalMode>().unwrap(), ApprovalMode::Auto);
        assert_eq!(" Scoped ".parse::<ApprovalMode>().unwrap(), ApprovalMode::Scoped);
        assert_eq!("MANUAL".parse::<ApprovalMode>().unwrap(), ApprovalMode::Manual);
        assert!("yolo".parse::<ApprovalMode>().is_err());
    }

    #[test]
    fn test_approval_mode_serde() {
        let json = serde_json::to_string(&ApprovalMode::Scoped).unwrap();
        assert_eq!(json, "\"scoped\"");
        assert!(ApprovalMode::Auto.is_auto_override());
        assert!(!ApprovalMode::Manual.is_auto_override());
    }

    #[test]
    fn test_config_file_camel_case() {
        let file: RuntimeConfigFile = serde_json::from_str(
            r#"{"approvalMode": "scoped", "acp": {"enabled": false}, "shellTimeoutMs": 5000}"#,
        )
        .unwrap();
        assert_eq!(file.approval_mode, Some(ApprovalMode::Scoped));
        assert_eq!(file.acp.unwrap().enabled, Some(false));
        assert_eq!(file.shell_timeout_ms, Some(5000));
    }

    #[test]
    fn test_validate_rejects_zero_shell_timeout() {
        let mut config = RuntimeConfig::default();
        config.shell_timeout_ms = 0;
        assert!(config.validate().is_err());
        assert!(RuntimeConfig::default().validate().is_ok());
    }
}
