// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging.
//!
//! Handles merging configurations from different sources with proper precedence.

use std::path::PathBuf;

use super::types::{ApprovalMode, BackendSettings, RuntimeConfig, RuntimeConfigFile};

/// Environment variable that overrides the approval mode.
pub const APPROVAL_MODE_ENV: &str = "CODI_APPROVAL_MODE";

/// Environment variable that overrides the workspace directory.
pub const WORKSPACE_ENV: &str = "CODI_WORKSPACE";

/// Programmatic overrides with the highest precedence.
#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub workspace: Option<PathBuf>,
    pub approval_mode: Option<ApprovalMode>,
    pub lsp_enabled: Option<bool>,
    pub acp_enabled: Option<bool>,
    pub trace_path: Option<PathBuf>,
}

impl RuntimeOverrides {
    /// Read overrides from the environment.
    ///
    /// An unparseable approval mode is ignored with a warning rather than
    /// silently widening permissions.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var_os(name).and_then(|v| v.into_string().ok()))
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let approval_mode = var(APPROVAL_MODE_ENV).and_then(|raw| {
            match raw.parse::<ApprovalMode>() {
                Ok(mode) => Some(mode),
                Err(e) => {
                    tracing::warn!("Ignoring {}: {}", APPROVAL_MODE_ENV, e);
                    None
                }
            }
        });

        Self {
            workspace: var(WORKSPACE_ENV).map(PathBuf::from),
            approval_mode,
            ..Default::default()
        }
    }
}

/// Default configuration values.
pub fn default_config() -> RuntimeConfig {
    RuntimeConfig::default()
}

/// Merge configurations with precedence.
///
/// Precedence (highest to lowest):
/// 1. Overrides
/// 2. Workspace config (.codi/runtime.json)
/// 3. Global config (~/.codi/runtime.json)
/// 4. Default values
pub fn merge_config(
    global: Option<RuntimeConfigFile>,
    workspace: Option<RuntimeConfigFile>,
    overrides: RuntimeOverrides,
) -> RuntimeConfig {
    let mut result = default_config();

    if let Some(config) = global {
        apply_config_file(&mut result, &config);
    }

    if let Some(config) = workspace {
        apply_config_file(&mut result, &config);
    }

    apply_overrides(&mut result, &overrides);

    result
}

fn apply_backend(target: &mut BackendSettings, partial: &super::types::BackendSettingsPartial) {
    if let Some(enabled) = partial.enabled {
        target.enabled = enabled;
    }
    if let Some(timeout) = partial.startup_timeout_ms {
        target.startup_timeout_ms = timeout;
    }
}

fn apply_config_file(result: &mut RuntimeConfig, config: &RuntimeConfigFile) {
    if let Some(ref workspace) = config.workspace {
        result.workspace = workspace.clone();
    }

    if let Some(mode) = config.approval_mode {
        result.approval_mode = mode;
    }

    if let Some(ref lsp) = config.lsp {
        apply_backend(&mut result.lsp, lsp);
    }

    if let Some(ref acp) = config.acp {
        apply_backend(&mut result.acp, acp);
    }

    if let Some(timeout) = config.shell_timeout_ms {
        result.shell_timeout_ms = timeout;
    }

    if let Some(ref search) = config.search {
        if let Some(backend) = search.backend {
            result.search.backend = backend;
        }
        if let Some(max) = search.max_results {
            result.search.max_results = max;
        }
    }

    if let Some(ref delegation) = config.delegation {
        let target = &mut result.delegation;
        if let Some(v) = delegation.max_concurrent_subagents {
            target.max_concurrent_subagents = v;
        }
        if let Some(v) = delegation.max_total_subagents {
            target.max_total_subagents = v;
        }
        if let Some(v) = delegation.default_timeout_seconds {
            target.default_timeout_seconds = v;
        }
        if let Some(v) = delegation.max_timeout_seconds {
            target.max_timeout_seconds = v;
        }
        if let Some(v) = delegation.max_steps_per_subagent {
            target.max_steps_per_subagent = v;
        }
    }

    if let Some(ref trace) = config.trace {
        if let Some(enabled) = trace.enabled {
            result.trace.enabled = enabled;
        }
        if trace.path.is_some() {
            result.trace.path = trace.path.clone();
        }
    }
}

fn apply_overrides(result: &mut RuntimeConfig, overrides: &RuntimeOverrides) {
    if let Some(ref workspace) = overrides.workspace {
        result.workspace = workspace.clone();
    }
    if let Some(mode) = overrides.approval_mode {
        result.approval_mode = mode;
    }
    if let Some(enabled) = overrides.lsp_enabled {
        result.lsp.enabled = enabled;
    }
    if let Some(enabled) = overrides.acp_enabled {
        result.acp.enabled = enabled;
    }
    if overrides.trace_path.is_some() {
        result.trace.path = overrides.trace_path.clone();
    }
}
