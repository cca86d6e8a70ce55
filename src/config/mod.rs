// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module for the Codi runtime.
//!
//! Handles loading, merging, and validation of configuration from multiple sources:
//! - Global config: ~/.codi/runtime.json
//! - Workspace config: .codi/runtime.json, .codi/runtime.yaml or .codi/runtime.yml
//! - Overrides: programmatic values and `CODI_*` environment variables
//!
//! Configuration is merged with precedence (overrides > workspace > global > defaults).

mod loader;
mod merger;
mod types;

pub use loader::{
    get_global_config_dir, get_global_config_path, load_config_file, load_global_config,
    load_workspace_config, save_workspace_config, CONFIG_FILES, GLOBAL_CONFIG_DIR,
    GLOBAL_CONFIG_FILE,
};

pub use merger::{default_config, merge_config, RuntimeOverrides, APPROVAL_MODE_ENV, WORKSPACE_ENV};

pub use types::{
    ApprovalMode, BackendSettings, BackendSettingsPartial, DelegationConfigPartial,
    RuntimeConfig, RuntimeConfigFile, SearchBackend, SearchSettings, SearchSettingsPartial,
    TraceSettings, TraceSettingsPartial, DEFAULT_SEARCH_MAX_RESULTS, DEFAULT_SHELL_TIMEOUT_MS,
    DEFAULT_STARTUP_TIMEOUT_MS,
};

use crate::error::ConfigError;
use std::path::Path;

/// Load, merge and validate all configuration sources for a workspace.
///
/// When neither a config file nor an override names a workspace, the
/// directory the config was loaded from becomes the workspace.
pub fn load_config(
    workspace_root: &Path,
    overrides: RuntimeOverrides,
) -> Result<RuntimeConfig, ConfigError> {
    let global = load_global_config()?;
    let workspace = load_workspace_config(workspace_root)?;

    let names_workspace = overrides.workspace.is_some()
        || workspace.as_ref().is_some_and(|w| w.workspace.is_some());

    let mut config = merge_config(global, workspace, overrides);
    if !names_workspace {
        config.workspace = workspace_root.to_path_buf();
    } else if config.workspace.is_relative() {
        config.workspace = workspace_root.join(&config.workspace);
    }

    config.validate()?;
    Ok(config)
}
