// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from files.
//!
//! Handles loading runtime configuration from JSON and YAML files.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::types::RuntimeConfigFile;

/// Workspace config file names to search for (in order).
pub const CONFIG_FILES: &[&str] = &[
    ".codi/runtime.json",
    ".codi/runtime.yaml",
    ".codi/runtime.yml",
];

/// Global config directory name.
pub const GLOBAL_CONFIG_DIR: &str = ".codi";

/// Global config file name.
pub const GLOBAL_CONFIG_FILE: &str = "runtime.json";

/// Get the global config directory path.
pub fn get_global_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR))
}

/// Get the global config file path.
pub fn get_global_config_path() -> Option<PathBuf> {
    get_global_config_dir().map(|dir| dir.join(GLOBAL_CONFIG_FILE))
}

/// Load global configuration from ~/.codi/runtime.json.
pub fn load_global_config() -> Result<Option<RuntimeConfigFile>, ConfigError> {
    let path = match get_global_config_path() {
        Some(p) => p,
        None => return Ok(None),
    };

    if !path.exists() {
        return Ok(None);
    }

    load_config_file(&path).map(Some)
}

/// Load workspace configuration, taking the first file of [`CONFIG_FILES`]
/// that exists.
pub fn load_workspace_config(workspace_root: &Path) -> Result<Option<RuntimeConfigFile>, ConfigError> {
    for filename in CONFIG_FILES {
        let path = workspace_root.join(filename);
        if path.exists() {
            return load_config_file(&path).map(Some);
        }
    }
    Ok(None)
}

/// Load a configuration file (JSON or YAML).
pub fn load_config_file(path: &Path) -> Result<RuntimeConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    match extension.to_lowercase().as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(ConfigError::from),
        _ => serde_json::from_str(&content).map_err(ConfigError::from),
    }
}

/// Save workspace configuration to `.codi/runtime.json`.
pub fn save_workspace_config(
    workspace_root: &Path,
    config: &RuntimeConfigFile,
) -> Result<PathBuf, ConfigError> {
    let path = workspace_root.join(CONFIG_FILES[0]);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, content)?;

    Ok(path)
}
