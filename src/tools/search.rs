// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Line-oriented text search capability.
//!
//! Produces `file:line:content` hits. [`RipgrepSearcher`] shells out to `rg`;
//! [`WalkSearcher`] walks the tree with `walkdir` and matches with `regex`
//! for machines without ripgrep.

use async_trait::async_trait;
use globset::{Glob, GlobMatcher};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use walkdir::{DirEntry, WalkDir};

#[cfg(feature = "telemetry")]
use tracing::{debug, instrument};

use crate::config::SearchBackend;
use crate::error::ToolError;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Directories never searched by the built-in walker.
const SKIP_DIRS: &[&str] = &[".git", "node_modules", "target", "__pycache__", ".venv", "dist", "build"];

/// A single matching line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub file: PathBuf,
    /// 1-indexed line number.
    pub line: u32,
    pub content: String,
}

impl SearchHit {
    /// Parse one `file:line:content` line.
    pub fn parse(raw: &str) -> Option<Self> {
        let (file, rest) = raw.split_once(':')?;
        let (line, content) = rest.split_once(':')?;
        let line = line.parse().ok()?;
        Some(Self {
            file: PathBuf::from(file),
            line,
            content: content.to_string(),
        })
    }
}

impl std::fmt::Display for SearchHit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.content)
    }
}

/// Options for a search.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub case_insensitive: bool,
    pub max_results: usize,
    /// Optional glob filter on file names (e.g. `*.py`).
    pub glob: Option<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            case_insensitive: false,
            max_results: crate::config::DEFAULT_SEARCH_MAX_RESULTS,
            glob: None,
        }
    }
}

impl SearchOptions {
    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    pub fn with_glob(mut self, glob: impl Into<String>) -> Self {
        self.glob = Some(glob.into());
        self
    }
}

/// Searches files for a regular expression.
#[async_trait]
pub trait TextSearcher: Send + Sync {
    fn name(&self) -> &str;

    /// Search `root` (a directory or a single file). No matches is `Ok(vec![])`.
    async fn search(
        &self,
        pattern: &str,
        root: &Path,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, ToolError>;
}

/// Pick a searcher for the configured backend.
pub fn text_searcher_for(backend: SearchBackend) -> Arc<dyn TextSearcher> {
    match backend {
        SearchBackend::Ripgrep => Arc::new(RipgrepSearcher),
        SearchBackend::Builtin => Arc::new(WalkSearcher),
        SearchBackend::Auto => {
            if RipgrepSearcher::is_available() {
                Arc::new(RipgrepSearcher)
            } else {
                Arc::new(WalkSearcher)
            }
        }
    }
}

fn validate(pattern: &str, root: &Path, options: &SearchOptions) -> Result<(), ToolError> {
    if pattern.trim().is_empty() {
        return Err(ToolError::InvalidInput("pattern must not be empty".to_string()));
    }
    if options.max_results == 0 {
        return Err(ToolError::InvalidInput(
            "max_results must be greater than zero".to_string(),
        ));
    }
    if !root.exists() {
        return Err(ToolError::FileNotFound(root.display().to_string()));
    }
    Ok(())
}

// ============================================================================
// ripgrep
// ============================================================================

/// [`TextSearcher`] that runs `rg`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RipgrepSearcher;

impl RipgrepSearcher {
    /// Check whether `rg` can be executed.
    pub fn is_available() -> bool {
        std::process::Command::new("rg")
            .arg("--version")
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl TextSearcher for RipgrepSearcher {
    fn name(&self) -> &str {
        "ripgrep"
    }

    #[cfg_attr(feature = "telemetry", instrument(skip(self, options), fields(matches)))]
    async fn search(
        &self,
        pattern: &str,
        root: &Path,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, ToolError> {
        validate(pattern, root, options)?;

        let mut command = Command::new("rg");
        command
            .arg("--line-number")
            .arg("--with-filename")
            .arg("--no-heading")
            .arg("--color")
            .arg("never")
            .arg("--no-messages");

        if options.case_insensitive {
            command.arg("-i");
        }
        if let Some(ref glob) = options.glob {
            command.arg("--glob").arg(glob);
        }

        command.arg("--regexp").arg(pattern).arg("--").arg(root);

        let output = timeout(COMMAND_TIMEOUT, command.output())
            .await
            .map_err(|_| ToolError::Timeout(COMMAND_TIMEOUT.as_millis() as u64))?
            .map_err(|e| {
                ToolError::ExecutionFailed(format!("Failed to run rg: {e}. Ensure ripgrep is installed."))
            })?;

        let hits = match output.status.code() {
            Some(0) => parse_results(&output.stdout, options.max_results),
            Some(1) => Vec::new(),
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(ToolError::ExecutionFailed(format!("rg failed: {stderr}")));
            }
        };

        #[cfg(feature = "telemetry")]
        {
            tracing::Span::current().record("matches", hits.len());
            debug!(matches = hits.len(), "ripgrep search complete");
        }

        Ok(hits)
    }
}

fn parse_results(stdout: &[u8], limit: usize) -> Vec<SearchHit> {
    let mut results = Vec::new();

    for line in stdout.split(|byte| *byte == b'\n') {
        if line.is_empty() {
            continue;
        }
        let Ok(text) = std::str::from_utf8(line) else {
            continue;
        };
        if let Some(hit) = SearchHit::parse(text.trim_end_matches('\r')) {
            results.push(hit);
            if results.len() >= limit {
                break;
            }
        }
    }

    results
}

// ============================================================================
// Built-in walker
// ============================================================================

/// [`TextSearcher`] over `walkdir` + `regex`, skipping hidden and vendored
/// directories and non-UTF-8 files.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkSearcher;

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIP_DIRS.contains(&name.as_ref())
}

fn walk_search(
    pattern: &str,
    root: &Path,
    options: &SearchOptions,
) -> Result<Vec<SearchHit>, ToolError> {
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(options.case_insensitive)
        .build()
        .map_err(|e| ToolError::InvalidInput(format!("Invalid pattern: {e}")))?;

    let glob: Option<GlobMatcher> = match options.glob {
        Some(ref g) => Some(
            Glob::new(g)
                .map_err(|e| ToolError::InvalidInput(format!("Invalid glob pattern: {e}")))?
                .compile_matcher(),
        ),
        None => None,
    };

    let mut hits = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file());

    'files: for entry in walker {
        if let Some(ref glob) = glob {
            if !glob.is_match(entry.file_name()) {
                continue;
            }
        }
        let Ok(content) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        for (idx, line) in content.lines().enumerate() {
            if regex.is_match(line) {
                hits.push(SearchHit {
                    file: entry.path().to_path_buf(),
                    line: idx as u32 + 1,
                    content: line.to_string(),
                });
                if hits.len() >= options.max_results {
                    break 'files;
                }
            }
        }
    }

    Ok(hits)
}

#[async_trait]
impl TextSearcher for WalkSearcher {
    fn name(&self) -> &str {
        "builtin"
    }

    async fn search(
        &self,
        pattern: &str,
        root: &Path,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, ToolError> {
        validate(pattern, root, options)?;

        let pattern = pattern.to_string();
        let root = root.to_path_buf();
        let options = options.clone();
        tokio::task::spawn_blocking(move || walk_search(&pattern, &root, &options))
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("Search task failed: {e}")))?
    }
}
