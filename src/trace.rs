// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Append-only runtime trace.
//!
//! Every backend call, plan phase and delegation outcome can be appended to
//! a [`RuntimeTrace`]. The trace is created when the supervisor starts,
//! finalized with an end timestamp when it stops, and can be written to a
//! JSON file for replay or diffing by external tooling.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ToolError;

/// Which component produced a trace entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceCategory {
    Supervisor,
    Lsp,
    Acp,
    Router,
    Orchestrator,
    Delegator,
}

/// Outcome of a traced action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceOutcome {
    Result(serde_json::Value),
    Error(String),
}

/// One trace entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub timestamp: DateTime<Utc>,
    pub category: TraceCategory,
    pub action: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(flatten)]
    pub outcome: TraceOutcome,
    pub duration_ms: u64,
}

impl TraceEntry {
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, TraceOutcome::Error(_))
    }
}

/// Serializable trace contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceLog {
    pub id: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub entries: Vec<TraceEntry>,
}

/// Shared handle to the process-wide trace.
///
/// Cloning is cheap; all clones append to the same log. Recording is
/// synchronous and never held across an await.
#[derive(Debug, Clone)]
pub struct RuntimeTrace {
    inner: Arc<Mutex<TraceLog>>,
    enabled: bool,
}

impl Default for RuntimeTrace {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeTrace {
    /// Create an empty, enabled trace.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(TraceLog {
                id: uuid::Uuid::new_v4().to_string(),
                started_at: Utc::now(),
                ended_at: None,
                entries: Vec::new(),
            })),
            enabled: true,
        }
    }

    /// Create a trace that drops every entry.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    fn log(&self) -> MutexGuard<'_, TraceLog> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a successful action.
    pub fn record_ok(
        &self,
        category: TraceCategory,
        action: impl Into<String>,
        params: serde_json::Value,
        result: serde_json::Value,
        duration: Duration,
    ) {
        self.push(category, action.into(), params, TraceOutcome::Result(result), duration);
    }

    /// Append a failed action.
    pub fn record_err(
        &self,
        category: TraceCategory,
        action: impl Into<String>,
        params: serde_json::Value,
        error: impl Into<String>,
        duration: Duration,
    ) {
        self.push(category, action.into(), params, TraceOutcome::Error(error.into()), duration);
    }

    fn push(
        &self,
        category: TraceCategory,
        action: String,
        params: serde_json::Value,
        outcome: TraceOutcome,
        duration: Duration,
    ) {
        if !self.enabled {
            return;
        }
        let mut log = self.log();
        if log.ended_at.is_some() {
            tracing::debug!(action = %action, "Dropping trace entry recorded after finalize");
            return;
        }
        log.entries.push(TraceEntry {
            timestamp: Utc::now(),
            category,
            action,
            params,
            outcome,
            duration_ms: duration.as_millis() as u64,
        });
    }

    /// Stamp the end time. Later entries are dropped.
    pub fn finalize(&self) {
        let mut log = self.log();
        if log.ended_at.is_none() {
            log.ended_at = Some(Utc::now());
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.log().ended_at.is_some()
    }

    pub fn len(&self) -> usize {
        self.log().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current log.
    pub fn snapshot(&self) -> TraceLog {
        self.log().clone()
    }

    /// Entries for one category, in order.
    pub fn entries_for(&self, category: TraceCategory) -> Vec<TraceEntry> {
        self.log()
            .entries
            .iter()
            .filter(|e| e.category == category)
            .cloned()
            .collect()
    }

    /// Write the trace as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ToolError> {
        let snapshot = self.snapshot();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| ToolError::ExecutionFailed(format!("Failed to serialize trace: {e}")))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Read a trace previously written by [`RuntimeTrace::save`].
    pub fn load(path: &Path) -> Result<TraceLog, ToolError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| ToolError::InvalidInput(format!("Invalid trace file: {e}")))
    }
}
