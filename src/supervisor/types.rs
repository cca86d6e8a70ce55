// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Backend lifecycle state and the runtime status snapshot.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ApprovalMode;

// ============================================================================
// Subsystem Status
// ============================================================================

/// Lifecycle status of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubsystemStatus {
    #[default]
    NotStarted,
    Starting,
    Ready,
    Failed,
    Stopped,
}

impl SubsystemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for SubsystemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one backend, owned by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SubsystemState {
    pub status: SubsystemStatus,
    /// Failure or shutdown error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_time: Option<DateTime<Utc>>,
}

impl SubsystemState {
    pub fn is_ready(&self) -> bool {
        self.status == SubsystemStatus::Ready
    }

    pub(crate) fn starting(&mut self) {
        self.status = SubsystemStatus::Starting;
        self.error = None;
        self.start_time = Some(Utc::now());
        self.ready_time = None;
    }

    pub(crate) fn ready(&mut self) {
        self.status = SubsystemStatus::Ready;
        self.ready_time = Some(Utc::now());
    }

    pub(crate) fn failed(&mut self, error: impl Into<String>) {
        self.status = SubsystemStatus::Failed;
        self.error = Some(error.into());
    }

    pub(crate) fn disabled(&mut self) {
        self.status = SubsystemStatus::NotStarted;
        self.error = Some("disabled".to_string());
    }

    /// Mark stopped. A shutdown error replaces any earlier error.
    pub(crate) fn stopped(&mut self, error: Option<String>) {
        self.status = SubsystemStatus::Stopped;
        if error.is_some() {
            self.error = error;
        }
    }

    /// Time from start to ready, in milliseconds.
    pub fn startup_ms(&self) -> Option<i64> {
        match (self.start_time, self.ready_time) {
            (Some(start), Some(ready)) => Some((ready - start).num_milliseconds()),
            _ => None,
        }
    }
}

// ============================================================================
// Runtime Status
// ============================================================================

/// Read-only snapshot returned by
/// [`RuntimeSupervisor::status`](super::RuntimeSupervisor::status).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeStatus {
    pub workspace: PathBuf,
    pub read_only: bool,
    pub approval_mode: ApprovalMode,
    pub lsp: SubsystemState,
    pub acp: SubsystemState,
    pub trace_entries: usize,
}

impl RuntimeStatus {
    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        format!(
            "lsp={} acp={} mode={} read_only={}",
            self.lsp.status, self.acp.status, self.approval_mode, self.read_only
        )
    }
}
