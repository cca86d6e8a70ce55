// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Action sessions and their launcher.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::AcpError;
use crate::config::ApprovalMode;

/// What happened to a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    PlanCreated,
    StepApproved,
    StepRejected,
    StepApplied,
    StepFailed,
    StepVerified,
}

/// One entry in a session's tool-call log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: SessionEventKind,
    pub plan_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    /// Tool name (`create_file`, `shell`, ...).
    pub tool: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl SessionEvent {
    pub fn new(kind: SessionEventKind, plan_id: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            plan_id: plan_id.into(),
            step_id: None,
            tool: tool.into(),
            params: serde_json::Value::Null,
            detail: None,
        }
    }

    pub fn with_step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// An open action-execution session.
#[async_trait]
pub trait ActionSession: Send + Sync {
    fn id(&self) -> &str;

    /// Approval mode the session was opened with.
    fn approval_mode(&self) -> ApprovalMode;

    /// Append to the tool-call log.
    fn record(&self, event: SessionEvent);

    /// Copy of the tool-call log, oldest first.
    fn events(&self) -> Vec<SessionEvent>;

    async fn close(&self) -> Result<(), AcpError>;
}

/// Opens action sessions.
#[async_trait]
pub trait ActionBackendLauncher: Send + Sync {
    async fn launch(
        &self,
        workspace: &Path,
        approval_mode: ApprovalMode,
    ) -> Result<Arc<dyn ActionSession>, AcpError>;
}

/// In-process session that keeps its log in memory.
pub struct LocalSession {
    id: String,
    workspace: PathBuf,
    approval_mode: ApprovalMode,
    events: Mutex<Vec<SessionEvent>>,
    closed: AtomicBool,
}

impl LocalSession {
    pub fn new(workspace: impl Into<PathBuf>, approval_mode: ApprovalMode) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workspace: workspace.into(),
            approval_mode,
            events: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActionSession for LocalSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn approval_mode(&self) -> ApprovalMode {
        self.approval_mode
    }

    fn record(&self, event: SessionEvent) {
        if self.is_closed() {
            warn!(session = %self.id, tool = %event.tool, "Dropping event for closed session");
            return;
        }
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    fn events(&self) -> Vec<SessionEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn close(&self) -> Result<(), AcpError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(AcpError::SessionClosed(self.id.clone()));
        }
        debug!(session = %self.id, "Action session closed");
        Ok(())
    }
}

/// Launcher for [`LocalSession`]s.
///
/// Launch fails when the workspace is not an existing directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSessionLauncher;

#[async_trait]
impl ActionBackendLauncher for LocalSessionLauncher {
    async fn launch(
        &self,
        workspace: &Path,
        approval_mode: ApprovalMode,
    ) -> Result<Arc<dyn ActionSession>, AcpError> {
        let meta = tokio::fs::metadata(workspace).await.map_err(|e| {
            AcpError::StartupFailed(format!("workspace {} unavailable: {e}", workspace.display()))
        })?;
        if !meta.is_dir() {
            return Err(AcpError::StartupFailed(format!(
                "workspace {} is not a directory",
                workspace.display()
            )));
        }
        Ok(Arc::new(LocalSession::new(workspace, approval_mode)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_local_session_log_is_append_only() {
        let session = LocalSession::new("/tmp", ApprovalMode::Scoped);
        session.record(SessionEvent::new(SessionEventKind::PlanCreated, "p1", "plan"));
        session.record(
            SessionEvent::new(SessionEventKind::StepApplied, "p1", "create_file")
                .with_step("s1")
                .with_detail("+3 lines"),
        );

        let events = session.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].step_id.as_deref(), Some("s1"));
        assert_eq!(session.approval_mode(), ApprovalMode::Scoped);
    }

    #[tokio::test]
    async fn test_closed_session_drops_events() {
        let session = LocalSession::new("/tmp", ApprovalMode::Manual);
        session.close().await.unwrap();
        session.record(SessionEvent::new(SessionEventKind::StepApplied, "p1", "shell"));

        assert!(session.events().is_empty());
        assert!(session.close().await.is_err());
    }

    #[tokio::test]
    async fn test_launcher_requires_directory() {
        let dir = tempdir().unwrap();
        let session = LocalSessionLauncher
            .launch(dir.path(), ApprovalMode::Manual)
            .await
            .unwrap();
        assert_eq!(session.approval_mode(), ApprovalMode::Manual);

        let missing = dir.path().join("missing");
        let err = LocalSessionLauncher
            .launch(&missing, ApprovalMode::Manual)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AcpError::StartupFailed(_)));
    }
}
