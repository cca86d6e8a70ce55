// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Runtime supervisor.
//!
//! Owns the lifecycle of the two backends and the single `read_only` flag
//! every mutating component consults.
//!
//! ```text
//!                   RuntimeSupervisor::start()
//!                             │
//!              ┌──────────────┴──────────────┐   tokio::join!
//!              ▼                             ▼
//!   CodeIntelligenceLauncher       ActionBackendLauncher
//!     (startup timeout)              (startup timeout)
//!              │                             │
//!        lsp: SubsystemState         acp: SubsystemState
//!                                            │
//!             read_only = acp not Ready && approval_mode != auto
//! ```
//!
//! A backend failing to start never fails `start()`. Only a workspace that
//! cannot be created is an error.

mod types;

pub use types::{RuntimeStatus, SubsystemState, SubsystemStatus};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::acp::{ActionBackendLauncher, ActionSession};
use crate::config::{ApprovalMode, RuntimeConfig};
use crate::error::ConfigError;
use crate::lsp::{CodeIntelligence, CodeIntelligenceLauncher};
use crate::trace::{RuntimeTrace, TraceCategory};

/// Errors that prevent the supervisor from operating at all.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Workspace {path} is unusable: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A backend handle plus its lifecycle state.
struct Slot<T: ?Sized> {
    state: SubsystemState,
    handle: Option<Arc<T>>,
}

impl<T: ?Sized> Default for Slot<T> {
    fn default() -> Self {
        Self {
            state: SubsystemState::default(),
            handle: None,
        }
    }
}

/// Coordinates backend startup and exposes their status.
pub struct RuntimeSupervisor {
    config: RuntimeConfig,
    workspace: std::sync::RwLock<PathBuf>,
    lsp_launcher: Option<Arc<dyn CodeIntelligenceLauncher>>,
    acp_launcher: Option<Arc<dyn ActionBackendLauncher>>,
    lsp: RwLock<Slot<dyn CodeIntelligence>>,
    acp: RwLock<Slot<dyn ActionSession>>,
    read_only: AtomicBool,
    trace: RuntimeTrace,
}

impl RuntimeSupervisor {
    /// Create a supervisor. Backends are not launched until [`start`](Self::start).
    ///
    /// Until started the action backend is not ready, so the runtime is
    /// read-only unless the approval mode is `auto`.
    pub fn new(
        config: RuntimeConfig,
        lsp_launcher: Option<Arc<dyn CodeIntelligenceLauncher>>,
        acp_launcher: Option<Arc<dyn ActionBackendLauncher>>,
    ) -> Result<Self, SupervisorError> {
        config.validate()?;

        let trace = if config.trace.enabled {
            RuntimeTrace::new()
        } else {
            RuntimeTrace::disabled()
        };
        let read_only = !config.approval_mode.is_auto_override();

        Ok(Self {
            workspace: std::sync::RwLock::new(config.workspace.clone()),
            config,
            lsp_launcher,
            acp_launcher,
            lsp: RwLock::new(Slot::default()),
            acp: RwLock::new(Slot::default()),
            read_only: AtomicBool::new(read_only),
            trace,
        })
    }

    /// Start a [`SupervisorBuilder`].
    pub fn builder(config: RuntimeConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(config)
    }

    /// Resolve the workspace, launch both backends concurrently and compute
    /// `read_only`.
    #[cfg_attr(feature = "telemetry", instrument(skip(self), fields(workspace = %self.config.workspace.display())))]
    pub async fn start(&self) -> Result<RuntimeStatus, SupervisorError> {
        let started = Instant::now();
        let workspace = self.prepare_workspace().await?;

        tokio::join!(self.start_lsp(&workspace), self.start_acp(&workspace));

        let acp_ready = self.acp.read().await.state.is_ready();
        let read_only = !acp_ready && !self.config.approval_mode.is_auto_override();
        self.read_only.store(read_only, Ordering::SeqCst);

        let status = self.status().await;
        info!(status = %status.summary(), "Runtime started");
        self.trace.record_ok(
            TraceCategory::Supervisor,
            "start",
            json!({ "workspace": workspace.display().to_string() }),
            json!({
                "lsp": status.lsp.status,
                "acp": status.acp.status,
                "read_only": read_only,
            }),
            started.elapsed(),
        );

        Ok(status)
    }

    async fn prepare_workspace(&self) -> Result<PathBuf, SupervisorError> {
        let requested = self.config.workspace.clone();
        let workspace_error = |source| SupervisorError::Workspace {
            path: requested.clone(),
            source,
        };

        tokio::fs::create_dir_all(&requested)
            .await
            .map_err(workspace_error)?;
        let resolved = tokio::fs::canonicalize(&requested)
            .await
            .map_err(workspace_error)?;

        *self
            .workspace
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = resolved.clone();
        debug!(workspace = %resolved.display(), "Workspace resolved");
        Ok(resolved)
    }

    async fn start_lsp(&self, workspace: &Path) {
        let settings = &self.config.lsp;
        let launcher = match (&self.lsp_launcher, settings.enabled) {
            (_, false) => {
                self.lsp.write().await.state.disabled();
                debug!("Code-intelligence backend disabled");
                return;
            }
            (None, true) => {
                let mut slot = self.lsp.write().await;
                slot.state.starting();
                slot.state.failed("no code-intelligence backend configured");
                return;
            }
            (Some(launcher), true) => Arc::clone(launcher),
        };

        self.lsp.write().await.state.starting();
        let started = Instant::now();
        let limit = Duration::from_millis(settings.startup_timeout_ms);

        let outcome = match timeout(limit, launcher.launch(workspace)).await {
            Ok(Ok(handle)) => Ok(handle),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("startup timed out after {}ms", settings.startup_timeout_ms)),
        };

        let mut slot = self.lsp.write().await;
        match outcome {
            Ok(handle) => {
                info!(backend = handle.name(), "Code-intelligence backend ready");
                slot.handle = Some(handle);
                slot.state.ready();
                self.trace.record_ok(
                    TraceCategory::Lsp,
                    "start",
                    json!({}),
                    json!({ "status": "ready" }),
                    started.elapsed(),
                );
            }
            Err(error) => {
                warn!(error = %error, "Code-intelligence backend failed to start");
                self.trace
                    .record_err(TraceCategory::Lsp, "start", json!({}), &error, started.elapsed());
                slot.state.failed(error);
            }
        }
    }

    async fn start_acp(&self, workspace: &Path) {
        let settings = &self.config.acp;
        let launcher = match (&self.acp_launcher, settings.enabled) {
            (_, false) => {
                self.acp.write().await.state.disabled();
                debug!("Action backend disabled");
                return;
            }
            (None, true) => {
                let mut slot = self.acp.write().await;
                slot.state.starting();
                slot.state.failed("no action backend configured");
                return;
            }
            (Some(launcher), true) => Arc::clone(launcher),
        };

        self.acp.write().await.state.starting();
        let started = Instant::now();
        let limit = Duration::from_millis(settings.startup_timeout_ms);
        let mode = self.config.approval_mode;

        let outcome = match timeout(limit, launcher.launch(workspace, mode)).await {
            Ok(Ok(session)) => Ok(session),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("startup timed out after {}ms", settings.startup_timeout_ms)),
        };

        let mut slot = self.acp.write().await;
        match outcome {
            Ok(session) => {
                info!(session = session.id(), mode = %mode, "Action backend ready");
                self.trace.record_ok(
                    TraceCategory::Acp,
                    "start",
                    json!({ "approval_mode": mode }),
                    json!({ "session": session.id() }),
                    started.elapsed(),
                );
                slot.handle = Some(session);
                slot.state.ready();
            }
            Err(error) => {
                warn!(error = %error, "Action backend failed to start");
                self.trace.record_err(
                    TraceCategory::Acp,
                    "start",
                    json!({ "approval_mode": mode }),
                    &error,
                    started.elapsed(),
                );
                slot.state.failed(error);
            }
        }
    }

    /// Point-in-time snapshot. Calling it does not change any state.
    pub async fn status(&self) -> RuntimeStatus {
        let lsp = self.lsp.read().await.state.clone();
        let acp = self.acp.read().await.state.clone();
        RuntimeStatus {
            workspace: self.workspace(),
            read_only: self.is_read_only(),
            approval_mode: self.config.approval_mode,
            lsp,
            acp,
            trace_entries: self.trace.len(),
        }
    }

    /// Shut both backends down, finalize the trace and persist it when a
    /// path is configured. Shutdown errors are logged and recorded on the
    /// subsystem state.
    #[cfg_attr(feature = "telemetry", instrument(skip(self)))]
    pub async fn stop(&self) {
        let started = Instant::now();

        let lsp_handle = self.lsp.write().await.handle.take();
        let lsp_error = match lsp_handle {
            Some(handle) => handle.shutdown().await.err().map(|e| e.to_string()),
            None => None,
        };
        if let Some(ref error) = lsp_error {
            warn!(error = %error, "Code-intelligence backend shutdown failed");
        }
        self.lsp.write().await.state.stopped(lsp_error.clone());

        let acp_handle = self.acp.write().await.handle.take();
        let acp_error = match acp_handle {
            Some(session) => session.close().await.err().map(|e| e.to_string()),
            None => None,
        };
        if let Some(ref error) = acp_error {
            warn!(error = %error, "Action session close failed");
        }
        self.acp.write().await.state.stopped(acp_error.clone());

        self.read_only
            .store(!self.config.approval_mode.is_auto_override(), Ordering::SeqCst);

        let result = json!({ "lsp_error": lsp_error, "acp_error": acp_error });
        self.trace
            .record_ok(TraceCategory::Supervisor, "stop", json!({}), result, started.elapsed());
        self.trace.finalize();

        if let Some(ref path) = self.config.trace.path {
            match self.trace.save(path) {
                Ok(()) => debug!(path = %path.display(), "Trace saved"),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to save trace"),
            }
        }
        info!("Runtime stopped");
    }

    /// The code-intelligence handle, only while that backend is Ready.
    pub async fn code_intelligence(&self) -> Option<Arc<dyn CodeIntelligence>> {
        let slot = self.lsp.read().await;
        if slot.state.is_ready() {
            slot.handle.clone()
        } else {
            None
        }
    }

    /// The action session, only while that backend is Ready.
    pub async fn action_session(&self) -> Option<Arc<dyn ActionSession>> {
        let slot = self.acp.read().await;
        if slot.state.is_ready() {
            slot.handle.clone()
        } else {
            None
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::SeqCst)
    }

    pub fn approval_mode(&self) -> ApprovalMode {
        self.config.approval_mode
    }

    /// Resolved workspace root (the configured path before `start`).
    pub fn workspace(&self) -> PathBuf {
        self.workspace
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn trace(&self) -> &RuntimeTrace {
        &self.trace
    }
}

/// Builder for [`RuntimeSupervisor`].
pub struct SupervisorBuilder {
    config: RuntimeConfig,
    lsp_launcher: Option<Arc<dyn CodeIntelligenceLauncher>>,
    acp_launcher: Option<Arc<dyn ActionBackendLauncher>>,
}

impl SupervisorBuilder {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            lsp_launcher: None,
            acp_launcher: None,
        }
    }

    pub fn code_intelligence(mut self, launcher: Arc<dyn CodeIntelligenceLauncher>) -> Self {
        self.lsp_launcher = Some(launcher);
        self
    }

    pub fn action_backend(mut self, launcher: Arc<dyn ActionBackendLauncher>) -> Self {
        self.acp_launcher = Some(launcher);
        self
    }

    pub fn build(self) -> Result<RuntimeSupervisor, SupervisorError> {
        RuntimeSupervisor::new(self.config, self.lsp_launcher, self.acp_launcher)
    }
}
