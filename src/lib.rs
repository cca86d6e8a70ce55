// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Codi runtime - the orchestration core of the Codi coding assistant.
//!
//! The runtime owns a workspace and four cooperating services:
//!
//! - [`supervisor`] - starts the code-intelligence ([`lsp`]) and
//!   action-execution ([`acp`]) backends concurrently, tracks their health
//!   and decides whether the workspace is read-only
//! - [`router`] - classifies natural-language code questions and answers
//!   them from the backend, falling back to regex extraction and text search
//! - [`orchestrator`] - turns a change request into a plan of steps and
//!   runs it through plan, approve, apply and verify
//! - [`delegate`] - runs objectives on named subagents under concurrency
//!   and total-count limits
//!
//! Supporting modules: [`config`] (YAML config and overrides), [`error`],
//! [`telemetry`] (tracing subscriber setup), [`tools`] (shell and text
//! search) and [`trace`] (the append-only action log).
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use codi_runtime::acp::LocalSessionLauncher;
//! use codi_runtime::config::RuntimeConfig;
//! use codi_runtime::orchestrator::ActionOrchestrator;
//! use codi_runtime::supervisor::RuntimeSupervisor;
//! use codi_runtime::tools::BashRunner;
//!
//! let config = RuntimeConfig::for_workspace("./project");
//! let supervisor = Arc::new(
//!     RuntimeSupervisor::builder(config)
//!         .action_backend(Arc::new(LocalSessionLauncher))
//!         .build()?,
//! );
//! supervisor.start().await?;
//!
//! let orchestrator = ActionOrchestrator::new(supervisor.clone(), Arc::new(BashRunner));
//! let result = orchestrator.execute("create notes.md with content 'hi'", false).await;
//! ```

pub mod acp;
pub mod config;
pub mod delegate;
pub mod error;
pub mod lsp;
pub mod orchestrator;
pub mod router;
pub mod supervisor;
pub mod telemetry;
pub mod tools;
pub mod trace;

// Re-export commonly used types at crate root
pub use config::{load_config, ApprovalMode, RuntimeConfig};
pub use delegate::{
    DelegationConfig, DelegationRequest, DelegationResult, SubagentDelegator, TaskStatus,
};
pub use error::{AgentError, ConfigError, Result, RuntimeError, ToolError};
pub use orchestrator::{ActionOrchestrator, ActionPlan, ActionResult};
pub use router::{CodeQueryResult, IntentRouter, QueryIntent};
pub use supervisor::{RuntimeStatus, RuntimeSupervisor};
pub use trace::RuntimeTrace;

/// Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
