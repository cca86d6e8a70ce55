// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Action-execution (ACP) backend interface.
//!
//! An [`ActionSession`] is the handle through which mutations are recorded:
//! it carries the approval mode it was opened with and an append-only log of
//! tool calls. Whether a session could be opened is the sole input to the
//! supervisor's read-only decision.

mod session;

pub use session::{
    ActionBackendLauncher, ActionSession, LocalSession, LocalSessionLauncher, SessionEvent,
    SessionEventKind,
};

use thiserror::Error;

/// Errors from the action-execution backend.
#[derive(Error, Debug)]
pub enum AcpError {
    #[error("Failed to start action backend: {0}")]
    StartupFailed(String),

    #[error("Action session closed: {0}")]
    SessionClosed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
