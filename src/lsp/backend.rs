// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Code-intelligence backend seam.
//!
//! The runtime never talks to a language server directly. Hosts provide a
//! [`CodeIntelligenceLauncher`] that the supervisor calls during startup; a
//! successful launch yields a [`CodeIntelligence`] handle the router queries.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use super::error::{LspError, LspResult};
use super::types::{Diagnostic, DocumentSymbol, Location, WorkspaceSymbol};

/// Semantic queries against a running code-intelligence backend.
///
/// Lines and columns are 0-indexed, as in the LSP protocol.
#[async_trait]
pub trait CodeIntelligence: Send + Sync {
    /// Backend name for logs and status.
    fn name(&self) -> &str;

    /// Symbols declared in a file.
    async fn document_symbols(&self, file: &Path) -> LspResult<Vec<DocumentSymbol>>;

    /// Where the symbol at a position is defined.
    async fn definition(&self, file: &Path, line: u32, character: u32) -> LspResult<Vec<Location>>;

    /// Every reference to the symbol at a position.
    async fn references(&self, file: &Path, line: u32, character: u32) -> LspResult<Vec<Location>>;

    /// Diagnostics for one file, or the whole workspace when `file` is `None`.
    async fn diagnostics(&self, file: Option<&Path>) -> LspResult<Vec<Diagnostic>>;

    /// Workspace-wide symbol search. Optional.
    async fn workspace_symbols(&self, _query: &str) -> LspResult<Vec<WorkspaceSymbol>> {
        Err(LspError::UnsupportedCapability("workspace/symbol".to_string()))
    }

    /// Release backend resources.
    async fn shutdown(&self) -> LspResult<()> {
        Ok(())
    }
}

/// Starts a code-intelligence backend for a workspace.
#[async_trait]
pub trait CodeIntelligenceLauncher: Send + Sync {
    async fn launch(&self, workspace: &Path) -> LspResult<Arc<dyn CodeIntelligence>>;
}

/// Launcher that hands out an already-constructed backend.
///
/// Useful when the host manages the language server itself.
pub struct StaticLauncher {
    backend: Arc<dyn CodeIntelligence>,
}

impl StaticLauncher {
    pub fn new(backend: Arc<dyn CodeIntelligence>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl CodeIntelligenceLauncher for StaticLauncher {
    async fn launch(&self, _workspace: &Path) -> LspResult<Arc<dyn CodeIntelligence>> {
        Ok(Arc::clone(&self.backend))
    }
}
