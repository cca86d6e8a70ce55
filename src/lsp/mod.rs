// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Code-intelligence (LSP) backend interface.
//!
//! The supervisor launches the backend through a [`CodeIntelligenceLauncher`]
//! and the router issues symbol, definition, reference and diagnostic
//! queries through the resulting [`CodeIntelligence`] handle. When the
//! backend is missing or fails, the router falls back to deterministic
//! extraction instead.
//!
//! ```text
//! RuntimeSupervisor ──launch──▶ CodeIntelligenceLauncher
//!        │                              │
//!        │ (Ready)                      ▼
//!        └────────────▶ Arc<dyn CodeIntelligence> ◀── IntentRouter
//! ```

pub mod backend;
pub mod error;
pub mod types;

pub use backend::{CodeIntelligence, CodeIntelligenceLauncher, StaticLauncher};
pub use error::{LspError, LspResult};
pub use types::{
    path_to_uri, uri_to_path, Diagnostic, DiagnosticSeverity, DocumentSymbol, Location,
    LspSymbolKind, Position, Range, SymbolKind, WorkspaceSymbol,
};
