// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Query result types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::intent::QueryIntent;
use crate::lsp::{Diagnostic, SymbolKind};

/// A source location backing an answer. Lines are 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Citation {
    pub file: PathBuf,
    pub line: u32,
}

impl Citation {
    pub fn new(file: impl Into<PathBuf>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl std::fmt::Display for Citation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

/// A symbol found in a file. Lines are 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub name: String,
    pub kind: SymbolKind,
    pub line: u32,
}

impl SymbolInfo {
    pub fn new(name: impl Into<String>, kind: SymbolKind, line: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            line,
        }
    }
}

/// A located code excerpt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
    pub symbol: String,
    pub file: PathBuf,
    pub line: u32,
    pub snippet: String,
}

/// Intent-specific payload of a [`CodeQueryResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "items", rename_all = "snake_case")]
pub enum QueryData {
    Symbols(Vec<SymbolInfo>),
    Locations(Vec<Citation>),
    Diagnostics(Vec<Diagnostic>),
    Matches(Vec<crate::tools::SearchHit>),
    Explanation(Explanation),
}

impl QueryData {
    pub fn len(&self) -> usize {
        match self {
            Self::Symbols(items) => items.len(),
            Self::Locations(items) => items.len(),
            Self::Diagnostics(items) => items.len(),
            Self::Matches(items) => items.len(),
            Self::Explanation(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Answer to a code query. The router never returns `Err`; failures are
/// reported through `success` and `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeQueryResult {
    pub intent: QueryIntent,
    pub success: bool,
    /// The code-intelligence backend produced the answer.
    pub backend_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<QueryData>,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// A deterministic fallback was attempted.
    pub fallback_used: bool,
}

impl CodeQueryResult {
    /// A result carrying data. Without citations it is reported as a failure.
    pub fn answered(intent: QueryIntent, data: QueryData, citations: Vec<Citation>) -> Self {
        let success = !citations.is_empty();
        Self {
            intent,
            success,
            backend_used: false,
            error: (!success).then(|| "answer has no source citations".to_string()),
            data: Some(data),
            citations,
            fallback_used: false,
        }
    }

    pub fn failed(intent: QueryIntent, error: impl Into<String>) -> Self {
        Self {
            intent,
            success: false,
            backend_used: false,
            data: None,
            citations: Vec::new(),
            error: Some(error.into()),
            fallback_used: false,
        }
    }

    pub fn via_backend(mut self) -> Self {
        self.backend_used = true;
        self.fallback_used = false;
        self
    }

    pub fn via_fallback(mut self) -> Self {
        self.backend_used = false;
        self.fallback_used = true;
        self
    }

    /// Number of items in the payload.
    pub fn item_count(&self) -> usize {
        self.data.as_ref().map(QueryData::len).unwrap_or(0)
    }
}
