// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Code-intelligence types.
//!
//! These mirror the LSP protocol types, simplified to what the runtime
//! consumes: locations, document/workspace symbols and diagnostics.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Position in a text document (0-indexed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Position {
    /// Line number (0-indexed).
    pub line: u32,
    /// Character offset (0-indexed).
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }

    /// 1-indexed line number for display and citations.
    pub fn display_line(&self) -> u32 {
        self.line + 1
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.display_line(), self.character + 1)
    }
}

/// A range in a text document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Range {
    /// Start position (inclusive).
    pub start: Position,
    /// End position (exclusive).
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Create a range from line/character coordinates.
    pub fn from_coords(start_line: u32, start_char: u32, end_line: u32, end_char: u32) -> Self {
        Self {
            start: Position::new(start_line, start_char),
            end: Position::new(end_line, end_char),
        }
    }

    /// A zero-width range at a single line start.
    pub fn line(line: u32) -> Self {
        Self::from_coords(line, 0, line, 0)
    }
}

/// A location in a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// Document URI (`file://` for files on disk).
    pub uri: String,
    /// Range within the document.
    pub range: Range,
}

impl Location {
    pub fn new(uri: impl Into<String>, range: Range) -> Self {
        Self {
            uri: uri.into(),
            range,
        }
    }

    /// Build a `file://` location from a path.
    pub fn from_path(path: &Path, range: Range) -> Self {
        Self::new(path_to_uri(path), range)
    }

    /// Get the file path from the URI.
    pub fn file_path(&self) -> Option<&str> {
        self.uri.strip_prefix("file://")
    }

    /// The file path when the URI is a file URI, the raw URI otherwise.
    pub fn path_or_uri(&self) -> &str {
        self.file_path().unwrap_or(&self.uri)
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.path_or_uri(), self.range.start)
    }
}

/// Convert a path to a `file://` URI.
pub fn path_to_uri(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// Convert a `file://` URI back to a path.
pub fn uri_to_path(uri: &str) -> Option<PathBuf> {
    uri.strip_prefix("file://").map(PathBuf::from)
}

/// Diagnostic severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Error = 1,
    Warning = 2,
    #[default]
    Information = 3,
    Hint = 4,
}

impl DiagnosticSeverity {
    /// Convert from LSP protocol number.
    pub fn from_lsp(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Error),
            2 => Some(Self::Warning),
            3 => Some(Self::Information),
            4 => Some(Self::Hint),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Information => "info",
            Self::Hint => "hint",
        }
    }
}

/// A diagnostic reported for a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Document the diagnostic belongs to.
    pub uri: String,
    pub range: Range,
    #[serde(default)]
    pub severity: DiagnosticSeverity,
    /// Diagnostic code (e.g., "E0001").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Source of the diagnostic (e.g., "pyright").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        uri: impl Into<String>,
        range: Range,
        severity: DiagnosticSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            range,
            severity,
            code: None,
            source: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.severity.label(), self.range.start, self.message)?;
        if let Some(ref code) = self.code {
            write!(f, " [{}]", code)?;
        }
        Ok(())
    }
}

/// Symbol kind as numbered by the LSP protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LspSymbolKind {
    File = 1,
    Module = 2,
    Namespace = 3,
    Package = 4,
    Class = 5,
    Method = 6,
    Property = 7,
    Field = 8,
    Constructor = 9,
    Enum = 10,
    Interface = 11,
    Function = 12,
    Variable = 13,
    Constant = 14,
    Struct = 23,
    TypeParameter = 26,
}

impl LspSymbolKind {
    /// Convert from LSP protocol number. Kinds the runtime does not report
    /// on (literals, operators, events) map to `None`.
    pub fn from_lsp(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::File),
            2 => Some(Self::Module),
            3 => Some(Self::Namespace),
            4 => Some(Self::Package),
            5 => Some(Self::Class),
            6 => Some(Self::Method),
            7 => Some(Self::Property),
            8 => Some(Self::Field),
            9 => Some(Self::Constructor),
            10 => Some(Self::Enum),
            11 => Some(Self::Interface),
            12 => Some(Self::Function),
            13 => Some(Self::Variable),
            14 => Some(Self::Constant),
            23 => Some(Self::Struct),
            26 => Some(Self::TypeParameter),
            _ => None,
        }
    }

    /// Collapse to the kind reported in query results.
    pub fn to_symbol_kind(self) -> SymbolKind {
        match self {
            Self::File | Self::Module | Self::Namespace | Self::Package => SymbolKind::Module,
            Self::Class => SymbolKind::Class,
            Self::Method | Self::Constructor => SymbolKind::Method,
            Self::Property | Self::Field => SymbolKind::Field,
            Self::Enum => SymbolKind::Enum,
            Self::Interface => SymbolKind::Interface,
            Self::Function => SymbolKind::Function,
            Self::Variable => SymbolKind::Variable,
            Self::Constant => SymbolKind::Constant,
            Self::Struct => SymbolKind::Struct,
            Self::TypeParameter => SymbolKind::Type,
        }
    }
}

/// Symbol kind reported in query results, shared by backend answers and
/// regex fallbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Interface,
    Struct,
    Enum,
    Trait,
    Type,
    Field,
    Variable,
    Constant,
    Module,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Struct => "struct",
            Self::Enum => "enum",
            Self::Trait => "trait",
            Self::Type => "type",
            Self::Field => "field",
            Self::Variable => "variable",
            Self::Constant => "constant",
            Self::Module => "module",
        }
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document symbol from the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSymbol {
    pub name: String,
    pub kind: LspSymbolKind,
    /// Full range of the symbol.
    pub range: Range,
    /// Range of the symbol name.
    pub selection_range: Range,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DocumentSymbol>,
}

impl DocumentSymbol {
    pub fn new(name: impl Into<String>, kind: LspSymbolKind, range: Range) -> Self {
        Self {
            name: name.into(),
            kind,
            range,
            selection_range: range,
            detail: None,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<DocumentSymbol>) -> Self {
        self.children = children;
        self
    }

    /// Depth-first walk over this symbol and its children.
    pub fn flatten(&self) -> Vec<&DocumentSymbol> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.flatten());
        }
        out
    }
}

/// Workspace symbol from the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceSymbol {
    pub name: String,
    pub kind: LspSymbolKind,
    pub location: Location,
    /// Container name (e.g., class name for a method).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
}
