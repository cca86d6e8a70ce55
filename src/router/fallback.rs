// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Deterministic fallbacks used when the code-intelligence backend is
//! unavailable: regex symbol extraction, symbol location and snippets.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use super::types::SymbolInfo;
use crate::lsp::SymbolKind;

/// Source language, by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Rust,
    /// Unrecognised extension; every pattern set is tried.
    Other,
}

impl Language {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("py" | "pyi") => Self::Python,
            Some("js" | "jsx" | "mjs" | "cjs") => Self::JavaScript,
            Some("ts" | "tsx" | "mts" | "cts") => Self::TypeScript,
            Some("rs") => Self::Rust,
            _ => Self::Other,
        }
    }
}

struct SymbolPattern {
    regex: Regex,
    kind: SymbolKind,
    /// Indented matches are reported as methods.
    indented_is_method: bool,
}

fn pattern(regex: &str, kind: SymbolKind) -> SymbolPattern {
    SymbolPattern {
        regex: Regex::new(regex).unwrap(),
        kind,
        indented_is_method: false,
    }
}

static PYTHON: Lazy<Vec<SymbolPattern>> = Lazy::new(|| {
    vec![
        SymbolPattern {
            indented_is_method: true,
            ..pattern(r"(?m)^([ \t]*)(?:async[ \t]+)?def[ \t]+([A-Za-z_]\w*)", SymbolKind::Function)
        },
        pattern(r"(?m)^([ \t]*)class[ \t]+([A-Za-z_]\w*)", SymbolKind::Class),
    ]
});

static JAVASCRIPT: Lazy<Vec<SymbolPattern>> = Lazy::new(|| {
    vec![
        pattern(
            r"(?m)^([ \t]*)(?:export[ \t]+)?(?:default[ \t]+)?(?:async[ \t]+)?function\*?[ \t]*([A-Za-z_$][\w$]*)",
            SymbolKind::Function,
        ),
        pattern(
            r"(?m)^([ \t]*)(?:export[ \t]+)?(?:const|let|var)[ \t]+([A-Za-z_$][\w$]*)[ \t]*(?::[^=\n]+)?=[ \t]*(?:async[ \t]+)?(?:\([^)\n]*\)|[A-Za-z_$][\w$]*)[ \t]*(?::[^=\n]+)?=>",
            SymbolKind::Function,
        ),
        pattern(
            r"(?m)^([ \t]*)(?:export[ \t]+)?(?:default[ \t]+)?(?:abstract[ \t]+)?class[ \t]+([A-Za-z_$][\w$]*)",
            SymbolKind::Class,
        ),
    ]
});

static TYPESCRIPT_ONLY: Lazy<Vec<SymbolPattern>> = Lazy::new(|| {
    vec![pattern(
        r"(?m)^([ \t]*)(?:export[ \t]+)?(?:declare[ \t]+)?interface[ \t]+([A-Za-z_$][\w$]*)",
        SymbolKind::Interface,
    )]
});

const RUST_VIS: &str = r"(?:pub(?:[ \t]*\([^)\n]*\))?[ \t]+)?";

static RUST: Lazy<Vec<SymbolPattern>> = Lazy::new(|| {
    vec![
        SymbolPattern {
            indented_is_method: true,
            ..pattern(
                &format!(
                    r#"(?m)^([ \t]*){RUST_VIS}(?:const[ \t]+)?(?:async[ \t]+)?(?:unsafe[ \t]+)?(?:extern[ \t]+"[^"\n]*"[ \t]+)?fn[ \t]+([A-Za-z_]\w*)"#
                ),
                SymbolKind::Function,
            )
        },
        pattern(&format!(r"(?m)^([ \t]*){RUST_VIS}struct[ \t]+([A-Za-z_]\w*)"), SymbolKind::Struct),
        pattern(&format!(r"(?m)^([ \t]*){RUST_VIS}enum[ \t]+([A-Za-z_]\w*)"), SymbolKind::Enum),
        pattern(
            &format!(r"(?m)^([ \t]*){RUST_VIS}(?:unsafe[ \t]+)?trait[ \t]+([A-Za-z_]\w*)"),
            SymbolKind::Trait,
        ),
    ]
});

fn patterns_for(language: Language) -> Vec<&'static SymbolPattern> {
    let sets: Vec<&'static Vec<SymbolPattern>> = match language {
        Language::Python => vec![&*PYTHON],
        Language::JavaScript => vec![&*JAVASCRIPT],
        Language::TypeScript => vec![&*JAVASCRIPT, &*TYPESCRIPT_ONLY],
        Language::Rust => vec![&*RUST],
        Language::Other => vec![&*PYTHON, &*JAVASCRIPT, &*TYPESCRIPT_ONLY, &*RUST],
    };
    sets.into_iter().flat_map(|set| set.iter()).collect()
}

/// 1-indexed line of a byte offset, counted as newlines before it.
pub fn line_of(content: &str, offset: usize) -> u32 {
    content[..offset].bytes().filter(|b| *b == b'\n').count() as u32 + 1
}

/// Extract declared symbols, sorted by line.
pub fn extract_symbols(content: &str, language: Language) -> Vec<SymbolInfo> {
    let mut symbols: Vec<SymbolInfo> = Vec::new();

    for pattern in patterns_for(language) {
        for caps in pattern.regex.captures_iter(content) {
            let (Some(indent), Some(name)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let kind = if pattern.indented_is_method && !indent.as_str().is_empty() {
                SymbolKind::Method
            } else {
                pattern.kind
            };
            let symbol = SymbolInfo::new(name.as_str(), kind, line_of(content, name.start()));
            if !symbols.iter().any(|s| s.name == symbol.name && s.line == symbol.line) {
                symbols.push(symbol);
            }
        }
    }

    symbols.sort_by(|a, b| a.line.cmp(&b.line).then_with(|| a.name.cmp(&b.name)));
    symbols
}

/// Regex matching a declaration of `name` in any supported language.
pub fn definition_pattern(name: &str) -> String {
    let name = regex::escape(name);
    format!(
        r"\b(?:def|class|function|fn|struct|enum|trait|interface|type)\s+{name}\b|\b(?:const|let|var)\s+{name}\s*(?::[^=]+)?="
    )
}

/// Regex matching any whole-word occurrence of `name`.
pub fn reference_pattern(name: &str) -> String {
    format!(r"\b{}\b", regex::escape(name))
}

/// 0-indexed `(line, character)` of the first whole-word occurrence of
/// `name`, for positional backend requests.
pub fn locate_symbol(content: &str, name: &str) -> Option<(u32, u32)> {
    let regex = Regex::new(&reference_pattern(name)).ok()?;
    let m = regex.find(content)?;
    let line = line_of(content, m.start()) - 1;
    let line_start = content[..m.start()].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let character = content[line_start..m.start()].chars().count() as u32;
    Some((line, character))
}

/// Lines `line..line + context` (1-indexed, inclusive start) of `content`.
pub fn snippet(content: &str, line: u32, context: usize) -> String {
    content
        .lines()
        .skip(line.saturating_sub(1) as usize)
        .take(context)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(symbols: &[SymbolInfo]) -> Vec<(&str, SymbolKind, u32)> {
        symbols.iter().map(|s| (s.name.as_str(), s.kind, s.line)).collect()
    }

    #[test]
    fn test_python_symbols() {
        let content = "def foo():\nclass Bar:\n    def method(self):\n        pass\nasync def fetch():\n    pass\n";
        let symbols = extract_symbols(content, Language::Python);
        assert_eq!(
            names(&symbols),
            vec![
                ("foo", SymbolKind::Function, 1),
                ("Bar", SymbolKind::Class, 2),
                ("method", SymbolKind::Method, 3),
                ("fetch", SymbolKind::Function, 5),
            ]
        );
    }

    #[test]
    fn test_typescript_symbols() {
        let content = r#"export function load(path: string) {}
const add = (a: number, b: number) => a + b;
export const fetchAll = async () => {};
let handler: Handler = req => req;
export default class Server {}
export interface Options {
  port: number;
}
const notAFunction = 42;
"#;
        let symbols = extract_symbols(content, Language::TypeScript);
        assert_eq!(
            names(&symbols),
            vec![
                ("load", SymbolKind::Function, 1),
                ("add", SymbolKind::Function, 2),
                ("fetchAll", SymbolKind::Function, 3),
                ("handler", SymbolKind::Function, 4),
                ("Server", SymbolKind::Class, 5),
                ("Options", SymbolKind::Interface, 6),
            ]
        );
    }

    #[test]
    fn test_interface_only_for_typescript() {
        let content = "interface Foo {}\nfunction bar() {}\n";
        let js = extract_symbols(content, Language::JavaScript);
        assert_eq!(names(&js), vec![("bar", SymbolKind::Function, 2)]);
    }

    #[test]
    fn test_rust_symbols() {
        let content = "pub struct Config;\npub(crate) enum Mode { A }\ntrait Run {}\nimpl Run for Config {\n    pub async fn run(&self) {}\n}\nfn main() {}\n";
        let symbols = extract_symbols(content, Language::Rust);
        assert_eq!(
            names(&symbols),
            vec![
                ("Config", SymbolKind::Struct, 1),
                ("Mode", SymbolKind::Enum, 2),
                ("Run", SymbolKind::Trait, 3),
                ("run", SymbolKind::Method, 5),
                ("main", SymbolKind::Function, 7),
            ]
        );
    }

    #[test]
    fn test_language_from_path() {
        assert_eq!(Language::from_path(Path::new("a/b.py")), Language::Python);
        assert_eq!(Language::from_path(Path::new("x.tsx")), Language::TypeScript);
        assert_eq!(Language::from_path(Path::new("Makefile")), Language::Other);
    }

    #[test]
    fn test_locate_symbol_whole_word() {
        let content = "foobar = 1\n\ndef foo():\n    pass\n";
        assert_eq!(locate_symbol(content, "foo"), Some((2, 4)));
        assert_eq!(locate_symbol(content, "missing"), None);
    }

    #[test]
    fn test_definition_pattern() {
        let regex = Regex::new(&definition_pattern("load")).unwrap();
        assert!(regex.is_match("def load(path):"));
        assert!(regex.is_match("export const load = () => {}"));
        assert!(regex.is_match("pub fn load() {}"));
        assert!(!regex.is_match("load(path)"));
        assert!(!regex.is_match("def loader():"));
    }

    #[test]
    fn test_snippet() {
        let content = "a\nb\nc\nd\n";
        assert_eq!(snippet(content, 2, 2), "b\nc");
        assert_eq!(snippet(content, 4, 10), "d");
    }
}
