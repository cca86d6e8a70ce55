// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Query classification and target extraction.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// What a natural-language code query is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    ListSymbols,
    Definition,
    References,
    Diagnostics,
    Explain,
    Search,
    Unknown,
}

impl QueryIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListSymbols => "list_symbols",
            Self::Definition => "definition",
            Self::References => "references",
            Self::Diagnostics => "diagnostics",
            Self::Explain => "explain",
            Self::Search => "search",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn ci(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .unwrap()
}

const KIND_WORDS: &str = r"(?:functions?|funcs?|fns?|methods?|class(?:es)?|structs?|enums?|traits?|interfaces?|types?|symbols?|variables?|constants?)";

/// Ordered classification table. First match wins.
static INTENT_TABLE: Lazy<Vec<(QueryIntent, Regex)>> = Lazy::new(|| {
    vec![
        (
            QueryIntent::ListSymbols,
            ci(&format!(
                r"\b(?:list|show|outline|enumerate)\b.*\b{KIND_WORDS}\b|\bwhat\s+{KIND_WORDS}\s+(?:are|exist)\b|\bsymbols?\s+(?:in|of)\b|\boutline\b"
            )),
        ),
        (
            QueryIntent::Definition,
            ci(r"\b(?:definition|defined|declared|declaration|implemented)\b|\bgo\s*to\s+def"),
        ),
        (
            QueryIntent::References,
            ci(r"\b(?:references?|usages?|callers?|call\s+sites?|who\s+calls|called\s+from|used|uses)\b"),
        ),
        (
            QueryIntent::Diagnostics,
            ci(r"\b(?:diagnostics?|errors?|warnings?|lint|problems?|type\s*check(?:ing)?)\b"),
        ),
        (
            QueryIntent::Explain,
            ci(r"\b(?:explain|describe|summari[sz]e|what\s+does|how\s+does)\b"),
        ),
        (
            QueryIntent::Search,
            ci(r"\b(?:search|find|grep|look\s+for|locate|where\s+is)\b"),
        ),
    ]
});

/// Classify a query. Matching is case-insensitive; unmatched queries are
/// [`QueryIntent::Unknown`].
pub fn classify(query: &str) -> QueryIntent {
    INTENT_TABLE
        .iter()
        .find(|(_, pattern)| pattern.is_match(query))
        .map(|(intent, _)| *intent)
        .unwrap_or(QueryIntent::Unknown)
}

static PATH_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[\s`'\x22(])((?:\.{0,2}/)?(?:[\w.-]+/)*[\w-]+\.[A-Za-z][A-Za-z0-9]{0,4})(?:$|[\s`'\x22),:?!])")
        .unwrap()
});

static BACKTICK: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").unwrap());

static QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r#""([^"]+)"|'([^']+)'"#).unwrap());

const IDENT: &str = r"([A-Za-z_$][\w$]*)";

static SYMBOL_PHRASES: Lazy<Vec<Regex>> = Lazy::new(|| {
    let kind = format!(r"(?:the\s+)?(?:{KIND_WORDS}\s+)?");
    vec![
        ci(&format!(r"\b(?:definition|declaration)\s+(?:of|for)\s+{kind}{IDENT}")),
        ci(&format!(r"\b(?:references?|usages?|callers?|uses)\s+(?:of|to|for)\s+{kind}{IDENT}")),
        ci(&format!(r"\bwho\s+calls\s+{kind}{IDENT}")),
        ci(&format!(r"\bwhere\s+(?:is|are)\s+{kind}{IDENT}")),
        ci(&format!(r"\bwhat\s+does\s+{kind}{IDENT}\s+do\b")),
        ci(&format!(r"\b(?:explain|describe|summari[sz]e)\s+{kind}{IDENT}")),
        ci(&format!(r"\b{KIND_WORDS}\s+{IDENT}")),
        ci(&format!(r"\b{IDENT}\s+(?:is\s+)?(?:defined|declared|used|called|implemented)\b")),
    ]
});

static SEARCH_PHRASE: Lazy<Regex> = Lazy::new(|| {
    ci(r"\b(?:search\s+for|search|grep\s+for|grep|look\s+for|find|locate)\s+(?:all\s+)?(?:(?:occurrences|instances|mentions)\s+of\s+)?(.+)$")
});

static TRAILING_SCOPE: Lazy<Regex> =
    Lazy::new(|| ci(r"\s+(?:in|across|within)\s+(?:the\s+)?(?:\S+|code(?:base)?|project|workspace|repo(?:sitory)?)$"));

/// Words that look like identifiers but never name a symbol.
const STOPWORDS: &[&str] = &[
    "a", "an", "all", "and", "any", "are", "do", "does", "every", "file", "for", "in", "is",
    "it", "me", "my", "of", "or", "the", "this", "that", "to", "where", "what", "which", "who",
];

/// Targets mentioned in a query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryTargets {
    /// Path-like tokens, in order of appearance.
    pub files: Vec<String>,
    pub symbol: Option<String>,
    pub search_term: Option<String>,
}

impl QueryTargets {
    pub fn extract(query: &str) -> Self {
        let files = extract_paths(query);
        Self {
            symbol: extract_symbol(query, &files),
            search_term: extract_search_term(query),
            files,
        }
    }
}

/// Path-like tokens (`app.py`, `src/lib.rs`) in order of appearance.
pub fn extract_paths(query: &str) -> Vec<String> {
    // Step one past each match start so adjacent tokens sharing a separator
    // are all found.
    let mut paths = Vec::new();
    let mut offset = 0;
    while let Some(caps) = PATH_TOKEN.captures_at(query, offset) {
        let Some(m) = caps.get(1) else { break };
        let candidate = m.as_str().to_string();
        if !paths.contains(&candidate) {
            paths.push(candidate);
        }
        offset = m.end();
    }
    paths
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

fn clean_symbol(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches("()");
    if is_identifier(trimmed) && !STOPWORDS.contains(&trimmed.to_lowercase().as_str()) {
        Some(trimmed.to_string())
    } else {
        None
    }
}

/// The symbol a query is about: a backticked identifier first, then common
/// phrasings ("definition of X", "who calls X", "where is X defined").
pub fn extract_symbol(query: &str, files: &[String]) -> Option<String> {
    for caps in BACKTICK.captures_iter(query) {
        let inner = caps[1].trim();
        if files.iter().any(|f| f == inner) {
            continue;
        }
        if let Some(symbol) = clean_symbol(inner) {
            return Some(symbol);
        }
    }

    let mut stripped = query.to_string();
    for file in files {
        stripped = stripped.replace(file.as_str(), " ");
    }

    SYMBOL_PHRASES.iter().find_map(|pattern| {
        pattern
            .captures_iter(&stripped)
            .filter_map(|caps| caps.get(1).and_then(|m| clean_symbol(m.as_str())))
            .find(|symbol| !is_kind_word(symbol))
    })
}

fn is_kind_word(word: &str) -> bool {
    static KIND: Lazy<Regex> = Lazy::new(|| ci(&format!("^{KIND_WORDS}$")));
    KIND.is_match(word)
}

/// The literal text a search query is looking for: quoted text first, then
/// whatever follows "search for", "grep", "find" and similar.
pub fn extract_search_term(query: &str) -> Option<String> {
    if let Some(caps) = BACKTICK.captures(query) {
        return Some(caps[1].to_string());
    }
    if let Some(caps) = QUOTED.captures(query) {
        if let Some(m) = caps.get(1).or_else(|| caps.get(2)) {
            return Some(m.as_str().to_string());
        }
    }

    let caps = SEARCH_PHRASE.captures(query.trim())?;
    let mut term = caps[1].trim().trim_end_matches(['?', '.', '!']).to_string();
    term = TRAILING_SCOPE.replace(&term, "").into_owned();
    let term = term.trim();
    (!term.is_empty()).then(|| term.to_string())
}
