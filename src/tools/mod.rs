// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Host capabilities used by the router and orchestrator.
//!
//! - [`shell`]: run shell commands with a timeout
//! - [`search`]: line-oriented text search (ripgrep or a built-in walker)

pub mod search;
pub mod shell;

pub use search::{
    text_searcher_for, RipgrepSearcher, SearchHit, SearchOptions, TextSearcher, WalkSearcher,
};
pub use shell::{BashRunner, ShellOutput, ShellRunner};

/// Truncate text to a maximum byte length, respecting UTF-8 boundaries.
pub fn truncate_text(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }

    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }

    if end == 0 {
        return String::new();
    }

    format!("{}... [truncated]", &text[..end])
}

/// Truncate output by lines, keeping first and last portions.
pub fn truncate_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let total = lines.len();

    if total <= max_lines {
        return output.to_string();
    }

    let keep = max_lines / 2;
    let head = lines[..keep].join("\n");
    let tail = lines[total - keep..].join("\n");
    let omitted = total - keep * 2;

    format!("{head}\n\n... [{omitted} lines omitted] ...\n\n{tail}")
}
