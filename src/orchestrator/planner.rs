// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Plan synthesis.
//!
//! The orchestrator asks a [`Planner`] to turn a prompt into steps. Hosts
//! with an LLM planner plug it in; [`KeywordPlanner`] is the deterministic
//! default that recognises a handful of verbs and one step per target.

use std::path::Path;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use super::types::{ActionStep, StepKind};
use crate::error::AgentError;
use crate::router::extract_paths;

/// Turns a prompt into ordered steps. An empty list means nothing
/// actionable was recognised.
#[async_trait]
pub trait Planner: Send + Sync {
    fn name(&self) -> &str;

    async fn plan(&self, prompt: &str, workspace: &Path) -> Result<Vec<ActionStep>, AgentError>;
}

fn ci(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .unwrap()
}

static SHELL_VERB: Lazy<Regex> =
    Lazy::new(|| ci(r"^\s*(?:please\s+)?(?:run|execute|exec)\b\s*(?:the\s+)?(?:command\s+)?(.*)$"));
static RENAME_VERB: Lazy<Regex> = Lazy::new(|| ci(r"\b(?:rename|move|mv)\b"));
/// Delete only with a file as the direct object: `delete a.py`,
/// `remove the file src/b.rs`.
static DELETE_VERB: Lazy<Regex> = Lazy::new(|| {
    ci(r#"\b(?:delete|remove|rm)\s+(?:the\s+)?(?:files?\s+)?[`'"]?(?:\.{0,2}/)?(?:[\w.-]+/)*[\w-]+\.[A-Za-z]"#)
});
static CREATE_VERB: Lazy<Regex> = Lazy::new(|| ci(r"\b(?:create|add|new|make|write|generate|touch)\b"));
static REFACTOR_VERB: Lazy<Regex> = Lazy::new(|| ci(r"\brefactor\b"));
static EDIT_VERB: Lazy<Regex> =
    Lazy::new(|| ci(r"\b(?:edit|modify|update|change|fix|replace|append|insert)\b"));

static BACKTICK: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").unwrap());

/// `with content "..."`, `containing '...'`
static CONTENT: Lazy<Regex> = Lazy::new(|| {
    ci(r#"\b(?:with(?:\s+the)?\s+(?:content|text|body)|containing)\s*:?\s*(?:"([^"]*)"|'([^']*)'|`([^`]*)`)"#)
});

/// `replace "a" with "b"`
static REPLACE: Lazy<Regex> = Lazy::new(|| {
    ci(r#"\breplace\s+(?:"([^"]*)"|'([^']*)'|`([^`]*)`)\s+with\s+(?:"([^"]*)"|'([^']*)'|`([^`]*)`)"#)
});

/// `append "..."`
static APPEND: Lazy<Regex> =
    Lazy::new(|| ci(r#"\b(?:append|add\s+the\s+line)\s+(?:"([^"]*)"|'([^']*)'|`([^`]*)`)"#));

/// `remove the line "..."`, `delete lines containing '...'`
static REMOVE_LINES: Lazy<Regex> = Lazy::new(|| {
    ci(r#"\b(?:remove|delete|drop)\s+(?:the\s+)?lines?\s+(?:containing\s+)?(?:"([^"]*)"|'([^']*)'|`([^`]*)`)"#)
});

fn first_group(caps: &regex::Captures<'_>, groups: std::ops::Range<usize>) -> Option<String> {
    groups
        .filter_map(|i| caps.get(i))
        .map(|m| m.as_str().to_string())
        .next()
}

/// The action a prompt asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptAction {
    Shell,
    Rename,
    Delete,
    Create,
    Refactor,
    Edit,
}

/// Classify a prompt. Checked in order: shell, in-file phrases (replace,
/// append, remove lines), rename, delete, create, refactor, edit.
pub fn classify_prompt(prompt: &str) -> Option<PromptAction> {
    let in_file = REPLACE.is_match(prompt) || APPEND.is_match(prompt) || REMOVE_LINES.is_match(prompt);
    if SHELL_VERB.is_match(prompt) {
        Some(PromptAction::Shell)
    } else if in_file && REFACTOR_VERB.is_match(prompt) {
        Some(PromptAction::Refactor)
    } else if in_file {
        Some(PromptAction::Edit)
    } else if RENAME_VERB.is_match(prompt) {
        Some(PromptAction::Rename)
    } else if DELETE_VERB.is_match(prompt) {
        Some(PromptAction::Delete)
    } else if CREATE_VERB.is_match(prompt) {
        Some(PromptAction::Create)
    } else if REFACTOR_VERB.is_match(prompt) {
        Some(PromptAction::Refactor)
    } else if EDIT_VERB.is_match(prompt) {
        Some(PromptAction::Edit)
    } else {
        None
    }
}

/// Deterministic keyword planner. Produces one step per file mentioned in
/// the prompt; steps start Pending.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordPlanner;

impl KeywordPlanner {
    /// Synchronous core of [`Planner::plan`].
    pub fn synthesize(prompt: &str) -> Vec<ActionStep> {
        let Some(action) = classify_prompt(prompt) else {
            return Vec::new();
        };

        // Quoted text is content, not a path.
        let unquoted = CONTENT.replace_all(prompt, " ");
        let unquoted = REPLACE.replace_all(&unquoted, " ");
        let unquoted = APPEND.replace_all(&unquoted, " ");
        let unquoted = REMOVE_LINES.replace_all(&unquoted, " ");
        let paths = extract_paths(&unquoted);

        match action {
            PromptAction::Shell => shell_step(prompt).into_iter().collect(),
            PromptAction::Rename => match paths.as_slice() {
                [from, to, ..] => vec![ActionStep::new(StepKind::Rename, from, format!("Rename {from} to {to}"))
                    .with_param("to", to.as_str())],
                _ => Vec::new(),
            },
            PromptAction::Delete => paths
                .iter()
                .map(|p| ActionStep::new(StepKind::Delete, p, format!("Delete {p}")))
                .collect(),
            PromptAction::Create => {
                let content = CONTENT
                    .captures(prompt)
                    .and_then(|c| first_group(&c, 1..4))
                    .unwrap_or_default();
                paths
                    .iter()
                    .map(|p| {
                        ActionStep::new(StepKind::Create, p, format!("Create {p}"))
                            .with_param("content", content.as_str())
                    })
                    .collect()
            }
            PromptAction::Refactor | PromptAction::Edit => {
                let kind = if action == PromptAction::Refactor {
                    StepKind::Refactor
                } else {
                    StepKind::Edit
                };
                paths
                    .iter()
                    .map(|p| edit_step(kind, p, prompt))
                    .collect()
            }
        }
    }
}

fn shell_step(prompt: &str) -> Option<ActionStep> {
    let command = match BACKTICK.captures(prompt) {
        Some(caps) => caps[1].trim().to_string(),
        None => SHELL_VERB.captures(prompt)?[1].trim().to_string(),
    };
    if command.is_empty() {
        return None;
    }
    Some(
        ActionStep::new(StepKind::Shell, &command, format!("Run `{command}`"))
            .with_param("command", command.as_str()),
    )
}

fn edit_step(kind: StepKind, path: &str, prompt: &str) -> ActionStep {
    let verb = if kind == StepKind::Refactor { "Refactor" } else { "Edit" };
    let mut step = ActionStep::new(kind, path, format!("{verb} {path}"));

    if let Some(caps) = REPLACE.captures(prompt) {
        if let (Some(old), Some(new)) = (first_group(&caps, 1..4), first_group(&caps, 4..7)) {
            step = step.with_param("old", old).with_param("new", new);
        }
    } else if let Some(text) = APPEND.captures(prompt).and_then(|c| first_group(&c, 1..4)) {
        step = step.with_param("append", text);
    } else if let Some(text) = REMOVE_LINES.captures(prompt).and_then(|c| first_group(&c, 1..4)) {
        step = step.with_param("remove_lines", text);
    } else if let Some(text) = CONTENT.captures(prompt).and_then(|c| first_group(&c, 1..4)) {
        step = step.with_param("content", text);
    }
    step
}

#[async_trait]
impl Planner for KeywordPlanner {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn plan(&self, prompt: &str, _workspace: &Path) -> Result<Vec<ActionStep>, AgentError> {
        Ok(Self::synthesize(prompt))
    }
}
