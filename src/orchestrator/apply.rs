// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Step application and verification against the workspace.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use super::types::{ActionStep, StepKind};
use crate::error::ToolError;
use crate::tools::ShellRunner;

/// Resolve `target` inside `workspace`. Targets that escape the workspace,
/// lexically or through a symlink, are a security violation.
pub fn resolve_in_workspace(workspace: &Path, target: &str) -> Result<PathBuf, ToolError> {
    if target.trim().is_empty() {
        return Err(ToolError::MissingParameter("target".to_string()));
    }

    let joined = workspace.join(target);
    let mut resolved = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                if !resolved.pop() {
                    return Err(escape_error(target));
                }
            }
            Component::CurDir => {}
            other => resolved.push(other.as_os_str()),
        }
    }

    if !resolved.starts_with(workspace) || resolved == workspace {
        return Err(escape_error(target));
    }
    confine_on_disk(workspace, &resolved, target)?;
    Ok(resolved)
}

/// Follow symlinks on the deepest existing ancestor of `resolved` and check
/// it still lands under the real workspace.
fn confine_on_disk(workspace: &Path, resolved: &Path, target: &str) -> Result<(), ToolError> {
    let Ok(root) = workspace.canonicalize() else {
        return Ok(());
    };

    let mut current = Some(resolved);
    while let Some(path) = current {
        if path.symlink_metadata().is_ok() {
            // A dangling link fails to canonicalize and counts as an escape.
            let real = path.canonicalize().map_err(|_| escape_error(target))?;
            if !real.starts_with(&root) {
                return Err(escape_error(target));
            }
            return Ok(());
        }
        current = path.parent();
    }
    Ok(())
}

fn escape_error(target: &str) -> ToolError {
    ToolError::SecurityViolation(format!("{target} resolves outside the workspace"))
}

fn line_count(text: &str) -> usize {
    text.lines().count()
}

fn pluralize(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

/// Apply one step, returning a one-line change summary.
pub async fn apply_step(
    step: &ActionStep,
    workspace: &Path,
    shell: &dyn ShellRunner,
    shell_timeout: Duration,
) -> Result<String, ToolError> {
    match step.kind {
        StepKind::Create => create(step, workspace).await,
        StepKind::Edit => edit(step, workspace).await,
        StepKind::Refactor => {
            if step.param_str("old").is_none() || step.param_str("new").is_none() {
                return Err(ToolError::MissingParameter("old/new".to_string()));
            }
            edit(step, workspace).await
        }
        StepKind::Delete => delete(step, workspace).await,
        StepKind::Rename => rename(step, workspace).await,
        StepKind::Shell => run_shell(step, workspace, shell, shell_timeout).await,
        StepKind::Unknown => Err(ToolError::InvalidInput(format!(
            "Unknown step kind for {}",
            step.target
        ))),
    }
}

async fn create(step: &ActionStep, workspace: &Path) -> Result<String, ToolError> {
    let path = resolve_in_workspace(workspace, &step.target)?;
    if path.exists() && !step.param_bool("overwrite") {
        return Err(ToolError::InvalidInput(format!("{} already exists", step.target)));
    }
    let content = step.param_str("content").unwrap_or_default();

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, content).await?;

    Ok(format!("created {} (+{})", step.target, pluralize(line_count(content), "line")))
}

async fn edit(step: &ActionStep, workspace: &Path) -> Result<String, ToolError> {
    let path = resolve_in_workspace(workspace, &step.target)?;
    let original = tokio::fs::read_to_string(&path).await?;

    if let (Some(old), Some(new)) = (step.param_str("old"), step.param_str("new")) {
        if old.is_empty() {
            return Err(ToolError::InvalidInput("old text must not be empty".to_string()));
        }
        let occurrences = original.matches(old).count();
        if occurrences == 0 {
            return Err(ToolError::InvalidInput(format!(
                "{:?} not found in {}",
                old, step.target
            )));
        }
        tokio::fs::write(&path, original.replace(old, new)).await?;
        return Ok(format!(
            "edited {} ({})",
            step.target,
            pluralize(occurrences, "replacement")
        ));
    }

    if let Some(text) = step.param_str("remove_lines") {
        if text.is_empty() {
            return Err(ToolError::InvalidInput("line text must not be empty".to_string()));
        }
        let kept: Vec<&str> = original.lines().filter(|l| !l.contains(text)).collect();
        let removed = original.lines().count() - kept.len();
        if removed == 0 {
            return Err(ToolError::InvalidInput(format!("{text:?} not found in {}", step.target)));
        }
        let mut updated = kept.join("\n");
        if original.ends_with('\n') && !updated.is_empty() {
            updated.push('\n');
        }
        tokio::fs::write(&path, updated).await?;
        return Ok(format!("edited {} (-{})", step.target, pluralize(removed, "line")));
    }

    if let Some(content) = step.param_str("content") {
        tokio::fs::write(&path, content).await?;
        return Ok(format!(
            "rewrote {} (-{} +{})",
            step.target,
            pluralize(line_count(&original), "line"),
            pluralize(line_count(content), "line")
        ));
    }

    if let Some(text) = step.param_str("append") {
        let mut updated = original;
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(text);
        if !text.ends_with('\n') {
            updated.push('\n');
        }
        tokio::fs::write(&path, updated).await?;
        return Ok(format!("appended to {} (+{})", step.target, pluralize(line_count(text), "line")));
    }

    Err(ToolError::MissingParameter("old/new, remove_lines, content or append".to_string()))
}

async fn delete(step: &ActionStep, workspace: &Path) -> Result<String, ToolError> {
    let path = resolve_in_workspace(workspace, &step.target)?;
    let meta = tokio::fs::metadata(&path).await?;
    if !meta.is_file() {
        return Err(ToolError::InvalidInput(format!("{} is not a file", step.target)));
    }
    let lines = tokio::fs::read_to_string(&path)
        .await
        .map(|c| line_count(&c))
        .unwrap_or(0);
    tokio::fs::remove_file(&path).await?;
    Ok(format!("deleted {} (-{})", step.target, pluralize(lines, "line")))
}

async fn rename(step: &ActionStep, workspace: &Path) -> Result<String, ToolError> {
    let from = resolve_in_workspace(workspace, &step.target)?;
    let to_target = step
        .param_str("to")
        .ok_or_else(|| ToolError::MissingParameter("to".to_string()))?;
    let to = resolve_in_workspace(workspace, to_target)?;

    if !from.exists() {
        return Err(ToolError::FileNotFound(step.target.clone()));
    }
    if to.exists() {
        return Err(ToolError::InvalidInput(format!("{to_target} already exists")));
    }
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::rename(&from, &to).await?;
    Ok(format!("renamed {} -> {}", step.target, to_target))
}

async fn run_shell(
    step: &ActionStep,
    workspace: &Path,
    shell: &dyn ShellRunner,
    limit: Duration,
) -> Result<String, ToolError> {
    let command = step.param_str("command").unwrap_or(&step.target);
    let output = shell.run(command, workspace, limit).await?;

    if output.timed_out {
        return Err(ToolError::Timeout(limit.as_millis() as u64));
    }
    if !output.success() {
        return Err(ToolError::ExecutionFailed(format!(
            "`{command}` exited with {}: {}",
            output.exit_code,
            crate::tools::truncate_text(output.stderr.trim(), 500)
        )));
    }
    Ok(format!("ran `{command}` (exit 0, {}ms)", output.duration_ms))
}

/// Check a step's post-condition after it was applied.
pub async fn verify_step(step: &ActionStep, workspace: &Path) -> Result<(), String> {
    let resolve = |target: &str| resolve_in_workspace(workspace, target).map_err(|e| e.to_string());

    match step.kind {
        StepKind::Create => {
            let path = resolve(&step.target)?;
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                Ok(())
            } else {
                Err(format!("{} does not exist", step.target))
            }
        }
        StepKind::Delete => {
            let path = resolve(&step.target)?;
            if tokio::fs::try_exists(&path).await.unwrap_or(true) {
                Err(format!("{} still exists", step.target))
            } else {
                Ok(())
            }
        }
        StepKind::Rename => {
            let from = resolve(&step.target)?;
            let to_target = step.param_str("to").unwrap_or_default();
            let to = resolve(to_target)?;
            if tokio::fs::try_exists(&from).await.unwrap_or(true) {
                return Err(format!("{} still exists", step.target));
            }
            if !tokio::fs::try_exists(&to).await.unwrap_or(false) {
                return Err(format!("{to_target} does not exist"));
            }
            Ok(())
        }
        StepKind::Edit | StepKind::Refactor => {
            let path = resolve(&step.target)?;
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| format!("cannot read {}: {e}", step.target))?;
            if let Some(text) = step.param_str("remove_lines") {
                return if content.lines().any(|l| l.contains(text)) {
                    Err(format!("{} still contains {text:?}", step.target))
                } else {
                    Ok(())
                };
            }
            let expected = step
                .param_str("new")
                .or_else(|| step.param_str("append"))
                .or_else(|| step.param_str("content"));
            match expected {
                Some(text) if !content.contains(text) => {
                    Err(format!("{} does not contain the expected text", step.target))
                }
                _ => Ok(()),
            }
        }
        StepKind::Shell | StepKind::Unknown => Ok(()),
    }
}
