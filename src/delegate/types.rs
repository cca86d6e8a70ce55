// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Delegation configuration, tasks and results.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ============================================================================
// Configuration
// ============================================================================

/// Limits for one delegator. Fixed for the delegator's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DelegationConfig {
    /// Tasks allowed to run at the same time.
    pub max_concurrent_subagents: usize,
    /// Tasks a delegator will ever create.
    pub max_total_subagents: usize,
    pub default_timeout_seconds: f64,
    /// Upper bound applied to requested timeouts.
    pub max_timeout_seconds: f64,
    pub max_steps_per_subagent: u32,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_subagents: 3,
            max_total_subagents: 10,
            default_timeout_seconds: 300.0,
            max_timeout_seconds: 600.0,
            max_steps_per_subagent: 20,
        }
    }
}

impl DelegationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_subagents == 0 {
            return Err(ConfigError::invalid(
                "delegation.maxConcurrentSubagents",
                "must be greater than zero",
            ));
        }
        if self.max_total_subagents == 0 {
            return Err(ConfigError::invalid(
                "delegation.maxTotalSubagents",
                "must be greater than zero",
            ));
        }
        if !(self.default_timeout_seconds.is_finite() && self.default_timeout_seconds > 0.0) {
            return Err(ConfigError::invalid(
                "delegation.defaultTimeoutSeconds",
                "must be a positive number",
            ));
        }
        if !self.max_timeout_seconds.is_finite() || self.max_timeout_seconds < self.default_timeout_seconds {
            return Err(ConfigError::invalid(
                "delegation.maxTimeoutSeconds",
                "must be at least defaultTimeoutSeconds",
            ));
        }
        if Duration::try_from_secs_f64(self.max_timeout_seconds).is_err() {
            return Err(ConfigError::invalid(
                "delegation.maxTimeoutSeconds",
                "is too large to represent as a duration",
            ));
        }
        if self.max_steps_per_subagent == 0 {
            return Err(ConfigError::invalid(
                "delegation.maxStepsPerSubagent",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Requested timeout clamped to the maximum. Missing, non-positive or
    /// non-finite values use the default.
    pub fn clamp_timeout(&self, requested: Option<f64>) -> f64 {
        match requested {
            Some(t) if t.is_finite() && t > 0.0 => t.min(self.max_timeout_seconds),
            _ => self.default_timeout_seconds,
        }
    }

    /// Requested step budget clamped to the maximum. Missing or zero uses
    /// the maximum.
    pub fn clamp_steps(&self, requested: Option<u32>) -> u32 {
        match requested {
            Some(n) if n > 0 => n.min(self.max_steps_per_subagent),
            _ => self.max_steps_per_subagent,
        }
    }
}

// ============================================================================
// Tasks
// ============================================================================

/// Status of a delegated task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled | Self::Timeout)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A delegated unit of work and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationTask {
    pub task_id: String,
    pub agent_name: String,
    pub objective: String,
    pub status: TaskStatus,
    pub timeout_seconds: f64,
    pub max_steps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub steps_taken: u32,
    pub tokens_used: u64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl DelegationTask {
    pub(crate) fn new(request: &DelegationRequest, timeout_seconds: f64, max_steps: u32) -> Self {
        Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            agent_name: request.agent_name.clone(),
            objective: request.objective.clone(),
            status: TaskStatus::Pending,
            timeout_seconds,
            max_steps,
            context: request.context.clone(),
            result: None,
            error: None,
            steps_taken: 0,
            tokens_used: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Prompt sent to the agent.
    pub fn prompt(&self) -> String {
        let mut prompt = format!("Objective: {}\n", self.objective);
        if let Some(ref context) = self.context {
            prompt.push_str(&format!("\nContext:\n{context}\n"));
        }
        prompt.push_str(&format!(
            "\nComplete the objective in at most {} steps and reply with the result.",
            self.max_steps
        ));
        prompt
    }

    /// Wall time from start to finish, in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => (end - start).num_milliseconds().max(0) as u64,
            _ => 0,
        }
    }
}

// ============================================================================
// Requests and Results
// ============================================================================

/// A request to delegate work to a named agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationRequest {
    pub agent_name: String,
    pub objective: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u32>,
}

impl DelegationRequest {
    pub fn new(agent_name: impl Into<String>, objective: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            objective: objective.into(),
            context: None,
            timeout_seconds: None,
            max_steps: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    pub fn with_max_steps(mut self, steps: u32) -> Self {
        self.max_steps = Some(steps);
        self
    }
}

/// Outcome of one delegation. Requests rejected before a task was created
/// have no `task_id` and no `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub agent_name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub steps_taken: u32,
    pub tokens_used: u64,
}

impl DelegationResult {
    pub(crate) fn rejected(agent_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            task_id: None,
            agent_name: agent_name.into(),
            success: false,
            status: None,
            output: None,
            error: Some(error.into()),
            duration_ms: 0,
            steps_taken: 0,
            tokens_used: 0,
        }
    }

    pub(crate) fn from_task(task: &DelegationTask) -> Self {
        Self {
            task_id: Some(task.task_id.clone()),
            agent_name: task.agent_name.clone(),
            success: task.status == TaskStatus::Completed,
            status: Some(task.status),
            output: task.result.clone(),
            error: task.error.clone(),
            duration_ms: task.duration_ms(),
            steps_taken: task.steps_taken,
            tokens_used: task.tokens_used,
        }
    }
}

/// Delegator statistics. Calling `get_stats` does not change them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DelegationStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub timed_out: usize,
    /// Tasks holding a concurrency permit right now.
    pub executing: usize,
    /// Highest `executing` value observed.
    pub peak_running: usize,
    pub total_created: usize,
    pub remaining_quota: usize,
    pub max_concurrent: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DelegationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_concurrent_subagents, 3);
        assert_eq!(config.max_total_subagents, 10);
    }

    #[test]
    fn test_validate_rejects_bad_limits() {
        let zero = DelegationConfig {
            max_concurrent_subagents: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        let inverted = DelegationConfig {
            default_timeout_seconds: 100.0,
            max_timeout_seconds: 10.0,
            ..Default::default()
        };
        let err = inverted.validate().unwrap_err();
        assert!(err.to_string().contains("maxTimeoutSeconds"));

        let unbounded = DelegationConfig {
            max_timeout_seconds: 1e30,
            ..Default::default()
        };
        assert!(unbounded.validate().is_err());
    }

    #[test]
    fn test_clamping() {
        let config = DelegationConfig::default();
        assert_eq!(config.clamp_timeout(None), 300.0);
        assert_eq!(config.clamp_timeout(Some(0.0)), 300.0);
        assert_eq!(config.clamp_timeout(Some(-5.0)), 300.0);
        assert_eq!(config.clamp_timeout(Some(f64::NAN)), 300.0);
        assert_eq!(config.clamp_timeout(Some(0.01)), 0.01);
        assert_eq!(config.clamp_timeout(Some(10_000.0)), 600.0);

        assert_eq!(config.clamp_steps(None), 20);
        assert_eq!(config.clamp_steps(Some(0)), 20);
        assert_eq!(config.clamp_steps(Some(5)), 5);
        assert_eq!(config.clamp_steps(Some(50)), 20);
    }

    #[test]
    fn test_prompt_includes_context_and_budget() {
        let request = DelegationRequest::new("reviewer", "Review lib.rs").with_context("focus on errors");
        let task = DelegationTask::new(&request, 30.0, 5);
        let prompt = task.prompt();
        assert!(prompt.starts_with("Objective: Review lib.rs"));
        assert!(prompt.contains("focus on errors"));
        assert!(prompt.contains("at most 5 steps"));
    }

    #[test]
    fn test_config_deserializes_camel_case() {
        let config: DelegationConfig =
            serde_json::from_str(r#"{"maxConcurrentSubagents": 2, "maxTotalSubagents": 4}"#).unwrap();
        assert_eq!(config.max_concurrent_subagents, 2);
        assert_eq!(config.max_total_subagents, 4);
        assert_eq!(config.max_steps_per_subagent, 20);
    }
}
