// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Plan, step and result types for the action pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ApprovalMode;

// ============================================================================
// Step Kind
// ============================================================================

/// What a step does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Create,
    Edit,
    Delete,
    Rename,
    Shell,
    Refactor,
    Unknown,
}

impl StepKind {
    /// Kinds that `scoped` approval never approves automatically.
    pub fn is_dangerous(&self) -> bool {
        matches!(self, Self::Delete | Self::Shell)
    }

    /// Tool name used in session events.
    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::Create => "create_file",
            Self::Edit => "edit_file",
            Self::Delete => "delete_file",
            Self::Rename => "rename_file",
            Self::Shell => "shell",
            Self::Refactor => "refactor",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tool_name())
    }
}

// ============================================================================
// Step Status
// ============================================================================

/// Lifecycle of a step.
///
/// ```text
/// Pending ──▶ Approved ──▶ Applied ──▶ Verified
///    │           │           │
///    ├──▶ Rejected           │
///    └───────────┴───────────┴──▶ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Approved,
    Rejected,
    Applied,
    Failed,
    Verified,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Verified | Self::Failed)
    }

    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        use StepStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Pending, Failed)
                | (Approved, Applied)
                | (Approved, Failed)
                | (Applied, Verified)
                | (Applied, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Applied => "applied",
            Self::Failed => "failed",
            Self::Verified => "verified",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from manipulating a plan by hand.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("Step not found: {0}")]
    StepNotFound(String),

    #[error("Step {step_id} cannot move from {from} to {to}")]
    InvalidTransition {
        step_id: String,
        from: StepStatus,
        to: StepStatus,
    },
}

// ============================================================================
// Action Step
// ============================================================================

/// One unit of work in a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStep {
    pub id: String,
    pub kind: StepKind,
    pub description: String,
    /// Workspace-relative path, or the command for shell steps.
    pub target: String,
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionStep {
    pub fn new(kind: StepKind, target: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            description: description.into(),
            target: target.into(),
            params: BTreeMap::new(),
            status: StepStatus::Pending,
            result: None,
            error: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }

    pub fn param_bool(&self, key: &str) -> bool {
        self.params.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
    }

    /// Move to `next`, rejecting backward or sideways moves.
    pub fn transition(&mut self, next: StepStatus) -> Result<(), PlanError> {
        if !self.status.can_transition_to(next) {
            return Err(PlanError::InvalidTransition {
                step_id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Move to Failed with an error. No-op on terminal steps.
    pub(crate) fn fail(&mut self, error: impl Into<String>) {
        if self.transition(StepStatus::Failed).is_ok() {
            self.error = Some(error.into());
        }
    }
}

// ============================================================================
// Action Plan
// ============================================================================

/// Aggregate status of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    Approved,
    Applied,
    Verified,
    Rejected,
    Failed,
}

impl PlanStatus {
    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Approved => 1,
            Self::Applied => 2,
            Self::Verified => 3,
            Self::Rejected | Self::Failed => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Verified | Self::Rejected | Self::Failed)
    }
}

/// An ordered list of steps produced from one prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub id: String,
    pub prompt: String,
    pub steps: Vec<ActionStep>,
    pub created_at: DateTime<Utc>,
    pub status: PlanStatus,
    pub approval_mode: ApprovalMode,
}

impl ActionPlan {
    pub fn new(prompt: impl Into<String>, steps: Vec<ActionStep>, approval_mode: ApprovalMode) -> Self {
        let mut plan = Self {
            id: uuid::Uuid::new_v4().to_string(),
            prompt: prompt.into(),
            steps,
            created_at: Utc::now(),
            status: PlanStatus::Pending,
            approval_mode,
        };
        plan.refresh_status();
        plan
    }

    pub fn step(&self, step_id: &str) -> Option<&ActionStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn step_mut(&mut self, step_id: &str) -> Option<&mut ActionStep> {
        self.steps.iter_mut().find(|s| s.id == step_id)
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    pub fn pending_count(&self) -> usize {
        self.count(StepStatus::Pending)
    }

    pub fn is_fully_approved(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(|s| s.status == StepStatus::Approved)
    }

    fn aggregate(&self) -> PlanStatus {
        use StepStatus::*;

        if self.steps.iter().any(|s| s.status == Failed) {
            return PlanStatus::Failed;
        }
        let live: Vec<StepStatus> = self
            .steps
            .iter()
            .map(|s| s.status)
            .filter(|s| *s != Rejected)
            .collect();
        if live.is_empty() {
            return if self.steps.is_empty() {
                PlanStatus::Pending
            } else {
                PlanStatus::Rejected
            };
        }
        if live.iter().all(|s| *s == Verified) {
            PlanStatus::Verified
        } else if live.iter().all(|s| matches!(s, Applied | Verified)) {
            PlanStatus::Applied
        } else if live.iter().all(|s| matches!(s, Approved | Applied | Verified)) {
            PlanStatus::Approved
        } else {
            PlanStatus::Pending
        }
    }

    /// Recompute the aggregate status. It only ever moves forward, and a
    /// terminal status is kept.
    pub fn refresh_status(&mut self) -> PlanStatus {
        let next = self.aggregate();
        if !self.status.is_terminal() && next.rank() >= self.status.rank() {
            self.status = next;
        }
        self.status
    }
}

// ============================================================================
// Results
// ============================================================================

/// Pipeline phase an [`ActionResult`] reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPhase {
    Plan,
    Approve,
    Apply,
    Verify,
}

/// Change made by one applied step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDiff {
    pub step_id: String,
    pub kind: StepKind,
    pub target: String,
    pub summary: String,
}

/// Outcome of an orchestrator operation. Always carries partial progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub phase: ActionPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Blocked because the runtime is read-only.
    pub read_only_blocked: bool,
    /// Blocked because steps still need approval.
    pub approval_required: bool,
    pub applied: usize,
    pub failed: usize,
    pub verified: usize,
    /// Steps that count toward progress (everything not rejected).
    pub total: usize,
    #[serde(default)]
    pub diffs: Vec<StepDiff>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<ActionPlan>,
}

impl ActionResult {
    fn empty(phase: ActionPhase, success: bool, message: String) -> Self {
        Self {
            success,
            phase,
            plan_id: None,
            message,
            error: None,
            read_only_blocked: false,
            approval_required: false,
            applied: 0,
            failed: 0,
            verified: 0,
            total: 0,
            diffs: Vec::new(),
            plan: None,
        }
    }

    pub(crate) fn ok(phase: ActionPhase, message: impl Into<String>) -> Self {
        Self::empty(phase, true, message.into())
    }

    pub(crate) fn fail(phase: ActionPhase, error: impl Into<String>) -> Self {
        let error = error.into();
        let mut result = Self::empty(phase, false, error.clone());
        result.error = Some(error);
        result
    }

    pub(crate) fn read_only(phase: ActionPhase) -> Self {
        let mut result = Self::fail(
            phase,
            crate::error::RuntimeError::ReadOnly("action backend unavailable".to_string()).to_string(),
        );
        result.read_only_blocked = true;
        result
    }

    /// Fill counts and a snapshot from `plan`.
    pub(crate) fn with_plan(mut self, plan: &ActionPlan) -> Self {
        self.plan_id = Some(plan.id.clone());
        self.applied = plan
            .steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Applied | StepStatus::Verified))
            .count();
        self.failed = plan.count(StepStatus::Failed);
        self.verified = plan.count(StepStatus::Verified);
        self.total = plan.steps.len() - plan.count(StepStatus::Rejected);
        self.plan = Some(plan.clone());
        self
    }

    pub(crate) fn with_diffs(mut self, diffs: Vec<StepDiff>) -> Self {
        self.diffs = diffs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(kinds: &[StepKind]) -> ActionPlan {
        let steps = kinds
            .iter()
            .map(|k| ActionStep::new(*k, "a.txt", "test"))
            .collect();
        ActionPlan::new("test", steps, ApprovalMode::Manual)
    }

    #[test]
    fn test_step_transitions_only_move_forward() {
        let mut step = ActionStep::new(StepKind::Create, "a.txt", "create");
        step.transition(StepStatus::Approved).unwrap();
        step.transition(StepStatus::Applied).unwrap();

        let err = step.transition(StepStatus::Approved).unwrap_err();
        assert!(matches!(err, PlanError::InvalidTransition { .. }));
        assert!(step.transition(StepStatus::Pending).is_err());

        step.transition(StepStatus::Verified).unwrap();
        assert!(step.status.is_terminal());
        assert!(step.transition(StepStatus::Failed).is_err());
    }

    #[test]
    fn test_fail_ignores_terminal_steps() {
        let mut step = ActionStep::new(StepKind::Delete, "a.txt", "delete");
        step.transition(StepStatus::Rejected).unwrap();
        step.fail("boom");
        assert_eq!(step.status, StepStatus::Rejected);
        assert!(step.error.is_none());
    }

    #[test]
    fn test_plan_status_aggregates() {
        let mut plan = plan(&[StepKind::Create, StepKind::Shell]);
        assert_eq!(plan.status, PlanStatus::Pending);

        plan.steps[0].transition(StepStatus::Approved).unwrap();
        assert_eq!(plan.refresh_status(), PlanStatus::Pending);

        plan.steps[1].transition(StepStatus::Rejected).unwrap();
        assert_eq!(plan.refresh_status(), PlanStatus::Approved);

        plan.steps[0].transition(StepStatus::Applied).unwrap();
        assert_eq!(plan.refresh_status(), PlanStatus::Applied);

        plan.steps[0].transition(StepStatus::Verified).unwrap();
        assert_eq!(plan.refresh_status(), PlanStatus::Verified);
    }

    #[test]
    fn test_plan_failed_is_terminal() {
        let mut plan = plan(&[StepKind::Create, StepKind::Edit]);
        plan.steps[0].fail("disk full");
        assert_eq!(plan.refresh_status(), PlanStatus::Failed);
        assert_eq!(plan.refresh_status(), PlanStatus::Failed);
    }

    #[test]
    fn test_all_rejected() {
        let mut plan = plan(&[StepKind::Delete]);
        plan.steps[0].transition(StepStatus::Rejected).unwrap();
        assert_eq!(plan.refresh_status(), PlanStatus::Rejected);
    }

    #[test]
    fn test_result_counts() {
        let mut plan = plan(&[StepKind::Create, StepKind::Create, StepKind::Create]);
        for step in plan.steps.iter_mut().take(2) {
            step.transition(StepStatus::Approved).unwrap();
            step.transition(StepStatus::Applied).unwrap();
        }
        plan.steps[2].fail("exists");

        let result = ActionResult::ok(ActionPhase::Apply, "done").with_plan(&plan);
        assert_eq!((result.applied, result.failed, result.total), (2, 1, 3));
        assert_eq!(result.plan_id.as_deref(), Some(plan.id.as_str()));
    }

    #[test]
    fn test_dangerous_kinds() {
        assert!(StepKind::Delete.is_dangerous());
        assert!(StepKind::Shell.is_dangerous());
        assert!(!StepKind::Create.is_dangerous());
        assert!(!StepKind::Edit.is_dangerous());
    }
}
