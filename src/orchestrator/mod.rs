// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Action orchestrator: plan → approve → apply → verify.
//!
//! Every mutation of the workspace goes through an [`ActionPlan`]. The
//! orchestrator consults the supervisor's `read_only` flag before planning
//! and applying, applies approved steps strictly in order, and stops at the
//! first failure without rolling back earlier steps.
//!
//! # Approval
//!
//! | Mode     | Approved by `approve_plan`          |
//! |----------|-------------------------------------|
//! | `auto`   | every pending step                  |
//! | `scoped` | every pending step except delete/shell |
//! | `manual` | nothing; use `approve_step`         |

mod apply;
mod planner;
mod types;

pub use apply::{apply_step, resolve_in_workspace, verify_step};
pub use planner::{classify_prompt, KeywordPlanner, Planner, PromptAction};
pub use types::{
    ActionPhase, ActionPlan, ActionResult, ActionStep, PlanError, PlanStatus, StepDiff, StepKind,
    StepStatus,
};

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{debug, info, warn};

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::acp::{ActionSession, SessionEvent, SessionEventKind};
use crate::config::ApprovalMode;
use crate::error::RuntimeError;
use crate::supervisor::RuntimeSupervisor;
use crate::tools::ShellRunner;
use crate::trace::TraceCategory;

/// Runs action plans against the workspace.
pub struct ActionOrchestrator {
    supervisor: Arc<RuntimeSupervisor>,
    shell: Arc<dyn ShellRunner>,
    planner: Arc<dyn Planner>,
    shell_timeout: Duration,
}

impl ActionOrchestrator {
    /// Create an orchestrator using the [`KeywordPlanner`].
    pub fn new(supervisor: Arc<RuntimeSupervisor>, shell: Arc<dyn ShellRunner>) -> Self {
        let shell_timeout = Duration::from_millis(supervisor.config().shell_timeout_ms);
        Self {
            supervisor,
            shell,
            planner: Arc::new(KeywordPlanner),
            shell_timeout,
        }
    }

    /// Use an upstream planner instead of the keyword planner.
    pub fn with_planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.planner = planner;
        self
    }

    fn record(&self, session: Option<&Arc<dyn ActionSession>>, event: SessionEvent) {
        if let Some(session) = session {
            session.record(event);
        }
    }

    /// Build a plan from a prompt. Blocked while read-only.
    #[cfg_attr(feature = "telemetry", instrument(skip(self)))]
    pub async fn create_plan(&self, prompt: &str) -> ActionResult {
        let started = Instant::now();
        let params = json!({ "prompt": prompt });

        if self.supervisor.is_read_only() {
            warn!("Plan creation blocked: runtime is read-only");
            let result = ActionResult::read_only(ActionPhase::Plan);
            self.trace_result("create_plan", params, &result, started);
            return result;
        }

        let workspace = self.supervisor.workspace();
        let result = match self.planner.plan(prompt, &workspace).await {
            Ok(steps) if steps.is_empty() => {
                ActionResult::fail(ActionPhase::Plan, "No actionable steps recognised in prompt")
            }
            Ok(steps) => {
                let plan = ActionPlan::new(prompt, steps, self.supervisor.approval_mode());
                let session = self.supervisor.action_session().await;
                self.record(
                    session.as_ref(),
                    SessionEvent::new(SessionEventKind::PlanCreated, &plan.id, self.planner.name())
                        .with_params(json!({ "prompt": prompt, "steps": plan.steps.len() })),
                );
                info!(plan = %plan.id, steps = plan.steps.len(), planner = self.planner.name(), "Plan created");
                ActionResult::ok(
                    ActionPhase::Plan,
                    format!("Planned {} step(s)", plan.steps.len()),
                )
                .with_plan(&plan)
            }
            Err(e) => ActionResult::fail(ActionPhase::Plan, format!("Planner failed: {e}")),
        };

        self.trace_result("create_plan", params, &result, started);
        result
    }

    /// Approve pending steps per the approval policy. `auto` overrides the
    /// plan's mode. Returns true iff every step is Approved afterwards.
    pub async fn approve_plan(&self, plan: &mut ActionPlan, auto: bool) -> bool {
        if plan.status.is_terminal() {
            return false;
        }

        let mode = if auto { ApprovalMode::Auto } else { plan.approval_mode };
        let session = self.supervisor.action_session().await;

        for step in plan.steps.iter_mut() {
            if step.status != StepStatus::Pending {
                continue;
            }
            let approve = match mode {
                ApprovalMode::Auto => true,
                ApprovalMode::Scoped => !step.kind.is_dangerous(),
                ApprovalMode::Manual => false,
            };
            if approve && step.transition(StepStatus::Approved).is_ok() {
                self.record(
                    session.as_ref(),
                    SessionEvent::new(SessionEventKind::StepApproved, &plan.id, step.kind.tool_name())
                        .with_step(&step.id)
                        .with_detail(format!("policy: {mode}")),
                );
            }
        }

        plan.refresh_status();
        let approved = plan.is_fully_approved();
        debug!(
            plan = %plan.id,
            mode = %mode,
            pending = plan.pending_count(),
            approved,
            "Approval policy applied"
        );
        approved
    }

    /// Approve one pending step explicitly.
    pub async fn approve_step(&self, plan: &mut ActionPlan, step_id: &str) -> Result<(), PlanError> {
        self.decide_step(plan, step_id, StepStatus::Approved).await
    }

    /// Reject one pending step. Rejected steps are skipped by `apply_plan`.
    pub async fn reject_step(&self, plan: &mut ActionPlan, step_id: &str) -> Result<(), PlanError> {
        self.decide_step(plan, step_id, StepStatus::Rejected).await
    }

    async fn decide_step(
        &self,
        plan: &mut ActionPlan,
        step_id: &str,
        decision: StepStatus,
    ) -> Result<(), PlanError> {
        let plan_id = plan.id.clone();
        let step = plan
            .step_mut(step_id)
            .ok_or_else(|| PlanError::StepNotFound(step_id.to_string()))?;
        if step.status != StepStatus::Pending {
            return Err(PlanError::InvalidTransition {
                step_id: step_id.to_string(),
                from: step.status,
                to: decision,
            });
        }
        step.transition(decision)?;

        let kind = if decision == StepStatus::Approved {
            SessionEventKind::StepApproved
        } else {
            SessionEventKind::StepRejected
        };
        let event = SessionEvent::new(kind, &plan_id, step.kind.tool_name())
            .with_step(step_id)
            .with_detail("explicit");
        let session = self.supervisor.action_session().await;
        self.record(session.as_ref(), event);

        plan.refresh_status();
        Ok(())
    }

    /// Apply approved steps in order, stopping at the first failure.
    ///
    /// With `force`, pending steps are approved and applied too.
    #[cfg_attr(feature = "telemetry", instrument(skip(self, plan), fields(plan = %plan.id)))]
    pub async fn apply_plan(&self, plan: &mut ActionPlan, force: bool) -> ActionResult {
        let started = Instant::now();
        let params = json!({ "plan_id": plan.id, "force": force });

        if plan.status == PlanStatus::Failed {
            return ActionResult::fail(ActionPhase::Apply, "Plan has already failed").with_plan(plan);
        }
        if self.supervisor.is_read_only() {
            let result = ActionResult::read_only(ActionPhase::Apply).with_plan(plan);
            self.trace_result("apply_plan", params, &result, started);
            return result;
        }

        let pending = plan.pending_count();
        if pending > 0 && !force {
            let mut result = ActionResult::fail(
                ActionPhase::Apply,
                RuntimeError::ApprovalRequired { pending }.to_string(),
            )
            .with_plan(plan);
            result.approval_required = true;
            self.trace_result("apply_plan", params, &result, started);
            return result;
        }

        let session = self.supervisor.action_session().await;
        let workspace = self.supervisor.workspace();

        if force {
            for step in plan.steps.iter_mut().filter(|s| s.status == StepStatus::Pending) {
                if step.transition(StepStatus::Approved).is_ok() {
                    self.record(
                        session.as_ref(),
                        SessionEvent::new(SessionEventKind::StepApproved, &plan.id, step.kind.tool_name())
                            .with_step(&step.id)
                            .with_detail("forced"),
                    );
                }
            }
        }

        let mut diffs = Vec::new();
        let mut failure = None;

        for step in plan.steps.iter_mut() {
            if step.status != StepStatus::Approved {
                continue;
            }

            let step_started = Instant::now();
            let step_params = json!({
                "step_id": step.id,
                "kind": step.kind,
                "target": step.target,
                "params": step.params,
            });

            match apply_step(step, &workspace, self.shell.as_ref(), self.shell_timeout).await {
                Ok(summary) => {
                    step.transition(StepStatus::Applied).ok();
                    step.result = Some(summary.clone());
                    self.record(
                        session.as_ref(),
                        SessionEvent::new(SessionEventKind::StepApplied, &plan.id, step.kind.tool_name())
                            .with_step(&step.id)
                            .with_params(step_params.clone())
                            .with_detail(&summary),
                    );
                    self.supervisor.trace().record_ok(
                        TraceCategory::Orchestrator,
                        "apply_step",
                        step_params,
                        json!({ "summary": summary }),
                        step_started.elapsed(),
                    );
                    diffs.push(StepDiff {
                        step_id: step.id.clone(),
                        kind: step.kind,
                        target: step.target.clone(),
                        summary,
                    });
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!(step = %step.id, kind = %step.kind, error = %message, "Step failed");
                    step.fail(&message);
                    self.record(
                        session.as_ref(),
                        SessionEvent::new(SessionEventKind::StepFailed, &plan.id, step.kind.tool_name())
                            .with_step(&step.id)
                            .with_params(step_params.clone())
                            .with_detail(&message),
                    );
                    self.supervisor.trace().record_err(
                        TraceCategory::Orchestrator,
                        "apply_step",
                        step_params,
                        &message,
                        step_started.elapsed(),
                    );
                    failure = Some(RuntimeError::ActionApplication {
                        step_id: step.id.clone(),
                        message,
                    });
                    break;
                }
            }
        }

        plan.refresh_status();

        let mut result = match failure {
            None => ActionResult::ok(ActionPhase::Apply, ""),
            Some(error) => ActionResult::fail(ActionPhase::Apply, error.to_string()),
        }
        .with_plan(plan)
        .with_diffs(diffs);
        result.message = format!("{} of {} steps applied", result.applied, result.total);
        if let Some(ref error) = result.error {
            result.message = format!("{}; {error}", result.message);
        }

        info!(plan = %plan.id, applied = result.applied, failed = result.failed, "Plan applied");
        self.trace_result("apply_plan", params, &result, started);
        result
    }

    /// Check post-conditions of applied steps. No rollback on failure.
    #[cfg_attr(feature = "telemetry", instrument(skip(self, plan), fields(plan = %plan.id)))]
    pub async fn verify_plan(&self, plan: &mut ActionPlan) -> ActionResult {
        let started = Instant::now();
        let params = json!({ "plan_id": plan.id });

        if plan.status == PlanStatus::Failed {
            return ActionResult::fail(ActionPhase::Verify, "Plan has already failed").with_plan(plan);
        }
        if plan.count(StepStatus::Applied) == 0 {
            return ActionResult::fail(ActionPhase::Verify, "No applied steps to verify").with_plan(plan);
        }

        let session = self.supervisor.action_session().await;
        let workspace = self.supervisor.workspace();
        let mut first_failure = None;

        for step in plan.steps.iter_mut() {
            if step.status != StepStatus::Applied {
                continue;
            }
            match verify_step(step, &workspace).await {
                Ok(()) => {
                    step.transition(StepStatus::Verified).ok();
                    self.record(
                        session.as_ref(),
                        SessionEvent::new(SessionEventKind::StepVerified, &plan.id, step.kind.tool_name())
                            .with_step(&step.id),
                    );
                }
                Err(message) => {
                    warn!(step = %step.id, error = %message, "Verification failed");
                    step.fail(&message);
                    self.record(
                        session.as_ref(),
                        SessionEvent::new(SessionEventKind::StepFailed, &plan.id, step.kind.tool_name())
                            .with_step(&step.id)
                            .with_detail(&message),
                    );
                    first_failure.get_or_insert(RuntimeError::VerificationFailure {
                        step_id: step.id.clone(),
                        message,
                    });
                }
            }
        }

        plan.refresh_status();

        let mut result = match first_failure {
            None => ActionResult::ok(ActionPhase::Verify, ""),
            Some(error) => ActionResult::fail(ActionPhase::Verify, error.to_string()),
        }
        .with_plan(plan);
        result.message = format!("{} of {} steps verified", result.verified, result.total);
        if let Some(ref error) = result.error {
            result.message = format!("{}; {error}", result.message);
        }

        self.trace_result("verify_plan", params, &result, started);
        result
    }

    /// Run the full pipeline, stopping at the first failing phase.
    #[cfg_attr(feature = "telemetry", instrument(skip(self)))]
    pub async fn execute(&self, prompt: &str, auto_approve: bool) -> ActionResult {
        let planned = self.create_plan(prompt).await;
        let Some(mut plan) = planned.plan.clone().filter(|_| planned.success) else {
            return planned;
        };

        if !self.approve_plan(&mut plan, auto_approve).await {
            let mut result = ActionResult::fail(
                ActionPhase::Approve,
                RuntimeError::ApprovalRequired {
                    pending: plan.pending_count(),
                }
                .to_string(),
            )
            .with_plan(&plan);
            result.approval_required = true;
            return result;
        }

        let applied = self.apply_plan(&mut plan, false).await;
        if !applied.success {
            return applied;
        }

        let mut verified = self.verify_plan(&mut plan).await;
        verified.diffs = applied.diffs;
        verified
    }

    fn trace_result(&self, action: &str, params: serde_json::Value, result: &ActionResult, started: Instant) {
        let trace = self.supervisor.trace();
        match result.error {
            Some(ref error) if !result.success => {
                trace.record_err(TraceCategory::Orchestrator, action, params, error, started.elapsed())
            }
            _ => trace.record_ok(
                TraceCategory::Orchestrator,
                action,
                params,
                json!({
                    "plan_id": result.plan_id,
                    "applied": result.applied,
                    "verified": result.verified,
                    "total": result.total,
                }),
                started.elapsed(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acp::{AcpError, ActionBackendLauncher, LocalSessionLauncher};
    use crate::config::RuntimeConfig;
    use crate::error::AgentError;
    use crate::tools::BashRunner;
    use async_trait::async_trait;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    struct FixedPlanner(Vec<ActionStep>);

    #[async_trait]
    impl Planner for FixedPlanner {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn plan(&self, _prompt: &str, _ws: &Path) -> Result<Vec<ActionStep>, AgentError> {
            Ok(self.0.clone())
        }
    }

    struct DownLauncher;

    #[async_trait]
    impl ActionBackendLauncher for DownLauncher {
        async fn launch(
            &self,
            _workspace: &Path,
            _mode: ApprovalMode,
        ) -> Result<Arc<dyn ActionSession>, AcpError> {
            Err(AcpError::StartupFailed("unreachable".to_string()))
        }
    }

    async fn orchestrator(dir: &TempDir, mode: ApprovalMode, acp_up: bool) -> ActionOrchestrator {
        let config = RuntimeConfig::for_workspace(dir.path()).with_approval_mode(mode);
        let launcher: Arc<dyn ActionBackendLauncher> = if acp_up {
            Arc::new(LocalSessionLauncher)
        } else {
            Arc::new(DownLauncher)
        };
        let supervisor = RuntimeSupervisor::builder(config)
            .action_backend(launcher)
            .build()
            .unwrap();
        supervisor.start().await.unwrap();
        ActionOrchestrator::new(Arc::new(supervisor), Arc::new(BashRunner))
    }

    #[tokio::test]
    async fn test_read_only_blocks_planning() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(&dir, ApprovalMode::Manual, false).await;

        let result = orch.create_plan("create file foo.py").await;
        assert!(!result.success);
        assert!(result.read_only_blocked);
        assert!(result.plan.is_none());
    }

    #[tokio::test]
    async fn test_auto_mode_overrides_missing_backend() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(&dir, ApprovalMode::Auto, false).await;

        let result = orch.execute("create file foo.py", false).await;
        assert!(result.success, "{:?}", result.error);
        assert!(dir.path().join("foo.py").exists());
    }

    #[tokio::test]
    async fn test_scoped_approval_holds_dangerous_steps() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(&dir, ApprovalMode::Scoped, true).await;

        let mut plan = orch.create_plan("create file a.txt").await.plan.unwrap();
        plan.steps.push(ActionStep::new(StepKind::Shell, "echo hi", "run"));

        assert!(!orch.approve_plan(&mut plan, false).await);
        assert_eq!(plan.steps[0].status, StepStatus::Approved);
        assert_eq!(plan.steps[1].status, StepStatus::Pending);

        let blocked = orch.apply_plan(&mut plan, false).await;
        assert!(!blocked.success);
        assert!(blocked.approval_required);
        assert!(blocked.error.unwrap().contains("1 step(s)"));
    }

    #[tokio::test]
    async fn test_manual_approve_and_reject_steps() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(&dir, ApprovalMode::Manual, true).await;

        let mut plan = orch.create_plan("create a.txt and b.txt").await.plan.unwrap();
        assert!(!orch.approve_plan(&mut plan, false).await);
        assert_eq!(plan.pending_count(), 2);

        let (first, second) = (plan.steps[0].id.clone(), plan.steps[1].id.clone());
        orch.approve_step(&mut plan, &first).await.unwrap();
        orch.reject_step(&mut plan, &second).await.unwrap();
        assert!(orch.reject_step(&mut plan, &first).await.is_err());
        assert!(matches!(
            orch.approve_step(&mut plan, "nope").await,
            Err(PlanError::StepNotFound(_))
        ));

        let result = orch.apply_plan(&mut plan, false).await;
        assert!(result.success);
        assert_eq!(result.message, "1 of 1 steps applied");
        assert!(dir.path().join("a.txt").exists());
        assert!(!dir.path().join("b.txt").exists());
    }

    #[tokio::test]
    async fn test_apply_stops_at_first_failure() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("exists.txt"), "x").unwrap();
        let steps = vec![
            ActionStep::new(StepKind::Create, "one.txt", "c1"),
            ActionStep::new(StepKind::Create, "two.txt", "c2"),
            ActionStep::new(StepKind::Create, "exists.txt", "c3"),
            ActionStep::new(StepKind::Create, "four.txt", "c4"),
        ];
        let orch = orchestrator(&dir, ApprovalMode::Auto, true)
            .await
            .with_planner(Arc::new(FixedPlanner(steps)));

        let mut plan = orch.create_plan("anything").await.plan.unwrap();
        assert!(orch.approve_plan(&mut plan, false).await);

        let result = orch.apply_plan(&mut plan, false).await;
        assert!(!result.success);
        assert_eq!((result.applied, result.failed), (2, 1));
        assert!(result.message.starts_with("2 of 4 steps applied"));
        assert_eq!(result.diffs.len(), 2);
        assert_eq!(plan.status, PlanStatus::Failed);
        assert_eq!(plan.steps[3].status, StepStatus::Approved);
        // Earlier steps stay applied.
        assert!(dir.path().join("one.txt").exists());
        assert!(!dir.path().join("four.txt").exists());

        // Failed plans are no-ops from here on.
        let again = orch.apply_plan(&mut plan, true).await;
        assert!(!again.success);
        let verify = orch.verify_plan(&mut plan).await;
        assert!(!verify.success);
        assert_eq!(plan.steps[0].status, StepStatus::Applied);
    }

    #[tokio::test]
    async fn test_force_applies_pending_steps() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(&dir, ApprovalMode::Manual, true).await;

        let mut plan = orch.create_plan("create forced.txt").await.plan.unwrap();
        let result = orch.apply_plan(&mut plan, true).await;
        assert!(result.success);
        assert!(dir.path().join("forced.txt").exists());
    }

    #[tokio::test]
    async fn test_escape_fails_step() {
        let dir = tempdir().unwrap();
        let steps = vec![ActionStep::new(StepKind::Create, "../escape.txt", "escape")];
        let orch = orchestrator(&dir, ApprovalMode::Auto, true)
            .await
            .with_planner(Arc::new(FixedPlanner(steps)));

        let result = orch.execute("anything", false).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Security violation"));
    }

    #[tokio::test]
    async fn test_execute_full_cycle_records_session() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(&dir, ApprovalMode::Manual, true).await;

        let result = orch
            .execute("create hello.py with content \"print('hi')\"", true)
            .await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.phase, ActionPhase::Verify);
        assert_eq!(result.verified, 1);
        assert_eq!(result.diffs.len(), 1);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("hello.py")).unwrap(),
            "print('hi')"
        );
        assert_eq!(result.plan.unwrap().status, PlanStatus::Verified);

        let session = orch.supervisor.action_session().await.unwrap();
        let kinds: Vec<_> = session.events().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SessionEventKind::PlanCreated,
                SessionEventKind::StepApproved,
                SessionEventKind::StepApplied,
                SessionEventKind::StepVerified,
            ]
        );
        assert!(!orch
            .supervisor
            .trace()
            .entries_for(TraceCategory::Orchestrator)
            .is_empty());
    }

    #[tokio::test]
    async fn test_verify_failure_marks_step() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(&dir, ApprovalMode::Auto, true).await;

        let mut plan = orch.create_plan("create temp.txt").await.plan.unwrap();
        orch.approve_plan(&mut plan, false).await;
        assert!(orch.apply_plan(&mut plan, false).await.success);

        std::fs::remove_file(dir.path().join("temp.txt")).unwrap();
        let result = orch.verify_plan(&mut plan).await;
        assert!(!result.success);
        assert_eq!(plan.steps[0].status, StepStatus::Failed);
        assert_eq!(plan.status, PlanStatus::Failed);
    }

    #[tokio::test]
    async fn test_unrecognised_prompt_fails() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(&dir, ApprovalMode::Auto, true).await;
        let result = orch.create_plan("how are you?").await;
        assert!(!result.success);
        assert!(!result.read_only_blocked);
    }
}
