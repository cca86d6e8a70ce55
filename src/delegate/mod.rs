// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Subagent delegation.
//!
//! A [`SubagentDelegator`] hands objectives to named agents under two hard
//! limits: at most `max_concurrent_subagents` tasks hold a permit at once,
//! and at most `max_total_subagents` tasks are ever created. Requests that
//! hit the total limit, or name an unknown agent, are rejected before a task
//! exists and do not consume quota.
//!
//! Cancellation only changes status. A task cancelled while waiting for a
//! permit never runs; a task cancelled while running keeps its `cancelled`
//! status when the agent finishes.

pub mod agent;
pub mod types;

pub use agent::{AgentRegistry, AgentReply, Chatter, SubagentFactory};
pub use types::{
    DelegationConfig, DelegationRequest, DelegationResult, DelegationStats, DelegationTask,
    TaskStatus,
};

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{AgentError, ConfigError, RuntimeError};
use crate::trace::{RuntimeTrace, TraceCategory};

/// Errors raised by the delegator itself, as opposed to failed tasks.
#[derive(Error, Debug)]
pub enum DelegationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Subagent task {task_id} panicked: {message}")]
    Panicked { task_id: String, message: String },
}

/// How a run ended, before it is written back to the task table.
enum Outcome {
    Completed(AgentReply),
    OverBudget(AgentReply),
    Failed(String),
    Cancelled,
    TimedOut,
}

#[derive(Default)]
struct TaskTable {
    by_id: HashMap<String, DelegationTask>,
    /// Task ids in creation order.
    order: Vec<String>,
}

struct Inner {
    config: DelegationConfig,
    factory: Arc<dyn SubagentFactory>,
    permits: Arc<Semaphore>,
    total_created: AtomicUsize,
    running: AtomicUsize,
    peak_running: AtomicUsize,
    tasks: RwLock<TaskTable>,
    trace: RuntimeTrace,
}

/// Counts a task as running for as long as it is alive.
struct RunningGuard<'a> {
    inner: &'a Inner,
}

impl<'a> RunningGuard<'a> {
    fn enter(inner: &'a Inner) -> Self {
        let now = inner.running.fetch_add(1, Ordering::SeqCst) + 1;
        inner.peak_running.fetch_max(now, Ordering::SeqCst);
        Self { inner }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.inner.running.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Delegates objectives to subagents. Cheap to clone; clones share limits
/// and the task table.
#[derive(Clone)]
pub struct SubagentDelegator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SubagentDelegator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubagentDelegator")
            .field("config", &self.inner.config)
            .field("stats", &self.get_stats())
            .finish()
    }
}

impl SubagentDelegator {
    pub fn new(
        config: DelegationConfig,
        factory: Arc<dyn SubagentFactory>,
    ) -> Result<Self, DelegationError> {
        Self::with_trace(config, factory, RuntimeTrace::disabled())
    }

    /// Like [`new`](Self::new), recording each delegation in `trace`.
    pub fn with_trace(
        config: DelegationConfig,
        factory: Arc<dyn SubagentFactory>,
        trace: RuntimeTrace,
    ) -> Result<Self, DelegationError> {
        config.validate()?;
        info!(
            max_concurrent = config.max_concurrent_subagents,
            max_total = config.max_total_subagents,
            "Subagent delegator created"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                permits: Arc::new(Semaphore::new(config.max_concurrent_subagents)),
                config,
                factory,
                total_created: AtomicUsize::new(0),
                running: AtomicUsize::new(0),
                peak_running: AtomicUsize::new(0),
                tasks: RwLock::new(TaskTable::default()),
                trace,
            }),
        })
    }

    pub fn config(&self) -> &DelegationConfig {
        &self.inner.config
    }

    /// Run one delegation to completion. Failures are reported in the
    /// result, never as an error.
    pub async fn delegate(&self, request: DelegationRequest) -> DelegationResult {
        match self.register(&request) {
            Ok(task_id) => self.run(&task_id).await,
            Err(rejected) => rejected,
        }
    }

    /// Run several delegations concurrently, subject to the same limits.
    ///
    /// Results come back in request order. Quota is reserved in request
    /// order too, so with a nearly exhausted quota the later requests are
    /// the ones rejected. A panicking agent becomes a failed result when
    /// `collect_all` is set; otherwise the first panic is returned as an
    /// error once every task has finished.
    pub async fn delegate_parallel(
        &self,
        requests: Vec<DelegationRequest>,
        collect_all: bool,
    ) -> Result<Vec<DelegationResult>, DelegationError> {
        let pending: Vec<_> = requests
            .iter()
            .map(|request| {
                self.register(request).map(|task_id| {
                    let this = self.clone();
                    let id = task_id.clone();
                    (task_id, tokio::spawn(async move { this.run(&id).await }))
                })
            })
            .collect();

        let joined = join_all(pending.into_iter().map(|slot| async move {
            match slot {
                Err(rejected) => Ok(rejected),
                Ok((task_id, handle)) => handle.await.map_err(|e| (task_id, e)),
            }
        }))
        .await;

        let mut first_panic = None;
        let mut results = Vec::with_capacity(joined.len());
        for outcome in joined {
            match outcome {
                Ok(result) => results.push(result),
                Err((task_id, err)) => {
                    let message = panic_message(err);
                    warn!(task_id = %task_id, message = %message, "Subagent task panicked");
                    results.push(self.mark_panicked(&task_id, &message));
                    if !collect_all && first_panic.is_none() {
                        first_panic = Some(DelegationError::Panicked { task_id, message });
                    }
                }
            }
        }

        match first_panic {
            Some(err) => Err(err),
            None => Ok(results),
        }
    }

    /// Mark a pending or running task cancelled. Returns false when the task
    /// is unknown or already finished.
    pub fn cancel_task(&self, task_id: &str) -> bool {
        let mut table = self.table_mut();
        match table.by_id.get_mut(task_id) {
            Some(task) if !task.status.is_terminal() => {
                cancel(task);
                info!(task_id, agent = %task.agent_name, "Subagent task cancelled");
                true
            }
            _ => false,
        }
    }

    /// Cancel every unfinished task. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let mut table = self.table_mut();
        let mut cancelled = 0;
        for task in table.by_id.values_mut() {
            if !task.status.is_terminal() {
                cancel(task);
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            info!(cancelled, "Cancelled all unfinished subagent tasks");
        }
        cancelled
    }

    pub fn get_stats(&self) -> DelegationStats {
        let table = self.table();
        let mut stats = DelegationStats::default();
        for task in table.by_id.values() {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
                TaskStatus::Timeout => stats.timed_out += 1,
            }
        }
        let total = self.inner.total_created.load(Ordering::SeqCst);
        stats.executing = self.inner.running.load(Ordering::SeqCst);
        stats.peak_running = self.inner.peak_running.load(Ordering::SeqCst);
        stats.total_created = total;
        stats.remaining_quota = self.inner.config.max_total_subagents.saturating_sub(total);
        stats.max_concurrent = self.inner.config.max_concurrent_subagents;
        stats
    }

    pub fn get_task(&self, task_id: &str) -> Option<DelegationTask> {
        self.table().by_id.get(task_id).cloned()
    }

    /// All tasks in creation order.
    pub fn list_tasks(&self) -> Vec<DelegationTask> {
        let table = self.table();
        table
            .order
            .iter()
            .filter_map(|id| table.by_id.get(id).cloned())
            .collect()
    }

    // ------------------------------------------------------------------------

    fn table(&self) -> std::sync::RwLockReadGuard<'_, TaskTable> {
        self.inner.tasks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn table_mut(&self) -> std::sync::RwLockWriteGuard<'_, TaskTable> {
        self.inner.tasks.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn reserve_slot(&self) -> bool {
        let max = self.inner.config.max_total_subagents;
        self.inner
            .total_created
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .is_ok()
    }

    /// Validate a request and create its task, or explain the rejection.
    fn register(&self, request: &DelegationRequest) -> Result<String, DelegationResult> {
        let config = &self.inner.config;

        if !self.inner.factory.has_agent(&request.agent_name) {
            let error = format!("Unknown agent: {}", request.agent_name);
            warn!(agent = %request.agent_name, "Delegation rejected: unknown agent");
            self.trace_rejection(request, &error);
            return Err(DelegationResult::rejected(&request.agent_name, error));
        }

        if !self.reserve_slot() {
            let error = RuntimeError::DelegationLimitExceeded {
                limit_name: "max_total_subagents",
                limit: config.max_total_subagents,
            }
            .to_string();
            warn!(agent = %request.agent_name, limit = config.max_total_subagents, "Delegation rejected: quota exhausted");
            self.trace_rejection(request, &error);
            return Err(DelegationResult::rejected(&request.agent_name, error));
        }

        let task = DelegationTask::new(
            request,
            config.clamp_timeout(request.timeout_seconds),
            config.clamp_steps(request.max_steps),
        );
        let task_id = task.task_id.clone();
        debug!(
            task_id = %task_id,
            agent = %task.agent_name,
            timeout_seconds = task.timeout_seconds,
            max_steps = task.max_steps,
            "Subagent task created"
        );

        let mut table = self.table_mut();
        table.order.push(task_id.clone());
        table.by_id.insert(task_id.clone(), task);
        Ok(task_id)
    }

    async fn run(&self, task_id: &str) -> DelegationResult {
        let started = Instant::now();

        let _permit = match self.inner.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return self.finish(task_id, Outcome::Failed("delegator is shut down".to_string()), started)
            }
        };

        let Some(task) = self.begin(task_id) else {
            debug!(task_id, "Subagent task cancelled before it started");
            return self.result_of(task_id);
        };
        let _running = RunningGuard::enter(&self.inner);

        let Some(agent) = self.inner.factory.create(&task.agent_name) else {
            let error = format!("Unknown agent: {}", task.agent_name);
            return self.finish(task_id, Outcome::Failed(error), started);
        };

        let Ok(limit) = Duration::try_from_secs_f64(task.timeout_seconds) else {
            let error = format!("Invalid timeout: {}s", task.timeout_seconds);
            return self.finish(task_id, Outcome::Failed(error), started);
        };
        let outcome = match timeout(limit, agent.chat(&task.prompt())).await {
            Ok(Ok(reply)) if reply.steps > task.max_steps => Outcome::OverBudget(reply),
            Ok(Ok(reply)) => Outcome::Completed(reply),
            Ok(Err(AgentError::Cancelled)) => Outcome::Cancelled,
            Ok(Err(e)) => Outcome::Failed(e.to_string()),
            Err(_) => Outcome::TimedOut,
        };

        self.finish(task_id, outcome, started)
    }

    /// Move a pending task to running. `None` if it was cancelled meanwhile.
    fn begin(&self, task_id: &str) -> Option<DelegationTask> {
        let mut table = self.table_mut();
        let task = table.by_id.get_mut(task_id)?;
        if task.status != TaskStatus::Pending {
            return None;
        }
        task.status = TaskStatus::Running;
        task.started_at = Some(Utc::now());
        Some(task.clone())
    }

    fn finish(&self, task_id: &str, outcome: Outcome, started: Instant) -> DelegationResult {
        let task = {
            let mut table = self.table_mut();
            let Some(task) = table.by_id.get_mut(task_id) else {
                return DelegationResult::rejected("unknown", format!("Task not found: {task_id}"));
            };
            let now = Utc::now();
            task.started_at.get_or_insert(now);

            if task.status == TaskStatus::Cancelled {
                if let Outcome::Completed(ref reply) | Outcome::OverBudget(ref reply) = outcome {
                    task.steps_taken = reply.steps;
                    task.tokens_used = reply.tokens_used;
                }
            } else {
                apply_outcome(task, outcome);
            }
            task.finished_at = Some(now);
            task.clone()
        };

        match task.status {
            TaskStatus::Completed => info!(
                task_id,
                agent = %task.agent_name,
                steps = task.steps_taken,
                "Subagent task completed"
            ),
            status => warn!(
                task_id,
                agent = %task.agent_name,
                status = %status,
                error = task.error.as_deref().unwrap_or(""),
                "Subagent task did not complete"
            ),
        }
        self.trace_task(&task, started.elapsed());

        DelegationResult::from_task(&task)
    }

    fn result_of(&self, task_id: &str) -> DelegationResult {
        match self.table().by_id.get(task_id) {
            Some(task) => DelegationResult::from_task(task),
            None => DelegationResult::rejected("unknown", format!("Task not found: {task_id}")),
        }
    }

    fn mark_panicked(&self, task_id: &str, message: &str) -> DelegationResult {
        let mut table = self.table_mut();
        match table.by_id.get_mut(task_id) {
            Some(task) => {
                if !task.status.is_terminal() {
                    task.status = TaskStatus::Failed;
                    task.error = Some(format!("Subagent panicked: {message}"));
                    task.finished_at = Some(Utc::now());
                }
                DelegationResult::from_task(task)
            }
            None => DelegationResult::rejected("unknown", format!("Subagent panicked: {message}")),
        }
    }

    fn trace_rejection(&self, request: &DelegationRequest, error: &str) {
        self.inner.trace.record_err(
            TraceCategory::Delegator,
            "delegate",
            json!({ "agent": request.agent_name, "objective": request.objective }),
            error,
            Duration::ZERO,
        );
    }

    fn trace_task(&self, task: &DelegationTask, elapsed: Duration) {
        let params = json!({
            "agent": task.agent_name,
            "task_id": task.task_id,
            "objective": task.objective,
        });
        match task.status {
            TaskStatus::Completed => self.inner.trace.record_ok(
                TraceCategory::Delegator,
                "delegate",
                params,
                json!({ "status": task.status, "steps": task.steps_taken, "tokens": task.tokens_used }),
                elapsed,
            ),
            status => self.inner.trace.record_err(
                TraceCategory::Delegator,
                "delegate",
                params,
                task.error.clone().unwrap_or_else(|| status.to_string()),
                elapsed,
            ),
        }
    }
}

fn cancel(task: &mut DelegationTask) {
    task.status = TaskStatus::Cancelled;
    task.error = Some("Cancelled".to_string());
    task.finished_at = Some(Utc::now());
}

fn apply_outcome(task: &mut DelegationTask, outcome: Outcome) {
    match outcome {
        Outcome::Completed(reply) => {
            task.status = TaskStatus::Completed;
            task.steps_taken = reply.steps;
            task.tokens_used = reply.tokens_used;
            task.result = Some(reply.content);
        }
        Outcome::OverBudget(reply) => {
            task.status = TaskStatus::Failed;
            task.steps_taken = reply.steps;
            task.tokens_used = reply.tokens_used;
            task.result = Some(reply.content);
            task.error = Some(AgentError::MaxStepsExceeded(task.max_steps).to_string());
        }
        Outcome::Failed(error) => {
            task.status = TaskStatus::Failed;
            task.error = Some(error);
        }
        Outcome::Cancelled => {
            task.status = TaskStatus::Cancelled;
            task.error = Some(AgentError::Cancelled.to_string());
        }
        Outcome::TimedOut => {
            task.status = TaskStatus::Timeout;
            task.error = Some(RuntimeError::DelegationTimeout(task.timeout_seconds).to_string());
        }
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Replies after `delay`, tracking how many calls overlap.
    struct SlowAgent {
        delay: Duration,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Chatter for SlowAgent {
        async fn chat(&self, prompt: &str) -> Result<AgentReply, AgentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(AgentReply::text(format!("done: {}", prompt.lines().next().unwrap_or(""))).with_tokens(7))
        }
    }

    struct FailingAgent;

    #[async_trait]
    impl Chatter for FailingAgent {
        async fn chat(&self, _prompt: &str) -> Result<AgentReply, AgentError> {
            Err(AgentError::RequestFailed("model unavailable".to_string()))
        }
    }

    struct PanickingAgent;

    #[async_trait]
    impl Chatter for PanickingAgent {
        async fn chat(&self, _prompt: &str) -> Result<AgentReply, AgentError> {
            panic!("agent exploded");
        }
    }

    struct VerboseAgent;

    #[async_trait]
    impl Chatter for VerboseAgent {
        async fn chat(&self, _prompt: &str) -> Result<AgentReply, AgentError> {
            Ok(AgentReply::text("too long").with_steps(50))
        }
    }

    struct Counters {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        calls: Arc<AtomicUsize>,
    }

    fn registry(delay: Duration) -> (AgentRegistry, Counters) {
        let counters = Counters {
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let (active, peak, calls) = (
            counters.active.clone(),
            counters.peak.clone(),
            counters.calls.clone(),
        );
        let registry = AgentRegistry::new()
            .with_agent("worker", move || {
                Arc::new(SlowAgent {
                    delay,
                    active: active.clone(),
                    peak: peak.clone(),
                    calls: calls.clone(),
                }) as Arc<dyn Chatter>
            })
            .with_agent("failing", || Arc::new(FailingAgent) as Arc<dyn Chatter>)
            .with_agent("panicking", || Arc::new(PanickingAgent) as Arc<dyn Chatter>)
            .with_agent("verbose", || Arc::new(VerboseAgent) as Arc<dyn Chatter>);
        (registry, counters)
    }

    fn delegator(config: DelegationConfig, delay: Duration) -> (SubagentDelegator, Counters) {
        let (registry, counters) = registry(delay);
        let delegator = SubagentDelegator::new(config, Arc::new(registry)).unwrap();
        (delegator, counters)
    }

    #[tokio::test]
    async fn test_delegate_completes() {
        let (delegator, counters) = delegator(DelegationConfig::default(), Duration::ZERO);

        let result = delegator
            .delegate(DelegationRequest::new("worker", "summarize the repo"))
            .await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.status, Some(TaskStatus::Completed));
        assert_eq!(result.output.as_deref(), Some("done: Objective: summarize the repo"));
        assert_eq!(result.tokens_used, 7);
        assert_eq!(counters.calls.load(Ordering::SeqCst), 1);

        let task = delegator.get_task(result.task_id.as_deref().unwrap()).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.started_at.is_some() && task.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let (registry, _) = registry(Duration::ZERO);
        let config = DelegationConfig {
            max_total_subagents: 0,
            ..Default::default()
        };
        let err = SubagentDelegator::new(config, Arc::new(registry)).unwrap_err();
        assert!(matches!(err, DelegationError::Config(_)));
    }

    #[tokio::test]
    async fn test_unknown_agent_does_not_consume_quota() {
        let config = DelegationConfig {
            max_total_subagents: 1,
            ..Default::default()
        };
        let (delegator, _) = delegator(config, Duration::ZERO);

        let rejected = delegator.delegate(DelegationRequest::new("ghost", "haunt")).await;
        assert!(!rejected.success);
        assert!(rejected.task_id.is_none());
        assert_eq!(rejected.error.as_deref(), Some("Unknown agent: ghost"));
        assert_eq!(delegator.get_stats().total_created, 0);

        let accepted = delegator.delegate(DelegationRequest::new("worker", "work")).await;
        assert!(accepted.success);
    }

    #[tokio::test]
    async fn test_total_limit_rejects_third_request() {
        let config = DelegationConfig {
            max_total_subagents: 2,
            ..Default::default()
        };
        let (delegator, _) = delegator(config, Duration::ZERO);

        assert!(delegator.delegate(DelegationRequest::new("worker", "one")).await.success);
        assert!(delegator.delegate(DelegationRequest::new("worker", "two")).await.success);
        let before = delegator.get_stats();

        let third = delegator.delegate(DelegationRequest::new("worker", "three")).await;
        assert!(!third.success);
        assert!(third.status.is_none());
        let error = third.error.unwrap();
        assert!(error.contains("max_total_subagents"), "{error}");

        let after = delegator.get_stats();
        assert_eq!(after.running, before.running);
        assert_eq!(after.total_created, 2);
        assert_eq!(after.remaining_quota, 0);
        assert_eq!(delegator.list_tasks().len(), 2);
    }

    #[tokio::test]
    async fn test_timeout_marks_task() {
        let (delegator, _) = delegator(DelegationConfig::default(), Duration::from_secs(5));

        let result = delegator
            .delegate(DelegationRequest::new("worker", "slow").with_timeout(0.01))
            .await;

        assert!(!result.success);
        assert_eq!(result.status, Some(TaskStatus::Timeout));
        assert_eq!(result.error.as_deref(), Some("Subagent timed out after 0.01s"));
        assert_eq!(delegator.get_stats().executing, 0);
    }

    #[tokio::test]
    async fn test_unrepresentable_timeout_rejected_at_construction() {
        let (registry, _) = registry(Duration::ZERO);
        let config = DelegationConfig {
            max_timeout_seconds: 1e30,
            ..Default::default()
        };
        let err = SubagentDelegator::new(config, Arc::new(registry)).unwrap_err();
        assert!(err.to_string().contains("maxTimeoutSeconds"));
    }

    #[tokio::test]
    async fn test_huge_requested_timeout_is_capped() {
        let (delegator, _) = delegator(DelegationConfig::default(), Duration::ZERO);

        let result = delegator
            .delegate(DelegationRequest::new("worker", "patient").with_timeout(1e25))
            .await;

        assert!(result.success, "{:?}", result.error);
        let task = delegator.get_task(result.task_id.as_deref().unwrap()).unwrap();
        assert_eq!(task.timeout_seconds, 600.0);
    }

    #[tokio::test]
    async fn test_requested_limits_are_clamped() {
        let (delegator, _) = delegator(DelegationConfig::default(), Duration::ZERO);

        let result = delegator
            .delegate(
                DelegationRequest::new("worker", "clamp")
                    .with_timeout(10_000.0)
                    .with_max_steps(500),
            )
            .await;

        let task = delegator.get_task(result.task_id.as_deref().unwrap()).unwrap();
        assert_eq!(task.timeout_seconds, 600.0);
        assert_eq!(task.max_steps, 20);
    }

    #[tokio::test]
    async fn test_failing_agent() {
        let (delegator, _) = delegator(DelegationConfig::default(), Duration::ZERO);

        let result = delegator.delegate(DelegationRequest::new("failing", "try")).await;
        assert_eq!(result.status, Some(TaskStatus::Failed));
        assert!(result.error.unwrap().contains("model unavailable"));
    }

    #[tokio::test]
    async fn test_step_budget_enforced() {
        let (delegator, _) = delegator(DelegationConfig::default(), Duration::ZERO);

        let result = delegator
            .delegate(DelegationRequest::new("verbose", "ramble").with_max_steps(5))
            .await;
        assert_eq!(result.status, Some(TaskStatus::Failed));
        assert_eq!(result.steps_taken, 50);
        assert_eq!(result.error.as_deref(), Some("Maximum steps exceeded: 5"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_bound() {
        let config = DelegationConfig {
            max_concurrent_subagents: 2,
            max_total_subagents: 10,
            ..Default::default()
        };
        let (delegator, counters) = delegator(config, Duration::from_millis(50));

        let requests = (0..6)
            .map(|i| DelegationRequest::new("worker", format!("task {i}")))
            .collect();
        let results = delegator.delegate_parallel(requests, true).await.unwrap();

        assert_eq!(results.len(), 6);
        assert!(results.iter().all(|r| r.success));
        let stats = delegator.get_stats();
        assert!(stats.peak_running <= 2, "peak {}", stats.peak_running);
        assert!(counters.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(stats.completed, 6);
        assert_eq!(stats.executing, 0);
    }

    #[tokio::test]
    async fn test_parallel_preserves_order_and_rejects_over_quota() {
        let config = DelegationConfig {
            max_total_subagents: 2,
            ..Default::default()
        };
        let (delegator, _) = delegator(config, Duration::from_millis(5));

        let requests = vec![
            DelegationRequest::new("worker", "first"),
            DelegationRequest::new("ghost", "missing"),
            DelegationRequest::new("worker", "second"),
            DelegationRequest::new("worker", "third"),
        ];
        let results = delegator.delegate_parallel(requests, true).await.unwrap();

        assert_eq!(results.len(), 4);
        assert!(results[0].output.as_deref().unwrap().contains("first"));
        assert_eq!(results[1].error.as_deref(), Some("Unknown agent: ghost"));
        assert!(results[2].output.as_deref().unwrap().contains("second"));
        assert!(results[3].error.as_deref().unwrap().contains("max_total_subagents"));
    }

    #[tokio::test]
    async fn test_panic_collected_as_failure() {
        let (delegator, _) = delegator(DelegationConfig::default(), Duration::ZERO);

        let requests = vec![
            DelegationRequest::new("panicking", "boom"),
            DelegationRequest::new("worker", "fine"),
        ];
        let results = delegator.delegate_parallel(requests, true).await.unwrap();

        assert!(!results[0].success);
        assert_eq!(results[0].status, Some(TaskStatus::Failed));
        assert!(results[0].error.as_deref().unwrap().contains("agent exploded"));
        assert!(results[1].success);

        let stats = delegator.get_stats();
        assert_eq!(stats.executing, 0);
        assert_eq!(stats.running, 0);
    }

    #[tokio::test]
    async fn test_panic_returned_as_error() {
        let (delegator, _) = delegator(DelegationConfig::default(), Duration::ZERO);

        let err = delegator
            .delegate_parallel(vec![DelegationRequest::new("panicking", "boom")], false)
            .await
            .unwrap_err();

        match err {
            DelegationError::Panicked { task_id, message } => {
                assert!(message.contains("agent exploded"));
                let task = delegator.get_task(&task_id).unwrap();
                assert_eq!(task.status, TaskStatus::Failed);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_pending_task_never_runs() {
        let config = DelegationConfig {
            max_concurrent_subagents: 1,
            ..Default::default()
        };
        let (delegator, counters) = delegator(config, Duration::from_millis(200));

        let first = tokio::spawn({
            let d = delegator.clone();
            async move { d.delegate(DelegationRequest::new("worker", "first")).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = tokio::spawn({
            let d = delegator.clone();
            async move { d.delegate(DelegationRequest::new("worker", "second")).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let waiting = delegator
            .list_tasks()
            .into_iter()
            .find(|t| t.status == TaskStatus::Pending)
            .expect("second task should be waiting for a permit");
        assert!(delegator.cancel_task(&waiting.task_id));
        assert!(!delegator.cancel_task(&waiting.task_id));

        let second = second.await.unwrap();
        assert_eq!(second.status, Some(TaskStatus::Cancelled));
        assert!(!second.success);

        assert!(first.await.unwrap().success);
        assert_eq!(counters.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_running_task_keeps_status() {
        let (delegator, _) = delegator(DelegationConfig::default(), Duration::from_millis(100));

        let handle = tokio::spawn({
            let d = delegator.clone();
            async move { d.delegate(DelegationRequest::new("worker", "long")).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(delegator.cancel_all(), 1);
        let result = handle.await.unwrap();

        assert_eq!(result.status, Some(TaskStatus::Cancelled));
        assert!(!result.success);
        assert_eq!(result.tokens_used, 7);
        assert_eq!(delegator.cancel_all(), 0);
    }

    #[tokio::test]
    async fn test_cancel_unknown_task() {
        let (delegator, _) = delegator(DelegationConfig::default(), Duration::ZERO);
        assert!(!delegator.cancel_task("nope"));
        assert!(delegator.get_task("nope").is_none());
    }

    #[tokio::test]
    async fn test_stats_are_idempotent() {
        let (delegator, _) = delegator(DelegationConfig::default(), Duration::ZERO);
        delegator.delegate(DelegationRequest::new("worker", "a")).await;
        delegator.delegate(DelegationRequest::new("failing", "b")).await;

        let first = delegator.get_stats();
        let second = delegator.get_stats();
        assert_eq!(first, second);
        assert_eq!(first.completed, 1);
        assert_eq!(first.failed, 1);
        assert_eq!(first.remaining_quota, 8);
        assert_eq!(first.peak_running, 1);
    }

    #[tokio::test]
    async fn test_delegations_are_traced() {
        let (registry, _) = registry(Duration::ZERO);
        let trace = RuntimeTrace::new();
        let delegator =
            SubagentDelegator::with_trace(DelegationConfig::default(), Arc::new(registry), trace.clone())
                .unwrap();

        delegator.delegate(DelegationRequest::new("worker", "a")).await;
        delegator.delegate(DelegationRequest::new("ghost", "b")).await;

        let entries = trace.entries_for(TraceCategory::Delegator);
        assert_eq!(entries.len(), 2);
        assert!(!entries[0].is_error());
        assert!(entries[1].is_error());
    }
}
