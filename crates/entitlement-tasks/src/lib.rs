//! Task Manager (C7): enqueue, inspect, and cancel background jobs.
//!
//! This crate owns the job descriptor lifecycle and queue routing; it
//! does not run workers itself — workers are a separate process that
//! pulls from `TASK_BROKER_URL`/`TASK_RESULT_BACKEND` and calls back
//! into [`TaskManager::start`]/[`finish`](TaskManager::finish)/
//! [`fail_attempt`](TaskManager::fail_attempt), the way the teacher's
//! `TaskExecutor` hands a `TaskSpawner` handle to callers that run the
//! futures on a shared runtime while this layer only tracks state.

use chrono::{DateTime, Utc};
use entitlement_metrics::TaskManagerMetrics;
pub use entitlement_primitives::TaskKind;
use entitlement_primitives::{Task, TaskState};
use entitlement_storage::{StorageError, TaskStore};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task not found")]
    NotFound,
    #[error("operation requires administrator privileges")]
    Forbidden,
    #[error("task storage unavailable: {0}")]
    StorageUnavailable(#[from] StorageError),
}

/// Default retry policy from spec.md §4.7: 3 attempts, 60s base delay
/// between attempts, 30 minute hard limit, 25 minute soft limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub hard_time_limit: Duration,
    pub soft_time_limit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(60),
            hard_time_limit: Duration::from_secs(30 * 60),
            soft_time_limit: Duration::from_secs(25 * 60),
        }
    }
}

impl RetryPolicy {
    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}

/// Outcome of reporting a worker-side failure for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    WillRetry { attempt: u32, delay: Duration },
    Exhausted,
}

/// Per-queue counts for `worker_stats()`. There is no separate worker
/// registry in this core — health is reported per queue, the unit
/// workers actually pull from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub in_progress: u64,
}

pub struct TaskManager<S: TaskStore> {
    store: std::sync::Arc<S>,
    retry_policy: RetryPolicy,
    metrics: TaskManagerMetrics,
}

impl<S: TaskStore> TaskManager<S> {
    pub fn new(store: std::sync::Arc<S>) -> Self {
        Self { store, retry_policy: RetryPolicy::default(), metrics: TaskManagerMetrics::default() }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }

    /// Enqueues `kind` on behalf of `owner_id`. Admin-only kinds
    /// (`reset_monthly_free_turns`, `send_system_notification`,
    /// `cleanup_tasks`, `recover_pending_payments`) require
    /// `requester_is_admin`.
    pub async fn enqueue(&self, kind: TaskKind, owner_id: Option<Uuid>, requester_is_admin: bool, now: DateTime<Utc>) -> Result<Uuid, TaskError> {
        if kind.admin_only() && !requester_is_admin {
            return Err(TaskError::Forbidden);
        }
        let task = Task::new(Uuid::new_v4(), kind.clone(), owner_id, now);
        let id = task.id;
        self.store.insert(task).await?;
        self.metrics.inc_enqueued(kind_label(&kind));
        tracing::info!(task_id = %id, queue = kind.queue(), "task enqueued");
        Ok(id)
    }

    /// Ordinary users may only inspect tasks they created; admins may
    /// inspect any task.
    pub async fn status(&self, task_id: Uuid, requester_id: Option<Uuid>, requester_is_admin: bool) -> Result<Task, TaskError> {
        let task = self.store.get(task_id).await.map_err(map_not_found)?;
        if requester_is_admin || task.owner_id == requester_id {
            Ok(task)
        } else {
            Err(TaskError::Forbidden)
        }
    }

    /// Cancels a `Pending` or `InProgress` task. Returns whether a
    /// cancellation actually happened (false if already terminal).
    pub async fn cancel(&self, task_id: Uuid, requester_id: Option<Uuid>, requester_is_admin: bool) -> Result<bool, TaskError> {
        let task = self.store.get(task_id).await.map_err(map_not_found)?;
        if !requester_is_admin && task.owner_id != requester_id {
            return Err(TaskError::Forbidden);
        }
        if matches!(task.state, TaskState::Pending | TaskState::InProgress) {
            self.store.set_state(task_id, TaskState::Cancelled).await?;
            self.metrics.inc_cancelled();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// In-progress and pending tasks, grouped by the queue they route to.
    pub async fn active(&self) -> Result<BTreeMap<&'static str, Vec<Task>>, TaskError> {
        let tasks = self.store.active().await?;
        let mut grouped: BTreeMap<&'static str, Vec<Task>> = BTreeMap::new();
        for task in tasks {
            grouped.entry(task.kind.queue()).or_default().push(task);
        }
        Ok(grouped)
    }

    /// Per-queue pending/in-progress counts, the closest analogue this
    /// core has to "per-worker health" absent a worker registry.
    pub async fn worker_stats(&self) -> Result<BTreeMap<&'static str, QueueStats>, TaskError> {
        let tasks = self.store.active().await?;
        let mut stats: BTreeMap<&'static str, QueueStats> = BTreeMap::new();
        for task in tasks {
            let entry = stats.entry(task.kind.queue()).or_default();
            match task.state {
                TaskState::Pending => entry.pending += 1,
                TaskState::InProgress => entry.in_progress += 1,
                _ => {}
            }
        }
        self.metrics.set_active_jobs(stats.values().map(|s| s.pending + s.in_progress).sum::<u64>() as usize);
        Ok(stats)
    }

    /// Called by a worker when it picks a task off its queue.
    pub async fn start(&self, task_id: Uuid) -> Result<(), TaskError> {
        self.store.set_state(task_id, TaskState::InProgress).await.map_err(map_not_found)
    }

    pub async fn finish(&self, task_id: Uuid, result: serde_json::Value) -> Result<(), TaskError> {
        self.store.complete(task_id, result).await.map_err(map_not_found)
    }

    /// Reports a failed attempt. Re-queues as `Pending` if attempts
    /// remain under the retry policy, otherwise marks `Failed`.
    pub async fn fail_attempt(&self, task_id: Uuid, attempt: u32, error: String) -> Result<AttemptOutcome, TaskError> {
        if self.retry_policy.exhausted(attempt) {
            self.store.fail(task_id, error).await.map_err(map_not_found)?;
            self.metrics.inc_failed(kind_label(&self.store.get(task_id).await.map_err(map_not_found)?.kind));
            Ok(AttemptOutcome::Exhausted)
        } else {
            self.store.set_state(task_id, TaskState::Pending).await.map_err(map_not_found)?;
            tracing::warn!(task_id = %task_id, attempt, %error, "task attempt failed, will retry");
            Ok(AttemptOutcome::WillRetry { attempt: attempt + 1, delay: self.retry_policy.base_delay })
        }
    }

    /// Deletes terminal tasks older than the retention window.
    pub async fn prune(&self, older_than: DateTime<Utc>) -> Result<u64, TaskError> {
        Ok(self.store.prune_before(older_than).await?)
    }
}

fn map_not_found(err: StorageError) -> TaskError {
    match err {
        StorageError::NotFound => TaskError::NotFound,
        other => TaskError::StorageUnavailable(other),
    }
}

fn kind_label(kind: &TaskKind) -> &'static str {
    match kind {
        TaskKind::ResetMonthlyFreeTurns => "reset_monthly_free_turns",
        TaskKind::SendBulkEmail { .. } => "send_bulk_email",
        TaskKind::SendSingleEmail { .. } => "send_single_email",
        TaskKind::ProcessDailyReminders => "process_daily_reminders",
        TaskKind::SendSystemNotification { .. } => "send_system_notification",
        TaskKind::CleanupTasks { .. } => "cleanup_tasks",
        TaskKind::RecoverPendingPayments => "recover_pending_payments",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitlement_storage::InMemoryTaskStore;
    use std::sync::Arc;

    fn manager() -> TaskManager<InMemoryTaskStore> {
        TaskManager::new(Arc::new(InMemoryTaskStore::new()))
    }

    #[tokio::test]
    async fn non_admin_cannot_enqueue_admin_only_kind() {
        let mgr = manager();
        let err = mgr.enqueue(TaskKind::ResetMonthlyFreeTurns, None, false, Utc::now()).await.unwrap_err();
        assert!(matches!(err, TaskError::Forbidden));
    }

    #[tokio::test]
    async fn admin_can_enqueue_and_owner_can_inspect() {
        let mgr = manager();
        let owner = Uuid::new_v4();
        let id = mgr
            .enqueue(TaskKind::SendSingleEmail { template: "welcome".into(), recipient_id: owner }, Some(owner), false, Utc::now())
            .await
            .unwrap();

        let status = mgr.status(id, Some(owner), false).await.unwrap();
        assert_eq!(status.state, TaskState::Pending);

        let stranger = Uuid::new_v4();
        let err = mgr.status(id, Some(stranger), false).await.unwrap_err();
        assert!(matches!(err, TaskError::Forbidden));
    }

    #[tokio::test]
    async fn cancel_is_idempotent_on_terminal_tasks() {
        let mgr = manager();
        let id = mgr.enqueue(TaskKind::ProcessDailyReminders, None, false, Utc::now()).await.unwrap();
        assert!(mgr.cancel(id, None, true).await.unwrap());
        assert!(!mgr.cancel(id, None, true).await.unwrap());
    }

    #[tokio::test]
    async fn fail_attempt_retries_until_exhausted() {
        let mgr = manager();
        let id = mgr.enqueue(TaskKind::ProcessDailyReminders, None, false, Utc::now()).await.unwrap();

        let first = mgr.fail_attempt(id, 1, "boom".into()).await.unwrap();
        assert_eq!(first, AttemptOutcome::WillRetry { attempt: 2, delay: Duration::from_secs(60) });

        let second = mgr.fail_attempt(id, 2, "boom again".into()).await.unwrap();
        assert_eq!(second, AttemptOutcome::WillRetry { attempt: 3, delay: Duration::from_secs(60) });

        let third = mgr.fail_attempt(id, 3, "still broken".into()).await.unwrap();
        assert_eq!(third, AttemptOutcome::Exhausted);

        let task = mgr.status(id, None, true).await.unwrap();
        assert_eq!(task.state, TaskState::Failed);
    }

    #[tokio::test]
    async fn active_groups_by_queue() {
        let mgr = manager();
        mgr.enqueue(TaskKind::SendBulkEmail { template: "t".into(), recipient_ids: vec![] }, None, true, Utc::now()).await.unwrap();
        mgr.enqueue(TaskKind::ProcessDailyReminders, None, false, Utc::now()).await.unwrap();

        let grouped = mgr.active().await.unwrap();
        assert_eq!(grouped.get("email").map(Vec::len), Some(1));
        assert_eq!(grouped.get("notifications").map(Vec::len), Some(1));
    }
}
