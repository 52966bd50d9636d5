use crate::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use entitlement_primitives::{Task, TaskState};
use uuid::Uuid;

/// Persistence for the Task Manager (C7). Tasks are looked up by id for
/// status/cancel, listed for the active set, and pruned by age for the
/// retention sweep — see spec.md §4.7.
#[async_trait]
pub trait TaskStore: Send + Sync + 'static {
    async fn insert(&self, task: Task) -> Result<(), StorageError>;

    async fn get(&self, task_id: Uuid) -> Result<Task, StorageError>;

    async fn set_state(&self, task_id: Uuid, state: TaskState) -> Result<(), StorageError>;

    async fn complete(&self, task_id: Uuid, result: serde_json::Value) -> Result<(), StorageError>;

    async fn fail(&self, task_id: Uuid, error: String) -> Result<(), StorageError>;

    /// Tasks in `Pending` or `InProgress`, for worker-stats reporting.
    async fn active(&self) -> Result<Vec<Task>, StorageError>;

    /// Deletes terminal tasks (`Success`, `Failed`, `Cancelled`) created
    /// before `older_than`, returning the number removed.
    async fn prune_before(&self, older_than: DateTime<Utc>) -> Result<u64, StorageError>;
}

pub mod postgres {
    use super::*;
    use entitlement_primitives::TaskKind;
    use sqlx::{PgPool, Row};

    pub struct PostgresTaskStore {
        pool: PgPool,
    }

    impl PostgresTaskStore {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }
    }

    fn state_to_row(state: TaskState) -> &'static str {
        match state {
            TaskState::Pending => "pending",
            TaskState::InProgress => "in_progress",
            TaskState::Success => "success",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        }
    }

    fn state_from_row(raw: &str) -> TaskState {
        match raw {
            "in_progress" => TaskState::InProgress,
            "success" => TaskState::Success,
            "failed" => TaskState::Failed,
            "cancelled" => TaskState::Cancelled,
            _ => TaskState::Pending,
        }
    }

    fn row_to_task(row: &sqlx::postgres::PgRow) -> Result<Task, StorageError> {
        let kind_json: serde_json::Value = row.try_get("kind")?;
        let kind: TaskKind = serde_json::from_value(kind_json)
            .map_err(|e| StorageError::Unavailable(format!("corrupt task kind: {e}")))?;
        Ok(Task {
            id: row.try_get("id")?,
            kind,
            state: state_from_row(row.try_get::<String, _>("state")?.as_str()),
            created_at: row.try_get("created_at")?,
            owner_id: row.try_get("owner_id")?,
            result: row.try_get("result")?,
            error: row.try_get("error")?,
        })
    }

    #[async_trait]
    impl TaskStore for PostgresTaskStore {
        async fn insert(&self, task: Task) -> Result<(), StorageError> {
            let kind_json = serde_json::to_value(&task.kind)
                .map_err(|e| StorageError::Unavailable(format!("unserializable task kind: {e}")))?;
            sqlx::query(
                "INSERT INTO tasks (id, kind, state, created_at, owner_id, result, error) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(task.id)
            .bind(kind_json)
            .bind(state_to_row(task.state))
            .bind(task.created_at)
            .bind(task.owner_id)
            .bind(task.result)
            .bind(task.error)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get(&self, task_id: Uuid) -> Result<Task, StorageError> {
            let row = sqlx::query("SELECT * FROM tasks WHERE id = $1")
                .bind(task_id)
                .fetch_one(&self.pool)
                .await?;
            row_to_task(&row)
        }

        async fn set_state(&self, task_id: Uuid, state: TaskState) -> Result<(), StorageError> {
            sqlx::query("UPDATE tasks SET state = $1 WHERE id = $2")
                .bind(state_to_row(state))
                .bind(task_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn complete(&self, task_id: Uuid, result: serde_json::Value) -> Result<(), StorageError> {
            sqlx::query("UPDATE tasks SET state = 'success', result = $1 WHERE id = $2")
                .bind(result)
                .bind(task_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn fail(&self, task_id: Uuid, error: String) -> Result<(), StorageError> {
            sqlx::query("UPDATE tasks SET state = 'failed', error = $1 WHERE id = $2")
                .bind(error)
                .bind(task_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn active(&self) -> Result<Vec<Task>, StorageError> {
            let rows = sqlx::query("SELECT * FROM tasks WHERE state IN ('pending', 'in_progress')")
                .fetch_all(&self.pool)
                .await?;
            rows.iter().map(row_to_task).collect()
        }

        async fn prune_before(&self, older_than: DateTime<Utc>) -> Result<u64, StorageError> {
            let result = sqlx::query(
                "DELETE FROM tasks WHERE state IN ('success', 'failed', 'cancelled') AND created_at < $1",
            )
            .bind(older_than)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        }
    }
}

pub mod in_memory {
    use super::*;
    use dashmap::DashMap;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    pub struct InMemoryTaskStore {
        tasks: Arc<DashMap<Uuid, Task>>,
    }

    impl InMemoryTaskStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl TaskStore for InMemoryTaskStore {
        async fn insert(&self, task: Task) -> Result<(), StorageError> {
            self.tasks.insert(task.id, task);
            Ok(())
        }

        async fn get(&self, task_id: Uuid) -> Result<Task, StorageError> {
            self.tasks.get(&task_id).map(|e| e.value().clone()).ok_or(StorageError::NotFound)
        }

        async fn set_state(&self, task_id: Uuid, state: TaskState) -> Result<(), StorageError> {
            let mut entry = self.tasks.get_mut(&task_id).ok_or(StorageError::NotFound)?;
            entry.state = state;
            Ok(())
        }

        async fn complete(&self, task_id: Uuid, result: serde_json::Value) -> Result<(), StorageError> {
            let mut entry = self.tasks.get_mut(&task_id).ok_or(StorageError::NotFound)?;
            entry.state = TaskState::Success;
            entry.result = Some(result);
            Ok(())
        }

        async fn fail(&self, task_id: Uuid, error: String) -> Result<(), StorageError> {
            let mut entry = self.tasks.get_mut(&task_id).ok_or(StorageError::NotFound)?;
            entry.state = TaskState::Failed;
            entry.error = Some(error);
            Ok(())
        }

        async fn active(&self) -> Result<Vec<Task>, StorageError> {
            Ok(self
                .tasks
                .iter()
                .filter(|e| matches!(e.state, TaskState::Pending | TaskState::InProgress))
                .map(|e| e.value().clone())
                .collect())
        }

        async fn prune_before(&self, older_than: DateTime<Utc>) -> Result<u64, StorageError> {
            let doomed: Vec<Uuid> = self
                .tasks
                .iter()
                .filter(|e| {
                    matches!(e.state, TaskState::Success | TaskState::Failed | TaskState::Cancelled)
                        && e.created_at < older_than
                })
                .map(|e| *e.key())
                .collect();
            let count = doomed.len() as u64;
            for id in doomed {
                self.tasks.remove(&id);
            }
            Ok(count)
        }
    }
}
