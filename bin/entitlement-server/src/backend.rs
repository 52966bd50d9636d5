//! Storage backend selection: Postgres when `--database-url` is given,
//! otherwise the in-memory stores. Each enum dispatches to whichever
//! variant was constructed, so the rest of the binary wires against one
//! concrete type per store trait instead of reaching for a `dyn` object.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use entitlement_primitives::{PaymentRecord, Task, TaskState, User};
use entitlement_storage::{
    DebitOutcome, InMemoryLedgerStore, InMemoryPaymentStore, InMemoryTaskStore, LedgerStore, PaymentStore,
    PostgresLedgerStore, PostgresPaymentStore, PostgresTaskStore, StorageError, TaskStore,
};
use uuid::Uuid;

pub enum Backend<P, M> {
    Postgres(P),
    InMemory(M),
}

pub type LedgerBackend = Backend<PostgresLedgerStore, InMemoryLedgerStore>;
pub type PaymentBackend = Backend<PostgresPaymentStore, InMemoryPaymentStore>;
pub type TaskBackend = Backend<PostgresTaskStore, InMemoryTaskStore>;

#[async_trait]
impl LedgerStore for LedgerBackend {
    async fn get_user(&self, user_id: Uuid) -> Result<User, StorageError> {
        match self {
            Self::Postgres(s) => s.get_user(user_id).await,
            Self::InMemory(s) => s.get_user(user_id).await,
        }
    }

    async fn debit_one(&self, user_id: Uuid) -> Result<DebitOutcome, StorageError> {
        match self {
            Self::Postgres(s) => s.debit_one(user_id).await,
            Self::InMemory(s) => s.debit_one(user_id).await,
        }
    }

    async fn credit_paid(&self, user_id: Uuid, turns: u32) -> Result<entitlement_primitives::TurnSnapshot, StorageError> {
        match self {
            Self::Postgres(s) => s.credit_paid(user_id, turns).await,
            Self::InMemory(s) => s.credit_paid(user_id, turns).await,
        }
    }

    async fn reset_free(&self, user_id: Uuid, free_turns_default: u32, now: DateTime<Utc>) -> Result<(), StorageError> {
        match self {
            Self::Postgres(s) => s.reset_free(user_id, free_turns_default, now).await,
            Self::InMemory(s) => s.reset_free(user_id, free_turns_default, now).await,
        }
    }

    async fn users_due_for_reset(&self, now: DateTime<Utc>) -> Result<Vec<User>, StorageError> {
        match self {
            Self::Postgres(s) => s.users_due_for_reset(now).await,
            Self::InMemory(s) => s.users_due_for_reset(now).await,
        }
    }

    async fn set_specialized_premium(&self, user_id: Uuid, enabled: bool) -> Result<(), StorageError> {
        match self {
            Self::Postgres(s) => s.set_specialized_premium(user_id, enabled).await,
            Self::InMemory(s) => s.set_specialized_premium(user_id, enabled).await,
        }
    }
}

#[async_trait]
impl PaymentStore for PaymentBackend {
    async fn find(&self, transaction_hash: &str) -> Result<Option<PaymentRecord>, StorageError> {
        match self {
            Self::Postgres(s) => s.find(transaction_hash).await,
            Self::InMemory(s) => s.find(transaction_hash).await,
        }
    }

    async fn insert(&self, record: PaymentRecord) -> Result<(), StorageError> {
        match self {
            Self::Postgres(s) => s.insert(record).await,
            Self::InMemory(s) => s.insert(record).await,
        }
    }

    async fn mark_confirmed(&self, transaction_hash: &str) -> Result<(), StorageError> {
        match self {
            Self::Postgres(s) => s.mark_confirmed(transaction_hash).await,
            Self::InMemory(s) => s.mark_confirmed(transaction_hash).await,
        }
    }

    async fn stale_pending(&self, older_than: DateTime<Utc>) -> Result<Vec<PaymentRecord>, StorageError> {
        match self {
            Self::Postgres(s) => s.stale_pending(older_than).await,
            Self::InMemory(s) => s.stale_pending(older_than).await,
        }
    }
}

#[async_trait]
impl TaskStore for TaskBackend {
    async fn insert(&self, task: Task) -> Result<(), StorageError> {
        match self {
            Self::Postgres(s) => s.insert(task).await,
            Self::InMemory(s) => s.insert(task).await,
        }
    }

    async fn get(&self, task_id: Uuid) -> Result<Task, StorageError> {
        match self {
            Self::Postgres(s) => s.get(task_id).await,
            Self::InMemory(s) => s.get(task_id).await,
        }
    }

    async fn set_state(&self, task_id: Uuid, state: TaskState) -> Result<(), StorageError> {
        match self {
            Self::Postgres(s) => s.set_state(task_id, state).await,
            Self::InMemory(s) => s.set_state(task_id, state).await,
        }
    }

    async fn complete(&self, task_id: Uuid, result: serde_json::Value) -> Result<(), StorageError> {
        match self {
            Self::Postgres(s) => s.complete(task_id, result).await,
            Self::InMemory(s) => s.complete(task_id, result).await,
        }
    }

    async fn fail(&self, task_id: Uuid, error: String) -> Result<(), StorageError> {
        match self {
            Self::Postgres(s) => s.fail(task_id, error).await,
            Self::InMemory(s) => s.fail(task_id, error).await,
        }
    }

    async fn active(&self) -> Result<Vec<Task>, StorageError> {
        match self {
            Self::Postgres(s) => s.active().await,
            Self::InMemory(s) => s.active().await,
        }
    }

    async fn prune_before(&self, older_than: DateTime<Utc>) -> Result<u64, StorageError> {
        match self {
            Self::Postgres(s) => s.prune_before(older_than).await,
            Self::InMemory(s) => s.prune_before(older_than).await,
        }
    }
}
