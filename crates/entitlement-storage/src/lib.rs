//! Storage traits for the entitlement and payment core, plus a
//! Postgres implementation backed by `sqlx` and an in-memory
//! implementation for tests and local runs.
//!
//! Every trait method that mutates state returns only infrastructure
//! faults as `Err` — business outcomes (insufficient turns, duplicate
//! payment, task not found) are `Ok` values the caller interprets.

mod error;
mod ledger_store;
mod payment_store;
mod task_store;

pub use error::StorageError;
pub use ledger_store::{in_memory::InMemoryLedgerStore, postgres::PostgresLedgerStore, DebitOutcome, LedgerStore};
pub use payment_store::{in_memory::InMemoryPaymentStore, postgres::PostgresPaymentStore, PaymentStore};
pub use task_store::{in_memory::InMemoryTaskStore, postgres::PostgresTaskStore, TaskStore};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use entitlement_primitives::{PaymentRecord, PaymentStatus, ProductVariant, Task, TaskKind, User};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn sample_user() -> User {
        User::new(Uuid::new_v4(), "alice".to_string(), Utc::now())
    }

    #[tokio::test]
    async fn in_memory_ledger_debits_free_before_paid() {
        let store = InMemoryLedgerStore::new();
        let mut user = sample_user();
        user.free_turns = 1;
        user.paid_turns = 1;
        let id = user.id;
        store.insert(user);

        let first = store.debit_one(id).await.unwrap();
        assert_eq!(first, DebitOutcome::Debited(entitlement_primitives::TurnSnapshot { remaining_free: 0, remaining_paid: 1 }));

        let second = store.debit_one(id).await.unwrap();
        assert_eq!(second, DebitOutcome::Debited(entitlement_primitives::TurnSnapshot { remaining_free: 0, remaining_paid: 0 }));

        let third = store.debit_one(id).await.unwrap();
        assert_eq!(third, DebitOutcome::Insufficient(entitlement_primitives::TurnSnapshot { remaining_free: 0, remaining_paid: 0 }));
    }

    #[tokio::test]
    async fn in_memory_ledger_reset_free_touches_only_free_turns() {
        let store = InMemoryLedgerStore::new();
        let mut user = sample_user();
        user.free_turns = 0;
        user.paid_turns = 5;
        let id = user.id;
        store.insert(user);

        store.reset_free(id, 3, Utc::now()).await.unwrap();
        let after = store.get_user(id).await.unwrap();
        assert_eq!(after.free_turns, 3);
        assert_eq!(after.paid_turns, 5);
        assert!(after.last_free_reset.is_some());
    }

    #[tokio::test]
    async fn in_memory_payment_store_rejects_duplicate_hash() {
        let store = InMemoryPaymentStore::new();
        let record = PaymentRecord {
            transaction_hash: "0xabc".to_string(),
            user_id: Uuid::new_v4(),
            sender_address: "0xsender".to_string(),
            amount: Decimal::new(16, 4),
            product_variant: ProductVariant::Ten,
            turns_credited: 10,
            block_number: 1,
            status: PaymentStatus::Pending,
            created_at: Utc::now(),
        };
        store.insert(record.clone()).await.unwrap();
        let err = store.insert(record).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists("transaction_hash")));
    }

    #[tokio::test]
    async fn in_memory_task_store_prunes_only_terminal_tasks() {
        let store = InMemoryTaskStore::new();
        let old = Utc::now() - chrono::Duration::days(60);

        let mut finished = Task::new(Uuid::new_v4(), TaskKind::CleanupTasks { older_than_days: 30 }, None, old);
        finished.state = entitlement_primitives::TaskState::Success;
        let finished_id = finished.id;

        let pending = Task::new(Uuid::new_v4(), TaskKind::ProcessDailyReminders, None, old);
        let pending_id = pending.id;

        store.insert(finished).await.unwrap();
        store.insert(pending).await.unwrap();

        let removed = store.prune_before(Utc::now()).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get(finished_id).await.is_err());
        assert!(store.get(pending_id).await.is_ok());
    }
}
