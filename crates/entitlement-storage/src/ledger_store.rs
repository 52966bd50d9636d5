use crate::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use entitlement_primitives::{TurnSnapshot, User};
use uuid::Uuid;

/// Outcome of the single atomic "consume free first, else paid" step.
/// The free-vs-paid choice and the zero-check happen inside the same
/// statement the store executes — see spec.md §4.1's concurrency
/// contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    Debited(TurnSnapshot),
    Insufficient(TurnSnapshot),
}

/// Persistence for the Turn Ledger (C1) and the user side of the Quota
/// Reset Scheduler (C2). Implementations MUST serialize every mutating
/// call against other calls for the same `user_id` — by row lock,
/// compare-and-swap, or an in-process mutex — per spec.md §4.1 and §5.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    async fn get_user(&self, user_id: Uuid) -> Result<User, StorageError>;

    /// Atomically consumes one free turn, falling back to one paid turn,
    /// failing if both are zero. Never called for specialized-premium
    /// users — that bypass is policy, decided above this trait.
    async fn debit_one(&self, user_id: Uuid) -> Result<DebitOutcome, StorageError>;

    /// Increments `paid_turns` by `turns` and, if the user's
    /// subscription was not already `Active`, flips it to `Active`.
    async fn credit_paid(&self, user_id: Uuid, turns: u32) -> Result<TurnSnapshot, StorageError>;

    /// Sets `free_turns = free_turns_default` and `last_free_reset = now`.
    /// Does not touch `paid_turns`.
    async fn reset_free(&self, user_id: Uuid, free_turns_default: u32, now: DateTime<Utc>) -> Result<(), StorageError>;

    /// Users whose `last_free_reset` is null or predates the calendar
    /// month of `now`, per spec.md §4.2 step 1.
    async fn users_due_for_reset(&self, now: DateTime<Utc>) -> Result<Vec<User>, StorageError>;

    /// Grants or revokes the specialized-premium bypass. Supplemental
    /// admin operation, not one of the four core Ledger operations.
    async fn set_specialized_premium(&self, user_id: Uuid, enabled: bool) -> Result<(), StorageError>;
}

pub mod postgres {
    use super::*;
    use chrono::Datelike;
    use entitlement_primitives::SubscriptionStatus;
    use sqlx::{PgPool, Row};

    pub struct PostgresLedgerStore {
        pool: PgPool,
    }

    impl PostgresLedgerStore {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }
    }

    fn status_from_row(raw: &str) -> SubscriptionStatus {
        match raw {
            "active" => SubscriptionStatus::Active,
            "cancelled" => SubscriptionStatus::Cancelled,
            "expired" => SubscriptionStatus::Expired,
            _ => SubscriptionStatus::None,
        }
    }

    fn status_to_row(status: SubscriptionStatus) -> &'static str {
        match status {
            SubscriptionStatus::None => "none",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        }
    }

    fn row_to_user(row: &sqlx::postgres::PgRow) -> Result<User, StorageError> {
        Ok(User {
            id: row.try_get("id").map_err(StorageError::from)?,
            handle: row.try_get("handle").map_err(StorageError::from)?,
            free_turns: row.try_get::<i32, _>("free_turns").map_err(StorageError::from)?.max(0) as u32,
            paid_turns: row.try_get::<i32, _>("paid_turns").map_err(StorageError::from)?.max(0) as u32,
            last_free_reset: row.try_get("last_free_reset").map_err(StorageError::from)?,
            subscription_status: status_from_row(row.try_get::<String, _>("subscription_status").map_err(StorageError::from)?.as_str()),
            is_specialized_premium: row.try_get("is_specialized_premium").map_err(StorageError::from)?,
            is_admin: row.try_get("is_admin").map_err(StorageError::from)?,
        })
    }

    #[async_trait]
    impl LedgerStore for PostgresLedgerStore {
        async fn get_user(&self, user_id: Uuid) -> Result<User, StorageError> {
            let row = sqlx::query("SELECT * FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
            row_to_user(&row)
        }

        async fn debit_one(&self, user_id: Uuid) -> Result<DebitOutcome, StorageError> {
            let mut tx = self.pool.begin().await?;

            let row = sqlx::query("SELECT free_turns, paid_turns FROM users WHERE id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await?;
            let free: i32 = row.try_get("free_turns")?;
            let paid: i32 = row.try_get("paid_turns")?;

            if free <= 0 && paid <= 0 {
                tx.rollback().await?;
                return Ok(DebitOutcome::Insufficient(TurnSnapshot { remaining_free: 0, remaining_paid: paid.max(0) as u32 }));
            }

            let (new_free, new_paid) = if free > 0 { (free - 1, paid) } else { (free, paid - 1) };

            sqlx::query("UPDATE users SET free_turns = $1, paid_turns = $2 WHERE id = $3")
                .bind(new_free)
                .bind(new_paid)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(DebitOutcome::Debited(TurnSnapshot {
                remaining_free: new_free as u32,
                remaining_paid: new_paid as u32,
            }))
        }

        async fn credit_paid(&self, user_id: Uuid, turns: u32) -> Result<TurnSnapshot, StorageError> {
            let mut tx = self.pool.begin().await?;

            let row = sqlx::query("SELECT free_turns, paid_turns, subscription_status FROM users WHERE id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await?;
            let free: i32 = row.try_get("free_turns")?;
            let paid: i32 = row.try_get("paid_turns")?;
            let status = status_from_row(row.try_get::<String, _>("subscription_status")?.as_str());

            let new_paid = paid + turns as i32;
            let new_status = if status != SubscriptionStatus::Active { SubscriptionStatus::Active } else { status };

            sqlx::query("UPDATE users SET paid_turns = $1, subscription_status = $2 WHERE id = $3")
                .bind(new_paid)
                .bind(status_to_row(new_status))
                .bind(user_id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(TurnSnapshot { remaining_free: free.max(0) as u32, remaining_paid: new_paid as u32 })
        }

        async fn reset_free(&self, user_id: Uuid, free_turns_default: u32, now: DateTime<Utc>) -> Result<(), StorageError> {
            sqlx::query("UPDATE users SET free_turns = $1, last_free_reset = $2 WHERE id = $3")
                .bind(free_turns_default as i32)
                .bind(now)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn users_due_for_reset(&self, now: DateTime<Utc>) -> Result<Vec<User>, StorageError> {
            let month_start = now
                .date_naive()
                .with_day(1)
                .expect("day 1 always valid")
                .and_hms_opt(0, 0, 0)
                .expect("midnight always valid")
                .and_utc();

            let rows = sqlx::query("SELECT * FROM users WHERE last_free_reset IS NULL OR last_free_reset < $1")
                .bind(month_start)
                .fetch_all(&self.pool)
                .await?;
            rows.iter().map(row_to_user).collect()
        }

        async fn set_specialized_premium(&self, user_id: Uuid, enabled: bool) -> Result<(), StorageError> {
            sqlx::query("UPDATE users SET is_specialized_premium = $1 WHERE id = $2")
                .bind(enabled)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }
    }
}

pub mod in_memory {
    use super::*;
    use chrono::Datelike;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Per-user `Mutex<User>` behind a `DashMap`, giving the linearizable-
    /// per-user contract spec.md §5 requires without a real database —
    /// used by tests and as a reference implementation, the way the
    /// teacher's `storage/db/src/abstraction/mock.rs` backs a `Database`
    /// trait with an in-memory `BTreeMap`.
    #[derive(Clone, Default)]
    pub struct InMemoryLedgerStore {
        users: Arc<dashmap::DashMap<Uuid, Arc<Mutex<User>>>>,
    }

    impl InMemoryLedgerStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, user: User) {
            self.users.insert(user.id, Arc::new(Mutex::new(user)));
        }

        fn slot(&self, user_id: Uuid) -> Result<Arc<Mutex<User>>, StorageError> {
            self.users.get(&user_id).map(|e| e.clone()).ok_or(StorageError::NotFound)
        }
    }

    #[async_trait]
    impl LedgerStore for InMemoryLedgerStore {
        async fn get_user(&self, user_id: Uuid) -> Result<User, StorageError> {
            Ok(self.slot(user_id)?.lock().clone())
        }

        async fn debit_one(&self, user_id: Uuid) -> Result<DebitOutcome, StorageError> {
            let slot = self.slot(user_id)?;
            let mut user = slot.lock();
            if user.free_turns == 0 && user.paid_turns == 0 {
                return Ok(DebitOutcome::Insufficient(TurnSnapshot {
                    remaining_free: user.free_turns,
                    remaining_paid: user.paid_turns,
                }));
            }
            if user.free_turns > 0 {
                user.free_turns -= 1;
            } else {
                user.paid_turns -= 1;
            }
            Ok(DebitOutcome::Debited(TurnSnapshot {
                remaining_free: user.free_turns,
                remaining_paid: user.paid_turns,
            }))
        }

        async fn credit_paid(&self, user_id: Uuid, turns: u32) -> Result<TurnSnapshot, StorageError> {
            let slot = self.slot(user_id)?;
            let mut user = slot.lock();
            user.paid_turns += turns;
            if user.subscription_status != entitlement_primitives::SubscriptionStatus::Active {
                user.subscription_status = entitlement_primitives::SubscriptionStatus::Active;
            }
            Ok(TurnSnapshot { remaining_free: user.free_turns, remaining_paid: user.paid_turns })
        }

        async fn reset_free(&self, user_id: Uuid, free_turns_default: u32, now: DateTime<Utc>) -> Result<(), StorageError> {
            let slot = self.slot(user_id)?;
            let mut user = slot.lock();
            user.free_turns = free_turns_default;
            user.last_free_reset = Some(now);
            Ok(())
        }

        async fn users_due_for_reset(&self, now: DateTime<Utc>) -> Result<Vec<User>, StorageError> {
            let (year, month) = (now.year(), now.month());
            let mut out: Vec<User> = self
                .users
                .iter()
                .filter_map(|entry| {
                    let user = entry.value().lock();
                    let due = match user.last_free_reset {
                        None => true,
                        Some(ts) => (ts.year(), ts.month()) < (year, month),
                    };
                    due.then(|| user.clone())
                })
                .collect();
            out.sort_by_key(|u| u.id);
            Ok(out)
        }

        async fn set_specialized_premium(&self, user_id: Uuid, enabled: bool) -> Result<(), StorageError> {
            let slot = self.slot(user_id)?;
            slot.lock().is_specialized_premium = enabled;
            Ok(())
        }
    }
}
