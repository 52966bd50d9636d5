//! Turn Ledger (C1): per-user free/paid counters with atomic debit and
//! credit, fronting a [`LedgerStore`] implementation.

use entitlement_metrics::LedgerMetrics;
use entitlement_primitives::{DebitContext, EffectiveTurns, TurnSnapshot, User};
use entitlement_storage::{DebitOutcome, LedgerStore, StorageError};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient turns: {0:?}")]
    InsufficientTurns(TurnSnapshot),
    #[error("ledger storage unavailable: {0}")]
    LedgerUnavailable(#[from] StorageError),
}

/// Outcome of a successful debit or credit, including the premium
/// bypass case where no counters were touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitSuccess {
    Consumed(TurnSnapshot),
    Unlimited,
}

impl DebitSuccess {
    pub fn remaining_total(&self) -> Option<u32> {
        match self {
            Self::Consumed(snapshot) => Some(snapshot.total()),
            Self::Unlimited => None,
        }
    }
}

pub struct Ledger<S: LedgerStore> {
    store: Arc<S>,
    metrics: LedgerMetrics,
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store, metrics: LedgerMetrics::default() }
    }

    /// Returns "unlimited" for specialized-premium users, else the sum
    /// of free and paid counters. Does not mutate state.
    pub fn effective_turns(&self, user: &User) -> EffectiveTurns {
        if user.is_specialized_premium {
            EffectiveTurns::Unlimited
        } else {
            EffectiveTurns::Limited(user.free_turns + user.paid_turns)
        }
    }

    /// Consumes one turn. Specialized-premium users succeed without any
    /// mutation; everyone else consumes free before paid via the
    /// store's atomic `debit_one`. The `context` tag is accepted for
    /// audit purposes only — it never changes the outcome.
    pub async fn debit(&self, user_id: Uuid, context: DebitContext) -> Result<DebitSuccess, LedgerError> {
        let user = self.store.get_user(user_id).await?;
        if user.is_specialized_premium {
            tracing::debug!(%user_id, %context, "premium user debit bypass");
            return Ok(DebitSuccess::Unlimited);
        }

        match self.store.debit_one(user_id).await? {
            DebitOutcome::Debited(snapshot) => {
                self.metrics.inc_debit_success();
                tracing::debug!(%user_id, %context, ?snapshot, "turn debited");
                Ok(DebitSuccess::Consumed(snapshot))
            }
            DebitOutcome::Insufficient(snapshot) => {
                self.metrics.inc_debit_insufficient();
                Err(LedgerError::InsufficientTurns(snapshot))
            }
        }
    }

    /// Adds `turns` paid turns. `turns` must be greater than zero;
    /// callers (the Credit Applier) are responsible for that invariant,
    /// since the variant→turns mapping is resolved before this call.
    pub async fn credit_paid(&self, user_id: Uuid, turns: u32) -> Result<TurnSnapshot, LedgerError> {
        let snapshot = self.store.credit_paid(user_id, turns).await?;
        self.metrics.inc_credit(turns as u64);
        tracing::info!(%user_id, turns, "paid turns credited");
        Ok(snapshot)
    }

    /// Sets `free_turns = free_turns_default` and bumps the reset
    /// anchor to `now`. Leaves `paid_turns` untouched.
    pub async fn reset_free(&self, user_id: Uuid, free_turns_default: u32, now: chrono::DateTime<chrono::Utc>) -> Result<(), LedgerError> {
        self.store.reset_free(user_id, free_turns_default, now).await?;
        Ok(())
    }

    /// Grants or revokes the specialized-premium bypass. Admin-only at
    /// the HTTP layer; this method itself enforces no authorization.
    pub async fn set_specialized_premium(&self, user_id: Uuid, enabled: bool) -> Result<(), LedgerError> {
        self.store.set_specialized_premium(user_id, enabled).await?;
        Ok(())
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitlement_primitives::SubscriptionStatus;
    use entitlement_storage::InMemoryLedgerStore;

    fn premium_user(id: Uuid) -> User {
        let mut u = User::new(id, "premium", chrono::Utc::now());
        u.is_specialized_premium = true;
        u
    }

    #[tokio::test]
    async fn premium_bypass_never_mutates_counters() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let id = Uuid::new_v4();
        store.insert(premium_user(id));
        let ledger = Ledger::new(store.clone());

        let outcome = ledger.debit(id, DebitContext::Reading).await.unwrap();
        assert_eq!(outcome, DebitSuccess::Unlimited);

        let user = store.get_user(id).await.unwrap();
        assert_eq!(user.free_turns, User::DEFAULT_FREE_TURNS);
        assert_eq!(user.paid_turns, 0);
    }

    #[tokio::test]
    async fn fresh_user_exhausts_in_three_debits() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let id = Uuid::new_v4();
        store.insert(User::new(id, "alice", chrono::Utc::now()));
        let ledger = Ledger::new(store);

        for _ in 0..3 {
            ledger.debit(id, DebitContext::Reading).await.unwrap();
        }
        let err = ledger.debit(id, DebitContext::Reading).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientTurns(s) if s == TurnSnapshot::zero()));
    }

    #[tokio::test]
    async fn credit_paid_activates_subscription_from_non_active() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let id = Uuid::new_v4();
        store.insert(User::new(id, "bob", chrono::Utc::now()));
        let ledger = Ledger::new(store.clone());

        ledger.credit_paid(id, 10).await.unwrap();
        let user = store.get_user(id).await.unwrap();
        assert_eq!(user.paid_turns, 10);
        assert_eq!(user.subscription_status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn reset_free_leaves_paid_turns_untouched() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let id = Uuid::new_v4();
        let mut user = User::new(id, "carol", chrono::Utc::now());
        user.free_turns = 0;
        user.paid_turns = 4;
        store.insert(user);
        let ledger = Ledger::new(store.clone());

        let now = chrono::Utc::now();
        ledger.reset_free(id, 3, now).await.unwrap();
        let after = store.get_user(id).await.unwrap();
        assert_eq!(after.free_turns, 3);
        assert_eq!(after.paid_turns, 4);
        assert_eq!(after.last_free_reset, Some(now));
    }
}
