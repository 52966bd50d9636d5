//! Admission Gate (C5): wraps a billable operation with a debit,
//! projecting the Ledger's outcome into `Proceed`/`Reject` and applying
//! the specialized-premium bypass so that tier can never silently fail.

use entitlement_ledger::{DebitSuccess, Ledger, LedgerError};
use entitlement_metrics::AdmissionMetrics;
use entitlement_primitives::{DebitContext, TurnSnapshot};
use entitlement_storage::LedgerStore;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(#[from] entitlement_storage::StorageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Proceed(ProceedKind),
    Reject { snapshot: TurnSnapshot },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProceedKind {
    Limited(TurnSnapshot),
    Unlimited,
}

pub struct AdmissionGate<S: LedgerStore> {
    ledger: std::sync::Arc<Ledger<S>>,
    metrics: AdmissionMetrics,
}

impl<S: LedgerStore> AdmissionGate<S> {
    pub fn new(ledger: std::sync::Arc<Ledger<S>>) -> Self {
        Self { ledger, metrics: AdmissionMetrics::default() }
    }

    pub async fn admit(&self, user_id: Uuid, context: DebitContext) -> Result<Admission, AdmissionError> {
        match self.ledger.debit(user_id, context).await {
            Ok(DebitSuccess::Unlimited) => {
                self.metrics.inc_proceed();
                Ok(Admission::Proceed(ProceedKind::Unlimited))
            }
            Ok(DebitSuccess::Consumed(snapshot)) => {
                self.metrics.inc_proceed();
                Ok(Admission::Proceed(ProceedKind::Limited(snapshot)))
            }
            Err(LedgerError::InsufficientTurns(snapshot)) => {
                let user = self.ledger.store().get_user(user_id).await?;
                if user.is_specialized_premium {
                    tracing::warn!(%user_id, "specialized premium user hit insufficient-turns path, bypassing");
                    self.metrics.inc_premium_bypass();
                    Ok(Admission::Proceed(ProceedKind::Unlimited))
                } else {
                    self.metrics.inc_reject();
                    Ok(Admission::Reject { snapshot })
                }
            }
            Err(LedgerError::LedgerUnavailable(err)) => Err(AdmissionError::LedgerUnavailable(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitlement_primitives::User;
    use entitlement_storage::InMemoryLedgerStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn fresh_user_proceeds_three_times_then_rejects() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let id = Uuid::new_v4();
        store.insert(User::new(id, "u", chrono::Utc::now()));
        let gate = AdmissionGate::new(Arc::new(Ledger::new(store)));

        for expected_total in [2u32, 1, 0] {
            let admission = gate.admit(id, DebitContext::Reading).await.unwrap();
            match admission {
                Admission::Proceed(ProceedKind::Limited(s)) => assert_eq!(s.total(), expected_total),
                other => panic!("unexpected {other:?}"),
            }
        }

        let rejected = gate.admit(id, DebitContext::Reading).await.unwrap();
        assert_eq!(rejected, Admission::Reject { snapshot: TurnSnapshot::zero() });
    }

    #[tokio::test]
    async fn specialized_premium_with_zero_counters_still_proceeds() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let id = Uuid::new_v4();
        let mut user = User::new(id, "v", chrono::Utc::now());
        user.free_turns = 0;
        user.paid_turns = 0;
        user.is_specialized_premium = true;
        store.insert(user);
        let gate = AdmissionGate::new(Arc::new(Ledger::new(store)));

        let admission = gate.admit(id, DebitContext::Reading).await.unwrap();
        assert_eq!(admission, Admission::Proceed(ProceedKind::Unlimited));
    }
}
