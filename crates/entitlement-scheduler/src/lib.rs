//! Quota Reset Scheduler (C2): iterates users due for a monthly free-turn
//! reset and replenishes them through the Ledger, with bounded catch-up
//! (at most one reset per user per run) and continue-on-failure semantics.

use chrono::{DateTime, Utc};
use entitlement_ledger::Ledger;
use entitlement_metrics::SchedulerMetrics;
use entitlement_storage::LedgerStore;

/// Per-run outcome counts, per spec.md §4.2 step 3.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub eligible: u64,
    pub reset: u64,
    pub skipped: u64,
    pub failed: u64,
}

pub struct Scheduler<S: LedgerStore> {
    ledger: std::sync::Arc<Ledger<S>>,
    metrics: SchedulerMetrics,
}

impl<S: LedgerStore> Scheduler<S> {
    pub fn new(ledger: std::sync::Arc<Ledger<S>>) -> Self {
        Self { ledger, metrics: SchedulerMetrics::default() }
    }

    /// Runs one reset pass at `now` against `free_turns_default` (F₀).
    /// A single run resets each eligible user at most once — it queries
    /// eligibility once up front, so a user reset mid-run by a concurrent
    /// process is simply skipped rather than double-reset.
    pub async fn run(&self, now: DateTime<Utc>, free_turns_default: u32) -> RunSummary {
        let due = match self.ledger.store().users_due_for_reset(now).await {
            Ok(users) => users,
            Err(err) => {
                tracing::error!(%err, "scheduler failed to load users due for reset");
                let summary = RunSummary { failed: 1, ..Default::default() };
                self.metrics.record_run(0, 0, 0, 1);
                return summary;
            }
        };

        let mut summary = RunSummary { eligible: due.len() as u64, ..Default::default() };

        for user in due {
            match self.ledger.reset_free(user.id, free_turns_default, now).await {
                Ok(()) => {
                    summary.reset += 1;
                    tracing::debug!(user_id = %user.id, "free turns reset");
                }
                Err(err) => {
                    summary.failed += 1;
                    tracing::warn!(user_id = %user.id, %err, "free turn reset failed, will retry next run");
                }
            }
        }

        self.metrics.record_run(summary.eligible, summary.reset, summary.skipped, summary.failed);
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use entitlement_primitives::User;
    use entitlement_storage::InMemoryLedgerStore;
    use std::sync::Arc;
    use uuid::Uuid;

    #[tokio::test]
    async fn resets_only_users_stale_before_current_calendar_month() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let november = Utc.with_ymd_and_hms(2024, 11, 15, 0, 0, 0).unwrap();
        let december_run = Utc.with_ymd_and_hms(2024, 12, 1, 0, 1, 0).unwrap();

        let mut stale = User::new(Uuid::new_v4(), "w", november);
        stale.free_turns = 1;
        stale.paid_turns = 4;
        stale.last_free_reset = Some(november);
        let stale_id = stale.id;
        store.insert(stale);

        let mut fresh = User::new(Uuid::new_v4(), "fresh", december_run);
        fresh.last_free_reset = Some(december_run);
        let fresh_id = fresh.id;
        store.insert(fresh);

        let ledger = Arc::new(Ledger::new(store.clone()));
        let scheduler = Scheduler::new(ledger);

        let summary = scheduler.run(december_run, 3).await;
        assert_eq!(summary, RunSummary { eligible: 1, reset: 1, skipped: 0, failed: 0 });

        let w = store.get_user(stale_id).await.unwrap();
        assert_eq!(w.free_turns, 3);
        assert_eq!(w.paid_turns, 4);
        assert_eq!(w.last_free_reset, Some(december_run));

        let untouched = store.get_user(fresh_id).await.unwrap();
        assert_eq!(untouched.last_free_reset, Some(december_run));
    }

    #[tokio::test]
    async fn second_run_same_month_is_a_no_op() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let run_time = Utc.with_ymd_and_hms(2024, 12, 1, 0, 1, 0).unwrap();
        let mut user = User::new(Uuid::new_v4(), "w", Utc.with_ymd_and_hms(2024, 11, 15, 0, 0, 0).unwrap());
        user.last_free_reset = Some(Utc.with_ymd_and_hms(2024, 11, 15, 0, 0, 0).unwrap());
        store.insert(user);

        let ledger = Arc::new(Ledger::new(store));
        let scheduler = Scheduler::new(ledger);

        let first = scheduler.run(run_time, 3).await;
        assert_eq!(first.reset, 1);

        let second = scheduler.run(run_time, 3).await;
        assert_eq!(second.eligible, 0);
        assert_eq!(second.reset, 0);
    }
}
