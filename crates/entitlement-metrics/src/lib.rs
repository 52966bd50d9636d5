//! Metrics hooks for the entitlement and payment core.
//!
//! spec.md's Non-goals exclude "collecting metrics" as a feature — this
//! crate only emits the hooks, it does not ship an exporter. Each
//! component gets a small zero-sized struct of methods wrapping the
//! `metrics` crate's macros, the way `PayloadBuilderServiceMetrics`
//! wraps gauge/counter updates in the teacher's payload builder service.

#[derive(Debug, Default, Clone, Copy)]
pub struct LedgerMetrics;

impl LedgerMetrics {
    pub fn inc_debit_success(&self) {
        metrics::counter!("entitlement_ledger_debit_success_total").increment(1);
    }

    pub fn inc_debit_insufficient(&self) {
        metrics::counter!("entitlement_ledger_debit_insufficient_total").increment(1);
    }

    pub fn inc_credit(&self, turns: u64) {
        metrics::counter!("entitlement_ledger_paid_turns_credited_total").increment(turns);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SchedulerMetrics;

impl SchedulerMetrics {
    pub fn record_run(&self, eligible: u64, reset: u64, skipped: u64, failed: u64) {
        metrics::gauge!("entitlement_scheduler_last_run_eligible").set(eligible as f64);
        metrics::counter!("entitlement_scheduler_reset_total").increment(reset);
        metrics::counter!("entitlement_scheduler_skipped_total").increment(skipped);
        metrics::counter!("entitlement_scheduler_failed_total").increment(failed);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct VerifierMetrics;

impl VerifierMetrics {
    pub fn inc_verified(&self) {
        metrics::counter!("entitlement_verifier_verified_total").increment(1);
    }

    pub fn inc_rejection(&self, reason: &'static str) {
        metrics::counter!("entitlement_verifier_rejected_total", "reason" => reason).increment(1);
    }

    pub fn inc_provider_unavailable(&self) {
        metrics::counter!("entitlement_verifier_provider_unavailable_total").increment(1);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CreditApplierMetrics;

impl CreditApplierMetrics {
    pub fn inc_credited(&self) {
        metrics::counter!("entitlement_credit_applier_credited_total").increment(1);
    }

    pub fn inc_duplicate(&self) {
        metrics::counter!("entitlement_credit_applier_duplicate_total").increment(1);
    }

    pub fn inc_rejected(&self) {
        metrics::counter!("entitlement_credit_applier_rejected_total").increment(1);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AdmissionMetrics;

impl AdmissionMetrics {
    pub fn inc_proceed(&self) {
        metrics::counter!("entitlement_admission_proceed_total").increment(1);
    }

    pub fn inc_reject(&self) {
        metrics::counter!("entitlement_admission_reject_total").increment(1);
    }

    pub fn inc_premium_bypass(&self) {
        metrics::counter!("entitlement_admission_premium_bypass_total").increment(1);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RateLimiterMetrics;

impl RateLimiterMetrics {
    pub fn inc_limited(&self, class: &'static str) {
        metrics::counter!("entitlement_rate_limiter_limited_total", "class" => class).increment(1);
    }

    pub fn set_active_buckets(&self, count: usize) {
        metrics::gauge!("entitlement_rate_limiter_active_buckets").set(count as f64);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TaskManagerMetrics;

impl TaskManagerMetrics {
    pub fn set_active_jobs(&self, count: usize) {
        metrics::gauge!("entitlement_tasks_active").set(count as f64);
    }

    pub fn inc_enqueued(&self, kind: &'static str) {
        metrics::counter!("entitlement_tasks_enqueued_total", "kind" => kind).increment(1);
    }

    pub fn inc_failed(&self, kind: &'static str) {
        metrics::counter!("entitlement_tasks_failed_total", "kind" => kind).increment(1);
    }

    pub fn inc_cancelled(&self) {
        metrics::counter!("entitlement_tasks_cancelled_total").increment(1);
    }
}
