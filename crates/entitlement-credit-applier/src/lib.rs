//! Credit Applier (C4): the idempotent `New -> Verifying -> Verified ->
//! Credited|Rejected|Duplicate` state machine that ingests a verified
//! on-chain payment into the Ledger exactly once.

use chrono::{DateTime, Utc};
use entitlement_ledger::Ledger;
use entitlement_metrics::CreditApplierMetrics;
use entitlement_payment_verifier::{ChainClient, PaymentVerifier, VerificationError};
use entitlement_primitives::{PaymentRecord, PaymentStatus, ProductVariant};
use entitlement_storage::{LedgerStore, PaymentStore, StorageError};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CreditError {
    #[error("chain provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("ledger storage unavailable: {0}")]
    LedgerUnavailable(#[from] StorageError),
}

/// Business outcome of a submission — never an `Err`, per spec.md §7's
/// propagation policy (only infrastructure faults are thrown).
#[derive(Debug, Clone)]
pub enum CreditOutcome {
    Credited { record: PaymentRecord },
    Duplicate { existing: PaymentRecord },
    Rejected { reason: VerificationError },
}

pub struct CreditApplier<P, L, C>
where
    P: PaymentStore,
    L: LedgerStore,
    C: ChainClient,
{
    payments: std::sync::Arc<P>,
    ledger: std::sync::Arc<Ledger<L>>,
    verifier: std::sync::Arc<PaymentVerifier<C>>,
    metrics: CreditApplierMetrics,
}

impl<P, L, C> CreditApplier<P, L, C>
where
    P: PaymentStore,
    L: LedgerStore,
    C: ChainClient,
{
    pub fn new(payments: std::sync::Arc<P>, ledger: std::sync::Arc<Ledger<L>>, verifier: std::sync::Arc<PaymentVerifier<C>>) -> Self {
        Self { payments, ledger, verifier, metrics: CreditApplierMetrics::default() }
    }

    /// Drives one submission through the state machine. `now` is the
    /// record's `created_at` timestamp if a new record is written.
    pub async fn apply(
        &self,
        transaction_hash: &str,
        user_id: Uuid,
        claimed_sender: &str,
        variant: ProductVariant,
        now: DateTime<Utc>,
    ) -> Result<CreditOutcome, CreditError> {
        if let Some(existing) = self.payments.find(transaction_hash).await? {
            match existing.status {
                PaymentStatus::Confirmed => {
                    self.metrics.inc_duplicate();
                    return Ok(CreditOutcome::Duplicate { existing });
                }
                PaymentStatus::Rejected => {
                    self.metrics.inc_duplicate();
                    return Ok(CreditOutcome::Duplicate { existing });
                }
                PaymentStatus::Pending => {
                    // in-flight from a concurrent submission; the recovery
                    // sweep will finish crediting it if it stalls.
                    self.metrics.inc_duplicate();
                    return Ok(CreditOutcome::Duplicate { existing });
                }
            }
        }

        let report = match self.verifier.verify(transaction_hash, claimed_sender, variant).await {
            Ok(report) => report,
            Err(VerificationError::ProviderUnavailable(msg)) => {
                return Err(CreditError::ProviderUnavailable(msg));
            }
            Err(reason) => {
                let rejected = PaymentRecord {
                    transaction_hash: transaction_hash.to_string(),
                    user_id,
                    sender_address: claimed_sender.to_string(),
                    amount: rust_decimal::Decimal::ZERO,
                    product_variant: variant,
                    turns_credited: 0,
                    block_number: 0,
                    status: PaymentStatus::Rejected,
                    created_at: now,
                };
                if let Err(err) = self.payments.insert(rejected).await {
                    if !matches!(err, StorageError::AlreadyExists(_)) {
                        return Err(err.into());
                    }
                }
                self.metrics.inc_rejected();
                tracing::info!(%transaction_hash, %reason, "payment verification rejected");
                return Ok(CreditOutcome::Rejected { reason });
            }
        };

        let pending = PaymentRecord {
            transaction_hash: transaction_hash.to_string(),
            user_id,
            sender_address: report.from.clone(),
            amount: report.amount,
            product_variant: variant,
            turns_credited: report.turns_for_variant,
            block_number: report.block_number,
            status: PaymentStatus::Pending,
            created_at: now,
        };

        if let Err(err) = self.payments.insert(pending.clone()).await {
            match err {
                StorageError::AlreadyExists(_) => {
                    let existing = self.payments.find(transaction_hash).await?.ok_or(StorageError::NotFound)?;
                    self.metrics.inc_duplicate();
                    return Ok(CreditOutcome::Duplicate { existing });
                }
                other => return Err(other.into()),
            }
        }

        self.ledger.store().credit_paid(user_id, report.turns_for_variant).await?;
        self.payments.mark_confirmed(transaction_hash).await?;
        self.metrics.inc_credited();

        let confirmed = PaymentRecord { status: PaymentStatus::Confirmed, ..pending };
        tracing::info!(%transaction_hash, %user_id, turns = report.turns_for_variant, "payment credited");
        Ok(CreditOutcome::Credited { record: confirmed })
    }

    /// Recovery sweep for `recover_pending_payments`: finds `Pending`
    /// records older than `older_than` and finishes the credit step,
    /// since a record only reaches `Pending` after a successful verify.
    pub async fn recover_pending(&self, older_than: DateTime<Utc>) -> Result<u64, CreditError> {
        let stale = self.payments.stale_pending(older_than).await?;
        let mut recovered = 0u64;
        for record in stale {
            match self.ledger.store().credit_paid(record.user_id, record.turns_credited).await {
                Ok(_) => {
                    if self.payments.mark_confirmed(&record.transaction_hash).await.is_ok() {
                        recovered += 1;
                        self.metrics.inc_credited();
                    }
                }
                Err(err) => {
                    tracing::warn!(tx = %record.transaction_hash, %err, "pending payment recovery failed, will retry next sweep");
                }
            }
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use entitlement_config::{Config, ProductCatalog, RateLimitConfig};
    use entitlement_payment_verifier::{ChainReceipt, ChainTransaction};
    use entitlement_primitives::User;
    use entitlement_storage::{InMemoryLedgerStore, InMemoryPaymentStore};
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use std::time::Duration;

    struct FakeClient {
        tx: Option<ChainTransaction>,
    }

    #[async_trait]
    impl ChainClient for FakeClient {
        async fn transaction(&self, _hash: &str) -> Result<Option<ChainTransaction>, VerificationError> {
            Ok(self.tx.clone())
        }
        async fn receipt(&self, _hash: &str) -> Result<Option<ChainReceipt>, VerificationError> {
            Ok(Some(ChainReceipt { success: true, block_number: 100 }))
        }
        async fn latest_block_number(&self) -> Result<u64, VerificationError> {
            Ok(103)
        }
    }

    fn test_config() -> Arc<Config> {
        Arc::new(Config {
            payment_address: "0xpayment".to_string(),
            chain_rpc_url: "http://localhost:8545".to_string(),
            min_confirmations: 1,
            amount_tolerance: Decimal::new(1, 4),
            free_turns_default: 3,
            rate_limits: RateLimitConfig::default(),
            task_broker_url: "amqp://localhost".to_string(),
            task_result_backend: "redis://localhost".to_string(),
            products: ProductCatalog::default(),
            pending_payment_timeout: Duration::from_secs(900),
            task_retention_days: 30,
            chain_call_timeout: Duration::from_secs(10),
        })
    }

    fn good_tx() -> ChainTransaction {
        ChainTransaction {
            from: "0xsender".to_string(),
            to: Some("0xpayment".to_string()),
            value_smallest_unit: 1_600_000_000_000_000u128,
            block_number: Some(100),
        }
    }

    async fn setup() -> (
        Arc<InMemoryPaymentStore>,
        Arc<Ledger<InMemoryLedgerStore>>,
        CreditApplier<InMemoryPaymentStore, InMemoryLedgerStore, FakeClient>,
        Uuid,
    ) {
        let ledger_store = Arc::new(InMemoryLedgerStore::new());
        let user_id = Uuid::new_v4();
        ledger_store.insert(User::new(user_id, "alice", Utc::now()));
        let ledger = Arc::new(Ledger::new(ledger_store));
        let payments = Arc::new(InMemoryPaymentStore::new());
        let client = FakeClient { tx: Some(good_tx()) };
        let verifier = Arc::new(PaymentVerifier::new(client, test_config()));
        let applier = CreditApplier::new(payments.clone(), ledger.clone(), verifier);
        (payments, ledger, applier, user_id)
    }

    #[tokio::test]
    async fn accepted_payment_credits_exactly_once() {
        let (_, ledger, applier, user_id) = setup().await;
        let outcome = applier.apply("0xabc", user_id, "0xsender", ProductVariant::Ten, Utc::now()).await.unwrap();
        assert!(matches!(outcome, CreditOutcome::Credited { .. }));
        let user = ledger.store().get_user(user_id).await.unwrap();
        assert_eq!(user.paid_turns, 10);
    }

    #[tokio::test]
    async fn resubmitting_a_confirmed_hash_is_a_duplicate_and_does_not_recredit() {
        let (_, ledger, applier, user_id) = setup().await;
        applier.apply("0xabc", user_id, "0xsender", ProductVariant::Ten, Utc::now()).await.unwrap();

        let second = applier.apply("0xabc", user_id, "0xsender", ProductVariant::Ten, Utc::now()).await.unwrap();
        assert!(matches!(second, CreditOutcome::Duplicate { .. }));

        let user = ledger.store().get_user(user_id).await.unwrap();
        assert_eq!(user.paid_turns, 10);
    }

    #[tokio::test]
    async fn wrong_amount_is_rejected_and_not_credited() {
        let (_, ledger, applier, user_id) = setup().await;
        let outcome = applier.apply("0xdef", user_id, "0xsender", ProductVariant::Twenty, Utc::now()).await.unwrap();
        assert!(matches!(outcome, CreditOutcome::Rejected { reason: VerificationError::TxWrongAmount }));
        let user = ledger.store().get_user(user_id).await.unwrap();
        assert_eq!(user.paid_turns, 0);
    }
}
