//! Payment Verifier (C3): inspects an on-chain transaction against the
//! claims made in a payment submission. Performs no database writes —
//! it only reports; the Credit Applier decides what to persist.

use async_trait::async_trait;
use entitlement_config::Config;
use entitlement_metrics::VerifierMetrics;
use entitlement_primitives::ProductVariant;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum VerificationError {
    #[error("transaction not found")]
    TxNotFound,
    #[error("transaction not confirmed")]
    TxNotConfirmed,
    #[error("transaction sent to wrong recipient")]
    TxWrongRecipient,
    #[error("transaction sent from wrong sender")]
    TxWrongSender,
    #[error("transaction amount does not match expected value")]
    TxWrongAmount,
    #[error("chain provider unavailable: {0}")]
    ProviderUnavailable(String),
}

/// A minimal, provider-agnostic view of a transaction. [`ChainClient`]
/// implementations translate their wire types into this shape so the
/// verification logic below never depends on a specific provider crate.
#[derive(Debug, Clone)]
pub struct ChainTransaction {
    pub from: String,
    pub to: Option<String>,
    /// Value in the smallest on-chain unit (wei-equivalent).
    pub value_smallest_unit: u128,
    pub block_number: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ChainReceipt {
    pub success: bool,
    pub block_number: u64,
}

/// Abstraction over the chain RPC, grounded the way the teacher's
/// `EthApi` trait stands between handler logic and the concrete
/// provider — lets tests supply a fake without a live RPC endpoint.
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    async fn transaction(&self, hash: &str) -> Result<Option<ChainTransaction>, VerificationError>;
    async fn receipt(&self, hash: &str) -> Result<Option<ChainReceipt>, VerificationError>;
    async fn latest_block_number(&self) -> Result<u64, VerificationError>;
}

/// Successful verification result: status, normalized amount, parties,
/// block number, confirmations. Never includes the configured payment
/// address or tolerance — only what the submission itself produced.
#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub amount: Decimal,
    pub from: String,
    pub to: String,
    pub block_number: u64,
    pub confirmations: u64,
    pub turns_for_variant: u32,
}

pub struct PaymentVerifier<C: ChainClient> {
    client: C,
    config: std::sync::Arc<Config>,
    metrics: VerifierMetrics,
}

impl<C: ChainClient> PaymentVerifier<C> {
    pub fn new(client: C, config: std::sync::Arc<Config>) -> Self {
        Self { client, config, metrics: VerifierMetrics::default() }
    }

    /// Runs the full procedure from spec.md §4.3 against `transaction_hash`,
    /// checking it was sent by `claimed_sender` for `variant`. Bounded by
    /// `chain_call_timeout`; a timeout surfaces as `ProviderUnavailable`.
    pub async fn verify(
        &self,
        transaction_hash: &str,
        claimed_sender: &str,
        variant: ProductVariant,
    ) -> Result<VerificationReport, VerificationError> {
        match tokio::time::timeout(self.config.chain_call_timeout, self.verify_inner(transaction_hash, claimed_sender, variant)).await {
            Ok(result) => {
                match &result {
                    Ok(_) => self.metrics.inc_verified(),
                    Err(VerificationError::ProviderUnavailable(_)) => self.metrics.inc_provider_unavailable(),
                    Err(err) => self.metrics.inc_rejection(rejection_label(err)),
                }
                result
            }
            Err(_) => {
                self.metrics.inc_provider_unavailable();
                Err(VerificationError::ProviderUnavailable("chain call timed out".to_string()))
            }
        }
    }

    async fn verify_inner(
        &self,
        transaction_hash: &str,
        claimed_sender: &str,
        variant: ProductVariant,
    ) -> Result<VerificationReport, VerificationError> {
        let tx = self.client.transaction(transaction_hash).await?.ok_or(VerificationError::TxNotFound)?;

        let receipt = self.client.receipt(transaction_hash).await?.ok_or(VerificationError::TxNotConfirmed)?;
        if !receipt.success {
            return Err(VerificationError::TxNotConfirmed);
        }

        let latest = self.client.latest_block_number().await?;
        let confirmations = latest.saturating_sub(receipt.block_number).saturating_add(1);
        if confirmations < self.config.min_confirmations {
            return Err(VerificationError::TxNotConfirmed);
        }

        let to = tx.to.as_deref().unwrap_or_default();
        if !to.eq_ignore_ascii_case(&self.config.payment_address) {
            return Err(VerificationError::TxWrongRecipient);
        }

        if !tx.from.eq_ignore_ascii_case(claimed_sender) {
            return Err(VerificationError::TxWrongSender);
        }

        let amount = smallest_unit_to_decimal(tx.value_smallest_unit);
        let spec = self.config.products.get(variant);
        let diff = (amount - spec.amount).abs();
        if diff > self.config.amount_tolerance {
            return Err(VerificationError::TxWrongAmount);
        }

        Ok(VerificationReport {
            amount,
            from: tx.from,
            to: to.to_string(),
            block_number: receipt.block_number,
            confirmations,
            turns_for_variant: spec.turns,
        })
    }
}

fn rejection_label(err: &VerificationError) -> &'static str {
    match err {
        VerificationError::TxNotFound => "tx_not_found",
        VerificationError::TxNotConfirmed => "tx_not_confirmed",
        VerificationError::TxWrongRecipient => "tx_wrong_recipient",
        VerificationError::TxWrongSender => "tx_wrong_sender",
        VerificationError::TxWrongAmount => "tx_wrong_amount",
        VerificationError::ProviderUnavailable(_) => "provider_unavailable",
    }
}

/// 18-decimal smallest-unit-to-native conversion (wei → ether), matching
/// the precision `ethers_core::utils::format_units` would produce.
fn smallest_unit_to_decimal(value: u128) -> Decimal {
    let whole = Decimal::from_str(&value.to_string()).unwrap_or(Decimal::ZERO);
    whole / Decimal::from_str("1000000000000000000").expect("constant parses")
}

pub mod ethers_client {
    use super::*;
    use ethers_core::types::{H256, U64};
    use ethers_providers::{Http, Middleware, Provider};
    use std::str::FromStr as _;

    pub struct EthersChainClient {
        provider: Provider<Http>,
    }

    impl EthersChainClient {
        pub fn new(rpc_url: &str) -> Result<Self, VerificationError> {
            let provider = Provider::<Http>::try_from(rpc_url)
                .map_err(|err| VerificationError::ProviderUnavailable(err.to_string()))?;
            Ok(Self { provider })
        }
    }

    fn parse_hash(hash: &str) -> Result<H256, VerificationError> {
        H256::from_str(hash).map_err(|err| VerificationError::ProviderUnavailable(format!("malformed tx hash: {err}")))
    }

    #[async_trait]
    impl ChainClient for EthersChainClient {
        async fn transaction(&self, hash: &str) -> Result<Option<ChainTransaction>, VerificationError> {
            let h = parse_hash(hash)?;
            let tx = self
                .provider
                .get_transaction(h)
                .await
                .map_err(|err| VerificationError::ProviderUnavailable(err.to_string()))?;
            Ok(tx.map(|tx| ChainTransaction {
                from: format!("{:#x}", tx.from),
                to: tx.to.map(|addr| format!("{addr:#x}")),
                value_smallest_unit: tx.value.as_u128(),
                block_number: tx.block_number.map(|n| n.as_u64()),
            }))
        }

        async fn receipt(&self, hash: &str) -> Result<Option<ChainReceipt>, VerificationError> {
            let h = parse_hash(hash)?;
            let receipt = self
                .provider
                .get_transaction_receipt(h)
                .await
                .map_err(|err| VerificationError::ProviderUnavailable(err.to_string()))?;
            Ok(receipt.and_then(|r| {
                let block_number = r.block_number?.as_u64();
                let success = r.status.map(|s| s == U64::from(1)).unwrap_or(false);
                Some(ChainReceipt { success, block_number })
            }))
        }

        async fn latest_block_number(&self) -> Result<u64, VerificationError> {
            self.provider
                .get_block_number()
                .await
                .map(|n| n.as_u64())
                .map_err(|err| VerificationError::ProviderUnavailable(err.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitlement_config::{Config, ProductCatalog, RateLimitConfig};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeClient {
        tx: Option<ChainTransaction>,
        receipt: Option<ChainReceipt>,
        latest_block: u64,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl ChainClient for FakeClient {
        async fn transaction(&self, _hash: &str) -> Result<Option<ChainTransaction>, VerificationError> {
            *self.calls.lock().unwrap() += 1;
            Ok(self.tx.clone())
        }
        async fn receipt(&self, _hash: &str) -> Result<Option<ChainReceipt>, VerificationError> {
            Ok(self.receipt.clone())
        }
        async fn latest_block_number(&self) -> Result<u64, VerificationError> {
            Ok(self.latest_block)
        }
    }

    fn test_config() -> std::sync::Arc<Config> {
        std::sync::Arc::new(Config {
            payment_address: "0xpayment".to_string(),
            chain_rpc_url: "http://localhost:8545".to_string(),
            min_confirmations: 3,
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
            from: "0xSENDER".to_string(),
            to: Some("0xPAYMENT".to_string()),
            value_smallest_unit: 1_600_000_000_000_000u128,
            block_number: Some(100),
        }
    }

    #[tokio::test]
    async fn accepts_matching_payment_at_exact_confirmation_threshold() {
        let client = FakeClient {
            tx: Some(good_tx()),
            receipt: Some(ChainReceipt { success: true, block_number: 100 }),
            latest_block: 102,
            calls: Mutex::new(0),
        };
        let verifier = PaymentVerifier::new(client, test_config());
        let report = verifier.verify("0xabc", "0xsender", ProductVariant::Ten).await.unwrap();
        assert_eq!(report.confirmations, 3);
        assert_eq!(report.turns_for_variant, 10);
    }

    #[tokio::test]
    async fn rejects_below_confirmation_threshold() {
        let client = FakeClient {
            tx: Some(good_tx()),
            receipt: Some(ChainReceipt { success: true, block_number: 100 }),
            latest_block: 101,
            calls: Mutex::new(0),
        };
        let verifier = PaymentVerifier::new(client, test_config());
        let err = verifier.verify("0xabc", "0xsender", ProductVariant::Ten).await.unwrap_err();
        assert!(matches!(err, VerificationError::TxNotConfirmed));
    }

    #[tokio::test]
    async fn rejects_wrong_recipient() {
        let mut tx = good_tx();
        tx.to = Some("0xsomeoneelse".to_string());
        let client = FakeClient {
            tx: Some(tx),
            receipt: Some(ChainReceipt { success: true, block_number: 100 }),
            latest_block: 103,
            calls: Mutex::new(0),
        };
        let verifier = PaymentVerifier::new(client, test_config());
        let err = verifier.verify("0xabc", "0xsender", ProductVariant::Ten).await.unwrap_err();
        assert!(matches!(err, VerificationError::TxWrongRecipient));
    }

    #[tokio::test]
    async fn rejects_amount_below_tolerance() {
        let mut tx = good_tx();
        tx.value_smallest_unit = 1_000_000_000_000_000u128;
        let client = FakeClient {
            tx: Some(tx),
            receipt: Some(ChainReceipt { success: true, block_number: 100 }),
            latest_block: 103,
            calls: Mutex::new(0),
        };
        let verifier = PaymentVerifier::new(client, test_config());
        let err = verifier.verify("0xdef", "0xsender", ProductVariant::Ten).await.unwrap_err();
        assert!(matches!(err, VerificationError::TxWrongAmount));
    }

    #[tokio::test]
    async fn not_found_when_provider_has_no_transaction() {
        let client = FakeClient { tx: None, receipt: None, latest_block: 0, calls: Mutex::new(0) };
        let verifier = PaymentVerifier::new(client, test_config());
        let err = verifier.verify("0xmissing", "0xsender", ProductVariant::Ten).await.unwrap_err();
        assert!(matches!(err, VerificationError::TxNotFound));
    }

    #[test]
    fn variant_catalog_matches_specified_defaults() {
        let catalog = ProductCatalog::default();
        let ten = catalog.get(ProductVariant::Ten);
        assert_eq!(ten.turns, 10);
        assert_eq!(ten.amount, Decimal::new(16, 4));
        let twenty = catalog.get(ProductVariant::Twenty);
        assert_eq!(twenty.turns, 20);
        assert_eq!(twenty.amount, Decimal::new(24, 4));
        let _ = HashMap::<ProductVariant, u32>::new();
    }
}
