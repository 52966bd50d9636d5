use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A purchasable turn pack. The amount/turns tables are configuration
/// (see `entitlement-config`); this enum only names the SKUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductVariant {
    #[serde(rename = "10_turns")]
    Ten,
    #[serde(rename = "20_turns")]
    Twenty,
}

impl ProductVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ten => "10_turns",
            Self::Twenty => "20_turns",
        }
    }
}

impl std::str::FromStr for ProductVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "10_turns" => Ok(Self::Ten),
            "20_turns" => Ok(Self::Twenty),
            other => Err(format!("unknown product variant: {other}")),
        }
    }
}

/// Lifecycle state of a [`PaymentRecord`].
///
/// `Confirmed` is terminal and immutable. `Pending` only exists between
/// the insert and the ledger credit when the store can't wrap both in
/// one transaction; see the Credit Applier's recovery sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    Rejected,
}

/// One confirmed (or rejected, or in-flight) on-chain payment submission.
///
/// Keyed uniquely by `transaction_hash` at the storage layer — that
/// uniqueness constraint is what makes the Credit Applier idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub transaction_hash: String,
    pub user_id: Uuid,
    pub sender_address: String,
    pub amount: Decimal,
    pub product_variant: ProductVariant,
    pub turns_credited: u32,
    pub block_number: u64,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}
