use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subscription lifecycle as tracked on the [`User`] row.
///
/// `Cancelled` does not stop consumption of already-paid turns; see
/// [`entitlement-ledger`](../entitlement_ledger/index.html) for the debit policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    None,
    Active,
    Cancelled,
    Expired,
}

/// A quota holder.
///
/// Counters are non-nullable and the Ledger never lets them go negative.
/// `last_free_reset = None` means the user has never been through a
/// reset run and is eligible on the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub handle: String,
    pub free_turns: u32,
    pub paid_turns: u32,
    pub last_free_reset: Option<DateTime<Utc>>,
    pub subscription_status: SubscriptionStatus,
    pub is_specialized_premium: bool,
    pub is_admin: bool,
}

impl User {
    /// Default free-turn grant for a brand new signup, absent config override.
    pub const DEFAULT_FREE_TURNS: u32 = 3;

    pub fn new(id: Uuid, handle: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            handle: handle.into(),
            free_turns: Self::DEFAULT_FREE_TURNS,
            paid_turns: 0,
            last_free_reset: Some(now),
            subscription_status: SubscriptionStatus::None,
            is_specialized_premium: false,
            is_admin: false,
        }
    }
}
