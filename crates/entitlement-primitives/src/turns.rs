use serde::{Deserialize, Serialize};

/// The result of querying how many turns a user has left.
///
/// `Unlimited` is returned only for specialized-premium users and is not
/// backed by any counter — it must never be treated as a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum EffectiveTurns {
    Limited(u32),
    Unlimited,
}

/// Snapshot of a user's turn counters, returned to callers on both
/// success and `InsufficientTurns` so the client can render remaining
/// balances or a purchase prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnSnapshot {
    pub remaining_free: u32,
    pub remaining_paid: u32,
}

impl TurnSnapshot {
    pub const fn zero() -> Self {
        Self { remaining_free: 0, remaining_paid: 0 }
    }

    pub const fn total(&self) -> u32 {
        self.remaining_free + self.remaining_paid
    }
}

/// Free-text audit tag recorded alongside a debit. Does not affect policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebitContext {
    Reading,
    Subscription,
}

impl std::fmt::Display for DebitContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reading => write!(f, "reading"),
            Self::Subscription => write!(f, "subscription"),
        }
    }
}
