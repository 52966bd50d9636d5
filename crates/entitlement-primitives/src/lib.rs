//! Shared domain types for the entitlement and payment core.
//!
//! Every other crate in this workspace (`entitlement-ledger`,
//! `entitlement-payment-verifier`, `entitlement-credit-applier`, ...)
//! builds on the types defined here: [`User`], [`PaymentRecord`],
//! [`Task`], and the turn-accounting helpers in [`turns`].

mod payment;
mod task;
mod turns;
mod user;

pub use payment::{PaymentRecord, PaymentStatus, ProductVariant};
pub use task::{Task, TaskKind, TaskState, DEFAULT_TASK_RETENTION_DAYS};
pub use turns::{DebitContext, EffectiveTurns, TurnSnapshot};
pub use user::{SubscriptionStatus, User};
