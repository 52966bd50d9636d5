//! Environment-driven configuration for the entitlement and payment core.
//!
//! Every tunable named in spec.md §6 has a field here with the spec's
//! documented default. Nothing reads a config file; everything comes
//! from the process environment, matching the env-var surface spec.md
//! names explicitly (`PAYMENT_ADDRESS`, `CHAIN_RPC_URL`, ...).

mod rate_limits;

pub use rate_limits::{EndpointClass, RateLimitConfig};

use entitlement_primitives::ProductVariant;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromStr;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {name}: {value:?} ({reason})")]
    InvalidVar { name: String, value: String, reason: String },
}

/// One purchasable pack: its price in the native chain denomination and
/// the turns it credits. Ships with the two variants spec.md §4.3 names;
/// additional variants can be added without touching the Verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductSpec {
    pub amount: Decimal,
    pub turns: u32,
}

#[derive(Debug, Clone)]
pub struct ProductCatalog(HashMap<ProductVariant, ProductSpec>);

impl ProductCatalog {
    pub fn get(&self, variant: ProductVariant) -> ProductSpec {
        self.0[&variant]
    }
}

impl Default for ProductCatalog {
    fn default() -> Self {
        let mut map = HashMap::new();
        map.insert(ProductVariant::Ten, ProductSpec { amount: Decimal::new(16, 4), turns: 10 });
        map.insert(ProductVariant::Twenty, ProductSpec { amount: Decimal::new(24, 4), turns: 20 });
        Self(map)
    }
}

/// Top-level service configuration, loaded once at process start and
/// passed by reference through every component the way the teacher
/// threads `reth_config::Config` through its node builder.
#[derive(Debug, Clone)]
pub struct Config {
    /// Case-folded recipient address all payments must be sent to.
    pub payment_address: String,
    pub chain_rpc_url: String,
    /// Minimum confirmations before a payment is accepted. Configuration,
    /// not a recommendation — see spec.md §9's Open Question.
    pub min_confirmations: u64,
    pub amount_tolerance: Decimal,
    /// Free turns granted on signup and on each monthly reset (F₀).
    pub free_turns_default: u32,
    pub rate_limits: RateLimitConfig,
    pub task_broker_url: String,
    pub task_result_backend: String,
    pub products: ProductCatalog,
    /// How long a `Pending` PaymentRecord may sit before the recovery
    /// sweep (`recover_pending_payments`) treats it as stuck.
    pub pending_payment_timeout: Duration,
    pub task_retention_days: u32,
    pub chain_call_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            payment_address: require("PAYMENT_ADDRESS")?.to_lowercase(),
            chain_rpc_url: require("CHAIN_RPC_URL")?,
            min_confirmations: parse_or("MIN_CONFIRMATIONS", 1)?,
            amount_tolerance: parse_decimal_or("AMOUNT_TOLERANCE", "0.0001")?,
            free_turns_default: parse_or("FREE_TURNS_DEFAULT", entitlement_primitives::User::DEFAULT_FREE_TURNS)?,
            rate_limits: RateLimitConfig::from_env()?,
            task_broker_url: optional_or("TASK_BROKER_URL", "amqp://localhost//"),
            task_result_backend: optional_or("TASK_RESULT_BACKEND", "redis://localhost/0"),
            products: ProductCatalog::default(),
            pending_payment_timeout: Duration::from_secs(60 * parse_or::<u64>("PENDING_PAYMENT_TIMEOUT_MINUTES", 15)?),
            task_retention_days: parse_or("TASK_RETENTION_DAYS", entitlement_primitives::DEFAULT_TASK_RETENTION_DAYS)?,
            chain_call_timeout: Duration::from_secs(parse_or("CHAIN_CALL_TIMEOUT_SECONDS", 10)?),
        })
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name))
}

fn optional_or(name: &'static str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(value) => value.parse::<T>().map_err(|e| ConfigError::InvalidVar {
            name: name.to_string(),
            value,
            reason: e.to_string(),
        }),
    }
}

fn parse_decimal_or(name: &'static str, default: &str) -> Result<Decimal, ConfigError> {
    let raw = optional_or(name, default);
    Decimal::from_str(&raw).map_err(|e| ConfigError::InvalidVar {
        name: name.to_string(),
        value: raw,
        reason: e.to_string(),
    })
}
