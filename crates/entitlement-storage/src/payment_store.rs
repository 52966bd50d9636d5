use crate::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use entitlement_primitives::PaymentRecord;

/// Persistence for the append-only payment table the Credit Applier
/// (C4) drives. The uniqueness constraint on `transaction_hash` is what
/// gives the whole payment pipeline its idempotency guarantee.
#[async_trait]
pub trait PaymentStore: Send + Sync + 'static {
    async fn find(&self, transaction_hash: &str) -> Result<Option<PaymentRecord>, StorageError>;

    /// Inserts a new record. Returns [`StorageError::AlreadyExists`] if
    /// the hash is already present (caller maps this to `Duplicate`).
    async fn insert(&self, record: PaymentRecord) -> Result<(), StorageError>;

    async fn mark_confirmed(&self, transaction_hash: &str) -> Result<(), StorageError>;

    /// `Pending` records older than `older_than` — the recovery sweep's
    /// input set.
    async fn stale_pending(&self, older_than: DateTime<Utc>) -> Result<Vec<PaymentRecord>, StorageError>;
}

pub mod postgres {
    use super::*;
    use entitlement_primitives::{PaymentStatus, ProductVariant};
    use sqlx::{PgPool, Row};
    use std::str::FromStr;

    pub struct PostgresPaymentStore {
        pool: PgPool,
    }

    impl PostgresPaymentStore {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }
    }

    fn status_to_row(status: PaymentStatus) -> &'static str {
        match status {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Rejected => "rejected",
        }
    }

    fn status_from_row(raw: &str) -> PaymentStatus {
        match raw {
            "confirmed" => PaymentStatus::Confirmed,
            "rejected" => PaymentStatus::Rejected,
            _ => PaymentStatus::Pending,
        }
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<PaymentRecord, StorageError> {
        let variant_raw: String = row.try_get("product_variant")?;
        Ok(PaymentRecord {
            transaction_hash: row.try_get("transaction_hash")?,
            user_id: row.try_get("user_id")?,
            sender_address: row.try_get("sender_address")?,
            amount: row.try_get("amount")?,
            product_variant: ProductVariant::from_str(&variant_raw)
                .map_err(|_| StorageError::Unavailable(format!("corrupt product_variant {variant_raw}")))?,
            turns_credited: row.try_get::<i32, _>("turns_credited")?.max(0) as u32,
            block_number: row.try_get::<i64, _>("block_number")?.max(0) as u64,
            status: status_from_row(row.try_get::<String, _>("status")?.as_str()),
            created_at: row.try_get("created_at")?,
        })
    }

    #[async_trait]
    impl PaymentStore for PostgresPaymentStore {
        async fn find(&self, transaction_hash: &str) -> Result<Option<PaymentRecord>, StorageError> {
            let row = sqlx::query("SELECT * FROM payment_records WHERE transaction_hash = $1")
                .bind(transaction_hash)
                .fetch_optional(&self.pool)
                .await?;
            row.as_ref().map(row_to_record).transpose()
        }

        async fn insert(&self, record: PaymentRecord) -> Result<(), StorageError> {
            sqlx::query(
                "INSERT INTO payment_records \
                 (transaction_hash, user_id, sender_address, amount, product_variant, turns_credited, block_number, status, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(&record.transaction_hash)
            .bind(record.user_id)
            .bind(&record.sender_address)
            .bind(record.amount)
            .bind(record.product_variant.as_str())
            .bind(record.turns_credited as i32)
            .bind(record.block_number as i64)
            .bind(status_to_row(record.status))
            .bind(record.created_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn mark_confirmed(&self, transaction_hash: &str) -> Result<(), StorageError> {
            sqlx::query("UPDATE payment_records SET status = 'confirmed' WHERE transaction_hash = $1")
                .bind(transaction_hash)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn stale_pending(&self, older_than: DateTime<Utc>) -> Result<Vec<PaymentRecord>, StorageError> {
            let rows = sqlx::query("SELECT * FROM payment_records WHERE status = 'pending' AND created_at < $1")
                .bind(older_than)
                .fetch_all(&self.pool)
                .await?;
            rows.iter().map(row_to_record).collect()
        }
    }
}

pub mod in_memory {
    use super::*;
    use dashmap::DashMap;
    use std::sync::Arc;

    /// Keyed `DashMap` over `transaction_hash`; `insert` relies on
    /// `DashMap::entry`'s atomicity to reject a second insert of the
    /// same hash, mirroring the Postgres unique-index behavior.
    #[derive(Clone, Default)]
    pub struct InMemoryPaymentStore {
        records: Arc<DashMap<String, PaymentRecord>>,
    }

    impl InMemoryPaymentStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl PaymentStore for InMemoryPaymentStore {
        async fn find(&self, transaction_hash: &str) -> Result<Option<PaymentRecord>, StorageError> {
            Ok(self.records.get(transaction_hash).map(|e| e.value().clone()))
        }

        async fn insert(&self, record: PaymentRecord) -> Result<(), StorageError> {
            match self.records.entry(record.transaction_hash.clone()) {
                dashmap::mapref::entry::Entry::Occupied(_) => {
                    Err(StorageError::AlreadyExists("transaction_hash"))
                }
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    slot.insert(record);
                    Ok(())
                }
            }
        }

        async fn mark_confirmed(&self, transaction_hash: &str) -> Result<(), StorageError> {
            let mut entry = self.records.get_mut(transaction_hash).ok_or(StorageError::NotFound)?;
            entry.status = entitlement_primitives::PaymentStatus::Confirmed;
            Ok(())
        }

        async fn stale_pending(&self, older_than: DateTime<Utc>) -> Result<Vec<PaymentRecord>, StorageError> {
            Ok(self
                .records
                .iter()
                .filter(|e| e.status == entitlement_primitives::PaymentStatus::Pending && e.created_at < older_than)
                .map(|e| e.value().clone())
                .collect())
        }
    }
}
