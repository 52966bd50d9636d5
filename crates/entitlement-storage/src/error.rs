use thiserror::Error;

/// Storage-layer faults. Every variant is an infrastructure problem —
/// policy outcomes (insufficient turns, duplicate payment) are modeled
/// as `Ok` return values further up the stack, not as errors here.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("row not found")]
    NotFound,
    #[error("unique constraint violated on {0}")]
    AlreadyExists(&'static str),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::AlreadyExists("transaction_hash")
            }
            other => Self::Unavailable(other.to_string()),
        }
    }
}
