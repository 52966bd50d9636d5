use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use entitlement_primitives::TurnSnapshot;
use serde::Serialize;
use thiserror::Error;

/// HTTP-facing error taxonomy, per spec.md §7. `InsufficientTurns` and
/// `RateLimited` carry the payload the client needs to react (remaining
/// turns, or the exceeded limit) rather than a bare message.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("insufficient turns")]
    InsufficientTurns(TurnSnapshot),
    #[error("rate limited")]
    RateLimited { capacity_per_minute: u32 },
    #[error("operation requires administrator privileges")]
    Forbidden,
    #[error("{0}")]
    ValidationError(String),
    #[error("not found")]
    NotFound,
    #[error("upstream provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

#[derive(Serialize)]
struct QuotaExhaustedBody {
    message: &'static str,
    remaining_free_turns: u32,
    remaining_paid_turns: u32,
    total_remaining_turns: u32,
}

#[derive(Serialize)]
struct RateLimitedBody {
    error: &'static str,
    detail: String,
}

#[derive(Serialize)]
struct SimpleErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::InsufficientTurns(snapshot) => (
                StatusCode::PAYMENT_REQUIRED,
                Json(QuotaExhaustedBody {
                    message: "insufficient turns remaining",
                    remaining_free_turns: snapshot.remaining_free,
                    remaining_paid_turns: snapshot.remaining_paid,
                    total_remaining_turns: snapshot.total(),
                }),
            )
                .into_response(),
            Self::RateLimited { capacity_per_minute } => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(RateLimitedBody {
                    error: "Rate limit exceeded",
                    detail: format!("{capacity_per_minute} per minute"),
                }),
            )
                .into_response(),
            Self::Forbidden => (StatusCode::FORBIDDEN, Json(SimpleErrorBody { error: self.to_string() })).into_response(),
            Self::ValidationError(msg) => (StatusCode::BAD_REQUEST, Json(SimpleErrorBody { error: msg })).into_response(),
            Self::NotFound => (StatusCode::NOT_FOUND, Json(SimpleErrorBody { error: "not found".to_string() })).into_response(),
            Self::ProviderUnavailable(_) => (
                StatusCode::BAD_GATEWAY,
                Json(SimpleErrorBody { error: "upstream provider unavailable".to_string() }),
            )
                .into_response(),
            Self::StorageUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(SimpleErrorBody { error: "storage unavailable".to_string() }),
            )
                .into_response(),
        }
    }
}

impl From<entitlement_admission::AdmissionError> for AppError {
    fn from(err: entitlement_admission::AdmissionError) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

impl From<entitlement_tasks::TaskError> for AppError {
    fn from(err: entitlement_tasks::TaskError) -> Self {
        match err {
            entitlement_tasks::TaskError::NotFound => Self::NotFound,
            entitlement_tasks::TaskError::Forbidden => Self::Forbidden,
            entitlement_tasks::TaskError::StorageUnavailable(e) => Self::StorageUnavailable(e.to_string()),
        }
    }
}

impl From<entitlement_credit_applier::CreditError> for AppError {
    fn from(err: entitlement_credit_applier::CreditError) -> Self {
        match err {
            entitlement_credit_applier::CreditError::ProviderUnavailable(m) => Self::ProviderUnavailable(m),
            entitlement_credit_applier::CreditError::LedgerUnavailable(e) => Self::StorageUnavailable(e.to_string()),
        }
    }
}

impl From<entitlement_storage::StorageError> for AppError {
    fn from(err: entitlement_storage::StorageError) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}
