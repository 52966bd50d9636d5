use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::state::AppState;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{delete, get, patch, post};
use axum::Router;
use entitlement_admission::Admission;
use entitlement_config::EndpointClass;
use entitlement_primitives::{DebitContext, ProductVariant};
use entitlement_tasks::TaskKind;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::str::FromStr;
use uuid::Uuid;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/reading", post(create_reading))
        .route("/payments", post(submit_payment))
        .route("/tasks/status/:id", get(task_status))
        .route("/tasks/cancel/:id", delete(task_cancel))
        .route("/tasks/active", get(tasks_active))
        .route("/tasks/workers", get(task_workers))
        .route("/admin/users/:id/specialized-premium", patch(set_specialized_premium))
        .route("/admin/tasks/reset-monthly", post(trigger_monthly_reset))
        .with_state(state)
}

#[derive(Serialize)]
struct ReadingBody {
    status: &'static str,
}

/// The billable endpoint contract from spec.md §6. The reading itself
/// is produced by an external LLM collaborator out of this core's
/// scope; this handler only enforces rate limit and admission.
async fn create_reading(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    state
        .rate_limiter
        .check(addr.ip(), EndpointClass::Tarot)
        .map_err(|e| AppError::RateLimited { capacity_per_minute: e.capacity_per_minute })?;

    match state.admission.admit(user.user_id, DebitContext::Reading).await? {
        Admission::Proceed(_) => Ok((StatusCode::OK, Json(ReadingBody { status: "ok" }))),
        Admission::Reject { snapshot } => Err(AppError::InsufficientTurns(snapshot)),
    }
}

#[derive(Deserialize)]
struct PaymentSubmission {
    transaction_hash: String,
    product_variant: String,
    #[allow(dead_code)]
    claimed_amount: String,
    wallet_address: String,
}

#[derive(Serialize)]
struct PaymentResponse {
    success: bool,
    transaction_verified: bool,
    turns_added: u32,
    message: String,
    transaction_hash: String,
}

async fn submit_payment(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    user: AuthenticatedUser,
    Json(body): Json<PaymentSubmission>,
) -> Result<impl IntoResponse, AppError> {
    state
        .rate_limiter
        .check(addr.ip(), EndpointClass::Default)
        .map_err(|e| AppError::RateLimited { capacity_per_minute: e.capacity_per_minute })?;

    let variant = ProductVariant::from_str(&body.product_variant)
        .map_err(|e| AppError::ValidationError(e))?;

    let outcome = state
        .credit_applier
        .apply(&body.transaction_hash, user.user_id, &body.wallet_address, variant, chrono::Utc::now())
        .await?;

    let response = match outcome {
        entitlement_credit_applier::CreditOutcome::Credited { record } => PaymentResponse {
            success: true,
            transaction_verified: true,
            turns_added: record.turns_credited,
            message: "payment verified and credited".to_string(),
            transaction_hash: record.transaction_hash,
        },
        entitlement_credit_applier::CreditOutcome::Duplicate { existing } => PaymentResponse {
            success: false,
            transaction_verified: true,
            turns_added: 0,
            message: "transaction already processed".to_string(),
            transaction_hash: existing.transaction_hash,
        },
        entitlement_credit_applier::CreditOutcome::Rejected { reason } => PaymentResponse {
            success: false,
            transaction_verified: false,
            turns_added: 0,
            message: reason.to_string(),
            transaction_hash: body.transaction_hash,
        },
    };
    Ok((StatusCode::OK, Json(response)))
}

async fn task_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let task = state.tasks.status(id, Some(user.user_id), user.is_admin).await?;
    Ok(Json(task))
}

#[derive(Serialize)]
struct CancelResponse {
    cancelled: bool,
}

async fn task_cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let cancelled = state.tasks.cancel(id, Some(user.user_id), user.is_admin).await?;
    Ok(Json(CancelResponse { cancelled }))
}

async fn tasks_active(State(state): State<AppState>, _user: AuthenticatedUser) -> Result<impl IntoResponse, AppError> {
    let grouped = state.tasks.active().await?;
    Ok(Json(grouped))
}

async fn task_workers(State(state): State<AppState>, _user: AuthenticatedUser) -> Result<impl IntoResponse, AppError> {
    let stats = state.tasks.worker_stats().await?;
    Ok(Json(stats))
}

#[derive(Deserialize)]
struct SpecializedPremiumBody {
    enabled: bool,
}

async fn set_specialized_premium(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(body): Json<SpecializedPremiumBody>,
) -> Result<impl IntoResponse, AppError> {
    if !user.is_admin {
        return Err(AppError::Forbidden);
    }
    state.ledger.set_specialized_premium(id, body.enabled).await.map_err(|e| AppError::StorageUnavailable(e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn trigger_monthly_reset(State(state): State<AppState>, user: AuthenticatedUser) -> Result<impl IntoResponse, AppError> {
    if !user.is_admin {
        return Err(AppError::Forbidden);
    }
    let _task_id = state
        .tasks
        .enqueue(TaskKind::ResetMonthlyFreeTurns, Some(user.user_id), true, chrono::Utc::now())
        .await?;
    let summary = state.scheduler.run(chrono::Utc::now(), state.config.free_turns_default).await;
    Ok(Json(serde_json::json!({
        "eligible": summary.eligible,
        "reset": summary.reset,
        "skipped": summary.skipped,
        "failed": summary.failed,
    })))
}
