//! Authentication is a Non-goal of this core — the real service verifies
//! a bearer token upstream and hands this layer an opaque identity. This
//! extractor stands in for that collaborator: it trusts `X-User-Id` and
//! `X-Is-Admin` headers and fails closed with 401 when they're absent or
//! malformed, matching spec.md §6's "auth failure: 401" note.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub is_admin: bool,
}

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw_id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .ok_or((StatusCode::UNAUTHORIZED, "missing X-User-Id"))?;
        let user_id = Uuid::parse_str(raw_id).map_err(|_| (StatusCode::UNAUTHORIZED, "malformed X-User-Id"))?;
        let is_admin = parts
            .headers
            .get("x-is-admin")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Ok(Self { user_id, is_admin })
    }
}
