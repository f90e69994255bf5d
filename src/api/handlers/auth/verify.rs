//! One-time code validation and session cookie issuance.

use anyhow::anyhow;
use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::debug;

use super::error::AuthError;
use super::session::{issue_session, session_cookie, Role};
use super::state::AuthState;
use super::storage::{consume_otp, lookup_login_account, lookup_profile};
use super::types::VerifyOtpRequest;
use super::utils::{normalize_email, valid_email};

#[utoipa::path(
    post,
    path = "/v1/auth/student/verify-otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Session cookie set", body = super::types::MessageResponse),
        (status = 400, description = "Invalid or expired code", body = String)
    ),
    tag = "auth"
)]
pub async fn student_verify_otp(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyOtpRequest>>,
) -> Response {
    verify_otp(Role::Student, &pool, &auth_state, payload).await
}

#[utoipa::path(
    post,
    path = "/v1/auth/professor/verify-otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Session cookie set", body = super::types::MessageResponse),
        (status = 400, description = "Invalid or expired code", body = String)
    ),
    tag = "auth"
)]
pub async fn professor_verify_otp(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyOtpRequest>>,
) -> Response {
    verify_otp(Role::Professor, &pool, &auth_state, payload).await
}

async fn verify_otp(
    role: Role,
    pool: &PgPool,
    auth_state: &AuthState,
    payload: Option<Json<VerifyOtpRequest>>,
) -> Response {
    match try_verify_otp(role, pool, auth_state, payload).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn try_verify_otp(
    role: Role,
    pool: &PgPool,
    auth_state: &AuthState,
    payload: Option<Json<VerifyOtpRequest>>,
) -> Result<Response, AuthError> {
    let request: VerifyOtpRequest = match payload {
        Some(Json(payload)) => payload,
        None => return Err(AuthError::Validation("Missing payload".to_string())),
    };

    let email = normalize_email(&request.email);
    if email.is_empty() || !valid_email(&email) {
        return Err(AuthError::Validation("Invalid email".to_string()));
    }
    let code = request.otp.trim();
    if code.is_empty() {
        return Err(AuthError::Validation("Missing code".to_string()));
    }

    // An unknown email reads the same as a wrong code.
    let Some(account) = lookup_login_account(pool, &email, role).await? else {
        return Err(AuthError::InvalidOrExpiredCode);
    };

    // Match, expiry, and single-use enforced in one statement; a replayed
    // code finds the columns already cleared.
    if !consume_otp(pool, account.account_id, code).await? {
        return Err(AuthError::InvalidOrExpiredCode);
    }

    let profile = lookup_profile(pool, account.account_id, role)
        .await?
        .ok_or_else(|| {
            AuthError::Internal(anyhow!("missing {} profile after login", role.as_str()))
        })?;

    let token = issue_session(auth_state, role, &profile)?;
    let cookie = session_cookie(auth_state, role, &token)
        .map_err(|err| AuthError::Internal(anyhow!("invalid cookie value: {err}")))?;

    debug!(account_id = %account.account_id, role = role.as_str(), "session issued");

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);
    Ok((
        StatusCode::OK,
        headers,
        Json(json!({ "message": "Login successful" })),
    )
        .into_response())
}
