//! Sign-in: password check followed by one-time code issuance.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::debug;

use super::error::AuthError;
use super::password::{verify_decoy, verify_password};
use super::session::Role;
use super::state::AuthState;
use super::storage::{lookup_login_account, store_otp};
use super::types::LoginRequest;
use super::utils::{generate_otp_code, normalize_email, valid_email};

#[utoipa::path(
    post,
    path = "/v1/auth/student/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "OTP sent to email", body = super::types::MessageResponse),
        (status = 400, description = "Malformed payload", body = String),
        (status = 401, description = "Invalid email or password", body = String),
        (status = 502, description = "Email could not be sent", body = String)
    ),
    tag = "auth"
)]
pub async fn student_login(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    login(Role::Student, &pool, &auth_state, payload).await
}

#[utoipa::path(
    post,
    path = "/v1/auth/professor/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "OTP sent to email", body = super::types::MessageResponse),
        (status = 400, description = "Malformed payload", body = String),
        (status = 401, description = "Invalid email or password", body = String),
        (status = 502, description = "Email could not be sent", body = String)
    ),
    tag = "auth"
)]
pub async fn professor_login(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    login(Role::Professor, &pool, &auth_state, payload).await
}

async fn login(
    role: Role,
    pool: &PgPool,
    auth_state: &AuthState,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    match try_login(role, pool, auth_state, payload).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn try_login(
    role: Role,
    pool: &PgPool,
    auth_state: &AuthState,
    payload: Option<Json<LoginRequest>>,
) -> Result<Response, AuthError> {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return Err(AuthError::Validation("Missing payload".to_string())),
    };

    let email = normalize_email(&request.email);
    if email.is_empty() {
        return Err(AuthError::Validation("Missing email".to_string()));
    }
    if !valid_email(&email) {
        return Err(AuthError::Validation("Invalid email".to_string()));
    }
    if request.password.is_empty() {
        return Err(AuthError::Validation("Missing password".to_string()));
    }

    // Unknown email, wrong role, and wrong password all take the same exit,
    // and all of them pay for one Argon2 verification.
    let Some(account) = lookup_login_account(pool, &email, role).await? else {
        verify_decoy(&request.password);
        return Err(AuthError::InvalidCredentials);
    };

    if !verify_password(&request.password, &account.password_hash) {
        return Err(AuthError::InvalidCredentials);
    }

    // The code and its email commit together; the 502/500 split happens in
    // the error conversion.
    let code = generate_otp_code();
    store_otp(pool, account.account_id, &account.email, &code, auth_state.config()).await?;

    debug!(account_id = %account.account_id, role = role.as_str(), "one-time code issued");

    Ok((
        StatusCode::OK,
        Json(json!({ "message": "OTP sent to email. Please verify." })),
    )
        .into_response())
}
