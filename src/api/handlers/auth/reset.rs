//! Password reset: token issuance and single-use password update.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::error::AuthError;
use super::password::hash_password;
use super::state::AuthState;
use super::storage::{consume_reset_token, store_reset_token};
use super::types::{ForgotPasswordRequest, UpdatePasswordRequest};
use super::utils::{normalize_email, valid_email};

const MIN_PASSWORD_LENGTH: usize = 8;

/// Request a reset link (always returns 200 to avoid account probing).
#[utoipa::path(
    post,
    path = "/v1/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset accepted", body = super::types::MessageResponse),
        (status = 400, description = "Missing payload", body = String)
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> impl IntoResponse {
    let request: ForgotPasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => {
            return AuthError::Validation("Missing payload".to_string()).into_response();
        }
    };

    let accepted = (
        StatusCode::OK,
        Json(json!({ "message": "If the account exists, a reset link has been sent." })),
    );

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        // Opaque on purpose; an invalid address gets the same answer.
        return accepted.into_response();
    }

    if let Err(err) = store_reset_token(&pool, &email, auth_state.config()).await {
        // Keep the response opaque even on failure; the caller cannot be
        // allowed to distinguish "no such account" from "enqueue failed".
        error!("failed to enqueue password reset: {err:?}");
    }

    accepted.into_response()
}

/// Consume a reset token and overwrite the stored password hash.
#[utoipa::path(
    post,
    path = "/v1/auth/update-password",
    request_body = UpdatePasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = super::types::MessageResponse),
        (status = 400, description = "Invalid or expired token", body = String)
    ),
    tag = "auth"
)]
pub async fn update_password(
    pool: Extension<PgPool>,
    payload: Option<Json<UpdatePasswordRequest>>,
) -> Response {
    match try_update_password(&pool, payload).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn try_update_password(
    pool: &PgPool,
    payload: Option<Json<UpdatePasswordRequest>>,
) -> Result<Response, AuthError> {
    let request: UpdatePasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return Err(AuthError::Validation("Missing payload".to_string())),
    };

    let token = request.token.trim();
    if token.is_empty() {
        return Err(AuthError::Validation("Missing token".to_string()));
    }
    if request.new_password.len() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let password_hash = hash_password(&request.new_password)?;

    // Token match, expiry, and single-use collapse into one statement; the
    // token columns are cleared in the same write that stores the new hash.
    if !consume_reset_token(pool, token, &password_hash).await? {
        return Err(AuthError::InvalidOrExpiredToken);
    }

    Ok((
        StatusCode::OK,
        Json(json!({ "message": "Password updated" })),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::super::state::AuthConfig;
    use super::super::AuthState;
    use super::*;
    use anyhow::Result;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;

    fn auth_state() -> Arc<AuthState> {
        Arc::new(AuthState::new(
            AuthConfig::new("https://ateneo.dev".to_string()),
            &SecretString::from("unit-test-secret"),
        ))
    }

    #[tokio::test]
    async fn forgot_password_missing_payload() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = forgot_password(Extension(pool), Extension(auth_state()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn forgot_password_opaque_for_invalid_email() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = forgot_password(
            Extension(pool),
            Extension(auth_state()),
            Some(Json(ForgotPasswordRequest {
                email: "not-an-email".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn update_password_missing_token() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = update_password(
            Extension(pool),
            Some(Json(UpdatePasswordRequest {
                token: " ".to_string(),
                new_password: "long enough".to_string(),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn update_password_rejects_short_password() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = update_password(
            Extension(pool),
            Some(Json(UpdatePasswordRequest {
                token: "some-token".to_string(),
                new_password: "short".to_string(),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
