//! Domain errors surfaced at the handler boundary.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::error;

use super::storage::StoreOtpError;

/// Every auth failure a client can observe.
///
/// Unknown email, wrong password, and wrong role all collapse into
/// `InvalidCredentials` so responses cannot be used to enumerate accounts.
#[derive(Debug)]
pub(crate) enum AuthError {
    /// Malformed input; carries the first failing field rule verbatim.
    Validation(String),
    InvalidCredentials,
    InvalidOrExpiredCode,
    InvalidOrExpiredToken,
    /// The outbound email could not be enqueued.
    Delivery,
    /// Catch-all; the internal cause is logged, never returned.
    Internal(anyhow::Error),
}

impl AuthError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidOrExpiredCode | Self::InvalidOrExpiredToken => {
                StatusCode::BAD_REQUEST
            }
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::Delivery => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Validation(rule) => rule.clone(),
            Self::InvalidCredentials => "Invalid email or password".to_string(),
            Self::InvalidOrExpiredCode => "Invalid or expired code".to_string(),
            Self::InvalidOrExpiredToken => "Invalid or expired token".to_string(),
            Self::Delivery => "Could not send email, try again later".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

/// Only the outbox-insert failure is the client's "email could not be
/// sent"; a failing transaction or credentials update is an internal error.
impl From<StoreOtpError> for AuthError {
    fn from(err: StoreOtpError) -> Self {
        match err {
            StoreOtpError::Enqueue(cause) => {
                error!("failed to enqueue one-time code email: {cause:?}");
                Self::Delivery
            }
            StoreOtpError::Storage(cause) => Self::Internal(cause),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let Self::Internal(err) = &self {
            error!("auth handler failed: {err:?}");
        }
        let body = Json(json!({ "error": self.message() }));
        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(
            AuthError::Validation("Missing email".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::InvalidCredentials.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::InvalidOrExpiredCode.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::InvalidOrExpiredToken.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AuthError::Delivery.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            AuthError::Internal(anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_error_hides_cause() {
        let message = AuthError::Internal(anyhow!("connection refused")).message();
        assert_eq!(message, "Internal server error");
        assert!(!message.contains("refused"));
    }

    #[test]
    fn validation_message_is_verbatim() {
        let message = AuthError::Validation("Missing password".to_string()).message();
        assert_eq!(message, "Missing password");
    }

    #[test]
    fn otp_storage_failure_is_internal_not_delivery() {
        let err = AuthError::from(StoreOtpError::Storage(anyhow!("begin failed")));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = AuthError::from(StoreOtpError::Enqueue(anyhow!("insert failed")));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.message(), "Could not send email, try again later");
    }

    #[test]
    fn credential_failures_share_one_shape() {
        // Unknown account and wrong password must be indistinguishable.
        let response = AuthError::InvalidCredentials.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
