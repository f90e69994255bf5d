//! Session credential issuance, introspection, and logout.
//!
//! A session is a stateless signed token (HS256) carried in a role-named
//! cookie. Nothing is persisted server-side; a session ends when the cookie
//! is cleared or the expiry claim passes.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json},
};
use chrono::Utc;
use jsonwebtoken::{Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use super::state::AuthState;
use super::storage::ProfileRecord;
use super::types::SessionResponse;

/// Account role, also the tag that picks the session cookie.
///
/// The two cookies are independent so one browser can hold a student and a
/// professor session at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Professor,
}

impl Role {
    pub(super) fn cookie_name(self) -> &'static str {
        match self {
            Self::Student => "studentToken",
            Self::Professor => "professorToken",
        }
    }

    /// Textual form matching the `account_role` enum in the database.
    pub(super) fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Professor => "professor",
        }
    }
}

/// Claims embedded in the session token.
#[derive(Debug, Serialize, Deserialize)]
pub(super) struct SessionClaims {
    pub(super) sub: Uuid,
    pub(super) role: Role,
    pub(super) name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) org: Option<Uuid>,
    pub(super) iat: i64,
    pub(super) exp: i64,
}

/// Sign a session token for a verified account.
pub(super) fn issue_session(
    auth_state: &AuthState,
    role: Role,
    profile: &ProfileRecord,
) -> anyhow::Result<String> {
    let now = Utc::now().timestamp();
    let claims = SessionClaims {
        sub: profile.account_id,
        role,
        name: profile.full_name.clone(),
        org: profile.org_id,
        iat: now,
        exp: now + auth_state.config().session_ttl_seconds(),
    };
    let token = jsonwebtoken::encode(&Header::default(), &claims, auth_state.encoding_key())?;
    Ok(token)
}

/// Decode and validate a session token, including its expiry claim.
pub(super) fn decode_session(
    auth_state: &AuthState,
    token: &str,
) -> Option<SessionClaims> {
    jsonwebtoken::decode::<SessionClaims>(
        token,
        auth_state.decoding_key(),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

/// Build the `HttpOnly` session cookie for a role.
pub(super) fn session_cookie(
    auth_state: &AuthState,
    role: Role,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = auth_state.config().session_ttl_seconds();
    let secure = auth_state.config().session_cookie_secure();
    let name = role.cookie_name();
    let mut cookie =
        format!("{name}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_role_cookie(
    auth_state: &AuthState,
    role: Role,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let secure = auth_state.config().session_cookie_secure();
    let name = role.cookie_name();
    let mut cookie = format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(super) fn extract_role_token(headers: &HeaderMap, role: Role) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == role.cookie_name() {
            return Some(val.to_string());
        }
    }
    None
}

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 204, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    // Missing or invalid cookies are treated as "no session" to avoid
    // leaking auth state.
    for role in [Role::Student, Role::Professor] {
        let Some(token) = extract_role_token(&headers, role) else {
            continue;
        };
        if let Some(claims) = decode_session(&auth_state, &token) {
            let response = SessionResponse {
                account_id: claims.sub.to_string(),
                role: role.as_str().to_string(),
                name: claims.name,
                org_id: claims.org.map(|id| id.to_string()),
            };
            return (StatusCode::OK, Json(response)).into_response();
        }
    }
    StatusCode::NO_CONTENT.into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 200, description = "Both session cookies cleared", body = super::types::MessageResponse)
    ),
    tag = "auth"
)]
pub async fn logout(auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    // Clear both role cookies regardless of which one is set; harmless and
    // idempotent when neither was ever issued.
    let mut headers = HeaderMap::new();
    for role in [Role::Student, Role::Professor] {
        if let Ok(cookie) = clear_role_cookie(&auth_state, role) {
            headers.append(SET_COOKIE, cookie);
        }
    }
    (
        StatusCode::OK,
        headers,
        Json(json!({ "message": "Logged out" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::super::state::AuthConfig;
    use super::*;
    use axum::http::HeaderValue;
    use secrecy::SecretString;

    fn auth_state(frontend: &str) -> AuthState {
        AuthState::new(
            AuthConfig::new(frontend.to_string()),
            &SecretString::from("unit-test-secret"),
        )
    }

    fn profile() -> ProfileRecord {
        ProfileRecord {
            account_id: Uuid::new_v4(),
            full_name: "Ada Lovelace".to_string(),
            org_id: Some(Uuid::new_v4()),
        }
    }

    #[test]
    fn cookie_names_are_role_scoped() {
        assert_eq!(Role::Student.cookie_name(), "studentToken");
        assert_eq!(Role::Professor.cookie_name(), "professorToken");
    }

    #[test]
    fn issue_and_decode_round_trip() -> anyhow::Result<()> {
        let state = auth_state("https://ateneo.dev");
        let profile = profile();
        let token = issue_session(&state, Role::Student, &profile)?;

        let claims = decode_session(&state, &token).expect("valid token");
        assert_eq!(claims.sub, profile.account_id);
        assert_eq!(claims.role, Role::Student);
        assert_eq!(claims.name, "Ada Lovelace");
        assert_eq!(claims.org, profile.org_id);
        assert_eq!(claims.exp - claims.iat, 43200);
        Ok(())
    }

    #[test]
    fn decode_rejects_expired_token() -> anyhow::Result<()> {
        // TTL far enough in the past to clear the default validation leeway.
        let state = AuthState::new(
            AuthConfig::new("https://ateneo.dev".to_string()).with_session_ttl_seconds(-3600),
            &SecretString::from("unit-test-secret"),
        );
        let token = issue_session(&state, Role::Professor, &profile())?;
        assert!(decode_session(&state, &token).is_none());
        Ok(())
    }

    #[test]
    fn decode_rejects_wrong_secret() -> anyhow::Result<()> {
        let state = auth_state("https://ateneo.dev");
        let token = issue_session(&state, Role::Student, &profile())?;

        let other = AuthState::new(
            AuthConfig::new("https://ateneo.dev".to_string()),
            &SecretString::from("different-secret"),
        );
        assert!(decode_session(&other, &token).is_none());
        Ok(())
    }

    #[test]
    fn session_cookie_sets_security_attributes() -> anyhow::Result<()> {
        let state = auth_state("https://ateneo.dev");
        let cookie = session_cookie(&state, Role::Student, "tok")?;
        let value = cookie.to_str()?;
        assert!(value.starts_with("studentToken=tok"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("SameSite=Lax"));
        assert!(value.contains("Path=/"));
        assert!(value.contains("Secure"));
        Ok(())
    }

    #[test]
    fn session_cookie_not_secure_over_http() -> anyhow::Result<()> {
        let state = auth_state("http://localhost:5173");
        let cookie = session_cookie(&state, Role::Professor, "tok")?;
        assert!(!cookie.to_str()?.contains("Secure"));
        Ok(())
    }

    #[test]
    fn extract_role_token_parses_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("other=1; studentToken=abc; professorToken=def"),
        );
        assert_eq!(
            extract_role_token(&headers, Role::Student),
            Some("abc".to_string())
        );
        assert_eq!(
            extract_role_token(&headers, Role::Professor),
            Some("def".to_string())
        );
    }

    #[tokio::test]
    async fn logout_clears_both_cookies() {
        let state = Arc::new(auth_state("https://ateneo.dev"));
        let response = logout(Extension(state.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let cookies: Vec<_> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect();
        assert_eq!(cookies.len(), 2);
        assert!(cookies
            .iter()
            .any(|cookie| cookie.starts_with("studentToken=;") && cookie.contains("Max-Age=0")));
        assert!(cookies
            .iter()
            .any(|cookie| cookie.starts_with("professorToken=;") && cookie.contains("Max-Age=0")));

        // Idempotent: a second logout produces the same cleared cookies.
        let again = logout(Extension(state)).await.into_response();
        assert_eq!(again.status(), StatusCode::OK);
        assert_eq!(again.headers().get_all(SET_COOKIE).iter().count(), 2);
    }
}
