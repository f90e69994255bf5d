use utoipa::OpenApi;

use crate::api::handlers::{auth, health};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::login::student_login,
        auth::login::professor_login,
        auth::verify::student_verify_otp,
        auth::verify::professor_verify_otp,
        auth::session::session,
        auth::session::logout,
        auth::reset::forgot_password,
        auth::reset::update_password,
    ),
    components(schemas(
        auth::LoginRequest,
        auth::VerifyOtpRequest,
        auth::ForgotPasswordRequest,
        auth::UpdatePasswordRequest,
        auth::MessageResponse,
        auth::SessionResponse,
        auth::Role,
    )),
    tags(
        (name = "auth", description = "Sign-in, OTP verification, sessions, password reset"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_all_auth_paths() {
        let doc = ApiDoc::openapi();
        let paths: Vec<_> = doc.paths.paths.keys().cloned().collect();
        for expected in [
            "/health",
            "/v1/auth/student/login",
            "/v1/auth/professor/login",
            "/v1/auth/student/verify-otp",
            "/v1/auth/professor/verify-otp",
            "/v1/auth/session",
            "/v1/auth/logout",
            "/v1/auth/forgot-password",
            "/v1/auth/update-password",
        ] {
            assert!(paths.iter().any(|path| path.as_str() == expected), "{expected}");
        }
    }
}
