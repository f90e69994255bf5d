//! Request and response bodies for the auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UpdatePasswordRequest {
    pub token: String,
    #[serde(rename = "newPassword")]
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub account_id: String,
    pub role: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_password_uses_camel_case_field() {
        let request: UpdatePasswordRequest =
            serde_json::from_str(r#"{"token":"t","newPassword":"hunter22"}"#).expect("valid json");
        assert_eq!(request.token, "t");
        assert_eq!(request.new_password, "hunter22");
    }

    #[test]
    fn session_response_omits_missing_org() {
        let response = SessionResponse {
            account_id: "id".to_string(),
            role: "student".to_string(),
            name: "Ada".to_string(),
            org_id: None,
        };
        let json = serde_json::to_string(&response).expect("serializable");
        assert!(!json.contains("org_id"));
    }
}
