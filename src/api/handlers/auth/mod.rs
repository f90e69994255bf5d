//! Authentication flow: password check, one-time code by email, session
//! cookie issuance, and password reset.

mod error;
mod password;
mod state;
mod storage;
mod types;
mod utils;

pub mod login;
pub mod reset;
pub mod session;
pub mod verify;

pub use login::{professor_login, student_login};
pub use reset::{forgot_password, update_password};
pub use session::{logout, session, Role};
pub use state::{AuthConfig, AuthState};
pub use types::{
    ForgotPasswordRequest, LoginRequest, MessageResponse, SessionResponse, UpdatePasswordRequest,
    VerifyOtpRequest,
};
pub use verify::{professor_verify_otp, student_verify_otp};
