use crate::{
    api,
    cli::{actions::Action, globals::GlobalArgs},
};
use anyhow::Result;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub frontend_url: String,
    pub otp_ttl_seconds: i64,
    pub reset_ttl_seconds: i64,
    pub session_ttl_seconds: i64,
    pub outbox_poll_seconds: u64,
}

/// Handle the server action
pub async fn handle(action: Action, globals: &GlobalArgs) -> Result<()> {
    let Action::Server(args) = action;

    let auth_config = api::handlers::auth::AuthConfig::new(args.frontend_url)
        .with_otp_ttl_seconds(args.otp_ttl_seconds)
        .with_reset_ttl_seconds(args.reset_ttl_seconds)
        .with_session_ttl_seconds(args.session_ttl_seconds);

    let email_config =
        api::email::OutboxConfig::new().with_poll_interval_seconds(args.outbox_poll_seconds);

    api::new(args.port, args.dsn, globals, auth_config, email_config).await?;

    Ok(())
}
