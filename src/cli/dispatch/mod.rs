use crate::cli::{
    actions::{server, Action},
    globals::GlobalArgs,
};
use anyhow::{Context, Result};
use secrecy::SecretString;

pub fn handler(matches: &clap::ArgMatches) -> Result<(Action, GlobalArgs)> {
    let token_secret = matches
        .get_one::<String>("token-secret")
        .map(|s| SecretString::from(s.clone()))
        .context("missing required argument: --token-secret")?;

    let globals = GlobalArgs::new(token_secret);

    let action = Action::Server(server::Args {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: matches
            .get_one::<String>("dsn")
            .map(ToString::to_string)
            .context("missing required argument: --dsn")?,
        frontend_url: matches
            .get_one::<String>("frontend-url")
            .map(ToString::to_string)
            .unwrap_or_else(|| "http://localhost:5173".to_string()),
        otp_ttl_seconds: matches.get_one::<i64>("otp-ttl").copied().unwrap_or(600),
        reset_ttl_seconds: matches
            .get_one::<i64>("reset-ttl")
            .copied()
            .unwrap_or(1800),
        session_ttl_seconds: matches
            .get_one::<i64>("session-ttl")
            .copied()
            .unwrap_or(43200),
        outbox_poll_seconds: matches.get_one::<u64>("outbox-poll").copied().unwrap_or(5),
    });

    Ok((action, globals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use secrecy::ExposeSecret;

    #[test]
    fn test_handler_defaults() -> Result<()> {
        let matches = commands::new().get_matches_from(vec![
            "ateneo",
            "--dsn",
            "postgres://localhost/ateneo",
            "--token-secret",
            "sekret",
        ]);

        let (action, globals) = handler(&matches)?;
        assert_eq!(globals.token_secret.expose_secret(), "sekret");

        let Action::Server(args) = action;
        assert_eq!(args.port, 8080);
        assert_eq!(args.dsn, "postgres://localhost/ateneo");
        assert_eq!(args.otp_ttl_seconds, 600);
        assert_eq!(args.reset_ttl_seconds, 1800);
        assert_eq!(args.session_ttl_seconds, 43200);
        assert_eq!(args.outbox_poll_seconds, 5);
        Ok(())
    }
}
