//! Email delivery through a transactional outbox.
//!
//! Auth handlers never talk to a mail server. They insert a row into
//! `email_outbox` inside the same transaction that persists the one-time
//! code or reset token, so "secret stored" and "email queued" commit or
//! fail together. A background task claims due rows in a single
//! `UPDATE ... RETURNING` with a short lease, delivers them through a
//! [`Mailer`], then marks each row sent, retried, or failed. Rows whose
//! lease lapses (a worker died mid-send) become claimable again, so any
//! number of workers can run side by side.
//!
//! Retries follow a fixed schedule rather than growing without bound; the
//! last rung repeats until `max_attempts` gives up on the row.
//!
//! The default mailer for local dev logs the payload instead of sending.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// The two messages this service sends. The variant carries exactly the
/// fields its template needs, so a malformed payload is unrepresentable at
/// enqueue time and detected at claim time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmailTemplate {
    LoginOtp { code: String },
    PasswordReset { reset_url: String },
}

impl EmailTemplate {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::LoginOtp { .. } => "login_otp",
            Self::PasswordReset { .. } => "password_reset",
        }
    }

    pub(crate) fn payload(&self, to_email: &str) -> Value {
        match self {
            Self::LoginOtp { code } => json!({ "email": to_email, "code": code }),
            Self::PasswordReset { reset_url } => {
                json!({ "email": to_email, "reset_url": reset_url })
            }
        }
    }

    /// Rebuild a template from its stored `template` kind and JSON payload.
    fn from_stored(kind: &str, payload_text: &str) -> Result<Self> {
        let payload: Value =
            serde_json::from_str(payload_text).context("malformed outbox payload")?;
        match kind {
            "login_otp" => Ok(Self::LoginOtp {
                code: payload
                    .get("code")
                    .and_then(Value::as_str)
                    .context("login_otp payload missing code")?
                    .to_string(),
            }),
            "password_reset" => Ok(Self::PasswordReset {
                reset_url: payload
                    .get("reset_url")
                    .and_then(Value::as_str)
                    .context("password_reset payload missing reset_url")?
                    .to_string(),
            }),
            other => bail!("unknown email template: {other}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct OutboundEmail {
    pub to_email: String,
    pub template: EmailTemplate,
}

/// Delivery abstraction used by the outbox worker.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver a message or return an error to schedule a retry.
    async fn send(&self, message: &OutboundEmail) -> Result<()>;
}

/// Local dev mailer that logs instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &OutboundEmail) -> Result<()> {
        match &message.template {
            EmailTemplate::LoginOtp { code } => info!(
                to_email = %message.to_email,
                code = %code,
                "login code email (log delivery)"
            ),
            EmailTemplate::PasswordReset { reset_url } => info!(
                to_email = %message.to_email,
                reset_url = %reset_url,
                "password reset email (log delivery)"
            ),
        }
        Ok(())
    }
}

/// Delay before retry N+1 after N failed attempts; the last rung repeats.
const RETRY_SCHEDULE: [Duration; 4] = [
    Duration::from_secs(30),
    Duration::from_secs(120),
    Duration::from_secs(600),
    Duration::from_secs(1800),
];

/// How long a claimed row stays invisible to other workers.
const CLAIM_LEASE: Duration = Duration::from_secs(120);

fn retry_delay(attempts: u32) -> Duration {
    let last = RETRY_SCHEDULE.len() - 1;
    let index = attempts.saturating_sub(1).min(last as u32) as usize;
    RETRY_SCHEDULE[index]
}

#[derive(Clone, Copy, Debug)]
pub struct OutboxConfig {
    poll_interval: Duration,
    batch_size: usize,
    max_attempts: u32,
}

impl OutboxConfig {
    /// Defaults: 5s poll interval, 10 rows per batch, 5 attempts.
    #[must_use]
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            max_attempts: 5,
        }
    }

    #[must_use]
    pub fn with_poll_interval_seconds(mut self, seconds: u64) -> Self {
        self.poll_interval = Duration::from_secs(seconds.max(1));
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn the background task that polls and drains the outbox.
pub fn spawn_outbox_worker(
    pool: PgPool,
    mailer: Arc<dyn Mailer>,
    config: OutboxConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(err) = drain_once(&pool, mailer.as_ref(), &config).await {
                error!("email outbox drain failed: {err}");
            }

            sleep(config.poll_interval()).await;
        }
    })
}

/// A row pulled out of the outbox, attempts already incremented.
struct ClaimedEmail {
    id: Uuid,
    attempts: u32,
    to_email: String,
    kind: String,
    payload_text: String,
}

/// Claim one batch of due rows and move it through the mailer.
async fn drain_once(pool: &PgPool, mailer: &dyn Mailer, config: &OutboxConfig) -> Result<usize> {
    let claimed = claim_batch(pool, config).await?;
    let count = claimed.len();

    for item in claimed {
        let template = match EmailTemplate::from_stored(&item.kind, &item.payload_text) {
            Ok(template) => template,
            Err(err) => {
                // An undecodable row can never become sendable.
                finish_failed(pool, item.id, &err).await?;
                continue;
            }
        };

        let message = OutboundEmail {
            to_email: item.to_email,
            template,
        };
        match mailer.send(&message).await {
            Ok(()) => finish_sent(pool, item.id).await?,
            Err(err) if item.attempts >= config.max_attempts() => {
                error!(outbox_id = %item.id, "giving up on email after {} attempts: {err}", item.attempts);
                finish_failed(pool, item.id, &err).await?;
            }
            Err(err) => schedule_retry(pool, item.id, &err, retry_delay(item.attempts)).await?,
        }
    }

    Ok(count)
}

/// Atomically lease a batch of due rows. `SKIP LOCKED` keeps concurrent
/// claimers off each other's rows, and bumping `next_attempt_at` makes a
/// crashed worker's rows reappear once the lease lapses.
async fn claim_batch(pool: &PgPool, config: &OutboxConfig) -> Result<Vec<ClaimedEmail>> {
    let query = r"
        UPDATE email_outbox
        SET status = 'sending',
            attempts = attempts + 1,
            next_attempt_at = NOW() + ($2 * INTERVAL '1 second')
        WHERE id IN (
            SELECT id
            FROM email_outbox
            WHERE status IN ('pending', 'sending')
              AND next_attempt_at <= NOW()
            ORDER BY next_attempt_at ASC, created_at ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING id, to_email, template, payload_json::text AS payload_json, attempts
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(i64::try_from(config.batch_size()).unwrap_or(1))
        .bind(i64::try_from(CLAIM_LEASE.as_secs()).unwrap_or(120))
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to claim email outbox batch")?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let attempts: i32 = row.get("attempts");
            ClaimedEmail {
                id: row.get("id"),
                attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
                to_email: row.get("to_email"),
                kind: row.get("template"),
                payload_text: row.get("payload_json"),
            }
        })
        .collect())
}

async fn finish_sent(pool: &PgPool, id: Uuid) -> Result<()> {
    let query = r"
        UPDATE email_outbox
        SET status = 'sent',
            last_error = NULL,
            sent_at = NOW()
        WHERE id = $1
          AND status = 'sending'
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to mark outbox row sent")?;
    Ok(())
}

async fn finish_failed(pool: &PgPool, id: Uuid, err: &anyhow::Error) -> Result<()> {
    let query = r"
        UPDATE email_outbox
        SET status = 'failed',
            last_error = $2
        WHERE id = $1
          AND status = 'sending'
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .bind(err.to_string())
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to mark outbox row failed")?;
    Ok(())
}

async fn schedule_retry(pool: &PgPool, id: Uuid, err: &anyhow::Error, delay: Duration) -> Result<()> {
    let delay_seconds = i64::try_from(delay.as_secs()).unwrap_or(i64::MAX);
    let query = r"
        UPDATE email_outbox
        SET status = 'pending',
            last_error = $2,
            next_attempt_at = NOW() + ($3 * INTERVAL '1 second')
        WHERE id = $1
          AND status = 'sending'
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .bind(err.to_string())
        .bind(delay_seconds)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to schedule outbox retry")?;
    Ok(())
}
