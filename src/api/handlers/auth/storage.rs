//! Database helpers for credentials, one-time codes, and reset tokens.
//!
//! Expiry checks happen database-side against `NOW()`, and single-use
//! semantics are enforced by conditional `UPDATE ... RETURNING` statements
//! so concurrent submissions cannot consume the same secret twice.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::session::Role;
use super::state::AuthConfig;
use super::utils::{build_reset_url, generate_reset_token, hash_one_time_secret};
use crate::api::email::EmailTemplate;

/// Account data needed to verify a password for a given role.
pub(super) struct LoginAccount {
    pub(super) account_id: Uuid,
    pub(super) email: String,
    pub(super) password_hash: String,
}

/// Denormalized profile fields embedded in the session token.
pub(crate) struct ProfileRecord {
    pub(crate) account_id: Uuid,
    pub(crate) full_name: String,
    pub(crate) org_id: Option<Uuid>,
}

/// Outcome for a password reset request (always 200 to avoid account probing).
#[derive(Debug)]
pub(super) enum ResetOutcome {
    Queued,
    Noop,
}

/// Failure mode of [`store_otp`]. The caller answers 502 only when the
/// outbox insert failed; any other database failure is an internal error.
#[derive(Debug)]
pub(super) enum StoreOtpError {
    Storage(anyhow::Error),
    Enqueue(anyhow::Error),
}

impl std::fmt::Display for StoreOtpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(err) => write!(f, "failed to store one-time code: {err}"),
            Self::Enqueue(err) => write!(f, "failed to enqueue one-time code email: {err}"),
        }
    }
}

impl std::error::Error for StoreOtpError {}

/// Look up an account by normalized email for one role.
///
/// Requires both the role on the account row and the role-specific profile
/// sub-record; a mismatch on either looks identical to an unknown email.
pub(super) async fn lookup_login_account(
    pool: &PgPool,
    email: &str,
    role: Role,
) -> Result<Option<LoginAccount>> {
    let query = match role {
        Role::Student => {
            r"
        SELECT accounts.id, accounts.email, credentials.password_hash
        FROM accounts
        JOIN credentials ON credentials.account_id = accounts.id
        JOIN student_profiles ON student_profiles.account_id = accounts.id
        WHERE accounts.email = $1
          AND accounts.role = 'student'
        LIMIT 1
    "
        }
        Role::Professor => {
            r"
        SELECT accounts.id, accounts.email, credentials.password_hash
        FROM accounts
        JOIN credentials ON credentials.account_id = accounts.id
        JOIN professor_profiles ON professor_profiles.account_id = accounts.id
        WHERE accounts.email = $1
          AND accounts.role = 'professor'
        LIMIT 1
    "
        }
    };
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup login account")?;

    Ok(row.map(|row| LoginAccount {
        account_id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
    }))
}

/// Persist a fresh one-time code and enqueue its delivery email atomically.
///
/// Any prior unconsumed code is replaced outright; only the newest code is
/// ever valid. Delivery is owned by the outbox worker, so a persisted but
/// undelivered code is harmless and simply expires.
pub(super) async fn store_otp(
    pool: &PgPool,
    account_id: Uuid,
    email: &str,
    code: &str,
    config: &AuthConfig,
) -> Result<(), StoreOtpError> {
    let mut tx = pool
        .begin()
        .await
        .context("begin otp transaction")
        .map_err(StoreOtpError::Storage)?;

    let code_hash = hash_one_time_secret(code);
    let query = r"
        UPDATE credentials
        SET otp_hash = $2,
            otp_expires_at = NOW() + ($3 * INTERVAL '1 second'),
            updated_at = NOW()
        WHERE account_id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(account_id)
        .bind(code_hash)
        .bind(config.otp_ttl_seconds())
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to store one-time code")
        .map_err(StoreOtpError::Storage)?;

    let template = EmailTemplate::LoginOtp {
        code: code.to_string(),
    };
    enqueue_email(&mut tx, email, &template)
        .await
        .map_err(StoreOtpError::Enqueue)?;

    tx.commit()
        .await
        .context("commit otp transaction")
        .map_err(StoreOtpError::Storage)?;
    Ok(())
}

/// Consume a one-time code: match, expiry, and single-use in one statement.
pub(super) async fn consume_otp(pool: &PgPool, account_id: Uuid, code: &str) -> Result<bool> {
    let code_hash = hash_one_time_secret(code);
    let query = r"
        UPDATE credentials
        SET otp_hash = NULL,
            otp_expires_at = NULL,
            updated_at = NOW()
        WHERE account_id = $1
          AND otp_hash = $2
          AND otp_expires_at > NOW()
        RETURNING account_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(account_id)
        .bind(code_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to consume one-time code")?;

    Ok(row.is_some())
}

/// Load the role profile embedded in the session token.
pub(super) async fn lookup_profile(
    pool: &PgPool,
    account_id: Uuid,
    role: Role,
) -> Result<Option<ProfileRecord>> {
    let query = match role {
        Role::Student => {
            r"
        SELECT account_id, full_name, college_id AS org_id
        FROM student_profiles
        WHERE account_id = $1
    "
        }
        Role::Professor => {
            r"
        SELECT account_id, full_name, department_id AS org_id
        FROM professor_profiles
        WHERE account_id = $1
    "
        }
    };
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(account_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup profile")?;

    Ok(row.map(|row| ProfileRecord {
        account_id: row.get("account_id"),
        full_name: row.get("full_name"),
        org_id: row.get("org_id"),
    }))
}

/// Persist a reset token and enqueue the reset email for any matching account.
///
/// Intentionally opaque: the caller responds the same way whether or not the
/// email exists, so the outcome only distinguishes work done from a no-op.
pub(super) async fn store_reset_token(
    pool: &PgPool,
    email: &str,
    config: &AuthConfig,
) -> Result<ResetOutcome> {
    let mut tx = pool.begin().await.context("begin reset transaction")?;

    let query = r"
        SELECT accounts.id
        FROM accounts
        JOIN credentials ON credentials.account_id = accounts.id
        WHERE accounts.email = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to lookup account for reset")?;

    let Some(row) = row else {
        tx.commit().await.context("commit reset noop")?;
        return Ok(ResetOutcome::Noop);
    };

    let account_id: Uuid = row.get("id");
    let token = generate_reset_token()?;
    let token_hash = hash_one_time_secret(&token);

    let query = r"
        UPDATE credentials
        SET reset_token_hash = $2,
            reset_expires_at = NOW() + ($3 * INTERVAL '1 second'),
            updated_at = NOW()
        WHERE account_id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(account_id)
        .bind(token_hash)
        .bind(config.reset_ttl_seconds())
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to store reset token")?;

    let template = EmailTemplate::PasswordReset {
        reset_url: build_reset_url(config.frontend_base_url(), &token),
    };
    enqueue_email(&mut tx, email, &template).await?;

    tx.commit().await.context("commit reset enqueue")?;
    Ok(ResetOutcome::Queued)
}

/// Overwrite the password and clear the reset token where it matches and is
/// unexpired. Returns whether a credential row was updated.
pub(super) async fn consume_reset_token(
    pool: &PgPool,
    token: &str,
    new_password_hash: &str,
) -> Result<bool> {
    let token_hash = hash_one_time_secret(token);
    let query = r"
        UPDATE credentials
        SET password_hash = $2,
            reset_token_hash = NULL,
            reset_expires_at = NULL,
            updated_at = NOW()
        WHERE reset_token_hash = $1
          AND reset_expires_at > NOW()
        RETURNING account_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .bind(new_password_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to consume reset token")?;

    Ok(row.is_some())
}

async fn enqueue_email(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    to_email: &str,
    template: &EmailTemplate,
) -> Result<()> {
    let payload_text = serde_json::to_string(&template.payload(to_email))
        .context("failed to serialize email payload")?;
    let query = r"
        INSERT INTO email_outbox (to_email, template, payload_json)
        VALUES ($1, $2, $3::jsonb)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(to_email)
        .bind(template.kind())
        .bind(payload_text)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert email outbox row")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{LoginAccount, ProfileRecord, ResetOutcome, StoreOtpError};
    use anyhow::anyhow;
    use uuid::Uuid;

    #[test]
    fn reset_outcome_debug_names() {
        assert_eq!(format!("{:?}", ResetOutcome::Queued), "Queued");
        assert_eq!(format!("{:?}", ResetOutcome::Noop), "Noop");
    }

    #[test]
    fn store_otp_error_names_the_failing_side() {
        let storage = StoreOtpError::Storage(anyhow!("connection refused"));
        assert_eq!(
            storage.to_string(),
            "failed to store one-time code: connection refused"
        );

        let enqueue = StoreOtpError::Enqueue(anyhow!("outbox insert failed"));
        assert_eq!(
            enqueue.to_string(),
            "failed to enqueue one-time code email: outbox insert failed"
        );
    }

    #[test]
    fn login_account_holds_values() {
        let account = LoginAccount {
            account_id: Uuid::nil(),
            email: "a@x.com".to_string(),
            password_hash: "$argon2id$stub".to_string(),
        };
        assert_eq!(account.account_id, Uuid::nil());
        assert_eq!(account.email, "a@x.com");
        assert_eq!(account.password_hash, "$argon2id$stub");
    }

    #[test]
    fn profile_record_holds_values() {
        let profile = ProfileRecord {
            account_id: Uuid::nil(),
            full_name: "Ada".to_string(),
            org_id: None,
        };
        assert_eq!(profile.account_id, Uuid::nil());
        assert_eq!(profile.full_name, "Ada");
        assert!(profile.org_id.is_none());
    }
}
