//! One-time email login codes
//!
//! Per email a code moves Idle → Issued → Consumed | Expired. Only the keyed
//! hash is stored; the plaintext leaves this module once, inside
//! [`IssuedCode`], for delivery.

mod code;

pub use code::{generate_code, CodeHasher, CODE_DIGITS};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::clock::{from_millis, to_millis};
use crate::error::{BulletpError, Result};
use crate::persistence::Repository;

const HOUR_MILLIS: i64 = 60 * 60 * 1000;

/// A freshly issued code, ready to hand to a sender
#[derive(Clone)]
pub struct IssuedCode {
    pub email: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    /// Lifetime in seconds, as reported to the client
    pub expires_in: u32,
}

impl std::fmt::Debug for IssuedCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedCode")
            .field("email", &self.email)
            .field("code", &"******")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Trim and lowercase an address; it must at least contain `@`
pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(BulletpError::invalid("invalid email"));
    }
    Ok(email)
}

pub(crate) fn issue(conn: &Connection, repo: &Repository, email: &str, ip: &str) -> Result<IssuedCode> {
    let email = normalize_email(email)?;
    let otp = &repo.config().otp;
    let now = repo.now();
    let now_ms = to_millis(now);

    let last: Option<i64> = conn.query_row(
        "SELECT MAX(created_at) FROM email_otps WHERE email = ?1",
        [&email],
        |row| row.get(0),
    )?;
    if let Some(last) = last {
        if now_ms - last < i64::from(otp.cooldown_seconds) * 1000 {
            tracing::warn!(%email, "code requested inside cooldown");
            return Err(BulletpError::RateLimited("too frequent, try later".to_string()));
        }
    }

    let recent: i64 = conn.query_row(
        "SELECT COUNT(*) FROM email_otps WHERE ip = ?1 AND created_at >= ?2",
        params![ip, now_ms - HOUR_MILLIS],
        |row| row.get(0),
    )?;
    if recent >= i64::from(otp.ip_limit_per_hour) {
        tracing::warn!(%ip, recent, "hourly code limit reached");
        return Err(BulletpError::RateLimited("rate limit".to_string()));
    }

    let code = generate_code();
    let expires_at = now + Duration::seconds(i64::from(otp.expire_seconds));
    conn.execute(
        "INSERT INTO email_otps (id, email, code_hash, ip, expires_at, consumed_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6)",
        params![
            Uuid::new_v4().to_string(),
            email,
            repo.hasher().hash(&code),
            ip,
            to_millis(expires_at),
            now_ms
        ],
    )?;
    tracing::info!(%email, %ip, "issued login code");

    Ok(IssuedCode {
        email,
        code,
        expires_at,
        expires_in: otp.expire_seconds,
    })
}

/// Check `code` against the newest unconsumed code for `email` and consume
/// it. Returns the normalized email on success.
pub(crate) fn verify(conn: &Connection, repo: &Repository, email: &str, code: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    let code = code.trim();
    if email.is_empty() || code.is_empty() {
        return Err(BulletpError::invalid("missing email/code"));
    }
    let email = normalize_email(&email)?;
    let now = repo.now();

    let row = conn
        .query_row(
            "SELECT id, code_hash, expires_at FROM email_otps
             WHERE email = ?1 AND consumed_at IS NULL
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
            [&email],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )
        .optional()?;

    let Some((id, code_hash, expires_at)) = row else {
        return Err(BulletpError::invalid("code not found"));
    };
    if from_millis(expires_at).map_or(true, |at| at <= now) {
        return Err(BulletpError::invalid("code expired"));
    }
    if !repo.hasher().verify(code, &code_hash) {
        tracing::warn!(%email, "wrong login code");
        return Err(BulletpError::invalid("invalid code"));
    }

    let consumed = conn.execute(
        "UPDATE email_otps SET consumed_at = ?1 WHERE id = ?2 AND consumed_at IS NULL",
        params![to_millis(now), id],
    )?;
    if consumed != 1 {
        return Err(BulletpError::invalid("code not found"));
    }
    Ok(email)
}

impl Repository {
    /// Issue a new code for `email` requested from `ip`.
    ///
    /// The returned code must be delivered after this call returns; delivery
    /// is never part of the issuing transaction.
    pub fn issue_code(&self, email: &str, ip: &str) -> Result<IssuedCode> {
        self.write(|tx| issue(tx, self, email, ip))
    }

    /// Verify and consume a code. A code succeeds at most once.
    pub fn verify_code(&self, email: &str, code: &str) -> Result<()> {
        self.write(|tx| verify(tx, self, email, code).map(|_| ()))
    }
}
