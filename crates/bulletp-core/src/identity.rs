//! Users and the external identities that resolve to them

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::{from_millis, to_millis};
use crate::error::{BulletpError, PersistenceError, Result};
use crate::persistence::Repository;
use crate::tree::{Bullet, TreeOps};

/// Opaque user identifier
///
/// Users created through a login get a uuid; the legacy caller-asserted
/// scope may be any non-empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh id for a user created by a login
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Resolve a caller-supplied scope: blank or absent maps to `default`,
    /// anything else is used trimmed.
    pub fn from_scope(scope: Option<&str>, default: &str) -> Self {
        match scope.map(str::trim) {
            Some(s) if !s.is_empty() => Self::new(s),
            _ => Self::new(default),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Login provider an identity belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Email,
    WeChat,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Email => "email",
            Provider::WeChat => "wechat",
        }
    }

    /// Canonical form of a subject for this provider
    pub fn normalize_subject(&self, subject: &str) -> String {
        let subject = subject.trim();
        match self {
            Provider::Email => subject.to_lowercase(),
            Provider::WeChat => subject.to_string(),
        }
    }
}

impl FromStr for Provider {
    type Err = BulletpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(Provider::Email),
            "wechat" => Ok(Provider::WeChat),
            "" => Err(BulletpError::invalid("provider/subject required")),
            other => Err(BulletpError::invalid(format!("unknown provider: {other}"))),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub created_at: DateTime<Utc>,
}

/// Find the user behind `(provider, subject)`, creating user, identity and
/// root together when the pair is new. Runs on the caller's transaction.
pub(crate) fn resolve_or_create(
    conn: &Connection,
    repo: &Repository,
    provider: Provider,
    subject: &str,
) -> Result<(User, Bullet)> {
    let subject = provider.normalize_subject(subject);
    if subject.is_empty() {
        return Err(BulletpError::invalid("provider/subject required"));
    }
    let now = repo.now();

    let user = match find_identity_user(conn, provider, &subject)? {
        Some(user_id) => load_user(conn, &user_id)?.ok_or_else(|| {
            tracing::error!(%provider, user = %user_id, "identity points to missing user");
            BulletpError::Conflict("identity points to missing user".to_string())
        })?,
        None => create_with_identity(conn, provider, &subject, now)?,
    };

    let root = TreeOps::new(conn, &user.id, &repo.config().tree, now).ensure_root()?;
    Ok((user, root))
}

fn find_identity_user(conn: &Connection, provider: Provider, subject: &str) -> Result<Option<UserId>> {
    let id = conn
        .query_row(
            "SELECT user_id FROM identities WHERE provider = ?1 AND provider_subject = ?2",
            params![provider.as_str(), subject],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(id.map(UserId::new))
}

fn load_user(conn: &Connection, id: &UserId) -> Result<Option<User>> {
    let row = conn
        .query_row(
            "SELECT id, created_at FROM users WHERE id = ?1",
            [id.as_str()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()?;

    row.map(|(id, created_at)| -> Result<User> {
        let created_at = from_millis(created_at).ok_or_else(|| {
            PersistenceError::CorruptRow(format!("users.created_at out of range: {created_at}"))
        })?;
        Ok(User {
            id: UserId::new(id),
            created_at,
        })
    })
    .transpose()
}

fn create_with_identity(
    conn: &Connection,
    provider: Provider,
    subject: &str,
    now: DateTime<Utc>,
) -> Result<User> {
    let user = User {
        id: UserId::generate(),
        created_at: now,
    };
    let millis = to_millis(now);
    conn.execute(
        "INSERT INTO users (id, created_at) VALUES (?1, ?2)",
        params![user.id.as_str(), millis],
    )?;
    let inserted = conn.execute(
        "INSERT INTO identities (id, user_id, provider, provider_subject, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (provider, provider_subject) DO NOTHING",
        params![
            Uuid::new_v4().to_string(),
            user.id.as_str(),
            provider.as_str(),
            subject,
            millis
        ],
    )?;

    if inserted == 0 {
        // Someone else registered this identity first; use theirs.
        conn.execute("DELETE FROM users WHERE id = ?1", [user.id.as_str()])?;
        let existing = find_identity_user(conn, provider, subject)?
            .ok_or_else(|| BulletpError::Conflict("identity vanished during creation".to_string()))?;
        return load_user(conn, &existing)?
            .ok_or_else(|| BulletpError::Conflict("identity points to missing user".to_string()));
    }

    tracing::info!(%provider, user = %user.id, "registered new user");
    Ok(user)
}

impl Repository {
    /// Resolve an external identity to its user, creating the user (with an
    /// identity link and a root) on first sight.
    pub fn resolve_or_create(&self, provider: Provider, subject: &str) -> Result<User> {
        self.write(|tx| resolve_or_create(tx, self, provider, subject).map(|(user, _)| user))
    }

    pub fn user(&self, id: &UserId) -> Result<User> {
        self.read(|tx| load_user(tx, id)?.ok_or_else(|| BulletpError::not_found("user not found")))
    }
}
