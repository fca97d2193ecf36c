//! Error types for bulletp-core

use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias for bulletp operations
pub type Result<T> = std::result::Result<T, BulletpError>;

/// Main error type for bulletp operations
///
/// `NotFound` deliberately covers "missing", "soft-deleted" and "owned by
/// someone else" so that callers cannot probe other users' trees.
#[derive(Error, Debug)]
pub enum BulletpError {
    /// Entity is absent, deleted, or not owned by the caller
    #[error("{0}")]
    NotFound(String),

    /// Structural rule violation or malformed input
    #[error("{0}")]
    InvalidArgument(String),

    /// Cooldown or quota exceeded
    #[error("{0}")]
    RateLimited(String),

    /// Data-integrity anomaly detected at the storage layer
    #[error("Conflict: {0}")]
    Conflict(String),

    /// An external login provider failed
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Required configuration missing or invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Persistence-related errors
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Coarse classification used by the request layer to pick a status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    RateLimited,
    Upstream,
    Internal,
}

impl BulletpError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        BulletpError::NotFound(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        BulletpError::InvalidArgument(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BulletpError::NotFound(_) => ErrorKind::NotFound,
            BulletpError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            BulletpError::RateLimited(_) => ErrorKind::RateLimited,
            BulletpError::Upstream(_) => ErrorKind::Upstream,
            BulletpError::Conflict(_) | BulletpError::Config(_) | BulletpError::Persistence(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Persistence-specific errors
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// A uniqueness or foreign-key constraint rejected a write
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Lock on the shared connection was poisoned by a panicking writer
    #[error("Connection lock poisoned: {0}")]
    Poisoned(String),

    /// Stored value could not be decoded into a domain type
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    /// Schema version mismatch
    #[error("Schema version mismatch: expected at most {expected}, got {actual}")]
    SchemaVersionMismatch { expected: u32, actual: u32 },
}

impl PersistenceError {
    /// True when the underlying SQLite error was a constraint violation
    pub fn is_constraint(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(err: rusqlite::Error) -> Self {
        if PersistenceError::is_constraint(&err) {
            PersistenceError::Constraint(err.to_string())
        } else {
            PersistenceError::Database(err.to_string())
        }
    }
}

impl From<rusqlite::Error> for BulletpError {
    fn from(err: rusqlite::Error) -> Self {
        BulletpError::Persistence(PersistenceError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_taxonomy() {
        assert_eq!(BulletpError::not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(BulletpError::invalid("x").kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            BulletpError::RateLimited("slow down".into()).kind(),
            ErrorKind::RateLimited
        );
        assert_eq!(
            BulletpError::Conflict("identity points to missing user".into()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn user_facing_messages_are_bare() {
        let err = BulletpError::invalid("cannot delete root");
        assert_eq!(err.to_string(), "cannot delete root");
    }

    #[test]
    fn constraint_errors_are_classified() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (k TEXT UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err = conn.execute("INSERT INTO t VALUES ('a')", []).unwrap_err();
        assert!(PersistenceError::is_constraint(&err));
        assert!(matches!(
            PersistenceError::from(err),
            PersistenceError::Constraint(_)
        ));
    }
}
