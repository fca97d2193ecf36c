//! Repository: the single owner of the SQLite connection
//!
//! Every public operation of the crate runs inside exactly one transaction
//! opened here. Domain modules add their operations through further
//! `impl Repository` blocks.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};

use super::schema::{Schema, SCHEMA_VERSION};
use crate::clock::{Clock, SystemClock};
use crate::config::BulletpConfig;
use crate::error::{PersistenceError, Result};
use crate::otp::CodeHasher;

/// Repository for persisting bulletp state
pub struct Repository {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
    config: BulletpConfig,
    hasher: CodeHasher,
}

impl Repository {
    /// Open (or create) a database at the given path
    pub fn open(path: impl AsRef<Path>, config: BulletpConfig) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, config, Arc::new(SystemClock))
    }

    /// Create an in-memory repository with default configuration (for testing)
    pub fn in_memory() -> Result<Self> {
        Self::in_memory_with(BulletpConfig::default(), Arc::new(SystemClock))
    }

    /// Create an in-memory repository with explicit configuration and clock
    pub fn in_memory_with(config: BulletpConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, config, clock)
    }

    /// Wrap an already opened connection
    pub fn with_connection(
        conn: Connection,
        config: BulletpConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let hasher = CodeHasher::new(&config.otp.secret)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(Schema::pragmas())?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
            config,
            hasher,
        })
    }

    /// Initialize the database schema
    fn initialize(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )?;
        let current_version = Self::schema_version(conn)?.unwrap_or(0);

        if current_version > SCHEMA_VERSION {
            return Err(PersistenceError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION,
                actual: current_version,
            }
            .into());
        }

        if current_version == 0 {
            conn.execute_batch(Schema::create_tables())?;
            Self::set_schema_version(conn, SCHEMA_VERSION)?;
            tracing::debug!(version = SCHEMA_VERSION, "created bulletp schema");
        } else if current_version < SCHEMA_VERSION {
            for version in current_version..SCHEMA_VERSION {
                if let Some(migration) = Schema::migration(version, version + 1) {
                    conn.execute_batch(migration)?;
                }
            }
            Self::set_schema_version(conn, SCHEMA_VERSION)?;
            tracing::info!(
                from = current_version,
                to = SCHEMA_VERSION,
                "migrated bulletp schema"
            );
        }

        Ok(())
    }

    fn schema_version(conn: &Connection) -> Result<Option<u32>> {
        let version = conn.query_row(
            "SELECT MAX(version) FROM schema_version",
            [],
            |row| row.get::<_, Option<u32>>(0),
        )?;
        Ok(version)
    }

    fn set_schema_version(conn: &Connection, version: u32) -> Result<()> {
        conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
        Ok(())
    }

    pub fn config(&self) -> &BulletpConfig {
        &self.config
    }

    pub(crate) fn hasher(&self) -> &CodeHasher {
        &self.hasher
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| PersistenceError::Poisoned(e.to_string()).into())
    }

    /// Run `f` inside one write transaction.
    ///
    /// `BEGIN IMMEDIATE` takes the database write lock up front, so the reads
    /// that feed a structural decision and the writes that follow can never
    /// interleave with another writer. Any error rolls the whole unit back.
    pub(crate) fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        self.run(TransactionBehavior::Immediate, f)
    }

    /// Run `f` inside one read transaction (consistent snapshot)
    pub(crate) fn read<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        self.run(TransactionBehavior::Deferred, f)
    }

    /// Direct access to the connection outside any transaction
    #[cfg(test)]
    pub(crate) fn raw<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    fn run<T>(
        &self,
        behavior: TransactionBehavior,
        f: impl FnOnce(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(behavior)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BulletpError;

    #[test]
    fn test_repository_creation() {
        let repo = Repository::in_memory().unwrap();
        let version = repo
            .read(|tx| Repository::schema_version(tx))
            .unwrap();
        assert_eq!(version, Some(SCHEMA_VERSION));
    }

    #[test]
    fn test_reopen_keeps_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bulletp.db");
        {
            Repository::open(&path, BulletpConfig::default()).unwrap();
        }
        let repo = Repository::open(&path, BulletpConfig::default()).unwrap();
        let rows: i64 = repo
            .read(|tx| {
                Ok(tx.query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bulletp.db");
        {
            Repository::open(&path, BulletpConfig::default()).unwrap();
        }
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute("INSERT INTO schema_version (version) VALUES (99)", [])
                .unwrap();
        }
        let err = Repository::open(&path, BulletpConfig::default())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            BulletpError::Persistence(PersistenceError::SchemaVersionMismatch { actual: 99, .. })
        ));
    }

    #[test]
    fn test_failed_unit_rolls_back() {
        let repo = Repository::in_memory().unwrap();
        let result: Result<()> = repo.write(|tx| {
            tx.execute("INSERT INTO users (id, created_at) VALUES ('u1', 0)", [])?;
            Err(BulletpError::invalid("abort"))
        });
        assert!(result.is_err());
        let count: i64 = repo
            .read(|tx| Ok(tx.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = BulletpConfig::default();
        config.otp.secret.clear();
        assert!(Repository::in_memory_with(config, Arc::new(SystemClock)).is_err());
    }
}
