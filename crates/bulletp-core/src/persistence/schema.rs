//! SQLite schema for bulletp state storage

/// Schema version for migrations
pub const SCHEMA_VERSION: u32 = 1;

/// SQLite schema definition
pub struct Schema;

impl Schema {
    /// Connection-level settings applied on every open
    pub fn pragmas() -> &'static str {
        r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
"#
    }

    /// Get the complete schema SQL
    pub fn create_tables() -> &'static str {
        r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    created_at INTEGER NOT NULL
);

-- One row per (provider, subject); several identities may share a user
CREATE TABLE IF NOT EXISTS identities (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    provider TEXT NOT NULL,
    provider_subject TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    UNIQUE (provider, provider_subject)
);

CREATE INDEX IF NOT EXISTS idx_identities_user ON identities(user_id);

-- is_root is 1 on the single root and NULL everywhere else, so the
-- UNIQUE(user_id, is_root) constraint only ever bites on roots.
CREATE TABLE IF NOT EXISTS bullets (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    parent_id TEXT REFERENCES bullets(id),
    text TEXT NOT NULL DEFAULT '',
    order_index INTEGER NOT NULL DEFAULT 0 CHECK (order_index >= 0),
    is_root INTEGER CHECK (is_root IS NULL OR is_root = 1),
    is_deleted INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE (user_id, is_root)
);

CREATE INDEX IF NOT EXISTS idx_bullets_user ON bullets(user_id);
CREATE INDEX IF NOT EXISTS idx_bullets_parent ON bullets(parent_id);
CREATE INDEX IF NOT EXISTS idx_bullets_user_parent_order ON bullets(user_id, parent_id, order_index);

CREATE TABLE IF NOT EXISTS email_otps (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL,
    code_hash TEXT NOT NULL,
    ip TEXT,
    expires_at INTEGER NOT NULL,
    consumed_at INTEGER,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_email_otps_email ON email_otps(email);
CREATE INDEX IF NOT EXISTS idx_email_otps_email_expires ON email_otps(email, expires_at);
CREATE INDEX IF NOT EXISTS idx_email_otps_ip_created ON email_otps(ip, created_at);

CREATE TABLE IF NOT EXISTS oauth_login_states (
    id TEXT PRIMARY KEY,
    state TEXT NOT NULL UNIQUE,
    expires_at INTEGER NOT NULL,
    consumed_at INTEGER,
    created_at INTEGER NOT NULL
);
"#
    }

    /// Get migration SQL for a specific version step
    pub fn migration(from_version: u32, to_version: u32) -> Option<&'static str> {
        match (from_version, to_version) {
            // Version 1 is the baseline; later steps go here.
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_applies_cleanly_twice() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(Schema::create_tables()).unwrap();
        conn.execute_batch(Schema::create_tables()).unwrap();
    }

    #[test]
    fn test_root_uniqueness_ignores_null() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(Schema::create_tables()).unwrap();
        conn.execute_batch(
            r#"
            INSERT INTO users (id, created_at) VALUES ('u', 0);
            INSERT INTO bullets (id, user_id, is_root, created_at, updated_at) VALUES ('r', 'u', 1, 0, 0);
            INSERT INTO bullets (id, user_id, parent_id, created_at, updated_at) VALUES ('a', 'u', 'r', 0, 0);
            INSERT INTO bullets (id, user_id, parent_id, created_at, updated_at) VALUES ('b', 'u', 'r', 0, 0);
            "#,
        )
        .unwrap();

        let second_root = conn.execute(
            "INSERT INTO bullets (id, user_id, is_root, created_at, updated_at) VALUES ('r2', 'u', 1, 0, 0)",
            [],
        );
        assert!(second_root.is_err());
    }
}
