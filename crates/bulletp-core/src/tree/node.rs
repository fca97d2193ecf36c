//! Bullet record and read models

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::from_millis;
use crate::error::{BulletpError, Result};
use crate::identity::UserId;

/// Unique identifier for a bullet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BulletId(pub Uuid);

impl BulletId {
    /// Create a new random bullet ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a bullet ID from a string.
    ///
    /// A malformed id cannot name any bullet, so it is reported as not found.
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| BulletpError::not_found("node not found"))
    }
}

impl Default for BulletId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BulletId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node of a user's outline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bullet {
    pub id: BulletId,
    pub user_id: UserId,
    /// `None` only on the root
    pub parent_id: Option<BulletId>,
    pub text: String,
    pub order_index: u32,
    /// Persisted as 1 on the root and NULL elsewhere
    pub is_root: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Column list matching [`Bullet::from_row`], for a table aliased `b`
pub(crate) const BULLET_COLUMNS: &str = "b.id, b.user_id, b.parent_id, b.text, b.order_index, \
     b.is_root, b.is_deleted, b.created_at, b.updated_at";

impl Bullet {
    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let id: String = row.get(0)?;
        let user_id: String = row.get(1)?;
        let parent_id: Option<String> = row.get(2)?;
        let order_index: i64 = row.get(4)?;
        let is_root: Option<i64> = row.get(5)?;
        let created_at: i64 = row.get(7)?;
        let updated_at: i64 = row.get(8)?;

        Ok(Bullet {
            id: parse_uuid(0, &id)?,
            user_id: UserId::new(user_id),
            parent_id: parent_id.map(|p| parse_uuid(2, &p)).transpose()?,
            text: row.get(3)?,
            order_index: u32::try_from(order_index)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Integer, Box::new(e)))?,
            is_root: is_root == Some(1),
            is_deleted: row.get(6)?,
            created_at: parse_millis(7, created_at)?,
            updated_at: parse_millis(8, updated_at)?,
        })
    }
}

fn parse_uuid(idx: usize, s: &str) -> rusqlite::Result<BulletId> {
    Uuid::parse_str(s)
        .map(BulletId)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_millis(idx: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    from_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
}

/// A child listing entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulletSummary {
    pub id: BulletId,
    pub parent_id: Option<BulletId>,
    pub text: String,
    pub order_index: u32,
    /// At least one live child exists
    pub has_children: bool,
    pub user_id: UserId,
}

impl BulletSummary {
    pub(crate) fn new(bullet: Bullet, has_children: bool) -> Self {
        Self {
            id: bullet.id,
            parent_id: bullet.parent_id,
            text: bullet.text,
            order_index: bullet.order_index,
            has_children,
            user_id: bullet.user_id,
        }
    }
}

/// Nested view returned by subtree assembly
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubtreeNode {
    pub id: BulletId,
    pub parent_id: Option<BulletId>,
    pub text: String,
    pub order_index: u32,
    /// Computed even where `children` was cut off by the depth limit
    pub has_children: bool,
    pub children: Vec<SubtreeNode>,
}

impl SubtreeNode {
    /// Number of nodes in this view, including itself
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(SubtreeNode::node_count).sum::<usize>()
    }

    /// Child texts in display order
    pub fn child_texts(&self) -> Vec<&str> {
        self.children.iter().map(|c| c.text.as_str()).collect()
    }
}
