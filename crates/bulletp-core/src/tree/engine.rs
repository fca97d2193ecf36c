//! Order-index bookkeeping for the bullet forest
//!
//! `TreeOps` always runs against a connection that is already inside the
//! caller's transaction, so every read that feeds a shift is taken under the
//! same write lock as the shift itself.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::node::{Bullet, BulletId, BulletSummary, SubtreeNode, BULLET_COLUMNS};
use crate::clock::to_millis;
use crate::config::{DeleteMode, TreeConfig};
use crate::error::{BulletpError, Result};
use crate::identity::UserId;

/// Open upper bound for range shifts
const END: i64 = i64::MAX;

/// Tree operations scoped to one user inside one transaction
pub(crate) struct TreeOps<'a> {
    conn: &'a Connection,
    user: &'a UserId,
    config: &'a TreeConfig,
    now: i64,
}

impl<'a> TreeOps<'a> {
    pub(crate) fn new(
        conn: &'a Connection,
        user: &'a UserId,
        config: &'a TreeConfig,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            conn,
            user,
            config,
            now: to_millis(now),
        }
    }

    // ==================== Lookups ====================

    fn find(&self, id: BulletId) -> Result<Option<Bullet>> {
        let sql = format!("SELECT {BULLET_COLUMNS} FROM bullets b WHERE b.id = ?1");
        let bullet = self
            .conn
            .query_row(&sql, [id.to_string()], Bullet::from_row)
            .optional()?;
        Ok(bullet)
    }

    fn owned_live(&self, bullet: Option<Bullet>) -> Option<Bullet> {
        bullet.filter(|b| !b.is_deleted && &b.user_id == self.user)
    }

    /// Live bullet owned by this user. Missing, deleted and foreign bullets
    /// all come back as the same `NotFound`.
    pub(crate) fn live(&self, id: BulletId, what: &str) -> Result<Bullet> {
        self.owned_live(self.find(id)?)
            .ok_or_else(|| BulletpError::not_found(format!("{what} not found")))
    }

    fn find_root(&self) -> Result<Option<Bullet>> {
        let sql = format!(
            "SELECT {BULLET_COLUMNS} FROM bullets b
             WHERE b.user_id = ?1 AND b.is_root = 1 AND b.is_deleted = 0
             ORDER BY b.created_at ASC LIMIT 1"
        );
        let root = self
            .conn
            .query_row(&sql, [self.user.as_str()], Bullet::from_row)
            .optional()?;
        Ok(root)
    }

    /// Live children with a has-children flag each, in display order
    fn children_of(&self, parent: BulletId) -> Result<Vec<(Bullet, bool)>> {
        let sql = format!(
            "SELECT {BULLET_COLUMNS},
                    EXISTS(SELECT 1 FROM bullets c
                           WHERE c.user_id = b.user_id AND c.parent_id = b.id AND c.is_deleted = 0)
             FROM bullets b
             WHERE b.user_id = ?1 AND b.parent_id = ?2 AND b.is_deleted = 0
             ORDER BY b.order_index ASC, b.created_at ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![self.user.as_str(), parent.to_string()], |row| {
                Ok((Bullet::from_row(row)?, row.get::<_, bool>(9)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn has_children(&self, parent: BulletId) -> Result<bool> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM bullets
                           WHERE user_id = ?1 AND parent_id = ?2 AND is_deleted = 0)",
            params![self.user.as_str(), parent.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn child_count(&self, parent: BulletId) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM bullets WHERE user_id = ?1 AND parent_id = ?2 AND is_deleted = 0",
            params![self.user.as_str(), parent.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn max_child_order(&self, parent: BulletId) -> Result<Option<i64>> {
        let max = self.conn.query_row(
            "SELECT MAX(order_index) FROM bullets
             WHERE user_id = ?1 AND parent_id = ?2 AND is_deleted = 0",
            params![self.user.as_str(), parent.to_string()],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    fn previous_sibling(&self, parent: BulletId, before: i64) -> Result<Option<Bullet>> {
        let sql = format!(
            "SELECT {BULLET_COLUMNS} FROM bullets b
             WHERE b.user_id = ?1 AND b.parent_id = ?2 AND b.is_deleted = 0 AND b.order_index < ?3
             ORDER BY b.order_index DESC, b.created_at DESC LIMIT 1"
        );
        let prev = self
            .conn
            .query_row(
                &sql,
                params![self.user.as_str(), parent.to_string(), before],
                Bullet::from_row,
            )
            .optional()?;
        Ok(prev)
    }

    /// True if `candidate` is `ancestor` or sits somewhere below it
    fn is_within(&self, candidate: BulletId, ancestor: BulletId) -> Result<bool> {
        let within = self.conn.query_row(
            "WITH RECURSIVE up(id, parent_id) AS (
                 SELECT id, parent_id FROM bullets WHERE id = ?1
                 UNION
                 SELECT b.id, b.parent_id FROM bullets b JOIN up ON b.id = up.parent_id
             )
             SELECT EXISTS(SELECT 1 FROM up WHERE id = ?2)",
            params![candidate.to_string(), ancestor.to_string()],
            |row| row.get(0),
        )?;
        Ok(within)
    }

    // ==================== Primitive writes ====================

    /// Add `delta` to the order index of every live child of `parent` whose
    /// index lies in `from..=to`, as one range update.
    fn shift(&self, parent: BulletId, from: i64, to: i64, delta: i64) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE bullets SET order_index = order_index + ?1
             WHERE user_id = ?2 AND parent_id = ?3 AND is_deleted = 0
               AND order_index BETWEEN ?4 AND ?5",
            params![delta, self.user.as_str(), parent.to_string(), from, to],
        )?;
        Ok(changed)
    }

    fn place(&self, id: BulletId, parent: BulletId, order: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE bullets SET parent_id = ?1, order_index = ?2, updated_at = ?3 WHERE id = ?4",
            params![parent.to_string(), order, self.now, id.to_string()],
        )?;
        Ok(())
    }

    // ==================== Operations ====================

    /// Return the user's root, creating it (and the user row) on first access
    pub(crate) fn ensure_root(&self) -> Result<Bullet> {
        self.conn.execute(
            "INSERT OR IGNORE INTO users (id, created_at) VALUES (?1, ?2)",
            params![self.user.as_str(), self.now],
        )?;

        if let Some(root) = self.find_root()? {
            return Ok(root);
        }

        // A concurrent writer that got here first makes this a no-op; the
        // re-read below then returns their root.
        let id = BulletId::new();
        let inserted = self.conn.execute(
            "INSERT INTO bullets
                 (id, user_id, parent_id, text, order_index, is_root, is_deleted, created_at, updated_at)
             VALUES (?1, ?2, NULL, ?3, 0, 1, 0, ?4, ?4)
             ON CONFLICT (user_id, is_root) DO NOTHING",
            params![id.to_string(), self.user.as_str(), self.config.home_text, self.now],
        )?;
        if inserted == 1 {
            tracing::debug!(user = %self.user, root = %id, "created root");
        }

        self.find_root()?.ok_or_else(|| {
            BulletpError::Conflict(format!("root for user {} could not be created", self.user))
        })
    }

    pub(crate) fn create(
        &self,
        parent_id: Option<BulletId>,
        text: &str,
        after_id: Option<BulletId>,
    ) -> Result<Bullet> {
        let parent = match parent_id {
            Some(id) => self.live(id, "parent")?,
            None => self.ensure_root()?,
        };

        let order = match after_id {
            Some(after_id) => {
                let after = self.live(after_id, "after node")?;
                if after.parent_id != Some(parent.id) {
                    return Err(BulletpError::invalid("parent mismatch"));
                }
                let order = i64::from(after.order_index) + 1;
                self.shift(parent.id, order, END, 1)?;
                order
            }
            None => self.max_child_order(parent.id)?.map_or(0, |max| max + 1),
        };

        let id = BulletId::new();
        self.conn.execute(
            "INSERT INTO bullets
                 (id, user_id, parent_id, text, order_index, is_root, is_deleted, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, 0, ?6, ?6)",
            params![
                id.to_string(),
                self.user.as_str(),
                parent.id.to_string(),
                text,
                order,
                self.now
            ],
        )?;
        tracing::debug!(user = %self.user, node = %id, parent = %parent.id, order, "created node");

        self.live(id, "node")
    }

    pub(crate) fn children(&self, parent_id: BulletId) -> Result<Vec<BulletSummary>> {
        let parent = self.live(parent_id, "parent")?;
        Ok(self
            .children_of(parent.id)?
            .into_iter()
            .map(|(bullet, has_children)| BulletSummary::new(bullet, has_children))
            .collect())
    }

    pub(crate) fn update_text(&self, id: BulletId, text: &str) -> Result<Bullet> {
        let node = self.live(id, "node")?;
        self.conn.execute(
            "UPDATE bullets SET text = ?1, updated_at = ?2 WHERE id = ?3",
            params![text, self.now, node.id.to_string()],
        )?;
        self.live(node.id, "node")
    }

    /// Soft-delete. Missing, foreign and already deleted targets succeed
    /// silently so client retries stay harmless.
    pub(crate) fn delete(&self, id: BulletId) -> Result<()> {
        let Some(node) = self.owned_live(self.find(id)?) else {
            tracing::debug!(user = %self.user, node = %id, "delete of absent node ignored");
            return Ok(());
        };
        if node.is_root {
            return Err(BulletpError::invalid("cannot delete root"));
        }

        self.conn.execute(
            "UPDATE bullets SET is_deleted = 1, updated_at = ?1 WHERE id = ?2",
            params![self.now, node.id.to_string()],
        )?;

        let mode = self.config.delete_mode;
        if mode != DeleteMode::LeaveGap {
            if let Some(parent) = node.parent_id {
                self.shift(parent, i64::from(node.order_index) + 1, END, -1)?;
            }
        }

        let mut descendants = 0;
        if mode == DeleteMode::Cascade {
            descendants = self.conn.execute(
                "WITH RECURSIVE sub(id) AS (
                     SELECT id FROM bullets WHERE user_id = ?1 AND parent_id = ?2 AND is_deleted = 0
                     UNION
                     SELECT b.id FROM bullets b JOIN sub ON b.parent_id = sub.id
                     WHERE b.user_id = ?1 AND b.is_deleted = 0
                 )
                 UPDATE bullets SET is_deleted = 1, updated_at = ?3 WHERE id IN (SELECT id FROM sub)",
                params![self.user.as_str(), node.id.to_string(), self.now],
            )?;
        }

        tracing::debug!(
            user = %self.user,
            node = %node.id,
            mode = mode.name(),
            descendants,
            "deleted node"
        );
        Ok(())
    }

    pub(crate) fn move_to(
        &self,
        id: BulletId,
        new_parent_id: BulletId,
        requested_order: i64,
    ) -> Result<Bullet> {
        let node = self.live(id, "node")?;
        if node.is_root {
            return Err(BulletpError::invalid("cannot move root"));
        }
        let new_parent = self.live(new_parent_id, "new parent")?;
        if self.is_within(new_parent.id, node.id)? {
            return Err(BulletpError::invalid("cannot move a node under itself"));
        }

        let same_parent = node.parent_id == Some(new_parent.id);
        let mut slots = self.child_count(new_parent.id)?;
        if same_parent {
            slots = (slots - 1).max(0);
        }
        let new_order = requested_order.clamp(0, slots);
        let old_order = i64::from(node.order_index);

        if same_parent {
            if new_order == old_order {
                return Ok(node);
            }
            if new_order > old_order {
                self.shift(new_parent.id, old_order + 1, new_order, -1)?;
            } else {
                self.shift(new_parent.id, new_order, old_order - 1, 1)?;
            }
        } else {
            if let Some(old_parent) = node.parent_id {
                self.shift(old_parent, old_order + 1, END, -1)?;
            }
            self.shift(new_parent.id, new_order, END, 1)?;
        }
        self.place(node.id, new_parent.id, new_order)?;

        tracing::debug!(
            user = %self.user,
            node = %node.id,
            parent = %new_parent.id,
            from = old_order,
            to = new_order,
            "moved node"
        );
        self.live(node.id, "node")
    }

    /// Make the node the last child of its previous sibling
    pub(crate) fn indent(&self, id: BulletId) -> Result<Bullet> {
        let node = self.live(id, "node")?;
        if node.is_root {
            return Err(BulletpError::invalid("cannot indent root"));
        }
        let parent_id = node
            .parent_id
            .ok_or_else(|| BulletpError::invalid("cannot indent root-level"))?;
        let old_order = i64::from(node.order_index);
        let prev = self
            .previous_sibling(parent_id, old_order)?
            .ok_or_else(|| BulletpError::invalid("no previous sibling to indent under"))?;

        self.shift(parent_id, old_order + 1, END, -1)?;
        let new_order = self.max_child_order(prev.id)?.map_or(0, |max| max + 1);
        self.place(node.id, prev.id, new_order)?;

        tracing::debug!(user = %self.user, node = %node.id, under = %prev.id, "indented node");
        self.live(node.id, "node")
    }

    /// Make the node the sibling right after its current parent
    pub(crate) fn outdent(&self, id: BulletId) -> Result<Bullet> {
        let node = self.live(id, "node")?;
        if node.is_root {
            return Err(BulletpError::invalid("cannot outdent root"));
        }
        let parent_id = node
            .parent_id
            .ok_or_else(|| BulletpError::invalid("cannot outdent root-level"))?;
        let parent = self.live(parent_id, "parent")?;
        let grandparent_id = match parent.parent_id {
            Some(g) if !parent.is_root => g,
            _ => return Err(BulletpError::invalid("cannot outdent past top level")),
        };
        // The parent may sit below a deleted bullet when a delete left it behind.
        let grandparent_id = self.live(grandparent_id, "parent")?.id;

        let old_order = i64::from(node.order_index);
        let insert_at = i64::from(parent.order_index) + 1;
        self.shift(parent.id, old_order + 1, END, -1)?;
        self.shift(grandparent_id, insert_at, END, 1)?;
        self.place(node.id, grandparent_id, insert_at)?;

        tracing::debug!(user = %self.user, node = %node.id, parent = %grandparent_id, "outdented node");
        self.live(node.id, "node")
    }

    /// Nested view below `root_id`, or `None` when it is not a live bullet of
    /// this user. Depth is clamped to `0..=max_subtree_depth`.
    pub(crate) fn subtree(&self, root_id: BulletId, depth: i64) -> Result<Option<SubtreeNode>> {
        let depth = depth.clamp(0, i64::from(self.config.max_subtree_depth));
        let Some(root) = self.owned_live(self.find(root_id)?) else {
            return Ok(None);
        };
        let has_children = self.has_children(root.id)?;
        self.assemble(root, has_children, depth).map(Some)
    }

    fn assemble(&self, node: Bullet, has_children: bool, depth: i64) -> Result<SubtreeNode> {
        let children = if depth > 0 && has_children {
            self.children_of(node.id)?
                .into_iter()
                .map(|(child, grand)| self.assemble(child, grand, depth - 1))
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };

        Ok(SubtreeNode {
            id: node.id,
            parent_id: node.parent_id,
            text: node.text,
            order_index: node.order_index,
            has_children,
            children,
        })
    }
}
