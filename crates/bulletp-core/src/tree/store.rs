//! Tree Store: the public, transaction-wrapped face of the tree engine

use rusqlite::Connection;

use super::engine::TreeOps;
use super::node::{Bullet, BulletId, BulletSummary, SubtreeNode};
use crate::error::Result;
use crate::identity::UserId;
use crate::persistence::Repository;

impl Repository {
    fn tree<'a>(&'a self, conn: &'a Connection, user: &'a UserId) -> TreeOps<'a> {
        TreeOps::new(conn, user, &self.config().tree, self.now())
    }

    /// The user's root ("Home"), created on first access. Idempotent.
    pub fn ensure_root(&self, user: &UserId) -> Result<Bullet> {
        self.write(|tx| self.tree(tx, user).ensure_root())
    }

    /// Create a bullet under `parent_id` (the root when `None`).
    ///
    /// With `after_id` the new bullet is inserted right after that sibling;
    /// otherwise it is appended as the last child.
    pub fn create_node(
        &self,
        user: &UserId,
        parent_id: Option<BulletId>,
        text: &str,
        after_id: Option<BulletId>,
    ) -> Result<Bullet> {
        self.write(|tx| self.tree(tx, user).create(parent_id, text, after_id))
    }

    /// Live children of `parent_id` in display order
    pub fn children(&self, user: &UserId, parent_id: BulletId) -> Result<Vec<BulletSummary>> {
        self.read(|tx| self.tree(tx, user).children(parent_id))
    }

    pub fn node(&self, user: &UserId, id: BulletId) -> Result<Bullet> {
        self.read(|tx| self.tree(tx, user).live(id, "node"))
    }

    pub fn update_text(&self, user: &UserId, id: BulletId, text: &str) -> Result<Bullet> {
        self.write(|tx| self.tree(tx, user).update_text(id, text))
    }

    /// Soft-delete a bullet. Succeeds for ids that are already gone.
    pub fn delete_node(&self, user: &UserId, id: BulletId) -> Result<()> {
        self.write(|tx| self.tree(tx, user).delete(id))
    }

    /// Move a bullet under `new_parent_id` at `new_order_index`, clamped to
    /// the valid range for that parent.
    pub fn move_node(
        &self,
        user: &UserId,
        id: BulletId,
        new_parent_id: BulletId,
        new_order_index: i64,
    ) -> Result<Bullet> {
        self.write(|tx| self.tree(tx, user).move_to(id, new_parent_id, new_order_index))
    }

    pub fn indent_node(&self, user: &UserId, id: BulletId) -> Result<Bullet> {
        self.write(|tx| self.tree(tx, user).indent(id))
    }

    pub fn outdent_node(&self, user: &UserId, id: BulletId) -> Result<Bullet> {
        self.write(|tx| self.tree(tx, user).outdent(id))
    }

    /// Nested view of up to `depth` levels below `root_id` (configured
    /// default when `None`). `Ok(None)` when the root is not visible.
    pub fn subtree(
        &self,
        user: &UserId,
        root_id: BulletId,
        depth: Option<i64>,
    ) -> Result<Option<SubtreeNode>> {
        let depth = depth.unwrap_or_else(|| i64::from(self.config().tree.default_subtree_depth));
        self.read(|tx| self.tree(tx, user).subtree(root_id, depth))
    }
}
