//! Shared helpers for bulletp-core integration tests

#![allow(dead_code)]

use bulletp_core::{Bullet, BulletId, Repository, UserId};

/// Fresh in-memory repository with one user and that user's root
pub fn repo_with_user(name: &str) -> (Repository, UserId, Bullet) {
    let repo = Repository::in_memory().expect("in-memory repository");
    let user = UserId::new(name);
    let root = repo.ensure_root(&user).expect("root");
    (repo, user, root)
}

pub fn add(repo: &Repository, user: &UserId, parent: BulletId, text: &str) -> Bullet {
    repo.create_node(user, Some(parent), text, None)
        .unwrap_or_else(|e| panic!("create {text}: {e}"))
}

/// (text, order_index) of the live children of `parent`
pub fn layout(repo: &Repository, user: &UserId, parent: BulletId) -> Vec<(String, u32)> {
    repo.children(user, parent)
        .expect("children")
        .into_iter()
        .map(|c| (c.text, c.order_index))
        .collect()
}

/// Owned-string layout literal
pub fn expect(items: &[(&str, u32)]) -> Vec<(String, u32)> {
    items.iter().map(|(t, o)| (t.to_string(), *o)).collect()
}
