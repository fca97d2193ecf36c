//! Structural scenarios on the outline tree
//!
//! Each test starts from a small hand-built outline and checks the exact
//! sibling layout after one operation.

mod common;

use bulletp_core::{BulletId, BulletpError, Repository, UserId};
use common::{add, expect, layout, repo_with_user};

// === Insertion ===

#[test]
fn test_insert_after_shifts_later_siblings() {
    let (repo, user, root) = repo_with_user("alice");
    let a = add(&repo, &user, root.id, "A");
    let b = add(&repo, &user, root.id, "B");

    let c = repo
        .create_node(&user, Some(root.id), "C", Some(a.id))
        .unwrap();

    assert_eq!(c.order_index, 1);
    assert_eq!(repo.node(&user, b.id).unwrap().order_index, 2);
    assert_eq!(
        layout(&repo, &user, root.id),
        expect(&[("A", 0), ("C", 1), ("B", 2)])
    );
}

#[test]
fn test_insert_after_last_sibling_appends() {
    let (repo, user, root) = repo_with_user("alice");
    add(&repo, &user, root.id, "A");
    let b = add(&repo, &user, root.id, "B");
    let c = repo
        .create_node(&user, Some(root.id), "C", Some(b.id))
        .unwrap();
    assert_eq!(c.order_index, 2);
}

// === Indent / outdent ===

#[test]
fn test_indent_under_previous_sibling() {
    let (repo, user, root) = repo_with_user("alice");
    add(&repo, &user, root.id, "A");
    let b = add(&repo, &user, root.id, "B");
    let c = add(&repo, &user, root.id, "C");

    let moved = repo.indent_node(&user, c.id).unwrap();

    assert_eq!(moved.parent_id, Some(b.id));
    assert_eq!(moved.order_index, 0);
    assert_eq!(layout(&repo, &user, root.id), expect(&[("A", 0), ("B", 1)]));
    assert_eq!(layout(&repo, &user, b.id), expect(&[("C", 0)]));
}

#[test]
fn test_indent_middle_sibling_closes_gap() {
    let (repo, user, root) = repo_with_user("alice");
    let a = add(&repo, &user, root.id, "A");
    let b = add(&repo, &user, root.id, "B");
    add(&repo, &user, root.id, "C");

    repo.indent_node(&user, b.id).unwrap();

    assert_eq!(layout(&repo, &user, root.id), expect(&[("A", 0), ("C", 1)]));
    assert_eq!(layout(&repo, &user, a.id), expect(&[("B", 0)]));
}

#[test]
fn test_outdent_places_after_parent() {
    let (repo, user, root) = repo_with_user("alice");
    add(&repo, &user, root.id, "A");
    let b = add(&repo, &user, root.id, "B");
    let c = add(&repo, &user, b.id, "C");

    let moved = repo.outdent_node(&user, c.id).unwrap();

    assert_eq!(moved.parent_id, Some(root.id));
    assert_eq!(moved.order_index, 2);
    assert_eq!(
        layout(&repo, &user, root.id),
        expect(&[("A", 0), ("B", 1), ("C", 2)])
    );
    assert!(layout(&repo, &user, b.id).is_empty());
    let kids = repo.children(&user, root.id).unwrap();
    assert!(!kids[1].has_children);
}

#[test]
fn test_indent_then_outdent_restores_layout() {
    let (repo, user, root) = repo_with_user("alice");
    add(&repo, &user, root.id, "A");
    let b = add(&repo, &user, root.id, "B");
    add(&repo, &user, root.id, "C");

    repo.indent_node(&user, b.id).unwrap();
    repo.outdent_node(&user, b.id).unwrap();

    assert_eq!(
        layout(&repo, &user, root.id),
        expect(&[("A", 0), ("B", 1), ("C", 2)])
    );
}

// === Moves ===

#[test]
fn test_cross_parent_move() {
    let (repo, user, root) = repo_with_user("alice");
    let p = add(&repo, &user, root.id, "P");
    let q = add(&repo, &user, root.id, "Q");
    add(&repo, &user, p.id, "P0");
    add(&repo, &user, p.id, "P1");
    let x = add(&repo, &user, p.id, "X");
    add(&repo, &user, q.id, "Q0");
    add(&repo, &user, q.id, "Q1");

    let moved = repo.move_node(&user, x.id, q.id, 1).unwrap();

    assert_eq!(moved.parent_id, Some(q.id));
    assert_eq!(moved.order_index, 1);
    assert_eq!(layout(&repo, &user, p.id), expect(&[("P0", 0), ("P1", 1)]));
    assert_eq!(
        layout(&repo, &user, q.id),
        expect(&[("Q0", 0), ("X", 1), ("Q1", 2)])
    );
}

#[test]
fn test_cross_parent_move_clamps_to_append() {
    let (repo, user, root) = repo_with_user("alice");
    let p = add(&repo, &user, root.id, "P");
    let q = add(&repo, &user, root.id, "Q");
    let x = add(&repo, &user, p.id, "X");
    add(&repo, &user, q.id, "Q0");

    let moved = repo.move_node(&user, x.id, q.id, 50).unwrap();
    assert_eq!(moved.order_index, 1);
}

#[test]
fn test_move_into_empty_parent() {
    let (repo, user, root) = repo_with_user("alice");
    let a = add(&repo, &user, root.id, "A");
    let b = add(&repo, &user, root.id, "B");
    let moved = repo.move_node(&user, a.id, b.id, 3).unwrap();
    assert_eq!(moved.order_index, 0);
    assert_eq!(layout(&repo, &user, root.id), expect(&[("B", 0)]));
}

// === Root protection ===

#[test]
fn test_root_cannot_be_restructured() {
    let (repo, user, root) = repo_with_user("alice");
    let a = add(&repo, &user, root.id, "A");

    let errors = [
        repo.delete_node(&user, root.id).unwrap_err(),
        repo.move_node(&user, root.id, a.id, 0).unwrap_err(),
        repo.indent_node(&user, root.id).unwrap_err(),
        repo.outdent_node(&user, root.id).unwrap_err(),
    ];
    for err in errors {
        assert!(matches!(err, BulletpError::InvalidArgument(_)), "{err:?}");
    }
    assert!(repo.ensure_root(&user).unwrap().is_root);
}

// === Ownership isolation ===

#[test]
fn test_other_users_nodes_are_not_found() {
    let (repo, alice, root) = repo_with_user("alice");
    let a = add(&repo, &alice, root.id, "A");
    let bob = UserId::new("bob");
    let bob_root = repo.ensure_root(&bob).unwrap();

    let not_found = |err: BulletpError| matches!(err, BulletpError::NotFound(_));
    assert!(not_found(repo.node(&bob, a.id).unwrap_err()));
    assert!(not_found(repo.children(&bob, root.id).unwrap_err()));
    assert!(not_found(repo.update_text(&bob, a.id, "x").unwrap_err()));
    assert!(not_found(repo.move_node(&bob, a.id, bob_root.id, 0).unwrap_err()));
    assert!(not_found(repo.move_node(&alice, a.id, bob_root.id, 0).unwrap_err()));
    assert!(not_found(repo.indent_node(&bob, a.id).unwrap_err()));
    assert!(not_found(repo.outdent_node(&bob, a.id).unwrap_err()));
    assert!(not_found(
        repo.create_node(&bob, Some(a.id), "x", None).unwrap_err()
    ));
    assert!(repo.subtree(&bob, a.id, Some(1)).unwrap().is_none());

    // Delete by a stranger reports success but changes nothing.
    repo.delete_node(&bob, a.id).unwrap();
    assert_eq!(repo.node(&alice, a.id).unwrap().text, "A");
}

#[test]
fn test_users_have_distinct_roots() {
    let repo = Repository::in_memory().unwrap();
    let a = repo.ensure_root(&UserId::new("a")).unwrap();
    let b = repo.ensure_root(&UserId::new("b")).unwrap();
    assert_ne!(a.id, b.id);
}

// === Delete ===

#[test]
fn test_delete_twice_succeeds() {
    let (repo, user, root) = repo_with_user("alice");
    let a = add(&repo, &user, root.id, "A");
    repo.delete_node(&user, a.id).unwrap();
    repo.delete_node(&user, a.id).unwrap();
    assert!(layout(&repo, &user, root.id).is_empty());
}

#[test]
fn test_deleted_node_is_not_a_parent() {
    let (repo, user, root) = repo_with_user("alice");
    let a = add(&repo, &user, root.id, "A");
    let b = add(&repo, &user, root.id, "B");
    repo.delete_node(&user, a.id).unwrap();
    assert!(matches!(
        repo.move_node(&user, b.id, a.id, 0).unwrap_err(),
        BulletpError::NotFound(_)
    ));
    assert!(matches!(
        repo.children(&user, a.id).unwrap_err(),
        BulletpError::NotFound(_)
    ));
}

#[test]
fn test_unknown_id_is_not_found() {
    let (repo, user, _) = repo_with_user("alice");
    assert!(matches!(
        repo.node(&user, BulletId::new()).unwrap_err(),
        BulletpError::NotFound(_)
    ));
    assert!(matches!(
        BulletId::parse("not-a-uuid").unwrap_err(),
        BulletpError::NotFound(_)
    ));
}

// === Subtree ===

#[test]
fn test_subtree_matches_children_order() {
    let (repo, user, root) = repo_with_user("alice");
    let a = add(&repo, &user, root.id, "A");
    add(&repo, &user, root.id, "B");
    repo.create_node(&user, Some(root.id), "A'", Some(a.id))
        .unwrap();

    let view = repo.subtree(&user, root.id, Some(1)).unwrap().unwrap();
    assert_eq!(view.child_texts(), vec!["A", "A'", "B"]);
    let orders: Vec<u32> = view.children.iter().map(|c| c.order_index).collect();
    assert_eq!(orders, vec![0, 1, 2]);
}

#[test]
fn test_subtree_serializes_nested() {
    let (repo, user, root) = repo_with_user("alice");
    let a = add(&repo, &user, root.id, "A");
    add(&repo, &user, a.id, "A1");

    let view = repo.subtree(&user, root.id, Some(2)).unwrap().unwrap();
    let json = serde_json::to_value(&view).unwrap();
    assert_eq!(json["text"], "Home");
    assert_eq!(json["children"][0]["text"], "A");
    assert_eq!(json["children"][0]["children"][0]["text"], "A1");
    assert_eq!(json["children"][0]["children"][0]["has_children"], false);
}
