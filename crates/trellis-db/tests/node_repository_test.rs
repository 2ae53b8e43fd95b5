//! Integration tests for the node repository: sibling ordering, reorder,
//! move, and cascading deletion.
//!
//! Each test creates a unique temporary database (via a shared PostgreSQL
//! container), runs migrations, and drops it on completion so tests are
//! fully isolated.

use sqlx::PgPool;
use uuid::Uuid;

use trellis_db::models::{Node, NodeType};
use trellis_db::queries::nodes::{self, NewNode};
use trellis_db::tree::build_tree;
use trellis_test_utils::{create_test_db, drop_test_db};

/// Helper: insert a bare plan row and return its id. Plan bootstrap proper
/// (plan + root in one transaction) lives in trellis-core; these tests only
/// need a foreign key to hang nodes off.
async fn insert_plan(pool: &PgPool) -> Uuid {
    let row: (Uuid,) = sqlx::query_as(
        "INSERT INTO plans (title, owner_id) VALUES ('fixture plan', $1) RETURNING id",
    )
    .bind(Uuid::new_v4())
    .fetch_one(pool)
    .await
    .expect("plan insert should succeed");
    row.0
}

async fn insert_root(pool: &PgPool, plan_id: Uuid) -> Node {
    nodes::insert_node(pool, &NewNode::new(plan_id, None, NodeType::Root, "root"))
        .await
        .expect("root insert should succeed")
}

async fn insert_child(pool: &PgPool, plan_id: Uuid, parent_id: Uuid, title: &str) -> Node {
    nodes::insert_node(
        pool,
        &NewNode::new(plan_id, Some(parent_id), NodeType::Phase, title),
    )
    .await
    .expect("child insert should succeed")
}

#[tokio::test]
async fn insert_appends_at_end_of_sibling_set() {
    let (pool, db_name) = create_test_db().await;

    let plan_id = insert_plan(&pool).await;
    let root = insert_root(&pool, plan_id).await;
    assert_eq!(root.order_index, 0);
    assert_eq!(root.parent_id, None);

    let a = insert_child(&pool, plan_id, root.id, "a").await;
    let b = insert_child(&pool, plan_id, root.id, "b").await;
    let c = insert_child(&pool, plan_id, root.id, "c").await;

    assert_eq!(a.order_index, 0);
    assert_eq!(b.order_index, 1);
    assert_eq!(c.order_index, 2);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn get_children_orders_by_index() {
    let (pool, db_name) = create_test_db().await;

    let plan_id = insert_plan(&pool).await;
    let root = insert_root(&pool, plan_id).await;
    let a = insert_child(&pool, plan_id, root.id, "a").await;
    let b = insert_child(&pool, plan_id, root.id, "b").await;

    let children = nodes::get_children(&pool, root.id).await.unwrap();
    let ids: Vec<Uuid> = children.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![a.id, b.id]);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn reorder_moves_node_and_preserves_relative_order() {
    let (pool, db_name) = create_test_db().await;

    let plan_id = insert_plan(&pool).await;
    let root = insert_root(&pool, plan_id).await;
    let a = insert_child(&pool, plan_id, root.id, "a").await;
    let b = insert_child(&pool, plan_id, root.id, "b").await;
    let c = insert_child(&pool, plan_id, root.id, "c").await;
    let d = insert_child(&pool, plan_id, root.id, "d").await;

    // [a, b, c, d] -> move a to position 2 -> [b, c, a, d]
    nodes::reorder_node(&pool, a.id, 2).await.unwrap();

    let children = nodes::get_children(&pool, root.id).await.unwrap();
    let ids: Vec<Uuid> = children.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![b.id, c.id, a.id, d.id]);

    // Indices are a contiguous 0..n rewrite.
    let indices: Vec<i32> = children.iter().map(|n| n.order_index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn reorder_clamps_out_of_range_index() {
    let (pool, db_name) = create_test_db().await;

    let plan_id = insert_plan(&pool).await;
    let root = insert_root(&pool, plan_id).await;
    let a = insert_child(&pool, plan_id, root.id, "a").await;
    let b = insert_child(&pool, plan_id, root.id, "b").await;

    // Way past the end: clamps to the last slot.
    nodes::reorder_node(&pool, a.id, 99).await.unwrap();

    let children = nodes::get_children(&pool, root.id).await.unwrap();
    let ids: Vec<Uuid> = children.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![b.id, a.id]);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn reorder_missing_node_fails() {
    let (pool, db_name) = create_test_db().await;

    let result = nodes::reorder_node(&pool, Uuid::new_v4(), 0).await;
    assert!(result.is_err());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn move_appends_to_new_sibling_set() {
    let (pool, db_name) = create_test_db().await;

    let plan_id = insert_plan(&pool).await;
    let root = insert_root(&pool, plan_id).await;
    let a = insert_child(&pool, plan_id, root.id, "a").await;
    let b = insert_child(&pool, plan_id, root.id, "b").await;
    let b_child = insert_child(&pool, plan_id, b.id, "b-child").await;

    let moved = nodes::move_node(&pool, a.id, b.id)
        .await
        .unwrap()
        .expect("node should exist");

    assert_eq!(moved.parent_id, Some(b.id));
    // b already had one child at index 0, so a lands at 1.
    assert_eq!(moved.order_index, b_child.order_index + 1);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn move_to_empty_parent_gets_index_zero() {
    let (pool, db_name) = create_test_db().await;

    let plan_id = insert_plan(&pool).await;
    let root = insert_root(&pool, plan_id).await;
    let a = insert_child(&pool, plan_id, root.id, "a").await;
    let b = insert_child(&pool, plan_id, root.id, "b").await;

    let moved = nodes::move_node(&pool, a.id, b.id)
        .await
        .unwrap()
        .expect("node should exist");

    assert_eq!(moved.parent_id, Some(b.id));
    assert_eq!(moved.order_index, 0);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn delete_cascades_through_descendants() {
    let (pool, db_name) = create_test_db().await;

    let plan_id = insert_plan(&pool).await;
    let root = insert_root(&pool, plan_id).await;
    let phase = insert_child(&pool, plan_id, root.id, "phase").await;
    let task = insert_child(&pool, plan_id, phase.id, "task").await;
    let subtask = insert_child(&pool, plan_id, task.id, "subtask").await;
    let sibling = insert_child(&pool, plan_id, root.id, "sibling").await;

    let deleted = nodes::delete_node(&pool, phase.id).await.unwrap();
    assert_eq!(deleted, 1);

    let remaining = nodes::list_nodes_for_plan(&pool, plan_id).await.unwrap();
    let ids: Vec<Uuid> = remaining.iter().map(|n| n.id).collect();
    assert!(ids.contains(&root.id));
    assert!(ids.contains(&sibling.id));
    assert!(!ids.contains(&phase.id));
    assert!(!ids.contains(&task.id));
    assert!(!ids.contains(&subtask.id));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn delete_already_deleted_node_reports_zero_rows() {
    let (pool, db_name) = create_test_db().await;

    let plan_id = insert_plan(&pool).await;
    let root = insert_root(&pool, plan_id).await;
    let a = insert_child(&pool, plan_id, root.id, "a").await;

    assert_eq!(nodes::delete_node(&pool, a.id).await.unwrap(), 1);
    // Cascade-retry contract: repeating the delete is not an error.
    assert_eq!(nodes::delete_node(&pool, a.id).await.unwrap(), 0);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn collect_subtree_ids_walks_whole_subtree() {
    let (pool, db_name) = create_test_db().await;

    let plan_id = insert_plan(&pool).await;
    let root = insert_root(&pool, plan_id).await;
    let phase = insert_child(&pool, plan_id, root.id, "phase").await;
    let task = insert_child(&pool, plan_id, phase.id, "task").await;
    let other = insert_child(&pool, plan_id, root.id, "other").await;

    let mut collected = nodes::collect_subtree_ids(&pool, phase.id).await.unwrap();
    collected.sort();
    let mut expected = vec![phase.id, task.id];
    expected.sort();
    assert_eq!(collected, expected);
    assert!(!collected.contains(&other.id));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn ancestor_ids_walks_to_root() {
    let (pool, db_name) = create_test_db().await;

    let plan_id = insert_plan(&pool).await;
    let root = insert_root(&pool, plan_id).await;
    let phase = insert_child(&pool, plan_id, root.id, "phase").await;
    let task = insert_child(&pool, plan_id, phase.id, "task").await;

    let ancestors = nodes::ancestor_ids(&pool, task.id).await.unwrap();
    assert_eq!(ancestors, vec![phase.id, root.id]);

    let root_ancestors = nodes::ancestor_ids(&pool, root.id).await.unwrap();
    assert!(root_ancestors.is_empty());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn build_tree_from_stored_plan_yields_single_root() {
    let (pool, db_name) = create_test_db().await;

    let plan_id = insert_plan(&pool).await;
    let root = insert_root(&pool, plan_id).await;
    let phase = insert_child(&pool, plan_id, root.id, "phase").await;
    insert_child(&pool, plan_id, phase.id, "task").await;

    let flat = nodes::list_nodes_for_plan(&pool, plan_id).await.unwrap();
    let trees = build_tree(flat);

    assert_eq!(trees.len(), 1);
    assert_eq!(trees[0].node.id, root.id);
    assert_eq!(trees[0].node.node_type, NodeType::Root);
    assert_eq!(trees[0].children.len(), 1);
    assert_eq!(trees[0].children[0].children.len(), 1);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn second_root_in_same_plan_is_rejected_by_schema() {
    let (pool, db_name) = create_test_db().await;

    let plan_id = insert_plan(&pool).await;
    insert_root(&pool, plan_id).await;

    let result =
        nodes::insert_node(&pool, &NewNode::new(plan_id, None, NodeType::Root, "root2")).await;
    assert!(result.is_err());

    pool.close().await;
    drop_test_db(&db_name).await;
}
