//! Database query functions for the `nodes` table: the node repository.
//!
//! Sibling ordering lives in `order_index`. Inserts and moves always append
//! at the end of the target sibling set (max + 1, or 0 when empty); precise
//! placement is a separate `reorder_node` call that rewrites the sibling
//! set's indices inside one transaction.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Node, NodeStatus, NodeType};

/// Parameters for inserting a new node row.
#[derive(Debug, Clone)]
pub struct NewNode {
    pub plan_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub node_type: NodeType,
    pub title: String,
    pub context: Option<String>,
    pub agent_instructions: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

impl NewNode {
    pub fn new(
        plan_id: Uuid,
        parent_id: Option<Uuid>,
        node_type: NodeType,
        title: impl Into<String>,
    ) -> Self {
        Self {
            plan_id,
            parent_id,
            node_type,
            title: title.into(),
            context: None,
            agent_instructions: None,
            due_date: None,
        }
    }
}

/// Insert a new node row, appended at the end of its sibling set.
///
/// The order index is computed inside the statement (`max + 1`, or 0 for the
/// first sibling) so concurrent appends never overwrite an existing slot.
/// Root bootstrap goes through the same path with `parent_id = None`; the
/// service layer is responsible for rejecting `root` outside plan creation.
pub async fn insert_node<'e, E>(executor: E, new: &NewNode) -> Result<Node>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let node = sqlx::query_as::<_, Node>(
        "INSERT INTO nodes (plan_id, parent_id, node_type, title, context, agent_instructions, due_date, order_index) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, \
                 (SELECT COALESCE(MAX(order_index) + 1, 0) FROM nodes \
                  WHERE plan_id = $1 AND parent_id IS NOT DISTINCT FROM $2)) \
         RETURNING *",
    )
    .bind(new.plan_id)
    .bind(new.parent_id)
    .bind(new.node_type)
    .bind(&new.title)
    .bind(&new.context)
    .bind(&new.agent_instructions)
    .bind(new.due_date)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert node {:?} in plan {}", new.title, new.plan_id))?;

    Ok(node)
}

/// Fetch a single node by ID.
pub async fn get_node(pool: &PgPool, id: Uuid) -> Result<Option<Node>> {
    let node = sqlx::query_as::<_, Node>("SELECT * FROM nodes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch node")?;

    Ok(node)
}

/// Fetch the root node of a plan.
pub async fn get_root_node(pool: &PgPool, plan_id: Uuid) -> Result<Option<Node>> {
    let node = sqlx::query_as::<_, Node>(
        "SELECT * FROM nodes WHERE plan_id = $1 AND node_type = 'root'",
    )
    .bind(plan_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch root node")?;

    Ok(node)
}

/// Direct children of a node, ordered by `order_index` ascending.
pub async fn get_children(pool: &PgPool, parent_id: Uuid) -> Result<Vec<Node>> {
    let nodes = sqlx::query_as::<_, Node>(
        "SELECT * FROM nodes WHERE parent_id = $1 ORDER BY order_index ASC, created_at ASC",
    )
    .bind(parent_id)
    .fetch_all(pool)
    .await
    .context("failed to fetch children")?;

    Ok(nodes)
}

/// The full flat node set for a plan, ordered by `order_index`. This is the
/// input to [`crate::tree::build_tree`].
pub async fn list_nodes_for_plan(pool: &PgPool, plan_id: Uuid) -> Result<Vec<Node>> {
    let nodes = sqlx::query_as::<_, Node>(
        "SELECT * FROM nodes WHERE plan_id = $1 ORDER BY order_index ASC, created_at ASC",
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await
    .context("failed to list nodes for plan")?;

    Ok(nodes)
}

/// Field-level patch for a node update. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct NodePatch {
    pub title: Option<String>,
    pub node_type: Option<NodeType>,
    pub status: Option<NodeStatus>,
    pub context: Option<String>,
    pub agent_instructions: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

/// Apply a patch to a node. Returns the updated row, or `None` if the node
/// does not exist. The parent is deliberately not patchable here;
/// reparenting goes through [`move_node`]. Root retype guards live in the
/// tree service.
pub async fn update_node(pool: &PgPool, id: Uuid, patch: &NodePatch) -> Result<Option<Node>> {
    let node = sqlx::query_as::<_, Node>(
        "UPDATE nodes \
         SET title = COALESCE($1, title), \
             node_type = COALESCE($2, node_type), \
             status = COALESCE($3, status), \
             context = COALESCE($4, context), \
             agent_instructions = COALESCE($5, agent_instructions), \
             due_date = COALESCE($6, due_date), \
             updated_at = now() \
         WHERE id = $7 \
         RETURNING *",
    )
    .bind(&patch.title)
    .bind(patch.node_type)
    .bind(patch.status)
    .bind(&patch.context)
    .bind(&patch.agent_instructions)
    .bind(patch.due_date)
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to update node")?;

    Ok(node)
}

/// Record an agent request on a node (kind, requester, message, timestamp).
pub async fn set_agent_request(
    pool: &PgPool,
    id: Uuid,
    kind: &str,
    requested_by: Uuid,
    message: Option<&str>,
) -> Result<Option<Node>> {
    let node = sqlx::query_as::<_, Node>(
        "UPDATE nodes \
         SET agent_request_kind = $1, \
             agent_requested_by = $2, \
             agent_request_message = $3, \
             agent_requested_at = now(), \
             updated_at = now() \
         WHERE id = $4 \
         RETURNING *",
    )
    .bind(kind)
    .bind(requested_by)
    .bind(message)
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to set agent request")?;

    Ok(node)
}

/// Assign a node to a user, recording who made the assignment and when.
pub async fn assign_node(
    pool: &PgPool,
    id: Uuid,
    assigned_to: Uuid,
    assigned_by: Uuid,
) -> Result<Option<Node>> {
    let node = sqlx::query_as::<_, Node>(
        "UPDATE nodes \
         SET assigned_to = $1, assigned_by = $2, assigned_at = now(), updated_at = now() \
         WHERE id = $3 \
         RETURNING *",
    )
    .bind(assigned_to)
    .bind(assigned_by)
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to assign node")?;

    Ok(node)
}

/// Reposition a node within its sibling set.
///
/// Loads the full sibling set (same parent, or the plan's top level when the
/// parent is null), removes the target, reinserts it at `new_index` clamped
/// into `[0, len - 1]`, then rewrites `order_index` for every sibling whose
/// computed position differs from its stored one. Full rewrite rather than a
/// gap scheme; the whole sequence runs in one transaction.
pub async fn reorder_node(pool: &PgPool, node_id: Uuid, new_index: usize) -> Result<()> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let node = sqlx::query_as::<_, Node>("SELECT * FROM nodes WHERE id = $1 FOR UPDATE")
        .bind(node_id)
        .fetch_optional(&mut *tx)
        .await
        .context("failed to fetch node for reorder")?;

    let Some(node) = node else {
        bail!("node {node_id} not found");
    };

    let mut siblings = sqlx::query_as::<_, Node>(
        "SELECT * FROM nodes \
         WHERE plan_id = $1 AND parent_id IS NOT DISTINCT FROM $2 \
         ORDER BY order_index ASC, created_at ASC \
         FOR UPDATE",
    )
    .bind(node.plan_id)
    .bind(node.parent_id)
    .fetch_all(&mut *tx)
    .await
    .context("failed to fetch sibling set for reorder")?;

    let current = siblings
        .iter()
        .position(|n| n.id == node_id)
        .context("node missing from its own sibling set")?;

    let target = new_index.min(siblings.len() - 1);
    let moved = siblings.remove(current);
    siblings.insert(target, moved);

    for (idx, sibling) in siblings.iter().enumerate() {
        let idx = idx as i32;
        if sibling.order_index != idx {
            sqlx::query("UPDATE nodes SET order_index = $1, updated_at = now() WHERE id = $2")
                .bind(idx)
                .bind(sibling.id)
                .execute(&mut *tx)
                .await
                .context("failed to rewrite sibling order")?;
        }
    }

    tx.commit().await.context("failed to commit reorder")?;
    Ok(())
}

/// Relocate a node under a different parent, appended at the end of the new
/// sibling set. Returns the updated row, or `None` if the node is absent.
///
/// Same-plan and cycle validation are the caller's job (the tree service
/// checks both before invoking this).
pub async fn move_node(pool: &PgPool, node_id: Uuid, new_parent_id: Uuid) -> Result<Option<Node>> {
    let node = sqlx::query_as::<_, Node>(
        "UPDATE nodes \
         SET parent_id = $2, \
             order_index = (SELECT COALESCE(MAX(order_index) + 1, 0) FROM nodes \
                            WHERE parent_id = $2), \
             updated_at = now() \
         WHERE id = $1 \
         RETURNING *",
    )
    .bind(node_id)
    .bind(new_parent_id)
    .fetch_optional(pool)
    .await
    .context("failed to move node")?;

    Ok(node)
}

/// Delete a node. The entire descendant subtree goes with it through the
/// `parent_id ON DELETE CASCADE` self-reference. Returns the number of rows
/// deleted directly (0 when the node was already gone, which a cascade retry
/// treats as success).
pub async fn delete_node(pool: &PgPool, id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM nodes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("failed to delete node")?;

    Ok(result.rows_affected())
}

/// Collect the IDs of a node and all its descendants.
///
/// Iterative worklist over `parent_id` rather than recursion, so arbitrarily
/// deep trees cannot exhaust the stack. Used for change events and for
/// stores without cascading foreign keys.
pub async fn collect_subtree_ids(pool: &PgPool, root_id: Uuid) -> Result<Vec<Uuid>> {
    let mut collected = vec![root_id];
    let mut frontier = vec![root_id];

    while !frontier.is_empty() {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT id FROM nodes WHERE parent_id = ANY($1)")
                .bind(&frontier)
                .fetch_all(pool)
                .await
                .context("failed to collect subtree ids")?;

        frontier = rows.into_iter().map(|(id,)| id).collect();
        collected.extend(frontier.iter().copied());
    }

    Ok(collected)
}

/// Walk the parent chain from `node_id` up to the root, returning each
/// ancestor ID in order (nearest first). The node itself is not included.
///
/// Used by the tree service to reject moves that would create a cycle.
pub async fn ancestor_ids(pool: &PgPool, node_id: Uuid) -> Result<Vec<Uuid>> {
    let mut ancestors = Vec::new();
    let mut cursor = node_id;

    loop {
        let row: Option<(Option<Uuid>,)> =
            sqlx::query_as("SELECT parent_id FROM nodes WHERE id = $1")
                .bind(cursor)
                .fetch_optional(pool)
                .await
                .context("failed to walk ancestor chain")?;

        match row {
            Some((Some(parent),)) => {
                // A cycle already present in storage would loop forever;
                // bail instead so the corruption is visible.
                if ancestors.contains(&parent) || parent == node_id {
                    bail!("cycle detected in parent chain of node {node_id}");
                }
                ancestors.push(parent);
                cursor = parent;
            }
            _ => break,
        }
    }

    Ok(ancestors)
}
