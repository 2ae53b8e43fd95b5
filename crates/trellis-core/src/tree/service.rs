//! The plan tree service.
//!
//! Every mutating call resolves access first; an insufficient role is
//! rejected before any storage statement runs. The service owns the
//! invariants the raw repository cannot see on its own: the single
//! never-deleted root per plan, polymorphic parent addressing, and cycle
//! rejection on reparenting.

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use trellis_db::models::{Node, NodeType, Plan, PlanStatus, Visibility};
use trellis_db::queries::nodes::{self, NewNode, NodePatch};
use trellis_db::queries::plans;
use trellis_db::tree::{TreeNode, build_tree};

use crate::access;
use crate::error::{CoreError, Result};
use crate::events::{ChangeBus, ChangeEvent, ChangeKind};

/// Parameters for creating a plan.
#[derive(Debug, Clone)]
pub struct CreatePlan {
    pub title: String,
    pub description: Option<String>,
    pub visibility: Visibility,
    pub organization_id: Option<Uuid>,
    pub metadata: serde_json::Value,
}

impl CreatePlan {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            visibility: Visibility::Private,
            organization_id: None,
            metadata: serde_json::json!({}),
        }
    }
}

/// Parameters for creating a node under a resolved parent.
#[derive(Debug, Clone)]
pub struct NewNodeSpec {
    pub node_type: NodeType,
    pub title: String,
    pub context: Option<String>,
    pub agent_instructions: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

impl NewNodeSpec {
    pub fn new(node_type: NodeType, title: impl Into<String>) -> Self {
        Self {
            node_type,
            title: title.into(),
            context: None,
            agent_instructions: None,
            due_date: None,
        }
    }
}

/// How a nominal parent identifier resolved.
///
/// Entry points accept either a node id or a plan id as the parent; node
/// lookup is tried first, then plan lookup falling back to the plan's root
/// node. Callers rely on this two-step fallback.
#[derive(Debug, Clone)]
pub enum ResolvedParent {
    /// The identifier named a node directly.
    Node(Node),
    /// The identifier named a plan; its root node is the effective parent.
    PlanRoot(Node),
}

impl ResolvedParent {
    /// The effective parent node either way.
    pub fn into_node(self) -> Node {
        match self {
            Self::Node(node) | Self::PlanRoot(node) => node,
        }
    }
}

/// Orchestrates node operations with access checks and change notification.
#[derive(Debug, Clone)]
pub struct PlanTreeService {
    pool: PgPool,
    bus: ChangeBus,
}

impl PlanTreeService {
    pub fn new(pool: PgPool, bus: ChangeBus) -> Self {
        Self { pool, bus }
    }

    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    async fn load_plan(&self, plan_id: Uuid) -> Result<Plan> {
        plans::get_plan(&self.pool, plan_id)
            .await?
            .ok_or_else(|| CoreError::not_found("plan", plan_id))
    }

    async fn load_node(&self, node_id: Uuid) -> Result<Node> {
        nodes::get_node(&self.pool, node_id)
            .await?
            .ok_or_else(|| CoreError::not_found("node", node_id))
    }

    // -----------------------------------------------------------------
    // Plans
    // -----------------------------------------------------------------

    /// Create a plan together with its root node, atomically.
    ///
    /// The root node is the only node ever created with type `root`; it
    /// carries the plan's title and is deleted only when the plan is.
    pub async fn create_plan(&self, owner: Uuid, params: CreatePlan) -> Result<(Plan, Node)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        let plan = sqlx::query_as::<_, Plan>(
            "INSERT INTO plans (title, description, owner_id, visibility, organization_id, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING *",
        )
        .bind(&params.title)
        .bind(&params.description)
        .bind(owner)
        .bind(params.visibility)
        .bind(params.organization_id)
        .bind(&params.metadata)
        .fetch_one(&mut *tx)
        .await
        .context("failed to insert plan")?;

        let root = nodes::insert_node(
            &mut *tx,
            &NewNode::new(plan.id, None, NodeType::Root, params.title.clone()),
        )
        .await?;

        tx.commit().await.context("failed to commit plan bootstrap")?;

        self.bus.publish(ChangeEvent::node(
            plan.id,
            root.id,
            ChangeKind::PlanCreated,
            Some(owner),
        ));
        Ok((plan, root))
    }

    /// Fetch a plan, requiring view access.
    pub async fn get_plan(&self, user: Option<Uuid>, plan_id: Uuid) -> Result<Plan> {
        let plan = self.load_plan(plan_id).await?;
        access::require_view(&self.pool, &plan, user).await?;
        Ok(plan)
    }

    /// Update a plan's title and/or description. Requires edit access.
    pub async fn update_plan(
        &self,
        user: Uuid,
        plan_id: Uuid,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<Plan> {
        let plan = self.load_plan(plan_id).await?;
        access::require_edit(&self.pool, &plan, Some(user)).await?;

        let updated = plans::update_plan_details(&self.pool, plan_id, title, description).await?;
        self.bus.publish(ChangeEvent::plan(
            plan_id,
            ChangeKind::PlanUpdated,
            Some(user),
        ));
        Ok(updated)
    }

    /// Change a plan's status. Requires edit access.
    pub async fn set_plan_status(&self, user: Uuid, plan_id: Uuid, status: PlanStatus) -> Result<()> {
        let plan = self.load_plan(plan_id).await?;
        access::require_edit(&self.pool, &plan, Some(user)).await?;

        plans::update_plan_status(&self.pool, plan_id, status).await?;
        self.bus.publish(ChangeEvent::plan(
            plan_id,
            ChangeKind::PlanUpdated,
            Some(user),
        ));
        Ok(())
    }

    /// Change a plan's visibility. Requires administer rights, since this
    /// widens or narrows who can see the plan.
    pub async fn set_plan_visibility(
        &self,
        user: Uuid,
        plan_id: Uuid,
        visibility: Visibility,
    ) -> Result<()> {
        let plan = self.load_plan(plan_id).await?;
        access::require_admin(&self.pool, &plan, Some(user)).await?;

        plans::update_plan_visibility(&self.pool, plan_id, visibility).await?;
        self.bus.publish(ChangeEvent::plan(
            plan_id,
            ChangeKind::PlanUpdated,
            Some(user),
        ));
        Ok(())
    }

    /// Delete a plan and everything in it: nodes, collaborator grants, and
    /// decision requests all cascade. Requires administer rights.
    pub async fn delete_plan(&self, user: Uuid, plan_id: Uuid) -> Result<()> {
        let plan = self.load_plan(plan_id).await?;
        access::require_admin(&self.pool, &plan, Some(user)).await?;

        // A concurrent delete winning the race still counts as success.
        plans::delete_plan(&self.pool, plan_id).await?;
        self.bus.publish(ChangeEvent::plan(
            plan_id,
            ChangeKind::PlanDeleted,
            Some(user),
        ));
        Ok(())
    }

    /// Materialize the plan's full tree. Requires view access.
    ///
    /// Always yields exactly one tree whose root has type `root`; anything
    /// else means the stored data violates the single-root invariant.
    pub async fn get_plan_tree(&self, user: Option<Uuid>, plan_id: Uuid) -> Result<TreeNode> {
        let plan = self.load_plan(plan_id).await?;
        access::require_view(&self.pool, &plan, user).await?;

        let flat = nodes::list_nodes_for_plan(&self.pool, plan_id).await?;
        let mut roots = build_tree(flat);
        match roots.len() {
            1 => Ok(roots.remove(0)),
            n => Err(anyhow!("plan {plan_id} materialized {n} roots, expected 1").into()),
        }
    }

    // -----------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------

    /// Resolve a nominal parent identifier: node lookup first, then plan
    /// lookup with the plan's root node as the effective parent.
    pub async fn resolve_parent(&self, parent_ref: Uuid) -> Result<ResolvedParent> {
        if let Some(node) = nodes::get_node(&self.pool, parent_ref).await? {
            return Ok(ResolvedParent::Node(node));
        }

        match plans::get_plan(&self.pool, parent_ref).await? {
            Some(plan) => {
                let root = nodes::get_root_node(&self.pool, plan.id)
                    .await?
                    .ok_or_else(|| anyhow!("plan {} has no root node", plan.id))?;
                Ok(ResolvedParent::PlanRoot(root))
            }
            None => Err(CoreError::not_found("parent", parent_ref)),
        }
    }

    /// Create a node under a parent addressed by node id or plan id.
    /// Requires edit access to the plan.
    pub async fn create_node(
        &self,
        user: Uuid,
        parent_ref: Uuid,
        spec: NewNodeSpec,
    ) -> Result<Node> {
        if spec.node_type == NodeType::Root {
            return Err(CoreError::invalid_input(
                "node type root is created only at plan bootstrap",
            ));
        }

        let parent = self.resolve_parent(parent_ref).await?.into_node();
        let plan = self.load_plan(parent.plan_id).await?;
        access::require_edit(&self.pool, &plan, Some(user)).await?;

        let mut new = NewNode::new(plan.id, Some(parent.id), spec.node_type, spec.title);
        new.context = spec.context;
        new.agent_instructions = spec.agent_instructions;
        new.due_date = spec.due_date;

        let node = nodes::insert_node(&self.pool, &new).await?;
        self.bus.publish(ChangeEvent::node(
            plan.id,
            node.id,
            ChangeKind::NodeCreated,
            Some(user),
        ));
        Ok(node)
    }

    /// Update a node's fields. Requires edit access.
    ///
    /// The root node's type is immutable, and no node may be retyped to
    /// `root` after the fact.
    pub async fn update_node(&self, user: Uuid, node_id: Uuid, patch: NodePatch) -> Result<Node> {
        let node = self.load_node(node_id).await?;
        let plan = self.load_plan(node.plan_id).await?;
        access::require_edit(&self.pool, &plan, Some(user)).await?;

        if let Some(new_type) = patch.node_type {
            if node.node_type == NodeType::Root && new_type != NodeType::Root {
                return Err(CoreError::invalid_state(
                    "the root node's type cannot be changed",
                ));
            }
            if node.node_type != NodeType::Root && new_type == NodeType::Root {
                return Err(CoreError::invalid_input(
                    "node type root is created only at plan bootstrap",
                ));
            }
        }

        let updated = nodes::update_node(&self.pool, node_id, &patch)
            .await?
            .ok_or_else(|| CoreError::not_found("node", node_id))?;

        self.bus.publish(ChangeEvent::node(
            plan.id,
            node_id,
            ChangeKind::NodeUpdated,
            Some(user),
        ));
        Ok(updated)
    }

    /// Reposition a node within its sibling set. Out-of-range indices are
    /// clamped, not rejected. Requires edit access.
    pub async fn reorder_node(&self, user: Uuid, node_id: Uuid, new_index: usize) -> Result<Node> {
        let node = self.load_node(node_id).await?;
        let plan = self.load_plan(node.plan_id).await?;
        access::require_edit(&self.pool, &plan, Some(user)).await?;

        nodes::reorder_node(&self.pool, node_id, new_index).await?;

        let updated = self.load_node(node_id).await?;
        self.bus.publish(ChangeEvent::node(
            plan.id,
            node_id,
            ChangeKind::NodeReordered,
            Some(user),
        ));
        Ok(updated)
    }

    /// Relocate a node under a new parent (node id or plan id), appended at
    /// the end of the new sibling set; a follow-up reorder gives precise
    /// placement. Requires edit access.
    ///
    /// Moving a node under itself or any of its descendants is rejected:
    /// that would detach the subtree into a cycle.
    pub async fn move_node(&self, user: Uuid, node_id: Uuid, new_parent_ref: Uuid) -> Result<Node> {
        let node = self.load_node(node_id).await?;
        if node.node_type == NodeType::Root {
            return Err(CoreError::invalid_state("the root node cannot be moved"));
        }

        let parent = self.resolve_parent(new_parent_ref).await?.into_node();
        if parent.plan_id != node.plan_id {
            // Reparenting across plans is addressed as a missing parent.
            return Err(CoreError::not_found("parent", new_parent_ref));
        }

        let plan = self.load_plan(node.plan_id).await?;
        access::require_edit(&self.pool, &plan, Some(user)).await?;

        if parent.id == node.id {
            return Err(CoreError::invalid_input(
                "a node cannot become its own parent",
            ));
        }
        let ancestors = nodes::ancestor_ids(&self.pool, parent.id).await?;
        if ancestors.contains(&node.id) {
            return Err(CoreError::invalid_input(
                "cannot move a node under one of its own descendants",
            ));
        }

        let moved = nodes::move_node(&self.pool, node_id, parent.id)
            .await?
            .ok_or_else(|| CoreError::not_found("node", node_id))?;

        self.bus.publish(ChangeEvent::node(
            plan.id,
            node_id,
            ChangeKind::NodeMoved,
            Some(user),
        ));
        Ok(moved)
    }

    /// Delete a node and its entire descendant subtree. Requires edit
    /// access. Returns the ids of every removed node.
    ///
    /// The root node cannot be deleted directly; deleting the plan is the
    /// only way to remove it.
    pub async fn delete_node(&self, user: Uuid, node_id: Uuid) -> Result<Vec<Uuid>> {
        let node = self.load_node(node_id).await?;
        if node.node_type == NodeType::Root {
            return Err(CoreError::invalid_state(
                "the root node cannot be deleted; delete the plan instead",
            ));
        }

        let plan = self.load_plan(node.plan_id).await?;
        access::require_edit(&self.pool, &plan, Some(user)).await?;

        let subtree = nodes::collect_subtree_ids(&self.pool, node_id).await?;
        // Zero rows here means a concurrent delete already won; the retry
        // contract treats that as success.
        nodes::delete_node(&self.pool, node_id).await?;

        self.bus.publish(ChangeEvent {
            plan_id: plan.id,
            node_ids: subtree.clone(),
            kind: ChangeKind::NodeDeleted,
            actor: Some(user),
        });
        Ok(subtree)
    }

    /// Assign a node to a user. Requires edit access.
    pub async fn assign_node(&self, user: Uuid, node_id: Uuid, assignee: Uuid) -> Result<Node> {
        let node = self.load_node(node_id).await?;
        let plan = self.load_plan(node.plan_id).await?;
        access::require_edit(&self.pool, &plan, Some(user)).await?;

        let updated = nodes::assign_node(&self.pool, node_id, assignee, user)
            .await?
            .ok_or_else(|| CoreError::not_found("node", node_id))?;

        self.bus.publish(ChangeEvent::node(
            plan.id,
            node_id,
            ChangeKind::NodeUpdated,
            Some(user),
        ));
        Ok(updated)
    }

    /// Record an agent's request for input on a node (kind, requester,
    /// message, timestamp). Requires edit access.
    pub async fn set_agent_request(
        &self,
        user: Uuid,
        node_id: Uuid,
        kind: &str,
        message: Option<&str>,
    ) -> Result<Node> {
        let node = self.load_node(node_id).await?;
        let plan = self.load_plan(node.plan_id).await?;
        access::require_edit(&self.pool, &plan, Some(user)).await?;

        let updated = nodes::set_agent_request(&self.pool, node_id, kind, user, message)
            .await?
            .ok_or_else(|| CoreError::not_found("node", node_id))?;

        self.bus.publish(ChangeEvent::node(
            plan.id,
            node_id,
            ChangeKind::NodeUpdated,
            Some(user),
        ));
        Ok(updated)
    }

    /// Direct children of a node, ordered by position. Requires view access.
    pub async fn get_children(&self, user: Option<Uuid>, node_id: Uuid) -> Result<Vec<Node>> {
        let node = self.load_node(node_id).await?;
        let plan = self.load_plan(node.plan_id).await?;
        access::require_view(&self.pool, &plan, user).await?;

        Ok(nodes::get_children(&self.pool, node_id).await?)
    }
}
