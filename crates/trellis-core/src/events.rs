//! Change notification for watchers and auditing.
//!
//! After a mutation commits, the service publishes a [`ChangeEvent`]
//! describing what changed. Delivery is fire-and-forget: a closed or lagging
//! subscriber never fails the mutation. Every publish also emits a structured
//! tracing event carrying the acting user, which serves as the audit record.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Kind of change that occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    PlanCreated,
    PlanUpdated,
    PlanDeleted,
    NodeCreated,
    NodeUpdated,
    NodeMoved,
    NodeReordered,
    NodeDeleted,
    CollaboratorChanged,
    DecisionCreated,
    DecisionResolved,
    DecisionCancelled,
}

/// Description of a committed change, fanned out to interested watchers.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    pub plan_id: Uuid,
    /// Nodes affected by the change. Empty for plan-level changes; for a
    /// subtree deletion this carries every removed node id.
    pub node_ids: Vec<Uuid>,
    pub kind: ChangeKind,
    /// The user who performed the change, when one was authenticated.
    pub actor: Option<Uuid>,
}

impl ChangeEvent {
    pub fn plan(plan_id: Uuid, kind: ChangeKind, actor: Option<Uuid>) -> Self {
        Self {
            plan_id,
            node_ids: Vec::new(),
            kind,
            actor,
        }
    }

    pub fn node(plan_id: Uuid, node_id: Uuid, kind: ChangeKind, actor: Option<Uuid>) -> Self {
        Self {
            plan_id,
            node_ids: vec![node_id],
            kind,
            actor,
        }
    }
}

/// Broadcast channel for change events.
///
/// Cheap to clone; each clone publishes into the same channel. Subscribers
/// that fall behind lose old events rather than blocking publishers.
#[derive(Debug, Clone)]
pub struct ChangeBus {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeBus {
    /// Create a bus retaining up to `capacity` undelivered events per
    /// subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to future change events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    /// Publish a change event and write the audit record.
    ///
    /// Never fails: with no subscribers the event is simply dropped.
    pub fn publish(&self, event: ChangeEvent) {
        tracing::info!(
            plan_id = %event.plan_id,
            kind = ?event.kind,
            actor = ?event.actor,
            nodes = event.node_ids.len(),
            "change committed"
        );
        let _ = self.sender.send(event);
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new(256)
    }
}
