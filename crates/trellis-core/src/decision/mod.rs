//! The decision-request workflow.
//!
//! A request starts `pending` and transitions exactly once into `decided`,
//! `cancelled`, or `expired`. Expiry is lazy: no background job flips the
//! stored status; reads report a pending request whose deadline has passed
//! as expired, and an optional sweep persists that for consumers who need
//! the stored row to match.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use trellis_db::models::{
    DecisionOption, DecisionRequest, DecisionStatus, DecisionUrgency, Plan,
};
use trellis_db::queries::decisions::{self, NewDecisionRequest};
use trellis_db::queries::{nodes, plans};

use crate::access;
use crate::error::{CoreError, Result};
use crate::events::{ChangeBus, ChangeEvent, ChangeKind};

/// Upper bound on the number of options a request may carry.
pub const MAX_OPTIONS: usize = 10;

/// Parameters for creating a decision request.
#[derive(Debug, Clone)]
pub struct CreateDecision {
    pub plan_id: Uuid,
    pub node_id: Option<Uuid>,
    pub title: String,
    pub context: Option<String>,
    pub options: Vec<DecisionOption>,
    /// Defaults to `can_continue` when unset.
    pub urgency: Option<DecisionUrgency>,
    pub expires_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

impl CreateDecision {
    pub fn new(plan_id: Uuid, title: impl Into<String>) -> Self {
        Self {
            plan_id,
            node_id: None,
            title: title.into(),
            context: None,
            options: Vec::new(),
            urgency: None,
            expires_at: None,
            metadata: serde_json::json!({}),
        }
    }
}

/// Filter for listing decision requests. Status filtering applies to the
/// effective (lazily-expired) status.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionFilter {
    pub status: Option<DecisionStatus>,
    pub urgency: Option<DecisionUrgency>,
}

/// Orchestrates decision requests with access checks and change
/// notification.
#[derive(Debug, Clone)]
pub struct DecisionWorkflow {
    pool: PgPool,
    bus: ChangeBus,
}

impl DecisionWorkflow {
    pub fn new(pool: PgPool, bus: ChangeBus) -> Self {
        Self { pool, bus }
    }

    async fn load_plan(&self, plan_id: Uuid) -> Result<Plan> {
        plans::get_plan(&self.pool, plan_id)
            .await?
            .ok_or_else(|| CoreError::not_found("plan", plan_id))
    }

    async fn load_request(&self, id: Uuid) -> Result<DecisionRequest> {
        decisions::get_decision_request(&self.pool, id)
            .await?
            .ok_or_else(|| CoreError::not_found("decision request", id))
    }

    /// Create a decision request. Requires edit access to the plan; an
    /// attached node, if any, must belong to the same plan.
    pub async fn create(&self, user: Uuid, params: CreateDecision) -> Result<DecisionRequest> {
        if params.title.trim().is_empty() {
            return Err(CoreError::invalid_input("decision title is required"));
        }
        if params.options.len() > MAX_OPTIONS {
            return Err(CoreError::invalid_input(format!(
                "a decision request carries at most {MAX_OPTIONS} options, got {}",
                params.options.len()
            )));
        }

        let plan = self.load_plan(params.plan_id).await?;
        access::require_edit(&self.pool, &plan, Some(user)).await?;

        if let Some(node_id) = params.node_id {
            let node = nodes::get_node(&self.pool, node_id)
                .await?
                .ok_or_else(|| CoreError::not_found("node", node_id))?;
            if node.plan_id != plan.id {
                return Err(CoreError::not_found("node", node_id));
            }
        }

        let request = decisions::insert_decision_request(
            &self.pool,
            &NewDecisionRequest {
                plan_id: params.plan_id,
                node_id: params.node_id,
                requested_by: user,
                title: params.title,
                context: params.context,
                options: params.options,
                urgency: params.urgency.unwrap_or(DecisionUrgency::CanContinue),
                expires_at: params.expires_at,
                metadata: params.metadata,
            },
        )
        .await?;

        self.bus.publish(ChangeEvent::plan(
            plan.id,
            ChangeKind::DecisionCreated,
            Some(user),
        ));
        Ok(request)
    }

    /// Resolve a pending request with a decision and rationale. Requires
    /// edit access. The resolver identity, decision text, rationale, and
    /// resolution time are recorded atomically.
    ///
    /// A request that is already terminal (including lazily expired) fails
    /// with `InvalidState`, and the first resolution's fields are left
    /// untouched.
    pub async fn resolve(
        &self,
        user: Uuid,
        id: Uuid,
        decision: &str,
        rationale: Option<&str>,
    ) -> Result<DecisionRequest> {
        let request = self.load_request(id).await?;
        let plan = self.load_plan(request.plan_id).await?;
        access::require_edit(&self.pool, &plan, Some(user)).await?;

        let effective = effective_status(&request, Utc::now());
        if effective != DecisionStatus::Pending {
            return Err(CoreError::invalid_state(format!(
                "decision request {id} is already {effective}"
            )));
        }

        let resolved = decisions::resolve_decision_request(&self.pool, id, user, decision, rationale)
            .await?;

        match resolved {
            Some(request) => {
                self.bus.publish(ChangeEvent::plan(
                    plan.id,
                    ChangeKind::DecisionResolved,
                    Some(user),
                ));
                Ok(request)
            }
            None => {
                // Lost a race: someone else reached a terminal state between
                // our read and the guarded update.
                let current = self.load_request(id).await?;
                Err(CoreError::invalid_state(format!(
                    "decision request {id} is already {}",
                    current.status
                )))
            }
        }
    }

    /// Cancel a pending request, merging the reason into its metadata.
    /// Requires edit access. Preexisting metadata keys survive the merge.
    pub async fn cancel(&self, user: Uuid, id: Uuid, reason: &str) -> Result<DecisionRequest> {
        let request = self.load_request(id).await?;
        let plan = self.load_plan(request.plan_id).await?;
        access::require_edit(&self.pool, &plan, Some(user)).await?;

        let effective = effective_status(&request, Utc::now());
        if effective != DecisionStatus::Pending {
            return Err(CoreError::invalid_state(format!(
                "decision request {id} is already {effective}"
            )));
        }

        let cancelled = decisions::cancel_decision_request(&self.pool, id, reason).await?;

        match cancelled {
            Some(request) => {
                self.bus.publish(ChangeEvent::plan(
                    plan.id,
                    ChangeKind::DecisionCancelled,
                    Some(user),
                ));
                Ok(request)
            }
            None => {
                let current = self.load_request(id).await?;
                Err(CoreError::invalid_state(format!(
                    "decision request {id} is already {}",
                    current.status
                )))
            }
        }
    }

    /// Fetch a single request, requiring view access. The returned status
    /// reflects lazy expiry.
    pub async fn get(&self, user: Option<Uuid>, id: Uuid) -> Result<DecisionRequest> {
        let request = self.load_request(id).await?;
        let plan = self.load_plan(request.plan_id).await?;
        access::require_view(&self.pool, &plan, user).await?;

        Ok(apply_lazy_expiry(request, Utc::now()))
    }

    /// List a plan's requests, newest first, with optional status and
    /// urgency filters. Requires view access. Statuses reflect lazy expiry,
    /// and the status filter matches the effective status.
    pub async fn list(
        &self,
        user: Option<Uuid>,
        plan_id: Uuid,
        filter: DecisionFilter,
    ) -> Result<Vec<DecisionRequest>> {
        let plan = self.load_plan(plan_id).await?;
        access::require_view(&self.pool, &plan, user).await?;

        // Urgency narrows in SQL; the status filter applies after the
        // expiry view so a stored-pending-but-overdue request matches
        // `expired`, not `pending`.
        let rows =
            decisions::list_decision_requests(&self.pool, plan_id, None, filter.urgency).await?;

        let now = Utc::now();
        let requests = rows
            .into_iter()
            .map(|r| apply_lazy_expiry(r, now))
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .collect();

        Ok(requests)
    }

    /// Persist the expired status for every overdue pending request in a
    /// plan. Optional maintenance; nothing in the core schedules it.
    /// Requires edit access. Returns the number of requests flipped.
    pub async fn sweep_expired(&self, user: Uuid, plan_id: Uuid) -> Result<u64> {
        let plan = self.load_plan(plan_id).await?;
        access::require_edit(&self.pool, &plan, Some(user)).await?;

        Ok(decisions::expire_overdue_requests(&self.pool, plan_id).await?)
    }
}

/// The status a request should be reported as at `now`: pending requests
/// whose deadline has passed read as expired even though no job has flipped
/// the stored row.
pub fn effective_status(request: &DecisionRequest, now: DateTime<Utc>) -> DecisionStatus {
    match (request.status, request.expires_at) {
        (DecisionStatus::Pending, Some(deadline)) if deadline < now => DecisionStatus::Expired,
        (status, _) => status,
    }
}

fn apply_lazy_expiry(mut request: DecisionRequest, now: DateTime<Utc>) -> DecisionRequest {
    request.status = effective_status(&request, now);
    request
}
