//! Database query functions for the `decision_requests` table.
//!
//! Resolution and cancellation are single guarded UPDATEs
//! (`WHERE status = 'pending'`), so a request can never be resolved twice:
//! the second caller's statement matches zero rows and the first resolution's
//! fields are left untouched.

use anyhow::{Context, Result};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::{DecisionOption, DecisionRequest, DecisionStatus, DecisionUrgency};

/// Parameters for inserting a new decision request row.
#[derive(Debug, Clone)]
pub struct NewDecisionRequest {
    pub plan_id: Uuid,
    pub node_id: Option<Uuid>,
    pub requested_by: Uuid,
    pub title: String,
    pub context: Option<String>,
    pub options: Vec<DecisionOption>,
    pub urgency: DecisionUrgency,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub metadata: serde_json::Value,
}

/// Insert a new decision request. Returns the inserted row with
/// server-generated defaults (id, status, created_at).
pub async fn insert_decision_request(
    pool: &PgPool,
    new: &NewDecisionRequest,
) -> Result<DecisionRequest> {
    let request = sqlx::query_as::<_, DecisionRequest>(
        "INSERT INTO decision_requests \
             (plan_id, node_id, requested_by, title, context, options, urgency, expires_at, metadata) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         RETURNING *",
    )
    .bind(new.plan_id)
    .bind(new.node_id)
    .bind(new.requested_by)
    .bind(&new.title)
    .bind(&new.context)
    .bind(Json(&new.options))
    .bind(new.urgency)
    .bind(new.expires_at)
    .bind(&new.metadata)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert decision request {:?}", new.title))?;

    Ok(request)
}

/// Fetch a decision request by ID.
pub async fn get_decision_request(pool: &PgPool, id: Uuid) -> Result<Option<DecisionRequest>> {
    let request =
        sqlx::query_as::<_, DecisionRequest>("SELECT * FROM decision_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("failed to fetch decision request")?;

    Ok(request)
}

/// List decision requests for a plan, newest first, optionally filtered by
/// status and/or urgency.
pub async fn list_decision_requests(
    pool: &PgPool,
    plan_id: Uuid,
    status: Option<DecisionStatus>,
    urgency: Option<DecisionUrgency>,
) -> Result<Vec<DecisionRequest>> {
    let requests = sqlx::query_as::<_, DecisionRequest>(
        "SELECT * FROM decision_requests \
         WHERE plan_id = $1 \
           AND ($2::text IS NULL OR status = $2) \
           AND ($3::text IS NULL OR urgency = $3) \
         ORDER BY created_at DESC",
    )
    .bind(plan_id)
    .bind(status.map(|s| s.to_string()))
    .bind(urgency.map(|u| u.to_string()))
    .fetch_all(pool)
    .await
    .context("failed to list decision requests")?;

    Ok(requests)
}

/// Transition a pending request to `decided`, recording the resolver, the
/// decision text, the rationale, and the resolution time in one statement.
///
/// Returns `None` when the request is absent or no longer pending; the
/// caller distinguishes the two with a follow-up fetch.
pub async fn resolve_decision_request(
    pool: &PgPool,
    id: Uuid,
    resolved_by: Uuid,
    decision: &str,
    rationale: Option<&str>,
) -> Result<Option<DecisionRequest>> {
    let request = sqlx::query_as::<_, DecisionRequest>(
        "UPDATE decision_requests \
         SET status = 'decided', \
             resolved_by = $1, \
             decision = $2, \
             rationale = $3, \
             resolved_at = now() \
         WHERE id = $4 AND status = 'pending' \
         RETURNING *",
    )
    .bind(resolved_by)
    .bind(decision)
    .bind(rationale)
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to resolve decision request")?;

    Ok(request)
}

/// Transition a pending request to `cancelled`, merging the cancellation
/// reason into the existing metadata object. Preexisting metadata keys
/// survive; only `cancellation_reason` is added (or replaced).
pub async fn cancel_decision_request(
    pool: &PgPool,
    id: Uuid,
    reason: &str,
) -> Result<Option<DecisionRequest>> {
    let request = sqlx::query_as::<_, DecisionRequest>(
        "UPDATE decision_requests \
         SET status = 'cancelled', \
             resolved_at = now(), \
             metadata = metadata || jsonb_build_object('cancellation_reason', $1::text) \
         WHERE id = $2 AND status = 'pending' \
         RETURNING *",
    )
    .bind(reason)
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to cancel decision request")?;

    Ok(request)
}

/// Flip every pending request whose expiry time has passed to `expired`.
///
/// The core reports expiry lazily at read time; this sweep exists for
/// consumers that need the stored status to reflect it. Returns the number
/// of rows updated.
pub async fn expire_overdue_requests(pool: &PgPool, plan_id: Uuid) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE decision_requests \
         SET status = 'expired', resolved_at = now() \
         WHERE plan_id = $1 AND status = 'pending' \
           AND expires_at IS NOT NULL AND expires_at < now()",
    )
    .bind(plan_id)
    .execute(pool)
    .await
    .context("failed to expire overdue decision requests")?;

    Ok(result.rows_affected())
}
