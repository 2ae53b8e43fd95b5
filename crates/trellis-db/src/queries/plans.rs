//! Database query functions for the `plans` table.
//!
//! Plan creation is not exposed here as a bare insert: a plan and its root
//! node are created atomically, so the bootstrap transaction lives in the
//! tree service (`trellis-core`). This module covers lookups and updates.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Plan, PlanStatus, Visibility};

/// Fetch a plan by its ID.
pub async fn get_plan(pool: &PgPool, id: Uuid) -> Result<Option<Plan>> {
    let plan = sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch plan")?;

    Ok(plan)
}

/// List all plans owned by a user, newest first.
pub async fn list_plans_for_owner(pool: &PgPool, owner_id: Uuid) -> Result<Vec<Plan>> {
    let plans =
        sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE owner_id = $1 ORDER BY created_at DESC")
            .bind(owner_id)
            .fetch_all(pool)
            .await
            .context("failed to list plans")?;

    Ok(plans)
}

/// Update the status of a plan.
pub async fn update_plan_status(pool: &PgPool, id: Uuid, status: PlanStatus) -> Result<()> {
    let result = sqlx::query("UPDATE plans SET status = $1, updated_at = now() WHERE id = $2")
        .bind(status)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to update plan status")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("plan {id} not found");
    }

    Ok(())
}

/// Update the visibility of a plan.
pub async fn update_plan_visibility(pool: &PgPool, id: Uuid, visibility: Visibility) -> Result<()> {
    let result = sqlx::query("UPDATE plans SET visibility = $1, updated_at = now() WHERE id = $2")
        .bind(visibility)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to update plan visibility")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("plan {id} not found");
    }

    Ok(())
}

/// Update the title and/or description of a plan. `None` leaves the current
/// value in place.
pub async fn update_plan_details(
    pool: &PgPool,
    id: Uuid,
    title: Option<&str>,
    description: Option<&str>,
) -> Result<Plan> {
    let plan = sqlx::query_as::<_, Plan>(
        "UPDATE plans \
         SET title = COALESCE($1, title), \
             description = COALESCE($2, description), \
             updated_at = now() \
         WHERE id = $3 \
         RETURNING *",
    )
    .bind(title)
    .bind(description)
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to update plan details")?;

    match plan {
        Some(p) => Ok(p),
        None => anyhow::bail!("plan {id} not found"),
    }
}

/// Delete a plan row. Nodes, collaborators, and decision requests go with it
/// via `ON DELETE CASCADE`. Returns the number of rows deleted (0 or 1).
pub async fn delete_plan(pool: &PgPool, id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM plans WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("failed to delete plan")?;

    Ok(result.rows_affected())
}
