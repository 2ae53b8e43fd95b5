//! Database query functions for the `plan_collaborators` and
//! `organization_members` tables.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Collaborator, CollaboratorRole, OrgRole, OrganizationMember};

/// Add a collaborator to a plan, or update the role if the (plan, user) pair
/// already exists. Re-adding never duplicates the row.
pub async fn upsert_collaborator(
    pool: &PgPool,
    plan_id: Uuid,
    user_id: Uuid,
    role: CollaboratorRole,
) -> Result<Collaborator> {
    let collaborator = sqlx::query_as::<_, Collaborator>(
        "INSERT INTO plan_collaborators (plan_id, user_id, role) VALUES ($1, $2, $3) \
         ON CONFLICT (plan_id, user_id) DO UPDATE SET role = EXCLUDED.role \
         RETURNING *",
    )
    .bind(plan_id)
    .bind(user_id)
    .bind(role)
    .fetch_one(pool)
    .await
    .context("failed to upsert collaborator")?;

    Ok(collaborator)
}

/// Fetch the collaborator row for a (plan, user) pair, if any.
pub async fn get_collaborator(
    pool: &PgPool,
    plan_id: Uuid,
    user_id: Uuid,
) -> Result<Option<Collaborator>> {
    let collaborator = sqlx::query_as::<_, Collaborator>(
        "SELECT * FROM plan_collaborators WHERE plan_id = $1 AND user_id = $2",
    )
    .bind(plan_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch collaborator")?;

    Ok(collaborator)
}

/// List all collaborators on a plan, oldest grant first.
pub async fn list_collaborators(pool: &PgPool, plan_id: Uuid) -> Result<Vec<Collaborator>> {
    let collaborators = sqlx::query_as::<_, Collaborator>(
        "SELECT * FROM plan_collaborators WHERE plan_id = $1 ORDER BY added_at ASC",
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await
    .context("failed to list collaborators")?;

    Ok(collaborators)
}

/// Remove a collaborator from a plan. Returns the number of rows removed.
pub async fn remove_collaborator(pool: &PgPool, plan_id: Uuid, user_id: Uuid) -> Result<u64> {
    let result =
        sqlx::query("DELETE FROM plan_collaborators WHERE plan_id = $1 AND user_id = $2")
            .bind(plan_id)
            .bind(user_id)
            .execute(pool)
            .await
            .context("failed to remove collaborator")?;

    Ok(result.rows_affected())
}

/// Add a user to an organization, or update the role if already a member.
pub async fn upsert_org_member(
    pool: &PgPool,
    organization_id: Uuid,
    user_id: Uuid,
    role: OrgRole,
) -> Result<OrganizationMember> {
    let member = sqlx::query_as::<_, OrganizationMember>(
        "INSERT INTO organization_members (organization_id, user_id, role) VALUES ($1, $2, $3) \
         ON CONFLICT (organization_id, user_id) DO UPDATE SET role = EXCLUDED.role \
         RETURNING *",
    )
    .bind(organization_id)
    .bind(user_id)
    .bind(role)
    .fetch_one(pool)
    .await
    .context("failed to upsert organization member")?;

    Ok(member)
}

/// Fetch a user's membership in an organization, if any.
pub async fn get_org_member(
    pool: &PgPool,
    organization_id: Uuid,
    user_id: Uuid,
) -> Result<Option<OrganizationMember>> {
    let member = sqlx::query_as::<_, OrganizationMember>(
        "SELECT * FROM organization_members WHERE organization_id = $1 AND user_id = $2",
    )
    .bind(organization_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch organization member")?;

    Ok(member)
}
