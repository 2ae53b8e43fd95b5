//! Access resolution: who may see or edit a plan, and at what role.
//!
//! Resolution is a strict priority chain, first match wins:
//!
//! ```text
//! 1. user is the plan's owner            -> owner
//! 2. explicit collaborator row           -> that row's role
//! 3. member of the plan's organization   -> viewer
//! 4. plan is public or unlisted          -> viewer
//! 5. otherwise                           -> none (denied)
//! ```
//!
//! Organization membership never grants edit rights implicitly. The resolver
//! has no side effects and is called fresh on every request; results are
//! never cached across requests.

use std::fmt;

use sqlx::PgPool;
use uuid::Uuid;

use trellis_db::models::{CollaboratorRole, Plan, Visibility};
use trellis_db::queries::collaborators;

use crate::error::{CoreError, Result};
use crate::events::{ChangeBus, ChangeEvent, ChangeKind};

/// Access level derived for a (plan, user) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Owner,
    Admin,
    Editor,
    Viewer,
    None,
}

impl Role {
    /// Roles permitted to create, update, and delete nodes and to resolve
    /// decision requests.
    pub fn can_edit(self) -> bool {
        matches!(self, Self::Owner | Self::Admin | Self::Editor)
    }

    /// Any role short of `None` may read.
    pub fn can_view(self) -> bool {
        self != Self::None
    }

    /// Roles permitted to manage collaborators and delete the plan itself.
    pub fn can_administer(self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Editor => "editor",
            Self::Viewer => "viewer",
            Self::None => "none",
        };
        f.write_str(s)
    }
}

impl From<CollaboratorRole> for Role {
    fn from(role: CollaboratorRole) -> Self {
        match role {
            CollaboratorRole::Viewer => Self::Viewer,
            CollaboratorRole::Editor => Self::Editor,
            CollaboratorRole::Admin => Self::Admin,
        }
    }
}

/// Outcome of access resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub allowed: bool,
    pub role: Role,
}

impl Access {
    fn granted(role: Role) -> Self {
        Self {
            allowed: true,
            role,
        }
    }

    fn denied() -> Self {
        Self {
            allowed: false,
            role: Role::None,
        }
    }
}

/// Resolve the access a user (or an anonymous caller) has to a plan.
///
/// `user = None` skips the owner, collaborator, and organization arms and
/// can only reach viewer access through public or unlisted visibility.
pub async fn resolve_access(pool: &PgPool, plan: &Plan, user: Option<Uuid>) -> Result<Access> {
    if let Some(user_id) = user {
        if user_id == plan.owner_id {
            return Ok(Access::granted(Role::Owner));
        }

        if let Some(row) = collaborators::get_collaborator(pool, plan.id, user_id).await? {
            return Ok(Access::granted(row.role.into()));
        }

        if let Some(org_id) = plan.organization_id {
            if collaborators::get_org_member(pool, org_id, user_id)
                .await?
                .is_some()
            {
                return Ok(Access::granted(Role::Viewer));
            }
        }
    }

    match plan.visibility {
        Visibility::Public | Visibility::Unlisted => Ok(Access::granted(Role::Viewer)),
        Visibility::Private => Ok(Access::denied()),
    }
}

/// Resolve access and fail with [`CoreError::Forbidden`] unless the caller
/// may read the plan. Returns the resolved role.
pub async fn require_view(pool: &PgPool, plan: &Plan, user: Option<Uuid>) -> Result<Role> {
    let access = resolve_access(pool, plan, user).await?;
    if !access.role.can_view() {
        return Err(CoreError::forbidden(format!(
            "no access to plan {}",
            plan.id
        )));
    }
    Ok(access.role)
}

/// Resolve access and fail with [`CoreError::Forbidden`] unless the caller
/// may edit the plan. Returns the resolved role.
pub async fn require_edit(pool: &PgPool, plan: &Plan, user: Option<Uuid>) -> Result<Role> {
    let access = resolve_access(pool, plan, user).await?;
    if !access.role.can_edit() {
        return Err(CoreError::forbidden(format!(
            "role {} cannot modify plan {}",
            access.role, plan.id
        )));
    }
    Ok(access.role)
}

/// Resolve access and fail unless the caller administers the plan
/// (owner or admin collaborator).
pub async fn require_admin(pool: &PgPool, plan: &Plan, user: Option<Uuid>) -> Result<Role> {
    let access = resolve_access(pool, plan, user).await?;
    if !access.role.can_administer() {
        return Err(CoreError::forbidden(format!(
            "role {} cannot administer plan {}",
            access.role, plan.id
        )));
    }
    Ok(access.role)
}

/// Grant a user a collaborator role on a plan, or change an existing grant.
/// Requires administer rights on the plan.
pub async fn add_collaborator(
    pool: &PgPool,
    bus: &ChangeBus,
    plan: &Plan,
    acting_user: Uuid,
    target_user: Uuid,
    role: CollaboratorRole,
) -> Result<()> {
    require_admin(pool, plan, Some(acting_user)).await?;

    collaborators::upsert_collaborator(pool, plan.id, target_user, role).await?;
    bus.publish(ChangeEvent::plan(
        plan.id,
        ChangeKind::CollaboratorChanged,
        Some(acting_user),
    ));
    Ok(())
}

/// Revoke a user's collaborator grant. Requires administer rights.
pub async fn remove_collaborator(
    pool: &PgPool,
    bus: &ChangeBus,
    plan: &Plan,
    acting_user: Uuid,
    target_user: Uuid,
) -> Result<()> {
    require_admin(pool, plan, Some(acting_user)).await?;

    let removed = collaborators::remove_collaborator(pool, plan.id, target_user).await?;
    if removed == 0 {
        return Err(CoreError::not_found("collaborator", target_user));
    }
    bus.publish(ChangeEvent::plan(
        plan.id,
        ChangeKind::CollaboratorChanged,
        Some(acting_user),
    ));
    Ok(())
}
