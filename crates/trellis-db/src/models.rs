use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Status of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Draft,
    Active,
    Completed,
    Archived,
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Archived => "archived",
        };
        f.write_str(s)
    }
}

impl FromStr for PlanStatus {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "archived" => Ok(Self::Archived),
            other => Err(EnumParseError::new("plan status", other)),
        }
    }
}

// ---------------------------------------------------------------------------

/// Who can see a plan without an explicit grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Private,
    Public,
    Unlisted,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Private => "private",
            Self::Public => "public",
            Self::Unlisted => "unlisted",
        };
        f.write_str(s)
    }
}

impl FromStr for Visibility {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Self::Private),
            "public" => Ok(Self::Public),
            "unlisted" => Ok(Self::Unlisted),
            other => Err(EnumParseError::new("visibility", other)),
        }
    }
}

// ---------------------------------------------------------------------------

/// Kind of a node in a plan tree.
///
/// Exactly one node per plan has kind `root`; it is created together with the
/// plan and can never be deleted or retyped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Root,
    Phase,
    Task,
    Milestone,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Root => "root",
            Self::Phase => "phase",
            Self::Task => "task",
            Self::Milestone => "milestone",
        };
        f.write_str(s)
    }
}

impl FromStr for NodeType {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "root" => Ok(Self::Root),
            "phase" => Ok(Self::Phase),
            "task" => Ok(Self::Task),
            "milestone" => Ok(Self::Milestone),
            other => Err(EnumParseError::new("node type", other)),
        }
    }
}

// ---------------------------------------------------------------------------

/// Progress status of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    NotStarted,
    InProgress,
    Completed,
    Blocked,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
        };
        f.write_str(s)
    }
}

impl FromStr for NodeStatus {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(Self::NotStarted),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "blocked" => Ok(Self::Blocked),
            other => Err(EnumParseError::new("node status", other)),
        }
    }
}

// ---------------------------------------------------------------------------

/// Role granted to an explicit plan collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CollaboratorRole {
    Viewer,
    Editor,
    Admin,
}

impl fmt::Display for CollaboratorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Viewer => "viewer",
            Self::Editor => "editor",
            Self::Admin => "admin",
        };
        f.write_str(s)
    }
}

impl FromStr for CollaboratorRole {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "viewer" => Ok(Self::Viewer),
            "editor" => Ok(Self::Editor),
            "admin" => Ok(Self::Admin),
            other => Err(EnumParseError::new("collaborator role", other)),
        }
    }
}

// ---------------------------------------------------------------------------

/// Role of a user within an organization.
///
/// Organization membership grants read access to the organization's plans;
/// it never implies edit rights on a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrgRole {
    Owner,
    Admin,
    Member,
}

impl fmt::Display for OrgRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
        };
        f.write_str(s)
    }
}

impl FromStr for OrgRole {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Self::Owner),
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            other => Err(EnumParseError::new("organization role", other)),
        }
    }
}

// ---------------------------------------------------------------------------

/// How urgent a decision request is for the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DecisionUrgency {
    Blocking,
    CanContinue,
    Informational,
}

impl fmt::Display for DecisionUrgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Blocking => "blocking",
            Self::CanContinue => "can_continue",
            Self::Informational => "informational",
        };
        f.write_str(s)
    }
}

impl FromStr for DecisionUrgency {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blocking" => Ok(Self::Blocking),
            "can_continue" => Ok(Self::CanContinue),
            "informational" => Ok(Self::Informational),
            other => Err(EnumParseError::new("decision urgency", other)),
        }
    }
}

// ---------------------------------------------------------------------------

/// Lifecycle state of a decision request.
///
/// `pending` is the only non-terminal state; a request transitions exactly
/// once into `decided`, `cancelled`, or `expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Pending,
    Decided,
    Expired,
    Cancelled,
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Decided => "decided",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl FromStr for DecisionStatus {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "decided" => Ok(Self::Decided),
            "expired" => Ok(Self::Expired),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(EnumParseError::new("decision status", other)),
        }
    }
}

// ---------------------------------------------------------------------------

/// Error returned when parsing an invalid enum string.
#[derive(Debug, Clone)]
pub struct EnumParseError {
    kind: &'static str,
    value: String,
}

impl EnumParseError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}

impl fmt::Display for EnumParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {:?}", self.kind, self.value)
    }
}

impl std::error::Error for EnumParseError {}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A plan -- the top-level collaborative planning document.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub owner_id: Uuid,
    pub status: PlanStatus,
    pub visibility: Visibility,
    pub organization_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A node in a plan's tree: the root, a phase, a task, or a milestone.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Node {
    pub id: Uuid,
    pub plan_id: Uuid,
    /// `None` only for the plan's single root node.
    pub parent_id: Option<Uuid>,
    pub node_type: NodeType,
    pub title: String,
    pub status: NodeStatus,
    /// Position among siblings; unique per sibling set, >= 0.
    pub order_index: i32,
    pub due_date: Option<DateTime<Utc>>,
    pub context: Option<String>,
    pub agent_instructions: Option<String>,
    pub agent_request_kind: Option<String>,
    pub agent_request_message: Option<String>,
    pub agent_requested_by: Option<Uuid>,
    pub agent_requested_at: Option<DateTime<Utc>>,
    pub assigned_to: Option<Uuid>,
    pub assigned_by: Option<Uuid>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An explicit per-plan access grant. At most one row per (plan, user);
/// re-adding a collaborator updates the role in place.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Collaborator {
    pub plan_id: Uuid,
    pub user_id: Uuid,
    pub role: CollaboratorRole,
    pub added_at: DateTime<Utc>,
}

/// Membership of a user in an organization.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrganizationMember {
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub role: OrgRole,
    pub added_at: DateTime<Utc>,
}

/// One selectable option attached to a decision request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionOption {
    pub label: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pros: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cons: Vec<String>,
    #[serde(default)]
    pub recommended: bool,
}

impl DecisionOption {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            pros: Vec::new(),
            cons: Vec::new(),
            recommended: false,
        }
    }
}

/// A structured ask-for-input scoped to a plan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DecisionRequest {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub node_id: Option<Uuid>,
    pub requested_by: Uuid,
    pub title: String,
    pub context: Option<String>,
    pub options: Json<Vec<DecisionOption>>,
    pub urgency: DecisionUrgency,
    pub status: DecisionStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<Uuid>,
    pub decision: Option<String>,
    pub rationale: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_status_display_roundtrip() {
        let variants = [
            PlanStatus::Draft,
            PlanStatus::Active,
            PlanStatus::Completed,
            PlanStatus::Archived,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: PlanStatus = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn plan_status_invalid() {
        let result = "bogus".parse::<PlanStatus>();
        assert!(result.is_err());
    }

    #[test]
    fn visibility_display_roundtrip() {
        let variants = [Visibility::Private, Visibility::Public, Visibility::Unlisted];
        for v in &variants {
            let s = v.to_string();
            let parsed: Visibility = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn node_type_display_roundtrip() {
        let variants = [
            NodeType::Root,
            NodeType::Phase,
            NodeType::Task,
            NodeType::Milestone,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: NodeType = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn node_status_display_roundtrip() {
        let variants = [
            NodeStatus::NotStarted,
            NodeStatus::InProgress,
            NodeStatus::Completed,
            NodeStatus::Blocked,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: NodeStatus = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn node_status_invalid() {
        let result = "paused".parse::<NodeStatus>();
        assert!(result.is_err());
    }

    #[test]
    fn collaborator_role_display_roundtrip() {
        let variants = [
            CollaboratorRole::Viewer,
            CollaboratorRole::Editor,
            CollaboratorRole::Admin,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: CollaboratorRole = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn org_role_display_roundtrip() {
        let variants = [OrgRole::Owner, OrgRole::Admin, OrgRole::Member];
        for v in &variants {
            let s = v.to_string();
            let parsed: OrgRole = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn decision_urgency_display_roundtrip() {
        let variants = [
            DecisionUrgency::Blocking,
            DecisionUrgency::CanContinue,
            DecisionUrgency::Informational,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: DecisionUrgency = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn decision_status_display_roundtrip() {
        let variants = [
            DecisionStatus::Pending,
            DecisionStatus::Decided,
            DecisionStatus::Expired,
            DecisionStatus::Cancelled,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: DecisionStatus = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn decision_status_invalid() {
        let result = "open".parse::<DecisionStatus>();
        assert!(result.is_err());
    }

    #[test]
    fn decision_option_serde_defaults() {
        let opt: DecisionOption = serde_json::from_str(r#"{"label":"ship it"}"#).unwrap();
        assert_eq!(opt.label, "ship it");
        assert!(opt.pros.is_empty());
        assert!(opt.cons.is_empty());
        assert!(!opt.recommended);
    }
}
