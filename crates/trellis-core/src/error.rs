//! Typed failure taxonomy returned by every core operation.
//!
//! The calling layer translates these into transport-level responses; the
//! core never collapses an access or not-found failure into a generic error.

use thiserror::Error;
use uuid::Uuid;

/// Result alias used across the core.
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

/// Errors produced by the access resolver, tree service, and decision
/// workflow.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A plan, node, or decision request is absent, or a node was addressed
    /// through a plan it does not belong to.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: Uuid },

    /// Access resolved to a role insufficient for the requested operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The operation is not valid for the object's current state, e.g.
    /// resolving an already-terminal decision request or retyping a root
    /// node.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Malformed or rejected input, e.g. a move that would create a cycle
    /// or an over-long option list.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Reserved for concurrent-modification conflicts surfaced to callers.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An underlying storage failure, carried through unchanged.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl CoreError {
    pub fn not_found(kind: &'static str, id: Uuid) -> Self {
        Self::NotFound { kind, id }
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
