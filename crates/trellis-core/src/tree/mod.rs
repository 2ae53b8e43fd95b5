//! Plan tree orchestration: plan bootstrap and deletion, node CRUD,
//! reordering, reparenting, and tree materialization, all behind access
//! checks.

mod service;

pub use service::{CreatePlan, NewNodeSpec, PlanTreeService, ResolvedParent};
