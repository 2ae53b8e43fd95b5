//! Query functions grouped by table.

pub mod collaborators;
pub mod decisions;
pub mod nodes;
pub mod plans;
