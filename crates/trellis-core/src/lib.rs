//! Core business layer for trellis: access resolution, invariant-preserving
//! plan-tree manipulation, and the decision-request workflow.
//!
//! Every mutating entry point resolves access first (see [`access`]); the
//! storage primitives live in `trellis-db`. The transport layer (HTTP,
//! commands, websockets) sits above this crate and translates [`CoreError`]
//! values into wire responses.

pub mod access;
pub mod decision;
pub mod error;
pub mod events;
pub mod tree;

pub use error::{CoreError, Result};
