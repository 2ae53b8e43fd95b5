//! Persistence layer for trellis: connection pooling, embedded migrations,
//! row models, and query functions for plans, nodes, collaborators, and
//! decision requests.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
pub mod tree;
