//! # Memory Management
//!
//! Free-lists of auxiliary containers.
//!
//! Reactors build and tear down small sets constantly (group memberships,
//! children sets). Emptied containers go back to a per-reactor [`Pool`] and
//! are handed out again with their capacity intact.

mod pool;

pub use pool::{Pool, PoolStats, Recycle};
