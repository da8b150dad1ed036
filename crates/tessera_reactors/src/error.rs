//! # Reactor Error Types
//!
//! Lookup misses on reactor indexes. Stale events are not errors and never
//! surface here; broken internal bookkeeping panics instead.

use thiserror::Error;

/// Errors returned by reactor lookups.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReactorError {
    /// No group or binding exists for the key.
    #[error("key not found: {0}")]
    KeyNotFound(String),
}

impl ReactorError {
    pub(crate) fn key_not_found<K: std::fmt::Debug>(key: &K) -> Self {
        Self::KeyNotFound(format!("{key:?}"))
    }
}

/// Result type for reactor lookups.
pub type ReactorResult<T> = Result<T, ReactorError>;
