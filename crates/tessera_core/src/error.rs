//! # Core Error Types
//!
//! Errors returned by world operations and configuration loading.

use thiserror::Error;

use crate::ecs::{ComponentKind, EntityId};

/// Errors that can occur in the entity world.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Every slot is occupied.
    #[error("world capacity exhausted: {capacity} entities")]
    CapacityExhausted {
        /// Configured capacity.
        capacity: usize,
    },

    /// The handle does not refer to a live entity.
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    /// The entity exists but lacks a component the operation needs.
    #[error("entity {entity} has no {} component", .kind.name())]
    MissingComponent {
        /// The entity that was addressed.
        entity: EntityId,
        /// The missing component kind.
        kind: ComponentKind,
    },

    /// A node was given a parent that is not a live entity.
    #[error("parent {0} is not a live entity")]
    ParentNotFound(EntityId),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    ConfigIo(#[from] std::io::Error),
}

/// Result type for world operations.
pub type CoreResult<T> = Result<T, CoreError>;
