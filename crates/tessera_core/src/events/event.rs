//! # World Events
//!
//! Every event is addressed to a target entity. Commands (key, parent and
//! enabled-flag changes) are addressed to the entity they modified; derived
//! events are addressed to the group representative or hierarchy node whose
//! index state changed.

use crate::ecs::EntityId;

/// Events delivered through the [`Dispatcher`](super::Dispatcher).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorldEvent<K> {
    // =========================================================================
    // Commands (World → reactors)
    // =========================================================================
    /// The target's key was overwritten.
    KeyChanged {
        /// Value before the write.
        previous: K,
        /// Value after the write.
        current: K,
    },

    /// The target's parent link was overwritten.
    ParentChanged {
        /// Parent before the write.
        previous: Option<EntityId>,
        /// Parent after the write.
        current: Option<EntityId>,
    },

    /// The target's self-enabled flag was written.
    SelfEnabledChanged {
        /// New flag value.
        enabled: bool,
    },

    // =========================================================================
    // Aggregation (Aggregator → consumers, addressed to the representative)
    // =========================================================================
    /// An entity joined the group.
    EntityAdded {
        /// The member that joined.
        entity: EntityId,
    },

    /// An entity left the group.
    EntityRemoved {
        /// The member that left.
        entity: EntityId,
    },

    // =========================================================================
    // Hierarchy (Hierarchy → consumers, addressed to the node)
    // =========================================================================
    /// A child was attached to the target.
    ChildAdded {
        /// The attached child.
        child: EntityId,
    },

    /// A child was detached from the target.
    ChildRemoved {
        /// The detached child.
        child: EntityId,
    },

    /// The target's effective enabled state flipped.
    EnabledChanged {
        /// New effective state.
        enabled: bool,
    },
}

/// Discriminant of [`WorldEvent`], used to route listeners.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`WorldEvent::KeyChanged`]
    KeyChanged,
    /// [`WorldEvent::ParentChanged`]
    ParentChanged,
    /// [`WorldEvent::SelfEnabledChanged`]
    SelfEnabledChanged,
    /// [`WorldEvent::EntityAdded`]
    EntityAdded,
    /// [`WorldEvent::EntityRemoved`]
    EntityRemoved,
    /// [`WorldEvent::ChildAdded`]
    ChildAdded,
    /// [`WorldEvent::ChildRemoved`]
    ChildRemoved,
    /// [`WorldEvent::EnabledChanged`]
    EnabledChanged,
}

impl<K> WorldEvent<K> {
    /// Returns the routing kind of this event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::KeyChanged { .. } => EventKind::KeyChanged,
            Self::ParentChanged { .. } => EventKind::ParentChanged,
            Self::SelfEnabledChanged { .. } => EventKind::SelfEnabledChanged,
            Self::EntityAdded { .. } => EventKind::EntityAdded,
            Self::EntityRemoved { .. } => EventKind::EntityRemoved,
            Self::ChildAdded { .. } => EventKind::ChildAdded,
            Self::ChildRemoved { .. } => EventKind::ChildRemoved,
            Self::EnabledChanged { .. } => EventKind::EnabledChanged,
        }
    }
}
