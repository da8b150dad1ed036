//! # Component System
//!
//! The world knows a closed set of component kinds. Reactors subscribe to
//! them through [`Matcher`](super::Matcher)s; there is no runtime type
//! registry.
//!
//! | Kind    | Data          | Carried by                          |
//! |---------|---------------|-------------------------------------|
//! | `Key`   | a `K` value   | entities that are grouped or mapped |
//! | `Node`  | [`Node`]      | hierarchy members                   |
//! | `Group` | a `K` value   | aggregation representatives         |
//!
//! Key values only hold the current value. Changes are announced with a
//! [`WorldEvent::KeyChanged`](crate::WorldEvent::KeyChanged) carrying both
//! the previous and the current value.

use std::fmt::Debug;
use std::hash::Hash;

use super::entity::EntityId;

/// Closed enumeration of matchable component kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ComponentKind {
    /// Equality key used by aggregation and mapping.
    Key = 0,
    /// Parent link and self-enabled flag.
    Node = 1,
    /// Marks an aggregation representative.
    Group = 2,
}

impl ComponentKind {
    /// Bit for this kind inside a [`Signature`](super::Signature).
    #[inline]
    #[must_use]
    pub const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    /// Human-readable name, used in errors and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Key => "Key",
            Self::Node => "Node",
            Self::Group => "Group",
        }
    }
}

/// Bound for values stored in `Key` and `Group` components.
pub trait EntityKey: Clone + Eq + Hash + Debug + 'static {}

impl<T: Clone + Eq + Hash + Debug + 'static> EntityKey for T {}

/// Hierarchy node component.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Node {
    /// Parent entity, `None` for roots.
    pub parent: Option<EntityId>,
    /// Whether this node itself is enabled, ignoring its ancestors.
    pub self_enabled: bool,
}

impl Node {
    /// Enabled root node.
    #[must_use]
    pub const fn root() -> Self {
        Self {
            parent: None,
            self_enabled: true,
        }
    }

    /// Enabled node under `parent`.
    #[must_use]
    pub const fn child_of(parent: EntityId) -> Self {
        Self {
            parent: Some(parent),
            self_enabled: true,
        }
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::root()
    }
}

/// Component bundle for [`World::create`](super::World::create).
#[derive(Clone, Debug)]
pub struct EntityBuilder<K> {
    pub(crate) key: Option<K>,
    pub(crate) node: Option<Node>,
    pub(crate) group: Option<K>,
}

impl<K: EntityKey> EntityBuilder<K> {
    /// Empty bundle.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            key: None,
            node: None,
            group: None,
        }
    }

    /// Attaches a `Key` component holding `key`.
    #[must_use]
    pub fn with_key(mut self, key: K) -> Self {
        self.key = Some(key);
        self
    }

    /// Attaches a [`Node`] component.
    #[must_use]
    pub fn with_node(mut self, node: Node) -> Self {
        self.node = Some(node);
        self
    }

    /// Attaches an enabled root [`Node`].
    #[must_use]
    pub fn root(self) -> Self {
        self.with_node(Node::root())
    }

    /// Attaches an enabled [`Node`] under `parent`.
    #[must_use]
    pub fn child_of(self, parent: EntityId) -> Self {
        self.with_node(Node::child_of(parent))
    }

    /// Attaches a `Group` component. Only aggregation representatives carry
    /// one; the value is the group key.
    #[must_use]
    pub fn with_group(mut self, id: K) -> Self {
        self.group = Some(id);
        self
    }

    /// Key the entity will carry, if any.
    #[must_use]
    pub fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }

    /// Signature of the bundle.
    #[must_use]
    pub fn signature(&self) -> super::Signature {
        let mut sig = super::Signature::EMPTY;
        if self.key.is_some() {
            sig = sig.with(ComponentKind::Key);
        }
        if self.node.is_some() {
            sig = sig.with(ComponentKind::Node);
        }
        if self.group.is_some() {
            sig = sig.with(ComponentKind::Group);
        }
        sig
    }
}

impl<K: EntityKey> Default for EntityBuilder<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_bits_are_distinct() {
        let bits = [ComponentKind::Key, ComponentKind::Node, ComponentKind::Group].map(ComponentKind::bit);
        assert_eq!(bits, [1, 2, 4]);
    }

    #[test]
    fn test_builder_signature() {
        let builder = EntityBuilder::<u32>::new().with_key(3).root();
        let sig = builder.signature();
        assert!(sig.contains(ComponentKind::Key));
        assert!(sig.contains(ComponentKind::Node));
        assert!(!sig.contains(ComponentKind::Group));
        assert!(EntityBuilder::<u32>::new().signature().is_empty());
    }

    #[test]
    fn test_node_constructors() {
        let parent = EntityId::new(1, 0);
        assert_eq!(Node::default(), Node::root());
        assert_eq!(Node::child_of(parent).parent, Some(parent));
        assert!(Node::child_of(parent).self_enabled);
    }
}
