//! # Hierarchy
//!
//! Parent/children adjacency over every entity carrying a `Node` component,
//! plus each node's effective enabled state: its own flag and'ed with its
//! parent's effective state (roots only consult their own flag).
//!
//! ## Propagation
//!
//! A parent or flag change recomputes the node's effective state and walks
//! down the subtree, stopping at every node whose stored state already
//! equals the recomputed one. Recursion follows the call stack, so depth is
//! bounded by tree depth. The whole subtree is stored first; each node that
//! flipped then receives [`WorldEvent::EnabledChanged`], parents before
//! children, so listeners always read settled state.
//!
//! ## Teardown
//!
//! Removing a node detaches it from its parent (or the root set) and destroys
//! every descendant. Children sets are pooled; a node has one only while it
//! has children.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tessera_core::{
    ComponentKind, EntityId, EntityKey, EventKind, Matcher, Pool, PoolStats, ReactorConfig, World,
    WorldEvent,
};
use tracing::{debug, trace, warn};

use crate::harness::{Reactor, ReactorHarness};

#[derive(Debug)]
struct NodeState {
    parent: Option<EntityId>,
    enabled: bool,
    children: Option<HashSet<EntityId>>,
}

/// Tree index with cascading enabled state.
#[derive(Debug, Default)]
pub struct Hierarchy {
    harness: ReactorHarness,
    nodes: RefCell<HashMap<EntityId, NodeState>>,
    roots: RefCell<HashSet<EntityId>>,
    /// Children seen before their parent during replay, by parent.
    awaiting_parent: RefCell<HashMap<EntityId, Vec<EntityId>>>,
    children_pool: RefCell<Pool<HashSet<EntityId>>>,
    scratch: RefCell<Pool<Vec<EntityId>>>,
}

impl Hierarchy {
    /// Creates an inactive hierarchy.
    #[must_use]
    pub fn new() -> Rc<Self> {
        Self::with_config(&ReactorConfig::default())
    }

    /// Creates an inactive hierarchy, pre-building children sets.
    #[must_use]
    pub fn with_config(config: &ReactorConfig) -> Rc<Self> {
        Rc::new(Self {
            children_pool: RefCell::new(Pool::with_prealloc(config.children_pool_prealloc)),
            ..Self::default()
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Nodes without a parent, in no particular order.
    #[must_use]
    pub fn roots(&self) -> Vec<EntityId> {
        self.roots.borrow().iter().copied().collect()
    }

    /// Whether `entity` is an indexed root.
    #[must_use]
    pub fn is_root(&self, entity: EntityId) -> bool {
        self.roots.borrow().contains(&entity)
    }

    /// Direct children of `entity`, in no particular order.
    #[must_use]
    pub fn children(&self, entity: EntityId) -> Vec<EntityId> {
        self.nodes
            .borrow()
            .get(&entity)
            .and_then(|node| node.children.as_ref())
            .map(|children| children.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of direct children of `entity`.
    #[must_use]
    pub fn child_count(&self, entity: EntityId) -> usize {
        self.nodes
            .borrow()
            .get(&entity)
            .and_then(|node| node.children.as_ref())
            .map_or(0, HashSet::len)
    }

    /// Indexed parent of `entity`.
    #[must_use]
    pub fn parent(&self, entity: EntityId) -> Option<EntityId> {
        self.nodes.borrow().get(&entity).and_then(|node| node.parent)
    }

    /// Effective enabled state of `entity`. `false` for unknown entities.
    #[must_use]
    pub fn is_enabled(&self, entity: EntityId) -> bool {
        self.nodes.borrow().get(&entity).is_some_and(|node| node.enabled)
    }

    /// Whether `entity` is indexed.
    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.nodes.borrow().contains_key(&entity)
    }

    /// Number of indexed nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    /// Whether no node is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.borrow().is_empty()
    }

    /// Traffic counters of the children set pool.
    #[must_use]
    pub fn pool_stats(&self) -> PoolStats {
        self.children_pool.borrow().stats()
    }

    /// Children sets waiting in the pool.
    #[must_use]
    pub fn pooled_sets(&self) -> usize {
        self.children_pool.borrow().pooled()
    }

    // =========================================================================
    // Structure
    // =========================================================================

    fn attach<K: EntityKey>(&self, world: &World<K>, parent: EntityId, child: EntityId) {
        let attached = {
            let mut nodes = self.nodes.borrow_mut();
            match nodes.get_mut(&parent) {
                Some(node) => {
                    node.children
                        .get_or_insert_with(|| self.children_pool.borrow_mut().acquire())
                        .insert(child);
                    true
                }
                None => false,
            }
        };

        if attached {
            world.send(parent, WorldEvent::ChildAdded { child });
        } else {
            self.awaiting_parent
                .borrow_mut()
                .entry(parent)
                .or_default()
                .push(child);
        }
    }

    fn detach<K: EntityKey>(&self, world: &World<K>, parent: EntityId, child: EntityId) {
        let emptied = {
            let mut nodes = self.nodes.borrow_mut();
            let Some(node) = nodes.get_mut(&parent) else {
                // Parent unknown: either torn down already or not replayed yet.
                if let Some(waiting) = self.awaiting_parent.borrow_mut().get_mut(&parent) {
                    waiting.retain(|&entity| entity != child);
                }
                return;
            };
            let removed = node.children.as_mut().is_some_and(|children| children.remove(&child));
            assert!(removed, "node {child} is missing from the children of {parent}");
            if node.children.as_ref().is_some_and(HashSet::is_empty) {
                node.children.take()
            } else {
                None
            }
        };

        if let Some(children) = emptied {
            self.children_pool.borrow_mut().release(children);
        }
        world.send(parent, WorldEvent::ChildRemoved { child });
    }

    // =========================================================================
    // Enabled state
    // =========================================================================

    /// Effective state a child of `parent` inherits. Unindexed ancestors are
    /// resolved through the world's node chain; a dead link ends the chain.
    fn inherited<K: EntityKey>(&self, world: &World<K>, parent: Option<EntityId>) -> bool {
        let mut current = parent;
        let mut steps = 0;
        while let Some(id) = current {
            if let Some(node) = self.nodes.borrow().get(&id) {
                return node.enabled;
            }
            let Some(node) = world.node(id) else {
                return true;
            };
            if !node.self_enabled {
                return false;
            }
            steps += 1;
            if steps > world.capacity() {
                warn!(entity = %id, "parent chain does not terminate");
                return true;
            }
            current = node.parent;
        }
        true
    }

    fn self_enabled<K: EntityKey>(world: &World<K>, entity: EntityId) -> bool {
        world.node(entity).is_some_and(|node| node.self_enabled)
    }

    /// Stores `enabled` and reports whether it differed.
    fn store_enabled(&self, entity: EntityId, enabled: bool) -> bool {
        self.nodes.borrow_mut().get_mut(&entity).is_some_and(|node| {
            let flipped = node.enabled != enabled;
            node.enabled = enabled;
            flipped
        })
    }

    /// Stores the subtree's new state, then announces every flipped node.
    /// Every node that flips below a consistent parent takes the parent's new
    /// value, so one `enabled` describes the whole batch.
    fn propagate<K: EntityKey>(&self, world: &World<K>, entity: EntityId, enabled: bool) {
        let mut flipped = self.scratch.borrow_mut().acquire();
        self.settle(world, entity, enabled, &mut flipped);
        for &node in &flipped {
            world.send(node, WorldEvent::EnabledChanged { enabled });
        }
        self.scratch.borrow_mut().release(flipped);
    }

    /// Recursive half of [`propagate`](Self::propagate). Records flipped
    /// nodes in pre-order.
    fn settle<K: EntityKey>(&self, world: &World<K>, entity: EntityId, enabled: bool, flipped: &mut Vec<EntityId>) {
        if !self.store_enabled(entity, enabled) {
            return;
        }
        flipped.push(entity);

        let mut children = self.scratch.borrow_mut().acquire();
        if let Some(set) = self.nodes.borrow().get(&entity).and_then(|node| node.children.as_ref()) {
            children.extend(set.iter().copied());
        }
        for &child in &children {
            self.settle(world, child, enabled && Self::self_enabled(world, child), flipped);
        }
        self.scratch.borrow_mut().release(children);
    }

    // =========================================================================
    // Commands
    // =========================================================================

    fn on_parent_changed<K: EntityKey>(&self, world: &World<K>, entity: EntityId, event: &WorldEvent<K>) {
        let WorldEvent::ParentChanged { current, .. } = *event else {
            return;
        };
        // The stored link is authoritative: a dangling parent was indexed as a root.
        let Some(stored) = self.nodes.borrow().get(&entity).map(|node| node.parent) else {
            trace!(%entity, "ignored parent change of unindexed entity");
            return;
        };

        match stored {
            Some(previous) => self.detach(world, previous, entity),
            None => {
                self.roots.borrow_mut().remove(&entity);
            }
        }
        if let Some(node) = self.nodes.borrow_mut().get_mut(&entity) {
            node.parent = current;
        }
        match current {
            Some(parent) => self.attach(world, parent, entity),
            None => {
                self.roots.borrow_mut().insert(entity);
            }
        }

        let enabled = Self::self_enabled(world, entity) && self.inherited(world, current);
        self.propagate(world, entity, enabled);
    }

    fn on_self_enabled_changed<K: EntityKey>(&self, world: &World<K>, entity: EntityId, event: &WorldEvent<K>) {
        let WorldEvent::SelfEnabledChanged { enabled } = *event else {
            return;
        };
        let Some(parent) = self.nodes.borrow().get(&entity).map(|node| node.parent) else {
            return;
        };
        let enabled = enabled && self.inherited(world, parent);
        self.propagate(world, entity, enabled);
    }
}

impl<K: EntityKey> Reactor<K> for Hierarchy {
    fn matcher(&self) -> Matcher {
        Matcher::of(ComponentKind::Node)
    }

    fn harness(&self) -> &ReactorHarness {
        &self.harness
    }

    fn on_entity_added(&self, world: &World<K>, entity: EntityId) {
        let Some(node) = world.node(entity) else {
            panic!("entity {entity} reached the hierarchy without a node");
        };
        let parent = node.parent.filter(|&parent| {
            let live = world.is_alive(parent) || self.contains(parent);
            if !live {
                warn!(%entity, %parent, "parent is gone, indexing node as a root");
            }
            live
        });

        let enabled = node.self_enabled && self.inherited(world, parent);
        self.nodes.borrow_mut().insert(
            entity,
            NodeState {
                parent,
                enabled,
                children: None,
            },
        );

        match parent {
            Some(parent) => self.attach(world, parent, entity),
            None => {
                self.roots.borrow_mut().insert(entity);
            }
        }

        let waiting = self.awaiting_parent.borrow_mut().remove(&entity);
        for child in waiting.into_iter().flatten() {
            if self.parent(child) == Some(entity) {
                self.attach(world, entity, child);
            }
        }
    }

    fn on_entity_removed(&self, world: &World<K>, entity: EntityId) {
        let Some(node) = self.nodes.borrow_mut().remove(&entity) else {
            return;
        };
        self.awaiting_parent.borrow_mut().remove(&entity);

        match node.parent {
            Some(parent) => self.detach(world, parent, entity),
            None => {
                self.roots.borrow_mut().remove(&entity);
            }
        }

        if let Some(mut children) = node.children {
            debug!(%entity, children = children.len(), "tearing down subtree");
            for child in children.drain() {
                world.destroy(child);
            }
            self.children_pool.borrow_mut().release(children);
        }
    }

    fn on_activate(this: &Rc<Self>, world: &World<K>) {
        this.harness
            .listen(this, world, EventKind::ParentChanged, Self::on_parent_changed);
        this.harness
            .listen(this, world, EventKind::SelfEnabledChanged, Self::on_self_enabled_changed);
    }

    fn on_deactivate(&self, _world: &World<K>) {
        let nodes = std::mem::take(&mut *self.nodes.borrow_mut());
        let mut pool = self.children_pool.borrow_mut();
        for children in nodes.into_values().filter_map(|node| node.children) {
            pool.release(children);
        }
        self.roots.borrow_mut().clear();
        self.awaiting_parent.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use tessera_core::{EntityBuilder, WorldConfig};

    use super::*;

    fn setup() -> (World<u32>, Rc<Hierarchy>) {
        let world = World::new(WorldConfig::small().with_capacity(64));
        let hierarchy = Hierarchy::new();
        assert!(Hierarchy::activate(&hierarchy, &world));
        (world, hierarchy)
    }

    fn enabled_log(world: &World<u32>) -> Rc<RefCell<Vec<(EntityId, bool)>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        world.listen(
            EventKind::EnabledChanged,
            Rc::new(move |_: &World<u32>, target: EntityId, event: &WorldEvent<u32>| {
                if let WorldEvent::EnabledChanged { enabled } = *event {
                    sink.borrow_mut().push((target, enabled));
                }
                false
            }),
        );
        log
    }

    #[test]
    fn test_roots_and_children() {
        let (world, hierarchy) = setup();
        let root = world.create(EntityBuilder::new().root()).unwrap();
        let a = world.create(EntityBuilder::new().child_of(root)).unwrap();
        let b = world.create(EntityBuilder::new().child_of(root)).unwrap();

        assert_eq!(hierarchy.roots(), vec![root]);
        assert!(hierarchy.is_root(root));
        assert_eq!(hierarchy.child_count(root), 2);
        assert_eq!(hierarchy.parent(a), Some(root));
        assert!(hierarchy.children(root).contains(&b));
        assert!(hierarchy.is_enabled(a));
    }

    #[test]
    fn test_disable_cascades_once_per_node() {
        let (world, hierarchy) = setup();
        let root = world.create(EntityBuilder::new().root()).unwrap();
        let child = world.create(EntityBuilder::new().child_of(root)).unwrap();
        let log = enabled_log(&world);

        world.set_self_enabled(root, false).unwrap();
        assert!(!hierarchy.is_enabled(root));
        assert!(!hierarchy.is_enabled(child));
        assert_eq!(*log.borrow(), vec![(root, false), (child, false)]);

        log.borrow_mut().clear();
        world.set_self_enabled(root, true).unwrap();
        assert_eq!(*log.borrow(), vec![(root, true), (child, true)]);
    }

    #[test]
    fn test_propagation_stops_at_consistent_subtree() {
        let (world, hierarchy) = setup();
        let root = world.create(EntityBuilder::new().root()).unwrap();
        let child = world.create(EntityBuilder::new().child_of(root)).unwrap();
        let grandchild = world.create(EntityBuilder::new().child_of(child)).unwrap();
        world.set_self_enabled(child, false).unwrap();
        assert!(!hierarchy.is_enabled(grandchild));

        let log = enabled_log(&world);
        world.set_self_enabled(root, false).unwrap();
        assert_eq!(*log.borrow(), vec![(root, false)]);
    }

    #[test]
    fn test_subtree_settled_before_events() {
        let (world, hierarchy) = setup();
        let root = world.create(EntityBuilder::new().root()).unwrap();
        let child = world.create(EntityBuilder::new().child_of(root)).unwrap();
        let grandchild = world.create(EntityBuilder::new().child_of(child)).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let index = Rc::clone(&hierarchy);
        world.listen_target(
            root,
            Rc::new(move |_: &World<u32>, _: EntityId, event: &WorldEvent<u32>| {
                if matches!(event, WorldEvent::EnabledChanged { .. }) {
                    sink.borrow_mut()
                        .push((index.is_enabled(child), index.is_enabled(grandchild)));
                }
                false
            }),
        );

        world.set_self_enabled(root, false).unwrap();
        assert_eq!(*seen.borrow(), vec![(false, false)]);
    }

    #[test]
    fn test_reparent_moves_child_and_recomputes() {
        let (world, hierarchy) = setup();
        let a = world.create(EntityBuilder::new().root()).unwrap();
        let b = world.create(EntityBuilder::new().root()).unwrap();
        world.set_self_enabled(b, false).unwrap();
        let child = world.create(EntityBuilder::new().child_of(a)).unwrap();
        assert!(hierarchy.is_enabled(child));

        world.set_parent(child, Some(b)).unwrap();
        assert_eq!(hierarchy.child_count(a), 0);
        assert_eq!(hierarchy.children(b), vec![child]);
        assert!(!hierarchy.is_enabled(child));
        // a's emptied set went back to the pool and was handed to b
        assert_eq!(hierarchy.pool_stats().reused, 1);
        assert_eq!(hierarchy.pooled_sets(), 0);

        world.set_parent(child, None).unwrap();
        assert!(hierarchy.is_root(child));
        assert!(hierarchy.is_enabled(child));
    }

    #[test]
    fn test_removal_destroys_subtree() {
        let (world, hierarchy) = setup();
        let root = world.create(EntityBuilder::new().root()).unwrap();
        let child = world.create(EntityBuilder::new().child_of(root)).unwrap();
        let grandchild = world.create(EntityBuilder::new().child_of(child)).unwrap();

        world.destroy(root);
        assert!(!world.is_alive(child));
        assert!(!world.is_alive(grandchild));
        assert!(hierarchy.is_empty());
        assert!(hierarchy.roots().is_empty());
        assert_eq!(hierarchy.pooled_sets(), 2);
    }

    #[test]
    fn test_replay_child_before_parent() {
        let world: World<u32> = World::new(WorldConfig::small().with_capacity(16));
        // The plain-node host exists first, so it is replayed before the
        // keyed host holding the parent.
        world.create(EntityBuilder::new().root()).unwrap();
        let root = world.create(EntityBuilder::new().with_key(1).root()).unwrap();
        world.set_self_enabled(root, false).unwrap();
        let child = world.create(EntityBuilder::new().child_of(root)).unwrap();

        let hierarchy = Hierarchy::new();
        Hierarchy::activate(&hierarchy, &world);
        assert_eq!(hierarchy.len(), 3);
        assert_eq!(hierarchy.children(root), vec![child]);
        assert!(!hierarchy.is_enabled(child));
    }
}
