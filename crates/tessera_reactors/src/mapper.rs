//! # Mapper
//!
//! Unique key-to-entity table over every entity carrying a `Key` component.
//! The most recent binder of a key wins; an unbind only takes effect when it
//! comes from the entity currently bound.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tessera_core::{ComponentKind, EntityId, EntityKey, EventKind, Matcher, World, WorldEvent};
use tracing::trace;

use crate::error::{ReactorError, ReactorResult};
use crate::harness::{Reactor, ReactorHarness};

/// Key-to-entity lookup.
#[derive(Debug)]
pub struct Mapper<K: EntityKey> {
    harness: ReactorHarness,
    map: RefCell<HashMap<K, EntityId>>,
}

impl<K: EntityKey> Mapper<K> {
    /// Creates an inactive mapper.
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            harness: ReactorHarness::new(),
            map: RefCell::new(HashMap::new()),
        })
    }

    /// Returns the entity bound to `key`.
    ///
    /// # Errors
    ///
    /// [`ReactorError::KeyNotFound`] if nothing is bound to `key`.
    pub fn get(&self, key: &K) -> ReactorResult<EntityId> {
        self.try_get(key).ok_or_else(|| ReactorError::key_not_found(key))
    }

    /// Returns the entity bound to `key`, if any.
    #[must_use]
    pub fn try_get(&self, key: &K) -> Option<EntityId> {
        self.map.borrow().get(key).copied()
    }

    /// Whether anything is bound to `key`.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.map.borrow().contains_key(key)
    }

    /// Number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.borrow().len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.borrow().is_empty()
    }

    /// Bound keys, in no particular order.
    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        self.map.borrow().keys().cloned().collect()
    }

    /// Bound entities, in no particular order.
    #[must_use]
    pub fn values(&self) -> Vec<EntityId> {
        self.map.borrow().values().copied().collect()
    }

    /// Every binding, in no particular order.
    #[must_use]
    pub fn entries(&self) -> Vec<(K, EntityId)> {
        self.map
            .borrow()
            .iter()
            .map(|(key, &entity)| (key.clone(), entity))
            .collect()
    }

    fn bind(&self, key: K, entity: EntityId) {
        if let Some(previous) = self.map.borrow_mut().insert(key, entity) {
            if previous != entity {
                trace!(%previous, %entity, "mapper binding overwritten");
            }
        }
    }

    fn unbind(&self, key: &K, entity: EntityId) {
        let mut map = self.map.borrow_mut();
        if map.get(key) == Some(&entity) {
            map.remove(key);
        } else {
            trace!(%entity, ?key, "ignored stale unbind");
        }
    }

    fn on_key_changed(&self, _world: &World<K>, entity: EntityId, event: &WorldEvent<K>) {
        if let WorldEvent::KeyChanged { previous, current } = event {
            self.unbind(previous, entity);
            self.bind(current.clone(), entity);
        }
    }
}

impl<K: EntityKey> Reactor<K> for Mapper<K> {
    fn matcher(&self) -> Matcher {
        Matcher::of(ComponentKind::Key)
    }

    fn harness(&self) -> &ReactorHarness {
        &self.harness
    }

    fn on_entity_added(&self, world: &World<K>, entity: EntityId) {
        if let Some(key) = world.key(entity) {
            self.bind(key, entity);
        }
    }

    fn on_entity_removed(&self, world: &World<K>, entity: EntityId) {
        if let Some(key) = world.key(entity) {
            self.unbind(&key, entity);
        }
    }

    fn on_activate(this: &Rc<Self>, world: &World<K>) {
        this.harness
            .listen(this, world, EventKind::KeyChanged, Self::on_key_changed);
    }

    fn on_deactivate(&self, _world: &World<K>) {
        self.map.borrow_mut().clear();
    }
}
