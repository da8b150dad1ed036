//! # Aggregator
//!
//! Groups keyed entities by key value.
//!
//! Every group owns a representative entity created by the aggregator and
//! carrying a `Group` component with the key, so other systems can hold "the
//! group for key K" as an ordinary entity handle. Membership changes are
//! announced to the representative as [`WorldEvent::EntityAdded`] and
//! [`WorldEvent::EntityRemoved`].
//!
//! ## Invariants
//!
//! - A group exists only while it has at least one member. The last removal
//!   unregisters it, recycles its membership set and destroys the
//!   representative.
//! - `first` is always a current member.
//! - An entity is a member of exactly the group matching its current key.
//!
//! ## Capacity
//!
//! Representatives are created from inside other world operations, so the
//! aggregator registers a slot demand: a create or key change is refused with
//! `CapacityExhausted` unless the world can also fit the representative it
//! triggers. While any group exists one further slot is held back. Releasing
//! a representative externally moves its members to a replacement built in
//! that slot, so no user entity is ever left without a group.

use std::cell::{Cell, RefCell};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tessera_core::{
    ComponentKind, CoreResult, EntityBuilder, EntityId, EntityKey, EventKind, Matcher, Pool, PoolStats,
    ReactorConfig, SlotRequest, World, WorldEvent,
};
use tracing::{debug, trace, warn};

use crate::error::{ReactorError, ReactorResult};
use crate::harness::{Reactor, ReactorHarness};

/// One aggregation group.
#[derive(Debug)]
pub struct AggregationGroup {
    /// Entity standing for the whole group.
    pub representative: EntityId,
    /// A distinguished member. Reassigned arbitrarily when it leaves.
    pub first: EntityId,
    /// Current members, unordered.
    pub members: HashSet<EntityId>,
}

/// Owned copy of a group, returned by [`Aggregator::groups`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupSnapshot<K> {
    /// Group key.
    pub key: K,
    /// Entity standing for the group.
    pub representative: EntityId,
    /// Distinguished member.
    pub first: EntityId,
    /// Members, in no particular order.
    pub members: Vec<EntityId>,
}

/// Key-to-group index over every entity carrying a `Key` component.
///
/// # Example
///
/// ```rust
/// use tessera_core::{EntityBuilder, World, WorldConfig};
/// use tessera_reactors::{Aggregator, Reactor};
///
/// let world: World<u32> = World::new(WorldConfig::small());
/// let a = world.create(EntityBuilder::new().with_key(1)).unwrap();
///
/// let aggregator = Aggregator::new();
/// Aggregator::activate(&aggregator, &world);
///
/// let b = world.create(EntityBuilder::new().with_key(1)).unwrap();
/// assert_eq!(aggregator.len_of(&1), 2);
/// assert!(aggregator.contains(&1, a) && aggregator.contains(&1, b));
///
/// world.destroy(a);
/// world.destroy(b);
/// assert!(aggregator.try_get(&1).is_none());
/// ```
///
/// # Panics
///
/// Activation panics if the world cannot fit one representative for every
/// distinct key already present.
#[derive(Debug)]
pub struct Aggregator<K: EntityKey> {
    harness: ReactorHarness,
    groups: RefCell<HashMap<K, AggregationGroup>>,
    pool: RefCell<Pool<HashSet<EntityId>>>,
    /// Set while the aggregator creates a representative itself.
    creating: Cell<bool>,
}

enum Removal {
    Kept(EntityId),
    Dissolved(AggregationGroup),
}

impl<K: EntityKey> Aggregator<K> {
    /// Creates an inactive aggregator with an empty set pool.
    #[must_use]
    pub fn new() -> Rc<Self> {
        Self::with_config(&ReactorConfig::default())
    }

    /// Creates an inactive aggregator, pre-building membership sets.
    #[must_use]
    pub fn with_config(config: &ReactorConfig) -> Rc<Self> {
        Rc::new(Self {
            harness: ReactorHarness::new(),
            groups: RefCell::new(HashMap::new()),
            pool: RefCell::new(Pool::with_prealloc(config.group_pool_prealloc)),
            creating: Cell::new(false),
        })
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Returns the representative of the group for `key`.
    ///
    /// # Errors
    ///
    /// [`ReactorError::KeyNotFound`] if no entity currently has `key`.
    pub fn get(&self, key: &K) -> ReactorResult<EntityId> {
        self.try_get(key).ok_or_else(|| ReactorError::key_not_found(key))
    }

    /// Returns the representative of the group for `key`, if any.
    #[must_use]
    pub fn try_get(&self, key: &K) -> Option<EntityId> {
        self.groups.borrow().get(key).map(|group| group.representative)
    }

    /// Returns the distinguished member of the group for `key`.
    #[must_use]
    pub fn first(&self, key: &K) -> Option<EntityId> {
        self.groups.borrow().get(key).map(|group| group.first)
    }

    /// Members of the group for `key`, empty if there is none.
    #[must_use]
    pub fn members(&self, key: &K) -> Vec<EntityId> {
        self.groups
            .borrow()
            .get(key)
            .map(|group| group.members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Size of the group for `key`.
    #[must_use]
    pub fn len_of(&self, key: &K) -> usize {
        self.groups.borrow().get(key).map_or(0, |group| group.members.len())
    }

    /// Whether `entity` is a member of the group for `key`.
    #[must_use]
    pub fn contains(&self, key: &K, entity: EntityId) -> bool {
        self.groups
            .borrow()
            .get(key)
            .is_some_and(|group| group.members.contains(&entity))
    }

    /// Number of live groups.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.borrow().len()
    }

    /// Owned copy of every group.
    #[must_use]
    pub fn groups(&self) -> Vec<GroupSnapshot<K>> {
        self.groups
            .borrow()
            .iter()
            .map(|(key, group)| GroupSnapshot {
                key: key.clone(),
                representative: group.representative,
                first: group.first,
                members: group.members.iter().copied().collect(),
            })
            .collect()
    }

    /// Visits every group without copying.
    ///
    /// # Panics
    ///
    /// Panics if `f` changes the world in a way this aggregator reacts to.
    pub fn for_each_group(&self, mut f: impl FnMut(&K, &AggregationGroup)) {
        for (key, group) in self.groups.borrow().iter() {
            f(key, group);
        }
    }

    /// Traffic counters of the membership set pool.
    #[must_use]
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.borrow().stats()
    }

    /// Membership sets waiting in the pool.
    #[must_use]
    pub fn pooled_sets(&self) -> usize {
        self.pool.borrow().pooled()
    }

    // =========================================================================
    // Index maintenance
    // =========================================================================

    fn add(&self, world: &World<K>, entity: EntityId, key: K) {
        let existing = {
            let mut groups = self.groups.borrow_mut();
            groups.get_mut(&key).map(|group| {
                group.members.insert(entity);
                group.representative
            })
        };

        let representative = match existing {
            Some(representative) => representative,
            None => {
                // The representative must exist before the group is visible.
                // Its slot was checked by `slots_needed` unless this is replay.
                let representative = match self.create_representative(world, &key) {
                    Ok(representative) => representative,
                    Err(err) => panic!("cannot create representative for group {key:?}: {err}"),
                };
                let mut members = self.pool.borrow_mut().acquire();
                members.insert(entity);
                debug!(?key, %representative, "aggregation group created");
                self.groups.borrow_mut().insert(
                    key,
                    AggregationGroup {
                        representative,
                        first: entity,
                        members,
                    },
                );
                representative
            }
        };

        world.send(representative, WorldEvent::EntityAdded { entity });
    }

    fn remove(&self, world: &World<K>, entity: EntityId, key: &K) {
        let removal = {
            let mut groups = self.groups.borrow_mut();
            let Entry::Occupied(mut slot) = groups.entry(key.clone()) else {
                trace!(%entity, ?key, "ignored removal from missing group");
                return;
            };
            let group = slot.get_mut();
            assert!(
                group.members.remove(&entity),
                "entity {entity} is not a member of aggregation group {key:?}"
            );

            if group.members.is_empty() {
                Removal::Dissolved(slot.remove())
            } else {
                if group.first == entity {
                    if let Some(&next) = group.members.iter().next() {
                        group.first = next;
                    }
                }
                Removal::Kept(group.representative)
            }
        };

        match removal {
            Removal::Kept(representative) => {
                world.send(representative, WorldEvent::EntityRemoved { entity });
            }
            Removal::Dissolved(group) => {
                world.send(group.representative, WorldEvent::EntityRemoved { entity });
                self.pool.borrow_mut().release(group.members);
                debug!(?key, representative = %group.representative, "aggregation group dissolved");
                world.destroy(group.representative);
            }
        }
    }

    fn create_representative(&self, world: &World<K>, key: &K) -> CoreResult<EntityId> {
        self.creating.set(true);
        let created = world.create(EntityBuilder::new().with_group(key.clone()));
        self.creating.set(false);
        created
    }

    /// Free slots this aggregator needs beyond the request's own.
    fn slots_needed(&self, _world: &World<K>, request: &SlotRequest<'_, K>) -> usize {
        if self.creating.get() {
            return 0;
        }
        let groups = self.groups.borrow();
        let (opens, frees) = match request {
            SlotRequest::Create(builder) => (builder.key().is_some_and(|key| !groups.contains_key(key)), false),
            SlotRequest::Rekey { previous, current } => (
                !groups.contains_key(*current),
                groups.get(*previous).is_some_and(|group| group.members.len() == 1),
            ),
        };
        // A group left empty releases its representative before the new one is built.
        let representative = usize::from(opens && !frees);
        let spare = usize::from(opens || !groups.is_empty());
        representative + spare
    }

    fn on_key_changed(&self, world: &World<K>, entity: EntityId, event: &WorldEvent<K>) {
        let WorldEvent::KeyChanged { previous, current } = event else {
            return;
        };
        self.remove(world, entity, previous);
        self.add(world, entity, current.clone());
    }

    /// A representative went away. Only the one currently registered for its
    /// key is acted on: the members are rebound to a replacement
    /// representative built in the held-back slot.
    fn on_representative_released(&self, world: &World<K>, representative: EntityId) {
        let Some(key) = world.group(representative) else {
            return;
        };
        let registered = self
            .groups
            .borrow()
            .get(&key)
            .is_some_and(|group| group.representative == representative);
        if !registered {
            trace!(%representative, ?key, "ignored release of unregistered representative");
            return;
        }

        match self.create_representative(world, &key) {
            Ok(replacement) => {
                if let Some(group) = self.groups.borrow_mut().get_mut(&key) {
                    group.representative = replacement;
                }
                warn!(%representative, %replacement, ?key, "representative released externally, group rebound");
            }
            Err(err) => {
                // Only reachable when replay already filled the world.
                let group = self.groups.borrow_mut().remove(&key);
                if let Some(group) = group {
                    warn!(
                        %representative,
                        ?key,
                        members = group.members.len(),
                        %err,
                        "representative released externally, group unbound"
                    );
                    self.pool.borrow_mut().release(group.members);
                }
            }
        }
    }
}

impl<K: EntityKey> Reactor<K> for Aggregator<K> {
    fn matcher(&self) -> Matcher {
        Matcher::of(ComponentKind::Key)
    }

    fn harness(&self) -> &ReactorHarness {
        &self.harness
    }

    fn on_entity_added(&self, world: &World<K>, entity: EntityId) {
        let Some(key) = world.key(entity) else {
            panic!("entity {entity} reached the aggregator without a key");
        };
        self.add(world, entity, key);
    }

    fn on_entity_removed(&self, world: &World<K>, entity: EntityId) {
        if let Some(key) = world.key(entity) {
            self.remove(world, entity, &key);
        }
    }

    fn on_activate(this: &Rc<Self>, world: &World<K>) {
        this.harness.reserve(this, world, Self::slots_needed);
        this.harness
            .listen(this, world, EventKind::KeyChanged, Self::on_key_changed);
        this.harness.watch_released(
            this,
            world,
            Matcher::of(ComponentKind::Group),
            Self::on_representative_released,
        );
    }

    fn on_deactivate(&self, world: &World<K>) {
        let groups = std::mem::take(&mut *self.groups.borrow_mut());
        debug!(groups = groups.len(), "disposing aggregation groups");
        for (_, group) in groups {
            self.pool.borrow_mut().release(group.members);
            world.destroy(group.representative);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use tessera_core::{CoreError, WorldConfig};

    use super::*;

    fn setup() -> (World<u32>, Rc<Aggregator<u32>>) {
        let world = World::new(WorldConfig::small().with_capacity(64));
        let aggregator = Aggregator::new();
        assert!(Aggregator::activate(&aggregator, &world));
        (world, aggregator)
    }

    fn keyed(world: &World<u32>, key: u32) -> EntityId {
        world.create(EntityBuilder::new().with_key(key)).unwrap()
    }

    #[test]
    fn test_group_lifecycle() {
        let (world, aggregator) = setup();
        let e1 = keyed(&world, 1);
        let e2 = keyed(&world, 1);

        let representative = aggregator.get(&1).unwrap();
        assert_eq!(world.group(representative), Some(1));
        assert_eq!(aggregator.first(&1), Some(e1));
        assert_eq!(aggregator.len_of(&1), 2);

        world.destroy(e1);
        assert_eq!(aggregator.first(&1), Some(e2));

        world.destroy(e2);
        assert_eq!(aggregator.group_count(), 0);
        assert!(!world.is_alive(representative));
        assert_eq!(aggregator.get(&1), Err(ReactorError::KeyNotFound("1".into())));
        assert_eq!(aggregator.pooled_sets(), 1);
    }

    #[test]
    fn test_events_reach_representative() {
        let (world, aggregator) = setup();
        let e1 = keyed(&world, 4);
        let representative = aggregator.get(&4).unwrap();

        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        world.listen_target(
            representative,
            Rc::new(move |_: &World<u32>, _: EntityId, event: &WorldEvent<u32>| {
                sink.borrow_mut().push(event.clone());
                false
            }),
        );

        let e2 = keyed(&world, 4);
        world.destroy(e1);
        assert_eq!(
            *log.borrow(),
            vec![
                WorldEvent::EntityAdded { entity: e2 },
                WorldEvent::EntityRemoved { entity: e1 },
            ]
        );
    }

    #[test]
    fn test_membership_set_reused() {
        let (world, aggregator) = setup();
        let e = keyed(&world, 1);
        world.destroy(e);
        keyed(&world, 2);

        let stats = aggregator.pool_stats();
        assert_eq!(stats.allocated, 1);
        assert_eq!(stats.reused, 1);
    }

    #[test]
    fn test_external_release_rebinds_members() {
        let (world, aggregator) = setup();
        let e1 = keyed(&world, 8);
        let e2 = keyed(&world, 8);
        let representative = aggregator.get(&8).unwrap();

        assert!(world.destroy(representative));
        let replacement = aggregator.get(&8).unwrap();
        assert_ne!(replacement, representative);
        assert!(world.is_alive(replacement));
        assert_eq!(world.group(replacement), Some(8));
        assert!(world.is_alive(e1) && world.is_alive(e2));
        assert!(aggregator.contains(&8, e1) && aggregator.contains(&8, e2));
        assert_eq!(aggregator.first(&8), Some(e1));

        world.destroy(e1);
        world.destroy(e2);
        assert!(!world.is_alive(replacement));
        assert_eq!(aggregator.group_count(), 0);
    }

    #[test]
    fn test_create_refused_when_representative_cannot_fit() {
        let world: World<u32> = World::new(WorldConfig::small().with_capacity(4));
        let aggregator = Aggregator::new();
        Aggregator::activate(&aggregator, &world);

        // Member, representative and the held-back slot.
        let e1 = keyed(&world, 1);
        assert_eq!(world.alive_count(), 2);
        let e2 = keyed(&world, 1);
        assert_eq!(world.alive_count(), 3);

        // One slot left: a new group would need two more.
        let err = world.create(EntityBuilder::new().with_key(2)).unwrap_err();
        assert!(matches!(err, CoreError::CapacityExhausted { capacity: 4 }));
        assert!(matches!(world.set_key(e2, 2), Err(CoreError::CapacityExhausted { .. })));
        assert!(world.create(EntityBuilder::new().root()).is_err());
        assert_eq!(world.alive_count(), 3);
        assert_eq!(aggregator.group_count(), 1);
        assert_eq!(world.key(e2), Some(1));

        // The held-back slot still lets a released representative be replaced.
        let representative = aggregator.get(&1).unwrap();
        world.destroy(representative);
        assert!(aggregator.contains(&1, e1) && aggregator.contains(&1, e2));
        assert_eq!(world.alive_count(), 3);

        // Leaving a singleton group frees its representative for the new one.
        world.destroy(e2);
        assert!(world.set_key(e1, 2).unwrap());
        assert_eq!(aggregator.members(&2), vec![e1]);
        assert_eq!(world.alive_count(), 2);
    }

    #[test]
    fn test_release_of_unregistered_group_entity_is_ignored() {
        let (world, aggregator) = setup();
        let e1 = keyed(&world, 3);
        let stray = world.create(EntityBuilder::new().with_group(3)).unwrap();

        world.destroy(stray);
        assert!(world.is_alive(e1));
        assert!(aggregator.contains(&3, e1));
    }

    #[test]
    fn test_deactivate_disposes_representatives() {
        let (world, aggregator) = setup();
        let e1 = keyed(&world, 1);
        let representative = aggregator.get(&1).unwrap();

        assert!(aggregator.deactivate(&world));
        assert!(!aggregator.deactivate(&world));
        assert_eq!(aggregator.group_count(), 0);
        assert!(!world.is_alive(representative));
        assert!(world.is_alive(e1));
        assert_eq!(aggregator.harness().hook_count(), 0);
        assert_eq!(world.dispatcher().listener_count(), 0);

        keyed(&world, 1);
        assert_eq!(aggregator.group_count(), 0);
    }

    #[test]
    #[should_panic(expected = "is not a member")]
    fn test_removing_non_member_is_fatal() {
        let (world, aggregator) = setup();
        keyed(&world, 1);
        aggregator.remove(&world, EntityId::new(60, 9), &1);
    }
}
