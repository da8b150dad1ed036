//! # Entity World
//!
//! The single-writer container for entities and their components.
//!
//! All operations take `&self`. State lives behind `RefCell`s whose borrows
//! are always released before any hook or listener runs, so reactors may
//! create, destroy and send from inside their callbacks. Everything runs
//! synchronously on the caller's thread; nothing is queued.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use super::component::{ComponentKind, EntityBuilder, EntityKey, Node};
use super::entity::{EntityId, Slot, SlotState};
use super::host::{EntityHost, HookList, HostId, Query, SlotDemand, SlotRequest};
use super::signature::Signature;
use crate::config::WorldConfig;
use crate::error::{CoreError, CoreResult};
use crate::events::{Dispatcher, EventKind, Listener, ListenerId, WorldEvent};

/// Slot table and per-slot component columns.
struct Storage<K> {
    /// All entity slots (pre-allocated).
    slots: Box<[Slot]>,
    /// Free list of slot indices for reuse.
    free_indices: Vec<u32>,
    /// Number of currently alive entities.
    alive_count: usize,
    keys: Box<[Option<K>]>,
    nodes: Box<[Option<Node>]>,
    groups: Box<[Option<K>]>,
}

impl<K> Storage<K> {
    fn new(capacity: usize) -> Self {
        let capacity_u32 = u32::try_from(capacity).unwrap_or(u32::MAX);
        Self {
            slots: vec![Slot::vacant(); capacity].into_boxed_slice(),
            // Reversed so low indices are handed out first
            free_indices: (0..capacity_u32).rev().collect(),
            alive_count: 0,
            keys: (0..capacity).map(|_| None).collect(),
            nodes: vec![None; capacity].into_boxed_slice(),
            groups: (0..capacity).map(|_| None).collect(),
        }
    }

    fn live_slot(&self, id: EntityId) -> Option<&Slot> {
        self.slots.get(id.index() as usize).filter(|slot| slot.is_live(id))
    }

    fn readable_slot(&self, id: EntityId) -> Option<&Slot> {
        self.slots.get(id.index() as usize).filter(|slot| slot.is_readable(id))
    }
}

/// The entity world.
///
/// # Example
///
/// ```rust
/// use tessera_core::{EntityBuilder, World, WorldConfig};
///
/// let world: World<u32> = World::new(WorldConfig::small());
/// let parent = world.create(EntityBuilder::new().root()).unwrap();
/// let child = world.create(EntityBuilder::new().with_key(7).child_of(parent)).unwrap();
///
/// assert_eq!(world.key(child), Some(7));
/// assert_eq!(world.node(child).unwrap().parent, Some(parent));
/// assert!(world.destroy(child));
/// assert!(!world.is_alive(child));
/// ```
pub struct World<K> {
    config: WorldConfig,
    storage: RefCell<Storage<K>>,
    pub(crate) hosts: RefCell<Vec<EntityHost<K>>>,
    host_index: RefCell<HashMap<Signature, HostId>>,
    pub(crate) queries: RefCell<Vec<Option<Query<K>>>>,
    /// Released query slots, reused before the table grows.
    pub(crate) free_queries: RefCell<Vec<u32>>,
    pub(crate) demands: RefCell<HookList<SlotDemand<K>>>,
    next_hook: Cell<u64>,
    dispatcher: Dispatcher<K>,
}

impl<K: EntityKey> World<K> {
    /// Creates a world, pre-allocating every entity slot.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid (zero capacity or capacity
    /// beyond `u32::MAX`). Use [`World::try_new`] to get an error instead.
    #[must_use]
    pub fn new(config: WorldConfig) -> Self {
        match Self::try_new(config) {
            Ok(world) => world,
            Err(err) => panic!("invalid world configuration: {err}"),
        }
    }

    /// Creates a world after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] on out-of-range settings.
    pub fn try_new(config: WorldConfig) -> CoreResult<Self> {
        config.validate()?;
        debug!(capacity = config.capacity, "world created");
        Ok(Self {
            storage: RefCell::new(Storage::new(config.capacity)),
            config,
            hosts: RefCell::new(Vec::new()),
            host_index: RefCell::new(HashMap::new()),
            queries: RefCell::new(Vec::new()),
            free_queries: RefCell::new(Vec::new()),
            demands: RefCell::new(Rc::new(Vec::new())),
            next_hook: Cell::new(0),
            dispatcher: Dispatcher::new(),
        })
    }

    /// Returns the configuration the world was built with.
    #[must_use]
    pub const fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Returns the maximum number of live entities.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.storage.borrow().alive_count
    }

    /// Returns the number of hosts created so far.
    #[must_use]
    pub fn host_count(&self) -> usize {
        self.hosts.borrow().len()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Creates an entity from a component bundle.
    ///
    /// If this is the first entity with the bundle's signature, the new host
    /// is announced to matching subscriptions before the entity is inserted.
    /// Creation hooks of the host run before this returns.
    ///
    /// # Errors
    ///
    /// - [`CoreError::ParentNotFound`] if the bundle's node names a parent
    ///   that is not alive.
    /// - [`CoreError::MissingComponent`] if that parent has no node.
    /// - [`CoreError::CapacityExhausted`] if every slot is in use, or if
    ///   registered slot demands need more free slots than remain. Nothing
    ///   runs in that case.
    pub fn create(&self, builder: EntityBuilder<K>) -> CoreResult<EntityId> {
        if let Some(parent) = builder.node.and_then(|node| node.parent) {
            self.check_parent(parent)?;
        }
        self.check_free_slots(1 + self.slots_demanded(&SlotRequest::Create(&builder)))?;

        let signature = builder.signature();
        let host = self.host_for(signature);

        let id = {
            let mut storage = self.storage.borrow_mut();
            let Some(index) = storage.free_indices.pop() else {
                return Err(CoreError::CapacityExhausted {
                    capacity: self.config.capacity,
                });
            };

            let idx = index as usize;

            // Increment generation to invalidate old references
            let generation = storage.slots[idx].generation.wrapping_add(1);
            let id = EntityId::new(index, generation);
            let row = self.hosts.borrow_mut()[host.index()].push(id);
            storage.slots[idx] = Slot {
                generation,
                state: SlotState::Alive,
                signature,
                host: host.0,
                row,
            };

            storage.keys[idx] = builder.key;
            storage.nodes[idx] = builder.node;
            storage.groups[idx] = builder.group;
            storage.alive_count += 1;
            id
        };

        trace!(entity = %id, ?signature, "entity created");

        let hooks = self.hosts.borrow()[host.index()].on_created.clone();
        for (_, hook) in hooks.iter() {
            hook(self, id);
        }

        Ok(id)
    }

    /// Destroys an entity.
    ///
    /// Release hooks run first, while the entity's components are still
    /// readable; the slot is freed afterwards. Returns `false` for dead or
    /// stale handles and for entities whose release is already in progress.
    pub fn destroy(&self, id: EntityId) -> bool {
        let host = {
            let mut storage = self.storage.borrow_mut();
            let Some(slot) = storage.slots.get_mut(id.index() as usize) else {
                return false;
            };
            if !slot.is_live(id) {
                return false;
            }
            slot.state = SlotState::Releasing;
            slot.host as usize
        };

        let hooks = self.hosts.borrow()[host].on_released.clone();
        for (_, hook) in hooks.iter() {
            hook(self, id);
        }

        {
            let mut storage = self.storage.borrow_mut();
            let idx = id.index() as usize;
            let row = storage.slots[idx].row;

            if let Some(moved) = self.hosts.borrow_mut()[host].swap_remove(row) {
                storage.slots[moved.index() as usize].row = row;
            }

            storage.slots[idx].state = SlotState::Vacant;
            storage.slots[idx].signature = Signature::EMPTY;
            storage.keys[idx] = None;
            storage.nodes[idx] = None;
            storage.groups[idx] = None;
            storage.alive_count -= 1;
            storage.free_indices.push(id.index());
        }

        self.dispatcher.forget_target(id);
        trace!(entity = %id, "entity destroyed");
        true
    }

    /// Checks if an entity is alive and not being released.
    #[must_use]
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.storage.borrow().live_slot(id).is_some()
    }

    /// Checks if an entity's release hooks are currently running.
    #[must_use]
    pub fn is_releasing(&self, id: EntityId) -> bool {
        self.storage
            .borrow()
            .readable_slot(id)
            .is_some_and(|slot| slot.state == SlotState::Releasing)
    }

    /// Returns every live entity, in slot order.
    #[must_use]
    pub fn entities(&self) -> Vec<EntityId> {
        let storage = self.storage.borrow();
        storage
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.state == SlotState::Alive)
            .map(|(index, slot)| EntityId::new(u32::try_from(index).unwrap_or(u32::MAX), slot.generation))
            .collect()
    }

    // =========================================================================
    // Component reads (valid during release hooks)
    // =========================================================================

    /// Returns the component signature of an entity.
    #[must_use]
    pub fn signature(&self, id: EntityId) -> Option<Signature> {
        self.storage.borrow().readable_slot(id).map(|slot| slot.signature)
    }

    /// Returns the entity's current key.
    #[must_use]
    pub fn key(&self, id: EntityId) -> Option<K> {
        let storage = self.storage.borrow();
        storage.readable_slot(id)?;
        storage.keys[id.index() as usize].clone()
    }

    /// Returns the entity's node component.
    #[must_use]
    pub fn node(&self, id: EntityId) -> Option<Node> {
        let storage = self.storage.borrow();
        storage.readable_slot(id)?;
        storage.nodes[id.index() as usize]
    }

    /// Returns the group key carried by an aggregation representative.
    #[must_use]
    pub fn group(&self, id: EntityId) -> Option<K> {
        let storage = self.storage.borrow();
        storage.readable_slot(id)?;
        storage.groups[id.index() as usize].clone()
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Overwrites an entity's key and dispatches
    /// [`WorldEvent::KeyChanged`] with the old and new values.
    ///
    /// Writing the current value again is a no-op and returns `Ok(false)`.
    ///
    /// # Errors
    ///
    /// [`CoreError::EntityNotFound`] for dead handles,
    /// [`CoreError::MissingComponent`] if the entity has no key,
    /// [`CoreError::CapacityExhausted`] if registered slot demands need more
    /// free slots than remain. The key is left unchanged.
    pub fn set_key(&self, id: EntityId, key: K) -> CoreResult<bool> {
        let current = {
            let storage = self.storage.borrow();
            if storage.live_slot(id).is_none() {
                return Err(CoreError::EntityNotFound(id));
            }
            let Some(current) = storage.keys[id.index() as usize].clone() else {
                return Err(missing(id, ComponentKind::Key));
            };
            current
        };
        if current == key {
            return Ok(false);
        }
        self.check_free_slots(self.slots_demanded(&SlotRequest::Rekey {
            previous: &current,
            current: &key,
        }))?;

        self.storage.borrow_mut().keys[id.index() as usize] = Some(key.clone());

        self.send(
            id,
            WorldEvent::KeyChanged {
                previous: current,
                current: key,
            },
        );
        Ok(true)
    }

    /// Re-parents a node and dispatches [`WorldEvent::ParentChanged`].
    ///
    /// The new parent must be alive and carry a node. Assigning the current
    /// parent again is a no-op and returns `Ok(false)`. Cycles are not
    /// detected.
    ///
    /// # Errors
    ///
    /// [`CoreError::EntityNotFound`] for dead handles,
    /// [`CoreError::MissingComponent`] if the entity or the parent has no
    /// node, [`CoreError::ParentNotFound`] if the parent is dead.
    pub fn set_parent(&self, id: EntityId, parent: Option<EntityId>) -> CoreResult<bool> {
        if let Some(parent) = parent {
            self.check_parent(parent)?;
        }

        let previous = {
            let mut storage = self.storage.borrow_mut();
            if storage.live_slot(id).is_none() {
                return Err(CoreError::EntityNotFound(id));
            }
            let Some(node) = storage.nodes[id.index() as usize].as_mut() else {
                return Err(missing(id, ComponentKind::Node));
            };
            if node.parent == parent {
                return Ok(false);
            }
            std::mem::replace(&mut node.parent, parent)
        };

        self.send(
            id,
            WorldEvent::ParentChanged {
                previous,
                current: parent,
            },
        );
        Ok(true)
    }

    /// Writes a node's self-enabled flag and dispatches
    /// [`WorldEvent::SelfEnabledChanged`].
    ///
    /// Writing the current value again is a no-op and returns `Ok(false)`.
    ///
    /// # Errors
    ///
    /// [`CoreError::EntityNotFound`] for dead handles,
    /// [`CoreError::MissingComponent`] if the entity has no node.
    pub fn set_self_enabled(&self, id: EntityId, enabled: bool) -> CoreResult<bool> {
        {
            let mut storage = self.storage.borrow_mut();
            if storage.live_slot(id).is_none() {
                return Err(CoreError::EntityNotFound(id));
            }
            let Some(node) = storage.nodes[id.index() as usize].as_mut() else {
                return Err(missing(id, ComponentKind::Node));
            };
            if node.self_enabled == enabled {
                return Ok(false);
            }
            node.self_enabled = enabled;
        }

        self.send(id, WorldEvent::SelfEnabledChanged { enabled });
        Ok(true)
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Returns the world's dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher<K> {
        &self.dispatcher
    }

    /// Registers a listener for every event of `kind`.
    pub fn listen(&self, kind: EventKind, listener: Listener<K>) -> ListenerId {
        self.dispatcher.listen(kind, listener)
    }

    /// Registers a listener for events addressed to `target`. It is dropped
    /// automatically when `target` is destroyed.
    pub fn listen_target(&self, target: EntityId, listener: Listener<K>) -> ListenerId {
        self.dispatcher.listen_target(target, listener)
    }

    /// Removes a listener.
    pub fn unlisten(&self, id: ListenerId) -> bool {
        self.dispatcher.unlisten(id)
    }

    /// Delivers `event` to listeners synchronously. Returns `true` if a
    /// listener stopped delivery.
    pub fn send(&self, target: EntityId, event: WorldEvent<K>) -> bool {
        self.dispatcher.deliver(self, target, &event)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn check_parent(&self, parent: EntityId) -> CoreResult<()> {
        let storage = self.storage.borrow();
        if storage.live_slot(parent).is_none() {
            return Err(CoreError::ParentNotFound(parent));
        }
        if storage.nodes[parent.index() as usize].is_none() {
            return Err(missing(parent, ComponentKind::Node));
        }
        Ok(())
    }

    /// Returns the host for `signature`, creating and announcing it if this
    /// is its first use.
    fn host_for(&self, signature: Signature) -> HostId {
        if let Some(&host) = self.host_index.borrow().get(&signature) {
            return host;
        }

        let host = {
            let mut hosts = self.hosts.borrow_mut();
            let host = HostId(u32::try_from(hosts.len()).unwrap_or(u32::MAX));
            hosts.push(EntityHost::new(signature));
            host
        };
        self.host_index.borrow_mut().insert(signature, host);
        debug!(host = host.index(), ?signature, "host created");

        // Collected up front: announcement hooks may subscribe new queries.
        let mut announcements = Vec::new();
        for query in self.queries.borrow().iter().flatten() {
            if query.matcher.matches(signature) {
                announcements.extend(query.on_host_added.iter().map(|(_, hook)| Rc::clone(hook)));
            }
        }
        for hook in announcements {
            hook(self, host);
        }

        host
    }

    fn slots_demanded(&self, request: &SlotRequest<'_, K>) -> usize {
        let demands = Rc::clone(&self.demands.borrow());
        demands.iter().map(|(_, demand)| demand(self, request)).sum()
    }

    fn check_free_slots(&self, needed: usize) -> CoreResult<()> {
        if self.storage.borrow().free_indices.len() < needed {
            return Err(CoreError::CapacityExhausted {
                capacity: self.config.capacity,
            });
        }
        Ok(())
    }

    pub(crate) fn allocate_hook_id(&self) -> super::host::HookId {
        let id = self.next_hook.get();
        self.next_hook.set(id + 1);
        super::host::HookId(id)
    }
}

fn missing(entity: EntityId, kind: ComponentKind) -> CoreError {
    CoreError::MissingComponent { entity, kind }
}

impl<K> fmt::Debug for World<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("capacity", &self.config.capacity)
            .field("alive", &self.storage.borrow().alive_count)
            .field("hosts", &self.hosts.borrow().len())
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}
