//! # Lifecycle Feed
//!
//! The subscription surface reactors build on:
//!
//! 1. [`World::subscribe`] registers a [`Matcher`] and returns a [`QueryId`].
//! 2. [`World::hosts_of`] lists the hosts the matcher accepts today, and
//!    [`World::on_host_added`] reports every host created later.
//! 3. Per host, [`World::on_entity_created`] / [`World::on_entity_released`]
//!    attach lifecycle hooks and [`World::host_entities`] enumerates current
//!    members for replay.
//!
//! [`World::reserve_slots`] lets a reactor that creates entities of its own
//! claim headroom, so a create or key change that would leave it short is
//! refused before any hook runs.
//!
//! Hook lists are copy-on-write; hooks registered or removed while a list is
//! being walked take effect from the next event.

use tracing::debug;

use super::component::EntityKey;
use super::entity::EntityId;
use super::host::{push_hook, remove_hook, EntityHook, HookId, HostHook, HostId, Query, QueryId, SlotDemand};
use super::signature::{Matcher, Signature};
use super::world::World;

impl<K: EntityKey> World<K> {
    /// Registers a feed subscription. Ids of released subscriptions are
    /// handed out again.
    pub fn subscribe(&self, matcher: Matcher) -> QueryId {
        let mut queries = self.queries.borrow_mut();
        let query = Some(Query::new(matcher));
        let id = match self.free_queries.borrow_mut().pop() {
            Some(index) => {
                queries[index as usize] = query;
                QueryId(index)
            }
            None => {
                queries.push(query);
                QueryId(u32::try_from(queries.len() - 1).unwrap_or(u32::MAX))
            }
        };
        debug!(query = id.0, ?matcher, "feed subscription opened");
        id
    }

    /// Releases a feed subscription and its host-added hooks.
    ///
    /// Entity hooks attached to individual hosts are not touched; remove them
    /// with [`World::unhook`]. Returns `false` if the query was already
    /// released.
    pub fn unsubscribe(&self, query: QueryId) -> bool {
        let released = self
            .queries
            .borrow_mut()
            .get_mut(query.0 as usize)
            .and_then(Option::take)
            .is_some();
        if released {
            self.free_queries.borrow_mut().push(query.0);
            debug!(query = query.0, "feed subscription released");
        }
        released
    }

    /// Returns the matcher of a live subscription.
    #[must_use]
    pub fn query_matcher(&self, query: QueryId) -> Option<Matcher> {
        self.queries
            .borrow()
            .get(query.0 as usize)
            .and_then(Option::as_ref)
            .map(|q| q.matcher)
    }

    /// Lists the existing hosts accepted by a subscription, in creation
    /// order.
    #[must_use]
    pub fn hosts_of(&self, query: QueryId) -> Vec<HostId> {
        let Some(matcher) = self.query_matcher(query) else {
            return Vec::new();
        };
        self.hosts
            .borrow()
            .iter()
            .enumerate()
            .filter(|(_, host)| matcher.matches(host.signature))
            .map(|(index, _)| HostId(u32::try_from(index).unwrap_or(u32::MAX)))
            .collect()
    }

    /// Registers a hook run for every host created later that the
    /// subscription accepts. Returns `None` if the subscription is released.
    pub fn on_host_added(&self, query: QueryId, hook: HostHook<K>) -> Option<HookId> {
        let id = self.allocate_hook_id();
        let mut queries = self.queries.borrow_mut();
        let query = queries.get_mut(query.0 as usize)?.as_mut()?;
        push_hook(&mut query.on_host_added, id, hook);
        Some(id)
    }

    /// Removes a host-added hook from a subscription.
    pub fn unhook_query(&self, query: QueryId, hook: HookId) -> bool {
        let mut queries = self.queries.borrow_mut();
        queries
            .get_mut(query.0 as usize)
            .and_then(Option::as_mut)
            .is_some_and(|query| remove_hook(&mut query.on_host_added, hook))
    }

    /// Registers a hook run after each entity is created in `host`.
    pub fn on_entity_created(&self, host: HostId, hook: EntityHook<K>) -> HookId {
        let id = self.allocate_hook_id();
        push_hook(&mut self.hosts.borrow_mut()[host.index()].on_created, id, hook);
        id
    }

    /// Registers a hook run before each entity of `host` is released.
    pub fn on_entity_released(&self, host: HostId, hook: EntityHook<K>) -> HookId {
        let id = self.allocate_hook_id();
        push_hook(&mut self.hosts.borrow_mut()[host.index()].on_released, id, hook);
        id
    }

    /// Removes an entity hook from `host`. Returns `false` if it was not
    /// attached there.
    pub fn unhook(&self, host: HostId, hook: HookId) -> bool {
        self.hosts
            .borrow_mut()
            .get_mut(host.index())
            .is_some_and(|host| host.unhook(hook))
    }

    /// Registers a slot demand consulted before every create and key
    /// change.
    pub fn reserve_slots(&self, demand: SlotDemand<K>) -> HookId {
        let id = self.allocate_hook_id();
        push_hook(&mut self.demands.borrow_mut(), id, demand);
        id
    }

    /// Removes a slot demand.
    pub fn unreserve(&self, hook: HookId) -> bool {
        remove_hook(&mut self.demands.borrow_mut(), hook)
    }

    /// Snapshot of the current members of `host`.
    #[must_use]
    pub fn host_entities(&self, host: HostId) -> Vec<EntityId> {
        self.hosts
            .borrow()
            .get(host.index())
            .map(|host| host.members.clone())
            .unwrap_or_default()
    }

    /// Returns the signature a host stores.
    #[must_use]
    pub fn host_signature(&self, host: HostId) -> Option<Signature> {
        self.hosts.borrow().get(host.index()).map(|host| host.signature)
    }

    /// Number of entity hooks attached to `host`, creation and release
    /// combined.
    #[must_use]
    pub fn hook_count(&self, host: HostId) -> usize {
        self.hosts
            .borrow()
            .get(host.index())
            .map_or(0, |host| host.on_created.len() + host.on_released.len())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::config::WorldConfig;
    use crate::error::CoreError;
    use crate::ecs::{ComponentKind, EntityBuilder, SlotRequest};

    fn world() -> World<u32> {
        World::new(WorldConfig::small().with_capacity(32))
    }

    #[test]
    fn test_hosts_of_filters_by_matcher() {
        let world = world();
        world.create(EntityBuilder::new().with_key(1)).unwrap();
        world.create(EntityBuilder::new().with_key(1).root()).unwrap();
        world.create(EntityBuilder::new().root()).unwrap();

        let keyed = world.subscribe(Matcher::of(ComponentKind::Key));
        assert_eq!(world.hosts_of(keyed).len(), 2);

        let nodes_only = world.subscribe(Matcher::of(ComponentKind::Node).without(ComponentKind::Key));
        let hosts = world.hosts_of(nodes_only);
        assert_eq!(hosts.len(), 1);
        assert_eq!(world.host_entities(hosts[0]).len(), 1);
    }

    #[test]
    fn test_new_host_announced_before_first_member() {
        let world = world();
        let query = world.subscribe(Matcher::of(ComponentKind::Key));

        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        world.on_host_added(
            query,
            Rc::new(move |world: &World<u32>, host| {
                sink.borrow_mut().push(("host", world.host_entities(host).len()));
                let sink = Rc::clone(&sink);
                world.on_entity_created(
                    host,
                    Rc::new(move |_: &World<u32>, _| sink.borrow_mut().push(("created", 0))),
                );
            }),
        );

        world.create(EntityBuilder::new().with_key(5)).unwrap();
        world.create(EntityBuilder::new().with_key(6)).unwrap();
        world.create(EntityBuilder::new().root()).unwrap();

        assert_eq!(*log.borrow(), vec![("host", 0), ("created", 0), ("created", 0)]);
    }

    #[test]
    fn test_unhook_and_unsubscribe() {
        let world = world();
        world.create(EntityBuilder::new().with_key(1)).unwrap();
        let query = world.subscribe(Matcher::of(ComponentKind::Key));
        let host = world.hosts_of(query)[0];

        let hook = world.on_entity_released(host, Rc::new(|_: &World<u32>, _| {}));
        assert_eq!(world.hook_count(host), 1);
        assert!(world.unhook(host, hook));
        assert!(!world.unhook(host, hook));
        assert_eq!(world.hook_count(host), 0);

        assert!(world.unsubscribe(query));
        assert!(!world.unsubscribe(query));
        assert!(world.hosts_of(query).is_empty());
        assert!(world.on_host_added(query, Rc::new(|_: &World<u32>, _| {})).is_none());
    }

    #[test]
    fn test_released_query_slots_are_reused() {
        let world = world();
        for _ in 0..8 {
            let query = world.subscribe(Matcher::of(ComponentKind::Key));
            let nodes = world.subscribe(Matcher::of(ComponentKind::Node));
            assert!(world.unsubscribe(query));
            assert!(world.unsubscribe(nodes));
        }
        assert_eq!(world.queries.borrow().len(), 2);

        let query = world.subscribe(Matcher::of(ComponentKind::Group));
        assert_eq!(world.query_matcher(query), Some(Matcher::of(ComponentKind::Group)));
        assert_eq!(world.queries.borrow().len(), 2);
    }

    #[test]
    fn test_slot_demand_refuses_create_before_hooks_run() {
        let world: World<u32> = World::new(WorldConfig::small().with_capacity(3));
        let created = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&created);
        let query = world.subscribe(Matcher::of(ComponentKind::Key));
        world.on_host_added(
            query,
            Rc::new(move |world: &World<u32>, host| {
                let sink = Rc::clone(&sink);
                world.on_entity_created(host, Rc::new(move |_: &World<u32>, _| *sink.borrow_mut() += 1));
            }),
        );
        let demand = world.reserve_slots(Rc::new(|_: &World<u32>, request: &SlotRequest<'_, u32>| {
            let key = match request {
                SlotRequest::Create(builder) => builder.key(),
                SlotRequest::Rekey { current, .. } => Some(*current),
            };
            usize::from(key.is_some_and(|key| *key > 10))
        }));

        world.create(EntityBuilder::new().with_key(1)).unwrap();
        world.create(EntityBuilder::new().with_key(2)).unwrap();
        let err = world.create(EntityBuilder::new().with_key(11)).unwrap_err();
        assert!(matches!(err, CoreError::CapacityExhausted { capacity: 3 }));
        assert_eq!(world.alive_count(), 2);
        assert_eq!(*created.borrow(), 2);

        let id = world.create(EntityBuilder::new().with_key(3)).unwrap();
        assert!(matches!(world.set_key(id, 12), Err(CoreError::CapacityExhausted { .. })));
        assert_eq!(world.key(id), Some(3));

        assert!(world.unreserve(demand));
        assert!(!world.unreserve(demand));
        world.destroy(id);
        assert!(world.create(EntityBuilder::new().with_key(11)).is_ok());
    }

    #[test]
    fn test_swap_remove_keeps_rows_consistent() {
        let world = world();
        let a = world.create(EntityBuilder::new().with_key(1)).unwrap();
        let b = world.create(EntityBuilder::new().with_key(2)).unwrap();
        let c = world.create(EntityBuilder::new().with_key(3)).unwrap();
        let query = world.subscribe(Matcher::of(ComponentKind::Key));
        let host = world.hosts_of(query)[0];

        world.destroy(a);
        assert_eq!(world.host_entities(host), vec![c, b]);
        world.destroy(c);
        assert_eq!(world.host_entities(host), vec![b]);
        world.destroy(b);
        assert!(world.host_entities(host).is_empty());
    }
}
