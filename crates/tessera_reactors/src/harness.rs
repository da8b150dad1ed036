//! # Reactor Harness
//!
//! Subscription scaffolding shared by every reactor.
//!
//! Activation subscribes to the lifecycle feed with the reactor's
//! [`Matcher`], attaches creation and release hooks to every matching host
//! (existing ones now, later ones as the world announces them) and replays
//! the current members of each host through
//! [`Reactor::on_entity_added`]. A reactor activated after its entities
//! already exist therefore starts fully populated.
//!
//! Every hook and listener the harness installs holds a [`Weak`] reference
//! to the reactor, so dropping the last `Rc` silently turns them into no-ops.
//! Listeners always return `false`; reactors observe events, they never stop
//! their delivery.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tessera_core::{
    EntityId, EntityKey, EventKind, HookId, HostId, ListenerId, Matcher, QueryId, SlotRequest, World,
    WorldEvent,
};
use tracing::debug;

/// Entity hook body, called with the reactor itself.
pub type EntityHandler<R, K> = fn(&R, &World<K>, EntityId);

/// Event listener body, called with the reactor itself.
pub type EventHandler<R, K> = fn(&R, &World<K>, EntityId, &WorldEvent<K>);

/// Slot demand body, called with the reactor itself.
pub type DemandHandler<R, K> = fn(&R, &World<K>, &SlotRequest<'_, K>) -> usize;

/// An incrementally maintained index over a filtered entity feed.
///
/// Implementors provide the matcher and the two membership callbacks; the
/// provided [`activate`](Reactor::activate) and
/// [`deactivate`](Reactor::deactivate) do the wiring through the embedded
/// [`ReactorHarness`].
pub trait Reactor<K: EntityKey>: Sized + 'static {
    /// Component predicate selecting the entities this reactor indexes.
    fn matcher(&self) -> Matcher;

    /// The wiring state embedded in the reactor.
    fn harness(&self) -> &ReactorHarness;

    /// An entity entered the feed (created, or replayed on activation).
    fn on_entity_added(&self, world: &World<K>, entity: EntityId);

    /// An entity is being released. Its components are still readable.
    fn on_entity_removed(&self, world: &World<K>, entity: EntityId);

    /// Called once per activation, before replay. Register event listeners
    /// and extra feeds here.
    fn on_activate(this: &Rc<Self>, world: &World<K>) {
        let _ = (this, world);
    }

    /// Called once per deactivation, after every hook and listener is gone.
    fn on_deactivate(&self, world: &World<K>) {
        let _ = world;
    }

    /// Wires the reactor into `world` and replays existing entities.
    ///
    /// Returns `false` if the reactor is already active.
    fn activate(this: &Rc<Self>, world: &World<K>) -> bool {
        if this.harness().is_active() {
            return false;
        }
        this.harness().state.borrow_mut().active = true;

        Self::on_activate(this, world);
        this.harness().wire(
            this,
            world,
            this.matcher(),
            Some(Self::on_entity_added),
            Some(Self::on_entity_removed),
            true,
        );
        debug!(reactor = std::any::type_name::<Self>(), "reactor activated");
        true
    }

    /// Detaches every hook and listener, then lets the reactor drop its
    /// index.
    ///
    /// Returns `false` if the reactor was not active. Calling it twice is
    /// harmless.
    fn deactivate(&self, world: &World<K>) -> bool {
        if !self.harness().unwire(world) {
            return false;
        }
        self.on_deactivate(world);
        debug!(reactor = std::any::type_name::<Self>(), "reactor deactivated");
        true
    }
}

#[derive(Debug, Default)]
struct HarnessState {
    active: bool,
    queries: Vec<QueryId>,
    hooks: Vec<(HostId, HookId)>,
    listeners: Vec<ListenerId>,
    demands: Vec<HookId>,
}

/// Records everything a reactor has attached to a world so it can be
/// detached again.
#[derive(Debug, Default)]
pub struct ReactorHarness {
    state: RefCell<HarnessState>,
}

impl ReactorHarness {
    /// Creates an inactive harness.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the owning reactor is wired into a world.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.borrow().active
    }

    /// Number of entity hooks currently attached.
    #[must_use]
    pub fn hook_count(&self) -> usize {
        self.state.borrow().hooks.len()
    }

    /// Number of event listeners currently registered.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.state.borrow().listeners.len()
    }

    /// Registers a listener for every event of `kind`, removed on
    /// deactivation.
    pub fn listen<K, R>(&self, reactor: &Rc<R>, world: &World<K>, kind: EventKind, handler: EventHandler<R, K>)
    where
        K: EntityKey,
        R: Reactor<K>,
    {
        let weak = Rc::downgrade(reactor);
        let id = world.listen(
            kind,
            Rc::new(move |world: &World<K>, target: EntityId, event: &WorldEvent<K>| {
                if let Some(reactor) = weak.upgrade() {
                    handler(&reactor, world, target, event);
                }
                false
            }),
        );
        self.state.borrow_mut().listeners.push(id);
    }

    /// Registers a slot demand with the world, removed on deactivation.
    pub fn reserve<K, R>(&self, reactor: &Rc<R>, world: &World<K>, handler: DemandHandler<R, K>)
    where
        K: EntityKey,
        R: Reactor<K>,
    {
        let weak = Rc::downgrade(reactor);
        let id = world.reserve_slots(Rc::new(move |world: &World<K>, request: &SlotRequest<'_, K>| {
            weak.upgrade().map_or(0, |reactor| handler(&reactor, world, request))
        }));
        self.state.borrow_mut().demands.push(id);
    }

    /// Subscribes a secondary feed whose released entities are reported to
    /// `handler`. Existing entities are not replayed.
    pub fn watch_released<K, R>(&self, reactor: &Rc<R>, world: &World<K>, matcher: Matcher, handler: EntityHandler<R, K>)
    where
        K: EntityKey,
        R: Reactor<K>,
    {
        self.wire(reactor, world, matcher, None, Some(handler), false);
    }

    fn wire<K, R>(
        &self,
        reactor: &Rc<R>,
        world: &World<K>,
        matcher: Matcher,
        on_created: Option<EntityHandler<R, K>>,
        on_released: Option<EntityHandler<R, K>>,
        replay: bool,
    ) where
        K: EntityKey,
        R: Reactor<K>,
    {
        let query = world.subscribe(matcher);
        self.state.borrow_mut().queries.push(query);

        let weak = Rc::downgrade(reactor);
        world.on_host_added(
            query,
            Rc::new(move |world: &World<K>, host: HostId| {
                if let Some(reactor) = weak.upgrade() {
                    attach(&reactor, world, host, on_created, on_released);
                }
            }),
        );

        for host in world.hosts_of(query) {
            attach(reactor, world, host, on_created, on_released);
            let Some(added) = on_created.filter(|_| replay) else {
                continue;
            };
            for entity in world.host_entities(host) {
                // A replayed callback may already have destroyed it.
                if world.is_alive(entity) {
                    added(reactor, world, entity);
                }
            }
        }
    }

    fn unwire<K: EntityKey>(&self, world: &World<K>) -> bool {
        let state = std::mem::take(&mut *self.state.borrow_mut());
        if !state.active {
            return false;
        }
        for query in state.queries {
            world.unsubscribe(query);
        }
        for (host, hook) in state.hooks {
            world.unhook(host, hook);
        }
        for listener in state.listeners {
            world.unlisten(listener);
        }
        for demand in state.demands {
            world.unreserve(demand);
        }
        true
    }
}

fn attach<K, R>(
    reactor: &Rc<R>,
    world: &World<K>,
    host: HostId,
    on_created: Option<EntityHandler<R, K>>,
    on_released: Option<EntityHandler<R, K>>,
) where
    K: EntityKey,
    R: Reactor<K>,
{
    let mut hooks = Vec::with_capacity(2);
    if let Some(handler) = on_created {
        hooks.push(world.on_entity_created(host, entity_hook(reactor, handler)));
    }
    if let Some(handler) = on_released {
        hooks.push(world.on_entity_released(host, entity_hook(reactor, handler)));
    }
    reactor
        .harness()
        .state
        .borrow_mut()
        .hooks
        .extend(hooks.into_iter().map(|hook| (host, hook)));
}

fn entity_hook<K, R>(reactor: &Rc<R>, handler: EntityHandler<R, K>) -> tessera_core::EntityHook<K>
where
    K: EntityKey,
    R: 'static,
{
    let weak: Weak<R> = Rc::downgrade(reactor);
    Rc::new(move |world: &World<K>, entity: EntityId| {
        if let Some(reactor) = weak.upgrade() {
            handler(&reactor, world, entity);
        }
    })
}
