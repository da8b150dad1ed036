//! # Event Dispatcher
//!
//! Synchronous, single-threaded event delivery.
//!
//! Listeners are registered either for an [`EventKind`] (they see every event
//! of that kind, whatever the target) or for a target entity (they see every
//! event addressed to it). Delivery runs target listeners first, then kind
//! listeners, in registration order, and stops early when a listener returns
//! `true`.
//!
//! Listener lists are copy-on-write: `send` clones an `Rc` to the current list
//! and walks it without holding any borrow, so a listener may freely listen,
//! unlisten or send again. Changes made during delivery take effect from the
//! next `send`.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::event::{EventKind, WorldEvent};
use crate::ecs::{EntityId, World};

/// Event handler. The returned flag means "stop further delivery".
pub type Listener<K> = Rc<dyn Fn(&World<K>, EntityId, &WorldEvent<K>) -> bool>;

/// Identifies a registered listener for [`Dispatcher::unlisten`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Clone, Copy, Debug)]
enum Route {
    Kind(EventKind),
    Target(EntityId),
}

type ListenerList<K> = Rc<Vec<(ListenerId, Listener<K>)>>;

/// Routes [`WorldEvent`]s to listeners.
pub struct Dispatcher<K> {
    next_id: Cell<u64>,
    by_kind: RefCell<HashMap<EventKind, ListenerList<K>>>,
    by_target: RefCell<HashMap<EntityId, ListenerList<K>>>,
    routes: RefCell<HashMap<ListenerId, Route>>,
    delivered: Cell<u64>,
}

impl<K> Dispatcher<K> {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(0),
            by_kind: RefCell::new(HashMap::new()),
            by_target: RefCell::new(HashMap::new()),
            routes: RefCell::new(HashMap::new()),
            delivered: Cell::new(0),
        }
    }

    /// Registers `listener` for every event of `kind`.
    pub fn listen(&self, kind: EventKind, listener: Listener<K>) -> ListenerId {
        let id = self.allocate_id();
        push_listener(&mut self.by_kind.borrow_mut(), kind, id, listener);
        self.routes.borrow_mut().insert(id, Route::Kind(kind));
        id
    }

    /// Registers `listener` for every event addressed to `target`.
    pub fn listen_target(&self, target: EntityId, listener: Listener<K>) -> ListenerId {
        let id = self.allocate_id();
        push_listener(&mut self.by_target.borrow_mut(), target, id, listener);
        self.routes.borrow_mut().insert(id, Route::Target(target));
        id
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn unlisten(&self, id: ListenerId) -> bool {
        let Some(route) = self.routes.borrow_mut().remove(&id) else {
            return false;
        };
        match route {
            Route::Kind(kind) => remove_listener(&mut self.by_kind.borrow_mut(), kind, id),
            Route::Target(target) => remove_listener(&mut self.by_target.borrow_mut(), target, id),
        }
        true
    }

    /// Drops every target listener registered for `target`.
    pub(crate) fn forget_target(&self, target: EntityId) {
        let Some(list) = self.by_target.borrow_mut().remove(&target) else {
            return;
        };
        let mut routes = self.routes.borrow_mut();
        for (id, _) in list.iter() {
            routes.remove(id);
        }
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.routes.borrow().len()
    }

    /// Total number of events delivered so far.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.delivered.get()
    }

    /// Delivers `event` to listeners. Returns `true` if a listener stopped
    /// delivery.
    pub(crate) fn deliver(&self, world: &World<K>, target: EntityId, event: &WorldEvent<K>) -> bool {
        self.delivered.set(self.delivered.get() + 1);

        let targeted = self.by_target.borrow().get(&target).cloned();
        if let Some(list) = targeted {
            if run(&list, world, target, event) {
                return true;
            }
        }

        let by_kind = self.by_kind.borrow().get(&event.kind()).cloned();
        by_kind.is_some_and(|list| run(&list, world, target, event))
    }

    fn allocate_id(&self) -> ListenerId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        ListenerId(id)
    }
}

impl<K> Default for Dispatcher<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> fmt::Debug for Dispatcher<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("listeners", &self.listener_count())
            .field("delivered", &self.delivered())
            .finish_non_exhaustive()
    }
}

fn run<K>(
    list: &[(ListenerId, Listener<K>)],
    world: &World<K>,
    target: EntityId,
    event: &WorldEvent<K>,
) -> bool {
    list.iter().any(|(_, listener)| listener(world, target, event))
}

fn push_listener<R, K>(
    map: &mut HashMap<R, ListenerList<K>>,
    route: R,
    id: ListenerId,
    listener: Listener<K>,
) where
    R: std::hash::Hash + Eq,
{
    let list = map.entry(route).or_insert_with(|| Rc::new(Vec::new()));
    // Clones only if a delivery is currently walking this list.
    Rc::make_mut(list).push((id, listener));
}

fn remove_listener<R, K>(map: &mut HashMap<R, ListenerList<K>>, route: R, id: ListenerId)
where
    R: std::hash::Hash + Eq,
{
    let Some(list) = map.get_mut(&route) else {
        return;
    };
    Rc::make_mut(list).retain(|(listener_id, _)| *listener_id != id);
    if list.is_empty() {
        map.remove(&route);
    }
}
