//! # Entity Hosts
//!
//! A host is the partition of the world holding every entity with one
//! particular [`Signature`]. Hosts are created lazily and never removed, so a
//! [`HostId`] stays valid for the world's lifetime.
//!
//! Each host keeps a dense member list (swap-remove on release, the row is
//! tracked in the entity's slot) and the hook lists the lifecycle feed
//! invokes on creation and release.

use std::fmt;
use std::rc::Rc;

use super::component::EntityBuilder;
use super::entity::EntityId;
use super::signature::{Matcher, Signature};
use super::world::World;

/// Hook invoked with an entity that was created in, or is being released
/// from, a host.
pub type EntityHook<K> = Rc<dyn Fn(&World<K>, EntityId)>;

/// Hook invoked when a host matching a query appears.
pub type HostHook<K> = Rc<dyn Fn(&World<K>, HostId)>;

/// Hook reporting how many free slots its owner needs on top of the
/// operation's own, for the request about to run.
pub type SlotDemand<K> = Rc<dyn Fn(&World<K>, &SlotRequest<'_, K>) -> usize>;

/// A world operation checked against registered slot demands.
#[derive(Debug)]
pub enum SlotRequest<'a, K> {
    /// [`World::create`] with this bundle.
    Create(&'a EntityBuilder<K>),
    /// [`World::set_key`] on an entity.
    Rekey {
        /// Key the entity carries now.
        previous: &'a K,
        /// Key it is about to take.
        current: &'a K,
    },
}

/// Identifies a host (partition).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(pub(crate) u32);

impl HostId {
    /// Position of the host in creation order.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifies a registered hook for [`World::unhook`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HookId(pub(crate) u64);

/// Identifies a feed subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct QueryId(pub(crate) u32);

pub(crate) type HookList<T> = Rc<Vec<(HookId, T)>>;

/// One partition of the world.
pub(crate) struct EntityHost<K> {
    pub signature: Signature,
    /// Dense list of live members. Order is creation order until a
    /// swap-remove moves the last member into a vacated row.
    pub members: Vec<EntityId>,
    pub on_created: HookList<EntityHook<K>>,
    pub on_released: HookList<EntityHook<K>>,
}

impl<K> EntityHost<K> {
    pub(crate) fn new(signature: Signature) -> Self {
        Self {
            signature,
            members: Vec::new(),
            on_created: Rc::new(Vec::new()),
            on_released: Rc::new(Vec::new()),
        }
    }

    /// Appends a member and returns its row.
    pub(crate) fn push(&mut self, id: EntityId) -> u32 {
        let row = u32::try_from(self.members.len()).unwrap_or(u32::MAX);
        self.members.push(id);
        row
    }

    /// Removes the member at `row`. Returns the member that moved into the
    /// vacated row, if any.
    pub(crate) fn swap_remove(&mut self, row: u32) -> Option<EntityId> {
        let row = row as usize;
        self.members.swap_remove(row);
        self.members.get(row).copied()
    }

    /// Removes a hook from either list.
    pub(crate) fn unhook(&mut self, hook: HookId) -> bool {
        remove_hook(&mut self.on_created, hook) || remove_hook(&mut self.on_released, hook)
    }
}

impl<K> fmt::Debug for EntityHost<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityHost")
            .field("signature", &self.signature)
            .field("members", &self.members.len())
            .field("on_created", &self.on_created.len())
            .field("on_released", &self.on_released.len())
            .finish()
    }
}

/// A feed subscription: a matcher plus the hooks to run when a new matching
/// host appears.
pub(crate) struct Query<K> {
    pub matcher: Matcher,
    pub on_host_added: HookList<HostHook<K>>,
}

impl<K> Query<K> {
    pub(crate) fn new(matcher: Matcher) -> Self {
        Self {
            matcher,
            on_host_added: Rc::new(Vec::new()),
        }
    }
}

pub(crate) fn push_hook<T: Clone>(list: &mut HookList<T>, id: HookId, hook: T) {
    Rc::make_mut(list).push((id, hook));
}

pub(crate) fn remove_hook<T: Clone>(list: &mut HookList<T>, id: HookId) -> bool {
    let Some(pos) = list.iter().position(|(hook_id, _)| *hook_id == id) else {
        return false;
    };
    Rc::make_mut(list).remove(pos);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_remove_reports_moved_member() {
        let mut host: EntityHost<u32> = EntityHost::new(Signature::EMPTY);
        let a = EntityId::new(0, 1);
        let b = EntityId::new(1, 1);
        let c = EntityId::new(2, 1);
        assert_eq!(host.push(a), 0);
        assert_eq!(host.push(b), 1);
        assert_eq!(host.push(c), 2);

        assert_eq!(host.swap_remove(0), Some(c));
        assert_eq!(host.members, vec![c, b]);

        assert_eq!(host.swap_remove(1), None);
        assert_eq!(host.members, vec![c]);
    }

    #[test]
    fn test_unhook_searches_both_lists() {
        let mut host: EntityHost<u32> = EntityHost::new(Signature::EMPTY);
        let hook: EntityHook<u32> = Rc::new(|_: &World<u32>, _: EntityId| {});
        push_hook(&mut host.on_created, HookId(1), Rc::clone(&hook));
        push_hook(&mut host.on_released, HookId(2), hook);

        assert!(host.unhook(HookId(2)));
        assert!(host.unhook(HookId(1)));
        assert!(!host.unhook(HookId(1)));
        assert!(host.on_created.is_empty());
        assert!(host.on_released.is_empty());
    }
}
