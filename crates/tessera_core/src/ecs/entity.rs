//! # Entity Handles
//!
//! Entities are opaque handles into the world's slot table:
//! - A slot index
//! - A generation counter, bumped on every release
//!
//! Reactors only ever compare and hash handles; they never look inside.

use std::fmt;

use super::signature::Signature;

/// Handle to an entity stored in a [`World`](super::World).
///
/// The handle is split into two parts:
/// - Lower 32 bits: slot index
/// - Upper 32 bits: generation of the slot when the entity was created
///
/// Two handles are equal only if both parts match, so a handle kept past
/// the entity's release never aliases the slot's next occupant.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Null/invalid entity handle.
    pub const NULL: Self = Self(u64::MAX);

    /// Creates a handle from slot index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Returns the slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Checks if this is the null handle.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }

    /// Returns the raw 64-bit representation.
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("EntityId(null)")
        } else {
            write!(f, "EntityId({}v{})", self.index(), self.generation())
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Lifecycle state of a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SlotState {
    /// Free for reuse.
    Vacant,
    /// Holds a live entity.
    Alive,
    /// Release hooks are running; components are still readable.
    Releasing,
}

/// One entry of the world's slot table.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Slot {
    /// Generation of the current (or last) occupant.
    pub generation: u32,
    pub state: SlotState,
    /// Component signature of the occupant.
    pub signature: Signature,
    /// Host the occupant lives in.
    pub host: u32,
    /// Row inside the host's member list.
    pub row: u32,
}

impl Slot {
    /// Creates a vacant slot.
    #[inline]
    pub(crate) const fn vacant() -> Self {
        Self {
            generation: 0,
            state: SlotState::Vacant,
            signature: Signature::EMPTY,
            host: 0,
            row: 0,
        }
    }

    /// True if `id` refers to the current occupant and it has not started
    /// releasing.
    #[inline]
    pub(crate) fn is_live(&self, id: EntityId) -> bool {
        self.state == SlotState::Alive && self.generation == id.generation()
    }

    /// True if `id` refers to the current occupant, including while its
    /// release hooks run.
    #[inline]
    pub(crate) fn is_readable(&self, id: EntityId) -> bool {
        self.state != SlotState::Vacant && self.generation == id.generation()
    }
}
