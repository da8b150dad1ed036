//! # Signatures and Matchers
//!
//! A [`Signature`] is the set of component kinds an entity carries, stored
//! as a bitset over the closed [`ComponentKind`] enumeration. Every distinct
//! signature gets its own host (partition) in the world.
//!
//! A [`Matcher`] is the predicate a reactor subscribes with. It is resolved
//! once, at subscription time, into two masks; matching a host is a pair of
//! bit tests.

use super::component::ComponentKind;

/// Bitset of component kinds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Signature(u8);

impl Signature {
    /// Signature with no components.
    pub const EMPTY: Self = Self(0);

    /// Builds a signature from a list of kinds. Duplicates are ignored.
    #[must_use]
    pub fn of(kinds: &[ComponentKind]) -> Self {
        kinds.iter().fold(Self::EMPTY, |sig, &kind| sig.with(kind))
    }

    /// Returns a copy with `kind` added.
    #[inline]
    #[must_use]
    pub const fn with(self, kind: ComponentKind) -> Self {
        Self(self.0 | kind.bit())
    }

    /// Checks if this signature contains a component kind.
    #[inline]
    #[must_use]
    pub const fn contains(self, kind: ComponentKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Returns the number of component kinds.
    #[inline]
    #[must_use]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Checks if empty.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    const fn bits(self) -> u8 {
        self.0
    }
}

/// Component-membership predicate used to subscribe to the lifecycle feed.
///
/// A host matches when its signature contains every required kind and none
/// of the excluded ones.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Matcher {
    required: Signature,
    excluded: Signature,
}

impl Matcher {
    /// Matches every entity carrying `kind`.
    #[must_use]
    pub const fn of(kind: ComponentKind) -> Self {
        Self {
            required: Signature::EMPTY.with(kind),
            excluded: Signature::EMPTY,
        }
    }

    /// Matches every entity carrying all of `kinds`.
    #[must_use]
    pub fn all(kinds: &[ComponentKind]) -> Self {
        Self {
            required: Signature::of(kinds),
            excluded: Signature::EMPTY,
        }
    }

    /// Additionally requires `kind`.
    #[must_use]
    pub const fn with(mut self, kind: ComponentKind) -> Self {
        self.required = self.required.with(kind);
        self
    }

    /// Rejects entities carrying `kind`.
    #[must_use]
    pub const fn without(mut self, kind: ComponentKind) -> Self {
        self.excluded = self.excluded.with(kind);
        self
    }

    /// Tests a host signature against this predicate.
    #[inline]
    #[must_use]
    pub const fn matches(&self, signature: Signature) -> bool {
        let bits = signature.bits();
        bits & self.required.bits() == self.required.bits() && bits & self.excluded.bits() == 0
    }
}
