//! # Container Pool
//!
//! Free-list of cleared containers, reused to avoid allocation churn when
//! auxiliary collections (group membership sets, children sets, scratch
//! buffers) are created and emptied over and over.

use std::collections::{HashMap, HashSet};
use std::hash::{BuildHasher, Hash};

/// A container that can be emptied while keeping its allocation.
pub trait Recycle: Default {
    /// Removes all contents, keeping capacity.
    fn recycle(&mut self);

    /// Whether the container currently holds nothing.
    fn is_vacant(&self) -> bool;
}

impl<T> Recycle for Vec<T> {
    #[inline]
    fn recycle(&mut self) {
        self.clear();
    }

    #[inline]
    fn is_vacant(&self) -> bool {
        self.is_empty()
    }
}

impl<T, S> Recycle for HashSet<T, S>
where
    T: Eq + Hash,
    S: BuildHasher + Default,
{
    #[inline]
    fn recycle(&mut self) {
        self.clear();
    }

    #[inline]
    fn is_vacant(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V, S> Recycle for HashMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Default,
{
    #[inline]
    fn recycle(&mut self) {
        self.clear();
    }

    #[inline]
    fn is_vacant(&self) -> bool {
        self.is_empty()
    }
}

/// Counters describing pool traffic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Containers built from scratch (including warm-up).
    pub allocated: usize,
    /// Acquisitions served from the free-list.
    pub reused: usize,
    /// Containers returned to the free-list.
    pub released: usize,
}

/// A stack of reusable containers.
///
/// `acquire` pops a cleared container (or builds a fresh one when the stack
/// is empty) and `release` clears and pushes it back. The pool never shrinks
/// on its own; call [`Pool::trim`] to drop surplus containers.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. Each reactor owns its own pool.
///
/// # Example
///
/// ```rust
/// use std::collections::HashSet;
/// use tessera_core::Pool;
///
/// let mut pool: Pool<HashSet<u32>> = Pool::new();
///
/// let mut set = pool.acquire();
/// set.insert(7);
/// pool.release(set);
///
/// // Same allocation, already cleared.
/// let set = pool.acquire();
/// assert!(set.is_empty());
/// assert_eq!(pool.stats().reused, 1);
/// ```
#[derive(Debug)]
pub struct Pool<T> {
    /// Free list - cleared containers ready for reuse.
    free_list: Vec<T>,
    stats: PoolStats,
}

impl<T: Recycle> Pool<T> {
    /// Creates an empty pool.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            free_list: Vec::new(),
            stats: PoolStats {
                allocated: 0,
                reused: 0,
                released: 0,
            },
        }
    }

    /// Creates a pool holding `count` fresh containers.
    #[must_use]
    pub fn with_prealloc(count: usize) -> Self {
        let mut free_list = Vec::with_capacity(count);
        free_list.extend((0..count).map(|_| T::default()));
        Self {
            free_list,
            stats: PoolStats {
                allocated: count,
                reused: 0,
                released: 0,
            },
        }
    }

    /// Takes a container from the pool, building one if the pool is empty.
    ///
    /// The returned container is always empty.
    #[inline]
    pub fn acquire(&mut self) -> T {
        if let Some(container) = self.free_list.pop() {
            self.stats.reused += 1;
            container
        } else {
            self.stats.allocated += 1;
            T::default()
        }
    }

    /// Clears `container` and returns it to the pool.
    #[inline]
    pub fn release(&mut self, mut container: T) {
        container.recycle();
        debug_assert!(container.is_vacant());
        self.stats.released += 1;
        self.free_list.push(container);
    }

    /// Number of containers waiting in the free-list.
    #[inline]
    #[must_use]
    pub fn pooled(&self) -> usize {
        self.free_list.len()
    }

    /// Traffic counters.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Drops pooled containers until at most `keep` remain.
    pub fn trim(&mut self, keep: usize) {
        self.free_list.truncate(keep);
    }
}

impl<T: Recycle> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}
