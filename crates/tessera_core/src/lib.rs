//! # Tessera Core
//!
//! The collaborator layer incremental indexes are built on:
//! - An entity world with generational handles and signature partitions
//! - A lifecycle feed reporting partitions and entity churn per matcher
//! - A synchronous event dispatcher for commands and derived events
//! - Free-list pools for auxiliary collections
//!
//! ## Architecture Rules
//!
//! 1. **Single writer** - the world is `!Sync` and every callback runs on the
//!    caller's thread before the triggering call returns
//! 2. **Re-entrant callbacks** - hooks and listeners may create, destroy and
//!    send; no borrow is held while they run
//! 3. **Closed component set** - matchers are bitsets, resolved once
//!
//! ## Example
//!
//! ```rust
//! use tessera_core::{ComponentKind, EntityBuilder, Matcher, World, WorldConfig};
//!
//! let world: World<&'static str> = World::new(WorldConfig::small());
//! world.create(EntityBuilder::new().with_key("red")).unwrap();
//!
//! let query = world.subscribe(Matcher::of(ComponentKind::Key));
//! let members: usize = world
//!     .hosts_of(query)
//!     .into_iter()
//!     .map(|host| world.host_entities(host).len())
//!     .sum();
//! assert_eq!(members, 1);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod ecs;
pub mod error;
pub mod events;
pub mod memory;

pub use config::{ReactorConfig, TesseraConfig, WorldConfig};
pub use ecs::{
    ComponentKind, EntityBuilder, EntityHook, EntityId, EntityKey, HookId, HostHook, HostId, Matcher,
    Node, QueryId, Signature, SlotDemand, SlotRequest, World,
};
pub use error::{CoreError, CoreResult};
pub use events::{Dispatcher, EventKind, Listener, ListenerId, WorldEvent};
pub use memory::{Pool, PoolStats, Recycle};
