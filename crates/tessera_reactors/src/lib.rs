//! # Tessera Reactors
//!
//! Incrementally maintained indexes over a [`tessera_core::World`]:
//!
//! - [`Aggregator`] groups keyed entities behind a representative entity
//! - [`Mapper`] binds each key to the entity that carries it
//! - [`Hierarchy`] tracks parent/children links and cascading enabled state
//!
//! ## Design Principles
//!
//! 1. **No rescans** - after activation every update is a delta
//! 2. **Replay on activation** - a reactor started late sees existing entities
//! 3. **Consistent before visible** - derived events are sent only after the
//!    index reflects the change
//! 4. **Pooled auxiliary sets** - membership and children sets are recycled
//!
//! ## Example
//!
//! ```rust
//! use tessera_core::{EntityBuilder, World, WorldConfig};
//! use tessera_reactors::{Hierarchy, Reactor};
//!
//! let world: World<u32> = World::new(WorldConfig::small());
//! let hierarchy = Hierarchy::new();
//! Hierarchy::activate(&hierarchy, &world);
//!
//! let root = world.create(EntityBuilder::new().root()).unwrap();
//! let child = world.create(EntityBuilder::new().child_of(root)).unwrap();
//!
//! world.set_self_enabled(root, false).unwrap();
//! assert!(!hierarchy.is_enabled(child));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod aggregator;
pub mod error;
pub mod harness;
pub mod hierarchy;
pub mod mapper;

pub use aggregator::{AggregationGroup, Aggregator, GroupSnapshot};
pub use error::{ReactorError, ReactorResult};
pub use harness::{DemandHandler, EntityHandler, EventHandler, Reactor, ReactorHarness};
pub use hierarchy::Hierarchy;
pub use mapper::Mapper;
