//! # Entity World
//!
//! Single-threaded entity storage plus the lifecycle feed reactors subscribe
//! to.
//!
//! ## Design Philosophy
//!
//! - Entity handles are slot indices with generation counters
//! - Entities are partitioned into hosts by component signature
//! - Component kinds form a closed set matched by bitsets
//! - Callbacks never run while world state is borrowed

mod component;
mod entity;
mod feed;
mod host;
mod signature;
mod world;

pub use component::{ComponentKind, EntityBuilder, EntityKey, Node};
pub use entity::EntityId;
pub use host::{EntityHook, HookId, HostHook, HostId, QueryId, SlotDemand, SlotRequest};
pub use signature::{Matcher, Signature};
pub use world::World;
