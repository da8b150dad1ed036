//! # Event Bus
//!
//! Commands and derived events, delivered synchronously to listeners keyed
//! by event kind or by target entity.

mod dispatcher;
mod event;

pub use dispatcher::{Dispatcher, Listener, ListenerId};
pub use event::{EventKind, WorldEvent};
