//! Entity/archetype storage with a staged, tick-atomic write buffer.
//!
//! Entities are stored as rows of archetype tables. An archetype is a
//! unique set of component types; every entity with that exact set lives
//! in the same table, one encoded value per component per row. The
//! committed form of every table is mirrored in a key-value store so a
//! restarted process rebuilds the identical world.
//!
//! Mutation never touches committed state directly. All writes of one
//! tick collect in a [`WriteBuffer`] that reads through to committed
//! state and either commits as one atomic key-value transaction or is
//! dropped without a trace.

mod archetype;
mod buffer;
mod component;
mod entity;
mod error;
mod filter;
mod state;

pub use archetype::{canonical_set, Archetype, ArchetypeId, ArchetypeTable, ComponentSet};
pub use buffer::{SearchIter, WriteBuffer};
pub use component::{Component, ComponentInfo, ComponentRegistry, TypeId};
pub use entity::{EntityId, Location};
pub use error::StateError;
pub use filter::Filter;
pub use state::GameState;
