//! Storage and state errors.

use thiserror::Error;

use crate::{EntityId, TypeId};

#[derive(Error, Debug)]
pub enum StateError {
    #[error("kv error: {0}")]
    Kv(#[from] ward_kv::KvError),

    #[error("codec error: {0}")]
    Codec(#[from] ward_codec::CodecError),

    #[error("no such entity: {0}")]
    NoSuchEntity(EntityId),

    #[error("duplicate component in set")]
    DuplicateComponent,

    #[error("component {type_id:?} already present on entity {entity}")]
    ComponentAlreadyPresent { type_id: TypeId, entity: EntityId },

    #[error("component {type_id:?} not on entity {entity}")]
    ComponentNotOnEntity { type_id: TypeId, entity: EntityId },

    #[error("component type {0:?} is not registered")]
    UnknownComponent(TypeId),

    #[error("component {0:?} is already registered")]
    ComponentAlreadyRegistered(&'static str),

    #[error("saved component set does not match registered components: {0}")]
    ComponentMismatchWithSavedState(String),

    #[error("persisted state is corrupt: {0}")]
    Corrupt(String),
}
