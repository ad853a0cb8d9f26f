//! Component type registration and metadata.
//!
//! Component types are registered once, at world construction, with a
//! stable name and the codec their values use. Registration order is
//! part of a world's identity: ids are dense from 1 in registration
//! order, and a reloaded world must register the same types in the same
//! order (new types may be appended).

use std::fmt;
use std::io::{Read, Write};

use hashbrown::HashMap;
use ward_codec::{Decode, Encode};

use crate::StateError;

/// Dense identifier for a registered component type. Ids start at 1.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u16);

impl TypeId {
    #[must_use]
    pub const fn from_raw(id: u16) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn as_raw(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

impl Encode for TypeId {
    fn encode<W: Write>(&self, writer: &mut W) -> ward_codec::Result<()> {
        self.0.encode(writer)
    }
}

impl Decode for TypeId {
    fn decode<R: Read>(reader: &mut R) -> ward_codec::Result<Self> {
        Ok(Self(u16::decode(reader)?))
    }
}

/// A value that can live on an entity.
///
/// The default value is what `create` writes into a fresh row; the codec
/// is what columns store at rest.
pub trait Component: Encode + Decode + Default + Send + Sync + 'static {
    /// Stable name, unique within a world. Persisted alongside the
    /// assigned [`TypeId`] to detect schema drift across restarts.
    const NAME: &'static str;
}

/// Runtime metadata for one registered component type.
#[derive(Clone)]
pub struct ComponentInfo {
    id: TypeId,
    name: &'static str,
    default_fn: fn() -> ward_codec::Result<Vec<u8>>,
}

impl ComponentInfo {
    #[must_use]
    pub const fn id(&self) -> TypeId {
        self.id
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Encode the component's default value.
    pub fn default_bytes(&self) -> ward_codec::Result<Vec<u8>> {
        (self.default_fn)()
    }
}

impl fmt::Debug for ComponentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInfo")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

fn encode_default<T: Component>() -> ward_codec::Result<Vec<u8>> {
    ward_codec::encode_to_vec(&T::default())
}

/// Registry mapping Rust component types to dense [`TypeId`]s.
#[derive(Default)]
pub struct ComponentRegistry {
    by_rust_type: HashMap<std::any::TypeId, TypeId>,
    by_name: HashMap<&'static str, TypeId>,
    infos: Vec<ComponentInfo>,
}

impl ComponentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component type, assigning the next dense id.
    ///
    /// Registering the same type or the same name twice is an error.
    pub fn register<T: Component>(&mut self) -> Result<TypeId, StateError> {
        let rust_id = std::any::TypeId::of::<T>();
        if self.by_rust_type.contains_key(&rust_id) || self.by_name.contains_key(T::NAME) {
            return Err(StateError::ComponentAlreadyRegistered(T::NAME));
        }

        let id = TypeId((self.infos.len() + 1) as u16);
        self.by_rust_type.insert(rust_id, id);
        self.by_name.insert(T::NAME, id);
        self.infos.push(ComponentInfo {
            id,
            name: T::NAME,
            default_fn: encode_default::<T>,
        });
        Ok(id)
    }

    /// The id assigned to `T`, if registered.
    #[must_use]
    pub fn id_of<T: Component>(&self) -> Option<TypeId> {
        self.by_rust_type.get(&std::any::TypeId::of::<T>()).copied()
    }

    #[must_use]
    pub fn id_by_name(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    #[must_use]
    pub fn info(&self, id: TypeId) -> Option<&ComponentInfo> {
        let idx = (id.as_raw() as usize).checked_sub(1)?;
        self.infos.get(idx)
    }

    pub fn default_bytes(&self, id: TypeId) -> Result<Vec<u8>, StateError> {
        let info = self.info(id).ok_or(StateError::UnknownComponent(id))?;
        Ok(info.default_bytes()?)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// `(id, name)` pairs in registration order, the persisted form.
    #[must_use]
    pub fn manifest(&self) -> Vec<(u16, String)> {
        self.infos
            .iter()
            .map(|info| (info.id.as_raw(), info.name.to_string()))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentInfo> {
        self.infos.iter()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("count", &self.len())
            .finish()
    }
}
