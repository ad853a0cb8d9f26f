//! Archetype tables: entities grouped by their exact component set.
//!
//! The canonical form of a component set is ascending [`TypeId`] order.
//! The same set always resolves to the same [`ArchetypeId`], including
//! across process restarts; the table of known archetypes is persisted
//! whole and rebuilt on load.

use std::fmt;

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::{EntityId, StateError, TypeId};

/// Dense identifier for an archetype.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchetypeId(u32);

impl ArchetypeId {
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArchetypeId({})", self.0)
    }
}

/// A component set in canonical order.
pub type ComponentSet = SmallVec<[TypeId; 8]>;

/// Sort a component set into canonical ascending order.
///
/// Fails with [`StateError::DuplicateComponent`] when the same type
/// appears twice.
pub fn canonical_set(ids: &[TypeId]) -> Result<ComponentSet, StateError> {
    let mut set: ComponentSet = ids.iter().copied().collect();
    set.sort_unstable();
    for pair in set.windows(2) {
        if pair[0] == pair[1] {
            return Err(StateError::DuplicateComponent);
        }
    }
    Ok(set)
}

/// One archetype: a row-indexed entity list plus one column of encoded
/// values per member component type.
///
/// Columns are loaded from storage lazily; `None` means not yet read.
/// All loaded columns have exactly as many cells as there are rows.
pub struct Archetype {
    id: ArchetypeId,
    components: ComponentSet,
    entities: Vec<EntityId>,
    columns: Vec<Option<Vec<Vec<u8>>>>,
}

impl Archetype {
    #[must_use]
    pub fn new(id: ArchetypeId, components: ComponentSet) -> Self {
        let columns = vec![None; components.len()];
        Self {
            id,
            components,
            entities: Vec::new(),
            columns,
        }
    }

    #[must_use]
    pub const fn id(&self) -> ArchetypeId {
        self.id
    }

    #[must_use]
    pub fn components(&self) -> &ComponentSet {
        &self.components
    }

    #[must_use]
    pub fn contains(&self, type_id: TypeId) -> bool {
        self.components.binary_search(&type_id).is_ok()
    }

    #[must_use]
    pub fn column_index(&self, type_id: TypeId) -> Option<usize> {
        self.components.binary_search(&type_id).ok()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    #[must_use]
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    pub(crate) fn set_entities(&mut self, entities: Vec<EntityId>) {
        self.entities = entities;
    }

    pub(crate) fn column(&self, index: usize) -> Option<&Vec<Vec<u8>>> {
        self.columns.get(index)?.as_ref()
    }

    pub(crate) fn set_column(&mut self, index: usize, cells: Vec<Vec<u8>>) {
        self.columns[index] = Some(cells);
    }

    pub(crate) fn clear_columns(&mut self) {
        for column in &mut self.columns {
            *column = None;
        }
    }
}

impl fmt::Debug for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archetype")
            .field("id", &self.id)
            .field("components", &self.components)
            .field("rows", &self.entities.len())
            .finish()
    }
}

/// All archetypes of one world, indexed by id and by component set.
#[derive(Default)]
pub struct ArchetypeTable {
    archetypes: Vec<Archetype>,
    by_set: HashMap<ComponentSet, ArchetypeId>,
}

impl ArchetypeTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the archetype for a canonical set.
    #[must_use]
    pub fn find(&self, set: &ComponentSet) -> Option<ArchetypeId> {
        self.by_set.get(set).copied()
    }

    /// Append a new archetype. The id must be the next dense id.
    pub fn insert(&mut self, set: ComponentSet) -> ArchetypeId {
        debug_assert!(!self.by_set.contains_key(&set));
        let id = ArchetypeId::from_raw(self.archetypes.len() as u32);
        self.by_set.insert(set.clone(), id);
        self.archetypes.push(Archetype::new(id, set));
        id
    }

    #[must_use]
    pub fn get(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id.as_raw() as usize)
    }

    #[must_use]
    pub fn get_mut(&mut self, id: ArchetypeId) -> Option<&mut Archetype> {
        self.archetypes.get_mut(id.as_raw() as usize)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Archetype> {
        self.archetypes.iter()
    }

    pub(crate) fn clear(&mut self) {
        self.archetypes.clear();
        self.by_set.clear();
    }

    /// The persisted form: `(id, [type ids])` in id order, with any
    /// not-yet-committed archetypes appended.
    #[must_use]
    pub fn manifest(&self, extra: &[(ArchetypeId, ComponentSet)]) -> Vec<(u32, Vec<u16>)> {
        let mut list: Vec<(u32, Vec<u16>)> = self
            .archetypes
            .iter()
            .map(|arch| {
                (
                    arch.id.as_raw(),
                    arch.components.iter().map(|t| t.as_raw()).collect(),
                )
            })
            .collect();
        for (id, set) in extra {
            list.push((id.as_raw(), set.iter().map(|t| t.as_raw()).collect()));
        }
        list
    }
}

impl fmt::Debug for ArchetypeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchetypeTable")
            .field("count", &self.archetypes.len())
            .finish()
    }
}
