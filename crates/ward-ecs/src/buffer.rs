//! Staged write buffer: all mutations of one tick, held in memory.
//!
//! The buffer is a read-through overlay on [`GameState`]. Reads consult
//! pending writes first and fall through to committed state; writes only
//! ever touch the overlay. Committing turns the overlay into one atomic
//! key-value transaction (and folds it into the committed mirrors);
//! dropping the buffer discards the tick with no side effects.
//!
//! The overlay tracks, per spec of the commit protocol:
//! - component overrides `(type, entity) -> bytes | tombstone`
//! - per-entity location changes (creation, destruction, moves)
//! - row lists of every touched archetype
//! - archetypes first referenced this tick
//! - the advancing entity-id counter

use hashbrown::{HashMap, HashSet};

use crate::{
    canonical_set, state::FoldPlan, ArchetypeId, ComponentSet, EntityId, Filter, GameState,
    Location, StateError, TypeId,
};

/// In-memory mutation overlay for one tick.
pub struct WriteBuffer {
    /// Pending component values; `None` is a tombstone left by
    /// `remove_component`.
    overrides: HashMap<(TypeId, EntityId), Option<Vec<u8>>>,
    /// Pending location per touched entity; `None` means destroyed.
    staged_locations: HashMap<EntityId, Option<Location>>,
    /// Full pending row list per touched archetype.
    staged_rows: HashMap<ArchetypeId, Vec<EntityId>>,
    /// Archetypes first referenced this tick, in creation order.
    new_archetypes: Vec<(ArchetypeId, ComponentSet)>,
    new_by_set: HashMap<ComponentSet, ArchetypeId>,
    next_entity_id: u64,
}

impl WriteBuffer {
    #[must_use]
    pub fn new(state: &GameState) -> Self {
        Self {
            overrides: HashMap::new(),
            staged_locations: HashMap::new(),
            staged_rows: HashMap::new(),
            new_archetypes: Vec::new(),
            new_by_set: HashMap::new(),
            next_entity_id: state.next_entity_id(),
        }
    }

    /// The entity's location as the tick currently sees it.
    #[must_use]
    pub fn location(&self, state: &GameState, entity: EntityId) -> Option<Location> {
        match self.staged_locations.get(&entity) {
            Some(staged) => *staged,
            None => state.location(entity),
        }
    }

    /// Whether the entity exists from this tick's point of view.
    #[must_use]
    pub fn is_live(&self, state: &GameState, entity: EntityId) -> bool {
        self.location(state, entity).is_some()
    }

    fn set_ref<'b>(&'b self, state: &'b GameState, id: ArchetypeId) -> Option<&'b ComponentSet> {
        let committed = state.archetype_count() as u32;
        if id.as_raw() < committed {
            state.archetype(id).map(|arch| arch.components())
        } else {
            self.new_archetypes
                .get((id.as_raw() - committed) as usize)
                .map(|(_, set)| set)
        }
    }

    fn rows_ref<'b>(&'b self, state: &'b GameState, id: ArchetypeId) -> &'b [EntityId] {
        match self.staged_rows.get(&id) {
            Some(rows) => rows,
            None => state.entities_in(id),
        }
    }

    /// Resolve the archetype for a canonical set, allocating the next
    /// dense id when the set has never been seen. Allocation is staged;
    /// it becomes durable only if the tick commits.
    fn resolve_archetype(&mut self, state: &GameState, set: &ComponentSet) -> ArchetypeId {
        if let Some(id) = state.find_archetype(set) {
            return id;
        }
        if let Some(&id) = self.new_by_set.get(set) {
            return id;
        }
        let id =
            ArchetypeId::from_raw((state.archetype_count() + self.new_archetypes.len()) as u32);
        self.new_archetypes.push((id, set.clone()));
        self.new_by_set.insert(set.clone(), id);
        id
    }

    fn rows_entry(&mut self, state: &GameState, id: ArchetypeId) -> &mut Vec<EntityId> {
        self.staged_rows
            .entry(id)
            .or_insert_with(|| state.entities_in(id).to_vec())
    }

    /// Swap-remove the row at `location`, restaging the moved entity.
    fn remove_row(&mut self, state: &GameState, location: Location) {
        let rows = self.rows_entry(state, location.archetype);
        rows.swap_remove(location.row);
        if location.row < rows.len() {
            let moved = rows[location.row];
            self.staged_locations.insert(
                moved,
                Some(Location {
                    archetype: location.archetype,
                    row: location.row,
                }),
            );
        }
    }

    fn push_row(&mut self, state: &GameState, id: ArchetypeId, entity: EntityId) -> Location {
        let rows = self.rows_entry(state, id);
        rows.push(entity);
        let location = Location {
            archetype: id,
            row: rows.len() - 1,
        };
        self.staged_locations.insert(entity, Some(location));
        location
    }

    /// Allocate a new entity with the exact component set, all values
    /// defaulted.
    pub fn create(
        &mut self,
        state: &GameState,
        components: &[TypeId],
    ) -> Result<EntityId, StateError> {
        let set = canonical_set(components)?;
        for type_id in &set {
            if state.registry().info(*type_id).is_none() {
                return Err(StateError::UnknownComponent(*type_id));
            }
        }

        let archetype = self.resolve_archetype(state, &set);
        let entity = EntityId::from_raw(self.next_entity_id);
        self.next_entity_id += 1;
        self.push_row(state, archetype, entity);
        for type_id in &set {
            let default = state.registry().default_bytes(*type_id)?;
            self.overrides.insert((*type_id, entity), Some(default));
        }
        Ok(entity)
    }

    /// Remove an entity and all its components.
    pub fn destroy(&mut self, state: &GameState, entity: EntityId) -> Result<(), StateError> {
        let location = self
            .location(state, entity)
            .ok_or(StateError::NoSuchEntity(entity))?;
        self.remove_row(state, location);
        self.staged_locations.insert(entity, None);
        Ok(())
    }

    /// Add a component (default-valued) to an entity, moving its row to
    /// the wider archetype.
    pub fn add_component(
        &mut self,
        state: &GameState,
        entity: EntityId,
        type_id: TypeId,
    ) -> Result<(), StateError> {
        if state.registry().info(type_id).is_none() {
            return Err(StateError::UnknownComponent(type_id));
        }
        let location = self
            .location(state, entity)
            .ok_or(StateError::NoSuchEntity(entity))?;
        let mut set = self
            .set_ref(state, location.archetype)
            .ok_or_else(|| StateError::Corrupt(format!("unknown archetype for {entity}")))?
            .clone();
        if set.binary_search(&type_id).is_ok() {
            return Err(StateError::ComponentAlreadyPresent { type_id, entity });
        }
        set.push(type_id);
        set.sort_unstable();

        let target = self.resolve_archetype(state, &set);
        self.remove_row(state, location);
        self.push_row(state, target, entity);
        let default = state.registry().default_bytes(type_id)?;
        self.overrides.insert((type_id, entity), Some(default));
        Ok(())
    }

    /// Remove a component from an entity, moving its row to the
    /// narrower archetype.
    pub fn remove_component(
        &mut self,
        state: &GameState,
        entity: EntityId,
        type_id: TypeId,
    ) -> Result<(), StateError> {
        let location = self
            .location(state, entity)
            .ok_or(StateError::NoSuchEntity(entity))?;
        let old_set = self
            .set_ref(state, location.archetype)
            .ok_or_else(|| StateError::Corrupt(format!("unknown archetype for {entity}")))?;
        if old_set.binary_search(&type_id).is_err() {
            return Err(StateError::ComponentNotOnEntity { type_id, entity });
        }
        let set: ComponentSet = old_set
            .iter()
            .copied()
            .filter(|&id| id != type_id)
            .collect();

        let target = self.resolve_archetype(state, &set);
        self.remove_row(state, location);
        self.push_row(state, target, entity);
        self.overrides.insert((type_id, entity), None);
        Ok(())
    }

    /// Read one component value, pending writes first.
    pub fn get(
        &self,
        state: &mut GameState,
        entity: EntityId,
        type_id: TypeId,
    ) -> Result<Vec<u8>, StateError> {
        let location = self
            .location(state, entity)
            .ok_or(StateError::NoSuchEntity(entity))?;
        let set = self
            .set_ref(state, location.archetype)
            .ok_or_else(|| StateError::Corrupt(format!("unknown archetype for {entity}")))?;
        if set.binary_search(&type_id).is_err() {
            return Err(StateError::ComponentNotOnEntity { type_id, entity });
        }
        match self.overrides.get(&(type_id, entity)) {
            Some(Some(bytes)) => Ok(bytes.clone()),
            Some(None) => Err(StateError::ComponentNotOnEntity { type_id, entity }),
            None => state.committed_cell(entity, type_id),
        }
    }

    /// Write one component value into the overlay.
    pub fn set(
        &mut self,
        state: &GameState,
        entity: EntityId,
        type_id: TypeId,
        bytes: Vec<u8>,
    ) -> Result<(), StateError> {
        let location = self
            .location(state, entity)
            .ok_or(StateError::NoSuchEntity(entity))?;
        let set = self
            .set_ref(state, location.archetype)
            .ok_or_else(|| StateError::Corrupt(format!("unknown archetype for {entity}")))?;
        if set.binary_search(&type_id).is_err() {
            return Err(StateError::ComponentNotOnEntity { type_id, entity });
        }
        self.overrides.insert((type_id, entity), Some(bytes));
        Ok(())
    }

    /// Iterate entities whose archetype matches the filter, merged view.
    /// The iterator is lazy, so callers can stop early.
    #[must_use]
    pub fn search<'b>(&'b self, state: &'b GameState, filter: &'b Filter) -> SearchIter<'b> {
        SearchIter {
            buffer: self,
            state,
            filter,
            next_archetype: 0,
            total: (state.archetype_count() + self.new_archetypes.len()) as u32,
            current: &[],
            pos: 0,
        }
    }

    #[must_use]
    pub fn next_entity_id(&self) -> u64 {
        self.next_entity_id
    }

    /// Turn the overlay into a fold plan and run it as one atomic
    /// commit, advancing the tick counter to `tick` and clearing the
    /// journal in the same transaction.
    pub fn commit(self, state: &mut GameState, tick: u64) -> Result<(), StateError> {
        let mut dirty: HashSet<ArchetypeId> = self.staged_rows.keys().copied().collect();
        for ((_, entity), _) in &self.overrides {
            if let Some(location) = self.location(state, *entity) {
                dirty.insert(location.archetype);
            }
        }
        let mut dirty: Vec<ArchetypeId> = dirty.into_iter().collect();
        dirty.sort_unstable();

        let mut rows_plan = Vec::with_capacity(dirty.len());
        let mut columns_plan = Vec::new();
        for archetype in dirty {
            let rows: Vec<EntityId> = self.rows_ref(state, archetype).to_vec();
            let set = self
                .set_ref(state, archetype)
                .ok_or_else(|| StateError::Corrupt(format!("unknown archetype {archetype:?}")))?
                .clone();
            for type_id in set {
                let mut cells = Vec::with_capacity(rows.len());
                for &entity in &rows {
                    let cell = match self.overrides.get(&(type_id, entity)) {
                        Some(Some(bytes)) => bytes.clone(),
                        Some(None) => {
                            return Err(StateError::Corrupt(format!(
                                "tombstone for {type_id:?} inside archetype {archetype:?}"
                            )))
                        }
                        None => state.committed_cell(entity, type_id)?,
                    };
                    cells.push(cell);
                }
                columns_plan.push((type_id, archetype, cells));
            }
            rows_plan.push((archetype, rows));
        }

        let mut locations: Vec<(EntityId, Option<Location>)> =
            self.staged_locations.iter().map(|(e, l)| (*e, *l)).collect();
        locations.sort_by_key(|(entity, _)| *entity);

        state.apply(FoldPlan {
            locations,
            rows: rows_plan,
            columns: columns_plan,
            new_archetypes: self.new_archetypes,
            next_entity_id: self.next_entity_id,
            tick,
        })
    }
}

/// Lazy entity iterator over the merged (pending over committed) view.
pub struct SearchIter<'b> {
    buffer: &'b WriteBuffer,
    state: &'b GameState,
    filter: &'b Filter,
    next_archetype: u32,
    total: u32,
    current: &'b [EntityId],
    pos: usize,
}

impl<'b> Iterator for SearchIter<'b> {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        loop {
            if self.pos < self.current.len() {
                let entity = self.current[self.pos];
                self.pos += 1;
                return Some(entity);
            }
            if self.next_archetype >= self.total {
                return None;
            }
            let id = ArchetypeId::from_raw(self.next_archetype);
            self.next_archetype += 1;

            let Some(set) = self.buffer.set_ref(self.state, id) else {
                continue;
            };
            if !self.filter.matches(set) {
                continue;
            }
            self.current = self.buffer.rows_ref(self.state, id);
            self.pos = 0;
        }
    }
}
