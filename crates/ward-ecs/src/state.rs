//! Committed world state over the key-value backend.
//!
//! `GameState` is the authoritative view of everything a successful tick
//! has ever written: the component manifest, the archetype table, entity
//! locations, and the encoded component columns. The key-value store is
//! the durability authority; this struct keeps in-memory mirrors that
//! are rebuilt from it on every load and folded forward only after a
//! commit pipeline succeeds.
//!
//! Entity locations and archetype row lists are loaded eagerly (searches
//! need them), component columns lazily on first read.

use ward_codec::{decode_from_slice, encode_to_vec};
use ward_kv::{KeySpace, KvHandle, Op};

use crate::{
    ArchetypeId, ArchetypeTable, ComponentRegistry, ComponentSet, EntityId, Location, StateError,
    TypeId,
};

/// How many entity-location reads go into one load-time pipeline.
const LOAD_CHUNK: u64 = 512;

/// Plan produced by a write buffer at commit time.
///
/// The field order mirrors the commit protocol: locations first, then
/// rebuilt columns, then the archetype manifest, then the counters, and
/// finally the journal delete.
pub struct FoldPlan {
    pub locations: Vec<(EntityId, Option<Location>)>,
    pub rows: Vec<(ArchetypeId, Vec<EntityId>)>,
    pub columns: Vec<(TypeId, ArchetypeId, Vec<Vec<u8>>)>,
    pub new_archetypes: Vec<(ArchetypeId, ComponentSet)>,
    pub next_entity_id: u64,
    pub tick: u64,
}

/// Committed entity/archetype state bound to one namespace.
pub struct GameState {
    kv: KvHandle,
    keys: KeySpace,
    registry: ComponentRegistry,
    archetypes: ArchetypeTable,
    locations: hashbrown::HashMap<EntityId, Location>,
    next_entity_id: u64,
    tick: u64,
}

impl GameState {
    #[must_use]
    pub fn new(kv: KvHandle, keys: KeySpace) -> Self {
        Self {
            kv,
            keys,
            registry: ComponentRegistry::new(),
            archetypes: ArchetypeTable::new(),
            locations: hashbrown::HashMap::new(),
            next_entity_id: 0,
            tick: 0,
        }
    }

    #[must_use]
    pub fn kv(&self) -> &KvHandle {
        &self.kv
    }

    #[must_use]
    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    #[must_use]
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Mutable registry access, valid only before the first load.
    pub fn registry_mut(&mut self) -> &mut ComponentRegistry {
        &mut self.registry
    }

    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    #[must_use]
    pub fn next_entity_id(&self) -> u64 {
        self.next_entity_id
    }

    #[must_use]
    pub fn location(&self, entity: EntityId) -> Option<Location> {
        self.locations.get(&entity).copied()
    }

    #[must_use]
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    #[must_use]
    pub fn archetype(&self, id: ArchetypeId) -> Option<&crate::Archetype> {
        self.archetypes.get(id)
    }

    #[must_use]
    pub fn find_archetype(&self, set: &ComponentSet) -> Option<ArchetypeId> {
        self.archetypes.find(set)
    }

    /// Entities of an archetype in row order. Unknown ids yield no rows.
    #[must_use]
    pub fn entities_in(&self, id: ArchetypeId) -> &[EntityId] {
        self.archetypes.get(id).map_or(&[], |arch| arch.entities())
    }

    #[must_use]
    pub fn archetype_manifest(
        &self,
        extra: &[(ArchetypeId, ComponentSet)],
    ) -> Vec<(u32, Vec<u16>)> {
        self.archetypes.manifest(extra)
    }

    /// Rebuild all mirrors from the backend.
    ///
    /// Verifies that the persisted component manifest is a prefix of the
    /// registered one (same ids, same names, same order); extra newly
    /// registered types are fine, anything else is fatal.
    pub fn load(&mut self) -> Result<(), StateError> {
        self.check_components()?;
        self.load_archetypes()?;
        self.tick = self.read_counter(&self.keys.tick())?;
        self.next_entity_id = self.read_counter(&self.keys.next_entity_id())?;
        self.load_locations()?;

        tracing::debug!(
            namespace = self.keys.namespace(),
            tick = self.tick,
            entities = self.locations.len(),
            archetypes = self.archetypes.len(),
            "loaded committed state"
        );
        Ok(())
    }

    fn check_components(&mut self) -> Result<(), StateError> {
        let Some(bytes) = self.kv.get(&self.keys.components())? else {
            return Ok(());
        };
        let persisted: Vec<(u16, String)> = decode_from_slice(&bytes)?;
        let registered = self.registry.manifest();

        if persisted.len() > registered.len() {
            return Err(StateError::ComponentMismatchWithSavedState(format!(
                "{} components saved but only {} registered",
                persisted.len(),
                registered.len()
            )));
        }
        for (saved, current) in persisted.iter().zip(&registered) {
            if saved != current {
                return Err(StateError::ComponentMismatchWithSavedState(format!(
                    "saved component ({}, {:?}) does not match registered ({}, {:?})",
                    saved.0, saved.1, current.0, current.1
                )));
            }
        }
        Ok(())
    }

    fn load_archetypes(&mut self) -> Result<(), StateError> {
        self.archetypes.clear();
        let Some(bytes) = self.kv.get(&self.keys.archetypes())? else {
            return Ok(());
        };
        let list: Vec<(u32, Vec<u16>)> = decode_from_slice(&bytes)?;
        for (index, (id, type_ids)) in list.into_iter().enumerate() {
            if id as usize != index {
                return Err(StateError::Corrupt(format!(
                    "archetype {id} stored at position {index}"
                )));
            }
            let set: ComponentSet = type_ids.iter().map(|&t| TypeId::from_raw(t)).collect();
            if !set.windows(2).all(|w| w[0] < w[1]) {
                return Err(StateError::Corrupt(format!(
                    "archetype {id} component set is not canonical"
                )));
            }
            for type_id in &set {
                if self.registry.info(*type_id).is_none() {
                    return Err(StateError::ComponentMismatchWithSavedState(format!(
                        "archetype {id} references unregistered component {type_id:?}"
                    )));
                }
            }
            self.archetypes.insert(set);
        }
        Ok(())
    }

    fn load_locations(&mut self) -> Result<(), StateError> {
        self.locations.clear();

        let mut start = 0u64;
        while start < self.next_entity_id {
            let end = (start + LOAD_CHUNK).min(self.next_entity_id);
            let ops: Vec<Op> = (start..end)
                .map(|id| Op::Get {
                    key: self.keys.entity_location(id),
                })
                .collect();
            let replies = self.kv.pipeline(ops)?;
            for (offset, reply) in replies.into_iter().enumerate() {
                if let Some(bytes) = reply.into_value()? {
                    let location: Location = decode_from_slice(&bytes)?;
                    self.locations
                        .insert(EntityId::from_raw(start + offset as u64), location);
                }
            }
            start = end;
        }

        // Rebuild each archetype's row list from the location map.
        let mut rows: Vec<Vec<Option<EntityId>>> = vec![Vec::new(); self.archetypes.len()];
        for (&entity, &location) in &self.locations {
            let list = rows
                .get_mut(location.archetype.as_raw() as usize)
                .ok_or_else(|| {
                    StateError::Corrupt(format!(
                        "entity {entity} points at unknown archetype {:?}",
                        location.archetype
                    ))
                })?;
            if location.row >= list.len() {
                list.resize(location.row + 1, None);
            }
            if list[location.row].is_some() {
                return Err(StateError::Corrupt(format!(
                    "two entities share row {} of archetype {:?}",
                    location.row, location.archetype
                )));
            }
            list[location.row] = Some(entity);
        }
        for (index, list) in rows.into_iter().enumerate() {
            let entities: Vec<EntityId> = list
                .into_iter()
                .enumerate()
                .map(|(row, slot)| {
                    slot.ok_or_else(|| {
                        StateError::Corrupt(format!("gap at row {row} of archetype {index}"))
                    })
                })
                .collect::<Result<_, _>>()?;
            let arch = self
                .archetypes
                .get_mut(ArchetypeId::from_raw(index as u32))
                .ok_or_else(|| StateError::Corrupt(format!("missing archetype {index}")))?;
            arch.set_entities(entities);
            arch.clear_columns();
        }
        Ok(())
    }

    fn read_counter(&self, key: &str) -> Result<u64, StateError> {
        match self.kv.get(key)? {
            None => Ok(0),
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    StateError::Corrupt(format!("counter {key} has {} bytes", bytes.len()))
                })?;
                Ok(u64::from_be_bytes(raw))
            }
        }
    }

    /// The committed encoded value of one component on one entity.
    ///
    /// Loads the owning column from the backend on first access.
    pub fn committed_cell(
        &mut self,
        entity: EntityId,
        type_id: TypeId,
    ) -> Result<Vec<u8>, StateError> {
        let location = self
            .location(entity)
            .ok_or(StateError::NoSuchEntity(entity))?;
        let arch = self
            .archetypes
            .get(location.archetype)
            .ok_or_else(|| StateError::Corrupt(format!("missing archetype for {entity}")))?;
        let index = arch
            .column_index(type_id)
            .ok_or(StateError::ComponentNotOnEntity { type_id, entity })?;

        self.ensure_column(location.archetype, type_id, index)?;

        let arch = self
            .archetypes
            .get(location.archetype)
            .ok_or_else(|| StateError::Corrupt(format!("missing archetype for {entity}")))?;
        let column = arch
            .column(index)
            .ok_or_else(|| StateError::Corrupt("column vanished after load".to_string()))?;
        column
            .get(location.row)
            .cloned()
            .ok_or_else(|| {
                StateError::Corrupt(format!(
                    "row {} missing from column {:?} of {:?}",
                    location.row, type_id, location.archetype
                ))
            })
    }

    fn ensure_column(
        &mut self,
        archetype: ArchetypeId,
        type_id: TypeId,
        index: usize,
    ) -> Result<(), StateError> {
        let (loaded, row_count) = {
            let arch = self
                .archetypes
                .get(archetype)
                .ok_or_else(|| StateError::Corrupt(format!("missing archetype {archetype:?}")))?;
            (arch.column(index).is_some(), arch.len())
        };
        if loaded {
            return Ok(());
        }

        let key = self.keys.column(type_id.as_raw(), archetype.as_raw());
        let cells: Vec<Vec<u8>> = match self.kv.get(&key)? {
            Some(bytes) => decode_from_slice(&bytes)?,
            None if row_count == 0 => Vec::new(),
            None => {
                return Err(StateError::Corrupt(format!(
                    "column {key} missing for {row_count} rows"
                )))
            }
        };
        if cells.len() != row_count {
            return Err(StateError::Corrupt(format!(
                "column {key} has {} cells for {row_count} rows",
                cells.len()
            )));
        }

        let arch = self
            .archetypes
            .get_mut(archetype)
            .ok_or_else(|| StateError::Corrupt(format!("missing archetype {archetype:?}")))?;
        arch.set_column(index, cells);
        Ok(())
    }

    /// Run a commit plan as one atomic pipeline, then fold it into the
    /// in-memory mirrors. On pipeline failure nothing changes here.
    pub fn apply(&mut self, plan: FoldPlan) -> Result<(), StateError> {
        let mut ops = Vec::new();

        for (entity, location) in &plan.locations {
            let key = self.keys.entity_location(entity.as_raw());
            match location {
                Some(location) => ops.push(Op::Set {
                    key,
                    value: encode_to_vec(location)?,
                }),
                None => ops.push(Op::Del { key }),
            }
        }
        for (type_id, archetype, cells) in &plan.columns {
            ops.push(Op::Set {
                key: self.keys.column(type_id.as_raw(), archetype.as_raw()),
                value: encode_to_vec(cells)?,
            });
        }
        if !plan.new_archetypes.is_empty() {
            ops.push(Op::Set {
                key: self.keys.archetypes(),
                value: encode_to_vec(&self.archetype_manifest(&plan.new_archetypes))?,
            });
        }
        // The component manifest becomes durable with the first commit;
        // loading alone never extends the persisted schema.
        ops.push(Op::Set {
            key: self.keys.components(),
            value: encode_to_vec(&self.registry.manifest())?,
        });
        ops.push(Op::Set {
            key: self.keys.next_entity_id(),
            value: plan.next_entity_id.to_be_bytes().to_vec(),
        });
        ops.push(Op::Set {
            key: self.keys.tick(),
            value: plan.tick.to_be_bytes().to_vec(),
        });
        ops.push(Op::Del {
            key: self.keys.pending_batch(),
        });

        self.kv.pipeline(ops)?;
        self.fold(plan);
        Ok(())
    }

    fn fold(&mut self, plan: FoldPlan) {
        for (id, set) in plan.new_archetypes {
            let got = self.archetypes.insert(set);
            debug_assert_eq!(got, id);
        }
        for (archetype, entities) in plan.rows {
            if let Some(arch) = self.archetypes.get_mut(archetype) {
                arch.set_entities(entities);
            }
        }
        for (type_id, archetype, cells) in plan.columns {
            if let Some(arch) = self.archetypes.get_mut(archetype) {
                if let Some(index) = arch.column_index(type_id) {
                    arch.set_column(index, cells);
                }
            }
        }
        for (entity, location) in plan.locations {
            match location {
                Some(location) => {
                    self.locations.insert(entity, location);
                }
                None => {
                    self.locations.remove(&entity);
                }
            }
        }
        self.next_entity_id = plan.next_entity_id;
        self.tick = plan.tick;
    }
}

impl std::fmt::Debug for GameState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameState")
            .field("namespace", &self.keys.namespace())
            .field("tick", &self.tick)
            .field("entities", &self.locations.len())
            .field("archetypes", &self.archetypes.len())
            .finish()
    }
}
