//! The view of the world a system runs against.
//!
//! A [`WorldContext`] is handed to each system exactly once per tick. It
//! exposes the staged write buffer as the only mutable surface, the
//! tick's transaction snapshot read-only, the event sink, and the tick's
//! cancellation token. Nothing a system does through the context becomes
//! durable until the whole tick commits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ward_ecs::{
    Component, ComponentRegistry, EntityId, Filter, GameState, TypeId, WriteBuffer,
};
use ward_tx::{SignedTx, TxHash, TxQueue, TxType};

use crate::error::WorldError;
use crate::event::Event;
use crate::persona::{PersonaIndex, PersonaRecord};

/// Cooperative cancellation flag scoped to one tick.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Outcome of one transaction, recorded by systems during the tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    /// Encoded result value, when the handling system produced one.
    pub result: Option<Vec<u8>>,
    pub errors: Vec<String>,
}

/// A set of component types used to create entities and build filters.
///
/// Implemented for tuples of components: `(Position,)`,
/// `(Position, Velocity)`, and so on.
pub trait ComponentBundle {
    fn type_ids(registry: &ComponentRegistry) -> Result<Vec<TypeId>, WorldError>;
}

impl ComponentBundle for () {
    fn type_ids(_registry: &ComponentRegistry) -> Result<Vec<TypeId>, WorldError> {
        Ok(Vec::new())
    }
}

macro_rules! impl_component_bundle {
    ($($name:ident),+) => {
        impl<$($name: Component),+> ComponentBundle for ($($name,)+) {
            fn type_ids(registry: &ComponentRegistry) -> Result<Vec<TypeId>, WorldError> {
                Ok(vec![$(
                    registry
                        .id_of::<$name>()
                        .ok_or(WorldError::ComponentNotRegistered($name::NAME))?,
                )+])
            }
        }
    };
}

impl_component_bundle!(A);
impl_component_bundle!(A, B);
impl_component_bundle!(A, B, C);
impl_component_bundle!(A, B, C, D);
impl_component_bundle!(A, B, C, D, E);

/// Per-system view of one tick in progress.
pub struct WorldContext<'a> {
    pub(crate) state: &'a mut GameState,
    pub(crate) buffer: &'a mut WriteBuffer,
    pub(crate) queue: &'a TxQueue,
    pub(crate) tick: u64,
    pub(crate) events: &'a mut Vec<Event>,
    pub(crate) receipts: &'a mut Vec<Receipt>,
    pub(crate) cancel: &'a CancelToken,
    pub(crate) personas: &'a PersonaIndex,
    pub(crate) pending_personas: &'a mut Vec<PersonaRecord>,
}

impl<'a> WorldContext<'a> {
    /// The tick currently being executed.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Whether the tick has been cancelled. Systems should return early
    /// when this turns true; the tick rolls back either way.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    #[must_use]
    pub fn component_id<T: Component>(&self) -> Option<TypeId> {
        self.state.registry().id_of::<T>()
    }

    // ==================== Entity operations ====================

    /// Create an entity with the bundle's exact component set, every
    /// value defaulted.
    pub fn create<B: ComponentBundle>(&mut self) -> Result<EntityId, WorldError> {
        let ids = B::type_ids(self.state.registry())?;
        Ok(self.buffer.create(self.state, &ids)?)
    }

    /// Create `count` entities of the same shape.
    pub fn create_many<B: ComponentBundle>(
        &mut self,
        count: usize,
    ) -> Result<Vec<EntityId>, WorldError> {
        let ids = B::type_ids(self.state.registry())?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.buffer.create(self.state, &ids)?);
        }
        Ok(out)
    }

    pub fn destroy(&mut self, entity: EntityId) -> Result<(), WorldError> {
        Ok(self.buffer.destroy(self.state, entity)?)
    }

    /// Read a component value, seeing this tick's own writes.
    pub fn get<T: Component>(&mut self, entity: EntityId) -> Result<T, WorldError> {
        let type_id = self.type_id_of::<T>()?;
        let bytes = self.buffer.get(self.state, entity, type_id)?;
        Ok(ward_codec::decode_from_slice(&bytes)?)
    }

    /// Write a component value into the staged buffer.
    pub fn set<T: Component>(&mut self, entity: EntityId, value: T) -> Result<(), WorldError> {
        let type_id = self.type_id_of::<T>()?;
        let bytes = ward_codec::encode_to_vec(&value)?;
        Ok(self.buffer.set(self.state, entity, type_id, bytes)?)
    }

    /// Add a default-valued component, moving the entity to the wider
    /// archetype.
    pub fn add_component<T: Component>(&mut self, entity: EntityId) -> Result<(), WorldError> {
        let type_id = self.type_id_of::<T>()?;
        Ok(self.buffer.add_component(self.state, entity, type_id)?)
    }

    /// Remove a component, moving the entity to the narrower archetype.
    pub fn remove_component<T: Component>(&mut self, entity: EntityId) -> Result<(), WorldError> {
        let type_id = self.type_id_of::<T>()?;
        Ok(self.buffer.remove_component(self.state, entity, type_id)?)
    }

    #[must_use]
    pub fn is_live(&self, entity: EntityId) -> bool {
        self.buffer.is_live(self.state, entity)
    }

    fn type_id_of<T: Component>(&self) -> Result<TypeId, WorldError> {
        self.state
            .registry()
            .id_of::<T>()
            .ok_or(WorldError::ComponentNotRegistered(T::NAME))
    }

    // ==================== Search ====================

    /// Lazily iterate entities whose archetype matches the filter. The
    /// returned iterator can be dropped early without paying for the
    /// rest of the scan.
    pub fn search<'s>(&'s self, filter: &'s Filter) -> ward_ecs::SearchIter<'s> {
        self.buffer.search(self.state, filter)
    }

    /// Visit matching entities with mutable access; the callback returns
    /// `false` to stop early.
    pub fn each(
        &mut self,
        filter: &Filter,
        mut visit: impl FnMut(&mut WorldContext<'_>, EntityId) -> bool,
    ) {
        let ids: Vec<EntityId> = self.buffer.search(self.state, filter).collect();
        for id in ids {
            if !visit(self, id) {
                break;
            }
        }
    }

    pub fn filter_exact<B: ComponentBundle>(&self) -> Result<Filter, WorldError> {
        Ok(Filter::exact(&B::type_ids(self.state.registry())?))
    }

    pub fn filter_contains<B: ComponentBundle>(&self) -> Result<Filter, WorldError> {
        Ok(Filter::contains(&B::type_ids(self.state.registry())?))
    }

    // ==================== Transactions ====================

    /// The tick's full queue snapshot, read-only.
    #[must_use]
    pub fn queue(&self) -> &TxQueue {
        self.queue
    }

    /// This tick's transactions of one type, in arrival order, decoded.
    pub fn transactions<I: ward_codec::Decode, O>(
        &self,
        tx_type: &TxType<I, O>,
    ) -> Result<Vec<(TxHash, I, SignedTx)>, WorldError> {
        let mut out = Vec::new();
        for queued in self.queue.of_type(tx_type.id()) {
            let input = tx_type.decode_input(&queued.tx.body)?;
            out.push((queued.hash, input, queued.tx.clone()));
        }
        Ok(out)
    }

    /// Record the result of a handled transaction into its receipt.
    pub fn set_result<O: ward_codec::Encode>(
        &mut self,
        hash: TxHash,
        result: &O,
    ) -> Result<(), WorldError> {
        let bytes = ward_codec::encode_to_vec(result)?;
        self.receipt_entry(hash).result = Some(bytes);
        Ok(())
    }

    /// Record a handling error into a transaction's receipt.
    pub fn set_error(&mut self, hash: TxHash, message: &str) {
        self.receipt_entry(hash).errors.push(message.to_string());
    }

    fn receipt_entry(&mut self, hash: TxHash) -> &mut Receipt {
        let pos = match self.receipts.iter().position(|r| r.tx_hash == hash) {
            Some(pos) => pos,
            None => {
                self.receipts.push(Receipt {
                    tx_hash: hash,
                    result: None,
                    errors: Vec::new(),
                });
                self.receipts.len() - 1
            }
        };
        &mut self.receipts[pos]
    }

    // ==================== Events ====================

    /// Queue an event for broadcast after the tick commits.
    pub fn emit(&mut self, message: impl Into<String>) {
        self.events.push(Event::new(message));
    }

    // ==================== Personas (internal) ====================

    pub(crate) fn persona_exists(&self, tag: &str) -> bool {
        self.pending_personas.iter().any(|r| r.tag == tag) || self.personas.contains(tag)
    }

    pub(crate) fn persona_entity(&self, tag: &str) -> Option<EntityId> {
        self.pending_personas
            .iter()
            .find(|r| r.tag == tag)
            .map(|r| r.entity)
            .or_else(|| self.personas.get(tag).map(|r| r.entity))
    }

    pub(crate) fn register_persona(&mut self, record: PersonaRecord) {
        self.pending_personas.push(record);
    }
}
