//! Persona registration: stable user-chosen tags bound to signer
//! addresses.
//!
//! Two transaction types exist in every world and their systems run
//! before any user system. `create-persona` claims a tag for a signer
//! address; within one tick the first claim in queue order wins and
//! later duplicates are quiet no-ops, and a tag claimed in an earlier
//! tick can never be re-bound. `authorize-persona-address` appends an
//! address to the owning signer's authorized list.

use ward_codec::{Decode, Encode};
use ward_ecs::{Component, EntityId, GameState};
use ward_tx::{TxType, TxTypeId};

use crate::context::WorldContext;
use crate::error::WorldError;

pub const CREATE_PERSONA_TX_NAME: &str = "create-persona";
pub const AUTHORIZE_PERSONA_ADDRESS_TX_NAME: &str = "authorize-persona-address";

/// Component carried by the entity that embodies one registered persona.
#[derive(Encode, Decode, Default, Debug, Clone, PartialEq, Eq)]
pub struct SignerComponent {
    pub persona_tag: String,
    pub signer_address: String,
    /// Tick during which the tag was claimed.
    pub registered_tick: u64,
    /// Extra addresses allowed to act for this persona. Not
    /// deduplicated; an address authorized twice appears twice.
    pub authorized_addresses: Vec<String>,
}

impl Component for SignerComponent {
    const NAME: &'static str = "signer";
}

#[derive(Encode, Decode, Default, Debug, Clone, PartialEq, Eq)]
pub struct CreatePersona {
    pub persona_tag: String,
    pub signer_address: String,
}

#[derive(Encode, Decode, Default, Debug, Clone, PartialEq, Eq)]
pub struct CreatePersonaResult {
    pub success: bool,
}

#[derive(Encode, Decode, Default, Debug, Clone, PartialEq, Eq)]
pub struct AuthorizePersonaAddress {
    pub address: String,
}

#[derive(Encode, Decode, Default, Debug, Clone, PartialEq, Eq)]
pub struct AuthorizePersonaAddressResult {
    pub success: bool,
}

/// Handle to the always-registered `create-persona` channel.
#[must_use]
pub fn create_persona_tx() -> TxType<CreatePersona, CreatePersonaResult> {
    TxType::new(TxTypeId::from_raw(1), CREATE_PERSONA_TX_NAME)
}

/// Handle to the always-registered `authorize-persona-address` channel.
#[must_use]
pub fn authorize_persona_address_tx(
) -> TxType<AuthorizePersonaAddress, AuthorizePersonaAddressResult> {
    TxType::new(TxTypeId::from_raw(2), AUTHORIZE_PERSONA_ADDRESS_TX_NAME)
}

/// One committed persona registration.
#[derive(Clone, Debug)]
pub(crate) struct PersonaRecord {
    pub tag: String,
    pub address: String,
    pub tick: u64,
    pub entity: EntityId,
}

/// Tag to signer lookup, rebuilt from committed state on load and
/// extended after every committed tick.
#[derive(Default)]
pub(crate) struct PersonaIndex {
    by_tag: hashbrown::HashMap<String, PersonaRecord>,
}

impl PersonaIndex {
    pub(crate) fn get(&self, tag: &str) -> Option<&PersonaRecord> {
        self.by_tag.get(tag)
    }

    pub(crate) fn contains(&self, tag: &str) -> bool {
        self.by_tag.contains_key(tag)
    }

    pub(crate) fn insert(&mut self, record: PersonaRecord) {
        // First registration wins; the systems never insert a claimed
        // tag, so an existing entry is left alone.
        self.by_tag.entry(record.tag.clone()).or_insert(record);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.by_tag.len()
    }
}

/// Scan committed state for signer components and rebuild the index.
pub(crate) fn rebuild_index(state: &mut GameState) -> Result<PersonaIndex, WorldError> {
    let mut index = PersonaIndex::default();
    let Some(signer_id) = state.registry().id_of::<SignerComponent>() else {
        return Ok(index);
    };

    let mut holders: Vec<EntityId> = Vec::new();
    for archetype in 0..state.archetype_count() {
        let id = ward_ecs::ArchetypeId::from_raw(archetype as u32);
        let matches = state
            .archetype(id)
            .is_some_and(|arch| arch.contains(signer_id));
        if matches {
            holders.extend_from_slice(state.entities_in(id));
        }
    }

    for entity in holders {
        let bytes = state.committed_cell(entity, signer_id)?;
        let signer: SignerComponent = ward_codec::decode_from_slice(&bytes)?;
        index.insert(PersonaRecord {
            tag: signer.persona_tag,
            address: signer.signer_address,
            tick: signer.registered_tick,
            entity,
        });
    }
    Ok(index)
}

/// Built-in system handling `create-persona`, first in every tick.
pub(crate) fn create_persona_system(ctx: &mut WorldContext<'_>) -> anyhow::Result<()> {
    let tx_type = create_persona_tx();
    for (hash, input, _envelope) in ctx.transactions(&tx_type)? {
        if input.persona_tag.is_empty() {
            ctx.set_error(hash, "persona tag must not be empty");
            continue;
        }
        if ctx.persona_exists(&input.persona_tag) {
            // Already claimed, this tick or earlier. Not an error.
            ctx.set_result(hash, &CreatePersonaResult { success: false })?;
            continue;
        }

        let entity = ctx.create::<(SignerComponent,)>()?;
        let tick = ctx.tick();
        ctx.set(
            entity,
            SignerComponent {
                persona_tag: input.persona_tag.clone(),
                signer_address: input.signer_address.clone(),
                registered_tick: tick,
                authorized_addresses: Vec::new(),
            },
        )?;
        ctx.register_persona(PersonaRecord {
            tag: input.persona_tag,
            address: input.signer_address,
            tick,
            entity,
        });
        ctx.set_result(hash, &CreatePersonaResult { success: true })?;
    }
    Ok(())
}

/// Built-in system handling `authorize-persona-address`, second in
/// every tick.
pub(crate) fn authorize_persona_address_system(ctx: &mut WorldContext<'_>) -> anyhow::Result<()> {
    let tx_type = authorize_persona_address_tx();
    for (hash, input, envelope) in ctx.transactions(&tx_type)? {
        let Some(entity) = ctx.persona_entity(&envelope.persona_tag) else {
            ctx.set_error(hash, "persona tag has no signer");
            continue;
        };

        let mut signer: SignerComponent = ctx.get(entity)?;
        if signer.persona_tag != envelope.persona_tag {
            ctx.set_error(hash, "persona tag does not own this signer");
            continue;
        }
        signer.authorized_addresses.push(input.address);
        ctx.set(entity, signer)?;
        ctx.set_result(hash, &AuthorizePersonaAddressResult { success: true })?;
    }
    Ok(())
}
