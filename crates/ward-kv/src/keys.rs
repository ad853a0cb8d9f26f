//! Key layout for persisted world state.
//!
//! Every key is prefixed with the world namespace so several worlds can
//! share one server without colliding:
//!
//! ```text
//! WORLD:<ns>:TICK                    8-byte big-endian tick counter
//! WORLD:<ns>:NEXT_ENTITY_ID          8-byte big-endian entity counter
//! WORLD:<ns>:COMPONENTS              encoded list of (TypeId, name)
//! WORLD:<ns>:ARCHETYPES              encoded list of (ArchetypeId, [TypeId, ...])
//! WORLD:<ns>:ENT_LOC:<entity>        encoded (ArchetypeId, row)
//! WORLD:<ns>:COMP:<type>:<archetype> encoded column, row index -> bytes
//! WORLD:<ns>:ADDR_TO_NONCE           hash, signer address -> u64 nonce
//! WORLD:<ns>:PENDING_BATCH           journal record; absent when idle
//! ```

/// Key builder bound to one world namespace.
#[derive(Debug, Clone)]
pub struct KeySpace {
    ns: String,
}

impl KeySpace {
    #[must_use]
    pub fn new(namespace: &str) -> Self {
        Self {
            ns: namespace.to_string(),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.ns
    }

    #[must_use]
    pub fn tick(&self) -> String {
        format!("WORLD:{}:TICK", self.ns)
    }

    #[must_use]
    pub fn next_entity_id(&self) -> String {
        format!("WORLD:{}:NEXT_ENTITY_ID", self.ns)
    }

    #[must_use]
    pub fn components(&self) -> String {
        format!("WORLD:{}:COMPONENTS", self.ns)
    }

    #[must_use]
    pub fn archetypes(&self) -> String {
        format!("WORLD:{}:ARCHETYPES", self.ns)
    }

    #[must_use]
    pub fn entity_location(&self, entity: u64) -> String {
        format!("WORLD:{}:ENT_LOC:{}", self.ns, entity)
    }

    #[must_use]
    pub fn column(&self, type_id: u16, archetype_id: u32) -> String {
        format!("WORLD:{}:COMP:{}:{}", self.ns, type_id, archetype_id)
    }

    #[must_use]
    pub fn nonces(&self) -> String {
        format!("WORLD:{}:ADDR_TO_NONCE", self.ns)
    }

    #[must_use]
    pub fn pending_batch(&self) -> String {
        format!("WORLD:{}:PENDING_BATCH", self.ns)
    }
}
