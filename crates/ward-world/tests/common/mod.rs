//! Shared helpers for the integration suites: every test world runs
//! over an in-memory backend, and several worlds can share one backend
//! to exercise save/load behavior.

use std::sync::Arc;

use ward_kv::{KvHandle, MemoryStore};
use ward_world::{World, WorldOptions};

pub fn test_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

/// A world over `store` with signature verification disabled.
pub fn test_world(store: &Arc<MemoryStore>, namespace: &str) -> World {
    World::new(
        Arc::clone(store) as KvHandle,
        WorldOptions::new(namespace).disable_signature_verification(),
    )
    .unwrap()
}
