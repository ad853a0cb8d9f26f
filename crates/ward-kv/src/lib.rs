//! Ordered byte key to byte value storage for world state.
//!
//! The engine persists everything through the [`Kv`] trait: plain
//! get/set/del for individual keys, a hash map for signer nonces, and an
//! atomic [`Kv::pipeline`] used by the tick commit path. A pipeline is an
//! ordered list of operations that lands in one server round trip and,
//! for writes, one atomic transaction: either every operation applies or
//! none does.
//!
//! Two implementations ship here: [`RedisStore`] against a
//! Redis-compatible server, and [`MemoryStore`] for tests, which honors
//! the same atomicity contract.

mod keys;
mod memory;
mod redis_store;

pub use keys::KeySpace;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KvError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("transaction aborted: {0}")]
    TxAborted(String),
    #[error("unexpected reply from backend: {0}")]
    UnexpectedReply(String),
}

pub type KvResult<T> = Result<T, KvError>;

/// One operation inside a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Get { key: String },
    Set { key: String, value: Vec<u8> },
    Del { key: String },
    HGet { key: String, field: String },
    HSet { key: String, field: String, value: Vec<u8> },
}

/// One reply from a pipeline, positionally matching the submitted op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Reply to a write op.
    Unit,
    /// Reply to a read op.
    Value(Option<Vec<u8>>),
}

impl Reply {
    /// Extract the value of a read reply.
    pub fn into_value(self) -> KvResult<Option<Vec<u8>>> {
        match self {
            Reply::Value(v) => Ok(v),
            Reply::Unit => Err(KvError::UnexpectedReply(
                "expected a value reply".to_string(),
            )),
        }
    }
}

/// The storage contract the engine core is written against.
///
/// Implementations must be durable after a successful write returns, and
/// `pipeline` must be atomic: a crash or error mid-pipeline leaves none
/// of its effects visible.
pub trait Kv: Send + Sync {
    fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>>;

    /// Set several keys atomically.
    fn set_many(&self, pairs: Vec<(String, Vec<u8>)>) -> KvResult<()>;

    /// Delete several keys atomically. Missing keys are not an error.
    fn del_many(&self, keys: Vec<String>) -> KvResult<()>;

    /// Run an ordered list of operations in one round trip as one atomic
    /// transaction, returning one reply per operation.
    fn pipeline(&self, ops: Vec<Op>) -> KvResult<Vec<Reply>>;

    fn hget(&self, key: &str, field: &str) -> KvResult<Option<Vec<u8>>>;
    fn hset(&self, key: &str, field: &str, value: &[u8]) -> KvResult<()>;
    fn hdel(&self, key: &str, field: &str) -> KvResult<()>;
}

/// Shared handle to a storage backend.
pub type KvHandle = Arc<dyn Kv>;
