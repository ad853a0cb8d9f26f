//! In-memory backend for tests.
//!
//! Holds the same data shapes the Redis driver does and honors the same
//! pipeline atomicity: a pipeline either applies fully or, when a failure
//! is injected, not at all. Worlds under test share one store through an
//! `Arc`, the same way production worlds share one server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::{Kv, KvError, KvResult, Op, Reply};

#[derive(Default)]
struct Inner {
    strings: HashMap<String, Vec<u8>>,
    hashes: HashMap<String, HashMap<String, Vec<u8>>>,
}

/// In-memory [`Kv`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_next_pipeline: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `pipeline` call fail without applying anything.
    /// Used to exercise the commit-failure path.
    pub fn fail_next_pipeline(&self) {
        self.fail_next_pipeline.store(true, Ordering::SeqCst);
    }

    /// Number of live string keys, for test assertions.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.inner.lock().strings.len()
    }
}

impl Kv for MemoryStore {
    fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        Ok(self.inner.lock().strings.get(key).cloned())
    }

    fn set_many(&self, pairs: Vec<(String, Vec<u8>)>) -> KvResult<()> {
        let mut inner = self.inner.lock();
        for (key, value) in pairs {
            inner.strings.insert(key, value);
        }
        Ok(())
    }

    fn del_many(&self, keys: Vec<String>) -> KvResult<()> {
        let mut inner = self.inner.lock();
        for key in keys {
            inner.strings.remove(&key);
        }
        Ok(())
    }

    fn pipeline(&self, ops: Vec<Op>) -> KvResult<Vec<Reply>> {
        if self.fail_next_pipeline.swap(false, Ordering::SeqCst) {
            return Err(KvError::TxAborted("injected pipeline failure".to_string()));
        }

        // The lock is held across the whole batch, which is what makes
        // the mock transactionally equivalent to MULTI/EXEC.
        let mut inner = self.inner.lock();
        let mut replies = Vec::with_capacity(ops.len());
        for op in ops {
            let reply = match op {
                Op::Get { key } => Reply::Value(inner.strings.get(&key).cloned()),
                Op::Set { key, value } => {
                    inner.strings.insert(key, value);
                    Reply::Unit
                }
                Op::Del { key } => {
                    inner.strings.remove(&key);
                    Reply::Unit
                }
                Op::HGet { key, field } => Reply::Value(
                    inner
                        .hashes
                        .get(&key)
                        .and_then(|h| h.get(&field))
                        .cloned(),
                ),
                Op::HSet { key, field, value } => {
                    inner.hashes.entry(key).or_default().insert(field, value);
                    Reply::Unit
                }
            };
            replies.push(reply);
        }
        Ok(replies)
    }

    fn hget(&self, key: &str, field: &str) -> KvResult<Option<Vec<u8>>> {
        Ok(self
            .inner
            .lock()
            .hashes
            .get(key)
            .and_then(|h| h.get(field))
            .cloned())
    }

    fn hset(&self, key: &str, field: &str, value: &[u8]) -> KvResult<()> {
        self.inner
            .lock()
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_vec());
        Ok(())
    }

    fn hdel(&self, key: &str, field: &str) -> KvResult<()> {
        if let Some(hash) = self.inner.lock().hashes.get_mut(key) {
            hash.remove(field);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_del() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").unwrap(), None);

        store
            .set_many(vec![("a".to_string(), vec![1]), ("b".to_string(), vec![2])])
            .unwrap();
        assert_eq!(store.get("a").unwrap(), Some(vec![1]));
        assert_eq!(store.get("b").unwrap(), Some(vec![2]));

        store.del_many(vec!["a".to_string(), "missing".to_string()]).unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        assert_eq!(store.get("b").unwrap(), Some(vec![2]));
    }

    #[test]
    fn test_hash_ops() {
        let store = MemoryStore::new();
        assert_eq!(store.hget("nonces", "addr").unwrap(), None);

        store.hset("nonces", "addr", &[0, 9]).unwrap();
        assert_eq!(store.hget("nonces", "addr").unwrap(), Some(vec![0, 9]));

        store.hdel("nonces", "addr").unwrap();
        assert_eq!(store.hget("nonces", "addr").unwrap(), None);
    }

    #[test]
    fn test_pipeline_replies_in_order() {
        let store = MemoryStore::new();
        let replies = store
            .pipeline(vec![
                Op::Set {
                    key: "k".to_string(),
                    value: vec![7],
                },
                Op::Get {
                    key: "k".to_string(),
                },
                Op::Del {
                    key: "k".to_string(),
                },
                Op::Get {
                    key: "k".to_string(),
                },
            ])
            .unwrap();

        assert_eq!(
            replies,
            vec![
                Reply::Unit,
                Reply::Value(Some(vec![7])),
                Reply::Unit,
                Reply::Value(None),
            ]
        );
    }

    #[test]
    fn test_injected_failure_applies_nothing() {
        let store = MemoryStore::new();
        store.fail_next_pipeline();

        let err = store
            .pipeline(vec![Op::Set {
                key: "k".to_string(),
                value: vec![1],
            }])
            .unwrap_err();
        assert!(matches!(err, KvError::TxAborted(_)));
        assert_eq!(store.get("k").unwrap(), None);

        // Only the next pipeline fails; the one after goes through.
        store
            .pipeline(vec![Op::Set {
                key: "k".to_string(),
                value: vec![1],
            }])
            .unwrap();
        assert_eq!(store.get("k").unwrap(), Some(vec![1]));
    }
}
