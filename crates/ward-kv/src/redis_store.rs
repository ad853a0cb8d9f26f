//! Redis-compatible driver.
//!
//! Two connections are opened per store: one reserved for commit
//! pipelines and one shared by everything else, so admission-time reads
//! never queue in front of a tick commit.

use parking_lot::Mutex;

use crate::{Kv, KvError, KvResult, Op, Reply};

/// [`Kv`] implementation backed by a Redis-compatible server.
pub struct RedisStore {
    /// Reserved for `pipeline`; commit batches never contend with reads.
    commit_conn: Mutex<redis::Connection>,
    /// Shared by get/set/del and the nonce hash.
    shared_conn: Mutex<redis::Connection>,
}

impl RedisStore {
    /// Connect to the server at `addr`, e.g. `redis://localhost:6379`.
    pub fn connect(addr: &str) -> KvResult<Self> {
        let client = redis::Client::open(addr)?;
        let commit_conn = client.get_connection()?;
        let shared_conn = client.get_connection()?;
        tracing::debug!(addr, "connected to key-value backend");
        Ok(Self {
            commit_conn: Mutex::new(commit_conn),
            shared_conn: Mutex::new(shared_conn),
        })
    }

    /// Connect with socket deadlines, so a stalled server bounds every
    /// call instead of hanging admission or commit forever.
    pub fn connect_with_timeout(addr: &str, timeout: std::time::Duration) -> KvResult<Self> {
        let store = Self::connect(addr)?;
        for conn in [&store.commit_conn, &store.shared_conn] {
            let conn = conn.lock();
            conn.set_read_timeout(Some(timeout))?;
            conn.set_write_timeout(Some(timeout))?;
        }
        Ok(store)
    }

    fn value_reply(value: redis::Value) -> KvResult<Reply> {
        match value {
            redis::Value::Nil => Ok(Reply::Value(None)),
            redis::Value::Data(bytes) => Ok(Reply::Value(Some(bytes))),
            other => Err(KvError::UnexpectedReply(format!("{other:?}"))),
        }
    }
}

impl Kv for RedisStore {
    fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        let mut conn = self.shared_conn.lock();
        Ok(redis::cmd("GET").arg(key).query(&mut *conn)?)
    }

    fn set_many(&self, pairs: Vec<(String, Vec<u8>)>) -> KvResult<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in pairs {
            pipe.cmd("SET").arg(key).arg(value).ignore();
        }
        let mut conn = self.shared_conn.lock();
        pipe.query::<()>(&mut *conn)?;
        Ok(())
    }

    fn del_many(&self, keys: Vec<String>) -> KvResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for key in keys {
            pipe.cmd("DEL").arg(key).ignore();
        }
        let mut conn = self.shared_conn.lock();
        pipe.query::<()>(&mut *conn)?;
        Ok(())
    }

    fn pipeline(&self, ops: Vec<Op>) -> KvResult<Vec<Reply>> {
        if ops.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in &ops {
            match op {
                Op::Get { key } => {
                    pipe.cmd("GET").arg(key);
                }
                Op::Set { key, value } => {
                    pipe.cmd("SET").arg(key).arg(value.as_slice());
                }
                Op::Del { key } => {
                    pipe.cmd("DEL").arg(key);
                }
                Op::HGet { key, field } => {
                    pipe.cmd("HGET").arg(key).arg(field);
                }
                Op::HSet { key, field, value } => {
                    pipe.cmd("HSET").arg(key).arg(field).arg(value.as_slice());
                }
            }
        }

        let mut conn = self.commit_conn.lock();
        let values: Vec<redis::Value> = pipe.query(&mut *conn)?;
        if values.len() != ops.len() {
            return Err(KvError::UnexpectedReply(format!(
                "pipeline returned {} replies for {} ops",
                values.len(),
                ops.len()
            )));
        }

        ops.iter()
            .zip(values)
            .map(|(op, value)| match op {
                Op::Get { .. } | Op::HGet { .. } => Self::value_reply(value),
                Op::Set { .. } | Op::Del { .. } | Op::HSet { .. } => Ok(Reply::Unit),
            })
            .collect()
    }

    fn hget(&self, key: &str, field: &str) -> KvResult<Option<Vec<u8>>> {
        let mut conn = self.shared_conn.lock();
        Ok(redis::cmd("HGET").arg(key).arg(field).query(&mut *conn)?)
    }

    fn hset(&self, key: &str, field: &str, value: &[u8]) -> KvResult<()> {
        let mut conn = self.shared_conn.lock();
        redis::cmd("HSET")
            .arg(key)
            .arg(field)
            .arg(value)
            .query::<()>(&mut *conn)?;
        Ok(())
    }

    fn hdel(&self, key: &str, field: &str) -> KvResult<()> {
        let mut conn = self.shared_conn.lock();
        redis::cmd("HDEL")
            .arg(key)
            .arg(field)
            .query::<()>(&mut *conn)?;
        Ok(())
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}
