//! Signed transaction types, registry, and per-tick queue.
//!
//! Transactions are named, typed channels: each registered type gets a
//! dense [`TxTypeId`] in registration order, which is why registration
//! order is part of a world's configuration. Instances arrive wrapped in
//! a [`SignedTx`] envelope and wait in a [`TxQueue`] until the tick
//! executor snapshots the queue.

mod envelope;
mod queue;
mod verify;

pub use envelope::{SignedTx, TxHash};
pub use queue::{QueuedTx, TxQueue};
pub use verify::{NoopVerifier, RejectingVerifier, SignatureError, SignatureVerifier};

use std::fmt;
use std::io::{Read, Write};
use std::marker::PhantomData;

use hashbrown::HashMap;
use thiserror::Error;
use ward_codec::{Decode, Encode};

#[derive(Error, Debug)]
pub enum TxError {
    #[error("transaction {0:?} is already registered")]
    DuplicateName(String),
    #[error("unknown transaction type: {0}")]
    UnknownName(String),
}

/// Dense identifier for a registered transaction type. Ids start at 1.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxTypeId(u16);

impl TxTypeId {
    #[must_use]
    pub const fn from_raw(id: u16) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn as_raw(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for TxTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxTypeId({})", self.0)
    }
}

impl Encode for TxTypeId {
    fn encode<W: Write>(&self, writer: &mut W) -> ward_codec::Result<()> {
        self.0.encode(writer)
    }
}

impl Decode for TxTypeId {
    fn decode<R: Read>(reader: &mut R) -> ward_codec::Result<Self> {
        Ok(Self(u16::decode(reader)?))
    }
}

/// Typed handle to a registered transaction channel.
///
/// `I` is the input systems read out of the queue, `O` the result type
/// recorded into receipts. The handle is returned by registration and is
/// freely copyable.
pub struct TxType<I, O> {
    id: TxTypeId,
    name: &'static str,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O> Clone for TxType<I, O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<I, O> Copy for TxType<I, O> {}

impl<I, O> TxType<I, O> {
    /// Bind a handle to an id assigned by a [`TxRegistry`].
    #[must_use]
    pub const fn new(id: TxTypeId, name: &'static str) -> Self {
        Self {
            id,
            name,
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub const fn id(&self) -> TxTypeId {
        self.id
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<I: Encode, O> TxType<I, O> {
    /// Encode an input value into a transaction body.
    pub fn encode_input(&self, input: &I) -> ward_codec::Result<Vec<u8>> {
        ward_codec::encode_to_vec(input)
    }
}

impl<I: Decode, O> TxType<I, O> {
    /// Decode a transaction body back into the input value.
    pub fn decode_input(&self, body: &[u8]) -> ward_codec::Result<I> {
        ward_codec::decode_from_slice(body)
    }
}

impl<I, O> fmt::Debug for TxType<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxType")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// Name to id mapping for transaction types, in registration order.
#[derive(Default)]
pub struct TxRegistry {
    by_name: HashMap<&'static str, TxTypeId>,
    names: Vec<&'static str>,
}

impl TxRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a name and assign the next dense id.
    pub fn register(&mut self, name: &'static str) -> Result<TxTypeId, TxError> {
        if self.by_name.contains_key(name) {
            return Err(TxError::DuplicateName(name.to_string()));
        }
        let id = TxTypeId((self.names.len() + 1) as u16);
        self.by_name.insert(name, id);
        self.names.push(name);
        Ok(id)
    }

    #[must_use]
    pub fn id_by_name(&self, name: &str) -> Option<TxTypeId> {
        self.by_name.get(name).copied()
    }

    #[must_use]
    pub fn name_of(&self, id: TxTypeId) -> Option<&'static str> {
        let idx = (id.as_raw() as usize).checked_sub(1)?;
        self.names.get(idx).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl fmt::Debug for TxRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxRegistry")
            .field("names", &self.names)
            .finish()
    }
}
