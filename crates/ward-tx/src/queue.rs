//! Per-tick transaction queue.
//!
//! One ordered channel per transaction type. Arrival order within a
//! channel is preserved (systems see FIFO per type); no order is
//! promised across channels. The queue encodes deterministically, which
//! is what the tick journal relies on.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use ward_codec::{Decode, Encode};

use crate::{SignedTx, TxHash, TxTypeId};

/// One admitted transaction waiting for its tick.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct QueuedTx {
    pub type_id: TxTypeId,
    pub hash: TxHash,
    pub tx: SignedTx,
}

/// All transactions admitted for one tick, grouped by type.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct TxQueue {
    channels: BTreeMap<u16, Vec<QueuedTx>>,
}

impl TxQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, queued: QueuedTx) {
        self.channels
            .entry(queued.type_id.as_raw())
            .or_default()
            .push(queued);
    }

    /// The channel for one transaction type, in arrival order.
    #[must_use]
    pub fn of_type(&self, type_id: TxTypeId) -> &[QueuedTx] {
        self.channels
            .get(&type_id.as_raw())
            .map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.values().all(Vec::is_empty)
    }

    /// Swap the live queue for an empty one, returning the snapshot.
    pub fn take(&mut self) -> TxQueue {
        std::mem::take(self)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedTx> {
        self.channels.values().flatten()
    }
}

impl Encode for TxQueue {
    fn encode<W: Write>(&self, writer: &mut W) -> ward_codec::Result<()> {
        let pairs: Vec<(u16, Vec<QueuedTx>)> = self
            .channels
            .iter()
            .map(|(id, txs)| (*id, txs.clone()))
            .collect();
        pairs.encode(writer)
    }
}

impl Decode for TxQueue {
    fn decode<R: Read>(reader: &mut R) -> ward_codec::Result<Self> {
        let pairs: Vec<(u16, Vec<QueuedTx>)> = Vec::decode(reader)?;
        Ok(Self {
            channels: pairs.into_iter().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(type_id: u16, nonce: u64) -> QueuedTx {
        let tx = SignedTx::unsigned("tag", "ns", nonce, vec![nonce as u8]);
        QueuedTx {
            type_id: TxTypeId::from_raw(type_id),
            hash: tx.hash(),
            tx,
        }
    }

    #[test]
    fn test_fifo_per_channel() {
        let mut queue = TxQueue::new();
        queue.push(queued(1, 10));
        queue.push(queued(2, 20));
        queue.push(queued(1, 11));

        let ones = queue.of_type(TxTypeId::from_raw(1));
        assert_eq!(ones.len(), 2);
        assert_eq!(ones[0].tx.nonce, 10);
        assert_eq!(ones[1].tx.nonce, 11);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_take_leaves_empty_queue() {
        let mut queue = TxQueue::new();
        queue.push(queued(1, 1));

        let snapshot = queue.take();
        assert_eq!(snapshot.len(), 1);
        assert!(queue.is_empty());

        // New arrivals accrue for the next tick.
        queue.push(queued(1, 2));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_queue_codec_roundtrip() {
        let mut queue = TxQueue::new();
        queue.push(queued(2, 5));
        queue.push(queued(1, 6));
        queue.push(queued(2, 7));

        let bytes = ward_codec::encode_to_vec(&queue).unwrap();
        let decoded: TxQueue = ward_codec::decode_from_slice(&bytes).unwrap();
        assert_eq!(queue, decoded);
    }
}
