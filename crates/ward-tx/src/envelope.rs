//! Signed transaction envelope and hash.

use std::fmt;
use std::io::{Read, Write};

use sha2::{Digest, Sha256};
use ward_codec::{Decode, Encode};

/// The wire envelope of one transaction.
///
/// The signature covers the namespace, the nonce, and the body, so a
/// payload signed for one world cannot be replayed into another and a
/// payload admitted once cannot be admitted again.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct SignedTx {
    pub persona_tag: String,
    pub namespace: String,
    pub nonce: u64,
    pub body: Vec<u8>,
    pub signature: Vec<u8>,
    /// Set only on transactions arriving through the system path.
    pub system: bool,
}

impl SignedTx {
    /// An unsigned envelope, used where signature verification is
    /// disabled or for internally queued transactions.
    #[must_use]
    pub fn unsigned(persona_tag: &str, namespace: &str, nonce: u64, body: Vec<u8>) -> Self {
        Self {
            persona_tag: persona_tag.to_string(),
            namespace: namespace.to_string(),
            nonce,
            body,
            signature: Vec::new(),
            system: false,
        }
    }

    /// Deterministic hash over every envelope field plus the body.
    #[must_use]
    pub fn hash(&self) -> TxHash {
        let mut hasher = Sha256::new();
        self.encode(&mut hasher)
            .expect("encoding into a hasher cannot fail");
        TxHash(hasher.finalize().into())
    }
}

/// Identity of one transaction instance.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxHash(pub [u8; 32]);

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({self})")
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl Encode for TxHash {
    fn encode<W: Write>(&self, writer: &mut W) -> ward_codec::Result<()> {
        writer.write_all(&self.0)?;
        Ok(())
    }
}

impl Decode for TxHash {
    fn decode<R: Read>(reader: &mut R) -> ward_codec::Result<Self> {
        let mut bytes = [0u8; 32];
        reader.read_exact(&mut bytes)?;
        Ok(Self(bytes))
    }
}
