//! Entity identifiers and locations.

use std::fmt;
use std::io::{Read, Write};

use ward_codec::{Decode, Encode};

use crate::ArchetypeId;

/// An opaque, monotonically increasing entity identifier.
///
/// Ids are handed out by the world's entity counter and are never
/// reused: destroying an entity retires its id permanently. An entity
/// exists iff it has a [`Location`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Encode for EntityId {
    fn encode<W: Write>(&self, writer: &mut W) -> ward_codec::Result<()> {
        self.0.encode(writer)
    }
}

impl Decode for EntityId {
    fn decode<R: Read>(reader: &mut R) -> ward_codec::Result<Self> {
        Ok(Self(u64::decode(reader)?))
    }
}

/// Where a live entity sits: which archetype table and which row.
///
/// Invariant: row `r` of archetype `a` names exactly the entity whose
/// location is `(a, r)`, and every column of `a` has at least `r + 1`
/// cells.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Location {
    pub archetype: ArchetypeId,
    pub row: usize,
}

impl Encode for Location {
    fn encode<W: Write>(&self, writer: &mut W) -> ward_codec::Result<()> {
        self.archetype.as_raw().encode(writer)?;
        (self.row as u64).encode(writer)
    }
}

impl Decode for Location {
    fn decode<R: Read>(reader: &mut R) -> ward_codec::Result<Self> {
        let archetype = ArchetypeId::from_raw(u32::decode(reader)?);
        let row = u64::decode(reader)? as usize;
        Ok(Self { archetype, row })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_roundtrip() {
        let loc = Location {
            archetype: ArchetypeId::from_raw(3),
            row: 17,
        };
        let bytes = ward_codec::encode_to_vec(&loc).unwrap();
        let decoded: Location = ward_codec::decode_from_slice(&bytes).unwrap();
        assert_eq!(loc, decoded);
    }
}
