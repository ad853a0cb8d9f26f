//! Deterministic binary codec for world state and transaction bodies.
//!
//! Every value that reaches the key-value store or a signed payload goes
//! through this codec. The format is length-prefixed and fully
//! deterministic: encoding the same value twice always yields the same
//! bytes, so columns of encoded components can be compared byte-for-byte.
//!
//! Integers are fixed-width big-endian, lengths are unsigned varints,
//! and floats are written as their raw bit patterns with NaN collapsed
//! to a single canonical encoding.

// Lets the derive macros resolve `ward_codec::` paths from inside this
// crate's own tests.
extern crate self as ward_codec;

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

pub use ward_codec_derive::{Decode, Encode};

/// Maximum length accepted for any prefixed collection or string.
/// Anything larger is treated as corrupt input rather than a real value.
const MAX_LEN: u64 = 1 << 30;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("varint too large")]
    VarIntTooLarge,
    #[error("length {len} exceeds limit {max}")]
    LengthOutOfRange { len: u64, max: u64 },
    #[error("invalid bool byte: {0}")]
    InvalidBool(u8),
    #[error("invalid tag byte: {0}")]
    InvalidTag(u8),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("{0} trailing bytes after decode")]
    TrailingBytes(usize),
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// Serialize a value into the deterministic wire form.
pub trait Encode {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<()>;
}

/// Deserialize a value from the deterministic wire form.
///
/// `decode` is the exact inverse of [`Encode::encode`]: for any value,
/// `decode(encode(v)) == v` and no other byte sequence decodes to `v`.
pub trait Decode: Sized {
    fn decode<R: Read>(reader: &mut R) -> Result<Self>;
}

/// Encode a value into a fresh byte vector.
pub fn encode_to_vec<T: Encode>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    value.encode(&mut buf)?;
    Ok(buf)
}

/// Decode a value from a byte slice, rejecting trailing garbage.
pub fn decode_from_slice<T: Decode>(bytes: &[u8]) -> Result<T> {
    let mut reader = bytes;
    let value = T::decode(&mut reader)?;
    if !reader.is_empty() {
        return Err(CodecError::TrailingBytes(reader.len()));
    }
    Ok(value)
}

// Unsigned varint (LEB128)
pub fn write_varint<W: Write>(writer: &mut W, mut value: u64) -> Result<()> {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        writer.write_u8(byte)?;
        if value == 0 {
            break;
        }
    }
    Ok(())
}

pub fn read_varint<R: Read>(reader: &mut R) -> Result<u64> {
    let mut result = 0u64;
    let mut shift = 0;
    loop {
        let byte = reader.read_u8()?;
        result |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift >= 64 {
            return Err(CodecError::VarIntTooLarge);
        }
    }
    Ok(result)
}

fn read_len<R: Read>(reader: &mut R) -> Result<usize> {
    let len = read_varint(reader)?;
    if len > MAX_LEN {
        return Err(CodecError::LengthOutOfRange { len, max: MAX_LEN });
    }
    Ok(len as usize)
}

// Primitive implementations

impl Encode for bool {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(u8::from(*self))?;
        Ok(())
    }
}

impl Decode for bool {
    fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        match reader.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::InvalidBool(other)),
        }
    }
}

macro_rules! impl_int_codec {
    ($ty:ty, $write:ident, $read:ident) => {
        impl Encode for $ty {
            fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
                writer.$write::<BigEndian>(*self)?;
                Ok(())
            }
        }

        impl Decode for $ty {
            fn decode<R: Read>(reader: &mut R) -> Result<Self> {
                Ok(reader.$read::<BigEndian>()?)
            }
        }
    };
}

impl Encode for u8 {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(*self)?;
        Ok(())
    }
}

impl Decode for u8 {
    fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(reader.read_u8()?)
    }
}

impl Encode for i8 {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_i8(*self)?;
        Ok(())
    }
}

impl Decode for i8 {
    fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(reader.read_i8()?)
    }
}

impl_int_codec!(u16, write_u16, read_u16);
impl_int_codec!(i16, write_i16, read_i16);
impl_int_codec!(u32, write_u32, read_u32);
impl_int_codec!(i32, write_i32, read_i32);
impl_int_codec!(u64, write_u64, read_u64);
impl_int_codec!(i64, write_i64, read_i64);

// Floats are written as raw bits. NaN is collapsed to one canonical
// pattern so semantically equal values always encode byte-equal.

impl Encode for f32 {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        let bits = if self.is_nan() {
            0x7FC0_0000
        } else {
            self.to_bits()
        };
        writer.write_u32::<BigEndian>(bits)?;
        Ok(())
    }
}

impl Decode for f32 {
    fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(f32::from_bits(reader.read_u32::<BigEndian>()?))
    }
}

impl Encode for f64 {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        let bits = if self.is_nan() {
            0x7FF8_0000_0000_0000
        } else {
            self.to_bits()
        };
        writer.write_u64::<BigEndian>(bits)?;
        Ok(())
    }
}

impl Decode for f64 {
    fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(f64::from_bits(reader.read_u64::<BigEndian>()?))
    }
}

impl Encode for String {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_varint(writer, self.len() as u64)?;
        writer.write_all(self.as_bytes())?;
        Ok(())
    }
}

impl Decode for String {
    fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let len = read_len(reader)?;
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_varint(writer, self.len() as u64)?;
        for item in self {
            item.encode(writer)?;
        }
        Ok(())
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let len = read_len(reader)?;
        let mut items = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            items.push(T::decode(reader)?);
        }
        Ok(items)
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            None => writer.write_u8(0)?,
            Some(value) => {
                writer.write_u8(1)?;
                value.encode(writer)?;
            }
        }
        Ok(())
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        match reader.read_u8()? {
            0 => Ok(None),
            1 => Ok(Some(T::decode(reader)?)),
            other => Err(CodecError::InvalidTag(other)),
        }
    }
}

macro_rules! impl_tuple_codec {
    ($(($($name:ident),+)),+ $(,)?) => {
        $(
            impl<$($name: Encode),+> Encode for ($($name,)+) {
                fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
                    #[allow(non_snake_case)]
                    let ($($name,)+) = self;
                    $($name.encode(writer)?;)+
                    Ok(())
                }
            }

            impl<$($name: Decode),+> Decode for ($($name,)+) {
                fn decode<R: Read>(reader: &mut R) -> Result<Self> {
                    Ok(($($name::decode(reader)?,)+))
                }
            }
        )+
    };
}

impl_tuple_codec!((A, B), (A, B, C), (A, B, C, D));
