//! The little-endian binary wire codec.
//!
//! All wire structures serialize through [`BinaryWriter`] and
//! [`BinaryReader`]: integers little-endian, lengths as `varuint32`
//! (seven bits per byte, high bit continues). The [`Pack`] and [`Unpack`]
//! traits are implemented by hand for each wire type; there is no
//! reflection anywhere in the codec.

use crate::asset::{Asset, Symbol};
use crate::bytes::{Bytes, Checksum256};
use crate::name::Name;
use crate::time::TimePointSec;

/// Errors raised while decoding wire bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum CodecError {
    /// The input ended before the structure was complete.
    #[error("unexpected end of input")]
    UnexpectedEnd,
    /// A `varuint32` ran past five bytes.
    #[error("varuint32 is too long")]
    VaruintTooLong,
    /// A length-prefixed string held invalid UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    /// A variant tag outside the declared set.
    #[error("unknown tag {tag} for {type_name}")]
    UnknownVariantTag {
        /// The variant type being decoded.
        type_name: &'static str,
        /// The offending wire tag.
        tag: u32,
    },
    /// Bytes left over after the outermost structure was decoded.
    #[error("{0} trailing bytes after decode")]
    TrailingBytes(usize),
}

/// Accumulates wire bytes.
#[derive(Debug, Default)]
pub struct BinaryWriter {
    buf: Vec<u8>,
}

impl BinaryWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes the writer and returns the accumulated bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Appends raw bytes with no length prefix.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Appends a `varuint32`: seven bits per byte, high bit set while more
    /// bytes follow.
    pub fn write_varuint32(&mut self, mut v: u32) {
        loop {
            #[allow(clippy::cast_possible_truncation)]
            let mut b = (v & 0x7f) as u8;
            v >>= 7;
            b |= u8::from(v > 0) << 7;
            self.buf.push(b);
            if v == 0 {
                break;
            }
        }
    }

    /// Appends a length-prefixed blob.
    pub fn write_blob(&mut self, bytes: &[u8]) {
        #[allow(clippy::cast_possible_truncation)]
        self.write_varuint32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }
}

/// Walks wire bytes.
#[derive(Debug)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BinaryReader<'a> {
    /// Wraps a byte slice.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns `true` when all input has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Fails with [`CodecError::TrailingBytes`] unless the input is fully
    /// consumed.
    pub fn expect_end(&self) -> Result<(), CodecError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CodecError::TrailingBytes(self.remaining()))
        }
    }

    /// Consumes exactly `n` bytes.
    pub fn read_exact(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEnd);
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.read_exact(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.read_exact(2)?.try_into().unwrap()))
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.read_exact(4)?.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.read_exact(8)?.try_into().unwrap()))
    }

    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_le_bytes(self.read_exact(8)?.try_into().unwrap()))
    }

    /// Consumes a `varuint32`.
    pub fn read_varuint32(&mut self) -> Result<u32, CodecError> {
        let mut value: u32 = 0;
        for shift in (0..35).step_by(7) {
            let b = self.read_u8()?;
            if shift == 28 && b > 0x0f {
                return Err(CodecError::VaruintTooLong);
            }
            value |= u32::from(b & 0x7f) << shift;
            if b & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(CodecError::VaruintTooLong)
    }

    /// Consumes a length-prefixed blob.
    pub fn read_blob(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.read_varuint32()? as usize;
        Ok(self.read_exact(len)?.to_vec())
    }

    /// Consumes a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, CodecError> {
        String::from_utf8(self.read_blob()?).map_err(|_| CodecError::InvalidUtf8)
    }
}

/// Serializes a wire type into a [`BinaryWriter`].
pub trait Pack {
    /// Appends the wire form of `self`.
    fn pack(&self, w: &mut BinaryWriter);

    /// Convenience: the wire form as a fresh byte vector.
    fn packed(&self) -> Vec<u8> {
        let mut w = BinaryWriter::new();
        self.pack(&mut w);
        w.into_bytes()
    }
}

/// Deserializes a wire type from a [`BinaryReader`].
pub trait Unpack: Sized {
    /// Consumes the wire form of `Self`.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] on truncated or structurally invalid input.
    fn unpack(r: &mut BinaryReader<'_>) -> Result<Self, CodecError>;

    /// Decodes from a byte slice, requiring full consumption.
    ///
    /// # Errors
    ///
    /// As [`Unpack::unpack`], plus [`CodecError::TrailingBytes`] when input
    /// remains.
    fn unpack_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = BinaryReader::new(bytes);
        let value = Self::unpack(&mut r)?;
        r.expect_end()?;
        Ok(value)
    }
}

macro_rules! impl_int_codec {
    ($($t:ty => $write:ident, $read:ident;)*) => {$(
        impl Pack for $t {
            fn pack(&self, w: &mut BinaryWriter) {
                w.$write(*self);
            }
        }
        impl Unpack for $t {
            fn unpack(r: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
                r.$read()
            }
        }
    )*};
}

impl_int_codec! {
    u8 => write_u8, read_u8;
    u16 => write_u16, read_u16;
    u32 => write_u32, read_u32;
    u64 => write_u64, read_u64;
    i64 => write_i64, read_i64;
}

impl Pack for bool {
    fn pack(&self, w: &mut BinaryWriter) {
        w.write_u8(u8::from(*self));
    }
}

impl Unpack for bool {
    fn unpack(r: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        Ok(r.read_u8()? != 0)
    }
}

impl Pack for String {
    fn pack(&self, w: &mut BinaryWriter) {
        w.write_blob(self.as_bytes());
    }
}

impl Unpack for String {
    fn unpack(r: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        r.read_string()
    }
}

impl Pack for Bytes {
    fn pack(&self, w: &mut BinaryWriter) {
        w.write_blob(self.as_slice());
    }
}

impl Unpack for Bytes {
    fn unpack(r: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        Ok(Self(r.read_blob()?))
    }
}

impl<T: Pack> Pack for Vec<T> {
    fn pack(&self, w: &mut BinaryWriter) {
        #[allow(clippy::cast_possible_truncation)]
        w.write_varuint32(self.len() as u32);
        for item in self {
            item.pack(w);
        }
    }
}

impl<T: Unpack> Unpack for Vec<T> {
    fn unpack(r: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        let len = r.read_varuint32()? as usize;
        let mut items = Self::with_capacity(len.min(4096));
        for _ in 0..len {
            items.push(T::unpack(r)?);
        }
        Ok(items)
    }
}

impl<T: Pack> Pack for Option<T> {
    fn pack(&self, w: &mut BinaryWriter) {
        match self {
            Some(value) => {
                w.write_u8(1);
                value.pack(w);
            }
            None => w.write_u8(0),
        }
    }
}

impl<T: Unpack> Unpack for Option<T> {
    fn unpack(r: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        match r.read_u8()? {
            0 => Ok(None),
            _ => Ok(Some(T::unpack(r)?)),
        }
    }
}

impl Pack for Name {
    fn pack(&self, w: &mut BinaryWriter) {
        w.write_u64(self.value());
    }
}

impl Unpack for Name {
    fn unpack(r: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        Ok(Self::new(r.read_u64()?))
    }
}

impl Pack for Checksum256 {
    fn pack(&self, w: &mut BinaryWriter) {
        w.write_raw(&self.0);
    }
}

impl Unpack for Checksum256 {
    fn unpack(r: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        Ok(Self(r.read_exact(32)?.try_into().unwrap()))
    }
}

impl Pack for TimePointSec {
    fn pack(&self, w: &mut BinaryWriter) {
        w.write_u32(self.as_secs());
    }
}

impl Unpack for TimePointSec {
    fn unpack(r: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        Ok(Self::from_secs(r.read_u32()?))
    }
}

impl Pack for Symbol {
    fn pack(&self, w: &mut BinaryWriter) {
        w.write_u64(self.raw());
    }
}

impl Unpack for Symbol {
    fn unpack(r: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        Ok(Self::from_raw(r.read_u64()?))
    }
}

impl Pack for Asset {
    fn pack(&self, w: &mut BinaryWriter) {
        w.write_i64(self.amount);
        self.symbol.pack(w);
    }
}

impl Unpack for Asset {
    fn unpack(r: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        let amount = r.read_i64()?;
        let symbol = Symbol::unpack(r)?;
        Ok(Self { amount, symbol })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varuint_roundtrip() {
        for v in [0u32, 1, 0x7f, 0x80, 300, 0xffff, u32::MAX] {
            let mut w = BinaryWriter::new();
            w.write_varuint32(v);
            let bytes = w.into_bytes();
            let mut r = BinaryReader::new(&bytes);
            assert_eq!(r.read_varuint32().unwrap(), v);
            assert!(r.is_empty());
        }
    }

    #[test]
    fn varuint_known_bytes() {
        let mut w = BinaryWriter::new();
        w.write_varuint32(11);
        assert_eq!(w.into_bytes(), vec![0x0b]);
        let mut w = BinaryWriter::new();
        w.write_varuint32(300);
        assert_eq!(w.into_bytes(), vec![0xac, 0x02]);
    }

    #[test]
    fn truncated_input() {
        let mut r = BinaryReader::new(&[0x01]);
        assert_eq!(r.read_u16(), Err(CodecError::UnexpectedEnd));
        let mut r = BinaryReader::new(&[0x80, 0x80, 0x80, 0x80, 0x80]);
        assert_eq!(r.read_varuint32(), Err(CodecError::VaruintTooLong));
    }

    #[test]
    fn string_blob() {
        let mut w = BinaryWriter::new();
        "hello there".to_string().pack(&mut w);
        let bytes = w.into_bytes();
        assert_eq!(bytes[0], 0x0b);
        assert_eq!(String::unpack_bytes(&bytes).unwrap(), "hello there");
    }

    #[test]
    fn optional_and_vec() {
        let some: Option<u16> = Some(7);
        let decoded: Option<u16> = Unpack::unpack_bytes(&some.packed()).unwrap();
        assert_eq!(decoded, some);
        assert_eq!(None::<u16>.packed(), vec![0]);

        let v = vec![1u8, 2, 3];
        assert_eq!(v.packed(), vec![3, 1, 2, 3]);
        assert_eq!(Vec::<u8>::unpack_bytes(&v.packed()).unwrap(), v);
    }

    #[test]
    fn trailing_detected() {
        assert_eq!(
            u8::unpack_bytes(&[1, 2]),
            Err(CodecError::TrailingBytes(1))
        );
    }
}
