//! Forward-only cursor over one datagram.

use crate::error::DecodeError;
use crate::text;

/// Little-endian reader over a single server datagram.
///
/// Fixed-width reads either return the value and advance by exactly the
/// field width, or return [`DecodeError::Insufficient`] and leave the cursor
/// where it was.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Current cursor position from the start of the datagram.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let insufficient = DecodeError::Insufficient {
            needed: N,
            offset: self.offset,
            len: self.data.len(),
        };

        let end = self.offset.checked_add(N).ok_or(insufficient)?;
        let bytes = self
            .data
            .get(self.offset..end)
            .and_then(|slice| <[u8; N]>::try_from(slice).ok())
            .ok_or(insufficient)?;

        self.offset = end;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(u8::from_le_bytes(self.read_array::<1>()?))
    }

    pub fn read_u16_le(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.read_array::<2>()?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.read_array::<4>()?))
    }

    /// Reads a raw `f32`. Non-finite values are returned as-is.
    pub fn read_f32_le(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_le_bytes(self.read_array::<4>()?))
    }

    /// Reads a string whose encoding must be inferred.
    ///
    /// Never fails: when no decoding strategy matches, the length byte is
    /// skipped and an empty string is returned. At end of buffer nothing is
    /// consumed.
    pub fn read_string(&mut self) -> String {
        let tail = match self.data.get(self.offset..) {
            Some(tail) if !tail.is_empty() => tail,
            _ => return String::new(),
        };

        let decoded = text::decode(tail);
        self.offset = self.offset.saturating_add(decoded.consumed);
        decoded.text
    }
}
