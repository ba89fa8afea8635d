//! The `Command` contract and the payload primitives commands are built from.
//!
//! Field encodings shared by every command:
//! - integers and floats are big-endian
//! - strings are `[Len(u16)] [Bytes...]`
//! - long strings are `[Len(u32)] [Bytes...]`
//! - wide strings are `[Units(u16)] [UTF-16BE...]`

use crate::core::packet::Payload;
use crate::error::{ProtocolError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// A typed application command with a stable numeric identifier.
pub trait Command: Sized {
    const ID: u16;
    const NAME: &'static str;

    /// Append the payload (command id excluded) to `dst`.
    fn encode(&self, dst: &mut BytesMut) -> Result<()>;

    /// Parse the payload that followed the command id.
    fn decode(src: &mut PayloadReader) -> Result<Self>;

    /// Command id plus encoded payload.
    fn to_payload(&self) -> Result<Payload> {
        let mut dst = BytesMut::new();
        self.encode(&mut dst)?;
        Ok(Payload::new(Self::ID, dst.freeze()))
    }

    /// Decode a payload; bytes beyond the defined fields are ignored.
    fn from_bytes(data: Bytes) -> Result<Self> {
        let mut reader = PayloadReader::new(Self::NAME, data);
        Self::decode(&mut reader)
    }
}

/// Bounds-checked cursor over a command payload.
///
/// Every read reports `CommandDecode` naming the command instead of panicking
/// on a short buffer.
#[derive(Debug)]
pub struct PayloadReader {
    command: &'static str,
    buf: Bytes,
}

impl PayloadReader {
    pub fn new(command: &'static str, buf: Bytes) -> Self {
        Self { command, buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn is_empty(&self) -> bool {
        !self.buf.has_remaining()
    }

    fn need(&self, len: usize, field: &str) -> Result<()> {
        if self.buf.remaining() < len {
            return Err(ProtocolError::decode(
                self.command,
                format!(
                    "{field}: need {len} bytes, {} remaining",
                    self.buf.remaining()
                ),
            ));
        }
        Ok(())
    }

    pub fn u8(&mut self, field: &str) -> Result<u8> {
        self.need(1, field)?;
        Ok(self.buf.get_u8())
    }

    pub fn u16(&mut self, field: &str) -> Result<u16> {
        self.need(2, field)?;
        Ok(self.buf.get_u16())
    }

    pub fn i16(&mut self, field: &str) -> Result<i16> {
        self.need(2, field)?;
        Ok(self.buf.get_i16())
    }

    pub fn u32(&mut self, field: &str) -> Result<u32> {
        self.need(4, field)?;
        Ok(self.buf.get_u32())
    }

    pub fn u64(&mut self, field: &str) -> Result<u64> {
        self.need(8, field)?;
        Ok(self.buf.get_u64())
    }

    pub fn i32(&mut self, field: &str) -> Result<i32> {
        self.need(4, field)?;
        Ok(self.buf.get_i32())
    }

    pub fn f32(&mut self, field: &str) -> Result<f32> {
        self.need(4, field)?;
        Ok(self.buf.get_f32())
    }

    pub fn bytes(&mut self, len: usize, field: &str) -> Result<Bytes> {
        self.need(len, field)?;
        Ok(self.buf.split_to(len))
    }

    /// `[Len(u16)] [Bytes...]`
    pub fn string_bytes(&mut self, field: &str) -> Result<Bytes> {
        let len = self.u16(field)? as usize;
        self.bytes(len, field)
    }

    /// `[Len(u32)] [Bytes...]`
    pub fn long_string_bytes(&mut self, field: &str) -> Result<Bytes> {
        let len = self.u32(field)? as usize;
        self.bytes(len, field)
    }

    /// Length-prefixed string; invalid UTF-8 is replaced rather than rejected.
    pub fn string(&mut self, field: &str) -> Result<String> {
        let raw = self.string_bytes(field)?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    /// `[Units(u16)] [UTF-16BE...]`
    pub fn wide_string(&mut self, field: &str) -> Result<String> {
        let units = self.u16(field)? as usize;
        self.need(units * 2, field)?;
        let decoded: Vec<u16> = (0..units).map(|_| self.buf.get_u16()).collect();
        Ok(String::from_utf16_lossy(&decoded))
    }

    /// Everything not yet consumed.
    pub fn rest(&mut self) -> Bytes {
        self.buf.split_off(0)
    }
}

/// Append a `[Len(u16)] [Bytes...]` string.
pub fn put_string(dst: &mut BytesMut, command: &'static str, value: &[u8]) -> Result<()> {
    let len = u16::try_from(value.len()).map_err(|_| {
        ProtocolError::encode(
            command,
            format!("string of {} bytes exceeds u16 length prefix", value.len()),
        )
    })?;
    dst.put_u16(len);
    dst.put_slice(value);
    Ok(())
}

/// Append a `[Len(u32)] [Bytes...]` long string.
pub fn put_long_string(dst: &mut BytesMut, command: &'static str, value: &[u8]) -> Result<()> {
    let len = u32::try_from(value.len()).map_err(|_| {
        ProtocolError::encode(
            command,
            format!("long string of {} bytes exceeds u32 length prefix", value.len()),
        )
    })?;
    dst.put_u32(len);
    dst.put_slice(value);
    Ok(())
}

/// Append a `[Units(u16)] [UTF-16BE...]` wide string.
pub fn put_wide_string(dst: &mut BytesMut, command: &'static str, value: &str) -> Result<()> {
    let units: Vec<u16> = value.encode_utf16().collect();
    let len = u16::try_from(units.len()).map_err(|_| {
        ProtocolError::encode(
            command,
            format!("wide string of {} units exceeds u16 length prefix", units.len()),
        )
    })?;
    dst.put_u16(len);
    for unit in units {
        dst.put_u16(unit);
    }
    Ok(())
}

/// Float position `[X(f32)] [Y(f32)] [Z(f32)]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct V3f {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl V3f {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub(crate) fn read(src: &mut PayloadReader, field: &str) -> Result<Self> {
        Ok(Self {
            x: src.f32(field)?,
            y: src.f32(field)?,
            z: src.f32(field)?,
        })
    }

    pub(crate) fn write(&self, dst: &mut BytesMut) {
        dst.put_f32(self.x);
        dst.put_f32(self.y);
        dst.put_f32(self.z);
    }
}

/// Map block position `[X(i16)] [Y(i16)] [Z(i16)]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct V3s16 {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl V3s16 {
    pub fn new(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z }
    }

    pub(crate) fn read(src: &mut PayloadReader, field: &str) -> Result<Self> {
        Ok(Self {
            x: src.i16(field)?,
            y: src.i16(field)?,
            z: src.i16(field)?,
        })
    }

    pub(crate) fn write(&self, dst: &mut BytesMut) {
        dst.put_i16(self.x);
        dst.put_i16(self.y);
        dst.put_i16(self.z);
    }
}

/// Float pair `[X(f32)] [Y(f32)]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct V2f {
    pub x: f32,
    pub y: f32,
}

impl V2f {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub(crate) fn read(src: &mut PayloadReader, field: &str) -> Result<Self> {
        Ok(Self {
            x: src.f32(field)?,
            y: src.f32(field)?,
        })
    }

    pub(crate) fn write(&self, dst: &mut BytesMut) {
        dst.put_f32(self.x);
        dst.put_f32(self.y);
    }
}
