//! Sequential byte-level encoding of protocol datagrams.
//!
//! Every datagram starts with a little-endian `size:u16` covering the
//! whole packet, followed by a `type:u8` and the type-specific payload.
//! The writer fills the size field in when the packet is finished; the
//! reader validates it before any payload access so malformed input is
//! rejected up front instead of panicking halfway through a packet.

use crate::{HEADER_SIZE, SEND_MTU};
use thiserror::Error;

/// Errors produced while decoding an inbound datagram.
///
/// These are expected on a public UDP port and are handled by dropping
/// the offending datagram; none of them is ever fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("datagram too short for a packet header ({0} bytes)")]
    TooShort(usize),
    #[error("advertised packet size {advertised} does not match datagram size {actual}")]
    BadSize { advertised: usize, actual: usize },
    #[error("read past end of packet at offset {0}")]
    Truncated(usize),
    #[error("unknown packet type {0}")]
    UnknownType(u8),
    #[error("unknown address family tag {0}")]
    UnknownFamily(u8),
    #[error("packet would exceed the datagram capacity of {0} bytes")]
    Overflow(usize),
}

/// Builds one outbound packet, field by field.
///
/// Writes that would push the packet past [`SEND_MTU`] are discarded
/// and remembered; [`finish`] then reports [`WireError::Overflow`]
/// instead of handing out an unsendable datagram. The list builder
/// precomputes how many entries fit, so hitting this is a logic error.
///
/// [`finish`]: PacketWriter::finish
pub struct PacketWriter {
    buf: Vec<u8>,
    overflowed: bool,
}

impl PacketWriter {
    pub fn new(packet_type: u8) -> Self {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(&[0, 0, packet_type]);
        PacketWriter {
            buf,
            overflowed: false,
        }
    }

    fn put(&mut self, bytes: &[u8]) {
        if self.buf.len() + bytes.len() > SEND_MTU {
            self.overflowed = true;
            return;
        }
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.put(&[value]);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.put(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.put(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.put(&value.to_le_bytes());
    }

    /// Raw bytes, already in wire order (used for IP addresses).
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.put(bytes);
    }

    /// Patches the size field and returns the finished datagram.
    pub fn finish(mut self) -> Result<Vec<u8>, WireError> {
        if self.overflowed {
            return Err(WireError::Overflow(SEND_MTU));
        }
        let size = self.buf.len() as u16;
        self.buf[0..2].copy_from_slice(&size.to_le_bytes());
        Ok(self.buf)
    }
}

/// Reads one inbound packet, field by field.
#[derive(Debug)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    /// Validates the framing prefix of a received datagram.
    pub fn new(buf: &'a [u8]) -> Result<Self, WireError> {
        if buf.len() < HEADER_SIZE {
            return Err(WireError::TooShort(buf.len()));
        }
        let advertised = u16::from_le_bytes([buf[0], buf[1]]) as usize;
        if advertised != buf.len() {
            return Err(WireError::BadSize {
                advertised,
                actual: buf.len(),
            });
        }
        Ok(PacketReader {
            buf,
            pos: HEADER_SIZE,
        })
    }

    pub fn packet_type(&self) -> u8 {
        self.buf[2]
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], WireError> {
        if self.pos + count > self.buf.len() {
            return Err(WireError::Truncated(self.pos));
        }
        let slice = &self.buf[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, WireError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64, WireError> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], WireError> {
        self.take(count)
    }
}
