//! Wire format serialization and deserialization.
//!
//! Packets travel as a fixed-layout record with no framing: a receiver accepts
//! exactly [`frame_len`] bytes and nothing else.
//!
//! ## Packet Wire Format
//!
//! ```text
//! text (64, NUL padded) || ttl (1) || kind (1) || flags (1)
//! || destination (6) || source (6) || id (4, big-endian)
//! || path_index (1) || path_length (1) || path (N × 6)
//!
//! kind:
//! - 1: BROADCAST
//! - 2: DATA
//! - other values are carried through as PacketKind::Other
//!
//! flags byte:
//! - bit 0: broadcast_ack
//! - bit 1: data_ack
//! - bit 2: path_exists
//! - bits 3-7: reserved (must be 0)
//! ```
//!
//! `path_index` is the read cursor when `path_exists` is set and the write cursor
//! otherwise. Both `path_index` and `path_length` must be at most `N - 1`.

use alloc::vec::Vec;

use crate::path::Path;
use crate::types::{MacAddr, Packet, PacketKind, Text, MAC_SIZE, TEXT_CAPACITY};

pub const FLAG_BROADCAST_ACK: u8 = 0x01;
pub const FLAG_DATA_ACK: u8 = 0x02;
pub const FLAG_PATH_EXISTS: u8 = 0x04;
const FLAGS_RESERVED: u8 = !(FLAG_BROADCAST_ACK | FLAG_DATA_ACK | FLAG_PATH_EXISTS);

/// Size of the fixed header preceding the path slots.
const HEADER_LEN: usize = TEXT_CAPACITY + 1 + 1 + 1 + MAC_SIZE + MAC_SIZE + 4 + 1 + 1;

/// Exact on-air size of a `Packet<N>`.
pub const fn frame_len<const N: usize>() -> usize {
    HEADER_LEN + N * MAC_SIZE
}

/// Decoding error types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// Unexpected end of buffer.
    UnexpectedEof,
    /// Frame is not exactly the expected size, or has trailing bytes.
    InvalidLength,
    /// Reserved flag bits set.
    InvalidFlags,
    /// A cursor or length field points outside the path.
    InvalidValue,
}

impl core::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DecodeError::UnexpectedEof => write!(f, "unexpected end of frame"),
            DecodeError::InvalidLength => write!(f, "invalid frame length"),
            DecodeError::InvalidFlags => write!(f, "reserved flag bits set"),
            DecodeError::InvalidValue => write!(f, "path field out of range"),
        }
    }
}

/// Zero-copy reader over a byte slice.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Returns the number of bytes remaining.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let v = *self.buf.get(self.pos).ok_or(DecodeError::UnexpectedEof)?;
        self.pos += 1;
        Ok(v)
    }

    /// Read a fixed number of bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if len > self.remaining() {
            return Err(DecodeError::UnexpectedEof);
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Read a fixed-size array.
    pub fn read_array<const L: usize>(&mut self) -> Result<[u8; L], DecodeError> {
        let mut out = [0u8; L];
        out.copy_from_slice(self.read_bytes(L)?);
        Ok(out)
    }

    /// Read a u32 in big-endian format.
    pub fn read_u32_be(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    /// Read a 6-byte link address.
    pub fn read_mac(&mut self) -> Result<MacAddr, DecodeError> {
        Ok(MacAddr(self.read_array()?))
    }
}

/// Writer for encoding packets.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    /// Write a u32 in big-endian format.
    pub fn write_u32_be(&mut self, v: u32) {
        self.write_bytes(&v.to_be_bytes());
    }

    pub fn write_mac(&mut self, addr: &MacAddr) {
        self.write_bytes(&addr.0);
    }

    /// Finish writing and return the buffer.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Trait for types that can be encoded to wire format.
pub trait Encode {
    /// Encode this value to the writer.
    fn encode(&self, w: &mut Writer);

    /// Encode and return the bytes.
    fn encode_to_vec(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.encode(&mut w);
        w.finish()
    }
}

/// Trait for types that can be decoded from wire format.
pub trait Decode: Sized {
    /// Decode a value from the reader.
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError>;

    /// Decode from a byte slice (strict: rejects trailing bytes).
    fn decode_from_slice(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        let result = Self::decode(&mut r)?;
        if !r.is_empty() {
            return Err(DecodeError::InvalidLength);
        }
        Ok(result)
    }
}

impl<const N: usize> Packet<N> {
    /// Build the flags byte from the three packet booleans.
    pub fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.broadcast_ack {
            flags |= FLAG_BROADCAST_ACK;
        }
        if self.data_ack {
            flags |= FLAG_DATA_ACK;
        }
        if self.path_exists {
            flags |= FLAG_PATH_EXISTS;
        }
        flags
    }

    /// Cursor value carried in the `path_index` field.
    pub fn wire_path_index(&self) -> u8 {
        if self.path_exists {
            self.read_cursor
        } else {
            self.write_cursor
        }
    }

    /// Encode as a complete link frame.
    pub fn to_frame(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(frame_len::<N>());
        self.encode(&mut w);
        w.finish()
    }

    /// Decode a complete link frame, rejecting any size other than `frame_len::<N>()`.
    pub fn from_frame(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() != frame_len::<N>() {
            return Err(DecodeError::InvalidLength);
        }
        Self::decode_from_slice(bytes)
    }
}

impl<const N: usize> Encode for Packet<N> {
    fn encode(&self, w: &mut Writer) {
        w.write_bytes(self.text.as_raw());
        w.write_u8(self.ttl);
        w.write_u8(self.kind.to_wire());
        w.write_u8(self.flags());
        w.write_mac(&self.destination);
        w.write_mac(&self.source);
        w.write_u32_be(self.id);
        w.write_u8(self.wire_path_index());
        w.write_u8(self.path.len() as u8);
        for hop in self.path.raw_slots() {
            w.write_mac(hop);
        }
    }
}

impl<const N: usize> Decode for Packet<N> {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let text = Text::from_raw(r.read_array::<TEXT_CAPACITY>()?);
        let ttl = r.read_u8()?;
        let kind = PacketKind::from_wire(r.read_u8()?);

        let flags = r.read_u8()?;
        if flags & FLAGS_RESERVED != 0 {
            return Err(DecodeError::InvalidFlags);
        }
        let path_exists = flags & FLAG_PATH_EXISTS != 0;

        let destination = r.read_mac()?;
        let source = r.read_mac()?;
        let id = r.read_u32_be()?;

        let path_index = r.read_u8()?;
        let path_length = r.read_u8()?;
        if N == 0 || path_index as usize > N - 1 || path_length as usize > N - 1 {
            return Err(DecodeError::InvalidValue);
        }

        let mut hops = [MacAddr::ZERO; N];
        for hop in hops.iter_mut() {
            *hop = r.read_mac()?;
        }
        let path = Path::from_raw(hops, path_length);

        let (write_cursor, read_cursor) = if path_exists {
            (path_length, path_index)
        } else {
            (path_index, 0)
        };

        Ok(Packet {
            text,
            ttl,
            kind,
            broadcast_ack: flags & FLAG_BROADCAST_ACK != 0,
            data_ack: flags & FLAG_DATA_ACK != 0,
            destination,
            source,
            id,
            path,
            write_cursor,
            read_cursor,
            path_exists,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DEFAULT_TTL, MAX_PATH_HOPS};

    fn mac(n: u8) -> MacAddr {
        MacAddr([0x24, 0xDC, 0xC3, 0, 0, n])
    }

    fn sample() -> Packet {
        let mut p: Packet = Packet::data(mac(1), mac(2), 0xDEADBEEF, DEFAULT_TTL, Text::new("hello"));
        p.record_hop(mac(1)).unwrap();
        p
    }

    #[test]
    fn test_frame_len() {
        assert_eq!(frame_len::<MAX_PATH_HOPS>(), 139);
        assert_eq!(frame_len::<3>(), 103);
        assert_eq!(sample().to_frame().len(), 139);
    }

    #[test]
    fn test_field_layout() {
        let bytes = sample().to_frame();
        assert_eq!(&bytes[..5], b"hello");
        assert_eq!(bytes[5], 0);
        assert_eq!(bytes[64], DEFAULT_TTL);
        assert_eq!(bytes[65], 2); // DATA
        assert_eq!(bytes[66], 0); // no flags
        assert_eq!(&bytes[67..73], &mac(2).0);
        assert_eq!(&bytes[73..79], &mac(1).0);
        assert_eq!(&bytes[79..83], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(bytes[83], 1); // write cursor
        assert_eq!(bytes[84], 1); // path length
        assert_eq!(&bytes[85..91], &mac(1).0);
        assert!(bytes[91..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_roundtrip_discovery_packet() {
        let p = sample();
        let decoded = Packet::<MAX_PATH_HOPS>::from_frame(&p.to_frame()).unwrap();
        assert_eq!(decoded, p);
    }

    #[test]
    fn test_roundtrip_return_packet_keeps_read_cursor() {
        let mut ack: Packet = Packet::data(mac(3), mac(1), 7, DEFAULT_TTL, Text::new("Ack"));
        ack.data_ack = true;
        ack.path_exists = true;
        ack.path = Path::from_hops(&[mac(3), mac(2), mac(1)]).unwrap();
        ack.write_cursor = 3;
        ack.read_cursor = 1;

        let bytes = ack.to_frame();
        assert_eq!(bytes[66], FLAG_DATA_ACK | FLAG_PATH_EXISTS);
        assert_eq!(bytes[83], 1);

        let decoded = Packet::<MAX_PATH_HOPS>::from_frame(&bytes).unwrap();
        assert_eq!(decoded.read_cursor, 1);
        assert_eq!(decoded.current_hop(), Some(mac(2)));
        assert_eq!(decoded.next_return_hop(), Some(mac(1)));
    }

    #[test]
    fn test_unknown_kind_preserved() {
        let mut p = sample();
        p.kind = PacketKind::Other(9);
        let decoded = Packet::<MAX_PATH_HOPS>::from_frame(&p.to_frame()).unwrap();
        assert_eq!(decoded.kind, PacketKind::Other(9));
    }

    #[test]
    fn test_rejects_wrong_length() {
        let mut bytes = sample().to_frame();
        assert_eq!(
            Packet::<MAX_PATH_HOPS>::from_frame(&bytes[..138]),
            Err(DecodeError::InvalidLength)
        );
        bytes.push(0);
        assert_eq!(
            Packet::<MAX_PATH_HOPS>::from_frame(&bytes),
            Err(DecodeError::InvalidLength)
        );
        assert_eq!(
            Packet::<MAX_PATH_HOPS>::decode_from_slice(&bytes),
            Err(DecodeError::InvalidLength)
        );
    }

    #[test]
    fn test_rejects_reserved_flags() {
        let mut bytes = sample().to_frame();
        bytes[66] = 0x08;
        assert_eq!(
            Packet::<MAX_PATH_HOPS>::from_frame(&bytes),
            Err(DecodeError::InvalidFlags)
        );
    }

    #[test]
    fn test_rejects_out_of_range_cursor() {
        let mut bytes = sample().to_frame();
        bytes[83] = 9;
        assert_eq!(
            Packet::<MAX_PATH_HOPS>::from_frame(&bytes),
            Err(DecodeError::InvalidValue)
        );

        let mut bytes = sample().to_frame();
        bytes[84] = 9;
        assert_eq!(
            Packet::<MAX_PATH_HOPS>::from_frame(&bytes),
            Err(DecodeError::InvalidValue)
        );

        // 8 is the highest legal cursor value.
        let mut bytes = sample().to_frame();
        bytes[83] = 8;
        assert!(Packet::<MAX_PATH_HOPS>::from_frame(&bytes).is_ok());
    }

    #[test]
    fn test_decode_zeroes_slots_past_length() {
        let mut bytes = sample().to_frame();
        bytes[100] = 0xAA; // inside slot 2, past path_length == 1
        let decoded = Packet::<MAX_PATH_HOPS>::from_frame(&bytes).unwrap();
        assert_eq!(decoded.to_frame(), sample().to_frame());
    }

    #[test]
    fn test_text_terminator_forced() {
        let mut bytes = sample().to_frame();
        for b in bytes[..64].iter_mut() {
            *b = b'z';
        }
        let decoded = Packet::<MAX_PATH_HOPS>::from_frame(&bytes).unwrap();
        assert_eq!(decoded.text.len(), 63);
    }
}
