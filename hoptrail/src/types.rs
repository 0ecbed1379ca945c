//! Core types and constants for the hoptrail protocol.

use core::fmt;
use core::str::FromStr;

use crate::path::Path;

// Addressing
pub const MAC_SIZE: usize = 6;

// Capacity bounds
pub const MAX_PATH_HOPS: usize = 9; // Path slots carried in every frame
pub const TEXT_CAPACITY: usize = 64; // 63 data bytes + NUL
pub const LINK_KEY_SIZE: usize = 16;

// Protocol constants
pub const DEFAULT_TTL: u8 = 10;
pub const MAX_RETRIES: u8 = 3;

// Packet kinds on the wire
pub const KIND_BROADCAST: u8 = 1;
pub const KIND_DATA: u8 = 2;

/// 6-byte link-layer address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MacAddr(pub [u8; MAC_SIZE]);

/// Reserved all-ones broadcast address.
pub const BROADCAST_ADDR: MacAddr = MacAddr([0xFF; MAC_SIZE]);

impl MacAddr {
    /// The all-zero address, used for unused path slots.
    pub const ZERO: MacAddr = MacAddr([0u8; MAC_SIZE]);

    pub const fn new(bytes: [u8; MAC_SIZE]) -> Self {
        MacAddr(bytes)
    }

    pub const fn octets(&self) -> [u8; MAC_SIZE] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == BROADCAST_ADDR
    }
}

impl From<[u8; MAC_SIZE]> for MacAddr {
    fn from(bytes: [u8; MAC_SIZE]) -> Self {
        MacAddr(bytes)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Error returned when parsing a `MacAddr` from text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddrParseError;

impl fmt::Display for AddrParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid link address (expected AA:BB:CC:DD:EE:FF)")
    }
}

impl FromStr for MacAddr {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; MAC_SIZE];
        let mut parts = s.split([':', '-']);
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or(AddrParseError)?;
            if part.len() != 2 {
                return Err(AddrParseError);
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| AddrParseError)?;
        }
        if parts.next().is_some() {
            return Err(AddrParseError);
        }
        Ok(MacAddr(bytes))
    }
}

/// Message kind carried in every packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketKind {
    Broadcast,
    Data,
    /// Any other wire value. Kept so the engine can log and discard it.
    Other(u8),
}

impl PacketKind {
    pub const fn from_wire(v: u8) -> Self {
        match v {
            KIND_BROADCAST => PacketKind::Broadcast,
            KIND_DATA => PacketKind::Data,
            other => PacketKind::Other(other),
        }
    }

    pub const fn to_wire(self) -> u8 {
        match self {
            PacketKind::Broadcast => KIND_BROADCAST,
            PacketKind::Data => KIND_DATA,
            PacketKind::Other(v) => v,
        }
    }
}

/// Bounded text payload: up to 63 bytes, always NUL terminated on the wire.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Text {
    buf: [u8; TEXT_CAPACITY],
}

impl Default for Text {
    fn default() -> Self {
        Self {
            buf: [0u8; TEXT_CAPACITY],
        }
    }
}

impl Text {
    /// Build from a string, truncating on a character boundary to fit 63 bytes.
    pub fn new(s: &str) -> Self {
        let mut end = s.len().min(TEXT_CAPACITY - 1);
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        let mut buf = [0u8; TEXT_CAPACITY];
        buf[..end].copy_from_slice(&s.as_bytes()[..end]);
        Self { buf }
    }

    /// Build from a raw wire buffer. The last byte is forced to NUL.
    pub fn from_raw(mut buf: [u8; TEXT_CAPACITY]) -> Self {
        buf[TEXT_CAPACITY - 1] = 0;
        Self { buf }
    }

    /// Raw buffer as it appears on the wire.
    pub fn as_raw(&self) -> &[u8; TEXT_CAPACITY] {
        &self.buf
    }

    /// Bytes up to the first NUL.
    pub fn as_bytes(&self) -> &[u8] {
        let end = self.buf.iter().position(|&b| b == 0).unwrap_or(TEXT_CAPACITY);
        &self.buf[..end]
    }

    /// Longest valid UTF-8 prefix of the payload.
    pub fn as_str(&self) -> &str {
        let bytes = self.as_bytes();
        match core::str::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf[0] == 0
    }
}

impl fmt::Debug for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl From<&str> for Text {
    fn from(s: &str) -> Self {
        Text::new(s)
    }
}

/// The message exchanged between neighbors.
///
/// `write_cursor` is the next free path slot on the discovery leg;
/// `read_cursor` is the path index of the hop currently holding the packet on
/// the return leg. Only one of them is meaningful for a given packet, chosen by
/// `path_exists`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet<const N: usize = MAX_PATH_HOPS> {
    pub text: Text,
    pub ttl: u8,
    pub kind: PacketKind,
    pub broadcast_ack: bool,
    pub data_ack: bool,
    pub destination: MacAddr,
    pub source: MacAddr,
    pub id: u32,
    pub path: Path<N>,
    pub write_cursor: u8,
    pub read_cursor: u8,
    pub path_exists: bool,
}

impl<const N: usize> Default for Packet<N> {
    fn default() -> Self {
        Self {
            text: Text::default(),
            ttl: DEFAULT_TTL,
            kind: PacketKind::Data,
            broadcast_ack: false,
            data_ack: false,
            destination: MacAddr::ZERO,
            source: MacAddr::ZERO,
            id: 0,
            path: Path::new(),
            write_cursor: 0,
            read_cursor: 0,
            path_exists: false,
        }
    }
}

impl<const N: usize> Packet<N> {
    /// A plain DATA packet on the discovery leg with an empty path.
    pub fn data(source: MacAddr, destination: MacAddr, id: u32, ttl: u8, text: Text) -> Self {
        Self {
            text,
            ttl,
            kind: PacketKind::Data,
            destination,
            source,
            id,
            ..Self::default()
        }
    }

    /// True if neither acknowledgement flag is set.
    pub fn is_plain_data(&self) -> bool {
        !self.broadcast_ack && !self.data_ack
    }

    /// Record `addr` at the write cursor and advance it.
    ///
    /// On failure nothing is mutated.
    pub fn record_hop(&mut self, addr: MacAddr) -> Result<(), crate::path::PathFull> {
        self.path.write(self.write_cursor as usize, addr)?;
        self.write_cursor += 1;
        Ok(())
    }

    /// Hop the packet should be sent to next on the return leg.
    pub fn next_return_hop(&self) -> Option<MacAddr> {
        self.path.get(self.read_cursor as usize + 1)
    }

    /// Hop at the read cursor.
    pub fn current_hop(&self) -> Option<MacAddr> {
        self.path.get(self.read_cursor as usize)
    }
}

/// 16-byte link key material (local master key for per-peer encryption).
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkKey(pub [u8; LINK_KEY_SIZE]);

impl LinkKey {
    /// Build from ASCII/UTF-8 key text. Returns `None` unless exactly 16 bytes.
    pub fn from_text(s: &str) -> Option<Self> {
        let bytes: [u8; LINK_KEY_SIZE] = s.as_bytes().try_into().ok()?;
        Some(LinkKey(bytes))
    }
}

impl fmt::Debug for LinkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LinkKey([{:02x}{:02x}...])", self.0[0], self.0[1])
    }
}

/// Entry in the link layer's peer table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerInfo {
    pub addr: MacAddr,
    pub channel: u8,
    pub encrypt: bool,
    pub lmk: Option<LinkKey>,
}

impl PeerInfo {
    pub fn plain(addr: MacAddr) -> Self {
        Self {
            addr,
            channel: 0,
            encrypt: false,
            lmk: None,
        }
    }

    pub fn encrypted(addr: MacAddr, lmk: LinkKey) -> Self {
        Self {
            addr,
            channel: 0,
            encrypt: true,
            lmk: Some(lmk),
        }
    }
}

/// Events emitted by the node for application handling.
#[derive(Clone, Debug)]
pub enum Event {
    /// A plain data packet terminated here and was acknowledged.
    DataDelivered { source: MacAddr, id: u32, text: Text },
    /// Our outstanding send was acknowledged.
    SessionComplete { session: u32, from: MacAddr },
    /// A broadcast we sent was acknowledged.
    BroadcastAcknowledged { from: MacAddr },
    /// Retries exhausted without a data acknowledgement.
    SessionFailed { id: u32, attempts: u8 },
}

/// Error type for node operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error<T> {
    /// Link transport error.
    Transport(T),
    /// A send is already awaiting acknowledgement.
    SessionBusy,
    /// The path has no free slot.
    PathFull,
    /// No next hop in the embedded route.
    NoRoute,
}

impl<T: fmt::Debug> fmt::Display for Error<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport(e) => write!(f, "transport error: {:?}", e),
            Error::SessionBusy => write!(f, "session already waiting for acknowledgement"),
            Error::PathFull => write!(f, "path capacity exceeded"),
            Error::NoRoute => write!(f, "no next hop in route"),
        }
    }
}

impl<T> From<crate::path::PathFull> for Error<T> {
    fn from(_: crate::path::PathFull) -> Self {
        Error::PathFull
    }
}

/// Counters for monitoring a node.
///
/// Every failure class of the protocol ends in "drop and log"; these counters are
/// the only trace left behind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeMetrics {
    /// Frames handed to us by the link layer.
    pub frames_received: u64,
    /// Frames that failed to decode (wrong length, bad fields).
    pub malformed: u64,
    /// Frames not addressed to us and not on a route through us.
    pub not_for_us: u64,
    /// Frames dropped because the TTL was exhausted.
    pub ttl_expired: u64,
    /// Frames dropped because the receive queue was full.
    pub queue_full: u64,
    /// Entries dropped by the deduplication ledger.
    pub duplicates: u64,
    /// Entries with an unknown kind.
    pub unknown_kind: u64,
    /// Packets that could not be routed further: full path or exhausted route.
    pub unroutable: u64,
    /// Acknowledgements originated here.
    pub acks_sent: u64,
    /// Source-routed packets relayed one hop further.
    pub relayed: u64,
    /// Link send errors.
    pub send_failures: u64,
    /// Collector deliveries that failed.
    pub sink_failures: u64,
    /// Data packets originated here, retransmissions included.
    pub data_sent: u64,
    /// Retransmissions of the retained packet.
    pub retransmissions: u64,
}
