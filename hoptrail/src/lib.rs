#![forbid(unsafe_code)]
//! hoptrail - path-recording, source-routed acknowledgement protocol
//!
//! A small mesh protocol for peer-to-peer radios with a link-layer peer table
//! (ESP-NOW style). Data packets record every hop they take; the node that
//! terminates a packet reverses the recorded path and sends an acknowledgement
//! back along it, then hands a report of the packet to a collector.
//!
//! This crate is `no_std` but **requires the `alloc` crate**.
//!
//! # Key Properties
//!
//! - Fixed-size frames (139 bytes with the default 9-hop path)
//! - Duplicate suppression by packet id, bounded memory
//! - One outstanding send per node, retransmitted on acknowledgement timeout
//! - Every unicast link encrypted with a per-node local master key
//! - All failures degrade to "drop, log and count"
//!
//! # Example
//!
//! ```
//! use hoptrail::traits::test_impls::{MockClock, MockRandom, MockSink, MockTransport};
//! use hoptrail::{LinkKey, MacAddr, Node, SessionState};
//!
//! let key = LinkKey(*b"LMK@ESP32_123456");
//! let a_addr = MacAddr::new([0x24, 0xdc, 0xc3, 0x00, 0x00, 0x01]);
//! let b_addr = MacAddr::new([0x24, 0xdc, 0xc3, 0x00, 0x00, 0x02]);
//!
//! let mut a = Node::new(a_addr, key, MockTransport::new(), MockSink::new(), MockRandom::with_seed(1), MockClock::new());
//! let mut b = Node::new(b_addr, key, MockTransport::new(), MockSink::new(), MockRandom::with_seed(2), MockClock::new());
//!
//! // A sends to B and waits for the acknowledgement.
//! a.send_data(b_addr, "hello").unwrap();
//! assert_eq!(a.session_state(), SessionState::WaitingForAck);
//!
//! // Carry the frame over the "air" to B.
//! for (_, frame) in a.transport().take_sent() {
//!     b.inbox().on_link_receive(a_addr, &frame);
//! }
//! b.poll();
//! assert_eq!(b.sink().take_reports().len(), 1);
//!
//! // B's acknowledgement walks the reversed path back to A.
//! for (_, frame) in b.transport().take_sent() {
//!     a.inbox().on_link_receive(b_addr, &frame);
//! }
//! a.poll();
//! assert_eq!(a.session_state(), SessionState::ReadyToSend);
//! ```
//!
//! # Module Structure
//!
//! - [`types`] - Core types (MacAddr, Packet, Event, etc.)
//! - [`path`] - Bounded hop list with append and reverse
//! - [`wire`] - Fixed-layout frame encoding
//! - [`queue`] - Receive queue and local-delivery gate
//! - [`dedup`] - Duplicate suppression ledger
//! - [`session`] - Send session state machine
//! - [`peer`] - Secure link setup
//! - [`collector`] - Delivery report document
//! - [`node`] - Main Node struct and public API
//! - [`forwarding`] - Forwarding and acknowledgement engine
//! - [`traits`] - Transport, CollectorSink, Random, Clock traits
//! - [`time`] - Timestamp and Duration types
//! - [`config`] - Compile-time configuration

#![no_std]

extern crate alloc;

pub mod collector;
pub mod config;
pub mod dedup;
pub mod forwarding;
pub mod node;
pub mod path;
pub mod peer;
pub mod queue;
pub mod session;
pub mod time;
pub mod traits;
pub mod types;
pub mod wire;

// Re-export main types at crate root
pub use collector::DeliveryReport;
pub use config::{DefaultConfig, NodeConfig, SmallConfig};
pub use node::Node;
pub use path::{Path, PathFull};
pub use peer::{ensure_secure_link, LinkSetup};
pub use queue::{Admission, Inbox, RxEntry};
pub use session::SessionState;
pub use time::{Duration, Timestamp};
pub use traits::{Clock, CollectorSink, EventChannel, Random, Transport};
pub use types::{
    AddrParseError, Error, Event, LinkKey, MacAddr, NodeMetrics, Packet, PacketKind, PeerInfo,
    Text,
};
pub use wire::{frame_len, Decode, DecodeError, Encode};

// Re-export constants
pub use types::{
    BROADCAST_ADDR, DEFAULT_TTL, LINK_KEY_SIZE, MAC_SIZE, MAX_PATH_HOPS, MAX_RETRIES,
    TEXT_CAPACITY,
};
