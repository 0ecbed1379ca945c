//! Collaborator traits: link transport, collector sink, time, and randomness.
//!
//! These traits allow the engine to be used with different:
//! - Link layers (ESP-NOW style radios, UDP emulation, simulation)
//! - Collector sinks (HTTP upload, in-memory capture)
//! - Time sources and random number generators

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::collector::DeliveryReport;
use crate::time::Timestamp;
use crate::types::{Event, MacAddr, PeerInfo};

/// Queue size for the event channel.
pub(crate) const EVENT_QUEUE_SIZE: usize = 16;

/// Mutex type shared by the receive queue and channels.
pub(crate) type ChannelMutex = CriticalSectionRawMutex;

/// Application event channel.
pub type EventChannel = Channel<ChannelMutex, Event, EVENT_QUEUE_SIZE>;

/// Link-layer transport with a peer table.
///
/// `send` is fire-and-forget: an `Ok` means the frame was handed to the radio,
/// not that it arrived. Unicast sends are expected to fail for addresses that
/// are not in the peer table; the engine always calls
/// [`ensure_secure_link`](crate::peer::ensure_secure_link) first.
///
/// The receive side is not part of this trait. The platform's receive callback
/// hands frames to [`Inbox::on_link_receive`](crate::queue::Inbox::on_link_receive).
///
/// # Example
///
/// ```
/// use hoptrail::traits::test_impls::MockTransport;
/// use hoptrail::traits::Transport;
/// use hoptrail::{MacAddr, PeerInfo};
///
/// let transport = MockTransport::new();
/// let peer = MacAddr::new([0x24, 0xdc, 0xc3, 0xc6, 0xae, 0xcc]);
///
/// // Unknown unicast peers are refused, like a real radio.
/// assert!(transport.send(&peer, &[0u8; 4]).is_err());
///
/// transport.add_peer(&PeerInfo::plain(peer)).unwrap();
/// assert!(transport.send(&peer, &[0u8; 4]).is_ok());
/// assert_eq!(transport.take_sent().len(), 1);
/// ```
pub trait Transport {
    type Error: core::fmt::Debug;

    /// Transmit one frame to a neighbor or to the broadcast address.
    fn send(&self, to: &MacAddr, frame: &[u8]) -> Result<(), Self::Error>;

    /// Look up a peer table entry.
    fn peer(&self, addr: &MacAddr) -> Option<PeerInfo>;

    /// Add a peer table entry.
    fn add_peer(&self, info: &PeerInfo) -> Result<(), Self::Error>;

    /// Remove a peer table entry.
    fn remove_peer(&self, addr: &MacAddr) -> Result<(), Self::Error>;
}

/// Destination for terminal delivery reports.
///
/// Implementations must not block the engine: the gateway queues reports and
/// uploads them on a separate task.
pub trait CollectorSink {
    type Error: core::fmt::Debug;

    fn deliver(&self, report: &DeliveryReport) -> Result<(), Self::Error>;
}

/// Time source for real or simulated time.
pub trait Clock {
    /// Get the current timestamp.
    fn now(&self) -> Timestamp;
}

/// Random number generator trait.
///
/// Used for packet ids.
pub trait Random {
    /// Generate a random u64 in the range [min, max).
    fn gen_range(&mut self, min: u64, max: u64) -> u64;

    /// Generate a random u32.
    fn gen_u32(&mut self) -> u32 {
        self.gen_range(0, u32::MAX as u64 + 1) as u32
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_impls {
    //! Mock implementations of traits for unit testing and doc tests.
    //!
    //! Available when running tests or with the `test-support` feature enabled.

    use alloc::vec::Vec;
    use core::cell::{Cell, RefCell};

    use super::*;
    use crate::types::Packet;
    use crate::wire::DecodeError;

    /// Errors produced by [`MockTransport`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum MockLinkError {
        /// Unicast send to an address missing from the peer table.
        UnknownPeer,
        /// Failure injected with [`MockTransport::set_fail_sends`].
        SendFailed,
    }

    /// Mock transport recording every frame sent.
    #[derive(Default)]
    pub struct MockTransport {
        sent: RefCell<Vec<(MacAddr, Vec<u8>)>>,
        peers: RefCell<Vec<PeerInfo>>,
        fail_sends: Cell<bool>,
        peer_ops: Cell<usize>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Transport with the given addresses already in the peer table, unencrypted.
        pub fn with_peers(addrs: &[MacAddr]) -> Self {
            let t = Self::new();
            for addr in addrs {
                t.peers.borrow_mut().push(PeerInfo::plain(*addr));
            }
            t
        }

        /// Make every subsequent send fail.
        pub fn set_fail_sends(&self, fail: bool) {
            self.fail_sends.set(fail);
        }

        /// Take all frames sent so far, in order.
        pub fn take_sent(&self) -> Vec<(MacAddr, Vec<u8>)> {
            core::mem::take(&mut *self.sent.borrow_mut())
        }

        /// Take all frames sent so far and decode them.
        pub fn take_packets<const N: usize>(
            &self,
        ) -> Vec<(MacAddr, Result<Packet<N>, DecodeError>)> {
            self.take_sent()
                .into_iter()
                .map(|(to, frame)| (to, Packet::<N>::from_frame(&frame)))
                .collect()
        }

        /// Snapshot of the peer table.
        pub fn peers(&self) -> Vec<PeerInfo> {
            self.peers.borrow().clone()
        }

        /// Number of add/remove calls made against the peer table.
        pub fn peer_ops(&self) -> usize {
            self.peer_ops.get()
        }
    }

    impl Transport for MockTransport {
        type Error = MockLinkError;

        fn send(&self, to: &MacAddr, frame: &[u8]) -> Result<(), Self::Error> {
            if self.fail_sends.get() {
                return Err(MockLinkError::SendFailed);
            }
            if !to.is_broadcast() && self.peer(to).is_none() {
                return Err(MockLinkError::UnknownPeer);
            }
            self.sent.borrow_mut().push((*to, frame.to_vec()));
            Ok(())
        }

        fn peer(&self, addr: &MacAddr) -> Option<PeerInfo> {
            self.peers.borrow().iter().find(|p| p.addr == *addr).copied()
        }

        fn add_peer(&self, info: &PeerInfo) -> Result<(), Self::Error> {
            self.peer_ops.set(self.peer_ops.get() + 1);
            let mut peers = self.peers.borrow_mut();
            peers.retain(|p| p.addr != info.addr);
            peers.push(*info);
            Ok(())
        }

        fn remove_peer(&self, addr: &MacAddr) -> Result<(), Self::Error> {
            self.peer_ops.set(self.peer_ops.get() + 1);
            let mut peers = self.peers.borrow_mut();
            let before = peers.len();
            peers.retain(|p| p.addr != *addr);
            if peers.len() == before {
                return Err(MockLinkError::UnknownPeer);
            }
            Ok(())
        }
    }

    /// Mock collector capturing every report.
    #[derive(Default)]
    pub struct MockSink {
        reports: RefCell<Vec<DeliveryReport>>,
        fail: Cell<bool>,
    }

    impl MockSink {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every subsequent delivery fail.
        pub fn set_fail(&self, fail: bool) {
            self.fail.set(fail);
        }

        pub fn take_reports(&self) -> Vec<DeliveryReport> {
            core::mem::take(&mut *self.reports.borrow_mut())
        }
    }

    impl CollectorSink for MockSink {
        type Error = ();

        fn deliver(&self, report: &DeliveryReport) -> Result<(), Self::Error> {
            if self.fail.get() {
                return Err(());
            }
            self.reports.borrow_mut().push(report.clone());
            Ok(())
        }
    }

    /// Mock clock for testing (time advances manually).
    #[derive(Default)]
    pub struct MockClock {
        current: Cell<Timestamp>,
    }

    impl MockClock {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set(&self, time: Timestamp) {
            self.current.set(time);
        }

        pub fn advance(&self, duration: crate::time::Duration) {
            self.current.set(self.current.get() + duration);
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> Timestamp {
            self.current.get()
        }
    }

    /// Mock random for testing (deterministic LCG).
    pub struct MockRandom {
        pub state: u64,
    }

    impl Default for MockRandom {
        fn default() -> Self {
            Self { state: 12345 }
        }
    }

    impl MockRandom {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_seed(seed: u64) -> Self {
            Self { state: seed }
        }
    }

    impl Random for MockRandom {
        fn gen_range(&mut self, min: u64, max: u64) -> u64 {
            self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let range = max - min;
            if range == 0 {
                return min;
            }
            min + ((self.state >> 16) % range)
        }
    }
}
