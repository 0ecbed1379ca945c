//! Receive queue fed by the link-layer receive callback.
//!
//! The receive callback runs outside the main loop (an ISR, a radio task, a
//! socket reader). It calls [`Inbox::on_link_receive`], which decodes the frame,
//! applies the local-delivery gate and appends the packet under a critical
//! section. The main loop drains entries one at a time via
//! [`Node::poll`](crate::node::Node::poll).
//!
//! # Local-delivery gate
//!
//! A frame is queued only if:
//! - it is exactly one packet long and decodes cleanly,
//! - its TTL is non-zero,
//! - its destination is this node or the broadcast address, or it travels a
//!   known route (`path_exists`) whose hop at the read cursor is this node.
//!
//! Discovery packets addressed to someone else are dropped here; intermediate
//! nodes never forward them.

use alloc::collections::VecDeque;
use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use log::{debug, trace};

use crate::traits::ChannelMutex;
use crate::types::{MacAddr, Packet, MAX_PATH_HOPS};
use crate::wire::DecodeError;

/// A queued packet and the neighbor it arrived from.
#[derive(Clone, Debug)]
pub struct RxEntry<const N: usize = MAX_PATH_HOPS> {
    pub packet: Packet<N>,
    pub from: MacAddr,
}

/// Outcome of handing a frame to the inbox.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Queued,
    Malformed(DecodeError),
    Expired,
    NotForUs,
    QueueFull,
}

/// Receive-side drop counters, merged into [`NodeMetrics`](crate::types::NodeMetrics).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RxCounters {
    pub frames_received: u64,
    pub malformed: u64,
    pub not_for_us: u64,
    pub ttl_expired: u64,
    pub queue_full: u64,
}

struct InboxInner<const N: usize> {
    entries: VecDeque<RxEntry<N>>,
    counters: RxCounters,
}

/// Bounded FIFO of received packets, safe to fill from an interrupt context.
pub struct Inbox<const N: usize = MAX_PATH_HOPS> {
    address: MacAddr,
    capacity: usize,
    inner: Mutex<ChannelMutex, RefCell<InboxInner<N>>>,
}

impl<const N: usize> Inbox<N> {
    /// Create an inbox for the node at `address` holding at most `capacity` entries.
    pub fn new(address: MacAddr, capacity: usize) -> Self {
        Self {
            address,
            capacity,
            inner: Mutex::new(RefCell::new(InboxInner {
                entries: VecDeque::new(),
                counters: RxCounters::default(),
            })),
        }
    }

    /// Link-layer receive entry point.
    ///
    /// Decoding and gating happen before the lock is taken, so the critical
    /// section only covers the push.
    pub fn on_link_receive(&self, from: MacAddr, frame: &[u8]) -> Admission {
        let verdict = match Packet::<N>::from_frame(frame) {
            Err(e) => {
                debug!("rx from {}: malformed frame ({} bytes): {}", from, frame.len(), e);
                Err(Admission::Malformed(e))
            }
            Ok(p) if p.ttl == 0 => {
                debug!("rx from {}: id {:#010x} ttl expired", from, p.id);
                Err(Admission::Expired)
            }
            Ok(p) if !self.admits(&p) => {
                debug!(
                    "rx from {}: id {:#010x} for {} is not for us",
                    from, p.id, p.destination
                );
                Err(Admission::NotForUs)
            }
            Ok(p) => Ok(p),
        };

        self.inner.lock(|cell| {
            let mut inner = cell.borrow_mut();
            inner.counters.frames_received += 1;
            let packet = match verdict {
                Ok(p) => p,
                Err(drop) => {
                    match drop {
                        Admission::Malformed(_) => inner.counters.malformed += 1,
                        Admission::Expired => inner.counters.ttl_expired += 1,
                        _ => inner.counters.not_for_us += 1,
                    }
                    return drop;
                }
            };
            if inner.entries.len() >= self.capacity {
                inner.counters.queue_full += 1;
                debug!("rx from {}: queue full, dropping id {:#010x}", from, packet.id);
                return Admission::QueueFull;
            }
            trace!("rx from {}: queued id {:#010x}", from, packet.id);
            inner.entries.push_back(RxEntry { packet, from });
            Admission::Queued
        })
    }

    fn admits(&self, p: &Packet<N>) -> bool {
        p.destination == self.address
            || p.destination.is_broadcast()
            || (p.path_exists && p.current_hop() == Some(self.address))
    }

    /// Remove and return the oldest entry.
    ///
    /// Releases the backing storage once a burst has fully drained.
    pub fn try_pop(&self) -> Option<RxEntry<N>> {
        self.inner.lock(|cell| {
            let mut inner = cell.borrow_mut();
            let entry = inner.entries.pop_front();
            if entry.is_some() && inner.entries.is_empty() {
                inner.entries.shrink_to_fit();
            }
            entry
        })
    }

    /// Number of entries waiting to be processed.
    pub fn len(&self) -> usize {
        self.inner.lock(|cell| cell.borrow().entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counters(&self) -> RxCounters {
        self.inner.lock(|cell| cell.borrow().counters)
    }

    pub fn address(&self) -> MacAddr {
        self.address
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Path;
    use crate::types::{Text, BROADCAST_ADDR, DEFAULT_TTL};

    fn mac(n: u8) -> MacAddr {
        MacAddr([0x24, 0xDC, 0xC3, 0, 0, n])
    }

    fn data(dest: MacAddr, id: u32) -> Packet {
        let mut p: Packet = Packet::data(mac(1), dest, id, DEFAULT_TTL, Text::new("x"));
        p.record_hop(mac(1)).unwrap();
        p
    }

    #[test]
    fn test_accepts_own_and_broadcast() {
        let inbox: Inbox = Inbox::new(mac(2), 8);
        assert_eq!(inbox.on_link_receive(mac(1), &data(mac(2), 1).to_frame()), Admission::Queued);
        assert_eq!(
            inbox.on_link_receive(mac(1), &data(BROADCAST_ADDR, 2).to_frame()),
            Admission::Queued
        );
        assert_eq!(inbox.len(), 2);
    }

    #[test]
    fn test_fifo_order_and_sender() {
        let inbox: Inbox = Inbox::new(mac(2), 8);
        for id in 1..=3 {
            inbox.on_link_receive(mac(id as u8), &data(mac(2), id).to_frame());
        }
        let ids: alloc::vec::Vec<(u32, MacAddr)> =
            core::iter::from_fn(|| inbox.try_pop()).map(|e| (e.packet.id, e.from)).collect();
        assert_eq!(ids, alloc::vec![(1, mac(1)), (2, mac(2)), (3, mac(3))]);
        assert!(inbox.try_pop().is_none());
    }

    #[test]
    fn test_drops_packets_for_others() {
        let inbox: Inbox = Inbox::new(mac(2), 8);
        assert_eq!(
            inbox.on_link_receive(mac(1), &data(mac(3), 1).to_frame()),
            Admission::NotForUs
        );
        assert!(inbox.is_empty());
        assert_eq!(inbox.counters().not_for_us, 1);
    }

    #[test]
    fn test_accepts_route_through_us() {
        let inbox: Inbox = Inbox::new(mac(2), 8);
        let mut ack: Packet = Packet::data(mac(3), mac(1), 9, DEFAULT_TTL, Text::new("Ack"));
        ack.data_ack = true;
        ack.path_exists = true;
        ack.path = Path::from_hops(&[mac(3), mac(2), mac(1)]).unwrap();
        ack.read_cursor = 1;
        assert_eq!(inbox.on_link_receive(mac(3), &ack.to_frame()), Admission::Queued);

        // Same route, but the cursor points past us.
        ack.read_cursor = 2;
        assert_eq!(inbox.on_link_receive(mac(3), &ack.to_frame()), Admission::NotForUs);
    }

    #[test]
    fn test_rejects_wrong_size_and_expired() {
        let inbox: Inbox = Inbox::new(mac(2), 8);
        let frame = data(mac(2), 1).to_frame();
        assert_eq!(
            inbox.on_link_receive(mac(1), &frame[..100]),
            Admission::Malformed(DecodeError::InvalidLength)
        );

        let mut expired = data(mac(2), 2);
        expired.ttl = 0;
        assert_eq!(inbox.on_link_receive(mac(1), &expired.to_frame()), Admission::Expired);

        let c = inbox.counters();
        assert_eq!(c.frames_received, 2);
        assert_eq!(c.malformed, 1);
        assert_eq!(c.ttl_expired, 1);
        assert!(inbox.is_empty());
    }

    #[test]
    fn test_bounded() {
        let inbox: Inbox = Inbox::new(mac(2), 2);
        inbox.on_link_receive(mac(1), &data(mac(2), 1).to_frame());
        inbox.on_link_receive(mac(1), &data(mac(2), 2).to_frame());
        assert_eq!(
            inbox.on_link_receive(mac(1), &data(mac(2), 3).to_frame()),
            Admission::QueueFull
        );
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox.counters().queue_full, 1);

        inbox.try_pop();
        assert_eq!(inbox.on_link_receive(mac(1), &data(mac(2), 3).to_frame()), Admission::Queued);
    }
}
