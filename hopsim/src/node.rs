//! SimNode wrapper for simulated hoptrail nodes.

use std::cell::{Cell, RefCell};

use hashbrown::HashMap;
use hoptrail::config::DefaultConfig;
use hoptrail::traits::{Clock, CollectorSink, Random, Transport};
use hoptrail::{
    Admission, DeliveryReport, Duration, Error, Event as NodeEvent, LinkKey, MacAddr, Node,
    NodeMetrics, PeerInfo, SessionState, Timestamp,
};

/// Link key shared by every simulated node.
pub const SIM_LINK_KEY: LinkKey = LinkKey(*b"LMK@SIMULATION01");

/// Deterministic address of the `index`-th simulated node.
///
/// Locally administered unicast prefix, index in the low two octets.
pub fn sim_address(index: usize) -> MacAddr {
    MacAddr::new([0x02, 0x00, 0x5E, 0x00, (index >> 8) as u8, index as u8])
}

/// Errors produced by [`SimTransport`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimLinkError {
    /// Unicast to an address missing from the peer table.
    UnknownPeer,
    /// Removing a peer that is not in the table.
    NoSuchPeer,
}

/// Simulated radio with a peer table.
///
/// Frames are only queued here; the simulator takes them and routes them
/// through the topology.
#[derive(Default)]
pub struct SimTransport {
    outgoing: RefCell<Vec<(MacAddr, Vec<u8>)>>,
    peers: RefCell<HashMap<MacAddr, PeerInfo>>,
}

impl SimTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take all queued frames with their link destination, in send order.
    pub fn take_sent(&self) -> Vec<(MacAddr, Vec<u8>)> {
        std::mem::take(&mut *self.outgoing.borrow_mut())
    }

    pub fn peer_count(&self) -> usize {
        self.peers.borrow().len()
    }
}

impl Transport for SimTransport {
    type Error = SimLinkError;

    fn send(&self, to: &MacAddr, frame: &[u8]) -> Result<(), Self::Error> {
        if !to.is_broadcast() && !self.peers.borrow().contains_key(to) {
            return Err(SimLinkError::UnknownPeer);
        }
        self.outgoing.borrow_mut().push((*to, frame.to_vec()));
        Ok(())
    }

    fn peer(&self, addr: &MacAddr) -> Option<PeerInfo> {
        self.peers.borrow().get(addr).copied()
    }

    fn add_peer(&self, info: &PeerInfo) -> Result<(), Self::Error> {
        self.peers.borrow_mut().insert(info.addr, *info);
        Ok(())
    }

    fn remove_peer(&self, addr: &MacAddr) -> Result<(), Self::Error> {
        self.peers
            .borrow_mut()
            .remove(addr)
            .map(|_| ())
            .ok_or(SimLinkError::NoSuchPeer)
    }
}

/// In-memory collector keeping every report and its JSON document.
#[derive(Default)]
pub struct SimSink {
    reports: RefCell<Vec<DeliveryReport>>,
    documents: RefCell<Vec<String>>,
}

impl SimSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_reports(&self) -> Vec<DeliveryReport> {
        std::mem::take(&mut *self.reports.borrow_mut())
    }

    /// JSON documents as they would have been uploaded.
    pub fn documents(&self) -> Vec<String> {
        self.documents.borrow().clone()
    }
}

impl CollectorSink for SimSink {
    type Error = serde_json::Error;

    fn deliver(&self, report: &DeliveryReport) -> Result<(), Self::Error> {
        let json = report.to_json()?;
        self.documents.borrow_mut().push(json);
        self.reports.borrow_mut().push(report.clone());
        Ok(())
    }
}

/// Clock controlled by the simulator.
#[derive(Default)]
pub struct SimClock {
    current: Cell<Timestamp>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(time: Timestamp) -> Self {
        Self {
            current: Cell::new(time),
        }
    }

    pub fn set(&self, time: Timestamp) {
        self.current.set(time);
    }

    pub fn advance(&self, duration: Duration) {
        self.current.set(self.current.get() + duration);
    }
}

impl Clock for SimClock {
    fn now(&self) -> Timestamp {
        self.current.get()
    }
}

/// Deterministic LCG, not suitable outside simulation.
pub struct SimRandom {
    state: u64,
}

impl SimRandom {
    pub fn new() -> Self {
        Self { state: 12345 }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self { state: seed }
    }
}

impl Default for SimRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl Random for SimRandom {
    fn gen_range(&mut self, min: u64, max: u64) -> u64 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let range = max - min;
        if range == 0 {
            return min;
        }
        min + ((self.state >> 16) % range)
    }
}

/// Type alias for simulated nodes.
pub type SimNodeInner = Node<SimTransport, SimSink, SimRandom, SimClock, DefaultConfig>;

/// Wrapper around a hoptrail Node for simulation.
///
/// Every entry point sets the node's clock to the simulation time first.
pub struct SimNode {
    inner: SimNodeInner,
    pub created_at: Timestamp,
}

impl SimNode {
    /// Create the `index`-th node; `seed` drives its packet ids.
    pub fn new(index: usize, seed: u64, created_at: Timestamp) -> Self {
        let inner = Node::new(
            sim_address(index),
            SIM_LINK_KEY,
            SimTransport::new(),
            SimSink::new(),
            SimRandom::with_seed(seed),
            SimClock::at(created_at),
        );
        Self { inner, created_at }
    }

    pub fn address(&self) -> MacAddr {
        self.inner.address()
    }

    pub fn inner(&self) -> &SimNodeInner {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut SimNodeInner {
        &mut self.inner
    }

    pub fn session_state(&self) -> SessionState {
        self.inner.session_state()
    }

    pub fn metrics(&self) -> NodeMetrics {
        self.inner.metrics()
    }

    fn set_time(&self, now: Timestamp) {
        self.inner.clock().set(now);
    }

    /// Radio receive callback followed by one main-loop pass.
    pub fn handle_frame(&mut self, from: MacAddr, frame: &[u8], now: Timestamp) -> Admission {
        self.set_time(now);
        let admission = self.inner.inbox().on_link_receive(from, frame);
        self.inner.poll();
        admission
    }

    /// Periodic tick: drain the queue, then check the ack timeout.
    pub fn handle_timer(&mut self, now: Timestamp) {
        self.set_time(now);
        self.inner.poll();
        self.inner.handle_timer(now);
    }

    /// Originate a packet; a broadcast `to` goes to every neighbor.
    pub fn app_send(
        &mut self,
        to: MacAddr,
        text: &str,
        now: Timestamp,
    ) -> Result<u32, Error<SimLinkError>> {
        self.set_time(now);
        if to.is_broadcast() {
            self.inner.send_broadcast(text)
        } else {
            self.inner.send_data(to, text)
        }
    }

    /// Take all frames the node handed to its radio.
    pub fn take_outgoing(&self) -> Vec<(MacAddr, Vec<u8>)> {
        self.inner.transport().take_sent()
    }

    pub fn take_reports(&self) -> Vec<DeliveryReport> {
        self.inner.sink().take_reports()
    }

    /// Drain the node's protocol event channel.
    pub fn take_events(&self) -> Vec<NodeEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.inner.events().try_receive() {
            events.push(event);
        }
        events
    }
}
