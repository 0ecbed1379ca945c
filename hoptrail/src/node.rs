//! Node implementation: owns every protocol component and drives them.
//!
//! The node is polled, not spawned. The platform wires three inputs to it:
//! - the link receive callback calls `node.inbox().on_link_receive(from, frame)`
//! - the main loop calls [`Node::poll`] to process queued packets
//! - a periodic tick calls [`Node::handle_timer`] for acknowledgement timeouts
//!
//! # Usage
//!
//! ```ignore
//! let mut node = Node::new(addr, lmk, transport, sink, random, clock);
//!
//! // From the radio receive callback
//! node.inbox().on_link_receive(src, &frame);
//!
//! // Main loop
//! loop {
//!     node.poll();
//!     node.handle_timer(clock.now());
//!     while let Ok(event) = node.events().try_receive() {
//!         // ...
//!     }
//! }
//! ```

use core::marker::PhantomData;

use embassy_sync::channel::Channel;
use log::{debug, info, warn};

use crate::config::{DefaultConfig, NodeConfig};
use crate::dedup::SeenLedger;
use crate::peer::ensure_secure_link;
use crate::queue::Inbox;
use crate::session::{Session, SessionState, TimerAction};
use crate::time::{Duration, Timestamp};
use crate::traits::{Clock, CollectorSink, EventChannel, Random, Transport};
use crate::types::{Error, Event, LinkKey, MacAddr, NodeMetrics, Packet, Text, MAX_PATH_HOPS};

/// The main protocol node.
///
/// Generic over:
/// - `T`: link transport with peer table
/// - `S`: collector sink for terminal delivery reports
/// - `R`: random number generator (packet ids)
/// - `Clk`: clock
/// - `Cfg`: compile-time bounds and timing
/// - `N`: path capacity in hops
pub struct Node<T, S, R, Clk, Cfg = DefaultConfig, const N: usize = MAX_PATH_HOPS> {
    // Dependencies (injected)
    pub(crate) transport: T,
    pub(crate) sink: S,
    pub(crate) random: R,
    pub(crate) clock: Clk,

    pub(crate) events: EventChannel,

    // Identity
    pub(crate) address: MacAddr,
    pub(crate) link_key: LinkKey,

    // Protocol state
    pub(crate) inbox: Inbox<N>,
    pub(crate) ledger: SeenLedger,
    pub(crate) session: Session<N>,
    pub(crate) metrics: NodeMetrics,

    _config: PhantomData<Cfg>,
}

impl<T, S, R, Clk> Node<T, S, R, Clk, DefaultConfig, MAX_PATH_HOPS>
where
    T: Transport,
    S: CollectorSink,
    R: Random,
    Clk: Clock,
{
    /// Create a node with the default configuration and path capacity.
    pub fn new(
        address: MacAddr,
        link_key: LinkKey,
        transport: T,
        sink: S,
        random: R,
        clock: Clk,
    ) -> Self {
        Self::with_config(address, link_key, transport, sink, random, clock)
    }
}

impl<T, S, R, Clk, Cfg, const N: usize> Node<T, S, R, Clk, Cfg, N>
where
    T: Transport,
    S: CollectorSink,
    R: Random,
    Clk: Clock,
    Cfg: NodeConfig,
{
    /// Create a node with an explicit configuration and path capacity.
    pub fn with_config(
        address: MacAddr,
        link_key: LinkKey,
        transport: T,
        sink: S,
        random: R,
        clock: Clk,
    ) -> Self {
        Self {
            transport,
            sink,
            random,
            clock,
            events: Channel::new(),
            address,
            link_key,
            inbox: Inbox::new(address, Cfg::MAX_RX_QUEUE),
            ledger: SeenLedger::new(Cfg::MAX_SEEN_IDS),
            session: Session::new(),
            metrics: NodeMetrics::default(),
            _config: PhantomData,
        }
    }

    pub fn address(&self) -> MacAddr {
        self.address
    }

    /// Receive queue. The link receive callback feeds it.
    pub fn inbox(&self) -> &Inbox<N> {
        &self.inbox
    }

    /// Protocol event channel.
    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn clock(&self) -> &Clk {
        &self.clock
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Number of packets processed since start.
    pub fn session_counter(&self) -> u32 {
        self.session.counter()
    }

    /// Copy of the last originated packet, while retained.
    pub fn retained(&self) -> Option<&Packet<N>> {
        self.session.retained()
    }

    /// Whether `id` is currently held by the deduplication ledger.
    pub fn has_seen(&self, id: u32) -> bool {
        self.ledger.is_seen(id)
    }

    /// Counters from the receive gate and the engine combined.
    pub fn metrics(&self) -> NodeMetrics {
        let rx = self.inbox.counters();
        NodeMetrics {
            frames_received: rx.frames_received,
            malformed: rx.malformed,
            not_for_us: rx.not_for_us,
            queue_full: rx.queue_full,
            ttl_expired: self.metrics.ttl_expired + rx.ttl_expired,
            ..self.metrics
        }
    }

    /// Process the packets queued when the call starts, oldest first.
    ///
    /// Packets arriving during the drain wait for the next call. Returns the
    /// number of entries processed.
    pub fn poll(&mut self) -> usize {
        let pending = self.inbox.len();
        let mut processed = 0;
        for _ in 0..pending {
            match self.inbox.try_pop() {
                Some(entry) => {
                    self.process(entry);
                    processed += 1;
                }
                None => break,
            }
        }
        processed
    }

    /// Originate a unicast DATA packet to `destination`.
    ///
    /// Returns the packet id. Fails with [`Error::SessionBusy`] while a previous
    /// send still awaits its acknowledgement.
    pub fn send_data(&mut self, destination: MacAddr, text: &str) -> Result<u32, Error<T::Error>> {
        self.originate(destination, text)
    }

    /// Originate a DATA packet to every neighbor.
    pub fn send_broadcast(&mut self, text: &str) -> Result<u32, Error<T::Error>> {
        self.originate(crate::types::BROADCAST_ADDR, text)
    }

    fn originate(&mut self, destination: MacAddr, text: &str) -> Result<u32, Error<T::Error>> {
        if !self.session.is_ready() {
            return Err(Error::SessionBusy);
        }

        let id = self.random.gen_u32();
        let mut packet: Packet<N> =
            Packet::data(self.address, destination, id, Cfg::DEFAULT_TTL, Text::new(text));
        packet.record_hop(self.address)?;

        ensure_secure_link(&self.transport, &destination, &self.link_key)
            .map_err(Error::Transport)?;
        if let Err(e) = self.transport.send(&destination, &packet.to_frame()) {
            self.metrics.send_failures += 1;
            warn!("send {:#010x} to {} failed: {:?}", id, destination, e);
            return Err(Error::Transport(e));
        }
        self.metrics.data_sent += 1;

        info!("sent {:#010x} to {}, waiting for ack", id, destination);
        self.session.begin(packet, destination, self.clock.now());
        Ok(id)
    }

    /// Acknowledgement timeout handling.
    ///
    /// Retransmits the retained packet under a fresh id once `ACK_TIMEOUT_MS` has
    /// passed without a data acknowledgement, up to `MAX_RETRIES` times, then
    /// abandons the session and emits [`Event::SessionFailed`].
    pub fn handle_timer(&mut self, now: Timestamp) {
        let timeout = Duration::from_millis(Cfg::ACK_TIMEOUT_MS);
        let random = &mut self.random;
        let action = self
            .session
            .on_timer(now, timeout, Cfg::MAX_RETRIES, || random.gen_u32());

        match action {
            TimerAction::Idle => {}
            TimerAction::Wait => {
                debug!("ack timeout with nothing retained, attempt {}", self.session.attempts());
            }
            TimerAction::Retransmit { packet, next_hop } => {
                self.metrics.retransmissions += 1;
                info!(
                    "ack timeout, retransmitting as {:#010x} (attempt {}/{})",
                    packet.id,
                    self.session.attempts(),
                    Cfg::MAX_RETRIES
                );
                match self.transport.send(&next_hop, &packet.to_frame()) {
                    Ok(()) => self.metrics.data_sent += 1,
                    Err(e) => {
                        self.metrics.send_failures += 1;
                        warn!("retransmit to {} failed: {:?}", next_hop, e);
                    }
                }
            }
            TimerAction::GiveUp { id, attempts } => {
                warn!("no ack for {:#010x} after {} retries, giving up", id, attempts);
                self.emit(Event::SessionFailed { id, attempts });
            }
        }
    }

    pub(crate) fn emit(&self, event: Event) {
        if self.events.try_send(event).is_err() {
            debug!("event channel full, dropping event");
        }
    }
}
