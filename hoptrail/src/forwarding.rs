//! Forwarding and acknowledgement engine.
//!
//! Each dequeued packet goes through, in order:
//! 1. dedup check (duplicates stop here)
//! 2. mark seen
//! 3. kind check (only DATA is handled)
//! 4. relay, if it travels a known route toward someone else
//! 5. otherwise classify by ack flags, broadcast ack first:
//!    - broadcast ack: drop the retained copy
//!    - data ack: complete the session if it comes from the send's destination
//!    - plain data: append self, reverse the path, send a data ack back along
//!      it, report to the collector
//! 6. bump the session counter

use alloc::format;

use log::{debug, info, trace, warn};

use crate::collector::DeliveryReport;
use crate::config::NodeConfig;
use crate::node::Node;
use crate::path::Path;
use crate::peer::ensure_secure_link;
use crate::queue::RxEntry;
use crate::traits::{Clock, CollectorSink, Random, Transport};
use crate::types::{Error, Event, MacAddr, Packet, PacketKind, Text};

impl<T, S, R, Clk, Cfg, const N: usize> Node<T, S, R, Clk, Cfg, N>
where
    T: Transport,
    S: CollectorSink,
    R: Random,
    Clk: Clock,
    Cfg: NodeConfig,
{
    /// Run one queue entry through the engine.
    pub(crate) fn process(&mut self, entry: RxEntry<N>) {
        let RxEntry { packet, from } = entry;

        if self.ledger.is_seen(packet.id) {
            self.metrics.duplicates += 1;
            debug!("duplicate {:#010x} from {}, dropped", packet.id, from);
            return;
        }
        self.ledger.mark_seen(packet.id);

        match packet.kind {
            PacketKind::Data => self.handle_data(packet, from),
            kind => {
                self.metrics.unknown_kind += 1;
                warn!("unknown packet kind {:?} ({:#010x}) from {}", kind, packet.id, from);
            }
        }

        self.session.bump_counter();
    }

    fn handle_data(&mut self, packet: Packet<N>, from: MacAddr) {
        let terminal = packet.destination == self.address || packet.destination.is_broadcast();

        if packet.path_exists && !terminal {
            self.relay(packet);
        } else if packet.broadcast_ack {
            self.session.clear_retained();
            info!("broadcast ack from {}", packet.source);
            self.emit(Event::BroadcastAcknowledged {
                from: packet.source,
            });
        } else if packet.data_ack {
            if self.session.acknowledge(&packet.source) {
                info!("data ack from {}, ready to send", packet.source);
                self.emit(Event::SessionComplete {
                    session: self.session.counter(),
                    from: packet.source,
                });
            } else if self.session.is_ready() {
                debug!("data ack from {} with no send outstanding", packet.source);
            } else {
                debug!(
                    "data ack from {} does not answer the send to {}, ignored",
                    packet.source,
                    self.session.destination()
                );
            }
        } else {
            trace!("data {:#010x} from {} terminates here", packet.id, from);
            self.acknowledge_and_report(packet);
        }
    }

    /// Pass a source-routed packet one hop further along its embedded route.
    fn relay(&mut self, mut packet: Packet<N>) {
        if packet.ttl <= 1 {
            self.metrics.ttl_expired += 1;
            debug!("relay {:#010x}: ttl exhausted", packet.id);
            return;
        }
        let Some(next) = packet.next_return_hop() else {
            self.metrics.unroutable += 1;
            warn!(
                "relay {:#010x}: route {} ends here",
                packet.id,
                packet.path.render(packet.read_cursor as usize)
            );
            return;
        };

        packet.ttl -= 1;
        packet.read_cursor += 1;

        if let Err(e) = self.send_on_link(&next, &packet) {
            self.metrics.send_failures += 1;
            warn!("relay {:#010x} to {} failed: {:?}", packet.id, next, e);
            return;
        }
        self.metrics.relayed += 1;
        trace!("relayed {:#010x} to {}", packet.id, next);
    }

    /// Terminal handling of a plain data packet.
    fn acknowledge_and_report(&mut self, mut packet: Packet<N>) {
        let route = match packet.record_hop(self.address) {
            Ok(()) => {
                let route = packet.path.reversed();
                match self.send_ack(&packet, route) {
                    Ok(()) => self.metrics.acks_sent += 1,
                    Err(Error::Transport(e)) => {
                        self.metrics.send_failures += 1;
                        warn!("ack for {:#010x} not sent: {:?}", packet.id, e);
                    }
                    Err(e) => {
                        self.metrics.unroutable += 1;
                        warn!("ack for {:#010x} not sent: {}", packet.id, e);
                    }
                }
                route
            }
            Err(e) => {
                self.metrics.unroutable += 1;
                warn!(
                    "data {:#010x}: {} at {}, no ack",
                    packet.id,
                    e,
                    packet.path.render(packet.path.last_index().unwrap_or(0))
                );
                packet.path.reversed()
            }
        };

        let report = DeliveryReport::new(&packet, &route);
        if let Err(e) = self.sink.deliver(&report) {
            self.metrics.sink_failures += 1;
            warn!("collector delivery for {:#010x} failed: {:?}", packet.id, e);
        }

        self.emit(Event::DataDelivered {
            source: packet.source,
            id: packet.id,
            text: packet.text,
        });
    }

    /// Build a data ack over `route` and send it to the first return hop.
    fn send_ack(&mut self, received: &Packet<N>, route: Path<N>) -> Result<(), Error<T::Error>> {
        let text = format!("Ack from {}", self.address);
        let mut ack: Packet<N> = Packet::data(
            self.address,
            received.source,
            self.random.gen_u32(),
            Cfg::DEFAULT_TTL,
            Text::new(&text),
        );
        ack.data_ack = true;
        ack.path_exists = true;
        ack.write_cursor = route.len() as u8;
        ack.path = route;
        ack.read_cursor = 0;

        // Slot 0 is this node; transmission starts at the first return hop.
        let next = ack.next_return_hop().ok_or(Error::NoRoute)?;
        ack.read_cursor += 1;

        debug!(
            "ack {:#010x} for {:#010x} via {}",
            ack.id,
            received.id,
            ack.path.render(ack.path.last_index().unwrap_or(0))
        );
        self.send_on_link(&next, &ack).map_err(Error::Transport)
    }

    fn send_on_link(&self, next: &MacAddr, packet: &Packet<N>) -> Result<(), T::Error> {
        ensure_secure_link(&self.transport, next, &self.link_key)?;
        self.transport.send(next, &packet.to_frame())
    }
}
