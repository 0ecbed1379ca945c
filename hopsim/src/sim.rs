//! Discrete event simulator for hoptrail networks.

use std::collections::BinaryHeap;

use hashbrown::HashMap;
use hoptrail::{Duration, MacAddr, Timestamp};
use log::{debug, warn};

use crate::event::{Event, ScenarioAction, ScheduledEvent, SequenceNumber};
use crate::metrics::{SessionSnapshot, SimMetrics, SimulationResult};
use crate::node::{sim_address, SimNode};
use crate::topology::Topology;

/// Default main-loop tick for every node.
pub const DEFAULT_TIMER_INTERVAL: Duration = Duration::from_millis(100);

/// Discrete event simulator for hoptrail networks.
pub struct Simulator {
    nodes: HashMap<MacAddr, SimNode>,
    /// Addresses in the order nodes were added.
    order: Vec<MacAddr>,
    topology: Topology,
    current_time: Timestamp,
    event_queue: BinaryHeap<ScheduledEvent>,
    metrics: SimMetrics,
    next_seq: u64,
    /// Seeds both link loss and per-node packet ids.
    seed: u64,
    /// RNG state for packet loss.
    rng_state: u64,
    timer_interval: Duration,
    snapshot_interval: Option<Duration>,
    next_snapshot: Option<Timestamp>,
}

impl Simulator {
    pub fn new(seed: u64) -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            topology: Topology::new(),
            current_time: Timestamp::ZERO,
            event_queue: BinaryHeap::new(),
            metrics: SimMetrics::new(),
            next_seq: 0,
            seed,
            rng_state: seed,
            timer_interval: DEFAULT_TIMER_INTERVAL,
            snapshot_interval: None,
            next_snapshot: None,
        }
    }

    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// Interval between main-loop ticks. Applies to nodes added afterwards.
    pub fn with_timer_interval(mut self, interval: Duration) -> Self {
        self.timer_interval = interval;
        self
    }

    /// Record session state of every node at this interval.
    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = Some(interval);
        self.next_snapshot = Some(self.current_time + interval);
        self
    }

    /// Add the next node. Its address is [`sim_address`] of its index.
    pub fn add_node(&mut self) -> MacAddr {
        let index = self.order.len();
        let node_seed = self.seed.wrapping_add(index as u64 + 1);
        let node = SimNode::new(index, node_seed, self.current_time);
        let addr = node.address();

        self.nodes.insert(addr, node);
        self.order.push(addr);
        self.schedule_timer(addr, self.current_time + self.timer_interval);
        addr
    }

    pub fn node(&self, addr: &MacAddr) -> Option<&SimNode> {
        self.nodes.get(addr)
    }

    pub fn node_mut(&mut self, addr: &MacAddr) -> Option<&mut SimNode> {
        self.nodes.get_mut(addr)
    }

    /// All node addresses, in the order they were added.
    pub fn node_ids(&self) -> Vec<MacAddr> {
        self.order.clone()
    }

    /// Address the `index`-th node has or will have.
    pub fn address_of(&self, index: usize) -> MacAddr {
        sim_address(index)
    }

    pub fn current_time(&self) -> Timestamp {
        self.current_time
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
    }

    pub fn metrics(&self) -> &SimMetrics {
        &self.metrics
    }

    pub fn schedule(&mut self, time: Timestamp, event: Event) {
        let seq = SequenceNumber::new(self.next_seq);
        self.next_seq += 1;
        self.event_queue.push(ScheduledEvent::new(time, seq, event));
    }

    fn schedule_timer(&mut self, node: MacAddr, time: Timestamp) {
        self.schedule(time, Event::TimerFire { node });
    }

    pub fn schedule_action(&mut self, time: Timestamp, action: ScenarioAction) {
        self.schedule(time, Event::ScenarioAction(action));
    }

    /// Have the application on `from` send `text` to `to` at `time`.
    pub fn schedule_send(&mut self, time: Timestamp, from: MacAddr, to: MacAddr, text: &str) {
        self.schedule(
            time,
            Event::AppSend {
                from,
                to,
                text: text.to_string(),
            },
        );
    }

    /// Deliver `frame` to `to` at `time` as if `from` had transmitted it,
    /// bypassing the topology.
    pub fn inject_frame(&mut self, time: Timestamp, from: MacAddr, to: MacAddr, frame: Vec<u8>) {
        self.schedule(time, Event::FrameDelivery { to, from, frame });
    }

    pub fn run_until(&mut self, end_time: Timestamp) -> SimulationResult {
        while self
            .event_queue
            .peek()
            .is_some_and(|event| event.time <= end_time)
        {
            let Some(event) = self.event_queue.pop() else {
                break;
            };
            self.advance_time(event.time);
            self.process_event(event.event);
            self.maybe_take_snapshot();
        }

        self.advance_time(end_time);
        self.take_snapshot();

        SimulationResult {
            end_time: self.current_time,
            metrics: self.metrics.clone(),
            queue_exhausted: self.event_queue.peek().is_none(),
        }
    }

    pub fn run_for(&mut self, duration: Duration) -> SimulationResult {
        self.run_until(self.current_time + duration)
    }

    fn advance_time(&mut self, time: Timestamp) {
        if time > self.current_time {
            self.current_time = time;
        }
    }

    fn process_event(&mut self, event: Event) {
        match event {
            Event::FrameDelivery { to, from, frame } => self.deliver_frame(to, from, &frame),
            Event::TimerFire { node } => self.fire_timer(node),
            Event::AppSend { from, to, text } => self.app_send(from, to, &text),
            Event::ScenarioAction(action) => self.execute_action(action),
        }
    }

    fn deliver_frame(&mut self, to: MacAddr, from: MacAddr, frame: &[u8]) {
        let now = self.current_time;
        let Some(node) = self.nodes.get_mut(&to) else {
            return;
        };
        let admission = node.handle_frame(from, frame, now);
        self.metrics.frames_delivered += 1;
        debug!("{}: frame from {} -> {:?}", to, from, admission);
        self.after_node_activity(to);
    }

    fn fire_timer(&mut self, addr: MacAddr) {
        let now = self.current_time;
        let Some(node) = self.nodes.get_mut(&addr) else {
            return;
        };
        node.handle_timer(now);
        self.after_node_activity(addr);
        self.schedule_timer(addr, now + self.timer_interval);
    }

    fn app_send(&mut self, from: MacAddr, to: MacAddr, text: &str) {
        let now = self.current_time;
        let Some(node) = self.nodes.get_mut(&from) else {
            return;
        };
        if let Err(e) = node.app_send(to, text, now) {
            self.metrics.sends_rejected += 1;
            warn!("{}: send to {} rejected: {}", from, to, e);
        }
        self.after_node_activity(from);
    }

    /// Route the node's outgoing frames and log its protocol events.
    fn after_node_activity(&mut self, addr: MacAddr) {
        let Some(node) = self.nodes.get(&addr) else {
            return;
        };
        let frames = node.take_outgoing();
        let events = node.take_events();

        for event in events {
            self.metrics.log_event(self.current_time, addr, event);
        }
        for (to, frame) in frames {
            self.route_frame(addr, to, frame);
        }
    }

    /// Carry one transmitted frame over the air.
    ///
    /// Broadcast reaches every active neighbor. Unicast reaches only the
    /// addressee, and only if it is a neighbor.
    fn route_frame(&mut self, sender: MacAddr, to: MacAddr, frame: Vec<u8>) {
        self.metrics.frames_sent += 1;

        let receivers = if to.is_broadcast() {
            self.topology.neighbors(sender)
        } else if self.topology.is_connected(sender, to) {
            vec![to]
        } else {
            self.metrics.frames_unreachable += 1;
            debug!("{}: no link to {}, frame lost", sender, to);
            return;
        };

        for receiver in receivers {
            let Some((loss_rate, delay)) = self
                .topology
                .get_link(sender, receiver)
                .map(|link| (link.loss_rate, link.delay))
            else {
                continue;
            };

            if loss_rate > 0.0 && self.random_f64() < loss_rate {
                self.metrics.frames_dropped += 1;
                continue;
            }

            self.schedule(
                self.current_time + delay,
                Event::FrameDelivery {
                    to: receiver,
                    from: sender,
                    frame: frame.clone(),
                },
            );
        }
    }

    fn execute_action(&mut self, action: ScenarioAction) {
        match action {
            ScenarioAction::DisableLink { a, b } => {
                if let Some(link) = self.topology.get_link_mut(a, b) {
                    link.active = false;
                }
            }
            ScenarioAction::EnableLink { a, b } => {
                if let Some(link) = self.topology.get_link_mut(a, b) {
                    link.active = true;
                }
            }
            ScenarioAction::SetLossRate { a, b, rate } => {
                if let Some(link) = self.topology.get_link_mut(a, b) {
                    link.loss_rate = rate.clamp(0.0, 1.0);
                }
            }
            ScenarioAction::TakeSnapshot => self.take_snapshot(),
        }
    }

    fn maybe_take_snapshot(&mut self) {
        if let Some(next) = self.next_snapshot {
            if self.current_time >= next {
                self.take_snapshot();
                if let Some(interval) = self.snapshot_interval {
                    self.next_snapshot = Some(next + interval);
                }
            }
        }
    }

    pub fn take_snapshot(&mut self) {
        let mut snapshot = SessionSnapshot::new(self.current_time);
        for (addr, node) in &self.nodes {
            snapshot.record_node(*addr, node.session_state(), node.metrics());
        }
        self.metrics.add_snapshot(snapshot);
    }

    /// Uniform f64 in [0, 1).
    fn random_f64(&mut self) -> f64 {
        self.rng_state = self
            .rng_state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1);
        (self.rng_state >> 11) as f64 / (1u64 << 53) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoptrail::{SessionState, BROADCAST_ADDR};

    fn two_nodes() -> (Simulator, MacAddr, MacAddr) {
        let mut sim = Simulator::new(42);
        let a = sim.add_node();
        let b = sim.add_node();
        *sim.topology_mut() = Topology::fully_connected(&[a, b]);
        (sim, a, b)
    }

    #[test]
    fn test_simulator_creation() {
        let sim = Simulator::new(42);
        assert_eq!(sim.current_time(), Timestamp::ZERO);
        assert!(sim.node_ids().is_empty());
    }

    #[test]
    fn test_add_nodes_in_order() {
        let mut sim = Simulator::new(42);
        let a = sim.add_node();
        let b = sim.add_node();

        assert_eq!(a, sim_address(0));
        assert_eq!(b, sim.address_of(1));
        assert_eq!(sim.node_ids(), vec![a, b]);
        assert!(sim.node(&a).is_some());
    }

    #[test]
    fn test_idle_network_sends_nothing() {
        let (mut sim, _, _) = two_nodes();
        let result = sim.run_for(Duration::from_secs(1));
        assert_eq!(result.metrics.frames_sent, 0);
        assert!(result.all_ready());
        assert!(!result.queue_exhausted);
    }

    #[test]
    fn test_unicast_without_link_is_unreachable() {
        let mut sim = Simulator::new(42);
        let a = sim.add_node();
        let b = sim.add_node();

        sim.schedule_send(Timestamp::from_millis(10), a, b, "lost");
        let result = sim.run_for(Duration::from_millis(500));

        assert_eq!(result.metrics.frames_sent, 1);
        assert_eq!(result.metrics.frames_unreachable, 1);
        assert_eq!(result.metrics.frames_delivered, 0);
        assert_eq!(sim.node(&a).map(|n| n.session_state()), Some(SessionState::WaitingForAck));
    }

    #[test]
    fn test_broadcast_reaches_all_neighbors() {
        let mut sim = Simulator::new(42);
        let hub = sim.add_node();
        let s1 = sim.add_node();
        let s2 = sim.add_node();
        *sim.topology_mut() = Topology::star(&[hub, s1, s2]);

        sim.schedule_send(Timestamp::from_millis(10), hub, BROADCAST_ADDR, "all");
        let result = sim.run_for(Duration::from_millis(500));

        assert_eq!(result.metrics.data_delivered(Some(s1)), 1);
        assert_eq!(result.metrics.data_delivered(Some(s2)), 1);
    }

    #[test]
    fn test_full_loss_drops_every_copy() {
        let (mut sim, a, b) = two_nodes();
        sim.topology_mut().set_global_loss_rate(1.0);

        sim.schedule_send(Timestamp::from_millis(10), a, b, "gone");
        let result = sim.run_for(Duration::from_millis(500));

        assert_eq!(result.metrics.frames_dropped, 1);
        assert_eq!(result.metrics.frames_delivered, 0);
    }

    #[test]
    fn test_busy_send_is_counted() {
        let (mut sim, a, b) = two_nodes();
        sim.topology_mut().set_global_loss_rate(1.0);

        sim.schedule_send(Timestamp::from_millis(10), a, b, "one");
        sim.schedule_send(Timestamp::from_millis(20), a, b, "two");
        let result = sim.run_for(Duration::from_millis(500));

        assert_eq!(result.metrics.sends_rejected, 1);
    }

    #[test]
    fn test_schedule_action() {
        let (mut sim, a, b) = two_nodes();
        sim.schedule_action(
            Timestamp::from_millis(500),
            ScenarioAction::DisableLink { a, b },
        );
        sim.run_for(Duration::from_secs(1));
        assert!(!sim.topology().is_connected(a, b));
    }

    #[test]
    fn test_snapshot_interval() {
        let mut sim = Simulator::new(1).with_snapshot_interval(Duration::from_millis(250));
        sim.add_node();
        let result = sim.run_for(Duration::from_secs(1));
        // Periodic snapshots plus the final one.
        assert!(result.metrics.snapshots.len() >= 4);
    }
}
