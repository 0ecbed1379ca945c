//! Metrics collection for simulation analysis.

use hashbrown::HashMap;
use hoptrail::{Event as NodeEvent, MacAddr, NodeMetrics, SessionState, Timestamp};

/// A snapshot of every node's session state at a point in time.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// When this snapshot was taken.
    pub time: Timestamp,
    /// Session state of each node.
    pub states: HashMap<MacAddr, SessionState>,
    /// Protocol counters of each node.
    pub counters: HashMap<MacAddr, NodeMetrics>,
}

impl SessionSnapshot {
    pub fn new(time: Timestamp) -> Self {
        Self {
            time,
            states: HashMap::new(),
            counters: HashMap::new(),
        }
    }

    pub fn record_node(&mut self, addr: MacAddr, state: SessionState, counters: NodeMetrics) {
        self.states.insert(addr, state);
        self.counters.insert(addr, counters);
    }

    /// True if no node has a send outstanding.
    pub fn all_ready(&self) -> bool {
        self.states.values().all(|s| *s == SessionState::ReadyToSend)
    }

    /// Nodes still waiting for an acknowledgement, sorted.
    pub fn waiting(&self) -> Vec<MacAddr> {
        let mut nodes: Vec<MacAddr> = self
            .states
            .iter()
            .filter(|(_, s)| **s == SessionState::WaitingForAck)
            .map(|(addr, _)| *addr)
            .collect();
        nodes.sort();
        nodes
    }

    /// Sum of a counter across all nodes.
    pub fn total(&self, counter: impl Fn(&NodeMetrics) -> u64) -> u64 {
        self.counters.values().map(counter).sum()
    }
}

/// A protocol event emitted by a node, stamped with simulation time.
#[derive(Debug, Clone)]
pub struct LoggedEvent {
    pub time: Timestamp,
    pub node: MacAddr,
    pub event: NodeEvent,
}

/// Simulation metrics collected over time.
#[derive(Debug, Clone, Default)]
pub struct SimMetrics {
    /// Frames handed to the simulated air by nodes.
    pub frames_sent: u64,
    /// Frame copies lost to link loss.
    pub frames_dropped: u64,
    /// Unicast frames with no active link to the addressee.
    pub frames_unreachable: u64,
    /// Frame copies delivered to a node's receive callback.
    pub frames_delivered: u64,
    /// Application send requests refused by the node (busy session, link error).
    pub sends_rejected: u64,
    /// Protocol events in the order they were emitted.
    pub events: Vec<LoggedEvent>,
    /// Session snapshots taken at intervals.
    pub snapshots: Vec<SessionSnapshot>,
}

impl SimMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_snapshot(&mut self, snapshot: SessionSnapshot) {
        self.snapshots.push(snapshot);
    }

    pub fn latest_snapshot(&self) -> Option<&SessionSnapshot> {
        self.snapshots.last()
    }

    pub fn log_event(&mut self, time: Timestamp, node: MacAddr, event: NodeEvent) {
        self.events.push(LoggedEvent { time, node, event });
    }

    /// Number of completed sessions, per originating node or overall.
    pub fn sessions_completed(&self, node: Option<MacAddr>) -> usize {
        self.count_events(node, |e| matches!(e, NodeEvent::SessionComplete { .. }))
    }

    pub fn sessions_failed(&self, node: Option<MacAddr>) -> usize {
        self.count_events(node, |e| matches!(e, NodeEvent::SessionFailed { .. }))
    }

    /// Terminal deliveries, per receiving node or overall.
    pub fn data_delivered(&self, node: Option<MacAddr>) -> usize {
        self.count_events(node, |e| matches!(e, NodeEvent::DataDelivered { .. }))
    }

    /// Time of the first completed session at `node`.
    pub fn first_completion(&self, node: MacAddr) -> Option<Timestamp> {
        self.events
            .iter()
            .find(|e| e.node == node && matches!(e.event, NodeEvent::SessionComplete { .. }))
            .map(|e| e.time)
    }

    fn count_events(&self, node: Option<MacAddr>, pred: impl Fn(&NodeEvent) -> bool) -> usize {
        self.events
            .iter()
            .filter(|e| node.map_or(true, |n| e.node == n))
            .filter(|e| pred(&e.event))
            .count()
    }
}

/// Result of running a simulation.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    /// Final simulation time.
    pub end_time: Timestamp,
    /// Collected metrics.
    pub metrics: SimMetrics,
    /// Whether simulation ended due to event queue exhaustion (vs time limit).
    pub queue_exhausted: bool,
}

impl SimulationResult {
    /// True if every node ended with no send outstanding.
    pub fn all_ready(&self) -> bool {
        self.metrics
            .latest_snapshot()
            .is_some_and(|s| s.all_ready())
    }

    /// Final counters of one node.
    pub fn final_counters(&self, node: MacAddr) -> Option<NodeMetrics> {
        self.metrics
            .latest_snapshot()
            .and_then(|s| s.counters.get(&node).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoptrail::Text;

    fn mac(n: u8) -> MacAddr {
        MacAddr::new([2, 0, 0, 0, 0, n])
    }

    #[test]
    fn test_snapshot_ready_and_waiting() {
        let mut snapshot = SessionSnapshot::new(Timestamp::ZERO);
        snapshot.record_node(mac(1), SessionState::ReadyToSend, NodeMetrics::default());
        snapshot.record_node(mac(2), SessionState::WaitingForAck, NodeMetrics::default());

        assert!(!snapshot.all_ready());
        assert_eq!(snapshot.waiting(), vec![mac(2)]);
    }

    #[test]
    fn test_snapshot_totals() {
        let mut snapshot = SessionSnapshot::new(Timestamp::ZERO);
        let a = NodeMetrics {
            acks_sent: 2,
            ..NodeMetrics::default()
        };
        let b = NodeMetrics {
            acks_sent: 3,
            ..NodeMetrics::default()
        };
        snapshot.record_node(mac(1), SessionState::ReadyToSend, a);
        snapshot.record_node(mac(2), SessionState::ReadyToSend, b);
        assert_eq!(snapshot.total(|m| m.acks_sent), 5);
    }

    #[test]
    fn test_event_counts() {
        let mut metrics = SimMetrics::new();
        metrics.log_event(
            Timestamp::from_millis(5),
            mac(2),
            NodeEvent::DataDelivered {
                source: mac(1),
                id: 1,
                text: Text::new("x"),
            },
        );
        metrics.log_event(
            Timestamp::from_millis(7),
            mac(1),
            NodeEvent::SessionComplete {
                session: 1,
                from: mac(2),
            },
        );

        assert_eq!(metrics.data_delivered(None), 1);
        assert_eq!(metrics.data_delivered(Some(mac(1))), 0);
        assert_eq!(metrics.sessions_completed(Some(mac(1))), 1);
        assert_eq!(metrics.sessions_failed(None), 0);
        assert_eq!(metrics.first_completion(mac(1)), Some(Timestamp::from_millis(7)));
    }
}
