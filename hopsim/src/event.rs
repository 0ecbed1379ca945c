//! Event types and priority queue ordering for the discrete event simulation.

use std::cmp::Ordering;

use hoptrail::{MacAddr, Timestamp};

/// Unique sequence number for deterministic event ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Scenario actions that can be scheduled during simulation.
#[derive(Debug, Clone)]
pub enum ScenarioAction {
    /// Take a link down in both directions.
    DisableLink { a: MacAddr, b: MacAddr },
    /// Bring a link back up.
    EnableLink { a: MacAddr, b: MacAddr },
    /// Set loss rate on a link.
    SetLossRate { a: MacAddr, b: MacAddr, rate: f64 },
    /// Record every node's session state.
    TakeSnapshot,
}

/// Events in the discrete event simulation.
#[derive(Debug, Clone)]
pub enum Event {
    /// A frame arrives at a node's receive callback.
    FrameDelivery {
        to: MacAddr,
        from: MacAddr,
        frame: Vec<u8>,
    },
    /// Periodic tick for a node: process its queue and check ack timeouts.
    TimerFire { node: MacAddr },
    /// The application on `from` originates a packet. A broadcast `to`
    /// addresses every neighbor.
    AppSend {
        from: MacAddr,
        to: MacAddr,
        text: String,
    },
    /// Execute a scenario action.
    ScenarioAction(ScenarioAction),
}

/// A scheduled event with timestamp and sequence number for ordering.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub time: Timestamp,
    /// Breaks ties between same-time events in scheduling order.
    pub seq: SequenceNumber,
    pub event: Event,
}

impl ScheduledEvent {
    pub fn new(time: Timestamp, seq: SequenceNumber, event: Event) -> Self {
        Self { time, seq, event }
    }
}

// BinaryHeap is a max-heap, so the ordering is reversed.
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
