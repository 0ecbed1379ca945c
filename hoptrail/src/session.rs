//! Per-node send session: one outstanding send awaiting acknowledgement.
//!
//! ```text
//!            send_data / send_broadcast
//!   READY_TO_SEND ─────────────────────────▶ WAITING_FOR_ACK
//!        ▲                                         │
//!        └──────── data ack / retries exhausted ───┘
//! ```
//!
//! The session also owns the retained copy of the last packet sent, which the
//! timer path retransmits.

use crate::time::{Duration, Timestamp};
use crate::types::{MacAddr, Packet, MAX_PATH_HOPS};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    ReadyToSend,
    WaitingForAck,
}

/// What the timer path should do for the current session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimerAction<const N: usize = MAX_PATH_HOPS> {
    /// Nothing outstanding, or the timeout has not elapsed.
    Idle,
    /// Resend this packet to `next_hop`.
    Retransmit { packet: Packet<N>, next_hop: MacAddr },
    /// Timed out with nothing retained to resend; waiting for more timeouts.
    Wait,
    /// Retries exhausted; the session is back to ready.
    GiveUp { id: u32, attempts: u8 },
}

#[derive(Clone, Debug, Default)]
pub struct Session<const N: usize = MAX_PATH_HOPS> {
    state: SessionState,
    counter: u32,
    retained: Option<Packet<N>>,
    destination: MacAddr,
    next_hop: MacAddr,
    sent_at: Timestamp,
    last_id: u32,
    attempts: u8,
}

impl<const N: usize> Session<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::ReadyToSend
    }

    /// Number of packets processed by the engine so far.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Copy of the last packet sent, if still retained.
    pub fn retained(&self) -> Option<&Packet<N>> {
        self.retained.as_ref()
    }

    /// Retransmissions performed for the current session.
    pub fn attempts(&self) -> u8 {
        self.attempts
    }

    /// Enter `WAITING_FOR_ACK` holding `packet`, sent to `next_hop` at `now`.
    ///
    /// The caller checks [`is_ready`](Self::is_ready) first.
    pub fn begin(&mut self, packet: Packet<N>, next_hop: MacAddr, now: Timestamp) {
        self.last_id = packet.id;
        self.destination = packet.destination;
        self.retained = Some(packet);
        self.next_hop = next_hop;
        self.sent_at = now;
        self.attempts = 0;
        self.state = SessionState::WaitingForAck;
    }

    /// Whether a data acknowledgement from `from` answers the outstanding send.
    ///
    /// A broadcast session is answered by any neighbor; a unicast one only by
    /// its destination.
    pub fn answers(&self, from: &MacAddr) -> bool {
        self.state == SessionState::WaitingForAck
            && (self.destination.is_broadcast() || self.destination == *from)
    }

    /// Data acknowledgement received from `from`.
    ///
    /// Completes the session and returns true only if the ack answers the
    /// outstanding send. Anything else leaves the session untouched.
    pub fn acknowledge(&mut self, from: &MacAddr) -> bool {
        if !self.answers(from) {
            return false;
        }
        self.state = SessionState::ReadyToSend;
        self.retained = None;
        self.attempts = 0;
        true
    }

    /// Destination of the current or last send.
    pub fn destination(&self) -> MacAddr {
        self.destination
    }

    /// Broadcast acknowledgement received: drop the retained copy, keep the state.
    pub fn clear_retained(&mut self) {
        self.retained = None;
    }

    pub fn bump_counter(&mut self) -> u32 {
        self.counter = self.counter.wrapping_add(1);
        self.counter
    }

    /// Decide what to do at `now`.
    ///
    /// `fresh_id` is stamped on a retransmitted packet: the receivers' dedup
    /// ledgers already hold the previous id.
    pub fn on_timer(
        &mut self,
        now: Timestamp,
        timeout: Duration,
        max_retries: u8,
        fresh_id: impl FnOnce() -> u32,
    ) -> TimerAction<N> {
        if self.state != SessionState::WaitingForAck || now.saturating_sub(self.sent_at) < timeout
        {
            return TimerAction::Idle;
        }
        if self.attempts >= max_retries {
            let attempts = self.attempts;
            let id = self.retained.as_ref().map(|p| p.id).unwrap_or(self.last_id);
            self.state = SessionState::ReadyToSend;
            self.retained = None;
            self.attempts = 0;
            return TimerAction::GiveUp { id, attempts };
        }
        self.attempts += 1;
        self.sent_at = now;
        match self.retained.as_mut() {
            Some(packet) => {
                packet.id = fresh_id();
                self.last_id = packet.id;
                TimerAction::Retransmit {
                    packet: packet.clone(),
                    next_hop: self.next_hop,
                }
            }
            None => TimerAction::Wait,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Text, DEFAULT_TTL};

    fn packet(id: u32) -> Packet {
        Packet::data(MacAddr([1; 6]), MacAddr([2; 6]), id, DEFAULT_TTL, Text::new("hi"))
    }

    const TIMEOUT: Duration = Duration::from_millis(1000);

    #[test]
    fn test_initial_state() {
        let s: Session = Session::new();
        assert_eq!(s.state(), SessionState::ReadyToSend);
        assert!(s.retained().is_none());
        assert_eq!(s.counter(), 0);
    }

    #[test]
    fn test_begin_and_acknowledge() {
        let mut s: Session = Session::new();
        s.begin(packet(5), MacAddr([2; 6]), Timestamp::ZERO);
        assert_eq!(s.state(), SessionState::WaitingForAck);
        assert_eq!(s.retained().map(|p| p.id), Some(5));

        assert!(s.acknowledge(&MacAddr([2; 6])));
        assert_eq!(s.state(), SessionState::ReadyToSend);
        assert!(s.retained().is_none());

        // A second ack is harmless.
        assert!(!s.acknowledge(&MacAddr([2; 6])));
    }

    #[test]
    fn test_ack_from_other_node_ignored() {
        let mut s: Session = Session::new();
        s.begin(packet(5), MacAddr([2; 6]), Timestamp::ZERO);

        assert!(!s.acknowledge(&MacAddr([3; 6])));
        assert_eq!(s.state(), SessionState::WaitingForAck);
        assert_eq!(s.retained().map(|p| p.id), Some(5));

        assert!(s.acknowledge(&MacAddr([2; 6])));
        assert!(s.is_ready());
    }

    #[test]
    fn test_broadcast_session_answered_by_anyone() {
        let mut s: Session = Session::new();
        let mut p = packet(6);
        p.destination = crate::types::BROADCAST_ADDR;
        s.begin(p, crate::types::BROADCAST_ADDR, Timestamp::ZERO);

        assert_eq!(s.destination(), crate::types::BROADCAST_ADDR);
        assert!(s.acknowledge(&MacAddr([9; 6])));
        assert!(s.is_ready());
    }

    #[test]
    fn test_broadcast_ack_keeps_state() {
        let mut s: Session = Session::new();
        s.begin(packet(5), MacAddr([2; 6]), Timestamp::ZERO);
        s.clear_retained();
        assert_eq!(s.state(), SessionState::WaitingForAck);
        assert!(s.retained().is_none());
    }

    #[test]
    fn test_timer_idle_before_timeout() {
        let mut s: Session = Session::new();
        assert_eq!(s.on_timer(Timestamp::from_secs(9), TIMEOUT, 3, || 0), TimerAction::Idle);

        s.begin(packet(5), MacAddr([2; 6]), Timestamp::from_millis(100));
        assert_eq!(
            s.on_timer(Timestamp::from_millis(1099), TIMEOUT, 3, || 0),
            TimerAction::Idle
        );
    }

    #[test]
    fn test_retransmit_then_give_up() {
        let mut s: Session = Session::new();
        s.begin(packet(5), MacAddr([2; 6]), Timestamp::ZERO);

        let mut next = 100;
        let mut now = Timestamp::ZERO;
        for attempt in 1..=3u8 {
            now = now + TIMEOUT;
            match s.on_timer(now, TIMEOUT, 3, || {
                next += 1;
                next
            }) {
                TimerAction::Retransmit { packet, next_hop } => {
                    assert_eq!(packet.id, 100 + attempt as u32);
                    assert_eq!(next_hop, MacAddr([2; 6]));
                }
                other => panic!("expected retransmit, got {:?}", other),
            }
            assert_eq!(s.attempts(), attempt);
        }

        now = now + TIMEOUT;
        assert_eq!(
            s.on_timer(now, TIMEOUT, 3, || 0),
            TimerAction::GiveUp { id: 103, attempts: 3 }
        );
        assert!(s.is_ready());
        assert!(s.retained().is_none());
    }

    #[test]
    fn test_timeout_without_retained_packet() {
        let mut s: Session = Session::new();
        s.begin(packet(5), MacAddr::ZERO, Timestamp::ZERO);
        s.clear_retained();

        assert_eq!(s.on_timer(Timestamp::from_secs(1), TIMEOUT, 1, || 0), TimerAction::Wait);
        assert_eq!(
            s.on_timer(Timestamp::from_secs(2), TIMEOUT, 1, || 0),
            TimerAction::GiveUp { id: 5, attempts: 1 }
        );
        assert!(s.is_ready());
    }

    #[test]
    fn test_counter_increments() {
        let mut s: Session = Session::new();
        assert_eq!(s.bump_counter(), 1);
        assert_eq!(s.bump_counter(), 2);
        assert_eq!(s.counter(), 2);
    }
}
