//! Whole-network properties under link loss.

use hopsim::{Duration, ScenarioBuilder, SimulationResult, Timestamp};

fn lossy_scenario(seed: u64) -> ScenarioBuilder {
    ScenarioBuilder::new(4)
        .with_seed(seed)
        .with_loss_rate(0.3)
        .send_at(Timestamp::from_millis(10), 0, 1, "a->b")
        .send_at(Timestamp::from_millis(20), 2, 3, "c->d")
        .send_at(Timestamp::from_millis(30), 3, 0, "d->a")
        .broadcast_at(Timestamp::from_millis(40), 1, "b->all")
}

fn summary(result: &SimulationResult) -> (u64, u64, u64, usize) {
    (
        result.metrics.frames_sent,
        result.metrics.frames_dropped,
        result.metrics.frames_delivered,
        result.metrics.events.len(),
    )
}

#[test]
fn same_seed_same_outcome() {
    let first = lossy_scenario(7).run_for(Duration::from_secs(15));
    let second = lossy_scenario(7).run_for(Duration::from_secs(15));
    assert_eq!(summary(&first), summary(&second));
}

#[test]
fn every_session_resolves_exactly_once() {
    for seed in [1, 2, 3, 4, 5] {
        let result = lossy_scenario(seed).run_for(Duration::from_secs(15));

        for sender in [0, 1, 2, 3].map(hopsim::sim_address) {
            let resolved = result.metrics.sessions_completed(Some(sender))
                + result.metrics.sessions_failed(Some(sender));
            assert_eq!(resolved, 1, "seed {seed}: sender {sender} resolved {resolved} times");
        }
        assert!(result.all_ready(), "seed {seed}: a node is still waiting");
        assert_eq!(result.metrics.sends_rejected, 0);
    }
}

#[test]
fn every_delivery_is_reported() {
    let (mut sim, nodes) = lossy_scenario(11).build();
    let result = sim.run_for(Duration::from_secs(15));

    let mut reports = 0;
    for node in &nodes {
        for report in sim.node(node).unwrap().take_reports() {
            assert_eq!(report.path.len(), report.path_index + 1);
            assert_eq!(report.path.first(), Some(&node.octets()));
            assert_eq!(report.path.last(), Some(&report.source));
            reports += 1;
        }
    }
    assert_eq!(reports, result.metrics.data_delivered(None));
}

#[test]
fn lossless_network_never_retransmits() {
    let (mut sim, nodes) = lossy_scenario(3).with_loss_rate(0.0).build();
    let result = sim.run_for(Duration::from_secs(5));

    assert_eq!(result.metrics.frames_dropped, 0);
    assert_eq!(result.metrics.sessions_failed(None), 0);
    for node in &nodes {
        assert_eq!(sim.node(node).unwrap().metrics().retransmissions, 0);
    }
}
