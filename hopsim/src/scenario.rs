//! Scenario builder for setting up and running simulations.
//!
//! Nodes are referred to by index; node `i` gets address [`sim_address`]`(i)`.

use hoptrail::{Duration, MacAddr, Timestamp, BROADCAST_ADDR};

use crate::event::{Event, ScenarioAction};
use crate::metrics::SimulationResult;
use crate::node::sim_address;
use crate::sim::{Simulator, DEFAULT_TIMER_INTERVAL};
use crate::topology::Topology;

#[derive(Debug, Clone)]
enum TopologyType {
    FullyConnected,
    Chain,
    Star,
    Custom(Topology),
}

/// Builder for simulation scenarios.
pub struct ScenarioBuilder {
    num_nodes: usize,
    seed: u64,
    topology_type: TopologyType,
    loss_rate: f64,
    delay: Duration,
    timer_interval: Duration,
    snapshot_interval: Option<Duration>,
    events: Vec<(Timestamp, Event)>,
}

impl Default for ScenarioBuilder {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ScenarioBuilder {
    /// A fully connected network of `num_nodes` nodes unless another topology is chosen.
    pub fn new(num_nodes: usize) -> Self {
        Self {
            num_nodes,
            seed: 42,
            topology_type: TopologyType::FullyConnected,
            loss_rate: 0.0,
            delay: Duration::from_millis(1),
            timer_interval: DEFAULT_TIMER_INTERVAL,
            snapshot_interval: None,
            events: Vec::new(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Custom topology, built over [`sim_address`] addresses.
    pub fn topology(mut self, topo: Topology) -> Self {
        self.topology_type = TopologyType::Custom(topo);
        self
    }

    pub fn fully_connected(mut self) -> Self {
        self.topology_type = TopologyType::FullyConnected;
        self
    }

    /// Node `i` hears only `i - 1` and `i + 1`.
    pub fn chain_topology(mut self) -> Self {
        self.topology_type = TopologyType::Chain;
        self
    }

    /// Node 0 is the hub.
    pub fn star_topology(mut self) -> Self {
        self.topology_type = TopologyType::Star;
        self
    }

    /// Loss rate applied to every link.
    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_timer_interval(mut self, interval: Duration) -> Self {
        self.timer_interval = interval;
        self
    }

    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = Some(interval);
        self
    }

    /// Node `from` sends `text` to node `to` at `time`.
    pub fn send_at(mut self, time: Timestamp, from: usize, to: usize, text: &str) -> Self {
        self.events.push((
            time,
            Event::AppSend {
                from: sim_address(from),
                to: sim_address(to),
                text: text.to_string(),
            },
        ));
        self
    }

    /// Node `from` broadcasts `text` at `time`.
    pub fn broadcast_at(mut self, time: Timestamp, from: usize, text: &str) -> Self {
        self.events.push((
            time,
            Event::AppSend {
                from: sim_address(from),
                to: BROADCAST_ADDR,
                text: text.to_string(),
            },
        ));
        self
    }

    pub fn disable_link_at(self, time: Timestamp, a: usize, b: usize) -> Self {
        self.action_at(
            time,
            ScenarioAction::DisableLink {
                a: sim_address(a),
                b: sim_address(b),
            },
        )
    }

    pub fn enable_link_at(self, time: Timestamp, a: usize, b: usize) -> Self {
        self.action_at(
            time,
            ScenarioAction::EnableLink {
                a: sim_address(a),
                b: sim_address(b),
            },
        )
    }

    pub fn loss_rate_at(self, time: Timestamp, a: usize, b: usize, rate: f64) -> Self {
        self.action_at(
            time,
            ScenarioAction::SetLossRate {
                a: sim_address(a),
                b: sim_address(b),
                rate,
            },
        )
    }

    pub fn snapshot_at(self, time: Timestamp) -> Self {
        self.action_at(time, ScenarioAction::TakeSnapshot)
    }

    fn action_at(mut self, time: Timestamp, action: ScenarioAction) -> Self {
        self.events.push((time, Event::ScenarioAction(action)));
        self
    }

    /// Build the simulator. Returns it with node addresses in index order.
    pub fn build(self) -> (Simulator, Vec<MacAddr>) {
        let addrs: Vec<MacAddr> = (0..self.num_nodes).map(sim_address).collect();
        let custom = matches!(self.topology_type, TopologyType::Custom(_));

        // Loss and delay settings shape generated topologies only.
        let topo = match self.topology_type {
            TopologyType::FullyConnected => Topology::fully_connected(&addrs),
            TopologyType::Chain => Topology::chain(&addrs),
            TopologyType::Star => Topology::star(&addrs),
            TopologyType::Custom(t) => t,
        };
        let topo = if custom {
            topo
        } else {
            let mut topo = topo;
            topo.set_global_loss_rate(self.loss_rate);
            topo.set_global_delay(self.delay);
            topo
        };

        let mut sim = Simulator::new(self.seed)
            .with_topology(topo)
            .with_timer_interval(self.timer_interval);
        if let Some(interval) = self.snapshot_interval {
            sim = sim.with_snapshot_interval(interval);
        }

        let nodes: Vec<MacAddr> = (0..self.num_nodes).map(|_| sim.add_node()).collect();
        debug_assert_eq!(nodes, addrs);

        for (time, event) in self.events {
            sim.schedule(time, event);
        }

        (sim, nodes)
    }

    pub fn run_for(self, duration: Duration) -> SimulationResult {
        let (mut sim, _) = self.build();
        sim.run_for(duration)
    }

    pub fn run_until(self, end_time: Timestamp) -> SimulationResult {
        let (mut sim, _) = self.build();
        sim.run_until(end_time)
    }
}

/// Two directly linked nodes; node 0 sends one packet to node 1 at 10ms.
pub fn simple_scenario() -> ScenarioBuilder {
    ScenarioBuilder::new(2)
        .fully_connected()
        .send_at(Timestamp::from_millis(10), 0, 1, "hello")
}
