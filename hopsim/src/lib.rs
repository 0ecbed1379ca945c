//! hopsim - Discrete event network simulator for hoptrail protocol testing.
//!
//! Runs many hoptrail nodes in one process over a simulated radio neighborhood,
//! with no real-time delays and deterministic ordering.
//!
//! # Features
//!
//! - **Discrete event simulation**: events ordered by (time, sequence number)
//! - **Link model**: per-link loss, delay and up/down state; unicast frames reach
//!   only the addressed neighbor, broadcast frames reach every neighbor
//! - **Scenario builder**: topologies, scheduled sends, link failures
//! - **Metrics**: frame counts, protocol events, session snapshots
//!
//! # Example
//!
//! ```
//! use hopsim::{Duration, ScenarioBuilder, Timestamp};
//!
//! let result = ScenarioBuilder::new(2)
//!     .send_at(Timestamp::from_millis(10), 0, 1, "hello")
//!     .run_for(Duration::from_secs(1));
//!
//! assert_eq!(result.metrics.sessions_completed(None), 1);
//! assert!(result.all_ready());
//! ```
//!
//! # Architecture
//!
//! The main loop pops the next event, advances time, and calls the node's
//! handlers directly: the receive callback plus a poll for frame deliveries,
//! a poll plus `handle_timer` for ticks. Frames the node handed to its radio are
//! then routed through the topology and scheduled as deliveries.

pub mod event;
pub mod metrics;
pub mod node;
pub mod scenario;
pub mod sim;
pub mod topology;

pub use hoptrail::{Duration, MacAddr, Timestamp};
pub use event::{Event, ScenarioAction, ScheduledEvent};
pub use metrics::{LoggedEvent, SessionSnapshot, SimMetrics, SimulationResult};
pub use node::{sim_address, SimNode};
pub use scenario::{simple_scenario, ScenarioBuilder};
pub use sim::Simulator;
pub use topology::{Link, Topology};
