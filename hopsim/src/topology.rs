//! Radio neighborhood: which nodes hear each other, and how well.

use hashbrown::HashMap;
use hoptrail::{Duration, MacAddr};

/// Properties of the radio link between two nodes. Links are symmetric.
#[derive(Debug, Clone)]
pub struct Link {
    /// Probability that a single frame copy is lost (0.0 to 1.0).
    pub loss_rate: f64,
    /// Air time plus receive callback latency.
    pub delay: Duration,
    /// A disabled link drops everything.
    pub active: bool,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            delay: Duration::from_millis(1),
            active: true,
        }
    }
}

impl Link {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// Network topology defining connectivity between nodes.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    /// Keyed by the canonical (lower, higher) address pair.
    links: HashMap<(MacAddr, MacAddr), Link>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every node hears every other node.
    pub fn fully_connected(nodes: &[MacAddr]) -> Self {
        let mut topo = Self::new();
        for (i, &a) in nodes.iter().enumerate() {
            for &b in nodes.iter().skip(i + 1) {
                topo.add_link(a, b, Link::default());
            }
        }
        topo
    }

    /// Each node hears only its predecessor and successor.
    pub fn chain(nodes: &[MacAddr]) -> Self {
        let mut topo = Self::new();
        for pair in nodes.windows(2) {
            topo.add_link(pair[0], pair[1], Link::default());
        }
        topo
    }

    /// The first node is the hub; the others hear only the hub.
    pub fn star(nodes: &[MacAddr]) -> Self {
        let mut topo = Self::new();
        if let Some((&hub, spokes)) = nodes.split_first() {
            for &spoke in spokes {
                topo.add_link(hub, spoke, Link::default());
            }
        }
        topo
    }

    /// Add or replace the link between `a` and `b`.
    pub fn add_link(&mut self, a: MacAddr, b: MacAddr, link: Link) {
        self.links.insert(canonical_pair(a, b), link);
    }

    pub fn get_link(&self, a: MacAddr, b: MacAddr) -> Option<&Link> {
        self.links.get(&canonical_pair(a, b))
    }

    pub fn get_link_mut(&mut self, a: MacAddr, b: MacAddr) -> Option<&mut Link> {
        self.links.get_mut(&canonical_pair(a, b))
    }

    /// True if a link exists and is active.
    pub fn is_connected(&self, a: MacAddr, b: MacAddr) -> bool {
        self.get_link(a, b).is_some_and(|link| link.active)
    }

    /// Nodes reachable from `node` over active links, sorted by address so
    /// that delivery order does not depend on hash order.
    pub fn neighbors(&self, node: MacAddr) -> Vec<MacAddr> {
        let mut result: Vec<MacAddr> = self
            .links
            .iter()
            .filter(|(_, link)| link.active)
            .filter_map(|(&(a, b), _)| {
                if a == node {
                    Some(b)
                } else if b == node {
                    Some(a)
                } else {
                    None
                }
            })
            .collect();
        result.sort();
        result
    }

    /// Apply one loss rate to every link.
    pub fn set_global_loss_rate(&mut self, rate: f64) {
        let rate = rate.clamp(0.0, 1.0);
        for link in self.links.values_mut() {
            link.loss_rate = rate;
        }
    }

    /// Apply one delay to every link.
    pub fn set_global_delay(&mut self, delay: Duration) {
        for link in self.links.values_mut() {
            link.delay = delay;
        }
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }
}

fn canonical_pair(a: MacAddr, b: MacAddr) -> (MacAddr, MacAddr) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}
