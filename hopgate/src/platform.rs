//! Host clock and randomness for the gateway node.

use std::time::Instant;

use hoptrail::{Clock, Random, Timestamp};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Milliseconds since the gateway started.
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.start.elapsed().as_millis() as u64)
    }
}

pub struct RandRandom {
    rng: StdRng,
}

impl RandRandom {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl Default for RandRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl Random for RandRandom {
    fn gen_range(&mut self, min: u64, max: u64) -> u64 {
        if max <= min {
            return min;
        }
        self.rng.gen_range(min..max)
    }

    fn gen_u32(&mut self) -> u32 {
        self.rng.gen()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn test_defaults() {
        let clock = SystemClock::default();
        assert!(clock.now() < Timestamp::from_secs(60));
        let mut random = RandRandom::default();
        assert!(random.gen_range(0, 4) < 4);
    }

    #[test]
    fn test_gen_range_bounds() {
        let mut random = RandRandom::new();
        for _ in 0..100 {
            let v = random.gen_range(10, 20);
            assert!((10..20).contains(&v));
        }
        assert_eq!(random.gen_range(5, 5), 5);
    }
}
