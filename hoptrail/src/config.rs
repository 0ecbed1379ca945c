//! Compile-time configuration for memory bounds and protocol timing.
//!
//! The `NodeConfig` trait lets a deployment size the receive queue and the
//! deduplication ledger for its RAM budget and tune acknowledgement timing.
//! Use `DefaultConfig` for ESP32-class devices, `SmallConfig` for tighter parts.
//!
//! Memory formula (rough estimate):
//! - `MAX_RX_QUEUE * 150` bytes (one decoded packet plus sender address per entry)
//! - `MAX_SEEN_IDS * 12` bytes (id in the set and in the eviction FIFO)
//!
//! # Example
//!
//! ```ignore
//! use hoptrail::{Node, SmallConfig};
//!
//! let node = Node::<_, _, _, _, SmallConfig>::with_config(addr, key, transport, sink, random, clock);
//! ```

/// Configuration trait for compile-time tuning.
///
/// All bounds must be non-zero.
pub trait NodeConfig {
    /// Maximum packet ids remembered by the deduplication ledger.
    const MAX_SEEN_IDS: usize;

    /// Maximum frames waiting in the receive queue.
    const MAX_RX_QUEUE: usize;

    /// Retransmissions of an unacknowledged send before the session is abandoned.
    const MAX_RETRIES: u8;

    /// Time to wait for a data acknowledgement before retransmitting.
    const ACK_TIMEOUT_MS: u64;

    /// Hop budget stamped on originated packets and acknowledgements.
    const DEFAULT_TTL: u8;
}

/// Default configuration for 256KB+ RAM devices.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConfig;

impl NodeConfig for DefaultConfig {
    const MAX_SEEN_IDS: usize = 512;
    const MAX_RX_QUEUE: usize = 32;
    const MAX_RETRIES: u8 = crate::types::MAX_RETRIES;
    const ACK_TIMEOUT_MS: u64 = 2_000;
    const DEFAULT_TTL: u8 = crate::types::DEFAULT_TTL;
}

/// Small configuration for 64KB RAM devices.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmallConfig;

impl NodeConfig for SmallConfig {
    const MAX_SEEN_IDS: usize = 64;
    const MAX_RX_QUEUE: usize = 8;
    const MAX_RETRIES: u8 = crate::types::MAX_RETRIES;
    const ACK_TIMEOUT_MS: u64 = 2_000;
    const DEFAULT_TTL: u8 = crate::types::DEFAULT_TTL;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        assert_eq!(DefaultConfig::MAX_SEEN_IDS, 512);
        assert_eq!(DefaultConfig::MAX_RX_QUEUE, 32);
        assert_eq!(DefaultConfig::MAX_RETRIES, 3);
        assert_eq!(DefaultConfig::ACK_TIMEOUT_MS, 2_000);
        assert_eq!(DefaultConfig::DEFAULT_TTL, 10);
    }

    #[test]
    fn test_small_config_smaller_than_default() {
        assert!(SmallConfig::MAX_SEEN_IDS < DefaultConfig::MAX_SEEN_IDS);
        assert!(SmallConfig::MAX_RX_QUEUE < DefaultConfig::MAX_RX_QUEUE);
        assert_eq!(SmallConfig::MAX_RETRIES, DefaultConfig::MAX_RETRIES);
    }

    #[test]
    fn test_configs_are_nonzero() {
        assert!(DefaultConfig::MAX_SEEN_IDS > 0);
        assert!(DefaultConfig::MAX_RX_QUEUE > 0);
        assert!(DefaultConfig::ACK_TIMEOUT_MS > 0);
        assert!(DefaultConfig::DEFAULT_TTL > 0);

        assert!(SmallConfig::MAX_SEEN_IDS > 0);
        assert!(SmallConfig::MAX_RX_QUEUE > 0);
        assert!(SmallConfig::ACK_TIMEOUT_MS > 0);
        assert!(SmallConfig::DEFAULT_TTL > 0);
    }
}
