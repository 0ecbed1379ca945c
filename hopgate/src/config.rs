//! Command-line configuration.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;

use clap::Parser;
use hoptrail::{LinkKey, MacAddr};
use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:4210";
pub const DEFAULT_COLLECTOR_URL: &str = "http://192.168.1.1:5000/receive_data";
pub const DEFAULT_LMK: &str = "LMK@ESP32_123456";
pub const DEFAULT_TICK_MS: u64 = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid link address '{0}' (expected AA:BB:CC:DD:EE:FF)")]
    Address(String),
    #[error("invalid neighbor '{0}' (expected MAC=host:port)")]
    Neighbor(String),
    #[error("link key must be exactly 16 bytes, got {0}")]
    KeyLength(usize),
    #[error("tick interval must be at least 1 ms")]
    Tick,
}

/// A neighbor on the emulated link: its link address and UDP endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerSpec {
    pub addr: MacAddr,
    pub endpoint: SocketAddr,
}

impl FromStr for PeerSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (mac, endpoint) = s
            .split_once('=')
            .ok_or_else(|| ConfigError::Neighbor(s.to_string()))?;
        let addr = parse_mac(mac.trim())?;
        let endpoint = endpoint
            .trim()
            .parse()
            .map_err(|_| ConfigError::Neighbor(s.to_string()))?;
        Ok(PeerSpec { addr, endpoint })
    }
}

pub fn parse_mac(s: &str) -> Result<MacAddr, ConfigError> {
    s.parse().map_err(|_| ConfigError::Address(s.to_string()))
}

pub fn parse_key(s: &str) -> Result<LinkKey, ConfigError> {
    LinkKey::from_text(s).ok_or(ConfigError::KeyLength(s.len()))
}

fn parse_peer(s: &str) -> Result<PeerSpec, ConfigError> {
    s.parse()
}

/// Gateway node: runs the hop-recording protocol over UDP and uploads
/// terminal data to an HTTP collector.
#[derive(Debug, Parser)]
#[command(name = "hopgate", version, about)]
pub struct Args {
    /// Link address of this node.
    #[arg(long, env = "HOPGATE_ADDRESS", value_parser = parse_mac)]
    pub address: MacAddr,

    /// UDP address the emulated link listens on.
    #[arg(long, env = "HOPGATE_BIND", default_value = DEFAULT_BIND_ADDR)]
    pub bind: SocketAddr,

    /// Neighbor as MAC=host:port. Repeat or comma-separate for several.
    #[arg(long = "neighbor", env = "HOPGATE_NEIGHBORS", value_delimiter = ',', value_parser = parse_peer)]
    pub neighbors: Vec<PeerSpec>,

    /// Collector endpoint receiving one JSON document per delivered packet.
    #[arg(long, env = "HOPGATE_COLLECTOR_URL", default_value = DEFAULT_COLLECTOR_URL)]
    pub collector_url: String,

    /// 16-byte local master key used for every peer link.
    #[arg(long, env = "HOPGATE_LMK", default_value = DEFAULT_LMK, value_parser = parse_key)]
    pub lmk: LinkKey,

    /// Main-loop tick driving queue draining and ack timeouts.
    #[arg(long, env = "HOPGATE_TICK_MS", default_value_t = DEFAULT_TICK_MS)]
    pub tick_ms: u64,

    /// Send one packet to this address at startup (FF:FF:FF:FF:FF:FF to broadcast).
    #[arg(long, value_parser = parse_mac)]
    pub send_to: Option<MacAddr>,

    /// Text of the startup packet.
    #[arg(long, default_value = "Hello")]
    pub send_text: String,
}

impl Args {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_ms == 0 {
            return Err(ConfigError::Tick);
        }
        Ok(())
    }

    /// Neighbor endpoints by link address. Later entries win.
    pub fn neighbor_map(&self) -> HashMap<MacAddr, SocketAddr> {
        self.neighbors.iter().map(|p| (p.addr, p.endpoint)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_spec_parse() {
        let spec: PeerSpec = "24:DC:C3:C6:AE:CC=127.0.0.1:4211".parse().unwrap();
        assert_eq!(spec.addr, MacAddr::new([0x24, 0xDC, 0xC3, 0xC6, 0xAE, 0xCC]));
        assert_eq!(spec.endpoint, "127.0.0.1:4211".parse().unwrap());
    }

    #[test]
    fn test_peer_spec_rejects_garbage() {
        assert!(matches!(
            "24:DC:C3:C6:AE:CC".parse::<PeerSpec>(),
            Err(ConfigError::Neighbor(_))
        ));
        assert!(matches!(
            "nope=127.0.0.1:1".parse::<PeerSpec>(),
            Err(ConfigError::Address(_))
        ));
        assert!(matches!(
            "24:DC:C3:C6:AE:CC=localhost".parse::<PeerSpec>(),
            Err(ConfigError::Neighbor(_))
        ));
    }

    #[test]
    fn test_key_length() {
        assert!(parse_key(DEFAULT_LMK).is_ok());
        assert_eq!(parse_key("short"), Err(ConfigError::KeyLength(5)));
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["hopgate", "--address", "24:dc:c3:00:00:01"]).unwrap();
        assert_eq!(args.bind, DEFAULT_BIND_ADDR.parse().unwrap());
        assert_eq!(args.collector_url, DEFAULT_COLLECTOR_URL);
        assert_eq!(args.lmk, LinkKey(*b"LMK@ESP32_123456"));
        assert_eq!(args.tick_ms, DEFAULT_TICK_MS);
        assert!(args.neighbors.is_empty());
        assert!(args.send_to.is_none());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_args_neighbors_and_send() {
        let args = Args::try_parse_from([
            "hopgate",
            "--address",
            "24:DC:C3:00:00:01",
            "--neighbor",
            "24:DC:C3:00:00:02=127.0.0.1:5002,24:DC:C3:00:00:03=127.0.0.1:5003",
            "--neighbor",
            "24:DC:C3:00:00:04=127.0.0.1:5004",
            "--send-to",
            "FF:FF:FF:FF:FF:FF",
            "--tick-ms",
            "0",
        ])
        .unwrap();

        assert_eq!(args.neighbors.len(), 3);
        assert_eq!(args.neighbor_map().len(), 3);
        assert!(args.send_to.is_some_and(|a| a.is_broadcast()));
        assert_eq!(args.validate(), Err(ConfigError::Tick));
    }

    #[test]
    fn test_args_rejects_bad_address() {
        assert!(Args::try_parse_from(["hopgate", "--address", "24:DC:C3"]).is_err());
    }
}
