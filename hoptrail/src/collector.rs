//! Delivery report handed to the collector sink.
//!
//! One report is produced for every plain data packet that terminates at a node.
//! Field names are fixed by the collector's JSON schema.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use serde::Serialize;

use crate::path::Path;
use crate::types::{Packet, MAC_SIZE};

/// JSON document describing a terminal data packet and its return route.
///
/// `path` is the return route actually used for the acknowledgement: this node
/// first, the originator last. `path_index` is its last valid index, so
/// `path.len() == path_index + 1` whenever the route is non-empty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub text: String,
    #[serde(rename = "TTL")]
    pub ttl: u8,
    #[serde(rename = "identification")]
    pub kind: u8,
    #[serde(rename = "broadcast_Ack")]
    pub broadcast_ack: bool,
    #[serde(rename = "Data_Ack")]
    pub data_ack: bool,
    #[serde(rename = "packetID")]
    pub id: u32,
    #[serde(rename = "Path_Index")]
    pub path_index: usize,
    #[serde(rename = "Path_Length")]
    pub path_length: usize,
    #[serde(rename = "Path_Exist")]
    pub path_exists: bool,
    #[serde(rename = "Path_Array")]
    pub path: Vec<[u8; MAC_SIZE]>,
    #[serde(rename = "SourceMAC")]
    pub source: [u8; MAC_SIZE],
}

impl DeliveryReport {
    /// Describe `received` as delivered over `route`.
    pub fn new<const N: usize>(received: &Packet<N>, route: &Path<N>) -> Self {
        Self {
            text: received.text.as_str().to_string(),
            ttl: received.ttl,
            kind: received.kind.to_wire(),
            broadcast_ack: received.broadcast_ack,
            data_ack: received.data_ack,
            id: received.id,
            path_index: route.last_index().unwrap_or(0),
            path_length: route.len(),
            path_exists: received.path_exists,
            path: route.iter().map(|hop| hop.octets()).collect(),
            source: received.source.octets(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
