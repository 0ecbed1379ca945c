//! Link layer emulated over UDP.
//!
//! Each datagram is the sender's 6-byte link address followed by one frame, so
//! the receiver learns the neighbor address the way a radio receive callback
//! would. Broadcast goes to every configured neighbor endpoint.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use hoptrail::{MacAddr, PeerInfo, Transport, MAC_SIZE};
use log::{trace, warn};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::UdpSocket;

/// Largest datagram accepted from the socket.
pub const MAX_DATAGRAM: usize = 512;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("{0} is not in the peer table")]
    UnknownPeer(MacAddr),
    #[error("no UDP endpoint configured for {0}")]
    NoEndpoint(MacAddr),
    #[error("socket: {0}")]
    Io(#[from] std::io::Error),
}

/// Prefix `frame` with the sender address.
pub fn encode_datagram(from: &MacAddr, frame: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MAC_SIZE + frame.len());
    buf.extend_from_slice(&from.octets());
    buf.extend_from_slice(frame);
    buf
}

/// Split a datagram into sender address and frame. `None` for runts.
pub fn decode_datagram(buf: &[u8]) -> Option<(MacAddr, &[u8])> {
    if buf.len() <= MAC_SIZE {
        return None;
    }
    let (addr, frame) = buf.split_at(MAC_SIZE);
    let addr: [u8; MAC_SIZE] = addr.try_into().ok()?;
    Some((MacAddr::new(addr), frame))
}

pub struct UdpTransport {
    local: MacAddr,
    socket: Arc<UdpSocket>,
    neighbors: HashMap<MacAddr, SocketAddr>,
    peers: Mutex<HashMap<MacAddr, PeerInfo>>,
}

impl UdpTransport {
    pub fn new(
        local: MacAddr,
        socket: Arc<UdpSocket>,
        neighbors: HashMap<MacAddr, SocketAddr>,
    ) -> Self {
        Self {
            local,
            socket,
            neighbors,
            peers: Mutex::new(HashMap::new()),
        }
    }

    fn send_to(&self, endpoint: SocketAddr, datagram: &[u8]) -> Result<(), LinkError> {
        self.socket.try_send_to(datagram, endpoint)?;
        Ok(())
    }
}

impl Transport for UdpTransport {
    type Error = LinkError;

    fn send(&self, to: &MacAddr, frame: &[u8]) -> Result<(), Self::Error> {
        let datagram = encode_datagram(&self.local, frame);

        if to.is_broadcast() {
            let mut first_err = None;
            for (addr, endpoint) in &self.neighbors {
                trace!("broadcast copy to {} at {}", addr, endpoint);
                if let Err(e) = self.send_to(*endpoint, &datagram) {
                    warn!("broadcast copy to {} at {} failed: {}", addr, endpoint, e);
                    first_err.get_or_insert(e);
                }
            }
            return first_err.map_or(Ok(()), Err);
        }

        if !self.peers.lock().contains_key(to) {
            return Err(LinkError::UnknownPeer(*to));
        }
        let endpoint = self
            .neighbors
            .get(to)
            .copied()
            .ok_or(LinkError::NoEndpoint(*to))?;
        self.send_to(endpoint, &datagram)
    }

    fn peer(&self, addr: &MacAddr) -> Option<PeerInfo> {
        self.peers.lock().get(addr).copied()
    }

    fn add_peer(&self, info: &PeerInfo) -> Result<(), Self::Error> {
        self.peers.lock().insert(info.addr, *info);
        Ok(())
    }

    fn remove_peer(&self, addr: &MacAddr) -> Result<(), Self::Error> {
        self.peers
            .lock()
            .remove(addr)
            .map(|_| ())
            .ok_or(LinkError::UnknownPeer(*addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoptrail::BROADCAST_ADDR;

    fn mac(n: u8) -> MacAddr {
        MacAddr::new([0x24, 0xDC, 0xC3, 0, 0, n])
    }

    #[test]
    fn test_datagram_header() {
        let datagram = encode_datagram(&mac(7), &[1, 2, 3]);
        assert_eq!(datagram.len(), MAC_SIZE + 3);

        let (from, frame) = decode_datagram(&datagram).unwrap();
        assert_eq!(from, mac(7));
        assert_eq!(frame, &[1, 2, 3]);

        assert!(decode_datagram(&datagram[..MAC_SIZE]).is_none());
    }

    async fn bound() -> Arc<UdpSocket> {
        Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap())
    }

    #[tokio::test]
    async fn test_unicast_requires_peer_entry() {
        let local = bound().await;
        let remote = bound().await;
        let neighbors = HashMap::from([(mac(2), remote.local_addr().unwrap())]);
        let transport = UdpTransport::new(mac(1), local, neighbors);

        assert!(matches!(
            transport.send(&mac(2), &[9]),
            Err(LinkError::UnknownPeer(_))
        ));

        transport.add_peer(&PeerInfo::plain(mac(2))).unwrap();
        transport.send(&mac(2), &[9, 9]).unwrap();

        let mut buf = [0u8; MAX_DATAGRAM];
        let (len, _) = remote.recv_from(&mut buf).await.unwrap();
        let (from, frame) = decode_datagram(&buf[..len]).unwrap();
        assert_eq!(from, mac(1));
        assert_eq!(frame, &[9, 9]);
    }

    #[tokio::test]
    async fn test_peer_without_endpoint() {
        let transport = UdpTransport::new(mac(1), bound().await, HashMap::new());
        transport.add_peer(&PeerInfo::plain(mac(3))).unwrap();
        assert!(matches!(
            transport.send(&mac(3), &[1]),
            Err(LinkError::NoEndpoint(_))
        ));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_neighbor() {
        let a = bound().await;
        let b = bound().await;
        let neighbors = HashMap::from([
            (mac(2), a.local_addr().unwrap()),
            (mac(3), b.local_addr().unwrap()),
        ]);
        let transport = UdpTransport::new(mac(1), bound().await, neighbors);

        transport.send(&BROADCAST_ADDR, &[5]).unwrap();

        let mut buf = [0u8; MAX_DATAGRAM];
        for socket in [&a, &b] {
            let (len, _) = socket.recv_from(&mut buf).await.unwrap();
            assert_eq!(decode_datagram(&buf[..len]).map(|(f, _)| f), Some(mac(1)));
        }
    }

    #[tokio::test]
    async fn test_broadcast_continues_past_failed_endpoint() {
        let good = bound().await;
        // An IPv6 endpoint cannot be reached from an IPv4 socket.
        let neighbors = HashMap::from([
            (mac(2), "[::1]:9".parse().unwrap()),
            (mac(3), good.local_addr().unwrap()),
        ]);
        let transport = UdpTransport::new(mac(1), bound().await, neighbors);

        assert!(matches!(
            transport.send(&BROADCAST_ADDR, &[5]),
            Err(LinkError::Io(_))
        ));

        let mut buf = [0u8; MAX_DATAGRAM];
        let (len, _) = good.recv_from(&mut buf).await.unwrap();
        assert_eq!(decode_datagram(&buf[..len]).map(|(f, _)| f), Some(mac(1)));
    }

    #[tokio::test]
    async fn test_remove_unknown_peer() {
        let transport = UdpTransport::new(mac(1), bound().await, HashMap::new());
        assert!(transport.remove_peer(&mac(2)).is_err());
        transport.add_peer(&PeerInfo::plain(mac(2))).unwrap();
        assert!(transport.remove_peer(&mac(2)).is_ok());
        assert!(transport.peer(&mac(2)).is_none());
    }
}
