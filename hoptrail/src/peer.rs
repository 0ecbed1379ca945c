//! Secure link setup against the transport's peer table.
//!
//! A neighbor must be in the peer table before unicast frames can reach it, and
//! every unicast link is encrypted with the node's local master key. New peers
//! are registered plain first and then switched to encryption, which mirrors how
//! radio peer tables accept key changes only through a remove and re-add.

use log::{debug, trace};

use crate::traits::Transport;
use crate::types::{LinkKey, MacAddr, PeerInfo};

/// What [`ensure_secure_link`] had to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkSetup {
    /// Peer was already present and encrypted.
    Existing,
    /// Peer was missing; added and switched to encryption.
    Added,
    /// Peer was present but unencrypted; switched to encryption.
    Upgraded,
    /// Broadcast address: no peer entry and no encryption.
    Broadcast,
}

/// Make sure `addr` is in the peer table with encryption on.
///
/// Idempotent: calling it for an already secured peer touches nothing.
pub fn ensure_secure_link<T: Transport>(
    transport: &T,
    addr: &MacAddr,
    lmk: &LinkKey,
) -> Result<LinkSetup, T::Error> {
    if addr.is_broadcast() {
        return Ok(LinkSetup::Broadcast);
    }

    match transport.peer(addr) {
        Some(info) if info.encrypt => {
            trace!("peer {} already secured", addr);
            Ok(LinkSetup::Existing)
        }
        Some(_) => {
            switch_to_encryption(transport, addr, lmk)?;
            debug!("peer {} switched to encryption", addr);
            Ok(LinkSetup::Upgraded)
        }
        None => {
            transport.add_peer(&PeerInfo::plain(*addr))?;
            switch_to_encryption(transport, addr, lmk)?;
            debug!("peer {} added with encryption", addr);
            Ok(LinkSetup::Added)
        }
    }
}

fn switch_to_encryption<T: Transport>(
    transport: &T,
    addr: &MacAddr,
    lmk: &LinkKey,
) -> Result<(), T::Error> {
    transport.remove_peer(addr)?;
    transport.add_peer(&PeerInfo::encrypted(*addr, *lmk))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::test_impls::MockTransport;
    use crate::types::BROADCAST_ADDR;

    fn key() -> LinkKey {
        LinkKey(*b"LMK@ESP32_123456")
    }

    #[test]
    fn test_adds_missing_peer_encrypted() {
        let t = MockTransport::new();
        let addr = MacAddr([7; 6]);
        assert_eq!(ensure_secure_link(&t, &addr, &key()), Ok(LinkSetup::Added));

        let info = t.peer(&addr).unwrap();
        assert!(info.encrypt);
        assert_eq!(info.lmk, Some(key()));
        assert_eq!(t.peers().len(), 1);
    }

    #[test]
    fn test_upgrades_plain_peer() {
        let addr = MacAddr([7; 6]);
        let t = MockTransport::with_peers(&[addr]);
        assert_eq!(ensure_secure_link(&t, &addr, &key()), Ok(LinkSetup::Upgraded));
        assert!(t.peer(&addr).unwrap().encrypt);
        assert_eq!(t.peers().len(), 1);
    }

    #[test]
    fn test_idempotent() {
        let t = MockTransport::new();
        let addr = MacAddr([7; 6]);
        ensure_secure_link(&t, &addr, &key()).unwrap();
        let ops = t.peer_ops();

        assert_eq!(ensure_secure_link(&t, &addr, &key()), Ok(LinkSetup::Existing));
        assert_eq!(t.peer_ops(), ops);
    }

    #[test]
    fn test_broadcast_untouched() {
        let t = MockTransport::new();
        assert_eq!(
            ensure_secure_link(&t, &BROADCAST_ADDR, &key()),
            Ok(LinkSetup::Broadcast)
        );
        assert!(t.peers().is_empty());
    }
}
