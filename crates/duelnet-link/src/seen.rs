//! Inbound sequence numbers already dispatched, per remote peer.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;

use duelnet_protocol::SeqNum;

/// Remembers which sequence numbers each peer has already delivered.
///
/// Each sender numbers its own stream, so the same number from two peers
/// means two different messages.
#[derive(Debug, Default)]
pub struct SeenSet {
    peers: HashMap<SocketAddr, HashSet<SeqNum>>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `seq` from `peer` as seen. Returns `true` the first time.
    pub fn insert(&mut self, peer: SocketAddr, seq: SeqNum) -> bool {
        self.peers.entry(peer).or_default().insert(seq)
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, peer: SocketAddr, seq: SeqNum) -> bool {
        self.peers.get(&peer).is_some_and(|s| s.contains(&seq))
    }

    /// Total sequence numbers remembered across all peers.
    pub fn len(&self) -> usize {
        self.peers.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, port))
    }

    #[test]
    fn test_insert_reports_first_sighting_only() {
        let mut seen = SeenSet::new();
        assert!(seen.insert(addr(1), 5));
        assert!(!seen.insert(addr(1), 5));
        assert!(seen.contains(addr(1), 5));
    }

    #[test]
    fn test_scoped_per_peer() {
        let mut seen = SeenSet::new();
        assert!(seen.insert(addr(1), 1));
        assert!(seen.insert(addr(2), 1));
        assert!(!seen.contains(addr(3), 1));
        assert_eq!(seen.len(), 2);
    }
}
