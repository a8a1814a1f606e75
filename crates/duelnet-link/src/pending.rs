//! The pending table: reliable messages sent but not yet acknowledged.
//!
//! Each entry is tracked on its own (stop-and-wait per sequence number),
//! so any number may be in flight at once. The table does no I/O. A sweep
//! returns what to resend and which destinations have failed, and the
//! caller does the sending.

use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::time::Duration;

use duelnet_protocol::SeqNum;
use tokio::time::Instant;

use crate::LinkFailure;

// ---------------------------------------------------------------------------
// PendingEntry
// ---------------------------------------------------------------------------

/// One unacknowledged reliable message.
#[derive(Debug, Clone)]
pub struct PendingEntry {
    /// The exact encoded frame. Retransmissions resend these bytes.
    pub bytes: Vec<u8>,
    pub dest: SocketAddr,
    /// Time of the most recent transmission.
    pub sent_at: Instant,
    /// Retransmissions so far (the first send is not counted).
    pub retry_count: u32,
}

/// A frame the sweep wants sent again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retransmit {
    pub seq: SeqNum,
    pub dest: SocketAddr,
    pub bytes: Vec<u8>,
}

/// Result of one sweep.
#[derive(Debug, Default)]
pub struct SweepOutcome {
    pub retransmits: Vec<Retransmit>,
    pub failures: Vec<LinkFailure>,
}

// ---------------------------------------------------------------------------
// PendingTable
// ---------------------------------------------------------------------------

/// Unacknowledged messages keyed by sequence number.
///
/// A `BTreeMap` keeps sweeps in sequence order, so retransmissions go out
/// oldest first and the failure reported for a destination names its
/// oldest stuck message.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: BTreeMap<SeqNum, PendingEntry>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a freshly transmitted message.
    pub fn insert(
        &mut self,
        seq: SeqNum,
        dest: SocketAddr,
        bytes: Vec<u8>,
        now: Instant,
    ) {
        self.entries.insert(
            seq,
            PendingEntry {
                bytes,
                dest,
                sent_at: now,
                retry_count: 0,
            },
        );
    }

    /// Removes the entry for `seq`. Returns `false` if there was none,
    /// which is normal for duplicate or stale ACKs.
    pub fn ack(&mut self, seq: SeqNum) -> bool {
        self.entries.remove(&seq).is_some()
    }

    #[cfg(test)]
    pub(crate) fn get(&self, seq: SeqNum) -> Option<&PendingEntry> {
        self.entries.get(&seq)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Re-examines every entry at time `now`.
    ///
    /// An entry older than `timeout` is due. A due entry with retries left
    /// is scheduled for retransmission with `sent_at` reset and its retry
    /// count bumped. A due entry with no retries left fails its destination:
    /// one [`LinkFailure`] is reported per destination and every entry for
    /// that destination is discarded.
    pub fn sweep(
        &mut self,
        now: Instant,
        timeout: Duration,
        max_retries: u32,
    ) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();
        let mut failed: HashSet<SocketAddr> = HashSet::new();

        for (&seq, entry) in self.entries.iter_mut() {
            if failed.contains(&entry.dest) {
                continue;
            }
            if now.saturating_duration_since(entry.sent_at) < timeout {
                continue;
            }
            if entry.retry_count >= max_retries {
                failed.insert(entry.dest);
                outcome.failures.push(LinkFailure {
                    peer: entry.dest,
                    seq,
                    retries: entry.retry_count,
                });
                continue;
            }
            entry.retry_count += 1;
            entry.sent_at = now;
            outcome.retransmits.push(Retransmit {
                seq,
                dest: entry.dest,
                bytes: entry.bytes.clone(),
            });
        }

        if !failed.is_empty() {
            self.entries.retain(|_, e| !failed.contains(&e.dest));
            outcome.retransmits.retain(|r| !failed.contains(&r.dest));
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(500);

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, port))
    }

    #[test]
    fn test_sweep_ignores_young_entries() {
        let t0 = Instant::now();
        let mut table = PendingTable::new();
        table.insert(1, addr(1), b"one".to_vec(), t0);

        let out = table.sweep(t0 + Duration::from_millis(499), TIMEOUT, 3);
        assert!(out.retransmits.is_empty());
        assert!(out.failures.is_empty());
        assert_eq!(table.get(1).map(|e| e.retry_count), Some(0));
    }

    #[test]
    fn test_sweep_retransmits_identical_bytes_and_resets_timer() {
        let t0 = Instant::now();
        let mut table = PendingTable::new();
        table.insert(7, addr(1), b"frame".to_vec(), t0);

        let t1 = t0 + TIMEOUT;
        let out = table.sweep(t1, TIMEOUT, 3);
        assert_eq!(
            out.retransmits,
            vec![Retransmit {
                seq: 7,
                dest: addr(1),
                bytes: b"frame".to_vec()
            }]
        );
        let entry = table.get(7).unwrap();
        assert_eq!(entry.retry_count, 1);
        assert_eq!(entry.sent_at, t1);

        // Not due again until another full timeout passes.
        assert!(table.sweep(t1 + Duration::from_millis(10), TIMEOUT, 3)
            .retransmits
            .is_empty());
    }

    #[test]
    fn test_sweep_fails_destination_after_max_retries() {
        let mut now = Instant::now();
        let mut table = PendingTable::new();
        table.insert(1, addr(1), b"a".to_vec(), now);

        for _ in 0..2 {
            now += TIMEOUT;
            assert_eq!(table.sweep(now, TIMEOUT, 2).retransmits.len(), 1);
        }
        now += TIMEOUT;
        let out = table.sweep(now, TIMEOUT, 2);
        assert!(out.retransmits.is_empty());
        assert_eq!(
            out.failures,
            vec![LinkFailure {
                peer: addr(1),
                seq: 1,
                retries: 2
            }]
        );
        assert!(table.is_empty());
    }

    #[test]
    fn test_failure_discards_every_entry_for_destination_only() {
        let t0 = Instant::now();
        let mut table = PendingTable::new();
        table.insert(1, addr(1), b"old".to_vec(), t0);
        table.insert(2, addr(2), b"other peer".to_vec(), t0);
        table.insert(3, addr(1), b"newer".to_vec(), t0 + TIMEOUT);

        let out = table.sweep(t0 + TIMEOUT, TIMEOUT, 0);

        assert_eq!(out.failures.len(), 2);
        assert_eq!(out.failures[0].seq, 1);
        assert_eq!(out.failures[1].seq, 2);
        assert!(out.retransmits.is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn test_failure_leaves_other_destinations_pending() {
        let t0 = Instant::now();
        let mut table = PendingTable::new();
        table.insert(1, addr(1), b"doomed".to_vec(), t0);
        table.insert(2, addr(2), b"fine".to_vec(), t0 + TIMEOUT);

        let out = table.sweep(t0 + TIMEOUT, TIMEOUT, 0);
        assert_eq!(out.failures.len(), 1);
        assert_eq!(table.len(), 1);
        assert!(table.get(2).is_some());
    }

    #[test]
    fn test_ack_is_idempotent() {
        let mut table = PendingTable::new();
        table.insert(4, addr(1), b"x".to_vec(), Instant::now());
        assert!(table.ack(4));
        assert!(!table.ack(4));
        assert!(!table.ack(999));
        assert!(table.is_empty());
    }
}
