//! In-memory datagram network for tests and local play.
//!
//! A [`MemoryNetwork`] hands out [`MemoryChannel`] endpoints with synthetic
//! loopback addresses. Each endpoint applies its own [`FaultConfig`] to the
//! datagrams it sends, so the two directions of a conversation can be made
//! independently lossy.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};

use rand::Rng;
use tokio::sync::{Mutex, mpsc};

use crate::{DatagramChannel, TransportError};

type Datagram = (Vec<u8>, SocketAddr);

/// Fault model applied to outbound datagrams.
///
/// Rates are probabilities in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FaultConfig {
    /// Probability that a datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a surviving datagram is delivered twice.
    pub duplicate_rate: f64,
}

impl FaultConfig {
    /// A perfect link: nothing lost, nothing duplicated.
    pub fn none() -> Self {
        Self::default()
    }

    /// Drops every datagram with probability `loss_rate`.
    pub fn lossy(loss_rate: f64) -> Self {
        Self {
            loss_rate,
            ..Self::default()
        }
    }

    /// Clamps both rates into `0.0..=1.0`.
    pub fn validated(mut self) -> Self {
        self.loss_rate = clamp_rate(self.loss_rate);
        self.duplicate_rate = clamp_rate(self.duplicate_rate);
        self
    }
}

fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) }
}

/// Counters for one endpoint's outbound traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Datagrams passed to `send_to`.
    pub sent: u64,
    /// Datagrams discarded by the fault model.
    pub dropped: u64,
    /// Extra copies injected by the fault model.
    pub duplicated: u64,
}

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    dropped: AtomicU64,
    duplicated: AtomicU64,
}

/// A shared in-process "network" connecting [`MemoryChannel`]s.
///
/// Cheap to clone; all clones refer to the same routing table.
#[derive(Clone)]
pub struct MemoryNetwork {
    routes: Arc<Mutex<HashMap<SocketAddr, mpsc::UnboundedSender<Datagram>>>>,
    next_port: Arc<AtomicU16>,
}

impl MemoryNetwork {
    /// Creates an empty network.
    pub fn new() -> Self {
        Self {
            routes: Arc::new(Mutex::new(HashMap::new())),
            next_port: Arc::new(AtomicU16::new(40_000)),
        }
    }

    /// Attaches a new endpoint with its own outbound fault model.
    pub async fn bind(&self, faults: FaultConfig) -> MemoryChannel {
        let port = self.next_port.fetch_add(1, Ordering::Relaxed);
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.lock().await.insert(addr, tx);
        tracing::debug!(%addr, ?faults, "memory endpoint bound");

        MemoryChannel {
            addr,
            network: self.clone(),
            inbox: Mutex::new(rx),
            faults: faults.validated(),
            counters: Counters::default(),
        }
    }

    async fn deliver(&self, to: SocketAddr, datagram: Datagram) {
        // Unknown destinations swallow the datagram, as UDP would.
        if let Some(route) = self.routes.lock().await.get(&to) {
            let _ = route.send(datagram);
        }
    }

    async fn detach(&self, addr: SocketAddr) {
        self.routes.lock().await.remove(&addr);
    }
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// One endpoint on a [`MemoryNetwork`].
pub struct MemoryChannel {
    addr: SocketAddr,
    network: MemoryNetwork,
    inbox: Mutex<mpsc::UnboundedReceiver<Datagram>>,
    faults: FaultConfig,
    counters: Counters,
}

impl MemoryChannel {
    /// Snapshot of this endpoint's outbound counters.
    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            sent: self.counters.sent.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            duplicated: self.counters.duplicated.load(Ordering::Relaxed),
        }
    }

    /// Removes this endpoint from the network. Later datagrams addressed
    /// to it are discarded.
    pub async fn close(&self) {
        self.network.detach(self.addr).await;
    }

    /// Rolls the fault dice for one datagram: how many copies go out.
    fn copies(&self) -> usize {
        let mut rng = rand::rng();
        if rng.random_bool(self.faults.loss_rate) {
            return 0;
        }
        if rng.random_bool(self.faults.duplicate_rate) { 2 } else { 1 }
    }
}

impl DatagramChannel for MemoryChannel {
    async fn send_to(
        &self,
        addr: SocketAddr,
        data: &[u8],
    ) -> Result<(), TransportError> {
        self.counters.sent.fetch_add(1, Ordering::Relaxed);
        let copies = self.copies();
        match copies {
            0 => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(from = %self.addr, to = %addr, "datagram dropped");
            }
            2 => {
                self.counters.duplicated.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
        for _ in 0..copies {
            self.network.deliver(addr, (data.to_vec(), self.addr)).await;
        }
        Ok(())
    }

    async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        self.inbox
            .lock()
            .await
            .recv()
            .await
            .ok_or(TransportError::Closed)
    }

    fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}
