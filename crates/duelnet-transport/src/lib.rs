//! Datagram transport layer for Duelnet.
//!
//! Provides the [`DatagramChannel`] trait that the reliability layer sits
//! on. A channel moves whole datagrams between socket addresses and makes
//! no promises at all: datagrams may be lost, duplicated, or reordered.
//!
//! # Implementations
//!
//! - [`UdpChannel`]: a real UDP socket (`udp` feature, default)
//! - [`MemoryNetwork`] / [`MemoryChannel`]: an in-process network with
//!   configurable loss and duplication, for tests and local play

mod error;
mod memory;
#[cfg(feature = "udp")]
mod udp;

pub use error::TransportError;
pub use memory::{ChannelStats, FaultConfig, MemoryChannel, MemoryNetwork};
#[cfg(feature = "udp")]
pub use udp::UdpChannel;

use std::future::Future;
use std::net::SocketAddr;

/// Largest datagram any channel will hand upward.
pub const MAX_DATAGRAM: usize = 65_535;

/// An unreliable, unordered datagram channel.
///
/// The returned futures are `Send` so the channel can be driven from
/// spawned Tokio tasks.
pub trait DatagramChannel: Send + Sync + 'static {
    /// Sends one datagram to `addr`.
    ///
    /// Success means the datagram was handed to the network, not that it
    /// arrived.
    fn send_to(
        &self,
        addr: SocketAddr,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Waits for the next datagram and returns it with its sender.
    fn recv_from(
        &self,
    ) -> impl Future<Output = Result<(Vec<u8>, SocketAddr), TransportError>> + Send;

    /// The address peers use to reach this channel.
    fn local_addr(&self) -> SocketAddr;
}
