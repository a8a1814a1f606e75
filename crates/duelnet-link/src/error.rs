//! Error types for the reliability layer.

use std::net::SocketAddr;

use duelnet_protocol::{ProtocolError, SeqNum};
use duelnet_transport::TransportError;

/// Errors returned by [`ReliableLink`](crate::ReliableLink) operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The datagram could not be handed to the network.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The message cannot be put on the wire.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// ACKs are never sequenced; send them with `send_unreliable`.
    #[error("ACK messages cannot be sent reliably")]
    AckNotReliable,

    /// The link has been shut down.
    #[error("link is shut down")]
    Shutdown,
}

/// A destination stopped acknowledging: one of its messages went
/// unacknowledged through every permitted retransmission.
///
/// Terminal for that destination. Every pending message to it is
/// discarded when this is raised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("link to {peer} failed: seq {seq} unacknowledged after {retries} retransmissions")]
pub struct LinkFailure {
    /// The unresponsive destination.
    pub peer: SocketAddr,
    /// The oldest message that exhausted its retries.
    pub seq: SeqNum,
    /// Retransmissions attempted for it.
    pub retries: u32,
}
