//! Error types for the session layer.

use std::net::SocketAddr;

use duelnet_battle::BattleError;
use duelnet_protocol::Kind;

use crate::SessionState;

/// Errors that can occur while negotiating a battle.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A name in a SETUP (ours or the peer's) did not resolve. The session
    /// stays where it was.
    #[error(transparent)]
    Battle(#[from] BattleError),

    /// A joiner needs to know where the host is.
    #[error("joiner requires a peer address")]
    MissingPeerAddress,

    /// The message came from someone other than the bound peer.
    #[error("message from {0}, which is not the session peer")]
    ForeignPeer(SocketAddr),

    /// The message kind has no meaning in the current state.
    #[error("{kind} not expected while {state}")]
    Unexpected { kind: Kind, state: SessionState },

    /// The session has ended.
    #[error("session closed")]
    Closed,
}
