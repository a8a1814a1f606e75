//! Unified error type for Duelnet.

use duelnet_battle::{BattleError, TurnError};
use duelnet_link::LinkError;
use duelnet_protocol::ProtocolError;
use duelnet_session::{SessionError, SessionState};
use duelnet_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impl, so
/// `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum DuelError {
    /// Binding or using the datagram channel failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A message could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The reliable link refused a send.
    #[error(transparent)]
    Link(#[from] LinkError),

    /// Stats data could not be loaded or a name did not resolve.
    #[error(transparent)]
    Battle(#[from] BattleError),

    /// The turn machine refused a local command.
    #[error(transparent)]
    Turn(#[from] TurnError),

    /// Handshake or setup failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A battle command was issued before the battle started or after the
    /// session closed.
    #[error("no battle in progress (session is {0})")]
    NotBattling(SessionState),

    /// Messages need a peer and none is bound yet.
    #[error("no peer connected")]
    NoPeer,
}
