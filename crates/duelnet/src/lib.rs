//! # Duelnet
//!
//! Peer-to-peer, turn-based Pokémon battles over unreliable datagrams.
//!
//! Two peers (a host and a joiner) exchange line-framed messages over UDP.
//! The stack, bottom to top:
//!
//! - [`duelnet_transport`]: datagram channels (UDP, in-memory with faults)
//! - [`duelnet_protocol`]: message types and the `key: value` codec
//! - [`duelnet_link`]: sequencing, ACKs, retransmission, duplicate suppression
//! - [`duelnet_session`]: handshake and SETUP exchange
//! - [`duelnet_battle`]: stats, damage formula and the turn state machine
//!
//! This crate wires them into a [`Peer`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use duelnet::prelude::*;
//!
//! # async fn run() -> Result<(), DuelError> {
//! let (peer, mut events) = PeerBuilder::new()
//!     .bind("0.0.0.0:9999")
//!     .role(Role::Host)
//!     .pokemon("Pikachu")
//!     .moves(["thunderbolt", "tackle"])
//!     .build_udp()
//!     .await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let PeerEvent::BattleStarted { my_turn: true, .. } = event {
//!         peer.attack("thunderbolt").await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod handler;
mod peer;

pub use error::DuelError;
pub use peer::{Peer, PeerBuilder, PeerEvent, PeerEvents, PeerStatus};

pub use duelnet_battle;
pub use duelnet_link;
pub use duelnet_protocol;
pub use duelnet_session;
pub use duelnet_transport;

/// Everything needed to run a peer.
pub mod prelude {
    pub use crate::{DuelError, Peer, PeerBuilder, PeerEvent, PeerEvents, PeerStatus};
    pub use duelnet_battle::{
        BattleEvent, MoveData, Phase, Pokedex, PokemonData, Side, StatsProvider,
    };
    pub use duelnet_link::{LinkConfig, LinkFailure};
    pub use duelnet_session::{Role, SessionConfig, SessionState};
    pub use duelnet_transport::{FaultConfig, MemoryChannel, MemoryNetwork, UdpChannel};
}
