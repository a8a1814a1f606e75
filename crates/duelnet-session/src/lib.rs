//! Session lifecycle for Duelnet.
//!
//! A [`Session`] takes a peer from first contact to a running battle:
//!
//! 1. **Handshake**: the joiner sends HANDSHAKE_REQUEST; the host binds to
//!    the first requester and answers with a random seed.
//! 2. **Setup**: both sides send SETUP; the peer's Pokémon and moves are
//!    resolved against the local [`StatsProvider`](duelnet_battle::StatsProvider).
//! 3. **Battle**: a [`TurnMachine`](duelnet_battle::TurnMachine) is handed
//!    to the caller. The host moves first.
//!
//! A link failure towards the bound peer closes the session.
//!
//! ```text
//! Battle Layer (above)   ← receives the TurnMachine
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Link Layer (below)     ← delivers HANDSHAKE_* and SETUP exactly once
//! ```

mod config;
mod error;
mod session;

pub use config::{Role, SessionConfig};
pub use error::SessionError;
pub use session::{Session, SessionEvent, SessionState, SessionStep};
