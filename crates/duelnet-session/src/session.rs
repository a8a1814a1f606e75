//! The session state machine.
//!
//! A session covers everything before and around the battle itself:
//! binding to exactly one peer, agreeing on a seed, and exchanging and
//! validating SETUP. Like the turn machine it does no I/O; it takes
//! dispatched message bodies and returns the bodies to send back.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use duelnet_battle::{Combatant, Side, StatsProvider, TurnMachine};
use duelnet_link::LinkFailure;
use duelnet_protocol::Body;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{Role, SessionConfig, SessionError};

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Lifecycle of one session.
///
/// ```text
///   Handshaking ──(request / response)──→ Setup ──(peer SETUP ok)──→ Battling
///        │                                  │                           │
///        └──────────────(link failure / close)──────────────────────────┴──→ Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionState {
    /// Host: waiting for a joiner. Joiner: waiting for the host's answer.
    Handshaking,
    /// Bound to a peer; waiting for a SETUP that resolves.
    Setup,
    /// Both combatants known; the turn machine is running.
    Battling,
    /// Terminal.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Handshaking => "handshaking",
            Self::Setup => "setting up",
            Self::Battling => "battling",
            Self::Closed => "closed",
        })
    }
}

// ---------------------------------------------------------------------------
// Step / events
// ---------------------------------------------------------------------------

/// Lifecycle milestones for the application.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Handshake complete.
    Connected { peer: SocketAddr, seed: u64 },
    /// The peer's SETUP resolved. The machine is ready to play.
    BattleReady(Box<TurnMachine>),
    /// The peer's SETUP named something the local stats provider does not
    /// know. The session stays in Setup.
    SetupRejected { reason: String },
    /// The session ended.
    Closed { reason: String },
}

/// The output of one accepted input. Bodies go to the bound peer, reliably,
/// in order.
#[derive(Debug, Clone, Default)]
pub struct SessionStep {
    pub outgoing: Vec<Body>,
    pub events: Vec<SessionEvent>,
}

impl SessionStep {
    fn extend(&mut self, other: SessionStep) {
        self.outgoing.extend(other.outgoing);
        self.events.extend(other.events);
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One peer's side of the handshake and setup exchange.
pub struct Session {
    config: SessionConfig,
    state: SessionState,
    provider: Arc<dyn StatsProvider>,
    own: Combatant,
    peer_addr: Option<SocketAddr>,
    seed: Option<u64>,
    /// Joiner only: a SETUP that overtook the HANDSHAKE_RESPONSE.
    early_setup: Option<Body>,
    peer: Option<Combatant>,
}

impl Session {
    /// Resolves our own Pokémon and moveset against `provider`.
    ///
    /// # Errors
    /// [`SessionError::Battle`] if a name is unknown or the moveset empty.
    pub fn new(
        config: SessionConfig,
        provider: Arc<dyn StatsProvider>,
    ) -> Result<Self, SessionError> {
        let own = Combatant::resolve(
            provider.as_ref(),
            &config.trainer,
            &config.pokemon,
            &config.moves,
        )?;
        Ok(Self {
            config,
            state: SessionState::Handshaking,
            provider,
            own,
            peer_addr: None,
            seed: None,
            early_setup: None,
            peer: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.config.role
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The bound peer, once known.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn own(&self) -> &Combatant {
        &self.own
    }

    /// The peer's resolved combatant, once its SETUP was accepted.
    pub fn peer(&self) -> Option<&Combatant> {
        self.peer.as_ref()
    }

    /// Opens the session. A joiner addresses `peer` with a
    /// HANDSHAKE_REQUEST; a host ignores `peer` and waits.
    ///
    /// # Errors
    /// [`SessionError::MissingPeerAddress`] for a joiner without `peer`.
    pub fn start(&mut self, peer: Option<SocketAddr>) -> Result<SessionStep, SessionError> {
        match self.config.role {
            Role::Host => {
                info!(pokemon = %self.own.pokemon.name, "hosting, waiting for a joiner");
                Ok(SessionStep::default())
            }
            Role::Joiner => {
                let peer = peer.ok_or(SessionError::MissingPeerAddress)?;
                self.peer_addr = Some(peer);
                info!(%peer, pokemon = %self.own.pokemon.name, "requesting handshake");
                Ok(SessionStep {
                    outgoing: vec![Body::HandshakeRequest],
                    events: Vec::new(),
                })
            }
        }
    }

    /// Applies one dispatched message from `from`.
    ///
    /// Turn messages are not handled here.
    ///
    /// # Errors
    /// - [`SessionError::ForeignPeer`] for anyone but the bound peer
    ///   (including later handshake requesters).
    /// - [`SessionError::Unexpected`] for a kind with no meaning now.
    /// - [`SessionError::Closed`] after the session ended.
    pub fn handle(&mut self, from: SocketAddr, body: &Body) -> Result<SessionStep, SessionError> {
        if self.state == SessionState::Closed {
            return Err(SessionError::Closed);
        }

        match self.peer_addr {
            Some(bound) if bound != from => {
                debug!(%from, %bound, kind = %body.kind(), "ignoring foreign peer");
                return Err(SessionError::ForeignPeer(from));
            }
            None if !matches!(body, Body::HandshakeRequest) => {
                return Err(SessionError::ForeignPeer(from));
            }
            _ => {}
        }

        match (self.config.role, self.state, body) {
            (Role::Host, SessionState::Handshaking, Body::HandshakeRequest) => {
                Ok(self.accept_joiner(from))
            }
            (Role::Joiner, SessionState::Handshaking, Body::HandshakeResponse { seed }) => {
                Ok(self.accept_response(from, *seed))
            }
            (Role::Joiner, SessionState::Handshaking, Body::Setup { .. }) => {
                debug!("SETUP arrived before the handshake response, holding it");
                self.early_setup = Some(body.clone());
                Ok(SessionStep::default())
            }
            (_, SessionState::Setup, Body::Setup {
                trainer,
                pokemon,
                moves,
            }) => Ok(self.accept_setup(trainer, pokemon, moves)),
            (Role::Host, _, Body::HandshakeRequest) => {
                // A retransmission with a fresh sequence number, e.g. after
                // the joiner restarted. The session is already bound.
                debug!(%from, "repeat handshake request ignored");
                Ok(SessionStep::default())
            }
            (_, state, body) => Err(SessionError::Unexpected {
                kind: body.kind(),
                state,
            }),
        }
    }

    /// Closes the session if `failure` concerns the bound peer.
    pub fn on_link_failure(&mut self, failure: &LinkFailure) -> Option<SessionStep> {
        if self.peer_addr != Some(failure.peer) {
            return None;
        }
        warn!(peer = %failure.peer, seq = failure.seq, "peer unreachable");
        self.close(failure.to_string())
    }

    /// Ends the session. Returns `None` if it was already closed.
    pub fn close(&mut self, reason: impl Into<String>) -> Option<SessionStep> {
        if self.state == SessionState::Closed {
            return None;
        }
        let reason = reason.into();
        info!(from = %self.state, %reason, "session closed");
        self.state = SessionState::Closed;
        self.early_setup = None;
        Some(SessionStep {
            outgoing: Vec::new(),
            events: vec![SessionEvent::Closed { reason }],
        })
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    fn accept_joiner(&mut self, from: SocketAddr) -> SessionStep {
        let seed = generate_seed();
        self.peer_addr = Some(from);
        self.seed = Some(seed);
        self.state = SessionState::Setup;
        info!(peer = %from, seed, "joiner accepted");

        SessionStep {
            outgoing: vec![Body::HandshakeResponse { seed }, self.setup_body()],
            events: vec![SessionEvent::Connected { peer: from, seed }],
        }
    }

    fn accept_response(&mut self, from: SocketAddr, seed: u64) -> SessionStep {
        self.seed = Some(seed);
        self.state = SessionState::Setup;
        info!(peer = %from, seed, "handshake complete");

        let mut step = SessionStep {
            outgoing: vec![self.setup_body()],
            events: vec![SessionEvent::Connected { peer: from, seed }],
        };
        if let Some(Body::Setup {
            trainer,
            pokemon,
            moves,
        }) = self.early_setup.take()
        {
            step.extend(self.accept_setup(&trainer, &pokemon, &moves));
        }
        step
    }

    fn accept_setup(
        &mut self,
        trainer: &str,
        pokemon: &str,
        moves: &[String],
    ) -> SessionStep {
        let peer = match Combatant::resolve(self.provider.as_ref(), trainer, pokemon, moves) {
            Ok(c) => c,
            Err(e) => {
                warn!(%trainer, %pokemon, error = %e, "peer setup rejected");
                return SessionStep {
                    outgoing: Vec::new(),
                    events: vec![SessionEvent::SetupRejected {
                        reason: e.to_string(),
                    }],
                };
            }
        };
        info!(%trainer, pokemon = %peer.pokemon.name, moves = peer.moves.len(), "peer setup accepted");

        let first = match self.config.role {
            Role::Host => Side::Local,
            Role::Joiner => Side::Peer,
        };
        let machine = TurnMachine::new(self.own.clone(), peer.clone(), first);
        self.peer = Some(peer);
        self.state = SessionState::Battling;

        SessionStep {
            outgoing: Vec::new(),
            events: vec![SessionEvent::BattleReady(Box::new(machine))],
        }
    }

    fn setup_body(&self) -> Body {
        Body::Setup {
            trainer: self.own.trainer.clone(),
            pokemon: self.own.pokemon.name.clone(),
            moves: self.own.moves.iter().map(|m| m.name.clone()).collect(),
        }
    }
}

/// A random seed both peers share after the handshake.
fn generate_seed() -> u64 {
    rand::rng().random()
}
