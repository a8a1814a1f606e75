//! `Peer` builder and runtime.
//!
//! This is the entry point for playing a Duelnet battle. It ties together
//! all the layers: transport → link → session → battle.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use duelnet_battle::{BattleEvent, Phase, Pokedex, StatsProvider, TurnMachine};
use duelnet_link::{LinkConfig, LinkFailure, ReliableLink};
use duelnet_protocol::Body;
use duelnet_session::{Role, Session, SessionConfig, SessionState};
use duelnet_transport::{DatagramChannel, UdpChannel};
use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::DuelError;
use crate::handler::{self, PARKED_CAPACITY, ParkedQueue};

// ---------------------------------------------------------------------------
// Events and status
// ---------------------------------------------------------------------------

/// Everything the application hears about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// Handshake complete.
    Connected { peer: SocketAddr, seed: u64 },
    /// Both SETUPs resolved.
    BattleStarted {
        own: String,
        opponent: String,
        my_turn: bool,
    },
    /// The peer's SETUP could not be resolved locally.
    SetupRejected { reason: String },
    /// Progress in the battle.
    Battle(BattleEvent),
    Chat { sender: String, text: String },
    /// `data` is base64.
    Sticker { sender: String, data: String },
    Status { text: String },
    /// The peer stopped acknowledging.
    LinkLost(LinkFailure),
    /// The session ended, locally or because the link was lost.
    Closed { reason: String },
}

/// The receiver side of a peer's event stream.
pub type PeerEvents = mpsc::UnboundedReceiver<PeerEvent>;

/// A snapshot for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerStatus {
    pub session: SessionState,
    pub phase: Option<Phase>,
    pub my_turn: bool,
    pub own_hp: u32,
    pub own_max_hp: u32,
    pub peer_hp: Option<u32>,
    pub peer_max_hp: Option<u32>,
    /// Reliable messages not yet acknowledged.
    pub pending: usize,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// State shared by the dispatch task and every `Peer` handle.
///
/// Lock order: `battle` before `session` before `parked`. The dispatch
/// task never holds `session` while taking `battle`.
pub(crate) struct PeerState<C> {
    pub(crate) link: ReliableLink<C>,
    pub(crate) session: Mutex<Session>,
    pub(crate) battle: Mutex<Option<TurnMachine>>,
    pub(crate) parked: Mutex<ParkedQueue>,
    pub(crate) peer_addr: OnceLock<SocketAddr>,
    pub(crate) events: mpsc::UnboundedSender<PeerEvent>,
    pub(crate) cancel: CancellationToken,
    pub(crate) trainer: String,
}

impl<C: DatagramChannel> PeerState<C> {
    pub(crate) fn emit(&self, event: PeerEvent) {
        let _ = self.events.send(event);
    }

    /// Sends `bodies` reliably to the bound peer, in order.
    pub(crate) async fn send_all(&self, bodies: Vec<Body>) {
        if bodies.is_empty() {
            return;
        }
        let Some(&dest) = self.peer_addr.get() else {
            warn!(count = bodies.len(), "no peer bound, dropping outgoing messages");
            return;
        };
        for body in bodies {
            let kind = body.kind();
            if let Err(e) = self.link.send_reliable(dest, body).await {
                warn!(%kind, peer = %dest, error = %e, "send failed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring and starting a [`Peer`].
///
/// # Example
///
/// ```rust,ignore
/// use duelnet::prelude::*;
///
/// let (peer, mut events) = PeerBuilder::new()
///     .bind("0.0.0.0:9999")
///     .role(Role::Host)
///     .pokemon("Pikachu")
///     .moves(["thunderbolt", "tackle"])
///     .build_udp()
///     .await?;
/// ```
pub struct PeerBuilder {
    bind_addr: String,
    peer: Option<SocketAddr>,
    session: SessionConfig,
    link: LinkConfig,
    stats: Option<Arc<dyn StatsProvider>>,
}

impl PeerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "0.0.0.0:0".to_string(),
            peer: None,
            session: SessionConfig::default(),
            link: LinkConfig::default(),
            stats: None,
        }
    }

    /// Sets the local address for [`build_udp`](Self::build_udp).
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// The host's address. Required for a joiner, ignored for a host.
    pub fn peer(mut self, addr: SocketAddr) -> Self {
        self.peer = Some(addr);
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.session.role = role;
        self
    }

    pub fn trainer(mut self, name: impl Into<String>) -> Self {
        self.session.trainer = name.into();
        self
    }

    pub fn pokemon(mut self, name: impl Into<String>) -> Self {
        self.session.pokemon = name.into();
        self
    }

    pub fn moves(mut self, moves: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.session.moves = moves.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the whole session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session = config;
        self
    }

    pub fn link_config(mut self, config: LinkConfig) -> Self {
        self.link = config;
        self
    }

    /// The stats provider. Defaults to [`Pokedex::builtin`].
    pub fn stats(mut self, provider: Arc<dyn StatsProvider>) -> Self {
        self.stats = Some(provider);
        self
    }

    /// Binds a UDP socket and starts the peer on it.
    pub async fn build_udp(self) -> Result<(Peer<UdpChannel>, PeerEvents), DuelError> {
        let channel = UdpChannel::bind(&self.bind_addr).await?;
        self.build(channel).await
    }

    /// Starts the peer on `channel`: resolves our own SETUP, starts the
    /// link and the dispatch task, and, for a joiner, sends the
    /// HANDSHAKE_REQUEST.
    ///
    /// # Errors
    /// [`DuelError::Session`] if our own Pokémon or moves do not resolve, or
    /// a joiner has no peer address.
    pub async fn build<C: DatagramChannel>(
        self,
        channel: C,
    ) -> Result<(Peer<C>, PeerEvents), DuelError> {
        let provider = self
            .stats
            .unwrap_or_else(|| Arc::new(Pokedex::builtin()));
        let trainer = self.session.trainer.clone();
        let mut session = Session::new(self.session, provider)?;
        let opening = session.start(self.peer)?;

        let (link, link_events) = ReliableLink::new(channel, self.link);
        let (events, rx) = mpsc::unbounded_channel();

        let peer_addr = OnceLock::new();
        if let Some(addr) = session.peer_addr() {
            let _ = peer_addr.set(addr);
        }

        let state = Arc::new(PeerState {
            link,
            session: Mutex::new(session),
            battle: Mutex::new(None),
            parked: Mutex::new(ParkedQueue::new(PARKED_CAPACITY)),
            peer_addr,
            events,
            cancel: CancellationToken::new(),
            trainer,
        });

        state.link.start();
        tokio::spawn(handler::run(Arc::clone(&state), link_events));
        state.send_all(opening.outgoing).await;

        info!(addr = %state.link.local_addr(), "peer started");
        Ok((Peer { state }, rx))
    }
}

impl Default for PeerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Peer
// ---------------------------------------------------------------------------

/// A running Duelnet peer.
///
/// Cheap to clone; clones drive the same session.
pub struct Peer<C> {
    state: Arc<PeerState<C>>,
}

impl<C> Clone for Peer<C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<C: DatagramChannel> Peer<C> {
    /// Creates a new builder.
    pub fn builder() -> PeerBuilder {
        PeerBuilder::new()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.state.link.local_addr()
    }

    /// The bound peer, once the handshake has picked one.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.state.peer_addr.get().copied()
    }

    /// The underlying link.
    pub fn link(&self) -> &ReliableLink<C> {
        &self.state.link
    }

    /// Announces an attack with `move_name`.
    ///
    /// # Errors
    /// - [`DuelError::NotBattling`] before the battle starts.
    /// - [`DuelError::Turn`] if it is not our turn, the phase is wrong,
    ///   the match is over, or the move is not in our moveset.
    pub async fn attack(&self, move_name: &str) -> Result<(), DuelError> {
        let mut battle = self.state.battle.lock().await;
        let Some(machine) = battle.as_mut() else {
            let session = self.state.session.lock().await.state();
            return Err(DuelError::NotBattling(session));
        };
        let step = machine.announce_attack(move_name)?;
        handler::apply_battle_step(&self.state, step).await;
        handler::drain_parked(&self.state, machine).await;
        Ok(())
    }

    /// Sends a chat line.
    pub async fn chat(&self, text: &str) -> Result<(), DuelError> {
        self.send(Body::Chat {
            sender: self.state.trainer.clone(),
            text: text.to_string(),
        })
        .await
    }

    /// Sends a sticker. `data` must be standard base64.
    pub async fn sticker(&self, data: impl Into<String>) -> Result<(), DuelError> {
        self.send(Body::Sticker {
            sender: self.state.trainer.clone(),
            data: data.into(),
        })
        .await
    }

    /// Sends a free-form status line.
    pub async fn send_status(&self, text: &str) -> Result<(), DuelError> {
        self.send(Body::Status {
            text: text.to_string(),
        })
        .await
    }

    async fn send(&self, body: Body) -> Result<(), DuelError> {
        let dest = self.peer_addr().ok_or(DuelError::NoPeer)?;
        self.state.link.send_reliable(dest, body).await?;
        Ok(())
    }

    /// The local view of the match.
    pub async fn status(&self) -> PeerStatus {
        let battle = self.state.battle.lock().await;
        let session = self.state.session.lock().await;
        let own = session.own();
        let (phase, my_turn, own_hp) = match battle.as_ref() {
            Some(m) => (Some(m.phase()), m.is_my_turn(), m.state().own.hp()),
            None => (None, false, own.hp()),
        };
        let peer = battle.as_ref().map(|m| &m.state().peer);
        PeerStatus {
            session: session.state(),
            phase,
            my_turn,
            own_hp,
            own_max_hp: own.max_hp(),
            peer_hp: peer.map(|p| p.hp()),
            peer_max_hp: peer.map(|p| p.max_hp()),
            pending: self.state.link.pending_count().await,
        }
    }

    /// Stops the link and the dispatch task and closes the session.
    /// Messages still in flight are abandoned.
    pub async fn shutdown(&self) {
        self.state.cancel.cancel();
        self.state.link.shutdown().await;
        let step = self.state.session.lock().await.close("shut down locally");
        if let Some(step) = step {
            handler::apply_session_step(&self.state, step).await;
        }
    }
}
