//! Dispatch task: routes delivered messages to the session, the turn
//! machine or the application.
//!
//! The flow for each delivered message is:
//!   1. HANDSHAKE_* / SETUP → session
//!   2. anything else from a sender other than the bound peer → dropped
//!   3. turn messages → turn machine (or the parked queue)
//!   4. CHAT / STICKER / STATUS → application events
//!
//! Turn messages can overtake each other across the two directions (the
//! peer's next ATTACK_ANNOUNCE may arrive before the CALCULATION_CONFIRM
//! that ends the current turn). A message the machine refuses as merely
//! early is parked and re-offered after every accepted transition.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use duelnet_battle::{BattleEvent, Step, TurnMachine};
use duelnet_link::{LinkEvent, LinkEvents};
use duelnet_protocol::{Body, Kind};
use duelnet_session::{SessionEvent, SessionStep};
use duelnet_transport::DatagramChannel;
use tracing::{debug, info, trace, warn};

use crate::peer::{PeerEvent, PeerState};

/// How many early turn messages are held at most.
pub(crate) const PARKED_CAPACITY: usize = 8;

// ---------------------------------------------------------------------------
// ParkedQueue
// ---------------------------------------------------------------------------

/// Turn messages waiting for a phase in which they make sense. Oldest
/// first; when full, the oldest is evicted.
pub(crate) struct ParkedQueue {
    items: VecDeque<Body>,
    capacity: usize,
}

impl ParkedQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `body`. Returns the evicted entry if the queue was full.
    pub(crate) fn push(&mut self, body: Body) -> Option<Body> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(body);
        evicted
    }

    /// Removes and returns everything, oldest first.
    pub(crate) fn take(&mut self) -> VecDeque<Body> {
        std::mem::take(&mut self.items)
    }

    /// Puts back entries taken with [`take`](Self::take) ahead of anything
    /// parked since.
    pub(crate) fn restore(&mut self, mut items: VecDeque<Body>) {
        items.append(&mut self.items);
        items.truncate(self.capacity);
        self.items = items;
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }
}

// ---------------------------------------------------------------------------
// Dispatch loop
// ---------------------------------------------------------------------------

/// Consumes link events until cancelled or the link is lost.
pub(crate) async fn run<C: DatagramChannel>(state: Arc<PeerState<C>>, mut link_events: LinkEvents) {
    loop {
        let event = tokio::select! {
            _ = state.cancel.cancelled() => break,
            e = link_events.recv() => match e {
                Some(e) => e,
                None => break,
            },
        };

        match event {
            LinkEvent::Delivered { from, message } => {
                dispatch(&state, from, message.body).await;
            }
            LinkEvent::Failed(failure) => {
                let step = state.session.lock().await.on_link_failure(&failure);
                if let Some(step) = step {
                    state.cancel.cancel();
                    state.link.shutdown().await;
                    state.emit(PeerEvent::LinkLost(failure));
                    apply_session_step(&state, step).await;
                    break;
                }
            }
        }
    }
    trace!("dispatch loop stopped");
}

async fn dispatch<C: DatagramChannel>(state: &PeerState<C>, from: SocketAddr, body: Body) {
    let kind = body.kind();
    match kind {
        Kind::HandshakeRequest | Kind::HandshakeResponse | Kind::Setup => {
            on_session_message(state, from, &body).await;
        }
        _ if state.peer_addr.get() != Some(&from) => {
            debug!(%from, %kind, "ignoring message from unbound sender");
        }
        k if k.is_turn_message() => offer_turn(state, body).await,
        _ => match body {
            Body::Chat { sender, text } => state.emit(PeerEvent::Chat { sender, text }),
            Body::Sticker { sender, data } => {
                debug!(%sender, bytes = data.len(), "sticker received");
                state.emit(PeerEvent::Sticker { sender, data });
            }
            Body::Status { text } => state.emit(PeerEvent::Status { text }),
            Body::Unknown { tag, .. } => debug!(%tag, "ignoring unknown message kind"),
            _ => trace!(%kind, "nothing to do"),
        },
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

async fn on_session_message<C: DatagramChannel>(
    state: &PeerState<C>,
    from: SocketAddr,
    body: &Body,
) {
    // The session lock is released before the step is applied, which
    // may take the battle lock.
    let result = state.session.lock().await.handle(from, body);
    match result {
        Ok(step) => apply_session_step(state, step).await,
        Err(e) => debug!(%from, kind = %body.kind(), error = %e, "session message rejected"),
    }
}

/// Publishes a session step: binds the peer, sends, then starts the
/// battle if it is ready.
pub(crate) async fn apply_session_step<C: DatagramChannel>(state: &PeerState<C>, step: SessionStep) {
    let mut ready = None;
    for event in step.events {
        match event {
            SessionEvent::Connected { peer, seed } => {
                let _ = state.peer_addr.set(peer);
                state.emit(PeerEvent::Connected { peer, seed });
            }
            SessionEvent::BattleReady(machine) => ready = Some(machine),
            SessionEvent::SetupRejected { reason } => {
                state.emit(PeerEvent::SetupRejected { reason });
            }
            SessionEvent::Closed { reason } => state.emit(PeerEvent::Closed { reason }),
        }
    }

    state.send_all(step.outgoing).await;

    if let Some(machine) = ready {
        let mut battle = state.battle.lock().await;
        let s = machine.state();
        state.emit(PeerEvent::BattleStarted {
            own: s.own.pokemon.name.clone(),
            opponent: s.peer.pokemon.name.clone(),
            my_turn: machine.is_my_turn(),
        });
        let machine = battle.insert(*machine);
        drain_parked(state, machine).await;
    }
}

// ---------------------------------------------------------------------------
// Battle
// ---------------------------------------------------------------------------

async fn offer_turn<C: DatagramChannel>(state: &PeerState<C>, body: Body) {
    let mut battle = state.battle.lock().await;
    let Some(machine) = battle.as_mut() else {
        park(state, body).await;
        return;
    };

    match machine.handle(&body) {
        Ok(step) => {
            apply_battle_step(state, step).await;
            drain_parked(state, machine).await;
        }
        Err(e) if e.is_retryable() => park(state, body).await,
        Err(e) => debug!(kind = %body.kind(), error = %e, "turn message rejected"),
    }
}

async fn park<C: DatagramChannel>(state: &PeerState<C>, body: Body) {
    let kind = body.kind();
    let evicted = state.parked.lock().await.push(body);
    debug!(%kind, "parked early turn message");
    if let Some(old) = evicted {
        warn!(kind = %old.kind(), "parked queue full, dropping oldest");
    }
}

/// Sends a step's bodies and publishes its events.
pub(crate) async fn apply_battle_step<C: DatagramChannel>(state: &PeerState<C>, step: Step) {
    state.send_all(step.outgoing).await;
    for event in step.events {
        if let BattleEvent::MatchOver { winner } = &event {
            info!(?winner, "match over");
        }
        state.emit(PeerEvent::Battle(event));
    }
}

/// Re-offers parked messages until a full pass accepts none of them.
pub(crate) async fn drain_parked<C: DatagramChannel>(state: &PeerState<C>, machine: &mut TurnMachine) {
    loop {
        let waiting = state.parked.lock().await.take();
        if waiting.is_empty() {
            return;
        }

        let mut progressed = false;
        let mut still_waiting = VecDeque::new();
        for body in waiting {
            match machine.handle(&body) {
                Ok(step) => {
                    trace!(kind = %body.kind(), "parked message accepted");
                    progressed = true;
                    apply_battle_step(state, step).await;
                }
                Err(e) if e.is_retryable() => still_waiting.push_back(body),
                Err(e) => debug!(kind = %body.kind(), error = %e, "dropping parked message"),
            }
        }
        state.parked.lock().await.restore(still_waiting);

        if !progressed {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(n: usize) -> Body {
        Body::Status {
            text: n.to_string(),
        }
    }

    #[test]
    fn test_push_evicts_oldest_when_full() {
        let mut q = ParkedQueue::new(2);
        assert!(q.push(status(1)).is_none());
        assert!(q.push(status(2)).is_none());
        assert_eq!(q.push(status(3)), Some(status(1)));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_take_and_restore_keep_order() {
        let mut q = ParkedQueue::new(PARKED_CAPACITY);
        q.push(status(1));
        q.push(status(2));

        let taken = q.take();
        assert_eq!(q.len(), 0);
        q.push(status(3));
        q.restore(taken);

        let all: Vec<_> = q.take().into_iter().collect();
        assert_eq!(all, vec![status(1), status(2), status(3)]);
    }

    #[test]
    fn test_restore_respects_capacity() {
        let mut q = ParkedQueue::new(2);
        q.push(status(1));
        q.push(status(2));
        let taken = q.take();
        q.push(status(3));
        q.restore(taken);
        assert_eq!(q.len(), 2);
    }
}
