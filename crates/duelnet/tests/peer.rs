//! Integration tests for full peers talking over the in-memory network.
//!
//! Everything runs on Tokio's paused clock, so retransmission timeouts and
//! link failure detection take no wall time.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use duelnet::duelnet_battle::TurnError;
use duelnet::duelnet_link::LinkError;
use duelnet::duelnet_transport::{DatagramChannel, TransportError};
use duelnet::prelude::*;

// =========================================================================
// Helpers
// =========================================================================

type TestPeer = Peer<MemoryChannel>;

fn patient_link() -> LinkConfig {
    LinkConfig {
        max_retries: 30,
        ..LinkConfig::default()
    }
}

async fn host_on(net: &MemoryNetwork, faults: FaultConfig) -> (TestPeer, PeerEvents) {
    PeerBuilder::new()
        .role(Role::Host)
        .trainer("Red")
        .pokemon("Pikachu")
        .moves(["thunderbolt", "tackle"])
        .link_config(patient_link())
        .build(net.bind(faults).await)
        .await
        .expect("host should start")
}

async fn joiner_on(
    net: &MemoryNetwork,
    faults: FaultConfig,
    host: SocketAddr,
) -> (TestPeer, PeerEvents) {
    PeerBuilder::new()
        .role(Role::Joiner)
        .peer(host)
        .trainer("Blue")
        .pokemon("Eevee")
        .moves(["tackle"])
        .link_config(patient_link())
        .build(net.bind(faults).await)
        .await
        .expect("joiner should start")
}

/// A memory channel that can be told to fail its next send.
struct FlakyChannel {
    inner: MemoryChannel,
    fail_next: AtomicBool,
}

impl FlakyChannel {
    fn fail_next_send(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl DatagramChannel for FlakyChannel {
    async fn send_to(&self, addr: SocketAddr, data: &[u8]) -> Result<(), TransportError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(TransportError::SendFailed(io::Error::other("interface down")));
        }
        self.inner.send_to(addr, data).await
    }

    async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        self.inner.recv_from().await
    }

    fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr()
    }
}

/// Waits for the first event matching `pred`, skipping the rest.
async fn wait_for(events: &mut PeerEvents, pred: impl Fn(&PeerEvent) -> bool) -> PeerEvent {
    let found = tokio::time::timeout(Duration::from_secs(60), async {
        while let Some(event) = events.recv().await {
            if pred(&event) {
                return Some(event);
            }
        }
        None
    })
    .await;
    match found {
        Ok(Some(event)) => event,
        other => panic!("expected event never arrived: {other:?}"),
    }
}

async fn battling_pair(faults: FaultConfig) -> ((TestPeer, PeerEvents), (TestPeer, PeerEvents)) {
    let net = MemoryNetwork::new();
    let (host, mut host_events) = host_on(&net, faults).await;
    let (joiner, mut joiner_events) = joiner_on(&net, faults, host.local_addr()).await;
    wait_for(&mut host_events, |e| matches!(e, PeerEvent::BattleStarted { .. })).await;
    wait_for(&mut joiner_events, |e| matches!(e, PeerEvent::BattleStarted { .. })).await;
    ((host, host_events), (joiner, joiner_events))
}

/// Attacks whenever it is our turn until the match ends.
async fn play(peer: TestPeer, mut events: PeerEvents, mv: &'static str) -> (Side, PeerEvents) {
    while let Some(event) = events.recv().await {
        match event {
            PeerEvent::BattleStarted { my_turn: true, .. }
            | PeerEvent::Battle(BattleEvent::TurnChanged {
                holder: Side::Local,
            }) => {
                peer.attack(mv).await.expect("our turn");
            }
            PeerEvent::Battle(BattleEvent::MatchOver { winner }) => return (winner, events),
            PeerEvent::LinkLost(failure) => panic!("link lost: {failure}"),
            _ => {}
        }
    }
    panic!("event stream ended before the match did");
}

// =========================================================================
// Full match
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_full_match_over_lossy_network() {
    let faults = FaultConfig {
        loss_rate: 0.2,
        duplicate_rate: 0.1,
    };
    let net = MemoryNetwork::new();
    let (host, host_events) = host_on(&net, faults).await;
    let (joiner, joiner_events) = joiner_on(&net, faults, host.local_addr()).await;

    let host_task = tokio::spawn(play(host.clone(), host_events, "thunderbolt"));
    let joiner_task = tokio::spawn(play(joiner.clone(), joiner_events, "tackle"));

    let (host_view, _) = host_task.await.unwrap();
    let (joiner_view, mut joiner_events) = joiner_task.await.unwrap();

    // Thunderbolt does 32 to Eevee (55 HP), tackle does 26 to Pikachu
    // (35 HP). The host strikes first and lands the second hit.
    assert_eq!(host_view, Side::Local);
    assert_eq!(joiner_view, Side::Peer);

    let notice = wait_for(&mut joiner_events, |e| {
        matches!(e, PeerEvent::Battle(BattleEvent::GameOverNotice { .. }))
    })
    .await;
    assert_eq!(
        notice,
        PeerEvent::Battle(BattleEvent::GameOverNotice {
            winner: "Pikachu".into(),
            loser: "Eevee".into()
        })
    );

    let h = host.status().await;
    let j = joiner.status().await;
    assert_eq!(h.phase, Some(Phase::MatchOver));
    assert_eq!(j.phase, Some(Phase::MatchOver));
    assert_eq!(h.own_hp, 9);
    assert_eq!(h.peer_hp, Some(0));
    assert_eq!(j.own_hp, 0);
    assert_eq!(j.peer_hp, Some(h.own_hp));
}

#[tokio::test(start_paused = true)]
async fn test_host_moves_first_and_joiner_waits() {
    let ((host, _), (joiner, _)) = battling_pair(FaultConfig::none()).await;

    assert!(host.status().await.my_turn);
    assert!(!joiner.status().await.my_turn);

    let err = joiner.attack("tackle").await.unwrap_err();
    assert!(matches!(
        err,
        DuelError::Turn(TurnError::NotTurnHolder { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_move_is_refused_locally() {
    let ((host, _), _) = battling_pair(FaultConfig::none()).await;
    let err = host.attack("hyper beam").await.unwrap_err();
    assert!(matches!(err, DuelError::Turn(TurnError::NotInMoveset(_))));
    assert_eq!(host.status().await.phase, Some(Phase::Idle));
}

#[tokio::test(start_paused = true)]
async fn test_attack_survives_a_failed_first_send() {
    let net = MemoryNetwork::new();
    let channel = FlakyChannel {
        inner: net.bind(FaultConfig::none()).await,
        fail_next: AtomicBool::new(false),
    };
    let (host, mut host_events) = PeerBuilder::new()
        .role(Role::Host)
        .trainer("Red")
        .pokemon("Pikachu")
        .moves(["thunderbolt"])
        .build(channel)
        .await
        .unwrap();
    let (joiner, mut joiner_events) = joiner_on(&net, FaultConfig::none(), host.local_addr()).await;
    wait_for(&mut host_events, |e| matches!(e, PeerEvent::BattleStarted { .. })).await;
    wait_for(&mut joiner_events, |e| matches!(e, PeerEvent::BattleStarted { .. })).await;

    host.link().channel().fail_next_send();
    host.attack("thunderbolt").await.unwrap();
    assert_eq!(host.status().await.pending, 1);

    // The retransmitted announce completes the turn.
    wait_for(&mut host_events, |e| {
        matches!(
            e,
            PeerEvent::Battle(BattleEvent::TurnChanged { holder: Side::Peer })
        )
    })
    .await;
    let h = host.status().await;
    let j = joiner.status().await;
    assert_eq!(h.phase, Some(Phase::Idle));
    assert_eq!(j.own_hp, 55 - 32);
    assert_eq!(h.peer_hp, Some(j.own_hp));
}

// =========================================================================
// Before the battle
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_attack_before_battle_is_refused() {
    let net = MemoryNetwork::new();
    let (host, _) = host_on(&net, FaultConfig::none()).await;

    let err = host.attack("thunderbolt").await.unwrap_err();
    assert!(matches!(
        err,
        DuelError::NotBattling(SessionState::Handshaking)
    ));
    assert!(matches!(host.chat("hi").await, Err(DuelError::NoPeer)));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_own_pokemon_fails_to_build() {
    let net = MemoryNetwork::new();
    let result = PeerBuilder::new()
        .pokemon("Agumon")
        .build(net.bind(FaultConfig::none()).await)
        .await;
    assert!(matches!(result, Err(DuelError::Session(_))));
}

#[tokio::test(start_paused = true)]
async fn test_second_joiner_is_ignored() {
    let net = MemoryNetwork::new();
    let (host, mut host_events) = host_on(&net, FaultConfig::none()).await;
    let (joiner, _) = joiner_on(&net, FaultConfig::none(), host.local_addr()).await;
    wait_for(&mut host_events, |e| matches!(e, PeerEvent::BattleStarted { .. })).await;

    let (intruder, _) = joiner_on(&net, FaultConfig::none(), host.local_addr()).await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(host.peer_addr(), Some(joiner.local_addr()));
    assert_eq!(intruder.status().await.session, SessionState::Handshaking);
}

// =========================================================================
// Chat and stickers
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_chat_and_sticker_are_delivered() {
    let ((host, _), (_, mut joiner_events)) = battling_pair(FaultConfig::none()).await;

    host.chat("good luck").await.unwrap();
    let sticker = STANDARD.encode(b"\x89PNG fake image bytes");
    host.sticker(sticker.clone()).await.unwrap();

    let chat = wait_for(&mut joiner_events, |e| matches!(e, PeerEvent::Chat { .. })).await;
    assert_eq!(
        chat,
        PeerEvent::Chat {
            sender: "Red".into(),
            text: "good luck".into()
        }
    );
    let got = wait_for(&mut joiner_events, |e| matches!(e, PeerEvent::Sticker { .. })).await;
    assert_eq!(
        got,
        PeerEvent::Sticker {
            sender: "Red".into(),
            data: sticker
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_invalid_sticker_is_not_sent() {
    let ((host, _), _) = battling_pair(FaultConfig::none()).await;
    let err = host.sticker("not base64!").await.unwrap_err();
    assert!(matches!(err, DuelError::Link(LinkError::Protocol(_))));
}

// =========================================================================
// Link loss and shutdown
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_unreachable_host_raises_link_lost() {
    let net = MemoryNetwork::new();
    let nowhere = SocketAddr::from((Ipv4Addr::LOCALHOST, 9));
    let (joiner, mut events) = PeerBuilder::new()
        .role(Role::Joiner)
        .peer(nowhere)
        .pokemon("Eevee")
        .moves(["tackle"])
        .build(net.bind(FaultConfig::none()).await)
        .await
        .unwrap();

    let lost = wait_for(&mut events, |e| matches!(e, PeerEvent::LinkLost(_))).await;
    let PeerEvent::LinkLost(failure) = lost else {
        unreachable!()
    };
    assert_eq!(failure.peer, nowhere);
    assert_eq!(failure.retries, 5);

    wait_for(&mut events, |e| matches!(e, PeerEvent::Closed { .. })).await;
    assert_eq!(joiner.status().await.session, SessionState::Closed);
    assert!(matches!(
        joiner.chat("anyone?").await,
        Err(DuelError::Link(LinkError::Shutdown))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_peer_gone_mid_battle_raises_link_lost() {
    let ((host, mut host_events), (joiner, _)) = battling_pair(FaultConfig::none()).await;
    joiner.shutdown().await;
    joiner.link().channel().close().await;

    host.attack("thunderbolt").await.unwrap();
    wait_for(&mut host_events, |e| matches!(e, PeerEvent::LinkLost(_))).await;
    assert_eq!(host.status().await.session, SessionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_session() {
    let net = MemoryNetwork::new();
    let (host, mut events) = host_on(&net, FaultConfig::none()).await;
    host.shutdown().await;

    let closed = wait_for(&mut events, |e| matches!(e, PeerEvent::Closed { .. })).await;
    assert_eq!(
        closed,
        PeerEvent::Closed {
            reason: "shut down locally".into()
        }
    );
    assert_eq!(host.status().await.session, SessionState::Closed);
}
