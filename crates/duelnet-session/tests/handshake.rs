//! Integration tests for the handshake and setup exchange between a host
//! and a joiner session.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use duelnet_battle::{Pokedex, Side, TurnMachine};
use duelnet_protocol::Body;
use duelnet_session::{Role, Session, SessionConfig, SessionEvent, SessionState, SessionStep};

// =========================================================================
// Helpers
// =========================================================================

const HOST: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5000);
const JOINER: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5001);

fn pair() -> (Session, Session) {
    let dex = Arc::new(Pokedex::builtin());
    let host = Session::new(
        SessionConfig::new(Role::Host, "Red", "Pikachu", ["thunderbolt", "tackle"]),
        dex.clone(),
    )
    .unwrap();
    let joiner = Session::new(
        SessionConfig::new(Role::Joiner, "Blue", "Squirtle", ["hydro pump", "tackle"]),
        dex,
    )
    .unwrap();
    (host, joiner)
}

fn battle_ready(step: &SessionStep) -> Option<&TurnMachine> {
    step.events.iter().find_map(|e| match e {
        SessionEvent::BattleReady(m) => Some(m.as_ref()),
        _ => None,
    })
}

// =========================================================================
// Tests
// =========================================================================

#[test]
fn test_handshake_and_setup_in_order() {
    let (mut host, mut joiner) = pair();
    host.start(None).unwrap();
    let hello = joiner.start(Some(HOST)).unwrap();

    let reply = host.handle(JOINER, &hello.outgoing[0]).unwrap();
    assert_eq!(host.state(), SessionState::Setup);
    assert_eq!(reply.outgoing.len(), 2);

    let mut joiner_out = Vec::new();
    for body in &reply.outgoing {
        let step = joiner.handle(HOST, body).unwrap();
        if let Some(m) = battle_ready(&step) {
            assert_eq!(m.turn_holder(), Side::Peer);
            assert_eq!(m.hp(Side::Peer), 35);
        }
        joiner_out.extend(step.outgoing);
    }
    assert_eq!(joiner.state(), SessionState::Battling);
    assert_eq!(joiner.seed(), host.seed());
    assert!(joiner.seed().is_some());

    // The joiner's own SETUP.
    assert_eq!(joiner_out.len(), 1);
    let step = host.handle(JOINER, &joiner_out[0]).unwrap();
    let machine = battle_ready(&step).expect("host is ready");
    assert!(machine.is_my_turn());
    assert_eq!(machine.hp(Side::Peer), 44);
    assert_eq!(host.peer().unwrap().trainer, "Blue");
}

#[test]
fn test_setup_overtaking_handshake_response() {
    let (mut host, mut joiner) = pair();
    let hello = joiner.start(Some(HOST)).unwrap();
    let reply = host.handle(JOINER, &hello.outgoing[0]).unwrap();

    // Deliver SETUP first, then HANDSHAKE_RESPONSE.
    let held = joiner.handle(HOST, &reply.outgoing[1]).unwrap();
    assert!(held.outgoing.is_empty());
    assert_eq!(joiner.state(), SessionState::Handshaking);

    let step = joiner.handle(HOST, &reply.outgoing[0]).unwrap();
    assert!(matches!(step.events[0], SessionEvent::Connected { .. }));
    assert!(battle_ready(&step).is_some());
    assert!(matches!(step.outgoing[0], Body::Setup { .. }));
    assert_eq!(joiner.state(), SessionState::Battling);
}

#[test]
fn test_second_joiner_is_turned_away() {
    let (mut host, mut joiner) = pair();
    let hello = joiner.start(Some(HOST)).unwrap();
    host.handle(JOINER, &hello.outgoing[0]).unwrap();

    let intruder: SocketAddr = "127.0.0.1:6000".parse().unwrap();
    assert!(host.handle(intruder, &Body::HandshakeRequest).is_err());
    assert_eq!(host.peer_addr(), Some(JOINER));
}

#[test]
fn test_joiner_rejects_response_from_elsewhere() {
    let (_, mut joiner) = pair();
    joiner.start(Some(HOST)).unwrap();

    let stranger: SocketAddr = "127.0.0.1:6000".parse().unwrap();
    assert!(joiner
        .handle(stranger, &Body::HandshakeResponse { seed: 7 })
        .is_err());
    assert_eq!(joiner.state(), SessionState::Handshaking);
}

#[test]
fn test_unknown_pokemon_in_peer_setup_is_surfaced() {
    let (mut host, mut joiner) = pair();
    let hello = joiner.start(Some(HOST)).unwrap();
    host.handle(JOINER, &hello.outgoing[0]).unwrap();

    let step = host
        .handle(
            JOINER,
            &Body::Setup {
                trainer: "Blue".into(),
                pokemon: "Missingno".into(),
                moves: vec!["tackle".into()],
            },
        )
        .unwrap();
    assert!(matches!(
        &step.events[0],
        SessionEvent::SetupRejected { reason } if reason.contains("Missingno")
    ));
    assert_eq!(host.state(), SessionState::Setup);
}
