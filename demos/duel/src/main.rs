use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::Parser;
use duelnet::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Play a Pokémon battle against another peer over UDP.
#[derive(Parser)]
#[command(name = "duel")]
struct Args {
    /// `host` waits for a joiner; `joiner` connects to `--peer`.
    #[arg(long)]
    role: Role,

    /// Local address to bind.
    #[arg(long, default_value = "0.0.0.0:9999")]
    bind: String,

    /// The host's address (joiner only).
    #[arg(long)]
    peer: Option<SocketAddr>,

    #[arg(long, default_value = "Pikachu")]
    pokemon: String,

    /// Comma-separated moveset.
    #[arg(long, value_delimiter = ',', default_value = "thunderbolt,tackle")]
    moves: Vec<String>,

    /// Trainer name shown to the peer.
    #[arg(long, default_value = "Player")]
    name: String,

    /// Stats file, CSV (`.csv`) or JSON. Defaults to the built-in roster.
    #[arg(long)]
    dex: Option<PathBuf>,
}

const HELP: &str = "\
Commands:
  /attack MOVE     announce an attack
  /chat TEXT       send a chat line
  /sticker PATH    send an image file as a sticker
  /status          show HP and phase
  /quit            exit";

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let stats: Arc<dyn StatsProvider> = match &args.dex {
        Some(path) => Arc::new(Pokedex::load(path).map_err(DuelError::from)?),
        None => Arc::new(Pokedex::builtin()),
    };

    let mut builder = PeerBuilder::new()
        .bind(&args.bind)
        .role(args.role)
        .trainer(args.name.as_str())
        .pokemon(args.pokemon.as_str())
        .moves(args.moves.iter().map(String::as_str))
        .stats(stats);
    if let Some(peer) = args.peer {
        builder = builder.peer(peer);
    }
    let (peer, mut events) = builder.build_udp().await?;

    println!("{} on {} as {}", args.role, peer.local_addr(), args.pokemon);
    println!("{HELP}");

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("{}", describe(&event));
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        let result = match cmd {
            "/quit" => break,
            "/attack" if !rest.is_empty() => peer.attack(rest).await,
            "/chat" if !rest.is_empty() => peer.chat(rest).await,
            "/sticker" if !rest.is_empty() => match tokio::fs::read(rest).await {
                Ok(bytes) => peer.sticker(STANDARD.encode(bytes)).await,
                Err(e) => {
                    println!("cannot read sticker: {e}");
                    continue;
                }
            },
            "/status" => {
                print_status(&peer.status().await);
                continue;
            }
            _ => {
                println!("{HELP}");
                continue;
            }
        };
        if let Err(e) = result {
            println!("error: {e}");
        }
    }

    peer.shutdown().await;
    println!("bye");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn describe(event: &PeerEvent) -> String {
    match event {
        PeerEvent::Connected { peer, seed } => format!("connected to {peer} (seed {seed})"),
        PeerEvent::BattleStarted {
            own,
            opponent,
            my_turn,
        } => {
            let who = if *my_turn { "you move first" } else { "opponent moves first" };
            format!("battle: {own} vs {opponent}, {who}")
        }
        PeerEvent::SetupRejected { reason } => format!("peer setup rejected: {reason}"),
        PeerEvent::Battle(e) => match e {
            BattleEvent::AttackAnnounced { side, move_name } => {
                format!("{} used {move_name}", side_name(*side))
            }
            BattleEvent::DamageApplied {
                target,
                damage,
                remaining_hp,
            } => format!("{} took {damage} damage ({remaining_hp} HP left)", side_name(*target)),
            BattleEvent::Discrepancy { expected, received } => {
                format!("damage disagreement: we computed {expected}, peer reported {received}")
            }
            BattleEvent::Resolved { damage } => format!("settled on {damage} damage"),
            BattleEvent::TurnChanged { holder: Side::Local } => "your turn".to_string(),
            BattleEvent::TurnChanged { holder: Side::Peer } => "opponent's turn".to_string(),
            BattleEvent::MatchOver { winner: Side::Local } => "you win!".to_string(),
            BattleEvent::MatchOver { winner: Side::Peer } => "you lose".to_string(),
            BattleEvent::GameOverNotice { winner, loser } => {
                format!("game over: {winner} defeated {loser}")
            }
        },
        PeerEvent::Chat { sender, text } => format!("<{sender}> {text}"),
        PeerEvent::Sticker { sender, data } => {
            let size = STANDARD.decode(data).map(|b| b.len()).unwrap_or(0);
            format!("<{sender}> [sticker, {size} bytes]")
        }
        PeerEvent::Status { text } => format!("[status] {text}"),
        PeerEvent::LinkLost(failure) => format!("connection lost: {failure}"),
        PeerEvent::Closed { reason } => format!("session closed: {reason}"),
    }
}

fn side_name(side: Side) -> &'static str {
    match side {
        Side::Local => "you",
        Side::Peer => "opponent",
    }
}

fn print_status(s: &PeerStatus) {
    let phase = s.phase.map_or_else(|| "-".to_string(), |p| p.to_string());
    let peer_hp = match (s.peer_hp, s.peer_max_hp) {
        (Some(hp), Some(max)) => format!("{hp}/{max}"),
        _ => "?".to_string(),
    };
    println!(
        "session: {} | phase: {phase} | my HP: {}/{} | peer HP: {peer_hp} | {}",
        s.session,
        s.own_hp,
        s.own_max_hp,
        if s.my_turn { "your turn" } else { "waiting" },
    );
    if s.pending > 0 {
        println!("({} messages awaiting acknowledgment)", s.pending);
    }
}
