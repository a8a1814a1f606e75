//! Session configuration: who we are and which side of the handshake we
//! play.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which end of the handshake this peer plays.
///
/// The host waits for a HANDSHAKE_REQUEST and takes the first turn; the
/// joiner knows the host's address and initiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Host,
    Joiner,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Host => "host",
            Self::Joiner => "joiner",
        })
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "host" => Ok(Self::Host),
            "joiner" | "join" => Ok(Self::Joiner),
            other => Err(format!("unknown role `{other}` (expected host or joiner)")),
        }
    }
}

/// What this peer brings to the battle.
///
/// Names are resolved against the stats provider when the session is
/// created, so typos fail before any network traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub role: Role,
    pub trainer: String,
    pub pokemon: String,
    pub moves: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            role: Role::Host,
            trainer: "Trainer".to_string(),
            pokemon: "Pikachu".to_string(),
            moves: vec!["thunderbolt".to_string(), "tackle".to_string()],
        }
    }
}

impl SessionConfig {
    pub fn new(
        role: Role,
        trainer: impl Into<String>,
        pokemon: impl Into<String>,
        moves: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            role,
            trainer: trainer.into(),
            pokemon: pokemon.into(),
            moves: moves.into_iter().map(Into::into).collect(),
        }
    }
}
