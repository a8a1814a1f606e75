//! Error types for the battle layer.

use duelnet_protocol::Kind;

use crate::Phase;

/// Errors raised while resolving names and loading stat data.
///
/// These only occur before a battle starts.
#[derive(Debug, thiserror::Error)]
pub enum BattleError {
    /// No Pokémon by this name in the stats provider.
    #[error("unknown pokemon `{0}`")]
    UnknownPokemon(String),

    /// No move by this name in the stats provider.
    #[error("unknown move `{0}`")]
    UnknownMove(String),

    /// A combatant needs at least one move.
    #[error("`{0}` has no moves")]
    EmptyMoveset(String),

    /// The stats file could not be read.
    #[error("failed to read stats data: {0}")]
    Io(#[from] std::io::Error),

    /// The stats file is not valid JSON for a dex.
    #[error("invalid stats data: {0}")]
    InvalidData(#[from] serde_json::Error),

    /// The stats file is not readable CSV.
    #[error("invalid stats csv: {0}")]
    InvalidCsv(#[from] csv::Error),

    /// The CSV has no column by this name.
    #[error("stats csv has no `{0}` column")]
    MissingColumn(&'static str),
}

/// Why the turn machine refused a message or command.
///
/// A refused input never changes state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TurnError {
    /// The message kind is not valid in the current phase.
    #[error("{kind} not expected in phase {phase}")]
    OutOfPhase { kind: Kind, phase: Phase },

    /// The sender does not hold the turn.
    #[error("{kind} from the side not holding the turn")]
    NotTurnHolder { kind: Kind },

    /// The match has ended; only the advisory GAME_OVER is accepted.
    #[error("match is over")]
    MatchOver,

    /// The named move is not in the attacker's moveset.
    #[error("move `{0}` is not in the moveset")]
    NotInMoveset(String),

    /// A confirmation carried a damage value other than the agreed one.
    #[error("confirmed damage {received} does not match expected {expected}")]
    DamageMismatch { expected: u32, received: u32 },

    /// The message is not part of the turn protocol.
    #[error("{0} is not a turn message")]
    NotATurnMessage(Kind),
}

impl TurnError {
    /// Whether the same input could become acceptable after a later
    /// transition, as happens when messages from the two directions
    /// overtake each other.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::OutOfPhase { .. } | Self::NotTurnHolder { .. })
    }
}
