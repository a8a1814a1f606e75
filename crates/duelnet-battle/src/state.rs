//! Battle state: the two combatants, turn ownership and the current phase.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{BattleError, MoveData, PokemonData, StatsProvider};

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Where the local side is in the turn protocol.
///
/// ```text
///            attacker                      defender
/// Idle ──announce──→ AwaitDefense   Idle ──ATTACK──→ AwaitCalculation
///        ──DEFENSE──→ AwaitConfirm        ──REPORT (match)──→ Idle
///        ──CONFIRM / RESOLUTION──→ Idle   ──REPORT (mismatch)──↺
///                                         ──CONFIRM (resolved)──→ Idle
/// any ──HP reaches 0──→ MatchOver
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    /// Attacker: announced, waiting for DEFENSE_ANNOUNCE.
    AwaitDefense,
    /// Defender: acknowledged the attack, waiting for the report (or, after
    /// a discrepancy, for the attacker's confirmation).
    AwaitCalculation,
    /// Attacker: reported, waiting for confirmation or a resolution request.
    AwaitConfirm,
    /// Terminal.
    MatchOver,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "IDLE",
            Self::AwaitDefense => "AWAIT_DEFENSE",
            Self::AwaitCalculation => "AWAIT_CALCULATION",
            Self::AwaitConfirm => "AWAIT_CONFIRM",
            Self::MatchOver => "MATCH_OVER",
        };
        f.write_str(s)
    }
}

/// One of the two participants, from the local point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Local,
    Peer,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Self::Local => Self::Peer,
            Self::Peer => Self::Local,
        }
    }
}

// ---------------------------------------------------------------------------
// Combatant
// ---------------------------------------------------------------------------

/// A trainer's Pokémon with its resolved moveset and current HP.
#[derive(Debug, Clone, PartialEq)]
pub struct Combatant {
    pub trainer: String,
    pub pokemon: PokemonData,
    pub moves: Vec<MoveData>,
    hp: u32,
}

impl Combatant {
    /// A combatant at full HP.
    pub fn new(trainer: impl Into<String>, pokemon: PokemonData, moves: Vec<MoveData>) -> Self {
        let hp = pokemon.hp;
        Self {
            trainer: trainer.into(),
            pokemon,
            moves,
            hp,
        }
    }

    /// Looks up a Pokémon and every move name in `provider`.
    ///
    /// # Errors
    /// The first unknown name, or [`BattleError::EmptyMoveset`].
    pub fn resolve(
        provider: &dyn StatsProvider,
        trainer: &str,
        pokemon: &str,
        moves: &[String],
    ) -> Result<Self, BattleError> {
        let data = provider.lookup_pokemon(pokemon)?;
        if moves.is_empty() {
            return Err(BattleError::EmptyMoveset(data.name));
        }
        let moves = moves
            .iter()
            .map(|m| provider.lookup_move(m))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(trainer, data, moves))
    }

    pub fn hp(&self) -> u32 {
        self.hp
    }

    pub fn max_hp(&self) -> u32 {
        self.pokemon.hp
    }

    pub fn is_fainted(&self) -> bool {
        self.hp == 0
    }

    /// Finds a move in this combatant's moveset, ignoring case.
    pub fn find_move(&self, name: &str) -> Option<&MoveData> {
        let name = name.trim();
        self.moves.iter().find(|m| m.name.eq_ignore_ascii_case(name))
    }

    /// Subtracts damage, never going below 0. Returns the new HP.
    pub(crate) fn take_damage(&mut self, damage: u32) -> u32 {
        self.hp = self.hp.saturating_sub(damage).min(self.max_hp());
        self.hp
    }
}

// ---------------------------------------------------------------------------
// BattleState
// ---------------------------------------------------------------------------

/// A disagreement the defender raised and is waiting to see settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discrepancy {
    /// The defender's own computation.
    pub expected: u32,
    /// What the attacker reported.
    pub received: u32,
}

/// Everything one peer knows about the match.
#[derive(Debug, Clone, PartialEq)]
pub struct BattleState {
    pub own: Combatant,
    pub peer: Combatant,
    pub turn_holder: Side,
    pub phase: Phase,
    /// The move being resolved this turn (canonical name).
    pub last_move: Option<String>,
    /// The damage this side last computed.
    pub last_damage: Option<u32>,
    /// Set on the defender while a RESOLUTION_REQUEST is unanswered.
    pub discrepancy: Option<Discrepancy>,
    pub winner: Option<Side>,
}

impl BattleState {
    pub fn new(own: Combatant, peer: Combatant, first: Side) -> Self {
        Self {
            own,
            peer,
            turn_holder: first,
            phase: Phase::Idle,
            last_move: None,
            last_damage: None,
            discrepancy: None,
            winner: None,
        }
    }

    pub fn combatant(&self, side: Side) -> &Combatant {
        match side {
            Side::Local => &self.own,
            Side::Peer => &self.peer,
        }
    }

    pub(crate) fn combatant_mut(&mut self, side: Side) -> &mut Combatant {
        match side {
            Side::Local => &mut self.own,
            Side::Peer => &mut self.peer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Pokedex;

    #[test]
    fn test_resolve_validates_every_move() {
        let dex = Pokedex::builtin();
        let ok = Combatant::resolve(
            &dex,
            "Red",
            "pikachu",
            &["Thunderbolt".into(), "tackle".into()],
        )
        .unwrap();
        assert_eq!(ok.pokemon.name, "Pikachu");
        assert_eq!(ok.hp(), 35);
        assert!(ok.find_move("THUNDERBOLT").is_some());

        let err = Combatant::resolve(&dex, "Red", "pikachu", &["tackle".into(), "splash".into()])
            .unwrap_err();
        assert!(matches!(err, BattleError::UnknownMove(m) if m == "splash"));

        let err = Combatant::resolve(&dex, "Red", "pikachu", &[]).unwrap_err();
        assert!(matches!(err, BattleError::EmptyMoveset(_)));
    }

    #[test]
    fn test_take_damage_clamps_at_zero() {
        let dex = Pokedex::builtin();
        let mut c = Combatant::resolve(&dex, "Red", "eevee", &["tackle".into()]).unwrap();
        assert_eq!(c.take_damage(10), 45);
        assert_eq!(c.take_damage(1_000), 0);
        assert!(c.is_fainted());
        assert_eq!(c.take_damage(5), 0);
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Local.opposite(), Side::Peer);
        assert_eq!(Side::Peer.opposite(), Side::Local);
    }
}
