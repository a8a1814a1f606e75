//! Battle layer for Duelnet.
//!
//! - **Stats** ([`StatsProvider`], [`Pokedex`]): read-only Pokémon and move
//!   data, consulted while a battle is set up.
//! - **Damage** ([`compute_damage`]): the deterministic formula both peers
//!   evaluate independently.
//! - **Turn machine** ([`TurnMachine`]): the four-message turn protocol with
//!   discrepancy resolution, phase guards and HP bookkeeping.
//!
//! Nothing here does I/O. The turn machine takes already-deduplicated
//! message bodies and returns the bodies to send back.

mod damage;
mod dex;
mod error;
mod machine;
mod state;
mod types;

pub use damage::{LEVEL, compute_damage, formula};
pub use dex::{MoveData, Pokedex, PokemonData, StatsProvider};
pub use error::{BattleError, TurnError};
pub use machine::{BattleEvent, Step, TurnMachine};
pub use state::{BattleState, Combatant, Discrepancy, Phase, Side};
pub use types::{Category, PokeType};
