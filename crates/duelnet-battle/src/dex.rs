//! Read-only stat lookup: Pokémon base stats and move data.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{BattleError, Category, PokeType};

// ---------------------------------------------------------------------------
// Data records
// ---------------------------------------------------------------------------

/// Base stats and types for one Pokémon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PokemonData {
    pub name: String,
    pub hp: u32,
    pub attack: u32,
    pub defense: u32,
    pub sp_attack: u32,
    pub sp_defense: u32,
    pub speed: u32,
    pub types: Vec<PokeType>,
    /// Damage multipliers taken from moves of a given type. Types not
    /// listed fall back to the chart applied to `types`.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub against: HashMap<PokeType, f64>,
}

impl PokemonData {
    /// Multiplier for a move of `move_type` hitting this Pokémon.
    pub fn effectiveness(&self, move_type: PokeType) -> f64 {
        self.against
            .get(&move_type)
            .copied()
            .unwrap_or_else(|| move_type.against_all(&self.types))
    }
}

/// Power, type and category of one move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveData {
    pub name: String,
    pub power: u32,
    #[serde(rename = "type")]
    pub move_type: PokeType,
    pub category: Category,
}

// ---------------------------------------------------------------------------
// StatsProvider
// ---------------------------------------------------------------------------

/// A synchronous, read-only source of stat data.
///
/// Consulted only while a battle is being set up; the turn machine works
/// from the records resolved then.
pub trait StatsProvider: Send + Sync {
    /// # Errors
    /// [`BattleError::UnknownPokemon`] if `name` is not known.
    fn lookup_pokemon(&self, name: &str) -> Result<PokemonData, BattleError>;

    /// # Errors
    /// [`BattleError::UnknownMove`] if `name` is not known.
    fn lookup_move(&self, name: &str) -> Result<MoveData, BattleError>;
}

// ---------------------------------------------------------------------------
// Pokedex
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct DexFile {
    #[serde(default)]
    pokemon: Vec<PokemonData>,
    #[serde(default)]
    moves: Vec<MoveData>,
}

/// An in-memory [`StatsProvider`]. Names match case-insensitively and
/// ignore surrounding whitespace.
#[derive(Debug, Clone, Default)]
pub struct Pokedex {
    pokemon: HashMap<String, PokemonData>,
    moves: HashMap<String, MoveData>,
}

fn key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl Pokedex {
    /// An empty dex.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a dex from JSON of the form
    /// `{"pokemon": [PokemonData...], "moves": [MoveData...]}`.
    pub fn from_json(json: &str) -> Result<Self, BattleError> {
        let file: DexFile = serde_json::from_str(json)?;
        let mut dex = Self::new();
        for p in file.pokemon {
            dex.insert_pokemon(p);
        }
        for m in file.moves {
            dex.insert_move(m);
        }
        Ok(dex)
    }

    /// Reads a dex file: CSV if the extension is `.csv`, JSON otherwise.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BattleError> {
        let path = path.as_ref();
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv {
            return Self::load_csv(path);
        }
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Reads a Pokémon CSV file. See [`from_csv`](Self::from_csv).
    pub fn load_csv(path: impl AsRef<Path>) -> Result<Self, BattleError> {
        let file = std::fs::File::open(path)?;
        Self::from_csv(file)
    }

    /// Parses Pokémon from CSV with a header row.
    ///
    /// Required columns: `name`, `hp`, `attack`, `defense`, `sp_attack`,
    /// `sp_defense`, `speed`, `type1`. `type2` and any `against_<type>`
    /// columns are optional; other columns are ignored. Empty stat cells
    /// count as 0. Rows with an empty name are skipped, and so are rows
    /// with an unparsable number or an unknown `type1`, with a warning.
    ///
    /// The file carries no moves, so the dex starts with the built-in
    /// move table.
    pub fn from_csv(reader: impl Read) -> Result<Self, BattleError> {
        let mut rows = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);
        let columns = CsvColumns::find(rows.headers()?)?;

        let mut dex = Self::new();
        dex.insert_builtin_moves();
        let mut skipped = 0usize;
        for record in rows.records() {
            let record = record?;
            match columns.parse(&record) {
                Ok(Some(data)) => dex.insert_pokemon(data),
                Ok(None) => {}
                Err(reason) => {
                    skipped += 1;
                    warn!(
                        row = record.position().map_or(0, |p| p.line()),
                        %reason,
                        "skipping bad stats row"
                    );
                }
            }
        }
        debug!(pokemon = dex.pokemon_count(), skipped, "loaded stats csv");
        Ok(dex)
    }

    /// A small built-in roster with the classic eight moves.
    pub fn builtin() -> Self {
        use PokeType::*;

        let mut dex = Self::new();

        let roster: [(&str, [u32; 6], &[PokeType]); 8] = [
            ("Pikachu", [35, 55, 40, 50, 50, 90], &[Electric]),
            ("Charmander", [39, 52, 43, 60, 50, 65], &[Fire]),
            ("Squirtle", [44, 48, 65, 50, 64, 43], &[Water]),
            ("Bulbasaur", [45, 49, 49, 65, 65, 45], &[Grass, Poison]),
            ("Eevee", [55, 55, 50, 45, 65, 55], &[Normal]),
            ("Geodude", [40, 80, 100, 30, 30, 20], &[Rock, Ground]),
            ("Snorlax", [160, 110, 65, 65, 110, 30], &[Normal]),
            ("Mewtwo", [106, 110, 90, 154, 90, 130], &[Psychic]),
        ];
        for (name, [hp, attack, defense, sp_attack, sp_defense, speed], types) in roster {
            dex.insert_pokemon(PokemonData {
                name: name.to_string(),
                hp,
                attack,
                defense,
                sp_attack,
                sp_defense,
                speed,
                types: types.to_vec(),
                against: HashMap::new(),
            });
        }
        dex.insert_builtin_moves();
        dex
    }

    fn insert_builtin_moves(&mut self) {
        use Category::{Physical, Special};
        use PokeType::*;

        let moves = [
            ("tackle", 40, Normal, Physical),
            ("scratch", 40, Normal, Physical),
            ("thunderbolt", 90, Electric, Special),
            ("flamethrower", 90, Fire, Special),
            ("hydro pump", 110, Water, Special),
            ("vine whip", 45, Grass, Physical),
            ("earthquake", 100, Ground, Physical),
            ("psychic", 90, Psychic, Special),
        ];
        for (name, power, move_type, category) in moves {
            self.insert_move(MoveData {
                name: name.to_string(),
                power,
                move_type,
                category,
            });
        }
    }

    /// Adds or replaces a Pokémon.
    pub fn insert_pokemon(&mut self, data: PokemonData) {
        self.pokemon.insert(key(&data.name), data);
    }

    /// Adds or replaces a move.
    pub fn insert_move(&mut self, data: MoveData) {
        self.moves.insert(key(&data.name), data);
    }

    pub fn pokemon_count(&self) -> usize {
        self.pokemon.len()
    }

    pub fn move_count(&self) -> usize {
        self.moves.len()
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// Column positions in a stats CSV.
struct CsvColumns {
    name: usize,
    stats: [usize; 6],
    type1: usize,
    type2: Option<usize>,
    against: Vec<(PokeType, usize)>,
}

impl CsvColumns {
    const STATS: [&'static str; 6] = ["hp", "attack", "defense", "sp_attack", "sp_defense", "speed"];

    fn find(headers: &csv::StringRecord) -> Result<Self, BattleError> {
        let position = |wanted: &str| {
            headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}').eq_ignore_ascii_case(wanted))
        };
        let required =
            |wanted: &'static str| position(wanted).ok_or(BattleError::MissingColumn(wanted));

        let mut stats = [0; 6];
        for (slot, wanted) in stats.iter_mut().zip(Self::STATS) {
            *slot = required(wanted)?;
        }
        Ok(Self {
            name: required("name")?,
            stats,
            type1: required("type1")?,
            type2: position("type2"),
            against: PokeType::ALL
                .into_iter()
                .filter_map(|t| position(&format!("against_{t}")).map(|i| (t, i)))
                .collect(),
        })
    }

    /// `Ok(None)` for a row with no name.
    fn parse(&self, record: &csv::StringRecord) -> Result<Option<PokemonData>, String> {
        let cell = |i: usize| record.get(i).unwrap_or("");

        let name = cell(self.name);
        if name.is_empty() {
            return Ok(None);
        }

        let mut stats = [0u32; 6];
        for ((slot, &i), column) in stats.iter_mut().zip(&self.stats).zip(Self::STATS) {
            let raw = cell(i);
            if !raw.is_empty() {
                *slot = raw
                    .parse()
                    .map_err(|_| format!("{name}: {column} is not a number: {raw:?}"))?;
            }
        }
        let [hp, attack, defense, sp_attack, sp_defense, speed] = stats;

        let type1 = cell(self.type1);
        let mut types = vec![
            PokeType::from_name(type1).ok_or_else(|| format!("{name}: unknown type {type1:?}"))?,
        ];
        let type2 = self.type2.map(cell).unwrap_or("");
        if !type2.is_empty() {
            types.push(
                PokeType::from_name(type2)
                    .ok_or_else(|| format!("{name}: unknown type {type2:?}"))?,
            );
        }

        let mut against = HashMap::new();
        for &(t, i) in &self.against {
            let raw = cell(i);
            if raw.is_empty() {
                continue;
            }
            let m: f64 = raw
                .parse()
                .map_err(|_| format!("{name}: against_{t} is not a number: {raw:?}"))?;
            if !m.is_finite() || m < 0.0 {
                return Err(format!("{name}: against_{t} out of range: {raw:?}"));
            }
            against.insert(t, m);
        }

        Ok(Some(PokemonData {
            name: name.to_string(),
            hp,
            attack,
            defense,
            sp_attack,
            sp_defense,
            speed,
            types,
            against,
        }))
    }
}

impl StatsProvider for Pokedex {
    fn lookup_pokemon(&self, name: &str) -> Result<PokemonData, BattleError> {
        self.pokemon
            .get(&key(name))
            .cloned()
            .ok_or_else(|| BattleError::UnknownPokemon(name.to_string()))
    }

    fn lookup_move(&self, name: &str) -> Result<MoveData, BattleError> {
        self.moves
            .get(&key(name))
            .cloned()
            .ok_or_else(|| BattleError::UnknownMove(name.to_string()))
    }
}
