//! Elemental types, move categories, and the type effectiveness chart.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the eighteen elemental types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PokeType {
    Normal,
    Fire,
    Water,
    Electric,
    Grass,
    Ice,
    Fighting,
    Poison,
    Ground,
    Flying,
    Psychic,
    Bug,
    Rock,
    Ghost,
    Dragon,
    Dark,
    Steel,
    Fairy,
}

impl PokeType {
    pub const ALL: [PokeType; 18] = [
        Self::Normal,
        Self::Fire,
        Self::Water,
        Self::Electric,
        Self::Grass,
        Self::Ice,
        Self::Fighting,
        Self::Poison,
        Self::Ground,
        Self::Flying,
        Self::Psychic,
        Self::Bug,
        Self::Rock,
        Self::Ghost,
        Self::Dragon,
        Self::Dark,
        Self::Steel,
        Self::Fairy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Fire => "fire",
            Self::Water => "water",
            Self::Electric => "electric",
            Self::Grass => "grass",
            Self::Ice => "ice",
            Self::Fighting => "fighting",
            Self::Poison => "poison",
            Self::Ground => "ground",
            Self::Flying => "flying",
            Self::Psychic => "psychic",
            Self::Bug => "bug",
            Self::Rock => "rock",
            Self::Ghost => "ghost",
            Self::Dragon => "dragon",
            Self::Dark => "dark",
            Self::Steel => "steel",
            Self::Fairy => "fairy",
        }
    }

    /// Parses a lowercase or mixed-case type name.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(name))
    }

    /// Multiplier for a move of type `self` hitting a single `defender` type.
    pub fn against(self, defender: PokeType) -> f64 {
        use PokeType::*;

        let (strong, weak, immune): (&[PokeType], &[PokeType], &[PokeType]) = match self {
            Normal => (&[], &[Rock, Steel], &[Ghost]),
            Fire => (&[Grass, Ice, Bug, Steel], &[Fire, Water, Rock, Dragon], &[]),
            Water => (&[Fire, Ground, Rock], &[Water, Grass, Dragon], &[]),
            Electric => (&[Water, Flying], &[Electric, Grass, Dragon], &[Ground]),
            Grass => (
                &[Water, Ground, Rock],
                &[Fire, Grass, Poison, Flying, Bug, Dragon, Steel],
                &[],
            ),
            Ice => (&[Grass, Ground, Flying, Dragon], &[Fire, Water, Ice, Steel], &[]),
            Fighting => (
                &[Normal, Ice, Rock, Dark, Steel],
                &[Poison, Flying, Psychic, Bug, Fairy],
                &[Ghost],
            ),
            Poison => (&[Grass, Fairy], &[Poison, Ground, Rock, Ghost], &[Steel]),
            Ground => (
                &[Fire, Electric, Poison, Rock, Steel],
                &[Grass, Bug],
                &[Flying],
            ),
            Flying => (&[Grass, Fighting, Bug], &[Electric, Rock, Steel], &[]),
            Psychic => (&[Fighting, Poison], &[Psychic, Steel], &[Dark]),
            Bug => (
                &[Grass, Psychic, Dark],
                &[Fire, Fighting, Poison, Flying, Ghost, Steel, Fairy],
                &[],
            ),
            Rock => (&[Fire, Ice, Flying, Bug], &[Fighting, Ground, Steel], &[]),
            Ghost => (&[Psychic, Ghost], &[Dark], &[Normal]),
            Dragon => (&[Dragon], &[Steel], &[Fairy]),
            Dark => (&[Psychic, Ghost], &[Fighting, Dark, Fairy], &[]),
            Steel => (&[Ice, Rock, Fairy], &[Fire, Water, Electric, Steel], &[]),
            Fairy => (&[Fighting, Dragon, Dark], &[Fire, Poison, Steel], &[]),
        };

        if immune.contains(&defender) {
            0.0
        } else if strong.contains(&defender) {
            2.0
        } else if weak.contains(&defender) {
            0.5
        } else {
            1.0
        }
    }

    /// Multiplier against every type a defender has, multiplied together.
    pub fn against_all(self, defender: &[PokeType]) -> f64 {
        defender.iter().map(|&t| self.against(t)).product()
    }
}

impl fmt::Display for PokeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which stat pair a move uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Attack against Defense.
    Physical,
    /// Special Attack against Special Defense.
    Special,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chart_spot_checks() {
        assert_eq!(PokeType::Electric.against(PokeType::Water), 2.0);
        assert_eq!(PokeType::Electric.against(PokeType::Ground), 0.0);
        assert_eq!(PokeType::Fire.against(PokeType::Water), 0.5);
        assert_eq!(PokeType::Normal.against(PokeType::Normal), 1.0);
        assert_eq!(PokeType::Dragon.against(PokeType::Fairy), 0.0);
        assert_eq!(PokeType::Psychic.against(PokeType::Dark), 0.0);
    }

    #[test]
    fn test_dual_types_multiply() {
        use PokeType::*;
        assert_eq!(Grass.against_all(&[Water, Ground]), 4.0);
        assert_eq!(Ground.against_all(&[Rock, Flying]), 0.0);
        assert_eq!(Fire.against_all(&[Grass, Poison]), 2.0);
        assert_eq!(Water.against_all(&[]), 1.0);
    }

    #[test]
    fn test_every_entry_is_a_known_multiplier() {
        for a in PokeType::ALL {
            for d in PokeType::ALL {
                let m = a.against(d);
                assert!([0.0, 0.5, 1.0, 2.0].contains(&m), "{a} vs {d} = {m}");
            }
        }
    }

    #[test]
    fn test_from_name() {
        assert_eq!(PokeType::from_name(" Electric"), Some(PokeType::Electric));
        assert_eq!(PokeType::from_name("fairy"), Some(PokeType::Fairy));
        assert_eq!(PokeType::from_name(""), None);
        assert_eq!(PokeType::from_name("cosmic"), None);
    }

    #[test]
    fn test_serde_lowercase() {
        let t: PokeType = serde_json::from_str("\"electric\"").unwrap();
        assert_eq!(t, PokeType::Electric);
        assert_eq!(serde_json::to_string(&Category::Special).unwrap(), "\"special\"");
    }
}
