//! The deterministic damage formula.
//!
//! Both peers run this on the same inputs and must get the same integer,
//! so it uses no randomness and rounds half-to-even.

use crate::{Category, MoveData, PokemonData};

/// Fixed battle level.
pub const LEVEL: f64 = 50.0;

/// Damage dealt by `mv` from `attacker` to `defender`.
///
/// Physical moves use Attack against Defense, special moves use Special
/// Attack against Special Defense. The result is at least 1.
pub fn compute_damage(
    attacker: &PokemonData,
    defender: &PokemonData,
    mv: &MoveData,
) -> u32 {
    let (atk, def) = match mv.category {
        Category::Physical => (attacker.attack, defender.defense),
        Category::Special => (attacker.sp_attack, defender.sp_defense),
    };
    let effectiveness = defender.effectiveness(mv.move_type);
    formula(atk.into(), def.into(), mv.power.into(), effectiveness)
}

/// `((2·L/5 + 2) · power · atk/def) / 50 + 2`, times `effectiveness`,
/// rounded half-to-even, at least 1. A non-positive `def` counts as 1.
pub fn formula(atk: f64, def: f64, power: f64, effectiveness: f64) -> u32 {
    let def = if def <= 0.0 { 1.0 } else { def };
    let base = (2.0 * LEVEL / 5.0 + 2.0) * power * (atk / def) / 50.0 + 2.0;
    let rounded = (base * effectiveness).round_ties_even();
    if rounded < 1.0 {
        1
    } else if rounded >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        rounded as u32
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::PokeType;

    fn mon(sp_attack: u32, sp_defense: u32, types: Vec<PokeType>) -> PokemonData {
        PokemonData {
            name: "test".into(),
            hp: 100,
            attack: 50,
            defense: 50,
            sp_attack,
            sp_defense,
            speed: 50,
            types,
            against: HashMap::new(),
        }
    }

    fn thunderbolt() -> MoveData {
        MoveData {
            name: "thunderbolt".into(),
            power: 90,
            move_type: PokeType::Electric,
            category: Category::Special,
        }
    }

    #[test]
    fn test_neutral_power_90_yields_34() {
        let a = mon(80, 50, vec![PokeType::Electric]);
        let d = mon(50, 99, vec![PokeType::Normal]);
        assert_eq!(compute_damage(&a, &d, &thunderbolt()), 34);
    }

    #[test]
    fn test_super_effective_doubles_before_rounding() {
        let a = mon(80, 50, vec![]);
        let d = mon(50, 99, vec![PokeType::Water]);
        assert_eq!(compute_damage(&a, &d, &thunderbolt()), 68);
    }

    #[test]
    fn test_immunity_still_deals_one() {
        let a = mon(80, 50, vec![]);
        let d = mon(50, 99, vec![PokeType::Ground]);
        assert_eq!(compute_damage(&a, &d, &thunderbolt()), 1);
    }

    #[test]
    fn test_per_pokemon_multiplier_overrides_chart() {
        let a = mon(80, 50, vec![]);
        let mut d = mon(50, 99, vec![PokeType::Ground]);
        d.against.insert(PokeType::Electric, 1.0);
        assert_eq!(compute_damage(&a, &d, &thunderbolt()), 34);
    }

    #[test]
    fn test_zero_defense_counts_as_one() {
        assert_eq!(formula(10.0, 0.0, 10.0, 1.0), formula(10.0, 1.0, 10.0, 1.0));
    }

    #[test]
    fn test_rounds_half_to_even() {
        // base = 22 * 25 * 1 / 50 + 2 = 13; halved = 6.5 -> 6
        assert_eq!(formula(1.0, 1.0, 25.0, 0.5), 6);
        // base = 22 * 75 / 50 + 2 = 35; halved = 17.5 -> 18
        assert_eq!(formula(1.0, 1.0, 75.0, 0.5), 18);
    }

    #[test]
    fn test_physical_uses_attack_and_defense() {
        let mut a = mon(1, 1, vec![]);
        a.attack = 100;
        let mut d = mon(1, 1, vec![]);
        d.defense = 100;
        let tackle = MoveData {
            name: "tackle".into(),
            power: 40,
            move_type: PokeType::Normal,
            category: Category::Physical,
        };
        // 22 * 40 / 50 + 2 = 19.6 -> 20
        assert_eq!(compute_damage(&a, &d, &tackle), 20);
    }
}
