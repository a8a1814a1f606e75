//! The turn state machine.
//!
//! Drives one attack per turn through four messages:
//!
//! ```text
//! attacker                                 defender
//!   ATTACK_ANNOUNCE{move}      ───────────→
//!                              ←───────────  DEFENSE_ANNOUNCE
//!   CALCULATION_REPORT{damage} ───────────→  (recomputes)
//!                              ←───────────  CALCULATION_CONFIRM{damage}   match
//!                              ←───────────  RESOLUTION_REQUEST{expected}  mismatch
//!   CALCULATION_CONFIRM{expected} ────────→                               (resolution)
//! ```
//!
//! The defender's value is authoritative. Each input either produces a
//! [`Step`] (messages to send, events to report) or a [`TurnError`] with
//! the state untouched.

use duelnet_protocol::{Body, Kind};
use tracing::{debug, info, warn};

use crate::damage::compute_damage;
use crate::state::Discrepancy;
use crate::{BattleState, Combatant, Phase, Side, TurnError};

// ---------------------------------------------------------------------------
// Step / events
// ---------------------------------------------------------------------------

/// Something that happened in the battle, for the application to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BattleEvent {
    /// `side` announced an attack.
    AttackAnnounced { side: Side, move_name: String },
    /// `target` lost HP.
    DamageApplied {
        target: Side,
        damage: u32,
        remaining_hp: u32,
    },
    /// The defender disagreed with the attacker's report.
    Discrepancy { expected: u32, received: u32 },
    /// A discrepancy was settled on the defender's value.
    Resolved { damage: u32 },
    /// The turn passed to `holder`.
    TurnChanged { holder: Side },
    /// A Pokémon fainted.
    MatchOver { winner: Side },
    /// The peer's advisory end-of-match notice.
    GameOverNotice { winner: String, loser: String },
}

/// The output of one accepted input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Step {
    /// Bodies to send reliably to the peer, in order.
    pub outgoing: Vec<Body>,
    pub events: Vec<BattleEvent>,
}

impl Step {
    fn send(mut self, body: Body) -> Self {
        self.outgoing.push(body);
        self
    }

    fn event(mut self, event: BattleEvent) -> Self {
        self.events.push(event);
        self
    }
}

// ---------------------------------------------------------------------------
// TurnMachine
// ---------------------------------------------------------------------------

/// One peer's view of the match. Mutated only through
/// [`announce_attack`](Self::announce_attack) and [`handle`](Self::handle).
#[derive(Debug, Clone)]
pub struct TurnMachine {
    state: BattleState,
}

impl TurnMachine {
    /// Starts a match. `first` holds the opening turn.
    pub fn new(own: Combatant, peer: Combatant, first: Side) -> Self {
        info!(
            own = %own.pokemon.name,
            peer = %peer.pokemon.name,
            first = ?first,
            "battle started"
        );
        Self {
            state: BattleState::new(own, peer, first),
        }
    }

    pub fn state(&self) -> &BattleState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn turn_holder(&self) -> Side {
        self.state.turn_holder
    }

    pub fn is_my_turn(&self) -> bool {
        self.state.turn_holder == Side::Local && self.state.phase == Phase::Idle
    }

    pub fn hp(&self, side: Side) -> u32 {
        self.state.combatant(side).hp()
    }

    pub fn winner(&self) -> Option<Side> {
        self.state.winner
    }

    // -----------------------------------------------------------------------
    // Local command
    // -----------------------------------------------------------------------

    /// Starts the local side's attack.
    ///
    /// # Errors
    /// [`TurnError::MatchOver`], [`TurnError::NotTurnHolder`],
    /// [`TurnError::OutOfPhase`] or [`TurnError::NotInMoveset`].
    pub fn announce_attack(&mut self, move_name: &str) -> Result<Step, TurnError> {
        let kind = Kind::AttackAnnounce;
        self.guard_not_over()?;
        if self.state.turn_holder != Side::Local {
            return Err(TurnError::NotTurnHolder { kind });
        }
        self.guard_phase(kind, Phase::Idle)?;
        let mv = self
            .state
            .own
            .find_move(move_name)
            .ok_or_else(|| TurnError::NotInMoveset(move_name.to_string()))?;
        let name = mv.name.clone();

        self.state.last_move = Some(name.clone());
        self.state.last_damage = None;
        self.transition(Phase::AwaitDefense);

        Ok(Step::default()
            .send(Body::AttackAnnounce {
                move_name: name.clone(),
            })
            .event(BattleEvent::AttackAnnounced {
                side: Side::Local,
                move_name: name,
            }))
    }

    // -----------------------------------------------------------------------
    // Peer messages
    // -----------------------------------------------------------------------

    /// Applies one dispatched message from the peer.
    ///
    /// # Errors
    /// Any [`TurnError`]; the state is unchanged when one is returned.
    pub fn handle(&mut self, body: &Body) -> Result<Step, TurnError> {
        let kind = body.kind();
        if !kind.is_turn_message() {
            return Err(TurnError::NotATurnMessage(kind));
        }

        if let Body::GameOver { winner, loser } = body {
            self.guard_phase(kind, Phase::MatchOver)?;
            info!(%winner, %loser, "peer declared game over");
            return Ok(Step::default().event(BattleEvent::GameOverNotice {
                winner: winner.clone(),
                loser: loser.clone(),
            }));
        }
        self.guard_not_over()?;

        let result = match body {
            Body::AttackAnnounce { move_name } => self.on_attack_announce(move_name),
            Body::DefenseAnnounce => self.on_defense_announce(),
            Body::CalculationReport { damage, move_name } => {
                self.on_calculation_report(*damage, move_name)
            }
            Body::CalculationConfirm { damage } => self.on_calculation_confirm(*damage),
            Body::ResolutionRequest { expected, received } => {
                self.on_resolution_request(*expected, *received)
            }
            _ => Err(TurnError::NotATurnMessage(kind)),
        };
        if let Err(e) = &result {
            debug!(%kind, phase = %self.state.phase, error = %e, "turn message rejected");
        }
        result
    }

    /// Defender: the peer starts its attack.
    fn on_attack_announce(&mut self, move_name: &str) -> Result<Step, TurnError> {
        let kind = Kind::AttackAnnounce;
        if self.state.turn_holder != Side::Peer {
            return Err(TurnError::NotTurnHolder { kind });
        }
        self.guard_phase(kind, Phase::Idle)?;
        let mv = self
            .state
            .peer
            .find_move(move_name)
            .ok_or_else(|| TurnError::NotInMoveset(move_name.to_string()))?;
        let name = mv.name.clone();

        self.state.last_move = Some(name.clone());
        self.state.last_damage = None;
        self.state.discrepancy = None;
        self.transition(Phase::AwaitCalculation);

        Ok(Step::default()
            .send(Body::DefenseAnnounce)
            .event(BattleEvent::AttackAnnounced {
                side: Side::Peer,
                move_name: name,
            }))
    }

    /// Attacker: the defender is ready, so compute and report.
    fn on_defense_announce(&mut self) -> Result<Step, TurnError> {
        self.guard_phase(Kind::DefenseAnnounce, Phase::AwaitDefense)?;
        let (damage, move_name) = self.expected_damage(Side::Local)?;

        self.state.last_damage = Some(damage);
        self.transition(Phase::AwaitConfirm);
        debug!(damage, %move_name, "reporting damage");

        Ok(Step::default().send(Body::CalculationReport { damage, move_name }))
    }

    /// Defender: check the attacker's number against our own.
    fn on_calculation_report(
        &mut self,
        reported: u32,
        reported_move: &str,
    ) -> Result<Step, TurnError> {
        let kind = Kind::CalculationReport;
        self.guard_phase(kind, Phase::AwaitCalculation)?;
        if self.state.discrepancy.is_some() {
            return Err(TurnError::OutOfPhase {
                kind,
                phase: self.state.phase,
            });
        }
        let (expected, move_name) = self.expected_damage(Side::Peer)?;

        if reported == expected && reported_move.eq_ignore_ascii_case(&move_name) {
            self.state.last_damage = Some(expected);
            let step = Step::default().send(Body::CalculationConfirm { damage: expected });
            return Ok(self.finish_turn(step, Side::Local, expected));
        }

        warn!(expected, received = reported, %reported_move, "damage discrepancy");
        self.state.last_damage = Some(expected);
        self.state.discrepancy = Some(Discrepancy {
            expected,
            received: reported,
        });
        Ok(Step::default()
            .send(Body::ResolutionRequest {
                expected,
                received: reported,
            })
            .event(BattleEvent::Discrepancy {
                expected,
                received: reported,
            }))
    }

    /// Attacker after a report, or defender after a discrepancy.
    fn on_calculation_confirm(&mut self, damage: u32) -> Result<Step, TurnError> {
        let kind = Kind::CalculationConfirm;
        match (self.state.phase, self.state.discrepancy) {
            (Phase::AwaitConfirm, _) => {
                let expected = self.state.last_damage.unwrap_or_default();
                if damage != expected {
                    return Err(TurnError::DamageMismatch {
                        expected,
                        received: damage,
                    });
                }
                Ok(self.finish_turn(Step::default(), Side::Peer, damage))
            }
            (Phase::AwaitCalculation, Some(d)) => {
                if damage != d.expected {
                    return Err(TurnError::DamageMismatch {
                        expected: d.expected,
                        received: damage,
                    });
                }
                self.state.discrepancy = None;
                info!(damage, "discrepancy resolved");
                let step = Step::default().event(BattleEvent::Resolved { damage });
                Ok(self.finish_turn(step, Side::Local, damage))
            }
            (phase, _) => Err(TurnError::OutOfPhase { kind, phase }),
        }
    }

    /// Attacker: the defender disagreed; its value wins.
    fn on_resolution_request(
        &mut self,
        expected: u32,
        received: u32,
    ) -> Result<Step, TurnError> {
        self.guard_phase(Kind::ResolutionRequest, Phase::AwaitConfirm)?;
        if Some(received) != self.state.last_damage {
            warn!(received, ours = ?self.state.last_damage, "resolution request quotes a different report");
        }
        info!(expected, "accepting defender's damage");

        self.state.last_damage = Some(expected);
        let step = Step::default()
            .send(Body::CalculationConfirm { damage: expected })
            .event(BattleEvent::Resolved { damage: expected });
        Ok(self.finish_turn(step, Side::Peer, expected))
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Applies the agreed damage to `target`, then either ends the match or
    /// returns to Idle with the turn passed to `target`.
    fn finish_turn(&mut self, mut step: Step, target: Side, damage: u32) -> Step {
        let remaining_hp = self.state.combatant_mut(target).take_damage(damage);
        info!(?target, damage, remaining_hp, "damage applied");
        step = step.event(BattleEvent::DamageApplied {
            target,
            damage,
            remaining_hp,
        });

        if remaining_hp == 0 {
            let winner = target.opposite();
            self.state.winner = Some(winner);
            self.transition(Phase::MatchOver);
            step = step.event(BattleEvent::MatchOver { winner });
            // The attacker announces the result; the defender just stops.
            if target == Side::Peer {
                step = step.send(Body::GameOver {
                    winner: self.state.own.pokemon.name.clone(),
                    loser: self.state.peer.pokemon.name.clone(),
                });
            }
            return step;
        }

        self.state.turn_holder = target;
        self.transition(Phase::Idle);
        step.event(BattleEvent::TurnChanged { holder: target })
    }

    /// The damage `attacker` deals with the move recorded for this turn.
    fn expected_damage(&self, attacker: Side) -> Result<(u32, String), TurnError> {
        let attacking = self.state.combatant(attacker);
        let defending = self.state.combatant(attacker.opposite());
        let name = self.state.last_move.as_deref().unwrap_or_default();
        let mv = attacking
            .find_move(name)
            .ok_or_else(|| TurnError::NotInMoveset(name.to_string()))?;
        Ok((
            compute_damage(&attacking.pokemon, &defending.pokemon, mv),
            mv.name.clone(),
        ))
    }

    fn guard_not_over(&self) -> Result<(), TurnError> {
        if self.state.phase == Phase::MatchOver {
            Err(TurnError::MatchOver)
        } else {
            Ok(())
        }
    }

    fn guard_phase(&self, kind: Kind, expected: Phase) -> Result<(), TurnError> {
        if self.state.phase == expected {
            Ok(())
        } else {
            Err(TurnError::OutOfPhase {
                kind,
                phase: self.state.phase,
            })
        }
    }

    fn transition(&mut self, to: Phase) {
        debug!(from = %self.state.phase, %to, "phase transition");
        self.state.phase = to;
    }
}
