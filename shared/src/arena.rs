//! One match worth of fighters stepped against a shared tick counter.
//!
//! The arena is the only place where one fighter's attack writes another
//! fighter's state.

use std::collections::BTreeMap;

use glam::Vec2;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::anim::AnimationId;
use crate::body::Body;
use crate::config::{DT, Loadout};
use crate::fighter::{Fighter, FighterEvent, FighterInput};
use crate::fsm::FsmError;
use crate::hit::HitPayload;
use crate::hitbox::{self, Candidate};
use crate::{FighterId, Tick};

/// Round and match flow living outside the combat core.
pub trait MatchOrchestrator {
    /// While true the arena does not advance.
    fn is_frozen(&self) -> bool {
        false
    }

    /// Called once per death.
    fn on_fighter_died(&mut self, fighter: FighterId);
}

/// Orchestrator that never freezes and ignores deaths.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOrchestrator;

impl MatchOrchestrator for NoOrchestrator {
    fn on_fighter_died(&mut self, _fighter: FighterId) {}
}

/// Fire-and-forget notifications for presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CombatEvent {
    AttackStarted {
        fighter: FighterId,
        attack: String,
        animation: AnimationId,
        combo_index: u8,
        start_tick: Tick,
    },
    AttackHit {
        attacker: FighterId,
        target: FighterId,
        attack: String,
        /// Center of the hitbox that connected.
        position: Vec2,
        damage: u32,
        tick: Tick,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArenaError {
    #[error("fighter {0} is already in the arena")]
    DuplicateFighter(FighterId),
    #[error("fighter {0} is not in the arena")]
    UnknownFighter(FighterId),
    #[error(transparent)]
    Fsm(#[from] FsmError),
}

pub struct Arena<B: Body + 'static, O> {
    tick: Tick,
    frozen: bool,
    fighters: BTreeMap<FighterId, Fighter<B>>,
    orchestrator: O,
    events: Vec<CombatEvent>,
}

impl<B: Body + 'static, O: MatchOrchestrator> Arena<B, O> {
    pub fn new(orchestrator: O) -> Self {
        Self::starting_at(0, orchestrator)
    }

    /// Arena continuing from a stored tick.
    pub fn starting_at(tick: Tick, orchestrator: O) -> Self {
        Self {
            tick,
            frozen: false,
            fighters: BTreeMap::new(),
            orchestrator,
            events: Vec::new(),
        }
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen || self.orchestrator.is_frozen()
    }

    pub fn orchestrator(&self) -> &O {
        &self.orchestrator
    }

    pub fn orchestrator_mut(&mut self) -> &mut O {
        &mut self.orchestrator
    }

    pub fn spawn(&mut self, id: FighterId, loadout: &Loadout, body: B) -> Result<(), ArenaError> {
        if self.fighters.contains_key(&id) {
            return Err(ArenaError::DuplicateFighter(id));
        }
        let fighter = Fighter::spawn(id, loadout, body)?;
        self.fighters.insert(id, fighter);
        info!(fighter = id, "fighter spawned");
        Ok(())
    }

    /// Adds an already built fighter, e.g. one restored from storage.
    pub fn insert(&mut self, fighter: Fighter<B>) -> Result<(), ArenaError> {
        let id = fighter.id();
        if self.fighters.contains_key(&id) {
            return Err(ArenaError::DuplicateFighter(id));
        }
        self.fighters.insert(id, fighter);
        Ok(())
    }

    pub fn remove(&mut self, id: FighterId) -> Option<Fighter<B>> {
        self.fighters.remove(&id)
    }

    pub fn get(&self, id: FighterId) -> Option<&Fighter<B>> {
        self.fighters.get(&id)
    }

    pub fn get_mut(&mut self, id: FighterId) -> Option<&mut Fighter<B>> {
        self.fighters.get_mut(&id)
    }

    /// Fighters in ascending id order.
    pub fn fighters(&self) -> impl Iterator<Item = &Fighter<B>> {
        self.fighters.values()
    }

    pub fn set_input(&mut self, id: FighterId, input: FighterInput) -> Result<(), ArenaError> {
        self.fighters
            .get_mut(&id)
            .ok_or(ArenaError::UnknownFighter(id))?
            .set_input(input);
        Ok(())
    }

    /// Advances one tick: every fighter's state machine, then movement, then
    /// hit resolution. Does nothing while frozen.
    pub fn step(&mut self) {
        if self.is_frozen() {
            return;
        }
        let now = self.tick;

        for fighter in self.fighters.values_mut() {
            if let Err(e) = fighter.fixed_tick(now) {
                error!(fighter = fighter.id(), "fixed tick failed: {e}");
            }
            fighter.body_mut().step(DT);
        }

        self.resolve_strikes(now);
        self.collect_events();
        self.tick = now.wrapping_add(1);
    }

    /// Each active hitbox picks at most one target. Attackers are processed
    /// in id order, so an attacker struck earlier in the pass has already
    /// lost its swing.
    fn resolve_strikes(&mut self, now: Tick) {
        let attackers: Vec<FighterId> = self.fighters.keys().copied().collect();
        for attacker_id in attackers {
            let Some(attacker) = self.fighters.get(&attacker_id) else {
                continue;
            };
            let Some(hitbox) = attacker.active_hitbox() else {
                continue;
            };
            let candidates = self
                .fighters
                .values()
                .filter(|f| !f.is_dead())
                .map(|f| Candidate {
                    id: f.id(),
                    hurtbox: f.hurtbox(),
                });
            let Some(target_id) = hitbox::select_target(&hitbox, attacker_id, candidates) else {
                continue;
            };

            let attacker_x = attacker.body().position().x;
            let target_x = self
                .fighters
                .get(&target_id)
                .map_or(attacker_x, |t| t.body().position().x);
            let facing = attacker.body().facing();
            let Some(attack) = attacker.combo().current_attack() else {
                continue;
            };
            let Some(damage) = attacker.combo().scaled_damage() else {
                continue;
            };
            let attack_name = attack.name.clone();
            let payload = HitPayload {
                attacker: attacker_id,
                damage,
                knockback: hitbox::knockback(attack.knockback, facing, attacker_x, target_x),
                hitstun: attack.hitstun,
            };

            if let Some(attacker) = self.fighters.get_mut(&attacker_id) {
                attacker.mark_attack_landed();
            }
            let accepted = match self.fighters.get_mut(&target_id) {
                Some(target) => match target.take_hit(payload, now) {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!(fighter = target_id, "hit refused: {e}");
                        false
                    }
                },
                None => false,
            };
            if !accepted {
                continue;
            }

            if let Some(attacker) = self.fighters.get_mut(&attacker_id) {
                attacker.register_landed_hit();
            }
            debug!(
                attacker = attacker_id,
                target = target_id,
                damage,
                "hit landed"
            );
            self.events.push(CombatEvent::AttackHit {
                attacker: attacker_id,
                target: target_id,
                attack: attack_name,
                position: hitbox.center,
                damage,
                tick: now,
            });
        }
    }

    fn collect_events(&mut self) {
        for fighter in self.fighters.values_mut() {
            let id = fighter.id();
            for event in fighter.take_events() {
                match event {
                    FighterEvent::AttackStarted(started) => {
                        self.events.push(CombatEvent::AttackStarted {
                            fighter: id,
                            attack: started.name,
                            animation: started.animation,
                            combo_index: started.combo_index,
                            start_tick: started.start_tick,
                        });
                    }
                    FighterEvent::Died => self.orchestrator.on_fighter_died(id),
                }
            }
        }
    }

    /// Freezes or thaws every body. Dead bodies stay frozen.
    pub fn freeze_simulation(&mut self, frozen: bool) {
        self.frozen = frozen;
        for fighter in self.fighters.values_mut() {
            let stay_frozen = frozen || fighter.is_dead();
            fighter.body_mut().set_frozen(stay_frozen);
        }
        info!(frozen, "simulation freeze toggled");
    }

    pub fn force_idle(&mut self, id: FighterId) -> Result<bool, ArenaError> {
        let fighter = self
            .fighters
            .get_mut(&id)
            .ok_or(ArenaError::UnknownFighter(id))?;
        Ok(fighter.force_idle()?)
    }

    pub fn reset_round(&mut self) -> Result<(), ArenaError> {
        for fighter in self.fighters.values_mut() {
            fighter.reset_round()?;
        }
        info!(fighters = self.fighters.len(), "round reset");
        Ok(())
    }

    pub fn drain_events(&mut self) -> Vec<CombatEvent> {
        std::mem::take(&mut self.events)
    }
}
