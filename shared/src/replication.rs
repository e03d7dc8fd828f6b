//! Wire and storage shapes of a fighter.
//!
//! [`FighterSnapshot`] is what replicas receive: small integers, ticks and
//! raw `f32`s, never float timers. [`FighterRecord`] adds the authority-only
//! bookkeeping needed to resume a fighter from storage.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::body::Body;
use crate::combo::{AttackPhase, ComboRuntimeState};
use crate::config::Loadout;
use crate::fighter::{Fighter, MovementState};
use crate::fsm::{FsmError, ReplicatedState, Role, StateId};
use crate::hit::HitRuntimeState;
use crate::{FighterId, Tick};

pub const FLAG_EXECUTING: u8 = 1 << 0;
pub const FLAG_POST_HIT_INVINCIBLE: u8 = 1 << 1;
pub const FLAG_DASH_INVINCIBLE: u8 = 1 << 2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FighterSnapshot {
    pub id: FighterId,
    pub state: u8,
    pub entry_seq: u8,
    pub combo_index: u8,
    pub phase: u8,
    pub attack_start: Tick,
    pub hit_start: Tick,
    pub energy: u32,
    pub health: u32,
    pub flags: u8,
    pub knockback: Vec2,
}

impl FighterSnapshot {
    pub fn replicated_state(&self) -> ReplicatedState {
        ReplicatedState {
            id: StateId(self.state),
            entry_seq: self.entry_seq,
        }
    }

    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    fn combo_state(&self) -> Result<ComboRuntimeState, ReplicationError> {
        let phase =
            AttackPhase::from_u8(self.phase).ok_or(ReplicationError::UnknownPhase(self.phase))?;
        Ok(ComboRuntimeState {
            combo_index: self.combo_index,
            phase,
            attack_start: self.attack_start,
            energy: self.energy,
            executing: self.has_flag(FLAG_EXECUTING),
        })
    }
}

/// Snapshot plus everything only the authority needs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FighterRecord {
    pub snapshot: FighterSnapshot,
    pub hitstun: u32,
    pub invincible_for: u32,
    pub knockback_applied: bool,
    pub movement: MovementState,
    pub attack_landed: bool,
    pub input_enabled: bool,
    pub death_reported: bool,
    pub round_reset: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplicationError {
    #[error("unknown attack phase {0}")]
    UnknownPhase(u8),
    #[error(transparent)]
    Fsm(#[from] FsmError),
}

impl<B: Body + 'static> Fighter<B> {
    pub fn snapshot(&self) -> FighterSnapshot {
        let ctx = &self.ctx;
        let combo = ctx.combo.state();
        let state = self
            .machine
            .replicated()
            .unwrap_or(ReplicatedState::new(self.states().idle));

        let mut flags = 0;
        if combo.executing {
            flags |= FLAG_EXECUTING;
        }
        if ctx.hit.post_hit_invincible {
            flags |= FLAG_POST_HIT_INVINCIBLE;
        }
        if ctx.hit.dash_invincible {
            flags |= FLAG_DASH_INVINCIBLE;
        }

        FighterSnapshot {
            id: ctx.id,
            state: state.id.0,
            entry_seq: state.entry_seq,
            combo_index: combo.combo_index,
            phase: combo.phase.as_u8(),
            attack_start: combo.attack_start,
            hit_start: ctx.hit.hit_start,
            energy: combo.energy,
            health: ctx.health,
            flags,
            knockback: ctx.hit.knockback,
        }
    }

    pub fn record(&self) -> FighterRecord {
        let ctx = &self.ctx;
        FighterRecord {
            snapshot: self.snapshot(),
            hitstun: ctx.hit.hitstun,
            invincible_for: ctx.hit.invincible_for,
            knockback_applied: ctx.hit.knockback_applied,
            movement: ctx.movement,
            attack_landed: ctx.attack_landed,
            input_enabled: ctx.input_enabled,
            death_reported: ctx.death_reported,
            round_reset: ctx.round_reset,
        }
    }

    /// Rebuilds an authority fighter from storage, resuming its state without
    /// re-running enter hooks.
    pub fn restore(loadout: &Loadout, body: B, record: &FighterRecord) -> Result<Self, ReplicationError> {
        let snapshot = &record.snapshot;
        let combo = snapshot.combo_state()?;
        let mut fighter = Self::new(snapshot.id, Role::Authority, loadout, body)?;
        fighter.machine.resume(snapshot.replicated_state())?;

        let ctx = &mut fighter.ctx;
        ctx.health = snapshot.health.min(ctx.config.max_health);
        ctx.combo.restore(combo);
        ctx.hit = HitRuntimeState {
            hit_start: snapshot.hit_start,
            hitstun: record.hitstun,
            knockback: snapshot.knockback,
            knockback_applied: record.knockback_applied,
            post_hit_invincible: snapshot.has_flag(FLAG_POST_HIT_INVINCIBLE),
            invincible_for: record.invincible_for,
            dash_invincible: snapshot.has_flag(FLAG_DASH_INVINCIBLE),
        };
        ctx.movement = record.movement;
        ctx.attack_landed = record.attack_landed;
        ctx.input_enabled = record.input_enabled;
        ctx.death_reported = record.death_reported;
        ctx.round_reset = record.round_reset;
        Ok(fighter)
    }

    /// Replica ingest. The state change itself is replayed by the next
    /// `frame_update`.
    pub fn apply_snapshot(&mut self, snapshot: &FighterSnapshot) -> Result<(), ReplicationError> {
        let combo = snapshot.combo_state()?;
        self.machine.apply_replicated(snapshot.replicated_state())?;

        let ctx = &mut self.ctx;
        ctx.combo.restore(combo);
        ctx.health = snapshot.health;
        ctx.hit.hit_start = snapshot.hit_start;
        ctx.hit.knockback = snapshot.knockback;
        ctx.hit.post_hit_invincible = snapshot.has_flag(FLAG_POST_HIT_INVINCIBLE);
        ctx.hit.dash_invincible = snapshot.has_flag(FLAG_DASH_INVINCIBLE);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::KinematicBody;
    use crate::config::{CombatTables, DT};
    use crate::fighter::{FighterInput, Jump};

    fn loadout() -> Loadout {
        CombatTables::builtin().unwrap().loadout()
    }

    fn step(fighter: &mut Fighter<KinematicBody>, now: Tick, input: FighterInput) {
        fighter.set_input(input);
        fighter.fixed_tick(now).unwrap();
        fighter.body_mut().step(DT);
    }

    /// A replica fed snapshots replays every entry, including the double
    /// jump's self-transition.
    #[test]
    fn replica_follows_the_authority() {
        let loadout = loadout();
        let mut authority = Fighter::spawn(1, &loadout, KinematicBody::default()).unwrap();
        let mut replica = Fighter::replica(1, &loadout, KinematicBody::default()).unwrap();

        replica.apply_snapshot(&authority.snapshot()).unwrap();
        replica.frame_update().unwrap();
        assert_eq!(replica.state(), authority.state());
        assert_eq!(replica.context().presentation.plays, 1);

        let jump = FighterInput {
            jump: true,
            ..Default::default()
        };
        for now in 0..2 {
            step(&mut authority, now, jump);
            replica.apply_snapshot(&authority.snapshot()).unwrap();
            replica.frame_update().unwrap();
        }
        assert!(replica.is_in::<Jump>());
        assert_eq!(replica.context().presentation.plays, 3);
        assert_eq!(replica.snapshot(), authority.snapshot());
        // Replica enter hooks leave gameplay state alone.
        assert_eq!(replica.context().movement.jumps_used, 0);
    }

    #[test]
    fn replica_refuses_unregistered_states() {
        let loadout = loadout();
        let authority = Fighter::spawn(1, &loadout, KinematicBody::default()).unwrap();
        let mut replica = Fighter::replica(1, &loadout, KinematicBody::default()).unwrap();
        replica.apply_snapshot(&authority.snapshot()).unwrap();
        replica.frame_update().unwrap();

        let bogus = FighterSnapshot {
            state: 42,
            ..authority.snapshot()
        };
        replica.apply_snapshot(&bogus).unwrap();
        assert_eq!(
            replica.frame_update(),
            Err(FsmError::UnknownState(StateId(42)))
        );
        assert_eq!(replica.state(), authority.state());
    }

    #[test]
    fn unknown_phase_is_rejected() {
        let loadout = loadout();
        let authority = Fighter::spawn(1, &loadout, KinematicBody::default()).unwrap();
        let mut replica = Fighter::replica(1, &loadout, KinematicBody::default()).unwrap();
        let bogus = FighterSnapshot {
            phase: 9,
            ..authority.snapshot()
        };
        assert_eq!(
            replica.apply_snapshot(&bogus),
            Err(ReplicationError::UnknownPhase(9))
        );
    }

    #[test]
    fn authority_cannot_apply_snapshots() {
        let loadout = loadout();
        let mut authority = Fighter::spawn(1, &loadout, KinematicBody::default()).unwrap();
        let snapshot = authority.snapshot();
        assert_eq!(
            authority.apply_snapshot(&snapshot),
            Err(ReplicationError::Fsm(FsmError::NotReplica))
        );
    }

    /// A fighter stored mid-attack and restored keeps simulating exactly like
    /// the source.
    #[test]
    fn restored_fighter_continues_identically() {
        let loadout = loadout();
        let mut source = Fighter::spawn(1, &loadout, KinematicBody::default()).unwrap();
        let attack = FighterInput {
            attack: true,
            ..Default::default()
        };
        step(&mut source, 0, attack);
        for now in 1..10 {
            step(&mut source, now, FighterInput::default());
        }

        let mut restored =
            Fighter::restore(&loadout, source.body().clone(), &source.record()).unwrap();
        assert_eq!(restored.record(), source.record());

        for now in 10..60 {
            let input = if now == 20 { attack } else { FighterInput::default() };
            step(&mut source, now, input);
            step(&mut restored, now, input);
            assert_eq!(restored.record(), source.record());
            assert_eq!(restored.body(), source.body());
        }
    }
}
