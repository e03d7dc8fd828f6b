use std::sync::Arc;

use glam::Vec2;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{AttackDefinition, AttackPhase, ComboDefinition, InputKind};
use crate::Tick;
use crate::anim::AnimationId;
use crate::body::Facing;
use crate::fsm::Role;
use crate::hitbox::Hitbox;

/// Combo state owned by one fighter. Only the authority writes it; replicas
/// receive it verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ComboRuntimeState {
    /// One-based index of the attack in progress, 0 when idle.
    pub combo_index: u8,
    pub phase: AttackPhase,
    pub attack_start: Tick,
    pub energy: u32,
    pub executing: bool,
}

/// Presentation notification for a validated attack start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackStarted {
    pub name: String,
    pub animation: AnimationId,
    pub combo_index: u8,
    pub start_tick: Tick,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttackRejection {
    #[error("only the authority may start attacks")]
    NotAuthority,
    #[error("attack phase {0:?} does not accept this attack")]
    WrongPhase(AttackPhase),
    #[error("combo is already at its last attack")]
    ComboFinished,
    #[error("input {input:?} does not satisfy required {required:?}")]
    WrongInput {
        input: InputKind,
        required: InputKind,
    },
    #[error("attack requires the fighter to be grounded")]
    NotGrounded,
    #[error("not enough energy ({available} < {cost})")]
    NotEnoughEnergy { available: u32, cost: u32 },
    #[error("fighter has no combo definition")]
    MissingCombo,
    #[error("combo index {index} is outside a combo of length {len}")]
    IndexOutOfRange { index: u8, len: u8 },
}

impl AttackRejection {
    /// Broken definitions, as opposed to gameplay conditions.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::MissingCombo | Self::IndexOutOfRange { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    First,
    Continuation,
}

/// Frame-accurate attack timing, combo chaining and the energy resource.
#[derive(Debug, Clone)]
pub struct ComboEngine {
    role: Role,
    combo: Option<Arc<ComboDefinition>>,
    max_energy: u32,
    state: ComboRuntimeState,
}

impl ComboEngine {
    pub fn new(
        role: Role,
        combo: Option<Arc<ComboDefinition>>,
        max_energy: u32,
        starting_energy: u32,
    ) -> Self {
        Self {
            role,
            combo,
            max_energy,
            state: ComboRuntimeState {
                energy: starting_energy.min(max_energy),
                ..Default::default()
            },
        }
    }

    pub fn state(&self) -> &ComboRuntimeState {
        &self.state
    }

    /// Replaces the runtime state with a stored or replicated copy. Energy is
    /// clamped and an index without a phase is treated as idle.
    pub fn restore(&mut self, state: ComboRuntimeState) {
        self.state = state;
        self.state.energy = state.energy.min(self.max_energy);
        if state.combo_index == 0 || state.phase == AttackPhase::None {
            self.state.combo_index = 0;
            self.state.phase = AttackPhase::None;
            self.state.executing = false;
        }
    }

    pub fn combo(&self) -> Option<&ComboDefinition> {
        self.combo.as_deref()
    }

    pub fn combo_index(&self) -> u8 {
        self.state.combo_index
    }

    pub fn phase(&self) -> AttackPhase {
        self.state.phase
    }

    pub fn is_executing(&self) -> bool {
        self.state.executing
    }

    pub fn energy(&self) -> u32 {
        self.state.energy
    }

    pub fn max_energy(&self) -> u32 {
        self.max_energy
    }

    pub fn current_attack(&self) -> Option<&AttackDefinition> {
        self.combo()?.attack(self.state.combo_index)
    }

    pub fn can_execute_attack(&self, input: InputKind, grounded: bool) -> bool {
        self.validate(Gate::First, input, grounded).is_ok()
    }

    pub fn can_continue_combo(&self, input: InputKind, grounded: bool) -> bool {
        self.validate(Gate::Continuation, input, grounded).is_ok()
    }

    /// Starts the first attack of a combo. Requires phase `None`.
    pub fn try_execute_attack(
        &mut self,
        input: InputKind,
        grounded: bool,
        now: Tick,
    ) -> Result<AttackStarted, AttackRejection> {
        self.start(Gate::First, input, grounded, now)
    }

    /// Chains the next attack. Requires phase `ComboWindow`.
    pub fn try_execute_combo_attack(
        &mut self,
        input: InputKind,
        grounded: bool,
        now: Tick,
    ) -> Result<AttackStarted, AttackRejection> {
        self.start(Gate::Continuation, input, grounded, now)
    }

    /// Recomputes the phase from the tick delta. Once the combo window has
    /// passed the whole combo resets.
    pub fn tick(&mut self, now: Tick) -> AttackPhase {
        if !self.state.executing {
            return self.state.phase;
        }
        let elapsed = now.wrapping_sub(self.state.attack_start);
        let phase = match self.current_attack() {
            Some(attack) => attack.frames.phase_at(elapsed),
            None => {
                warn!(
                    combo_index = self.state.combo_index,
                    "executing attack has no definition, cancelling combo"
                );
                AttackPhase::None
            }
        };
        if phase == AttackPhase::None {
            debug!(combo_index = self.state.combo_index, "combo window closed");
            self.state = ComboRuntimeState {
                energy: self.state.energy,
                ..Default::default()
            };
        } else {
            self.state.phase = phase;
        }
        phase
    }

    /// Drops any attack in progress. Energy is kept. Idempotent.
    pub fn reset_combo(&mut self) {
        if !self.role.is_authority() {
            debug!("ignoring combo reset on a replica");
            return;
        }
        self.state = ComboRuntimeState {
            energy: self.state.energy,
            ..Default::default()
        };
    }

    /// Full reset for a new round, energy included.
    pub fn reset_round(&mut self, starting_energy: u32) {
        self.reset_combo();
        if self.role.is_authority() {
            self.state.energy = starting_energy.min(self.max_energy);
        }
    }

    pub fn is_hitbox_active(&self) -> bool {
        self.state.executing && self.state.phase == AttackPhase::Active
    }

    /// World-space hitbox of the active attack, mirrored for `facing`.
    pub fn hitbox(&self, origin: Vec2, facing: Facing) -> Option<Hitbox> {
        if !self.is_hitbox_active() {
            return None;
        }
        self.current_attack()
            .map(|attack| attack.hitbox.resolve(origin, facing))
    }

    /// Damage of the current attack scaled by combo depth, rounded.
    pub fn scaled_damage(&self) -> Option<u32> {
        let combo = self.combo()?;
        let attack = combo.attack(self.state.combo_index)?;
        let scaled = attack.damage as f32 * combo.scaling_at(self.state.combo_index);
        Some(scaled.round().max(0.0) as u32)
    }

    /// Registers a landed hit: returns the scaled damage and grants the
    /// attack's energy gain.
    pub fn process_hit(&mut self) -> Option<u32> {
        if !self.role.is_authority() {
            return None;
        }
        let damage = self.scaled_damage()?;
        let gain = self.current_attack().map_or(0, |a| a.energy_gain);
        self.state.energy = self.state.energy.saturating_add(gain).min(self.max_energy);
        Some(damage)
    }

    pub fn should_continue_combo(&self) -> bool {
        let len = self.combo().map_or(0, ComboDefinition::len);
        self.state.phase == AttackPhase::ComboWindow && self.state.combo_index < len
    }

    fn start(
        &mut self,
        gate: Gate,
        input: InputKind,
        grounded: bool,
        now: Tick,
    ) -> Result<AttackStarted, AttackRejection> {
        let attack = match self.validate(gate, input, grounded) {
            Ok(attack) => attack,
            Err(rejection) => {
                if rejection.is_configuration() {
                    warn!(%rejection, "attack refused by configuration");
                } else {
                    debug!(%rejection, "attack rejected");
                }
                return Err(rejection);
            }
        };
        let cost = attack.energy_cost;
        let name = attack.name.clone();
        let animation = attack.animation_id;

        self.state.energy -= cost;
        self.state.attack_start = now;
        self.state.phase = AttackPhase::Startup;
        self.state.combo_index += 1;
        self.state.executing = true;

        Ok(AttackStarted {
            name,
            animation,
            combo_index: self.state.combo_index,
            start_tick: now,
        })
    }

    fn validate(
        &self,
        gate: Gate,
        input: InputKind,
        grounded: bool,
    ) -> Result<&AttackDefinition, AttackRejection> {
        if !self.role.is_authority() {
            return Err(AttackRejection::NotAuthority);
        }
        let phase_ok = match gate {
            Gate::First => self.state.phase == AttackPhase::None,
            Gate::Continuation => self.state.phase == AttackPhase::ComboWindow,
        };
        if !phase_ok {
            return Err(AttackRejection::WrongPhase(self.state.phase));
        }

        let combo = self.combo().ok_or(AttackRejection::MissingCombo)?;
        let len = combo.len();
        let index = self.state.combo_index;
        if len == 0 || index > len {
            return Err(AttackRejection::IndexOutOfRange { index, len });
        }
        if index == len {
            return Err(AttackRejection::ComboFinished);
        }
        let attack = combo
            .attack(index + 1)
            .ok_or(AttackRejection::IndexOutOfRange { index, len })?;

        if !attack.input.accepts(input) {
            return Err(AttackRejection::WrongInput {
                input,
                required: attack.input,
            });
        }
        if attack.requires_grounded && !grounded {
            return Err(AttackRejection::NotGrounded);
        }
        if self.state.energy < attack.energy_cost {
            return Err(AttackRejection::NotEnoughEnergy {
                available: self.state.energy,
                cost: attack.energy_cost,
            });
        }
        Ok(attack)
    }
}
