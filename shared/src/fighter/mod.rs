//! A fighter: the behavior state graph driving one combat context.
//!
//! Every mutable value lives in [`Combatant`]; states are stateless policies
//! over it. That lets the authority rebuild a fighter from stored rows and
//! resume it mid-state.

mod states;
#[cfg(test)]
mod tests;

pub use states::{Attack, Dash, Die, Hit, Idle, Jump, Move};

use std::sync::Arc;

use glam::Vec2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::anim::AnimationId;
use crate::body::{Body, Facing};
use crate::combo::{AttackStarted, ComboEngine, InputKind};
use crate::config::{FighterConfig, Loadout};
use crate::fsm::{FsmError, Role, State, StateId, StateMachine};
use crate::hit::{HitPayload, HitRuntimeState};
use crate::hitbox::{Hitbox, Hurtbox};
use crate::{FighterId, Tick};

/// Horizontal input below this is treated as no input.
pub const MOVE_DEAD_ZONE: f32 = 0.1;

/// One tick of player intent. The axis is a held level, the buttons are
/// presses that last a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FighterInput {
    pub axis: Vec2,
    pub jump: bool,
    pub dash: bool,
    pub attack: bool,
}

impl FighterInput {
    pub fn attack_kind(&self) -> InputKind {
        InputKind::from_axis(self.axis)
    }

    pub fn clear_edges(&mut self) {
        self.jump = false;
        self.dash = false;
        self.attack = false;
    }
}

/// Jump and dash resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MovementState {
    pub jumps_used: u8,
    pub dash_charges: u8,
    pub dash_start: Tick,
    pub dash_cooldown_start: Tick,
    pub dash_cooling: bool,
}

impl MovementState {
    pub fn new(config: &FighterConfig) -> Self {
        Self {
            dash_charges: config.max_dash_charges,
            ..Default::default()
        }
    }
}

/// Raised by a fighter during a tick, collected by the arena.
#[derive(Debug, Clone, PartialEq)]
pub enum FighterEvent {
    AttackStarted(AttackStarted),
    Died,
}

/// Clip presentation should be playing. `plays` is bumped on every start so
/// restarting the same clip is observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Presentation {
    pub clip: AnimationId,
    pub plays: u32,
}

/// Everything a fighter's states read and write.
pub struct Combatant<B> {
    pub id: FighterId,
    pub role: Role,
    pub now: Tick,
    pub config: Arc<FighterConfig>,
    pub body: B,
    pub input: FighterInput,
    pub input_enabled: bool,
    pub health: u32,
    pub combo: ComboEngine,
    /// Set once the current attack instance has picked a target.
    pub attack_landed: bool,
    pub hit: HitRuntimeState,
    /// Accepted hit waiting for the Hit state to consume it.
    pub incoming: Option<HitPayload>,
    pub movement: MovementState,
    /// External request to leave Die.
    pub round_reset: bool,
    pub death_reported: bool,
    pub presentation: Presentation,
    pub events: Vec<FighterEvent>,
}

impl<B: Body> Combatant<B> {
    fn new(id: FighterId, role: Role, loadout: &Loadout, body: B) -> Self {
        let config = loadout.config.clone();
        Self {
            id,
            role,
            now: 0,
            combo: ComboEngine::new(
                role,
                loadout.combo.clone(),
                config.max_energy,
                config.starting_energy,
            ),
            health: config.max_health,
            movement: MovementState::new(&config),
            config,
            body,
            input: FighterInput::default(),
            input_enabled: true,
            attack_landed: false,
            hit: HitRuntimeState::default(),
            incoming: None,
            round_reset: false,
            death_reported: false,
            presentation: Presentation::default(),
            events: Vec::new(),
        }
    }

    pub fn is_authority(&self) -> bool {
        self.role.is_authority()
    }

    /// Input as the states see it: nothing while input is disabled.
    pub fn intent(&self) -> FighterInput {
        if self.input_enabled {
            self.input
        } else {
            FighterInput::default()
        }
    }

    pub fn is_grounded(&self) -> bool {
        self.body.is_grounded()
    }

    pub fn is_airborne(&self) -> bool {
        !self.body.is_grounded()
    }

    /// On the floor and not still moving up.
    pub fn has_landed(&self) -> bool {
        self.body.is_grounded() && self.body.velocity().y <= 0.0
    }

    pub fn is_dead(&self) -> bool {
        self.health == 0
    }

    pub fn has_incoming_hit(&self) -> bool {
        self.incoming.is_some() && !self.is_dead()
    }

    pub fn wants_move(&self) -> bool {
        self.intent().axis.x.abs() > MOVE_DEAD_ZONE
    }

    /// Ignores disabled input; used when input is about to be re-enabled.
    pub fn holds_move(&self) -> bool {
        self.input.axis.x.abs() > MOVE_DEAD_ZONE
    }

    pub fn can_jump(&self) -> bool {
        self.movement.jumps_used < self.config.max_jumps
    }

    pub fn wants_jump(&self) -> bool {
        self.intent().jump && self.can_jump()
    }

    pub fn can_dash(&self) -> bool {
        self.movement.dash_charges > 0
    }

    pub fn wants_dash(&self) -> bool {
        self.intent().dash && self.can_dash()
    }

    pub fn wants_attack(&self) -> bool {
        let intent = self.intent();
        intent.attack
            && self
                .combo
                .can_execute_attack(intent.attack_kind(), self.is_grounded())
    }

    pub fn dash_over(&self) -> bool {
        self.now.wrapping_sub(self.movement.dash_start) >= self.config.dash_ticks
    }

    pub fn hitstun_over(&self) -> bool {
        self.hit.hitstun_over(self.now)
    }

    pub fn hurtbox(&self) -> Hurtbox {
        let size = self.config.hurtbox_size;
        Hurtbox {
            center: self.body.position() + Vec2::new(0.0, size.y * 0.5),
            size,
            layer: self.config.hurtbox_layer,
        }
    }

    pub(crate) fn play(&mut self, clip: AnimationId) {
        self.presentation.clip = clip;
        self.presentation.plays = self.presentation.plays.wrapping_add(1);
    }

    pub(crate) fn face_input(&mut self) {
        if let Some(facing) = Facing::from_x(self.intent().axis.x) {
            self.body.set_facing(facing);
        }
    }

    /// Timers that run regardless of the current state. Jump charges come
    /// back as soon as the body is on the floor, before any transition reads
    /// them.
    fn housekeeping(&mut self) {
        self.hit.refresh(self.now);
        if self.has_landed() {
            self.movement.jumps_used = 0;
        }
        let movement = &mut self.movement;
        if movement.dash_cooling
            && self.now.wrapping_sub(movement.dash_cooldown_start) >= self.config.dash_cooldown_ticks
        {
            movement.dash_charges = self.config.max_dash_charges;
            movement.dash_cooling = false;
            debug!(fighter = self.id, "dash charges refilled");
        }
    }
}

/// Ids of the registered behavior states. Identical on every peer because
/// the graph is always built in the same order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateIds {
    pub idle: StateId,
    pub moving: StateId,
    pub jump: StateId,
    pub dash: StateId,
    pub attack: StateId,
    pub hit: StateId,
    pub die: StateId,
}

fn build_graph<B: Body + 'static>(
    role: Role,
) -> Result<(StateMachine<Combatant<B>>, StateIds), FsmError> {
    let mut m: StateMachine<Combatant<B>> = StateMachine::new(role);
    let ids = StateIds {
        idle: m.register_state(Idle)?,
        moving: m.register_state(Move)?,
        jump: m.register_state(Jump)?,
        dash: m.register_state(Dash)?,
        attack: m.register_state(Attack)?,
        hit: m.register_state(Hit)?,
        die: m.register_state(Die)?,
    };
    let StateIds {
        idle,
        moving,
        jump,
        dash,
        attack,
        hit,
        die,
    } = ids;

    // Die outranks Hit.
    m.add_any_transition(die, Combatant::is_dead)?;
    m.add_any_transition(hit, Combatant::has_incoming_hit)?;

    m.add_transition(idle, attack, Combatant::wants_attack)?;
    m.add_transition(idle, dash, Combatant::wants_dash)?;
    m.add_transition(idle, jump, Combatant::wants_jump)?;
    m.add_transition(idle, jump, Combatant::is_airborne)?;
    m.add_transition(idle, moving, Combatant::wants_move)?;

    m.add_transition(moving, attack, Combatant::wants_attack)?;
    m.add_transition(moving, dash, Combatant::wants_dash)?;
    m.add_transition(moving, jump, Combatant::wants_jump)?;
    m.add_transition(moving, jump, Combatant::is_airborne)?;
    m.add_transition(moving, idle, |c| !c.wants_move())?;

    // Jump -> Jump re-enters and spends the next charge.
    m.add_transition(jump, jump, Combatant::wants_jump)?;
    m.add_transition(jump, dash, Combatant::wants_dash)?;
    m.add_transition(jump, attack, Combatant::wants_attack)?;
    m.add_transition(jump, moving, |c| c.has_landed() && c.wants_move())?;
    m.add_transition(jump, idle, Combatant::has_landed)?;

    m.add_transition(dash, jump, |c| c.dash_over() && c.wants_jump())?;
    m.add_transition(dash, moving, |c| {
        c.dash_over() && c.is_grounded() && c.wants_move()
    })?;
    m.add_transition(dash, idle, |c| c.dash_over() && c.is_grounded())?;
    m.add_transition(dash, jump, Combatant::dash_over)?;

    // A press on the tick the window closed starts a fresh combo.
    m.add_transition(attack, attack, |c| {
        !c.combo.is_executing() && c.wants_attack()
    })?;
    m.add_transition(attack, jump, |c| {
        !c.combo.is_executing() && c.is_airborne()
    })?;
    m.add_transition(attack, moving, |c| {
        !c.combo.is_executing() && c.wants_move()
    })?;
    m.add_transition(attack, idle, |c| !c.combo.is_executing())?;

    m.add_transition(hit, moving, |c| {
        c.hitstun_over() && c.is_grounded() && c.holds_move()
    })?;
    m.add_transition(hit, idle, |c| c.hitstun_over() && c.is_grounded())?;
    m.add_transition(hit, jump, Combatant::hitstun_over)?;

    m.add_transition(die, idle, |c| c.round_reset && !c.is_dead())?;

    Ok((m, ids))
}

pub struct Fighter<B: Body + 'static> {
    pub(crate) machine: StateMachine<Combatant<B>>,
    pub(crate) ctx: Combatant<B>,
    states: StateIds,
}

impl<B: Body + 'static> Fighter<B> {
    /// A fighter with its graph built but no state entered yet.
    pub fn new(id: FighterId, role: Role, loadout: &Loadout, body: B) -> Result<Self, FsmError> {
        let (machine, states) = build_graph(role)?;
        Ok(Self {
            machine,
            ctx: Combatant::new(id, role, loadout, body),
            states,
        })
    }

    /// Authority fighter entering Idle.
    pub fn spawn(id: FighterId, loadout: &Loadout, body: B) -> Result<Self, FsmError> {
        let mut fighter = Self::new(id, Role::Authority, loadout, body)?;
        fighter.machine.initialize(fighter.states.idle, &mut fighter.ctx)?;
        Ok(fighter)
    }

    /// Replica fighter. It enters its first state when the first snapshot
    /// is applied and `frame_update` runs.
    pub fn replica(id: FighterId, loadout: &Loadout, body: B) -> Result<Self, FsmError> {
        Self::new(id, Role::Replica, loadout, body)
    }

    pub fn id(&self) -> FighterId {
        self.ctx.id
    }

    pub fn role(&self) -> Role {
        self.ctx.role
    }

    pub fn states(&self) -> &StateIds {
        &self.states
    }

    pub fn state(&self) -> Option<StateId> {
        self.machine.current()
    }

    pub fn state_name(&self) -> Option<&'static str> {
        self.machine.current_name()
    }

    pub fn is_in<S: State<Combatant<B>>>(&self) -> bool {
        self.machine.is_in::<S>()
    }

    pub fn context(&self) -> &Combatant<B> {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut Combatant<B> {
        &mut self.ctx
    }

    pub fn body(&self) -> &B {
        &self.ctx.body
    }

    pub fn body_mut(&mut self) -> &mut B {
        &mut self.ctx.body
    }

    pub fn health(&self) -> u32 {
        self.ctx.health
    }

    pub fn is_dead(&self) -> bool {
        self.ctx.is_dead()
    }

    pub fn combo(&self) -> &ComboEngine {
        &self.ctx.combo
    }

    pub fn hurtbox(&self) -> Hurtbox {
        self.ctx.hurtbox()
    }

    pub fn set_input(&mut self, input: FighterInput) {
        self.ctx.input = input;
    }

    /// One authoritative tick: timers, then transitions or the current
    /// state's fixed update. Button presses are consumed either way.
    pub fn fixed_tick(&mut self, now: Tick) -> Result<Option<StateId>, FsmError> {
        self.ctx.now = now;
        self.ctx.housekeeping();
        let entered = self.machine.fixed_tick(&mut self.ctx);
        self.ctx.input.clear_edges();
        entered
    }

    /// Per-frame hook. Replicas replay state changes received since the
    /// last call.
    pub fn frame_update(&mut self) -> Result<(), FsmError> {
        self.machine.frame_update(&mut self.ctx)
    }

    /// Applies an accepted hit and forces Hit (or Die) right away. Returns
    /// `false` when the hit is refused: invincible, dead, or still in Die
    /// waiting for a round reset to take effect.
    pub fn take_hit(&mut self, payload: HitPayload, now: Tick) -> Result<bool, FsmError> {
        if !self.ctx.is_authority() {
            return Err(FsmError::NotAuthority("apply hits"));
        }
        if self.ctx.is_dead() || self.machine.is_in::<Die>() || self.ctx.hit.is_invincible() {
            debug!(
                fighter = self.ctx.id,
                attacker = payload.attacker,
                "hit refused"
            );
            return Ok(false);
        }
        self.ctx.now = now;
        self.ctx.health = self.ctx.health.saturating_sub(payload.damage);
        self.ctx.incoming = Some(payload);
        self.machine.preempt(&mut self.ctx)?;
        Ok(true)
    }

    /// World-space hitbox of the attack in progress, until it picks a target.
    pub fn active_hitbox(&self) -> Option<Hitbox> {
        if self.ctx.is_dead() || self.ctx.attack_landed {
            return None;
        }
        self.ctx
            .combo
            .hitbox(self.ctx.body.position(), self.ctx.body.facing())
    }

    /// Debounces the current attack instance.
    pub fn mark_attack_landed(&mut self) {
        self.ctx.attack_landed = true;
    }

    /// Energy gain for a hit the target accepted. Returns the scaled damage.
    pub fn register_landed_hit(&mut self) -> Option<u32> {
        self.ctx.combo.process_hit()
    }

    /// Drops whatever the fighter is doing and returns it to Idle.
    pub fn force_idle(&mut self) -> Result<bool, FsmError> {
        self.ctx.combo.reset_combo();
        self.ctx.incoming = None;
        self.machine.change_state(self.states.idle, &mut self.ctx)
    }

    /// Restores health, energy and every runtime state. A dead fighter leaves
    /// Die on its next tick; anyone else goes to Idle immediately.
    pub fn reset_round(&mut self) -> Result<(), FsmError> {
        if !self.ctx.is_authority() {
            return Err(FsmError::NotAuthority("reset the round"));
        }
        let ctx = &mut self.ctx;
        ctx.health = ctx.config.max_health;
        ctx.combo.reset_round(ctx.config.starting_energy);
        ctx.hit = HitRuntimeState::default();
        ctx.incoming = None;
        ctx.movement = MovementState::new(&ctx.config);
        ctx.attack_landed = false;
        ctx.death_reported = false;

        if self.machine.is_in::<Die>() {
            self.ctx.round_reset = true;
        } else {
            self.ctx.round_reset = false;
            self.ctx.input_enabled = true;
            self.machine.change_state(self.states.idle, &mut self.ctx)?;
        }
        debug!(fighter = self.ctx.id, "round reset");
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<FighterEvent> {
        std::mem::take(&mut self.ctx.events)
    }
}
