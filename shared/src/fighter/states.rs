//! Behavior states. Gameplay effects only run on the authority; replicas
//! replay enter/exit for presentation.

use tracing::debug;

use super::{Combatant, FighterEvent};
use crate::anim::Clip;
use crate::body::{Body, Facing};
use crate::combo::AttackPhase;
use crate::fsm::State;

/// Gravity scale outside of jumps and dashes.
const DEFAULT_GRAVITY_SCALE: f32 = 1.0;

pub struct Idle;

impl<B: Body> State<Combatant<B>> for Idle {
    fn name(&self) -> &'static str {
        "idle"
    }

    fn enter(&self, ctx: &mut Combatant<B>) {
        ctx.play(Clip::Idle.id());
        if ctx.is_authority() {
            ctx.body.set_horizontal_velocity(0.0);
        }
    }
}

pub struct Move;

impl<B: Body> State<Combatant<B>> for Move {
    fn name(&self) -> &'static str {
        "move"
    }

    fn enter(&self, ctx: &mut Combatant<B>) {
        ctx.play(Clip::Run.id());
    }

    fn fixed_update(&self, ctx: &mut Combatant<B>) {
        let vx = ctx.intent().axis.x * ctx.config.move_speed;
        ctx.body.set_horizontal_velocity(vx);
        ctx.face_input();
    }
}

/// The airborne state. Entered with a jump press and a free charge it jumps;
/// otherwise it is a fall.
pub struct Jump;

impl<B: Body> State<Combatant<B>> for Jump {
    fn name(&self) -> &'static str {
        "jump"
    }

    fn enter(&self, ctx: &mut Combatant<B>) {
        ctx.play(Clip::Jump.id());
        if !ctx.is_authority() {
            return;
        }
        ctx.body.set_gravity_scale(ctx.config.air_gravity_scale);
        if ctx.wants_jump() {
            ctx.movement.jumps_used += 1;
            ctx.body.set_vertical_velocity(ctx.config.jump_impulse);
            debug!(
                fighter = ctx.id,
                jumps_used = ctx.movement.jumps_used,
                "jump"
            );
        }
    }

    fn fixed_update(&self, ctx: &mut Combatant<B>) {
        let vx = ctx.intent().axis.x * ctx.config.move_speed * ctx.config.air_control;
        ctx.body.set_horizontal_velocity(vx);
        ctx.face_input();
    }

    fn exit(&self, ctx: &mut Combatant<B>) {
        if ctx.is_authority() {
            ctx.body.set_gravity_scale(DEFAULT_GRAVITY_SCALE);
        }
    }
}

/// Horizontal burst. Spends a charge; the last charge starts the cooldown.
pub struct Dash;

impl<B: Body> State<Combatant<B>> for Dash {
    fn name(&self) -> &'static str {
        "dash"
    }

    fn enter(&self, ctx: &mut Combatant<B>) {
        ctx.play(Clip::Dash.id());
        if !ctx.is_authority() {
            return;
        }
        let now = ctx.now;
        let movement = &mut ctx.movement;
        movement.dash_charges = movement.dash_charges.saturating_sub(1);
        movement.dash_start = now;
        if movement.dash_charges == 0 {
            movement.dash_cooling = true;
            movement.dash_cooldown_start = now;
        }

        let facing = Facing::from_x(ctx.intent().axis.x).unwrap_or(ctx.body.facing());
        ctx.body.set_facing(facing);
        ctx.body
            .set_horizontal_velocity(facing.sign() * ctx.config.dash_speed);
        ctx.body.set_vertical_velocity(0.0);
        ctx.body.set_gravity_scale(0.0);
        ctx.body.set_player_collisions(false);
        ctx.hit.dash_invincible = true;
    }

    fn fixed_update(&self, ctx: &mut Combatant<B>) {
        let vx = ctx.body.facing().sign() * ctx.config.dash_speed;
        ctx.body.set_horizontal_velocity(vx);
    }

    fn exit(&self, ctx: &mut Combatant<B>) {
        if ctx.is_authority() {
            ctx.body.set_gravity_scale(DEFAULT_GRAVITY_SCALE);
            ctx.body.set_player_collisions(true);
            ctx.hit.dash_invincible = false;
        }
    }
}

/// Runs the combo engine. Each attack instance may hit once.
pub struct Attack;

impl<B: Body> State<Combatant<B>> for Attack {
    fn name(&self) -> &'static str {
        "attack"
    }

    fn enter(&self, ctx: &mut Combatant<B>) {
        if ctx.is_authority() {
            ctx.attack_landed = false;
            if ctx.is_grounded() {
                ctx.body.set_horizontal_velocity(0.0);
            }
            let kind = ctx.intent().attack_kind();
            let grounded = ctx.is_grounded();
            if let Ok(started) = ctx.combo.try_execute_attack(kind, grounded, ctx.now) {
                ctx.events.push(FighterEvent::AttackStarted(started));
            }
        }
        if let Some(clip) = ctx.combo.current_attack().map(|a| a.animation_id) {
            ctx.play(clip);
        }
    }

    fn fixed_update(&self, ctx: &mut Combatant<B>) {
        let intent = ctx.intent();
        if intent.attack && ctx.combo.phase() == AttackPhase::ComboWindow {
            let grounded = ctx.is_grounded();
            match ctx
                .combo
                .try_execute_combo_attack(intent.attack_kind(), grounded, ctx.now)
            {
                Ok(started) => {
                    ctx.attack_landed = false;
                    ctx.play(started.animation);
                    ctx.events.push(FighterEvent::AttackStarted(started));
                }
                Err(_) => ctx.combo.reset_combo(),
            }
        }
        ctx.combo.tick(ctx.now);
    }

    fn update(&self, ctx: &mut Combatant<B>) {
        // Replicas learn about continuations from the combo index only.
        if let Some(clip) = ctx.combo.current_attack().map(|a| a.animation_id) {
            if clip != ctx.presentation.clip {
                ctx.play(clip);
            }
        }
    }

    fn exit(&self, ctx: &mut Combatant<B>) {
        if ctx.is_authority() {
            ctx.combo.reset_combo();
            ctx.attack_landed = false;
        }
    }
}

/// Hitstun: input off, knockback applied once then decayed.
pub struct Hit;

impl<B: Body> State<Combatant<B>> for Hit {
    fn name(&self) -> &'static str {
        "hit"
    }

    fn enter(&self, ctx: &mut Combatant<B>) {
        ctx.play(Clip::Hit.id());
        if !ctx.is_authority() {
            return;
        }
        let Some(payload) = ctx.incoming.take() else {
            return;
        };
        ctx.hit
            .begin(&payload, ctx.now, ctx.config.post_hit_invincibility_ticks);
        ctx.input_enabled = false;
        ctx.combo.reset_combo();
        ctx.body.set_horizontal_velocity(payload.knockback.x);
        ctx.body.set_vertical_velocity(payload.knockback.y);
        ctx.hit.knockback_applied = true;
    }

    fn fixed_update(&self, ctx: &mut Combatant<B>) {
        // The entry tick already applied the full impulse.
        if ctx.now == ctx.hit.hit_start {
            return;
        }
        let knockback = ctx
            .hit
            .decay_knockback(ctx.config.knockback_decay, ctx.config.knockback_floor);
        ctx.body.set_horizontal_velocity(knockback.x);
    }

    fn exit(&self, ctx: &mut Combatant<B>) {
        if ctx.is_authority() {
            ctx.input_enabled = true;
            ctx.hit.clear_knockback();
        }
    }
}

pub struct Die;

impl<B: Body> State<Combatant<B>> for Die {
    fn name(&self) -> &'static str {
        "die"
    }

    fn enter(&self, ctx: &mut Combatant<B>) {
        ctx.play(Clip::Die.id());
        if !ctx.is_authority() {
            return;
        }
        ctx.input_enabled = false;
        ctx.incoming = None;
        ctx.combo.reset_combo();
        ctx.body.set_horizontal_velocity(0.0);
        ctx.body.set_vertical_velocity(0.0);
        ctx.body.set_frozen(true);
        if !ctx.death_reported {
            ctx.death_reported = true;
            ctx.events.push(FighterEvent::Died);
            debug!(fighter = ctx.id, "died");
        }
    }

    fn exit(&self, ctx: &mut Combatant<B>) {
        if ctx.is_authority() {
            ctx.body.set_frozen(false);
            ctx.input_enabled = true;
            ctx.round_reset = false;
        }
    }
}
