use brawl_shared::body::{Body, Facing, KinematicBody};
use brawl_shared::fighter::Fighter as SimFighter;
use glam::Vec2;
use spacetimedb::Table;

use crate::schema::*;
use crate::simulation::loadout;
use crate::{MATCH_ID, SPAWN_SPACING, TICK_INTERVAL_MICROS};

#[spacetimedb::reducer(init)]
pub fn init(ctx: &spacetimedb::ReducerContext) {
    ctx.db.match_state().insert(MatchState {
        id: MATCH_ID,
        tick: 0,
        frozen: false,
        round: 1,
        deaths: 0,
    });
    ctx.db.tick_schedule().insert(TickSchedule {
        scheduled_id: 0,
        scheduled_at: spacetimedb::TimeDuration::from_micros(TICK_INTERVAL_MICROS).into(),
    });
    log::info!("Module initialized, ticking every {TICK_INTERVAL_MICROS}us");
}

/// Spawn slot for the n-th fighter: alternating sides of the origin, facing in.
fn spawn_body(slot: usize) -> KinematicBody {
    let side = if slot % 2 == 0 { -1.0 } else { 1.0 };
    let x = side * SPAWN_SPACING * (slot / 2 + 1) as f32;
    let mut body = KinematicBody::at(Vec2::new(x, 0.0));
    body.set_facing(if side < 0.0 { Facing::Right } else { Facing::Left });
    body
}

#[spacetimedb::reducer]
pub fn join_game(ctx: &spacetimedb::ReducerContext, name: Option<String>) {
    let now = ctx.timestamp.to_micros_since_unix_epoch();
    if let Some(existing) = ctx.db.fighter().identity().find(ctx.sender) {
        ctx.db.fighter().id().update(Fighter {
            online: true,
            last_update: now,
            ..existing
        });
        return;
    }

    let loadout = match loadout() {
        Ok(loadout) => loadout,
        Err(e) => {
            log::error!("Cannot spawn fighter: {e}");
            return;
        }
    };
    let slot = ctx.db.fighter().iter().filter(|f| f.online).count();
    let body = spawn_body(slot);
    let record = match SimFighter::spawn(0, &loadout, body.clone()) {
        Ok(fighter) => fighter.record(),
        Err(e) => {
            log::error!("Cannot spawn fighter: {e}");
            return;
        }
    };

    let mut row = Fighter {
        id: 0,
        identity: ctx.sender,
        name,
        online: true,
        last_update: now,
        x: 0.0,
        y: 0.0,
        vel_x: 0.0,
        vel_y: 0.0,
        facing_right: true,
        grounded: true,
        gravity_scale: 1.0,
        player_collisions: true,
        frozen: false,
        state: 0,
        entry_seq: 0,
        combo_index: 0,
        phase: 0,
        attack_start: 0,
        hit_start: 0,
        energy: 0,
        health: 0,
        flags: 0,
        knockback_x: 0.0,
        knockback_y: 0.0,
        hitstun: 0,
        invincible_for: 0,
        knockback_applied: false,
        jumps_used: 0,
        dash_charges: 0,
        dash_start: 0,
        dash_cooldown_start: 0,
        dash_cooling: false,
        attack_landed: false,
        input_enabled: true,
        death_reported: false,
        round_reset: false,
    };
    row.store(&body, &record);
    let row = ctx.db.fighter().insert(row);
    log::info!("Fighter {} joined in slot {slot}", row.id);
}

/// Queues input for the next tick. Presses are kept until a tick consumes
/// them, so a press between two ticks is never lost.
#[spacetimedb::reducer]
pub fn send_input(
    ctx: &spacetimedb::ReducerContext,
    sequence: u32,
    axis_x: f32,
    axis_y: f32,
    jump: bool,
    dash: bool,
    attack: bool,
) {
    let Some(fighter) = ctx.db.fighter().identity().find(ctx.sender) else {
        return;
    };
    if !fighter.online {
        return;
    }
    let axis_x = if axis_x.is_finite() { axis_x.clamp(-1.0, 1.0) } else { 0.0 };
    let axis_y = if axis_y.is_finite() { axis_y.clamp(-1.0, 1.0) } else { 0.0 };

    if let Some(pending) = ctx.db.fighter_input().fighter_id().find(fighter.id) {
        // Stale or duplicate packets.
        if sequence <= pending.sequence {
            return;
        }
        ctx.db.fighter_input().fighter_id().update(PendingInput {
            fighter_id: fighter.id,
            sequence,
            axis_x,
            axis_y,
            jump: pending.jump || jump,
            dash: pending.dash || dash,
            attack: pending.attack || attack,
        });
    } else {
        ctx.db.fighter_input().insert(PendingInput {
            fighter_id: fighter.id,
            sequence,
            axis_x,
            axis_y,
            jump,
            dash,
            attack,
        });
    }
}

#[spacetimedb::reducer]
pub fn leave_game(ctx: &spacetimedb::ReducerContext) {
    set_fighter_offline(ctx);
}

/// Server-authoritative disconnect handler. Fires when the WebSocket drops,
/// regardless of whether the client managed to call leave_game().
#[spacetimedb::reducer(client_disconnected)]
pub fn on_disconnect(ctx: &spacetimedb::ReducerContext) {
    set_fighter_offline(ctx);
}

fn set_fighter_offline(ctx: &spacetimedb::ReducerContext) {
    let Some(fighter) = ctx.db.fighter().identity().find(ctx.sender) else {
        return;
    };
    ctx.db.fighter_input().fighter_id().delete(fighter.id);
    log::info!("Fighter {} left", fighter.id);
    ctx.db.fighter().id().update(Fighter {
        online: false,
        last_update: ctx.timestamp.to_micros_since_unix_epoch(),
        ..fighter
    });
}
