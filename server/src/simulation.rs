use std::sync::OnceLock;

use brawl_shared::arena::{Arena, CombatEvent, MatchOrchestrator};
use brawl_shared::body::KinematicBody;
use brawl_shared::config::{CombatTables, Loadout};
use brawl_shared::fighter::{Fighter as SimFighter, FighterInput};
use brawl_shared::FighterId;
use glam::Vec2;
use spacetimedb::Table;

use crate::schema::*;
use crate::{EVENT_TTL_MICROS, MATCH_ID};

/// Round flow as seen by one tick: the freeze switch in, deaths out.
pub struct MatchFlow {
    frozen: bool,
    deaths: Vec<FighterId>,
}

impl MatchOrchestrator for MatchFlow {
    fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn on_fighter_died(&mut self, fighter: FighterId) {
        log::info!("Fighter {fighter} died");
        self.deaths.push(fighter);
    }
}

type ServerArena = Arena<KinematicBody, MatchFlow>;

/// Combat tables are compiled into the module and parsed once.
pub fn combat_tables() -> Result<&'static CombatTables, String> {
    static TABLES: OnceLock<Result<CombatTables, String>> = OnceLock::new();
    TABLES
        .get_or_init(|| CombatTables::builtin().map_err(|e| e.to_string()))
        .as_ref()
        .map_err(Clone::clone)
}

pub fn loadout() -> Result<Loadout, String> {
    combat_tables().map(CombatTables::loadout)
}

/// Rebuilds the arena from the online fighter rows.
fn load_arena(ctx: &spacetimedb::ReducerContext, state: &MatchState) -> Result<ServerArena, String> {
    let loadout = loadout()?;
    let mut arena = Arena::starting_at(
        state.tick,
        MatchFlow {
            frozen: state.frozen,
            deaths: Vec::new(),
        },
    );
    for row in ctx.db.fighter().iter().filter(|f| f.online) {
        let fighter = SimFighter::restore(&loadout, row.body(), &row.record())
            .map_err(|e| format!("fighter {}: {e}", row.id))?;
        arena.insert(fighter).map_err(|e| e.to_string())?;
    }
    Ok(arena)
}

/// Writes every simulated fighter back into its row.
fn store_arena(ctx: &spacetimedb::ReducerContext, arena: &ServerArena) {
    let now = ctx.timestamp.to_micros_since_unix_epoch();
    for fighter in arena.fighters() {
        let Some(mut row) = ctx.db.fighter().id().find(fighter.id()) else {
            continue;
        };
        row.store(fighter.body(), &fighter.record());
        row.last_update = now;
        ctx.db.fighter().id().update(row);
    }
}

fn match_state(ctx: &spacetimedb::ReducerContext) -> Option<MatchState> {
    let state = ctx.db.match_state().id().find(MATCH_ID);
    if state.is_none() {
        log::warn!("Match state row is missing");
    }
    state
}

/// Hands pending input to the arena and consumes the presses.
fn apply_inputs(ctx: &spacetimedb::ReducerContext, arena: &mut ServerArena) {
    let pending: Vec<PendingInput> = ctx.db.fighter_input().iter().collect();
    for input in pending {
        let intent = FighterInput {
            axis: Vec2::new(input.axis_x, input.axis_y),
            jump: input.jump,
            dash: input.dash,
            attack: input.attack,
        };
        if arena.set_input(input.fighter_id, intent).is_err() {
            continue;
        }
        ctx.db.fighter_input().fighter_id().update(PendingInput {
            jump: false,
            dash: false,
            attack: false,
            ..input
        });
    }
}

fn prune_events(ctx: &spacetimedb::ReducerContext, now: i64) {
    let stale_threshold = now - EVENT_TTL_MICROS;
    let stale_started: Vec<AttackStartedEvent> = ctx
        .db
        .attack_started_event()
        .iter()
        .filter(|e| e.timestamp < stale_threshold)
        .collect();
    for event in stale_started {
        ctx.db.attack_started_event().delete(event);
    }
    let stale_hits: Vec<AttackHitEvent> = ctx
        .db
        .attack_hit_event()
        .iter()
        .filter(|e| e.timestamp < stale_threshold)
        .collect();
    for event in stale_hits {
        ctx.db.attack_hit_event().delete(event);
    }
}

fn publish_events(ctx: &spacetimedb::ReducerContext, events: Vec<CombatEvent>, now: i64) {
    for event in events {
        match event {
            CombatEvent::AttackStarted {
                fighter,
                attack,
                animation,
                combo_index,
                start_tick,
            } => {
                ctx.db.attack_started_event().insert(AttackStartedEvent {
                    id: 0,
                    fighter_id: fighter,
                    attack,
                    animation: animation.0,
                    combo_index,
                    start_tick,
                    timestamp: now,
                });
            }
            CombatEvent::AttackHit {
                attacker,
                target,
                attack,
                position,
                damage,
                tick,
            } => {
                ctx.db.attack_hit_event().insert(AttackHitEvent {
                    id: 0,
                    attacker,
                    target,
                    attack,
                    x: position.x,
                    y: position.y,
                    damage,
                    tick,
                    timestamp: now,
                });
            }
        }
    }
}

/// Fixed tick: rebuild the arena from rows, step it once, write it back.
#[spacetimedb::reducer]
pub fn game_tick(ctx: &spacetimedb::ReducerContext, _args: TickSchedule) {
    let now = ctx.timestamp.to_micros_since_unix_epoch();
    prune_events(ctx, now);

    let Some(state) = match_state(ctx) else {
        return;
    };
    if state.frozen {
        return;
    }
    let mut arena = match load_arena(ctx, &state) {
        Ok(arena) => arena,
        Err(e) => {
            log::error!("Failed to rebuild arena: {e}");
            return;
        }
    };

    apply_inputs(ctx, &mut arena);
    arena.step();
    store_arena(ctx, &arena);
    publish_events(ctx, arena.drain_events(), now);

    let deaths = arena.orchestrator().deaths.len() as u32;
    ctx.db.match_state().id().update(MatchState {
        tick: arena.tick(),
        deaths: state.deaths + deaths,
        ..state
    });
}

/// Restores every fighter for a new round.
#[spacetimedb::reducer]
pub fn reset_round(ctx: &spacetimedb::ReducerContext) {
    let Some(state) = match_state(ctx) else {
        return;
    };
    let mut arena = match load_arena(ctx, &state) {
        Ok(arena) => arena,
        Err(e) => {
            log::error!("Failed to rebuild arena: {e}");
            return;
        }
    };
    if let Err(e) = arena.reset_round() {
        log::error!("Round reset failed: {e}");
        return;
    }
    store_arena(ctx, &arena);
    log::info!("Round {} starting", state.round + 1);
    ctx.db.match_state().id().update(MatchState {
        round: state.round + 1,
        deaths: 0,
        ..state
    });
}

/// Pauses or resumes the whole match. Bodies freeze with it.
#[spacetimedb::reducer]
pub fn set_frozen(ctx: &spacetimedb::ReducerContext, frozen: bool) {
    let Some(state) = match_state(ctx) else {
        return;
    };
    let mut arena = match load_arena(ctx, &state) {
        Ok(arena) => arena,
        Err(e) => {
            log::error!("Failed to rebuild arena: {e}");
            return;
        }
    };
    arena.freeze_simulation(frozen);
    store_arena(ctx, &arena);
    ctx.db.match_state().id().update(MatchState { frozen, ..state });
}

/// Cancels whatever the caller's fighter is doing.
#[spacetimedb::reducer]
pub fn force_idle(ctx: &spacetimedb::ReducerContext) {
    let Some(row) = ctx.db.fighter().identity().find(ctx.sender) else {
        return;
    };
    let Some(state) = match_state(ctx) else {
        return;
    };
    let mut arena = match load_arena(ctx, &state) {
        Ok(arena) => arena,
        Err(e) => {
            log::error!("Failed to rebuild arena: {e}");
            return;
        }
    };
    match arena.force_idle(row.id) {
        Ok(_) => store_arena(ctx, &arena),
        Err(e) => log::warn!("Cannot force fighter {} idle: {e}", row.id),
    }
}
