use brawl_shared::body::{Facing, KinematicBody};
use brawl_shared::fighter::MovementState;
use brawl_shared::replication::{FighterRecord, FighterSnapshot};
use glam::Vec2;

/// Fighter state stored on the server (authoritative). Replicas read the
/// replicated columns; the bookkeeping columns only matter to the tick.
#[spacetimedb::table(name = fighter, public)]
#[derive(Clone)]
pub struct Fighter {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    #[unique]
    pub identity: spacetimedb::Identity,
    pub name: Option<String>,
    pub online: bool,
    pub last_update: i64,

    // Body
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub facing_right: bool,
    pub grounded: bool,
    pub gravity_scale: f32,
    pub player_collisions: bool,
    pub frozen: bool,

    // Replicated
    pub state: u8,
    pub entry_seq: u8,
    pub combo_index: u8,
    pub phase: u8,
    pub attack_start: u32,
    pub hit_start: u32,
    pub energy: u32,
    pub health: u32,
    pub flags: u8,
    pub knockback_x: f32,
    pub knockback_y: f32,

    // Authority bookkeeping
    pub hitstun: u32,
    pub invincible_for: u32,
    pub knockback_applied: bool,
    pub jumps_used: u8,
    pub dash_charges: u8,
    pub dash_start: u32,
    pub dash_cooldown_start: u32,
    pub dash_cooling: bool,
    pub attack_landed: bool,
    pub input_enabled: bool,
    pub death_reported: bool,
    pub round_reset: bool,
}

impl Fighter {
    pub fn body(&self) -> KinematicBody {
        KinematicBody {
            position: Vec2::new(self.x, self.y),
            velocity: Vec2::new(self.vel_x, self.vel_y),
            facing: if self.facing_right {
                Facing::Right
            } else {
                Facing::Left
            },
            gravity_scale: self.gravity_scale,
            grounded: self.grounded,
            player_collisions: self.player_collisions,
            frozen: self.frozen,
            ..Default::default()
        }
    }

    pub fn record(&self) -> FighterRecord {
        FighterRecord {
            snapshot: FighterSnapshot {
                id: self.id,
                state: self.state,
                entry_seq: self.entry_seq,
                combo_index: self.combo_index,
                phase: self.phase,
                attack_start: self.attack_start,
                hit_start: self.hit_start,
                energy: self.energy,
                health: self.health,
                flags: self.flags,
                knockback: Vec2::new(self.knockback_x, self.knockback_y),
            },
            hitstun: self.hitstun,
            invincible_for: self.invincible_for,
            knockback_applied: self.knockback_applied,
            movement: MovementState {
                jumps_used: self.jumps_used,
                dash_charges: self.dash_charges,
                dash_start: self.dash_start,
                dash_cooldown_start: self.dash_cooldown_start,
                dash_cooling: self.dash_cooling,
            },
            attack_landed: self.attack_landed,
            input_enabled: self.input_enabled,
            death_reported: self.death_reported,
            round_reset: self.round_reset,
        }
    }

    /// Copies simulation output back into the row.
    pub fn store(&mut self, body: &KinematicBody, record: &FighterRecord) {
        self.x = body.position.x;
        self.y = body.position.y;
        self.vel_x = body.velocity.x;
        self.vel_y = body.velocity.y;
        self.facing_right = body.facing == Facing::Right;
        self.grounded = body.grounded;
        self.gravity_scale = body.gravity_scale;
        self.player_collisions = body.player_collisions;
        self.frozen = body.frozen;

        let s = &record.snapshot;
        self.state = s.state;
        self.entry_seq = s.entry_seq;
        self.combo_index = s.combo_index;
        self.phase = s.phase;
        self.attack_start = s.attack_start;
        self.hit_start = s.hit_start;
        self.energy = s.energy;
        self.health = s.health;
        self.flags = s.flags;
        self.knockback_x = s.knockback.x;
        self.knockback_y = s.knockback.y;

        self.hitstun = record.hitstun;
        self.invincible_for = record.invincible_for;
        self.knockback_applied = record.knockback_applied;
        self.jumps_used = record.movement.jumps_used;
        self.dash_charges = record.movement.dash_charges;
        self.dash_start = record.movement.dash_start;
        self.dash_cooldown_start = record.movement.dash_cooldown_start;
        self.dash_cooling = record.movement.dash_cooling;
        self.attack_landed = record.attack_landed;
        self.input_enabled = record.input_enabled;
        self.death_reported = record.death_reported;
        self.round_reset = record.round_reset;
    }
}

/// Latest input per fighter. Presses accumulate until the next tick
/// consumes them; the axis is overwritten.
#[spacetimedb::table(name = fighter_input)]
#[derive(Clone)]
pub struct PendingInput {
    #[primary_key]
    pub fighter_id: u64,
    pub sequence: u32,
    pub axis_x: f32,
    pub axis_y: f32,
    pub jump: bool,
    pub dash: bool,
    pub attack: bool,
}

/// Ephemeral attack start, consumed by clients to trigger animations.
#[spacetimedb::table(name = attack_started_event, public)]
pub struct AttackStartedEvent {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub fighter_id: u64,
    pub attack: String,
    pub animation: u16,
    pub combo_index: u8,
    pub start_tick: u32,
    pub timestamp: i64,
}

/// Ephemeral hit result, consumed by clients for VFX and damage numbers.
#[spacetimedb::table(name = attack_hit_event, public)]
pub struct AttackHitEvent {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub attacker: u64,
    pub target: u64,
    pub attack: String,
    pub x: f32,
    pub y: f32,
    pub damage: u32,
    pub tick: u32,
    pub timestamp: i64,
}

/// Single row: the shared tick counter and the freeze switch.
#[spacetimedb::table(name = match_state, public)]
pub struct MatchState {
    #[primary_key]
    pub id: u32,
    pub tick: u32,
    pub frozen: bool,
    pub round: u32,
    pub deaths: u32,
}

/// Scheduled fixed tick.
#[spacetimedb::table(name = tick_schedule, scheduled(crate::simulation::game_tick))]
pub struct TickSchedule {
    #[primary_key]
    #[auto_inc]
    pub scheduled_id: u64,
    pub scheduled_at: spacetimedb::ScheduleAt,
}
