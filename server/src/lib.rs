//! Authoritative SpacetimeDB module: fighter rows in, one deterministic
//! combat tick out.

mod lifecycle;
mod schema;
mod simulation;

/// 60 Hz, matching the combat core's fixed step.
pub const TICK_INTERVAL_MICROS: i64 = 1_000_000 / brawl_shared::config::TICKS_PER_SECOND as i64;

/// Key of the single `match_state` row.
pub const MATCH_ID: u32 = 0;

/// Event rows older than this are pruned.
pub const EVENT_TTL_MICROS: i64 = 5_000_000;

/// Horizontal distance between spawn slots.
pub const SPAWN_SPACING: f32 = 2.5;
