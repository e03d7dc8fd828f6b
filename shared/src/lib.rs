//! Deterministic fighter combat core, shared by the authoritative server
//! module and every client.
//!
//! Time is an integer tick counter. Nothing in here reads a clock or a float
//! timer, so the same inputs produce the same outcome on every peer.

pub mod anim;
pub mod arena;
pub mod body;
pub mod combo;
pub mod config;
pub mod fighter;
pub mod fsm;
pub mod hit;
pub mod hitbox;
pub mod replication;

/// Fixed simulation tick. Compare with `wrapping_sub`.
pub type Tick = u32;

/// Stable fighter id. Fighters are always iterated in ascending order.
pub type FighterId = u64;
