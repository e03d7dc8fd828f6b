//! Hit runtime state: hitstun timing, knockback decay and invincibility.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::{FighterId, Tick};

/// Everything an accepted hit hands to the target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HitPayload {
    pub attacker: FighterId,
    pub damage: u32,
    pub knockback: Vec2,
    pub hitstun: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HitRuntimeState {
    pub hit_start: Tick,
    pub hitstun: u32,
    pub knockback: Vec2,
    pub knockback_applied: bool,
    pub post_hit_invincible: bool,
    /// Ticks of post-hit invincibility counted from `hit_start`.
    pub invincible_for: u32,
    pub dash_invincible: bool,
}

impl HitRuntimeState {
    pub fn is_invincible(&self) -> bool {
        self.post_hit_invincible || self.dash_invincible
    }

    /// Starts hitstun for `payload`. Invincibility outlasts the stun by
    /// `extra_invincibility` ticks.
    pub fn begin(&mut self, payload: &HitPayload, now: Tick, extra_invincibility: u32) {
        self.hit_start = now;
        self.hitstun = payload.hitstun;
        self.knockback = payload.knockback;
        self.knockback_applied = false;
        self.post_hit_invincible = true;
        self.invincible_for = payload.hitstun.saturating_add(extra_invincibility);
    }

    pub fn elapsed(&self, now: Tick) -> u32 {
        now.wrapping_sub(self.hit_start)
    }

    pub fn hitstun_over(&self, now: Tick) -> bool {
        self.elapsed(now) >= self.hitstun
    }

    /// Expires post-hit invincibility once its window has elapsed.
    pub fn refresh(&mut self, now: Tick) {
        if self.post_hit_invincible && self.elapsed(now) >= self.invincible_for {
            self.post_hit_invincible = false;
        }
    }

    /// One tick of multiplicative decay. Snaps to zero below `floor`.
    pub fn decay_knockback(&mut self, factor: f32, floor: f32) -> Vec2 {
        self.knockback *= factor;
        if self.knockback.length() < floor {
            self.knockback = Vec2::ZERO;
        }
        self.knockback
    }

    pub fn clear_knockback(&mut self) {
        self.knockback = Vec2::ZERO;
        self.knockback_applied = false;
    }
}
