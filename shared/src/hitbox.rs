//! Hitbox geometry, target selection and knockback direction.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::FighterId;
use crate::body::Facing;

/// Collision layer bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerMask(pub u32);

impl LayerMask {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(u32::MAX);
    pub const FIGHTERS: Self = Self(1);

    pub fn intersects(self, other: LayerMask) -> bool {
        self.0 & other.0 != 0
    }
}

impl Default for LayerMask {
    fn default() -> Self {
        Self::FIGHTERS
    }
}

/// Hitbox as authored, relative to the attacker facing right.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HitboxDefinition {
    pub size: Vec2,
    pub offset: Vec2,
    #[serde(default)]
    pub layers: LayerMask,
}

impl HitboxDefinition {
    /// World-space box; the X offset is mirrored when facing left.
    pub fn resolve(&self, origin: Vec2, facing: Facing) -> Hitbox {
        Hitbox {
            center: origin + Vec2::new(self.offset.x * facing.sign(), self.offset.y),
            size: self.size,
            layers: self.layers,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hitbox {
    pub center: Vec2,
    pub size: Vec2,
    pub layers: LayerMask,
}

impl Hitbox {
    pub fn overlaps(&self, hurtbox: &Hurtbox) -> bool {
        let reach = (self.size + hurtbox.size) * 0.5;
        let delta = (self.center - hurtbox.center).abs();
        delta.x < reach.x && delta.y < reach.y
    }
}

/// Damageable area of a fighter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hurtbox {
    pub center: Vec2,
    pub size: Vec2,
    pub layer: LayerMask,
}

/// A fighter that might be struck this tick.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub id: FighterId,
    pub hurtbox: Hurtbox,
}

/// Picks the single target of a swing: overlapping, on a masked layer, not the
/// attacker. Ties go to the hurtbox center nearest the hitbox center, then to
/// the lowest id, so every peer picks the same fighter.
pub fn select_target(
    hitbox: &Hitbox,
    attacker: FighterId,
    candidates: impl IntoIterator<Item = Candidate>,
) -> Option<FighterId> {
    candidates
        .into_iter()
        .filter(|c| c.id != attacker)
        .filter(|c| hitbox.layers.intersects(c.hurtbox.layer))
        .filter(|c| hitbox.overlaps(&c.hurtbox))
        .map(|c| (hitbox.center.distance_squared(c.hurtbox.center), c.id))
        .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
        .map(|(_, id)| id)
}

/// Knockback from the authored vector: mirrored for a left-facing attacker,
/// then pointed away from the attacker's actual position.
pub fn knockback(authored: Vec2, attacker_facing: Facing, attacker_x: f32, target_x: f32) -> Vec2 {
    let mut velocity = Vec2::new(authored.x * attacker_facing.sign(), authored.y);
    if target_x > attacker_x {
        velocity.x = velocity.x.abs();
    } else if target_x < attacker_x {
        velocity.x = -velocity.x.abs();
    }
    velocity
}
