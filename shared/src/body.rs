//! Movement primitives the combat core drives but does not own.

use glam::Vec2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Facing {
    Left,
    #[default]
    Right,
}

impl Facing {
    pub fn sign(self) -> f32 {
        match self {
            Facing::Left => -1.0,
            Facing::Right => 1.0,
        }
    }

    /// Facing implied by a horizontal direction, if it has one.
    pub fn from_x(x: f32) -> Option<Self> {
        if x > 0.0 {
            Some(Facing::Right)
        } else if x < 0.0 {
            Some(Facing::Left)
        } else {
            None
        }
    }
}

/// What the combat core needs from the movement layer.
pub trait Body {
    fn position(&self) -> Vec2;

    fn velocity(&self) -> Vec2;

    fn set_horizontal_velocity(&mut self, vx: f32);

    fn set_vertical_velocity(&mut self, vy: f32);

    fn is_grounded(&self) -> bool;

    fn facing(&self) -> Facing;

    fn set_facing(&mut self, facing: Facing);

    fn set_gravity_scale(&mut self, scale: f32);

    /// Whether this body collides with other fighters.
    fn set_player_collisions(&mut self, enabled: bool);

    /// A frozen body ignores velocity and gravity until unfrozen.
    fn set_frozen(&mut self, frozen: bool);

    /// Advances the movement layer by one tick. Bodies integrated by an
    /// external physics step leave this empty.
    fn step(&mut self, _dt: f32) {}
}

/// Axis-aligned kinematic body over a flat floor. The server module
/// integrates fighters with it, tests use it as the movement layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KinematicBody {
    pub position: Vec2,
    pub velocity: Vec2,
    pub facing: Facing,
    pub gravity: f32,
    pub gravity_scale: f32,
    pub floor_y: f32,
    pub grounded: bool,
    pub player_collisions: bool,
    pub frozen: bool,
}

impl Default for KinematicBody {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            facing: Facing::Right,
            gravity: 40.0,
            gravity_scale: 1.0,
            floor_y: 0.0,
            grounded: true,
            player_collisions: true,
            frozen: false,
        }
    }
}

impl KinematicBody {
    pub fn at(position: Vec2) -> Self {
        Self {
            position,
            grounded: position.y <= 0.0,
            ..Default::default()
        }
    }

    /// Advances one tick of `dt` seconds.
    pub fn integrate(&mut self, dt: f32) {
        if self.frozen {
            return;
        }
        self.velocity.y -= self.gravity * self.gravity_scale * dt;
        self.position += self.velocity * dt;
        if self.position.y <= self.floor_y {
            self.position.y = self.floor_y;
            self.velocity.y = self.velocity.y.max(0.0);
            self.grounded = true;
        } else {
            self.grounded = false;
        }
    }
}

impl Body for KinematicBody {
    fn position(&self) -> Vec2 {
        self.position
    }

    fn velocity(&self) -> Vec2 {
        self.velocity
    }

    fn set_horizontal_velocity(&mut self, vx: f32) {
        self.velocity.x = vx;
    }

    fn set_vertical_velocity(&mut self, vy: f32) {
        self.velocity.y = vy;
    }

    fn is_grounded(&self) -> bool {
        self.grounded
    }

    fn facing(&self) -> Facing {
        self.facing
    }

    fn set_facing(&mut self, facing: Facing) {
        self.facing = facing;
    }

    fn set_gravity_scale(&mut self, scale: f32) {
        self.gravity_scale = scale;
    }

    fn set_player_collisions(&mut self, enabled: bool) {
        self.player_collisions = enabled;
    }

    fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
        if frozen {
            self.velocity = Vec2::ZERO;
        }
    }

    fn step(&mut self, dt: f32) {
        self.integrate(dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lands_on_the_floor() {
        let mut body = KinematicBody::at(Vec2::new(0.0, 1.0));
        assert!(!body.grounded);
        for _ in 0..120 {
            body.integrate(1.0 / 60.0);
        }
        assert!(body.grounded);
        assert_eq!(body.position.y, 0.0);
        assert_eq!(body.velocity.y, 0.0);
    }

    #[test]
    fn frozen_body_does_not_move() {
        let mut body = KinematicBody::at(Vec2::new(0.0, 2.0));
        body.velocity = Vec2::new(3.0, 0.0);
        body.set_frozen(true);
        body.integrate(1.0 / 60.0);
        assert_eq!(body.position, Vec2::new(0.0, 2.0));
    }
}
