//! Attack and combo definitions plus the tick-driven timing engine.
//!
//! Definitions are read-only data loaded from the combat tables. Phases are
//! never stored as time; they are recomputed from an integer tick delta.

mod engine;

pub use engine::{AttackRejection, AttackStarted, ComboEngine, ComboRuntimeState};

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::anim::AnimationId;
use crate::hitbox::HitboxDefinition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum AttackPhase {
    #[default]
    None = 0,
    Startup = 1,
    Active = 2,
    Recovery = 3,
    ComboWindow = 4,
}

impl AttackPhase {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Startup),
            2 => Some(Self::Active),
            3 => Some(Self::Recovery),
            4 => Some(Self::ComboWindow),
            _ => None,
        }
    }
}

/// Frame counts of each phase, in ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameTable {
    pub startup: u32,
    pub active: u32,
    pub recovery: u32,
    pub combo_window: u32,
}

impl FrameTable {
    pub const fn new(startup: u32, active: u32, recovery: u32, combo_window: u32) -> Self {
        Self {
            startup,
            active,
            recovery,
            combo_window,
        }
    }

    /// Ticks from attack start until the combo window closes.
    pub fn total(&self) -> u32 {
        self.startup
            .saturating_add(self.active)
            .saturating_add(self.recovery)
            .saturating_add(self.combo_window)
    }

    /// Phase `elapsed` ticks after the attack started. Zero-length phases are
    /// skipped; `None` once the combo window is over.
    pub fn phase_at(&self, elapsed: u32) -> AttackPhase {
        let active_from = self.startup;
        let recovery_from = active_from.saturating_add(self.active);
        let window_from = recovery_from.saturating_add(self.recovery);
        let done_at = window_from.saturating_add(self.combo_window);

        if elapsed < active_from {
            AttackPhase::Startup
        } else if elapsed < recovery_from {
            AttackPhase::Active
        } else if elapsed < window_from {
            AttackPhase::Recovery
        } else if elapsed < done_at {
            AttackPhase::ComboWindow
        } else {
            AttackPhase::None
        }
    }
}

/// Direction held when the attack button was pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InputKind {
    #[default]
    Neutral,
    Up,
    Down,
    Side,
}

impl InputKind {
    const DEAD_ZONE: f32 = 0.5;

    /// Classifies a movement axis. Vertical intent wins over horizontal.
    pub fn from_axis(axis: Vec2) -> Self {
        if axis.y > Self::DEAD_ZONE {
            Self::Up
        } else if axis.y < -Self::DEAD_ZONE {
            Self::Down
        } else if axis.x.abs() > Self::DEAD_ZONE {
            Self::Side
        } else {
            Self::Neutral
        }
    }

    /// A neutral requirement accepts anything; directions must match exactly.
    pub fn accepts(self, input: InputKind) -> bool {
        self == Self::Neutral || self == input
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackDefinition {
    pub name: String,
    /// Animation key in the definition file. Interned into `animation_id`
    /// when the tables are loaded.
    pub animation: String,
    #[serde(skip)]
    pub animation_id: AnimationId,
    pub frames: FrameTable,
    pub damage: u32,
    pub knockback: Vec2,
    pub hitstun: u32,
    #[serde(default)]
    pub energy_cost: u32,
    #[serde(default)]
    pub energy_gain: u32,
    pub hitbox: HitboxDefinition,
    #[serde(default)]
    pub requires_grounded: bool,
    #[serde(default)]
    pub input: InputKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComboDefinition {
    pub name: String,
    pub attacks: Vec<AttackDefinition>,
    /// Damage multiplier applied once per combo depth beyond the first.
    pub damage_scaling: f32,
    pub max_length: u8,
}

impl ComboDefinition {
    /// Number of attacks that can actually chain.
    pub fn len(&self) -> u8 {
        self.attacks.len().min(self.max_length as usize) as u8
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attack at a one-based combo index.
    pub fn attack(&self, combo_index: u8) -> Option<&AttackDefinition> {
        if combo_index == 0 || combo_index > self.len() {
            return None;
        }
        self.attacks.get(combo_index as usize - 1)
    }

    /// `scaling^(combo_index - 1)`, by repeated multiplication so every peer
    /// gets the same bits.
    pub fn scaling_at(&self, combo_index: u8) -> f32 {
        let mut factor = 1.0_f32;
        for _ in 1..combo_index {
            factor *= self.damage_scaling;
        }
        factor
    }
}
