//! Combat tables: fighter tuning plus the combo definition, loaded from RON.
//!
//! Loading validates everything up front. A broken table is an error, never
//! silently replaced by defaults.

use std::{fs, path::Path, sync::Arc};

use glam::Vec2;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::anim::AnimationTable;
use crate::combo::ComboDefinition;
use crate::hitbox::LayerMask;

/// Built-in tables, compiled in for the server module and tests.
pub const DEFAULT_TABLES: &str = include_str!("../assets/combat.ron");

/// Fixed simulation rate.
pub const TICKS_PER_SECOND: u32 = 60;
pub const DT: f32 = 1.0 / TICKS_PER_SECOND as f32;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse combat tables: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("combo '{0}' has no attacks")]
    EmptyCombo(String),
    #[error("combo damage scaling must be positive and finite, got {0}")]
    InvalidScaling(f32),
    #[error("attack '{attack}': {reason}")]
    InvalidAttack { attack: String, reason: &'static str },
    #[error("fighter tuning: {0}")]
    InvalidFighter(&'static str),
}

/// Per-fighter movement and combat tuning. Tick counts assume
/// [`TICKS_PER_SECOND`]; speeds are units per second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FighterConfig {
    pub max_health: u32,
    pub max_energy: u32,
    pub starting_energy: u32,

    pub move_speed: f32,
    /// Fraction of `move_speed` available in the air.
    pub air_control: f32,
    pub jump_impulse: f32,
    pub air_gravity_scale: f32,
    pub max_jumps: u8,

    pub dash_speed: f32,
    pub dash_ticks: u32,
    pub max_dash_charges: u8,
    pub dash_cooldown_ticks: u32,

    pub hurtbox_size: Vec2,
    pub hurtbox_layer: LayerMask,

    pub knockback_decay: f32,
    pub knockback_floor: f32,
    pub post_hit_invincibility_ticks: u32,
}

impl Default for FighterConfig {
    fn default() -> Self {
        Self {
            max_health: 100,
            max_energy: 100,
            starting_energy: 50,
            move_speed: 6.0,
            air_control: 0.8,
            jump_impulse: 12.0,
            air_gravity_scale: 0.8,
            max_jumps: 2,
            dash_speed: 18.0,
            dash_ticks: 10,
            max_dash_charges: 2,
            dash_cooldown_ticks: 60,
            hurtbox_size: Vec2::new(1.0, 2.0),
            hurtbox_layer: LayerMask::FIGHTERS,
            knockback_decay: 0.85,
            knockback_floor: 0.1,
            post_hit_invincibility_ticks: 20,
        }
    }
}

impl FighterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_health == 0 {
            return Err(ConfigError::InvalidFighter("max_health must be positive"));
        }
        if self.starting_energy > self.max_energy {
            return Err(ConfigError::InvalidFighter(
                "starting_energy exceeds max_energy",
            ));
        }
        if !(self.knockback_decay > 0.0 && self.knockback_decay < 1.0) {
            return Err(ConfigError::InvalidFighter(
                "knockback_decay must be in (0, 1)",
            ));
        }
        if !(self.knockback_floor > 0.0) {
            return Err(ConfigError::InvalidFighter(
                "knockback_floor must be positive",
            ));
        }
        if self.hurtbox_size.cmple(Vec2::ZERO).any() {
            return Err(ConfigError::InvalidFighter("hurtbox_size must be positive"));
        }
        Ok(())
    }
}

/// Everything a fighter is spawned from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatTables {
    pub fighter: FighterConfig,
    pub combo: ComboDefinition,
    #[serde(skip)]
    pub animations: AnimationTable,
}

impl CombatTables {
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_ron(DEFAULT_TABLES)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let tables = Self::from_ron(&content)?;
        info!(
            "Loaded combat tables from '{}' ({} attacks)",
            path.display(),
            tables.combo.attacks.len()
        );
        Ok(tables)
    }

    pub fn from_ron(content: &str) -> Result<Self, ConfigError> {
        let mut tables: Self = ron::from_str(content)?;
        tables.validate()?;
        tables.intern_animations();
        Ok(tables)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fighter.validate()?;

        let combo = &self.combo;
        if combo.is_empty() {
            return Err(ConfigError::EmptyCombo(combo.name.clone()));
        }
        if !(combo.damage_scaling.is_finite() && combo.damage_scaling > 0.0) {
            return Err(ConfigError::InvalidScaling(combo.damage_scaling));
        }
        for attack in &combo.attacks {
            let invalid = |reason| ConfigError::InvalidAttack {
                attack: attack.name.clone(),
                reason,
            };
            if attack.name.is_empty() {
                return Err(invalid("name is empty"));
            }
            if attack.animation.is_empty() {
                return Err(invalid("animation key is empty"));
            }
            if attack.frames.total() == 0 {
                return Err(invalid("frame table is empty"));
            }
            if attack.hitbox.size.cmple(Vec2::ZERO).any() {
                return Err(invalid("hitbox size must be positive"));
            }
            if attack.energy_cost > self.fighter.max_energy {
                return Err(invalid("energy cost exceeds max energy"));
            }
        }
        Ok(())
    }

    /// Resolves every attack's animation key to an integer id.
    fn intern_animations(&mut self) {
        let mut table = AnimationTable::default();
        for attack in &mut self.combo.attacks {
            attack.animation_id = table.intern(&attack.animation);
        }
        self.animations = table;
    }

    pub fn loadout(&self) -> Loadout {
        Loadout {
            config: Arc::new(self.fighter.clone()),
            combo: Some(Arc::new(self.combo.clone())),
        }
    }
}

/// Shared, read-only definitions handed to each fighter at spawn.
#[derive(Debug, Clone)]
pub struct Loadout {
    pub config: Arc<FighterConfig>,
    /// `None` leaves the fighter unable to attack.
    pub combo: Option<Arc<ComboDefinition>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anim::Clip;

    #[test]
    fn builtin_tables_load() {
        let tables = CombatTables::builtin().unwrap();
        assert_eq!(tables.combo.len(), 3);
        for attack in &tables.combo.attacks {
            assert!(attack.animation_id.0 as usize > Clip::ALL.len());
            assert_eq!(
                tables.animations.key(attack.animation_id),
                Some(attack.animation.as_str())
            );
        }
    }

    #[test]
    fn empty_combo_is_rejected() {
        let mut tables = CombatTables::builtin().unwrap();
        tables.combo.attacks.clear();
        assert!(matches!(tables.validate(), Err(ConfigError::EmptyCombo(_))));
    }

    #[test]
    fn bad_scaling_is_rejected() {
        let mut tables = CombatTables::builtin().unwrap();
        tables.combo.damage_scaling = f32::NAN;
        assert!(matches!(
            tables.validate(),
            Err(ConfigError::InvalidScaling(_))
        ));
    }

    #[test]
    fn degenerate_attack_is_rejected() {
        let mut tables = CombatTables::builtin().unwrap();
        tables.combo.attacks[1].frames = Default::default();
        assert!(matches!(
            tables.validate(),
            Err(ConfigError::InvalidAttack { .. })
        ));
    }

    #[test]
    fn malformed_ron_is_a_parse_error() {
        assert!(matches!(
            CombatTables::from_ron("(fighter: ("),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            CombatTables::load("does/not/exist.ron"),
            Err(ConfigError::Io { .. })
        ));
    }
}
