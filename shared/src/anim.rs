//! Integer animation ids, interned from definition keys once at load time.

use serde::{Deserialize, Serialize};

/// Id of an animation clip. `AnimationId::NONE` means "no clip".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct AnimationId(pub u16);

impl AnimationId {
    pub const NONE: Self = Self(0);
}

/// Behavior-state clips every fighter has. Attack clips are interned from
/// the combat tables after these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Clip {
    Idle,
    Run,
    Jump,
    Dash,
    Hit,
    Die,
}

impl Clip {
    pub const ALL: [Clip; 6] = [
        Clip::Idle,
        Clip::Run,
        Clip::Jump,
        Clip::Dash,
        Clip::Hit,
        Clip::Die,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Clip::Idle => "idle",
            Clip::Run => "run",
            Clip::Jump => "jump",
            Clip::Dash => "dash",
            Clip::Hit => "hit",
            Clip::Die => "die",
        }
    }

    pub fn id(self) -> AnimationId {
        AnimationId(self as u16 + 1)
    }
}

/// Key → id table. Ids are assigned in insertion order and never change.
#[derive(Debug, Clone)]
pub struct AnimationTable {
    keys: Vec<String>,
}

impl Default for AnimationTable {
    fn default() -> Self {
        Self {
            keys: Clip::ALL.iter().map(|c| c.key().to_string()).collect(),
        }
    }
}

impl AnimationTable {
    pub fn intern(&mut self, key: &str) -> AnimationId {
        if let Some(id) = self.get(key) {
            return id;
        }
        self.keys.push(key.to_string());
        AnimationId(self.keys.len() as u16)
    }

    pub fn get(&self, key: &str) -> Option<AnimationId> {
        self.keys
            .iter()
            .position(|k| k == key)
            .map(|i| AnimationId(i as u16 + 1))
    }

    pub fn key(&self, id: AnimationId) -> Option<&str> {
        let index = (id.0 as usize).checked_sub(1)?;
        self.keys.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clips_are_preinterned() {
        let table = AnimationTable::default();
        for clip in Clip::ALL {
            assert_eq!(table.get(clip.key()), Some(clip.id()));
        }
        assert_eq!(table.key(AnimationId::NONE), None);
    }

    #[test]
    fn interning_is_stable() {
        let mut table = AnimationTable::default();
        let jab = table.intern("jab");
        let cross = table.intern("cross");
        assert_ne!(jab, cross);
        assert_eq!(table.intern("jab"), jab);
        assert_eq!(table.key(cross), Some("cross"));
    }
}
