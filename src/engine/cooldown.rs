//! Cooldown bookkeeping.
//!
//! Each effect category owns one [`CooldownGate`]: a per-trigger-id map of
//! last-fired timestamps plus a category-wide global timestamp. A would-be
//! fire is admitted only when it clears both windows; `mark_fired` updates
//! both timestamps in one call (single-threaded, so no race).
//!
//! The per-id map is never pruned. Scanners are session-scoped and the map is
//! bounded by the number of distinct trigger ids, so this is a documented
//! design choice rather than a leak.

use std::collections::HashMap;

use crate::api::ScanSettings;
use crate::{ALL_CATEGORIES, Category};

#[derive(Debug, Default)]
pub(crate) struct CooldownGate {
    last_fired_by_id: HashMap<String, i64>,
    last_global_fired: Option<i64>,
    global_cooldown_ms: i64,
}

impl CooldownGate {
    pub(crate) fn new(global_cooldown_ms: i64) -> Self {
        CooldownGate { last_fired_by_id: HashMap::new(), last_global_fired: None, global_cooldown_ms }
    }

    /// Whether a fire of `id` would clear both the per-id and global windows.
    pub(crate) fn is_ready(&self, id: &str, per_trigger_cooldown_ms: i64, now_ms: i64) -> bool {
        if let Some(&last) = self.last_fired_by_id.get(id) {
            if now_ms - last < per_trigger_cooldown_ms {
                return false;
            }
        }
        if let Some(last) = self.last_global_fired {
            if now_ms - last < self.global_cooldown_ms {
                return false;
            }
        }
        true
    }

    pub(crate) fn mark_fired(&mut self, id: &str, now_ms: i64) {
        self.last_fired_by_id.insert(id.to_string(), now_ms);
        self.last_global_fired = Some(now_ms);
    }

    pub(crate) fn reset(&mut self) {
        self.last_fired_by_id.clear();
        self.last_global_fired = None;
    }
}

/// The scanner's transient cooldown state: one independent gate per category.
#[derive(Debug)]
pub(crate) struct CooldownState {
    sound: CooldownGate,
    background: CooldownGate,
    sprite: CooldownGate,
    emotion: CooldownGate,
}

impl CooldownState {
    pub(crate) fn new(settings: &ScanSettings) -> Self {
        CooldownState {
            sound: CooldownGate::new(settings.sound_global_cooldown_ms),
            background: CooldownGate::new(settings.background_global_cooldown_ms),
            sprite: CooldownGate::new(settings.sprite_global_cooldown_ms),
            emotion: CooldownGate::new(settings.emotion_global_cooldown_ms),
        }
    }

    pub(crate) fn gate_mut(&mut self, category: Category) -> &mut CooldownGate {
        match category {
            Category::Sound => &mut self.sound,
            Category::Background => &mut self.background,
            Category::Sprite => &mut self.sprite,
            Category::Emotion => &mut self.emotion,
        }
    }

    pub(crate) fn reset(&mut self) {
        for category in ALL_CATEGORIES {
            self.gate_mut(category).reset();
        }
    }
}
