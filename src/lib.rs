extern crate self as stagecue;

#[macro_use]
mod macros;
mod api;
mod defs;
mod engine;

pub use api::{
    BackgroundHit, Context, DelimiterPair, EmotionHit, FuzzyConfig, ScanOutcome, ScanSettings, Scanner, SoundHit,
    SpriteHit, VerboseScan,
};
pub use defs::{
    BackgroundPack, BackgroundPackItem, BackgroundTrigger, Catalog, CharacterRecord, CollectionEntry, EmotionTrigger,
    EntryRole, LibraryEntry, ReturnMode, SelectionBehavior, SimpleSpriteTrigger, SoundTrigger, SpriteIndex,
    SpriteLibrary, SpritePack, SpritePackItem, SpriteState, StateSpriteCollection, TriggerDef, TriggerMeta,
};
pub use engine::{
    ActivationEvent, CharacterActivation, PendingIdleReturn, ScanMetrics, Scheduler, Selection, SpriteLock, select,
    select_with_rng,
};

// --- Internal types ---------------------------------------------------------

/// Effect category a trigger belongs to.
///
/// Categories gate independently: each keeps its own cooldown bookkeeping, and
/// winner selection differs between exclusive presentation slots (background,
/// sprite, emotion — one winner per scan) and layered ones (sound).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Category {
    Sound,
    Background,
    Sprite,
    Emotion,
}

impl Category {
    /// Whether only one effect of this category can activate per scan.
    pub(crate) fn exclusive(self) -> bool {
        !matches!(self, Category::Sound)
    }
}

pub(crate) const ALL_CATEGORIES: [Category; 4] =
    [Category::Sound, Category::Background, Category::Sprite, Category::Emotion];
