//! Trigger, pack, and sprite catalog definitions.
//!
//! Everything in this module is host-supplied configuration: the engine never
//! persists or mutates these values, it only reads them during a scan. The
//! host's configuration store owns them and passes them in by reference (see
//! [`Catalog`]).
//!
//! The trigger variants are a closed tagged union ([`TriggerDef`]) dispatched
//! by exhaustive matching. A definition that cannot resolve to a usable
//! resource (no keywords, no URL, no item keys) is silently skipped at scan
//! time rather than rejected up front — one bad definition must not block
//! matching for all the others.

use std::collections::HashMap;

use crate::Category;

/// Fields shared by every trigger and pack.
#[derive(Debug, Clone)]
pub struct TriggerMeta {
    pub id: String,
    /// ANY of these keywords activates the trigger (pack items add their own
    /// ALL-of key gate on top).
    pub keywords: Vec<String>,
    /// When true, keyword comparison and substring search preserve case.
    pub case_sensitive: bool,
    /// When true, only pipe-delimited tokens are searched.
    pub require_pipes: bool,
    /// Minimum interval between fires of this id. `0` disables the per-id gate.
    pub cooldown_ms: i64,
    pub active: bool,
}

impl TriggerMeta {
    pub fn new(id: impl Into<String>, keywords: &[&str]) -> Self {
        TriggerMeta {
            id: id.into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            case_sensitive: false,
            require_pipes: false,
            cooldown_ms: 0,
            active: true,
        }
    }

    pub fn with_pipes(mut self) -> Self {
        self.require_pipes = true;
        self
    }

    pub fn with_cooldown_ms(mut self, ms: i64) -> Self {
        self.cooldown_ms = ms;
        self
    }

    pub fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct SoundTrigger {
    pub meta: TriggerMeta,
    pub sound_url: String,
}

#[derive(Debug, Clone)]
pub struct BackgroundTrigger {
    pub meta: TriggerMeta,
    pub background_url: String,
}

#[derive(Debug, Clone)]
pub struct EmotionTrigger {
    pub meta: TriggerMeta,
    pub emotion: String,
}

/// How an expired return-to-idle timer picks its reversion target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnMode {
    /// Resolve through the character's idle collection, then the legacy idle
    /// sprite, then the avatar.
    #[default]
    IdleCollection,
    /// Use the trigger's explicit fallback sprite URL.
    CustomSprite,
}

/// A single sprite switched in directly by keyword, without pack semantics.
///
/// The sprite may be referenced by URL or by label (resolved through the
/// [`SpriteIndex`] at scan time).
#[derive(Debug, Clone)]
pub struct SimpleSpriteTrigger {
    pub meta: TriggerMeta,
    pub sprite_url: Option<String>,
    pub sprite_label: Option<String>,
    /// Delay before reverting to idle. `None` or `0` keeps the sprite up.
    pub return_to_idle_ms: Option<i64>,
    pub return_mode: ReturnMode,
    pub return_sprite_url: Option<String>,
}

/// One selectable sprite inside a [`SpritePack`].
///
/// Its match keys are built from the library references that exist
/// (`prefix + name` for each of action/pose/clothes) concatenated with the
/// free-form `manual_keys` (comma-separated). An item whose resolved key list
/// is empty can never auto-fire.
#[derive(Debug, Clone, Default)]
pub struct SpritePackItem {
    pub enabled: bool,
    pub action_id: Option<String>,
    pub pose_id: Option<String>,
    pub clothes_id: Option<String>,
    /// Comma-separated extra keys, matched like any other key.
    pub manual_keys: String,
    pub sprite_label: Option<String>,
    pub sprite_url: Option<String>,
    pub return_to_idle_ms: Option<i64>,
    pub return_mode: ReturnMode,
    pub return_sprite_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SpritePack {
    pub meta: TriggerMeta,
    pub items: Vec<SpritePackItem>,
}

/// One selectable background inside a [`BackgroundPack`]. The item's `key` is
/// its whole key list (packs gate on ANY pack keyword + ALL item keys; for
/// backgrounds that is a single lookup key).
#[derive(Debug, Clone)]
pub struct BackgroundPackItem {
    pub enabled: bool,
    pub key: String,
    pub background_url: String,
}

#[derive(Debug, Clone)]
pub struct BackgroundPack {
    pub meta: TriggerMeta,
    pub items: Vec<BackgroundPackItem>,
}

/// Closed set of trigger shapes the scanner understands.
#[derive(Debug, Clone)]
pub enum TriggerDef {
    Sound(SoundTrigger),
    Background(BackgroundTrigger),
    BackgroundPack(BackgroundPack),
    Sprite(SimpleSpriteTrigger),
    SpritePack(SpritePack),
    Emotion(EmotionTrigger),
}

impl TriggerDef {
    pub fn meta(&self) -> &TriggerMeta {
        match self {
            TriggerDef::Sound(t) => &t.meta,
            TriggerDef::Background(t) => &t.meta,
            TriggerDef::BackgroundPack(p) => &p.meta,
            TriggerDef::Sprite(t) => &t.meta,
            TriggerDef::SpritePack(p) => &p.meta,
            TriggerDef::Emotion(t) => &t.meta,
        }
    }

    pub(crate) fn category(&self) -> Category {
        match self {
            TriggerDef::Sound(_) => Category::Sound,
            TriggerDef::Background(_) | TriggerDef::BackgroundPack(_) => Category::Background,
            TriggerDef::Sprite(_) | TriggerDef::SpritePack(_) => Category::Sprite,
            TriggerDef::Emotion(_) => Category::Emotion,
        }
    }
}

// --- Sprite library and index ------------------------------------------------

/// One row of a sprite library table. A pack item referencing `id` resolves to
/// the match key `prefix + name`.
#[derive(Debug, Clone)]
pub struct LibraryEntry {
    pub id: String,
    pub prefix: String,
    pub name: String,
}

impl LibraryEntry {
    pub fn new(id: impl Into<String>, prefix: impl Into<String>, name: impl Into<String>) -> Self {
        LibraryEntry { id: id.into(), prefix: prefix.into(), name: name.into() }
    }

    pub fn key(&self) -> String {
        format!("{}{}", self.prefix, self.name)
    }
}

/// The three library tables sprite pack items compose their keys from.
#[derive(Debug, Clone, Default)]
pub struct SpriteLibrary {
    pub actions: Vec<LibraryEntry>,
    pub poses: Vec<LibraryEntry>,
    pub clothes: Vec<LibraryEntry>,
}

impl SpriteLibrary {
    fn lookup(table: &[LibraryEntry], id: &str) -> Option<String> {
        table.iter().find(|e| e.id == id).map(LibraryEntry::key)
    }

    /// Resolve an action id to its `prefix + name` key, if the id exists.
    pub fn action_key(&self, id: &str) -> Option<String> {
        Self::lookup(&self.actions, id)
    }

    pub fn pose_key(&self, id: &str) -> Option<String> {
        Self::lookup(&self.poses, id)
    }

    pub fn clothes_key(&self, id: &str) -> Option<String> {
        Self::lookup(&self.clothes, id)
    }
}

/// Label → URL lookup for sprites referenced by label rather than direct URL.
#[derive(Debug, Clone, Default)]
pub struct SpriteIndex {
    by_label: HashMap<String, String>,
}

impl SpriteIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>, url: impl Into<String>) {
        self.by_label.insert(label.into(), url.into());
    }

    pub fn url_for(&self, label: &str) -> Option<&str> {
        self.by_label.get(label).map(String::as_str)
    }
}

// --- Characters and state collections ----------------------------------------

/// Character presentation state a sprite collection is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpriteState {
    Idle,
    Talk,
    Thinking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryRole {
    Principal,
    #[default]
    Normal,
}

/// One candidate sprite inside a [`StateSpriteCollection`].
#[derive(Debug, Clone)]
pub struct CollectionEntry {
    pub sprite_url: String,
    pub sprite_label: String,
    pub role: EntryRole,
    /// Sort key; entries are ordered by it before any indexing.
    pub order: i32,
}

/// How [`select`](crate::select) picks an entry from a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionBehavior {
    /// Always the principal entry (or the first, if none is flagged).
    #[default]
    Principal,
    /// Uniform random, independent of history.
    Random,
    /// The entry at `current_index`; advancing wraps modulo the entry count.
    List,
}

/// A named set of candidate sprites for one character state, with a selection
/// behavior. `current_index` only advances under [`SelectionBehavior::List`].
#[derive(Debug, Clone, Default)]
pub struct StateSpriteCollection {
    pub entries: Vec<CollectionEntry>,
    pub behavior: SelectionBehavior,
    pub current_index: usize,
}

impl StateSpriteCollection {
    /// Copy of this collection with `current_index` replaced. The scheduler
    /// uses this to overlay its own rotation cursor onto host-supplied data.
    pub fn at_index(&self, index: usize) -> Self {
        StateSpriteCollection { entries: self.entries.clone(), behavior: self.behavior, current_index: index }
    }
}

/// Host-supplied character record: reversion targets are resolved against it
/// in priority order (idle collection, legacy idle sprite, avatar).
#[derive(Debug, Clone)]
pub struct CharacterRecord {
    pub id: String,
    pub avatar_url: Option<String>,
    /// Legacy single-sprite-per-state map, consulted when no collection exists.
    pub legacy_sprites: HashMap<SpriteState, String>,
    pub state_collections: HashMap<SpriteState, StateSpriteCollection>,
}

impl CharacterRecord {
    pub fn new(id: impl Into<String>) -> Self {
        CharacterRecord {
            id: id.into(),
            avatar_url: None,
            legacy_sprites: HashMap::new(),
            state_collections: HashMap::new(),
        }
    }

    pub fn collection(&self, state: SpriteState) -> Option<&StateSpriteCollection> {
        self.state_collections.get(&state)
    }
}

// --- Catalog ------------------------------------------------------------------

/// Everything a [`Scanner`](crate::Scanner) reads during a scan: trigger
/// definitions, the sprite label index, and the sprite library tables. Owned
/// by the host; the scanner borrows it.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub triggers: Vec<TriggerDef>,
    pub sprite_index: SpriteIndex,
    pub library: SpriteLibrary,
}

impl Catalog {
    pub fn new(triggers: Vec<TriggerDef>) -> Self {
        Catalog { triggers, sprite_index: SpriteIndex::new(), library: SpriteLibrary::default() }
    }
}
