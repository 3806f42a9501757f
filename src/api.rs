use std::time::Duration;

use chrono::{NaiveDate, Utc};

use crate::defs::{Catalog, ReturnMode};
use crate::engine::cooldown::CooldownState;
use crate::engine::scan::run_scan;
use crate::engine::ScanMetrics;
use crate::engine::tokenize::Delimiters;

/// Scanning context.
///
/// This holds the clock needed to evaluate cooldown windows and schedule
/// deadlines. All engine time is millisecond timestamps; nothing inside the
/// engine reads the wall clock, so a fake clock is just a handmade `Context`.
#[derive(Debug, Clone)]
pub struct Context {
    /// Current time in milliseconds.
    pub now_ms: i64,
}

impl Default for Context {
    fn default() -> Self {
        if cfg!(test) {
            let date = NaiveDate::from_ymd_opt(2013, 2, 12).unwrap();
            let time = date.and_hms_opt(4, 30, 0).unwrap();
            Self { now_ms: time.and_utc().timestamp_millis() }
        } else {
            Self { now_ms: Utc::now().timestamp_millis() }
        }
    }
}

impl Context {
    pub fn at_ms(now_ms: i64) -> Self {
        Context { now_ms }
    }

    /// A context `ms` later than this one.
    pub fn advanced_by(&self, ms: i64) -> Self {
        Context { now_ms: self.now_ms + ms }
    }
}

/// One configurable tag delimiter pair. The default is `|...|`.
#[derive(Debug, Clone)]
pub struct DelimiterPair {
    pub open: String,
    pub close: String,
}

impl Default for DelimiterPair {
    fn default() -> Self {
        DelimiterPair { open: "|".to_string(), close: "|".to_string() }
    }
}

/// Scanner-wide fuzzy matching settings, shared by all trigger categories.
#[derive(Debug, Clone)]
pub struct FuzzyConfig {
    pub enabled: bool,
    /// Minimum normalized Levenshtein similarity in `[0, 1]`.
    pub threshold: f64,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        FuzzyConfig { enabled: false, threshold: 0.8 }
    }
}

/// Options that affect scanning behavior.
///
/// Per-category global cooldowns gate independently of each other and of the
/// per-trigger cooldowns carried on the definitions; `0` disables a window.
#[derive(Debug, Clone, Default)]
pub struct ScanSettings {
    /// Tag delimiter pairs; pairs with an empty side are ignored.
    pub delimiters: Vec<DelimiterPair>,
    pub fuzzy: FuzzyConfig,
    pub sound_global_cooldown_ms: i64,
    pub background_global_cooldown_ms: i64,
    pub sprite_global_cooldown_ms: i64,
    pub emotion_global_cooldown_ms: i64,
}

impl ScanSettings {
    /// Settings with the default `|...|` delimiter pair.
    pub fn standard() -> Self {
        ScanSettings { delimiters: vec![DelimiterPair::default()], ..Default::default() }
    }
}

/// An admitted sound effect activation.
///
/// `offset` is the byte offset of the matched keyword in the scanned text
/// (absolute even for streaming scans); matches found only through token-set
/// or fuzzy comparison carry `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundHit {
    pub trigger_id: String,
    pub sound_url: String,
    pub keyword: String,
    pub offset: Option<usize>,
}

/// An admitted background scene activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundHit {
    pub trigger_id: String,
    pub background_url: String,
    pub keyword: String,
    pub offset: Option<usize>,
}

/// An admitted sprite activation, carrying everything the scheduler needs to
/// apply it and arm its reversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteHit {
    pub trigger_id: String,
    pub sprite_url: String,
    pub sprite_label: Option<String>,
    pub return_to_idle_ms: Option<i64>,
    pub return_mode: ReturnMode,
    pub return_sprite_url: Option<String>,
    pub keyword: String,
    pub offset: Option<usize>,
}

/// An admitted emotion cue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmotionHit {
    pub trigger_id: String,
    pub emotion: String,
    pub keyword: String,
    pub offset: Option<usize>,
}

/// Result of one scan: the admitted hits per category plus the keywords that
/// produced them, earliest first.
///
/// Background, sprite, and emotion are exclusive presentation slots and carry
/// at most one hit per scan; sounds carry every admitted hit.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub sounds: Vec<SoundHit>,
    pub backgrounds: Vec<BackgroundHit>,
    pub sprites: Vec<SpriteHit>,
    pub emotions: Vec<EmotionHit>,
    pub matched_keywords: Vec<String>,
    /// Total elapsed time spent scanning.
    pub elapsed: Duration,
}

impl ScanOutcome {
    pub fn is_empty(&self) -> bool {
        self.sounds.is_empty() && self.backgrounds.is_empty() && self.sprites.is_empty() && self.emotions.is_empty()
    }
}

/// Result from [`Scanner::scan_verbose`].
#[derive(Debug, Clone)]
pub struct VerboseScan {
    pub outcome: ScanOutcome,
    pub metrics: ScanMetrics,
}

/// Keyword scanner over one catalog of trigger definitions.
///
/// The scanner borrows the host-owned catalog and owns only its transient
/// cooldown state — one instance per session, constructed and torn down
/// freely (no module-level state).
///
/// # Example
/// ```
/// use stagecue::{Catalog, Context, ScanSettings, Scanner, SoundTrigger, TriggerDef, TriggerMeta};
///
/// let catalog = Catalog::new(vec![TriggerDef::Sound(SoundTrigger {
///     meta: TriggerMeta::new("bark", &["dog"]),
///     sound_url: "sfx/bark.ogg".to_string(),
/// })]);
/// let mut scanner = Scanner::new(&catalog, ScanSettings::standard());
/// let outcome = scanner.scan_message("the dog barks", &Context::default());
/// assert_eq!(outcome.sounds.len(), 1);
/// ```
#[derive(Debug)]
pub struct Scanner<'a> {
    catalog: &'a Catalog,
    settings: ScanSettings,
    delimiters: Delimiters,
    cooldowns: CooldownState,
}

impl<'a> Scanner<'a> {
    pub fn new(catalog: &'a Catalog, settings: ScanSettings) -> Self {
        let delimiters = Delimiters::compile(&settings.delimiters);
        let cooldowns = CooldownState::new(&settings);
        Scanner { catalog, settings, delimiters, cooldowns }
    }

    /// Scan a complete message.
    pub fn scan_message(&mut self, text: &str, ctx: &Context) -> ScanOutcome {
        let (outcome, _) =
            run_scan(self.catalog, &self.settings, &self.delimiters, &mut self.cooldowns, text, 0, ctx);
        outcome
    }

    /// Scan the delta of an incrementally growing message.
    ///
    /// Only the text appended since `previous_text` is processed, keeping
    /// repeated calls over a growing string linear overall. When
    /// `previous_text` is not a prefix of `full_text` the whole message is
    /// rescanned instead. Offsets in the outcome are absolute into
    /// `full_text`.
    pub fn scan_streaming(&mut self, full_text: &str, previous_text: &str, ctx: &Context) -> ScanOutcome {
        if !full_text.starts_with(previous_text) {
            return self.scan_message(full_text, ctx);
        }
        let delta = &full_text[previous_text.len()..];
        if delta.is_empty() {
            return ScanOutcome::default();
        }
        let (outcome, _) = run_scan(
            self.catalog,
            &self.settings,
            &self.delimiters,
            &mut self.cooldowns,
            delta,
            previous_text.len(),
            ctx,
        );
        outcome
    }

    /// Scan a complete message and return per-stage timing details.
    ///
    /// Useful for profiling and trigger debugging; the default
    /// [`scan_message`](Self::scan_message) path does not surface these.
    pub fn scan_verbose(&mut self, text: &str, ctx: &Context) -> VerboseScan {
        let (outcome, metrics) =
            run_scan(self.catalog, &self.settings, &self.delimiters, &mut self.cooldowns, text, 0, ctx);
        VerboseScan { outcome, metrics }
    }

    /// Forget all cooldown history (per-id and global, every category).
    pub fn reset_cooldowns(&mut self) {
        self.cooldowns.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defs::{SoundTrigger, TriggerDef, TriggerMeta};

    fn catalog() -> Catalog {
        Catalog::new(vec![TriggerDef::Sound(SoundTrigger {
            meta: TriggerMeta::new("bark", &["dog"]),
            sound_url: "sfx/bark.ogg".into(),
        })])
    }

    #[test]
    fn scan_message_returns_hits_and_keywords() {
        let catalog = catalog();
        let mut scanner = Scanner::new(&catalog, ScanSettings::standard());
        let outcome = scanner.scan_message("the dog barks", &Context::default());

        assert_eq!(outcome.sounds.len(), 1);
        assert_eq!(outcome.sounds[0].trigger_id, "bark");
        assert_eq!(outcome.sounds[0].offset, Some(4));
        assert_eq!(outcome.matched_keywords, vec!["dog".to_string()]);
        assert!(outcome.elapsed >= Duration::ZERO);
    }

    #[test]
    fn scan_verbose_includes_stage_metrics() {
        let catalog = catalog();
        let mut scanner = Scanner::new(&catalog, ScanSettings::standard());
        let verbose = scanner.scan_verbose("the dog barks", &Context::default());

        assert_eq!(verbose.outcome.sounds.len(), 1);
        assert_eq!(verbose.metrics.candidates, 1);
        assert_eq!(verbose.metrics.admitted, 1);
        assert!(verbose.metrics.tokenize <= verbose.metrics.total);
    }

    #[test]
    fn reset_cooldowns_forgets_history() {
        let catalog = Catalog::new(vec![TriggerDef::Sound(SoundTrigger {
            meta: TriggerMeta::new("bark", &["dog"]).with_cooldown_ms(60_000),
            sound_url: "sfx/bark.ogg".into(),
        })]);
        let mut scanner = Scanner::new(&catalog, ScanSettings::standard());
        let ctx = Context::at_ms(0);

        assert_eq!(scanner.scan_message("the dog", &ctx).sounds.len(), 1);
        assert!(scanner.scan_message("the dog", &ctx.advanced_by(1_000)).sounds.is_empty());
        scanner.reset_cooldowns();
        assert_eq!(scanner.scan_message("the dog", &ctx.advanced_by(2_000)).sounds.len(), 1);
    }

    #[test]
    fn context_advances() {
        let ctx = Context::at_ms(1_000);
        assert_eq!(ctx.advanced_by(500).now_ms, 1_500);
    }
}
