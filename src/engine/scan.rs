//! Scan orchestration.
//!
//! This module is the operational core of the scanner: it walks the catalog's
//! trigger definitions against one piece of text and produces the admitted
//! hits per category.
//!
//! ```text
//! text ── TokenIndex::build ──▶ token sets
//!                                   │
//!        per definition:            ▼
//!          simple triggers ──▶ match_keywords   (matcher.rs)
//!          packs ────────────▶ resolve_*_pack   (packs.rs)
//!                                   │ candidates (offset-scored)
//!                                   ▼
//!                    per category: sort by (offset, definition order)
//!                                   │
//!                                   ▼
//!                    cooldown gate + winner selection (cooldown.rs)
//!                                   │
//!                                   ▼
//!                              ScanOutcome
//! ```
//!
//! Candidates are sorted *before* gating so that a cooling-down leader yields
//! the win to the next passing candidate instead of suppressing its category.
//! Exclusive categories (background, sprite, emotion) admit one winner per
//! scan; sounds admit every candidate that clears its gates.
//!
//! Setting `STAGECUE_DEBUG_SCAN=1` prints token sets, candidates, and
//! admission decisions.

use std::time::Instant;

use super::cooldown::CooldownState;
use super::matcher::{KeywordHit, match_keywords};
use super::metrics::ScanMetrics;
use super::packs::{resolve_background_pack, resolve_sprite_pack};
use super::tokenize::{Delimiters, TokenIndex};
use crate::api::{BackgroundHit, Context, EmotionHit, ScanOutcome, ScanSettings, SoundHit, SpriteHit};
use crate::defs::{Catalog, SimpleSpriteTrigger, TriggerDef};
use crate::{ALL_CATEGORIES, Category};

/// One matched definition, not yet gated.
struct Candidate {
    category: Category,
    /// (earliest keyword offset, definition index) — lower wins.
    rank: (usize, usize),
    id: String,
    cooldown_ms: i64,
    payload: Payload,
}

enum Payload {
    Sound(SoundHit),
    Background(BackgroundHit),
    Sprite(SpriteHit),
    Emotion(EmotionHit),
}

fn simple_sprite_url(trigger: &SimpleSpriteTrigger, catalog: &Catalog) -> Option<String> {
    trigger
        .sprite_url
        .clone()
        .or_else(|| trigger.sprite_label.as_deref().and_then(|l| catalog.sprite_index.url_for(l)).map(str::to_string))
}

/// Run one scan over `text`.
///
/// `base_offset` shifts reported offsets for streaming delta scans so they
/// stay absolute with respect to the full message.
pub(crate) fn run_scan(
    catalog: &Catalog,
    settings: &ScanSettings,
    delimiters: &Delimiters,
    cooldowns: &mut CooldownState,
    text: &str,
    base_offset: usize,
    ctx: &Context,
) -> (ScanOutcome, ScanMetrics) {
    let total_start = Instant::now();
    let mut metrics = ScanMetrics::default();
    let mut outcome = ScanOutcome::default();
    let debug = std::env::var_os("STAGECUE_DEBUG_SCAN").is_some();

    if text.is_empty() {
        metrics.total = total_start.elapsed();
        outcome.elapsed = metrics.total;
        return (outcome, metrics);
    }

    let tokenize_start = Instant::now();
    let tokens = TokenIndex::build(text, delimiters);
    metrics.tokenize = tokenize_start.elapsed();

    let matching_start = Instant::now();
    let fuzzy = &settings.fuzzy;
    let mut candidates: Vec<Candidate> = Vec::new();
    for (index, def) in catalog.triggers.iter().enumerate() {
        let meta = def.meta();
        if !meta.active || meta.keywords.is_empty() {
            continue;
        }
        let matched: Option<(KeywordHit, Payload)> = match def {
            TriggerDef::Sound(t) => {
                match_keywords(&meta.keywords, meta.case_sensitive, meta.require_pipes, &tokens, text, fuzzy).map(
                    |kw| {
                        let hit = SoundHit {
                            trigger_id: meta.id.clone(),
                            sound_url: t.sound_url.clone(),
                            keyword: kw.keyword.clone(),
                            offset: kw.offset,
                        };
                        (kw, Payload::Sound(hit))
                    },
                )
            }
            TriggerDef::Background(t) => {
                match_keywords(&meta.keywords, meta.case_sensitive, meta.require_pipes, &tokens, text, fuzzy).map(
                    |kw| {
                        let hit = BackgroundHit {
                            trigger_id: meta.id.clone(),
                            background_url: t.background_url.clone(),
                            keyword: kw.keyword.clone(),
                            offset: kw.offset,
                        };
                        (kw, Payload::Background(hit))
                    },
                )
            }
            TriggerDef::BackgroundPack(pack) => {
                resolve_background_pack(pack, &tokens, text, fuzzy).map(|(kw, hit)| (kw, Payload::Background(hit)))
            }
            TriggerDef::Sprite(t) => simple_sprite_url(t, catalog).and_then(|url| {
                match_keywords(&meta.keywords, meta.case_sensitive, meta.require_pipes, &tokens, text, fuzzy).map(
                    |kw| {
                        let hit = SpriteHit {
                            trigger_id: meta.id.clone(),
                            sprite_url: url,
                            sprite_label: t.sprite_label.clone(),
                            return_to_idle_ms: t.return_to_idle_ms,
                            return_mode: t.return_mode,
                            return_sprite_url: t.return_sprite_url.clone(),
                            keyword: kw.keyword.clone(),
                            offset: kw.offset,
                        };
                        (kw, Payload::Sprite(hit))
                    },
                )
            }),
            TriggerDef::SpritePack(pack) => {
                resolve_sprite_pack(pack, &tokens, text, fuzzy, &catalog.sprite_index, &catalog.library)
                    .map(|(kw, hit)| (kw, Payload::Sprite(hit)))
            }
            TriggerDef::Emotion(t) => {
                match_keywords(&meta.keywords, meta.case_sensitive, meta.require_pipes, &tokens, text, fuzzy).map(
                    |kw| {
                        let hit = EmotionHit {
                            trigger_id: meta.id.clone(),
                            emotion: t.emotion.clone(),
                            keyword: kw.keyword.clone(),
                            offset: kw.offset,
                        };
                        (kw, Payload::Emotion(hit))
                    },
                )
            }
        };
        if let Some((kw, payload)) = matched {
            if debug {
                eprintln!("[candidate] id=\"{}\" keyword=\"{}\" offset={:?}", meta.id, kw.keyword, kw.offset);
            }
            candidates.push(Candidate {
                category: def.category(),
                rank: (kw.rank(), index),
                id: meta.id.clone(),
                cooldown_ms: meta.cooldown_ms,
                payload,
            });
        }
    }
    metrics.matching = matching_start.elapsed();
    metrics.candidates = candidates.len();

    let gating_start = Instant::now();
    candidates.sort_by_key(|c| c.rank);
    for category in ALL_CATEGORIES {
        let mut admitted_in_category = 0usize;
        for candidate in candidates.iter().filter(|c| c.category == category) {
            if category.exclusive() && admitted_in_category > 0 {
                break;
            }
            let gate = cooldowns.gate_mut(category);
            if !gate.is_ready(&candidate.id, candidate.cooldown_ms, ctx.now_ms) {
                if debug {
                    eprintln!("[cooldown] id=\"{}\" rejected", candidate.id);
                }
                continue;
            }
            gate.mark_fired(&candidate.id, ctx.now_ms);
            admitted_in_category += 1;
            metrics.admitted += 1;
            match &candidate.payload {
                Payload::Sound(hit) => outcome.sounds.push(shift_sound(hit.clone(), base_offset)),
                Payload::Background(hit) => outcome.backgrounds.push(shift_background(hit.clone(), base_offset)),
                Payload::Sprite(hit) => outcome.sprites.push(shift_sprite(hit.clone(), base_offset)),
                Payload::Emotion(hit) => outcome.emotions.push(shift_emotion(hit.clone(), base_offset)),
            }
        }
    }
    metrics.gating = gating_start.elapsed();

    outcome.matched_keywords = collect_keywords(&outcome);
    metrics.total = total_start.elapsed();
    outcome.elapsed = metrics.total;
    (outcome, metrics)
}

fn shift(offset: Option<usize>, base: usize) -> Option<usize> {
    offset.map(|o| o + base)
}

fn shift_sound(mut hit: SoundHit, base: usize) -> SoundHit {
    hit.offset = shift(hit.offset, base);
    hit
}

fn shift_background(mut hit: BackgroundHit, base: usize) -> BackgroundHit {
    hit.offset = shift(hit.offset, base);
    hit
}

fn shift_sprite(mut hit: SpriteHit, base: usize) -> SpriteHit {
    hit.offset = shift(hit.offset, base);
    hit
}

fn shift_emotion(mut hit: EmotionHit, base: usize) -> EmotionHit {
    hit.offset = shift(hit.offset, base);
    hit
}

/// All keywords behind admitted hits, earliest first, deduplicated.
fn collect_keywords(outcome: &ScanOutcome) -> Vec<String> {
    let mut pairs: Vec<(usize, &str)> = Vec::new();
    for hit in &outcome.sounds {
        pairs.push((hit.offset.unwrap_or(usize::MAX), &hit.keyword));
    }
    for hit in &outcome.backgrounds {
        pairs.push((hit.offset.unwrap_or(usize::MAX), &hit.keyword));
    }
    for hit in &outcome.sprites {
        pairs.push((hit.offset.unwrap_or(usize::MAX), &hit.keyword));
    }
    for hit in &outcome.emotions {
        pairs.push((hit.offset.unwrap_or(usize::MAX), &hit.keyword));
    }
    pairs.sort_by_key(|(offset, _)| *offset);
    let mut keywords = Vec::new();
    for (_, keyword) in pairs {
        if !keywords.iter().any(|k: &String| k == keyword) {
            keywords.push(keyword.to_string());
        }
    }
    keywords
}
