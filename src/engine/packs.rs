//! Two-level pack resolution.
//!
//! Packs gate in two stages, both required:
//!
//! 1. **Pack keyword gate** — ANY of the pack's keywords must match
//!    (see `matcher.rs`); the earliest offset becomes the pack's `kw_offset`,
//!    its score against competing packs and triggers.
//! 2. **Item key gate** — for each enabled item, ALL of the item's resolved
//!    keys must match. Sprite items compose their keys from library
//!    references (`prefix + name` for each of action/pose/clothes that
//!    exists) plus free-form manual keys; background items carry a single
//!    lookup key.
//!
//! Among items that pass, the one with the most keys wins (most specific
//! match), first in list order on equal counts. A pack that passes stage 1
//! with no passing item produces no hit. Items that cannot resolve a target
//! URL are skipped rather than surfaced as errors.

use super::matcher::{KeywordHit, match_keywords};
use super::tokenize::TokenIndex;
use crate::api::{BackgroundHit, FuzzyConfig, SpriteHit};
use crate::defs::{BackgroundPack, SpriteIndex, SpriteLibrary, SpritePack, SpritePackItem};

/// Resolved key list for one sprite pack item: library keys then manual keys,
/// deduplicated, order preserved.
pub(crate) fn item_keys(item: &SpritePackItem, library: &SpriteLibrary) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(id) = item.action_id.as_deref() {
        keys.extend(library.action_key(id));
    }
    if let Some(id) = item.pose_id.as_deref() {
        keys.extend(library.pose_key(id));
    }
    if let Some(id) = item.clothes_id.as_deref() {
        keys.extend(library.clothes_key(id));
    }
    for manual in item.manual_keys.split(',') {
        let manual = manual.trim();
        if !manual.is_empty() {
            keys.push(manual.to_string());
        }
    }
    let mut seen = std::collections::HashSet::new();
    keys.retain(|k| seen.insert(k.clone()));
    keys
}

fn sprite_item_url(item: &SpritePackItem, index: &SpriteIndex) -> Option<String> {
    item.sprite_url
        .clone()
        .or_else(|| item.sprite_label.as_deref().and_then(|label| index.url_for(label)).map(str::to_string))
}

/// Apply both gates of a sprite pack. Returns the winning item's hit plus the
/// pack-level keyword hit used for cross-pack tie-breaking.
pub(crate) fn resolve_sprite_pack(
    pack: &SpritePack,
    tokens: &TokenIndex,
    raw_text: &str,
    fuzzy: &FuzzyConfig,
    index: &SpriteIndex,
    library: &SpriteLibrary,
) -> Option<(KeywordHit, SpriteHit)> {
    let meta = &pack.meta;
    let kw_hit = match_keywords(&meta.keywords, meta.case_sensitive, meta.require_pipes, tokens, raw_text, fuzzy)?;

    let mut winner: Option<(&SpritePackItem, usize, String)> = None;
    for item in pack.items.iter().filter(|item| item.enabled) {
        let keys = item_keys(item, library);
        if keys.is_empty() {
            continue;
        }
        let all_match = keys.iter().all(|key| {
            match_keywords(
                std::slice::from_ref(key),
                meta.case_sensitive,
                meta.require_pipes,
                tokens,
                raw_text,
                fuzzy,
            )
            .is_some()
        });
        if !all_match {
            continue;
        }
        let Some(url) = sprite_item_url(item, index) else { continue };
        // Most keys wins; strict comparison keeps the first item on ties.
        if winner.as_ref().is_none_or(|(_, count, _)| keys.len() > *count) {
            winner = Some((item, keys.len(), url));
        }
    }

    let (item, _, url) = winner?;
    let hit = SpriteHit {
        trigger_id: meta.id.clone(),
        sprite_url: url,
        sprite_label: item.sprite_label.clone(),
        return_to_idle_ms: item.return_to_idle_ms,
        return_mode: item.return_mode,
        return_sprite_url: item.return_sprite_url.clone(),
        keyword: kw_hit.keyword.clone(),
        offset: kw_hit.offset,
    };
    Some((kw_hit, hit))
}

/// Apply both gates of a background pack. The first enabled item whose key
/// matches wins (all background items carry exactly one key).
pub(crate) fn resolve_background_pack(
    pack: &BackgroundPack,
    tokens: &TokenIndex,
    raw_text: &str,
    fuzzy: &FuzzyConfig,
) -> Option<(KeywordHit, BackgroundHit)> {
    let meta = &pack.meta;
    let kw_hit = match_keywords(&meta.keywords, meta.case_sensitive, meta.require_pipes, tokens, raw_text, fuzzy)?;

    let item = pack.items.iter().find(|item| {
        if !item.enabled || item.background_url.is_empty() {
            return false;
        }
        let key = item.key.trim();
        if key.is_empty() {
            return false;
        }
        match_keywords(
            std::slice::from_ref(&item.key),
            meta.case_sensitive,
            meta.require_pipes,
            tokens,
            raw_text,
            fuzzy,
        )
        .is_some()
    })?;

    let hit = BackgroundHit {
        trigger_id: meta.id.clone(),
        background_url: item.background_url.clone(),
        keyword: kw_hit.keyword.clone(),
        offset: kw_hit.offset,
    };
    Some((kw_hit, hit))
}
