//! Tokenization and normalization (input pre-classification).
//!
//! This module turns raw chat text into the normalized token sets the matcher
//! searches. Three extraction passes feed the sets:
//!
//! - **Pipe tokens**: spans wrapped in configurable delimiters (default
//!   `|...|`), the explicit-tag channel. Captured raw; normalization happens
//!   at match time per trigger, because case folding is a per-trigger choice.
//! - **Word tokens**: runs of two or more letters/digits/`_`/`-` from the text
//!   with pipe spans removed, plus pictographic code points as single-character
//!   tokens so a bare emoji can still satisfy a trigger.
//! - **HUD tokens**: bracketed groups `[...]`, split on `|`; `key=value` parts
//!   additionally emit the bare key and bare value, so a HUD tag can satisfy
//!   either a whole-pair trigger or a bare-key/value trigger.
//!
//! A cheap [`TextSignals`] pre-scan gates the extraction passes so plain prose
//! skips the pipe and bracket machinery entirely.
//!
//! ## Design notes
//!
//! - User-supplied delimiter strings are always `regex::escape`d before a
//!   pattern is compiled; a malformed (empty-sided) pair is dropped rather
//!   than reported.
//! - `normalize_token` never discards a token: if stripping leaves nothing
//!   (a pure-emoji token), the trimmed original is returned instead.

use std::collections::HashSet;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::api::DelimiterPair;

/// Longest span a delimiter pair may capture.
const MAX_PIPE_SPAN: usize = 80;

bitflags::bitflags! {
    /// Coarse input features detected before any extraction runs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct TextSignals: u8 {
        const PIPES       = 1 << 0;
        const BRACKETS    = 1 << 1;
        const PICTOGRAPHS = 1 << 2;
    }
}

impl TextSignals {
    pub(crate) fn scan(text: &str, delimiters: &Delimiters) -> Self {
        let mut signals = TextSignals::empty();
        if delimiters.pairs.iter().any(|(open, _)| text.contains(open.as_str())) {
            signals |= TextSignals::PIPES;
        }
        if text.contains('[') {
            signals |= TextSignals::BRACKETS;
        }
        if regex!(r"\p{Extended_Pictographic}").is_match(text) {
            signals |= TextSignals::PICTOGRAPHS;
        }
        signals
    }
}

/// Compiled delimiter configuration, built once per scanner.
#[derive(Debug)]
pub(crate) struct Delimiters {
    pairs: Vec<(String, String)>,
    patterns: Vec<Regex>,
}

impl Delimiters {
    /// Escape and compile each pair; pairs with an empty side are dropped.
    pub(crate) fn compile(pairs: &[DelimiterPair]) -> Self {
        let mut kept = Vec::new();
        let mut patterns = Vec::new();
        for pair in pairs {
            if pair.open.is_empty() || pair.close.is_empty() {
                continue;
            }
            let pattern =
                format!("{}(.{{1,{MAX_PIPE_SPAN}}}?){}", regex::escape(&pair.open), regex::escape(&pair.close));
            match Regex::new(&pattern) {
                Ok(re) => {
                    kept.push((pair.open.clone(), pair.close.clone()));
                    patterns.push(re);
                }
                Err(_) => continue,
            }
        }
        Delimiters { pairs: kept, patterns }
    }
}

/// Normalize a single token: trim, optionally lowercase, strip diacritics,
/// keep only letters/digits/space/`_`/`-`.
///
/// Returns the trimmed original when stripping would empty the token, so that
/// pictographic tokens survive normalization.
pub(crate) fn normalize_token(raw: &str, fold_case: bool) -> String {
    let trimmed = raw.trim();
    let folded = if fold_case { trimmed.to_lowercase() } else { trimmed.to_string() };
    let stripped: String = folded
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .collect();
    if stripped.trim().is_empty() { trimmed.to_string() } else { stripped }
}

/// Raw contents of every delimiter-wrapped span, in text order.
pub(crate) fn extract_pipe_tokens(text: &str, delimiters: &Delimiters) -> Vec<String> {
    let mut tokens = Vec::new();
    for re in &delimiters.patterns {
        for caps in re.captures_iter(text) {
            if let Some(m) = caps.get(1) {
                tokens.push(m.as_str().to_string());
            }
        }
    }
    tokens
}

/// Replace delimiter-wrapped spans with a space so word extraction does not
/// glue their neighbors together.
pub(crate) fn strip_pipe_spans(text: &str, delimiters: &Delimiters) -> String {
    let mut out = text.to_string();
    for re in &delimiters.patterns {
        out = re.replace_all(&out, " ").into_owned();
    }
    out
}

/// Plain-word tokens: runs of two or more word-ish characters.
pub(crate) fn extract_word_tokens(text: &str) -> Vec<String> {
    regex!(r"[\p{L}\p{N}_-]{2,}").find_iter(text).map(|m| m.as_str().to_string()).collect()
}

/// Pictographic code points as single-character tokens.
pub(crate) fn extract_pictograph_tokens(text: &str) -> Vec<String> {
    regex!(r"\p{Extended_Pictographic}").find_iter(text).map(|m| m.as_str().to_string()).collect()
}

/// Tokens from bracketed HUD groups `[...]`.
///
/// Each group is split on `|`; a `key=value` part emits the whole pair plus
/// the bare key and bare value.
pub(crate) fn extract_hud_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for caps in regex!(r"\[([^\[\]]+)\]").captures_iter(text) {
        let Some(group) = caps.get(1) else { continue };
        for part in group.as_str().split('|') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            tokens.push(part.to_string());
            if let Some((key, value)) = part.split_once('=') {
                let (key, value) = (key.trim(), value.trim());
                if !key.is_empty() {
                    tokens.push(key.to_string());
                }
                if !value.is_empty() {
                    tokens.push(value.to_string());
                }
            }
        }
    }
    tokens
}

/// Union raw token groups into one normalized set. Folding is applied only
/// when the consuming trigger is case-insensitive.
pub(crate) fn build_token_set(groups: &[&[String]], fold_case: bool) -> HashSet<String> {
    let mut set = HashSet::new();
    for group in groups {
        for token in group.iter() {
            set.insert(normalize_token(token, fold_case));
        }
    }
    set
}

/// All token sets for one piece of text, built once per scan.
///
/// Two axes: the searched group (`pipes` only vs. the `any` union of
/// pipe+word+HUD tokens) and case folding (folded for case-insensitive
/// triggers, exact for case-sensitive ones).
#[derive(Debug)]
pub(crate) struct TokenIndex {
    any_folded: HashSet<String>,
    any_exact: HashSet<String>,
    pipes_folded: HashSet<String>,
    pipes_exact: HashSet<String>,
}

impl TokenIndex {
    pub(crate) fn build(text: &str, delimiters: &Delimiters) -> Self {
        let signals = TextSignals::scan(text, delimiters);
        let debug = std::env::var_os("STAGECUE_DEBUG_SCAN").is_some();

        let pipe_tokens =
            if signals.contains(TextSignals::PIPES) { extract_pipe_tokens(text, delimiters) } else { Vec::new() };
        let remainder =
            if signals.contains(TextSignals::PIPES) { strip_pipe_spans(text, delimiters) } else { text.to_string() };
        let mut word_tokens = extract_word_tokens(&remainder);
        if signals.contains(TextSignals::PICTOGRAPHS) {
            word_tokens.extend(extract_pictograph_tokens(&remainder));
        }
        let hud_tokens = if signals.contains(TextSignals::BRACKETS) { extract_hud_tokens(text) } else { Vec::new() };

        if debug {
            eprintln!(
                "[tokenize] signals={:?} pipes={:?} words={:?} hud={:?}",
                signals, pipe_tokens, word_tokens, hud_tokens
            );
        }

        let all: [&[String]; 3] = [&pipe_tokens, &word_tokens, &hud_tokens];
        let pipes_only: [&[String]; 1] = [&pipe_tokens];

        TokenIndex {
            any_folded: build_token_set(&all, true),
            any_exact: build_token_set(&all, false),
            pipes_folded: build_token_set(&pipes_only, true),
            pipes_exact: build_token_set(&pipes_only, false),
        }
    }

    /// The set a trigger with the given flags searches.
    pub(crate) fn lookup(&self, case_sensitive: bool, pipes_only: bool) -> &HashSet<String> {
        match (pipes_only, case_sensitive) {
            (true, true) => &self.pipes_exact,
            (true, false) => &self.pipes_folded,
            (false, true) => &self.any_exact,
            (false, false) => &self.any_folded,
        }
    }
}
