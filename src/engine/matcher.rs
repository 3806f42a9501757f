//! Keyword matching and tie-break scoring.
//!
//! Given one trigger's keyword list and the token sets for the current text,
//! this module decides match/no-match and computes the trigger's score: the
//! lowest raw-text byte offset among its matching keywords. Lower offsets win
//! ties against other candidate triggers and packs — the cue that appears
//! first in the text takes priority.
//!
//! A keyword matches when any of these holds:
//!
//! 1. It is present verbatim (normalized per the trigger's case sensitivity)
//!    in the searched token set.
//! 2. A raw substring search succeeds in the original text. This covers
//!    keywords containing spaces or punctuation that tokenization would
//!    split, and it is the source of the tie-break offset.
//! 3. Fuzzy matching is enabled and some token's normalized Levenshtein
//!    similarity to the keyword meets the scanner-wide threshold.
//!
//! Triggers with `require_pipes` search only the pipe-derived token set, and
//! the substring rule is withheld for them — a keyword in plain prose must not
//! satisfy a pipes-only trigger.
//!
//! Similarity is cut off early when the lengths differ by more than 50%,
//! keeping the worst case proportional to token and keyword counts.

use super::tokenize::{TokenIndex, normalize_token};
use crate::api::FuzzyConfig;

/// A matched keyword plus its tie-break offset.
///
/// `offset` is a byte offset into the raw text; matches found only through
/// the token set or fuzzy comparison carry no offset and rank after any
/// offset-bearing candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct KeywordHit {
    pub keyword: String,
    pub offset: Option<usize>,
}

impl KeywordHit {
    /// Offset collapsed to a sortable rank (offset-less hits rank last).
    pub(crate) fn rank(&self) -> usize {
        self.offset.unwrap_or(usize::MAX)
    }
}

/// Normalized Levenshtein similarity in `[0, 1]`, with the 50% length-ratio
/// early cutoff applied before any edit-distance work.
pub(crate) fn similarity(a: &str, b: &str) -> f64 {
    let la = a.chars().count();
    let lb = b.chars().count();
    if la == 0 || lb == 0 {
        return 0.0;
    }
    let (min, max) = if la < lb { (la, lb) } else { (lb, la) };
    if (max - min) * 2 > max {
        return 0.0;
    }
    strsim::normalized_levenshtein(a, b)
}

/// Match a trigger's keywords against the token sets and raw text.
///
/// ANY keyword suffices; the returned hit carries the earliest offset among
/// all keywords that matched.
pub(crate) fn match_keywords(
    keywords: &[String],
    case_sensitive: bool,
    require_pipes: bool,
    tokens: &TokenIndex,
    raw_text: &str,
    fuzzy: &FuzzyConfig,
) -> Option<KeywordHit> {
    let set = tokens.lookup(case_sensitive, require_pipes);
    let haystack = if case_sensitive { raw_text.to_string() } else { raw_text.to_lowercase() };

    let mut best: Option<KeywordHit> = None;
    for keyword in keywords {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            continue;
        }
        let needle = if case_sensitive { keyword.to_string() } else { keyword.to_lowercase() };
        let substring_offset = haystack.find(&needle);

        let normalized = normalize_token(keyword, !case_sensitive);
        let mut matched = set.contains(&normalized);
        if !matched && !require_pipes {
            matched = substring_offset.is_some();
        }
        if !matched && fuzzy.enabled {
            matched = set.iter().any(|token| similarity(token, &normalized) >= fuzzy.threshold);
        }
        if !matched {
            continue;
        }

        let hit = KeywordHit { keyword: keyword.to_string(), offset: substring_offset };
        match &best {
            Some(current) if current.rank() <= hit.rank() => {}
            _ => best = Some(hit),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::DelimiterPair;
    use crate::engine::tokenize::Delimiters;

    fn index(text: &str) -> TokenIndex {
        TokenIndex::build(text, &Delimiters::compile(&[DelimiterPair::default()]))
    }

    fn kws(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    const NO_FUZZY: FuzzyConfig = FuzzyConfig { enabled: false, threshold: 0.8 };

    #[test]
    fn token_set_match_with_offset_from_raw_text() {
        let text = "the dog barks";
        let hit = match_keywords(&kws(&["dog"]), false, false, &index(text), text, &NO_FUZZY).unwrap();
        assert_eq!(hit.keyword, "dog");
        assert_eq!(hit.offset, Some(4));
    }

    #[test]
    fn earliest_keyword_offset_wins_within_a_trigger() {
        let text = "the dog barks";
        let hit = match_keywords(&kws(&["barks", "dog"]), false, false, &index(text), text, &NO_FUZZY).unwrap();
        assert_eq!(hit.keyword, "dog");
        assert_eq!(hit.offset, Some(4));
    }

    #[test]
    fn substring_rule_covers_multi_word_keywords() {
        let text = "meet me at the dog park!";
        let hit = match_keywords(&kws(&["dog park"]), false, false, &index(text), text, &NO_FUZZY).unwrap();
        assert_eq!(hit.offset, Some(15));
    }

    #[test]
    fn require_pipes_withholds_the_substring_rule() {
        let text = "the dog runs fast";
        assert!(match_keywords(&kws(&["fast"]), false, true, &index(text), text, &NO_FUZZY).is_none());

        let piped = "|dog| runs |fast|";
        let hit = match_keywords(&kws(&["fast"]), false, true, &index(piped), piped, &NO_FUZZY).unwrap();
        assert_eq!(hit.keyword, "fast");
    }

    #[test]
    fn case_sensitive_triggers_do_not_fold() {
        let text = "shout LOUD";
        assert!(match_keywords(&kws(&["loud"]), true, false, &index(text), text, &NO_FUZZY).is_none());
        assert!(match_keywords(&kws(&["LOUD"]), true, false, &index(text), text, &NO_FUZZY).is_some());
    }

    #[test]
    fn fuzzy_match_respects_threshold() {
        let text = "the drgon lands";
        let fuzzy = FuzzyConfig { enabled: true, threshold: 0.8 };
        let hit = match_keywords(&kws(&["dragon"]), false, false, &index(text), text, &fuzzy).unwrap();
        assert_eq!(hit.keyword, "dragon");
        assert_eq!(hit.offset, None);

        let strict = FuzzyConfig { enabled: true, threshold: 0.95 };
        assert!(match_keywords(&kws(&["dragon"]), false, false, &index(text), text, &strict).is_none());
    }

    #[test]
    fn fuzzy_disabled_never_approximates() {
        let text = "the drgon lands";
        assert!(match_keywords(&kws(&["dragon"]), false, false, &index(text), text, &NO_FUZZY).is_none());
    }

    #[test]
    fn similarity_short_circuits_on_length_ratio() {
        assert_eq!(similarity("ab", "abcdefgh"), 0.0);
        assert!(similarity("dragon", "drgon") > 0.8);
        assert_eq!(similarity("", "abc"), 0.0);
    }
}
