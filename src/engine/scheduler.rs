//! Per-character activation scheduling.
//!
//! The scheduler is the stateful half of the engine: the scanner decides what
//! *could* fire, the scheduler decides what the character is *showing* and
//! when it reverts. Per character it tracks the current sprite, an optional
//! pending return-to-idle, and an optional sprite lock:
//!
//! ```text
//! Idle ──apply_trigger──▶ Triggered ──return_to_idle_ms──▶ PendingReturn
//!   ▲                                                          │
//!   └───────────────── poll() past due_at ◀────────────────────┘
//!
//! Locked: reachable from any state via lock_sprite; exits only on explicit
//! unlock or lock expiry. While locked, scans and trigger application are
//! suppressed before any tokenization happens.
//! ```
//!
//! There are no timer callbacks: every deadline is a `due_at` millisecond
//! timestamp and the host drives the machine by calling [`Scheduler::poll`]
//! with its own clock. That keeps the core independent of any timer facility
//! and trivially testable with a fake clock.
//!
//! Failure semantics: operations on an unknown character lazily initialize
//! default state; a reversion with no resolvable target arms no timer; a
//! countdown query with nothing pending answers `0`.

use std::collections::HashMap;

use rand::Rng;

use super::selector;
use crate::api::{Context, ScanOutcome, Scanner, SpriteHit};
use crate::defs::{CharacterRecord, ReturnMode, SpriteState};

/// An armed return-to-idle reversion.
#[derive(Debug, Clone)]
pub struct PendingIdleReturn {
    pub target_url: String,
    pub target_label: Option<String>,
    pub due_at: i64,
    /// Sprite the reversion was armed against. If the character is showing
    /// something else by the time the timer fires, the reversion is dropped.
    pub from_url: Option<String>,
}

/// A sprite pin. `until_at = None` means indefinite (explicit unlock only).
#[derive(Debug, Clone)]
pub struct SpriteLock {
    pub url: String,
    pub until_at: Option<i64>,
    pub reapply_interval_ms: Option<i64>,
    next_reapply_at: Option<i64>,
}

/// Transient activation state for one character. Created lazily on first use,
/// cleared by [`Scheduler::reset`].
#[derive(Debug, Clone, Default)]
pub struct CharacterActivation {
    pub current_sprite_url: Option<String>,
    pub current_sprite_label: Option<String>,
    pub pending_idle_return: Option<PendingIdleReturn>,
    pub lock: Option<SpriteLock>,
    /// Rotation cursor for the idle collection under `List` behavior. The
    /// selector is pure; the scheduler is the caller that persists rotation.
    idle_cursor: Option<usize>,
}

/// What a [`Scheduler::poll`] pass observed happening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationEvent {
    IdleReverted { character_id: String, sprite_url: String, sprite_label: Option<String> },
    LockExpired { character_id: String },
    LockReapplied { character_id: String, sprite_url: String },
}

/// Per-character activation state machine. One instance per session; no
/// module-level state.
#[derive(Debug, Default)]
pub struct Scheduler {
    characters: HashMap<String, CharacterActivation>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only view of a character's state, if any exists yet.
    pub fn state(&self, character_id: &str) -> Option<&CharacterActivation> {
        self.characters.get(character_id)
    }

    fn state_mut(&mut self, character_id: &str) -> &mut CharacterActivation {
        self.characters.entry(character_id.to_string()).or_default()
    }

    /// Whether the character's sprite is currently pinned.
    pub fn is_locked(&self, character_id: &str, ctx: &Context) -> bool {
        self.characters
            .get(character_id)
            .and_then(|state| state.lock.as_ref())
            .is_some_and(|lock| lock.until_at.is_none_or(|until| ctx.now_ms < until))
    }

    /// Milliseconds until the pending return-to-idle fires; `0` when nothing
    /// is pending (or it is already due).
    pub fn get_countdown(&self, character_id: &str, ctx: &Context) -> i64 {
        self.characters
            .get(character_id)
            .and_then(|state| state.pending_idle_return.as_ref())
            .map(|pending| (pending.due_at - ctx.now_ms).max(0))
            .unwrap_or(0)
    }

    /// Apply an admitted sprite hit to a character.
    ///
    /// Ignored while locked. A hit with `return_to_idle_ms > 0` arms (or
    /// overwrites — last writer wins) the pending reversion; a hit without
    /// one clears any reversion armed for the sprite it just replaced.
    pub fn apply_trigger<R: Rng>(
        &mut self,
        character: &CharacterRecord,
        hit: &SpriteHit,
        ctx: &Context,
        rng: &mut R,
    ) {
        if self.is_locked(&character.id, ctx) {
            return;
        }
        let state = self.state_mut(&character.id);
        state.current_sprite_url = Some(hit.sprite_url.clone());
        state.current_sprite_label = hit.sprite_label.clone();
        state.pending_idle_return = None;

        if let Some(ms) = hit.return_to_idle_ms.filter(|ms| *ms > 0) {
            self.schedule_return_to_idle_with_rng(
                character,
                ms,
                hit.return_mode,
                hit.return_sprite_url.as_deref(),
                ctx,
                rng,
            );
        }
    }

    /// [`Self::apply_trigger`] with a thread-local RNG.
    pub fn apply_trigger_simple(&mut self, character: &CharacterRecord, hit: &SpriteHit, ctx: &Context) {
        self.apply_trigger(character, hit, ctx, &mut rand::thread_rng());
    }

    /// Arm a return-to-idle timer for `delay_ms` from now.
    ///
    /// The reversion target resolves in priority order: the explicit fallback
    /// for [`ReturnMode::CustomSprite`], else the idle state collection, else
    /// the legacy single idle sprite, else the avatar. With no resolvable
    /// target no timer is armed.
    pub fn schedule_return_to_idle_with_rng<R: Rng>(
        &mut self,
        character: &CharacterRecord,
        delay_ms: i64,
        return_mode: ReturnMode,
        custom_sprite_url: Option<&str>,
        ctx: &Context,
        rng: &mut R,
    ) {
        if delay_ms <= 0 {
            return;
        }
        let target = self.resolve_return_target(character, return_mode, custom_sprite_url, rng);
        let state = self.state_mut(&character.id);
        match target {
            Some((target_url, target_label)) => {
                state.pending_idle_return = Some(PendingIdleReturn {
                    target_url,
                    target_label,
                    due_at: ctx.now_ms + delay_ms,
                    from_url: state.current_sprite_url.clone(),
                });
            }
            None => {
                // Unresolvable target: degrade to no-op, leave nothing armed.
                state.pending_idle_return = None;
            }
        }
    }

    /// [`Self::schedule_return_to_idle_with_rng`] with a thread-local RNG.
    pub fn schedule_return_to_idle(
        &mut self,
        character: &CharacterRecord,
        delay_ms: i64,
        return_mode: ReturnMode,
        custom_sprite_url: Option<&str>,
        ctx: &Context,
    ) {
        self.schedule_return_to_idle_with_rng(
            character,
            delay_ms,
            return_mode,
            custom_sprite_url,
            ctx,
            &mut rand::thread_rng(),
        );
    }

    fn resolve_return_target<R: Rng>(
        &mut self,
        character: &CharacterRecord,
        return_mode: ReturnMode,
        custom_sprite_url: Option<&str>,
        rng: &mut R,
    ) -> Option<(String, Option<String>)> {
        if return_mode == ReturnMode::CustomSprite {
            return custom_sprite_url.map(|url| (url.to_string(), None));
        }
        if let Some(collection) = character.collection(SpriteState::Idle) {
            let cursor = self.state_mut(&character.id).idle_cursor.unwrap_or(collection.current_index);
            let staged = collection.at_index(cursor);
            if let Some(selection) = selector::select_with_rng(&staged, true, rng) {
                if let Some(updated) = selection.updated {
                    self.state_mut(&character.id).idle_cursor = Some(updated.current_index);
                }
                return Some((selection.sprite_url, Some(selection.sprite_label)));
            }
        }
        if let Some(url) = character.legacy_sprites.get(&SpriteState::Idle) {
            return Some((url.clone(), None));
        }
        character.avatar_url.as_ref().map(|url| (url.clone(), None))
    }

    /// Pin `url` for `duration_ms` (`0` = until explicit unlock). While the
    /// lock holds, scans and trigger application are suppressed; an optional
    /// reapply interval re-forces the URL on poll, for hosts whose re-renders
    /// can revert it.
    pub fn lock_sprite(
        &mut self,
        character_id: &str,
        url: &str,
        duration_ms: i64,
        reapply_interval_ms: i64,
        ctx: &Context,
    ) {
        let state = self.state_mut(character_id);
        state.current_sprite_url = Some(url.to_string());
        state.current_sprite_label = None;
        state.pending_idle_return = None;
        state.lock = Some(SpriteLock {
            url: url.to_string(),
            until_at: (duration_ms > 0).then(|| ctx.now_ms + duration_ms),
            reapply_interval_ms: (reapply_interval_ms > 0).then_some(reapply_interval_ms),
            next_reapply_at: (reapply_interval_ms > 0).then(|| ctx.now_ms + reapply_interval_ms),
        });
    }

    pub fn unlock_sprite(&mut self, character_id: &str) {
        if let Some(state) = self.characters.get_mut(character_id) {
            state.lock = None;
        }
    }

    /// Clear the pending return timer for one character. Locks are released
    /// only by [`Self::unlock_sprite`] or their own expiry.
    pub fn cancel(&mut self, character_id: &str) {
        if let Some(state) = self.characters.get_mut(character_id) {
            state.pending_idle_return = None;
        }
    }

    /// Clear all per-character state (session reset).
    pub fn reset(&mut self) {
        self.characters.clear();
    }

    /// Service every due deadline against the caller's clock.
    ///
    /// Expired locks clear, active locks with a due reapply tick re-force
    /// their URL (coalesced to one event per poll), and due reversions apply
    /// — unless the sprite they were armed against has been replaced, in
    /// which case they drop silently. Polling is idempotent: a cancelled or
    /// already-serviced deadline leaves no residual effect.
    pub fn poll(&mut self, ctx: &Context) -> Vec<ActivationEvent> {
        let mut events = Vec::new();
        let mut ids: Vec<String> = self.characters.keys().cloned().collect();
        ids.sort_unstable();

        for id in ids {
            let Some(state) = self.characters.get_mut(&id) else { continue };

            if let Some(lock) = &state.lock {
                if lock.until_at.is_some_and(|until| ctx.now_ms >= until) {
                    state.lock = None;
                    events.push(ActivationEvent::LockExpired { character_id: id.clone() });
                }
            }

            if let Some(lock) = &mut state.lock {
                if lock.next_reapply_at.is_some_and(|at| ctx.now_ms >= at) {
                    state.current_sprite_url = Some(lock.url.clone());
                    lock.next_reapply_at = lock.reapply_interval_ms.map(|interval| ctx.now_ms + interval);
                    events.push(ActivationEvent::LockReapplied { character_id: id.clone(), sprite_url: lock.url.clone() });
                }
                // Reversion timers never fire under an active lock.
                state.pending_idle_return = None;
                continue;
            }

            let due = state.pending_idle_return.as_ref().is_some_and(|pending| ctx.now_ms >= pending.due_at);
            if due {
                if let Some(pending) = state.pending_idle_return.take() {
                    if pending.from_url == state.current_sprite_url {
                        state.current_sprite_url = Some(pending.target_url.clone());
                        state.current_sprite_label = pending.target_label.clone();
                        events.push(ActivationEvent::IdleReverted {
                            character_id: id.clone(),
                            sprite_url: pending.target_url,
                            sprite_label: pending.target_label,
                        });
                    }
                }
            }
        }
        events
    }

    /// Scan `text` and apply the admitted sprite hit to `character`.
    ///
    /// The lock check runs before any tokenization: a locked character costs
    /// no matching work and produces no hits and no state change.
    pub fn scan_and_apply_with_rng<R: Rng>(
        &mut self,
        scanner: &mut Scanner<'_>,
        character: &CharacterRecord,
        text: &str,
        ctx: &Context,
        rng: &mut R,
    ) -> ScanOutcome {
        if self.is_locked(&character.id, ctx) {
            return ScanOutcome::default();
        }
        let outcome = scanner.scan_message(text, ctx);
        if let Some(hit) = outcome.sprites.first() {
            self.apply_trigger(character, hit, ctx, rng);
        }
        outcome
    }

    /// [`Self::scan_and_apply_with_rng`] with a thread-local RNG.
    pub fn scan_and_apply(
        &mut self,
        scanner: &mut Scanner<'_>,
        character: &CharacterRecord,
        text: &str,
        ctx: &Context,
    ) -> ScanOutcome {
        self.scan_and_apply_with_rng(scanner, character, text, ctx, &mut rand::thread_rng())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defs::{CollectionEntry, EntryRole, SelectionBehavior, StateSpriteCollection};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn character() -> CharacterRecord {
        let mut c = CharacterRecord::new("mira");
        c.avatar_url = Some("sprites/avatar.png".into());
        c
    }

    fn sprite_hit(url: &str, return_ms: Option<i64>) -> SpriteHit {
        SpriteHit {
            trigger_id: "t".into(),
            sprite_url: url.into(),
            sprite_label: None,
            return_to_idle_ms: return_ms,
            return_mode: ReturnMode::IdleCollection,
            return_sprite_url: None,
            keyword: "k".into(),
            offset: Some(0),
        }
    }

    #[test]
    fn apply_sets_sprite_and_arms_return() {
        let mut sched = Scheduler::new();
        let ctx = Context::at_ms(10_000);
        sched.apply_trigger(&character(), &sprite_hit("sprites/wave.png", Some(5_000)), &ctx, &mut rng());

        let state = sched.state("mira").unwrap();
        assert_eq!(state.current_sprite_url.as_deref(), Some("sprites/wave.png"));
        assert_eq!(sched.get_countdown("mira", &ctx), 5_000);
        assert_eq!(sched.get_countdown("mira", &Context::at_ms(13_000)), 2_000);
    }

    #[test]
    fn later_trigger_preempts_pending_return() {
        let mut sched = Scheduler::new();
        let who = character();
        sched.apply_trigger(&who, &sprite_hit("sprites/a.png", Some(10_000)), &Context::at_ms(0), &mut rng());
        sched.apply_trigger(&who, &sprite_hit("sprites/b.png", Some(5_000)), &Context::at_ms(1_000), &mut rng());

        // Exactly one pending timer, due 5s after the second application.
        assert_eq!(sched.get_countdown("mira", &Context::at_ms(1_000)), 5_000);
        let events = sched.poll(&Context::at_ms(6_000));
        assert_eq!(events.len(), 1);
        assert!(sched.poll(&Context::at_ms(20_000)).is_empty());
    }

    #[test]
    fn reversion_prefers_idle_collection_then_avatar() {
        let mut sched = Scheduler::new();
        let mut who = character();
        who.state_collections.insert(
            SpriteState::Idle,
            StateSpriteCollection {
                entries: vec![CollectionEntry {
                    sprite_url: "sprites/idle.png".into(),
                    sprite_label: "idle".into(),
                    role: EntryRole::Principal,
                    order: 0,
                }],
                behavior: SelectionBehavior::Principal,
                current_index: 0,
            },
        );
        sched.apply_trigger(&who, &sprite_hit("sprites/x.png", Some(1_000)), &Context::at_ms(0), &mut rng());
        let events = sched.poll(&Context::at_ms(1_000));
        assert_eq!(
            events,
            vec![ActivationEvent::IdleReverted {
                character_id: "mira".into(),
                sprite_url: "sprites/idle.png".into(),
                sprite_label: Some("idle".into()),
            }]
        );

        // Without a collection, the avatar is the fallback.
        let plain = character();
        sched.apply_trigger(&plain, &sprite_hit("sprites/x.png", Some(1_000)), &Context::at_ms(2_000), &mut rng());
        let events = sched.poll(&Context::at_ms(3_000));
        assert_eq!(
            events,
            vec![ActivationEvent::IdleReverted {
                character_id: "mira".into(),
                sprite_url: "sprites/avatar.png".into(),
                sprite_label: None,
            }]
        );
    }

    #[test]
    fn custom_sprite_mode_uses_explicit_fallback() {
        let mut sched = Scheduler::new();
        let who = character();
        let mut hit = sprite_hit("sprites/x.png", Some(1_000));
        hit.return_mode = ReturnMode::CustomSprite;
        hit.return_sprite_url = Some("sprites/custom.png".into());
        sched.apply_trigger(&who, &hit, &Context::at_ms(0), &mut rng());
        let events = sched.poll(&Context::at_ms(1_500));
        assert_eq!(
            events,
            vec![ActivationEvent::IdleReverted {
                character_id: "mira".into(),
                sprite_url: "sprites/custom.png".into(),
                sprite_label: None,
            }]
        );
    }

    #[test]
    fn unresolvable_target_arms_no_timer() {
        let mut sched = Scheduler::new();
        let mut who = character();
        who.avatar_url = None;
        sched.apply_trigger(&who, &sprite_hit("sprites/x.png", Some(1_000)), &Context::at_ms(0), &mut rng());
        assert_eq!(sched.get_countdown("mira", &Context::at_ms(0)), 0);
        assert!(sched.poll(&Context::at_ms(5_000)).is_empty());
    }

    #[test]
    fn idle_collection_rotation_persists_across_returns() {
        let mut sched = Scheduler::new();
        let mut who = character();
        who.state_collections.insert(
            SpriteState::Idle,
            StateSpriteCollection {
                entries: vec![
                    CollectionEntry {
                        sprite_url: "sprites/i0.png".into(),
                        sprite_label: "i0".into(),
                        role: EntryRole::Normal,
                        order: 0,
                    },
                    CollectionEntry {
                        sprite_url: "sprites/i1.png".into(),
                        sprite_label: "i1".into(),
                        role: EntryRole::Normal,
                        order: 1,
                    },
                ],
                behavior: SelectionBehavior::List,
                current_index: 0,
            },
        );
        let mut r = rng();
        let mut targets = Vec::new();
        for round in 0..3 {
            let now = round * 10_000;
            sched.apply_trigger(&who, &sprite_hit("sprites/x.png", Some(1_000)), &Context::at_ms(now), &mut r);
            for event in sched.poll(&Context::at_ms(now + 1_000)) {
                if let ActivationEvent::IdleReverted { sprite_label, .. } = event {
                    targets.push(sprite_label.unwrap());
                }
            }
        }
        assert_eq!(targets, vec!["i0", "i1", "i0"]);
    }

    #[test]
    fn lock_suppresses_triggers_until_expiry() {
        let mut sched = Scheduler::new();
        let who = character();
        sched.lock_sprite("mira", "sprites/pinned.png", 10_000, 0, &Context::at_ms(0));
        assert!(sched.is_locked("mira", &Context::at_ms(5_000)));

        sched.apply_trigger(&who, &sprite_hit("sprites/other.png", None), &Context::at_ms(5_000), &mut rng());
        assert_eq!(sched.state("mira").unwrap().current_sprite_url.as_deref(), Some("sprites/pinned.png"));

        let events = sched.poll(&Context::at_ms(10_000));
        assert_eq!(events, vec![ActivationEvent::LockExpired { character_id: "mira".into() }]);
        assert!(!sched.is_locked("mira", &Context::at_ms(10_000)));
        sched.apply_trigger(&who, &sprite_hit("sprites/other.png", None), &Context::at_ms(11_000), &mut rng());
        assert_eq!(sched.state("mira").unwrap().current_sprite_url.as_deref(), Some("sprites/other.png"));
    }

    #[test]
    fn zero_duration_lock_holds_until_explicit_unlock() {
        let mut sched = Scheduler::new();
        sched.lock_sprite("mira", "sprites/pinned.png", 0, 0, &Context::at_ms(0));
        assert!(sched.is_locked("mira", &Context::at_ms(i64::MAX / 2)));
        sched.unlock_sprite("mira");
        assert!(!sched.is_locked("mira", &Context::at_ms(0)));
    }

    #[test]
    fn lock_reapply_ticks_are_coalesced_per_poll() {
        let mut sched = Scheduler::new();
        sched.lock_sprite("mira", "sprites/pinned.png", 0, 1_000, &Context::at_ms(0));
        assert!(sched.poll(&Context::at_ms(500)).is_empty());
        let events = sched.poll(&Context::at_ms(4_000));
        assert_eq!(
            events,
            vec![ActivationEvent::LockReapplied { character_id: "mira".into(), sprite_url: "sprites/pinned.png".into() }]
        );
        // Next tick re-arms relative to the poll that serviced it.
        assert!(sched.poll(&Context::at_ms(4_500)).is_empty());
        assert_eq!(sched.poll(&Context::at_ms(5_000)).len(), 1);
    }

    #[test]
    fn cancel_clears_only_the_pending_timer() {
        let mut sched = Scheduler::new();
        let who = character();
        sched.apply_trigger(&who, &sprite_hit("sprites/x.png", Some(5_000)), &Context::at_ms(0), &mut rng());
        sched.cancel("mira");
        assert_eq!(sched.get_countdown("mira", &Context::at_ms(0)), 0);
        assert!(sched.poll(&Context::at_ms(10_000)).is_empty());
        // Cancelling an unknown character is a no-op, not a failure.
        sched.cancel("nobody");
    }

    #[test]
    fn queries_on_unknown_characters_answer_neutral_defaults() {
        let sched = Scheduler::new();
        assert_eq!(sched.get_countdown("ghost", &Context::at_ms(0)), 0);
        assert!(!sched.is_locked("ghost", &Context::at_ms(0)));
        assert!(sched.state("ghost").is_none());
    }

    #[test]
    fn reset_clears_all_characters() {
        let mut sched = Scheduler::new();
        sched.lock_sprite("a", "s.png", 0, 0, &Context::at_ms(0));
        sched.lock_sprite("b", "s.png", 0, 0, &Context::at_ms(0));
        sched.reset();
        assert!(!sched.is_locked("a", &Context::at_ms(0)));
        assert!(sched.state("b").is_none());
    }

    #[test]
    fn stale_reversion_for_a_replaced_sprite_drops_silently() {
        let mut sched = Scheduler::new();
        let who = character();
        sched.apply_trigger(&who, &sprite_hit("sprites/a.png", Some(1_000)), &Context::at_ms(0), &mut rng());
        // Replace the sprite out from under the armed reversion.
        sched.state_mut("mira").current_sprite_url = Some("sprites/elsewhere.png".into());
        assert!(sched.poll(&Context::at_ms(2_000)).is_empty());
        assert_eq!(
            sched.state("mira").unwrap().current_sprite_url.as_deref(),
            Some("sprites/elsewhere.png")
        );
    }
}
