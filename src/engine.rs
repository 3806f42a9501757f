//! Matching and scheduling engine.
//!
//! This module is the *internal core* behind the public
//! [`Scanner`](crate::Scanner) and [`Scheduler`] types. It is split into focused submodules under
//! `src/engine/` while keeping paths stable (for example
//! `crate::engine::Scheduler` and `crate::engine::select`).
//!
//! ## How the parts work together
//!
//! At a high level, handling a chat message is a pipeline:
//!
//! ```text
//! text ── TokenIndex::build ──────────── (tokenize.rs)
//!              │  pipe/word/HUD token sets, gated by TextSignals
//!              ▼
//!       match_keywords ───────────────── (matcher.rs)
//!              │  per-trigger match + earliest-offset score
//!              ├─ resolve_*_pack ─────── (packs.rs)
//!              │    ANY pack keyword + ALL item keys
//!              ▼
//!       run_scan ─────────────────────── (scan.rs)
//!              │  offset sort, cooldown gates (cooldown.rs),
//!              │  winner selection per category
//!              ▼
//!       ScanOutcome ──▶ Scheduler ────── (scheduler.rs)
//!                         │  apply sprite, arm return-to-idle,
//!                         │  honor locks; selector.rs resolves
//!                         │  idle targets from state collections
//!                         ▼
//!                    poll(now) events
//! ```
//!
//! ## Responsibilities by module
//!
//! - `tokenize.rs`: normalization and the three token extraction passes,
//!   plus the cheap `TextSignals` pre-scan that gates them.
//! - `matcher.rs`: per-trigger keyword matching (token set, raw substring,
//!   fuzzy) and tie-break offsets.
//! - `packs.rs`: two-level pack semantics and sprite/background resolution.
//! - `cooldown.rs`: per-id and per-category-global cooldown gates.
//! - `scan.rs`: walks the catalog, scores candidates, gates, and assembles
//!   the `ScanOutcome`.
//! - `selector.rs`: pure state-collection selection (principal/random/list).
//! - `scheduler.rs`: per-character activation state machine with polled
//!   `due_at` deadlines.
//! - `metrics.rs`: opt-in per-stage timing data.
//!
//! ## Debugging
//!
//! Set `STAGECUE_DEBUG_SCAN=1` to print token sets, candidates, and
//! admission decisions.

#[path = "engine/cooldown.rs"]
pub(crate) mod cooldown;
#[path = "engine/matcher.rs"]
mod matcher;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/packs.rs"]
mod packs;
#[path = "engine/scan.rs"]
pub(crate) mod scan;
#[path = "engine/scheduler.rs"]
mod scheduler;
#[path = "engine/selector.rs"]
mod selector;
#[path = "engine/tokenize.rs"]
pub(crate) mod tokenize;


pub use metrics::ScanMetrics;
pub use scheduler::{ActivationEvent, CharacterActivation, PendingIdleReturn, Scheduler, SpriteLock};
pub use selector::{Selection, select, select_with_rng};
