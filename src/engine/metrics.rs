//! Scan metrics.
//!
//! A small set of structs used to observe and debug scan performance. Metrics
//! are intentionally simple and *opt-in*:
//!
//! - `Scanner::scan_message` measures only total elapsed time.
//! - `Scanner::scan_verbose` surfaces the per-stage breakdown for profiling
//!   and regression hunting.
//!
//! Counts prefixed with candidate/admitted describe the gate funnel: how many
//! triggers matched at all versus how many cleared their cooldown windows.

use std::time::Duration;

/// Per-stage timings and gate-funnel counts for one scan.
#[derive(Debug, Default, Clone)]
pub struct ScanMetrics {
    /// Total elapsed time for the scan.
    pub total: Duration,
    /// Time spent building token sets (signals + extraction + normalization).
    pub tokenize: Duration,
    /// Time spent matching trigger and pack definitions.
    pub matching: Duration,
    /// Time spent in cooldown gating and winner selection.
    pub gating: Duration,
    /// Definitions that produced a match before gating.
    pub candidates: usize,
    /// Hits admitted after cooldown gating and winner selection.
    pub admitted: usize,
}
