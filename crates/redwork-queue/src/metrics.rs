//! Queue metrics.
//!
//! Counters are recorded through the `metrics` facade; installing an
//! exporter is left to the embedding application.

use metrics::counter;

use crate::store::PromoteOutcome;

// =============================================================================
// Metric Names
// =============================================================================

/// Metric name constants for consistency.
pub mod names {
    /// Jobs written to a ready queue or the scheduled set, by mode.
    pub const JOBS_ENQUEUED_TOTAL: &str = "redwork_jobs_enqueued_total";

    /// Unique submissions rejected because an identical job is outstanding.
    pub const UNIQUE_DUPLICATES_TOTAL: &str = "redwork_unique_duplicates_total";

    /// SADDs issued against known_jobs.
    pub const KNOWN_JOBS_ANNOUNCED_TOTAL: &str = "redwork_known_jobs_announced_total";

    /// Promote-due invocations that moved a job, by set and outcome.
    pub const JOBS_PROMOTED_TOTAL: &str = "redwork_jobs_promoted_total";

    /// Dead jobs moved back onto a ready queue.
    pub const DEAD_JOBS_REQUEUED_TOTAL: &str = "redwork_dead_jobs_requeued_total";
}

// =============================================================================
// Recording Functions
// =============================================================================

pub fn record_enqueued(mode: &'static str) {
    counter!(names::JOBS_ENQUEUED_TOTAL, "mode" => mode).increment(1);
}

pub fn record_unique_duplicate() {
    counter!(names::UNIQUE_DUPLICATES_TOTAL).increment(1);
}

pub fn record_known_job_announced() {
    counter!(names::KNOWN_JOBS_ANNOUNCED_TOTAL).increment(1);
}

pub fn record_promoted(set: &'static str, outcome: PromoteOutcome) {
    if outcome == PromoteOutcome::Nothing {
        return;
    }
    counter!(
        names::JOBS_PROMOTED_TOTAL,
        "set" => set,
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

pub fn record_dead_requeued(count: u64) {
    counter!(names::DEAD_JOBS_REQUEUED_TOTAL).increment(count);
}

// =============================================================================
// Tests
// =============================================================================
