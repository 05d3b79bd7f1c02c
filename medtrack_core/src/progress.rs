//! Adherence progress calculation.
//!
//! Progress is defined over a medication's full treatment lifetime: the
//! expected count comes from the recurrence generator over `[anchor, end)`,
//! the logged count from authoritative (taken/skipped) ledger entries.

use crate::recurrence::full_course_times;
use crate::types::{DoseLogEntry, DoseStatus, ProgressResult, Schedule};

/// Per-medication adherence.
///
/// Schedules that generate no instances yield zero progress and are never
/// completed; pending entries count toward neither side.
pub fn medication_progress(schedule: &Schedule, entries: &[DoseLogEntry]) -> ProgressResult {
    let expected_count = full_course_times(schedule).len();
    let logged_count = entries
        .iter()
        .filter(|e| matches!(e.status, DoseStatus::Taken | DoseStatus::Skipped))
        .count();

    if expected_count == 0 {
        return ProgressResult {
            logged_count,
            ..ProgressResult::empty()
        };
    }

    ProgressResult {
        progress: (logged_count as f64 / expected_count as f64).min(1.0),
        is_completed: logged_count >= expected_count,
        logged_count,
        expected_count,
    }
}

/// Treatment-level rollup across member medications.
///
/// Progress is the arithmetic mean of per-medication progress, completion is
/// the logical AND of member completions, and the counts sum. An empty
/// treatment has zero progress and is not completed.
pub fn treatment_progress<'a>(
    members: impl IntoIterator<Item = (&'a Schedule, &'a [DoseLogEntry])>,
) -> ProgressResult {
    let mut count = 0usize;
    let mut progress_sum = 0.0;
    let mut all_completed = true;
    let mut logged_count = 0;
    let mut expected_count = 0;

    for (schedule, entries) in members {
        let result = medication_progress(schedule, entries);
        count += 1;
        progress_sum += result.progress;
        all_completed &= result.is_completed;
        logged_count += result.logged_count;
        expected_count += result.expected_count;
    }

    if count == 0 {
        return ProgressResult::empty();
    }

    ProgressResult {
        progress: progress_sum / count as f64,
        is_completed: all_completed,
        logged_count,
        expected_count,
    }
}
