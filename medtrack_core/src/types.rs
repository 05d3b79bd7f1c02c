//! Core domain types for the Medtrack system.
//!
//! This module defines the fundamental types used throughout the system:
//! - Profiles, treatments and medications
//! - Dosing schedules
//! - Dose log entries and derived dose instances
//! - Adherence progress results

use chrono::{DateTime, Days, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Time helpers
// ============================================================================

/// Truncate a timestamp to whole minutes.
///
/// Minute granularity is the canonical key unit: every scheduled time that is
/// stored, generated or compared goes through this first.
pub fn truncate_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

/// Minute slot for a timestamp (whole minutes since the Unix epoch).
///
/// This is the join key between generated dose instances and recorded
/// ledger entries.
pub fn minute_slot(t: DateTime<Utc>) -> i64 {
    t.timestamp().div_euclid(60)
}

// ============================================================================
// Record Types
// ============================================================================

/// A person whose medications are tracked
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
}

/// A named course of treatment grouping one or more medications
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Treatment {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub name: String,
}

/// A medication record with its dosing schedule
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Medication {
    pub id: Uuid,
    pub treatment_id: Uuid,
    pub name: String,
    pub dosage: String,
    pub schedule: Schedule,
}

// ============================================================================
// Schedule
// ============================================================================

/// A medication's dosing pattern: anchor time, hourly frequency, duration.
///
/// Immutable for the duration of one reconciliation pass; edits produce a new
/// `Schedule` value rather than mutating one mid-computation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub anchor_time: DateTime<Utc>,
    pub frequency_hours: i64,
    pub duration_days: i64,
}

impl Schedule {
    /// Create a schedule with the anchor truncated to minute granularity
    pub fn new(anchor_time: DateTime<Utc>, frequency_hours: i64, duration_days: i64) -> Self {
        Self {
            anchor_time: truncate_to_minute(anchor_time),
            frequency_hours,
            duration_days,
        }
    }

    /// Whether this schedule generates any dose instances at all
    pub fn generates_instances(&self) -> bool {
        self.frequency_hours > 0 && self.duration_days > 0
    }

    /// Interval between doses as elapsed time
    pub fn dose_interval(&self) -> Duration {
        Duration::hours(self.frequency_hours)
    }

    /// Schedule end: anchor plus `duration_days` calendar days.
    ///
    /// Instances are generated over the half-open range `[anchor, end)`.
    pub fn end_time(&self) -> DateTime<Utc> {
        let anchor = truncate_to_minute(self.anchor_time);
        if self.duration_days <= 0 {
            return anchor;
        }
        anchor
            .checked_add_days(Days::new(self.duration_days as u64))
            .unwrap_or(anchor)
    }
}

// ============================================================================
// Dose Events
// ============================================================================

/// Status of a dose slot
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DoseStatus {
    Pending,
    Taken,
    Skipped,
}

/// A recorded dose event, owned by the dose ledger.
///
/// At most one entry may exist per (medication_id, minute-truncated
/// scheduled_time) slot; re-logging the same slot updates in place.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DoseLogEntry {
    pub id: Uuid,
    pub medication_id: Uuid,
    pub scheduled_time: DateTime<Utc>,
    pub taken_time: Option<DateTime<Utc>>,
    pub status: DoseStatus,
}

impl DoseLogEntry {
    /// Create a `taken` entry for a dose slot
    pub fn taken(
        medication_id: Uuid,
        scheduled_time: DateTime<Utc>,
        taken_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            medication_id,
            scheduled_time: truncate_to_minute(scheduled_time),
            taken_time: Some(truncate_to_minute(taken_time)),
            status: DoseStatus::Taken,
        }
    }

    /// Create a `skipped` entry for a dose slot
    pub fn skipped(medication_id: Uuid, scheduled_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            medication_id,
            scheduled_time: truncate_to_minute(scheduled_time),
            taken_time: None,
            status: DoseStatus::Skipped,
        }
    }

    /// The minute slot this entry is keyed on
    pub fn slot(&self) -> i64 {
        minute_slot(self.scheduled_time)
    }
}

/// One expected dose at a specific scheduled time. Derived, never persisted.
///
/// Identity is (medication_id, minute-truncated scheduled_time); no two
/// instances with the same identity may appear in a result set.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct DoseInstance {
    pub medication_id: Uuid,
    pub scheduled_time: DateTime<Utc>,
    pub status: DoseStatus,
    pub taken_time: Option<DateTime<Utc>>,
}

impl DoseInstance {
    /// The minute slot identifying this instance
    pub fn slot(&self) -> i64 {
        minute_slot(self.scheduled_time)
    }
}

/// Read-time classification of a dose instance, computed from `now` at query
/// time and never cached.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DoseView {
    Upcoming,
    DueNow,
    Missed,
    Taken,
    Skipped,
}

// ============================================================================
// Progress
// ============================================================================

/// Adherence progress for a medication or a whole treatment
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ProgressResult {
    /// Ratio of logged to expected doses, in [0, 1]
    pub progress: f64,
    pub is_completed: bool,
    pub logged_count: usize,
    pub expected_count: usize,
}

impl ProgressResult {
    /// Zero progress, used for schedules that generate no instances
    pub fn empty() -> Self {
        Self {
            progress: 0.0,
            is_completed: false,
            logged_count: 0,
            expected_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_truncate_to_minute_drops_seconds() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 45).unwrap();
        let truncated = truncate_to_minute(t);
        assert_eq!(truncated, Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap());
    }

    #[test]
    fn test_minute_slot_matches_after_truncation() {
        let a = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 3).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 59).unwrap();
        assert_eq!(minute_slot(truncate_to_minute(a)), minute_slot(truncate_to_minute(b)));
    }

    #[test]
    fn test_schedule_end_uses_calendar_days() {
        let anchor = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let schedule = Schedule::new(anchor, 8, 2);
        assert_eq!(schedule.end_time(), Utc.with_ymd_and_hms(2024, 3, 3, 8, 0, 0).unwrap());
    }

    #[test]
    fn test_degenerate_schedule_generates_nothing() {
        let anchor = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        assert!(!Schedule::new(anchor, 0, 1).generates_instances());
        assert!(!Schedule::new(anchor, 8, 0).generates_instances());
        assert!(Schedule::new(anchor, 8, 1).generates_instances());
    }

    #[test]
    fn test_entry_constructors_truncate_times() {
        let med = Uuid::new_v4();
        let scheduled = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 30).unwrap();
        let taken_at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 25, 12).unwrap();

        let entry = DoseLogEntry::taken(med, scheduled, taken_at);
        assert_eq!(entry.scheduled_time.second(), 0);
        assert_eq!(entry.taken_time.unwrap().second(), 0);
        assert_eq!(entry.status, DoseStatus::Taken);

        let entry = DoseLogEntry::skipped(med, scheduled);
        assert_eq!(entry.taken_time, None);
        assert_eq!(entry.status, DoseStatus::Skipped);
    }
}
