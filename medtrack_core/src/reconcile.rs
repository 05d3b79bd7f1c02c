//! Reconciliation engine: merges generated dose instants with ledger entries.
//!
//! `classify` produces the authoritative per-medication instance list for a
//! window; read-time classification into upcoming/due-now/missed is computed
//! from `now` at query time and never cached. All matching between generated
//! and recorded doses happens at minute granularity, and no result set ever
//! contains two instances with the same (medication, slot) identity.

use crate::recurrence::dose_times;
use crate::types::{
    minute_slot, truncate_to_minute, DoseInstance, DoseLogEntry, DoseStatus, DoseView, Medication,
    Schedule,
};
use chrono::{DateTime, Days, Duration, NaiveDate, NaiveTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// Merge generated dose instants for `[window_start, window_end)` with the
/// medication's ledger entries.
///
/// A generated instant that matches a ledger entry at minute granularity
/// takes the entry's status and taken time verbatim; an unmatched instant is
/// `pending`. Output is ordered by scheduled time and deterministic: the same
/// inputs always produce bit-identical results.
pub fn classify(
    schedule: &Schedule,
    medication_id: Uuid,
    entries: &[DoseLogEntry],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Vec<DoseInstance> {
    let by_slot: HashMap<i64, &DoseLogEntry> = entries
        .iter()
        .filter(|e| e.medication_id == medication_id)
        .map(|e| (e.slot(), e))
        .collect();

    dose_times(schedule, window_start, window_end)
        .map(|scheduled_time| match by_slot.get(&minute_slot(scheduled_time)) {
            Some(entry) => DoseInstance {
                medication_id,
                scheduled_time,
                status: entry.status,
                taken_time: entry.taken_time,
            },
            None => DoseInstance {
                medication_id,
                scheduled_time,
                status: DoseStatus::Pending,
                taken_time: None,
            },
        })
        .collect()
}

impl DoseInstance {
    /// Canonical missed predicate: still pending and the minute-truncated
    /// scheduled time lies before `now`. Every call site uses this.
    pub fn is_missed(&self, now: DateTime<Utc>) -> bool {
        self.status == DoseStatus::Pending && truncate_to_minute(self.scheduled_time) < now
    }

    /// Whether the user may act on this instance: `now` falls within
    /// `[scheduled - action_window_hours, scheduled + 24h]`.
    pub fn is_actionable(&self, now: DateTime<Utc>, action_window_hours: f64) -> bool {
        let lead = Duration::seconds((action_window_hours * 3600.0) as i64);
        let opens = self.scheduled_time - lead;
        let closes = self.scheduled_time + Duration::hours(24);
        now >= opens && now <= closes
    }

    /// Read-time classification from `now`. Recomputed on every query.
    pub fn view(&self, now: DateTime<Utc>, action_window_hours: f64) -> DoseView {
        match self.status {
            DoseStatus::Taken => DoseView::Taken,
            DoseStatus::Skipped => DoseView::Skipped,
            DoseStatus::Pending => {
                if self.is_missed(now) {
                    DoseView::Missed
                } else if self.is_actionable(now, action_window_hours) {
                    DoseView::DueNow
                } else {
                    DoseView::Upcoming
                }
            }
        }
    }
}

/// A dose instance with its read-time classification attached
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifiedDose {
    pub instance: DoseInstance,
    pub view: DoseView,
}

/// The UTC window covering one calendar day, `[00:00, next day 00:00)`
pub fn day_window(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day.and_time(NaiveTime::MIN).and_utc();
    let end = day
        .checked_add_days(Days::new(1))
        .unwrap_or(day)
        .and_time(NaiveTime::MIN)
        .and_utc();
    (start, end)
}

/// Classify one calendar day across many medications.
///
/// Each medication is reconciled independently against its own entries, so
/// the at-most-one-per-slot invariant holds per medication; the combined list
/// is ordered by scheduled time, then medication id, for a stable day view.
pub fn day_view<'a>(
    medications: impl IntoIterator<Item = (&'a Medication, &'a [DoseLogEntry])>,
    day: NaiveDate,
    now: DateTime<Utc>,
    action_window_hours: f64,
) -> Vec<ClassifiedDose> {
    let (start, end) = day_window(day);

    let mut doses: Vec<ClassifiedDose> = medications
        .into_iter()
        .flat_map(|(medication, entries)| {
            classify(&medication.schedule, medication.id, entries, start, end)
        })
        .map(|instance| ClassifiedDose {
            view: instance.view(now, action_window_hours),
            instance,
        })
        .collect();

    doses.sort_by_key(|d| (d.instance.scheduled_time, d.instance.medication_id));
    doses
}

/// Whether a logged take diverges enough from its slot to offer re-anchoring
pub fn needs_reanchor(
    scheduled_time: DateTime<Utc>,
    taken_time: DateTime<Utc>,
    threshold_minutes: i64,
) -> bool {
    let drift = (truncate_to_minute(taken_time) - truncate_to_minute(scheduled_time))
        .num_minutes()
        .abs();
    drift > threshold_minutes
}

/// Derive the re-anchored schedule for an "update all future doses" request.
///
/// The new anchor is the taken time; frequency and duration carry over, so
/// every not-yet-logged slot regenerates from the new anchor forward and none
/// of the old anchor's remaining slots survive. Already-written ledger
/// entries are untouched; this is a schedule change, not a ledger change.
pub fn reanchored(schedule: &Schedule, taken_time: DateTime<Utc>) -> Schedule {
    Schedule::new(taken_time, schedule.frequency_hours, schedule.duration_days)
}
