//! Reminder trigger scheduling.
//!
//! Derives the set of notification triggers that should exist from the
//! current schedule and ledger state. `resync` is always cancel-then-recreate
//! rather than an incremental diff; the horizon is small (the next rolling
//! week), so the churn is acceptable and the trigger set is always exactly
//! what the schedule implies.

use crate::clock::Clock;
use crate::config::RemindersConfig;
use crate::notify::{NotificationGateway, TriggerRequest};
use crate::recurrence::dose_times;
use crate::types::{minute_slot, DoseLogEntry, DoseStatus, Medication};
use crate::Result;
use chrono::{DateTime, Days, Duration, NaiveTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Versioned trigger identity scheme. Creation and cancellation must derive
/// identities through the same function or targeted cancellation silently
/// no-ops; this is the single source of truth.
const TRIGGER_ID_VERSION: &str = "v1";

/// Trigger identity for a (medication, slot) pair.
///
/// Reconstructible from the pair alone, so `cancel_one` needs no lookup
/// table.
pub fn trigger_id(medication_id: Uuid, scheduled_time: DateTime<Utc>) -> String {
    format!(
        "dose-{}-{}-{}",
        TRIGGER_ID_VERSION,
        medication_id,
        minute_slot(crate::types::truncate_to_minute(scheduled_time))
    )
}

/// Prefix shared by every trigger of one medication
fn trigger_prefix(medication_id: Uuid) -> String {
    format!("dose-{}-{}-", TRIGGER_ID_VERSION, medication_id)
}

/// Reminder scheduler over an injected gateway and clock.
///
/// All trigger work for one medication is serialized through a per-medication
/// lock: two interleaved resyncs could otherwise leave duplicate or zero
/// triggers. Different medications proceed independently.
pub struct ReminderScheduler<G: NotificationGateway, C: Clock> {
    gateway: Mutex<G>,
    clock: C,
    settings: RemindersConfig,
    med_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl<G: NotificationGateway, C: Clock> ReminderScheduler<G, C> {
    pub fn new(gateway: G, clock: C, settings: RemindersConfig) -> Self {
        Self {
            gateway: Mutex::new(gateway),
            clock,
            settings,
            med_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Consume the scheduler and return the gateway (testing convenience)
    pub fn into_gateway(self) -> G {
        self.gateway
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_for(&self, medication_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self
            .med_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(medication_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Re-synchronize the trigger set for one medication.
    ///
    /// Cancels every existing trigger for the medication, then creates
    /// triggers for unlogged future instances within the rolling horizon:
    /// - normal case: fires `lead_minutes` before the scheduled time
    /// - lead time already passed but the dose is still future: an immediate
    ///   catch-up trigger a few seconds out
    /// - the scheduled time itself is already past: no trigger
    ///
    /// A per-instance creation failure is logged and skipped; it never aborts
    /// the rest of the batch. Returns the created trigger ids.
    pub fn resync(
        &self,
        medication: &Medication,
        entries: &[DoseLogEntry],
    ) -> Result<Vec<String>> {
        let guard = self.lock_for(medication.id);
        let _held = guard.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        self.cancel_locked(medication.id)?;

        if !self.settings.enabled {
            tracing::debug!("Reminders disabled; no triggers for {}", medication.id);
            return Ok(Vec::new());
        }

        let now = self.clock.now();
        let horizon_end = (now.date_naive() + Days::new(self.settings.horizon_days.max(0) as u64))
            .and_time(NaiveTime::MIN)
            .and_utc();
        let lead = Duration::minutes(self.settings.lead_minutes.max(0));

        let logged: HashSet<i64> = entries
            .iter()
            .filter(|e| {
                e.medication_id == medication.id
                    && matches!(e.status, DoseStatus::Taken | DoseStatus::Skipped)
            })
            .map(|e| e.slot())
            .collect();

        let mut gateway = self
            .gateway
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut created = Vec::new();
        for scheduled_time in dose_times(&medication.schedule, now, horizon_end) {
            if logged.contains(&minute_slot(scheduled_time)) {
                continue;
            }
            if scheduled_time <= now {
                continue;
            }

            let fire_at = scheduled_time - lead;
            let request = TriggerRequest {
                id: trigger_id(medication.id, scheduled_time),
                fire_at: (fire_at > now).then_some(fire_at),
                fire_after_seconds: (fire_at <= now)
                    .then_some(self.settings.catch_up_delay_seconds),
                title: format!("Time for {}", medication.name),
                body: format!(
                    "{} at {}",
                    medication.dosage,
                    scheduled_time.format("%H:%M")
                ),
            };

            match gateway.create_trigger(&request) {
                Ok(()) => created.push(request.id),
                Err(e) => {
                    tracing::warn!(
                        "Failed to create trigger {} for {}: {}",
                        request.id,
                        medication.name,
                        e
                    );
                }
            }
        }

        tracing::info!(
            "Resynced {} reminder triggers for {}",
            created.len(),
            medication.name
        );
        Ok(created)
    }

    /// Cancel every trigger belonging to a medication.
    /// Returns the number of triggers cancelled.
    pub fn cancel(&self, medication_id: Uuid) -> Result<usize> {
        let guard = self.lock_for(medication_id);
        let _held = guard.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.cancel_locked(medication_id)
    }

    /// Cancel the trigger for a single dose slot, reconstructing its identity
    /// from the same derivation `resync` used to create it.
    pub fn cancel_one(&self, medication_id: Uuid, scheduled_time: DateTime<Utc>) -> Result<()> {
        let guard = self.lock_for(medication_id);
        let _held = guard.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut gateway = self
            .gateway
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        gateway.cancel_triggers(&[trigger_id(medication_id, scheduled_time)])
    }

    fn cancel_locked(&self, medication_id: Uuid) -> Result<usize> {
        let mut gateway = self
            .gateway
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let prefix = trigger_prefix(medication_id);
        let stale: Vec<String> = gateway
            .pending_trigger_ids()?
            .into_iter()
            .filter(|id| id.starts_with(&prefix))
            .collect();
        let count = stale.len();
        gateway.cancel_triggers(&stale)?;
        Ok(count)
    }
}
