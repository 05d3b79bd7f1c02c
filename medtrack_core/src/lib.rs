#![forbid(unsafe_code)]

//! Core domain model and business logic for the Medtrack dose tracking system.
//!
//! This crate provides:
//! - Domain types (profiles, treatments, medications, dose events)
//! - Recurrence generation for dosing schedules
//! - The dose ledger and reconciliation engine
//! - Adherence progress calculation
//! - Reminder trigger scheduling
//! - Persistence (ledger, record collections, CSV export)

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod clock;
pub mod recurrence;
pub mod ledger;
pub mod store;
pub mod reconcile;
pub mod progress;
pub mod notify;
pub mod reminders;
pub mod report;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use clock::{Clock, FixedClock, SystemClock};
pub use recurrence::{dose_times, expected_times, full_course_times};
pub use ledger::DoseLedger;
pub use store::DataStore;
pub use reconcile::{classify, day_view, day_window, needs_reanchor, reanchored, ClassifiedDose};
pub use progress::{medication_progress, treatment_progress};
pub use report::append_report;
pub use notify::{FileTriggerStore, NotificationGateway, TriggerRequest};
pub use reminders::{trigger_id, ReminderScheduler};
