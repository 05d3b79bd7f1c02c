use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use medtrack_core::*;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "medtrack")]
#[command(about = "Medication dose tracking and reminder system", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override the current time, RFC 3339 (for testing)
    #[arg(long, global = true)]
    now: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a medication with its dosing schedule
    Add {
        /// Medication name
        #[arg(long)]
        name: String,

        /// Dosage text (e.g. "500 mg")
        #[arg(long)]
        dosage: String,

        /// Hours between doses
        #[arg(long)]
        every: i64,

        /// Duration of the course in days
        #[arg(long)]
        days: i64,

        /// First dose time, RFC 3339 (defaults to now)
        #[arg(long)]
        start: Option<String>,

        /// Treatment name (created if missing)
        #[arg(long)]
        treatment: Option<String>,

        /// Profile name (created if missing)
        #[arg(long)]
        profile: Option<String>,
    },

    /// List medications
    List,

    /// Show the classified dose list for a day
    Today {
        /// Day to show, YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<String>,
    },

    /// Record a dose as taken
    Take {
        /// Medication name or id prefix
        medication: String,

        /// Scheduled slot being acted on, RFC 3339
        #[arg(long)]
        slot: String,

        /// Actual take time, RFC 3339 (defaults to now)
        #[arg(long)]
        at: Option<String>,

        /// Re-anchor the schedule so future doses follow the actual take time
        #[arg(long)]
        update_future: bool,
    },

    /// Record a dose as skipped
    Skip {
        /// Medication name or id prefix
        medication: String,

        /// Scheduled slot being acted on, RFC 3339
        #[arg(long)]
        slot: String,
    },

    /// Show adherence progress
    Progress {
        /// Roll up across a treatment instead of listing medications
        #[arg(long)]
        treatment: Option<String>,
    },

    /// Re-synchronize reminder triggers
    Remind {
        /// Limit to one medication (name or id prefix)
        #[arg(long)]
        medication: Option<String>,
    },

    /// Delete a medication and its dose history
    Remove {
        /// Medication name or id prefix
        medication: String,
    },

    /// Export a classified adherence report to CSV
    Export {
        /// Output CSV path
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    medtrack_core::logging::init();

    let cli = Cli::parse();

    let config = Config::load()?;
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    let clock: Box<dyn Clock> = match cli.now.as_deref() {
        Some(s) => Box::new(FixedClock::new(parse_time(s)?)),
        None => Box::new(SystemClock),
    };

    let store = DataStore::new(&data_dir);

    match cli.command {
        Commands::Add {
            name,
            dosage,
            every,
            days,
            start,
            treatment,
            profile,
        } => cmd_add(
            &store, &config, clock.as_ref(), name, dosage, every, days, start, treatment, profile,
        ),
        Commands::List => cmd_list(&store),
        Commands::Today { date } => cmd_today(&store, &config, clock.as_ref(), date),
        Commands::Take {
            medication,
            slot,
            at,
            update_future,
        } => cmd_log(
            &store,
            &config,
            clock.as_ref(),
            &medication,
            &slot,
            LogAction::Take { at, update_future },
        ),
        Commands::Skip { medication, slot } => {
            cmd_log(&store, &config, clock.as_ref(), &medication, &slot, LogAction::Skip)
        }
        Commands::Progress { treatment } => cmd_progress(&store, treatment),
        Commands::Remind { medication } => cmd_remind(&store, &config, clock.as_ref(), medication),
        Commands::Remove { medication } => cmd_remove(&store, &config, clock.as_ref(), &medication),
        Commands::Export { out } => cmd_export(&store, &config, clock.as_ref(), &out),
    }
}

enum LogAction {
    Take {
        at: Option<String>,
        update_future: bool,
    },
    Skip,
}

fn scheduler<'a>(
    store: &DataStore,
    config: &Config,
    clock: &'a dyn Clock,
) -> ReminderScheduler<FileTriggerStore, &'a dyn Clock> {
    let triggers = FileTriggerStore::new(store.dir().join("triggers.json"));
    ReminderScheduler::new(triggers, clock, config.reminders.clone())
}

#[allow(clippy::too_many_arguments)]
fn cmd_add(
    store: &DataStore,
    config: &Config,
    clock: &dyn Clock,
    name: String,
    dosage: String,
    every: i64,
    days: i64,
    start: Option<String>,
    treatment: Option<String>,
    profile: Option<String>,
) -> Result<()> {
    let anchor = match start {
        Some(s) => parse_time(&s)?,
        None => clock.now(),
    };

    let profile_id = find_or_create_profile(store, profile.as_deref().unwrap_or("default"))?;
    let treatment_id = find_or_create_treatment(
        store,
        profile_id,
        treatment.as_deref().unwrap_or("general"),
    )?;

    let medication = Medication {
        id: Uuid::new_v4(),
        treatment_id,
        name,
        dosage,
        schedule: Schedule::new(anchor, every, days),
    };
    store.upsert_medication(&medication)?;

    let created = scheduler(store, config, clock)
        .resync(&medication, &[])
        .unwrap_or_else(|e| {
            tracing::warn!("Reminder resync failed for {}: {}", medication.name, e);
            Vec::new()
        });

    println!("✓ Added {} ({})", medication.name, medication.dosage);
    println!(
        "  Every {}h for {} days from {}",
        medication.schedule.frequency_hours,
        medication.schedule.duration_days,
        medication.schedule.anchor_time.format("%Y-%m-%d %H:%M"),
    );
    println!("  Scheduled {} reminder triggers", created.len());
    Ok(())
}

fn cmd_list(store: &DataStore) -> Result<()> {
    let medications = store.load_medications()?;
    if medications.is_empty() {
        println!("No medications on record.");
        return Ok(());
    }

    for medication in &medications {
        println!(
            "{}  {} {} | every {}h for {} days (from {})",
            short_id(medication.id),
            medication.name,
            medication.dosage,
            medication.schedule.frequency_hours,
            medication.schedule.duration_days,
            medication.schedule.anchor_time.format("%Y-%m-%d %H:%M"),
        );
    }
    Ok(())
}

fn cmd_today(
    store: &DataStore,
    config: &Config,
    clock: &dyn Clock,
    date: Option<String>,
) -> Result<()> {
    let now = clock.now();
    let day = match date {
        Some(s) => parse_date(&s)?,
        None => now.date_naive(),
    };

    let medications = store.load_medications()?;
    let ledger = store.ledger();
    let mut med_entries = Vec::with_capacity(medications.len());
    for medication in &medications {
        med_entries.push(ledger.query_by(medication.id)?);
    }

    let pairs: Vec<_> = medications
        .iter()
        .zip(med_entries.iter())
        .map(|(m, e)| (m, e.as_slice()))
        .collect();
    let doses = day_view(pairs, day, now, config.dosing.action_window_hours);

    println!("Doses for {}", day);
    println!("─────────────────────────────────────────");
    if doses.is_empty() {
        println!("No doses scheduled.");
        return Ok(());
    }

    for dose in &doses {
        let medication = medications
            .iter()
            .find(|m| m.id == dose.instance.medication_id);
        let name = medication.map(|m| m.name.as_str()).unwrap_or("?");
        let dosage = medication.map(|m| m.dosage.as_str()).unwrap_or("");
        let (symbol, label) = match dose.view {
            DoseView::Taken => ("✓", "taken"),
            DoseView::Skipped => ("○", "skipped"),
            DoseView::Missed => ("!", "missed"),
            DoseView::DueNow => ("●", "due now"),
            DoseView::Upcoming => (" ", "upcoming"),
        };
        println!(
            "  {} [{}] {} {} ({})",
            dose.instance.scheduled_time.format("%H:%M"),
            symbol,
            name,
            dosage,
            label,
        );
    }
    Ok(())
}

fn cmd_log(
    store: &DataStore,
    config: &Config,
    clock: &dyn Clock,
    medication_query: &str,
    slot: &str,
    action: LogAction,
) -> Result<()> {
    let medications = store.load_medications()?;
    let medication = find_medication(&medications, medication_query)?;
    let scheduled_time = parse_time(slot)?;

    let recorded = match action {
        LogAction::Take { at, update_future } => {
            let taken_time = match at {
                Some(s) => parse_time(&s)?,
                None => clock.now(),
            };
            let entry = DoseLogEntry::taken(medication.id, scheduled_time, taken_time);

            if update_future
                && needs_reanchor(
                    scheduled_time,
                    taken_time,
                    config.dosing.reanchor_threshold_minutes,
                )
            {
                let new_schedule = reanchored(&medication.schedule, taken_time);
                let recorded = store.record_dose_with_reanchor(&entry, new_schedule)?;
                println!("✓ Future doses re-anchored to {}", taken_time.format("%H:%M"));
                recorded
            } else {
                store.ledger().record_dose(&entry)?
            }
        }
        LogAction::Skip => {
            let entry = DoseLogEntry::skipped(medication.id, scheduled_time);
            store.ledger().record_dose(&entry)?
        }
    };

    // Schedule may have changed; reload before resyncing triggers
    let medication = store.medication(medication.id)?;
    let entries = store.ledger().query_by(medication.id)?;
    if let Err(e) = scheduler(store, config, clock).resync(&medication, &entries) {
        tracing::warn!("Reminder resync failed for {}: {}", medication.name, e);
    }

    match recorded.status {
        DoseStatus::Taken => println!("✓ Dose logged as taken"),
        DoseStatus::Skipped => println!("✓ Dose logged as skipped"),
        DoseStatus::Pending => {}
    }
    Ok(())
}

fn cmd_progress(store: &DataStore, treatment: Option<String>) -> Result<()> {
    let medications = store.load_medications()?;
    let ledger = store.ledger();

    if let Some(treatment_name) = treatment {
        let treatments = store.load_treatments()?;
        let treatment = treatments
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(&treatment_name))
            .ok_or_else(|| Error::NotFound(format!("treatment '{}'", treatment_name)))?;

        let members: Vec<_> = medications
            .iter()
            .filter(|m| m.treatment_id == treatment.id)
            .collect();
        let mut entry_sets = Vec::with_capacity(members.len());
        for medication in &members {
            entry_sets.push(ledger.query_by(medication.id)?);
        }

        let result = treatment_progress(
            members
                .iter()
                .zip(entry_sets.iter())
                .map(|(m, e)| (&m.schedule, e.as_slice())),
        );

        println!("Treatment {}:", treatment.name);
        print_progress(&result);
        return Ok(());
    }

    if medications.is_empty() {
        println!("No medications on record.");
        return Ok(());
    }

    for medication in &medications {
        let entries = ledger.query_by(medication.id)?;
        let result = medication_progress(&medication.schedule, &entries);
        println!("{}:", medication.name);
        print_progress(&result);
    }
    Ok(())
}

fn print_progress(result: &ProgressResult) {
    println!(
        "  {}/{} doses logged ({:.1}%){}",
        result.logged_count,
        result.expected_count,
        result.progress * 100.0,
        if result.is_completed { " [completed]" } else { "" },
    );
}

fn cmd_remind(
    store: &DataStore,
    config: &Config,
    clock: &dyn Clock,
    medication_query: Option<String>,
) -> Result<()> {
    let medications = store.load_medications()?;
    let targets: Vec<Medication> = match medication_query {
        Some(q) => vec![find_medication(&medications, &q)?],
        None => medications,
    };

    let sched = scheduler(store, config, clock);
    let ledger = store.ledger();
    let mut total = 0;
    for medication in &targets {
        let entries = ledger.query_by(medication.id)?;
        let created = sched.resync(medication, &entries)?;
        total += created.len();
    }

    println!("✓ Scheduled {} reminder triggers", total);
    Ok(())
}

fn cmd_remove(
    store: &DataStore,
    config: &Config,
    clock: &dyn Clock,
    medication_query: &str,
) -> Result<()> {
    let medications = store.load_medications()?;
    let medication = find_medication(&medications, medication_query)?;

    let removed = store.delete_medication(medication.id)?;
    let cancelled = scheduler(store, config, clock).cancel(removed.id)?;

    println!(
        "✓ Removed {} ({} reminder triggers cancelled)",
        removed.name, cancelled
    );
    Ok(())
}

fn cmd_export(
    store: &DataStore,
    config: &Config,
    clock: &dyn Clock,
    out: &std::path::Path,
) -> Result<()> {
    let now = clock.now();
    let medications = store.load_medications()?;
    let ledger = store.ledger();

    let mut total = 0;
    for medication in &medications {
        let entries = ledger.query_by(medication.id)?;
        let anchor = medication.schedule.anchor_time;
        let doses: Vec<_> = classify(
            &medication.schedule,
            medication.id,
            &entries,
            anchor,
            medication.schedule.end_time(),
        )
        .into_iter()
        .map(|instance| ClassifiedDose {
            view: instance.view(now, config.dosing.action_window_hours),
            instance,
        })
        .collect();

        total += append_report(out, medication, &doses)?;
    }

    println!("✓ Exported {} report rows to {}", total, out.display());
    Ok(())
}

// ----------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------

fn short_id(id: Uuid) -> String {
    id.to_string().chars().take(8).collect()
}

fn find_medication(medications: &[Medication], query: &str) -> Result<Medication> {
    medications
        .iter()
        .find(|m| {
            m.name.eq_ignore_ascii_case(query) || m.id.to_string().starts_with(query)
        })
        .cloned()
        .ok_or_else(|| Error::NotFound(format!("medication '{}'", query)))
}

fn find_or_create_profile(store: &DataStore, name: &str) -> Result<Uuid> {
    let mut profiles = store.load_profiles()?;
    if let Some(profile) = profiles.iter().find(|p| p.name.eq_ignore_ascii_case(name)) {
        return Ok(profile.id);
    }
    let profile = Profile {
        id: Uuid::new_v4(),
        name: name.to_string(),
    };
    let id = profile.id;
    profiles.push(profile);
    store.save_profiles(&profiles)?;
    Ok(id)
}

fn find_or_create_treatment(store: &DataStore, profile_id: Uuid, name: &str) -> Result<Uuid> {
    let mut treatments = store.load_treatments()?;
    if let Some(treatment) = treatments
        .iter()
        .find(|t| t.profile_id == profile_id && t.name.eq_ignore_ascii_case(name))
    {
        return Ok(treatment.id);
    }
    let treatment = Treatment {
        id: Uuid::new_v4(),
        profile_id,
        name: name.to_string(),
    };
    let id = treatment.id;
    treatments.push(treatment);
    store.save_treatments(&treatments)?;
    Ok(id)
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Other(format!("Invalid time '{}': {}", s, e)))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| Error::Other(format!("Invalid date '{}': {}", s, e)))
}
