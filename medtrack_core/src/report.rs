//! CSV adherence report export.
//!
//! Appends classified dose instances to a CSV file for external analysis.
//! Headers are written only when the file is empty, and the file is synced
//! before success is reported.

use crate::reconcile::ClassifiedDose;
use crate::types::{DoseView, Medication};
use crate::Result;
use std::fs::OpenOptions;
use std::path::Path;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow {
    medication_id: String,
    medication: String,
    dosage: String,
    scheduled_time: String,
    status: String,
    taken_time: Option<String>,
}

impl CsvRow {
    fn new(medication: &Medication, dose: &ClassifiedDose) -> Self {
        CsvRow {
            medication_id: medication.id.to_string(),
            medication: medication.name.clone(),
            dosage: medication.dosage.clone(),
            scheduled_time: dose.instance.scheduled_time.to_rfc3339(),
            status: view_label(dose.view).to_string(),
            taken_time: dose.instance.taken_time.map(|t| t.to_rfc3339()),
        }
    }
}

fn view_label(view: DoseView) -> &'static str {
    match view {
        DoseView::Upcoming => "upcoming",
        DoseView::DueNow => "due_now",
        DoseView::Missed => "missed",
        DoseView::Taken => "taken",
        DoseView::Skipped => "skipped",
    }
}

/// Append a medication's classified doses to a CSV report.
/// Returns the number of rows written.
pub fn append_report(
    csv_path: &Path,
    medication: &Medication,
    doses: &[ClassifiedDose],
) -> Result<usize> {
    if doses.is_empty() {
        return Ok(0);
    }

    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(csv_path)?;

    // Headers only when the file has no content yet
    let needs_headers = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_headers)
        .from_writer(file);

    for dose in doses {
        writer.serialize(CsvRow::new(medication, dose))?;
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    file.sync_all()?;

    tracing::info!("Wrote {} report rows to {:?}", doses.len(), csv_path);
    Ok(doses.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::{classify, ClassifiedDose};
    use crate::types::{DoseLogEntry, Schedule};
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    fn test_medication() -> Medication {
        Medication {
            id: Uuid::new_v4(),
            treatment_id: Uuid::new_v4(),
            name: "Amoxicillin".into(),
            dosage: "500 mg".into(),
            schedule: Schedule::new(
                Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
                8,
                1,
            ),
        }
    }

    fn classified(med: &Medication, entries: &[DoseLogEntry]) -> Vec<ClassifiedDose> {
        let now = Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap();
        let anchor = med.schedule.anchor_time;
        classify(&med.schedule, med.id, entries, anchor, anchor + Duration::days(2))
            .into_iter()
            .map(|instance| ClassifiedDose {
                view: instance.view(now, 4.0),
                instance,
            })
            .collect()
    }

    #[test]
    fn test_report_creates_file_with_headers() {
        let temp_dir = tempfile::tempdir().unwrap();
        let csv_path = temp_dir.path().join("report.csv");
        let med = test_medication();

        let entries = vec![DoseLogEntry::taken(
            med.id,
            med.schedule.anchor_time,
            med.schedule.anchor_time,
        )];
        let doses = classified(&med, &entries);
        let count = append_report(&csv_path, &med, &doses).unwrap();
        assert_eq!(count, 3);

        let contents = std::fs::read_to_string(&csv_path).unwrap();
        assert!(contents.starts_with("medication_id,medication,dosage"));
        assert!(contents.contains("taken"));
        assert!(contents.contains("missed"));
    }

    #[test]
    fn test_report_appends_without_duplicate_headers() {
        let temp_dir = tempfile::tempdir().unwrap();
        let csv_path = temp_dir.path().join("report.csv");
        let med = test_medication();

        let doses = classified(&med, &[]);
        append_report(&csv_path, &med, &doses).unwrap();
        append_report(&csv_path, &med, &doses).unwrap();

        let contents = std::fs::read_to_string(&csv_path).unwrap();
        let header_count = contents
            .lines()
            .filter(|l| l.starts_with("medication_id"))
            .count();
        assert_eq!(header_count, 1);
        assert_eq!(contents.lines().count(), 1 + 6);
    }

    #[test]
    fn test_empty_report_writes_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let csv_path = temp_dir.path().join("report.csv");
        let med = test_medication();

        let count = append_report(&csv_path, &med, &[]).unwrap();
        assert_eq!(count, 0);
        assert!(!csv_path.exists());
    }
}
