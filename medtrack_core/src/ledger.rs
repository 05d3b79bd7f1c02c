//! The dose ledger: persisted record of user actions per dose slot.
//!
//! Entries are stored as JSONL (one JSON object per line) with file locking
//! for safe concurrent access. The ledger enforces at most one authoritative
//! entry per (medication_id, minute-truncated scheduled_time) slot on every
//! write: re-logging a slot updates the existing entry in place.

use crate::types::{DoseLogEntry, DoseStatus};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

/// JSONL-backed dose ledger
pub struct DoseLedger {
    path: PathBuf,
}

impl DoseLedger {
    /// Create a ledger handle for the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a dose action: update-if-exists, else append, keyed by
    /// (medication_id, minute slot).
    ///
    /// A failed write surfaces as an error and the ledger is unchanged; the
    /// operation must never be reported as applied when it was not.
    pub fn record_dose(&self, entry: &DoseLogEntry) -> Result<DoseLogEntry> {
        let mut entries = self.read_all()?;

        let recorded = match entries
            .iter_mut()
            .find(|e| e.medication_id == entry.medication_id && e.slot() == entry.slot())
        {
            Some(existing) => {
                existing.status = entry.status;
                existing.taken_time = entry.taken_time;
                tracing::debug!(
                    "Updated dose entry {} for slot {}",
                    existing.id,
                    existing.scheduled_time
                );
                existing.clone()
            }
            None => {
                entries.push(entry.clone());
                tracing::debug!(
                    "Appended dose entry {} for slot {}",
                    entry.id,
                    entry.scheduled_time
                );
                entry.clone()
            }
        };

        self.write_all(&entries)?;
        Ok(recorded)
    }

    /// All entries for one medication, sorted by scheduled time
    pub fn query_by(&self, medication_id: Uuid) -> Result<Vec<DoseLogEntry>> {
        let mut entries: Vec<_> = self
            .read_all()?
            .into_iter()
            .filter(|e| e.medication_id == medication_id)
            .collect();
        entries.sort_by_key(|e| e.scheduled_time);
        Ok(entries)
    }

    /// Remove all entries for a medication (cascade on medication deletion).
    /// Returns the number of entries removed.
    pub fn remove_for_medication(&self, medication_id: Uuid) -> Result<usize> {
        let entries = self.read_all()?;
        let before = entries.len();
        let kept: Vec<_> = entries
            .into_iter()
            .filter(|e| e.medication_id != medication_id)
            .collect();
        let removed = before - kept.len();
        if removed > 0 {
            self.write_all(&kept)?;
            tracing::info!(
                "Removed {} ledger entries for medication {}",
                removed,
                medication_id
            );
        }
        Ok(removed)
    }

    /// Read the whole ledger as a consistent snapshot.
    ///
    /// Malformed lines are logged and skipped rather than failing the read.
    /// Should the file ever contain duplicate slots, the later line wins, so
    /// callers never observe two entries with the same identity.
    pub fn read_all(&self) -> Result<Vec<DoseLogEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        // Shared lock so readers see a consistent snapshot
        file.lock_shared()?;

        let reader = BufReader::new(&file);
        let mut by_slot: HashMap<(Uuid, i64), DoseLogEntry> = HashMap::new();
        let mut order: Vec<(Uuid, i64)> = Vec::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<DoseLogEntry>(&line) {
                Ok(entry) => {
                    let key = (entry.medication_id, entry.slot());
                    if by_slot.insert(key, entry).is_none() {
                        order.push(key);
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to parse ledger line {}: {}", line_num + 1, e);
                }
            }
        }

        file.unlock()?;

        let entries: Vec<_> = order
            .into_iter()
            .filter_map(|key| by_slot.remove(&key))
            .collect();
        tracing::debug!("Read {} entries from ledger", entries.len());
        Ok(entries)
    }

    /// Count of entries with an authoritative (taken/skipped) status
    pub fn logged_count(&self, medication_id: Uuid) -> Result<usize> {
        Ok(self
            .query_by(medication_id)?
            .iter()
            .filter(|e| matches!(e.status, DoseStatus::Taken | DoseStatus::Skipped))
            .count())
    }

    /// Look up the entry for a specific slot, if any
    pub fn entry_for_slot(
        &self,
        medication_id: Uuid,
        scheduled_time: DateTime<Utc>,
    ) -> Result<Option<DoseLogEntry>> {
        let slot = crate::types::minute_slot(crate::types::truncate_to_minute(scheduled_time));
        Ok(self
            .query_by(medication_id)?
            .into_iter()
            .find(|e| e.slot() == slot))
    }

    /// Atomically rewrite the ledger file:
    /// 1. Write all entries to a temp file in the same directory
    /// 2. Sync to disk
    /// 3. Rename over the original
    fn write_all(&self, entries: &[DoseLogEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let temp = NamedTempFile::new_in(self.path.parent().ok_or_else(|| {
            Error::Storage("ledger path missing parent directory".into())
        })?)?;

        // Exclusive lock on the temp file to serialize concurrent writers
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            for entry in entries {
                let line = serde_json::to_string(entry)?;
                writer.write_all(line.as_bytes())?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}
