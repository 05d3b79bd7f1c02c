//! Persistence boundary for record collections.
//!
//! Profiles, treatments and medications are stored as whole-collection JSON
//! files under the data directory; reads return an empty collection when
//! nothing has been stored yet, and writes are durable (fsync + atomic
//! rename) before success is reported. The core never holds its own mutable
//! cache of these records.

use crate::ledger::DoseLedger;
use crate::types::{DoseLogEntry, Medication, Profile, Schedule, Treatment};
use crate::{Error, Result};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

const PROFILES_FILE: &str = "profiles.json";
const TREATMENTS_FILE: &str = "treatments.json";
const MEDICATIONS_FILE: &str = "medications.json";
const LEDGER_FILE: &str = "dose_log.jsonl";

/// File-backed record store rooted at a data directory
pub struct DataStore {
    dir: PathBuf,
}

impl DataStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Handle to the dose ledger owned by this store
    pub fn ledger(&self) -> DoseLedger {
        DoseLedger::new(self.dir.join(LEDGER_FILE))
    }

    // ------------------------------------------------------------------
    // Collections
    // ------------------------------------------------------------------

    pub fn load_profiles(&self) -> Result<Vec<Profile>> {
        load_collection(&self.dir.join(PROFILES_FILE))
    }

    pub fn save_profiles(&self, profiles: &[Profile]) -> Result<()> {
        save_collection(&self.dir.join(PROFILES_FILE), profiles)
    }

    pub fn load_treatments(&self) -> Result<Vec<Treatment>> {
        load_collection(&self.dir.join(TREATMENTS_FILE))
    }

    pub fn save_treatments(&self, treatments: &[Treatment]) -> Result<()> {
        save_collection(&self.dir.join(TREATMENTS_FILE), treatments)
    }

    pub fn load_medications(&self) -> Result<Vec<Medication>> {
        load_collection(&self.dir.join(MEDICATIONS_FILE))
    }

    pub fn save_medications(&self, medications: &[Medication]) -> Result<()> {
        save_collection(&self.dir.join(MEDICATIONS_FILE), medications)
    }

    // ------------------------------------------------------------------
    // Medication operations
    // ------------------------------------------------------------------

    /// Fetch a single medication by id
    pub fn medication(&self, id: Uuid) -> Result<Medication> {
        self.load_medications()?
            .into_iter()
            .find(|m| m.id == id)
            .ok_or_else(|| Error::NotFound(format!("medication {}", id)))
    }

    /// Insert or replace a medication record
    pub fn upsert_medication(&self, medication: &Medication) -> Result<()> {
        let mut medications = self.load_medications()?;
        match medications.iter_mut().find(|m| m.id == medication.id) {
            Some(existing) => *existing = medication.clone(),
            None => medications.push(medication.clone()),
        }
        self.save_medications(&medications)
    }

    /// Delete a medication and cascade into its ledger entries.
    ///
    /// Returns the removed record so the caller can cancel its reminder
    /// triggers.
    pub fn delete_medication(&self, id: Uuid) -> Result<Medication> {
        let mut medications = self.load_medications()?;
        let idx = medications
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| Error::NotFound(format!("medication {}", id)))?;
        let removed = medications.remove(idx);
        self.save_medications(&medications)?;
        self.ledger().remove_for_medication(id)?;
        tracing::info!("Deleted medication {} ({})", removed.name, id);
        Ok(removed)
    }

    /// Record a dose and re-anchor the medication's schedule as one
    /// all-or-nothing operation.
    ///
    /// The re-anchored schedule is persisted first; if the ledger write then
    /// fails, the schedule is rolled back to its previous version and the
    /// whole operation reports failure. A successful dose log therefore
    /// always implies the re-anchor is durable.
    pub fn record_dose_with_reanchor(
        &self,
        entry: &DoseLogEntry,
        new_schedule: Schedule,
    ) -> Result<DoseLogEntry> {
        let mut medications = self.load_medications()?;
        let idx = medications
            .iter()
            .position(|m| m.id == entry.medication_id)
            .ok_or_else(|| Error::NotFound(format!("medication {}", entry.medication_id)))?;

        let previous = medications[idx].schedule.clone();
        medications[idx].schedule = new_schedule;
        self.save_medications(&medications)?;

        match self.ledger().record_dose(entry) {
            Ok(recorded) => Ok(recorded),
            Err(e) => {
                medications[idx].schedule = previous;
                if let Err(rollback) = self.save_medications(&medications) {
                    tracing::error!(
                        "Failed to roll back re-anchor for medication {}: {}",
                        entry.medication_id,
                        rollback
                    );
                }
                Err(e)
            }
        }
    }
}

/// Load a whole collection from a JSON file with shared locking.
///
/// A missing file is an empty collection, not an error.
fn load_collection<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let mut contents = String::new();
    let mut reader = std::io::BufReader::new(&file);
    let read_result = reader.read_to_string(&mut contents);
    file.unlock()?;
    read_result?;

    serde_json::from_str(&contents).map_err(|e| {
        Error::Storage(format!("corrupt collection file {:?}: {}", path, e))
    })
}

/// Durably write a whole collection:
/// 1. Write to a temp file in the same directory
/// 2. Sync to disk
/// 3. Rename over the original
fn save_collection<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let temp = NamedTempFile::new_in(path.parent().ok_or_else(|| {
        Error::Storage("collection path missing parent directory".into())
    })?)?;

    temp.as_file().lock_exclusive()?;

    {
        let mut writer = std::io::BufWriter::new(temp.as_file());
        let contents = serde_json::to_string(records)?;
        writer.write_all(contents.as_bytes())?;
        writer.flush()?;
    }

    temp.as_file().sync_all()?;
    temp.as_file().unlock()?;

    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    tracing::debug!("Saved {} records to {:?}", records.len(), path);
    Ok(())
}
