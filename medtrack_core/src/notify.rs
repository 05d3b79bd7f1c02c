//! Notification boundary.
//!
//! The engine talks to the platform notification store through the
//! `NotificationGateway` trait and never assumes delivery succeeded. The
//! gateway is an injected collaborator: there is no ambient notification
//! singleton anywhere in the core.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// A request to create one notification trigger
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TriggerRequest {
    /// Identity derived from (medication, slot); reconstructible for
    /// targeted cancellation without a lookup table
    pub id: String,
    /// Absolute fire time, for normal lead-time triggers
    pub fire_at: Option<DateTime<Utc>>,
    /// Relative delay in seconds, for immediate catch-up triggers
    pub fire_after_seconds: Option<u32>,
    pub title: String,
    pub body: String,
}

/// Platform notification store interface
pub trait NotificationGateway {
    fn create_trigger(&mut self, request: &TriggerRequest) -> Result<()>;
    fn cancel_triggers(&mut self, ids: &[String]) -> Result<()>;
    fn pending_trigger_ids(&self) -> Result<Vec<String>>;
}

/// File-backed trigger store: the local stand-in for the OS notification
/// store, persisting the pending set as an atomic JSON file.
pub struct FileTriggerStore {
    path: PathBuf,
}

impl FileTriggerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All pending triggers, for inspection and display
    pub fn pending(&self) -> Result<Vec<TriggerRequest>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        file.lock_shared()?;

        let mut contents = String::new();
        let mut reader = std::io::BufReader::new(&file);
        let read_result = reader.read_to_string(&mut contents);
        file.unlock()?;
        read_result?;

        match serde_json::from_str(&contents) {
            Ok(triggers) => Ok(triggers),
            Err(e) => {
                tracing::warn!("Corrupt trigger store {:?}: {}. Treating as empty.", self.path, e);
                Ok(Vec::new())
            }
        }
    }

    fn write(&self, triggers: &[TriggerRequest]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let temp = NamedTempFile::new_in(self.path.parent().ok_or_else(|| {
            Error::Storage("trigger store path missing parent directory".into())
        })?)?;

        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string(triggers)?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

impl NotificationGateway for FileTriggerStore {
    fn create_trigger(&mut self, request: &TriggerRequest) -> Result<()> {
        let mut triggers = self.pending()?;
        // Triggers are never mutated: an existing id is replaced wholesale
        triggers.retain(|t| t.id != request.id);
        triggers.push(request.clone());
        self.write(&triggers)?;
        tracing::debug!("Created trigger {}", request.id);
        Ok(())
    }

    fn cancel_triggers(&mut self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut triggers = self.pending()?;
        let before = triggers.len();
        triggers.retain(|t| !ids.contains(&t.id));
        if triggers.len() != before {
            self.write(&triggers)?;
        }
        tracing::debug!("Cancelled {} triggers", before - triggers.len());
        Ok(())
    }

    fn pending_trigger_ids(&self) -> Result<Vec<String>> {
        Ok(self.pending()?.into_iter().map(|t| t.id).collect())
    }
}
