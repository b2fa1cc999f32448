//! Durable store of migration records.
//!
//! The store is a JSON document holding one block per configured repository,
//! written in configuration order. Every save rewrites the whole file through
//! a temp file and a rename. Records whose repository is no longer configured
//! are dropped on load.
//!
//! Writes are debounced: the first mutation after a save marks the store dirty
//! and sets a deadline one debounce window away. Later mutations leave that
//! deadline alone, so a steady stream of updates still reaches disk at least
//! once per window. The owner calls
//! [`MigrationRecordStore::save_if_due`] at convenient points and
//! [`MigrationRecordStore::flush`] on exit or interruption.

use super::{MigrationRecord, StepName, StepUpdate};
use crate::entity::Entity;
use crate::errors::StoreError;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const STATE_FILE_VERSION: u32 = 1;

#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Window in which mutations collapse into one write.
    pub debounce: Duration,
    /// Number of backups kept; zero disables backups.
    pub backup_retention: usize,
    /// Defaults to a `backups` directory beside the state file.
    pub backup_dir: Option<PathBuf>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(2),
            backup_retention: 5,
            backup_dir: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    records: Vec<MigrationRecord>,
}

pub struct MigrationRecordStore {
    path: PathBuf,
    options: StoreOptions,
    /// Configured entity names, in configuration order.
    order: Vec<String>,
    records: HashMap<String, MigrationRecord>,
    dirty: bool,
    save_due: Option<Instant>,
    pruned: Vec<String>,
}

impl MigrationRecordStore {
    /// Create an empty store for the configured entities.
    pub fn new(path: impl Into<PathBuf>, configured: &[Entity], options: StoreOptions) -> Self {
        Self {
            path: path.into(),
            options,
            order: configured.iter().map(|e| e.name.clone()).collect(),
            records: HashMap::new(),
            dirty: false,
            save_due: None,
            pruned: Vec::new(),
        }
    }

    /// Load persisted records, keeping only those of configured entities.
    ///
    /// A missing file yields an empty store. Pruned orphans schedule a save so
    /// they disappear from disk too.
    pub fn load(
        path: impl Into<PathBuf>,
        configured: &[Entity],
        options: StoreOptions,
    ) -> Result<Self, StoreError> {
        let mut store = Self::new(path, configured, options);
        if !store.path.exists() {
            return Ok(store);
        }

        let content = fs::read_to_string(&store.path).map_err(|source| StoreError::ReadFailed {
            path: store.path.clone(),
            source,
        })?;
        let file: StateFile =
            serde_json::from_str(&content).map_err(|source| StoreError::ParseFailed {
                path: store.path.clone(),
                source,
            })?;

        for record in file.records {
            if !store.order.contains(&record.name) {
                store.pruned.push(record.name);
                continue;
            }
            store.records.entry(record.name.clone()).or_insert(record);
        }

        if !store.pruned.is_empty() {
            tracing::info!(
                pruned = ?store.pruned,
                "Dropped records for repositories no longer in the configuration"
            );
            store.schedule_save();
        }

        tracing::debug!(
            path = %store.path.display(),
            records = store.records.len(),
            "Loaded migration records"
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of orphaned records dropped during load.
    pub fn pruned(&self) -> &[String] {
        &self.pruned
    }

    pub fn configured_names(&self) -> &[String] {
        &self.order
    }

    pub fn get(&self, name: &str) -> Option<&MigrationRecord> {
        self.records.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in configuration order.
    pub fn records(&self) -> impl Iterator<Item = &MigrationRecord> {
        self.order.iter().filter_map(|name| self.records.get(name))
    }

    /// Fetch the record for `entity`, creating it on first encounter.
    ///
    /// An existing record picks up the entity's current description and
    /// source address, so configuration edits reach the persisted copy.
    pub fn get_or_create(
        &mut self,
        entity: &Entity,
        destination_group: &str,
    ) -> Result<&MigrationRecord, StoreError> {
        if !self.order.contains(&entity.name) {
            return Err(StoreError::UnknownEntity(entity.name.clone()));
        }
        match self.records.get_mut(&entity.name) {
            Some(record) => {
                if record.description != entity.description
                    || record.source_address != entity.source_address
                {
                    record.description = entity.description.clone();
                    record.source_address = entity.source_address.clone();
                    record.touch();
                    self.schedule_save();
                }
            }
            None => {
                self.records.insert(
                    entity.name.clone(),
                    MigrationRecord::new(entity, destination_group),
                );
                self.schedule_save();
            }
        }
        self.records
            .get(&entity.name)
            .ok_or_else(|| StoreError::UnknownEntity(entity.name.clone()))
    }

    /// Mutate a record and schedule a save.
    pub fn update<T>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut MigrationRecord) -> T,
    ) -> Result<T, StoreError> {
        let record = self
            .records
            .get_mut(name)
            .ok_or_else(|| StoreError::UnknownEntity(name.to_string()))?;
        let out = f(record);
        record.touch();
        self.schedule_save();
        Ok(out)
    }

    /// Record a step transition on an entity's ledger.
    pub fn record_step(
        &mut self,
        name: &str,
        step: StepName,
        update: StepUpdate,
    ) -> Result<(), StoreError> {
        self.update(name, |record| {
            record.steps.record(step, update);
        })
    }

    /// Mark dirty and start the debounce window if none is running.
    pub fn schedule_save(&mut self) {
        self.dirty = true;
        if self.save_due.is_none() {
            self.save_due = Some(Instant::now() + self.options.debounce);
        }
    }

    /// Drop the pending deadline; the store stays dirty until flushed.
    pub fn cancel_scheduled_save(&mut self) {
        self.save_due = None;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn save_pending(&self) -> bool {
        self.save_due.is_some()
    }

    /// Save if the debounce deadline has passed. Returns whether a write happened.
    pub fn save_if_due(&mut self) -> Result<bool, StoreError> {
        match self.save_due {
            Some(due) if self.dirty && Instant::now() >= due => {
                self.save()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Write immediately if anything changed since the last save.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if self.dirty {
            self.save()?;
        }
        Ok(())
    }

    /// Unconditionally rewrite the state file.
    pub fn save(&mut self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| StoreError::WriteFailed {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        self.backup_previous()?;

        let file = StateFile {
            version: STATE_FILE_VERSION,
            updated_at: Utc::now(),
            records: self.records().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&file).map_err(StoreError::SerializeFailed)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| StoreError::WriteFailed {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| StoreError::WriteFailed {
            path: self.path.clone(),
            source,
        })?;

        self.dirty = false;
        self.save_due = None;
        tracing::debug!(path = %self.path.display(), "Saved migration records");
        Ok(())
    }

    fn backup_dir(&self) -> PathBuf {
        self.options.backup_dir.clone().unwrap_or_else(|| {
            self.path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("backups")
        })
    }

    fn backup_prefix(&self) -> String {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "state".to_string());
        format!("{}-", stem)
    }

    /// Copy the current file aside when a terminal outcome is about to be written.
    fn backup_previous(&self) -> Result<Option<PathBuf>, StoreError> {
        if self.options.backup_retention == 0 || !self.path.exists() {
            return Ok(None);
        }
        if !self.records.values().any(|r| r.is_terminal()) {
            return Ok(None);
        }

        let dir = self.backup_dir();
        fs::create_dir_all(&dir).map_err(|source| StoreError::BackupFailed {
            path: dir.clone(),
            source,
        })?;
        let backup = dir.join(format!(
            "{}{}.json",
            self.backup_prefix(),
            Utc::now().format("%Y%m%dT%H%M%S%.3fZ")
        ));
        fs::copy(&self.path, &backup).map_err(|source| StoreError::BackupFailed {
            path: backup.clone(),
            source,
        })?;

        self.prune_backups(&dir)?;
        Ok(Some(backup))
    }

    fn prune_backups(&self, dir: &Path) -> Result<(), StoreError> {
        let prefix = self.backup_prefix();
        let mut backups = self.list_backups_in(dir, &prefix)?;
        backups.sort();
        while backups.len() > self.options.backup_retention {
            let oldest = backups.remove(0);
            fs::remove_file(&oldest).map_err(|source| StoreError::BackupFailed {
                path: oldest.clone(),
                source,
            })?;
        }
        Ok(())
    }

    fn list_backups_in(&self, dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, StoreError> {
        let entries = fs::read_dir(dir).map_err(|source| StoreError::BackupFailed {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension().map(|e| e == "json").unwrap_or(false)
                    && p.file_name()
                        .map(|n| n.to_string_lossy().starts_with(prefix))
                        .unwrap_or(false)
            })
            .collect())
    }

    /// Existing backups, oldest first.
    pub fn backups(&self) -> Result<Vec<PathBuf>, StoreError> {
        let dir = self.backup_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut backups = self.list_backups_in(&dir, &self.backup_prefix())?;
        backups.sort();
        Ok(backups)
    }
}

/// Exclusive advisory lock held for the duration of a run.
#[derive(Debug)]
pub struct StoreLock {
    file: fs::File,
    path: PathBuf,
}

impl StoreLock {
    /// Take the lock beside `state_file`, failing fast if another run holds it.
    pub fn acquire(state_file: &Path) -> Result<Self, StoreError> {
        let path = state_file.with_extension("lock");
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| StoreError::WriteFailed {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| StoreError::WriteFailed {
                path: path.clone(),
                source,
            })?;
        file.try_lock_exclusive()
            .map_err(|_| StoreError::Locked { path: path.clone() })?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
