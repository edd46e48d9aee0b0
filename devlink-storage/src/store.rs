//! Module record persistence.

use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// The persisted module record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigRecord {
    /// Human-readable module name used to group its devices.
    pub module_name: String,
    /// Device ids in registry slot order.
    pub device_ids: Vec<u8>,
    /// Controller host for outbound connections (empty = listen only).
    pub server_host: String,
    /// Controller port.
    pub server_port: u16,
}

/// Default controller port, matching the protocol crate's listen port.
const DEFAULT_PORT: u16 = 8182;

impl Default for ConfigRecord {
    fn default() -> Self {
        Self {
            module_name: "devlink".to_string(),
            device_ids: Vec::new(),
            server_host: String::new(),
            server_port: DEFAULT_PORT,
        }
    }
}

/// Load/save contract for the module record.
pub trait ConfigStore {
    /// Loads the record; a store with nothing persisted yet returns the
    /// default record.
    fn load(&mut self) -> Result<ConfigRecord, StorageError>;

    /// Persists the record.
    fn save(&mut self, record: &ConfigRecord) -> Result<(), StorageError>;
}

/// JSON file store. Writes go through a temp file in the same directory
/// followed by a rename, so a crash mid-save never truncates the record.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileStore {
    fn load(&mut self) -> Result<ConfigRecord, StorageError> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "no record on disk, using defaults");
            return Ok(ConfigRecord::default());
        }
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let record = serde_json::from_reader(reader)?;
        Ok(record)
    }

    fn save(&mut self, record: &ConfigRecord) -> Result<(), StorageError> {
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, record)?;
            writer.flush()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        tracing::debug!(path = %self.path.display(), devices = record.device_ids.len(), "record saved");
        Ok(())
    }
}

/// In-memory store for tests and transient setups.
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: ConfigRecord,
    saves: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `save` has been called.
    pub fn save_count(&self) -> usize {
        self.saves
    }

    pub fn record(&self) -> &ConfigRecord {
        &self.record
    }
}

impl ConfigStore for MemoryStore {
    fn load(&mut self) -> Result<ConfigRecord, StorageError> {
        Ok(self.record.clone())
    }

    fn save(&mut self, record: &ConfigRecord) -> Result<(), StorageError> {
        self.record = record.clone();
        self.saves += 1;
        Ok(())
    }
}
