//! Bank File Storage Module
//!
//! Persists the bank mapping as a single JSON object on disk.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Bank name -> ordered key list, exactly as stored on disk
pub type BankMap = BTreeMap<String, Vec<String>>;

/// JSON file holding every key bank
#[derive(Debug)]
pub struct BankFile {
    path: PathBuf,
}

impl BankFile {
    /// Create a bank file handle at the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                error!("Failed to create storage directory: {}", e);
            }
        }

        debug!("Bank storage initialized at: {:?}", path);

        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted mapping.
    ///
    /// Returns `Ok(None)` when no file exists yet.
    pub fn load(&self) -> Result<Option<BankMap>, StorageError> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Io(e.to_string())),
        };

        let banks: BankMap = serde_json::from_slice(&raw)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        if banks.is_empty() {
            return Err(StorageError::Corrupt("file contains no banks".into()));
        }

        Ok(Some(banks))
    }

    /// Write the full mapping.
    ///
    /// The data goes to a sibling temporary file which is synced and then
    /// renamed over the previous file, so readers see either the old or the
    /// new contents.
    pub fn save(&self, banks: &BankMap) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(banks)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let tmp_path = self.temp_path();
        let result = write_synced(&tmp_path, &json)
            .and_then(|()| std::fs::rename(&tmp_path, &self.path));

        if let Err(e) = result {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(StorageError::Io(e.to_string()));
        }

        info!("Saved {} key bank(s) to {:?}", banks.len(), self.path);
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "key_banks.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt bank file: {0}")]
    Corrupt(String),
}
