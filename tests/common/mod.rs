//! Shared fakes for the end-to-end tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use bloxpiece_hub_lib::sync::{NetworkError, RemoteSource};
use bloxpiece_hub_lib::updater::Relauncher;

/// Remote serving fixed documents
pub struct StaticRemote {
    pub status: Result<String, u16>,
    pub version: Result<String, u16>,
    pub artifact: Result<Vec<u8>, u16>,
}

impl StaticRemote {
    pub fn new() -> Self {
        Self {
            status: Err(404),
            version: Err(404),
            artifact: Err(404),
        }
    }
}

fn answer<T: Clone>(value: &Result<T, u16>) -> Result<T, NetworkError> {
    value.clone().map_err(NetworkError::Status)
}

#[async_trait]
impl RemoteSource for StaticRemote {
    async fn fetch_status(&self) -> Result<String, NetworkError> {
        answer(&self.status)
    }

    async fn fetch_version(&self) -> Result<String, NetworkError> {
        answer(&self.version)
    }

    async fn fetch_artifact(&self) -> Result<Vec<u8>, NetworkError> {
        answer(&self.artifact)
    }
}

/// Records which executables would have been started
#[derive(Default)]
pub struct RecordingRelauncher {
    pub spawned: Mutex<Vec<PathBuf>>,
}

impl Relauncher for RecordingRelauncher {
    fn spawn(&self, executable: &Path) -> std::io::Result<()> {
        self.spawned.lock().unwrap().push(executable.to_path_buf());
        Ok(())
    }
}
