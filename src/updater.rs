//! Self-Update Module
//!
//! Downloads a new release next to the running executable, swaps it into
//! place and starts it before this process exits.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::bank::{BankStore, FreezeGuard};
use crate::sync::{NetworkError, RemoteSource};
use crate::version::UpdatePhase;

/// Starts the replacement program
pub trait Relauncher: Send + Sync {
    fn spawn(&self, executable: &Path) -> std::io::Result<()>;
}

/// Relaunches with the arguments this process was started with
pub struct ProcessRelauncher {
    args: Vec<OsString>,
}

impl ProcessRelauncher {
    pub fn new(args: Vec<OsString>) -> Self {
        Self { args }
    }

    pub fn from_current_args() -> Self {
        Self::new(std::env::args_os().skip(1).collect())
    }
}

impl Relauncher for ProcessRelauncher {
    fn spawn(&self, executable: &Path) -> std::io::Result<()> {
        let child = Command::new(executable).args(&self.args).spawn()?;
        info!("Started {:?} as process {}", executable, child.id());
        Ok(())
    }
}

/// A fully downloaded release waiting to be moved into place.
///
/// The file is removed again if it is dropped without being installed.
#[derive(Debug)]
pub struct StagedArtifact {
    path: PathBuf,
    len: u64,
}

impl StagedArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size in bytes
    pub fn size(&self) -> u64 {
        self.len
    }
}

impl Drop for StagedArtifact {
    fn drop(&mut self) {
        if self.path.exists() {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Proof that the new release is installed and running.
///
/// Holds the bank store frozen so no save can start before the process exits.
#[derive(Debug)]
pub struct Relaunched<'a> {
    _freeze: FreezeGuard<'a>,
}

impl Relaunched<'_> {
    pub fn terminate(self) -> ! {
        info!("Update installed, exiting so the new version can take over");
        std::process::exit(0)
    }
}

/// Replaces the executable at `target` with a downloaded release
pub struct SelfUpdater {
    target: PathBuf,
    relauncher: Arc<dyn Relauncher>,
}

impl SelfUpdater {
    pub fn new(target: impl Into<PathBuf>, relauncher: Arc<dyn Relauncher>) -> Self {
        Self {
            target: target.into(),
            relauncher,
        }
    }

    /// Updater for the executable of the running process
    pub fn for_current_exe(relauncher: Arc<dyn Relauncher>) -> Result<Self, UpdateError> {
        let target = std::env::current_exe().map_err(|e| UpdateError::NoExecutable(e.to_string()))?;
        Ok(Self::new(target, relauncher))
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Fetch the release into a temporary file beside the target.
    ///
    /// The running executable is not touched here.
    pub async fn download(&self, source: &dyn RemoteSource) -> Result<StagedArtifact, UpdateError> {
        let bytes = source.fetch_artifact().await?;
        if bytes.is_empty() {
            return Err(UpdateError::Empty);
        }

        let staged = StagedArtifact {
            path: self.staging_path(),
            len: bytes.len() as u64,
        };

        let mut file = tokio::fs::File::create(&staged.path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        let written = tokio::fs::metadata(&staged.path).await?.len();
        if written != staged.len {
            return Err(UpdateError::Incomplete {
                expected: staged.len,
                written,
            });
        }

        match tokio::fs::metadata(&self.target).await {
            Ok(meta) => tokio::fs::set_permissions(&staged.path, meta.permissions()).await?,
            Err(e) => warn!("Cannot read permissions of {:?}: {}", self.target, e),
        }

        debug!("Staged {} bytes at {:?}", staged.len, staged.path);
        Ok(staged)
    }

    /// Move a staged release over the target path
    pub fn replace(&self, staged: StagedArtifact) -> Result<(), UpdateError> {
        swap_into_place(&staged.path, &self.target)
            .map_err(|e| UpdateError::Replace(e.to_string()))?;
        info!("Installed new release ({} bytes) at {:?}", staged.size(), self.target);
        Ok(())
    }

    /// Start the program now sitting at the target path
    pub fn relaunch(&self) -> Result<(), UpdateError> {
        self.relauncher
            .spawn(&self.target)
            .map_err(|e| UpdateError::Spawn(e.to_string()))
    }

    /// Download, replace and relaunch.
    ///
    /// The bank store is frozen before the replace, which waits for any save
    /// already in progress. On error the store is released again and this
    /// process keeps running.
    pub async fn run<'a>(
        &self,
        source: &dyn RemoteSource,
        store: &'a BankStore,
        report: impl Fn(UpdatePhase) + Send,
    ) -> Result<Relaunched<'a>, UpdateError> {
        report(UpdatePhase::Downloading);
        let staged = self.download(source).await?;

        report(UpdatePhase::Replacing);
        let freeze = store.freeze();
        self.replace(staged)?;

        report(UpdatePhase::Relaunching);
        if let Err(e) = self.relaunch() {
            error!(
                "New release is installed at {:?} but could not be started: {}",
                self.target, e
            );
            return Err(e);
        }

        Ok(Relaunched { _freeze: freeze })
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = OsString::from(".");
        name.push(
            self.target
                .file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new("bloxpiece-hub")),
        );
        name.push(".download");
        self.target.with_file_name(name)
    }
}

#[cfg(not(windows))]
fn swap_into_place(staged: &Path, target: &Path) -> std::io::Result<()> {
    std::fs::rename(staged, target)
}

// A running executable cannot be overwritten on Windows, but it can be moved aside.
#[cfg(windows)]
fn swap_into_place(staged: &Path, target: &Path) -> std::io::Result<()> {
    let old = target.with_extension("old");
    let _ = std::fs::remove_file(&old);

    let had_target = target.exists();
    if had_target {
        std::fs::rename(target, &old)?;
    }
    if let Err(e) = std::fs::rename(staged, target) {
        if had_target {
            let _ = std::fs::rename(&old, target);
        }
        return Err(e);
    }
    Ok(())
}

/// Update errors
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("Downloaded release is empty")]
    Empty,

    #[error("Staged release is incomplete: expected {expected} bytes, wrote {written}")]
    Incomplete { expected: u64, written: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to replace executable: {0}")]
    Replace(String),

    #[error("Failed to start new release: {0}")]
    Spawn(String),

    #[error("Cannot locate running executable: {0}")]
    NoExecutable(String),
}
