//! Version Check Module
//!
//! Compares the remote release version with the one compiled into this
//! build and hands newer releases to the [`SelfUpdater`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use semver::Version;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bank::BankStore;
use crate::sync::{NetworkError, RemoteSource};
use crate::updater::{Relaunched, SelfUpdater, UpdateError};

/// Version of this build
pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Where the update sequence currently is
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "version", rename_all = "camelCase")]
pub enum UpdatePhase {
    Idle,
    CheckingVersion,
    UpToDate,
    UpdateAvailable(Version),
    Downloading,
    Replacing,
    Relaunching,
    Terminated,
}

/// Local and last fetched remote version
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub current: Version,
    pub latest: Option<Version>,
    pub checked_at: Option<DateTime<Utc>>,
}

impl VersionInfo {
    pub fn new(current: Version) -> Self {
        Self {
            current,
            latest: None,
            checked_at: None,
        }
    }

    /// Info for this build
    pub fn for_build() -> Self {
        // CARGO_PKG_VERSION is always valid semver
        Self::new(Version::parse(CURRENT_VERSION).unwrap_or_else(|_| Version::new(0, 0, 0)))
    }

    pub fn update_available(&self) -> bool {
        self.latest
            .as_ref()
            .map_or(false, |latest| *latest > self.current)
    }
}

/// Parse a version document.
///
/// Surrounding whitespace and a leading `v` are ignored, and a missing minor
/// or patch component counts as zero, so `"2.1"` reads as `2.1.0`.
pub fn parse_version(body: &str) -> Result<Version, NetworkError> {
    let text = body.trim();
    let text = text
        .strip_prefix('v')
        .or_else(|| text.strip_prefix('V'))
        .unwrap_or(text);

    let split = text.find(|c| c == '-' || c == '+').unwrap_or(text.len());
    let (core, suffix) = text.split_at(split);
    let padded = match core.split('.').count() {
        1 => format!("{}.0.0{}", core, suffix),
        2 => format!("{}.0{}", core, suffix),
        _ => text.to_string(),
    };

    Version::parse(&padded).map_err(|e| NetworkError::Parse(format!("{:?}: {}", body.trim(), e)))
}

/// Result of one version check that did not fail
#[derive(Debug)]
pub enum CheckOutcome<'a> {
    UpToDate,
    /// The newer release was installed by an earlier check but could not be started
    AlreadyInstalled(Version),
    Relaunched(Relaunched<'a>),
}

/// Background poller for the version document
pub struct VersionPoller {
    source: Arc<dyn RemoteSource>,
    store: Arc<BankStore>,
    updater: SelfUpdater,
    interval: Duration,
    info_tx: watch::Sender<VersionInfo>,
    phase_tx: watch::Sender<UpdatePhase>,
    installed: Mutex<Option<Version>>,
}

impl VersionPoller {
    pub fn new(
        source: Arc<dyn RemoteSource>,
        store: Arc<BankStore>,
        updater: SelfUpdater,
        interval: Duration,
    ) -> Self {
        Self::with_current(source, store, updater, interval, VersionInfo::for_build())
    }

    /// Poller that treats `info.current` as the running version
    pub fn with_current(
        source: Arc<dyn RemoteSource>,
        store: Arc<BankStore>,
        updater: SelfUpdater,
        interval: Duration,
        info: VersionInfo,
    ) -> Self {
        let (info_tx, _) = watch::channel(info);
        let (phase_tx, _) = watch::channel(UpdatePhase::Idle);
        Self {
            source,
            store,
            updater,
            interval,
            info_tx,
            phase_tx,
            installed: Mutex::new(None),
        }
    }

    pub fn subscribe_info(&self) -> watch::Receiver<VersionInfo> {
        self.info_tx.subscribe()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<UpdatePhase> {
        self.phase_tx.subscribe()
    }

    pub fn info(&self) -> VersionInfo {
        self.info_tx.borrow().clone()
    }

    pub fn phase(&self) -> UpdatePhase {
        self.phase_tx.borrow().clone()
    }

    fn set_phase(&self, phase: UpdatePhase) {
        debug!("Update phase: {:?}", phase);
        self.phase_tx.send_replace(phase);
    }

    /// Fetch and record the remote version. Returns it when newer than this build.
    pub async fn check_version(&self) -> Result<Option<Version>, NetworkError> {
        let body = self.source.fetch_version().await?;
        let latest = parse_version(&body)?;

        let mut newer = None;
        self.info_tx.send_modify(|info| {
            info.latest = Some(latest.clone());
            info.checked_at = Some(Utc::now());
            if info.update_available() {
                newer = Some(latest.clone());
            }
        });

        Ok(newer)
    }

    /// Run one check, installing and relaunching a newer release if there is one.
    ///
    /// Every failure leaves the phase at [`UpdatePhase::Idle`] and the running
    /// program untouched.
    pub async fn check_once(&self) -> Result<CheckOutcome<'_>, UpdateError> {
        self.set_phase(UpdatePhase::CheckingVersion);

        let latest = match self.check_version().await {
            Ok(Some(latest)) => latest,
            Ok(None) => {
                debug!("Running the latest version ({})", self.info().current);
                self.set_phase(UpdatePhase::UpToDate);
                self.set_phase(UpdatePhase::Idle);
                return Ok(CheckOutcome::UpToDate);
            }
            Err(e) => {
                self.set_phase(UpdatePhase::Idle);
                return Err(e.into());
            }
        };

        if self.installed_version().as_ref() == Some(&latest) {
            warn!("Version {} is already installed; restart to use it", latest);
            self.set_phase(UpdatePhase::Idle);
            return Ok(CheckOutcome::AlreadyInstalled(latest));
        }

        info!("Update available: {} -> {}", self.info().current, latest);
        self.set_phase(UpdatePhase::UpdateAvailable(latest.clone()));

        let result = self
            .updater
            .run(self.source.as_ref(), &self.store, |phase| self.set_phase(phase))
            .await;

        match result {
            Ok(relaunched) => Ok(CheckOutcome::Relaunched(relaunched)),
            Err(e) => {
                if matches!(e, UpdateError::Spawn(_)) {
                    *self.installed.lock().unwrap_or_else(PoisonError::into_inner) = Some(latest);
                }
                self.set_phase(UpdatePhase::Idle);
                Err(e)
            }
        }
    }

    fn installed_version(&self) -> Option<Version> {
        self.installed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Check now and then on every interval tick until an update takes over
    pub async fn run(self) {
        info!(
            "Version poller started (current {}, every {:?})",
            self.info().current,
            self.interval
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.check_once().await {
                Ok(CheckOutcome::Relaunched(relaunched)) => {
                    self.set_phase(UpdatePhase::Terminated);
                    relaunched.terminate();
                }
                Ok(_) => {}
                Err(e) => error!("Failed to check for updates: {}", e),
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
