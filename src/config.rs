//! Configuration Module
//!
//! Remote endpoints, polling intervals, storage location and the catalog of
//! monitored services. Defaults can be overridden through `BPH_*` environment
//! variables.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

pub const DEFAULT_REMOTE_URL: &str =
    "https://raw.githubusercontent.com/Princess0285/BloxPieceHub-Cloud/main";
pub const DEFAULT_BANK: &str = "Main Bank";
pub const KEYS_FILE: &str = "key_banks.json";

const STATUS_INTERVAL: Duration = Duration::from_secs(120);
const VERSION_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// URLs of the three remote documents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub status_url: String,
    pub version_url: String,
    pub artifact_url: String,
}

impl Endpoints {
    /// Derive all endpoints from a base URL
    pub fn from_base(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            status_url: format!("{}/status.json", base),
            version_url: format!("{}/version.txt", base),
            artifact_url: format!("{}/releases/{}", base, artifact_name()),
        }
    }
}

/// Name of the release artifact for the platform this build targets
pub fn artifact_name() -> String {
    format!(
        "bloxpiece-hub-{}-{}{}",
        std::env::consts::OS,
        std::env::consts::ARCH,
        std::env::consts::EXE_SUFFIX
    )
}

/// A monitored service and where to find it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceEntry {
    pub category: String,
    pub name: String,
    pub discord: String,
    pub website: String,
}

impl ServiceEntry {
    fn new(category: &str, name: &str, discord: &str, website: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            discord: discord.to_string(),
            website: website.to_string(),
        }
    }
}

/// The built-in service catalog
pub fn default_services() -> Vec<ServiceEntry> {
    vec![
        ServiceEntry::new("Scripts", "AutoFarm", "https://discord.gg/script1", "https://script1.com"),
        ServiceEntry::new("Scripts", "Teleport", "https://discord.gg/script2", "https://script2.com"),
        ServiceEntry::new("Executors", "Arsenal", "https://discord.gg/exec1", "https://exec1.com"),
        ServiceEntry::new("Executors", "BloxFruits", "https://discord.gg/exec2", "https://exec2.com"),
    ]
}

/// Application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub endpoints: Endpoints,
    pub data_dir: PathBuf,
    pub default_bank: String,
    pub status_interval: Duration,
    pub version_interval: Duration,
    pub request_timeout: Duration,
    pub download_timeout: Duration,
    pub services: Vec<ServiceEntry>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::from_base(DEFAULT_REMOTE_URL),
            data_dir: default_data_dir(),
            default_bank: DEFAULT_BANK.to_string(),
            status_interval: STATUS_INTERVAL,
            version_interval: VERSION_INTERVAL,
            request_timeout: REQUEST_TIMEOUT,
            download_timeout: DOWNLOAD_TIMEOUT,
            services: default_services(),
        }
    }
}

impl Settings {
    /// Defaults overridden by the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `BPH_*` name
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();

        if let Some(base) = lookup("BPH_REMOTE_URL") {
            settings.endpoints = Endpoints::from_base(&base);
        }
        if let Some(url) = lookup("BPH_STATUS_URL") {
            settings.endpoints.status_url = url;
        }
        if let Some(url) = lookup("BPH_VERSION_URL") {
            settings.endpoints.version_url = url;
        }
        if let Some(url) = lookup("BPH_ARTIFACT_URL") {
            settings.endpoints.artifact_url = url;
        }
        if let Some(dir) = lookup("BPH_DATA_DIR") {
            settings.data_dir = PathBuf::from(dir);
        }

        override_secs(&lookup, "BPH_STATUS_INTERVAL_SECS", &mut settings.status_interval);
        override_secs(&lookup, "BPH_VERSION_INTERVAL_SECS", &mut settings.version_interval);
        override_secs(&lookup, "BPH_TIMEOUT_SECS", &mut settings.request_timeout);

        settings
    }

    /// Path of the key bank file
    pub fn keys_file(&self) -> PathBuf {
        self.data_dir.join(KEYS_FILE)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// Names of every monitored service
    pub fn service_names(&self) -> Vec<String> {
        self.services.iter().map(|s| s.name.clone()).collect()
    }
}

fn override_secs(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut Duration) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => *target = Duration::from_secs(secs),
        _ => warn!("Ignoring invalid {}: {:?}", key, raw),
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("BloxPieceHub")
}
