//! Service Status Module
//!
//! Periodically fetches the remote liveness document and publishes the
//! latest snapshot to whoever is rendering it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::sync::{NetworkError, RemoteSource};

/// Liveness of a single service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Online,
    Offline,
    #[default]
    Unknown,
}

impl ServiceState {
    fn from_remote(value: &str) -> Self {
        let value = value.trim();
        if value.eq_ignore_ascii_case("online") {
            ServiceState::Online
        } else if value.eq_ignore_ascii_case("offline") {
            ServiceState::Offline
        } else {
            ServiceState::Unknown
        }
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            ServiceState::Online => "online",
            ServiceState::Offline => "offline",
            ServiceState::Unknown => "unknown",
        })
    }
}

/// Service states from one successful poll
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    services: BTreeMap<String, ServiceState>,
    fetched_at: Option<DateTime<Utc>>,
}

impl StatusSnapshot {
    /// Parse a status document: a JSON object of service name -> state string
    pub fn parse(body: &str) -> Result<Self, NetworkError> {
        let raw: BTreeMap<String, String> =
            serde_json::from_str(body).map_err(|e| NetworkError::Parse(e.to_string()))?;

        let services = raw
            .into_iter()
            .map(|(name, state)| (name, ServiceState::from_remote(&state)))
            .collect();

        Ok(Self {
            services,
            fetched_at: Some(Utc::now()),
        })
    }

    /// State of `name`; services missing from the document are unknown
    pub fn state(&self, name: &str) -> ServiceState {
        self.services.get(name).copied().unwrap_or_default()
    }

    /// When this snapshot was fetched, `None` before the first successful poll
    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ServiceState)> {
        self.services.iter().map(|(name, state)| (name.as_str(), *state))
    }
}

/// Background poller for the status document
pub struct StatusPoller {
    source: Arc<dyn RemoteSource>,
    interval: Duration,
    tx: watch::Sender<StatusSnapshot>,
}

impl StatusPoller {
    pub fn new(source: Arc<dyn RemoteSource>, interval: Duration) -> Self {
        let (tx, _rx) = watch::channel(StatusSnapshot::default());
        Self {
            source,
            interval,
            tx,
        }
    }

    /// Receiver that observes every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.tx.subscribe()
    }

    /// The last published snapshot
    pub fn snapshot(&self) -> StatusSnapshot {
        self.tx.borrow().clone()
    }

    /// Run one poll cycle.
    ///
    /// On success the published snapshot is replaced wholesale; on failure it
    /// is left exactly as it was.
    pub async fn poll(&self) -> Result<(), NetworkError> {
        let body = self.source.fetch_status().await?;
        let snapshot = StatusSnapshot::parse(&body)?;

        debug!("Status snapshot: {} service(s)", snapshot.services.len());
        self.tx.send_replace(snapshot);
        Ok(())
    }

    /// Poll now and then on every interval tick, forever.
    ///
    /// A failed cycle is logged and the next tick still fires.
    pub async fn run(self) {
        info!("Status poller started (every {:?})", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.poll().await {
                warn!("Failed to update status: {}", e);
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
