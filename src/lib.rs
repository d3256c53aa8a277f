//! BloxPieceHub Library
//!
//! Key banks, service status and self-update for the hub.

pub mod bank;
pub mod commands;
pub mod config;
pub mod logging;
pub mod status;
pub mod storage;
pub mod sync;
pub mod updater;
pub mod version;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use tokio::sync::watch;

use bank::BankStore;
use config::Settings;
use status::StatusSnapshot;
use version::{UpdatePhase, VersionInfo};

/// Application state shared across commands
pub struct AppState {
    pub settings: Settings,
    pub store: Arc<BankStore>,
    pub status: watch::Receiver<StatusSnapshot>,
    pub version: watch::Receiver<VersionInfo>,
    pub phase: watch::Receiver<UpdatePhase>,
}
