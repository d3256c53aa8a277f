//! Commands Module
//!
//! Operations exposed to the front end. Failures come back as display
//! strings ready to be shown to the user.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::bank::BankSummary;
use crate::status::ServiceState;
use crate::version::UpdatePhase;
use crate::AppState;

// Response types for the front end

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyResponse {
    pub bank: String,
    pub key: String,
    pub remaining: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddKeysResult {
    pub bank: String,
    pub added: usize,
    pub total: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRow {
    pub category: String,
    pub name: String,
    pub state: ServiceState,
    pub discord: String,
    pub website: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionResponse {
    pub current: String,
    pub latest: Option<String>,
    pub update_available: bool,
    pub phase: UpdatePhase,
}

// Commands

/// All banks with their key counts
pub fn list_banks(state: &AppState) -> Vec<BankSummary> {
    state.store.summary()
}

/// Create a bank, optionally making it the active one
pub fn create_bank(state: &AppState, name: &str, activate: bool) -> Result<(), String> {
    state.store.create_bank(name).map_err(|e| e.to_string())?;
    if activate {
        state
            .store
            .switch_active(name.trim())
            .map_err(|e| e.to_string())?;
    }
    Ok(())
}

/// Delete a bank (the active one when `name` is `None`). Returns the new active bank.
pub fn delete_bank(state: &AppState, name: Option<&str>) -> Result<String, String> {
    let name = resolve_bank(state, name);
    state.store.delete_bank(&name).map_err(|e| e.to_string())
}

pub fn switch_bank(state: &AppState, name: &str) -> Result<(), String> {
    state.store.switch_active(name).map_err(|e| e.to_string())
}

/// Add keys pasted as text, one per line
pub fn add_keys_text(state: &AppState, bank: Option<&str>, text: &str) -> Result<AddKeysResult, String> {
    let bank = resolve_bank(state, bank);
    let added = state
        .store
        .add_keys(&bank, text.lines())
        .map_err(|e| e.to_string())?;

    let total = state.store.keys(&bank).map(|k| k.len()).unwrap_or_default();
    Ok(AddKeysResult { bank, added, total })
}

/// Take a key out of a bank for good
pub fn use_key(state: &AppState, bank: Option<&str>) -> Result<KeyResponse, String> {
    let bank = resolve_bank(state, bank);
    let key = state.store.draw_key(&bank).map_err(|e| {
        warn!("Use key failed: {}", e);
        e.to_string()
    })?;

    let remaining = state.store.keys(&bank).map(|k| k.len()).unwrap_or_default();
    info!("Key used from {} ({} left)", bank, remaining);
    Ok(KeyResponse { bank, key, remaining })
}

/// Pick a key to copy, leaving it in the bank
pub fn copy_key(state: &AppState, bank: Option<&str>) -> Result<KeyResponse, String> {
    let bank = resolve_bank(state, bank);
    let key = state.store.peek_random_key(&bank).map_err(|e| e.to_string())?;

    let remaining = state.store.keys(&bank).map(|k| k.len()).unwrap_or_default();
    debug!("Key copied from {}", bank);
    Ok(KeyResponse { bank, key, remaining })
}

/// Every configured service with its last known state
pub fn service_statuses(state: &AppState) -> Vec<ServiceRow> {
    let snapshot = state.status.borrow();
    state
        .settings
        .services
        .iter()
        .map(|service| ServiceRow {
            category: service.category.clone(),
            name: service.name.clone(),
            state: snapshot.state(&service.name),
            discord: service.discord.clone(),
            website: service.website.clone(),
        })
        .collect()
}

pub fn version_status(state: &AppState) -> VersionResponse {
    let info = state.version.borrow();
    VersionResponse {
        current: info.current.to_string(),
        latest: info.latest.as_ref().map(|v| v.to_string()),
        update_available: info.update_available(),
        phase: state.phase.borrow().clone(),
    }
}

fn resolve_bank(state: &AppState, bank: Option<&str>) -> String {
    bank.map(str::to_string).unwrap_or_else(|| state.store.active())
}
