//! Key Bank Module
//!
//! Owns the named key banks, the active bank selection, and keeps the bank
//! file in step with every change.

use std::sync::{Mutex, MutexGuard, PoisonError};

use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::storage::{BankFile, BankMap, StorageError};

/// One row of the bank overview
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BankSummary {
    pub name: String,
    pub key_count: usize,
    pub active: bool,
}

#[derive(Debug, Clone)]
struct Inner {
    banks: BankMap,
    active: String,
    frozen: bool,
}

/// In-memory key banks backed by a [`BankFile`].
///
/// Every command runs under a single lock that covers both the in-memory
/// change and the file write, so at most one save is in flight at a time.
/// A command whose save fails leaves the in-memory state untouched.
#[derive(Debug)]
pub struct BankStore {
    file: BankFile,
    inner: Mutex<Inner>,
    load_error: Option<StorageError>,
}

impl BankStore {
    /// Load banks from disk, falling back to a single empty bank.
    ///
    /// Read or parse failures are logged and kept in [`Self::load_error`];
    /// they never prevent the store from being created.
    pub fn load(file: BankFile, default_bank: &str) -> Self {
        let (banks, load_error) = match file.load() {
            Ok(Some(banks)) => {
                info!("Loaded {} key bank(s) from {:?}", banks.len(), file.path());
                (banks, None)
            }
            Ok(None) => {
                debug!("No bank file at {:?}, starting with defaults", file.path());
                (default_banks(default_bank), None)
            }
            Err(e) => {
                warn!("Key load error, starting with defaults: {}", e);
                (default_banks(default_bank), Some(e))
            }
        };

        let active = first_bank(&banks);

        Self {
            file,
            inner: Mutex::new(Inner {
                banks,
                active,
                frozen: false,
            }),
            load_error,
        }
    }

    /// The error recorded while loading, if the defaults were used because of one
    pub fn load_error(&self) -> Option<&StorageError> {
        self.load_error.as_ref()
    }

    /// Write the current banks to disk. Fails while frozen.
    pub fn save(&self) -> Result<(), BankError> {
        let inner = self.lock();
        if inner.frozen {
            return Err(BankError::Frozen);
        }
        self.file.save(&inner.banks)?;
        Ok(())
    }

    /// Add an empty bank. The active bank is left alone.
    pub fn create_bank(&self, name: &str) -> Result<(), BankError> {
        let name = name.trim();
        self.mutate(|inner| {
            if name.is_empty() || inner.banks.contains_key(name) {
                return Err(BankError::DuplicateName(name.to_string()));
            }
            inner.banks.insert(name.to_string(), Vec::new());
            Ok(())
        })?;
        info!("Created key bank: {}", name);
        Ok(())
    }

    /// Remove a bank. Returns the active bank name afterwards.
    pub fn delete_bank(&self, name: &str) -> Result<String, BankError> {
        let active = self.mutate(|inner| {
            if !inner.banks.contains_key(name) {
                return Err(BankError::NotFound(name.to_string()));
            }
            if inner.banks.len() == 1 {
                return Err(BankError::LastBank(name.to_string()));
            }
            inner.banks.remove(name);
            if inner.active == name {
                inner.active = first_bank(&inner.banks);
            }
            Ok(inner.active.clone())
        })?;
        info!("Deleted key bank: {} (active: {})", name, active);
        Ok(active)
    }

    pub fn switch_active(&self, name: &str) -> Result<(), BankError> {
        let mut inner = self.lock();
        if !inner.banks.contains_key(name) {
            return Err(BankError::NotFound(name.to_string()));
        }
        inner.active = name.to_string();
        debug!("Active key bank: {}", name);
        Ok(())
    }

    pub fn active(&self) -> String {
        self.lock().active.clone()
    }

    /// Append keys to a bank, trimming whitespace and dropping blank entries.
    /// Returns how many keys were added.
    pub fn add_keys<I, S>(&self, bank: &str, keys: I) -> Result<usize, BankError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let new_keys: Vec<String> = keys
            .into_iter()
            .map(|k| k.as_ref().trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        let count = new_keys.len();

        self.mutate(|inner| {
            let keys = inner
                .banks
                .get_mut(bank)
                .ok_or_else(|| BankError::NotFound(bank.to_string()))?;
            keys.extend(new_keys);
            Ok(())
        })?;

        info!("Added {} key(s) to bank: {}", count, bank);
        Ok(count)
    }

    /// Remove and return a uniformly chosen key
    pub fn draw_key(&self, bank: &str) -> Result<String, BankError> {
        self.draw_key_with(bank, &mut rand::thread_rng())
    }

    /// Like [`Self::draw_key`] with a caller-supplied random source.
    ///
    /// The key is picked by position, so only that one entry is removed even
    /// when the bank holds duplicates of it.
    pub fn draw_key_with<R: Rng + ?Sized>(
        &self,
        bank: &str,
        rng: &mut R,
    ) -> Result<String, BankError> {
        let key = self.mutate(|inner| {
            let keys = inner
                .banks
                .get_mut(bank)
                .ok_or_else(|| BankError::NotFound(bank.to_string()))?;
            if keys.is_empty() {
                return Err(BankError::EmptyBank(bank.to_string()));
            }
            let index = rng.gen_range(0..keys.len());
            Ok(keys.remove(index))
        })?;

        info!("Drew a key from bank: {}", bank);
        Ok(key)
    }

    /// Return a uniformly chosen key without removing it
    pub fn peek_random_key(&self, bank: &str) -> Result<String, BankError> {
        self.peek_random_key_with(bank, &mut rand::thread_rng())
    }

    pub fn peek_random_key_with<R: Rng + ?Sized>(
        &self,
        bank: &str,
        rng: &mut R,
    ) -> Result<String, BankError> {
        let inner = self.lock();
        let keys = inner
            .banks
            .get(bank)
            .ok_or_else(|| BankError::NotFound(bank.to_string()))?;
        if keys.is_empty() {
            return Err(BankError::EmptyBank(bank.to_string()));
        }
        Ok(keys[rng.gen_range(0..keys.len())].clone())
    }

    /// Keys of a bank in stored order
    pub fn keys(&self, bank: &str) -> Result<Vec<String>, BankError> {
        self.lock()
            .banks
            .get(bank)
            .cloned()
            .ok_or_else(|| BankError::NotFound(bank.to_string()))
    }

    pub fn bank_names(&self) -> Vec<String> {
        self.lock().banks.keys().cloned().collect()
    }

    pub fn summary(&self) -> Vec<BankSummary> {
        let inner = self.lock();
        inner
            .banks
            .iter()
            .map(|(name, keys)| BankSummary {
                name: name.clone(),
                key_count: keys.len(),
                active: *name == inner.active,
            })
            .collect()
    }

    /// Block further changes until the returned guard is dropped.
    ///
    /// Waits for any command that is currently saving to finish first.
    pub fn freeze(&self) -> FreezeGuard<'_> {
        self.lock().frozen = true;
        debug!("Key banks frozen");
        FreezeGuard { store: self }
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut Inner) -> Result<T, BankError>) -> Result<T, BankError> {
        let mut inner = self.lock();
        if inner.frozen {
            return Err(BankError::Frozen);
        }

        let mut next = inner.clone();
        let out = f(&mut next)?;
        self.file.save(&next.banks)?;
        *inner = next;
        Ok(out)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps a [`BankStore`] read-only while alive
#[derive(Debug)]
pub struct FreezeGuard<'a> {
    store: &'a BankStore,
}

impl Drop for FreezeGuard<'_> {
    fn drop(&mut self) {
        self.store.lock().frozen = false;
        debug!("Key banks unfrozen");
    }
}

fn default_banks(name: &str) -> BankMap {
    let mut banks = BankMap::new();
    banks.insert(name.to_string(), Vec::new());
    banks
}

fn first_bank(banks: &BankMap) -> String {
    banks.keys().next().cloned().unwrap_or_default()
}

/// Key bank command errors
#[derive(Debug, thiserror::Error)]
pub enum BankError {
    #[error("Bank '{0}' has no keys")]
    EmptyBank(String),

    #[error("Bank name '{0}' is empty or already in use")]
    DuplicateName(String),

    #[error("Bank '{0}' is the last bank and cannot be deleted")]
    LastBank(String),

    #[error("Bank '{0}' does not exist")]
    NotFound(String),

    #[error("Key banks are locked while an update is installed")]
    Frozen,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
