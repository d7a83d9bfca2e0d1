//! Secret Backends
//!
//! Raw, blocking access to a keyed secret store. `KeyringBackend` talks to the
//! OS keychain; `MemoryBackend` keeps everything in process.

use std::collections::HashMap;
use std::sync::RwLock;

use keyring::Entry;

use crate::vault::error::{VaultError, VaultResult};

/// Blocking key/value access scoped by service name.
///
/// Calls may block on OS I/O; the vault only invokes them from the blocking
/// thread pool.
pub trait SecretBackend: Send + Sync {
    /// Returns `None` when no entry exists for the key
    fn read(&self, service: &str, key: &str) -> VaultResult<Option<String>>;

    /// Creates or overwrites the entry
    fn write(&self, service: &str, key: &str, value: &str) -> VaultResult<()>;

    /// Removes the entry; succeeds when it was already absent
    fn delete(&self, service: &str, key: &str) -> VaultResult<()>;
}

/// OS keychain via the `keyring` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringBackend;

impl KeyringBackend {
    pub fn new() -> Self {
        Self
    }

    fn entry(service: &str, key: &str) -> VaultResult<Entry> {
        Entry::new(service, key).map_err(|e| VaultError::store(format!("Keyring error: {}", e)))
    }
}

impl SecretBackend for KeyringBackend {
    fn read(&self, service: &str, key: &str) -> VaultResult<Option<String>> {
        match Self::entry(service, key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(VaultError::store(format!("Failed to read {}: {}", key, e))),
        }
    }

    fn write(&self, service: &str, key: &str, value: &str) -> VaultResult<()> {
        Self::entry(service, key)?
            .set_password(value)
            .map_err(|e| VaultError::store(format!("Failed to save {}: {}", key, e)))
    }

    fn delete(&self, service: &str, key: &str) -> VaultResult<()> {
        match Self::entry(service, key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(VaultError::store(format!("Failed to delete {}: {}", key, e))),
        }
    }
}

/// In-process backend for tests and hosts without a keychain
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<(String, String), String>>,
    rejected_key: RwLock<Option<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later write to `key` fail, as a full or locked keychain would.
    /// `None` lifts the fault.
    pub fn reject_writes_to(&self, key: Option<&str>) {
        if let Ok(mut rejected) = self.rejected_key.write() {
            *rejected = key.map(str::to_string);
        }
    }

    /// Number of entries across all services
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw stored text, bypassing every policy
    pub fn raw(&self, service: &str, key: &str) -> Option<String> {
        self.entries
            .read()
            .ok()?
            .get(&(service.to_string(), key.to_string()))
            .cloned()
    }
}

fn poisoned() -> VaultError {
    VaultError::store("In-memory store lock poisoned")
}

impl SecretBackend for MemoryBackend {
    fn read(&self, service: &str, key: &str) -> VaultResult<Option<String>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries
            .get(&(service.to_string(), key.to_string()))
            .cloned())
    }

    fn write(&self, service: &str, key: &str, value: &str) -> VaultResult<()> {
        let rejected = self.rejected_key.read().map_err(|_| poisoned())?;
        if rejected.as_deref() == Some(key) {
            return Err(VaultError::store(format!("Failed to save {}: write rejected", key)));
        }
        drop(rejected);

        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert((service.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    fn delete(&self, service: &str, key: &str) -> VaultResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.remove(&(service.to_string(), key.to_string()));
        Ok(())
    }
}
