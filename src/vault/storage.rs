//! Secure Store
//!
//! Tiered secret storage over a raw backend. Items are persisted as JSON
//! carrying their own policy; presence-gated items are only released after
//! the authenticator is satisfied.

use std::sync::Arc;

use crate::vault::auth::Authenticator;
use crate::vault::backend::SecretBackend;
use crate::vault::credentials::{CredentialKey, ItemPolicy, StoredItem};
use crate::vault::error::{VaultError, VaultResult};

const INDEX_KEY: &str = "__entry_index__";

/// Secret storage for one service namespace
pub struct SecureStore {
    service: String,
    backend: Arc<dyn SecretBackend>,
    authenticator: Arc<dyn Authenticator>,
}

impl SecureStore {
    pub fn new(
        service: &str,
        backend: Arc<dyn SecretBackend>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            service: service.to_string(),
            backend,
            authenticator,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn authenticator(&self) -> &Arc<dyn Authenticator> {
        &self.authenticator
    }

    /// Fails when `policy` cannot be honored right now.
    ///
    /// A missing passcode also purges every passcode-bound item, since those
    /// must not outlive the passcode they were stored under.
    pub fn check_writable(&self, key: &str, policy: ItemPolicy) -> VaultResult<()> {
        if policy.accessibility.requires_passcode() && !self.authenticator.passcode_set() {
            self.purge_passcode_bound()?;
            return Err(VaultError::store(format!(
                "Cannot save {}: device passcode not set",
                key
            )));
        }

        Ok(())
    }

    /// Stores a value under `key`, replacing any previous value and policy
    pub fn set(&self, key: &str, value: &str, policy: ItemPolicy) -> VaultResult<()> {
        self.check_writable(key, policy)?;

        let item_json = serde_json::to_string(&StoredItem {
            policy,
            value: value.to_string(),
        })
        .map_err(|e| VaultError::store(format!("Serialization error: {}", e)))?;

        // Index first, so a failed item write never leaves an orphan behind
        self.add_to_index(key)?;
        self.backend.write(&self.service, key, &item_json)
    }

    /// Reads the value under `key`.
    ///
    /// Presence-gated items show `prompt` and block until the user answers.
    /// Absent items never prompt.
    pub fn get(&self, key: &str, prompt: Option<&str>) -> VaultResult<Option<String>> {
        let Some(item) = self.read_item(key)? else {
            return Ok(None);
        };

        if item.policy.accessibility.requires_passcode() && !self.authenticator.passcode_set() {
            self.backend.delete(&self.service, key)?;
            return Ok(None);
        }

        if item.policy.requires_presence() {
            self.authenticator.evaluate(prompt.unwrap_or_default())?;
        }

        Ok(Some(item.value))
    }

    /// Removes a single entry; absent entries are fine
    pub fn delete(&self, key: &str) -> VaultResult<()> {
        self.backend.delete(&self.service, key)
    }

    /// Deletes every entry of this namespace.
    ///
    /// The fixed credential keys are always deleted, so an unreadable index
    /// cannot keep them alive.
    pub fn remove_all(&self) -> VaultResult<()> {
        for key in self.known_keys() {
            self.backend.delete(&self.service, &key)?;
        }

        self.backend.delete(&self.service, INDEX_KEY)
    }

    /// Keys currently stored in this namespace
    pub fn index(&self) -> VaultResult<Vec<String>> {
        match self.backend.read(&self.service, INDEX_KEY)? {
            Some(index_json) => serde_json::from_str(&index_json).map_err(|e| {
                VaultError::store(format!("Invalid entry index JSON in keyring: {}", e))
            }),
            None => Ok(Vec::new()),
        }
    }

    /// Indexed keys plus the fixed credential keys
    fn known_keys(&self) -> Vec<String> {
        let mut keys = self.index().unwrap_or_else(|e| {
            tracing::warn!(service = %self.service, error = %e, "ignoring unreadable entry index");
            Vec::new()
        });

        for key in CredentialKey::ALL {
            if !keys.iter().any(|k| k == key.as_str()) {
                keys.push(key.as_str().to_string());
            }
        }

        keys
    }

    fn read_item(&self, key: &str) -> VaultResult<Option<StoredItem>> {
        let Some(item_json) = self.backend.read(&self.service, key)? else {
            return Ok(None);
        };

        serde_json::from_str(&item_json)
            .map(Some)
            .map_err(|e| VaultError::store(format!("Deserialization error: {}", e)))
    }

    fn purge_passcode_bound(&self) -> VaultResult<()> {
        for key in self.known_keys() {
            // Unparseable items are left for `remove_all`
            if let Ok(Some(item)) = self.read_item(&key) {
                if item.policy.accessibility.requires_passcode() {
                    self.backend.delete(&self.service, &key)?;
                }
            }
        }

        Ok(())
    }

    fn add_to_index(&self, key: &str) -> VaultResult<()> {
        let mut index = self.index()?;

        if !index.iter().any(|k| k == key) {
            index.push(key.to_string());

            let index_json = serde_json::to_string(&index)
                .map_err(|e| VaultError::store(format!("Serialization error: {}", e)))?;
            self.backend.write(&self.service, INDEX_KEY, &index_json)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::auth::{BiometryKind, FixedAuthenticator};
    use crate::vault::backend::MemoryBackend;

    fn store() -> (SecureStore, Arc<MemoryBackend>, Arc<FixedAuthenticator>) {
        let backend = Arc::new(MemoryBackend::new());
        let auth = Arc::new(FixedAuthenticator::granting(BiometryKind::Face));
        let store = SecureStore::new("test.service", backend.clone(), auth.clone());
        (store, backend, auth)
    }

    #[test]
    fn unprotected_items_read_without_prompt() {
        let (store, _, auth) = store();
        store
            .set("username", "alice", ItemPolicy::unprotected())
            .unwrap();

        assert_eq!(
            store.get("username", None).unwrap().as_deref(),
            Some("alice")
        );
        assert_eq!(auth.evaluations(), 0);
    }

    #[test]
    fn gated_item_is_withheld_when_denied() {
        let (store, _, auth) = store();
        store
            .set("password", "s3cret", ItemPolicy::presence_gated())
            .unwrap();

        auth.set_granted(false);
        assert_eq!(
            store.get("password", Some("Authenticate")),
            Err(VaultError::AuthenticationFailed)
        );

        auth.set_granted(true);
        assert_eq!(
            store.get("password", Some("Authenticate")).unwrap().as_deref(),
            Some("s3cret")
        );
        assert_eq!(auth.evaluations(), 2);
    }

    #[test]
    fn absent_item_does_not_prompt() {
        let (store, _, auth) = store();

        assert_eq!(store.get("password", Some("Authenticate")).unwrap(), None);
        assert_eq!(auth.evaluations(), 0);
    }

    #[test]
    fn passcode_tier_rejects_writes_without_passcode() {
        let (store, backend, auth) = store();
        auth.set_passcode(false);

        let err = store
            .set("password", "s3cret", ItemPolicy::presence_gated())
            .expect_err("write should be rejected");

        assert!(matches!(err, VaultError::StoreFailure(reason) if reason.contains("passcode")));
        assert!(backend.is_empty());
    }

    #[test]
    fn passcode_tier_items_are_deleted_when_passcode_removed() {
        let (store, backend, auth) = store();
        store
            .set("password", "s3cret", ItemPolicy::presence_gated())
            .unwrap();

        auth.set_passcode(false);
        assert_eq!(store.get("password", Some("Authenticate")).unwrap(), None);

        // Re-enrolling a passcode does not bring the old item back
        auth.set_passcode(true);
        assert_eq!(store.get("password", Some("Authenticate")).unwrap(), None);
        assert!(backend.raw("test.service", "password").is_none());
    }

    #[test]
    fn rejected_passcode_write_purges_stale_passcode_items() {
        let (store, backend, auth) = store();
        store.set("username", "alice", ItemPolicy::unprotected()).unwrap();
        store
            .set("password", "p1", ItemPolicy::presence_gated())
            .unwrap();

        auth.set_passcode(false);
        assert!(store
            .check_writable("password", ItemPolicy::presence_gated())
            .is_err());

        assert!(backend.raw("test.service", "password").is_none());
        assert_eq!(store.get("username", None).unwrap().as_deref(), Some("alice"));
    }

    #[test]
    fn failed_item_write_stays_indexed_for_cleanup() {
        let (store, backend, _) = store();
        store.set("username", "alice", ItemPolicy::unprotected()).unwrap();
        backend.reject_writes_to(Some("token"));

        assert!(store.set("token", "t", ItemPolicy::unprotected()).is_err());
        assert!(store.index().unwrap().contains(&"token".to_string()));

        store.remove_all().unwrap();
        assert!(backend.is_empty());
    }

    #[test]
    fn remove_all_survives_a_corrupt_index() {
        let (store, backend, _) = store();
        store.set("username", "alice", ItemPolicy::unprotected()).unwrap();
        store
            .set("password", "s3cret", ItemPolicy::presence_gated())
            .unwrap();
        backend
            .write("test.service", INDEX_KEY, "not json")
            .unwrap();

        assert_eq!(store.remove_all(), Ok(()));
        assert!(backend.is_empty());
    }

    #[test]
    fn values_are_persisted_with_their_policy() {
        let (store, backend, _) = store();
        store
            .set("password", "s3cret", ItemPolicy::presence_gated())
            .unwrap();

        let raw = backend.raw("test.service", "password").expect("raw entry");
        assert!(raw.contains("user_presence"));
        assert!(raw.contains("when_passcode_set_this_device_only"));
    }

    #[test]
    fn remove_all_clears_every_indexed_key() {
        let (store, backend, _) = store();
        store.set("username", "alice", ItemPolicy::unprotected()).unwrap();
        store.set("username", "bob", ItemPolicy::unprotected()).unwrap();
        store
            .set("password", "s3cret", ItemPolicy::presence_gated())
            .unwrap();

        assert_eq!(store.index().unwrap(), vec!["username", "password"]);

        store.remove_all().unwrap();

        assert!(backend.is_empty());
        assert!(store.index().unwrap().is_empty());
    }

    #[test]
    fn remove_all_on_empty_namespace_succeeds() {
        let (store, _, _) = store();
        assert_eq!(store.remove_all(), Ok(()));
    }

    #[test]
    fn remove_all_leaves_other_namespaces_alone() {
        let (store, backend, auth) = store();
        let other = SecureStore::new("other.service", backend.clone(), auth);
        store.set("username", "alice", ItemPolicy::unprotected()).unwrap();
        other.set("username", "bob", ItemPolicy::unprotected()).unwrap();

        store.remove_all().unwrap();

        assert_eq!(other.get("username", None).unwrap().as_deref(), Some("bob"));
    }
}
