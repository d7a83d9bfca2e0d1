//! Credential Vault
//!
//! Durable storage of exactly one username/password pair under a fixed
//! service namespace. Work runs on the blocking pool and the result is handed
//! back to whichever task awaits it.

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;

use crate::vault::auth::{Authenticator, BiometryKind};
use crate::vault::backend::SecretBackend;
use crate::vault::credentials::{CredentialKey, Credentials, VaultPolicy};
use crate::vault::error::{VaultError, VaultResult};
use crate::vault::storage::SecureStore;

pub const DEFAULT_PROMPT: &str = "Authenticate to login to server";

/// Identifier attached to the span of each vault operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationId(pub Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Single-pair credential vault.
///
/// At most one operation is outstanding per instance; a call made while
/// another is still running fails with `VaultError::AuthenticationInProgress`.
pub struct CredentialVault {
    store: Arc<SecureStore>,
    policy: VaultPolicy,
    prompt: String,
    in_flight: Arc<Mutex<()>>,
}

impl CredentialVault {
    pub fn new(
        namespace: &str,
        policy: VaultPolicy,
        backend: Arc<dyn SecretBackend>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            store: Arc::new(SecureStore::new(namespace, backend, authenticator)),
            policy,
            prompt: DEFAULT_PROMPT.to_string(),
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    /// Replaces the message shown by the presence prompt
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn namespace(&self) -> &str {
        self.store.service()
    }

    pub fn policy(&self) -> VaultPolicy {
        self.policy
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Available biometric modality, for choosing a UI glyph only
    pub fn biometry_kind(&self) -> BiometryKind {
        self.store.authenticator().biometry_kind()
    }

    /// Stores the pair, overwriting any previous one.
    ///
    /// No validation happens here; empty strings are stored as given. Both
    /// policies are checked before anything is written, and a failed
    /// password write removes the whole pair rather than leaving the new
    /// username next to an old password.
    #[instrument(
        skip(self, username, password),
        fields(namespace = %self.namespace(), op = %OperationId::new())
    )]
    pub async fn save(&self, username: &str, password: &str) -> VaultResult<()> {
        let username = username.to_string();
        let password = password.to_string();
        let policy = self.policy;

        self.dispatch(move |store| {
            for key in CredentialKey::ALL {
                store.check_writable(key.as_str(), policy.policy_for(key))?;
            }

            store.set(
                CredentialKey::Username.as_str(),
                &username,
                policy.policy_for(CredentialKey::Username),
            )?;

            if let Err(e) = store.set(
                CredentialKey::Password.as_str(),
                &password,
                policy.policy_for(CredentialKey::Password),
            ) {
                for key in CredentialKey::ALL {
                    if let Err(cleanup) = store.delete(key.as_str()) {
                        tracing::warn!(key = %key, error = %cleanup, "could not roll back partial save");
                    }
                }
                return Err(e);
            }

            Ok(())
        })
        .await
    }

    /// Reads the pair; the password read waits on the presence prompt.
    ///
    /// Either both values come back or neither does.
    #[instrument(skip(self), fields(namespace = %self.namespace(), op = %OperationId::new()))]
    pub async fn fetch(&self) -> VaultResult<Credentials> {
        let prompt = self.prompt.clone();

        self.dispatch(move |store| {
            let username = store
                .get(CredentialKey::Username.as_str(), None)?
                .ok_or(VaultError::NotFound)?;
            let password = store
                .get(CredentialKey::Password.as_str(), Some(&prompt))?
                .ok_or(VaultError::NotFound)?;

            Ok(Credentials { username, password })
        })
        .await
    }

    /// Deletes every entry of the namespace; succeeds on an empty vault
    #[instrument(skip(self), fields(namespace = %self.namespace(), op = %OperationId::new()))]
    pub async fn clear(&self) -> VaultResult<()> {
        self.dispatch(|store| store.remove_all()).await
    }

    /// Runs `work` on the blocking pool while holding the in-flight guard.
    ///
    /// The guard moves into the worker, so it is only released once the store
    /// call returns, even if the awaiting future was dropped.
    async fn dispatch<T, F>(&self, work: F) -> VaultResult<T>
    where
        F: FnOnce(&SecureStore) -> VaultResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let guard = Arc::clone(&self.in_flight)
            .try_lock_owned()
            .map_err(|_| VaultError::AuthenticationInProgress)?;
        let store = Arc::clone(&self.store);

        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            work(&store)
        })
        .await
        .map_err(|e| VaultError::store(format!("Vault worker failed: {}", e)))?
    }
}

impl fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialVault")
            .field("namespace", &self.namespace())
            .field("policy", &self.policy)
            .field("prompt", &self.prompt)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::vault::auth::FixedAuthenticator;
    use crate::vault::backend::MemoryBackend;
    use crate::vault::credentials::ItemPolicy;

    const NAMESPACE: &str = "com.keychainsample.test";

    fn vault(auth: Arc<FixedAuthenticator>) -> CredentialVault {
        CredentialVault::new(
            NAMESPACE,
            VaultPolicy::default(),
            Arc::new(MemoryBackend::new()),
            auth,
        )
    }

    fn granting() -> Arc<FixedAuthenticator> {
        Arc::new(FixedAuthenticator::granting(BiometryKind::Face))
    }

    #[tokio::test]
    async fn save_then_fetch_returns_the_pair() {
        let vault = vault(granting());
        vault.save("alice", "s3cret").await.expect("save should succeed");

        let creds = vault.fetch().await.expect("fetch should succeed");

        assert_eq!(creds.into_parts(), ("alice".to_string(), "s3cret".to_string()));
    }

    #[tokio::test]
    async fn fetch_on_empty_vault_is_not_found() {
        let auth = granting();
        let vault = vault(auth.clone());

        assert_eq!(vault.fetch().await, Err(VaultError::NotFound));
        assert_eq!(auth.evaluations(), 0);
    }

    #[tokio::test]
    async fn denied_presence_on_empty_vault_is_not_found() {
        let auth = granting();
        auth.set_granted(false);
        let vault = vault(auth.clone());

        assert_eq!(vault.fetch().await, Err(VaultError::NotFound));
        assert_eq!(auth.evaluations(), 0);
    }

    #[tokio::test]
    async fn denied_presence_withholds_both_values() {
        let auth = granting();
        let vault = vault(auth.clone());
        vault.save("alice", "s3cret").await.unwrap();

        auth.set_granted(false);

        assert_eq!(vault.fetch().await, Err(VaultError::AuthenticationFailed));
        assert_eq!(auth.evaluations(), 1);
    }

    #[tokio::test]
    async fn second_save_overwrites_the_first() {
        let vault = vault(granting());
        vault.save("alice", "s3cret").await.unwrap();
        vault.save("bob", "hunter2").await.unwrap();

        assert_eq!(vault.fetch().await, Ok(Credentials::new("bob", "hunter2")));
    }

    #[tokio::test]
    async fn clear_removes_the_pair() {
        let vault = vault(granting());
        vault.save("alice", "s3cret").await.unwrap();

        vault.clear().await.expect("clear should succeed");

        assert_eq!(vault.fetch().await, Err(VaultError::NotFound));
    }

    #[tokio::test]
    async fn clear_on_empty_vault_succeeds() {
        let vault = vault(granting());

        assert_eq!(vault.clear().await, Ok(()));
        assert_eq!(vault.clear().await, Ok(()));
    }

    #[tokio::test]
    async fn empty_strings_are_stored_verbatim() {
        let vault = vault(granting());
        vault.save("", "").await.unwrap();

        assert_eq!(vault.fetch().await, Ok(Credentials::new("", "")));
    }

    #[tokio::test]
    async fn save_without_device_passcode_fails() {
        let auth = granting();
        auth.set_passcode(false);
        let vault = vault(auth);

        let err = vault.save("alice", "s3cret").await.expect_err("save should fail");

        assert!(matches!(err, VaultError::StoreFailure(_)));
    }

    #[tokio::test]
    async fn save_rejected_for_missing_passcode_never_mixes_pairs() {
        let auth = granting();
        let vault = vault(auth.clone());
        vault.save("alice", "p1").await.unwrap();

        auth.set_passcode(false);
        assert!(matches!(
            vault.save("bob", "p2").await,
            Err(VaultError::StoreFailure(_))
        ));

        auth.set_passcode(true);
        assert_eq!(vault.fetch().await, Err(VaultError::NotFound));
    }

    #[tokio::test]
    async fn failed_password_write_rolls_back_the_pair() {
        let backend = Arc::new(MemoryBackend::new());
        let vault = CredentialVault::new(NAMESPACE, VaultPolicy::default(), backend.clone(), granting());
        vault.save("alice", "p1").await.unwrap();

        backend.reject_writes_to(Some("password"));
        assert!(vault.save("bob", "p2").await.is_err());
        backend.reject_writes_to(None);

        assert_eq!(vault.fetch().await, Err(VaultError::NotFound));
        assert!(backend.raw(NAMESPACE, "username").is_none());

        vault.save("bob", "p2").await.unwrap();
        assert_eq!(vault.fetch().await, Ok(Credentials::new("bob", "p2")));
    }

    #[tokio::test]
    async fn unprotected_password_policy_skips_the_prompt() {
        let auth = granting();
        let vault = CredentialVault::new(
            NAMESPACE,
            VaultPolicy::new(ItemPolicy::unprotected()),
            Arc::new(MemoryBackend::new()),
            auth.clone(),
        );
        vault.save("alice", "s3cret").await.unwrap();

        assert!(vault.fetch().await.is_ok());
        assert_eq!(auth.evaluations(), 0);
    }

    #[test]
    fn biometry_kind_comes_from_the_authenticator() {
        let vault = vault(Arc::new(FixedAuthenticator::granting(BiometryKind::Fingerprint)));

        assert_eq!(vault.biometry_kind(), BiometryKind::Fingerprint);
        assert_eq!(vault.prompt(), DEFAULT_PROMPT);
        assert_eq!(vault.namespace(), NAMESPACE);
    }

    /// Holds the prompt open until the test answers it
    struct GateAuthenticator {
        entered: StdMutex<mpsc::Sender<String>>,
        answer: StdMutex<mpsc::Receiver<bool>>,
    }

    impl Authenticator for GateAuthenticator {
        fn biometry_kind(&self) -> BiometryKind {
            BiometryKind::Face
        }

        fn passcode_set(&self) -> bool {
            true
        }

        fn evaluate(&self, reason: &str) -> VaultResult<()> {
            let _ = self.entered.lock().unwrap().send(reason.to_string());
            match self.answer.lock().unwrap().recv() {
                Ok(true) => Ok(()),
                _ => Err(VaultError::AuthenticationFailed),
            }
        }
    }

    #[tokio::test]
    async fn calls_during_an_open_prompt_are_rejected() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (answer_tx, answer_rx) = mpsc::channel();
        let auth = Arc::new(GateAuthenticator {
            entered: StdMutex::new(entered_tx),
            answer: StdMutex::new(answer_rx),
        });
        let vault = Arc::new(
            CredentialVault::new(
                NAMESPACE,
                VaultPolicy::default(),
                Arc::new(MemoryBackend::new()),
                auth,
            )
            .with_prompt("Unlock test"),
        );
        vault.save("alice", "s3cret").await.unwrap();

        let pending = tokio::spawn({
            let vault = Arc::clone(&vault);
            async move { vault.fetch().await }
        });

        let reason = tokio::task::spawn_blocking(move || entered_rx.recv())
            .await
            .unwrap()
            .expect("prompt should open");
        assert_eq!(reason, "Unlock test");

        assert_eq!(
            vault.fetch().await,
            Err(VaultError::AuthenticationInProgress)
        );
        assert_eq!(vault.clear().await, Err(VaultError::AuthenticationInProgress));

        answer_tx.send(true).unwrap();
        let creds = pending.await.unwrap().expect("first fetch should succeed");
        assert_eq!(creds, Credentials::new("alice", "s3cret"));

        // Guard is released once the first call completes
        assert_eq!(vault.clear().await, Ok(()));
    }
}
