//! Authentication Context
//!
//! User-presence evaluation for presence-gated items, plus the biometry
//! check used to pick a UI glyph.

use std::process::Command;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::vault::backend::SecretBackend;
use crate::vault::error::{VaultError, VaultResult};

const DEVICE_SERVICE: &str = "keychain-sample.device";
const PASSCODE_HASH_KEY: &str = "__device_passcode_hash__";

/// Biometric modality available on this device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BiometryKind {
    #[default]
    None,
    Fingerprint,
    Face,
}

/// Evaluates the user-presence policy.
///
/// `evaluate` blocks for as long as the prompt is on screen.
pub trait Authenticator: Send + Sync {
    /// Modality used to pick a UI affordance; never consulted to bypass a gate
    fn biometry_kind(&self) -> BiometryKind;

    /// Whether a device passcode is configured
    fn passcode_set(&self) -> bool;

    /// Shows `reason` and waits for biometric or passcode proof.
    ///
    /// Declines, failed matches and cancellations all yield
    /// `VaultError::AuthenticationFailed`.
    fn evaluate(&self, reason: &str) -> VaultResult<()>;
}

/// Asks the user for the device passcode; `None` means the prompt was cancelled.
pub type PasscodePrompt = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Presence check backed by a device passcode.
///
/// Only an Argon2 hash of the passcode is stored, in the given backend. It
/// never shows a biometric prompt, so it reports `BiometryKind::None` unless
/// told otherwise.
pub struct PasscodeAuthenticator {
    backend: Arc<dyn SecretBackend>,
    prompt: PasscodePrompt,
    biometry: BiometryKind,
}

impl PasscodeAuthenticator {
    pub fn new(backend: Arc<dyn SecretBackend>, prompt: PasscodePrompt) -> Self {
        Self {
            backend,
            prompt,
            biometry: BiometryKind::None,
        }
    }

    /// Overrides the reported biometry kind
    pub fn with_biometry(mut self, biometry: BiometryKind) -> Self {
        self.biometry = biometry;
        self
    }

    /// Checks if a device passcode has been set
    pub fn has_passcode(&self) -> VaultResult<bool> {
        Ok(self.backend.read(DEVICE_SERVICE, PASSCODE_HASH_KEY)?.is_some())
    }

    /// Sets (or replaces) the device passcode
    pub fn set_passcode(&self, passcode: &str) -> VaultResult<()> {
        let salt = SaltString::generate(&mut OsRng);

        let hash = Argon2::default()
            .hash_password(passcode.as_bytes(), &salt)
            .map_err(|e| VaultError::store(format!("Hashing error: {}", e)))?
            .to_string();

        self.backend.write(DEVICE_SERVICE, PASSCODE_HASH_KEY, &hash)
    }

    /// Removes the device passcode (requires the current one)
    pub fn remove_passcode(&self, passcode: &str) -> VaultResult<()> {
        if !self.verify(passcode)? {
            return Err(VaultError::AuthenticationFailed);
        }

        self.backend.delete(DEVICE_SERVICE, PASSCODE_HASH_KEY)
    }

    fn verify(&self, passcode: &str) -> VaultResult<bool> {
        let stored_hash = self
            .backend
            .read(DEVICE_SERVICE, PASSCODE_HASH_KEY)?
            .ok_or(VaultError::AuthenticationFailed)?;

        let parsed_hash = PasswordHash::new(&stored_hash)
            .map_err(|e| VaultError::store(format!("Invalid stored hash: {}", e)))?;

        Ok(Argon2::default()
            .verify_password(passcode.as_bytes(), &parsed_hash)
            .is_ok())
    }
}

impl Authenticator for PasscodeAuthenticator {
    fn biometry_kind(&self) -> BiometryKind {
        self.biometry
    }

    fn passcode_set(&self) -> bool {
        match self.has_passcode() {
            Ok(set) => set,
            Err(e) => {
                tracing::warn!(error = %e, "could not determine passcode state");
                false
            }
        }
    }

    fn evaluate(&self, reason: &str) -> VaultResult<()> {
        let Some(passcode) = (self.prompt)(reason) else {
            return Err(VaultError::AuthenticationFailed);
        };

        if self.verify(&passcode)? {
            Ok(())
        } else {
            Err(VaultError::AuthenticationFailed)
        }
    }
}

#[cfg(target_os = "macos")]
mod macos {
    use std::sync::Arc;

    use localauthentication_rs::{LAPolicy, LocalAuthentication};

    use super::{detect_biometry, Authenticator, BiometryKind, PasscodeAuthenticator};
    use crate::vault::error::{VaultError, VaultResult};

    /// Touch ID through LocalAuthentication, falling back to the device passcode
    pub struct BiometricAuthenticator {
        fallback: Arc<PasscodeAuthenticator>,
        biometry: BiometryKind,
    }

    impl BiometricAuthenticator {
        pub fn new(fallback: Arc<PasscodeAuthenticator>) -> Self {
            Self {
                fallback,
                biometry: detect_biometry(),
            }
        }
    }

    impl Authenticator for BiometricAuthenticator {
        fn biometry_kind(&self) -> BiometryKind {
            self.biometry
        }

        fn passcode_set(&self) -> bool {
            self.biometry != BiometryKind::None || self.fallback.passcode_set()
        }

        fn evaluate(&self, reason: &str) -> VaultResult<()> {
            if self.biometry != BiometryKind::None {
                let local_authentication = LocalAuthentication::new();

                if local_authentication
                    .evaluate_policy(LAPolicy::DeviceOwnerAuthenticationWithBiometrics, reason)
                {
                    return Ok(());
                }
            }

            if self.fallback.passcode_set() {
                self.fallback.evaluate(reason)
            } else {
                Err(VaultError::AuthenticationFailed)
            }
        }
    }
}

#[cfg(target_os = "macos")]
pub use macos::BiometricAuthenticator;

/// Strongest presence check available on this platform, with `passcode` as
/// the fallback
#[cfg(target_os = "macos")]
pub fn platform_authenticator(passcode: Arc<PasscodeAuthenticator>) -> Arc<dyn Authenticator> {
    Arc::new(BiometricAuthenticator::new(passcode))
}

/// Strongest presence check available on this platform, with `passcode` as
/// the fallback
#[cfg(not(target_os = "macos"))]
pub fn platform_authenticator(passcode: Arc<PasscodeAuthenticator>) -> Arc<dyn Authenticator> {
    passcode
}

/// Authenticator with a scripted outcome
#[derive(Debug)]
pub struct FixedAuthenticator {
    biometry: BiometryKind,
    granted: AtomicBool,
    passcode_set: AtomicBool,
    evaluations: AtomicUsize,
}

impl FixedAuthenticator {
    pub fn granting(biometry: BiometryKind) -> Self {
        Self {
            biometry,
            granted: AtomicBool::new(true),
            passcode_set: AtomicBool::new(true),
            evaluations: AtomicUsize::new(0),
        }
    }

    pub fn denying(biometry: BiometryKind) -> Self {
        let auth = Self::granting(biometry);
        auth.set_granted(false);
        auth
    }

    pub fn set_granted(&self, granted: bool) {
        self.granted.store(granted, Ordering::SeqCst);
    }

    pub fn set_passcode(&self, set: bool) {
        self.passcode_set.store(set, Ordering::SeqCst);
    }

    /// How many prompts have been shown so far
    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::SeqCst)
    }
}

impl Authenticator for FixedAuthenticator {
    fn biometry_kind(&self) -> BiometryKind {
        self.biometry
    }

    fn passcode_set(&self) -> bool {
        self.passcode_set.load(Ordering::SeqCst)
    }

    fn evaluate(&self, _reason: &str) -> VaultResult<()> {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        if self.granted.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(VaultError::AuthenticationFailed)
        }
    }
}

/// Checks the platform for a biometric sensor
pub fn detect_biometry() -> BiometryKind {
    if cfg!(target_os = "macos") {
        // Touch ID is the only sensor macOS hardware ships with
        let available = Command::new("bioutil")
            .args(["--availability"])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);

        if available {
            return BiometryKind::Fingerprint;
        }
    }

    BiometryKind::None
}
