//! Passcode Commands
//!
//! Enrollment of the device passcode that backs the presence prompt. The
//! password entry cannot be saved until one is set.

use std::sync::Arc;

use serde::Serialize;
use tracing::instrument;

use crate::commands::login::VaultResponse;
use crate::vault::{BiometryKind, PasscodeAuthenticator, VaultError, VaultResult};

/// Response for checking passcode status
#[derive(Debug, Serialize)]
pub struct PasscodeStatusResponse {
    pub has_passcode: bool,
    pub biometry: BiometryKind,
}

pub struct PasscodeController {
    authenticator: Arc<PasscodeAuthenticator>,
    biometry: BiometryKind,
}

impl PasscodeController {
    /// `biometry` is what the vault's authenticator reports, for the status view
    pub fn new(authenticator: Arc<PasscodeAuthenticator>, biometry: BiometryKind) -> Self {
        Self {
            authenticator,
            biometry,
        }
    }

    pub async fn status(&self) -> Result<PasscodeStatusResponse, String> {
        let has_passcode = self
            .run(|auth| auth.has_passcode())
            .await
            .map_err(|e| e.to_string())?;

        Ok(PasscodeStatusResponse {
            has_passcode,
            biometry: self.biometry,
        })
    }

    /// Sets up (or replaces) the device passcode
    #[instrument(skip(self, passcode))]
    pub async fn setup_passcode(&self, passcode: &str) -> VaultResponse {
        if passcode.is_empty() {
            return VaultResponse::from_result(Err(VaultError::store(
                "Passcode must not be empty",
            )));
        }

        let passcode = passcode.to_string();
        VaultResponse::from_result(self.run(move |auth| auth.set_passcode(&passcode)).await)
    }

    /// Removes the device passcode after checking the current one
    #[instrument(skip(self, current))]
    pub async fn remove_passcode(&self, current: &str) -> VaultResponse {
        let current = current.to_string();
        VaultResponse::from_result(self.run(move |auth| auth.remove_passcode(&current)).await)
    }

    // Argon2 and keychain access both block
    async fn run<T, F>(&self, work: F) -> VaultResult<T>
    where
        F: FnOnce(&PasscodeAuthenticator) -> VaultResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let authenticator = Arc::clone(&self.authenticator);

        tokio::task::spawn_blocking(move || work(&authenticator))
            .await
            .map_err(|e| VaultError::store(format!("Passcode worker failed: {}", e)))?
    }
}
