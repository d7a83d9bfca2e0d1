// Keychain Sample - biometric-gated credential vault
// Core library

pub mod commands;
pub mod config;
pub mod observability;
pub mod vault;

use std::sync::Arc;

use commands::{LoginController, PasscodeController};
use config::VaultConfig;
use vault::auth::PasscodePrompt;
use vault::{
    platform_authenticator, CredentialVault, KeyringBackend, PasscodeAuthenticator, SecretBackend,
};

/// Application state is immutable after construction; the vault serializes
/// its own operations.
pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: VaultConfig,
    pub vault: Arc<CredentialVault>,
    pub login: LoginController,
    /// Device passcode enrollment; the password cannot be saved without one
    pub passcode: PasscodeController,
}

impl AppState {
    /// Builds the state from the stored config on top of the OS keychain
    pub fn new(prompt: PasscodePrompt) -> Self {
        Self::from_config(VaultConfig::load(), Arc::new(KeyringBackend::new()), prompt)
    }

    pub fn from_config(
        config: VaultConfig,
        backend: Arc<dyn SecretBackend>,
        prompt: PasscodePrompt,
    ) -> Self {
        let fallback = Arc::new(PasscodeAuthenticator::new(Arc::clone(&backend), prompt));
        let authenticator = platform_authenticator(Arc::clone(&fallback));
        let vault = Arc::new(
            CredentialVault::new(&config.service, config.policy(), backend, authenticator)
                .with_prompt(config.prompt_message.clone()),
        );
        let login = LoginController::new(Arc::clone(&vault));
        let passcode = PasscodeController::new(fallback, vault.biometry_kind());

        Self {
            config,
            vault,
            login,
            passcode,
        }
    }
}

/// Entry point for the host application: installs logging and builds state.
///
/// `prompt` is asked for the device passcode whenever the password is read.
pub fn bootstrap(prompt: PasscodePrompt) -> SharedState {
    let config = VaultConfig::load();
    observability::init_tracing(&config);
    Arc::new(AppState::from_config(config, Arc::new(KeyringBackend::new()), prompt))
}
