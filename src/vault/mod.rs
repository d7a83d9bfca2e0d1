//! Vault Module
//!
//! Biometric-gated credential storage using the OS-native keychain.

pub mod auth;
pub mod backend;
pub mod credential_vault;
pub mod credentials;
pub mod error;
pub mod storage;

pub use auth::{
    platform_authenticator, Authenticator, BiometryKind, FixedAuthenticator, PasscodeAuthenticator,
};
pub use backend::{KeyringBackend, MemoryBackend, SecretBackend};
pub use credential_vault::CredentialVault;
pub use credentials::{Credentials, ItemPolicy, VaultPolicy};
pub use error::{VaultError, VaultResult};
pub use storage::SecureStore;
