//! Vault Errors
//!
//! Every storage and authentication failure is converted into one of these
//! kinds at the vault boundary.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("No credentials stored")]
    NotFound,

    #[error("User presence could not be verified")]
    AuthenticationFailed,

    #[error("Another vault operation is already awaiting authentication")]
    AuthenticationInProgress,

    #[error("Secure store failure: {0}")]
    StoreFailure(String),
}

impl VaultError {
    pub fn store(reason: impl Into<String>) -> Self {
        Self::StoreFailure(reason.into())
    }

    /// True when the presence prompt stopped the operation (declined, or
    /// another prompt already open), as opposed to the store failing.
    pub fn is_auth_related(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed | Self::AuthenticationInProgress
        )
    }
}

pub type VaultResult<T> = Result<T, VaultError>;
