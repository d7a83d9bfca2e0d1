//! Stored credentials
//!
//! The fixed credential keys, the credential pair handed back to callers and
//! the per-item policies persisted alongside each value.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Fixed keys of the vault; callers cannot define their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKey {
    Username,
    Password,
}

impl CredentialKey {
    pub const ALL: [CredentialKey; 2] = [CredentialKey::Username, CredentialKey::Password];

    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKey::Username => "username",
            CredentialKey::Password => "password",
        }
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A username/password pair read back from the vault
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn into_parts(self) -> (String, String) {
        (self.username, self.password)
    }
}

// The password never reaches logs through `{:?}`.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// When a stored item may be read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accessibility {
    /// Readable whenever the store itself is reachable
    #[default]
    AfterFirstUnlock,
    /// Readable only while a device passcode is set, never migrated off this device
    WhenPasscodeSetThisDeviceOnly,
}

impl Accessibility {
    pub fn requires_passcode(&self) -> bool {
        matches!(self, Accessibility::WhenPasscodeSetThisDeviceOnly)
    }
}

/// Extra gate evaluated on every read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticationPolicy {
    #[default]
    None,
    /// Biometric match or device passcode
    UserPresence,
}

/// Policy attached to a single stored item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPolicy {
    pub accessibility: Accessibility,
    pub authentication: AuthenticationPolicy,
}

impl ItemPolicy {
    /// Policy of the username entry
    pub fn unprotected() -> Self {
        Self::default()
    }

    /// Passcode-bound, presence-gated policy of the password entry
    pub fn presence_gated() -> Self {
        Self {
            accessibility: Accessibility::WhenPasscodeSetThisDeviceOnly,
            authentication: AuthenticationPolicy::UserPresence,
        }
    }

    pub fn requires_presence(&self) -> bool {
        self.authentication == AuthenticationPolicy::UserPresence
    }
}

/// Policy the vault applies to the password entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultPolicy {
    pub password: ItemPolicy,
}

impl VaultPolicy {
    pub fn new(password: ItemPolicy) -> Self {
        Self { password }
    }

    pub fn policy_for(&self, key: CredentialKey) -> ItemPolicy {
        match key {
            CredentialKey::Username => ItemPolicy::unprotected(),
            CredentialKey::Password => self.password,
        }
    }
}

impl Default for VaultPolicy {
    fn default() -> Self {
        Self::new(ItemPolicy::presence_gated())
    }
}

/// Item as persisted in the backend (policy travels with the value)
#[derive(Serialize, Deserialize)]
pub(crate) struct StoredItem {
    #[serde(default)]
    pub policy: ItemPolicy,
    pub value: String,
}
