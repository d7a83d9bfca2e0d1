//! Vault configuration.
//!
//! Defaults are persisted to a per-user config file. Environment variables
//! override any stored values to allow managed deployments to pin the
//! namespace or the presence requirement.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::vault::credential_vault::DEFAULT_PROMPT;
use crate::vault::credentials::{Accessibility, AuthenticationPolicy, ItemPolicy, VaultPolicy};

pub const DEFAULT_SERVICE: &str = "com.keychainsample.credentials";

const ENV_SERVICE: &str = "KEYCHAIN_SAMPLE_SERVICE";
const ENV_PROMPT: &str = "KEYCHAIN_SAMPLE_PROMPT";
const ENV_REQUIRE_PRESENCE: &str = "KEYCHAIN_SAMPLE_REQUIRE_PRESENCE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Keychain service namespace holding the pair
    pub service: String,
    /// Message shown by the presence prompt
    pub prompt_message: String,
    /// Gate the password behind biometric or passcode proof
    pub require_user_presence: bool,
    /// Keep the password readable only while a passcode is set, on this device
    pub device_bound: bool,
    /// Level for this crate's log file; `RUST_LOG` wins when set
    pub log_level: String,
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Per-user directory holding the config file and the logs
pub fn app_directory() -> PathBuf {
    if cfg!(windows) {
        let appdata = std::env::var_os("APPDATA")
            .unwrap_or_else(|| std::env::var_os("USERPROFILE").unwrap_or_default());
        PathBuf::from(appdata).join("KeychainSample")
    } else {
        let home = std::env::var_os("HOME").unwrap_or_default();
        PathBuf::from(home).join(".keychain-sample")
    }
}

fn config_path() -> PathBuf {
    app_directory().join("config.json")
}

fn load_from_file(path: &Path) -> Option<VaultConfig> {
    let raw = fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

impl VaultConfig {
    fn defaults() -> Self {
        Self {
            service: DEFAULT_SERVICE.to_string(),
            prompt_message: DEFAULT_PROMPT.to_string(),
            require_user_presence: true,
            device_bound: true,
            log_level: "info".to_string(),
        }
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(service) = lookup(ENV_SERVICE).filter(|s| !s.trim().is_empty()) {
            self.service = service.trim().to_string();
        }
        if let Some(prompt) = lookup(ENV_PROMPT).filter(|s| !s.trim().is_empty()) {
            self.prompt_message = prompt;
        }
        if let Some(value) = lookup(ENV_REQUIRE_PRESENCE) {
            self.require_user_presence = parse_bool(&value);
        }
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Loads the stored config (or defaults) with environment overrides applied
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        let mut config = load_from_file(path).unwrap_or_else(Self::defaults);
        config.apply_env_overrides();
        config
    }

    pub fn save_to_file(&self) -> Result<(), String> {
        self.save_to(&config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        let payload =
            serde_json::to_string_pretty(self).map_err(|e| format!("Save failed: {}", e))?;
        fs::write(path, payload).map_err(|e| format!("Save failed: {}", e))?;
        Ok(())
    }

    /// Policy applied to the password entry
    pub fn policy(&self) -> VaultPolicy {
        VaultPolicy::new(ItemPolicy {
            accessibility: if self.device_bound {
                Accessibility::WhenPasscodeSetThisDeviceOnly
            } else {
                Accessibility::AfterFirstUnlock
            },
            authentication: if self.require_user_presence {
                AuthenticationPolicy::UserPresence
            } else {
                AuthenticationPolicy::None
            },
        })
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self::defaults()
    }
}
