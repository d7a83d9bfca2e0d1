//! Login Commands
//!
//! Presenter behind the login screen: a username field, a masked password
//! field and the login, clear and biometric quick-fill actions. Results come
//! back as values and are also published as `LoginEvent`s for subscribers.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::instrument;

use crate::vault::{BiometryKind, CredentialVault, VaultError, VaultResult};

const EVENT_CAPACITY: usize = 16;

/// Contents of the two form fields
#[derive(Clone, Default, PartialEq, Eq)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

impl LoginForm {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for LoginForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginForm")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Screens reachable from the login screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    ContentDetail,
}

/// Notifications for the view layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginEvent {
    Navigate(Destination),
    Filled(LoginForm),
    Cleared,
}

/// Result of the login action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// A field was empty; nothing was stored
    Incomplete,
    Saved(Destination),
    /// The form keeps its contents and no navigation happens
    Failed(VaultError),
}

/// Response for vault operations
#[derive(Debug, Serialize)]
pub struct VaultResponse {
    pub success: bool,
    pub error: Option<String>,
}

impl VaultResponse {
    pub(crate) fn from_result(result: VaultResult<()>) -> Self {
        match result {
            Ok(()) => Self {
                success: true,
                error: None,
            },
            Err(e) => Self {
                success: false,
                error: Some(e.to_string()),
            },
        }
    }
}

pub struct LoginController {
    vault: Arc<CredentialVault>,
    events: broadcast::Sender<LoginEvent>,
}

impl LoginController {
    pub fn new(vault: Arc<CredentialVault>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { vault, events }
    }

    pub fn vault(&self) -> &Arc<CredentialVault> {
        &self.vault
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoginEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: LoginEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Stores the form and navigates to the detail screen on success
    #[instrument(skip(self, form), fields(namespace = %self.vault.namespace()))]
    pub async fn login(&self, form: &LoginForm) -> LoginOutcome {
        if !form.is_complete() {
            return LoginOutcome::Incomplete;
        }

        match self.vault.save(&form.username, &form.password).await {
            Ok(()) => {
                let destination = Destination::ContentDetail;
                self.publish(LoginEvent::Navigate(destination));
                LoginOutcome::Saved(destination)
            }
            Err(e) => {
                tracing::warn!(error = %e, "saving credentials failed");
                LoginOutcome::Failed(e)
            }
        }
    }

    /// Reads the stored pair back into the form, prompting for presence
    #[instrument(skip(self), fields(namespace = %self.vault.namespace()))]
    pub async fn quick_fill(&self) -> VaultResult<LoginForm> {
        let (username, password) = self.vault.fetch().await?.into_parts();
        let form = LoginForm { username, password };

        self.publish(LoginEvent::Filled(form.clone()));
        Ok(form)
    }

    /// Quick-fill run when the screen appears; an empty vault or a declined
    /// prompt leaves the form as it is.
    pub async fn on_appear(&self) -> Option<LoginForm> {
        match self.quick_fill().await {
            Ok(form) => Some(form),
            Err(VaultError::NotFound) => None,
            Err(e) if e.is_auth_related() => {
                tracing::info!(error = %e, "quick fill skipped");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "quick fill failed");
                None
            }
        }
    }

    /// Deletes the stored pair; failures are logged and reported
    #[instrument(skip(self), fields(namespace = %self.vault.namespace()))]
    pub async fn clear(&self) -> VaultResponse {
        let result = self.vault.clear().await;

        match &result {
            Ok(()) => self.publish(LoginEvent::Cleared),
            Err(e) => tracing::warn!(error = %e, "clearing credentials failed"),
        }

        VaultResponse::from_result(result)
    }

    /// SF Symbol for the quick-fill button, or `None` to hide it
    pub fn biometric_affordance(&self) -> Option<&'static str> {
        match self.vault.biometry_kind() {
            BiometryKind::None => None,
            BiometryKind::Face => Some("faceid"),
            BiometryKind::Fingerprint => Some("touchid"),
        }
    }
}
