//! Commands exposed to the view layer.

pub mod login;
pub mod passcode;

pub use login::{Destination, LoginController, LoginEvent, LoginForm, LoginOutcome, VaultResponse};
pub use passcode::{PasscodeController, PasscodeStatusResponse};
