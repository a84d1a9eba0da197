//! Account session operations
//!
//! Logging in verifies the account against the control plane, ensures a
//! tunnel configuration exists for it (creating one pushes the fresh key),
//! and records the account as active in the shared settings. Verification
//! is deferred when the control plane is unreachable: the token is kept
//! and the expiry left unknown.

use crate::api::{ApiClient, ApiError};
use crate::error::StoreError;
use crate::manager::TunnelConfigurationManager;
use crate::settings::AppSettings;

use std::path::Path;
use thiserror::Error;

/// Errors that can occur during login and logout
#[derive(Debug, Error)]
pub enum AccountError {
    /// The control plane rejected the account token
    #[error("The account is invalid")]
    InvalidAccount,

    /// The tunnel configuration could not be prepared or settings saved
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Log in with `account_token`: verify it, prepare its tunnel
/// configuration and mark it as the active account.
pub fn log_in(
    api: &dyn ApiClient,
    manager: &TunnelConfigurationManager,
    settings_path: &Path,
    account_token: &str,
) -> Result<(), AccountError> {
    let expiry = match api.account_expiry(account_token) {
        Ok(expiry) => Some(expiry),
        Err(ApiError::Rpc(error)) => {
            tracing::info!("Account verification rejected: {}", error);
            return Err(AccountError::InvalidAccount);
        }
        Err(ApiError::Transport(error)) => {
            // Deferred verification: keep the token, expiry unknown.
            tracing::info!("Could not verify the account now: {}", error);
            None
        }
    };

    manager.make_or_load(account_token)?;

    let mut settings = AppSettings::load(settings_path)?;
    settings.account_token = Some(account_token.to_string());
    settings.account_expiry = expiry;
    settings.save(settings_path)?;

    Ok(())
}

/// Log out: clear the active account from the shared settings. The stored
/// tunnel configuration is kept so a later login reuses its key.
pub fn log_out(settings_path: &Path) -> Result<(), AccountError> {
    let mut settings = AppSettings::load(settings_path)?;
    settings.account_token = None;
    settings.account_expiry = None;
    settings.save(settings_path)?;
    Ok(())
}
