//! Tunnel lifecycle error types

use borealvpn_relays::RelayError;
use thiserror::Error;

/// Result type for tunnel lifecycle operations
pub type TunnelResult<T> = Result<T, TunnelError>;

/// Errors fatal to one tunnel start attempt.
///
/// Every step of the start sequence maps to a distinct kind; a failure
/// aborts the sequence without attempting later steps and is surfaced to
/// whoever requested the start. No retries happen here.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// The profile does not reference a decodable tunnel configuration
    #[error("The profile does not contain a valid tunnel configuration")]
    InvalidProfileConfiguration,

    /// The relay directory cache could not be read
    #[error("Failed to read the relay cache: {0}")]
    ReadRelayCache(#[from] RelayError),

    /// The constraint matched no relay with a usable tunnel and port
    #[error("No relay satisfies the location constraint")]
    NoEligibleRelay,

    /// The platform refused the requested tunnel network settings
    #[error("Failed to apply the tunnel network settings: {0}")]
    NetworkSettingsRejected(String),

    /// The tunnel virtual interface could not be located after the
    /// network settings were applied
    #[error("The tunnel interface descriptor was not found")]
    InterfaceNotFound,

    /// The backend rejected the generated configuration
    #[error("The WireGuard backend failed to start: {0}")]
    BackendStartFailure(#[source] crate::backend::BackendError),
}
