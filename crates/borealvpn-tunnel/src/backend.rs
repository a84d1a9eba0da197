//! WireGuard backend contract
//!
//! The data-plane backend (key agreement, handshake, packet encryption)
//! is an external collaborator. This core hands it configuration text in
//! the line-oriented `key=value` protocol and signals it about socket
//! rebinds and teardown; it never implements the protocol engine.

use thiserror::Error;

/// Identifies one running backend tunnel instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WgHandle(pub i32);

/// Failure reported by the backend
#[derive(Debug, Error)]
#[error("backend returned status {status}")]
pub struct BackendError {
    /// Backend-specific status code
    pub status: i32,
}

/// Operations the tunnel controller invokes on the backend.
///
/// `set_config` and `bump_sockets` may be called redundantly while the
/// tunnel is running and must be safe to issue as no-ops.
pub trait WgBackend: Send + Sync {
    /// Start the backend with a full interface configuration
    fn turn_on(&self, uapi_config: &str) -> Result<WgHandle, BackendError>;

    /// Apply an incremental configuration update to a running instance
    fn set_config(&self, handle: WgHandle, uapi_config: &str) -> Result<(), BackendError>;

    /// Ask the backend to rebind its sockets after an interface change
    fn bump_sockets(&self, handle: WgHandle);

    /// Tear the instance down. The handle is discarded afterwards.
    fn turn_off(&self, handle: WgHandle);
}
