//! BorealVPN Configuration Store
//!
//! Per-account tunnel configuration persisted in a platform secure store,
//! the manager that coordinates saving it, pushing the derived public key
//! to the control plane and merging the assigned addresses back, plus the
//! shared application settings and the control-plane wire types.

#![warn(missing_docs)]

pub mod account;
pub mod api;
pub mod config;
pub mod error;
pub mod manager;
pub mod queue;
pub mod secrets;
pub mod settings;

// Re-exports
pub use account::{log_in, log_out, AccountError};
pub use api::{
    ApiClient, ApiError, JsonRpcRequest, JsonRpcResponse, WireguardAssociatedAddresses,
    WireguardKeyRequest,
};
pub use config::{InterfaceConfig, PrivateKey, TunnelConfiguration};
pub use error::{StoreError, StoreResult};
pub use manager::{ProfileError, TunnelConfigurationManager, VpnProfile};
pub use queue::TaskQueue;
pub use secrets::{KeyringStore, MemoryStore, SecretStore, StoreRef, SERVICE_NAME};
pub use settings::{default_settings_path, AppSettings};
