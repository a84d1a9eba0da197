//! BorealVPN Tunnel
//!
//! Turns a stored tunnel configuration and a selected relay endpoint into
//! the WireGuard interface configuration text and platform network
//! settings, and drives the tunnel lifecycle: start sequence, network
//! path observation and incremental reconfiguration, stop.

#![warn(missing_docs)]

pub mod backend;
pub mod builder;
pub mod controller;
pub mod error;
pub mod monitor;
pub mod settings;

// Re-exports
pub use backend::{BackendError, WgBackend, WgHandle};
pub use builder::UapiConfigBuilder;
pub use controller::{PlatformError, PlatformTunnel, TunnelLifecycleController, TunnelState};
pub use error::{TunnelError, TunnelResult};
pub use monitor::{NetworkPath, PathMonitor, PathSource, PathStatus, SystemPathSource};
pub use settings::{
    DnsSettings, Ipv4Settings, Ipv6Settings, SettingsGenerator, TunnelNetworkSettings, TUNNEL_MTU,
};
