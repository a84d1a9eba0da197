//! Tunnel lifecycle controller
//!
//! Drives one tunnel through `Stopped -> Starting -> Running -> Stopping
//! -> Stopped`. The start sequence is strictly ordered and every step
//! failure maps to its own [`TunnelError`] kind, aborts the attempt and
//! returns the controller to `Stopped` — no retries happen here. While
//! running, a network path monitor re-affirms the peer endpoint on every
//! satisfied path update and asks the backend to rebind its sockets when
//! the set of non-tunnel interfaces changes.

use crate::backend::{WgBackend, WgHandle};
use crate::error::{TunnelError, TunnelResult};
use crate::monitor::{NetworkPath, PathMonitor, PathSource, PathStatus};
use crate::settings::{SettingsGenerator, TunnelNetworkSettings};

use borealvpn_relays::{RelayListCache, RelaySelector};
use borealvpn_store::{SecretStore, StoreRef, TunnelConfiguration};

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by the platform tunnel collaborator
#[derive(Debug, Error)]
#[error("{0}")]
pub struct PlatformError(pub String);

/// The platform facilities the controller drives during a start:
/// applying network settings and locating the virtual interface.
pub trait PlatformTunnel: Send + Sync {
    /// Apply the tunnel network settings
    fn apply_network_settings(
        &self,
        settings: &TunnelNetworkSettings,
    ) -> Result<(), PlatformError>;

    /// Name of the tunnel's virtual interface, once settings are applied
    fn tunnel_interface_name(&self) -> Option<String>;
}

/// Lifecycle states of the tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    /// No tunnel is running
    Stopped,
    /// The start sequence is executing
    Starting,
    /// The backend is up and the path monitor active
    Running,
    /// Teardown is in progress
    Stopping,
}

/// Drives tunnel start/stop and live reconfiguration
pub struct TunnelLifecycleController {
    store: Arc<dyn SecretStore>,
    platform: Arc<dyn PlatformTunnel>,
    backend: Arc<dyn WgBackend>,
    cache_path: PathBuf,
    state: TunnelState,
    handle: Option<WgHandle>,
    monitor: Option<PathMonitor>,
}

impl TunnelLifecycleController {
    /// Create a stopped controller bound to its collaborators
    pub fn new(
        store: Arc<dyn SecretStore>,
        platform: Arc<dyn PlatformTunnel>,
        backend: Arc<dyn WgBackend>,
        cache_path: PathBuf,
    ) -> Self {
        Self {
            store,
            platform,
            backend,
            cache_path,
            state: TunnelState::Stopped,
            handle: None,
            monitor: None,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> TunnelState {
        self.state
    }

    /// Run the start sequence: load the configuration the profile points
    /// at, resolve a relay, apply network settings, locate the interface
    /// and hand the configuration to the backend. Any failure is fatal to
    /// this attempt and leaves the controller stopped.
    pub fn start<S: PathSource>(
        &mut self,
        profile_ref: &[u8],
        path_source: S,
    ) -> TunnelResult<()> {
        tracing::info!("Starting the tunnel");
        self.state = TunnelState::Starting;

        match self.run_start_sequence(profile_ref, path_source) {
            Ok(()) => {
                self.state = TunnelState::Running;
                Ok(())
            }
            Err(error) => {
                tracing::error!("Tunnel start failed: {}", error);
                self.state = TunnelState::Stopped;
                Err(error)
            }
        }
    }

    fn run_start_sequence<S: PathSource>(
        &mut self,
        profile_ref: &[u8],
        path_source: S,
    ) -> TunnelResult<()> {
        // 1. The profile hands us an opaque store reference, never the
        //    configuration itself.
        let config = self.load_profile_configuration(profile_ref)?;

        // 2. Selection always runs against the cached directory; keeping
        //    it fresh is the API client's concern.
        let cache = RelayListCache::read(&self.cache_path)?;

        // 3.
        let selector = RelaySelector::new(cache.relay_list);
        let endpoint = selector
            .evaluate(&config.relay_constraint, &mut rand::thread_rng())
            .ok_or(TunnelError::NoEligibleRelay)?;
        tracing::info!("Selected relay endpoint {}", endpoint);

        let generator = SettingsGenerator {
            config: &config,
            endpoint: &endpoint,
        };

        // 4.
        self.platform
            .apply_network_settings(&generator.network_settings())
            .map_err(|error| TunnelError::NetworkSettingsRejected(error.to_string()))?;

        // 5.
        let interface_name = self
            .platform
            .tunnel_interface_name()
            .ok_or(TunnelError::InterfaceNotFound)?;
        tracing::info!("Tunnel interface is {}", interface_name);

        // 6.
        let handle = self
            .backend
            .turn_on(&generator.uapi_configuration())
            .map_err(TunnelError::BackendStartFailure)?;
        self.handle = Some(handle);

        self.monitor = Some(self.spawn_path_monitor(
            path_source,
            handle,
            generator.endpoint_uapi_configuration(),
            interface_name,
        ));

        Ok(())
    }

    fn load_profile_configuration(
        &self,
        profile_ref: &[u8],
    ) -> TunnelResult<TunnelConfiguration> {
        let store_ref = StoreRef::from_bytes(profile_ref)
            .map_err(|_| TunnelError::InvalidProfileConfiguration)?;
        let value = self
            .store
            .get_by_ref(&store_ref)
            .map_err(|_| TunnelError::InvalidProfileConfiguration)?;
        serde_json::from_slice(&value).map_err(|_| TunnelError::InvalidProfileConfiguration)
    }

    fn spawn_path_monitor<S: PathSource>(
        &self,
        path_source: S,
        handle: WgHandle,
        peer_config: String,
        tunnel_interface: String,
    ) -> PathMonitor {
        let backend = Arc::clone(&self.backend);
        // Handler state lives on the monitor thread; events never touch
        // the serialized configuration queue.
        let mut last_seen_interfaces: Vec<String> = Vec::new();

        PathMonitor::start(path_source, move |path: &NetworkPath| {
            if path.status != PathStatus::Satisfied {
                return;
            }

            // Cheap re-affirmation of the peer endpoint; the backend
            // treats a repeat as a no-op.
            if let Err(error) = backend.set_config(handle, &peer_config) {
                tracing::warn!("Peer reconfiguration failed: {}", error);
            }

            let interfaces: Vec<String> = path
                .interfaces
                .iter()
                .filter(|name| **name != tunnel_interface)
                .cloned()
                .collect();

            if interfaces != last_seen_interfaces {
                last_seen_interfaces = interfaces;
                tracing::info!("Interface set changed, rebinding backend sockets");
                backend.bump_sockets(handle);
            }
        })
    }

    /// Stop the tunnel: cancel the path monitor first, so no
    /// reconfiguration can race the teardown, then tear down the backend.
    pub fn stop(&mut self) {
        tracing::info!("Stopping the tunnel");
        self.state = TunnelState::Stopping;

        if let Some(mut monitor) = self.monitor.take() {
            monitor.cancel();
        }

        if let Some(handle) = self.handle.take() {
            self.backend.turn_off(handle);
        }

        self.state = TunnelState::Stopped;
    }
}

impl Drop for TunnelLifecycleController {
    fn drop(&mut self) {
        if self.state == TunnelState::Running || self.state == TunnelState::Starting {
            self.stop();
        }
    }
}
