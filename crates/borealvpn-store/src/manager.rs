//! Tunnel configuration manager
//!
//! Owns the canonical per-account [`TunnelConfiguration`] and coordinates
//! everything around saving it: persisting to the secure store, pushing
//! the derived public key to the control plane, merging the assigned
//! addresses back into the stored configuration, and propagating the
//! active account's configuration to the platform VPN profile.
//!
//! The manager is constructed explicitly with its collaborators and owns
//! one serialized [`TaskQueue`]. Store mutations and address merges run on
//! that queue; the network round trip of a key push runs on its own
//! short-lived thread so a merge can land after a later configuration
//! write — which is exactly why the merge re-loads the stored
//! configuration instead of overwriting it blindly.

use crate::api::{ApiClient, WireguardKeyRequest};
use crate::config::TunnelConfiguration;
use crate::error::{StoreError, StoreResult};
use crate::queue::TaskQueue;
use crate::secrets::SecretStore;
use crate::settings::AppSettings;

use borealvpn_relays::RelayConstraint;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use thiserror::Error;

/// Display address handed to the VPN profile. Relay selection happens at
/// tunnel start, so no single server address exists yet.
const PROFILE_SERVER_ADDRESS: &str = "Multiple";

/// Failure reported by the platform VPN profile collaborator
#[derive(Debug, Error)]
#[error("VPN profile error: {0}")]
pub struct ProfileError(pub String);

/// The platform VPN profile this core propagates configuration to.
///
/// Receives an opaque store reference and a display string; raw secrets
/// never enter profile metadata.
pub trait VpnProfile: Send + Sync {
    /// Point the profile at the given stored configuration and (re)start it
    fn reconfigure_and_start(
        &self,
        store_ref: &[u8],
        server_address: &str,
    ) -> Result<(), ProfileError>;
}

/// Coordinates persistence, key push, address merge and profile updates
/// for per-account tunnel configurations
pub struct TunnelConfigurationManager {
    store: Arc<dyn SecretStore>,
    api: Arc<dyn ApiClient>,
    profile: Arc<dyn VpnProfile>,
    settings_path: PathBuf,
    queue: Arc<TaskQueue>,
    push_threads: Mutex<Vec<JoinHandle<()>>>,
}

impl TunnelConfigurationManager {
    /// Create a manager bound to its collaborators. Construct once at
    /// process start; dropping it drains outstanding background work.
    pub fn new(
        store: Arc<dyn SecretStore>,
        api: Arc<dyn ApiClient>,
        profile: Arc<dyn VpnProfile>,
        settings_path: PathBuf,
    ) -> Self {
        Self {
            store,
            api,
            profile,
            settings_path,
            queue: Arc::new(TaskQueue::new("tunnel-config-queue")),
            push_threads: Mutex::new(Vec::new()),
        }
    }

    /// Load the stored configuration for `account_token`
    pub fn get_configuration(&self, account_token: &str) -> StoreResult<TunnelConfiguration> {
        let value = self
            .store
            .get(account_token)?
            .ok_or(StoreError::NotFound)?;
        Ok(serde_json::from_slice(&value)?)
    }

    /// Load the configuration for `account_token`, creating and persisting
    /// one with a fresh private key and the default constraint when none
    /// exists yet
    pub fn make_or_load(&self, account_token: &str) -> StoreResult<TunnelConfiguration> {
        match self.get_configuration(account_token) {
            Ok(config) => Ok(config),
            Err(StoreError::NotFound) => {
                let config = TunnelConfiguration::with_account(account_token);
                self.save_configuration(&config)?;
                Ok(config)
            }
            Err(error) => Err(error),
        }
    }

    /// Update the relay constraint of an existing configuration.
    ///
    /// The configuration must already exist for this account; a missing
    /// entry is an error, never an implicit creation.
    pub fn update_constraint(
        &self,
        account_token: &str,
        constraint: RelayConstraint,
    ) -> StoreResult<()> {
        let mut config = self.get_configuration(account_token)?;
        config.relay_constraint = constraint;
        self.save_configuration(&config)
    }

    /// Persist `config` and kick off the asynchronous key push.
    ///
    /// Store and codec errors of the persist step surface here. The key
    /// push pipeline is fire-and-forget: once the local save succeeded it
    /// is the source of truth, so pipeline failures are logged only.
    pub fn save_configuration(&self, config: &TunnelConfiguration) -> StoreResult<()> {
        let value = serde_json::to_vec(config)?;
        let account = config.account_token.clone();

        let store = Arc::clone(&self.store);
        self.queue
            .run(move || store.put(&account, &value).map(|_| ()))
            .ok_or(StoreError::QueueGone)??;

        self.enqueue_key_push(
            config.account_token.clone(),
            config.interface.private_key.public_key(),
        );
        Ok(())
    }

    /// Remove the stored configuration for `account_token`
    pub fn delete_configuration(&self, account_token: &str) -> StoreResult<()> {
        let store = Arc::clone(&self.store);
        let account = account_token.to_string();
        self.queue
            .run(move || match store.find_ref(&account)? {
                Some(store_ref) => store.delete(&store_ref),
                None => Err(StoreError::NotFound),
            })
            .ok_or(StoreError::QueueGone)?
    }

    /// Block until every background key push and merge enqueued so far has
    /// finished. Intended for orderly shutdown and tests.
    pub fn flush(&self) {
        let threads = match self.push_threads.lock() {
            Ok(mut threads) => threads.split_off(0),
            Err(_) => return,
        };
        for thread in threads {
            let _ = thread.join();
        }
        self.queue.flush();
    }

    fn enqueue_key_push(&self, account_token: String, public_key: [u8; 32]) {
        let api = Arc::clone(&self.api);
        let store = Arc::clone(&self.store);
        let profile = Arc::clone(&self.profile);
        let queue = Arc::clone(&self.queue);
        let settings_path = self.settings_path.clone();

        let thread = std::thread::Builder::new()
            .name("wg-key-push".to_string())
            .spawn(move || {
                let request = WireguardKeyRequest {
                    account_token: account_token.clone(),
                    public_key,
                };

                let addresses = match api.push_wg_key(&request) {
                    Ok(addresses) => addresses,
                    Err(error) => {
                        tracing::error!(
                            "Failed to push the WireGuard key: {}",
                            error
                        );
                        return;
                    }
                };

                // Merge on the serialized queue, alongside all other store
                // mutations.
                queue.spawn(move || {
                    if let Err(error) = merge_associated_addresses(
                        &*store,
                        &*profile,
                        &settings_path,
                        &account_token,
                        addresses,
                    ) {
                        tracing::error!(
                            "Failed to merge the assigned tunnel addresses: {}",
                            error
                        );
                    }
                });
            });

        match thread {
            Ok(handle) => {
                if let Ok(mut threads) = self.push_threads.lock() {
                    threads.retain(|thread| !thread.is_finished());
                    threads.push(handle);
                }
            }
            Err(error) => tracing::error!("Failed to spawn key push thread: {}", error),
        }
    }
}

impl Drop for TunnelConfigurationManager {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Re-load the stored configuration and fold the assigned addresses into
/// it. The push was asynchronous, so the stored configuration may have
/// changed since it was initiated; only `interface.addresses` is touched.
fn merge_associated_addresses(
    store: &dyn SecretStore,
    profile: &dyn VpnProfile,
    settings_path: &std::path::Path,
    account_token: &str,
    addresses: crate::api::WireguardAssociatedAddresses,
) -> StoreResult<()> {
    let value = store.get(account_token)?.ok_or(StoreError::NotFound)?;
    let mut config: TunnelConfiguration = serde_json::from_slice(&value)?;

    config.interface.addresses = vec![addresses.ipv4_address, addresses.ipv6_address];
    store.put(account_token, &serde_json::to_vec(&config)?)?;

    tracing::debug!(
        "Merged assigned addresses for account ending in …{}",
        &account_token[account_token.len().saturating_sub(4)..]
    );

    // Only the active account's configuration reaches the VPN profile.
    let settings = AppSettings::load(settings_path)?;
    if settings.account_token.as_deref() != Some(account_token) {
        return Ok(());
    }

    let store_ref = store
        .find_ref(account_token)?
        .ok_or(StoreError::NotFound)?;
    if let Err(error) =
        profile.reconfigure_and_start(&store_ref.to_bytes()?, PROFILE_SERVER_ADDRESS)
    {
        tracing::error!("Failed to update the VPN profile: {}", error);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, WireguardAssociatedAddresses};
    use crate::secrets::MemoryStore;
    use chrono::{DateTime, Utc};
    use std::sync::mpsc;

    struct StubApi {
        gate: Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl StubApi {
        fn immediate() -> Self {
            Self {
                gate: Mutex::new(None),
            }
        }

        /// An API whose push blocks until the returned sender fires
        fn gated() -> (Self, mpsc::Sender<()>) {
            let (sender, receiver) = mpsc::channel();
            (
                Self {
                    gate: Mutex::new(Some(receiver)),
                },
                sender,
            )
        }
    }

    impl ApiClient for StubApi {
        fn relay_list(&self) -> Result<borealvpn_relays::RelayList, ApiError> {
            Err(ApiError::Transport("not wired".into()))
        }

        fn account_expiry(&self, _account_token: &str) -> Result<DateTime<Utc>, ApiError> {
            Err(ApiError::Transport("not wired".into()))
        }

        fn push_wg_key(
            &self,
            _request: &WireguardKeyRequest,
        ) -> Result<WireguardAssociatedAddresses, ApiError> {
            if let Some(gate) = self.gate.lock().unwrap().as_ref() {
                let _ = gate.recv();
            }
            Ok(WireguardAssociatedAddresses {
                ipv4_address: "10.64.10.1/32".parse().unwrap(),
                ipv6_address: "fc00:bbbb:bbbb:bb01::3/128".parse().unwrap(),
            })
        }

        fn check_wg_key(&self, _request: &WireguardKeyRequest) -> Result<bool, ApiError> {
            Ok(true)
        }
    }

    #[derive(Default)]
    struct RecordingProfile {
        updates: Mutex<Vec<(Vec<u8>, String)>>,
    }

    impl VpnProfile for RecordingProfile {
        fn reconfigure_and_start(
            &self,
            store_ref: &[u8],
            server_address: &str,
        ) -> Result<(), ProfileError> {
            self.updates
                .lock()
                .unwrap()
                .push((store_ref.to_vec(), server_address.to_string()));
            Ok(())
        }
    }

    struct Fixture {
        manager: TunnelConfigurationManager,
        profile: Arc<RecordingProfile>,
        _settings_dir: tempfile::TempDir,
    }

    fn fixture_with_api(api: Arc<dyn ApiClient>, active_account: Option<&str>) -> Fixture {
        let settings_dir = tempfile::tempdir().unwrap();
        let settings_path = settings_dir.path().join("settings.toml");

        if let Some(account) = active_account {
            AppSettings {
                account_token: Some(account.to_string()),
                account_expiry: None,
            }
            .save(&settings_path)
            .unwrap();
        }

        let profile = Arc::new(RecordingProfile::default());
        let manager = TunnelConfigurationManager::new(
            Arc::new(MemoryStore::new()),
            api,
            Arc::clone(&profile) as Arc<dyn VpnProfile>,
            settings_path,
        );

        Fixture {
            manager,
            profile,
            _settings_dir: settings_dir,
        }
    }

    #[test]
    fn test_make_or_load_creates_then_reuses() {
        let fixture = fixture_with_api(Arc::new(StubApi::immediate()), None);

        let created = fixture.manager.make_or_load("1234567890").unwrap();
        let loaded = fixture.manager.make_or_load("1234567890").unwrap();

        assert_eq!(created.interface.private_key, loaded.interface.private_key);
        assert_eq!(loaded.relay_constraint, RelayConstraint::Any);
    }

    #[test]
    fn test_update_constraint_requires_existing_config() {
        let fixture = fixture_with_api(Arc::new(StubApi::immediate()), None);

        let result = fixture
            .manager
            .update_constraint("1234567890", RelayConstraint::Country("se".into()));
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[test]
    fn test_addresses_merged_after_key_push() {
        let fixture = fixture_with_api(Arc::new(StubApi::immediate()), None);

        fixture.manager.make_or_load("1234567890").unwrap();
        fixture.manager.flush();

        let config = fixture.manager.get_configuration("1234567890").unwrap();
        assert_eq!(config.interface.addresses.len(), 2);
        assert_eq!(
            config.interface.addresses[0].to_string(),
            "10.64.10.1/32"
        );
    }

    #[test]
    fn test_profile_updated_only_for_active_account() {
        let fixture = fixture_with_api(Arc::new(StubApi::immediate()), Some("1234567890"));

        fixture.manager.make_or_load("1234567890").unwrap();
        fixture.manager.flush();

        let updates = fixture.profile.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].1, "Multiple");

        // The profile receives the reference, never the configuration.
        let text = String::from_utf8(updates[0].0.clone()).unwrap();
        assert!(!text.contains("privateKey"));
    }

    #[test]
    fn test_profile_not_updated_for_inactive_account() {
        let fixture = fixture_with_api(Arc::new(StubApi::immediate()), Some("somebody-else"));

        fixture.manager.make_or_load("1234567890").unwrap();
        fixture.manager.flush();

        assert!(fixture.profile.updates.lock().unwrap().is_empty());
    }

    #[test]
    fn test_late_merge_does_not_clobber_newer_constraint() {
        // Two saves in quick succession. The first save's address merge is
        // held back until after the second save's store write; the final
        // stored configuration must keep the second constraint.
        let (api, release_push) = StubApi::gated();
        let fixture = fixture_with_api(Arc::new(api), None);

        fixture.manager.make_or_load("1234567890").unwrap();
        fixture
            .manager
            .update_constraint("1234567890", RelayConstraint::City("se".into(), "got".into()))
            .unwrap();

        // Both pushes are now in flight; the second store write has
        // already landed. Let the pushes complete.
        release_push.send(()).unwrap();
        release_push.send(()).unwrap();
        fixture.manager.flush();

        let config = fixture.manager.get_configuration("1234567890").unwrap();
        assert_eq!(
            config.relay_constraint,
            RelayConstraint::City("se".into(), "got".into())
        );
        assert_eq!(config.interface.addresses.len(), 2);
    }

    #[test]
    fn test_push_failure_keeps_local_save() {
        struct FailingApi;
        impl ApiClient for FailingApi {
            fn relay_list(&self) -> Result<borealvpn_relays::RelayList, ApiError> {
                Err(ApiError::Transport("offline".into()))
            }
            fn account_expiry(&self, _: &str) -> Result<DateTime<Utc>, ApiError> {
                Err(ApiError::Transport("offline".into()))
            }
            fn push_wg_key(
                &self,
                _: &WireguardKeyRequest,
            ) -> Result<WireguardAssociatedAddresses, ApiError> {
                Err(ApiError::Transport("offline".into()))
            }
            fn check_wg_key(&self, _: &WireguardKeyRequest) -> Result<bool, ApiError> {
                Err(ApiError::Transport("offline".into()))
            }
        }

        let fixture = fixture_with_api(Arc::new(FailingApi), None);

        fixture.manager.make_or_load("1234567890").unwrap();
        fixture.manager.flush();

        // The save succeeded even though the push never did.
        let config = fixture.manager.get_configuration("1234567890").unwrap();
        assert!(config.interface.addresses.is_empty());
    }

    #[test]
    fn test_delete_configuration() {
        let fixture = fixture_with_api(Arc::new(StubApi::immediate()), None);

        fixture.manager.make_or_load("1234567890").unwrap();
        fixture.manager.flush();
        fixture.manager.delete_configuration("1234567890").unwrap();

        assert!(matches!(
            fixture.manager.get_configuration("1234567890"),
            Err(StoreError::NotFound)
        ));
    }
}
