//! Secure per-account key-value storage
//!
//! Entries are keyed by `(account, fixed service name)` and shared between
//! the application and any auxiliary tunnel process through the platform
//! secure-storage facility. Callers receive an opaque [`StoreRef`]: a
//! non-owning capability token that can later look the value up without
//! re-supplying the account identity. Ownership of the secret stays with
//! the store.

use crate::error::{StoreError, StoreResult};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// The fixed service name scoping all entries of this store
pub const SERVICE_NAME: &str = "net.borealvpn.tunnel-configuration";

/// Opaque persistent handle to one stored entry.
///
/// Encodes the entry's identity, not its payload, so it stays valid across
/// `put` upserts of the same account. Serialized to bytes when handed to
/// the platform VPN profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRef {
    service: String,
    account: String,
}

impl StoreRef {
    fn new(account: &str) -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
            account: account.to_string(),
        }
    }

    /// The account this reference points at
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Encode the reference as opaque bytes for profile metadata
    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a reference previously produced by [`StoreRef::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        let decoded: StoreRef = serde_json::from_slice(bytes)?;
        if decoded.service != SERVICE_NAME {
            return Err(StoreError::Access(format!(
                "reference belongs to foreign service {:?}",
                decoded.service
            )));
        }
        Ok(decoded)
    }
}

/// Per-account secure key-value store
pub trait SecretStore: Send + Sync {
    /// Insert or update the entry for `account`, returning its reference.
    /// An existing entry is updated in place, never duplicated.
    fn put(&self, account: &str, value: &[u8]) -> StoreResult<StoreRef>;

    /// Fetch the entry for `account`, `None` when absent
    fn get(&self, account: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Fetch the entry a reference points at
    fn get_by_ref(&self, store_ref: &StoreRef) -> StoreResult<Vec<u8>>;

    /// Look up the reference for `account` without reading the value
    fn find_ref(&self, account: &str) -> StoreResult<Option<StoreRef>>;

    /// Delete the entry a reference points at
    fn delete(&self, store_ref: &StoreRef) -> StoreResult<()>;
}

/// Secure store backed by the platform keychain/keyring facility.
///
/// Values are UTF-8 JSON documents. Entry sharing between the application
/// and the tunnel process, and the unlocked-since-boot access policy, are
/// properties of the platform facility the service is registered under.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    /// Create a store scoped to the default service name
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
        }
    }

    fn entry(&self, account: &str) -> StoreResult<keyring::Entry> {
        Ok(keyring::Entry::new(&self.service, account)?)
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for KeyringStore {
    fn put(&self, account: &str, value: &[u8]) -> StoreResult<StoreRef> {
        let text = std::str::from_utf8(value)
            .map_err(|_| StoreError::Access("store value is not UTF-8".to_string()))?;

        // set_password is an upsert in every keyring backend.
        self.entry(account)?.set_password(text)?;
        Ok(StoreRef::new(account))
    }

    fn get(&self, account: &str) -> StoreResult<Option<Vec<u8>>> {
        match self.entry(account)?.get_password() {
            Ok(text) => Ok(Some(text.into_bytes())),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    fn get_by_ref(&self, store_ref: &StoreRef) -> StoreResult<Vec<u8>> {
        self.get(&store_ref.account)?.ok_or(StoreError::NotFound)
    }

    fn find_ref(&self, account: &str) -> StoreResult<Option<StoreRef>> {
        Ok(self.get(account)?.map(|_| StoreRef::new(account)))
    }

    fn delete(&self, store_ref: &StoreRef) -> StoreResult<()> {
        self.entry(&store_ref.account)?.delete_password()?;
        Ok(())
    }
}

/// Process-local store for tests and dry runs
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemoryStore {
    fn put(&self, account: &str, value: &[u8]) -> StoreResult<StoreRef> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Access("store mutex poisoned".to_string()))?;
        entries.insert(account.to_string(), value.to_vec());
        Ok(StoreRef::new(account))
    }

    fn get(&self, account: &str) -> StoreResult<Option<Vec<u8>>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Access("store mutex poisoned".to_string()))?;
        Ok(entries.get(account).cloned())
    }

    fn get_by_ref(&self, store_ref: &StoreRef) -> StoreResult<Vec<u8>> {
        self.get(&store_ref.account)?.ok_or(StoreError::NotFound)
    }

    fn find_ref(&self, account: &str) -> StoreResult<Option<StoreRef>> {
        Ok(self.get(account)?.map(|_| StoreRef::new(account)))
    }

    fn delete(&self, store_ref: &StoreRef) -> StoreResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Access("store mutex poisoned".to_string()))?;
        entries
            .remove(&store_ref.account)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}
