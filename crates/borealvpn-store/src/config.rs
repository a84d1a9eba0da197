//! Per-account tunnel configuration
//!
//! The JSON-encoded form of [`TunnelConfiguration`] is what lives in the
//! secure store, so the field names here are a persistence format.

use borealvpn_relays::RelayConstraint;

use ipnet::IpNet;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

/// A WireGuard X25519 private key.
///
/// Serialized as base64; key material is zeroized when dropped.
#[derive(Clone)]
pub struct PrivateKey {
    secret: StaticSecret,
}

impl PrivateKey {
    /// Generate a fresh random private key
    pub fn new() -> Self {
        Self {
            secret: StaticSecret::random_from_rng(rand::rngs::OsRng),
        }
    }

    /// Wrap existing key material
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self {
            secret: StaticSecret::from(bytes),
        }
    }

    /// The raw private key bytes
    pub fn to_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Derive the corresponding public key
    pub fn public_key(&self) -> [u8; 32] {
        PublicKey::from(&self.secret).to_bytes()
    }
}

impl Default for PrivateKey {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for PrivateKey {}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never log private key material; the public key identifies it.
        write!(f, "PrivateKey(pub {})", base64::encode(self.public_key()))
    }
}

impl Serialize for PrivateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let bytes = Zeroizing::new(self.to_bytes());
        serializer.serialize_str(&base64::encode(bytes.as_ref()))
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let decoded = Zeroizing::new(base64::decode(&encoded).map_err(D::Error::custom)?);
        if decoded.len() != 32 {
            return Err(D::Error::custom(format!(
                "expected a 32-byte private key, got {} bytes",
                decoded.len()
            )));
        }
        let mut bytes = Zeroizing::new([0u8; 32]);
        bytes.copy_from_slice(&decoded);
        Ok(Self::from_bytes(*bytes))
    }
}

/// Local tunnel interface configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceConfig {
    /// The account's WireGuard private key
    pub private_key: PrivateKey,
    /// In-tunnel addresses assigned by the control plane. Empty until the
    /// first successful key push for this account.
    pub addresses: Vec<IpNet>,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            private_key: PrivateKey::new(),
            addresses: Vec::new(),
        }
    }
}

/// The canonical per-account tunnel configuration.
///
/// Exactly one live copy per account is authoritative in the secure store.
/// Mutated only by creation, constraint updates and address assignment
/// after a successful key push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelConfiguration {
    /// The account this configuration belongs to
    pub account_token: String,
    /// The user's relay location constraint
    pub relay_constraint: RelayConstraint,
    /// Local interface parameters
    pub interface: InterfaceConfig,
}

impl TunnelConfiguration {
    /// A new configuration with a fresh private key and the default
    /// unconstrained relay selection
    pub fn with_account(account_token: &str) -> Self {
        Self {
            account_token: account_token.to_string(),
            relay_constraint: RelayConstraint::default(),
            interface: InterfaceConfig::default(),
        }
    }
}
