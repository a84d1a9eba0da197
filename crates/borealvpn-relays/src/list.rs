//! Relay directory model
//!
//! Mirrors the JSON document served by the control plane (`relay_list_v2`).
//! Field names on the wire are camelCase.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr};

/// The full relay directory: an ordered list of countries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayList {
    /// Countries in directory order
    pub countries: Vec<Country>,
}

/// A country and the cities it hosts relays in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Country {
    /// Country name (e.g. "Sweden")
    pub name: String,
    /// Two-letter country code (e.g. "se")
    pub code: String,
    /// Cities in directory order
    pub cities: Vec<City>,
}

/// A city and the relay hosts located there
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct City {
    /// City name (e.g. "Gothenburg")
    pub name: String,
    /// City code (e.g. "got")
    pub code: String,
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Relay hosts in directory order
    pub relays: Vec<Relay>,
}

/// A single relay host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relay {
    /// Unique hostname (e.g. "se-got-001")
    pub hostname: String,
    /// Public IPv4 address accepting tunnel traffic
    pub ipv4_addr_in: Ipv4Addr,
    /// Whether this host participates in country-wide selection
    pub include_in_country: bool,
    /// Relative selection weight. Carried for directory compatibility,
    /// not consulted by the selector.
    pub weight: i32,
    /// Tunnel protocol descriptors, absent for hosts without tunnels
    #[serde(default)]
    pub tunnels: Option<Tunnels>,
}

/// Tunnel descriptors grouped by protocol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tunnels {
    /// WireGuard tunnel descriptors, if the host runs WireGuard
    #[serde(default)]
    pub wireguard: Option<Vec<WireguardTunnel>>,
}

/// A WireGuard tunnel endpoint description on a relay host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireguardTunnel {
    /// In-tunnel IPv4 gateway (also the DNS resolver)
    pub ipv4_gateway: Ipv4Addr,
    /// In-tunnel IPv6 gateway
    pub ipv6_gateway: Ipv6Addr,
    /// The relay's WireGuard public key
    #[serde(with = "wg_key")]
    pub public_key: [u8; 32],
    /// Closed port ranges accepting tunnel traffic. Non-empty when the
    /// descriptor is present.
    pub port_ranges: Vec<PortRange>,
}

/// A closed port range `[first, last]`, serialized as a two-element array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange(pub u16, pub u16);

impl PortRange {
    /// Number of ports in the range (closed on both ends)
    pub fn len(&self) -> u32 {
        u32::from(self.1) - u32::from(self.0) + 1
    }

    /// A closed range is never empty
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether the range contains `port`
    pub fn contains(&self, port: u16) -> bool {
        self.0 <= port && port <= self.1
    }
}

/// Base64 serde for 32-byte WireGuard keys
pub(crate) mod wg_key {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::encode(key))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = base64::decode(&encoded).map_err(D::Error::custom)?;
        let mut key = [0u8; 32];
        if bytes.len() != key.len() {
            return Err(D::Error::custom(format!(
                "expected a {}-byte key, got {} bytes",
                key.len(),
                bytes.len()
            )));
        }
        key.copy_from_slice(&bytes);
        Ok(key)
    }
}
