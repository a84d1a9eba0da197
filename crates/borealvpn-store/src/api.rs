//! Control-plane API contract
//!
//! The wire shapes of the JSON-RPC style control-plane API and the client
//! trait this core consumes. The HTTP/TLS transport is an external
//! collaborator and is not implemented here; retry policy lives with it
//! as well.

use borealvpn_relays::RelayList;

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// RPC method fetching the relay directory
pub const METHOD_RELAY_LIST: &str = "relay_list_v2";
/// RPC method fetching account expiry
pub const METHOD_GET_EXPIRY: &str = "get_expiry";
/// RPC method registering a WireGuard public key for an account
pub const METHOD_PUSH_WG_KEY: &str = "push_wg_key";
/// RPC method checking whether a key is registered for an account
pub const METHOD_CHECK_WG_KEY: &str = "check_wg_key";

/// A JSON-RPC request envelope
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    /// Protocol version, always "2.0"
    pub jsonrpc: &'static str,
    /// Request identifier echoed back in the response
    pub id: u64,
    /// Method name
    pub method: String,
    /// Positional parameters
    pub params: Vec<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Build a request envelope for `method`
    pub fn new(id: u64, method: &str, params: Vec<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// A JSON-RPC response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse<T> {
    /// Successful result, mutually exclusive with `error`
    pub result: Option<T>,
    /// RPC-level failure
    pub error: Option<JsonRpcError>,
}

/// An RPC-level error object
#[derive(Debug, Clone, Deserialize, Error)]
#[error("RPC error {code}: {message}")]
pub struct JsonRpcError {
    /// Numeric error code
    pub code: i64,
    /// Human-readable message
    pub message: String,
}

impl<T> JsonRpcResponse<T> {
    /// Collapse the envelope into a result
    pub fn into_result(self) -> Result<T, ApiError> {
        match (self.result, self.error) {
            (Some(result), None) => Ok(result),
            (_, Some(error)) => Err(ApiError::Rpc(error)),
            (None, None) => Err(ApiError::Transport(
                "response carries neither result nor error".to_string(),
            )),
        }
    }
}

/// Request shape for `push_wg_key` and `check_wg_key`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireguardKeyRequest {
    /// The account registering the key
    pub account_token: String,
    /// The WireGuard public key, base64 on the wire
    #[serde(with = "wg_key_serde")]
    pub public_key: [u8; 32],
}

/// Response shape of a successful `push_wg_key`: the in-tunnel addresses
/// assigned to the pushed key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireguardAssociatedAddresses {
    /// Assigned in-tunnel IPv4 address range
    pub ipv4_address: IpNet,
    /// Assigned in-tunnel IPv6 address range
    pub ipv6_address: IpNet,
}

/// Errors surfaced by the control-plane client
#[derive(Debug, Error)]
pub enum ApiError {
    /// The RPC completed and reported a failure
    #[error(transparent)]
    Rpc(JsonRpcError),

    /// The request never completed
    #[error("Control plane transport failure: {0}")]
    Transport(String),
}

/// The control-plane operations this core consumes
pub trait ApiClient: Send + Sync {
    /// Fetch the current relay directory
    fn relay_list(&self) -> Result<RelayList, ApiError>;

    /// Fetch the expiry timestamp of an account
    fn account_expiry(&self, account_token: &str) -> Result<DateTime<Utc>, ApiError>;

    /// Register a public key, receiving the addresses assigned to it
    fn push_wg_key(
        &self,
        request: &WireguardKeyRequest,
    ) -> Result<WireguardAssociatedAddresses, ApiError>;

    /// Check whether a key is currently registered for an account
    fn check_wg_key(&self, request: &WireguardKeyRequest) -> Result<bool, ApiError>;
}

mod wg_key_serde {
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
            return Err(D::Error::custom("expected a 32-byte key"));
        }
        key.copy_from_slice(&bytes);
        Ok(key)
    }
}
