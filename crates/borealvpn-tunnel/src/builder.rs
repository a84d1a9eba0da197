//! Legacy diagnostic configuration builder
//!
//! A chainable builder over the same `key=value` line protocol, kept for
//! diagnostic dumps and tooling. Unlike the live generator in
//! [`crate::settings`], keys on this path are hex encoded; the two
//! encodings must never be mixed within one output.

use borealvpn_relays::EndpointAddr;
use ipnet::IpNet;

/// Assembles a `key=value` configuration document line by line.
///
/// Lines appear in the order the section methods are invoked within each
/// group: `private_key`, `listen_port`, `replace_peers`, peers,
/// `replace_allowed_ips`, allowed IPs.
#[derive(Default)]
pub struct UapiConfigBuilder {
    private_key: Option<[u8; 32]>,
    listen_port: Option<u16>,
    replace_peers: Option<bool>,
    peers: Vec<(EndpointAddr, [u8; 32])>,
    replace_allowed_ips: Option<bool>,
    allowed_ips: Vec<IpNet>,
}

impl UapiConfigBuilder {
    /// Start an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the local private key (hex on this path)
    pub fn private_key(mut self, key: [u8; 32]) -> Self {
        self.private_key = Some(key);
        self
    }

    /// Set the local listen port
    pub fn listen_port(mut self, port: u16) -> Self {
        self.listen_port = Some(port);
        self
    }

    /// Emit a `replace_peers` directive
    pub fn replace_peers(mut self, value: bool) -> Self {
        self.replace_peers = Some(value);
        self
    }

    /// Add a peer: its endpoint address and public key
    pub fn peer(mut self, endpoint: EndpointAddr, public_key: [u8; 32]) -> Self {
        self.peers.push((endpoint, public_key));
        self
    }

    /// Emit a `replace_allowed_ips` directive
    pub fn replace_allowed_ips(mut self, value: bool) -> Self {
        self.replace_allowed_ips = Some(value);
        self
    }

    /// Add an allowed IP range
    pub fn allowed_ip(mut self, range: IpNet) -> Self {
        self.allowed_ips.push(range);
        self
    }

    /// Produce the configuration text
    pub fn build(self) -> String {
        let mut config = Vec::new();

        if let Some(private_key) = self.private_key {
            config.push(format!("private_key={}", hex::encode(private_key)));
        }

        if let Some(listen_port) = self.listen_port {
            config.push(format!("listen_port={}", listen_port));
        }

        if let Some(replace_peers) = self.replace_peers {
            config.push(format!("replace_peers={}", replace_peers));
        }

        for (endpoint, public_key) in &self.peers {
            config.push(format!("public_key={}", hex::encode(public_key)));
            config.push(format!("endpoint={}", endpoint));
        }

        if let Some(replace_allowed_ips) = self.replace_allowed_ips {
            config.push(format!("replace_allowed_ips={}", replace_allowed_ips));
        }

        for range in &self.allowed_ips {
            config.push(format!("allowed_ip={}", range));
        }

        config.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use borealvpn_relays::Host;

    #[test]
    fn test_full_document() {
        let endpoint = EndpointAddr {
            host: Host::Ipv4("1.2.3.4".parse().unwrap()),
            port: 51820,
        };

        let config = UapiConfigBuilder::new()
            .private_key([1u8; 32])
            .listen_port(0)
            .replace_peers(true)
            .peer(endpoint, [2u8; 32])
            .replace_allowed_ips(true)
            .allowed_ip("0.0.0.0/0".parse().unwrap())
            .build();

        let expected = format!(
            "private_key={}\n\
             listen_port=0\n\
             replace_peers=true\n\
             public_key={}\n\
             endpoint=1.2.3.4:51820\n\
             replace_allowed_ips=true\n\
             allowed_ip=0.0.0.0/0",
            hex::encode([1u8; 32]),
            hex::encode([2u8; 32]),
        );
        assert_eq!(config, expected);
    }

    #[test]
    fn test_sections_are_optional() {
        let endpoint = EndpointAddr {
            host: Host::Ipv6("fc00::1".parse().unwrap()),
            port: 51820,
        };

        let config = UapiConfigBuilder::new().peer(endpoint, [2u8; 32]).build();
        let lines: Vec<&str> = config.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("public_key="));
        assert_eq!(lines[1], "endpoint=[fc00::1]:51820");
    }

    #[test]
    fn test_empty_builder_builds_empty_document() {
        assert_eq!(UapiConfigBuilder::new().build(), "");
    }
}
