//! Interface configuration and network settings generation
//!
//! [`SettingsGenerator`] produces the two configuration surfaces consumed
//! at tunnel start and during live reconfiguration: the WireGuard
//! `key=value` text protocol handed to the backend, and the
//! platform-neutral network settings (addresses, routes, DNS) applied to
//! the virtual interface.
//!
//! Line order in the text protocol is significant and fixed:
//! `private_key`, `listen_port`, `replace_peers`, then per peer
//! `public_key` + `endpoint`, then `replace_allowed_ips` and one
//! `allowed_ip` per range. Keys on this path are base64, matching the
//! live backend API; the hex encoding is reserved for the diagnostic
//! builder in [`crate::builder`].

use borealvpn_relays::RelayEndpoint;
use borealvpn_store::TunnelConfiguration;

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::net::IpAddr;
use zeroize::Zeroizing;

/// MTU used for the tunnel interface
pub const TUNNEL_MTU: u16 = 1280;

/// DNS resolver configuration for the tunnel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsSettings {
    /// Resolver addresses, the in-tunnel gateways
    pub servers: Vec<IpAddr>,
    /// Match-all so every query goes through the tunnel resolver
    pub match_all_domains: bool,
}

/// IPv4 side of the tunnel network settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Settings {
    /// Interface addresses with their prefixes
    pub addresses: Vec<Ipv4Net>,
    /// Routes directed into the tunnel
    pub included_routes: Vec<Ipv4Net>,
    /// Routes kept outside the tunnel
    pub excluded_routes: Vec<Ipv4Net>,
}

/// IPv6 side of the tunnel network settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv6Settings {
    /// Interface addresses with their prefixes
    pub addresses: Vec<Ipv6Net>,
    /// Routes directed into the tunnel
    pub included_routes: Vec<Ipv6Net>,
    /// Routes kept outside the tunnel
    pub excluded_routes: Vec<Ipv6Net>,
}

/// Platform-neutral network settings for the tunnel interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelNetworkSettings {
    /// The relay's address, used as the settings' remote endpoint
    pub remote_address: IpAddr,
    /// Interface MTU
    pub mtu: u16,
    /// DNS configuration
    pub dns: DnsSettings,
    /// IPv4 configuration
    pub ipv4: Ipv4Settings,
    /// IPv6 configuration
    pub ipv6: Ipv6Settings,
}

/// Generates backend and platform configuration for one tunnel session
pub struct SettingsGenerator<'a> {
    /// The account's stored tunnel configuration
    pub config: &'a TunnelConfiguration,
    /// The endpoint resolved for this session
    pub endpoint: &'a RelayEndpoint,
}

impl SettingsGenerator<'_> {
    /// The full interface configuration handed to the backend at start.
    /// Keys are base64 on this path.
    pub fn uapi_configuration(&self) -> String {
        let private_key = Zeroizing::new(self.config.interface.private_key.to_bytes());

        let mut config = Vec::new();
        config.push(format!("private_key={}", base64::encode(private_key.as_ref())));
        config.push("listen_port=0".to_string());
        config.push("replace_peers=true".to_string());
        config.push(format!(
            "public_key={}",
            base64::encode(self.endpoint.public_key)
        ));
        config.push(format!("endpoint={}", self.endpoint.endpoint_addr()));
        config.push("replace_allowed_ips=true".to_string());
        config.push("allowed_ip=0.0.0.0/0".to_string());

        config.join("\n")
    }

    /// The incremental peer update used for live reconfiguration.
    ///
    /// Deliberately carries no `replace_peers` line: the backend treats a
    /// bare peer block as an update-in-place of the peer identified by
    /// the public key, leaving the private key and allowed-IP set alone.
    pub fn endpoint_uapi_configuration(&self) -> String {
        let mut config = Vec::new();
        config.push(format!(
            "public_key={}",
            base64::encode(self.endpoint.public_key)
        ));
        config.push(format!("endpoint={}", self.endpoint.endpoint_addr()));

        config.join("\n")
    }

    /// The network settings applied to the virtual interface
    pub fn network_settings(&self) -> TunnelNetworkSettings {
        TunnelNetworkSettings {
            remote_address: IpAddr::V4(self.endpoint.address),
            mtu: TUNNEL_MTU,
            dns: self.dns_settings(),
            ipv4: self.ipv4_settings(),
            ipv6: self.ipv6_settings(),
        }
    }

    fn dns_settings(&self) -> DnsSettings {
        DnsSettings {
            servers: vec![
                IpAddr::V4(self.endpoint.ipv4_gateway),
                IpAddr::V6(self.endpoint.ipv6_gateway),
            ],
            match_all_domains: true,
        }
    }

    fn ipv4_settings(&self) -> Ipv4Settings {
        let addresses = self
            .config
            .interface
            .addresses
            .iter()
            .filter_map(|net| match net {
                IpNet::V4(net) => Some(*net),
                IpNet::V6(_) => None,
            })
            .collect();

        Ipv4Settings {
            addresses,
            // Everything goes through the tunnel, except traffic to the
            // relay itself.
            included_routes: vec![Ipv4Net::default()],
            excluded_routes: vec![Ipv4Net::from(self.endpoint.address)],
        }
    }

    fn ipv6_settings(&self) -> Ipv6Settings {
        let addresses = self
            .config
            .interface
            .addresses
            .iter()
            .filter_map(|net| match net {
                IpNet::V4(_) => None,
                IpNet::V6(net) => Some(*net),
            })
            .collect();

        Ipv6Settings {
            addresses,
            included_routes: Vec::new(),
            excluded_routes: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use borealvpn_store::PrivateKey;

    fn endpoint() -> RelayEndpoint {
        RelayEndpoint {
            address: "1.2.3.4".parse().unwrap(),
            address_v6: None,
            port: 51820,
            ipv4_gateway: "10.64.0.1".parse().unwrap(),
            ipv6_gateway: "fc00::1".parse().unwrap(),
            public_key: [2u8; 32],
        }
    }

    fn configuration() -> TunnelConfiguration {
        let mut config = TunnelConfiguration::with_account("1234567890");
        config.interface.private_key = PrivateKey::from_bytes([1u8; 32]);
        config.interface.addresses = vec![
            "10.64.10.1/32".parse().unwrap(),
            "fc00:bbbb:bbbb:bb01::3/128".parse().unwrap(),
        ];
        config
    }

    #[test]
    fn test_full_configuration_is_bit_exact() {
        let config = configuration();
        let endpoint = endpoint();
        let generator = SettingsGenerator {
            config: &config,
            endpoint: &endpoint,
        };

        let expected = format!(
            "private_key={}\n\
             listen_port=0\n\
             replace_peers=true\n\
             public_key={}\n\
             endpoint=1.2.3.4:51820\n\
             replace_allowed_ips=true\n\
             allowed_ip=0.0.0.0/0",
            base64::encode([1u8; 32]),
            base64::encode([2u8; 32]),
        );
        assert_eq!(generator.uapi_configuration(), expected);
    }

    #[test]
    fn test_line_order() {
        let config = configuration();
        let endpoint = endpoint();
        let generator = SettingsGenerator {
            config: &config,
            endpoint: &endpoint,
        };

        let text = generator.uapi_configuration();
        let keys: Vec<&str> = text
            .lines()
            .map(|line| line.split('=').next().unwrap())
            .collect();
        assert_eq!(
            keys,
            vec![
                "private_key",
                "listen_port",
                "replace_peers",
                "public_key",
                "endpoint",
                "replace_allowed_ips",
                "allowed_ip",
            ]
        );
    }

    #[test]
    fn test_peer_only_configuration() {
        let config = configuration();
        let endpoint = endpoint();
        let generator = SettingsGenerator {
            config: &config,
            endpoint: &endpoint,
        };

        let text = generator.endpoint_uapi_configuration();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("public_key="));
        assert!(lines[1].starts_with("endpoint="));
        assert!(!text.contains("replace_peers"));
    }

    #[test]
    fn test_network_settings() {
        let config = configuration();
        let endpoint = endpoint();
        let generator = SettingsGenerator {
            config: &config,
            endpoint: &endpoint,
        };

        let settings = generator.network_settings();

        assert_eq!(settings.remote_address.to_string(), "1.2.3.4");
        assert_eq!(settings.mtu, TUNNEL_MTU);
        assert_eq!(
            settings.dns.servers,
            vec![
                "10.64.0.1".parse::<IpAddr>().unwrap(),
                "fc00::1".parse::<IpAddr>().unwrap()
            ]
        );

        assert_eq!(settings.ipv4.addresses.len(), 1);
        assert_eq!(settings.ipv4.included_routes[0].to_string(), "0.0.0.0/0");
        assert_eq!(settings.ipv4.excluded_routes[0].to_string(), "1.2.3.4/32");

        assert_eq!(settings.ipv6.addresses.len(), 1);
        assert!(settings.ipv6.included_routes.is_empty());
    }
}
