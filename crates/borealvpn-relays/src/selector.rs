//! Constraint-based relay selection
//!
//! Selection policy: filter the directory down by the constraint, walk the
//! surviving hosts in directory order, and stop at the first host exposing
//! a WireGuard tunnel descriptor. Only the port is randomized: one of the
//! descriptor's port ranges is drawn uniformly, then one port uniformly
//! within it. Host `weight` is not consulted and descriptor choice is not
//! randomized; existing fixtures depend on this exact policy.

use crate::cache::RelayListCache;
use crate::constraint::RelayConstraint;
use crate::endpoint::RelayEndpoint;
use crate::error::RelayResult;
use crate::list::{City, Country, PortRange, Relay, RelayList, WireguardTunnel};

use rand::Rng;
use std::path::Path;

/// Resolves relay constraints against one snapshot of the relay directory
pub struct RelaySelector {
    relay_list: RelayList,
}

impl RelaySelector {
    /// Create a selector over a directory snapshot
    pub fn new(relay_list: RelayList) -> Self {
        Self { relay_list }
    }

    /// Create a selector from the on-disk relay cache
    pub fn from_cache(cache_path: &Path) -> RelayResult<Self> {
        let cache = RelayListCache::read(cache_path)?;
        Ok(Self::new(cache.relay_list))
    }

    /// Resolve `constraint` to one concrete endpoint, or `None` when no
    /// matching host exposes a usable WireGuard tunnel. The caller must
    /// treat `None` as fatal for the tunnel start attempt.
    pub fn evaluate<R: Rng>(
        &self,
        constraint: &RelayConstraint,
        rng: &mut R,
    ) -> Option<RelayEndpoint> {
        for country in self.matching_countries(constraint) {
            for city in Self::matching_cities(country, constraint) {
                for relay in Self::matching_relays(city, constraint) {
                    let Some(tunnel) = first_wireguard_tunnel(relay) else {
                        continue;
                    };

                    if let Some(port) = pick_port(&tunnel.port_ranges, rng) {
                        tracing::debug!(
                            "Selected relay {} port {}",
                            relay.hostname,
                            port
                        );
                        return Some(make_endpoint(relay, tunnel, port));
                    }
                }
            }
        }

        None
    }

    fn matching_countries<'a>(
        &'a self,
        constraint: &'a RelayConstraint,
    ) -> impl Iterator<Item = &'a Country> {
        let code = match constraint {
            RelayConstraint::Any => None,
            RelayConstraint::Country(country)
            | RelayConstraint::City(country, _)
            | RelayConstraint::Hostname(country, _, _) => Some(country.as_str()),
        };

        self.relay_list
            .countries
            .iter()
            .filter(move |country| code.map_or(true, |code| country.code == code))
    }

    fn matching_cities<'a>(
        country: &'a Country,
        constraint: &'a RelayConstraint,
    ) -> impl Iterator<Item = &'a City> {
        let code = match constraint {
            RelayConstraint::Any | RelayConstraint::Country(_) => None,
            RelayConstraint::City(_, city) | RelayConstraint::Hostname(_, city, _) => {
                Some(city.as_str())
            }
        };

        country
            .cities
            .iter()
            .filter(move |city| code.map_or(true, |code| city.code == code))
    }

    fn matching_relays<'a>(
        city: &'a City,
        constraint: &'a RelayConstraint,
    ) -> impl Iterator<Item = &'a Relay> {
        let hostname = match constraint {
            RelayConstraint::Hostname(_, _, hostname) => Some(hostname.as_str()),
            _ => None,
        };

        city.relays
            .iter()
            .filter(move |relay| hostname.map_or(true, |hostname| relay.hostname == hostname))
    }
}

fn first_wireguard_tunnel(relay: &Relay) -> Option<&WireguardTunnel> {
    relay
        .tunnels
        .as_ref()?
        .wireguard
        .as_ref()?
        .first()
}

/// Draw one range uniformly, then one port uniformly within it
fn pick_port<R: Rng>(port_ranges: &[PortRange], rng: &mut R) -> Option<u16> {
    if port_ranges.is_empty() {
        return None;
    }

    let range = port_ranges[rng.gen_range(0..port_ranges.len())];
    Some(rng.gen_range(range.0..=range.1))
}

fn make_endpoint(relay: &Relay, tunnel: &WireguardTunnel, port: u16) -> RelayEndpoint {
    RelayEndpoint {
        address: relay.ipv4_addr_in,
        address_v6: None,
        port,
        ipv4_gateway: tunnel.ipv4_gateway,
        ipv6_gateway: tunnel.ipv6_gateway,
        public_key: tunnel.public_key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list::Tunnels;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn wg_tunnel(key_byte: u8, port_ranges: Vec<PortRange>) -> WireguardTunnel {
        WireguardTunnel {
            ipv4_gateway: "10.64.0.1".parse().unwrap(),
            ipv6_gateway: "fc00::1".parse().unwrap(),
            public_key: [key_byte; 32],
            port_ranges,
        }
    }

    fn relay(hostname: &str, last_octet: u8, tunnels: Option<Vec<WireguardTunnel>>) -> Relay {
        Relay {
            hostname: hostname.into(),
            ipv4_addr_in: format!("185.213.154.{}", last_octet).parse().unwrap(),
            include_in_country: true,
            weight: 100,
            tunnels: tunnels.map(|wireguard| Tunnels {
                wireguard: Some(wireguard),
            }),
        }
    }

    fn directory() -> RelayList {
        RelayList {
            countries: vec![
                Country {
                    name: "Sweden".into(),
                    code: "se".into(),
                    cities: vec![
                        City {
                            name: "Gothenburg".into(),
                            code: "got".into(),
                            latitude: 57.70887,
                            longitude: 11.97456,
                            relays: vec![
                                relay("se-got-000", 10, None),
                                relay(
                                    "se-got-001",
                                    11,
                                    Some(vec![wg_tunnel(1, vec![PortRange(51820, 51820)])]),
                                ),
                            ],
                        },
                        City {
                            name: "Stockholm".into(),
                            code: "sto".into(),
                            latitude: 59.3289,
                            longitude: 18.0649,
                            relays: vec![relay(
                                "se-sto-001",
                                20,
                                Some(vec![wg_tunnel(2, vec![PortRange(4000, 5000)])]),
                            )],
                        },
                    ],
                },
                Country {
                    name: "Norway".into(),
                    code: "no".into(),
                    cities: vec![City {
                        name: "Oslo".into(),
                        code: "osl".into(),
                        latitude: 59.9139,
                        longitude: 10.7522,
                        relays: vec![relay("no-osl-001", 30, None)],
                    }],
                },
            ],
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(0x1905)
    }

    #[test]
    fn test_any_picks_first_eligible_host() {
        let selector = RelaySelector::new(directory());
        let endpoint = selector.evaluate(&RelayConstraint::Any, &mut rng()).unwrap();

        // se-got-000 has no tunnels, so the first eligible host in
        // directory order is se-got-001.
        assert_eq!(endpoint.address, "185.213.154.11".parse::<std::net::Ipv4Addr>().unwrap());
        assert_eq!(endpoint.port, 51820);
        assert_eq!(endpoint.public_key, [1u8; 32]);
    }

    #[test]
    fn test_city_constraint_skips_host_without_descriptor() {
        let selector = RelaySelector::new(directory());
        let constraint = RelayConstraint::City("se".into(), "got".into());

        let endpoint = selector.evaluate(&constraint, &mut rng()).unwrap();
        assert_eq!(endpoint.port, 51820);
        assert_eq!(endpoint.public_key, [1u8; 32]);
    }

    #[test]
    fn test_country_constraint_filters() {
        let selector = RelaySelector::new(directory());

        // Norway has no hosts with WireGuard descriptors.
        assert!(selector
            .evaluate(&RelayConstraint::Country("no".into()), &mut rng())
            .is_none());

        assert!(selector
            .evaluate(&RelayConstraint::Country("se".into()), &mut rng())
            .is_some());
    }

    #[test]
    fn test_hostname_constraint_selects_exact_host() {
        let selector = RelaySelector::new(directory());
        let constraint =
            RelayConstraint::Hostname("se".into(), "sto".into(), "se-sto-001".into());

        let endpoint = selector.evaluate(&constraint, &mut rng()).unwrap();
        assert_eq!(endpoint.public_key, [2u8; 32]);
        assert!(PortRange(4000, 5000).contains(endpoint.port));
    }

    #[test]
    fn test_unmatched_constraint_returns_none() {
        let selector = RelaySelector::new(directory());

        assert!(selector
            .evaluate(&RelayConstraint::Country("fi".into()), &mut rng())
            .is_none());
        assert!(selector
            .evaluate(
                &RelayConstraint::Hostname("se".into(), "got".into(), "se-got-999".into()),
                &mut rng()
            )
            .is_none());
    }

    #[test]
    fn test_port_always_within_declared_ranges() {
        let ranges = vec![PortRange(100, 200), PortRange(51820, 51830), PortRange(53, 53)];
        let selector = RelaySelector::new(RelayList {
            countries: vec![Country {
                name: "Sweden".into(),
                code: "se".into(),
                cities: vec![City {
                    name: "Gothenburg".into(),
                    code: "got".into(),
                    latitude: 57.70887,
                    longitude: 11.97456,
                    relays: vec![relay("se-got-001", 11, Some(vec![wg_tunnel(1, ranges.clone())]))],
                }],
            }],
        });

        let mut rng = rng();
        for _ in 0..512 {
            let endpoint = selector.evaluate(&RelayConstraint::Any, &mut rng).unwrap();
            assert!(
                ranges.iter().any(|range| range.contains(endpoint.port)),
                "port {} outside every declared range",
                endpoint.port
            );
        }
    }

    #[test]
    fn test_single_port_range_is_deterministic() {
        let selector = RelaySelector::new(directory());
        let constraint = RelayConstraint::City("se".into(), "got".into());

        let mut rng = rng();
        for _ in 0..32 {
            let endpoint = selector.evaluate(&constraint, &mut rng).unwrap();
            assert_eq!(endpoint.port, 51820);
        }
    }

    #[test]
    fn test_empty_port_ranges_are_unusable() {
        let selector = RelaySelector::new(RelayList {
            countries: vec![Country {
                name: "Sweden".into(),
                code: "se".into(),
                cities: vec![City {
                    name: "Gothenburg".into(),
                    code: "got".into(),
                    latitude: 57.70887,
                    longitude: 11.97456,
                    relays: vec![relay("se-got-001", 11, Some(vec![wg_tunnel(1, vec![])]))],
                }],
            }],
        });

        assert!(selector.evaluate(&RelayConstraint::Any, &mut rng()).is_none());
    }

    #[test]
    fn test_first_descriptor_wins() {
        let selector = RelaySelector::new(RelayList {
            countries: vec![Country {
                name: "Sweden".into(),
                code: "se".into(),
                cities: vec![City {
                    name: "Gothenburg".into(),
                    code: "got".into(),
                    latitude: 57.70887,
                    longitude: 11.97456,
                    relays: vec![relay(
                        "se-got-001",
                        11,
                        Some(vec![
                            wg_tunnel(1, vec![PortRange(1000, 1000)]),
                            wg_tunnel(2, vec![PortRange(2000, 2000)]),
                        ]),
                    )],
                }],
            }],
        });

        let mut rng = rng();
        for _ in 0..16 {
            let endpoint = selector.evaluate(&RelayConstraint::Any, &mut rng).unwrap();
            assert_eq!(endpoint.public_key, [1u8; 32]);
            assert_eq!(endpoint.port, 1000);
        }
    }
}
