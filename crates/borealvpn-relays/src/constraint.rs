//! Relay location constraint
//!
//! The wire representation matches the settings format used by the apps:
//! `"any"` for the unconstrained variant, otherwise a 1–3 element array of
//! location identifiers. Any other arity is a hard decode error and is
//! never defaulted.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Wire representation of the unconstrained variant
const ANY_REPR: &str = "any";

/// A user-chosen filter narrowing relay selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayConstraint {
    /// Any relay in the directory
    Any,
    /// Any relay in the given country
    Country(String),
    /// Any relay in the given city (country code, city code)
    City(String, String),
    /// One specific relay host (country code, city code, hostname)
    Hostname(String, String, String),
}

impl Default for RelayConstraint {
    fn default() -> Self {
        RelayConstraint::Any
    }
}

impl fmt::Display for RelayConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayConstraint::Any => write!(f, "any location"),
            RelayConstraint::Country(country) => write!(f, "{}", country.to_uppercase()),
            RelayConstraint::City(country, city) => {
                write!(f, "{}, {}", city.to_uppercase(), country.to_uppercase())
            }
            RelayConstraint::Hostname(country, city, hostname) => write!(
                f,
                "{}, {}, hostname {}",
                city.to_uppercase(),
                country.to_uppercase(),
                hostname
            ),
        }
    }
}

impl Serialize for RelayConstraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RelayConstraint::Any => serializer.serialize_str(ANY_REPR),
            RelayConstraint::Country(country) => [country.as_str()].serialize(serializer),
            RelayConstraint::City(country, city) => {
                [country.as_str(), city.as_str()].serialize(serializer)
            }
            RelayConstraint::Hostname(country, city, hostname) => {
                [country.as_str(), city.as_str(), hostname.as_str()].serialize(serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for RelayConstraint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Tag(String),
            Components(Vec<String>),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Tag(tag) if tag == ANY_REPR => Ok(RelayConstraint::Any),
            Repr::Tag(tag) => Err(D::Error::custom(format!(
                "invalid relay constraint tag: {:?}",
                tag
            ))),
            Repr::Components(mut components) => match components.len() {
                1 => Ok(RelayConstraint::Country(components.remove(0))),
                2 => {
                    let city = components.remove(1);
                    Ok(RelayConstraint::City(components.remove(0), city))
                }
                3 => {
                    let hostname = components.remove(2);
                    let city = components.remove(1);
                    Ok(RelayConstraint::Hostname(
                        components.remove(0),
                        city,
                        hostname,
                    ))
                }
                count => Err(D::Error::custom(format!(
                    "invalid relay constraint arity: {}",
                    count
                ))),
            },
        }
    }
}
