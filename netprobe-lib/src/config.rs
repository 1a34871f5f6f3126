use std::env;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use crate::harness::{DEFAULT_LISTEN_ADDR, DEFAULT_SEND_ADDR};

pub const DEFAULT_BROKER_HOST: &str = "localhost";
pub const DEFAULT_BROKER_PORT: u16 = 1883;
pub const DEFAULT_BRIDGE_ADDR: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 5656));

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {name} has invalid value '{value}': {reason}")]
    Invalid {
        name:   &'static str,
        value:  String,
        reason: String,
    },
}

/// Where the route publisher sends its payloads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transport {
    Mqtt { host: String, port: u16 },
    UdpBridge { relay: SocketAddr },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublisherSettings {
    pub transport: Transport,
    pub dump:      Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HarnessSettings {
    pub listen: SocketAddr,
    pub send:   SocketAddr,
}

impl PublisherSettings {
    /// BROKER_HOST, BROKER_PORT, PUBLISH_TRANSPORT, BRIDGE_ADDR, PUBLISH_DUMP
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let transport = match lookup("PUBLISH_TRANSPORT").as_deref() {
            None | Some("mqtt") => Transport::Mqtt {
                host: lookup("BROKER_HOST").unwrap_or_else(|| DEFAULT_BROKER_HOST.to_string()),
                port: parse_or(&lookup, "BROKER_PORT", DEFAULT_BROKER_PORT)?,
            },
            Some("udp") => Transport::UdpBridge {
                relay: parse_or(&lookup, "BRIDGE_ADDR", DEFAULT_BRIDGE_ADDR)?,
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name:   "PUBLISH_TRANSPORT",
                    value:  other.to_string(),
                    reason: "expected 'mqtt' or 'udp'".into(),
                });
            }
        };
        let dump = lookup("PUBLISH_DUMP").filter(|p| !p.is_empty()).map(PathBuf::from);
        Ok(Self { transport, dump })
    }
}

impl HarnessSettings {
    /// UDP_LISTEN_ADDR, UDP_SEND_ADDR
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            listen: parse_or(&lookup, "UDP_LISTEN_ADDR", DEFAULT_LISTEN_ADDR)?,
            send:   parse_or(&lookup, "UDP_SEND_ADDR", DEFAULT_SEND_ADDR)?,
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
            value,
        }),
    }
}
