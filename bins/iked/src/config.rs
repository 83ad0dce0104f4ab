//! Connection configuration (spec.md's Non-goals exclude an on-disk format
//! for the daemon proper, but an `iked` without a way to declare
//! connections outside of source code is not a complete daemon). Raw TOML
//! is parsed into a loosely-typed shape first, then validated into the
//! `Config` the daemon actually drives from.

use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    Read(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("connection {0:?}: invalid address {1:?}")]
    InvalidAddress(String, String),
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    listen: Option<String>,
    #[serde(default)]
    connection: Vec<RawConnection>,
}

#[derive(Debug, Deserialize)]
struct RawConnection {
    name: String,
    local: String,
    remote: String,
    host_srcip: Option<String>,
    #[serde(default)]
    dns: Vec<String>,
    #[serde(default)]
    nbns: Vec<String>,
    /// If true, this connection answers as the ModeCfg push-mode responder
    /// (unsolicited SET); otherwise it waits for the initiator's REQUEST.
    #[serde(default)]
    push_mode: bool,
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub name: String,
    pub local: Ipv4Addr,
    pub remote: Ipv4Addr,
    pub host_srcip: Option<Ipv4Addr>,
    pub dns: Vec<Ipv4Addr>,
    pub nbns: Vec<Ipv4Addr>,
    pub push_mode: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub connections: Vec<ConnectionConfig>,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text =
            fs::read_to_string(path).map_err(|e| ConfigError::Read(path.display().to_string(), e))?;
        Self::from_raw(toml::from_str(&text)?)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let connections = raw
            .connection
            .into_iter()
            .map(|c| {
                Ok(ConnectionConfig {
                    local: parse_addr(&c.name, &c.local)?,
                    remote: parse_addr(&c.name, &c.remote)?,
                    host_srcip: c.host_srcip.as_deref().map(|s| parse_addr(&c.name, s)).transpose()?,
                    dns: c.dns.iter().map(|s| parse_addr(&c.name, s)).collect::<Result<_, _>>()?,
                    nbns: c.nbns.iter().map(|s| parse_addr(&c.name, s)).collect::<Result<_, _>>()?,
                    push_mode: c.push_mode,
                    name: c.name,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Config {
            listen: raw.listen.unwrap_or_else(|| "0.0.0.0:500".to_string()),
            connections,
        })
    }
}

fn parse_addr(name: &str, s: &str) -> Result<Ipv4Addr, ConfigError> {
    if s == "any" {
        return Ok(Ipv4Addr::UNSPECIFIED);
    }
    s.parse()
        .map_err(|_| ConfigError::InvalidAddress(name.to_string(), s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_connection() {
        let raw: RawConfig = toml::from_str(
            r#"
            listen = "0.0.0.0:500"

            [[connection]]
            name = "site-a"
            local = "10.0.0.1"
            remote = "any"
            host_srcip = "10.1.2.3"
            dns = ["8.8.8.8"]
            "#,
        )
        .unwrap();
        let config = Config::from_raw(raw).unwrap();
        assert_eq!(config.connections.len(), 1);
        assert_eq!(config.connections[0].remote, Ipv4Addr::UNSPECIFIED);
        assert_eq!(config.connections[0].host_srcip, Some(Ipv4Addr::new(10, 1, 2, 3)));
        assert_eq!(config.connections[0].dns, vec![Ipv4Addr::new(8, 8, 8, 8)]);
    }

    #[test]
    fn defaults_listen_address_when_absent() {
        let raw: RawConfig = toml::from_str("").unwrap();
        let config = Config::from_raw(raw).unwrap();
        assert_eq!(config.listen, "0.0.0.0:500");
        assert!(config.connections.is_empty());
    }

    #[test]
    fn rejects_invalid_address() {
        let raw: RawConfig = toml::from_str(
            r#"
            [[connection]]
            name = "bad"
            local = "not-an-ip"
            remote = "any"
            "#,
        )
        .unwrap();
        assert!(Config::from_raw(raw).is_err());
    }
}
