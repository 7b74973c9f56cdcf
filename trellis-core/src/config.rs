//! Key/value configuration source consumed by the runtime.
//!
//! The runtime only ever looks up literal keys. Loading (property files,
//! profiles, environment overlays) lives in `trellis-config`; anything that
//! can answer `get(key)` works here.

use crate::value::ConfigScalar;
use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Keys the runtime itself reads.
pub mod keys {
    /// Listening port
    pub const PORT: &str = "trellis.port";
    /// Listening address
    pub const HOST: &str = "trellis.host";
    /// Debug logging toggle
    pub const DEBUG: &str = "trellis.debug";
    /// Log output format (`json`, `pretty`, `compact`, `plain`)
    pub const LOG_FORMAT: &str = "trellis.log.format";
}

/// Default listening port when `trellis.port` is absent or unparsable.
pub const DEFAULT_PORT: u16 = 8080;

/// A flat string key/value source.
pub trait ConfigSource: Send + Sync {
    /// Look up the raw value stored under `key`.
    fn get(&self, key: &str) -> Option<String>;

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

impl ConfigSource for BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        BTreeMap::get(self, key).cloned()
    }
}

impl<S: ConfigSource + ?Sized> ConfigSource for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }
}

/// Parse `key` from `source`, falling back to `default` on absence or parse failure.
pub fn get_or<T: std::str::FromStr>(source: &dyn ConfigSource, key: &str, default: T) -> T {
    source
        .get(key)
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

/// Server settings derived from the configuration source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    pub host: IpAddr,
    pub port: u16,
    pub debug: bool,
}

impl ServerOptions {
    /// Read the well-known keys with graceful fallback to built-in defaults.
    pub fn from_config(source: &dyn ConfigSource) -> Self {
        Self {
            host: get_or(source, keys::HOST, IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            port: get_or(source, keys::PORT, DEFAULT_PORT),
            debug: source
                .get(keys::DEBUG)
                .and_then(|raw| bool::coerce(&raw))
                .unwrap_or(false),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            debug: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_server_options_defaults() {
        let options = ServerOptions::from_config(&HashMap::<String, String>::new());
        assert_eq!(options, ServerOptions::default());
        assert_eq!(options.socket_addr().port(), 8080);
    }

    #[test]
    fn test_server_options_from_keys() {
        let config = source(&[
            ("trellis.port", "9090"),
            ("trellis.host", "127.0.0.1"),
            ("trellis.debug", "TRUE"),
        ]);
        let options = ServerOptions::from_config(&config);
        assert_eq!(options.port, 9090);
        assert_eq!(options.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(options.debug);
    }

    #[test]
    fn test_unparsable_port_falls_back() {
        let config = source(&[("trellis.port", "eighty")]);
        assert_eq!(ServerOptions::from_config(&config).port, DEFAULT_PORT);
    }
}
