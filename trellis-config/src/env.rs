// Environment variable overlay

use crate::{ConfigError, Result};
use std::collections::HashMap;
use std::env;

/// Prefix of variables overlaid onto the runtime keys.
pub const DEFAULT_PREFIX: &str = "TRELLIS";

/// Reads environment variables as configuration keys.
///
/// A variable name maps to a key by lowercasing it and turning `_` into `.`,
/// so `TRELLIS_LOG_FORMAT` overrides `trellis.log.format`.
pub struct EnvLoader {
    prefix: Option<String>,
}

impl EnvLoader {
    /// Only variables named `<prefix>_*` are read when a prefix is given.
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Load matching variables of the process environment.
    pub fn load(&self) -> HashMap<String, String> {
        self.collect(env::vars())
    }

    /// Map `(name, value)` pairs to configuration keys, keeping those that match the prefix.
    pub fn collect<I>(&self, vars: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        vars.into_iter()
            .filter(|(name, _)| self.matches(name))
            .map(|(name, value)| (to_key(&name), value))
            .collect()
    }

    fn matches(&self, name: &str) -> bool {
        match &self.prefix {
            Some(prefix) => name
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.len() > 1 && rest.starts_with('_')),
            None => true,
        }
    }

    /// Load the variable behind configuration key `key`.
    pub fn load_var(&self, key: &str) -> Result<String> {
        env::var(to_var(key)).map_err(ConfigError::EnvError)
    }

    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|_| default.to_string())
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(Some(DEFAULT_PREFIX.to_string()))
    }
}

/// `TRELLIS_PORT` -> `trellis.port`
pub fn to_key(name: &str) -> String {
    name.to_ascii_lowercase().replace('_', ".")
}

/// `trellis.port` -> `TRELLIS_PORT`
pub fn to_var(key: &str) -> String {
    key.to_ascii_uppercase().replace(['.', '-'], "_")
}
