//! Point-in-time copy of the process environment.
//!
//! Everything downstream reads configuration from an `EnvSnapshot` instead of `std::env`, so
//! resolution is a pure function of its input and tests never touch the real environment.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const VAR_PREFIX: &str = "PARE_";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the current process environment. Called once at startup.
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value of `name`, treating empty or whitespace-only values as unset.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Names of all set variables that start with `PARE_`.
    pub fn pare_vars(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars
            .iter()
            .filter(|(k, v)| k.starts_with(VAR_PREFIX) && !v.trim().is_empty())
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Home directory of the invoking user, if known.
    pub fn home_dir(&self) -> Option<PathBuf> {
        self.get("HOME")
            .or_else(|| self.get("USERPROFILE"))
            .map(PathBuf::from)
    }
}

/// Environment segment for a server name: `docker-compose` becomes `DOCKER_COMPOSE`.
pub fn server_segment(server: &str) -> String {
    server
        .chars()
        .map(|c| if c == '-' { '_' } else { c.to_ascii_uppercase() })
        .collect()
}

/// `PARE_{SERVER}_{suffix}`
pub fn server_var(server: &str, suffix: &str) -> String {
    format!("{}{}_{}", VAR_PREFIX, server_segment(server), suffix)
}
