// LabRib: Static routing controller for emulated router labs
// Copyright (C) 2023 The LabRib Authors
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! This module contains the code for reading the lab configuration.
//!
//! The configuration is a single TOML file. It is parsed once and handed explicitly to every
//! component that needs it; there is no process-wide configuration state.
//!
//! ```toml
//! workers = 4
//! management_prefixes = ["Management"]
//! fabric_pool = "10.0.0.0/16"
//!
//! [ssh]
//! user = "admin"
//!
//! [timeouts]
//! open = 10
//! command = 30
//!
//! [routers]
//! r1 = "172.20.20.11"
//! r2 = "172.20.20.12"
//! ```

use std::{
    collections::BTreeMap, net::Ipv4Addr, path::Path, path::PathBuf, str::FromStr, time::Duration,
};

use ipnet::Ipv4Net;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{de::Error as _, Deserialize, Deserializer};
use thiserror::Error;

/// Default control path of the SSH control master.
pub const DEFAULT_CONTROL_PATH: &str = "/tmp/.ssh-%r@%h:%p";

/// Configuration of the lab.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabConfig {
    /// Maximum number of routers that are contacted simultaneously.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Interface names starting with any of these prefixes (ignoring case) are management
    /// interfaces. They are never part of the routed topology.
    #[serde(default = "default_management_prefixes")]
    pub management_prefixes: Vec<String>,
    /// If `true`, two sides of a link that disagree on the subnet abort the pass. Otherwise, the
    /// link is skipped.
    #[serde(default = "default_strict_links")]
    pub strict_links: bool,
    /// Subnets of the fabric links are taken from this pool, one `/30` out of every `/24`.
    #[serde(default = "default_fabric_pool")]
    pub fabric_pool: Ipv4Net,
    /// How to reach the routers.
    #[serde(default)]
    pub ssh: SshConfig,
    /// Time bounds for every interaction with a device.
    #[serde(default)]
    pub timeouts: Timeouts,
    /// All routers of the lab, mapping the router name (as announced in LLDP) to the host name or
    /// management address that is used to reach it over SSH.
    #[serde(deserialize_with = "deserialize_routers")]
    pub routers: BTreeMap<String, String>,
}

impl LabConfig {
    /// Read and validate the configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        log::debug!("Reading lab configuration from {}", path.display());
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        content.parse()
    }

    /// Check the values that cannot be expressed by the type alone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.routers.is_empty() {
            return Err(ConfigError::NoRouters);
        }
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        Ok(())
    }

    /// Get the SSH destination of a router, or `None` if the router is not part of the lab.
    pub fn destination(&self, router: &str) -> Option<String> {
        self.routers
            .get(router)
            .map(|host| self.ssh.destination(host))
    }
}

impl FromStr for LabConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

/// SSH parameters shared by all routers.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SshConfig {
    /// Username that is prepended to the host (`user@host`). If missing, `~/.ssh/config` decides.
    #[serde(default)]
    pub user: Option<String>,
    /// SSH port. If missing, `~/.ssh/config` decides.
    #[serde(default)]
    pub port: Option<u16>,
    /// Private key used for authentication.
    #[serde(default)]
    pub identity_file: Option<PathBuf>,
    /// Path of the control master socket, see `ssh_config(5)`.
    #[serde(default = "default_control_path")]
    pub control_path: String,
    /// How long the control master stays alive without clients, see `ssh_config(5)`.
    #[serde(default = "default_control_persist")]
    pub control_persist: String,
}

impl SshConfig {
    /// Build the SSH destination for the given host.
    pub fn destination(&self, host: &str) -> String {
        match self.user.as_ref() {
            Some(user) => format!("{user}@{host}"),
            None => host.to_string(),
        }
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: None,
            port: None,
            identity_file: None,
            control_path: default_control_path(),
            control_persist: default_control_persist(),
        }
    }
}

/// Timeouts (in seconds in the configuration file).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Timeouts {
    /// Establishing the session and reaching the privileged prompt.
    #[serde(default = "default_open", deserialize_with = "deserialize_secs")]
    pub open: Duration,
    /// A single command, including waiting for the next prompt.
    #[serde(default = "default_command", deserialize_with = "deserialize_secs")]
    pub command: Duration,
    /// Persisting the running configuration.
    #[serde(default = "default_persist", deserialize_with = "deserialize_secs")]
    pub persist: Duration,
    /// Each step of closing the session (graceful, channel, transport).
    #[serde(default = "default_close", deserialize_with = "deserialize_secs")]
    pub close: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            open: default_open(),
            command: default_command(),
            persist: default_persist(),
            close: default_close(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_management_prefixes() -> Vec<String> {
    vec![String::from("Management")]
}

fn default_strict_links() -> bool {
    true
}

fn default_fabric_pool() -> Ipv4Net {
    Ipv4Net::new(Ipv4Addr::new(10, 0, 0, 0), 16).unwrap_or_default()
}

fn default_control_path() -> String {
    DEFAULT_CONTROL_PATH.to_string()
}

fn default_control_persist() -> String {
    String::from("10m")
}

/// Upper bound of every timeout (one day).
const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

fn default_open() -> Duration {
    Duration::from_secs(10)
}

fn default_command() -> Duration {
    Duration::from_secs(30)
}

fn default_persist() -> Duration {
    Duration::from_secs(30)
}

fn default_close() -> Duration {
    Duration::from_secs(5)
}

fn deserialize_secs<'de, D>(de: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let x = f64::deserialize(de)?;
    if x.is_nan() || x <= 0.0 {
        return Err(D::Error::custom(format!(
            "timeout must be a positive number of seconds, but was {x}"
        )));
    }
    match Duration::try_from_secs_f64(x) {
        Ok(d) if d <= MAX_TIMEOUT => Ok(d),
        _ => Err(D::Error::custom(format!(
            "timeout must be at most {} seconds, but was {x}",
            MAX_TIMEOUT.as_secs()
        ))),
    }
}

fn deserialize_routers<'de, D>(de: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    lazy_static! {
        static ref NAME_RE: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").unwrap();
        static ref HOST_RE: Regex = Regex::new(r"^[A-Za-z0-9_.\-:\[\]]+$").unwrap();
    }
    let routers = BTreeMap::<String, String>::deserialize(de)?;
    for (name, host) in routers.iter() {
        if !NAME_RE.is_match(name) {
            return Err(D::Error::custom(format!("Invalid router name: {name:?}")));
        }
        if !HOST_RE.is_match(host) {
            return Err(D::Error::custom(format!(
                "Invalid host for router {name}: {host:?}"
            )));
        }
    }
    Ok(routers)
}

/// Error while reading the lab configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Cannot read the file
    #[error("Cannot read {}: {1}", .0.display())]
    Io(PathBuf, std::io::Error),
    /// Cannot parse the file
    #[error("Cannot parse the configuration: {0}")]
    Toml(#[from] toml::de::Error),
    /// The configuration does not contain any router.
    #[error("The configuration does not contain any router")]
    NoRouters,
    /// At least one worker is required.
    #[error("The number of workers must be at least 1")]
    NoWorkers,
}
