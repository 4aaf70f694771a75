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

//! This library is the device access layer for labs of Arista EOS routers.
//!
//! # Configuration
//!
//! The lab is described by a single TOML file (see [`config`]). It lists all routers with the host
//! name (or management address) under which they are reachable over SSH, the SSH options, and the
//! timeouts that bound every interaction with a device. The configuration is passed explicitly to
//! [`EosLab::new`].
//!
//! Make sure that you have configured SSH such that the command `ssh $destination` will
//! automatically establish the session without the need for a password (`BatchMode` is enabled).
//!
//! # Sessions
//!
//! For every router, an [`EosSession`](router::EosSession) manages the SSH transport (a control
//! master). Show commands are executed directly over the transport. Configuration is pushed through
//! an interactive [`EosShell`](router::EosShell) (a channel), which waits for the device prompt
//! after every command. Closing happens in two layers: the shell is closed gracefully with `exit`
//! (or killed), and the transport is closed with `ssh -O exit`.
//!
//! # Telemetry
//!
//! The lab can read the LLDP neighbors (`show lldp neighbors detail`) and the interface addresses
//! (`show interfaces | json`) of every router, see [`EosLab::get_telemetry`].

use std::{collections::BTreeMap, time::Duration};

use ipnet::Ipv4Net;
use router::{EosSession, EosSessionError, LldpNeighbor};
use ssh::SshError;
use thiserror::Error;

pub mod config;
pub mod router;
pub mod ssh;

#[cfg(test)]
mod test;

use config::LabConfig;

/// Handle to the lab of EOS routers.
#[derive(Debug, Clone)]
pub struct EosLab {
    config: LabConfig,
}

impl EosLab {
    /// Create a new handle. This does not connect to any device.
    pub fn new(config: LabConfig) -> Self {
        Self { config }
    }

    /// Get the configuration of the lab.
    pub fn config(&self) -> &LabConfig {
        &self.config
    }

    /// Iterate over the names of all routers in the lab.
    pub fn routers(&self) -> impl Iterator<Item = &str> + '_ {
        self.config.routers.keys().map(String::as_str)
    }

    /// Connect to the given router. All connection attempts together take at most the `open`
    /// timeout of the configuration.
    pub async fn connect(&self, router: &str) -> Result<EosSession, EosLabError> {
        self.connect_within(router, self.config.timeouts.open).await
    }

    /// Connect to the given router, giving up after `budget`.
    pub async fn connect_within(
        &self,
        router: &str,
        budget: Duration,
    ) -> Result<EosSession, EosLabError> {
        let destination = self.destination(router)?;
        log::debug!("[{router}] connecting to {destination}");
        Ok(EosSession::new(destination, self.config.ssh.clone(), budget).await?)
    }

    /// Close the transport towards the given router, whether or not a session is still around.
    pub async fn close_transport(&self, router: &str) -> Result<(), EosLabError> {
        let destination = self.destination(router)?;
        log::debug!("[{router}] closing the transport to {destination}");
        Ok(EosSession::close_transport_of(destination, self.config.ssh.clone()).await?)
    }

    /// SSH destination of the router.
    fn destination(&self, router: &str) -> Result<String, EosLabError> {
        self.config
            .destination(router)
            .ok_or_else(|| EosLabError::UnknownRouter(router.to_string()))
    }

    /// Read the LLDP neighbors and the interface addresses of the given router. The transport to
    /// the router is closed afterwards.
    pub async fn get_telemetry(&self, router: &str) -> Result<RouterTelemetry, EosLabError> {
        let session = self.connect(router).await?;
        let result = async {
            let neighbors = session.get_lldp_neighbors().await?;
            let addresses = session.get_interface_addresses().await?;
            Ok::<_, EosSessionError>(RouterTelemetry {
                neighbors,
                addresses,
            })
        }
        .await;
        if let Err(e) = session.close_transport().await {
            log::warn!("[{router}] Cannot close the transport: {e}");
        }
        let telemetry = result?;
        log::debug!(
            "[{router}] {} LLDP neighbors, {} interface addresses",
            telemetry.neighbors.len(),
            telemetry.addresses.len()
        );
        Ok(telemetry)
    }
}

/// Discovery and addressing data of a single router.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterTelemetry {
    /// LLDP neighbors, in the order reported by the device.
    pub neighbors: Vec<LldpNeighbor>,
    /// Primary address of each routed interface.
    pub addresses: BTreeMap<String, Ipv4Net>,
}

/// Error thrown by the lab
#[derive(Debug, Error)]
pub enum EosLabError {
    /// Error in the SSH session
    #[error("{0}")]
    Ssh(#[from] SshError),
    /// Error while talking to the device
    #[error("{0}")]
    Session(#[from] EosSessionError),
    /// The router is not part of the lab configuration.
    #[error("Router {0} is not part of the lab")]
    UnknownRouter(String),
}
