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

//! This module implements an SSH session for Arista EOS devices.

use std::{collections::BTreeMap, time::Duration};

use ipnet::Ipv4Net;
use thiserror::Error;
use tokio::time::timeout;

use crate::{
    config::SshConfig,
    ssh::{SshError, SshSession},
};

mod interfaces;
mod lldp;
mod shell;
pub use interfaces::parse_interface_addresses;
pub use lldp::LldpNeighbor;
pub use shell::{interface_config, is_error_output, is_prompt, EosShell, EosShellError};

#[cfg(test)]
pub(crate) use shell::strip_echo;

/// Number of attempts to establish the connection.
const CONNECT_ATTEMPTS: u32 = 3;

/// An SSH session that can be used to trigger multiple commands at the same time while reusing the
/// same session (transport).
#[derive(Debug, Clone)]
pub struct EosSession(SshSession);

impl EosSession {
    /// Connect to the destination. The connection is tried up to three times, and all attempts
    /// together take at most `connect_timeout`. The transport left behind by a failed attempt is
    /// torn down before the next one.
    pub async fn new(
        destination: impl Into<String>,
        options: SshConfig,
        connect_timeout: Duration,
    ) -> Result<Self, SshError> {
        let destination = destination.into();
        let attempt_timeout = connect_timeout / CONNECT_ATTEMPTS;
        let mut i = 0;
        let session = loop {
            i += 1;
            match SshSession::new(destination.clone(), options.clone(), attempt_timeout).await {
                Ok(s) => break s,
                Err(e) => {
                    let stale = SshSession::detached(destination.clone(), options.clone());
                    match timeout(attempt_timeout, stale.close_master()).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => log::warn!("[{destination}] Cannot close the transport: {e}"),
                        Err(_) => log::warn!("[{destination}] Timeout while closing the transport"),
                    }
                    if i >= CONNECT_ATTEMPTS {
                        return Err(e);
                    }
                    log::warn!("[{destination}] Cannot establish connection, trying again!");
                }
            }
        };

        Ok(Self(session))
    }

    /// Tear down the transport towards `destination`, without connecting first.
    pub async fn close_transport_of(
        destination: impl Into<String>,
        options: SshConfig,
    ) -> Result<(), SshError> {
        SshSession::detached(destination, options).close_master().await
    }

    /// Execute the show command with the provided arguments, without opening a shell.
    pub async fn show(&self, cmd: impl AsRef<str> + Send + Sync) -> Result<String, SshError> {
        self.0.run(&["show", cmd.as_ref()]).await
    }

    /// Get all LLDP neighbors using `show lldp neighbors detail`.
    pub async fn get_lldp_neighbors(&self) -> Result<Vec<LldpNeighbor>, EosSessionError> {
        Ok(LldpNeighbor::from_detail(
            self.show("lldp neighbors detail").await?,
        ))
    }

    /// Get the primary address of all routed interfaces using `show interfaces | json`.
    pub async fn get_interface_addresses(
        &self,
    ) -> Result<BTreeMap<String, Ipv4Net>, EosSessionError> {
        Ok(parse_interface_addresses(
            self.show("interfaces | json").await?,
        )?)
    }

    /// Create a new EOS shell (channel) in privileged mode. Each command sent to the shell is
    /// bounded by `cmd_timeout`.
    pub async fn shell(&self, cmd_timeout: Duration) -> Result<EosShell, EosSessionError> {
        log::trace!("[{}] Create remote shell", self.name());
        let shell_process = self
            .0
            .shell_command()
            .spawn()
            .map_err(SshError::Client)?;
        Ok(EosShell::new(shell_process, self.name().to_string(), cmd_timeout).await?)
    }

    /// Close the transport (the control master) of this session. All shells are disconnected.
    pub async fn close_transport(&self) -> Result<(), SshError> {
        self.0.close_master().await
    }

    /// Get the SSH hostname of the target.
    pub fn name(&self) -> &str {
        self.0.name()
    }
}

/// Error while talking to an EOS device.
#[derive(Debug, Error)]
pub enum EosSessionError {
    /// SSH error
    #[error("{0}")]
    Ssh(#[from] SshError),
    /// Shell error
    #[error("{0}")]
    Shell(#[from] EosShellError),
    /// Cannot parse the output
    #[error("{0}")]
    Parse(#[from] ParseError),
}

/// Error while parsing output from an EOS router.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Cannot parse the JSON output
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Wrong prefix length
    #[error("Wrong prefix length: {0}")]
    PrefixLen(#[from] ipnet::PrefixLenError),
}
