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

//! Access to the routers of an [`EosLab`].
//!
//! Every session consists of the SSH transport ([`EosSession`]) and an interactive shell
//! ([`EosShell`]) running on top of it. Closing the session gracefully exits the shell and then
//! stops the transport. Dropping an [`EosDevice`] kills the shell process.

use std::{collections::BTreeMap, io, time::Duration};

use async_trait::async_trait;
use eos_lab::{
    config::LabConfig,
    router::{EosSession, EosShell, EosShellError},
    ssh::SshError,
    EosLab, EosLabError,
};
use ipnet::Ipv4Net;
use tokio::time::{timeout, timeout_at, Instant};

use super::{DeviceAccess, DeviceError, DeviceSession, ReconcileOptions, Step};
use crate::{
    plan::StaticRoute,
    types::{IfaceName, RouterId},
};

/// An open session to an EOS router.
#[derive(Debug)]
pub struct EosDevice {
    /// The transport
    session: EosSession,
    /// The channel
    shell: EosShell,
    /// Bound of `write memory`
    persist_timeout: Duration,
}

#[async_trait]
impl DeviceAccess for EosLab {
    type Session = EosDevice;

    /// Connect to the router and start the shell. Both together take at most the `open`
    /// timeout: connecting may use half of it, and the shell gets the rest.
    async fn open(&self, router: &RouterId) -> Result<EosDevice, DeviceError> {
        let timeouts = self.config().timeouts;
        let deadline = Instant::now() + timeouts.open;

        let session = self
            .connect_within(router.as_str(), timeouts.open / 2)
            .await
            .map_err(|e| match e {
                EosLabError::UnknownRouter(_) => DeviceError::UnknownRouter(router.clone()),
                EosLabError::Ssh(SshError::Timeout) => DeviceError::Timeout(Step::Open),
                e => DeviceError::session(e),
            })?;

        let error = match timeout_at(deadline, session.shell(timeouts.command)).await {
            Ok(Ok(shell)) => {
                return Ok(EosDevice {
                    session,
                    shell,
                    persist_timeout: timeouts.persist,
                })
            }
            Ok(Err(e)) => DeviceError::session(e),
            Err(_) => DeviceError::Timeout(Step::Open),
        };
        match timeout(timeouts.close, session.close_transport()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("[{router}] Cannot close the transport: {e}"),
            Err(_) => log::warn!("[{router}] Timeout while closing the transport"),
        }
        Err(error)
    }

    async fn abort_open(&self, router: &RouterId) -> Result<(), DeviceError> {
        self.close_transport(router.as_str())
            .await
            .map_err(DeviceError::session)
    }
}

#[async_trait]
impl DeviceSession for EosDevice {
    async fn enter_config(&mut self) -> Result<(), DeviceError> {
        self.shell
            .configure_terminal()
            .await
            .map_err(|e| shell_error(Step::EnterConfig, e))
    }

    async fn install_route(&mut self, route: &StaticRoute) -> Result<(), DeviceError> {
        self.shell
            .add_static_route(route.prefix, route.next_hop)
            .await
            .map_err(|e| shell_error(Step::InstallRoute, e))
    }

    async fn exit_config(&mut self) -> Result<(), DeviceError> {
        self.shell
            .end()
            .await
            .map_err(|e| shell_error(Step::ExitConfig, e))
    }

    async fn configure_interfaces(
        &mut self,
        interfaces: &BTreeMap<IfaceName, Ipv4Net>,
    ) -> Result<(), DeviceError> {
        self.shell
            .configure_interfaces(interfaces)
            .await
            .map_err(|e| shell_error(Step::ConfigureInterfaces, e))
    }

    async fn persist(&mut self) -> Result<(), DeviceError> {
        self.shell
            .write_memory(self.persist_timeout)
            .await
            .map_err(|e| shell_error(Step::Persist, e))
    }

    async fn close(&mut self) -> Result<(), DeviceError> {
        let status = self
            .shell
            .exit()
            .await
            .map_err(|e| shell_error(Step::Close, e))?;
        log::trace!("[{}] shell exited with {status}", self.shell.name());
        self.session
            .close_transport()
            .await
            .map_err(DeviceError::session)
    }

    async fn close_channel(&mut self) -> Result<(), DeviceError> {
        self.shell
            .kill()
            .map_err(|e| shell_error(Step::CloseChannel, e))
    }

    async fn close_transport(&mut self) -> Result<(), DeviceError> {
        self.session
            .close_transport()
            .await
            .map_err(DeviceError::session)
    }
}

/// Translate the error of the shell. Error output of the device means the command was rejected,
/// and a missing prompt is a timeout of the step.
pub(crate) fn shell_error(step: Step, e: EosShellError) -> DeviceError {
    match e {
        EosShellError::UnexpectedStdout(output) => DeviceError::Rejected(output),
        EosShellError::IoError(e) if e.kind() == io::ErrorKind::TimedOut => {
            DeviceError::Timeout(step)
        }
        e => DeviceError::session(e),
    }
}

impl From<&LabConfig> for ReconcileOptions {
    fn from(config: &LabConfig) -> Self {
        Self {
            workers: config.workers,
            open_timeout: config.timeouts.open,
            command_timeout: config.timeouts.command,
            persist_timeout: config.timeouts.persist,
            close_timeout: config.timeouts.close,
        }
    }
}
