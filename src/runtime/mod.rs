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

//! Apply the [`RouteInstallationPlan`](crate::plan::RouteInstallationPlan) to the devices.
//!
//! The devices are accessed through the traits [`DeviceAccess`] and [`DeviceSession`]. The
//! [`Reconciler`] drives one session per router, running multiple routers in parallel (bounded by
//! the number of workers). [`configure_fabric`] pushes the interface addresses of the fabric the
//! same way. Every interaction with a device is bounded by a timeout, and every
//! opened session is closed, forcefully if needed.
//!
//! With the feature `eos-lab`, the module [`lab`] implements the traits for Arista EOS routers,
//! and [`collect`] reads the discovery and addressing data from the routers.

use std::{collections::BTreeMap, fmt, time::Duration};

use async_trait::async_trait;
use ipnet::Ipv4Net;
use thiserror::Error;

use crate::{
    plan::StaticRoute,
    types::{IfaceName, RouterId},
};

mod fabric;
mod reconciler;
pub use fabric::{configure_fabric, FabricReport, FabricSummary};
pub use reconciler::{ReconcileSummary, Reconciler, RouterFailure, RouterReport, SessionState};

#[cfg(feature = "eos-lab")]
pub mod collect;
#[cfg(feature = "eos-lab")]
pub mod lab;

/// Opens sessions towards devices.
#[async_trait]
pub trait DeviceAccess: Send + Sync + 'static {
    /// The session type
    type Session: DeviceSession;

    /// Open a session towards the router, ready to receive commands.
    async fn open(&self, router: &RouterId) -> Result<Self::Session, DeviceError>;

    /// Forcefully tear down whatever an interrupted [`DeviceAccess::open`] left behind (like the
    /// transport towards the device). Called when opening the session did not finish in time.
    async fn abort_open(&self, router: &RouterId) -> Result<(), DeviceError>;
}

/// A session with a single device. All calls are bounded by the caller.
#[async_trait]
pub trait DeviceSession: Send + 'static {
    /// Enter the configuration mode.
    async fn enter_config(&mut self) -> Result<(), DeviceError>;

    /// Install a single static route. Installing an existing route must have no effect.
    async fn install_route(&mut self, route: &StaticRoute) -> Result<(), DeviceError>;

    /// Leave the configuration mode.
    async fn exit_config(&mut self) -> Result<(), DeviceError>;

    /// Turn each interface into an enabled routed port with the given address. This enters and
    /// leaves the configuration mode on its own.
    async fn configure_interfaces(
        &mut self,
        interfaces: &BTreeMap<IfaceName, Ipv4Net>,
    ) -> Result<(), DeviceError>;

    /// Persist the running configuration.
    async fn persist(&mut self) -> Result<(), DeviceError>;

    /// Gracefully close the session (channel and transport).
    async fn close(&mut self) -> Result<(), DeviceError>;

    /// Forcefully close the channel.
    async fn close_channel(&mut self) -> Result<(), DeviceError>;

    /// Forcefully close the transport.
    async fn close_transport(&mut self) -> Result<(), DeviceError>;
}

/// A step in the interaction with a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Opening the session
    Open,
    /// Entering configuration mode
    EnterConfig,
    /// Installing a route
    InstallRoute,
    /// Leaving configuration mode
    ExitConfig,
    /// Configuring the fabric interfaces
    ConfigureInterfaces,
    /// Persisting the configuration
    Persist,
    /// Closing the session gracefully
    Close,
    /// Closing the channel forcefully
    CloseChannel,
    /// Closing the transport forcefully
    CloseTransport,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::Open => "opening the session",
            Step::EnterConfig => "entering configuration mode",
            Step::InstallRoute => "installing a route",
            Step::ExitConfig => "leaving configuration mode",
            Step::ConfigureInterfaces => "configuring the interfaces",
            Step::Persist => "persisting the configuration",
            Step::Close => "closing the session",
            Step::CloseChannel => "closing the channel",
            Step::CloseTransport => "closing the transport",
        })
    }
}

/// Error while interacting with a device.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The step did not finish in time.
    #[error("Timeout while {0}")]
    Timeout(Step),
    /// The device is not known to the device access layer.
    #[error("Router {0} is unknown")]
    UnknownRouter(RouterId),
    /// The device rejected a command.
    #[error("Command rejected: {0}")]
    Rejected(String),
    /// The session failed.
    #[error("Session failure: {0}")]
    Session(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl DeviceError {
    /// Wrap any error as a session failure.
    pub fn session(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Session(Box::new(e))
    }
}

/// Options of the [`Reconciler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Maximum number of routers that are configured simultaneously.
    pub workers: usize,
    /// Bound for opening a session.
    pub open_timeout: Duration,
    /// Bound for a single command.
    pub command_timeout: Duration,
    /// Bound for persisting the configuration.
    pub persist_timeout: Duration,
    /// Bound for each step of closing the session.
    pub close_timeout: Duration,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            open_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
            persist_timeout: Duration::from_secs(30),
            close_timeout: Duration::from_secs(5),
        }
    }
}
