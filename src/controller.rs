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

//! One reconciliation pass: build the topology, compute the GRT, plan the routes, and install
//! them.

use std::{collections::BTreeSet, path::PathBuf, sync::Arc};

use thiserror::Error;

use ipnet::Ipv4Net;

use crate::{
    addressing::{AddressingError, FabricAddressing, FabricLink},
    grt::GlobalRoutingTable,
    plan::{RouteInstallationPlan, RoutePlanner},
    runtime::{
        configure_fabric, DeviceAccess, FabricSummary, ReconcileOptions, ReconcileSummary,
        Reconciler,
    },
    topology::{Topology, TopologyBuilder, TopologyError},
    types::{Addressing, ManagementFilter, RouterId, Telemetry},
};

/// Options of a reconciliation pass.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Management interface policy
    pub filter: ManagementFilter,
    /// Abort on links whose endpoints disagree on the subnet.
    pub strict_links: bool,
    /// Options for installing the routes.
    pub reconcile: ReconcileOptions,
    /// Pool of the fabric link subnets.
    pub fabric_pool: Ipv4Net,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            filter: ManagementFilter::default(),
            strict_links: true,
            reconcile: ReconcileOptions::default(),
            fabric_pool: FabricAddressing::default().pool(),
        }
    }
}

#[cfg(feature = "eos-lab")]
impl From<&eos_lab::config::LabConfig> for ControllerOptions {
    fn from(config: &eos_lab::config::LabConfig) -> Self {
        Self {
            filter: ManagementFilter::new(&config.management_prefixes),
            strict_links: config.strict_links,
            reconcile: config.into(),
            fabric_pool: config.fabric_pool,
        }
    }
}

/// Everything computed in a pass before touching any device.
#[derive(Debug, Clone)]
pub struct ComputedPass {
    /// The topology
    pub topology: Topology,
    /// The Global Routing Table
    pub grt: GlobalRoutingTable,
    /// The routes to install
    pub plan: RouteInstallationPlan,
}

/// Runs reconciliation passes. Nothing is kept between two passes.
#[derive(Debug, Clone)]
pub struct Controller {
    /// Options
    options: ControllerOptions,
}

impl Controller {
    /// Create a new controller.
    pub fn new(options: ControllerOptions) -> Self {
        Self { options }
    }

    /// Compute the topology and the GRT from the telemetry, and plan the routes of every router in
    /// `routers`. Other devices in the topology (like switches or hosts that speak LLDP) are used
    /// for computing paths, but no routes are planned for them.
    pub fn compute(
        &self,
        telemetry: &Telemetry,
        routers: &BTreeSet<RouterId>,
    ) -> Result<ComputedPass, ControllerError> {
        if telemetry.discovery.routers().next().is_none()
            && telemetry.addressing.routers().next().is_none()
        {
            return Err(ControllerError::NoTelemetry);
        }

        let filter = &self.options.filter;
        let addressing = &telemetry.addressing;

        let topology = TopologyBuilder::new(filter.clone())
            .strict(self.options.strict_links)
            .build(&telemetry.discovery, addressing)?;
        let grt = GlobalRoutingTable::build(topology.graph(), addressing, filter);
        log::info!(
            "Computed the GRT of {} routers with {} entries",
            topology.graph().len(),
            grt.len()
        );

        for device in topology.routers().filter(|x| !routers.contains(*x)) {
            log::debug!("[{device}] Not part of the router set, no routes planned");
        }
        let plan = RoutePlanner::new(&topology, addressing, &grt, filter).plan(routers);
        log::info!(
            "Planned {} routes ({} subnets skipped)",
            plan.num_routes(),
            plan.num_skipped()
        );

        Ok(ComputedPass {
            topology,
            grt,
            plan,
        })
    }

    /// Assign the interface addresses of the fabric `links` between `routers`.
    pub fn address_fabric(
        &self,
        routers: &BTreeSet<RouterId>,
        links: &[FabricLink],
    ) -> Result<Addressing, ControllerError> {
        Ok(FabricAddressing::new(self.options.fabric_pool).assign(routers, links)?)
    }

    /// Configure the fabric interfaces on the devices.
    pub async fn configure_fabric<A: DeviceAccess>(
        &self,
        access: Arc<A>,
        addressing: &Addressing,
    ) -> FabricSummary {
        configure_fabric(access, addressing, self.options.reconcile).await
    }

    /// Install the plan on the devices.
    pub async fn apply<A: DeviceAccess>(
        &self,
        access: Arc<A>,
        plan: RouteInstallationPlan,
    ) -> ReconcileSummary {
        Reconciler::new(access, self.options.reconcile)
            .run(plan)
            .await
    }

    /// Run an entire pass: compute the plan of all `routers` and install it.
    pub async fn run<A: DeviceAccess>(
        &self,
        access: Arc<A>,
        telemetry: &Telemetry,
        routers: &BTreeSet<RouterId>,
    ) -> Result<ReconcileSummary, ControllerError> {
        let pass = self.compute(telemetry, routers)?;
        Ok(self.apply(access, pass.plan).await)
    }
}

/// Errors that abort a reconciliation pass.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The topology is inconsistent.
    #[error("{0}")]
    Topology(#[from] TopologyError),
    /// The fabric cannot be addressed.
    #[error("{0}")]
    Addressing(#[from] AddressingError),
    /// Neither discovery nor addressing data is available.
    #[error("No telemetry available for any router")]
    NoTelemetry,
    /// The lab configuration is invalid.
    #[cfg(feature = "eos-lab")]
    #[error("{0}")]
    Config(#[from] eos_lab::config::ConfigError),
    /// Cannot read a file.
    #[error("Cannot read {}: {1}", .0.display())]
    Io(PathBuf, std::io::Error),
    /// Cannot parse the telemetry input.
    #[error("Cannot parse the input: {0}")]
    Json(#[from] serde_json::Error),
}
