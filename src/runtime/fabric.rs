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

//! Push the fabric addressing to the devices.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
};

use ipnet::Ipv4Net;
use tokio::{sync::Semaphore, task::JoinSet};

use super::{
    reconciler::{bounded, open, release},
    DeviceAccess, DeviceError, DeviceSession, ReconcileOptions, RouterFailure, Step,
};
use crate::types::{Addressing, IfaceName, RouterId};

/// Result of configuring the interfaces of a single router.
#[derive(Debug)]
pub struct FabricReport {
    /// The router
    pub router: RouterId,
    /// Interfaces that were configured.
    pub configured: Vec<IfaceName>,
    /// Failure of the router, if any.
    pub failure: Option<RouterFailure>,
    /// The configuration could not be persisted.
    pub persist_error: Option<DeviceError>,
    /// The session had to be closed forcefully.
    pub forced_close: bool,
}

impl FabricReport {
    /// Create an empty report.
    fn new(router: RouterId) -> Self {
        Self {
            router,
            configured: Vec::new(),
            failure: None,
            persist_error: None,
            forced_close: false,
        }
    }

    /// Check if all interfaces were configured and persisted.
    pub fn is_success(&self) -> bool {
        self.failure.is_none() && self.persist_error.is_none()
    }
}

/// Result of configuring the fabric of the entire lab.
#[derive(Debug, Default)]
pub struct FabricSummary {
    /// Report of every router with fabric interfaces.
    routers: BTreeMap<RouterId, FabricReport>,
}

impl FabricSummary {
    /// Get the report of a router.
    pub fn get(&self, router: &RouterId) -> Option<&FabricReport> {
        self.routers.get(router)
    }

    /// Iterate over all reports.
    pub fn iter(&self) -> impl Iterator<Item = &FabricReport> {
        self.routers.values()
    }

    /// Iterate over all routers whose interfaces could not be configured.
    pub fn failed_routers(&self) -> impl Iterator<Item = &FabricReport> {
        self.routers.values().filter(|r| r.failure.is_some())
    }
}

impl fmt::Display for FabricSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} routers addressed, {} failed",
            self.routers.len(),
            self.failed_routers().count()
        )?;
        for r in self.routers.values() {
            writeln!(
                f,
                "  {}: {} interfaces{}",
                r.router,
                r.configured.len(),
                if r.forced_close { ", closed forcefully" } else { "" }
            )?;
            if let Some(failure) = r.failure.as_ref() {
                writeln!(f, "    failed: {failure}")?;
            }
            if let Some(e) = r.persist_error.as_ref() {
                writeln!(f, "    not persisted: {e}")?;
            }
        }
        Ok(())
    }
}

/// Configure the fabric interfaces of every router in `addressing`, with the same worker limit and
/// timeouts as the [`Reconciler`](super::Reconciler). Routers without any interface are not
/// contacted.
pub async fn configure_fabric<A: DeviceAccess>(
    access: Arc<A>,
    addressing: &Addressing,
    options: ReconcileOptions,
) -> FabricSummary {
    let semaphore = Arc::new(Semaphore::new(options.workers.max(1)));
    let mut jobs = JoinSet::new();
    let mut pending = BTreeSet::new();

    for router in addressing.routers() {
        let interfaces: BTreeMap<IfaceName, Ipv4Net> = addressing
            .interfaces(router)
            .map(|(iface, addr)| (iface.clone(), *addr))
            .collect();
        if interfaces.is_empty() {
            continue;
        }
        pending.insert(router.clone());
        let router = router.clone();
        let access = access.clone();
        let semaphore = semaphore.clone();
        jobs.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            configure_router(access.as_ref(), router, interfaces, &options).await
        });
    }

    let mut routers = BTreeMap::new();
    while let Some(result) = jobs.join_next().await {
        match result {
            Ok(report) => {
                pending.remove(&report.router);
                routers.insert(report.router.clone(), report);
            }
            Err(e) => log::error!("Fabric configuration task failed: {e}"),
        }
    }
    for router in pending {
        let mut report = FabricReport::new(router.clone());
        report.failure = Some(RouterFailure::Task(String::from(
            "the task did not return a report",
        )));
        routers.insert(router, report);
    }

    let summary = FabricSummary { routers };
    log::info!(
        "Fabric configured on {} routers ({} failed)",
        summary.routers.len(),
        summary.failed_routers().count()
    );
    summary
}

/// Configure the interfaces of a single router and persist the configuration.
async fn configure_router<A: DeviceAccess>(
    access: &A,
    router: RouterId,
    interfaces: BTreeMap<IfaceName, Ipv4Net>,
    options: &ReconcileOptions,
) -> FabricReport {
    let mut report = FabricReport::new(router.clone());

    let mut session = match open(access, &router, options).await {
        Ok(s) => s,
        Err(e) => {
            report.forced_close = matches!(e, DeviceError::Timeout(_));
            report.failure = Some(RouterFailure::Session(e));
            return report;
        }
    };

    // four lines per interface, plus entering and leaving the configuration mode
    let num_cmds = u32::try_from(4 * interfaces.len() + 2).unwrap_or(u32::MAX);
    let bound = options.command_timeout.saturating_mul(num_cmds);
    match bounded(
        Step::ConfigureInterfaces,
        bound,
        session.configure_interfaces(&interfaces),
    )
    .await
    {
        Ok(()) => {
            log::info!("[{router}] Configured {} interfaces", interfaces.len());
            report.configured = interfaces.into_keys().collect();
            if let Err(e) = bounded(Step::Persist, options.persist_timeout, session.persist()).await
            {
                log::warn!("[{router}] Cannot persist the configuration: {e}");
                report.persist_error = Some(e);
            }
        }
        Err(e) => {
            log::error!("[{router}] Cannot configure the interfaces: {e}");
            report.failure = Some(RouterFailure::Session(e));
        }
    }

    report.forced_close = !release(&mut session, &router, options).await;
    report
}
