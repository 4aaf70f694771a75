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

//! Collect the discovery and addressing data from all routers of the lab.

use std::sync::Arc;

use eos_lab::EosLab;
use tokio::{sync::Semaphore, task::JoinSet, time::timeout};

use crate::{
    controller::ControllerError,
    types::{Neighbor, Telemetry},
};

/// Read the LLDP neighbors and interface addresses of every router of the lab, at most `workers`
/// routers at the same time. Routers that cannot be reached are logged and left out. Fails only if
/// no router could be read at all.
pub async fn collect_telemetry(lab: Arc<EosLab>) -> Result<Telemetry, ControllerError> {
    let config = lab.config();
    let semaphore = Arc::new(Semaphore::new(config.workers.max(1)));
    // connecting plus two show commands
    let bound = config.timeouts.open + config.timeouts.command * 2;
    let mut jobs = JoinSet::new();

    for router in lab.routers() {
        let router = router.to_string();
        let lab = lab.clone();
        let semaphore = semaphore.clone();
        jobs.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let result = timeout(bound, lab.get_telemetry(&router)).await;
            (router, result)
        });
    }

    let mut telemetry = Telemetry::default();
    let mut num_failed = 0;
    while let Some(job) = jobs.join_next().await {
        match job {
            Ok((router, Ok(Ok(data)))) => {
                telemetry.discovery.insert(
                    router.as_str(),
                    data.neighbors
                        .into_iter()
                        .map(|n| Neighbor::new(n.iface, n.neighbor, n.neighbor_iface))
                        .collect(),
                );
                telemetry.addressing.add_router(router.as_str());
                for (iface, addr) in data.addresses {
                    telemetry.addressing.insert(router.as_str(), iface, addr);
                }
            }
            Ok((router, Ok(Err(e)))) => {
                log::error!("[{router}] Cannot collect telemetry: {e}");
                num_failed += 1;
            }
            Ok((router, Err(_))) => {
                log::error!("[{router}] Timeout while collecting telemetry");
                num_failed += 1;
            }
            Err(e) => {
                log::error!("Telemetry task failed: {e}");
                num_failed += 1;
            }
        }
    }

    let num_collected = telemetry.discovery.routers().count();
    if num_collected == 0 {
        return Err(ControllerError::NoTelemetry);
    }
    log::info!("Collected telemetry of {num_collected} routers ({num_failed} failed)");
    Ok(telemetry)
}
