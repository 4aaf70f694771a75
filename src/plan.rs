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

//! Compute the static routes that each router needs.
//!
//! For every router `r`, the planner considers every subnet known to the pass (link subnets and
//! the entries of the GRT of `r`) that is not directly connected to `r`:
//!
//! 1. For a link subnet, the endpoint is chosen by [`select_endpoint`]. For any other subnet (a
//!    stub network of a single router), the GRT entry decides.
//! 2. The next-hop router is the second router on the path.
//! 3. The next-hop address is the address of the next-hop router on the interface it uses towards
//!    `r`, as reported by the neighbor records of `r` (the first one wins). If `r` did not report
//!    the next-hop router at all, the first link record between both is used.
//!
//! Subnets that cannot be routed are recorded together with the reason.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    net::Ipv4Addr,
};

use ipnet::Ipv4Net;
use serde::Serialize;

use crate::{
    grt::GlobalRoutingTable,
    selector::{select_endpoint, EndpointSelection},
    topology::Topology,
    types::{Addressing, ManagementFilter, RouterId},
};

/// A static route to install.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct StaticRoute {
    /// Destination subnet
    pub prefix: Ipv4Net,
    /// The neighbor through which the subnet is reached.
    pub next_hop_router: RouterId,
    /// Address of the neighbor.
    pub next_hop: Ipv4Addr,
}

impl fmt::Display for StaticRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} via {} ({})", self.prefix, self.next_hop, self.next_hop_router)
    }
}

/// Why a subnet is not routed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "reason")]
pub enum SkipReason {
    /// No endpoint of the subnet is reachable.
    NoRouteForPrefix,
    /// The address of the next-hop router could not be resolved.
    TopologyAddressMismatch {
        /// The next-hop router
        next_hop_router: RouterId,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoRouteForPrefix => write!(f, "no route"),
            SkipReason::TopologyAddressMismatch { next_hop_router } => {
                write!(f, "cannot resolve the address of next-hop {next_hop_router}")
            }
        }
    }
}

/// A subnet that is not routed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SkippedRoute {
    /// The subnet
    pub prefix: Ipv4Net,
    /// Why it is skipped
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// The routes of a single router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouterPlan {
    /// The router
    pub router: RouterId,
    /// Routes to install, ordered by the prefix.
    pub routes: Vec<StaticRoute>,
    /// Subnets that are not routed, ordered by the prefix.
    pub skipped: Vec<SkippedRoute>,
}

impl RouterPlan {
    /// Create an empty plan.
    pub fn new(router: RouterId) -> Self {
        Self {
            router,
            routes: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

/// The routes of all routers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RouteInstallationPlan(BTreeMap<RouterId, RouterPlan>);

impl RouteInstallationPlan {
    /// Get the plan of a router.
    pub fn get(&self, router: &RouterId) -> Option<&RouterPlan> {
        self.0.get(router)
    }

    /// Iterate over the plan of all routers.
    pub fn iter(&self) -> impl Iterator<Item = &RouterPlan> {
        self.0.values()
    }

    /// Total number of routes.
    pub fn num_routes(&self) -> usize {
        self.0.values().map(|p| p.routes.len()).sum()
    }

    /// Total number of skipped subnets.
    pub fn num_skipped(&self) -> usize {
        self.0.values().map(|p| p.skipped.len()).sum()
    }
}

impl IntoIterator for RouteInstallationPlan {
    type Item = RouterPlan;
    type IntoIter = std::collections::btree_map::IntoValues<RouterId, RouterPlan>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_values()
    }
}

impl FromIterator<RouterPlan> for RouteInstallationPlan {
    fn from_iter<T: IntoIterator<Item = RouterPlan>>(iter: T) -> Self {
        Self(iter.into_iter().map(|p| (p.router.clone(), p)).collect())
    }
}

/// Computes the [`RouterPlan`] of each router.
#[derive(Debug, Clone, Copy)]
pub struct RoutePlanner<'a> {
    /// Topology of the pass
    topology: &'a Topology,
    /// Addressing of the pass
    addressing: &'a Addressing,
    /// Global routing table of the pass
    grt: &'a GlobalRoutingTable,
    /// Management interface policy
    filter: &'a ManagementFilter,
}

impl<'a> RoutePlanner<'a> {
    /// Create a new planner.
    pub fn new(
        topology: &'a Topology,
        addressing: &'a Addressing,
        grt: &'a GlobalRoutingTable,
        filter: &'a ManagementFilter,
    ) -> Self {
        Self {
            topology,
            addressing,
            grt,
            filter,
        }
    }

    /// Compute the plan of all given routers.
    pub fn plan<'r>(
        &self,
        routers: impl IntoIterator<Item = &'r RouterId>,
    ) -> RouteInstallationPlan {
        routers.into_iter().map(|r| self.plan_router(r)).collect()
    }

    /// Compute the plan of a single router.
    pub fn plan_router(&self, router: &RouterId) -> RouterPlan {
        let mut plan = RouterPlan::new(router.clone());
        let local = self.addressing.directly_connected(router, self.filter);
        let links = self.topology.links();

        let prefixes: BTreeSet<Ipv4Net> = links
            .prefixes()
            .copied()
            .chain(self.grt.routes(router).map(|(p, _)| *p))
            .filter(|p| !local.contains(p))
            .collect();

        for prefix in prefixes {
            let path = match select_endpoint(router, &prefix, links, self.grt) {
                EndpointSelection::DirectlyConnected => continue,
                EndpointSelection::Endpoint { path, .. } => Some(path),
                EndpointSelection::NoRoute => None,
                EndpointSelection::UnknownPrefix => {
                    self.grt.route(router, &prefix).map(|e| e.path.clone())
                }
            };

            let Some(next_hop_router) = path.as_ref().and_then(|p| p.next_hop()).cloned() else {
                log::warn!("[{router}] No route for {prefix}");
                plan.skipped.push(SkippedRoute {
                    prefix,
                    reason: SkipReason::NoRouteForPrefix,
                });
                continue;
            };

            match self.resolve_next_hop(router, &next_hop_router) {
                Some(next_hop) => plan.routes.push(StaticRoute {
                    prefix,
                    next_hop_router,
                    next_hop,
                }),
                None => {
                    log::warn!(
                        "[{router}] Cannot resolve the address of {next_hop_router} to reach {prefix}"
                    );
                    plan.skipped.push(SkippedRoute {
                        prefix,
                        reason: SkipReason::TopologyAddressMismatch { next_hop_router },
                    });
                }
            }
        }

        log::debug!(
            "[{router}] {} routes planned, {} skipped",
            plan.routes.len(),
            plan.skipped.len()
        );
        plan
    }

    /// Resolve the address of the neighbor `next_hop` as seen from `router`.
    fn resolve_next_hop(&self, router: &RouterId, next_hop: &RouterId) -> Option<Ipv4Addr> {
        if let Some(n) = self
            .topology
            .neighbors(router)
            .iter()
            .find(|n| &n.neighbor == next_hop)
        {
            return self.addressing.addr(next_hop, &n.neighbor_iface);
        }
        // only the neighbor reported the link
        self.topology
            .links()
            .between(router, next_hop)
            .next()
            .and_then(|l| l.endpoint(next_hop))
            .and_then(|e| e.addr)
    }
}
