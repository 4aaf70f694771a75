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

//! Endpoint Selector: decide through which endpoint of a link a router reaches the link's subnet.

use ipnet::Ipv4Net;

use crate::{grt::GlobalRoutingTable, path::Path, topology::LinkDb, types::RouterId};

/// The outcome of [`select_endpoint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointSelection {
    /// The router is one of the endpoints. Nothing to do.
    DirectlyConnected,
    /// Reach the subnet through this endpoint, using the given path.
    Endpoint {
        /// The selected endpoint
        router: RouterId,
        /// Shortest path towards the selected endpoint
        path: Path,
    },
    /// Neither endpoint is reachable.
    NoRoute,
    /// No link has this subnet.
    UnknownPrefix,
}

/// Select the endpoint of the link with subnet `prefix` through which `router` should reach that
/// subnet.
///
/// - If `router` is an endpoint of the link, the subnet is directly connected.
/// - If only one endpoint is reachable, that endpoint is selected.
/// - If both are reachable, the one with fewer hops is selected. On a tie, endpoint `a` (the
///   smaller one in canonical order) is selected.
/// - If neither is reachable, there is no route.
pub fn select_endpoint(
    router: &RouterId,
    prefix: &Ipv4Net,
    links: &LinkDb,
    grt: &GlobalRoutingTable,
) -> EndpointSelection {
    let Some(link) = links.get_by_prefix(prefix) else {
        return EndpointSelection::UnknownPrefix;
    };
    let (a, b) = (&link.a.router, &link.b.router);
    if router == a || router == b {
        return EndpointSelection::DirectlyConnected;
    }

    let path_a = grt.router_path(router, a);
    let path_b = grt.router_path(router, b);

    let selected = match (path_a, path_b) {
        (Some(pa), Some(pb)) if pb.cost() < pa.cost() => Some((b, pb)),
        (Some(pa), _) => Some((a, pa)),
        (None, Some(pb)) => Some((b, pb)),
        (None, None) => None,
    };

    match selected {
        Some((endpoint, path)) => {
            log::trace!(
                "[{router}] reach {prefix} via {endpoint} (cost {})",
                path.cost()
            );
            EndpointSelection::Endpoint {
                router: endpoint.clone(),
                path,
            }
        }
        None => EndpointSelection::NoRoute,
    }
}
