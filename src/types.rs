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

//! Basic types shared by all stages: router identifiers, the discovery input (LLDP neighbors per
//! router), the addressing input (interface addresses per router), and the management interface
//! policy.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    net::Ipv4Addr,
};

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

/// Name of an interface, scoped to a router.
pub type IfaceName = String;

/// Identifier of a router (its LLDP system name). Router identifiers are totally ordered, and this
/// order is used to break every tie.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouterId(String);

impl RouterId {
    /// Create a new router identifier.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the name of the router.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RouterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RouterId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RouterId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A neighbor as reported by one router: on the local interface `iface`, the router sees
/// `neighbor` with its interface `neighbor_iface`.
///
/// In JSON, a neighbor is written as the triple `[iface, neighbor, neighbor_iface]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(
    from = "(IfaceName, RouterId, IfaceName)",
    into = "(IfaceName, RouterId, IfaceName)"
)]
pub struct Neighbor {
    /// Local interface
    pub iface: IfaceName,
    /// The router on the other side.
    pub neighbor: RouterId,
    /// The interface of the router on the other side.
    pub neighbor_iface: IfaceName,
}

impl Neighbor {
    /// Create a new neighbor entry.
    pub fn new(
        iface: impl Into<IfaceName>,
        neighbor: impl Into<RouterId>,
        neighbor_iface: impl Into<IfaceName>,
    ) -> Self {
        Self {
            iface: iface.into(),
            neighbor: neighbor.into(),
            neighbor_iface: neighbor_iface.into(),
        }
    }
}

impl From<(IfaceName, RouterId, IfaceName)> for Neighbor {
    fn from((iface, neighbor, neighbor_iface): (IfaceName, RouterId, IfaceName)) -> Self {
        Self {
            iface,
            neighbor,
            neighbor_iface,
        }
    }
}

impl From<Neighbor> for (IfaceName, RouterId, IfaceName) {
    fn from(n: Neighbor) -> Self {
        (n.iface, n.neighbor, n.neighbor_iface)
    }
}

/// A neighbor record `(router, iface, neighbor, neighbor_iface)`, observed on the side of
/// `router`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborRecord<'a> {
    /// The router that reported the neighbor
    pub router: &'a RouterId,
    /// Local interface of the reporting router
    pub iface: &'a str,
    /// The router on the other side
    pub neighbor: &'a RouterId,
    /// Interface of the router on the other side
    pub neighbor_iface: &'a str,
}

/// Discovery input: the ordered list of neighbors reported by each router.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Discovery(BTreeMap<RouterId, Vec<Neighbor>>);

impl Discovery {
    /// Create an empty discovery input.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the neighbors of a router, replacing any previous value.
    pub fn insert(&mut self, router: impl Into<RouterId>, neighbors: Vec<Neighbor>) {
        self.0.insert(router.into(), neighbors);
    }

    /// Append a single neighbor to the list of a router.
    pub fn push(&mut self, router: impl Into<RouterId>, neighbor: Neighbor) {
        self.0.entry(router.into()).or_default().push(neighbor);
    }

    /// Get the neighbors reported by a router (empty if the router is unknown).
    pub fn neighbors(&self, router: &RouterId) -> &[Neighbor] {
        self.0.get(router).map(Vec::as_slice).unwrap_or_default()
    }

    /// Iterate over all routers that reported their neighbors.
    pub fn routers(&self) -> impl Iterator<Item = &RouterId> {
        self.0.keys()
    }

    /// Iterate over all records, ordered by the reporting router and then in reported order.
    pub fn records(&self) -> impl Iterator<Item = NeighborRecord<'_>> {
        self.0.iter().flat_map(|(router, neighbors)| {
            neighbors.iter().map(move |n| NeighborRecord {
                router,
                iface: &n.iface,
                neighbor: &n.neighbor,
                neighbor_iface: &n.neighbor_iface,
            })
        })
    }

    /// Check if no router reported any neighbor.
    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }
}

/// Addressing input: the address (with prefix length) of each interface of each router.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Addressing(BTreeMap<RouterId, BTreeMap<IfaceName, Ipv4Net>>);

impl Addressing {
    /// Create an empty addressing input.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the address of an interface.
    pub fn insert(
        &mut self,
        router: impl Into<RouterId>,
        iface: impl Into<IfaceName>,
        addr: Ipv4Net,
    ) {
        self.0
            .entry(router.into())
            .or_default()
            .insert(iface.into(), addr);
    }

    /// Make sure that the router is known, even if it has no interface address.
    pub fn add_router(&mut self, router: impl Into<RouterId>) {
        self.0.entry(router.into()).or_default();
    }

    /// Get the address of an interface.
    pub fn get(&self, router: &RouterId, iface: &str) -> Option<Ipv4Net> {
        self.0.get(router).and_then(|ifaces| ifaces.get(iface)).copied()
    }

    /// Get only the host address of an interface.
    pub fn addr(&self, router: &RouterId, iface: &str) -> Option<Ipv4Addr> {
        self.get(router, iface).map(|net| net.addr())
    }

    /// Iterate over all routers with addressing information.
    pub fn routers(&self) -> impl Iterator<Item = &RouterId> {
        self.0.keys()
    }

    /// Iterate over all interfaces of a router and their address.
    pub fn interfaces<'a>(
        &'a self,
        router: &RouterId,
    ) -> impl Iterator<Item = (&'a IfaceName, &'a Ipv4Net)> + 'a {
        self.0.get(router).into_iter().flatten()
    }

    /// Get the subnets directly connected to a router, ignoring management interfaces.
    pub fn directly_connected(
        &self,
        router: &RouterId,
        filter: &ManagementFilter,
    ) -> BTreeSet<Ipv4Net> {
        self.interfaces(router)
            .filter(|(iface, _)| !filter.is_management(iface))
            .map(|(_, net)| net.trunc())
            .collect()
    }

    /// Check if no router has any address.
    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeMap::is_empty)
    }
}

/// Discovery and addressing of the entire lab, as collected from the devices (or read from a
/// file).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Neighbors of each router
    #[serde(default)]
    pub discovery: Discovery,
    /// Interface addresses of each router
    #[serde(default)]
    pub addressing: Addressing,
}

impl Telemetry {
    /// All routers that reported discovery or addressing data. Routers that only appear as the
    /// neighbor of another router are not included.
    pub fn routers(&self) -> BTreeSet<RouterId> {
        self.discovery
            .routers()
            .chain(self.addressing.routers())
            .cloned()
            .collect()
    }
}

/// Decides which interfaces are management interfaces. An interface is a management interface if
/// its name starts with one of the configured prefixes, ignoring case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementFilter {
    /// Lower-case prefixes
    prefixes: Vec<String>,
}

impl ManagementFilter {
    /// Create a filter from a list of prefixes.
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(|p| p.as_ref().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Check if the interface is a management interface.
    pub fn is_management(&self, iface: &str) -> bool {
        let iface = iface.to_lowercase();
        self.prefixes.iter().any(|p| iface.starts_with(p.as_str()))
    }
}

impl Default for ManagementFilter {
    fn default() -> Self {
        Self::new(["management"])
    }
}
