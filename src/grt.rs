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

//! GRT Builder: the Global Routing Table.
//!
//! The Global Routing Table maps, for every source router, each reachable destination prefix to a
//! path and its cost. It is computed as follows:
//!
//! 1. For each source, compute the [`ShortestPathTree`].
//! 2. Visit the reachable destinations by descending hop count, ties broken by ascending
//!    [`RouterId`].
//! 3. For each subnet directly connected to the destination that is not directly connected to the
//!    source, insert the path to the destination, unless the subnet already has an entry.
//!
//! As a consequence, a link subnet that is attached to two reachable routers is reached through
//! the endpoint that lies beyond the link as seen from the source. The path to any router (not
//! prefix) can be derived from the stored shortest-path trees, see
//! [`GlobalRoutingTable::router_path`].

use std::{cmp::Reverse, collections::BTreeMap};

use ipnet::Ipv4Net;
use itertools::Itertools;
use serde::Serialize;

use crate::{
    path::{Path, ShortestPathTree},
    topology::Graph,
    types::{Addressing, ManagementFilter, RouterId},
};

/// An entry in the GRT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrtEntry {
    /// Path from the source to a router that is directly connected to the prefix
    pub path: Path,
    /// Number of hops
    pub cost: usize,
}

/// The Global Routing Table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalRoutingTable {
    /// Prefix-keyed table of every source.
    routes: BTreeMap<RouterId, BTreeMap<Ipv4Net, GrtEntry>>,
    /// Shortest-path tree of every source.
    trees: BTreeMap<RouterId, ShortestPathTree>,
}

impl GlobalRoutingTable {
    /// Compute the GRT for all routers of the graph.
    pub fn build(graph: &Graph, addressing: &Addressing, filter: &ManagementFilter) -> Self {
        let connected: BTreeMap<&RouterId, _> = graph
            .keys()
            .map(|r| (r, addressing.directly_connected(r, filter)))
            .collect();

        let mut routes = BTreeMap::new();
        let mut trees = BTreeMap::new();

        for src in graph.keys() {
            let tree = ShortestPathTree::compute(graph, src);
            let local = connected.get(src);
            let mut table = BTreeMap::new();

            let destinations = tree
                .reachable()
                .filter(|(dst, _)| *dst != src)
                .sorted_by_key(|(dst, dist)| (Reverse(*dist), *dst));

            for (dst, dist) in destinations {
                let Some(path) = tree.path_to(dst) else {
                    continue;
                };
                for prefix in connected.get(dst).into_iter().flatten() {
                    if local.map_or(false, |l| l.contains(prefix)) {
                        continue;
                    }
                    table.entry(*prefix).or_insert_with(|| GrtEntry {
                        path: path.clone(),
                        cost: dist,
                    });
                }
            }

            log::trace!("[{src}] {} entries in the GRT", table.len());
            routes.insert(src.clone(), table);
            trees.insert(src.clone(), tree);
        }

        Self { routes, trees }
    }

    /// Get all entries of a source (empty if the source is unknown).
    pub fn routes(&self, src: &RouterId) -> impl Iterator<Item = (&Ipv4Net, &GrtEntry)> {
        self.routes.get(src).into_iter().flatten()
    }

    /// Get the entry of a source towards a prefix.
    pub fn route(&self, src: &RouterId, prefix: &Ipv4Net) -> Option<&GrtEntry> {
        self.routes.get(src).and_then(|table| table.get(prefix))
    }

    /// Get the shortest path from `src` towards the router `dst`, derived from the shortest-path
    /// tree of `src`. Returns `None` if `dst` is not reachable.
    pub fn router_path(&self, src: &RouterId, dst: &RouterId) -> Option<Path> {
        self.trees.get(src).and_then(|tree| tree.path_to(dst))
    }

    /// Get the number of hops from `src` towards `dst`, or `None` if it is not reachable.
    pub fn router_cost(&self, src: &RouterId, dst: &RouterId) -> Option<usize> {
        self.trees.get(src).and_then(|tree| tree.distance(dst))
    }

    /// Iterate over all source routers.
    pub fn sources(&self) -> impl Iterator<Item = &RouterId> {
        self.routes.keys()
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.routes.values().map(BTreeMap::len).sum()
    }

    /// Check if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
