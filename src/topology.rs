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

//! Topology Builder: turn per-router neighbor records into an undirected adjacency graph and a
//! de-duplicated set of link records.

use std::{
    collections::{btree_map::Entry, BTreeMap, BTreeSet},
    net::Ipv4Addr,
};

use ipnet::Ipv4Net;
use serde::Serialize;
use thiserror::Error;

use crate::types::{Addressing, Discovery, IfaceName, ManagementFilter, Neighbor, RouterId};

/// Undirected adjacency graph. Symmetric and free of self-loops. Every router known to the pass
/// is a node, even if it has no neighbors.
pub type Graph = BTreeMap<RouterId, BTreeSet<RouterId>>;

/// One side of a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkEndpoint {
    /// Router
    pub router: RouterId,
    /// Interface of the router
    pub iface: IfaceName,
    /// Address of the interface, if known.
    pub addr: Option<Ipv4Addr>,
}

/// Canonical key of a link: the two `(router, interface)` pairs in ascending order.
pub type LinkKey = ((RouterId, IfaceName), (RouterId, IfaceName));

/// Build the canonical key of a link.
pub fn link_key(a: (&RouterId, &str), b: (&RouterId, &str)) -> LinkKey {
    let a = (a.0.clone(), a.1.to_string());
    let b = (b.0.clone(), b.1.to_string());
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// A de-duplicated, undirected link. Endpoint `a` is always the smaller `(router, interface)`
/// pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkRecord {
    /// The smaller endpoint
    pub a: LinkEndpoint,
    /// The larger endpoint
    pub b: LinkEndpoint,
    /// Subnet of the link
    pub prefix: Ipv4Net,
}

impl LinkRecord {
    /// Get the endpoint of the given router, if the router is part of the link.
    pub fn endpoint(&self, router: &RouterId) -> Option<&LinkEndpoint> {
        if &self.a.router == router {
            Some(&self.a)
        } else if &self.b.router == router {
            Some(&self.b)
        } else {
            None
        }
    }

    /// Check if the link connects `x` and `y` (in any order).
    pub fn connects(&self, x: &RouterId, y: &RouterId) -> bool {
        (&self.a.router == x && &self.b.router == y) || (&self.a.router == y && &self.b.router == x)
    }
}

/// All links, keyed by their canonical key, with an index from the subnet to the link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkDb {
    /// Links by canonical key
    links: BTreeMap<LinkKey, LinkRecord>,
    /// Subnet to the first link (in canonical order) with that subnet.
    by_prefix: BTreeMap<Ipv4Net, LinkKey>,
}

impl LinkDb {
    /// Add a link. The prefix index keeps the smallest key for each prefix.
    fn insert(&mut self, key: LinkKey, link: LinkRecord) {
        match self.by_prefix.entry(link.prefix) {
            Entry::Vacant(e) => {
                e.insert(key.clone());
            }
            Entry::Occupied(mut e) => {
                log::warn!(
                    "Subnet {} is used on multiple links ({}/{} and {}/{})",
                    link.prefix,
                    link.a.router,
                    link.b.router,
                    e.get().0 .0,
                    e.get().1 .0,
                );
                if &key < e.get() {
                    e.insert(key.clone());
                }
            }
        }
        self.links.insert(key, link);
    }

    /// Iterate over all links in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &LinkRecord> {
        self.links.values()
    }

    /// Get the link with the given subnet.
    pub fn get_by_prefix(&self, prefix: &Ipv4Net) -> Option<&LinkRecord> {
        self.by_prefix.get(prefix).and_then(|k| self.links.get(k))
    }

    /// Iterate over all link subnets in ascending order.
    pub fn prefixes(&self) -> impl Iterator<Item = &Ipv4Net> {
        self.by_prefix.keys()
    }

    /// Iterate over all links connecting `x` and `y`, in canonical order.
    pub fn between<'a>(
        &'a self,
        x: &'a RouterId,
        y: &'a RouterId,
    ) -> impl Iterator<Item = &'a LinkRecord> + 'a {
        self.links.values().filter(move |l| l.connects(x, y))
    }

    /// Number of links
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Check if there are no links.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// The result of the Topology Builder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    /// Adjacency graph
    graph: Graph,
    /// De-duplicated links
    links: LinkDb,
    /// Neighbors reported by each router, without management interfaces and self-loops.
    neighbors: BTreeMap<RouterId, Vec<Neighbor>>,
}

impl Topology {
    /// Get the adjacency graph.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Get all links.
    pub fn links(&self) -> &LinkDb {
        &self.links
    }

    /// Get the neighbors reported by `router` that were accepted into the topology, in reported
    /// order.
    pub fn neighbors(&self, router: &RouterId) -> &[Neighbor] {
        self.neighbors
            .get(router)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Iterate over all routers.
    pub fn routers(&self) -> impl Iterator<Item = &RouterId> {
        self.graph.keys()
    }
}

/// Builder for the [`Topology`].
///
/// Records are processed ordered by the reporting router and then in reported order. For each
/// record:
///
/// 1. Records on management interfaces (on either side) and self-loops are skipped.
/// 2. The edge is added to the graph in both directions.
/// 3. The first record of each link (identified by the unordered pair of `(router, interface)`)
///    creates the link record. Later records of the same link are ignored. The subnet is taken
///    from the addressing input of either endpoint. If both endpoints are addressed, they must be
///    in the same subnet, otherwise the link is inconsistent (see [`TopologyBuilder::strict`]). If
///    neither endpoint is addressed, no link record is created (but the edge remains).
#[derive(Debug, Clone)]
pub struct TopologyBuilder {
    /// Management interface policy
    filter: ManagementFilter,
    /// Fail on inconsistent links
    strict: bool,
}

impl TopologyBuilder {
    /// Create a new (strict) builder.
    pub fn new(filter: ManagementFilter) -> Self {
        Self {
            filter,
            strict: true,
        }
    }

    /// If `strict` (the default), an inconsistent link aborts the build with
    /// [`TopologyError::DataIntegrity`]. Otherwise, the inconsistent link is logged and skipped,
    /// while the edge stays in the graph.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Build the topology.
    pub fn build(
        &self,
        discovery: &Discovery,
        addressing: &Addressing,
    ) -> Result<Topology, TopologyError> {
        let mut graph = Graph::new();
        let mut links = LinkDb::default();
        let mut neighbors: BTreeMap<RouterId, Vec<Neighbor>> = BTreeMap::new();
        let mut seen: BTreeSet<LinkKey> = BTreeSet::new();

        for r in discovery.routers().chain(addressing.routers()) {
            graph.entry(r.clone()).or_default();
        }

        for rec in discovery.records() {
            if self.filter.is_management(rec.iface) || self.filter.is_management(rec.neighbor_iface)
            {
                log::warn!(
                    "[{}] Ignoring neighbor {} on management interface ({} -> {})",
                    rec.router,
                    rec.neighbor,
                    rec.iface,
                    rec.neighbor_iface
                );
                continue;
            }
            if rec.router == rec.neighbor {
                log::warn!(
                    "[{}] Ignoring self-loop ({} -> {})",
                    rec.router,
                    rec.iface,
                    rec.neighbor_iface
                );
                continue;
            }

            graph
                .entry(rec.router.clone())
                .or_default()
                .insert(rec.neighbor.clone());
            graph
                .entry(rec.neighbor.clone())
                .or_default()
                .insert(rec.router.clone());
            neighbors
                .entry(rec.router.clone())
                .or_default()
                .push(Neighbor::new(rec.iface, rec.neighbor.clone(), rec.neighbor_iface));

            let key = link_key((rec.router, rec.iface), (rec.neighbor, rec.neighbor_iface));
            if !seen.insert(key.clone()) {
                continue;
            }

            match make_link(&key, addressing) {
                Ok(Some(link)) => links.insert(key, link),
                Ok(None) => log::warn!(
                    "Link {}:{} -- {}:{} has no address on either side, ignoring its subnet",
                    key.0 .0,
                    key.0 .1,
                    key.1 .0,
                    key.1 .1
                ),
                Err(e) if self.strict => {
                    log::error!("{e}");
                    return Err(e);
                }
                Err(e) => log::error!("{e}. Skipping the link!"),
            }
        }

        log::debug!(
            "Built topology with {} routers and {} links",
            graph.len(),
            links.len()
        );

        Ok(Topology {
            graph,
            links,
            neighbors,
        })
    }
}

/// Build the link record for the key, using the addressing input.
fn make_link(key: &LinkKey, addressing: &Addressing) -> Result<Option<LinkRecord>, TopologyError> {
    let ((a_router, a_iface), (b_router, b_iface)) = key;
    let a_net = addressing.get(a_router, a_iface);
    let b_net = addressing.get(b_router, b_iface);

    let prefix = match (a_net, b_net) {
        (Some(a), Some(b)) if a.trunc() != b.trunc() => {
            return Err(TopologyError::DataIntegrity {
                a_router: a_router.clone(),
                a_iface: a_iface.clone(),
                a_net: a,
                b_router: b_router.clone(),
                b_iface: b_iface.clone(),
                b_net: b,
            })
        }
        (Some(net), _) | (None, Some(net)) => net.trunc(),
        (None, None) => return Ok(None),
    };

    Ok(Some(LinkRecord {
        a: LinkEndpoint {
            router: a_router.clone(),
            iface: a_iface.clone(),
            addr: a_net.map(|n| n.addr()),
        },
        b: LinkEndpoint {
            router: b_router.clone(),
            iface: b_iface.clone(),
            addr: b_net.map(|n| n.addr()),
        },
        prefix,
    }))
}

/// Errors while building the topology.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    /// The two endpoints of a link are in different subnets.
    #[error("Inconsistent link: {a_router}:{a_iface} has {a_net} but {b_router}:{b_iface} has {b_net}")]
    DataIntegrity {
        /// Router of the first endpoint
        a_router: RouterId,
        /// Interface of the first endpoint
        a_iface: IfaceName,
        /// Address of the first endpoint
        a_net: Ipv4Net,
        /// Router of the second endpoint
        b_router: RouterId,
        /// Interface of the second endpoint
        b_iface: IfaceName,
        /// Address of the second endpoint
        b_net: Ipv4Net,
    },
}
