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

//! Tests of the entire pipeline.

use ipnet::Ipv4Net;

use crate::{
    topology::Graph,
    types::{Addressing, Discovery, Neighbor, RouterId},
};

mod addressing;
mod controller;
mod fabric;
#[cfg(feature = "eos-lab")]
mod lab;
mod topology;

/// Parse a subnet.
pub(crate) fn net(s: &str) -> Ipv4Net {
    s.parse().unwrap()
}

/// Create a router id.
pub(crate) fn r(s: &str) -> RouterId {
    RouterId::from(s)
}

/// Build an undirected graph from a list of edges.
pub(crate) fn graph(routers: &[&str], edges: &[(&str, &str)]) -> Graph {
    let mut g = Graph::new();
    for x in routers {
        g.entry(r(x)).or_default();
    }
    for (a, b) in edges {
        g.entry(r(a)).or_default().insert(r(b));
        g.entry(r(b)).or_default().insert(r(a));
    }
    g
}

/// Add a link between `a` and `b` to both inputs. Both sides report each other.
pub(crate) fn link(
    discovery: &mut Discovery,
    addressing: &mut Addressing,
    a: (&str, &str, &str),
    b: (&str, &str, &str),
) {
    let (a_router, a_iface, a_addr) = a;
    let (b_router, b_iface, b_addr) = b;
    discovery.push(a_router, Neighbor::new(a_iface, b_router, b_iface));
    discovery.push(b_router, Neighbor::new(b_iface, a_router, a_iface));
    addressing.insert(a_router, a_iface, net(a_addr));
    addressing.insert(b_router, b_iface, net(b_addr));
}

/// The chain `r1 -- r2 -- r3`, with `10.0.1.0/30` between `r1` and `r2`, and `10.0.2.0/30`
/// between `r2` and `r3`. Every router has a management interface connected to `mgmt`.
pub(crate) fn chain() -> (Discovery, Addressing) {
    let mut discovery = Discovery::new();
    let mut addressing = Addressing::new();
    link(
        &mut discovery,
        &mut addressing,
        ("r1", "Ethernet1", "10.0.1.1/30"),
        ("r2", "Ethernet1", "10.0.1.2/30"),
    );
    link(
        &mut discovery,
        &mut addressing,
        ("r2", "Ethernet2", "10.0.2.1/30"),
        ("r3", "Ethernet1", "10.0.2.2/30"),
    );
    for (i, router) in ["r1", "r2", "r3"].into_iter().enumerate() {
        discovery.push(router, Neighbor::new("Management0", "mgmt", format!("eth{i}")));
        addressing.insert(router, "Management0", net(&format!("192.168.0.{}/24", i + 11)));
    }
    (discovery, addressing)
}

/// The triangle `r1 -- r2 -- r3 -- r1`, with `10.0.1.0/30` between `r1` and `r2`, `10.0.2.0/30`
/// between `r1` and `r3`, and `10.0.3.0/30` between `r2` and `r3`.
pub(crate) fn triangle() -> (Discovery, Addressing) {
    let mut discovery = Discovery::new();
    let mut addressing = Addressing::new();
    link(
        &mut discovery,
        &mut addressing,
        ("r1", "Ethernet1", "10.0.1.1/30"),
        ("r2", "Ethernet1", "10.0.1.2/30"),
    );
    link(
        &mut discovery,
        &mut addressing,
        ("r1", "Ethernet2", "10.0.2.1/30"),
        ("r3", "Ethernet1", "10.0.2.2/30"),
    );
    link(
        &mut discovery,
        &mut addressing,
        ("r2", "Ethernet2", "10.0.3.1/30"),
        ("r3", "Ethernet2", "10.0.3.2/30"),
    );
    (discovery, addressing)
}
