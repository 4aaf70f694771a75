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

use std::collections::BTreeSet;

use maplit::btreeset;
use pretty_assertions::assert_eq;

use super::{chain, net, r};
use crate::{
    addressing::{AddressingError, FabricAddressing},
    topology::TopologyBuilder,
    types::{Addressing, ManagementFilter, RouterId},
};

fn lab(routers: &[&str]) -> BTreeSet<RouterId> {
    routers.iter().map(|x| r(x)).collect()
}

#[test]
fn chain_addressing() {
    let addressing = FabricAddressing::default()
        .assign(
            &lab(&["r1", "r2", "r3"]),
            &[(r("r1"), r("r2")), (r("r2"), r("r3"))],
        )
        .unwrap();

    let mut exp = Addressing::new();
    exp.insert("r1", "Ethernet1", net("10.0.1.1/30"));
    exp.insert("r2", "Ethernet1", net("10.0.1.2/30"));
    exp.insert("r2", "Ethernet2", net("10.0.2.1/30"));
    exp.insert("r3", "Ethernet1", net("10.0.2.2/30"));
    assert_eq!(addressing, exp);

    // same addresses as the chain that the routers would report
    let (_, reported) = chain();
    for router in ["r1", "r2", "r3"] {
        let fabric: Vec<_> = reported
            .interfaces(&r(router))
            .filter(|(iface, _)| iface.starts_with("Ethernet"))
            .collect();
        assert_eq!(fabric, addressing.interfaces(&r(router)).collect::<Vec<_>>());
    }
}

#[test]
fn consistent_topology() {
    let (discovery, _) = chain();
    let addressing = FabricAddressing::default()
        .assign(
            &lab(&["r1", "r2", "r3"]),
            &[(r("r1"), r("r2")), (r("r2"), r("r3"))],
        )
        .unwrap();
    let topo = TopologyBuilder::new(ManagementFilter::default())
        .build(&discovery, &addressing)
        .unwrap();
    assert_eq!(topo.links().len(), 2);
    assert!(topo.links().get_by_prefix(&net("10.0.1.0/30")).is_some());
    assert!(topo.links().get_by_prefix(&net("10.0.2.0/30")).is_some());
}

#[test]
fn routers_without_links() {
    let addressing = FabricAddressing::default()
        .assign(&lab(&["r1", "r2", "r3"]), &[(r("r3"), r("r1"))])
        .unwrap();
    assert_eq!(
        addressing.routers().cloned().collect::<Vec<_>>(),
        vec![r("r1"), r("r2"), r("r3")]
    );
    assert_eq!(addressing.interfaces(&r("r2")).count(), 0);
    // the first router of the link gets the lower address
    assert_eq!(addressing.get(&r("r3"), "Ethernet1"), Some(net("10.0.1.1/30")));
    assert_eq!(addressing.get(&r("r1"), "Ethernet1"), Some(net("10.0.1.2/30")));
}

#[test]
fn parallel_links() {
    let addressing = FabricAddressing::new(net("172.16.0.0/12"))
        .iface_prefix("Eth")
        .assign(&lab(&["r1", "r2"]), &[(r("r1"), r("r2")), (r("r2"), r("r1"))])
        .unwrap();
    assert_eq!(addressing.get(&r("r1"), "Eth1"), Some(net("172.16.1.1/30")));
    assert_eq!(addressing.get(&r("r2"), "Eth1"), Some(net("172.16.1.2/30")));
    assert_eq!(addressing.get(&r("r2"), "Eth2"), Some(net("172.16.2.1/30")));
    assert_eq!(addressing.get(&r("r1"), "Eth2"), Some(net("172.16.2.2/30")));
}

#[test]
fn pool_is_truncated() {
    let fabric = FabricAddressing::new(net("10.1.2.3/16"));
    assert_eq!(fabric.pool(), net("10.1.0.0/16"));
    assert_eq!(fabric.capacity(), 255);
    assert_eq!(FabricAddressing::new(net("10.0.0.0/24")).capacity(), 0);
    assert_eq!(FabricAddressing::new(net("10.0.0.0/30")).capacity(), 0);
}

#[test]
fn invalid_links() {
    let fabric = FabricAddressing::default();
    let routers = lab(&["r1", "r2"]);
    assert_eq!(
        fabric.assign(&routers, &[(r("r1"), r("sw1"))]),
        Err(AddressingError::UnknownRouter(r("sw1")))
    );
    assert_eq!(
        fabric.assign(&routers, &[(r("r2"), r("r2"))]),
        Err(AddressingError::SelfLink(r("r2")))
    );
}

#[test]
fn pool_exhausted() {
    let fabric = FabricAddressing::new(net("10.0.0.0/23"));
    let routers = btreeset! {r("r1"), r("r2"), r("r3")};
    assert!(fabric.assign(&routers, &[(r("r1"), r("r2"))]).is_ok());
    assert_eq!(
        fabric.assign(&routers, &[(r("r1"), r("r2")), (r("r2"), r("r3"))]),
        Err(AddressingError::PoolExhausted {
            pool: net("10.0.0.0/23"),
            available: 1,
            links: 2,
        })
    );
    // a pool without room for any link still works for a lab without links
    let addressing = FabricAddressing::new(net("10.0.0.0/28"))
        .assign(&routers, &[])
        .unwrap();
    assert!(addressing.is_empty());
}
