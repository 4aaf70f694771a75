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

use maplit::{btreemap, btreeset};
use pretty_assertions::assert_eq;

use super::{chain, net, r};
use crate::{
    topology::{link_key, LinkEndpoint, LinkRecord, TopologyBuilder, TopologyError},
    types::{Addressing, Discovery, ManagementFilter, Neighbor},
};

fn builder() -> TopologyBuilder {
    TopologyBuilder::new(ManagementFilter::default())
}

#[test_log::test]
fn chain_graph() {
    let (discovery, addressing) = chain();
    let topo = builder().build(&discovery, &addressing).unwrap();
    assert_eq!(
        topo.graph(),
        &btreemap! {
            r("r1") => btreeset! {r("r2")},
            r("r2") => btreeset! {r("r1"), r("r3")},
            r("r3") => btreeset! {r("r2")},
        }
    );
}

#[test_log::test]
fn chain_links() {
    let (discovery, addressing) = chain();
    let topo = builder().build(&discovery, &addressing).unwrap();
    assert_eq!(topo.links().len(), 2);
    assert_eq!(
        topo.links().get_by_prefix(&net("10.0.1.0/30")),
        Some(&LinkRecord {
            a: LinkEndpoint {
                router: r("r1"),
                iface: "Ethernet1".to_string(),
                addr: Some("10.0.1.1".parse().unwrap()),
            },
            b: LinkEndpoint {
                router: r("r2"),
                iface: "Ethernet1".to_string(),
                addr: Some("10.0.1.2".parse().unwrap()),
            },
            prefix: net("10.0.1.0/30"),
        })
    );
    let l = topo.links().get_by_prefix(&net("10.0.2.0/30")).unwrap();
    assert_eq!((&l.a.router, &l.b.router), (&r("r2"), &r("r3")));
    assert_eq!(
        topo.links().prefixes().copied().collect::<Vec<_>>(),
        vec![net("10.0.1.0/30"), net("10.0.2.0/30")]
    );
}

#[test_log::test]
fn graph_is_symmetric() {
    let (mut discovery, addressing) = chain();
    // only r3 sees r4
    discovery.push("r3", Neighbor::new("Ethernet2", "r4", "Ethernet1"));
    let topo = builder().build(&discovery, &addressing).unwrap();
    for (x, neighbors) in topo.graph() {
        for y in neighbors {
            assert!(topo.graph()[y].contains(x), "{y} does not contain {x}");
        }
    }
    assert_eq!(topo.graph()[&r("r4")], btreeset! {r("r3")});
}

#[test_log::test]
fn management_records_discarded() {
    let (discovery, addressing) = chain();
    let topo = builder().build(&discovery, &addressing).unwrap();
    assert!(!topo.graph().contains_key(&r("mgmt")));
    assert!(topo
        .links()
        .iter()
        .all(|l| !l.a.iface.starts_with("Management") && !l.b.iface.starts_with("Management")));
    assert!(topo
        .neighbors(&r("r1"))
        .iter()
        .all(|n| n.neighbor != r("mgmt")));
    // management subnet is never a link
    assert_eq!(topo.links().get_by_prefix(&net("192.168.0.0/24")), None);
}

#[test_log::test]
fn management_on_the_remote_side() {
    let mut discovery = Discovery::new();
    discovery.push("r1", Neighbor::new("Ethernet1", "r2", "mgmt0"));
    let filter = ManagementFilter::new(["Management", "mgmt"]);
    let topo = TopologyBuilder::new(filter)
        .build(&discovery, &Addressing::new())
        .unwrap();
    assert_eq!(topo.graph(), &btreemap! {r("r1") => btreeset! {}});
}

#[test_log::test]
fn self_loop_ignored() {
    let (mut discovery, addressing) = chain();
    discovery.push("r1", Neighbor::new("Ethernet3", "r1", "Ethernet4"));
    let topo = builder().build(&discovery, &addressing).unwrap();
    assert_eq!(topo.graph()[&r("r1")], btreeset! {r("r2")});
    assert_eq!(topo.links().len(), 2);
}

#[test_log::test]
fn idempotent() {
    let (discovery, addressing) = chain();
    let a = builder().build(&discovery, &addressing).unwrap();
    let b = builder().build(&discovery, &addressing).unwrap();
    assert_eq!(a, b);
}

#[test_log::test]
fn duplicate_records() {
    let (discovery, addressing) = chain();
    let (mut duplicated, _) = chain();
    duplicated.push("r1", Neighbor::new("Ethernet1", "r2", "Ethernet1"));
    let a = builder().build(&discovery, &addressing).unwrap();
    let b = builder().build(&duplicated, &addressing).unwrap();
    assert_eq!(a.graph(), b.graph());
    assert_eq!(a.links(), b.links());
}

#[test_log::test]
fn asymmetric_discovery() {
    let (_, addressing) = chain();
    let mut discovery = Discovery::new();
    discovery.push("r2", Neighbor::new("Ethernet1", "r1", "Ethernet1"));
    discovery.push("r2", Neighbor::new("Ethernet2", "r3", "Ethernet1"));
    let topo = builder().build(&discovery, &addressing).unwrap();
    assert_eq!(
        topo.graph(),
        &btreemap! {
            r("r1") => btreeset! {r("r2")},
            r("r2") => btreeset! {r("r1"), r("r3")},
            r("r3") => btreeset! {r("r2")},
        }
    );
    assert_eq!(topo.links().len(), 2);
    assert!(topo.neighbors(&r("r1")).is_empty());
}

#[test_log::test]
fn mismatched_subnets() {
    let (discovery, mut addressing) = chain();
    addressing.insert("r2", "Ethernet1", net("10.0.3.2/30"));
    let err = builder().build(&discovery, &addressing).unwrap_err();
    assert_eq!(
        err,
        TopologyError::DataIntegrity {
            a_router: r("r1"),
            a_iface: "Ethernet1".to_string(),
            a_net: net("10.0.1.1/30"),
            b_router: r("r2"),
            b_iface: "Ethernet1".to_string(),
            b_net: net("10.0.3.2/30"),
        }
    );
}

#[test_log::test]
fn mismatched_masks() {
    let (discovery, mut addressing) = chain();
    addressing.insert("r2", "Ethernet1", net("10.0.1.2/24"));
    assert!(matches!(
        builder().build(&discovery, &addressing),
        Err(TopologyError::DataIntegrity { .. })
    ));
}

#[test_log::test]
fn mismatched_subnets_lenient() {
    let (discovery, mut addressing) = chain();
    addressing.insert("r2", "Ethernet1", net("10.0.3.2/30"));
    let topo = builder()
        .strict(false)
        .build(&discovery, &addressing)
        .unwrap();
    // the edge remains, but the link is gone
    assert_eq!(topo.graph()[&r("r1")], btreeset! {r("r2")});
    assert_eq!(topo.links().len(), 1);
    assert_eq!(topo.links().get_by_prefix(&net("10.0.1.0/30")), None);
    assert!(topo.links().get_by_prefix(&net("10.0.2.0/30")).is_some());
}

#[test_log::test]
fn one_sided_address() {
    let (discovery, _) = chain();
    let mut addressing = Addressing::new();
    addressing.insert("r2", "Ethernet1", net("10.0.1.2/30"));
    let topo = builder().build(&discovery, &addressing).unwrap();
    let link = topo.links().get_by_prefix(&net("10.0.1.0/30")).unwrap();
    assert_eq!(link.a.addr, None);
    assert_eq!(link.b.addr, Some("10.0.1.2".parse().unwrap()));
    // r2 -- r3 has no address at all
    assert_eq!(topo.links().len(), 1);
    assert_eq!(topo.graph()[&r("r3")], btreeset! {r("r2")});
}

#[test]
fn canonical_key() {
    let a = link_key((&r("r2"), "Ethernet1"), (&r("r1"), "Ethernet3"));
    let b = link_key((&r("r1"), "Ethernet3"), (&r("r2"), "Ethernet1"));
    assert_eq!(a, b);
    assert_eq!(a.0, (r("r1"), "Ethernet3".to_string()));
}

#[test]
fn routers_without_neighbors() {
    let mut addressing = Addressing::new();
    addressing.insert("r9", "Loopback0", net("10.255.0.9/32"));
    let topo = builder().build(&Discovery::new(), &addressing).unwrap();
    assert_eq!(topo.routers().collect::<Vec<_>>(), vec![&r("r9")]);
    assert!(topo.links().is_empty());
}
