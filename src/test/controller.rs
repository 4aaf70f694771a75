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

use std::{collections::BTreeSet, sync::Arc};

use maplit::btreeset;
use pretty_assertions::assert_eq;

use super::{mock::MockLab, net, r};
use crate::{
    plan::StaticRoute,
    topology::TopologyError,
    types::{ManagementFilter, Neighbor, RouterId, Telemetry},
    controller::ComputedPass,
    Controller, ControllerError, ControllerOptions,
};

const CHAIN: &str = r#"{
    "discovery": {
        "r1": [["Ethernet1", "r2", "Ethernet1"], ["Management0", "mgmt", "eth1"]],
        "r2": [["Ethernet1", "r1", "Ethernet1"], ["Ethernet2", "r3", "Ethernet1"]],
        "r3": [["Ethernet1", "r2", "Ethernet2"]]
    },
    "addressing": {
        "r1": {"Ethernet1": "10.0.1.1/30", "Management0": "192.168.0.11/24"},
        "r2": {"Ethernet1": "10.0.1.2/30", "Ethernet2": "10.0.2.1/30"},
        "r3": {"Ethernet1": "10.0.2.2/30", "Loopback0": "10.255.0.3/32"}
    }
}"#;

fn telemetry() -> Telemetry {
    serde_json::from_str(CHAIN).unwrap()
}

fn lab_routers() -> BTreeSet<RouterId> {
    btreeset! {r("r1"), r("r2"), r("r3")}
}

fn compute(
    controller: &Controller,
    telemetry: &Telemetry,
) -> Result<ComputedPass, ControllerError> {
    controller.compute(telemetry, &telemetry.routers())
}

#[test_log::test]
fn parse_telemetry() {
    let telemetry = telemetry();
    assert_eq!(telemetry.discovery.neighbors(&r("r1")).len(), 2);
    assert_eq!(
        telemetry.addressing.get(&r("r3"), "Loopback0"),
        Some(net("10.255.0.3/32"))
    );
    let invalid = r#"{"addressing": {"r1": {"Ethernet1": "10.0.0.1/33"}}}"#;
    assert!(serde_json::from_str::<Telemetry>(invalid).is_err());
}

#[test_log::test]
fn compute_chain() {
    let controller = Controller::new(ControllerOptions::default());
    let pass = compute(&controller, &telemetry()).unwrap();
    assert_eq!(pass.topology.graph().len(), 3);
    assert_eq!(
        pass.plan.get(&r("r1")).unwrap().routes,
        vec![
            StaticRoute {
                prefix: net("10.0.2.0/30"),
                next_hop_router: r("r2"),
                next_hop: "10.0.1.2".parse().unwrap(),
            },
            StaticRoute {
                prefix: net("10.255.0.3/32"),
                next_hop_router: r("r2"),
                next_hop: "10.0.1.2".parse().unwrap(),
            },
        ]
    );
    assert_eq!(pass.plan.num_routes(), 4);
}

#[test_log::test]
fn reporting_routers() {
    assert_eq!(telemetry().routers(), lab_routers());
}

#[test_log::test]
fn devices_outside_the_router_set() {
    let mut telemetry = telemetry();
    // a switch that speaks LLDP, but is not part of the lab
    telemetry
        .discovery
        .push("r2", Neighbor::new("Ethernet5", "sw1", "Ethernet1"));
    telemetry
        .addressing
        .insert("r2", "Ethernet5", net("10.0.9.1/30"));

    let controller = Controller::new(ControllerOptions::default());
    let pass = controller.compute(&telemetry, &lab_routers()).unwrap();
    assert!(pass.topology.graph().contains_key(&r("sw1")));
    assert_eq!(pass.plan.get(&r("sw1")), None);
    assert_eq!(
        pass.plan.iter().map(|p| p.router.clone()).collect::<Vec<_>>(),
        vec![r("r1"), r("r2"), r("r3")]
    );

    // the subnet towards the switch is still routed
    assert!(pass
        .plan
        .get(&r("r1"))
        .unwrap()
        .routes
        .iter()
        .any(|route| route.prefix == net("10.0.9.0/30")));

    let pass = controller.compute(&telemetry, &btreeset! {r("r1")}).unwrap();
    assert_eq!(pass.plan.iter().count(), 1);
    assert_eq!(pass.plan.num_routes(), 3);
}

#[test_log::test]
fn compute_is_deterministic() {
    let controller = Controller::new(ControllerOptions::default());
    let a = compute(&controller, &telemetry()).unwrap();
    let b = compute(&controller, &telemetry()).unwrap();
    assert_eq!(a.plan, b.plan);
    assert_eq!(a.grt, b.grt);
}

#[test_log::test]
fn no_telemetry() {
    let controller = Controller::new(ControllerOptions::default());
    assert!(matches!(
        compute(&controller, &Telemetry::default()),
        Err(ControllerError::NoTelemetry)
    ));
}

#[test_log::test]
fn inconsistent_link_aborts() {
    let mut telemetry = telemetry();
    telemetry
        .addressing
        .insert("r2", "Ethernet1", net("10.0.9.2/30"));
    let controller = Controller::new(ControllerOptions::default());
    assert!(matches!(
        compute(&controller, &telemetry),
        Err(ControllerError::Topology(TopologyError::DataIntegrity { .. }))
    ));

    let lenient = Controller::new(ControllerOptions {
        strict_links: false,
        ..Default::default()
    });
    let pass = compute(&lenient, &telemetry).unwrap();
    assert_eq!(pass.topology.links().len(), 1);
}

#[test_log::test]
fn custom_management_prefix() {
    // with an empty policy, the management subnet is routed like any other
    let controller = Controller::new(ControllerOptions {
        filter: ManagementFilter::new(Vec::<String>::new()),
        ..Default::default()
    });
    let pass = compute(&controller, &telemetry()).unwrap();
    assert!(pass
        .plan
        .get(&r("r2"))
        .unwrap()
        .routes
        .iter()
        .any(|route| route.prefix == net("192.168.0.0/24")));
}

#[test_log::test(tokio::test)]
async fn run_pass() {
    let controller = Controller::new(ControllerOptions::default());
    let lab = Arc::new(MockLab::new());
    let summary = controller
        .run(lab.clone(), &telemetry(), &lab_routers())
        .await
        .unwrap();
    assert_eq!(summary.routers_processed(), 3);
    assert_eq!(summary.routes_installed(), 4);
    assert!(lab.log("r2").contains(&"ip route 10.255.0.3/32 10.0.2.2".to_string()));
}
