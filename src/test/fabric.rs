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

use std::{sync::Arc, time::Duration};

use pretty_assertions::assert_eq;

use super::{
    mock::{Behavior, MockLab},
    net, r,
};
use crate::{
    runtime::{configure_fabric, DeviceError, ReconcileOptions, RouterFailure, Step},
    types::Addressing,
};

fn options() -> ReconcileOptions {
    ReconcileOptions {
        workers: 2,
        open_timeout: Duration::from_secs(1),
        command_timeout: Duration::from_millis(100),
        persist_timeout: Duration::from_millis(100),
        close_timeout: Duration::from_millis(100),
    }
}

fn fabric() -> Addressing {
    let mut addressing = Addressing::new();
    addressing.insert("r1", "Ethernet1", net("10.0.1.1/30"));
    addressing.insert("r2", "Ethernet1", net("10.0.1.2/30"));
    addressing.insert("r2", "Ethernet2", net("10.0.2.1/30"));
    addressing.insert("r3", "Ethernet1", net("10.0.2.2/30"));
    addressing.add_router("r4");
    addressing
}

#[test_log::test(tokio::test)]
async fn configure_all_interfaces() {
    let lab = Arc::new(MockLab::new());
    let summary = configure_fabric(lab.clone(), &fabric(), options()).await;

    assert_eq!(summary.failed_routers().count(), 0);
    assert_eq!(
        lab.log("r2"),
        vec![
            "open",
            "interface Ethernet1 10.0.1.2/30",
            "interface Ethernet2 10.0.2.1/30",
            "write memory",
            "exit",
        ]
    );
    let r2 = summary.get(&r("r2")).unwrap();
    assert!(r2.is_success());
    assert_eq!(r2.configured, vec!["Ethernet1", "Ethernet2"]);

    // routers without fabric interfaces are not contacted
    assert!(summary.get(&r("r4")).is_none());
    assert!(lab.log("r4").is_empty());
    assert_eq!(summary.iter().count(), 3);
}

#[test_log::test(tokio::test)]
async fn rejected_interfaces() {
    let lab = Arc::new(MockLab::new().with(
        "r1",
        Behavior {
            reject_interfaces: true,
            ..Default::default()
        },
    ));
    let summary = configure_fabric(lab.clone(), &fabric(), options()).await;

    let r1 = summary.get(&r("r1")).unwrap();
    assert!(matches!(
        r1.failure,
        Some(RouterFailure::Session(DeviceError::Rejected(_)))
    ));
    assert!(r1.configured.is_empty());
    // nothing is persisted, but the session is closed
    assert_eq!(
        lab.log("r1"),
        vec!["open", "interface Ethernet1 10.0.1.1/30", "exit"]
    );
    assert_eq!(
        summary.failed_routers().map(|x| x.router.clone()).collect::<Vec<_>>(),
        vec![r("r1")]
    );
}

#[test_log::test(tokio::test)]
async fn persist_and_close_failures() {
    let lab = Arc::new(
        MockLab::new()
            .with(
                "r1",
                Behavior {
                    fail_persist: true,
                    ..Default::default()
                },
            )
            .with(
                "r3",
                Behavior {
                    hang_close: true,
                    ..Default::default()
                },
            ),
    );
    let summary = configure_fabric(lab.clone(), &fabric(), options()).await;

    // the interfaces are configured, only the startup configuration is outdated
    let r1 = summary.get(&r("r1")).unwrap();
    assert!(r1.failure.is_none());
    assert!(r1.persist_error.is_some());
    assert!(!r1.is_success());

    let r3 = summary.get(&r("r3")).unwrap();
    assert!(r3.is_success());
    assert!(r3.forced_close);
    assert_eq!(
        lab.log("r3")[3..].to_vec(),
        vec!["exit", "kill channel", "close transport"]
    );
    assert_eq!(summary.failed_routers().count(), 0);
}

#[test_log::test(tokio::test)]
async fn hanging_open() {
    let lab = Arc::new(MockLab::new().with(
        "r3",
        Behavior {
            hang_open: true,
            ..Default::default()
        },
    ));
    let summary = configure_fabric(lab.clone(), &fabric(), options()).await;

    let r3 = summary.get(&r("r3")).unwrap();
    assert!(matches!(
        r3.failure,
        Some(RouterFailure::Session(DeviceError::Timeout(Step::Open)))
    ));
    assert!(r3.forced_close);
    assert_eq!(lab.log("r3"), vec!["open", "abort open"]);
}

#[test_log::test(tokio::test)]
async fn summary_display() {
    let lab = Arc::new(MockLab::new().with(
        "r1",
        Behavior {
            reject_interfaces: true,
            ..Default::default()
        },
    ));
    let summary = configure_fabric(lab, &fabric(), options()).await;
    assert_eq!(
        summary.to_string(),
        "3 routers addressed, 1 failed\n\
         \x20 r1: 0 interfaces\n\
         \x20   failed: Command rejected: % Invalid input\n\
         \x20 r2: 2 interfaces\n\
         \x20 r3: 1 interfaces\n"
    );
}
