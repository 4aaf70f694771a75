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

use pretty_assertions::assert_eq;

use crate::router::LldpNeighbor;

fn neighbor(iface: &str, neighbor: &str, neighbor_iface: &str) -> LldpNeighbor {
    LldpNeighbor {
        iface: iface.to_string(),
        neighbor: neighbor.to_string(),
        neighbor_iface: neighbor_iface.to_string(),
    }
}

const DETAIL: &str = r#"Interface Ethernet1 detected 1 LLDP neighbors:

  Neighbor 5254.0012.3401/"Ethernet1", age 12 seconds
  Discovered 0:05:31 ago; Last changed 0:05:31 ago
  - Chassis ID type: MAC address (4)
    Chassis ID     : 5254.0012.3401
  - Port ID type: Interface name (5)
    Port ID        : "Ethernet1"
  - Time To Live: 120 seconds
  - Port Description: "Ethernet1"
  - System Name: "r2"
  - System Capabilities : Bridge, Router
    Enabled Capabilities: Router

Interface Ethernet2 detected 1 LLDP neighbors:

  Neighbor 5254.0012.3402/"Ethernet3", age 12 seconds
  Discovered 0:05:30 ago; Last changed 0:05:30 ago
  - Chassis ID type: MAC address (4)
    Chassis ID     : 5254.0012.3402
  - Port ID type: Interface name (5)
    Port ID        : "Ethernet3"
  - Time To Live: 120 seconds
  - System Name: "r3"

Interface Ethernet3 detected 0 LLDP neighbors:

Interface Management0 detected 1 LLDP neighbors:

  Neighbor 0242.ac14.1401/"eth0", age 3 seconds
  - Port ID type: Interface name (5)
    Port ID        : "eth0"
  - System Name: "mgmt-switch"
"#;

#[test]
fn detail() {
    assert_eq!(
        LldpNeighbor::from_detail(DETAIL),
        vec![
            neighbor("Ethernet1", "r2", "Ethernet1"),
            neighbor("Ethernet2", "r3", "Ethernet3"),
            neighbor("Management0", "mgmt-switch", "eth0"),
        ]
    );
}

#[test]
fn incomplete_block() {
    let output = r#"Interface Ethernet1 detected 1 LLDP neighbors:

  Neighbor 5254.0012.3401/"Ethernet1", age 12 seconds
  - Port ID type: Interface name (5)
    Port ID        : "Ethernet1"
"#;
    assert_eq!(LldpNeighbor::from_detail(output), vec![]);
}

#[test]
fn empty() {
    assert_eq!(LldpNeighbor::from_detail(""), vec![]);
    assert_eq!(
        LldpNeighbor::from_detail("Last table change time   : 0:05:31 ago\n"),
        vec![]
    );
}
