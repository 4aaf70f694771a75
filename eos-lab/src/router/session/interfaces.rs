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

//! Parser for `show interfaces | json`.

use std::{collections::BTreeMap, net::Ipv4Addr};

use ipnet::Ipv4Net;
use serde::Deserialize;

use super::ParseError;

/// Top-level structure of `show interfaces | json`.
#[derive(Debug, Deserialize)]
struct ShowInterfaces {
    interfaces: BTreeMap<String, Interface>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Interface {
    #[serde(default)]
    interface_address: Vec<InterfaceAddress>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InterfaceAddress {
    primary_ip: PrimaryIp,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrimaryIp {
    address: Ipv4Addr,
    mask_len: u8,
}

/// Parse the output of `show interfaces | json` into a map from interface name to its primary
/// address (with the prefix length of the attached subnet).
///
/// Interfaces without a primary address (switchports, or unnumbered interfaces reporting
/// `0.0.0.0/0`) are omitted. Management interfaces are *not* filtered.
pub fn parse_interface_addresses(
    output: impl AsRef<str>,
) -> Result<BTreeMap<String, Ipv4Net>, ParseError> {
    let parsed: ShowInterfaces = serde_json::from_str(output.as_ref())?;
    let mut result = BTreeMap::new();
    for (name, iface) in parsed.interfaces {
        let Some(addr) = iface.interface_address.first() else {
            continue;
        };
        let ip = &addr.primary_ip;
        if ip.address.is_unspecified() {
            continue;
        }
        result.insert(name, Ipv4Net::new(ip.address, ip.mask_len)?);
    }
    Ok(result)
}
