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

//! Parser for `show lldp neighbors detail`.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref IFACE_RE: Regex = Regex::new(r"^Interface (\S+) detected").unwrap();
    static ref SYSTEM_NAME_RE: Regex = Regex::new(r#"System Name:\s+"([^"]+)""#).unwrap();
    static ref PORT_ID_RE: Regex = Regex::new(r#"Port ID\s+:\s+"([^"]+)""#).unwrap();
}

/// A neighbor learned over LLDP on one local interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LldpNeighbor {
    /// Local interface on which the neighbor was detected.
    pub iface: String,
    /// System name announced by the neighbor.
    pub neighbor: String,
    /// Port ID (interface name) announced by the neighbor.
    pub neighbor_iface: String,
}

impl LldpNeighbor {
    /// Parse the output of `show lldp neighbors detail`. The output consists of one block per
    /// local interface, each starting with `Interface <name> detected <n> LLDP neighbors:`.
    ///
    /// Only the first neighbor of each interface is reported. Interfaces without any neighbor, or
    /// where the neighbor does not announce both its system name and its port ID, are skipped.
    /// Management interfaces are *not* filtered.
    pub fn from_detail(output: impl AsRef<str>) -> Vec<Self> {
        let mut result = Vec::new();
        let mut current: Option<Block<'_>> = None;

        for line in output.as_ref().lines() {
            if let Some(iface) = IFACE_RE.captures(line).and_then(|c| c.get(1)) {
                if let Some(block) = current.take() {
                    result.extend(block.finish());
                }
                current = Some(Block::new(iface.as_str()));
            } else if let Some(block) = current.as_mut() {
                block.feed(line);
            }
        }
        if let Some(block) = current {
            result.extend(block.finish());
        }

        result
    }
}

/// Fields collected while reading the block of a single interface.
struct Block<'a> {
    /// Local interface name
    iface: &'a str,
    /// First system name of the block
    neighbor: Option<&'a str>,
    /// First port ID of the block
    neighbor_iface: Option<&'a str>,
}

impl<'a> Block<'a> {
    fn new(iface: &'a str) -> Self {
        Self {
            iface,
            neighbor: None,
            neighbor_iface: None,
        }
    }

    fn feed(&mut self, line: &'a str) {
        if self.neighbor.is_none() {
            if let Some(m) = SYSTEM_NAME_RE.captures(line).and_then(|c| c.get(1)) {
                self.neighbor = Some(m.as_str());
                return;
            }
        }
        if self.neighbor_iface.is_none() {
            if let Some(m) = PORT_ID_RE.captures(line).and_then(|c| c.get(1)) {
                self.neighbor_iface = Some(m.as_str());
            }
        }
    }

    fn finish(self) -> Option<LldpNeighbor> {
        match (self.neighbor, self.neighbor_iface) {
            (Some(neighbor), Some(neighbor_iface)) => Some(LldpNeighbor {
                iface: self.iface.to_string(),
                neighbor: neighbor.to_string(),
                neighbor_iface: neighbor_iface.to_string(),
            }),
            _ => {
                log::trace!("Skipping LLDP block of {} (incomplete)", self.iface);
                None
            }
        }
    }
}
