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

//! Addressing of the fabric: every link between two routers gets its own point-to-point subnet.
//!
//! The links are numbered in the given order, starting at 1. Link `n` uses the first `/30` of the
//! `n`-th `/24` of the pool. With the default pool `10.0.0.0/16`, the first link gets
//! `10.0.1.0/30`, the second `10.0.2.0/30`, and so on. The lower address goes to the first router
//! of the link. Each router numbers its fabric interfaces in the order of its links (`Ethernet1`,
//! `Ethernet2`, ...).

use std::{
    collections::{BTreeMap, BTreeSet},
    net::Ipv4Addr,
};

use ipnet::{Ipv4Net, PrefixLenError};
use thiserror::Error;

use crate::types::{Addressing, RouterId};

/// A link between two routers of the fabric. In JSON, this is a pair `["r1", "r2"]`.
pub type FabricLink = (RouterId, RouterId);

/// Assigns the interface addresses of the fabric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FabricAddressing {
    /// Pool of all link subnets
    pool: Ipv4Net,
    /// Name of the fabric interfaces, without the number.
    iface_prefix: String,
}

impl Default for FabricAddressing {
    fn default() -> Self {
        Self::new(Ipv4Net::new(Ipv4Addr::new(10, 0, 0, 0), 16).unwrap_or_default())
    }
}

impl FabricAddressing {
    /// Take the link subnets from the given pool.
    pub fn new(pool: Ipv4Net) -> Self {
        Self {
            pool: pool.trunc(),
            iface_prefix: String::from("Ethernet"),
        }
    }

    /// The pool of all link subnets.
    pub fn pool(&self) -> Ipv4Net {
        self.pool
    }

    /// Use a different name for the fabric interfaces (default: `Ethernet`).
    pub fn iface_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.iface_prefix = prefix.into();
        self
    }

    /// Number of links that fit into the pool.
    pub fn capacity(&self) -> usize {
        match self.pool.prefix_len() {
            len @ 0..=24 => (1usize << (24 - len)) - 1,
            _ => 0,
        }
    }

    /// Assign the addresses of all `links`. Every router in `routers` appears in the result, even
    /// if it has no link. Two routers may be connected by more than one link.
    pub fn assign(
        &self,
        routers: &BTreeSet<RouterId>,
        links: &[FabricLink],
    ) -> Result<Addressing, AddressingError> {
        for (a, b) in links {
            for x in [a, b] {
                if !routers.contains(x) {
                    return Err(AddressingError::UnknownRouter(x.clone()));
                }
            }
            if a == b {
                return Err(AddressingError::SelfLink(a.clone()));
            }
        }
        if links.len() > self.capacity() {
            return Err(AddressingError::PoolExhausted {
                pool: self.pool,
                available: self.capacity(),
                links: links.len(),
            });
        }

        let mut addressing = Addressing::new();
        for r in routers {
            addressing.add_router(r.clone());
        }
        let mut next_iface: BTreeMap<&RouterId, usize> = BTreeMap::new();

        // the pool has room for all links, so `subnets` cannot fail here.
        let subnets = self.pool.subnets(24).into_iter().flatten().skip(1);
        for ((a, b), subnet) in links.iter().zip(subnets) {
            let base = u32::from(subnet.network());
            for (router, host) in [(a, 1), (b, 2)] {
                let num = next_iface.entry(router).or_insert(1);
                let iface = format!("{}{}", self.iface_prefix, num);
                *num += 1;
                let addr = Ipv4Net::new(Ipv4Addr::from(base + host), 30)?;
                log::trace!("[{router}] {iface}: {addr}");
                addressing.insert(router.clone(), iface, addr);
            }
        }

        log::debug!(
            "Assigned {} link subnets out of {}",
            links.len(),
            self.pool
        );
        Ok(addressing)
    }
}

/// Error while assigning the fabric addresses.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressingError {
    /// A link refers to a router that is not part of the lab.
    #[error("Router {0} of a fabric link is not part of the lab")]
    UnknownRouter(RouterId),
    /// A link connects a router with itself.
    #[error("Router {0} cannot be linked to itself")]
    SelfLink(RouterId),
    /// The pool is too small.
    #[error("The pool {pool} has room for {available} links, but {links} are required")]
    PoolExhausted {
        /// The pool
        pool: Ipv4Net,
        /// Number of links that fit into the pool
        available: usize,
        /// Number of links
        links: usize,
    },
    /// Invalid prefix length
    #[error("{0}")]
    PrefixLen(#[from] PrefixLenError),
}
