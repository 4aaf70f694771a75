//! # LabRib: Static routing controller for emulated router labs
//!
//! LabRib discovers the adjacency between the routers of a lab (over LLDP), computes a global view
//! of reachability, and installs static routes such that every router can reach every subnet that
//! is directly connected to any other router, without running a dynamic routing protocol.
//!
//! Every reconciliation pass starts from scratch:
//!
//! 1. Read the neighbors and interface addresses of all routers ([`types::Telemetry`]).
//! 2. Build the adjacency graph and the set of links ([`topology::TopologyBuilder`]).
//! 3. Compute the Global Routing Table ([`grt::GlobalRoutingTable`]) using minimum-hop paths
//!    ([`path`]).
//! 4. For every router and every subnet that is not directly connected, select the next-hop and
//!    its address ([`plan::RoutePlanner`]).
//! 5. Install the routes on all routers in parallel ([`runtime::Reconciler`]).
//!
//! All ties are broken by the order of [`types::RouterId`], so the same input always results in
//! the same routes.
//!
//! ## Structure
//! The source code of this program is structured as follows:
//! - The module [`types`] contains the inputs of a pass: discovery, addressing, and the
//!   management interface policy.
//! - The modules [`topology`], [`path`], and [`grt`] compute the graph and the Global Routing
//!   Table.
//! - The modules [`selector`] and [`plan`] compute the routes of every router.
//! - The module [`addressing`] assigns the interface addresses of the fabric links, which
//!   [`runtime`] pushes to the devices before the first pass.
//! - The module [`runtime`] installs the routes. It defines the traits to access a device, and
//!   implements them for the Arista EOS lab (`runtime::lab`, with the feature `eos-lab`). The
//!   access to the devices themselves lives in a separate crate: `eos_lab`.
//! - The module [`controller`] puts everything together.

#![deny(
    missing_docs,
    clippy::missing_docs_in_private_items,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod addressing;
pub mod controller;
pub mod grt;
pub mod path;
pub mod plan;
pub mod runtime;
pub mod selector;
pub mod topology;
pub mod types;
#[cfg(test)]
mod test;

pub use controller::{Controller, ControllerError, ControllerOptions};
pub use types::RouterId;
