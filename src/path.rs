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

//! Path Resolver: minimum-hop paths on the adjacency graph.
//!
//! Paths are computed with a breadth-first search. Neighbors are visited in ascending order of
//! their [`RouterId`], and the first discovered path to a router is kept. Hence, among multiple
//! paths of equal length, the result is always the same for the same graph.

use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;

use crate::{topology::Graph, types::RouterId};

/// A loop-free path from the source (first element) to the destination (last element).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Path(Vec<RouterId>);

impl Path {
    /// Get all routers on the path, including source and destination.
    pub fn routers(&self) -> &[RouterId] {
        &self.0
    }

    /// The number of hops, i.e., the number of routers minus one.
    pub fn cost(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    /// The first router of the path.
    pub fn source(&self) -> Option<&RouterId> {
        self.0.first()
    }

    /// The last router of the path.
    pub fn destination(&self) -> Option<&RouterId> {
        self.0.last()
    }

    /// The second router of the path, or `None` for the trivial path.
    pub fn next_hop(&self) -> Option<&RouterId> {
        self.0.get(1)
    }

    /// Check if the path traverses the given router.
    pub fn contains(&self, router: &RouterId) -> bool {
        self.0.contains(router)
    }
}

impl From<Vec<RouterId>> for Path {
    fn from(routers: Vec<RouterId>) -> Self {
        Self(routers)
    }
}

/// The shortest-path tree of a single source, computed with one breadth-first search. It contains
/// the paths towards all reachable routers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortestPathTree {
    /// The root of the tree
    source: RouterId,
    /// Predecessor and distance of every reachable router. The source has no predecessor.
    nodes: BTreeMap<RouterId, (Option<RouterId>, usize)>,
}

impl ShortestPathTree {
    /// Compute the tree for the given source. If the source is not part of the graph, only the
    /// source itself is reachable.
    pub fn compute(graph: &Graph, source: &RouterId) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(source.clone(), (None, 0));
        let mut queue = VecDeque::from([(source, 0)]);

        while let Some((current, dist)) = queue.pop_front() {
            for next in graph.get(current).into_iter().flatten() {
                if nodes.contains_key(next) {
                    continue;
                }
                nodes.insert(next.clone(), (Some(current.clone()), dist + 1));
                queue.push_back((next, dist + 1));
            }
        }

        Self {
            source: source.clone(),
            nodes,
        }
    }

    /// The root of the tree.
    pub fn source(&self) -> &RouterId {
        &self.source
    }

    /// The number of hops towards `goal`, or `None` if it is unreachable.
    pub fn distance(&self, goal: &RouterId) -> Option<usize> {
        self.nodes.get(goal).map(|(_, d)| *d)
    }

    /// The path towards `goal`, or `None` if it is unreachable.
    pub fn path_to(&self, goal: &RouterId) -> Option<Path> {
        let (_, dist) = self.nodes.get(goal)?;
        let mut path = Vec::with_capacity(dist + 1);
        let mut current = Some(goal);
        while let Some(r) = current {
            path.push(r.clone());
            current = self.nodes.get(r).and_then(|(pred, _)| pred.as_ref());
        }
        path.reverse();
        Some(Path(path))
    }

    /// Iterate over all reachable routers (including the source) and their distance, in ascending
    /// order of the router.
    pub fn reachable(&self) -> impl Iterator<Item = (&RouterId, usize)> {
        self.nodes.iter().map(|(r, (_, d))| (r, *d))
    }
}

/// Compute the shortest path from `start` to `goal`.
///
/// - If `start == goal`, the trivial path `[start]` with cost 0 is returned.
/// - If `goal` is not reachable (or either router is not part of the graph), `None` is returned.
///   An unreachable destination is not an error.
pub fn shortest_path(graph: &Graph, start: &RouterId, goal: &RouterId) -> Option<Path> {
    if start == goal {
        return Some(Path(vec![start.clone()]));
    }
    ShortestPathTree::compute(graph, start).path_to(goal)
}
