// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Shortest-path searches and the plumbing they share.

pub mod alternative;
pub mod ch;
pub mod dijkstra;
mod edge_based;
pub mod landmark;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::queue::MinHeap;
use crate::weighting::Weighting;
use crate::{EdgeId, Graph, NodeId, NO_ID};

/// Recommended number of allowed node visits before [PathError::LimitExceeded] is returned.
pub const DEFAULT_MAX_VISITED_NODES: usize = 1_000_000;

/// How often (in visited nodes) a [CancellationToken] is polled.
const CANCEL_CHECK_INTERVAL: usize = 256;

/// Error conditions which may occur during a route search.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PathError {
    /// The start or end node doesn't exist in the graph.
    #[error("invalid node: {0}")]
    InvalidNode(NodeId),

    /// The search has exhausted the reachable part of the graph without connecting the endpoints.
    #[error("no route found")]
    NotFound,

    /// The search has exceeded its node-visit budget or its weight limit.
    ///
    /// Concluding that no route exists requires traversing everything reachable
    /// from the start, which can result in a denial-of-service. The limits protect
    /// against resource exhaustion.
    #[error("search limit exceeded")]
    LimitExceeded,

    /// The endpoints lie in different subnetworks of a landmark preparation.
    #[error("endpoints in different subnetworks ({from} and {to})")]
    DifferentSubnetworks { from: u32, to: u32 },

    #[error("search cancelled")]
    Cancelled,

    /// No preparation of the required kind exists for the weighting.
    #[error("no {kind} preparation for {weighting}")]
    MissingPreparation {
        kind: &'static str,
        weighting: String,
    },

    /// The algorithm cannot honour one of the query options.
    #[error("unsupported query option: {0}")]
    Unsupported(&'static str),

    #[error("invalid query option: {0}")]
    InvalidOption(String),
}

/// Problems detected while building a speed-up structure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PreparationError {
    #[error("{0}: turn-cost aware weightings can't be contracted")]
    TurnCosts(String),

    #[error("invalid preparation config: {0}")]
    InvalidConfig(String),

    #[error("preparation cancelled")]
    Cancelled,
}

/// A cheap, clonable flag to abort running searches.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-query limits and exclusions.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Nodes taken off the queues (over both directions) before [PathError::LimitExceeded].
    pub max_visited_nodes: usize,

    /// Routes costlier than this fail with [PathError::LimitExceeded].
    pub weight_limit: f64,

    /// Nodes excluded from this query only.
    pub skip_nodes: Vec<NodeId>,

    pub cancel: Option<CancellationToken>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            max_visited_nodes: DEFAULT_MAX_VISITED_NODES,
            weight_limit: f64::INFINITY,
            skip_nodes: Vec::new(),
            cancel: None,
        }
    }
}

/// Counts visited nodes and polls cancellation.
#[derive(Debug)]
pub(crate) struct Budget<'a> {
    options: &'a QueryOptions,
    pub visited: usize,
}

impl<'a> Budget<'a> {
    pub fn new(options: &'a QueryOptions) -> Self {
        Self {
            options,
            visited: 0,
        }
    }

    #[inline]
    pub fn visit(&mut self) -> Result<(), PathError> {
        self.visited += 1;
        if self.visited > self.options.max_visited_nodes {
            return Err(PathError::LimitExceeded);
        }
        if self.visited % CANCEL_CHECK_INTERVAL == 0 {
            if let Some(token) = &self.options.cancel {
                if token.is_cancelled() {
                    return Err(PathError::Cancelled);
                }
            }
        }
        Ok(())
    }

    pub fn check_cancelled(&self) -> Result<(), PathError> {
        match &self.options.cancel {
            Some(t) if t.is_cancelled() => Err(PathError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// A found route. Owns no graph state.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
    /// Total length in meters.
    pub distance: f64,
    /// Total travel time in milliseconds.
    pub time: u64,
    pub weight: f64,
}

impl Path {
    /// Builds a path from `from` along `edges`, summing up distance and time.
    pub(crate) fn from_edges(
        graph: &Graph,
        weighting: &dyn Weighting,
        from: NodeId,
        edges: Vec<EdgeId>,
        weight: f64,
    ) -> Self {
        let mut nodes = Vec::with_capacity(edges.len() + 1);
        let mut distance = 0.0;
        let mut time: u64 = 0;
        let mut at = from;
        nodes.push(at);

        for &e in &edges {
            let next = graph.other_node(e, at);
            let state = graph.edge_state(e, next);
            distance += state.distance();
            time = time.saturating_add(weighting.calc_edge_millis(&state, false));
            at = next;
            nodes.push(at);
        }

        Self {
            nodes,
            edges,
            distance,
            time,
            weight,
        }
    }
}

/// One direction of a search: tentative weights, parent edges and the queue.
#[derive(Debug, Clone, Default)]
pub(crate) struct Frontier {
    pub heap: MinHeap,
    pub weights: Vec<f64>,
    pub parents: Vec<u32>,
    touched: Vec<NodeId>,
}

impl Frontier {
    fn with_nodes(n: usize) -> Self {
        Self {
            heap: MinHeap::with_capacity(n),
            weights: vec![f64::INFINITY; n],
            parents: vec![NO_ID; n],
            touched: Vec::new(),
        }
    }

    fn reset(&mut self, n: usize) {
        for &v in &self.touched {
            self.weights[v as usize] = f64::INFINITY;
            self.parents[v as usize] = NO_ID;
        }
        self.touched.clear();
        self.heap.clear();

        if self.weights.len() < n {
            self.weights.resize(n, f64::INFINITY);
            self.parents.resize(n, NO_ID);
        }
    }

    #[inline]
    pub fn weight(&self, node: NodeId) -> f64 {
        self.weights[node as usize]
    }

    #[inline]
    pub fn parent(&self, node: NodeId) -> Option<u32> {
        match self.parents[node as usize] {
            NO_ID => None,
            p => Some(p),
        }
    }

    /// Records a better weight for `node` and (re-)queues it under `key`.
    #[inline]
    pub fn relax(&mut self, node: NodeId, weight: f64, parent: u32, key: f64) {
        let n = node as usize;
        if self.weights[n] == f64::INFINITY {
            self.touched.push(node);
        }
        self.weights[n] = weight;
        self.parents[n] = parent;
        self.heap.push_or_decrease(node, key);
    }

    /// Seeds the search at `node`.
    pub fn start(&mut self, node: NodeId, key: f64) {
        self.relax(node, 0.0, NO_ID, key);
    }
}

/// Reusable state of a bidirectional search. Reset at the start of every query,
/// so only touched entries are cleared.
#[derive(Debug, Clone, Default)]
pub struct QueryScratch {
    pub(crate) fwd: Frontier,
    pub(crate) bwd: Frontier,
    skip: Vec<bool>,
    skipped: Vec<NodeId>,
}

impl QueryScratch {
    pub fn new(node_count: usize) -> Self {
        Self {
            fwd: Frontier::with_nodes(node_count),
            bwd: Frontier::with_nodes(node_count),
            skip: vec![false; node_count],
            skipped: Vec::new(),
        }
    }

    /// Clears the previous query and marks this query's skip nodes.
    pub(crate) fn prepare(&mut self, node_count: usize, options: &QueryOptions) {
        self.fwd.reset(node_count);
        self.bwd.reset(node_count);

        for &v in &self.skipped {
            self.skip[v as usize] = false;
        }
        self.skipped.clear();
        if self.skip.len() < node_count {
            self.skip.resize(node_count, false);
        }

        for &v in &options.skip_nodes {
            if (v as usize) < node_count {
                self.skip[v as usize] = true;
                self.skipped.push(v);
            }
        }
    }

    #[inline]
    pub(crate) fn is_skipped(&self, node: NodeId) -> bool {
        self.skip[node as usize]
    }
}

/// Validates the endpoints of a query.
pub(crate) fn check_endpoints(graph: &Graph, from: NodeId, to: NodeId) -> Result<(), PathError> {
    for n in [from, to] {
        if !graph.contains_node(n) {
            return Err(PathError::InvalidNode(n));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::five_node_graph;
    use crate::weighting::ShortestWeighting;

    #[test]
    fn path_from_edges() {
        let g = five_node_graph();
        let w = ShortestWeighting::new(g.encoding(), "car").unwrap();
        let p = Path::from_edges(&g, &w, 0, vec![0, 1, 2], 30.0);
        assert_eq!(p.nodes, vec![0, 1, 2, 3]);
        assert_eq!(p.distance, 30.0);
        // 30 m at 36 km/h
        assert_eq!(p.time, 3000);

        let p = Path::from_edges(&g, &w, 3, vec![4, 3], 80.0);
        assert_eq!(p.nodes, vec![3, 4, 0]);
    }

    #[test]
    fn scratch_resets_touched_entries() {
        let mut s = QueryScratch::new(4);
        let options = QueryOptions {
            skip_nodes: vec![2],
            ..Default::default()
        };
        s.prepare(4, &options);
        s.fwd.start(0, 0.0);
        s.fwd.relax(1, 5.0, 0, 5.0);
        assert!(s.is_skipped(2));

        s.prepare(6, &QueryOptions::default());
        assert_eq!(s.fwd.weight(1), f64::INFINITY);
        assert_eq!(s.fwd.parent(1), None);
        assert!(s.fwd.heap.is_empty());
        assert!(!s.is_skipped(2));
        assert_eq!(s.fwd.weight(5), f64::INFINITY);
    }

    #[test]
    fn budget_limits_and_cancels() {
        let options = QueryOptions {
            max_visited_nodes: 3,
            ..Default::default()
        };
        let mut b = Budget::new(&options);
        for _ in 0..3 {
            b.visit().unwrap();
        }
        assert_eq!(b.visit(), Err(PathError::LimitExceeded));

        let token = CancellationToken::new();
        let options = QueryOptions {
            cancel: Some(token.clone()),
            ..Default::default()
        };
        let mut b = Budget::new(&options);
        token.cancel();
        assert_eq!(b.check_cancelled(), Err(PathError::Cancelled));
        let result = (0..CANCEL_CHECK_INTERVAL).try_for_each(|_| b.visit());
        assert_eq!(result, Err(PathError::Cancelled));
    }
}
