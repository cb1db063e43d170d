// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use crate::encoding::{
    BooleanEncodedValue, DecimalEncodedValue, EdgeFlags, EncodingManager, EnumEncodedValue,
    IntEncodedValue,
};
use crate::weighting::TurnCostTable;
use crate::{earth_distance, EdgeId, Node, NodeId};

/// Invalid input given to a [GraphBuilder].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("unknown edge: {0}")]
    UnknownEdge(EdgeId),

    #[error("invalid edge distance: {0}")]
    InvalidDistance(f64),

    #[error("invalid turn cost: {0}")]
    InvalidTurnCost(f64),

    #[error("edge flags have {got} words, expected {expected}")]
    FlagWidth { got: usize, expected: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct EdgeRecord {
    pub base: NodeId,
    pub adj: NodeId,
    pub distance: f64,
}

/// Collects nodes, edges and turn costs of a [Graph].
#[derive(Debug)]
pub struct GraphBuilder {
    encoding: Arc<EncodingManager>,
    nodes: Vec<Node>,
    edges: Vec<EdgeRecord>,
    flags: Vec<u32>,
    turn_costs: TurnCostTable,
}

impl GraphBuilder {
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = self.nodes.len() as NodeId;
        self.nodes.push(node);
        id
    }

    /// Adds an edge from `base` to `adj`. Which directions are passable
    /// is decided by the `flags`, not by the order of the nodes.
    ///
    /// Both nodes must have been added before.
    pub fn add_edge(
        &mut self,
        base: NodeId,
        adj: NodeId,
        distance: f64,
        flags: &EdgeFlags,
    ) -> Result<EdgeId, GraphError> {
        self.check_node(base)?;
        self.check_node(adj)?;
        if !distance.is_finite() || distance < 0.0 {
            return Err(GraphError::InvalidDistance(distance));
        }
        let expected = self.encoding.ints_per_edge() as usize;
        if flags.len() != expected {
            return Err(GraphError::FlagWidth {
                got: flags.len(),
                expected,
            });
        }

        let id = self.edges.len() as EdgeId;
        self.edges.push(EdgeRecord {
            base,
            adj,
            distance,
        });
        self.flags.extend_from_slice(flags);
        Ok(id)
    }

    /// Adds an edge whose distance is the great-circle distance between its nodes.
    pub fn add_beeline_edge(
        &mut self,
        base: NodeId,
        adj: NodeId,
        flags: &EdgeFlags,
    ) -> Result<EdgeId, GraphError> {
        let a = *self.nodes.get(base as usize).ok_or(GraphError::UnknownNode(base))?;
        let b = *self.nodes.get(adj as usize).ok_or(GraphError::UnknownNode(adj))?;
        self.add_edge(base, adj, earth_distance(a.lat, a.lon, b.lat, b.lon), flags)
    }

    /// Sets the cost of turning from `in_edge` into `out_edge` at `via`.
    /// [f64::INFINITY] forbids the turn.
    pub fn set_turn_cost(
        &mut self,
        in_edge: EdgeId,
        via: NodeId,
        out_edge: EdgeId,
        cost: f64,
    ) -> Result<(), GraphError> {
        for e in [in_edge, out_edge] {
            if e as usize >= self.edges.len() {
                return Err(GraphError::UnknownEdge(e));
            }
        }
        self.check_node(via)?;
        if cost.is_nan() || cost < 0.0 {
            return Err(GraphError::InvalidTurnCost(cost));
        }
        self.turn_costs.set(in_edge, via, out_edge, cost);
        Ok(())
    }

    fn check_node(&self, node: NodeId) -> Result<(), GraphError> {
        if (node as usize) < self.nodes.len() {
            Ok(())
        } else {
            Err(GraphError::UnknownNode(node))
        }
    }

    pub fn build(self) -> Graph {
        let graph = Graph::from_parts(
            self.encoding,
            self.nodes,
            self.edges,
            self.flags,
            self.turn_costs,
        );
        log::debug!(
            "graph built: {} nodes, {} edges, {} turn costs",
            graph.node_count(),
            graph.edge_count(),
            graph.turn_costs().len(),
        );
        graph
    }
}

/// Road network: nodes, edges with their flags and an adjacency index.
///
/// Topology is immutable once built. Edge flags may still be changed
/// through [Graph::edge_flags_mut].
#[derive(Debug, Clone)]
pub struct Graph {
    encoding: Arc<EncodingManager>,
    nodes: Vec<Node>,
    edges: Vec<EdgeRecord>,
    flags: Vec<u32>,
    adj_offsets: Vec<u32>,
    adj_edges: Vec<EdgeId>,
    turn_costs: Arc<TurnCostTable>,
}

impl Graph {
    pub fn builder(encoding: Arc<EncodingManager>) -> GraphBuilder {
        GraphBuilder {
            encoding,
            nodes: Vec::default(),
            edges: Vec::default(),
            flags: Vec::default(),
            turn_costs: TurnCostTable::default(),
        }
    }

    pub(crate) fn from_parts(
        encoding: Arc<EncodingManager>,
        nodes: Vec<Node>,
        edges: Vec<EdgeRecord>,
        flags: Vec<u32>,
        turn_costs: TurnCostTable,
    ) -> Self {
        debug_assert_eq!(flags.len(), edges.len() * encoding.ints_per_edge() as usize);

        // Every edge is listed at its base and (unless a loop) at its adj node
        let mut degree = vec![0u32; nodes.len() + 1];
        for e in &edges {
            degree[e.base as usize] += 1;
            if e.adj != e.base {
                degree[e.adj as usize] += 1;
            }
        }

        let mut adj_offsets = Vec::with_capacity(nodes.len() + 1);
        let mut total = 0;
        for d in &degree[..nodes.len()] {
            adj_offsets.push(total);
            total += d;
        }
        adj_offsets.push(total);

        let mut fill = adj_offsets.clone();
        let mut adj_edges = vec![0; total as usize];
        for (id, e) in edges.iter().enumerate() {
            adj_edges[fill[e.base as usize] as usize] = id as EdgeId;
            fill[e.base as usize] += 1;
            if e.adj != e.base {
                adj_edges[fill[e.adj as usize] as usize] = id as EdgeId;
                fill[e.adj as usize] += 1;
            }
        }

        Self {
            encoding,
            nodes,
            edges,
            flags,
            adj_offsets,
            adj_edges,
            turn_costs: Arc::new(turn_costs),
        }
    }

    pub fn encoding(&self) -> &Arc<EncodingManager> {
        &self.encoding
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        (node as usize) < self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id as usize)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn turn_costs(&self) -> &Arc<TurnCostTable> {
        &self.turn_costs
    }

    pub(crate) fn edge_records(&self) -> &[EdgeRecord] {
        &self.edges
    }

    pub(crate) fn raw_flags(&self) -> &[u32] {
        &self.flags
    }

    /// Number of edges touching a node, in either direction.
    pub fn degree(&self, node: NodeId) -> usize {
        let n = node as usize;
        (self.adj_offsets[n + 1] - self.adj_offsets[n]) as usize
    }

    /// Iterates over all edges touching `node`, each oriented so that `base() == node`.
    pub fn edges_of(&self, node: NodeId) -> impl Iterator<Item = EdgeState<'_>> + '_ {
        let n = node as usize;
        let ids = &self.adj_edges[self.adj_offsets[n] as usize..self.adj_offsets[n + 1] as usize];
        ids.iter().map(move |&edge| self.edge_state(edge, self.other_node(edge, node)))
    }

    /// Returns an edge in its stored direction.
    pub fn edge(&self, edge: EdgeId) -> EdgeState<'_> {
        let rec = self.edges[edge as usize];
        EdgeState {
            graph: self,
            edge,
            base: rec.base,
            adj: rec.adj,
            reversed: false,
        }
    }

    /// Returns an edge oriented so that it ends at `adj`.
    pub fn edge_state(&self, edge: EdgeId, adj: NodeId) -> EdgeState<'_> {
        let rec = self.edges[edge as usize];
        if rec.adj == adj {
            self.edge(edge)
        } else {
            debug_assert_eq!(rec.base, adj, "edge {} does not touch node {}", edge, adj);
            self.edge(edge).reversed()
        }
    }

    /// Returns the end of `edge` opposite to `node`.
    pub fn other_node(&self, edge: EdgeId, node: NodeId) -> NodeId {
        let rec = self.edges[edge as usize];
        if rec.base == node {
            rec.adj
        } else {
            rec.base
        }
    }

    pub fn edge_flags(&self, edge: EdgeId) -> &[u32] {
        let w = self.encoding.ints_per_edge() as usize;
        let start = edge as usize * w;
        &self.flags[start..start + w]
    }

    /// Mutable access to the flags of an edge, in the stored direction.
    pub fn edge_flags_mut(&mut self, edge: EdgeId) -> &mut [u32] {
        let w = self.encoding.ints_per_edge() as usize;
        let start = edge as usize * w;
        &mut self.flags[start..start + w]
    }
}

/// A view on one edge, oriented from [base](EdgeState::base) to [adj](EdgeState::adj).
///
/// The typed getters take a `reverse` argument, which is combined with the orientation
/// of the view: reading forward from a reversed view reads the backward bits of the
/// stored edge.
#[derive(Debug, Clone, Copy)]
pub struct EdgeState<'g> {
    graph: &'g Graph,
    edge: EdgeId,
    base: NodeId,
    adj: NodeId,
    reversed: bool,
}

impl<'g> EdgeState<'g> {
    pub fn edge(&self) -> EdgeId {
        self.edge
    }

    pub fn base(&self) -> NodeId {
        self.base
    }

    pub fn adj(&self) -> NodeId {
        self.adj
    }

    pub fn distance(&self) -> f64 {
        self.graph.edges[self.edge as usize].distance
    }

    /// True if this view runs against the stored direction of the edge.
    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    pub fn flags(&self) -> &'g [u32] {
        self.graph.edge_flags(self.edge)
    }

    pub fn reversed(self) -> Self {
        Self {
            graph: self.graph,
            edge: self.edge,
            base: self.adj,
            adj: self.base,
            reversed: !self.reversed,
        }
    }

    #[inline]
    pub fn get_bool(&self, ev: &BooleanEncodedValue, reverse: bool) -> bool {
        ev.get_bool(self.flags(), self.reversed ^ reverse)
    }

    #[inline]
    pub fn get_int(&self, ev: &IntEncodedValue, reverse: bool) -> i32 {
        ev.get_int(self.flags(), self.reversed ^ reverse)
    }

    #[inline]
    pub fn get_decimal(&self, ev: &DecimalEncodedValue, reverse: bool) -> f64 {
        ev.get_decimal(self.flags(), self.reversed ^ reverse)
    }

    #[inline]
    pub fn get_enum_index(&self, ev: &EnumEncodedValue, reverse: bool) -> usize {
        ev.get_index(self.flags(), self.reversed ^ reverse)
    }

    pub fn get_enum_name<'e>(&self, ev: &'e EnumEncodedValue, reverse: bool) -> &'e str {
        ev.get_name(self.flags(), self.reversed ^ reverse)
    }
}
