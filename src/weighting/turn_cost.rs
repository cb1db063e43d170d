// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use rustc_hash::FxHashMap;

use crate::{EdgeId, NodeId};

/// Sparse table of turn costs, keyed by `(in_edge, via_node, out_edge)`.
///
/// A missing entry costs nothing; [f64::INFINITY] marks a forbidden turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnCostTable {
    costs: FxHashMap<(EdgeId, NodeId, EdgeId), f64>,
}

impl TurnCostTable {
    pub fn set(&mut self, in_edge: EdgeId, via: NodeId, out_edge: EdgeId, cost: f64) {
        assert!(cost >= 0.0, "negative turn cost {}", cost);
        if cost == 0.0 {
            self.costs.remove(&(in_edge, via, out_edge));
        } else {
            self.costs.insert((in_edge, via, out_edge), cost);
        }
    }

    pub fn restrict(&mut self, in_edge: EdgeId, via: NodeId, out_edge: EdgeId) {
        self.set(in_edge, via, out_edge, f64::INFINITY);
    }

    #[inline]
    pub fn get(&self, in_edge: EdgeId, via: NodeId, out_edge: EdgeId) -> f64 {
        self.costs
            .get(&(in_edge, via, out_edge))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.costs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.costs.is_empty()
    }

    /// Iterates over all entries in an unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (EdgeId, NodeId, EdgeId, f64)> + '_ {
        self.costs.iter().map(|(&(i, v, o), &c)| (i, v, o, c))
    }
}
