// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Contraction hierarchies.
//!
//! Nodes are contracted one by one in order of importance. Whenever removing a node
//! would lengthen a cheapest route between two of its remaining neighbours,
//! a shortcut arc is inserted in its place. Queries then only ever climb the
//! hierarchy: forwards from the start along arcs leading to more important nodes,
//! and backwards from the end likewise.

mod prepare;
mod query;

use serde::{Deserialize, Serialize};

use crate::weighting::WeightingKey;
use crate::{EdgeId, NodeId};

/// Tuning knobs of the contraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChConfig {
    /// Nodes a single witness search may settle before giving up.
    /// Giving up only costs extra shortcuts, never correctness.
    pub witness_settled_limit: usize,

    /// Periodically log contraction progress every so many contracted nodes (0 disables it).
    pub log_every: usize,
}

impl Default for ChConfig {
    fn default() -> Self {
        Self {
            witness_settled_limit: 500,
            log_every: 0,
        }
    }
}

/// What a [ChArc] stands for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArcKind {
    /// A traversal of a graph edge.
    Original { edge: EdgeId },

    /// The concatenation of two arcs (by index), bypassing the contracted `via` node.
    Shortcut { first: u32, second: u32, via: NodeId },
}

/// A directed, weighted arc of the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChArc {
    pub from: NodeId,
    pub to: NodeId,
    pub weight: f64,
    pub kind: ArcKind,
}

impl ChArc {
    pub fn is_shortcut(&self) -> bool {
        matches!(self.kind, ArcKind::Shortcut { .. })
    }
}

/// The result of a preparation for one weighting.
///
/// Upward arcs are listed at their tail, downward arcs at their head, so that both
/// the forward and the backward search only look at their current node's list.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractionHierarchy {
    weighting: WeightingKey,
    ranks: Vec<u32>,
    arcs: Vec<ChArc>,
    up_offsets: Vec<u32>,
    up: Vec<u32>,
    down_offsets: Vec<u32>,
    down: Vec<u32>,
}

impl ContractionHierarchy {
    /// Assembles a hierarchy from node ranks and all of its arcs.
    pub(crate) fn from_parts(weighting: WeightingKey, ranks: Vec<u32>, arcs: Vec<ChArc>) -> Self {
        let n = ranks.len();
        let mut up_lists: Vec<Vec<u32>> = vec![Vec::new(); n];
        let mut down_lists: Vec<Vec<u32>> = vec![Vec::new(); n];

        for (i, arc) in arcs.iter().enumerate() {
            let (from, to) = (arc.from as usize, arc.to as usize);
            debug_assert!(from < n && to < n);
            if from == to {
                continue;
            }
            if ranks[from] < ranks[to] {
                up_lists[from].push(i as u32);
            } else {
                down_lists[to].push(i as u32);
            }
        }

        let (up_offsets, up) = flatten(up_lists);
        let (down_offsets, down) = flatten(down_lists);
        Self {
            weighting,
            ranks,
            arcs,
            up_offsets,
            up,
            down_offsets,
            down,
        }
    }

    /// Name of the weighting this hierarchy was contracted for.
    pub fn weighting_name(&self) -> &str {
        &self.weighting.name
    }

    /// The weighting this hierarchy was contracted for.
    pub fn weighting(&self) -> &WeightingKey {
        &self.weighting
    }

    pub fn node_count(&self) -> usize {
        self.ranks.len()
    }

    /// Contraction order of a node; higher means more important.
    pub fn rank(&self, node: NodeId) -> u32 {
        self.ranks[node as usize]
    }

    pub(crate) fn ranks(&self) -> &[u32] {
        &self.ranks
    }

    pub fn arcs(&self) -> &[ChArc] {
        &self.arcs
    }

    pub fn shortcut_count(&self) -> usize {
        self.arcs.iter().filter(|a| a.is_shortcut()).count()
    }

    /// Arcs leaving `node` towards more important nodes.
    #[inline]
    pub(crate) fn up_arcs(&self, node: NodeId) -> impl Iterator<Item = (u32, &ChArc)> + '_ {
        let n = node as usize;
        self.up[self.up_offsets[n] as usize..self.up_offsets[n + 1] as usize]
            .iter()
            .map(|&i| (i, &self.arcs[i as usize]))
    }

    /// Arcs entering `node` from more important nodes.
    #[inline]
    pub(crate) fn down_arcs(&self, node: NodeId) -> impl Iterator<Item = (u32, &ChArc)> + '_ {
        let n = node as usize;
        self.down[self.down_offsets[n] as usize..self.down_offsets[n + 1] as usize]
            .iter()
            .map(|&i| (i, &self.arcs[i as usize]))
    }

    /// Expands an arc into the graph edges it stands for, in travel order.
    pub fn unpack(&self, arc: u32, out: &mut Vec<EdgeId>) {
        let mut stack = vec![arc];
        while let Some(i) = stack.pop() {
            match self.arcs[i as usize].kind {
                ArcKind::Original { edge } => out.push(edge),
                ArcKind::Shortcut { first, second, .. } => {
                    stack.push(second);
                    stack.push(first);
                }
            }
        }
    }
}

fn flatten(lists: Vec<Vec<u32>>) -> (Vec<u32>, Vec<u32>) {
    let mut offsets = Vec::with_capacity(lists.len() + 1);
    let mut flat = Vec::with_capacity(lists.iter().map(Vec::len).sum());
    offsets.push(0);
    for list in lists {
        flat.extend(list);
        offsets.push(flat.len() as u32);
    }
    (offsets, flat)
}
