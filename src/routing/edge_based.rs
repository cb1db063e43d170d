// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Edge-based bidirectional search for weightings with turn costs.
//!
//! Labels belong to directed edges instead of nodes, so a node keeps a separate
//! cost for every edge it can be entered by. A turn forbidden after one incoming
//! edge doesn't hide routes arriving over another one.

use super::dijkstra::Potential;
use super::{Budget, Frontier, Path, PathError, QueryOptions, QueryScratch};
use crate::weighting::{calc_weight, Weighting};
use crate::{EdgeId, EdgeState, Graph, NodeId, NO_ID};

/// Label of `state` traversed from base to adj, or from adj to base if `against`.
#[inline]
fn key(state: &EdgeState<'_>, against: bool) -> u32 {
    2 * state.edge() + (state.is_reversed() ^ against) as u32
}

#[inline]
fn edge_of(key: u32) -> EdgeId {
    key >> 1
}

/// The edge behind `key`, oriented in the direction of travel.
fn state_of(graph: &Graph, key: u32) -> EdgeState<'_> {
    let state = graph.edge(edge_of(key));
    if key & 1 == 1 {
        state.reversed()
    } else {
        state
    }
}

struct Meeting {
    weight: f64,
    key: u32,
}

impl Meeting {
    #[inline]
    fn offer(&mut self, key: u32, weight: f64) {
        if weight < self.weight {
            self.weight = weight;
            self.key = key;
        }
    }
}

/// Runs the search over an already prepared `scratch`, with distinct, valid endpoints.
///
/// A forward label is the cost of arriving at the end of an edge, the edge included.
/// A backward label is the cost from the end of an edge to the target.
/// A route through edge `k` thus costs `fwd(k) + bwd(k)`. Both sides key an edge
/// with the potential of its head, which keeps the `top_fwd + top_bwd >= μ` stop valid.
pub(crate) fn search<P: Potential>(
    graph: &Graph,
    weighting: &dyn Weighting,
    from: NodeId,
    to: NodeId,
    options: &QueryOptions,
    scratch: &mut QueryScratch,
    potential: &P,
) -> Result<Path, PathError> {
    let mut budget = Budget::new(options);
    budget.check_cancelled()?;

    let keys = 2 * graph.edge_count();
    let QueryScratch { fwd, bwd, skip, .. } = scratch;
    fwd.reset(keys);
    bwd.reset(keys);

    let mut best = Meeting {
        weight: f64::INFINITY,
        key: NO_ID,
    };

    for state in graph.edges_of(from) {
        let adj = state.adj();
        if skip[adj as usize] {
            continue;
        }
        let w = weighting.calc_edge_weight(&state, false);
        let p = potential.potential(adj);
        let k = key(&state, false);
        if w.is_finite() && p.is_finite() && w < fwd.weight(k) {
            fwd.relax(k, w, NO_ID, w + p);
        }
    }

    let p_to = potential.potential(to);
    if p_to.is_finite() {
        for state in graph.edges_of(to) {
            if skip[state.adj() as usize] || !weighting.calc_edge_weight(&state, true).is_finite() {
                continue;
            }
            let k = key(&state, true);
            bwd.relax(k, 0.0, NO_ID, -p_to);
            best.offer(k, fwd.weight(k));
        }
    }

    let mut cut = false;
    loop {
        let (Some(top_f), Some(top_b)) = (fwd.heap.peek_priority(), bwd.heap.peek_priority()) else {
            break;
        };
        if top_f + top_b >= best.weight {
            break;
        }

        let reverse = top_b < top_f;
        let popped = if reverse { bwd.heap.pop() } else { fwd.heap.pop() };
        let Some((k, _)) = popped else {
            break;
        };
        budget.visit()?;

        let g = if reverse { bwd.weight(k) } else { fwd.weight(k) };
        if g > options.weight_limit {
            cut = true;
            continue;
        }

        if reverse {
            expand_backward(graph, weighting, bwd, fwd, k, potential, &skip[..], &mut best);
        } else {
            expand_forward(graph, weighting, fwd, bwd, k, potential, &skip[..], &mut best);
        }
    }

    log::debug!(
        "edge-based search {} -> {}: {} edges visited, weight {}",
        from,
        to,
        budget.visited,
        best.weight,
    );

    if best.weight.is_finite() {
        if best.weight > options.weight_limit {
            return Err(PathError::LimitExceeded);
        }
        let edges = collect_edges(fwd, bwd, best.key);
        return Ok(Path::from_edges(graph, weighting, from, edges, best.weight));
    }

    if cut {
        Err(PathError::LimitExceeded)
    } else {
        Err(PathError::NotFound)
    }
}

#[allow(clippy::too_many_arguments)]
fn expand_forward<P: Potential>(
    graph: &Graph,
    weighting: &dyn Weighting,
    fwd: &mut Frontier,
    bwd: &Frontier,
    k: u32,
    potential: &P,
    skip: &[bool],
    best: &mut Meeting,
) {
    let g = fwd.weight(k);
    let via = state_of(graph, k).adj();

    for state in graph.edges_of(via) {
        let adj = state.adj();
        if skip[adj as usize] {
            continue;
        }

        let w = calc_weight(weighting, &state, false, Some(edge_of(k)));
        if !w.is_finite() {
            continue;
        }

        let next = key(&state, false);
        let candidate = g + w;
        if candidate >= fwd.weight(next) {
            continue;
        }

        let p = potential.potential(adj);
        if !p.is_finite() {
            continue;
        }
        fwd.relax(next, candidate, k, candidate + p);
        best.offer(next, candidate + bwd.weight(next));
    }
}

#[allow(clippy::too_many_arguments)]
fn expand_backward<P: Potential>(
    graph: &Graph,
    weighting: &dyn Weighting,
    bwd: &mut Frontier,
    fwd: &Frontier,
    k: u32,
    potential: &P,
    skip: &[bool],
    best: &mut Meeting,
) {
    let edge = state_of(graph, k);
    let via = edge.base();
    let p = potential.potential(via);
    if !p.is_finite() {
        return;
    }

    // Cost from the start of `edge` to the target
    let g = bwd.weight(k) + weighting.calc_edge_weight(&edge, false);

    for state in graph.edges_of(via) {
        if skip[state.adj() as usize] || !weighting.calc_edge_weight(&state, true).is_finite() {
            continue;
        }

        let candidate = g + weighting.calc_turn_weight(state.edge(), via, edge.edge());
        let next = key(&state, true);
        if !candidate.is_finite() || candidate >= bwd.weight(next) {
            continue;
        }

        bwd.relax(next, candidate, k, candidate - p);
        best.offer(next, fwd.weight(next) + candidate);
    }
}

/// Follows forward parents back to the source and backward parents on to the target.
fn collect_edges(fwd: &Frontier, bwd: &Frontier, meeting: u32) -> Vec<EdgeId> {
    let mut edges = Vec::new();

    let mut at = Some(meeting);
    while let Some(k) = at {
        edges.push(edge_of(k));
        at = fwd.parent(k);
    }
    edges.reverse();

    let mut at = bwd.parent(meeting);
    while let Some(k) = at {
        edges.push(edge_of(k));
        at = bwd.parent(k);
    }

    edges
}
