// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Bidirectional Dijkstra, optionally guided by node potentials.
//!
//! Weightings with turn costs are searched over edges instead of nodes
//! so that every way of entering a node keeps its own cost.

use super::{check_endpoints, edge_based, Budget, Frontier, Path, PathError, QueryOptions, QueryScratch};
use crate::queue::MinHeap;
use crate::weighting::Weighting;
use crate::{EdgeId, Graph, NodeId};

/// Node potential for a goal-directed search.
///
/// The forward frontier orders nodes by `g(v) + p(v)`, the backward one by
/// `g(v) - p(v)`. A potential is feasible if `w(u, v) - p(u) + p(v) >= 0` for every edge.
/// A non-finite potential marks a node which can't lie on any route.
pub(crate) trait Potential {
    fn potential(&self, node: NodeId) -> f64;
}

/// The zero potential, which gives plain bidirectional Dijkstra.
pub(crate) struct NoPotential;

impl Potential for NoPotential {
    #[inline]
    fn potential(&self, _: NodeId) -> f64 {
        0.0
    }
}

/// Finds the cheapest route with plain bidirectional Dijkstra.
///
/// `scratch` may be reused between queries over the same graph;
/// it is reset at the beginning of every search.
pub fn find_route(
    graph: &Graph,
    weighting: &dyn Weighting,
    from: NodeId,
    to: NodeId,
    options: &QueryOptions,
    scratch: &mut QueryScratch,
) -> Result<Path, PathError> {
    search(graph, weighting, from, to, options, scratch, &NoPotential)
}

struct Meeting {
    weight: f64,
    node: NodeId,
}

/// Bidirectional search with the stopping rule `top_fwd + top_bwd >= μ`,
/// which stays valid with the `±p(v)` keys of a feasible potential.
pub(crate) fn search<P: Potential>(
    graph: &Graph,
    weighting: &dyn Weighting,
    from: NodeId,
    to: NodeId,
    options: &QueryOptions,
    scratch: &mut QueryScratch,
    potential: &P,
) -> Result<Path, PathError> {
    check_endpoints(graph, from, to)?;
    scratch.prepare(graph.node_count(), options);
    if scratch.is_skipped(from) || scratch.is_skipped(to) {
        return Err(PathError::NotFound);
    }

    if from == to {
        return Ok(Path::from_edges(graph, weighting, from, Vec::new(), 0.0));
    }

    if weighting.has_turn_costs() {
        return edge_based::search(graph, weighting, from, to, options, scratch, potential);
    }

    let mut budget = Budget::new(options);
    budget.check_cancelled()?;

    let mut best = Meeting {
        weight: f64::INFINITY,
        node: from,
    };
    let mut cut = false;

    let QueryScratch { fwd, bwd, skip, .. } = scratch;
    fwd.start(from, potential.potential(from));
    bwd.start(to, -potential.potential(to));

    loop {
        let (Some(top_f), Some(top_b)) = (fwd.heap.peek_priority(), bwd.heap.peek_priority()) else {
            break;
        };
        if top_f + top_b >= best.weight {
            break;
        }

        let reverse = top_b < top_f;
        let (this, other) = if reverse { (&mut *bwd, &*fwd) } else { (&mut *fwd, &*bwd) };
        let Some((node, _)) = this.heap.pop() else {
            break;
        };
        budget.visit()?;

        let g = this.weight(node);
        if g > options.weight_limit {
            cut = true;
            continue;
        }

        expand(
            graph,
            weighting,
            this,
            other,
            node,
            reverse,
            potential,
            &skip[..],
            &mut best,
        );
    }

    log::debug!(
        "bidirectional search {} -> {}: {} nodes visited, weight {}",
        from,
        to,
        budget.visited,
        best.weight,
    );

    if best.weight.is_finite() {
        if best.weight > options.weight_limit {
            return Err(PathError::LimitExceeded);
        }
        let edges = collect_edges(graph, fwd, bwd, from, to, best.node);
        return Ok(Path::from_edges(graph, weighting, from, edges, best.weight));
    }

    if cut {
        Err(PathError::LimitExceeded)
    } else {
        Err(PathError::NotFound)
    }
}

#[allow(clippy::too_many_arguments)]
#[inline]
fn expand<P: Potential>(
    graph: &Graph,
    weighting: &dyn Weighting,
    this: &mut Frontier,
    other: &Frontier,
    node: NodeId,
    reverse: bool,
    potential: &P,
    skip: &[bool],
    best: &mut Meeting,
) {
    let g = this.weight(node);

    for edge in graph.edges_of(node) {
        let adj = edge.adj();
        if skip[adj as usize] {
            continue;
        }

        let w = weighting.calc_edge_weight(&edge, reverse);
        if !w.is_finite() {
            continue;
        }

        let candidate = g + w;
        if candidate >= this.weight(adj) {
            continue;
        }

        let p = potential.potential(adj);
        if !p.is_finite() {
            continue;
        }
        let key = if reverse { candidate - p } else { candidate + p };
        this.relax(adj, candidate, edge.edge(), key);

        let total = candidate + other.weight(adj);
        if total < best.weight {
            best.weight = total;
            best.node = adj;
        }
    }
}

/// Walks parent edges from the meeting node back to both endpoints.
fn collect_edges(
    graph: &Graph,
    fwd: &Frontier,
    bwd: &Frontier,
    from: NodeId,
    to: NodeId,
    meeting: NodeId,
) -> Vec<EdgeId> {
    let mut edges = Vec::new();

    let mut at = meeting;
    while at != from {
        let Some(e) = fwd.parent(at) else { break };
        edges.push(e);
        at = graph.other_node(e, at);
    }
    edges.reverse();

    let mut at = meeting;
    while at != to {
        let Some(e) = bwd.parent(at) else { break };
        edges.push(e);
        at = graph.other_node(e, at);
    }

    edges
}

/// Which edges a [shortest_path_tree] follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TreeDirection {
    /// Weights `d(source, v)`.
    Forward,
    /// Weights `d(v, source)`.
    Backward,
    /// Every edge usable in any direction, at its cheaper weight.
    Undirected,
}

/// One-to-all Dijkstra, without turn costs. Unreachable nodes get [f64::INFINITY].
pub(crate) fn shortest_path_tree(
    graph: &Graph,
    weighting: &dyn Weighting,
    source: NodeId,
    direction: TreeDirection,
) -> Vec<f64> {
    let n = graph.node_count();
    let mut weights = vec![f64::INFINITY; n];
    let mut heap = MinHeap::with_capacity(n);
    weights[source as usize] = 0.0;
    heap.insert(source, 0.0);

    while let Some((node, g)) = heap.pop() {
        for edge in graph.edges_of(node) {
            let w = match direction {
                TreeDirection::Forward => weighting.calc_edge_weight(&edge, false),
                TreeDirection::Backward => weighting.calc_edge_weight(&edge, true),
                TreeDirection::Undirected => weighting
                    .calc_edge_weight(&edge, false)
                    .min(weighting.calc_edge_weight(&edge, true)),
            };
            if !w.is_finite() {
                continue;
            }

            let adj = edge.adj() as usize;
            if g + w < weights[adj] {
                weights[adj] = g + w;
                heap.push_or_decrease(edge.adj(), g + w);
            }
        }
    }

    weights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{edge_list_graph, five_node_graph, random_graph, TestEdge};
    use crate::weighting::{CustomModel, CustomWeighting, ShortestWeighting, TurnCostTable};
    use crate::CancellationToken;
    use std::sync::Arc;

    fn route(g: &Graph, from: NodeId, to: NodeId, options: &QueryOptions) -> Result<Path, PathError> {
        let w = ShortestWeighting::new(g.encoding(), "car").unwrap();
        let mut scratch = QueryScratch::new(g.node_count());
        find_route(g, &w, from, to, options, &mut scratch)
    }

    #[test]
    fn five_node_example() {
        let g = five_node_graph();
        let p = route(&g, 0, 3, &QueryOptions::default()).unwrap();
        assert_eq!(p.weight, 30.0);
        assert_eq!(p.nodes, vec![0, 1, 2, 3]);
        assert_eq!(p.edges, vec![0, 1, 2]);
        assert_eq!(p.distance, 30.0);

        // 2 -> 1 is one-way in the wrong direction
        let p = route(&g, 3, 0, &QueryOptions::default()).unwrap();
        assert_eq!(p.weight, 80.0);
        assert_eq!(p.nodes, vec![3, 4, 0]);
    }

    #[test]
    fn trivial_and_invalid() {
        let g = five_node_graph();
        let p = route(&g, 2, 2, &QueryOptions::default()).unwrap();
        assert_eq!(p.nodes, vec![2]);
        assert!(p.edges.is_empty());
        assert_eq!(p.weight, 0.0);

        assert_eq!(
            route(&g, 0, 42, &QueryOptions::default()),
            Err(PathError::InvalidNode(42))
        );
    }

    #[test]
    fn disconnected_components() {
        // Two triangles joined by the bridge 2-3
        let edges = [
            TestEdge::new(0, 1, 5.0, true),
            TestEdge::new(1, 2, 5.0, true),
            TestEdge::new(2, 0, 5.0, true),
            TestEdge::new(3, 4, 5.0, true),
            TestEdge::new(4, 5, 5.0, true),
            TestEdge::new(5, 3, 5.0, true),
        ];
        let mut with_bridge = edges.to_vec();
        with_bridge.push(TestEdge::new(2, 3, 5.0, true));

        let g = edge_list_graph(6, &with_bridge);
        assert_eq!(route(&g, 0, 4, &QueryOptions::default()).unwrap().weight, 15.0);

        let g = edge_list_graph(6, &edges);
        for a in 0..3 {
            for b in 3..6 {
                assert_eq!(route(&g, a, b, &QueryOptions::default()), Err(PathError::NotFound));
                assert_eq!(route(&g, b, a, &QueryOptions::default()), Err(PathError::NotFound));
            }
        }
    }

    #[test]
    fn skip_nodes() {
        let g = five_node_graph();
        let options = QueryOptions {
            skip_nodes: vec![1],
            ..Default::default()
        };
        let p = route(&g, 0, 3, &options).unwrap();
        assert_eq!(p.nodes, vec![0, 4, 3]);
        assert_eq!(p.weight, 80.0);

        let options = QueryOptions {
            skip_nodes: vec![1, 4],
            ..Default::default()
        };
        assert_eq!(route(&g, 0, 3, &options), Err(PathError::NotFound));

        let options = QueryOptions {
            skip_nodes: vec![3],
            ..Default::default()
        };
        assert_eq!(route(&g, 0, 3, &options), Err(PathError::NotFound));
    }

    #[test]
    fn visit_budget() {
        let line: Vec<_> = (0..49).map(|i| TestEdge::new(i, i + 1, 1.0, true)).collect();
        let g = edge_list_graph(50, &line);
        assert_eq!(route(&g, 0, 49, &QueryOptions::default()).unwrap().weight, 49.0);

        let options = QueryOptions {
            max_visited_nodes: 5,
            ..Default::default()
        };
        assert_eq!(route(&g, 0, 49, &options), Err(PathError::LimitExceeded));
        assert_eq!(route(&g, 0, 2, &options).unwrap().weight, 2.0);
    }

    #[test]
    fn weight_limit() {
        let g = five_node_graph();
        let options = QueryOptions {
            weight_limit: 20.0,
            ..Default::default()
        };
        assert_eq!(route(&g, 0, 3, &options), Err(PathError::LimitExceeded));
        assert_eq!(route(&g, 0, 2, &options).unwrap().weight, 20.0);

        let options = QueryOptions {
            weight_limit: 30.0,
            ..Default::default()
        };
        assert_eq!(route(&g, 0, 3, &options).unwrap().weight, 30.0);
    }

    #[test]
    fn cancellation() {
        let g = random_graph(5, 2000, 2000);
        let token = CancellationToken::new();
        token.cancel();
        let options = QueryOptions {
            cancel: Some(token),
            ..Default::default()
        };
        assert_eq!(route(&g, 0, 1999, &options), Err(PathError::Cancelled));
    }

    #[test]
    fn turn_costs_change_the_route() {
        //  0 --- 1 --- 2
        //        |     |
        //        3 --- 4
        let g = edge_list_graph(
            5,
            &[
                TestEdge::new(0, 1, 10.0, true),
                TestEdge::new(1, 2, 10.0, true),
                TestEdge::new(1, 3, 10.0, true),
                TestEdge::new(2, 4, 10.0, true),
                TestEdge::new(3, 4, 40.0, true),
            ],
        );
        let plain = CustomWeighting::new("car", &CustomModel::for_base("car"), g.encoding()).unwrap();
        let mut scratch = QueryScratch::new(g.node_count());
        let p = find_route(&g, &plain, 0, 4, &QueryOptions::default(), &mut scratch).unwrap();
        assert_eq!(p.nodes, vec![0, 1, 2, 4]);

        let mut table = TurnCostTable::default();
        table.restrict(0, 1, 1);
        let turns = plain.clone().with_turn_costs(Arc::new(table));
        let p = find_route(&g, &turns, 0, 4, &QueryOptions::default(), &mut scratch).unwrap();
        assert_eq!(p.nodes, vec![0, 1, 3, 4]);
    }

    #[test]
    fn agrees_with_one_to_all() {
        let g = random_graph(11, 200, 250);
        let w = ShortestWeighting::new(g.encoding(), "car").unwrap();
        let tree = shortest_path_tree(&g, &w, 17, TreeDirection::Forward);
        let back = shortest_path_tree(&g, &w, 17, TreeDirection::Backward);
        let mut scratch = QueryScratch::new(g.node_count());

        for t in 0..200 {
            let r = find_route(&g, &w, 17, t, &QueryOptions::default(), &mut scratch);
            match r {
                Ok(p) => assert_almost_eq!(p.weight, tree[t as usize]),
                Err(e) => {
                    assert_eq!(e, PathError::NotFound);
                    assert!(tree[t as usize].is_infinite());
                }
            }

            let r = find_route(&g, &w, t, 17, &QueryOptions::default(), &mut scratch);
            match r {
                Ok(p) => assert_almost_eq!(p.weight, back[t as usize]),
                Err(_) => assert!(back[t as usize].is_infinite()),
            }
        }
    }

    #[test]
    fn path_weight_matches_edges() {
        let g = random_graph(13, 150, 200);
        let w = CustomWeighting::new("car", &CustomModel::for_base("car"), g.encoding()).unwrap();
        let mut scratch = QueryScratch::new(g.node_count());
        for t in (0..150).step_by(7) {
            if let Ok(p) = find_route(&g, &w, 3, t, &QueryOptions::default(), &mut scratch) {
                let sum: f64 = p
                    .edges
                    .iter()
                    .zip(&p.nodes[1..])
                    .map(|(&e, &n)| w.calc_edge_weight(&g.edge_state(e, n), false))
                    .sum();
                assert_almost_eq!(sum, p.weight);
                assert_eq!(p.nodes.first(), Some(&3));
                assert_eq!(p.nodes.last(), Some(&t));
            }
        }
    }
}
