// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Alternative routes with the penalty method.
//!
//! After the best route is found, the edges of every route found so far get
//! costlier and the search runs again. Each new route is judged with the real
//! weights: it's accepted if it isn't much costlier than the best route and
//! doesn't overlap too much with any route accepted before it.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use super::dijkstra::{search, NoPotential, Potential};
use super::{Path, PathError, QueryOptions, QueryScratch};
use crate::weighting::Weighting;
use crate::{EdgeId, EdgeState, Graph, NodeId};

/// Factor applied to the edges of a found route before the next search.
const PENALTY: f64 = 1.5;

/// Searches run per requested route, the best one excluded.
const ATTEMPTS_PER_PATH: usize = 3;

/// Limits on the routes returned by [find_alternatives].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlternativeConfig {
    /// Routes returned at most, the best one included.
    pub max_paths: usize,

    /// An alternative may cost at most this many times the best route.
    pub max_weight_factor: f64,

    /// Part of an alternative's weight it may share with any route accepted before it.
    pub max_share_factor: f64,
}

impl Default for AlternativeConfig {
    fn default() -> Self {
        Self {
            max_paths: 3,
            max_weight_factor: 1.4,
            max_share_factor: 0.6,
        }
    }
}

impl AlternativeConfig {
    pub fn validate(&self) -> Result<(), PathError> {
        if self.max_paths == 0 {
            return Err(PathError::InvalidOption("max_paths must be positive".to_string()));
        }
        if self.max_weight_factor.is_nan() || self.max_weight_factor < 1.0 {
            return Err(PathError::InvalidOption(format!(
                "max_weight_factor must be at least 1, got {}",
                self.max_weight_factor
            )));
        }
        if !(self.max_share_factor > 0.0 && self.max_share_factor <= 1.0) {
            return Err(PathError::InvalidOption(format!(
                "max_share_factor must be in (0, 1], got {}",
                self.max_share_factor
            )));
        }
        Ok(())
    }
}

/// Finds the cheapest route and up to `config.max_paths - 1` alternatives to it,
/// ordered by weight. The first path is the one [super::dijkstra::find_route] returns.
pub fn find_alternatives(
    graph: &Graph,
    weighting: &dyn Weighting,
    from: NodeId,
    to: NodeId,
    config: &AlternativeConfig,
    options: &QueryOptions,
    scratch: &mut QueryScratch,
) -> Result<Vec<Path>, PathError> {
    alternatives(graph, weighting, from, to, config, options, scratch, &NoPotential)
}

/// A weighting making the edges of already found routes costlier.
#[derive(Debug)]
struct Penalized<'w> {
    inner: &'w dyn Weighting,
    factors: FxHashMap<EdgeId, f64>,
}

impl Weighting for Penalized<'_> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn calc_edge_weight(&self, edge: &EdgeState<'_>, reverse: bool) -> f64 {
        let factor = self.factors.get(&edge.edge()).copied().unwrap_or(1.0);
        self.inner.calc_edge_weight(edge, reverse) * factor
    }

    fn calc_edge_millis(&self, edge: &EdgeState<'_>, reverse: bool) -> u64 {
        self.inner.calc_edge_millis(edge, reverse)
    }

    fn calc_turn_weight(&self, in_edge: EdgeId, via: NodeId, out_edge: EdgeId) -> f64 {
        self.inner.calc_turn_weight(in_edge, via, out_edge)
    }

    fn has_turn_costs(&self) -> bool {
        self.inner.has_turn_costs()
    }
}

/// An accepted route with its edge set.
struct Accepted {
    path: Path,
    edges: FxHashSet<EdgeId>,
}

/// Runs [find_alternatives] with the given potential. Penalties only increase weights,
/// so a potential feasible for `weighting` stays feasible for every search.
#[allow(clippy::too_many_arguments)]
pub(crate) fn alternatives<P: Potential>(
    graph: &Graph,
    weighting: &dyn Weighting,
    from: NodeId,
    to: NodeId,
    config: &AlternativeConfig,
    options: &QueryOptions,
    scratch: &mut QueryScratch,
    potential: &P,
) -> Result<Vec<Path>, PathError> {
    config.validate()?;
    let best = search(graph, weighting, from, to, options, scratch, potential)?;
    if config.max_paths == 1 || best.edges.is_empty() {
        return Ok(vec![best]);
    }

    let max_weight = (best.weight * config.max_weight_factor).min(options.weight_limit);
    let mut penalized = Penalized {
        inner: weighting,
        factors: FxHashMap::default(),
    };
    let penalized_options = QueryOptions {
        weight_limit: f64::INFINITY,
        ..options.clone()
    };

    penalize(&mut penalized.factors, &best.edges);
    let mut accepted = vec![Accepted {
        edges: best.edges.iter().copied().collect(),
        path: best,
    }];

    let attempts = (config.max_paths - 1) * ATTEMPTS_PER_PATH;
    for _ in 0..attempts {
        let found = match search(graph, &penalized, from, to, &penalized_options, scratch, potential) {
            Ok(p) => p,
            Err(PathError::NotFound | PathError::LimitExceeded) => break,
            Err(e) => return Err(e),
        };
        penalize(&mut penalized.factors, &found.edges);

        let Some(weights) = edge_weights(graph, weighting, from, &found.edges) else {
            continue;
        };
        let weight: f64 = weights.iter().sum::<f64>() + turn_weights(graph, weighting, from, &found.edges);
        if weight > max_weight {
            continue;
        }

        let distinct = accepted.iter().all(|a| {
            let shared: f64 = found
                .edges
                .iter()
                .zip(&weights)
                .filter(|(e, _)| a.edges.contains(*e))
                .map(|(_, w)| w)
                .sum();
            a.path.edges != found.edges && shared <= config.max_share_factor * weight
        });
        if !distinct {
            continue;
        }

        accepted.push(Accepted {
            edges: found.edges.iter().copied().collect(),
            path: Path::from_edges(graph, weighting, from, found.edges, weight),
        });
        if accepted.len() == config.max_paths {
            break;
        }
    }

    log::debug!(
        "alternatives {} -> {}: {} of at most {} routes",
        from,
        to,
        accepted.len(),
        config.max_paths,
    );

    let mut paths: Vec<Path> = accepted.into_iter().map(|a| a.path).collect();
    paths[1..].sort_by(|a, b| a.weight.total_cmp(&b.weight));
    Ok(paths)
}

fn penalize(factors: &mut FxHashMap<EdgeId, f64>, edges: &[EdgeId]) {
    for &e in edges {
        *factors.entry(e).or_insert(1.0) *= PENALTY;
    }
}

/// Real weights of the edges of a route starting at `from`, or `None` if one is inaccessible.
fn edge_weights(graph: &Graph, weighting: &dyn Weighting, from: NodeId, edges: &[EdgeId]) -> Option<Vec<f64>> {
    let mut at = from;
    let mut weights = Vec::with_capacity(edges.len());
    for &e in edges {
        at = graph.other_node(e, at);
        let w = weighting.calc_edge_weight(&graph.edge_state(e, at), false);
        if !w.is_finite() {
            return None;
        }
        weights.push(w);
    }
    Some(weights)
}

/// Sum of the turn costs along a route starting at `from`.
fn turn_weights(graph: &Graph, weighting: &dyn Weighting, from: NodeId, edges: &[EdgeId]) -> f64 {
    if !weighting.has_turn_costs() {
        return 0.0;
    }
    let mut at = from;
    let mut total = 0.0;
    for pair in edges.windows(2) {
        at = graph.other_node(pair[0], at);
        total += weighting.calc_turn_weight(pair[0], at, pair[1]);
    }
    total
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::routing::dijkstra::find_route;
    use crate::testing::{edge_list_graph, random_graph, TestEdge};
    use crate::weighting::{CustomModel, CustomWeighting, ShortestWeighting, TurnCostTable};
    use crate::CancellationToken;

    /// Four corridors from 0 to 1, through nodes 2, 3, 4 and 5.
    fn corridors() -> Graph {
        edge_list_graph(
            6,
            &[
                TestEdge::new(0, 2, 10.0, true),
                TestEdge::new(2, 1, 10.0, true),
                TestEdge::new(0, 3, 11.0, true),
                TestEdge::new(3, 1, 11.0, true),
                TestEdge::new(0, 4, 12.0, true),
                TestEdge::new(4, 1, 12.0, true),
                TestEdge::new(0, 5, 20.0, true),
                TestEdge::new(5, 1, 20.0, true),
            ],
        )
    }

    fn shortest(g: &Graph) -> ShortestWeighting {
        ShortestWeighting::new(g.encoding(), "car").unwrap()
    }

    #[test_log::test]
    fn disjoint_corridors() {
        let g = corridors();
        let w = shortest(&g);
        let mut scratch = QueryScratch::new(g.node_count());
        let config = AlternativeConfig::default();

        let paths = find_alternatives(&g, &w, 0, 1, &config, &QueryOptions::default(), &mut scratch).unwrap();
        let nodes: Vec<_> = paths.iter().map(|p| p.nodes.clone()).collect();
        assert_eq!(nodes, vec![vec![0, 2, 1], vec![0, 3, 1], vec![0, 4, 1]]);
        let weights: Vec<_> = paths.iter().map(|p| p.weight).collect();
        assert_eq!(weights, vec![20.0, 22.0, 24.0]);
        assert_eq!(paths[1].distance, 22.0);

        let best = find_route(&g, &w, 0, 1, &QueryOptions::default(), &mut scratch).unwrap();
        assert_eq!(paths[0], best);
    }

    #[test]
    fn limits_are_honoured() {
        let g = corridors();
        let w = shortest(&g);
        let mut scratch = QueryScratch::new(g.node_count());
        let options = QueryOptions::default();

        let config = AlternativeConfig {
            max_weight_factor: 1.15,
            ..Default::default()
        };
        let paths = find_alternatives(&g, &w, 0, 1, &config, &options, &mut scratch).unwrap();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[1].nodes, vec![0, 3, 1]);

        let config = AlternativeConfig {
            max_paths: 10,
            ..Default::default()
        };
        let paths = find_alternatives(&g, &w, 0, 1, &config, &options, &mut scratch).unwrap();
        assert_eq!(paths.len(), 3);

        let config = AlternativeConfig {
            max_paths: 1,
            ..Default::default()
        };
        let paths = find_alternatives(&g, &w, 0, 1, &config, &options, &mut scratch).unwrap();
        assert_eq!(paths.len(), 1);

        let skip_3 = QueryOptions {
            skip_nodes: vec![3],
            ..Default::default()
        };
        let paths = find_alternatives(&g, &w, 0, 1, &AlternativeConfig::default(), &skip_3, &mut scratch).unwrap();
        let nodes: Vec<_> = paths.iter().map(|p| p.nodes.clone()).collect();
        assert_eq!(nodes, vec![vec![0, 2, 1], vec![0, 4, 1]]);

        let limited = QueryOptions {
            weight_limit: 22.0,
            ..Default::default()
        };
        let paths = find_alternatives(&g, &w, 0, 1, &AlternativeConfig::default(), &limited, &mut scratch).unwrap();
        assert_eq!(paths.len(), 2);
    }

    #[test]
    fn overlapping_routes_are_rejected() {
        // 0 - 1 is shared by both ways to 3
        let g = edge_list_graph(
            4,
            &[
                TestEdge::new(0, 1, 50.0, true),
                TestEdge::new(1, 2, 5.0, true),
                TestEdge::new(2, 3, 5.0, true),
                TestEdge::new(1, 3, 12.0, true),
            ],
        );
        let w = shortest(&g);
        let mut scratch = QueryScratch::new(g.node_count());
        let options = QueryOptions::default();

        let paths = find_alternatives(&g, &w, 0, 3, &AlternativeConfig::default(), &options, &mut scratch).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].nodes, vec![0, 1, 2, 3]);

        let config = AlternativeConfig {
            max_share_factor: 0.9,
            ..Default::default()
        };
        let paths = find_alternatives(&g, &w, 0, 3, &config, &options, &mut scratch).unwrap();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[1].nodes, vec![0, 1, 3]);
        assert_eq!(paths[1].weight, 62.0);
    }

    #[test]
    fn errors_and_trivial_routes() {
        let g = corridors();
        let w = shortest(&g);
        let mut scratch = QueryScratch::new(g.node_count());
        let options = QueryOptions::default();
        let config = AlternativeConfig::default();

        let paths = find_alternatives(&g, &w, 2, 2, &config, &options, &mut scratch).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].nodes, vec![2]);

        assert_eq!(
            find_alternatives(&g, &w, 0, 9, &config, &options, &mut scratch),
            Err(PathError::InvalidNode(9))
        );

        for bad in [
            AlternativeConfig {
                max_paths: 0,
                ..Default::default()
            },
            AlternativeConfig {
                max_weight_factor: 0.5,
                ..Default::default()
            },
            AlternativeConfig {
                max_share_factor: 0.0,
                ..Default::default()
            },
            AlternativeConfig {
                max_share_factor: f64::NAN,
                ..Default::default()
            },
        ] {
            assert!(matches!(
                find_alternatives(&g, &w, 0, 1, &bad, &options, &mut scratch),
                Err(PathError::InvalidOption(_))
            ));
        }

        let token = CancellationToken::new();
        token.cancel();
        let cancelled = QueryOptions {
            cancel: Some(token),
            ..Default::default()
        };
        assert_eq!(
            find_alternatives(&g, &w, 0, 1, &config, &cancelled, &mut scratch),
            Err(PathError::Cancelled)
        );
    }

    #[test]
    fn turn_costs_count_towards_the_weight() {
        let g = corridors();
        let mut table = TurnCostTable::default();
        // 0 -> 3 -> 1 costs an extra 1.5 s
        table.set(2, 3, 3, 1.5);
        let w = CustomWeighting::new("car", &CustomModel::for_base("car"), g.encoding())
            .unwrap()
            .with_turn_costs(Arc::new(table));
        let mut scratch = QueryScratch::new(g.node_count());

        let config = AlternativeConfig {
            max_weight_factor: 2.0,
            ..Default::default()
        };
        let paths = find_alternatives(&g, &w, 0, 1, &config, &QueryOptions::default(), &mut scratch).unwrap();
        let nodes: Vec<_> = paths.iter().map(|p| p.nodes.clone()).collect();
        assert_eq!(nodes, vec![vec![0, 2, 1], vec![0, 4, 1], vec![0, 3, 1]]);
        assert_almost_eq!(paths[1].weight, 2.4);
        assert_almost_eq!(paths[2].weight, 3.7);
    }

    #[test]
    fn alternatives_are_valid_routes() {
        let g = random_graph(61, 300, 450);
        let w = CustomWeighting::new("car", &CustomModel::for_base("car"), g.encoding()).unwrap();
        let mut scratch = QueryScratch::new(g.node_count());
        let config = AlternativeConfig::default();

        for to in (0..300).step_by(23) {
            let Ok(paths) = find_alternatives(&g, &w, 4, to, &config, &QueryOptions::default(), &mut scratch)
            else {
                continue;
            };
            assert!(paths.len() <= config.max_paths);
            for p in &paths {
                assert_eq!(p.nodes.first(), Some(&4));
                assert_eq!(p.nodes.last(), Some(&to));
                assert!(p.weight <= paths[0].weight * config.max_weight_factor + 1e-9);
                let sum: f64 = p
                    .edges
                    .iter()
                    .zip(&p.nodes[1..])
                    .map(|(&e, &n)| w.calc_edge_weight(&g.edge_state(e, n), false))
                    .sum();
                assert_almost_eq!(sum, p.weight);
            }
            for pair in paths[1..].windows(2) {
                assert!(pair[0].weight <= pair[1].weight);
            }
        }
    }
}
