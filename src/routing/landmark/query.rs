// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use super::{LandmarkStorage, NO_SUBNETWORK};
use crate::routing::alternative::{alternatives, AlternativeConfig};
use crate::routing::dijkstra::{search, Potential};
use crate::routing::{check_endpoints, Path, PathError, QueryOptions, QueryScratch};
use crate::weighting::Weighting;
use crate::{Graph, NodeId};

/// Balanced potential `(h(v, t) - h(s, v)) / 2` over a fixed set of landmarks.
struct Balanced<'a> {
    storage: &'a LandmarkStorage,
    active: Vec<u32>,
    from: NodeId,
    to: NodeId,
}

impl Potential for Balanced<'_> {
    #[inline]
    fn potential(&self, node: NodeId) -> f64 {
        let to_target = self.storage.bound_with(&self.active, node, self.to);
        let from_source = self.storage.bound_with(&self.active, self.from, node);
        if to_target.is_infinite() || from_source.is_infinite() {
            return f64::INFINITY;
        }
        (to_target - from_source) / 2.0
    }
}

/// Potential of a single query. Endpoints without landmarks get the zero potential.
enum QueryPotential<'a> {
    Zero,
    Balanced(Balanced<'a>),
}

impl Potential for QueryPotential<'_> {
    #[inline]
    fn potential(&self, node: NodeId) -> f64 {
        match self {
            Self::Zero => 0.0,
            Self::Balanced(b) => b.potential(node),
        }
    }
}

impl LandmarkStorage {
    /// Finds the cheapest route with bidirectional A*, guided by the
    /// [LandmarkStorage::active_landmarks] landmarks giving the best bound between the endpoints.
    ///
    /// Endpoints without landmarks fall back to plain bidirectional Dijkstra.
    pub fn find_route(
        &self,
        graph: &Graph,
        weighting: &dyn Weighting,
        from: NodeId,
        to: NodeId,
        options: &QueryOptions,
        scratch: &mut QueryScratch,
    ) -> Result<Path, PathError> {
        self.find_route_with(graph, weighting, from, to, options, scratch, self.active_landmarks)
    }

    /// Like [LandmarkStorage::find_route], but consults at most `active_landmarks`.
    #[allow(clippy::too_many_arguments)]
    pub fn find_route_with(
        &self,
        graph: &Graph,
        weighting: &dyn Weighting,
        from: NodeId,
        to: NodeId,
        options: &QueryOptions,
        scratch: &mut QueryScratch,
        active_landmarks: usize,
    ) -> Result<Path, PathError> {
        let potential = self.query_potential(graph, weighting, from, to, active_landmarks)?;
        search(graph, weighting, from, to, options, scratch, &potential)
    }

    /// Like [LandmarkStorage::find_route], but also looks for alternatives,
    /// as [crate::routing::alternative::find_alternatives] does.
    #[allow(clippy::too_many_arguments)]
    pub fn find_alternatives(
        &self,
        graph: &Graph,
        weighting: &dyn Weighting,
        from: NodeId,
        to: NodeId,
        config: &AlternativeConfig,
        options: &QueryOptions,
        scratch: &mut QueryScratch,
    ) -> Result<Vec<Path>, PathError> {
        let potential = self.query_potential(graph, weighting, from, to, self.active_landmarks)?;
        alternatives(graph, weighting, from, to, config, options, scratch, &potential)
    }

    fn query_potential(
        &self,
        graph: &Graph,
        weighting: &dyn Weighting,
        from: NodeId,
        to: NodeId,
        active_landmarks: usize,
    ) -> Result<QueryPotential<'_>, PathError> {
        if !self.weighting.matches(weighting) || graph.node_count() != self.node_count() {
            return Err(PathError::MissingPreparation {
                kind: "landmarks",
                weighting: weighting.name().to_string(),
            });
        }
        check_endpoints(graph, from, to)?;

        let (sub_from, sub_to) = (self.subnetwork(from), self.subnetwork(to));
        if sub_from != sub_to {
            return Err(PathError::DifferentSubnetworks {
                from: sub_from,
                to: sub_to,
            });
        }

        let candidates = self.landmarks_of(sub_from);
        if sub_from == NO_SUBNETWORK || candidates.is_empty() || active_landmarks == 0 {
            return Ok(QueryPotential::Zero);
        }

        Ok(QueryPotential::Balanced(Balanced {
            storage: self,
            active: self.choose_active(candidates, from, to, active_landmarks),
            from,
            to,
        }))
    }

    /// Picks the landmarks with the tightest lower bound on `d(from, to)`.
    fn choose_active(&self, candidates: &[u32], from: NodeId, to: NodeId, count: usize) -> Vec<u32> {
        if candidates.len() <= count {
            return candidates.to_vec();
        }

        let mut scored: Vec<(f64, u32)> = candidates
            .iter()
            .map(|&l| {
                let b = self.landmarks[l as usize].bound(from, to);
                (if b.is_nan() { f64::NEG_INFINITY } else { b }, l)
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        scored.truncate(count);
        scored.into_iter().map(|(_, l)| l).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::routing::alternative::find_alternatives;
    use crate::routing::dijkstra::find_route;
    use crate::routing::landmark::LandmarkConfig;
    use crate::testing::random_graph;
    use crate::weighting::{CustomModel, CustomWeighting, TurnCostTable};

    #[test]
    fn potential_is_feasible() {
        let g = random_graph(41, 200, 260);
        let w = CustomWeighting::new("car", &CustomModel::for_base("car"), g.encoding()).unwrap();
        let config = LandmarkConfig {
            landmarks: 6,
            active_landmarks: 3,
            minimum_nodes: 10,
        };
        let lm = LandmarkStorage::prepare(&g, &w, &config).unwrap();

        let (from, to) = (3, 150);
        let sub = lm.subnetwork(from);
        if sub == NO_SUBNETWORK || sub != lm.subnetwork(to) {
            return;
        }
        let p = Balanced {
            storage: &lm,
            active: lm.choose_active(lm.landmarks_of(sub), from, to, 3),
            from,
            to,
        };
        assert_eq!(p.active.len(), 3);

        for u in 0..200 {
            for edge in g.edges_of(u) {
                let weight = w.calc_edge_weight(&edge, false);
                let (pu, pv) = (p.potential(u), p.potential(edge.adj()));
                if weight.is_finite() && pu.is_finite() && pv.is_finite() {
                    assert!(weight - pu + pv >= -1e-6);
                }
            }
        }
    }

    #[test]
    fn fewer_active_landmarks_still_exact() {
        let g = random_graph(42, 200, 260);
        let w = CustomWeighting::new("car", &CustomModel::for_base("car"), g.encoding()).unwrap();
        let config = LandmarkConfig {
            landmarks: 8,
            active_landmarks: 1,
            minimum_nodes: 10,
        };
        let lm = LandmarkStorage::prepare(&g, &w, &config).unwrap();
        let mut scratch = QueryScratch::new(200);

        for to in (0..200).step_by(11) {
            let options = QueryOptions::default();
            let one = lm.find_route(&g, &w, 7, to, &options, &mut scratch).map(|p| p.weight);
            let all = lm
                .find_route_with(&g, &w, 7, to, &options, &mut scratch, 8)
                .map(|p| p.weight);
            match (all, one) {
                (Ok(a), Ok(b)) => assert_almost_eq!(a, b),
                (a, b) => assert_eq!(a, b),
            }
        }
    }

    #[test]
    fn alternatives_match_plain_search() {
        let g = random_graph(44, 200, 300);
        let w = CustomWeighting::new("car", &CustomModel::for_base("car"), g.encoding()).unwrap();
        let lm_config = LandmarkConfig {
            landmarks: 4,
            active_landmarks: 2,
            minimum_nodes: 10,
        };
        let lm = LandmarkStorage::prepare(&g, &w, &lm_config).unwrap();
        let mut scratch = QueryScratch::new(200);
        let config = AlternativeConfig::default();
        let options = QueryOptions::default();

        for to in (0..200).step_by(13) {
            let plain = find_alternatives(&g, &w, 2, to, &config, &options, &mut scratch);
            let guided = lm.find_alternatives(&g, &w, 2, to, &config, &options, &mut scratch);
            match (plain, guided) {
                (Ok(a), Ok(b)) => {
                    assert_eq!(a.len(), b.len());
                    for (x, y) in a.iter().zip(&b) {
                        assert_almost_eq!(x.weight, y.weight);
                    }
                }
                (Err(PathError::NotFound), Err(_)) => {}
                (a, b) => panic!("plain {:?}, landmarks {:?}", a, b),
            }
        }
    }

    #[test]
    fn turn_costs_keep_landmark_routes_exact() {
        let g = random_graph(43, 200, 260);
        let mut table = TurnCostTable::default();
        for e in (0..g.edge_count() as u32).step_by(2) {
            let via = g.edge(e).adj();
            for next in g.edges_of(via) {
                if next.edge() % 4 == 1 {
                    table.restrict(e, via, next.edge());
                } else if next.edge() % 4 == 3 {
                    table.set(e, via, next.edge(), 6.0);
                }
            }
        }
        let w = CustomWeighting::new("car", &CustomModel::for_base("car"), g.encoding())
            .unwrap()
            .with_turn_costs(Arc::new(table));
        let config = LandmarkConfig {
            landmarks: 4,
            active_landmarks: 2,
            minimum_nodes: 10,
        };
        let lm = LandmarkStorage::prepare(&g, &w, &config).unwrap();
        let mut scratch = QueryScratch::new(200);

        for to in (0..200).step_by(9) {
            let options = QueryOptions::default();
            let plain = find_route(&g, &w, 11, to, &options, &mut scratch).map(|p| p.weight);
            match (plain, lm.find_route(&g, &w, 11, to, &options, &mut scratch)) {
                (Ok(a), Ok(b)) => assert_almost_eq!(a, b.weight),
                (Err(PathError::NotFound), Err(PathError::NotFound)) => {}
                (Err(PathError::NotFound), Err(PathError::DifferentSubnetworks { .. })) => {}
                (a, b) => panic!("dijkstra {:?}, landmarks {:?}", a, b),
            }
        }
    }
}
