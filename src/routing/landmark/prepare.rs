// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::VecDeque;
use std::time::Instant;

use rayon::prelude::*;

use super::{Landmark, LandmarkConfig, LandmarkStorage, NO_SUBNETWORK};
use crate::routing::dijkstra::{shortest_path_tree, TreeDirection};
use crate::routing::PreparationError;
use crate::weighting::{Weighting, WeightingKey};
use crate::{Graph, NodeId};

impl LandmarkStorage {
    /// Splits the graph into subnetworks, picks landmarks in each of the large ones
    /// and computes the weights from and to every landmark.
    pub fn prepare(
        graph: &Graph,
        weighting: &dyn Weighting,
        config: &LandmarkConfig,
    ) -> Result<Self, PreparationError> {
        if config.landmarks > 0 && config.active_landmarks == 0 {
            return Err(PreparationError::InvalidConfig(
                "active_landmarks must be positive".to_string(),
            ));
        }

        let started = Instant::now();
        log::info!(
            "preparing {} landmarks per subnetwork for {}",
            config.landmarks,
            weighting.name()
        );

        let (subnetworks, members) = find_subnetworks(graph, weighting, config.minimum_nodes);
        log::debug!("found {} subnetworks with landmarks", members.len());

        let mut picked: Vec<(NodeId, u32)> = Vec::new();
        if config.landmarks > 0 {
            for (i, nodes) in members.iter().enumerate() {
                let sub = i as u32 + 1;
                for node in select_landmarks(graph, weighting, nodes, config.landmarks) {
                    picked.push((node, sub));
                }
            }
        }

        let landmarks: Vec<Landmark> = picked
            .par_iter()
            .map(|&(node, subnetwork)| Landmark {
                node,
                subnetwork,
                from: shortest_path_tree(graph, weighting, node, TreeDirection::Forward),
                to: shortest_path_tree(graph, weighting, node, TreeDirection::Backward),
            })
            .collect();

        log::info!(
            "prepared {} landmarks in {} subnetworks for {} in {:.2?}",
            landmarks.len(),
            members.len(),
            weighting.name(),
            started.elapsed()
        );

        Ok(Self::from_parts(
            WeightingKey::of(weighting),
            subnetworks,
            landmarks,
            config.active_landmarks,
        ))
    }
}

/// Weakly connected components over edges accessible in at least one direction.
///
/// Returns the subnetwork id of every node and the members of every subnetwork
/// with landmarks (`members[i]` belongs to id `i + 1`). Components smaller than
/// `minimum_nodes` all get [NO_SUBNETWORK].
fn find_subnetworks(
    graph: &Graph,
    weighting: &dyn Weighting,
    minimum_nodes: usize,
) -> (Vec<u32>, Vec<Vec<NodeId>>) {
    let n = graph.node_count();
    let mut visited = vec![false; n];
    let mut subnetworks = vec![NO_SUBNETWORK; n];
    let mut members = Vec::new();
    let mut too_small = 0;
    let mut queue = VecDeque::new();

    for start in 0..n {
        if visited[start] {
            continue;
        }

        let mut component = Vec::new();
        queue.push_back(start as NodeId);
        visited[start] = true;

        while let Some(u) = queue.pop_front() {
            component.push(u);
            for edge in graph.edges_of(u) {
                let v = edge.adj() as usize;
                if visited[v] {
                    continue;
                }
                if weighting.calc_edge_weight(&edge, false).is_finite()
                    || weighting.calc_edge_weight(&edge, true).is_finite()
                {
                    visited[v] = true;
                    queue.push_back(v as NodeId);
                }
            }
        }

        if component.len() < minimum_nodes {
            too_small += 1;
            continue;
        }

        let id = members.len() as u32 + 1;
        for &v in &component {
            subnetworks[v as usize] = id;
        }
        members.push(component);
    }

    if too_small > 0 {
        log::warn!(
            "{}: {} subnetworks below {} nodes get no landmarks",
            weighting.name(),
            too_small,
            minimum_nodes
        );
    }

    (subnetworks, members)
}

/// Farthest-point selection: start from the node farthest away from the
/// subnetwork's first node, then repeatedly add the node farthest from
/// all landmarks picked so far.
fn select_landmarks(
    graph: &Graph,
    weighting: &dyn Weighting,
    nodes: &[NodeId],
    count: usize,
) -> Vec<NodeId> {
    let mut picked = Vec::with_capacity(count);
    let Some(&first) = nodes.first() else {
        return picked;
    };

    let mut closest = shortest_path_tree(graph, weighting, first, TreeDirection::Undirected);
    while picked.len() < count.min(nodes.len()) {
        let Some(next) = farthest(nodes, &closest, &picked) else {
            break;
        };
        picked.push(next);

        let tree = shortest_path_tree(graph, weighting, next, TreeDirection::Undirected);
        if picked.len() == 1 {
            closest = tree;
        } else {
            for (c, t) in closest.iter_mut().zip(tree) {
                *c = c.min(t);
            }
        }
    }

    picked
}

/// The not yet picked node with the greatest finite weight; the lowest id wins ties.
fn farthest(nodes: &[NodeId], weights: &[f64], picked: &[NodeId]) -> Option<NodeId> {
    let mut best: Option<(NodeId, f64)> = None;
    for &v in nodes {
        let w = weights[v as usize];
        if !w.is_finite() || picked.contains(&v) {
            continue;
        }
        if best.map_or(true, |(_, b)| w > b) {
            best = Some((v, w));
        }
    }
    best.map(|(v, _)| v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{edge_list_graph, TestEdge};
    use crate::weighting::ShortestWeighting;

    #[test]
    fn one_way_edges_join_subnetworks() {
        let g = edge_list_graph(
            5,
            &[
                TestEdge::new(0, 1, 1.0, false),
                TestEdge::new(2, 1, 1.0, false),
                TestEdge::new(3, 4, 1.0, true),
            ],
        );
        let w = ShortestWeighting::new(g.encoding(), "car").unwrap();
        let (subnetworks, members) = find_subnetworks(&g, &w, 3);
        assert_eq!(subnetworks, vec![1, 1, 1, 0, 0]);
        assert_eq!(members.len(), 1);

        let (subnetworks, members) = find_subnetworks(&g, &w, 1);
        assert_eq!(subnetworks, vec![1, 1, 1, 2, 2]);
        assert_eq!(members[1], vec![3, 4]);
    }

    #[test]
    fn farthest_point_selection() {
        //  0 - 1 - 2 - 3 - 4 - 5 - 6, plus a spur 3 - 7
        let mut edges: Vec<_> = (0..6).map(|i| TestEdge::new(i, i + 1, 10.0, true)).collect();
        edges.push(TestEdge::new(3, 7, 25.0, true));
        let g = edge_list_graph(8, &edges);
        let w = ShortestWeighting::new(g.encoding(), "car").unwrap();
        let nodes: Vec<NodeId> = (0..8).collect();

        assert_eq!(select_landmarks(&g, &w, &nodes, 1), vec![6]);
        assert_eq!(select_landmarks(&g, &w, &nodes, 2), vec![6, 0]);
        assert_eq!(select_landmarks(&g, &w, &nodes, 3), vec![6, 0, 7]);
        assert_eq!(select_landmarks(&g, &w, &nodes, 20).len(), 8);
        assert!(select_landmarks(&g, &w, &[], 3).is_empty());
    }
}
