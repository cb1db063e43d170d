// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Shared fixtures for unit tests.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::encoding::{BooleanEncodedValue, DecimalEncodedValue, EncodingManager, EnumEncodedValue};
use crate::{Graph, Node, NodeId};

macro_rules! assert_almost_eq {
    ($a:expr, $b:expr) => {
        assert!(
            (($a - $b).abs() < 1e-4),
            "assertion failed: {} ≈ {}",
            $a,
            $b
        )
    };
}

pub(crate) const ROAD_CLASSES: [&str; 6] = [
    "other",
    "motorway",
    "primary",
    "secondary",
    "residential",
    "track",
];

pub(crate) const SURFACES: [&str; 4] = ["missing", "asphalt", "gravel", "mud"];

pub(crate) fn car_encoding() -> Arc<EncodingManager> {
    Arc::new(
        EncodingManager::builder()
            .add(BooleanEncodedValue::new("car_access", true).unwrap())
            .unwrap()
            .add(DecimalEncodedValue::new("car_average_speed", 5, 5.0, true).unwrap())
            .unwrap()
            .add(EnumEncodedValue::new("road_class", &ROAD_CLASSES).unwrap())
            .unwrap()
            .add(EnumEncodedValue::new("surface", &SURFACES).unwrap())
            .unwrap()
            .add(BooleanEncodedValue::new("toll", false).unwrap())
            .unwrap()
            .add(DecimalEncodedValue::with_infinity("max_width", 7, 0.1, false).unwrap())
            .unwrap()
            .add(DecimalEncodedValue::with_infinity("max_height", 7, 0.1, false).unwrap())
            .unwrap()
            .add(DecimalEncodedValue::with_infinity("max_weight", 8, 0.1, false).unwrap())
            .unwrap()
            .build()
            .unwrap(),
    )
}

/// Description of one test edge.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TestEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub distance: f64,
    pub bidirectional: bool,
    pub speed: f64,
}

impl TestEdge {
    pub fn new(from: NodeId, to: NodeId, distance: f64, bidirectional: bool) -> Self {
        Self {
            from,
            to,
            distance,
            bidirectional,
            speed: 36.0,
        }
    }
}

/// Builds a graph over `n` nodes on a line of longitudes, with every edge
/// accessible forward, backward only if bidirectional, and unlimited width/height/weight.
pub(crate) fn edge_list_graph(n: usize, edges: &[TestEdge]) -> Graph {
    let em = car_encoding();
    let access = em.boolean("car_access").unwrap().clone();
    let speed = em.decimal("car_average_speed").unwrap().clone();
    let limits: Vec<_> = ["max_width", "max_height", "max_weight"]
        .iter()
        .map(|n| em.decimal(n).unwrap().clone())
        .collect();

    let mut b = Graph::builder(em.clone());
    for i in 0..n {
        b.add_node(Node::new(0.0, i as f64 * 0.001));
    }

    for e in edges {
        let mut flags = em.create_flags();
        access.set_bool(&mut flags, false, true).unwrap();
        access.set_bool(&mut flags, true, e.bidirectional).unwrap();
        speed.set_decimal(&mut flags, false, e.speed).unwrap();
        speed.set_decimal(&mut flags, true, e.speed).unwrap();
        for l in &limits {
            l.set_decimal(&mut flags, false, f64::INFINITY).unwrap();
        }
        b.add_edge(e.from, e.to, e.distance, &flags).unwrap();
    }

    b.build()
}

/// The five-node example network: the cheapest 0→3 route is 0-1-2-3 with weight 30.
pub(crate) fn five_node_graph() -> Graph {
    edge_list_graph(
        5,
        &[
            TestEdge::new(0, 1, 10.0, true),
            TestEdge::new(1, 2, 10.0, false),
            TestEdge::new(2, 3, 10.0, true),
            TestEdge::new(0, 4, 40.0, true),
            TestEdge::new(4, 3, 40.0, true),
        ],
    )
}

/// A connected-ish random network: a random spanning tree plus `extra` random edges,
/// some of them one-way, with varying speeds.
pub(crate) fn random_graph(seed: u64, n: usize, extra: usize) -> Graph {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut edges = Vec::with_capacity(n + extra);

    for i in 1..n {
        let j = rng.gen_range(0..i);
        edges.push(random_edge(&mut rng, i as NodeId, j as NodeId, 0.9));
    }
    for _ in 0..extra {
        let a = rng.gen_range(0..n) as NodeId;
        let b = rng.gen_range(0..n) as NodeId;
        if a != b {
            edges.push(random_edge(&mut rng, a, b, 0.7));
        }
    }

    edge_list_graph(n, &edges)
}

fn random_edge(rng: &mut StdRng, from: NodeId, to: NodeId, bidir_probability: f64) -> TestEdge {
    TestEdge {
        from,
        to,
        distance: rng.gen_range(1..500) as f64,
        bidirectional: rng.gen_bool(bidir_probability),
        speed: rng.gen_range(2..=30) as f64 * 5.0,
    }
}
