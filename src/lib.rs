// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Route planning over road networks.
//!
//! The network is a directed graph whose edges carry bit-packed attributes
//! ([encoded values](crate::encoding)). A [Weighting](crate::weighting::Weighting)
//! turns those attributes into costs, either with a fixed formula or by compiling a
//! declarative [CustomModel](crate::weighting::CustomModel). Routes are found with
//! bidirectional Dijkstra, a [contraction hierarchy](crate::routing::ch) or
//! [landmarks](crate::routing::landmark), and the [Router] ties all of it together.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use roadrank::encoding::{BooleanEncodedValue, DecimalEncodedValue, EncodingManager};
//! use roadrank::{Graph, Node, Router, RouterConfig, Request};
//!
//! let em = Arc::new(
//!     EncodingManager::builder()
//!         .add(BooleanEncodedValue::new("car_access", true).unwrap()).unwrap()
//!         .add(DecimalEncodedValue::new("car_average_speed", 5, 5.0, true).unwrap()).unwrap()
//!         .build()
//!         .unwrap(),
//! );
//!
//! let access = em.boolean("car_access").unwrap().clone();
//! let speed = em.decimal("car_average_speed").unwrap().clone();
//! let mut flags = em.create_flags();
//! for reverse in [false, true] {
//!     access.set_bool(&mut flags, reverse, true).unwrap();
//!     speed.set_decimal(&mut flags, reverse, 50.0).unwrap();
//! }
//!
//! let mut b = Graph::builder(em);
//! let a = b.add_node(Node::new(52.2297, 21.0122));
//! let c = b.add_node(Node::new(52.2319, 21.0067));
//! b.add_beeline_edge(a, c, &flags).expect("invalid edge");
//!
//! let config = RouterConfig::from_json(r#"{"profiles": [{"name": "car", "custom_model": {"base": "car"}}]}"#)
//!     .expect("invalid config");
//! let router = Router::new(Arc::new(b.build()), &config).expect("failed to prepare router");
//! let path = router.route(&Request::new("car", a, c)).expect("no route");
//! println!("{} m in {} ms", path.distance, path.time);
//! ```

#[cfg(test)]
#[macro_use]
mod testing;

mod distance;
pub mod encoding;
mod graph;
pub mod queue;
pub mod router;
pub mod routing;
pub mod storage;
pub mod weighting;

pub use distance::earth_distance;
pub use graph::{EdgeState, Graph, GraphBuilder, GraphError};
pub use router::{Algorithm, Request, Router, RouterConfig, RouterError};
pub use routing::{CancellationToken, Path, PathError, QueryOptions, DEFAULT_MAX_VISITED_NODES};

/// Dense node index in `[0, node_count)`.
pub type NodeId = u32;

/// Dense edge index in `[0, edge_count)`.
pub type EdgeId = u32;

/// Marker for "no node" / "no edge" in id arrays.
pub const NO_ID: u32 = u32::MAX;

/// Position of a graph node. Topology lives in the [Graph], not here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    pub lat: f64,
    pub lon: f64,
    pub ele: Option<f32>,
}

impl Node {
    pub const ZERO: Self = Self {
        lat: 0.0,
        lon: 0.0,
        ele: None,
    };

    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            ele: None,
        }
    }
}
