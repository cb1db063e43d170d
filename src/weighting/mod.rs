// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Edge costs.
//!
//! A [Weighting] maps a traversal of an edge (in a given direction) to a non-negative
//! cost, with [f64::INFINITY] standing for "inaccessible". Weightings are immutable
//! and shared between queries.

mod custom;
mod custom_model;
mod error;
pub mod expression;
mod turn_cost;

use std::fmt::Debug;

pub use custom::CustomWeighting;
pub use custom_model::{CustomModel, Factor, Layer};
pub use error::ModelError;
pub use expression::{GSAssignment, GSExpression};
pub use turn_cost::TurnCostTable;

use crate::encoding::{BooleanEncodedValue, DecimalEncodedValue, EncodingError, EncodingManager};
use crate::storage::CRC64;
use crate::{EdgeId, EdgeState, NodeId};

/// Cost function over edges and turns.
///
/// Implementations must be symmetric with respect to edge orientation:
/// `calc_edge_weight(e, false) == calc_edge_weight(e.reversed(), true)`.
pub trait Weighting: Send + Sync + Debug {
    /// Identifier under which preparations for this weighting are stored.
    fn name(&self) -> &str;

    /// Cost of traversing `edge` from base to adj, or from adj to base if `reverse`.
    fn calc_edge_weight(&self, edge: &EdgeState<'_>, reverse: bool) -> f64;

    /// Travel time in milliseconds, in the same direction as [Weighting::calc_edge_weight].
    fn calc_edge_millis(&self, edge: &EdgeState<'_>, reverse: bool) -> u64;

    fn calc_turn_weight(&self, _in_edge: EdgeId, _via: NodeId, _out_edge: EdgeId) -> f64 {
        0.0
    }

    fn has_turn_costs(&self) -> bool {
        false
    }

    /// Identifies the configuration behind the costs. Preparations built under
    /// one fingerprint are not valid for a weighting with another.
    fn fingerprint(&self) -> u64 {
        CRC64.checksum(self.name().as_bytes())
    }
}

/// Name and [fingerprint](Weighting::fingerprint) of the weighting a preparation was built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightingKey {
    pub name: String,
    pub fingerprint: u64,
}

impl WeightingKey {
    pub fn of(w: &dyn Weighting) -> Self {
        Self {
            name: w.name().to_string(),
            fingerprint: w.fingerprint(),
        }
    }

    pub fn matches(&self, w: &dyn Weighting) -> bool {
        self.name == w.name() && self.fingerprint == w.fingerprint()
    }
}

/// Edge weight including the cost of turning from `prev_edge`.
///
/// In a forward search `prev_edge` leads into `edge.base()`; in a backward search
/// (`reverse`) it leaves `edge.base()` towards the target.
#[inline]
pub fn calc_weight(
    w: &dyn Weighting,
    edge: &EdgeState<'_>,
    reverse: bool,
    prev_edge: Option<EdgeId>,
) -> f64 {
    let weight = w.calc_edge_weight(edge, reverse);
    match prev_edge {
        Some(prev) if w.has_turn_costs() && weight.is_finite() => {
            let turn = if reverse {
                w.calc_turn_weight(edge.edge(), edge.base(), prev)
            } else {
                w.calc_turn_weight(prev, edge.base(), edge.edge())
            };
            weight + turn
        }
        _ => weight,
    }
}

pub(crate) fn millis(distance: f64, speed_kmh: f64) -> u64 {
    if speed_kmh > 0.0 {
        (distance * 3600.0 / speed_kmh).round() as u64
    } else {
        u64::MAX
    }
}

/// Prefers the shortest accessible route, regardless of speed.
#[derive(Debug, Clone)]
pub struct ShortestWeighting {
    name: String,
    access: BooleanEncodedValue,
    speed: DecimalEncodedValue,
}

impl ShortestWeighting {
    /// Uses the `{vehicle}_access` and `{vehicle}_average_speed` encoded values.
    pub fn new(encoding: &EncodingManager, vehicle: &str) -> Result<Self, EncodingError> {
        Ok(Self {
            name: format!("{}_shortest", vehicle),
            access: encoding.boolean(&format!("{}_access", vehicle))?.clone(),
            speed: encoding.decimal(&format!("{}_average_speed", vehicle))?.clone(),
        })
    }
}

impl Weighting for ShortestWeighting {
    fn name(&self) -> &str {
        &self.name
    }

    fn calc_edge_weight(&self, edge: &EdgeState<'_>, reverse: bool) -> f64 {
        if edge.get_bool(&self.access, reverse) {
            edge.distance()
        } else {
            f64::INFINITY
        }
    }

    fn calc_edge_millis(&self, edge: &EdgeState<'_>, reverse: bool) -> u64 {
        millis(edge.distance(), edge.get_decimal(&self.speed, reverse))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{edge_list_graph, TestEdge};
    use crate::Graph;

    #[derive(Debug)]
    struct WithTurns(ShortestWeighting, std::sync::Arc<TurnCostTable>);

    impl Weighting for WithTurns {
        fn name(&self) -> &str {
            "turns"
        }

        fn calc_edge_weight(&self, edge: &EdgeState<'_>, reverse: bool) -> f64 {
            self.0.calc_edge_weight(edge, reverse)
        }

        fn calc_edge_millis(&self, edge: &EdgeState<'_>, reverse: bool) -> u64 {
            self.0.calc_edge_millis(edge, reverse)
        }

        fn calc_turn_weight(&self, in_edge: EdgeId, via: NodeId, out_edge: EdgeId) -> f64 {
            self.1.get(in_edge, via, out_edge)
        }

        fn has_turn_costs(&self) -> bool {
            true
        }
    }

    fn graph() -> Graph {
        edge_list_graph(
            3,
            &[TestEdge::new(0, 1, 100.0, false), TestEdge::new(1, 2, 50.0, true)],
        )
    }

    #[test]
    fn shortest_respects_access() {
        let g = graph();
        let w = ShortestWeighting::new(g.encoding(), "car").unwrap();
        assert_eq!(w.name(), "car_shortest");

        let e0 = g.edge(0);
        assert_eq!(w.calc_edge_weight(&e0, false), 100.0);
        assert_eq!(w.calc_edge_weight(&e0, true), f64::INFINITY);
        assert_eq!(w.calc_edge_weight(&e0.reversed(), false), f64::INFINITY);
        assert_eq!(w.calc_edge_weight(&e0.reversed(), true), 100.0);

        // 100 m at 36 km/h
        assert_eq!(w.calc_edge_millis(&e0, false), 10_000);
        assert!(ShortestWeighting::new(g.encoding(), "bike").is_err());
    }

    #[test]
    fn turn_costs_in_both_directions() {
        let g = graph();
        let mut table = TurnCostTable::default();
        table.set(0, 1, 1, 7.0);
        let w = WithTurns(
            ShortestWeighting::new(g.encoding(), "car").unwrap(),
            std::sync::Arc::new(table),
        );

        // Forward: arrived at 1 over edge 0, leaving over edge 1
        let out = g.edge_state(1, 2);
        assert_eq!(calc_weight(&w, &out, false, Some(0)), 57.0);
        assert_eq!(calc_weight(&w, &out, false, None), 50.0);

        // Backward: settled 1 coming from the target over edge 1, looking at edge 0 into 1
        let incoming = g.edge_state(0, 0);
        assert_eq!(incoming.base(), 1);
        assert_eq!(calc_weight(&w, &incoming, true, Some(1)), 107.0);

        // No turn cost is added to an inaccessible edge
        assert_eq!(calc_weight(&w, &incoming, false, Some(1)), f64::INFINITY);
    }
}
