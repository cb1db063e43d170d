// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Goal-directed search with landmarks and the triangle inequality (ALT).
//!
//! A handful of landmark nodes is picked per subnetwork, and exact weights from and to
//! every landmark are precomputed. For any nodes `v` and `t` and landmark `L`,
//! `d(L, t) - d(L, v)` and `d(v, L) - d(t, L)` are both lower bounds of `d(v, t)`.

mod prepare;
mod query;

use serde::{Deserialize, Serialize};

use crate::weighting::WeightingKey;
use crate::NodeId;

/// Subnetwork id of nodes in components too small to get landmarks.
pub const NO_SUBNETWORK: u32 = 0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LandmarkConfig {
    /// Landmarks picked per subnetwork.
    pub landmarks: usize,

    /// Landmarks consulted by a single query.
    pub active_landmarks: usize,

    /// Components with fewer nodes don't get landmarks.
    pub minimum_nodes: usize,
}

impl Default for LandmarkConfig {
    fn default() -> Self {
        Self {
            landmarks: 16,
            active_landmarks: 6,
            minimum_nodes: 500,
        }
    }
}

/// A landmark with exact weights `d(node, v)` (`from`) and `d(v, node)` (`to`)
/// for every node `v` of the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Landmark {
    pub node: NodeId,
    pub subnetwork: u32,
    pub(crate) from: Vec<f64>,
    pub(crate) to: Vec<f64>,
}

impl Landmark {
    /// Best lower bound on `d(v, t)` this landmark gives. May be infinite if `t`
    /// is provably unreachable from `v`, or NaN if nothing can be said.
    #[inline]
    fn bound(&self, v: NodeId, t: NodeId) -> f64 {
        let (v, t) = (v as usize, t as usize);
        let a = self.from[t] - self.from[v];
        let b = self.to[v] - self.to[t];
        match (a.is_nan(), b.is_nan()) {
            (true, true) => f64::NAN,
            (true, false) => b,
            (false, true) => a,
            (false, false) => a.max(b),
        }
    }
}

/// Landmark preparation for a single weighting.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkStorage {
    weighting: WeightingKey,
    subnetworks: Vec<u32>,
    landmarks: Vec<Landmark>,
    active_landmarks: usize,
    by_subnetwork: Vec<Vec<u32>>,
}

impl LandmarkStorage {
    pub(crate) fn from_parts(
        weighting: WeightingKey,
        subnetworks: Vec<u32>,
        landmarks: Vec<Landmark>,
        active_landmarks: usize,
    ) -> Self {
        let count = subnetworks.iter().copied().max().unwrap_or(NO_SUBNETWORK) as usize + 1;
        let mut by_subnetwork = vec![Vec::new(); count];
        for (i, l) in landmarks.iter().enumerate() {
            debug_assert!(l.subnetwork != NO_SUBNETWORK);
            debug_assert_eq!(l.from.len(), subnetworks.len());
            by_subnetwork[l.subnetwork as usize].push(i as u32);
        }

        Self {
            weighting,
            subnetworks,
            landmarks,
            active_landmarks,
            by_subnetwork,
        }
    }

    /// Name of the weighting the distances were computed with.
    pub fn weighting_name(&self) -> &str {
        &self.weighting.name
    }

    /// The weighting the distances were computed with.
    pub fn weighting(&self) -> &WeightingKey {
        &self.weighting
    }

    pub fn node_count(&self) -> usize {
        self.subnetworks.len()
    }

    /// Subnetwork of a node, or [NO_SUBNETWORK].
    pub fn subnetwork(&self, node: NodeId) -> u32 {
        self.subnetworks[node as usize]
    }

    pub(crate) fn subnetworks(&self) -> &[u32] {
        &self.subnetworks
    }

    /// Number of subnetwork ids, including [NO_SUBNETWORK].
    pub fn subnetwork_count(&self) -> usize {
        self.by_subnetwork.len()
    }

    /// Landmarks consulted by [LandmarkStorage::find_route].
    pub fn active_landmarks(&self) -> usize {
        self.active_landmarks
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    /// Landmarks (as indices into [LandmarkStorage::landmarks]) of a subnetwork.
    pub fn landmarks_of(&self, subnetwork: u32) -> &[u32] {
        self.by_subnetwork
            .get(subnetwork as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Lower bound on the weight of the cheapest route from `node` to `target`,
    /// over all landmarks of their subnetwork.
    ///
    /// Returns [f64::INFINITY] if the nodes can't be connected and 0 if nothing
    /// is known about them.
    pub fn estimate(&self, node: NodeId, target: NodeId) -> f64 {
        let sub = self.subnetwork(target);
        if self.subnetwork(node) != sub {
            return f64::INFINITY;
        }
        self.bound_with(self.landmarks_of(sub), node, target)
    }

    /// Lower bound on `d(v, t)` using the given landmarks, never below 0.
    #[inline]
    pub(crate) fn bound_with(&self, landmarks: &[u32], v: NodeId, t: NodeId) -> f64 {
        let mut best = 0.0_f64;
        for &l in landmarks {
            let b = self.landmarks[l as usize].bound(v, t);
            if b > best {
                best = b;
            }
        }
        best
    }
}
