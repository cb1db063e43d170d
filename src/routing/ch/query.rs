// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use super::ContractionHierarchy;
use crate::routing::{check_endpoints, Budget, Frontier, Path, PathError, QueryOptions, QueryScratch};
use crate::weighting::Weighting;
use crate::{EdgeId, Graph, NodeId};

impl ContractionHierarchy {
    /// Finds the cheapest route with a bidirectional upward search.
    ///
    /// The weighting must be the one the hierarchy was prepared with; it is only used
    /// to fill in travel times. Excluding nodes per query is not possible on a
    /// contracted graph, so non-empty `skip_nodes` fail with [PathError::Unsupported].
    pub fn find_route(
        &self,
        graph: &Graph,
        weighting: &dyn Weighting,
        from: NodeId,
        to: NodeId,
        options: &QueryOptions,
        scratch: &mut QueryScratch,
    ) -> Result<Path, PathError> {
        if !self.weighting.matches(weighting) || graph.node_count() != self.node_count() {
            return Err(PathError::MissingPreparation {
                kind: "ch",
                weighting: weighting.name().to_string(),
            });
        }
        if !options.skip_nodes.is_empty() {
            return Err(PathError::Unsupported("skip_nodes"));
        }
        check_endpoints(graph, from, to)?;
        scratch.prepare(graph.node_count(), options);

        if from == to {
            return Ok(Path::from_edges(graph, weighting, from, Vec::new(), 0.0));
        }

        let mut budget = Budget::new(options);
        budget.check_cancelled()?;

        let mut best = f64::INFINITY;
        let mut meeting = from;
        let mut cut = false;

        let QueryScratch { fwd, bwd, .. } = scratch;
        fwd.start(from, 0.0);
        bwd.start(to, 0.0);

        loop {
            let top_f = fwd.heap.peek_priority().filter(|&k| k < best);
            let top_b = bwd.heap.peek_priority().filter(|&k| k < best);
            let reverse = match (top_f, top_b) {
                (None, None) => break,
                (Some(_), None) => false,
                (None, Some(_)) => true,
                (Some(f), Some(b)) => b < f,
            };

            let (this, other) = if reverse { (&mut *bwd, &*fwd) } else { (&mut *fwd, &*bwd) };
            let Some((node, g)) = this.heap.pop() else {
                break;
            };
            budget.visit()?;

            if g > options.weight_limit {
                cut = true;
                continue;
            }

            if reverse {
                for (arc, a) in self.down_arcs(node) {
                    relax(this, other, arc, a.from, g + a.weight, &mut best, &mut meeting);
                }
            } else {
                for (arc, a) in self.up_arcs(node) {
                    relax(this, other, arc, a.to, g + a.weight, &mut best, &mut meeting);
                }
            }
        }

        log::debug!(
            "ch search {} -> {}: {} nodes visited, weight {}",
            from,
            to,
            budget.visited,
            best
        );

        if best.is_finite() {
            if best > options.weight_limit {
                return Err(PathError::LimitExceeded);
            }
            let edges = self.collect_edges(fwd, bwd, meeting);
            return Ok(Path::from_edges(graph, weighting, from, edges, best));
        }

        if cut {
            Err(PathError::LimitExceeded)
        } else {
            Err(PathError::NotFound)
        }
    }

    /// Follows parent arcs from the meeting node to both endpoints and unpacks them.
    fn collect_edges(&self, fwd: &Frontier, bwd: &Frontier, meeting: NodeId) -> Vec<EdgeId> {
        let mut up = Vec::new();
        let mut at = meeting;
        while let Some(a) = fwd.parent(at) {
            up.push(a);
            at = self.arcs[a as usize].from;
        }
        up.reverse();

        let mut at = meeting;
        while let Some(a) = bwd.parent(at) {
            up.push(a);
            at = self.arcs[a as usize].to;
        }

        let mut edges = Vec::with_capacity(up.len());
        for a in up {
            self.unpack(a, &mut edges);
        }
        edges
    }
}

#[inline]
fn relax(
    this: &mut Frontier,
    other: &Frontier,
    arc: u32,
    next: NodeId,
    candidate: f64,
    best: &mut f64,
    meeting: &mut NodeId,
) {
    if candidate >= this.weight(next) {
        return;
    }
    this.relax(next, candidate, arc, candidate);

    let total = candidate + other.weight(next);
    if total < *best {
        *best = total;
        *meeting = next;
    }
}
