// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::time::Instant;

use super::{ArcKind, ChArc, ChConfig, ContractionHierarchy};
use crate::queue::MinHeap;
use crate::routing::PreparationError;
use crate::weighting::{Weighting, WeightingKey};
use crate::{Graph, NodeId};

impl ContractionHierarchy {
    /// Contracts every node of the graph under the given weighting.
    ///
    /// Node order is decided greedily by `edge difference + contracted neighbours`,
    /// re-evaluated lazily whenever a node reaches the top of the queue.
    pub fn prepare(
        graph: &Graph,
        weighting: &dyn Weighting,
        config: &ChConfig,
    ) -> Result<Self, PreparationError> {
        if weighting.has_turn_costs() {
            return Err(PreparationError::TurnCosts(weighting.name().to_string()));
        }
        if config.witness_settled_limit == 0 {
            return Err(PreparationError::InvalidConfig(
                "witness_settled_limit must be positive".to_string(),
            ));
        }

        let started = Instant::now();
        let n = graph.node_count();
        log::info!(
            "contracting {} nodes and {} edges for {}",
            n,
            graph.edge_count(),
            weighting.name()
        );

        let mut c = Contractor::new(graph, weighting, config.witness_settled_limit);
        let original_arcs = c.arcs.len();

        let mut order = MinHeap::with_capacity(n);
        for v in 0..n as NodeId {
            let p = c.priority(v);
            order.insert(v, p);
        }

        let mut ranks = vec![0; n];
        let mut next_rank: u32 = 0;
        while let Some((v, p)) = order.pop() {
            // Lazy update: the stored priority might be stale
            let fresh = c.priority(v);
            if fresh > p {
                if let Some(next) = order.peek_priority() {
                    if fresh > next {
                        order.insert(v, fresh);
                        continue;
                    }
                }
            }

            let neighbours = c.contract(v);
            ranks[v as usize] = next_rank;
            next_rank += 1;

            for u in neighbours {
                let p = c.priority(u);
                order.update(u, p);
            }

            if config.log_every > 0 && next_rank as usize % config.log_every == 0 {
                log::debug!(
                    "contracted {}/{} nodes, {} shortcuts",
                    next_rank,
                    n,
                    c.arcs.len() - original_arcs
                );
            }
        }

        let shortcuts = c.arcs.len() - original_arcs;
        if c.limit_hits > 0 {
            log::warn!(
                "{}: {} witness searches hit the limit of {} settled nodes",
                weighting.name(),
                c.limit_hits,
                config.witness_settled_limit
            );
        }
        log::info!(
            "contracted {} nodes for {} in {:.2?}: {} arcs, {} shortcuts",
            n,
            weighting.name(),
            started.elapsed(),
            original_arcs,
            shortcuts
        );

        Ok(ContractionHierarchy::from_parts(
            WeightingKey::of(weighting),
            ranks,
            c.arcs,
        ))
    }
}

/// Mutable state of the contraction: all arcs created so far and the
/// remaining (not yet contracted) graph.
struct Contractor {
    arcs: Vec<ChArc>,
    outgoing: Vec<Vec<u32>>,
    incoming: Vec<Vec<u32>>,
    contracted: Vec<bool>,
    contracted_neighbours: Vec<u32>,
    witness: WitnessSearch,
    settled_limit: usize,
    limit_hits: usize,
}

/// A shortcut the contraction of a node would require.
struct Shortcut {
    first: u32,
    second: u32,
    weight: f64,
}

impl Contractor {
    fn new(graph: &Graph, weighting: &dyn Weighting, settled_limit: usize) -> Self {
        let n = graph.node_count();
        let mut c = Self {
            arcs: Vec::with_capacity(graph.edge_count() * 2),
            outgoing: vec![Vec::new(); n],
            incoming: vec![Vec::new(); n],
            contracted: vec![false; n],
            contracted_neighbours: vec![0; n],
            witness: WitnessSearch::new(n),
            settled_limit,
            limit_hits: 0,
        };

        for e in 0..graph.edge_count() as u32 {
            let state = graph.edge(e);
            if state.base() == state.adj() {
                continue;
            }

            let forward = weighting.calc_edge_weight(&state, false);
            if forward.is_finite() {
                c.push_arc(state.base(), state.adj(), forward, ArcKind::Original { edge: e });
            }
            let backward = weighting.calc_edge_weight(&state, true);
            if backward.is_finite() {
                c.push_arc(state.adj(), state.base(), backward, ArcKind::Original { edge: e });
            }
        }

        c
    }

    fn push_arc(&mut self, from: NodeId, to: NodeId, weight: f64, kind: ArcKind) {
        let i = self.arcs.len() as u32;
        self.arcs.push(ChArc {
            from,
            to,
            weight,
            kind,
        });
        self.outgoing[from as usize].push(i);
        self.incoming[to as usize].push(i);
    }

    /// Cheapest arc to every remaining neighbour, as `(neighbour, arc)`.
    fn cheapest(&self, lists: &[Vec<u32>], v: NodeId, incoming: bool) -> Vec<(NodeId, u32)> {
        let mut best: Vec<(NodeId, u32)> = Vec::new();
        for &a in &lists[v as usize] {
            let arc = &self.arcs[a as usize];
            let other = if incoming { arc.from } else { arc.to };
            if other == v || self.contracted[other as usize] {
                continue;
            }

            match best.iter_mut().find(|(n, _)| *n == other) {
                Some(entry) => {
                    if arc.weight < self.arcs[entry.1 as usize].weight {
                        entry.1 = a;
                    }
                }
                None => best.push((other, a)),
            }
        }
        best
    }

    /// Shortcuts needed to contract `v`, without modifying the graph.
    fn shortcuts(&mut self, v: NodeId) -> (Vec<Shortcut>, usize) {
        let ins = self.cheapest(&self.incoming, v, true);
        let outs = self.cheapest(&self.outgoing, v, false);
        let removed = ins.len() + outs.len();

        let mut needed = Vec::new();
        let Some(max_out) = outs
            .iter()
            .map(|&(_, a)| self.arcs[a as usize].weight)
            .reduce(f64::max)
        else {
            return (needed, removed);
        };

        for &(u, in_arc) in &ins {
            let in_weight = self.arcs[in_arc as usize].weight;
            let hit = self.witness.run(
                &self.arcs,
                &self.outgoing,
                &self.contracted,
                u,
                v,
                in_weight + max_out,
                self.settled_limit,
            );
            if hit {
                self.limit_hits += 1;
            }

            for &(w, out_arc) in &outs {
                if w == u {
                    continue;
                }
                let weight = in_weight + self.arcs[out_arc as usize].weight;
                if self.witness.weight(w) > weight {
                    needed.push(Shortcut {
                        first: in_arc,
                        second: out_arc,
                        weight,
                    });
                }
            }
        }

        (needed, removed)
    }

    fn priority(&mut self, v: NodeId) -> f64 {
        let (shortcuts, removed) = self.shortcuts(v);
        shortcuts.len() as f64 - removed as f64 + self.contracted_neighbours[v as usize] as f64
    }

    /// Removes `v` from the remaining graph, returning its remaining neighbours.
    fn contract(&mut self, v: NodeId) -> Vec<NodeId> {
        let (shortcuts, _) = self.shortcuts(v);
        for s in shortcuts {
            let from = self.arcs[s.first as usize].from;
            let to = self.arcs[s.second as usize].to;
            self.push_arc(
                from,
                to,
                s.weight,
                ArcKind::Shortcut {
                    first: s.first,
                    second: s.second,
                    via: v,
                },
            );
        }

        self.contracted[v as usize] = true;

        let mut neighbours: Vec<NodeId> = self
            .incoming[v as usize]
            .iter()
            .map(|&a| self.arcs[a as usize].from)
            .chain(self.outgoing[v as usize].iter().map(|&a| self.arcs[a as usize].to))
            .filter(|&u| u != v && !self.contracted[u as usize])
            .collect();
        neighbours.sort_unstable();
        neighbours.dedup();

        for &u in &neighbours {
            self.contracted_neighbours[u as usize] += 1;
            let arcs = &self.arcs;
            self.outgoing[u as usize].retain(|&a| arcs[a as usize].to != v);
            self.incoming[u as usize].retain(|&a| arcs[a as usize].from != v);
        }

        neighbours
    }
}

/// Bounded one-to-many Dijkstra over the remaining graph, avoiding one node.
struct WitnessSearch {
    heap: MinHeap,
    weights: Vec<f64>,
    touched: Vec<NodeId>,
}

impl WitnessSearch {
    fn new(n: usize) -> Self {
        Self {
            heap: MinHeap::with_capacity(n),
            weights: vec![f64::INFINITY; n],
            touched: Vec::new(),
        }
    }

    fn weight(&self, node: NodeId) -> f64 {
        self.weights[node as usize]
    }

    fn set(&mut self, node: NodeId, weight: f64) {
        if self.weights[node as usize] == f64::INFINITY {
            self.touched.push(node);
        }
        self.weights[node as usize] = weight;
        self.heap.push_or_decrease(node, weight);
    }

    /// Searches from `source` without passing through `avoid`, up to `max_weight`.
    /// Returns true if the search was cut short by the settled-node limit.
    #[allow(clippy::too_many_arguments)]
    fn run(
        &mut self,
        arcs: &[ChArc],
        outgoing: &[Vec<u32>],
        contracted: &[bool],
        source: NodeId,
        avoid: NodeId,
        max_weight: f64,
        settled_limit: usize,
    ) -> bool {
        for &v in &self.touched {
            self.weights[v as usize] = f64::INFINITY;
        }
        self.touched.clear();
        self.heap.clear();

        self.set(source, 0.0);
        let mut settled = 0;

        while let Some((node, g)) = self.heap.pop() {
            if g > max_weight {
                break;
            }
            settled += 1;
            if settled > settled_limit {
                return true;
            }

            for &a in &outgoing[node as usize] {
                let arc = &arcs[a as usize];
                if arc.to == avoid || contracted[arc.to as usize] {
                    continue;
                }
                let candidate = g + arc.weight;
                if candidate < self.weight(arc.to) {
                    self.set(arc.to, candidate);
                }
            }
        }

        false
    }
}
