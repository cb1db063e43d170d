// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use super::{BlobKind, BlobReader, BlobWriter, Persist, StorageError};
use crate::encoding::EncodingManager;
use crate::graph::EdgeRecord;
use crate::routing::ch::{ArcKind, ChArc, ContractionHierarchy};
use crate::routing::landmark::{Landmark, LandmarkStorage, NO_SUBNETWORK};
use crate::weighting::{TurnCostTable, WeightingKey};
use crate::{Graph, Node};

const ARC_ORIGINAL: u8 = 0;
const ARC_SHORTCUT: u8 = 1;

fn write_weighting(w: &mut BlobWriter, key: &WeightingKey) {
    w.str(&key.name);
    w.u64(key.fingerprint);
}

fn read_weighting(r: &mut BlobReader<'_>) -> Result<WeightingKey, StorageError> {
    Ok(WeightingKey {
        name: r.str()?,
        fingerprint: r.u64()?,
    })
}

impl Persist for Graph {
    const KIND: BlobKind = BlobKind::Graph;
    type Context = Arc<EncodingManager>;

    fn layout_hash(context: &Self::Context) -> u64 {
        context.layout_hash()
    }

    fn write_payload(&self, w: &mut BlobWriter) {
        w.seq_len(self.node_count());
        for n in self.nodes() {
            w.f64(n.lat);
            w.f64(n.lon);
            match n.ele {
                Some(ele) => {
                    w.u8(1);
                    w.f32(ele);
                }
                None => w.u8(0),
            }
        }

        w.seq_len(self.edge_count());
        for e in self.edge_records() {
            w.u32(e.base);
            w.u32(e.adj);
            w.f64(e.distance);
        }

        w.seq_len(self.raw_flags().len());
        for &f in self.raw_flags() {
            w.u32(f);
        }

        let mut turns: Vec<_> = self.turn_costs().iter().collect();
        turns.sort_unstable_by_key(|&(i, v, o, _)| (i, v, o));
        w.seq_len(turns.len());
        for (i, v, o, cost) in turns {
            w.u32(i);
            w.u32(v);
            w.u32(o);
            w.f64(cost);
        }
    }

    fn read_payload(r: &mut BlobReader<'_>, encoding: &Self::Context) -> Result<Self, StorageError> {
        let node_count = r.seq_len(17)?;
        let mut nodes = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            let lat = r.f64()?;
            let lon = r.f64()?;
            let ele = match r.u8()? {
                0 => None,
                1 => Some(r.f32()?),
                _ => return Err(StorageError::Malformed("invalid elevation tag")),
            };
            nodes.push(Node { lat, lon, ele });
        }

        let edge_count = r.seq_len(16)?;
        let mut edges = Vec::with_capacity(edge_count);
        for _ in 0..edge_count {
            let base = r.u32()?;
            let adj = r.u32()?;
            let distance = r.f64()?;
            if base as usize >= node_count || adj as usize >= node_count {
                return Err(StorageError::Malformed("edge references an unknown node"));
            }
            edges.push(EdgeRecord {
                base,
                adj,
                distance,
            });
        }

        let flag_count = r.seq_len(4)?;
        if flag_count != edge_count * encoding.ints_per_edge() as usize {
            return Err(StorageError::Malformed("flag count doesn't match the encoding"));
        }
        let mut flags = Vec::with_capacity(flag_count);
        for _ in 0..flag_count {
            flags.push(r.u32()?);
        }

        let turn_count = r.seq_len(20)?;
        let mut turn_costs = TurnCostTable::default();
        for _ in 0..turn_count {
            let (i, v, o) = (r.u32()?, r.u32()?, r.u32()?);
            let cost = r.f64()?;
            if cost.is_nan() || cost < 0.0 {
                return Err(StorageError::Malformed("negative turn cost"));
            }
            turn_costs.set(i, v, o, cost);
        }

        Ok(Graph::from_parts(encoding.clone(), nodes, edges, flags, turn_costs))
    }
}

impl Persist for ContractionHierarchy {
    const KIND: BlobKind = BlobKind::ContractionHierarchy;
    type Context = Graph;

    fn layout_hash(graph: &Self::Context) -> u64 {
        graph.encoding().layout_hash()
    }

    fn write_payload(&self, w: &mut BlobWriter) {
        write_weighting(w, self.weighting());
        w.seq_len(self.node_count());
        for &rank in self.ranks() {
            w.u32(rank);
        }

        w.seq_len(self.arcs().len());
        for arc in self.arcs() {
            w.u32(arc.from);
            w.u32(arc.to);
            w.f64(arc.weight);
            match arc.kind {
                ArcKind::Original { edge } => {
                    w.u8(ARC_ORIGINAL);
                    w.u32(edge);
                }
                ArcKind::Shortcut { first, second, via } => {
                    w.u8(ARC_SHORTCUT);
                    w.u32(first);
                    w.u32(second);
                    w.u32(via);
                }
            }
        }
    }

    fn read_payload(r: &mut BlobReader<'_>, graph: &Self::Context) -> Result<Self, StorageError> {
        let weighting = read_weighting(r)?;
        let n = r.seq_len(4)?;
        if n != graph.node_count() {
            return Err(StorageError::Malformed("node count doesn't match the graph"));
        }
        let mut ranks = Vec::with_capacity(n);
        for _ in 0..n {
            ranks.push(r.u32()?);
        }

        let arc_count = r.seq_len(21)?;
        let mut arcs = Vec::with_capacity(arc_count);
        for i in 0..arc_count as u32 {
            let from = r.u32()?;
            let to = r.u32()?;
            let weight = r.f64()?;
            let kind = match r.u8()? {
                ARC_ORIGINAL => {
                    let edge = r.u32()?;
                    if edge as usize >= graph.edge_count() {
                        return Err(StorageError::Malformed("arc references an unknown edge"));
                    }
                    ArcKind::Original { edge }
                }
                ARC_SHORTCUT => {
                    let (first, second, via) = (r.u32()?, r.u32()?, r.u32()?);
                    if first >= i || second >= i || via as usize >= n {
                        return Err(StorageError::Malformed("invalid shortcut"));
                    }
                    ArcKind::Shortcut { first, second, via }
                }
                _ => return Err(StorageError::Malformed("invalid arc tag")),
            };
            if from as usize >= n || to as usize >= n {
                return Err(StorageError::Malformed("arc references an unknown node"));
            }
            arcs.push(ChArc {
                from,
                to,
                weight,
                kind,
            });
        }

        Ok(ContractionHierarchy::from_parts(weighting, ranks, arcs))
    }
}

impl Persist for LandmarkStorage {
    const KIND: BlobKind = BlobKind::Landmarks;
    type Context = Graph;

    fn layout_hash(graph: &Self::Context) -> u64 {
        graph.encoding().layout_hash()
    }

    fn write_payload(&self, w: &mut BlobWriter) {
        write_weighting(w, self.weighting());
        w.u32(self.active_landmarks() as u32);

        w.seq_len(self.node_count());
        for &s in self.subnetworks() {
            w.u32(s);
        }

        w.seq_len(self.landmarks().len());
        for l in self.landmarks() {
            w.u32(l.node);
            w.u32(l.subnetwork);
            for &d in l.from.iter().chain(&l.to) {
                w.f64(d);
            }
        }
    }

    fn read_payload(r: &mut BlobReader<'_>, graph: &Self::Context) -> Result<Self, StorageError> {
        let weighting = read_weighting(r)?;
        let active = r.u32()? as usize;

        let n = r.seq_len(4)?;
        if n != graph.node_count() {
            return Err(StorageError::Malformed("node count doesn't match the graph"));
        }
        let mut subnetworks = Vec::with_capacity(n);
        for _ in 0..n {
            subnetworks.push(r.u32()?);
        }

        let max_subnetwork = subnetworks.iter().copied().max().unwrap_or(NO_SUBNETWORK);
        let count = r.seq_len(8 + 16 * n)?;
        let mut landmarks = Vec::with_capacity(count);
        for _ in 0..count {
            let node = r.u32()?;
            let subnetwork = r.u32()?;
            if node as usize >= n || subnetwork == NO_SUBNETWORK || subnetwork > max_subnetwork {
                return Err(StorageError::Malformed("invalid landmark"));
            }
            let from = (0..n).map(|_| r.f64()).collect::<Result<Vec<_>, _>>()?;
            let to = (0..n).map(|_| r.f64()).collect::<Result<Vec<_>, _>>()?;
            landmarks.push(Landmark {
                node,
                subnetwork,
                from,
                to,
            });
        }

        Ok(LandmarkStorage::from_parts(weighting, subnetworks, landmarks, active))
    }
}
