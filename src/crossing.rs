//! Geometric crossing predicate. Two proposed placements cross at a node if
//! the straight segments between their physical positions on the node fronts
//! intersect, or come closer than a small epsilon.

use crate::error::OptimError;
use crate::graph::TransitGraph;
use crate::optgraph::{OptEdgeIdx, OptGraph, OptNodeIdx};
use geo::{Coord, EuclideanDistance, Intersects, Line};

/// Position combination for a same-segment pair: positions of line A and
/// line B in segment A and segment B.
#[derive(Debug, Clone, Copy)]
pub struct PosComPair {
    pub a_in_a: usize,
    pub a_in_b: usize,
    pub b_in_a: usize,
    pub b_in_b: usize,
}

/// Position combination of two lines within a single segment.
#[derive(Debug, Clone, Copy)]
pub struct PosCom {
    pub a: usize,
    pub b: usize,
}

pub struct CrossingOracle {
    /// Minimal-distance epsilon, in node front units.
    pub eps: f64,
}

impl Default for CrossingOracle {
    fn default() -> Self {
        CrossingOracle { eps: 1.0 }
    }
}

impl CrossingOracle {
    /// Whether the placement described by `pc` of a line pair continuing from
    /// `seg_a` into `seg_b` produces a crossing at `node`.
    pub fn crosses_same(
        &self,
        g: &TransitGraph,
        og: &OptGraph,
        node: OptNodeIdx,
        seg_a: OptEdgeIdx,
        seg_b: OptEdgeIdx,
        pc: PosComPair,
    ) -> Result<bool, OptimError> {
        let other_way_a = Self::other_way(og, node, seg_a);
        let other_way_b = Self::other_way(og, node, seg_b);

        let card_a = ref_cardinality(g, og, seg_a);
        let card_b = ref_cardinality(g, og, seg_b);

        let pos_a_in_a = mirror(pc.a_in_a, card_a, other_way_a);
        let pos_a_in_b = mirror(pc.a_in_b, card_b, other_way_b);
        let pos_b_in_a = mirror(pc.b_in_a, card_a, other_way_a);
        let pos_b_in_b = mirror(pc.b_in_b, card_b, other_way_b);

        let a_in_a = self.pos(g, og, node, seg_a, pos_a_in_a)?;
        let b_in_a = self.pos(g, og, node, seg_a, pos_b_in_a)?;
        let a_in_b = self.pos(g, og, node, seg_b, pos_a_in_b)?;
        let b_in_b = self.pos(g, og, node, seg_b, pos_b_in_b)?;

        Ok(self.segments_cross(a_in_a, a_in_b, b_in_a, b_in_b))
    }

    /// Whether placing the pair at `pc` in `seg_a`, with line A continuing
    /// into `seg_b` and line B into `seg_c`, crosses for any combination of
    /// destination positions.
    pub fn crosses_diff(
        &self,
        g: &TransitGraph,
        og: &OptGraph,
        node: OptNodeIdx,
        seg_a: OptEdgeIdx,
        seg_b: OptEdgeIdx,
        seg_c: OptEdgeIdx,
        pc: PosCom,
    ) -> Result<bool, OptimError> {
        let other_way_a = Self::other_way(og, node, seg_a);
        let other_way_b = Self::other_way(og, node, seg_b);
        let other_way_c = Self::other_way(og, node, seg_c);

        let card_a = ref_cardinality(g, og, seg_a);
        let card_b = ref_cardinality(g, og, seg_b);
        let card_c = ref_cardinality(g, og, seg_c);

        let a_in_a = self.pos(g, og, node, seg_a, mirror(pc.a, card_a, other_way_a))?;
        let b_in_a = self.pos(g, og, node, seg_a, mirror(pc.b, card_a, other_way_a))?;

        for i in 0..card_b {
            for j in 0..card_c {
                let a_in_b = self.pos(g, og, node, seg_b, mirror(i, card_b, other_way_b))?;
                let b_in_c = self.pos(g, og, node, seg_c, mirror(j, card_c, other_way_c))?;
                if self.segments_cross(a_in_a, a_in_b, b_in_a, b_in_c) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Positions are measured from the reference side of the segment; when
    /// the segment leaves the node the other way round, mirror them.
    fn other_way(og: &OptGraph, node: OptNodeIdx, seg: OptEdgeIdx) -> bool {
        let e = og.edge(seg);
        let reference_dir = e.etgs.first().map(|p| p.dir).unwrap_or(true);
        (e.from != node) ^ reference_dir
    }

    fn segments_cross(&self, a1: Coord<f64>, a2: Coord<f64>, b1: Coord<f64>, b2: Coord<f64>) -> bool {
        let a = Line::new(a1, a2);
        let b = Line::new(b1, b2);
        a.intersects(&b) || a.euclidean_distance(&b) < self.eps
    }

    /// Physical point of position `p` of `seg` at `node`, looked up through
    /// the node front of whichever underlying edge of the segment the node
    /// knows about.
    fn pos(
        &self,
        g: &TransitGraph,
        og: &OptGraph,
        node: OptNodeIdx,
        seg: OptEdgeIdx,
        p: usize,
    ) -> Result<Coord<f64>, OptimError> {
        let n = g.node(og.node(node).node);
        let front = og
            .edge(seg)
            .etgs
            .iter()
            .find_map(|part| n.front_for(part.edge))
            .ok_or_else(|| {
                OptimError::ModelConstruction(format!(
                    "no node front for segment {} at {}",
                    og.str_repr(seg),
                    og.node_repr(node)
                ))
            })?;
        Ok(front.trip_pos(ref_cardinality(g, og, seg), p, false))
    }
}

fn ref_cardinality(g: &TransitGraph, og: &OptGraph, seg: OptEdgeIdx) -> usize {
    og.edge(seg)
        .etgs
        .first()
        .map(|part| g.true_cardinality(part.edge))
        .unwrap_or(0)
}

fn mirror(p: usize, card: usize, other_way: bool) -> usize {
    if other_way { card - 1 - p } else { p }
}
