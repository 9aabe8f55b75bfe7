//! ILP construction for the line ordering problem. For every segment with k
//! non-relative lines, a k x k 0/1 assignment matrix places each line at
//! exactly one position; crossing decision variables are linearized against
//! the position combinations the geometric predicate flags as crossing.

pub mod model;

use crate::crossing::{CrossingOracle, PosCom, PosComPair};
use crate::error::OptimError;
use crate::graph::{RouteIdx, TransitGraph};
use crate::optgraph::{OptEdgeIdx, OptGraph, OptNodeIdx};
use crate::scorer::Scorer;
use ahash::AHashSet;
use log::debug;
use model::{ColKind, MipModel, RowSense};

pub const MODEL_NAME: &str = "edgeorder";

/// Name of the assignment variable of `route` at position `p` on `seg`.
pub fn var_name(g: &TransitGraph, og: &OptGraph, seg: OptEdgeIdx, route: RouteIdx, p: usize) -> String {
    format!(
        "x_({},l={},p={})",
        og.str_repr(seg),
        g.route(route).id,
        p
    )
}

pub struct IlpBuilder<'a> {
    g: &'a TransitGraph,
    og: &'a OptGraph,
    scorer: &'a dyn Scorer,
    oracle: CrossingOracle,
}

impl<'a> IlpBuilder<'a> {
    pub fn new(g: &'a TransitGraph, og: &'a OptGraph, scorer: &'a dyn Scorer) -> Self {
        IlpBuilder {
            g,
            og,
            scorer,
            oracle: CrossingOracle::default(),
        }
    }

    pub fn with_oracle(mut self, oracle: CrossingOracle) -> Self {
        self.oracle = oracle;
        self
    }

    /// Build the full model: assignment variables with their uniqueness rows,
    /// then the crossing machinery.
    pub fn build(&self) -> Result<MipModel, OptimError> {
        let mut m = MipModel::new(MODEL_NAME);

        // For every segment s we define |L(s)|^2 assignment variables.
        for (_, n) in self.og.nodes() {
            for &seg in &n.adj_out {
                self.write_assignment_vars(&mut m, seg)?;
            }
        }

        self.write_same_seg_constraints(&mut m)?;
        self.write_diff_seg_constraints(&mut m)?;

        debug!(
            "ILP built: {} cols, {} rows, {} matrix entries",
            m.num_cols(),
            m.num_rows(),
            m.matrix.len()
        );
        Ok(m)
    }

    fn write_assignment_vars(&self, m: &mut MipModel, seg: OptEdgeIdx) -> Result<(), OptimError> {
        let reference = match self.og.edge(seg).etgs.first() {
            Some(p) => p.edge,
            None => {
                return Err(OptimError::ModelConstruction(format!(
                    "segment {} has no underlying edges",
                    self.og.str_repr(seg)
                )))
            }
        };
        let k = self.g.true_cardinality(reference);

        // Every part of the segment must carry the same non-relative lines.
        for part in &self.og.edge(seg).etgs {
            if self.g.true_cardinality(part.edge) != k {
                return Err(OptimError::ModelConstruction(format!(
                    "segment {}: position count {} does not match line count {} of e{}",
                    self.og.str_repr(seg),
                    k,
                    self.g.true_cardinality(part.edge),
                    part.edge.0
                )));
            }
        }

        // An edge with only relative lines contributes nothing.
        if k == 0 {
            return Ok(());
        }

        let srepr = self.og.str_repr(seg);

        // One equality per position: every position holds exactly one line.
        let mut pos_rows = Vec::with_capacity(k);
        for p in 0..k {
            pos_rows.push(m.add_row(format!("sum({},p={})", srepr, p), RowSense::Eq, 1.0));
        }

        // One equality per line: every line sits at exactly one position.
        for occ in &self.g.edge(reference).occs {
            if self.g.is_relative(occ.route) {
                continue;
            }
            let line_row = m.add_row(
                format!("sum({},l={})", srepr, self.g.route(occ.route).id),
                RowSense::Eq,
                1.0,
            );
            for p in 0..k {
                let col = m.add_col(var_name(self.g, self.og, seg, occ.route, p), ColKind::Binary);
                m.set_coef(line_row, col, 1.0);
                m.set_coef(pos_rows[p], col, 1.0);
            }
        }
        Ok(())
    }

    /// Non-relative line pairs of a segment's reference edge. With `unique`,
    /// each unordered pair appears once, canonically ordered by route
    /// identity; otherwise all ordered pairs are returned.
    fn line_pairs(&self, seg: OptEdgeIdx, unique: bool) -> Vec<(RouteIdx, RouteIdx)> {
        let reference = match self.og.edge(seg).etgs.first() {
            Some(p) => p.edge,
            None => return Vec::new(),
        };
        let occs = &self.g.edge(reference).occs;
        let mut ret = Vec::new();
        let mut processed: AHashSet<RouteIdx> = AHashSet::new();
        for oa in occs {
            if self.g.is_relative(oa.route) {
                continue;
            }
            processed.insert(oa.route);
            for ob in occs {
                if ob.route == oa.route || self.g.is_relative(ob.route) {
                    continue;
                }
                if unique && processed.contains(&ob.route) {
                    continue;
                }
                if !unique || oa.route < ob.route {
                    ret.push((oa.route, ob.route));
                } else {
                    ret.push((ob.route, oa.route));
                }
            }
        }
        ret
    }

    /// Segments at `node` (other than `seg_a`) into which both lines of the
    /// pair continue with compatible directions.
    fn edge_partners(
        &self,
        node: OptNodeIdx,
        seg_a: OptEdgeIdx,
        pair: (RouteIdx, RouteIdx),
    ) -> Result<Vec<OptEdgeIdx>, OptimError> {
        let from_etg = self.adjacent_edge(seg_a, node)?;
        let gnode = self.og.node(node).node;
        let dir_a = self.g.route_occ(from_etg, pair.0).and_then(|o| o.direction);
        let dir_b = self.g.route_occ(from_etg, pair.1).and_then(|o| o.direction);

        let mut ret = Vec::new();
        for &seg_b in &self.og.node(node).adj {
            if seg_b == seg_a {
                continue;
            }
            let e = self.adjacent_edge(seg_b, node)?;
            if !self
                .g
                .continued_routes_in(e, gnode, pair.0, dir_a, from_etg)
                .is_empty()
                && !self
                    .g
                    .continued_routes_in(e, gnode, pair.1, dir_b, from_etg)
                    .is_empty()
            {
                ret.push(seg_b);
            }
        }
        Ok(ret)
    }

    /// Ordered pairs of distinct segments at `node` such that line A of the
    /// pair continues into the first and line B into the second.
    fn edge_partner_pairs(
        &self,
        node: OptNodeIdx,
        seg_a: OptEdgeIdx,
        pair: (RouteIdx, RouteIdx),
    ) -> Result<Vec<(OptEdgeIdx, OptEdgeIdx)>, OptimError> {
        let from_etg = self.adjacent_edge(seg_a, node)?;
        let gnode = self.og.node(node).node;
        let dir_a = self.g.route_occ(from_etg, pair.0).and_then(|o| o.direction);
        let dir_b = self.g.route_occ(from_etg, pair.1).and_then(|o| o.direction);

        let mut ret = Vec::new();
        for &seg_b in &self.og.node(node).adj {
            if seg_b == seg_a {
                continue;
            }
            let eb = self.adjacent_edge(seg_b, node)?;
            if self
                .g
                .continued_routes_in(eb, gnode, pair.0, dir_a, from_etg)
                .is_empty()
            {
                continue;
            }
            for &seg_c in &self.og.node(node).adj {
                if seg_c == seg_a || seg_c == seg_b {
                    continue;
                }
                let ec = self.adjacent_edge(seg_c, node)?;
                if !self
                    .g
                    .continued_routes_in(ec, gnode, pair.1, dir_b, from_etg)
                    .is_empty()
                {
                    ret.push((seg_b, seg_c));
                }
            }
        }
        Ok(ret)
    }

    fn position_combinations(&self, a: OptEdgeIdx, b: OptEdgeIdx) -> Vec<PosComPair> {
        let card_a = self.ref_cardinality(a);
        let card_b = self.ref_cardinality(b);
        let mut ret = Vec::new();
        for a_in_a in 0..card_a {
            for b_in_a in 0..card_a {
                if a_in_a == b_in_a {
                    continue;
                }
                for a_in_b in 0..card_b {
                    for b_in_b in 0..card_b {
                        if a_in_b == b_in_b {
                            continue;
                        }
                        ret.push(PosComPair {
                            a_in_a,
                            a_in_b,
                            b_in_a,
                            b_in_b,
                        });
                    }
                }
            }
        }
        ret
    }

    fn position_combinations_single(&self, a: OptEdgeIdx) -> Vec<PosCom> {
        let card_a = self.ref_cardinality(a);
        let mut ret = Vec::new();
        for pa in 0..card_a {
            for pb in 0..card_a {
                if pa == pb {
                    continue;
                }
                ret.push(PosCom { a: pa, b: pb });
            }
        }
        ret
    }

    /// Weight of one crossing of the pair, accounting for routes collapsed
    /// behind each representative.
    fn pair_weight(&self, pair: (RouteIdx, RouteIdx)) -> f64 {
        let ca = self.g.route(pair.0).num_collapsed_partners as f64;
        let cb = self.g.route(pair.1).num_collapsed_partners as f64;
        (ca + 1.0) * (cb + 1.0)
    }

    fn write_same_seg_constraints(&self, m: &mut MipModel) -> Result<(), OptimError> {
        for (nidx, node) in self.og.nodes() {
            let mut processed: AHashSet<OptEdgeIdx> = AHashSet::new();
            for &seg_a in &node.adj {
                processed.insert(seg_a);
                for pair in self.line_pairs(seg_a, true) {
                    for seg_b in self.edge_partners(nidx, seg_a, pair)? {
                        if processed.contains(&seg_b) {
                            continue;
                        }

                        let dec = m.add_col(
                            format!(
                                "x_dec({},{},{}({}),{}({}),{})",
                                self.og.str_repr(seg_a),
                                self.og.str_repr(seg_b),
                                self.g.route(pair.0).id,
                                pair.0 .0,
                                self.g.route(pair.1).id,
                                pair.1 .0,
                                self.og.node_repr(nidx)
                            ),
                            ColKind::Binary,
                        );
                        m.set_obj_coef(
                            dec,
                            self.scorer.crossing_penalty_same_seg(node.node) * self.pair_weight(pair),
                        );

                        for pc in self.position_combinations(seg_a, seg_b) {
                            if !self
                                .oracle
                                .crosses_same(self.g, self.og, nidx, seg_a, seg_b, pc)?
                            {
                                continue;
                            }
                            let row = m.add_row(
                                format!(
                                    "dec_sum({},{},{},{},pa={},pb={},pa'={},pb'={},n={})",
                                    self.og.str_repr(seg_a),
                                    self.og.str_repr(seg_b),
                                    self.g.route(pair.0).id,
                                    self.g.route(pair.1).id,
                                    pc.a_in_a,
                                    pc.b_in_a,
                                    pc.a_in_b,
                                    pc.b_in_b,
                                    self.og.node_repr(nidx)
                                ),
                                RowSense::Le,
                                3.0,
                            );
                            self.link_assignment(m, row, seg_a, pair.0, pc.a_in_a)?;
                            self.link_assignment(m, row, seg_a, pair.1, pc.b_in_a)?;
                            self.link_assignment(m, row, seg_b, pair.0, pc.a_in_b)?;
                            self.link_assignment(m, row, seg_b, pair.1, pc.b_in_b)?;
                            m.set_coef(row, dec, -1.0);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn write_diff_seg_constraints(&self, m: &mut MipModel) -> Result<(), OptimError> {
        for (nidx, node) in self.og.nodes() {
            for &seg_a in &node.adj {
                for pair in self.line_pairs(seg_a, false) {
                    for (seg_b, seg_c) in self.edge_partner_pairs(nidx, seg_a, pair)? {
                        let dec = m.add_col(
                            format!(
                                "x_dec({},{}{},{}({}),{}({}),{})",
                                self.og.str_repr(seg_a),
                                self.og.str_repr(seg_b),
                                self.og.str_repr(seg_c),
                                self.g.route(pair.0).id,
                                pair.0 .0,
                                self.g.route(pair.1).id,
                                pair.1 .0,
                                self.og.node_repr(nidx)
                            ),
                            ColKind::Binary,
                        );
                        m.set_obj_coef(
                            dec,
                            self.scorer.crossing_penalty_diff_seg(node.node) * self.pair_weight(pair),
                        );

                        for pc in self.position_combinations_single(seg_a) {
                            if !self
                                .oracle
                                .crosses_diff(self.g, self.og, nidx, seg_a, seg_b, seg_c, pc)?
                            {
                                continue;
                            }
                            let row = m.add_row(
                                format!(
                                    "dec_sum({},{}{},{},{},pa={},pb={},n={})",
                                    self.og.str_repr(seg_a),
                                    self.og.str_repr(seg_b),
                                    self.og.str_repr(seg_c),
                                    self.g.route(pair.0).id,
                                    self.g.route(pair.1).id,
                                    pc.a,
                                    pc.b,
                                    self.og.node_repr(nidx)
                                ),
                                RowSense::Le,
                                1.0,
                            );
                            self.link_assignment(m, row, seg_a, pair.0, pc.a)?;
                            self.link_assignment(m, row, seg_a, pair.1, pc.b)?;
                            m.set_coef(row, dec, -1.0);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Add the assignment variable of (`seg`, `route`, `p`) to `row` with
    /// coefficient 1.
    fn link_assignment(
        &self,
        m: &mut MipModel,
        row: usize,
        seg: OptEdgeIdx,
        route: RouteIdx,
        p: usize,
    ) -> Result<(), OptimError> {
        let name = var_name(self.g, self.og, seg, route, p);
        let col = m.col_index(&name).ok_or_else(|| {
            OptimError::ModelConstruction(format!("assignment variable {name} missing"))
        })?;
        m.set_coef(row, col, 1.0);
        Ok(())
    }

    fn adjacent_edge(
        &self,
        seg: OptEdgeIdx,
        node: OptNodeIdx,
    ) -> Result<crate::graph::EdgeIdx, OptimError> {
        self.og.adjacent_edge(seg, node).ok_or_else(|| {
            OptimError::ModelConstruction(format!(
                "segment {} not incident to {}",
                self.og.str_repr(seg),
                self.og.node_repr(node)
            ))
        })
    }

    fn ref_cardinality(&self, seg: OptEdgeIdx) -> usize {
        self.og
            .edge(seg)
            .etgs
            .first()
            .map(|p| self.g.true_cardinality(p.edge))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NodeFront, Route};
    use crate::scorer::DefaultScorer;
    use geo::Coord;

    fn single_edge_graph(lines: &[&str]) -> TransitGraph {
        let mut g = TransitGraph::new("single");
        let routes: Vec<_> = lines.iter().map(|l| g.add_route(Route::new(*l))).collect();
        let u = g.add_node();
        let v = g.add_node();
        let e = g.add_edge(u, v);
        for r in routes {
            g.add_route_occ(e, r, None);
        }
        g
    }

    #[test]
    fn single_line_segment_has_one_var_and_no_decisions() {
        let g = single_edge_graph(&["A"]);
        let og = OptGraph::new(&g);
        let scorer = DefaultScorer::default();
        let m = IlpBuilder::new(&g, &og, &scorer).build().unwrap();

        assert_eq!(m.num_cols(), 1);
        assert_eq!(m.col_name(0), "x_(e0,l=A,p=0)");
        assert!(m.col_names().all(|n| !n.starts_with("x_dec")));
        // one position row, one line row
        assert_eq!(m.num_rows(), 2);
    }

    #[test]
    fn degree_one_nodes_produce_no_crossing_decisions() {
        let g = single_edge_graph(&["A", "B", "C"]);
        let og = OptGraph::new(&g);
        let scorer = DefaultScorer::default();
        let m = IlpBuilder::new(&g, &og, &scorer).build().unwrap();

        assert_eq!(m.num_cols(), 9);
        assert!(m.col_names().all(|n| !n.starts_with("x_dec")));
        // 3 position rows + 3 line rows
        assert_eq!(m.num_rows(), 6);
    }

    #[test]
    fn relative_only_edge_contributes_nothing() {
        let mut g = TransitGraph::new("rel");
        let a = g.add_route(Route::new("A"));
        let mut rel = Route::new("A'");
        rel.relative_to = Some(a);
        let rel = g.add_route(rel);
        let u = g.add_node();
        let v = g.add_node();
        let e = g.add_edge(u, v);
        g.add_route_occ(e, rel, None);

        let og = OptGraph::new(&g);
        let scorer = DefaultScorer::default();
        let m = IlpBuilder::new(&g, &og, &scorer).build().unwrap();
        assert_eq!(m.num_cols(), 0);
        assert_eq!(m.num_rows(), 0);
    }

    #[test]
    fn relative_routes_get_no_variables() {
        let mut g = TransitGraph::new("rel2");
        let a = g.add_route(Route::new("A"));
        let b = g.add_route(Route::new("B"));
        let mut rel = Route::new("A'");
        rel.relative_to = Some(a);
        let rel = g.add_route(rel);
        let u = g.add_node();
        let v = g.add_node();
        let e = g.add_edge(u, v);
        g.add_route_occ(e, a, None);
        g.add_route_occ(e, rel, None);
        g.add_route_occ(e, b, None);

        let og = OptGraph::new(&g);
        let scorer = DefaultScorer::default();
        let m = IlpBuilder::new(&g, &og, &scorer).build().unwrap();
        // 2 true lines -> 4 assignment vars, none mentioning A'.
        assert_eq!(m.num_cols(), 4);
        assert!(m.col_names().all(|n| !n.contains("l=A'")));
    }

    #[test]
    fn simplified_chain_keeps_variable_count_of_one_segment() {
        // S4: three collinear edges with {A, B, C} collapse into one segment
        // with 9 variables, not 27.
        let mut g = TransitGraph::new("chain");
        let rs: Vec<_> = ["A", "B", "C"].iter().map(|l| g.add_route(Route::new(*l))).collect();
        let ns: Vec<_> = (0..4).map(|_| g.add_node()).collect();
        for w in ns.windows(2) {
            let e = g.add_edge(w[0], w[1]);
            for &r in &rs {
                g.add_route_occ(e, r, None);
            }
        }

        let mut og = OptGraph::new(&g);
        og.simplify(&g);
        let scorer = DefaultScorer::default();
        let m = IlpBuilder::new(&g, &og, &scorer).build().unwrap();
        assert_eq!(m.num_cols(), 9);
    }

    #[test]
    fn names_and_mps_are_deterministic() {
        let build = || {
            let mut g = TransitGraph::new("det");
            let a = g.add_route(Route::new("A"));
            let b = g.add_route(Route::new("B"));
            let u = g.add_node();
            let x = g.add_node();
            let v = g.add_node();
            let e1 = g.add_edge(u, x);
            let e2 = g.add_edge(x, v);
            for e in [e1, e2] {
                g.add_route_occ(e, a, None);
                g.add_route_occ(e, b, None);
            }
            g.add_node_front(
                x,
                NodeFront {
                    edge: e1,
                    a: Coord { x: -5.0, y: 0.0 },
                    b: Coord { x: -5.0, y: 10.0 },
                },
            );
            g.add_node_front(
                x,
                NodeFront {
                    edge: e2,
                    a: Coord { x: 5.0, y: 10.0 },
                    b: Coord { x: 5.0, y: 0.0 },
                },
            );
            let og = OptGraph::new(&g);
            let scorer = DefaultScorer::default();
            let m = IlpBuilder::new(&g, &og, &scorer).build().unwrap();
            let names: Vec<String> = m.col_names().map(|s| s.to_string()).collect();
            let mut mps = Vec::new();
            m.write_mps(&mut mps).unwrap();
            (names, mps)
        };
        let (n1, b1) = build();
        let (n2, b2) = build();
        assert_eq!(n1, n2);
        assert_eq!(b1, b2);
    }

    #[test]
    fn same_seg_pair_gets_decision_var_and_rows() {
        let mut g = TransitGraph::new("pair");
        let a = g.add_route(Route::new("A"));
        let b = g.add_route(Route::new("B"));
        let u = g.add_node();
        let x = g.add_node();
        let v = g.add_node();
        let e1 = g.add_edge(u, x);
        let e2 = g.add_edge(x, v);
        for e in [e1, e2] {
            g.add_route_occ(e, a, None);
            g.add_route_occ(e, b, None);
        }
        g.add_node_front(
            x,
            NodeFront {
                edge: e1,
                a: Coord { x: -5.0, y: 0.0 },
                b: Coord { x: -5.0, y: 10.0 },
            },
        );
        g.add_node_front(
            x,
            NodeFront {
                edge: e2,
                a: Coord { x: 5.0, y: 10.0 },
                b: Coord { x: 5.0, y: 0.0 },
            },
        );

        let og = OptGraph::new(&g);
        let scorer = DefaultScorer::default();
        let m = IlpBuilder::new(&g, &og, &scorer).build().unwrap();

        let dec: Vec<_> = m.col_names().filter(|n| n.starts_with("x_dec")).collect();
        assert_eq!(dec.len(), 1);
        assert_eq!(dec[0], "x_dec(e0,e1,A(0),B(1),n1)");
        // The decision var carries the same-seg penalty.
        let dec_idx = m.col_index(dec[0]).unwrap();
        assert!((m.obj_coef(dec_idx) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn collapsed_partners_scale_the_penalty() {
        let mut g = TransitGraph::new("collapsed");
        let mut ra = Route::new("A");
        ra.num_collapsed_partners = 2;
        let a = g.add_route(ra);
        let b = g.add_route(Route::new("B"));
        let u = g.add_node();
        let x = g.add_node();
        let v = g.add_node();
        let e1 = g.add_edge(u, x);
        let e2 = g.add_edge(x, v);
        for e in [e1, e2] {
            g.add_route_occ(e, a, None);
            g.add_route_occ(e, b, None);
        }
        g.add_node_front(
            x,
            NodeFront {
                edge: e1,
                a: Coord { x: -5.0, y: 0.0 },
                b: Coord { x: -5.0, y: 10.0 },
            },
        );
        g.add_node_front(
            x,
            NodeFront {
                edge: e2,
                a: Coord { x: 5.0, y: 10.0 },
                b: Coord { x: 5.0, y: 0.0 },
            },
        );

        let og = OptGraph::new(&g);
        let scorer = DefaultScorer::default();
        let m = IlpBuilder::new(&g, &og, &scorer).build().unwrap();
        let dec = m
            .col_names()
            .find(|n| n.starts_with("x_dec"))
            .map(|s| s.to_string())
            .unwrap();
        let dec_idx = m.col_index(&dec).unwrap();
        // (2+1) * (0+1) * 4.0
        assert!((m.obj_coef(dec_idx) - 12.0).abs() < 1e-9);
    }
}
