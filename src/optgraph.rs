//! Reduced projection of the transit graph used for the ILP formulation.
//! Every graph node starts as an [`OptNode`] and every graph edge as a
//! single-part [`OptEdge`]; the simplification pass then glues linear chains
//! with identical non-relative line sets into longer segments.

use crate::graph::{EdgeIdx, NodeIdx, RouteIdx, TransitGraph};
use itertools::Itertools;
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OptNodeIdx(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OptEdgeIdx(pub u32);

/// One underlying graph edge inside a segment. `dir` records whether the
/// edge's `from -> to` orientation agrees with the segment's nominal
/// direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EtgPart {
    pub edge: EdgeIdx,
    pub dir: bool,
}

/// A segment: a maximal merged run of underlying edges with identical
/// non-relative route sets. `etgs[0]` is the reference part; its cardinality
/// governs the segment's variable count.
#[derive(Debug, Clone)]
pub struct OptEdge {
    pub from: OptNodeIdx,
    pub to: OptNodeIdx,
    pub etgs: Vec<EtgPart>,
    dead: bool,
}

#[derive(Debug, Clone)]
pub struct OptNode {
    /// Underlying graph node.
    pub node: NodeIdx,
    pub adj_in: Vec<OptEdgeIdx>,
    pub adj_out: Vec<OptEdgeIdx>,
    /// All incident segments in insertion order (out before in, per edge
    /// creation order). Iteration over this list must stay stable.
    pub adj: Vec<OptEdgeIdx>,
    dead: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct OptGraphStats {
    pub num_nodes: usize,
    pub num_edges: usize,
    pub num_routes: usize,
    pub max_cardinality: usize,
}

#[derive(Debug, Default)]
pub struct OptGraph {
    nodes: Vec<OptNode>,
    edges: Vec<OptEdge>,
}

impl OptGraph {
    /// One opt node per graph node, one single-part segment per graph edge.
    pub fn new(g: &TransitGraph) -> Self {
        let mut og = OptGraph {
            nodes: (0..g.num_nodes())
                .map(|i| OptNode {
                    node: NodeIdx(i as u32),
                    adj_in: Vec::new(),
                    adj_out: Vec::new(),
                    adj: Vec::new(),
                    dead: false,
                })
                .collect(),
            edges: Vec::with_capacity(g.num_edges()),
        };

        for (eidx, e) in g.edges() {
            let idx = OptEdgeIdx(og.edges.len() as u32);
            og.edges.push(OptEdge {
                from: OptNodeIdx(e.from.0),
                to: OptNodeIdx(e.to.0),
                etgs: vec![EtgPart {
                    edge: eidx,
                    dir: true,
                }],
                dead: false,
            });
            og.nodes[e.from.0 as usize].adj_out.push(idx);
            og.nodes[e.from.0 as usize].adj.push(idx);
            og.nodes[e.to.0 as usize].adj_in.push(idx);
            og.nodes[e.to.0 as usize].adj.push(idx);
        }

        og
    }

    pub fn node(&self, n: OptNodeIdx) -> &OptNode {
        &self.nodes[n.0 as usize]
    }

    pub fn edge(&self, e: OptEdgeIdx) -> &OptEdge {
        &self.edges[e.0 as usize]
    }

    /// Alive nodes in stable index order.
    pub fn nodes(&self) -> impl Iterator<Item = (OptNodeIdx, &OptNode)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.dead)
            .map(|(i, n)| (OptNodeIdx(i as u32), n))
    }

    /// Alive segments in stable index order.
    pub fn edges(&self) -> impl Iterator<Item = (OptEdgeIdx, &OptEdge)> {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.dead)
            .map(|(i, e)| (OptEdgeIdx(i as u32), e))
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.iter().filter(|n| !n.dead).count()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.iter().filter(|e| !e.dead).count()
    }

    /// The underlying graph edge of segment `e` that touches opt node `n`.
    pub fn adjacent_edge(&self, e: OptEdgeIdx, n: OptNodeIdx) -> Option<EdgeIdx> {
        let ed = self.edge(e);
        if ed.from == n {
            ed.etgs.first().map(|p| p.edge)
        } else if ed.to == n {
            ed.etgs.last().map(|p| p.edge)
        } else {
            None
        }
    }

    /// Stable textual handle of a segment, built from its underlying edge
    /// indices. Used in variable and constraint names.
    pub fn str_repr(&self, e: OptEdgeIdx) -> String {
        self.edge(e)
            .etgs
            .iter()
            .map(|p| format!("e{}", p.edge.0))
            .join("+")
    }

    pub fn node_repr(&self, n: OptNodeIdx) -> String {
        format!("n{}", self.node(n).node.0)
    }

    /// Collapse every maximal chain `A - e1 - B - e2 - C` where `B` has
    /// degree 2, the non-relative route sets of `e1` and `e2` are equal, and
    /// every shared route continues across `B` with a compatible direction.
    /// Runs to a fixed point; calling it again is a no-op.
    pub fn simplify(&mut self, g: &TransitGraph) {
        loop {
            let mut changed = false;
            for b in 0..self.nodes.len() {
                let b = OptNodeIdx(b as u32);
                if self.nodes[b.0 as usize].dead {
                    continue;
                }
                let adj = &self.nodes[b.0 as usize].adj;
                if adj.len() != 2 {
                    continue;
                }
                let (e1, e2) = (adj[0], adj[1]);
                if e1 == e2 {
                    // self loop
                    continue;
                }
                if !self.contractable(g, b, e1, e2) {
                    continue;
                }
                self.contract(b, e1, e2);
                changed = true;
            }
            if !changed {
                break;
            }
        }
        debug!(
            "simplified optim graph down to {} nodes, {} edges",
            self.num_nodes(),
            self.num_edges()
        );
    }

    fn non_relative_routes(&self, g: &TransitGraph, e: EdgeIdx) -> Vec<RouteIdx> {
        let mut rs: Vec<RouteIdx> = g
            .edge(e)
            .occs
            .iter()
            .filter(|o| !g.is_relative(o.route))
            .map(|o| o.route)
            .collect();
        rs.sort_unstable();
        rs.dedup();
        rs
    }

    fn contractable(&self, g: &TransitGraph, b: OptNodeIdx, e1: OptEdgeIdx, e2: OptEdgeIdx) -> bool {
        let node = self.node(b).node;
        let (f1, f2) = match (self.adjacent_edge(e1, b), self.adjacent_edge(e2, b)) {
            (Some(f1), Some(f2)) => (f1, f2),
            _ => return false,
        };

        let r1 = self.non_relative_routes(g, f1);
        let r2 = self.non_relative_routes(g, f2);
        if r1 != r2 {
            return false;
        }

        for &r in &r1 {
            let dir = match g.route_occ(f1, r) {
                Some(occ) => occ.direction,
                None => return false,
            };
            if g.continued_routes_in(f2, node, r, dir, f1).is_empty() {
                return false;
            }
        }
        true
    }

    fn contract(&mut self, b: OptNodeIdx, e1: OptEdgeIdx, e2: OptEdgeIdx) {
        // Orient e1 so that it ends at b, e2 so that it starts at b.
        let part1 = if self.edge(e1).to == b {
            self.edge(e1).etgs.clone()
        } else {
            Self::flipped(&self.edge(e1).etgs)
        };
        let part2 = if self.edge(e2).from == b {
            self.edge(e2).etgs.clone()
        } else {
            Self::flipped(&self.edge(e2).etgs)
        };

        let a = self.other_end(e1, b);
        let c = self.other_end(e2, b);

        let mut etgs = part1;
        etgs.extend(part2);
        let merged = OptEdgeIdx(self.edges.len() as u32);
        self.edges.push(OptEdge {
            from: a,
            to: c,
            etgs,
            dead: false,
        });

        self.edges[e1.0 as usize].dead = true;
        self.edges[e2.0 as usize].dead = true;

        {
            let nb = &mut self.nodes[b.0 as usize];
            nb.dead = true;
            nb.adj.clear();
            nb.adj_in.clear();
            nb.adj_out.clear();
        }

        for dead in [e1, e2] {
            for n in [a, c] {
                let nn = &mut self.nodes[n.0 as usize];
                nn.adj.retain(|&x| x != dead);
                nn.adj_in.retain(|&x| x != dead);
                nn.adj_out.retain(|&x| x != dead);
            }
        }

        self.nodes[a.0 as usize].adj_out.push(merged);
        self.nodes[a.0 as usize].adj.push(merged);
        self.nodes[c.0 as usize].adj_in.push(merged);
        self.nodes[c.0 as usize].adj.push(merged);
    }

    fn other_end(&self, e: OptEdgeIdx, n: OptNodeIdx) -> OptNodeIdx {
        let ed = self.edge(e);
        if ed.from == n { ed.to } else { ed.from }
    }

    fn flipped(parts: &[EtgPart]) -> Vec<EtgPart> {
        parts
            .iter()
            .rev()
            .map(|p| EtgPart {
                edge: p.edge,
                dir: !p.dir,
            })
            .collect()
    }

    pub fn stats(&self, g: &TransitGraph) -> OptGraphStats {
        let mut routes: Vec<RouteIdx> = Vec::new();
        let mut max_card = 0;
        for (_, e) in self.edges() {
            for part in &e.etgs {
                for occ in &g.edge(part.edge).occs {
                    routes.push(occ.route);
                }
            }
            if let Some(reference) = e.etgs.first() {
                max_card = max_card.max(g.true_cardinality(reference.edge));
            }
        }
        routes.sort_unstable();
        routes.dedup();

        OptGraphStats {
            num_nodes: self.num_nodes(),
            num_edges: self.num_edges(),
            num_routes: routes.len(),
            max_cardinality: max_card,
        }
    }
}
