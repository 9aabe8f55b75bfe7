//! Core transit graph: routes, nodes with node fronts, edges carrying
//! ordered route occurrences, and the per-edge ordering written back by the
//! optimizer. Nodes and edges live in arenas and reference each other through
//! index handles.

use geo::Coord;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdx(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeIdx(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteIdx(pub u32);

/// A transit line identity. A route may be bundled "relative to" a reference
/// route, in which case it takes no part in any ordering decision and is
/// re-inserted next to its reference after solving.
#[derive(Debug, Clone)]
pub struct Route {
    pub id: String,
    pub relative_to: Option<RouteIdx>,
    /// Number of underlying routes merged into this representative.
    pub num_collapsed_partners: u32,
}

impl Route {
    pub fn new(id: impl Into<String>) -> Self {
        Route {
            id: id.into(),
            relative_to: None,
            num_collapsed_partners: 0,
        }
    }
}

/// A (route, travel direction) record on an edge. `direction` is one of the
/// edge's endpoint nodes if the line runs only toward it, or `None` if the
/// line runs both ways.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteOcc {
    pub route: RouteIdx,
    pub direction: Option<NodeIdx>,
}

/// Physical layout of one adjacent edge at a node: trip position `p` on the
/// edge maps to a 2D point along the front segment `a..b`.
#[derive(Debug, Clone)]
pub struct NodeFront {
    pub edge: EdgeIdx,
    pub a: Coord<f64>,
    pub b: Coord<f64>,
}

impl NodeFront {
    /// Point of position `p` out of `card` positions, evenly spaced along the
    /// front. `reversed` mirrors the position first.
    pub fn trip_pos(&self, card: usize, p: usize, reversed: bool) -> Coord<f64> {
        let pp = if reversed { card - 1 - p } else { p };
        let t = (pp as f64 + 0.5) / card as f64;
        Coord {
            x: self.a.x + (self.b.x - self.a.x) * t,
            y: self.a.y + (self.b.y - self.a.y) * t,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Node {
    pub adj_in: Vec<EdgeIdx>,
    pub adj_out: Vec<EdgeIdx>,
    /// Main-directions descriptor: one front per adjacent edge.
    pub fronts: Vec<NodeFront>,
}

impl Node {
    pub fn adj(&self) -> impl Iterator<Item = EdgeIdx> + '_ {
        self.adj_out.iter().chain(self.adj_in.iter()).copied()
    }

    pub fn front_for(&self, e: EdgeIdx) -> Option<&NodeFront> {
        self.fronts.iter().find(|f| f.edge == e)
    }
}

/// Directed edge with an ordered bag of route occurrences.
#[derive(Debug, Clone)]
pub struct Edge {
    pub from: NodeIdx,
    pub to: NodeIdx,
    pub occs: Vec<RouteOcc>,
}

/// Final left-to-right ordering per underlying edge: for each edge, the
/// sequence of occurrence indices. Before relative expansion the sequence is
/// a permutation of the non-relative occurrence indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderingConfig(pub BTreeMap<EdgeIdx, Vec<usize>>);

impl OrderingConfig {
    pub fn get(&self, e: EdgeIdx) -> Option<&Vec<usize>> {
        self.0.get(&e)
    }

    pub fn entry(&mut self, e: EdgeIdx) -> &mut Vec<usize> {
        self.0.entry(e).or_default()
    }
}

#[derive(Debug, Default)]
pub struct TransitGraph {
    pub name: String,
    routes: Vec<Route>,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    pub ordering: OrderingConfig,
    /// Wall time of the last solve in milliseconds.
    pub last_solve_time_ms: u64,
    /// Objective value of the last solve.
    pub last_solve_target: f64,
}

impl TransitGraph {
    pub fn new(name: impl Into<String>) -> Self {
        TransitGraph {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn add_route(&mut self, r: Route) -> RouteIdx {
        self.routes.push(r);
        RouteIdx(self.routes.len() as u32 - 1)
    }

    pub fn add_node(&mut self) -> NodeIdx {
        self.nodes.push(Node::default());
        NodeIdx(self.nodes.len() as u32 - 1)
    }

    pub fn add_edge(&mut self, from: NodeIdx, to: NodeIdx) -> EdgeIdx {
        self.edges.push(Edge {
            from,
            to,
            occs: Vec::new(),
        });
        let idx = EdgeIdx(self.edges.len() as u32 - 1);
        self.nodes[from.0 as usize].adj_out.push(idx);
        self.nodes[to.0 as usize].adj_in.push(idx);
        idx
    }

    pub fn add_route_occ(&mut self, e: EdgeIdx, route: RouteIdx, direction: Option<NodeIdx>) {
        self.edges[e.0 as usize].occs.push(RouteOcc { route, direction });
    }

    pub fn add_node_front(&mut self, n: NodeIdx, front: NodeFront) {
        self.nodes[n.0 as usize].fronts.push(front);
    }

    pub fn route(&self, r: RouteIdx) -> &Route {
        &self.routes[r.0 as usize]
    }

    pub fn set_relative_to(&mut self, r: RouteIdx, reference: RouteIdx) {
        self.routes[r.0 as usize].relative_to = Some(reference);
    }

    pub fn node(&self, n: NodeIdx) -> &Node {
        &self.nodes[n.0 as usize]
    }

    pub fn edge(&self, e: EdgeIdx) -> &Edge {
        &self.edges[e.0 as usize]
    }

    pub fn routes(&self) -> impl Iterator<Item = (RouteIdx, &Route)> {
        self.routes
            .iter()
            .enumerate()
            .map(|(i, r)| (RouteIdx(i as u32), r))
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIdx, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeIdx(i as u32), n))
    }

    pub fn edges(&self) -> impl Iterator<Item = (EdgeIdx, &Edge)> {
        self.edges
            .iter()
            .enumerate()
            .map(|(i, e)| (EdgeIdx(i as u32), e))
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn is_relative(&self, r: RouteIdx) -> bool {
        self.route(r).relative_to.is_some()
    }

    /// Total number of route occurrences on `e`.
    pub fn cardinality(&self, e: EdgeIdx) -> usize {
        self.edge(e).occs.len()
    }

    /// Number of non-relative route occurrences on `e`. Only these get
    /// positions in the ILP.
    pub fn true_cardinality(&self, e: EdgeIdx) -> usize {
        self.edge(e)
            .occs
            .iter()
            .filter(|o| !self.is_relative(o.route))
            .count()
    }

    pub fn contains_route(&self, e: EdgeIdx, r: RouteIdx) -> bool {
        self.edge(e).occs.iter().any(|o| o.route == r)
    }

    pub fn route_occ(&self, e: EdgeIdx, r: RouteIdx) -> Option<&RouteOcc> {
        self.edge(e).occs.iter().find(|o| o.route == r)
    }

    /// The occurrence of `r` on `e` together with its index in the
    /// occurrence list.
    pub fn route_occ_with_pos(&self, e: EdgeIdx, r: RouteIdx) -> Option<(&RouteOcc, usize)> {
        self.edge(e)
            .occs
            .iter()
            .enumerate()
            .find(|(_, o)| o.route == r)
            .map(|(i, o)| (o, i))
    }

    /// Routes on `e` that are bundled relative to `reference`, in occurrence
    /// order.
    pub fn routes_rel_to(&self, e: EdgeIdx, reference: RouteIdx) -> Vec<RouteIdx> {
        self.edge(e)
            .occs
            .iter()
            .filter(|o| self.route(o.route).relative_to == Some(reference))
            .map(|o| o.route)
            .collect()
    }

    /// Routes that continue from `from` across `node` into `into` as route
    /// `r` with a compatible travel direction. `dir` is the direction of `r`
    /// on `from`. Directions are compatible if either side is unconstrained,
    /// or the line flows through the node consistently (toward it on one
    /// edge, away from it on the other).
    pub fn continued_routes_in(
        &self,
        into: EdgeIdx,
        node: NodeIdx,
        r: RouteIdx,
        dir: Option<NodeIdx>,
        from: EdgeIdx,
    ) -> Vec<RouteIdx> {
        if into == from {
            return Vec::new();
        }
        self.edge(into)
            .occs
            .iter()
            .filter(|o| o.route == r)
            .filter(|o| match (dir, o.direction) {
                (None, _) | (_, None) => true,
                (Some(d), Some(od)) => (d == node) != (od == node),
            })
            .map(|o| o.route)
            .collect()
    }

    /// Position of `r` within the ordered sequence `ordering` of edge `e`,
    /// i.e. the index `j` with `ordering[j]` the occurrence index of `r`.
    pub fn route_pos_under(&self, e: EdgeIdx, r: RouteIdx, ordering: &[usize]) -> Option<usize> {
        let (_, occ_idx) = self.route_occ_with_pos(e, r)?;
        ordering.iter().position(|&x| x == occ_idx)
    }
}
