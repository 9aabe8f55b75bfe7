//! Serializable input/output format of the CLI binary. The graph comes in as
//! JSON with id-keyed routes and nodes; edges reference them by id, node
//! fronts reference edges by list index.

use crate::graph::{EdgeIdx, NodeFront, Route, TransitGraph};
use ahash::AHashMap;
use anyhow::{anyhow, Context, Result};
use geo::Coord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphFile {
    #[serde(default)]
    pub name: String,
    pub routes: Vec<RouteDef>,
    pub nodes: Vec<NodeDef>,
    pub edges: Vec<EdgeDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDef {
    pub id: String,
    #[serde(default)]
    pub relative_to: Option<String>,
    #[serde(default)]
    pub collapsed_partners: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDef {
    pub id: String,
    #[serde(default)]
    pub fronts: Vec<FrontDef>,
}

/// Physical front of one adjacent edge: `edge` is an index into the edge
/// list, `a`/`b` the endpoints of the front segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontDef {
    pub edge: usize,
    pub a: [f64; 2],
    pub b: [f64; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDef {
    pub from: String,
    pub to: String,
    pub lines: Vec<LineDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineDef {
    pub route: String,
    /// Node id the line runs toward; absent means both directions.
    #[serde(default)]
    pub direction: Option<String>,
}

/// Per-edge orderings as written out by the binary: occurrence indices in
/// left-to-right reading order, keyed by edge list index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderingFile {
    pub edges: Vec<EdgeOrdering>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeOrdering {
    pub edge: usize,
    pub order: Vec<usize>,
}

pub fn build_graph(file: &GraphFile) -> Result<TransitGraph> {
    let mut g = TransitGraph::new(file.name.clone());

    let mut routes = AHashMap::new();
    for def in &file.routes {
        let mut r = Route::new(def.id.clone());
        r.num_collapsed_partners = def.collapsed_partners;
        let idx = g.add_route(r);
        if routes.insert(def.id.clone(), idx).is_some() {
            return Err(anyhow!("duplicate route id '{}'", def.id));
        }
    }
    // relative_to may point at routes defined later, resolve in a second pass
    let rel: Vec<_> = file
        .routes
        .iter()
        .filter_map(|def| def.relative_to.as_ref().map(|r| (def.id.clone(), r.clone())))
        .collect();

    let mut nodes = AHashMap::new();
    for def in &file.nodes {
        let idx = g.add_node();
        if nodes.insert(def.id.clone(), idx).is_some() {
            return Err(anyhow!("duplicate node id '{}'", def.id));
        }
    }

    for def in &file.edges {
        let from = *nodes
            .get(&def.from)
            .with_context(|| format!("unknown node '{}'", def.from))?;
        let to = *nodes
            .get(&def.to)
            .with_context(|| format!("unknown node '{}'", def.to))?;
        let e = g.add_edge(from, to);
        for line in &def.lines {
            let route = *routes
                .get(&line.route)
                .with_context(|| format!("unknown route '{}'", line.route))?;
            let direction = match &line.direction {
                Some(nid) => Some(
                    *nodes
                        .get(nid)
                        .with_context(|| format!("unknown direction node '{}'", nid))?,
                ),
                None => None,
            };
            g.add_route_occ(e, route, direction);
        }
    }

    for (id, reference) in rel {
        let target = *routes
            .get(&reference)
            .with_context(|| format!("unknown reference route '{}'", reference))?;
        let idx = routes[&id];
        // arena handles are write-once here; rebuild the route in place
        g.set_relative_to(idx, target);
    }

    for def in &file.nodes {
        let n = nodes[&def.id];
        for front in &def.fronts {
            if front.edge >= g.num_edges() {
                return Err(anyhow!("front references unknown edge {}", front.edge));
            }
            g.add_node_front(
                n,
                NodeFront {
                    edge: EdgeIdx(front.edge as u32),
                    a: Coord {
                        x: front.a[0],
                        y: front.a[1],
                    },
                    b: Coord {
                        x: front.b[0],
                        y: front.b[1],
                    },
                },
            );
        }
    }

    Ok(g)
}

pub fn ordering_file(g: &TransitGraph) -> OrderingFile {
    OrderingFile {
        edges: g
            .ordering
            .0
            .iter()
            .map(|(e, order)| EdgeOrdering {
                edge: e.0 as usize,
                order: order.clone(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_graph_from_json() {
        let json = r#"{
            "name": "mini",
            "routes": [
                {"id": "A"},
                {"id": "A2", "relative_to": "A"},
                {"id": "B", "collapsed_partners": 2}
            ],
            "nodes": [
                {"id": "u"},
                {"id": "v", "fronts": [{"edge": 0, "a": [0, 0], "b": [0, 4]}]}
            ],
            "edges": [
                {"from": "u", "to": "v", "lines": [
                    {"route": "A"},
                    {"route": "A2"},
                    {"route": "B", "direction": "v"}
                ]}
            ]
        }"#;
        let file: GraphFile = serde_json::from_str(json).unwrap();
        let g = build_graph(&file).unwrap();

        assert_eq!(g.num_nodes(), 2);
        assert_eq!(g.num_edges(), 1);
        let e = EdgeIdx(0);
        assert_eq!(g.cardinality(e), 3);
        assert_eq!(g.true_cardinality(e), 2);

        let (a2, _) = g
            .routes()
            .find(|(_, r)| r.id == "A2")
            .map(|(i, r)| (i, r.clone()))
            .unwrap();
        assert!(g.is_relative(a2));
    }

    #[test]
    fn rejects_dangling_references() {
        let json = r#"{
            "routes": [{"id": "A"}],
            "nodes": [{"id": "u"}],
            "edges": [{"from": "u", "to": "missing", "lines": []}]
        }"#;
        let file: GraphFile = serde_json::from_str(json).unwrap();
        assert!(build_graph(&file).is_err());
    }
}
