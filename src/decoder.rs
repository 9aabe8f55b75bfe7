//! Reads the 0/1 assignment back out of a solved model: writes one position
//! sequence per underlying edge, oriented by the reference direction of its
//! segment, then expands bundled (relative) routes into the orderings.

use crate::error::OptimError;
use crate::graph::{EdgeIdx, OrderingConfig, RouteIdx, TransitGraph};
use crate::ilp::var_name;
use crate::optgraph::OptGraph;
use crate::solver::SolutionValues;
use ahash::AHashSet;

/// Extract the ordering of every underlying edge from the solved assignment
/// variables. Exactly one line must sit at every position of every segment;
/// anything else is a solver bug surfaced as [`OptimError::DecoderAssertion`].
pub fn decode(
    g: &TransitGraph,
    og: &OptGraph,
    sol: &impl SolutionValues,
    out: &mut OrderingConfig,
) -> Result<(), OptimError> {
    for (_, n) in og.nodes() {
        for &seg in &n.adj_out {
            let e = og.edge(seg);
            let reference_dir = match e.etgs.first() {
                Some(p) => p.dir,
                None => continue,
            };
            for part in &e.etgs {
                let k = g.true_cardinality(part.edge);
                for tp in 0..k {
                    let mut found: Option<usize> = None;
                    for (p, occ) in g.edge(part.edge).occs.iter().enumerate() {
                        if g.is_relative(occ.route) {
                            continue;
                        }
                        let name = var_name(g, og, seg, occ.route, tp);
                        let val = sol.value(&name).ok_or_else(|| {
                            OptimError::DecoderAssertion(format!("no value for {name}"))
                        })?;
                        if val > 0.5 {
                            if found.is_some() {
                                return Err(OptimError::DecoderAssertion(format!(
                                    "two lines at position {tp} of segment {}",
                                    og.str_repr(seg)
                                )));
                            }
                            found = Some(p);
                        }
                    }
                    let p = found.ok_or_else(|| {
                        OptimError::DecoderAssertion(format!(
                            "no line at position {tp} of segment {}",
                            og.str_repr(seg)
                        ))
                    })?;

                    // Orient by the reference direction of the segment.
                    let seq = out.entry(part.edge);
                    if !(part.dir ^ reference_dir) {
                        seq.insert(0, p);
                    } else {
                        seq.push(p);
                    }
                }
            }
        }
    }
    Ok(())
}

/// Insert every relative route next to its reference route in every edge the
/// reference runs through, propagating a consistent side across the graph.
pub fn expand_relatives(g: &TransitGraph, out: &mut OrderingConfig) -> Result<(), OptimError> {
    let mut proced: AHashSet<RouteIdx> = AHashSet::new();

    for (_, n) in g.nodes() {
        for &e in &n.adj_out {
            for occ in &g.edge(e).occs {
                if let Some(reference) = g.route(occ.route).relative_to {
                    if !proced.insert(reference) {
                        continue;
                    }
                    expand_relatives_for(g, out, reference, e, &g.routes_rel_to(e, reference))?;
                }
            }
        }
    }
    Ok(())
}

fn expand_relatives_for(
    g: &TransitGraph,
    out: &mut OrderingConfig,
    reference: RouteIdx,
    start: EdgeIdx,
    rels: &[RouteIdx],
) -> Result<(), OptimError> {
    let mut visited: AHashSet<EdgeIdx> = AHashSet::new();
    let mut todo: Vec<(Option<EdgeIdx>, EdgeIdx)> = vec![(None, start)];

    while let Some((prev, cur)) = todo.pop() {
        if !visited.insert(cur) {
            continue;
        }

        for &r in rels {
            let (_, p) = match g.route_occ_with_pos(cur, r) {
                Some(found) => found,
                // the bundle does not run on this edge
                None => continue,
            };
            let (_, ref_occ_idx) = g.route_occ_with_pos(cur, reference).ok_or_else(|| {
                OptimError::DecoderAssertion(format!(
                    "edge e{} lost its reference route during expansion",
                    cur.0
                ))
            })?;

            // Pick the side of the reference: keep the relative order the
            // previous edge chose, flipped when the edges meet head-to-head
            // or tail-to-tail.
            let after = match prev {
                Some(pe) => {
                    let pe_seq = out.get(pe).cloned().unwrap_or_default();
                    let pos_r = g.route_pos_under(pe, r, &pe_seq);
                    let pos_ref = g.route_pos_under(pe, reference, &pe_seq);
                    let same_endpoint = g.edge(pe).to == g.edge(cur).to
                        || g.edge(pe).from == g.edge(cur).from;
                    match (pos_r, pos_ref) {
                        (Some(pr), Some(pf)) => same_endpoint ^ (pr > pf),
                        _ => false,
                    }
                }
                None => false,
            };

            let seq = out.entry(cur);
            let at = seq.iter().position(|&x| x == ref_occ_idx).ok_or_else(|| {
                OptimError::DecoderAssertion(format!(
                    "reference route missing from the ordering of e{}",
                    cur.0
                ))
            })?;
            if after {
                seq.insert(at + 1, p);
            } else {
                seq.insert(at, p);
            }
        }

        for node in [g.edge(cur).from, g.edge(cur).to] {
            if let Some(pe) = prev {
                if g.edge(pe).to == node || g.edge(pe).from == node {
                    continue;
                }
            }
            for e2 in g.node(node).adj() {
                if g.contains_route(e2, reference) && !visited.contains(&e2) {
                    todo.push((Some(cur), e2));
                }
            }
        }
    }
    Ok(())
}
