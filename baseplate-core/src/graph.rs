//! Stable topological sort with full cycle reporting.
//!
//! Edges read `(depends_on, dependent)`: the first node must come before the
//! second in the output. Nodes with no ordering constraint between them keep
//! their input order, which is what keeps generated output deterministic.
//!
//! The visit is a depth-first search with three-colour marking. Roots are
//! visited in reverse input order and finished nodes are written from the tail
//! of the output backwards (reverse postorder).

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;

use crate::error::GraphError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Visited,
}

/// Order `nodes` so that for every edge `(a, b)`, `a` precedes `b`.
///
/// Duplicate nodes are ignored after their first occurrence.
pub fn toposort<N>(nodes: &[N], edges: &[(N, N)]) -> Result<Vec<N>, GraphError>
where
    N: Clone + Eq + Hash + Display,
{
    let mut unique: Vec<&N> = Vec::with_capacity(nodes.len());
    let mut index: HashMap<&N, usize> = HashMap::with_capacity(nodes.len());
    for node in nodes {
        if !index.contains_key(node) {
            index.insert(node, unique.len());
            unique.push(node);
        }
    }

    let mut index_edges = Vec::with_capacity(edges.len());
    for (from, to) in edges {
        let from_idx = *index.get(from).ok_or_else(|| GraphError::UnknownNode {
            node: from.to_string(),
        })?;
        let to_idx = *index.get(to).ok_or_else(|| GraphError::UnknownNode {
            node: to.to_string(),
        })?;
        index_edges.push((from_idx, to_idx));
    }

    let order = toposort_indices(unique.len(), &index_edges).map_err(|cycle| GraphError::Cycle {
        path: cycle.iter().map(|&i| unique[i].to_string()).collect(),
    })?;
    Ok(order.into_iter().map(|i| unique[i].clone()).collect())
}

/// Index-based core of [`toposort`]. On a cycle, returns the node indices of
/// the cycle path (first node repeated at the end).
///
/// Every edge endpoint must be `< len`; [`toposort`] validates this first.
pub fn toposort_indices(len: usize, edges: &[(usize, usize)]) -> Result<Vec<usize>, Vec<usize>> {
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); len];
    for &(from, to) in edges {
        adjacency[from].push(to);
    }

    let mut marks = vec![Mark::Unvisited; len];
    let mut order = vec![0usize; len];
    let mut cursor = len;

    for root in (0..len).rev() {
        if marks[root] != Mark::Unvisited {
            continue;
        }

        // (node, number of children still to visit). Children are visited
        // last-to-first so that earlier dependents land earlier in the output.
        let mut stack: Vec<(usize, usize)> = vec![(root, adjacency[root].len())];
        marks[root] = Mark::Visiting;

        while let Some(frame) = stack.last_mut() {
            let (node, remaining) = *frame;
            if remaining == 0 {
                stack.pop();
                marks[node] = Mark::Visited;
                cursor -= 1;
                order[cursor] = node;
                continue;
            }

            frame.1 -= 1;
            let child = adjacency[node][remaining - 1];
            match marks[child] {
                Mark::Visited => {}
                Mark::Visiting => {
                    let start = stack
                        .iter()
                        .position(|&(n, _)| n == child)
                        .unwrap_or(0);
                    let mut path: Vec<usize> = stack[start..].iter().map(|&(n, _)| n).collect();
                    path.push(child);
                    return Err(path);
                }
                Mark::Unvisited => {
                    marks[child] = Mark::Visiting;
                    stack.push((child, adjacency[child].len()));
                }
            }
        }
    }

    Ok(order)
}
