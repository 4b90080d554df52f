//! Topological ordering of workflow nodes (Kahn's algorithm)

use crate::config::{Connection, Node};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use thiserror::Error;

/// Errors produced while ordering a graph
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SortError {
    #[error("workflow graph contains a cycle involving nodes {nodes:?}")]
    CycleDetected { nodes: Vec<String> },

    #[error("duplicate node id '{0}'")]
    DuplicateNode(String),

    #[error("connection {from} -> {to} references unknown node '{missing}'")]
    UnknownEndpoint {
        from: String,
        to: String,
        missing: String,
    },
}

/// Order nodes so that every connection's source precedes its target.
///
/// Returns indices into `nodes`. When several nodes are ready at once, the
/// one declared first wins, so the same graph always yields the same order.
pub fn topological_order(
    nodes: &[Node],
    connections: &[Connection],
) -> Result<Vec<usize>, SortError> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        if index.insert(node.id.as_str(), i).is_some() {
            return Err(SortError::DuplicateNode(node.id.clone()));
        }
    }

    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut in_degree: Vec<usize> = vec![0; nodes.len()];

    for conn in connections {
        let lookup = |id: &str| {
            index.get(id).copied().ok_or_else(|| SortError::UnknownEndpoint {
                from: conn.from.clone(),
                to: conn.to.clone(),
                missing: id.to_string(),
            })
        };
        let from = lookup(&conn.from)?;
        let to = lookup(&conn.to)?;
        outgoing[from].push(to);
        in_degree[to] += 1;
    }

    // Min-heap on declaration index
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(nodes.len());

    while let Some(Reverse(current)) = ready.pop() {
        order.push(current);
        for &next in &outgoing[current] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    if order.len() != nodes.len() {
        let residual = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d > 0)
            .map(|(i, _)| nodes[i].id.clone())
            .collect();
        return Err(SortError::CycleDetected { nodes: residual });
    }

    Ok(order)
}

/// Same as [`topological_order`] but returns the nodes themselves
pub fn sort_nodes(nodes: &[Node], connections: &[Connection]) -> Result<Vec<Node>, SortError> {
    let order = topological_order(nodes, connections)?;
    Ok(order.into_iter().map(|i| nodes[i].clone()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(ids: &[&str]) -> Vec<Node> {
        ids.iter().map(|id| Node::new(*id, "initial")).collect()
    }

    fn edges(pairs: &[(&str, &str)]) -> Vec<Connection> {
        pairs.iter().map(|(f, t)| Connection::new(*f, *t)).collect()
    }

    fn ids(nodes: &[Node], order: &[usize]) -> Vec<String> {
        order.iter().map(|i| nodes[*i].id.clone()).collect()
    }

    #[test]
    fn test_linear_chain() {
        let n = nodes(&["a", "b", "c"]);
        let order = topological_order(&n, &edges(&[("a", "b"), ("b", "c")])).unwrap();
        assert_eq!(ids(&n, &order), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_edges_override_declaration_order() {
        let n = nodes(&["b", "a"]);
        let order = topological_order(&n, &edges(&[("a", "b")])).unwrap();
        assert_eq!(ids(&n, &order), vec!["a", "b"]);
    }

    #[test]
    fn test_diamond_ties_follow_declaration_order() {
        // A -> C, B -> C
        let n = nodes(&["a", "b", "c"]);
        let order = topological_order(&n, &edges(&[("a", "c"), ("b", "c")])).unwrap();
        assert_eq!(ids(&n, &order), vec!["a", "b", "c"]);

        let n = nodes(&["b", "a", "c"]);
        let order = topological_order(&n, &edges(&[("a", "c"), ("b", "c")])).unwrap();
        assert_eq!(ids(&n, &order), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_ready_node_released_late_still_uses_declaration_index() {
        // x is released by a, but y (declared before x) is ready from the start.
        let n = nodes(&["a", "y", "x"]);
        let order = topological_order(&n, &edges(&[("a", "x")])).unwrap();
        assert_eq!(ids(&n, &order), vec!["a", "y", "x"]);
    }

    #[test]
    fn test_two_node_cycle() {
        let n = nodes(&["a", "b"]);
        let err = topological_order(&n, &edges(&[("a", "b"), ("b", "a")])).unwrap_err();
        assert_eq!(
            err,
            SortError::CycleDetected {
                nodes: vec!["a".into(), "b".into()]
            }
        );
    }

    #[test]
    fn test_cycle_names_only_residual_nodes() {
        // root -> a -> b -> c -> a ; root is orderable, the rest is not
        let n = nodes(&["root", "a", "b", "c", "free"]);
        let err = topological_order(
            &n,
            &edges(&[("root", "a"), ("a", "b"), ("b", "c"), ("c", "a")]),
        )
        .unwrap_err();
        assert_eq!(
            err,
            SortError::CycleDetected {
                nodes: vec!["a".into(), "b".into(), "c".into()]
            }
        );
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let n = nodes(&["a"]);
        assert!(matches!(
            topological_order(&n, &edges(&[("a", "a")])),
            Err(SortError::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_duplicate_edges() {
        let n = nodes(&["a", "b"]);
        let order = topological_order(&n, &edges(&[("a", "b"), ("a", "b")])).unwrap();
        assert_eq!(ids(&n, &order), vec!["a", "b"]);
    }

    #[test]
    fn test_unknown_endpoint() {
        let n = nodes(&["a"]);
        let err = topological_order(&n, &edges(&[("a", "ghost")])).unwrap_err();
        assert!(matches!(err, SortError::UnknownEndpoint { missing, .. } if missing == "ghost"));
    }

    #[test]
    fn test_duplicate_node() {
        let n = nodes(&["a", "a"]);
        assert_eq!(
            topological_order(&n, &[]).unwrap_err(),
            SortError::DuplicateNode("a".into())
        );
    }

    #[test]
    fn test_empty_graph() {
        assert!(topological_order(&[], &[]).unwrap().is_empty());
    }

    #[test]
    fn test_order_respects_every_edge_on_generated_dags() {
        // Deterministic pseudo-random DAGs: edges only go from lower to higher
        // "rank", and declaration order is shuffled.
        let mut seed: u64 = 0x5eed;
        let mut next = || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) as usize
        };

        for _ in 0..200 {
            let count = 1 + next() % 12;
            let ranked: Vec<String> = (0..count).map(|i| format!("n{}", i)).collect();

            let mut declared = ranked.clone();
            for i in (1..declared.len()).rev() {
                let j = next() % (i + 1);
                declared.swap(i, j);
            }

            let mut conns = Vec::new();
            for i in 0..count {
                for j in (i + 1)..count {
                    if next() % 3 == 0 {
                        conns.push(Connection::new(ranked[i].clone(), ranked[j].clone()));
                    }
                }
            }

            let n: Vec<Node> = declared.iter().map(|id| Node::new(id.clone(), "initial")).collect();
            let sorted = sort_nodes(&n, &conns).unwrap();
            assert_eq!(sorted.len(), count);

            let position: HashMap<&str, usize> = sorted
                .iter()
                .enumerate()
                .map(|(i, node)| (node.id.as_str(), i))
                .collect();
            for c in &conns {
                assert!(position[c.from.as_str()] < position[c.to.as_str()]);
            }
        }
    }
}
