use std::collections::VecDeque;

use crate::error::GraphError;
use crate::ids::NodeIndex;

/// Kahn ordering over `num_nodes` nodes with `(source, target)` edges.
/// Sources come before the nodes they feed.
pub(crate) fn topo_order(
    num_nodes: usize,
    edges: &[(NodeIndex, NodeIndex)],
) -> Result<Vec<NodeIndex>, GraphError> {
    let mut indeg = vec![0usize; num_nodes];
    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); num_nodes];

    for &(src, dst) in edges {
        adj[src.index()].push(dst.index());
        indeg[dst.index()] += 1;
    }

    let mut q: VecDeque<usize> = indeg
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(i, _)| i)
        .collect();

    let mut order = Vec::with_capacity(num_nodes);
    while let Some(u) = q.pop_front() {
        order.push(NodeIndex(u as u32));
        for &v in &adj[u] {
            indeg[v] -= 1;
            if indeg[v] == 0 {
                q.push_back(v);
            }
        }
    }

    if order.len() != num_nodes {
        return Err(GraphError::CycleDetected);
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_topo() {
        let order = topo_order(3, &[(NodeIndex(2), NodeIndex(0)), (NodeIndex(0), NodeIndex(1))]).unwrap();
        assert_eq!(order, vec![NodeIndex(2), NodeIndex(0), NodeIndex(1)]);
    }

    #[test]
    fn cycle_is_rejected() {
        let err = topo_order(2, &[(NodeIndex(0), NodeIndex(1)), (NodeIndex(1), NodeIndex(0))]);
        assert_eq!(err, Err(GraphError::CycleDetected));
    }
}
