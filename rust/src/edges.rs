//! Node-indexed values reshaped onto the tree's edges.
//!
//! Row `e` of every output corresponds to edge `e` of the tree's native
//! edge order; no edge is ever reordered.

use ndarray::{Array2, ArrayView2};

use crate::error::{ReconstructionError, Result};
use crate::tree::Tree;

fn check_node_vector(tree: &Tree, what: &'static str, len: usize) -> Result<()> {
    if len != tree.n_nodes() {
        return Err(ReconstructionError::DimensionMismatch {
            what,
            expected: tree.n_nodes(),
            found: len,
        });
    }
    Ok(())
}

/// Parent (column 0) and child (column 1) value for every edge.
pub fn edge_values<T: Copy>(tree: &Tree, tip_and_node: &[T]) -> Result<Array2<T>> {
    check_node_vector(tree, "tip+node state vector", tip_and_node.len())?;

    let parents = tree.edge_parent();
    let children = tree.edge_child();
    Ok(Array2::from_shape_fn((tree.n_edges(), 2), |(edge, col)| {
        if col == 0 {
            tip_and_node[parents[edge]]
        } else {
            tip_and_node[children[edge]]
        }
    }))
}

/// An edge is high confidence when both of its endpoints are.
pub fn edge_confidence(tree: &Tree, confidence: &[u8]) -> Result<Vec<bool>> {
    check_node_vector(tree, "confidence vector", confidence.len())?;

    Ok(tree
        .edge_parent()
        .iter()
        .zip(tree.edge_child())
        .map(|(&p, &c)| confidence[p] == 1 && confidence[c] == 1)
        .collect())
}

/// Absolute change |child − parent| along every edge.
pub fn edge_deltas(edge_values: ArrayView2<'_, f64>) -> Vec<f64> {
    edge_values
        .rows()
        .into_iter()
        .map(|row| (row[1] - row[0]).abs())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::tests::eight_tip_tree;

    #[test]
    fn test_edge_values_follow_edge_list() {
        let tree = eight_tip_tree();
        let states: Vec<u32> = (0..tree.n_nodes() as u32).map(|n| n * 10).collect();
        let values = edge_values(&tree, &states).unwrap();

        assert_eq!(values.nrows(), tree.n_edges());
        for e in 0..tree.n_edges() {
            assert_eq!(values[[e, 0]], states[tree.edge_parent()[e]]);
            assert_eq!(values[[e, 1]], states[tree.edge_child()[e]]);
        }
        // Re-deriving gives the same matrix.
        assert_eq!(values, edge_values(&tree, &states).unwrap());
    }

    #[test]
    fn test_edge_values_length_check() {
        let tree = eight_tip_tree();
        let err = edge_values(&tree, &[0u8; 8]).unwrap_err();
        assert!(matches!(err, ReconstructionError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_edge_confidence() {
        let tree = eight_tip_tree();
        let mut conf = vec![1u8; tree.n_nodes()];
        conf[11] = 0;
        let edges = edge_confidence(&tree, &conf).unwrap();

        for e in 0..tree.n_edges() {
            let touches = tree.edge_parent()[e] == 11 || tree.edge_child()[e] == 11;
            assert_eq!(edges[e], !touches);
        }
    }

    #[test]
    fn test_edge_deltas() {
        let values = ndarray::array![[1.0, 3.5], [2.0, 0.5], [4.0, 4.0]];
        assert_eq!(edge_deltas(values.view()), vec![2.5, 1.5, 0.0]);
    }
}
