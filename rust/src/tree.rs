//! Rooted phylogenetic tree shared by every reconstruction in a run.
//!
//! Nodes are indexed 0..n_nodes with tips first (in tip order), then
//! internal nodes. Topology is held as parallel edge arrays in the tree's
//! native edge order; children lists and traversal orders are derived once.

use crate::error::{ReconstructionError, Result};

#[derive(Debug, Clone)]
pub struct Tree {
    n_tips: usize,
    n_nodes: usize,
    edge_parent: Vec<usize>,
    edge_child: Vec<usize>,
    edge_length: Vec<f64>,
    children: Vec<Vec<usize>>,
    parent_edge: Vec<Option<usize>>,
    root_index: usize,
    post_order: Vec<usize>,
}

impl Tree {
    /// Build a tree from an edge list.
    ///
    /// # Arguments
    /// * `edge_parent` - Parent node of each edge
    /// * `edge_child` - Child node of each edge
    /// * `edge_length` - Branch length of each edge
    /// * `n_tips` - Number of tip nodes (ids `0..n_tips`)
    pub fn from_edges(
        edge_parent: Vec<usize>,
        edge_child: Vec<usize>,
        edge_length: Vec<f64>,
        n_tips: usize,
    ) -> Result<Self> {
        let n_edges = edge_parent.len();
        if edge_child.len() != n_edges {
            return Err(ReconstructionError::DimensionMismatch {
                what: "edge child array",
                expected: n_edges,
                found: edge_child.len(),
            });
        }
        if edge_length.len() != n_edges {
            return Err(ReconstructionError::DimensionMismatch {
                what: "edge length array",
                expected: n_edges,
                found: edge_length.len(),
            });
        }
        if n_tips < 2 {
            return Err(invalid(format!("need at least 2 tips, got {}", n_tips)));
        }

        let n_nodes = n_edges + 1;
        if n_nodes <= n_tips {
            return Err(invalid(format!(
                "{} edges cannot connect {} tips to any internal node",
                n_edges, n_tips
            )));
        }

        let mut children = vec![Vec::new(); n_nodes];
        let mut parent_edge = vec![None; n_nodes];
        for (edge, (&parent, &child)) in edge_parent.iter().zip(&edge_child).enumerate() {
            if parent >= n_nodes || child >= n_nodes {
                return Err(invalid(format!(
                    "edge {} references node outside 0..{}",
                    edge, n_nodes
                )));
            }
            if parent_edge[child].replace(edge).is_some() {
                return Err(invalid(format!("node {} has more than one parent", child)));
            }
            children[parent].push(child);
        }

        for (edge, &length) in edge_length.iter().enumerate() {
            if !length.is_finite() || length < 0.0 {
                return Err(invalid(format!(
                    "edge {} has invalid branch length {}",
                    edge, length
                )));
            }
        }

        let mut roots = (0..n_nodes).filter(|&node| parent_edge[node].is_none());
        let root_index = roots
            .next()
            .ok_or_else(|| invalid("no root node found (every node has a parent)".to_string()))?;
        if roots.next().is_some() {
            return Err(invalid("tree is not rooted: more than one parentless node".to_string()));
        }

        for (node, kids) in children.iter().enumerate() {
            if node < n_tips && !kids.is_empty() {
                return Err(invalid(format!("tip {} has children", node)));
            }
            if node >= n_tips && kids.len() < 2 {
                return Err(invalid(format!(
                    "internal node {} has {} children; tree must be fully resolved",
                    node,
                    kids.len()
                )));
            }
        }

        let post_order = post_order_from(root_index, &children);
        if post_order.len() != n_nodes {
            return Err(invalid(format!(
                "only {} of {} nodes reachable from root",
                post_order.len(),
                n_nodes
            )));
        }

        Ok(Tree {
            n_tips,
            n_nodes,
            edge_parent,
            edge_child,
            edge_length,
            children,
            parent_edge,
            root_index,
            post_order,
        })
    }

    /// Build tree from per-node structure arrays.
    ///
    /// # Arguments
    /// * `parent_indices` - Parent index for each node (-1 for root)
    /// * `branch_lengths` - Branch length above each node
    /// * `n_tips` - Number of tip nodes
    ///
    /// Edges are laid out in node order, skipping the root.
    pub fn from_structure(
        parent_indices: Vec<i32>,
        branch_lengths: Vec<f64>,
        n_tips: usize,
    ) -> Result<Self> {
        if branch_lengths.len() != parent_indices.len() {
            return Err(ReconstructionError::DimensionMismatch {
                what: "branch lengths",
                expected: parent_indices.len(),
                found: branch_lengths.len(),
            });
        }

        let mut edge_parent = Vec::with_capacity(parent_indices.len());
        let mut edge_child = Vec::with_capacity(parent_indices.len());
        let mut edge_length = Vec::with_capacity(parent_indices.len());
        for (node, &parent) in parent_indices.iter().enumerate() {
            if parent < 0 {
                continue;
            }
            edge_parent.push(parent as usize);
            edge_child.push(node);
            edge_length.push(branch_lengths[node]);
        }

        Self::from_edges(edge_parent, edge_child, edge_length, n_tips)
    }

    pub fn n_tips(&self) -> usize {
        self.n_tips
    }

    pub fn n_internal(&self) -> usize {
        self.n_nodes - self.n_tips
    }

    pub fn n_nodes(&self) -> usize {
        self.n_nodes
    }

    pub fn n_edges(&self) -> usize {
        self.edge_parent.len()
    }

    pub fn root(&self) -> usize {
        self.root_index
    }

    pub fn is_tip(&self, node: usize) -> bool {
        node < self.n_tips
    }

    pub fn edge_parent(&self) -> &[usize] {
        &self.edge_parent
    }

    pub fn edge_child(&self) -> &[usize] {
        &self.edge_child
    }

    pub fn edge_length(&self) -> &[f64] {
        &self.edge_length
    }

    pub fn children(&self, node: usize) -> &[usize] {
        &self.children[node]
    }

    pub fn parent(&self, node: usize) -> Option<usize> {
        self.parent_edge[node].map(|edge| self.edge_parent[edge])
    }

    /// Length of the branch leading into `node` (0 for the root).
    pub fn branch_length(&self, node: usize) -> f64 {
        self.parent_edge[node]
            .map(|edge| self.edge_length[edge])
            .unwrap_or(0.0)
    }

    /// Post-order traversal of nodes (tips to root).
    pub fn post_order(&self) -> &[usize] {
        &self.post_order
    }

    /// Pre-order traversal (root first, every parent before its children).
    pub fn pre_order(&self) -> impl Iterator<Item = usize> + '_ {
        self.post_order.iter().rev().copied()
    }
}

fn invalid(msg: String) -> ReconstructionError {
    ReconstructionError::InvalidTree(msg)
}

fn post_order_from(root: usize, children: &[Vec<usize>]) -> Vec<usize> {
    let mut order = Vec::with_capacity(children.len());
    let mut visited = vec![false; children.len()];
    // (node, children already pushed)
    let mut stack = vec![(root, false)];

    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            order.push(node);
            continue;
        }
        if visited[node] {
            continue;
        }
        visited[node] = true;
        stack.push((node, true));
        for &child in children[node].iter().rev() {
            if !visited[child] {
                stack.push((child, false));
            }
        }
    }

    order
}
