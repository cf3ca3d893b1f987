//! Per-edge state transitions for discrete traits.
//!
//! State 0 is always the lower ("absent") state: 0→1 along an edge is an
//! increase, 1→0 a decrease.

use ndarray::ArrayView2;

use crate::error::{ReconstructionError, Result};

/// Direction of change from parent to child.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Decrease,
    Unchanged,
    Increase,
}

impl Direction {
    /// -1, 0 or +1.
    pub fn as_i8(self) -> i8 {
        match self {
            Direction::Decrease => -1,
            Direction::Unchanged => 0,
            Direction::Increase => 1,
        }
    }
}

/// Whether an edge carries a state change, and which way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EdgeTransition {
    pub changed: bool,
    pub direction: Direction,
}

impl EdgeTransition {
    pub fn between(parent: u8, child: u8) -> Self {
        let direction = match child.cmp(&parent) {
            std::cmp::Ordering::Greater => Direction::Increase,
            std::cmp::Ordering::Less => Direction::Decrease,
            std::cmp::Ordering::Equal => Direction::Unchanged,
        };
        EdgeTransition {
            changed: direction != Direction::Unchanged,
            direction,
        }
    }
}

/// Classify every edge of a parent/child state matrix.
pub fn identify_transitions(edge_values: ArrayView2<'_, u8>) -> Result<Vec<EdgeTransition>> {
    if edge_values.ncols() != 2 {
        return Err(ReconstructionError::DimensionMismatch {
            what: "edge value columns",
            expected: 2,
            found: edge_values.ncols(),
        });
    }

    Ok(edge_values
        .rows()
        .into_iter()
        .map(|row| EdgeTransition::between(row[0], row[1]))
        .collect())
}

/// Number of edges with a state change.
pub fn count_transitions(transitions: &[EdgeTransition]) -> usize {
    transitions.iter().filter(|t| t.changed).count()
}
