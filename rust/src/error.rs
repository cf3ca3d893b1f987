//! Error types for ancestral state reconstruction.

use thiserror::Error;

/// Errors raised while reconstructing a trait column.
///
/// All variants are unrecoverable for the affected column. A failure in any
/// column aborts the whole run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconstructionError {
    #[error("Invalid tree: {0}")]
    InvalidTree(String),

    #[error("Dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Invalid trait: {0}")]
    InvalidTrait(String),

    #[error("Model fit failed: {0}")]
    ModelFit(String),

    #[error("Reconstruction cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ReconstructionError>;
