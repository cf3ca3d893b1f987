//! Trait matrices aligned to tree tips.
//!
//! Rows follow tree tip order exactly; the correspondence is positional.

use std::fmt;
use std::str::FromStr;

use ndarray::{ArrayView1, ArrayView2};

use crate::error::{ReconstructionError, Result};
use crate::tree::Tree;

/// Discrete-or-continuous classification of a phenotype.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraitType {
    Discrete,
    Continuous,
}

impl FromStr for TraitType {
    type Err = ReconstructionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discrete" => Ok(TraitType::Discrete),
            "continuous" => Ok(TraitType::Continuous),
            other => Err(ReconstructionError::InvalidTrait(format!(
                "unknown trait type '{}', expected 'discrete' or 'continuous'",
                other
            ))),
        }
    }
}

impl fmt::Display for TraitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraitType::Discrete => write!(f, "discrete"),
            TraitType::Continuous => write!(f, "continuous"),
        }
    }
}

/// Check that a tip-aligned vector or matrix has one row per tip.
pub fn check_rows(tree: &Tree, what: &'static str, rows: usize) -> Result<()> {
    if rows != tree.n_tips() {
        return Err(ReconstructionError::DimensionMismatch {
            what,
            expected: tree.n_tips(),
            found: rows,
        });
    }
    Ok(())
}

/// Check that a matrix has exactly `expected` columns.
pub fn check_columns<T>(
    matrix: ArrayView2<'_, T>,
    what: &'static str,
    expected: usize,
) -> Result<()> {
    if matrix.ncols() != expected {
        return Err(ReconstructionError::DimensionMismatch {
            what,
            expected,
            found: matrix.ncols(),
        });
    }
    Ok(())
}

/// Convert tip values to binary states, rejecting anything but 0 and 1.
pub fn binary_states(values: ArrayView1<'_, f64>) -> Result<Vec<u8>> {
    values
        .iter()
        .enumerate()
        .map(|(tip, &v)| {
            if v == 0.0 {
                Ok(0)
            } else if v == 1.0 {
                Ok(1)
            } else {
                Err(ReconstructionError::InvalidTrait(format!(
                    "tip {} has value {}; binary trait must be 0 or 1",
                    tip, v
                )))
            }
        })
        .collect()
}

/// Validate an integer-coded binary column.
pub fn check_binary(values: ArrayView1<'_, u8>) -> Result<Vec<u8>> {
    values
        .iter()
        .enumerate()
        .map(|(tip, &v)| match v {
            0 | 1 => Ok(v),
            _ => Err(ReconstructionError::InvalidTrait(format!(
                "tip {} has value {}; binary trait must be 0 or 1",
                tip, v
            ))),
        })
        .collect()
}

/// Copy tip values, rejecting NaN and infinities.
pub fn finite_values(values: ArrayView1<'_, f64>) -> Result<Vec<f64>> {
    values
        .iter()
        .enumerate()
        .map(|(tip, &v)| {
            if v.is_finite() {
                Ok(v)
            } else {
                Err(ReconstructionError::InvalidTrait(format!(
                    "tip {} has non-finite value {}",
                    tip, v
                )))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_trait_type_parsing() {
        assert_eq!("discrete".parse::<TraitType>().unwrap(), TraitType::Discrete);
        assert_eq!(" Continuous ".parse::<TraitType>().unwrap(), TraitType::Continuous);
        assert!(matches!(
            "ordinal".parse::<TraitType>(),
            Err(ReconstructionError::InvalidTrait(_))
        ));
    }

    #[test]
    fn test_binary_states() {
        let values = array![0.0, 1.0, 1.0, 0.0];
        assert_eq!(binary_states(values.view()).unwrap(), vec![0, 1, 1, 0]);

        let bad = array![0.0, 0.5];
        assert!(matches!(
            binary_states(bad.view()),
            Err(ReconstructionError::InvalidTrait(_))
        ));
    }

    #[test]
    fn test_check_binary_rejects_two() {
        let values = array![0u8, 2, 1];
        assert!(check_binary(values.view()).is_err());
    }

    #[test]
    fn test_finite_values() {
        let bad = array![1.0, f64::NAN];
        assert!(finite_values(bad.view()).is_err());
    }
}
