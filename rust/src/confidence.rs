//! Binary high/low confidence labels for reconstructed nodes.

use ndarray::ArrayView2;

use crate::error::{ReconstructionError, Result};

/// Posterior needed for a confident call: a 7:1 likelihood ratio.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.875;

/// Continuous traits: every tip and node is marked confident.
///
/// The Brownian-motion fit only yields symmetric intervals, which carry no
/// per-node information, so no node is ever flagged.
pub fn continuous_confidence(n_nodes: usize) -> Vec<u8> {
    vec![1; n_nodes]
}

/// Discrete traits: tips are confident; an internal node is confident when
/// its largest state posterior reaches `threshold`.
///
/// # Arguments
/// * `n_tips` - Number of tips; every tip is marked confident (1)
/// * `likelihoods` - Per-state posterior per internal node
/// * `threshold` - Cutoff in (0, 1)
pub fn discrete_confidence(
    n_tips: usize,
    likelihoods: ArrayView2<'_, f64>,
    threshold: f64,
) -> Result<Vec<u8>> {
    if !(threshold > 0.0 && threshold < 1.0) {
        return Err(ReconstructionError::InvalidTrait(format!(
            "confidence threshold {} outside (0, 1)",
            threshold
        )));
    }

    let mut confidence = vec![1; n_tips];
    confidence.extend(likelihoods.rows().into_iter().map(|row| {
        let best = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        u8::from(best >= threshold)
    }));
    Ok(confidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_default_is_seven_to_one() {
        assert_eq!(DEFAULT_CONFIDENCE_THRESHOLD / (1.0 - DEFAULT_CONFIDENCE_THRESHOLD), 7.0);
    }

    #[test]
    fn test_continuous_all_confident() {
        assert_eq!(continuous_confidence(5), vec![1, 1, 1, 1, 1]);
    }

    #[test]
    fn test_discrete_cutoff() {
        let liks = array![[0.9, 0.1], [0.5, 0.5], [0.125, 0.875], [0.2, 0.8]];
        let conf = discrete_confidence(3, liks.view(), DEFAULT_CONFIDENCE_THRESHOLD).unwrap();

        assert_eq!(conf, vec![1, 1, 1, 1, 0, 1, 0]);
    }

    #[test]
    fn test_threshold_range() {
        let liks = array![[0.9, 0.1]];
        assert!(discrete_confidence(1, liks.view(), 1.0).is_err());
        assert!(discrete_confidence(1, liks.view(), 0.0).is_err());
        assert!(discrete_confidence(1, liks.view(), f64::NAN).is_err());
    }
}
