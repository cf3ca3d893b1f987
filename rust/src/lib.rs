//! Ancestral state reconstruction for phylogenetically corrected bacterial GWAS.
//!
//! Infers trait values at every internal node of a rooted tree from values
//! observed at the tips, for one phenotype and many binary genotype loci:
//! - Continuous traits: Brownian-motion (REML) reconstruction
//! - Discrete traits: ER vs ARD rate models with LRT + AIC selection
//! - Per-node confidence, per-edge values and per-edge transitions
//!
//! Node ids are 0-based: tips first in tip order, then internal nodes.
//! Edge-indexed outputs follow the tree's native edge order.

pub mod confidence;
pub mod continuous;
pub mod discrete;
pub mod edges;
pub mod error;
pub mod matrix;
pub mod orchestrator;
pub mod transitions;
pub mod tree;

#[cfg(feature = "python")]
mod python;

pub use confidence::{continuous_confidence, discrete_confidence, DEFAULT_CONFIDENCE_THRESHOLD};
pub use continuous::{reconstruct_continuous, ContinuousFit};
pub use discrete::{
    reconstruct_discrete, DiscreteConfig, DiscreteFit, FitOutcome, ModelSelection, RateModel,
    Rates, RootPrior, SelectionConfig,
};
pub use edges::{edge_confidence, edge_deltas, edge_values};
pub use error::{ReconstructionError, Result};
pub use matrix::TraitType;
pub use orchestrator::{
    ContinuousReconstruction, DiscreteReconstruction, PhenotypeReconstruction, Reconstruction,
    ReconstructionConfig, ReconstructionSet, Reconstructor,
};
pub use transitions::{identify_transitions, Direction, EdgeTransition};
pub use tree::Tree;
