//! Runs phenotype and genotype reconstructions for one association run.
//!
//! The phenotype is reconstructed once (continuous or discrete); every
//! genotype column is reconstructed as a discrete trait and its per-edge
//! transitions derived. Columns are independent: in parallel mode each one
//! gets its own RNG seeded identically, and results are collected in column
//! order, so sequential and parallel runs return the same result.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use ndarray::{Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::confidence::{
    continuous_confidence, discrete_confidence, DEFAULT_CONFIDENCE_THRESHOLD,
};
use crate::continuous::reconstruct_continuous;
use crate::discrete::{reconstruct_discrete, DiscreteConfig, ModelSelection};
use crate::edges::{edge_confidence, edge_deltas, edge_values};
use crate::error::{ReconstructionError, Result};
use crate::matrix::{binary_states, check_columns, check_rows, TraitType};
use crate::transitions::{count_transitions, identify_transitions, EdgeTransition};
use crate::tree::Tree;

/// Configuration for a reconstruction run.
#[derive(Clone, Debug)]
pub struct ReconstructionConfig {
    /// Posterior needed for a confident discrete call. Default: 0.875 (7:1)
    pub confidence_threshold: f64,
    /// Seed, root prior, model-selection and optimiser settings.
    pub discrete: DiscreteConfig,
    /// Reconstruct genotype columns on the rayon pool. Default: false
    pub parallel: bool,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            discrete: DiscreteConfig::default(),
            parallel: false,
        }
    }
}

/// Reconstruction of one trait column.
#[derive(Clone, Debug)]
pub struct Reconstruction<T> {
    /// Estimate per internal node.
    pub ancestral_states: Vec<T>,
    /// 0/1 confidence per tip and node.
    pub confidence: Vec<u8>,
    /// Parent/child value per edge.
    pub edge_values: Array2<T>,
    /// Tip values followed by `ancestral_states`.
    pub tip_and_node_states: Vec<T>,
    /// Per edge: both endpoints confident.
    pub edge_confidence: Vec<bool>,
}

impl<T: Copy> Reconstruction<T> {
    fn assemble(
        tree: &Tree,
        ancestral_states: Vec<T>,
        tip_and_node_states: Vec<T>,
        confidence: Vec<u8>,
    ) -> Result<Self> {
        let edge_values = edge_values(tree, &tip_and_node_states)?;
        let edge_confidence = edge_confidence(tree, &confidence)?;
        Ok(Reconstruction {
            ancestral_states,
            confidence,
            edge_values,
            tip_and_node_states,
            edge_confidence,
        })
    }
}

/// Binary trait reconstruction with its model-selection record.
#[derive(Clone, Debug)]
pub struct DiscreteReconstruction {
    pub reconstruction: Reconstruction<u8>,
    /// Posterior of states 0 and 1 per internal node.
    pub likelihoods: Array2<f64>,
    pub selection: ModelSelection,
}

/// Continuous trait reconstruction with its Brownian-motion fit.
#[derive(Clone, Debug)]
pub struct ContinuousReconstruction {
    pub reconstruction: Reconstruction<f64>,
    pub sigma2: f64,
    /// 95% interval per internal node.
    pub ci95: Array2<f64>,
}

/// Phenotype reconstruction and its per-edge signal.
#[derive(Clone, Debug)]
pub enum PhenotypeReconstruction {
    Continuous {
        fit: ContinuousReconstruction,
        /// |child − parent| per edge.
        deltas: Vec<f64>,
    },
    Discrete {
        fit: DiscreteReconstruction,
        transitions: Vec<EdgeTransition>,
    },
}

impl PhenotypeReconstruction {
    pub fn confidence(&self) -> &[u8] {
        match self {
            PhenotypeReconstruction::Continuous { fit, .. } => &fit.reconstruction.confidence,
            PhenotypeReconstruction::Discrete { fit, .. } => &fit.reconstruction.confidence,
        }
    }

    pub fn trait_type(&self) -> TraitType {
        match self {
            PhenotypeReconstruction::Continuous { .. } => TraitType::Continuous,
            PhenotypeReconstruction::Discrete { .. } => TraitType::Discrete,
        }
    }
}

/// Everything the association tests consume.
#[derive(Clone, Debug)]
pub struct ReconstructionSet {
    pub phenotype: PhenotypeReconstruction,
    /// One entry per genotype column, in column order.
    pub genotypes: Vec<DiscreteReconstruction>,
    /// Transition records per genotype column, aligned with the edge list.
    pub genotype_transitions: Vec<Vec<EdgeTransition>>,
}

/// Reconstruct a binary column and its confidence.
pub fn reconstruct_binary_column(
    tree: &Tree,
    states: ArrayView1<'_, u8>,
    config: &ReconstructionConfig,
) -> Result<DiscreteReconstruction> {
    let fit = reconstruct_discrete(tree, states, &config.discrete)?;
    let confidence = discrete_confidence(
        tree.n_tips(),
        fit.likelihoods.view(),
        config.confidence_threshold,
    )?;
    let reconstruction =
        Reconstruction::assemble(tree, fit.ancestral, fit.tip_and_node, confidence)?;

    Ok(DiscreteReconstruction {
        reconstruction,
        likelihoods: fit.likelihoods,
        selection: fit.selection,
    })
}

/// Reconstruct a continuous column; every node is marked confident.
pub fn reconstruct_continuous_column(
    tree: &Tree,
    values: ArrayView1<'_, f64>,
) -> Result<ContinuousReconstruction> {
    let fit = reconstruct_continuous(tree, values)?;
    let confidence = continuous_confidence(tree.n_nodes());
    let reconstruction =
        Reconstruction::assemble(tree, fit.ancestral, fit.tip_and_node, confidence)?;

    Ok(ContinuousReconstruction {
        reconstruction,
        sigma2: fit.sigma2,
        ci95: fit.ci95,
    })
}

/// Logs at 25, 50 and 75 % of a loop.
struct Progress {
    marks: [(usize, u32); 3],
    done: AtomicUsize,
}

impl Progress {
    fn new(total: usize) -> Self {
        let mark = |quarter: usize| (total * quarter).div_ceil(4).max(1);
        Progress {
            marks: [(mark(1), 25), (mark(2), 50), (mark(3), 75)],
            done: AtomicUsize::new(0),
        }
    }

    fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        for &(mark, percent) in &self.marks {
            if done == mark {
                info!("{}% of genotypes reconstructed", percent);
            }
        }
    }
}

/// Runs the reconstruction stage of an association run.
pub struct Reconstructor {
    config: ReconstructionConfig,
}

impl Reconstructor {
    pub fn new(config: ReconstructionConfig) -> Self {
        Self { config }
    }

    /// Reconstruct the phenotype and every genotype column.
    ///
    /// # Arguments
    /// * `tree` - Validated rooted tree
    /// * `phenotype` - (n_tips, 1) phenotype matrix
    /// * `genotype` - (n_tips, n_loci) binary genotype matrix
    /// * `trait_type` - Whether the phenotype is discrete or continuous
    pub fn run(
        &self,
        tree: &Tree,
        phenotype: ArrayView2<'_, f64>,
        genotype: ArrayView2<'_, u8>,
        trait_type: TraitType,
    ) -> Result<ReconstructionSet> {
        self.run_with_cancel(tree, phenotype, genotype, trait_type, &AtomicBool::new(false))
    }

    /// As [`Reconstructor::run`], checking `cancel` before every column fit.
    pub fn run_with_cancel(
        &self,
        tree: &Tree,
        phenotype: ArrayView2<'_, f64>,
        genotype: ArrayView2<'_, u8>,
        trait_type: TraitType,
        cancel: &AtomicBool,
    ) -> Result<ReconstructionSet> {
        check_columns(phenotype, "phenotype columns", 1)?;
        check_rows(tree, "phenotype rows", phenotype.nrows())?;
        check_rows(tree, "genotype rows", genotype.nrows())?;
        if genotype.ncols() == 0 {
            return Err(ReconstructionError::DimensionMismatch {
                what: "genotype columns (at least)",
                expected: 1,
                found: 0,
            });
        }

        info!(
            "Reconstructing {} phenotype and {} genotypes on {} tips",
            trait_type,
            genotype.ncols(),
            tree.n_tips()
        );

        if cancel.load(Ordering::Relaxed) {
            return Err(ReconstructionError::Cancelled);
        }
        let phenotype = self.reconstruct_phenotype(tree, phenotype.column(0), trait_type)?;

        let n_loci = genotype.ncols();
        let progress = Progress::new(n_loci);
        let column = |j: usize| -> Result<(DiscreteReconstruction, Vec<EdgeTransition>)> {
            if cancel.load(Ordering::Relaxed) {
                return Err(ReconstructionError::Cancelled);
            }
            let recon = reconstruct_binary_column(tree, genotype.column(j), &self.config)?;
            let transitions = identify_transitions(recon.reconstruction.edge_values.view())?;
            debug!(
                "genotype {}: {} selected, {} transitions",
                j,
                recon.selection.selected,
                count_transitions(&transitions)
            );
            progress.tick();
            Ok((recon, transitions))
        };

        let results: Vec<(DiscreteReconstruction, Vec<EdgeTransition>)> = if self.config.parallel {
            (0..n_loci).into_par_iter().map(column).collect::<Result<_>>()?
        } else {
            (0..n_loci).map(column).collect::<Result<_>>()?
        };
        let (genotypes, genotype_transitions): (Vec<_>, Vec<_>) = results.into_iter().unzip();

        info!("Ancestral reconstruction complete");

        Ok(ReconstructionSet {
            phenotype,
            genotypes,
            genotype_transitions,
        })
    }

    fn reconstruct_phenotype(
        &self,
        tree: &Tree,
        values: ArrayView1<'_, f64>,
        trait_type: TraitType,
    ) -> Result<PhenotypeReconstruction> {
        match trait_type {
            TraitType::Continuous => {
                let fit = reconstruct_continuous_column(tree, values)?;
                let deltas = edge_deltas(fit.reconstruction.edge_values.view());
                Ok(PhenotypeReconstruction::Continuous { fit, deltas })
            }
            TraitType::Discrete => {
                check_rows(tree, "phenotype rows", values.len())?;
                let states = ndarray::Array1::from(binary_states(values)?);
                let fit = reconstruct_binary_column(tree, states.view(), &self.config)?;
                let transitions = identify_transitions(fit.reconstruction.edge_values.view())?;
                Ok(PhenotypeReconstruction::Discrete { fit, transitions })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discrete::RateModel;
    use crate::transitions::Direction;
    use crate::tree::tests::{eight_tip_tree, seven_tip_tree};
    use ndarray::{array, Array2};

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
            .with_test_writer()
            .try_init();
    }

    #[test]
    fn test_identical_genotype_mirrors_phenotype() {
        init_tracing();
        let tree = seven_tip_tree();
        let pheno = array![[0.0], [0.0], [1.0], [1.0], [1.0], [1.0], [0.0]];
        let geno = array![[0u8], [0], [1], [1], [1], [1], [0]];

        let result = Reconstructor::new(ReconstructionConfig::default())
            .run(&tree, pheno.view(), geno.view(), TraitType::Discrete)
            .unwrap();

        let pheno_trans = match &result.phenotype {
            PhenotypeReconstruction::Discrete { transitions, .. } => transitions.clone(),
            PhenotypeReconstruction::Continuous { .. } => panic!("expected discrete phenotype"),
        };
        let geno_trans = &result.genotype_transitions[0];

        assert_eq!(geno_trans.len(), tree.n_edges());
        for (p, g) in pheno_trans.iter().zip(geno_trans) {
            if p.changed {
                assert!(g.changed);
            }
        }
        let dirs = |t: &[EdgeTransition]| t.iter().map(|x| x.direction).collect::<Vec<_>>();
        assert_eq!(dirs(&pheno_trans), dirs(geno_trans));
    }

    #[test]
    fn test_degenerate_genotype_has_no_transitions() {
        let tree = seven_tip_tree();
        let pheno = array![[0.0], [1.0], [1.0], [0.0], [1.0], [0.0], [1.0]];
        let geno = Array2::from_shape_fn((7, 2), |(_, j)| j as u8);

        let result = Reconstructor::new(ReconstructionConfig::default())
            .run(&tree, pheno.view(), geno.view(), TraitType::Discrete)
            .unwrap();

        for (recon, trans) in result.genotypes.iter().zip(&result.genotype_transitions) {
            assert_eq!(count_transitions(trans), 0);
            assert!(trans.iter().all(|t| t.direction == Direction::Unchanged));
            assert_eq!(recon.selection.selected, RateModel::EqualRates);
        }
    }

    #[test]
    fn test_continuous_phenotype_fully_confident() {
        let tree = eight_tip_tree();
        let pheno = array![[1.5], [-2.0], [0.3], [8.8], [4.1], [0.0], [2.2], [-0.7]];
        let geno = array![[0u8], [1], [1], [0], [1], [1], [0], [0]];

        let result = Reconstructor::new(ReconstructionConfig::default())
            .run(&tree, pheno.view(), geno.view(), TraitType::Continuous)
            .unwrap();

        assert_eq!(result.phenotype.trait_type(), TraitType::Continuous);
        assert_eq!(result.phenotype.confidence(), vec![1u8; tree.n_nodes()].as_slice());
        match &result.phenotype {
            PhenotypeReconstruction::Continuous { fit, deltas } => {
                assert_eq!(deltas.len(), tree.n_edges());
                assert_eq!(
                    &fit.reconstruction.tip_and_node_states[..8],
                    pheno.column(0).to_vec().as_slice()
                );
            }
            PhenotypeReconstruction::Discrete { .. } => panic!("expected continuous phenotype"),
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let tree = eight_tip_tree();
        let pheno = array![[0.0], [1.0], [1.0], [0.0], [1.0], [1.0], [0.0], [0.0]];
        let geno = array![
            [0u8, 1, 0, 1],
            [1, 1, 0, 0],
            [1, 0, 0, 1],
            [0, 0, 1, 1],
            [1, 1, 1, 0],
            [1, 0, 1, 0],
            [0, 1, 1, 1],
            [0, 0, 0, 1]
        ];

        let sequential = Reconstructor::new(ReconstructionConfig::default())
            .run(&tree, pheno.view(), geno.view(), TraitType::Discrete)
            .unwrap();
        let parallel = Reconstructor::new(ReconstructionConfig {
            parallel: true,
            ..Default::default()
        })
        .run(&tree, pheno.view(), geno.view(), TraitType::Discrete)
        .unwrap();

        assert_eq!(sequential.genotype_transitions, parallel.genotype_transitions);
        for (a, b) in sequential.genotypes.iter().zip(&parallel.genotypes) {
            assert_eq!(a.reconstruction.tip_and_node_states, b.reconstruction.tip_and_node_states);
            assert_eq!(a.selection, b.selection);
        }
    }

    #[test]
    fn test_rejects_multi_column_phenotype() {
        let tree = seven_tip_tree();
        let pheno = Array2::<f64>::zeros((7, 2));
        let geno = Array2::<u8>::zeros((7, 1));
        let err = Reconstructor::new(ReconstructionConfig::default())
            .run(&tree, pheno.view(), geno.view(), TraitType::Continuous)
            .unwrap_err();
        assert!(matches!(err, ReconstructionError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_bad_genotype_aborts_run() {
        let tree = seven_tip_tree();
        let pheno = Array2::<f64>::zeros((7, 1));
        let mut geno = Array2::<u8>::zeros((7, 3));
        geno[[4, 2]] = 3;
        let err = Reconstructor::new(ReconstructionConfig::default())
            .run(&tree, pheno.view(), geno.view(), TraitType::Continuous)
            .unwrap_err();
        assert!(matches!(err, ReconstructionError::InvalidTrait(_)));
    }

    #[test]
    fn test_cancelled_before_start() {
        let tree = seven_tip_tree();
        let pheno = Array2::<f64>::zeros((7, 1));
        let geno = Array2::<u8>::zeros((7, 1));
        let err = Reconstructor::new(ReconstructionConfig::default())
            .run_with_cancel(
                &tree,
                pheno.view(),
                geno.view(),
                TraitType::Continuous,
                &AtomicBool::new(true),
            )
            .unwrap_err();
        assert_eq!(err, ReconstructionError::Cancelled);
    }

    #[test]
    fn test_progress_marks() {
        let p = Progress::new(8);
        assert_eq!(p.marks.map(|(m, _)| m), [2, 4, 6]);
        let p = Progress::new(1);
        assert_eq!(p.marks.map(|(m, _)| m), [1, 1, 1]);
    }
}

#[cfg(test)]
mod proptests {
    use super::{reconstruct_binary_column, ReconstructionConfig};
    use crate::transitions::{identify_transitions, Direction};
    use crate::tree::tests::eight_tip_tree;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_binary_reconstruction_invariants(tips in proptest::collection::vec(0u8..=1, 8)) {
            let tree = eight_tip_tree();
            let states = ndarray::Array1::from(tips.clone());
            let config = ReconstructionConfig::default();
            let recon = reconstruct_binary_column(&tree, states.view(), &config).unwrap();
            let r = &recon.reconstruction;

            prop_assert_eq!(r.tip_and_node_states.len(), tree.n_nodes());
            prop_assert_eq!(&r.tip_and_node_states[..8], tips.as_slice());
            prop_assert!(r.confidence.iter().all(|&c| c <= 1));
            prop_assert_eq!(r.edge_values.nrows(), tree.n_edges());

            let trans = identify_transitions(r.edge_values.view()).unwrap();
            for (e, t) in trans.iter().enumerate() {
                let parent = r.tip_and_node_states[tree.edge_parent()[e]];
                let child = r.tip_and_node_states[tree.edge_child()[e]];
                prop_assert_eq!(t.changed, parent != child);
                prop_assert_eq!(t.direction == Direction::Unchanged, !t.changed);
            }
        }
    }
}
