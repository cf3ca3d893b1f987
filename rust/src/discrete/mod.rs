//! Discrete (binary) ancestral reconstruction with model selection.
//!
//! Two rate models are fitted by maximum likelihood:
//! - Equal rates (ER): one rate for 0→1 and 1→0
//! - All rates different (ARD): independent gain and loss rates
//!
//! The ARD model replaces ER only when a likelihood-ratio test is
//! significant *and* its AIC improvement exceeds a margin. Marginal
//! posteriors under the selected model give the per-node state likelihoods
//! and the maximum-likelihood state of every internal node.

pub mod optim;
pub mod pruning;

use std::fmt;

use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::SeedableRng;
use statrs::distribution::{ChiSquared, ContinuousCDF};
use tracing::debug;

use crate::error::{ReconstructionError, Result};
use crate::matrix::{check_binary, check_rows};
use crate::tree::Tree;

pub use optim::{minimize, OptimConfig, OptimOutcome};
pub use pruning::{felsenstein_pruning, marginal_posteriors, Rates, RootPrior};

/// Candidate rate model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateModel {
    EqualRates,
    AllRatesDifferent,
}

impl RateModel {
    pub fn n_params(self) -> usize {
        match self {
            RateModel::EqualRates => 1,
            RateModel::AllRatesDifferent => 2,
        }
    }

    fn rates(self, log_rates: &[f64]) -> Rates {
        match self {
            RateModel::EqualRates => Rates::equal(log_rates[0].exp()),
            RateModel::AllRatesDifferent => Rates {
                gain: log_rates[0].exp(),
                loss: log_rates[1].exp(),
            },
        }
    }
}

impl fmt::Display for RateModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateModel::EqualRates => write!(f, "ER"),
            RateModel::AllRatesDifferent => write!(f, "ARD"),
        }
    }
}

/// Outcome of fitting one rate model.
#[derive(Clone, Debug, PartialEq)]
pub enum FitOutcome {
    Converged {
        model: RateModel,
        rates: Rates,
        log_likelihood: f64,
        aic: f64,
    },
    Failed {
        model: RateModel,
        reason: String,
    },
}

impl FitOutcome {
    pub fn model(&self) -> RateModel {
        match self {
            FitOutcome::Converged { model, .. } | FitOutcome::Failed { model, .. } => *model,
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, FitOutcome::Converged { .. })
    }
}

/// Thresholds for preferring the ARD model over ER.
#[derive(Clone, Debug)]
pub struct SelectionConfig {
    /// LRT p-value must be strictly below this. Default: 0.05
    pub p_value_threshold: f64,
    /// AIC(ER) − AIC(ARD) must strictly exceed this. Default: 10.0
    pub aic_margin: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            p_value_threshold: 0.05,
            aic_margin: 10.0,
        }
    }
}

/// Settings shared by every discrete fit in a run.
#[derive(Clone, Debug)]
pub struct DiscreteConfig {
    /// Seed for every model fit. Default: 1
    pub seed: u64,
    pub root_prior: RootPrior,
    pub selection: SelectionConfig,
    pub optim: OptimConfig,
}

impl Default for DiscreteConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            root_prior: RootPrior::Flat,
            selection: SelectionConfig::default(),
            optim: OptimConfig::default(),
        }
    }
}

/// Both fits, the test statistics and the chosen model.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelSelection {
    pub equal_rates: FitOutcome,
    pub all_rates_different: FitOutcome,
    /// 2·|logLik(ER) − logLik(ARD)|, when both converged.
    pub lrt_statistic: Option<f64>,
    /// χ²₁ upper-tail probability of `lrt_statistic`.
    pub p_value: Option<f64>,
    pub selected: RateModel,
}

impl ModelSelection {
    pub fn selected_fit(&self) -> &FitOutcome {
        match self.selected {
            RateModel::EqualRates => &self.equal_rates,
            RateModel::AllRatesDifferent => &self.all_rates_different,
        }
    }
}

/// Discrete reconstruction of one binary column.
#[derive(Clone, Debug)]
pub struct DiscreteFit {
    pub selection: ModelSelection,
    pub rates: Rates,
    pub log_likelihood: f64,
    /// Posterior probability of states 0 and 1 per internal node.
    pub likelihoods: Array2<f64>,
    /// Maximum-likelihood state per internal node.
    pub ancestral: Vec<u8>,
    /// Tip states followed by `ancestral`.
    pub tip_and_node: Vec<u8>,
}

/// Fit one rate model by maximum likelihood.
///
/// The ARD fit counts as failed when the optimiser does not converge, the
/// likelihood is not finite, or a rate estimate sits on its bound. ER only
/// fails on a non-finite likelihood.
pub fn fit_model(
    tree: &Tree,
    tip_states: &[u8],
    model: RateModel,
    config: &DiscreteConfig,
    rng: &mut StdRng,
) -> FitOutcome {
    let neg_log_lik = |x: &[f64]| {
        -felsenstein_pruning(tree, tip_states, model.rates(x), config.root_prior)
    };
    let outcome = minimize(neg_log_lik, model.n_params(), &config.optim, rng);
    let log_likelihood = -outcome.value;

    debug!(
        "{} fit: logLik={:.6} iterations={} converged={} log_rates={:?}",
        model, log_likelihood, outcome.iterations, outcome.converged, outcome.x
    );

    if !log_likelihood.is_finite() {
        return FitOutcome::Failed {
            model,
            reason: "log-likelihood is not finite".to_string(),
        };
    }

    if model == RateModel::AllRatesDifferent {
        if !outcome.converged {
            return FitOutcome::Failed {
                model,
                reason: format!("no convergence after {} iterations", outcome.iterations),
            };
        }
        if outcome.x.iter().any(|&x| config.optim.at_bound(x)) {
            return FitOutcome::Failed {
                model,
                reason: "rate estimate on boundary".to_string(),
            };
        }
    }

    FitOutcome::Converged {
        model,
        rates: model.rates(&outcome.x),
        log_likelihood,
        aic: -2.0 * log_likelihood + 2.0 * model.n_params() as f64,
    }
}

/// Choose between the ER and ARD fits.
///
/// ARD is selected only if the LRT p-value is below the threshold and ER's
/// AIC exceeds ARD's by more than the margin. A failed ARD fit selects ER
/// unconditionally; a failed ER fit with a converged ARD fit selects ARD.
pub fn select_model(
    equal_rates: FitOutcome,
    all_rates_different: FitOutcome,
    config: &SelectionConfig,
) -> Result<ModelSelection> {
    let (selected, lrt_statistic, p_value) = match (&equal_rates, &all_rates_different) {
        (
            FitOutcome::Converged {
                log_likelihood: ll_er,
                aic: aic_er,
                ..
            },
            FitOutcome::Converged {
                log_likelihood: ll_ard,
                aic: aic_ard,
                ..
            },
        ) => {
            let statistic = 2.0 * (ll_er - ll_ard).abs();
            let chi2 = ChiSquared::new(1.0)
                .map_err(|e| ReconstructionError::ModelFit(e.to_string()))?;
            let p = 1.0 - chi2.cdf(statistic);
            let selected = if p < config.p_value_threshold && aic_er - aic_ard > config.aic_margin {
                RateModel::AllRatesDifferent
            } else {
                RateModel::EqualRates
            };
            (selected, Some(statistic), Some(p))
        }
        (FitOutcome::Converged { .. }, FitOutcome::Failed { reason, .. }) => {
            debug!("{} fit failed ({}); using ER", all_rates_different.model(), reason);
            (RateModel::EqualRates, None, None)
        }
        (FitOutcome::Failed { reason, .. }, FitOutcome::Converged { .. }) => {
            debug!("{} fit failed ({}); using ARD", equal_rates.model(), reason);
            (RateModel::AllRatesDifferent, None, None)
        }
        (FitOutcome::Failed { reason: er, .. }, FitOutcome::Failed { reason: ard, .. }) => {
            return Err(ReconstructionError::ModelFit(format!(
                "both models failed: ER ({}), ARD ({})",
                er, ard
            )));
        }
    };

    Ok(ModelSelection {
        equal_rates,
        all_rates_different,
        lrt_statistic,
        p_value,
        selected,
    })
}

/// Reconstruct a binary trait at every internal node.
///
/// # Arguments
/// * `tree` - Validated rooted tree
/// * `values` - One 0/1 state per tip, in tip order
/// * `config` - Seed, root prior, selection thresholds and optimiser settings
pub fn reconstruct_discrete(
    tree: &Tree,
    values: ArrayView1<'_, u8>,
    config: &DiscreteConfig,
) -> Result<DiscreteFit> {
    check_rows(tree, "binary trait", values.len())?;
    let tips = check_binary(values)?;

    // Each fit starts from the same seed.
    let equal_rates = fit_model(
        tree,
        &tips,
        RateModel::EqualRates,
        config,
        &mut StdRng::seed_from_u64(config.seed),
    );
    let all_rates_different = fit_model(
        tree,
        &tips,
        RateModel::AllRatesDifferent,
        config,
        &mut StdRng::seed_from_u64(config.seed),
    );
    debug!(
        "fits done: ER converged={} ARD converged={}",
        equal_rates.is_converged(),
        all_rates_different.is_converged()
    );
    let selection = select_model(equal_rates, all_rates_different, &config.selection)?;

    let (rates, log_likelihood) = match selection.selected_fit() {
        FitOutcome::Converged {
            rates,
            log_likelihood,
            ..
        } => (*rates, *log_likelihood),
        FitOutcome::Failed { reason, .. } => {
            return Err(ReconstructionError::ModelFit(reason.clone()));
        }
    };

    debug!(
        "selected {} (gain={:.4}, loss={:.4}, p={:?})",
        selection.selected, rates.gain, rates.loss, selection.p_value
    );

    let likelihoods = marginal_posteriors(tree, &tips, rates, config.root_prior);
    // Ties resolve to state 0, the first maximum.
    let ancestral: Vec<u8> = likelihoods
        .rows()
        .into_iter()
        .map(|row| if row[1] > row[0] { 1 } else { 0 })
        .collect();

    let mut tip_and_node = tips;
    tip_and_node.extend_from_slice(&ancestral);

    Ok(DiscreteFit {
        selection,
        rates,
        log_likelihood,
        likelihoods,
        ancestral,
        tip_and_node,
    })
}
