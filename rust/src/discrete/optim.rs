//! Bounded, multi-start Nelder–Mead minimiser.
//!
//! Parameters live on a log-rate scale and are projected back into the box
//! after every simplex move. The first start is fixed; the remaining starts
//! are drawn from the caller's RNG, so a fit is reproducible from its seed.

use rand::rngs::StdRng;
use rand::Rng;

/// Configuration for the minimiser.
#[derive(Clone, Debug)]
pub struct OptimConfig {
    /// Lower bound for every coordinate.
    pub lower: f64,
    /// Upper bound for every coordinate.
    pub upper: f64,
    /// Fixed first starting value for every coordinate.
    pub initial: f64,
    /// Total number of starts (first fixed, rest random).
    pub n_starts: usize,
    /// Iteration cap per start.
    pub max_iter: usize,
    /// Relative tolerance on the spread of simplex values.
    pub ftol: f64,
    /// Absolute tolerance on simplex size.
    pub xtol: f64,
}

impl Default for OptimConfig {
    fn default() -> Self {
        Self {
            lower: 1e-8_f64.ln(),
            upper: 1e4_f64.ln(),
            initial: 0.1_f64.ln(),
            n_starts: 3,
            max_iter: 2000,
            ftol: 1e-10,
            xtol: 1e-6,
        }
    }
}

impl OptimConfig {
    /// Whether `x` sits on (or numerically at) either bound.
    pub fn at_bound(&self, x: f64) -> bool {
        x <= self.lower + 1e-3 || x >= self.upper - 1e-3
    }

    fn clamp(&self, x: &mut [f64]) {
        for v in x {
            *v = v.clamp(self.lower, self.upper);
        }
    }
}

/// Result of a minimisation.
#[derive(Clone, Debug)]
pub struct OptimOutcome {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Minimise `f` over `dim` coordinates.
///
/// Non-finite objective values are treated as +∞. The best start wins; ties
/// keep the earlier start.
pub fn minimize<F>(f: F, dim: usize, config: &OptimConfig, rng: &mut StdRng) -> OptimOutcome
where
    F: Fn(&[f64]) -> f64,
{
    let objective = |x: &[f64]| {
        let v = f(x);
        if v.is_finite() {
            v
        } else {
            f64::INFINITY
        }
    };

    let mut best: Option<OptimOutcome> = None;
    for start in 0..config.n_starts.max(1) {
        let x0: Vec<f64> = if start == 0 {
            vec![config.initial; dim]
        } else {
            (0..dim)
                .map(|_| rng.gen_range(config.lower / 2.0..config.upper / 2.0))
                .collect()
        };
        let run = nelder_mead(&objective, x0, config);
        if best.as_ref().map_or(true, |b| run.value < b.value) {
            best = Some(run);
        }
    }

    // n_starts >= 1, so at least one run happened.
    best.unwrap_or(OptimOutcome {
        x: vec![config.initial; dim],
        value: f64::INFINITY,
        iterations: 0,
        converged: false,
    })
}

fn nelder_mead<F>(f: &F, x0: Vec<f64>, config: &OptimConfig) -> OptimOutcome
where
    F: Fn(&[f64]) -> f64,
{
    const ALPHA: f64 = 1.0;
    const GAMMA: f64 = 2.0;
    const RHO: f64 = 0.5;
    const SIGMA: f64 = 0.5;
    const STEP: f64 = 1.0;

    let dim = x0.len();
    let mut x0 = x0;
    config.clamp(&mut x0);

    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(dim + 1);
    simplex.push(x0.clone());
    for i in 0..dim {
        let mut v = x0.clone();
        v[i] = if v[i] + STEP <= config.upper {
            v[i] + STEP
        } else {
            v[i] - STEP
        };
        simplex.push(v);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| f(v)).collect();

    let mut iterations = 0;
    let mut converged = false;
    while iterations < config.max_iter {
        // Order vertices by value (stable, so ties keep insertion order).
        let mut order: Vec<usize> = (0..=dim).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        let f_best = values[0];
        let f_worst = values[dim];
        let spread = if f_worst.is_finite() {
            (f_worst - f_best).abs()
        } else {
            f64::INFINITY
        };
        let size = simplex[1..]
            .iter()
            .flat_map(|v| v.iter().zip(&simplex[0]).map(|(a, b)| (a - b).abs()))
            .fold(0.0, f64::max);
        if spread <= config.ftol * (1.0 + f_best.abs()) && size <= config.xtol {
            converged = true;
            break;
        }

        iterations += 1;

        let centroid: Vec<f64> = (0..dim)
            .map(|j| simplex[..dim].iter().map(|v| v[j]).sum::<f64>() / dim as f64)
            .collect();
        let towards = |coef: f64| -> Vec<f64> {
            let mut p: Vec<f64> = centroid
                .iter()
                .zip(&simplex[dim])
                .map(|(c, w)| c + coef * (c - w))
                .collect();
            config.clamp(&mut p);
            p
        };

        let reflected = towards(ALPHA);
        let f_reflected = f(&reflected);

        if f_reflected < values[0] {
            let expanded = towards(GAMMA);
            let f_expanded = f(&expanded);
            if f_expanded < f_reflected {
                simplex[dim] = expanded;
                values[dim] = f_expanded;
            } else {
                simplex[dim] = reflected;
                values[dim] = f_reflected;
            }
            continue;
        }

        if f_reflected < values[dim - 1] {
            simplex[dim] = reflected;
            values[dim] = f_reflected;
            continue;
        }

        let (contracted, f_contracted) = if f_reflected < values[dim] {
            let p = towards(RHO);
            let fp = f(&p);
            (p, fp)
        } else {
            let p = towards(-RHO);
            let fp = f(&p);
            (p, fp)
        };
        if f_contracted < values[dim].min(f_reflected) {
            simplex[dim] = contracted;
            values[dim] = f_contracted;
            continue;
        }

        // Shrink towards the best vertex.
        for i in 1..=dim {
            let shrunk: Vec<f64> = simplex[0]
                .iter()
                .zip(&simplex[i])
                .map(|(b, v)| b + SIGMA * (v - b))
                .collect();
            values[i] = f(&shrunk);
            simplex[i] = shrunk;
        }
    }

    let best = (0..=dim)
        .min_by(|&a, &b| values[a].total_cmp(&values[b]))
        .unwrap_or(0);

    OptimOutcome {
        x: simplex[best].clone(),
        value: values[best],
        iterations,
        converged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;

    #[test]
    fn test_quadratic_1d() {
        let mut rng = StdRng::seed_from_u64(1);
        let out = minimize(|x| (x[0] - 1.5).powi(2), 1, &OptimConfig::default(), &mut rng);

        assert!(out.converged);
        assert_relative_eq!(out.x[0], 1.5, epsilon = 1e-4);
    }

    #[test]
    fn test_correlated_quadratic_2d() {
        let mut rng = StdRng::seed_from_u64(1);
        let out = minimize(
            |x| (x[0] - 1.0).powi(2) + 10.0 * (x[1] - x[0] - 0.5).powi(2),
            2,
            &OptimConfig::default(),
            &mut rng,
        );

        assert!(out.converged);
        assert_relative_eq!(out.x[0], 1.0, epsilon = 1e-3);
        assert_relative_eq!(out.x[1], 1.5, epsilon = 1e-3);
    }

    #[test]
    fn test_respects_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let config = OptimConfig::default();
        let out = minimize(|x| x[0], 1, &config, &mut rng);

        assert_relative_eq!(out.x[0], config.lower, epsilon = 1e-6);
        assert!(config.at_bound(out.x[0]));
    }

    #[test]
    fn test_same_seed_same_result() {
        let f = |x: &[f64]| (x[0] + 0.3).powi(2) + (x[1] - 2.0).powi(4);
        let config = OptimConfig::default();
        let a = minimize(f, 2, &config, &mut StdRng::seed_from_u64(42));
        let b = minimize(f, 2, &config, &mut StdRng::seed_from_u64(42));

        assert_eq!(a.x, b.x);
        assert_eq!(a.value, b.value);
    }
}
