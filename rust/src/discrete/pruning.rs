//! Felsenstein pruning and marginal reconstruction for binary traits.
//!
//! Computes the log-likelihood of observing tip states given a tree and a
//! binary evolution model (gain/loss rates), and the marginal posterior of
//! each state at every internal node.

use ndarray::Array2;

use crate::tree::Tree;

/// Rates of the two-state continuous-time Markov chain.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rates {
    /// Rate of 0→1 transitions (λ)
    pub gain: f64,
    /// Rate of 1→0 transitions (μ)
    pub loss: f64,
}

impl Rates {
    pub fn equal(rate: f64) -> Self {
        Rates { gain: rate, loss: rate }
    }
}

/// Weighting of root states when summing the likelihood.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RootPrior {
    /// Every root state weighted 1 (likelihood summed over root states).
    #[default]
    Flat,
    /// Stationary frequencies of the rate matrix.
    Equilibrium,
}

/// Transition probabilities over a branch of length `t`.
///
/// Closed form of exp(Qt) for Q = [[-gain, gain], [loss, -loss]]; row `s`
/// is the distribution of the end state given start state `s`.
pub(crate) fn transition_matrix(rates: Rates, t: f64) -> [[f64; 2]; 2] {
    let total = rates.gain + rates.loss;
    if total < 1e-300 {
        return [[1.0, 0.0], [0.0, 1.0]];
    }

    let decay = (-total * t).exp();
    let p01 = rates.gain * (1.0 - decay) / total;
    let p10 = rates.loss * (1.0 - decay) / total;

    [[1.0 - p01, p01], [p10, 1.0 - p10]]
}

/// Stationary distribution (loss, gain) / (gain + loss).
fn equilibrium_frequencies(rates: Rates) -> [f64; 2] {
    let total = rates.gain + rates.loss;
    if total < 1e-300 {
        return [0.5, 0.5];
    }
    [rates.loss / total, rates.gain / total]
}

fn root_weights(rates: Rates, prior: RootPrior) -> [f64; 2] {
    match prior {
        RootPrior::Flat => [1.0, 1.0],
        RootPrior::Equilibrium => equilibrium_frequencies(rates),
    }
}

/// Scaled partial likelihoods from the post-order pass.
struct Partials {
    /// P(data below node | node state), rescaled to sum to 1.
    conditionals: Vec<[f64; 2]>,
    /// Message each node sends to its parent: Σ_s' P[s→s'](t) · L[node, s'].
    to_parent: Vec<[f64; 2]>,
    /// Per-branch transition matrices, indexed by child node.
    transitions: Vec<[[f64; 2]; 2]>,
    log_scale: f64,
}

fn normalize(v: &mut [f64; 2]) -> f64 {
    let sum = v[0] + v[1];
    if sum > 0.0 {
        v[0] /= sum;
        v[1] /= sum;
    }
    sum
}

fn downward_pass(tree: &Tree, tip_states: &[u8], rates: Rates) -> Partials {
    let n_nodes = tree.n_nodes();
    let mut conditionals = vec![[1.0; 2]; n_nodes];
    let mut to_parent = vec![[1.0; 2]; n_nodes];
    let mut transitions = vec![[[1.0, 0.0], [0.0, 1.0]]; n_nodes];
    let mut log_scale = 0.0;

    // Tips are observed without error.
    for (tip, &observed) in tip_states.iter().enumerate() {
        conditionals[tip] = if observed == 1 { [0.0, 1.0] } else { [1.0, 0.0] };
    }

    for &node in tree.post_order() {
        if !tree.is_tip(node) {
            let mut acc = [1.0; 2];
            for &child in tree.children(node) {
                acc[0] *= to_parent[child][0];
                acc[1] *= to_parent[child][1];
            }
            let sum = normalize(&mut acc);
            log_scale += sum.ln();
            conditionals[node] = acc;
        }

        // Children precede parents in post-order, so the message is final.
        if node != tree.root() {
            let p = transition_matrix(rates, tree.branch_length(node));
            let cond = conditionals[node];
            to_parent[node] = [
                p[0][0] * cond[0] + p[0][1] * cond[1],
                p[1][0] * cond[0] + p[1][1] * cond[1],
            ];
            transitions[node] = p;
        }
    }

    Partials {
        conditionals,
        to_parent,
        transitions,
        log_scale,
    }
}

/// Felsenstein pruning algorithm for a single binary column.
///
/// # Algorithm
/// 1. Initialize tip conditionals: L[tip, state] = 1 if state matches data, else 0
/// 2. Post-order traversal: For each internal node, compute:
///    L[node, s] = ∏_{children} ∑_{s'} P[s→s'](t) · L[child, s']
/// 3. At root: likelihood = ∑_s w[s] · L[root, s]
///
/// Conditionals are rescaled at every internal node, so deep trees do not
/// underflow. Returns `-inf` when the data are impossible under `rates`.
pub fn felsenstein_pruning(tree: &Tree, tip_states: &[u8], rates: Rates, prior: RootPrior) -> f64 {
    let partials = downward_pass(tree, tip_states, rates);
    let weights = root_weights(rates, prior);
    let root = partials.conditionals[tree.root()];

    let likelihood = weights[0] * root[0] + weights[1] * root[1];
    partials.log_scale + likelihood.ln()
}

/// Marginal posterior probability of each state at every internal node.
///
/// Row `i` corresponds to node `n_tips + i`; columns are states 0 and 1 and
/// every row sums to 1.
pub fn marginal_posteriors(
    tree: &Tree,
    tip_states: &[u8],
    rates: Rates,
    prior: RootPrior,
) -> Array2<f64> {
    let partials = downward_pass(tree, tip_states, rates);
    let n_nodes = tree.n_nodes();

    // Message into each node from everything outside its subtree.
    let mut from_above = vec![[1.0; 2]; n_nodes];
    let mut root_msg = root_weights(rates, prior);
    normalize(&mut root_msg);
    from_above[tree.root()] = root_msg;

    for node in tree.pre_order() {
        if tree.is_tip(node) {
            continue;
        }
        let kids = tree.children(node);
        for &child in kids {
            let mut msg = from_above[node];
            for &sibling in kids.iter().filter(|&&s| s != child) {
                msg[0] *= partials.to_parent[sibling][0];
                msg[1] *= partials.to_parent[sibling][1];
            }
            normalize(&mut msg);

            let p = partials.transitions[child];
            let mut down = [
                msg[0] * p[0][0] + msg[1] * p[1][0],
                msg[0] * p[0][1] + msg[1] * p[1][1],
            ];
            normalize(&mut down);
            from_above[child] = down;
        }
    }

    let n_tips = tree.n_tips();
    let mut posteriors = Array2::<f64>::zeros((tree.n_internal(), 2));
    for node in n_tips..n_nodes {
        let cond = partials.conditionals[node];
        let mut post = [from_above[node][0] * cond[0], from_above[node][1] * cond[1]];
        if normalize(&mut post) <= 0.0 {
            post = [0.5, 0.5];
        }
        posteriors[[node - n_tips, 0]] = post[0];
        posteriors[[node - n_tips, 1]] = post[1];
    }

    posteriors
}
