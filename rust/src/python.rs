//! Python bindings for the reconstruction stage.

use ndarray::Array2;
use numpy::{PyArray1, PyArray2, PyReadonlyArray1, PyReadonlyArray2};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::confidence::DEFAULT_CONFIDENCE_THRESHOLD;
use crate::discrete::DiscreteConfig;
use crate::error::ReconstructionError;
use crate::matrix::TraitType;
use crate::orchestrator::{PhenotypeReconstruction, ReconstructionConfig, Reconstructor};
use crate::transitions::EdgeTransition;
use crate::tree::Tree;

fn to_py_err(e: ReconstructionError) -> PyErr {
    PyErr::new::<PyValueError, _>(e.to_string())
}

fn node_indices(values: PyReadonlyArray1<i64>, what: &str) -> PyResult<Vec<usize>> {
    values
        .as_array()
        .iter()
        .map(|&v| {
            usize::try_from(v)
                .map_err(|_| {
                    PyErr::new::<PyValueError, _>(format!("negative {} index {}", what, v))
                })
        })
        .collect()
}

fn directions(transitions: &[EdgeTransition]) -> Vec<i8> {
    transitions.iter().map(|t| t.direction.as_i8()).collect()
}

/// Reconstruct phenotype and genotype ancestral states.
///
/// # Arguments
/// * `edge_parent`, `edge_child` - 0-based node ids per edge (tips first)
/// * `edge_length` - Branch length per edge
/// * `n_tips` - Number of tip nodes
/// * `phenotype` - (n_tips, 1) phenotype matrix
/// * `genotype` - (n_tips, n_loci) binary genotype matrix
/// * `trait_type` - "discrete" or "continuous"
///
/// # Returns
/// * Dict of numpy arrays: node states, confidence and edge transitions
///   for the phenotype and every genotype column
#[pyfunction]
#[pyo3(signature = (
    edge_parent,
    edge_child,
    edge_length,
    n_tips,
    phenotype,
    genotype,
    trait_type,
    seed = 1,
    confidence_threshold = DEFAULT_CONFIDENCE_THRESHOLD,
    parallel = false,
))]
#[allow(clippy::too_many_arguments)]
fn reconstruct<'py>(
    py: Python<'py>,
    edge_parent: PyReadonlyArray1<i64>,
    edge_child: PyReadonlyArray1<i64>,
    edge_length: PyReadonlyArray1<f64>,
    n_tips: usize,
    phenotype: PyReadonlyArray2<f64>,
    genotype: PyReadonlyArray2<u8>,
    trait_type: &str,
    seed: u64,
    confidence_threshold: f64,
    parallel: bool,
) -> PyResult<&'py PyDict> {
    let tree = Tree::from_edges(
        node_indices(edge_parent, "parent")?,
        node_indices(edge_child, "child")?,
        edge_length.as_array().to_vec(),
        n_tips,
    )
    .map_err(to_py_err)?;
    let trait_type: TraitType = trait_type.parse().map_err(to_py_err)?;

    let config = ReconstructionConfig {
        confidence_threshold,
        discrete: DiscreteConfig {
            seed,
            ..Default::default()
        },
        parallel,
    };
    let result = Reconstructor::new(config)
        .run(&tree, phenotype.as_array(), genotype.as_array(), trait_type)
        .map_err(to_py_err)?;

    let dict = PyDict::new(py);
    dict.set_item("trait_type", trait_type.to_string())?;

    match &result.phenotype {
        PhenotypeReconstruction::Continuous { fit, deltas } => {
            let r = &fit.reconstruction;
            dict.set_item(
                "phenotype_states",
                PyArray1::from_vec(py, r.tip_and_node_states.clone()),
            )?;
            dict.set_item("phenotype_confidence", PyArray1::from_vec(py, r.confidence.clone()))?;
            dict.set_item(
                "phenotype_edge_values",
                PyArray2::from_owned_array(py, r.edge_values.clone()),
            )?;
            dict.set_item("phenotype_deltas", PyArray1::from_vec(py, deltas.clone()))?;
            dict.set_item("phenotype_sigma2", fit.sigma2)?;
        }
        PhenotypeReconstruction::Discrete { fit, transitions } => {
            let r = &fit.reconstruction;
            let states: Vec<f64> = r.tip_and_node_states.iter().map(|&s| f64::from(s)).collect();
            dict.set_item("phenotype_states", PyArray1::from_vec(py, states))?;
            dict.set_item("phenotype_confidence", PyArray1::from_vec(py, r.confidence.clone()))?;
            dict.set_item(
                "phenotype_edge_values",
                PyArray2::from_owned_array(py, r.edge_values.mapv(f64::from)),
            )?;
            dict.set_item(
                "phenotype_transitions",
                PyArray1::from_vec(py, directions(transitions)),
            )?;
            dict.set_item("phenotype_model", fit.selection.selected.to_string())?;
        }
    }

    let n_loci = result.genotypes.len();
    let genotype_states = Array2::from_shape_fn((tree.n_nodes(), n_loci), |(node, j)| {
        result.genotypes[j].reconstruction.tip_and_node_states[node]
    });
    let genotype_confidence = Array2::from_shape_fn((tree.n_nodes(), n_loci), |(node, j)| {
        result.genotypes[j].reconstruction.confidence[node]
    });
    let genotype_transitions = Array2::from_shape_fn((tree.n_edges(), n_loci), |(edge, j)| {
        result.genotype_transitions[j][edge].direction.as_i8()
    });
    let models: Vec<String> = result
        .genotypes
        .iter()
        .map(|g| g.selection.selected.to_string())
        .collect();

    dict.set_item("genotype_states", PyArray2::from_owned_array(py, genotype_states))?;
    dict.set_item("genotype_confidence", PyArray2::from_owned_array(py, genotype_confidence))?;
    dict.set_item("genotype_transitions", PyArray2::from_owned_array(py, genotype_transitions))?;
    dict.set_item("genotype_models", models)?;

    Ok(dict)
}

/// Python module definition
#[pymodule]
fn bacgwas(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(reconstruct, m)?)?;
    Ok(())
}
