/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Python FFI bindings via PyO3.
//!
//! Exposes the fairness measurement API: discounted rKL/rND/rRD, normalizer
//! calibration and its persisted table, the synthetic ranking generator and
//! the ranking-accuracy measures. Representation learning stays Rust-only.
//!
//! # Building the Python extension
//!
//! ```bash
//! pip install maturin
//! maturin develop --features python-ffi
//! ```
//!
//! # Usage
//!
//! ```python
//! import rankfair
//!
//! table = rankfair.NormalizerTable.load("normalizers.txt")
//! norm = table.get_or_calibrate(1000, 300, "rND", seed=7)
//! ranking = rankfair.generate_unfair_ranking(list(range(1000)), list(range(300)), 0.3, seed=1)
//! print(rankfair.discounted_fairness(ranking, list(range(300)), 10, "rND", norm))
//! table.save("normalizers.txt")
//! ```

use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::accuracy::AccuracyMeasure;
use crate::config::CalibrationConfig;
use crate::error::RankFairError;
use crate::fairness::{self, FairnessMeasure, NormalizerKey};

fn to_py_err(e: RankFairError) -> PyErr {
    match e {
        RankFairError::Io(io) => PyIOError::new_err(io.to_string()),
        other => PyValueError::new_err(other.to_string()),
    }
}

fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

fn parse_measure(measure: &str) -> PyResult<FairnessMeasure> {
    measure.parse().map_err(to_py_err)
}

// ── Functions ─────────────────────────────────────────────────────────────────

/// Normalized discounted fairness of a ranking.
///
/// Args:
///     ranking:    permutation of user ids, best first
///     protected:  ids of the protected group
///     cut_point:  prefix granularity
///     measure:    "rKL", "rND" or "rRD"
///     normalizer: divisor for the raw score (default 1.0)
#[pyfunction]
#[pyo3(
    name = "discounted_fairness",
    signature = (ranking, protected, cut_point, measure, normalizer=1.0)
)]
fn py_discounted_fairness(
    ranking: Vec<usize>,
    protected: Vec<usize>,
    cut_point: usize,
    measure: &str,
    normalizer: f64,
) -> PyResult<f64> {
    let measure = parse_measure(measure)?;
    fairness::discounted_fairness(&ranking, &protected, cut_point, measure, normalizer)
        .map_err(to_py_err)
}

/// Monte-Carlo normalizer for a population of `users` with `protected` members.
#[pyfunction]
#[pyo3(
    name = "calibrate_normalizer",
    signature = (users, protected, measure, trials=10, cut_point=10, seed=None)
)]
fn py_calibrate_normalizer(
    users: usize,
    protected: usize,
    measure: &str,
    trials: usize,
    cut_point: usize,
    seed: Option<u64>,
) -> PyResult<f64> {
    let measure = parse_measure(measure)?;
    let config = CalibrationConfig { trials, cut_point };
    fairness::calibrate_normalizer(users, protected, measure, &config, &mut rng_from(seed))
        .map_err(to_py_err)
}

/// Synthetic ranking mixing the groups with the given probability.
#[pyfunction]
#[pyo3(name = "generate_unfair_ranking", signature = (ranking, protected, probability, seed=None))]
fn py_generate_unfair_ranking(
    ranking: Vec<usize>,
    protected: Vec<usize>,
    probability: f64,
    seed: Option<u64>,
) -> PyResult<Vec<usize>> {
    fairness::generate_unfair_ranking(&ranking, &protected, probability, &mut rng_from(seed))
        .map_err(to_py_err)
}

/// Accuracy loss of `estimated` scores against `target` scores.
///
/// `measure` is one of "scoreDiff", "positionDiff", "kendallDis",
/// "spearmanDis", "pearsonDis". Correlations come back negated.
#[pyfunction]
#[pyo3(name = "accuracy_loss")]
fn py_accuracy_loss(measure: &str, estimated: Vec<f64>, target: Vec<f64>) -> PyResult<f64> {
    let measure: AccuracyMeasure = measure.parse().map_err(to_py_err)?;
    measure.loss(&estimated, &target).map_err(to_py_err)
}

// ── NormalizerTable ───────────────────────────────────────────────────────────

/// Cache of calibrated normalizers keyed by (users, protected, measure).
#[pyclass(name = "NormalizerTable")]
#[derive(Clone, Default)]
pub struct PyNormalizerTable {
    inner: fairness::NormalizerTable,
}

#[pymethods]
impl PyNormalizerTable {
    /// Create an empty table.
    #[new]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `N,K,measure:value` lines; a missing file gives an empty table.
    #[staticmethod]
    pub fn load(path: &str) -> PyResult<Self> {
        let inner = fairness::NormalizerTable::load(path).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    /// Write the table to `path`.
    pub fn save(&self, path: &str) -> PyResult<()> {
        self.inner.save(path).map_err(to_py_err)
    }

    /// Cached value, or None.
    pub fn get(&self, users: usize, protected: usize, measure: &str) -> PyResult<Option<f64>> {
        let key = NormalizerKey::new(users, protected, parse_measure(measure)?);
        Ok(self.inner.get(&key))
    }

    /// Store a value.
    pub fn insert(
        &mut self,
        users: usize,
        protected: usize,
        measure: &str,
        value: f64,
    ) -> PyResult<()> {
        let key = NormalizerKey::new(users, protected, parse_measure(measure)?);
        self.inner.insert(key, value);
        Ok(())
    }

    /// Cached value, calibrating and caching it on a miss.
    #[pyo3(signature = (users, protected, measure, trials=10, cut_point=10, seed=None))]
    pub fn get_or_calibrate(
        &mut self,
        users: usize,
        protected: usize,
        measure: &str,
        trials: usize,
        cut_point: usize,
        seed: Option<u64>,
    ) -> PyResult<f64> {
        let key = NormalizerKey::new(users, protected, parse_measure(measure)?);
        let config = CalibrationConfig { trials, cut_point };
        self.inner.get_or_calibrate(key, &config, &mut rng_from(seed)).map_err(to_py_err)
    }

    /// Number of cached entries.
    pub fn __len__(&self) -> usize {
        self.inner.len()
    }

    /// Python repr string.
    pub fn __repr__(&self) -> String {
        format!("NormalizerTable(entries={})", self.inner.len())
    }
}

// ── Module entry point ────────────────────────────────────────────────────────

/// rankfair: set-wise group fairness measures for rankings.
#[pymodule]
pub fn rankfair(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyNormalizerTable>()?;
    m.add_function(wrap_pyfunction!(py_discounted_fairness, m)?)?;
    m.add_function(wrap_pyfunction!(py_calibrate_normalizer, m)?)?;
    m.add_function(wrap_pyfunction!(py_generate_unfair_ranking, m)?)?;
    m.add_function(wrap_pyfunction!(py_accuracy_loss, m)?)?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}
