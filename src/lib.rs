//! # rankfair
//!
//! Group-fair latent representations for rankings, and the set-wise fairness
//! measures used to judge them.
//!
//! ---
//!
//! ## Two halves
//!
//! **Representation learning.** Every individual is softly assigned to k
//! latent prototypes. The prototypes are optimized so that three things hold
//! at once: the prototypes reconstruct the original features, the scores read
//! off the representation rank people the way the target score does, and the
//! protected and unprotected groups occupy the prototypes in the same
//! proportions.
//!
//! **Fairness measurement.** A ranking is cut every `cut_point` positions,
//! each prefix's protected share is compared with the population's, and the
//! comparisons are discounted by `1 / log₂(position + 1)` and summed. A
//! Monte-Carlo normalizer per `(N, K, measure)` maps the sum into [0, 1].
//!
//! ## The pipeline
//!
//! ```text
//! Population ──→ FairObjective ──→ Minimizer ──→ estimated scores ──→ ranking
//!   (X, groups,      ↑  L_x + L_y + L_z     ↑                            │
//!    target)    ParameterLayout      ProjectedLbfgs                      ↓
//!                                              NormalizerTable → rKL / rND / rRD
//! ```
//!
//! ## Module overview
//!
//! | Module | Key types | What it does |
//! |--------|-----------|--------------|
//! | [`matrix`] | [`Matrix`] | Dense row-major feature, prototype and membership matrices |
//! | [`population`] | [`Population`] | Protected/unprotected partition and target scores |
//! | [`ranking`] | [`SortDirection`] | Rankings from scores, permutation checks |
//! | [`cluster`] | | Distances and softmax memberships; in-loop fairness loss |
//! | [`reconstruction`] | [`Reconstruction`] | Features rebuilt from prototypes |
//! | [`accuracy`] | [`AccuracyMeasure`] | Score, position, Kendall, Spearman and Pearson measures |
//! | [`objective`] | [`FairObjective`], [`EvaluationContext`] | Weighted three-term loss and the optimization driver |
//! | [`optimizer`] | [`Minimizer`], [`ProjectedLbfgs`] | Box-constrained minimization |
//! | [`fairness`] | [`FairnessMeasure`], [`NormalizerTable`] | rKL / rND / rRD, generator, calibration |
//! | [`pipeline`] | [`RunSummary`], [`SweepResult`], [`AttributeFairness`] | Full experiment runs, the synthetic sweep, per-attribute audits |
//! | [`config`] | [`RunConfig`] | Weights, solver tolerances, calibration settings |
//!
//! ## Features
//!
//! - `serde`: serialization for configuration, outcomes and summaries.
//! - `python-ffi`: PyO3 bindings for the fairness measurement API.
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade: objective progress every 250
//! evaluations at `info`, solver iterations and calibration at `debug`,
//! skipped normalizer-table lines at `warn`. Install any logger to see them.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod accuracy;
pub mod cluster;
pub mod config;
pub mod error;
pub mod fairness;
pub mod matrix;
pub mod objective;
pub mod optimizer;
pub mod pipeline;
pub mod population;
pub mod ranking;
pub mod reconstruction;

#[cfg(feature = "python-ffi")]
pub mod ffi;

pub use accuracy::AccuracyMeasure;
pub use config::{CalibrationConfig, LossWeights, RunConfig, SolverTolerances};
pub use error::{RankFairError, Result};
pub use fairness::{
    calibrate_normalizer, discounted_fairness, generate_unfair_ranking, FairnessMeasure,
    FairnessScores, NormalizerKey, NormalizerTable,
};
pub use matrix::Matrix;
pub use objective::{
    optimize, EvaluationContext, FairObjective, ObjectiveResults, OptimizationRun, ParameterLayout,
};
pub use optimizer::{Bound, MinimizeOutcome, Minimizer, ProjectedLbfgs, StopReason};
pub use pipeline::{
    attribute_fairness, run_experiment, synthetic_sweep, AttributeFairness, Experiment, RunSummary,
    SweepConfig, SweepResult,
};
pub use population::Population;
pub use ranking::SortDirection;
pub use reconstruction::Reconstruction;
