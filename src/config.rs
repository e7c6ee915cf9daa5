/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Run configuration: loss weights, solver tolerances, calibration settings.
//!
//! Every struct has a `Default` matching the reference experiment setup and
//! `with_*` builders for overrides. Enable the `serde` feature to read or
//! write them as part of an experiment manifest.

use crate::accuracy::AccuracyMeasure;
use crate::error::{RankFairError, Result};
use crate::ranking::SortDirection;

// ─── LossWeights ─────────────────────────────────────────────────────────────

/// Weights of the three loss terms: `A_x·L_x + A_y·L_y + A_z·L_z`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LossWeights {
    /// `A_x`: reconstruction loss weight. Default 0.01.
    pub reconstruction: f64,
    /// `A_y`: ranking-accuracy loss weight. Default 1.0.
    pub accuracy: f64,
    /// `A_z`: group-fairness loss weight. Default 100.0.
    pub fairness: f64,
}

impl Default for LossWeights {
    fn default() -> Self {
        Self { reconstruction: 0.01, accuracy: 1.0, fairness: 100.0 }
    }
}

impl LossWeights {
    /// Weighted sum of the three terms.
    pub fn combine(&self, reconstruction: f64, accuracy: f64, fairness: f64) -> f64 {
        self.reconstruction * reconstruction + self.accuracy * accuracy + self.fairness * fairness
    }
}

// ─── SolverTolerances ────────────────────────────────────────────────────────

/// Stopping rules and step sizes handed to a bounded minimizer.
///
/// Defaults mirror the reference L-BFGS-B invocation.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SolverTolerances {
    /// Relative-reduction factor; iteration stops when
    /// `(f_k − f_{k+1}) / max(|f_k|, |f_{k+1}|, 1) ≤ factr · ε_machine`. Default 1e12.
    pub factr: f64,
    /// Stop when the projected gradient's infinity norm is ≤ this. Default 1e-4.
    pub pgtol: f64,
    /// Forward-difference step for the numerical gradient. Default 1e-5.
    pub gradient_step: f64,
    /// Cap on objective evaluations. Default 15 000.
    pub max_evaluations: usize,
    /// Cap on solver iterations. Default 15 000.
    pub max_iterations: usize,
    /// Number of correction pairs kept by the quasi-Newton update. Default 10.
    pub memory: usize,
}

impl Default for SolverTolerances {
    fn default() -> Self {
        Self {
            factr: 1e12,
            pgtol: 1e-4,
            gradient_step: 1e-5,
            max_evaluations: 15_000,
            max_iterations: 15_000,
            memory: 10,
        }
    }
}

impl SolverTolerances {
    /// Override the evaluation cap.
    #[must_use]
    pub fn with_max_evaluations(mut self, max_evaluations: usize) -> Self {
        self.max_evaluations = max_evaluations;
        self
    }

    /// Override the iteration cap.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Override the projected-gradient tolerance.
    #[must_use]
    pub fn with_pgtol(mut self, pgtol: f64) -> Self {
        self.pgtol = pgtol;
        self
    }

    /// Override the relative-reduction factor.
    #[must_use]
    pub fn with_factr(mut self, factr: f64) -> Self {
        self.factr = factr;
        self
    }
}

// ─── CalibrationConfig ───────────────────────────────────────────────────────

/// Monte-Carlo settings for normalizer calibration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CalibrationConfig {
    /// Synthetic rankings averaged per boundary probability. Default 10.
    pub trials: usize,
    /// Cut-point used while calibrating. Default 10.
    pub cut_point: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self { trials: 10, cut_point: 10 }
    }
}

impl CalibrationConfig {
    /// Override the trial count.
    #[must_use]
    pub fn with_trials(mut self, trials: usize) -> Self {
        self.trials = trials;
        self
    }

    /// Override the calibration cut-point.
    #[must_use]
    pub fn with_cut_point(mut self, cut_point: usize) -> Self {
        self.cut_point = cut_point;
        self
    }
}

// ─── RunConfig ───────────────────────────────────────────────────────────────

/// Everything one fair-representation run needs besides its data.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunConfig {
    /// Number of prototypes k. Default 4.
    pub prototypes: usize,
    /// Accuracy measure optimized against the target scores. Default score difference.
    pub accuracy: AccuracyMeasure,
    /// Loss-term weights.
    pub weights: LossWeights,
    /// Solver settings.
    pub solver: SolverTolerances,
    /// Cut-point for fairness evaluation of the input and learned rankings. Default 10.
    pub cut_point: usize,
    /// Direction of the target score. Default higher is better.
    pub direction: SortDirection,
    /// Normalizer calibration settings.
    pub calibration: CalibrationConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            prototypes: 4,
            accuracy: AccuracyMeasure::ScoreDifference,
            weights: LossWeights::default(),
            solver: SolverTolerances::default(),
            cut_point: 10,
            direction: SortDirection::HigherIsBetter,
            calibration: CalibrationConfig::default(),
        }
    }
}

impl RunConfig {
    /// Override the prototype count.
    #[must_use]
    pub fn with_prototypes(mut self, prototypes: usize) -> Self {
        self.prototypes = prototypes;
        self
    }

    /// Override the accuracy measure.
    #[must_use]
    pub fn with_accuracy(mut self, accuracy: AccuracyMeasure) -> Self {
        self.accuracy = accuracy;
        self
    }

    /// Override the loss weights.
    #[must_use]
    pub fn with_weights(mut self, weights: LossWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Override the solver settings.
    #[must_use]
    pub fn with_solver(mut self, solver: SolverTolerances) -> Self {
        self.solver = solver;
        self
    }

    /// Override the evaluation cut-point.
    #[must_use]
    pub fn with_cut_point(mut self, cut_point: usize) -> Self {
        self.cut_point = cut_point;
        self
    }

    /// Override the target score direction.
    #[must_use]
    pub fn with_direction(mut self, direction: SortDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Override the calibration settings.
    #[must_use]
    pub fn with_calibration(mut self, calibration: CalibrationConfig) -> Self {
        self.calibration = calibration;
        self
    }

    /// Reject settings no run can use.
    pub fn validate(&self) -> Result<()> {
        if self.prototypes == 0 {
            return Err(RankFairError::out_of_range("prototype count", "must be at least 1"));
        }
        if self.cut_point == 0 || self.calibration.cut_point == 0 {
            return Err(RankFairError::out_of_range("cut point", "must be at least 1"));
        }
        if self.calibration.trials == 0 {
            return Err(RankFairError::out_of_range("calibration trials", "must be at least 1"));
        }
        if self.solver.memory == 0 {
            return Err(RankFairError::out_of_range("solver memory", "must be at least 1"));
        }
        if !(self.solver.gradient_step > 0.0) {
            return Err(RankFairError::out_of_range("gradient step", "must be positive"));
        }
        Ok(())
    }
}
