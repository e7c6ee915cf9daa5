/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! The fair-representation objective and the driver that minimizes it.
//!
//! # Parameter vector
//!
//! ```text
//! [ alpha0 (P) | alpha1 (P) | w (k) | prototypes (k × P, row-major) ]
//! ```
//!
//! - `alpha0` is passed to the unprotected group's distance computation,
//!   `alpha1` to the full population's and the protected group's. The
//!   distance function does not apply them (see [`crate::cluster`]).
//! - `w` is bounded to [0, 1] and carried through the solver, but no loss
//!   term reads it.
//!
//! # One evaluation
//!
//! 1. Slice the parameter vector.
//! 2. Soft-assign the full population, the protected and the unprotected group.
//! 3. `L_x`: protected plus unprotected reconstruction loss.
//! 4. `L_y`: accuracy loss of the estimated scores (mean attribute of `M·Z`)
//!    against the target scores.
//! 5. `L_z`: L1 gap between the groups' mean memberships.
//! 6. Return `A_x·L_x + A_y·L_y + A_z·L_z`.

use log::{info, warn};
use rand::Rng;

use crate::accuracy::AccuracyMeasure;
use crate::cluster::{group_fairness_loss, soft_assign};
use crate::config::{LossWeights, SolverTolerances};
use crate::error::{RankFairError, Result};
use crate::matrix::Matrix;
use crate::optimizer::{Bound, MinimizeOutcome, Minimizer};
use crate::population::Population;
use crate::reconstruction::{combine, reconstruct};

/// Evaluations between progress log lines.
pub const PROGRESS_INTERVAL: usize = 250;

// ─── ParameterLayout ─────────────────────────────────────────────────────────

/// Segment sizes of the flat parameter vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParameterLayout {
    /// Attribute count P.
    pub attributes: usize,
    /// Prototype count k.
    pub prototypes: usize,
}

/// Borrowed segments of one parameter vector.
#[derive(Clone, Debug)]
pub struct Parameters<'a> {
    /// Unprotected-group attribute weights.
    pub alpha0: &'a [f64],
    /// Population and protected-group attribute weights.
    pub alpha1: &'a [f64],
    /// Output weights, bounded to [0, 1], unused by the loss.
    pub output_weights: &'a [f64],
    /// Prototype matrix (k×P).
    pub prototypes: Matrix,
}

impl ParameterLayout {
    /// Layout for P attributes and k prototypes.
    pub fn new(attributes: usize, prototypes: usize) -> Result<Self> {
        if attributes == 0 {
            return Err(RankFairError::Empty("attribute columns"));
        }
        if prototypes == 0 {
            return Err(RankFairError::out_of_range("prototype count", "must be at least 1"));
        }
        Ok(Self { attributes, prototypes })
    }

    /// Total length `2P + k + kP`.
    pub fn len(&self) -> usize {
        2 * self.attributes + self.prototypes + self.prototypes * self.attributes
    }

    /// Never `true` for a layout built by [`ParameterLayout::new`].
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-variable bounds: [0, 1] on the output weights, free elsewhere.
    pub fn bounds(&self) -> Vec<Bound> {
        let p = self.attributes;
        let k = self.prototypes;
        (0..self.len())
            .map(|i| if (2 * p..2 * p + k).contains(&i) { Bound::UNIT } else { Bound::UNBOUNDED })
            .collect()
    }

    /// Slice `params` into its segments.
    pub fn split<'a>(&self, params: &'a [f64]) -> Result<Parameters<'a>> {
        if params.len() != self.len() {
            return Err(RankFairError::shape("parameter vector", self.len(), params.len()));
        }
        let p = self.attributes;
        let k = self.prototypes;
        let (alpha0, rest) = params.split_at(p);
        let (alpha1, rest) = rest.split_at(p);
        let (output_weights, rest) = rest.split_at(k);
        let prototypes = Matrix::new(k, p, rest.to_vec())?;
        Ok(Parameters { alpha0, alpha1, output_weights, prototypes })
    }
}

/// Uniform [0, 1) starting vector and its bounds.
pub fn initialize<R: Rng + ?Sized>(
    layout: &ParameterLayout,
    rng: &mut R,
) -> (Vec<f64>, Vec<Bound>) {
    let params = (0..layout.len()).map(|_| rng.gen::<f64>()).collect();
    (params, layout.bounds())
}

// ─── EvaluationContext ───────────────────────────────────────────────────────

/// Per-run evaluation bookkeeping.
#[derive(Clone, Debug, Default)]
pub struct EvaluationContext {
    evaluations: usize,
    last_loss: Option<f64>,
}

impl EvaluationContext {
    /// Fresh context with no evaluations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluations recorded so far.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// Loss of the most recent evaluation.
    pub fn last_loss(&self) -> Option<f64> {
        self.last_loss
    }

    fn record(&mut self, loss: f64) {
        self.evaluations += 1;
        self.last_loss = Some(loss);
        if self.evaluations % PROGRESS_INTERVAL == 0 {
            info!("evaluation {}: loss {loss:.6}", self.evaluations);
        }
    }
}

// ─── FairObjective ───────────────────────────────────────────────────────────

/// The three loss terms of one evaluation, before weighting.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LossTerms {
    /// `L_x`.
    pub reconstruction: f64,
    /// `L_y`.
    pub accuracy: f64,
    /// `L_z`.
    pub fairness: f64,
}

/// What the converged parameters produce.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectiveResults {
    /// Estimated score of every individual.
    pub estimated_scores: Vec<f64>,
    /// Protected-group memberships.
    pub protected_memberships: Matrix,
    /// Unprotected-group memberships.
    pub unprotected_memberships: Matrix,
    /// Accuracy loss of the estimated scores (negated for correlations).
    pub accuracy: f64,
    /// All three unweighted loss terms.
    pub terms: LossTerms,
    /// Weighted total.
    pub loss: f64,
}

/// Weighted reconstruction + accuracy + fairness loss over one population.
#[derive(Clone, Debug)]
pub struct FairObjective<'a> {
    population: &'a Population,
    layout: ParameterLayout,
    accuracy: AccuracyMeasure,
    weights: LossWeights,
}

impl<'a> FairObjective<'a> {
    /// Objective for `population` with `prototypes` latent prototypes.
    pub fn new(
        population: &'a Population,
        prototypes: usize,
        accuracy: AccuracyMeasure,
        weights: LossWeights,
    ) -> Result<Self> {
        let layout = ParameterLayout::new(population.attributes(), prototypes)?;
        Ok(Self { population, layout, accuracy, weights })
    }

    /// Layout of the parameter vector this objective reads.
    pub fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    /// The accuracy measure in use.
    pub fn accuracy(&self) -> AccuracyMeasure {
        self.accuracy
    }

    /// Weighted loss at `params`, recorded in `ctx`.
    pub fn evaluate(&self, params: &[f64], ctx: &mut EvaluationContext) -> Result<f64> {
        let loss = self.evaluate_results(params)?.loss;
        ctx.record(loss);
        Ok(loss)
    }

    /// Full breakdown at `params`: estimated scores, group memberships, loss terms.
    pub fn evaluate_results(&self, params: &[f64]) -> Result<ObjectiveResults> {
        let Parameters { alpha0, alpha1, prototypes, .. } = self.layout.split(params)?;
        let pop = self.population;

        let all = soft_assign(pop.features(), &prototypes, alpha1)?;
        let pro = soft_assign(pop.protected(), &prototypes, alpha1)?;
        let unpro = soft_assign(pop.unprotected(), &prototypes, alpha0)?;

        let reconstruction = reconstruct(pop.protected(), &pro, &prototypes)?.loss
            + reconstruct(pop.unprotected(), &unpro, &prototypes)?.loss;

        let estimated_scores = combine(&all, &prototypes).row_means();
        let accuracy = self.accuracy.loss(&estimated_scores, pop.scores())?;

        let fairness = group_fairness_loss(&pro, &unpro)?;

        let terms = LossTerms { reconstruction, accuracy, fairness };
        let loss = self.weights.combine(reconstruction, accuracy, fairness);
        Ok(ObjectiveResults {
            estimated_scores,
            protected_memberships: pro,
            unprotected_memberships: unpro,
            accuracy,
            terms,
            loss,
        })
    }
}

// ─── Driver ──────────────────────────────────────────────────────────────────

/// A finished optimization: solver outcome plus results at the final parameters.
#[derive(Clone, Debug)]
pub struct OptimizationRun {
    /// What the minimizer reported.
    pub outcome: MinimizeOutcome,
    /// Results mode evaluated at `outcome.parameters`.
    pub results: ObjectiveResults,
    /// Objective evaluations recorded by the run's context.
    pub evaluations: usize,
}

/// Initialize, minimize, and evaluate the converged parameters once more.
pub fn optimize<M, R>(
    objective: &FairObjective<'_>,
    minimizer: &M,
    tolerances: &SolverTolerances,
    rng: &mut R,
) -> Result<OptimizationRun>
where
    M: Minimizer + ?Sized,
    R: Rng + ?Sized,
{
    let (initial, bounds) = initialize(objective.layout(), rng);
    let mut ctx = EvaluationContext::new();
    info!(
        "optimizing k={} ({}) over {} parameters",
        objective.layout().prototypes,
        objective.accuracy(),
        initial.len()
    );
    let outcome = minimizer.minimize(
        &mut |p: &[f64]| objective.evaluate(p, &mut ctx),
        initial,
        &bounds,
        tolerances,
    )?;
    if !outcome.converged {
        warn!("solver stopped without converging: {}", outcome.reason);
    }
    let results = objective.evaluate_results(&outcome.parameters)?;
    Ok(OptimizationRun { outcome, results, evaluations: ctx.evaluations() })
}
