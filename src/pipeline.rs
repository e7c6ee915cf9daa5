/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! End-to-end experiment flows.
//!
//! ## Representation run
//!
//! ```text
//! Population ─┬─ normalizers (rKL, rND, rRD)  ← NormalizerTable, calibrated on a miss
//!             ├─ fairness of the input ranking
//!             ├─ optimize → estimated scores → estimated ranking
//!             └─ fairness of the estimated ranking → RunSummary
//! ```
//!
//! ## Synthetic sweep
//!
//! Average normalized fairness of generated rankings at each mixing
//! proportion in [`MIXING_PROPORTIONS`], for one `(N, K, measure)`.
//!
//! ## Attribute audit
//!
//! Normalized rKL/rND/rRD of the ranking induced by each attribute column on
//! its own, with a per-attribute direction for columns where lower is better.
//!
//! Every flow renders a CSV header and rows; writing them anywhere is up to
//! the caller.

use std::time::Instant;

use log::info;
use rand::Rng;

use crate::accuracy::AccuracyMeasure;
use crate::config::{CalibrationConfig, RunConfig};
use crate::error::{RankFairError, Result};
use crate::fairness::{
    discounted_fairness, generate_unfair_ranking, FairnessMeasure, FairnessScores, NormalizerKey,
    NormalizerTable,
};
use crate::objective::{optimize, FairObjective, OptimizationRun};
use crate::optimizer::Minimizer;
use crate::population::Population;
use crate::ranking::{rank_by_scores, SortDirection};

/// Mixing proportions of the synthetic sweep. 0.98 stands in for 1.0, which
/// the generator cannot reach in practice.
pub const MIXING_PROPORTIONS: [f64; 11] = [0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 0.98];

/// Normalizers of all three measures for `(users, protected)`, through `table`.
pub fn normalizers<R: Rng + ?Sized>(
    table: &mut NormalizerTable,
    users: usize,
    protected: usize,
    config: &CalibrationConfig,
    rng: &mut R,
) -> Result<FairnessScores> {
    FairnessScores::try_from_fn(|m| {
        table.get_or_calibrate(NormalizerKey::new(users, protected, m), config, rng)
    })
}

// ─── RunSummary ──────────────────────────────────────────────────────────────

/// One result line of a representation run.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunSummary {
    /// Population size N.
    pub users: usize,
    /// Protected group size K.
    pub protected: usize,
    /// Prototype count k.
    pub prototypes: usize,
    /// Name of the target score.
    pub target: String,
    /// Accuracy measure optimized.
    pub accuracy_measure: AccuracyMeasure,
    /// Accuracy loss at the final parameters.
    pub accuracy_value: f64,
    /// Normalized fairness of the input ranking.
    pub input: FairnessScores,
    /// Normalized fairness of the estimated ranking.
    pub converged: FairnessScores,
    /// Normalizers used for both.
    pub normalizers: FairnessScores,
    /// Whether the solver met a tolerance.
    pub solver_converged: bool,
    /// Objective evaluations spent.
    pub evaluations: usize,
    /// Wall-clock optimization time.
    pub seconds: f64,
}

impl RunSummary {
    /// Column names matching [`RunSummary::to_csv_row`].
    pub fn csv_header() -> &'static str {
        "UserN,pro_N,K,TargetAtt,AccMeasure,acc_value,rKL_input,rKL_converged,\
         rND_input,rND_converged,rRD_input,rRD_converged,secondsSpent"
    }

    /// Comma-separated values, no trailing newline.
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{},{},{},{},{}",
            self.users,
            self.protected,
            self.prototypes,
            self.target,
            self.accuracy_measure,
            self.accuracy_value,
            self.input.kl,
            self.converged.kl,
            self.input.nd,
            self.converged.nd,
            self.input.rd,
            self.converged.rd,
            self.seconds
        )
    }
}

/// Summary plus the full optimization record.
#[derive(Clone, Debug)]
pub struct Experiment {
    /// Result line.
    pub summary: RunSummary,
    /// Solver outcome and results mode.
    pub optimization: OptimizationRun,
    /// Ranking induced by the estimated scores.
    pub estimated_ranking: Vec<usize>,
}

/// Learn a fair representation of `population` and score both rankings.
///
/// `target` only labels the summary. Normalizers missing from `table` are
/// calibrated and cached there, so a table reused across runs calibrates
/// each `(N, K, measure)` once.
pub fn run_experiment<M, R>(
    population: &Population,
    target: &str,
    config: &RunConfig,
    minimizer: &M,
    table: &mut NormalizerTable,
    rng: &mut R,
) -> Result<Experiment>
where
    M: Minimizer + ?Sized,
    R: Rng + ?Sized,
{
    config.validate()?;
    let users = population.len();
    let protected = population.protected_len();
    if config.cut_point > users {
        return Err(RankFairError::out_of_range(
            "cut point",
            format!("{} exceeds population size {users}", config.cut_point),
        ));
    }

    let norms = normalizers(table, users, protected, &config.calibration, rng)?;
    info!("normalizers for N={users} K={protected}: {norms:?}");

    let pro_index = population.protected_index();
    let input_ranking = population.input_ranking(config.direction);
    let input = FairnessScores::evaluate(&input_ranking, pro_index, config.cut_point, &norms)?;

    let objective =
        FairObjective::new(population, config.prototypes, config.accuracy, config.weights)?;
    let started = Instant::now();
    let optimization = optimize(&objective, minimizer, &config.solver, rng)?;
    let seconds = started.elapsed().as_secs_f64();
    info!(
        "optimization finished in {seconds:.2}s after {} evaluations ({})",
        optimization.evaluations, optimization.outcome.reason
    );

    let estimated_ranking =
        rank_by_scores(&optimization.results.estimated_scores, config.direction);
    let converged =
        FairnessScores::evaluate(&estimated_ranking, pro_index, config.cut_point, &norms)?;

    let summary = RunSummary {
        users,
        protected,
        prototypes: config.prototypes,
        target: target.to_owned(),
        accuracy_measure: config.accuracy,
        accuracy_value: optimization.results.accuracy,
        input,
        converged,
        normalizers: norms,
        solver_converged: optimization.outcome.converged,
        evaluations: optimization.evaluations,
        seconds,
    };
    Ok(Experiment { summary, optimization, estimated_ranking })
}

// ─── Synthetic sweep ─────────────────────────────────────────────────────────

/// Settings for [`synthetic_sweep`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SweepConfig {
    /// Generated rankings averaged per proportion. Default 100.
    pub trials: usize,
    /// Cut-point for scoring. Default 10.
    pub cut_point: usize,
    /// Normalizer calibration settings.
    pub calibration: CalibrationConfig,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self { trials: 100, cut_point: 10, calibration: CalibrationConfig::default() }
    }
}

impl SweepConfig {
    /// Override the trial count.
    #[must_use]
    pub fn with_trials(mut self, trials: usize) -> Self {
        self.trials = trials;
        self
    }
}

/// Average normalized fairness per mixing proportion.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SweepResult {
    /// Population size N.
    pub users: usize,
    /// Protected group size K.
    pub protected: usize,
    /// Measure swept.
    pub measure: FairnessMeasure,
    /// Normalizer applied.
    pub normalizer: f64,
    /// `(proportion, average)` in [`MIXING_PROPORTIONS`] order.
    pub averages: Vec<(f64, f64)>,
}

impl SweepResult {
    /// `MP0.0,MP0.1,…,MP0.98`.
    pub fn csv_header() -> String {
        MIXING_PROPORTIONS
            .iter()
            .map(|p| format!("MP{p:?}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Averages in header order.
    pub fn to_csv_row(&self) -> String {
        self.averages
            .iter()
            .map(|(_, avg)| avg.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Score generated rankings of `users` individuals (`0..protected` protected)
/// at every proportion in [`MIXING_PROPORTIONS`].
pub fn synthetic_sweep<R: Rng + ?Sized>(
    users: usize,
    protected: usize,
    measure: FairnessMeasure,
    config: &SweepConfig,
    table: &mut NormalizerTable,
    rng: &mut R,
) -> Result<SweepResult> {
    if config.trials == 0 {
        return Err(RankFairError::out_of_range("sweep trials", "must be at least 1"));
    }
    let key = NormalizerKey::new(users, protected, measure);
    let normalizer = table.get_or_calibrate(key, &config.calibration, rng)?;
    let ranking: Vec<usize> = (0..users).collect();
    let protected_ids: Vec<usize> = (0..protected).collect();

    let cut_point = config.cut_point;
    let mut averages = Vec::with_capacity(MIXING_PROPORTIONS.len());
    for p in MIXING_PROPORTIONS {
        let mut sum = 0.0;
        for _ in 0..config.trials {
            let sample = generate_unfair_ranking(&ranking, &protected_ids, p, rng)?;
            sum += discounted_fairness(&sample, &protected_ids, cut_point, measure, normalizer)?;
        }
        averages.push((p, sum / config.trials as f64));
        info!("sweep {measure} N={users} K={protected}: finished mixing proportion {p}");
    }
    Ok(SweepResult { users, protected, measure, normalizer, averages })
}

// ─── Attribute audit ─────────────────────────────────────────────────────────

/// Fairness of the ranking induced by one attribute column.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttributeFairness {
    /// Population size N.
    pub users: usize,
    /// Protected group size K.
    pub protected: usize,
    /// `K / N` as a whole percentage.
    pub protected_percent: usize,
    /// Column index in the feature matrix.
    pub column: usize,
    /// Direction the column was ranked in.
    pub direction: SortDirection,
    /// Normalized fairness of the column's ranking.
    pub scores: FairnessScores,
}

impl AttributeFairness {
    /// Column names matching [`AttributeFairness::to_csv_row`].
    pub fn csv_header() -> &'static str {
        "Dataset,User_N,SensitiveATT,Pro_N,Pro_percent,TargetAtt,rKL,rND,rRD"
    }

    /// Comma-separated values, no trailing newline. The dataset, sensitive
    /// attribute and target attribute names are labels the population does
    /// not carry.
    pub fn to_csv_row(&self, dataset: &str, sensitive: &str, target: &str) -> String {
        format!(
            "{dataset},{},{sensitive},{},{},{target},{},{},{}",
            self.users,
            self.protected,
            self.protected_percent,
            self.scores.kl,
            self.scores.nd,
            self.scores.rd
        )
    }
}

/// Rank `population` by each attribute column in turn and score every
/// ranking against the protected group.
///
/// `directions` holds one entry per column. The normalizers depend only on
/// `(N, K)`, so they are fetched once and shared by every column.
pub fn attribute_fairness<R: Rng + ?Sized>(
    population: &Population,
    directions: &[SortDirection],
    cut_point: usize,
    calibration: &CalibrationConfig,
    table: &mut NormalizerTable,
    rng: &mut R,
) -> Result<Vec<AttributeFairness>> {
    let users = population.len();
    let protected = population.protected_len();
    if directions.len() != population.attributes() {
        return Err(RankFairError::shape(
            "attribute directions",
            population.attributes(),
            directions.len(),
        ));
    }
    if cut_point == 0 || cut_point > users {
        return Err(RankFairError::out_of_range(
            "cut point",
            format!("{cut_point} must be in 1..={users}"),
        ));
    }

    let norms = normalizers(table, users, protected, calibration, rng)?;
    let protected_percent = (protected as f64 * 100.0 / users as f64).round() as usize;
    let features = population.features();

    directions
        .iter()
        .enumerate()
        .map(|(column, &direction)| -> Result<AttributeFairness> {
            let ranking = rank_by_scores(&features.column(column), direction);
            let pro_index = population.protected_index();
            let scores = FairnessScores::evaluate(&ranking, pro_index, cut_point, &norms)?;
            info!("attribute {column} ({direction:?}) N={users} K={protected}: {scores:?}");
            Ok(AttributeFairness { users, protected, protected_percent, column, direction, scores })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SolverTolerances;
    use crate::matrix::Matrix;
    use crate::optimizer::ProjectedLbfgs;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_sweep_header() {
        assert_eq!(
            SweepResult::csv_header(),
            "MP0.0,MP0.1,MP0.2,MP0.3,MP0.4,MP0.5,MP0.6,MP0.7,MP0.8,MP0.9,MP0.98"
        );
    }

    #[test]
    fn test_sweep_covers_every_proportion() {
        let mut table = NormalizerTable::new();
        let config = SweepConfig::default().with_trials(5);
        let mut rng = StdRng::seed_from_u64(2);
        let nd = FairnessMeasure::NormalizedDifference;
        let out = synthetic_sweep(100, 30, nd, &config, &mut table, &mut rng).unwrap();
        assert_eq!(out.averages.len(), MIXING_PROPORTIONS.len());
        assert_eq!(table.len(), 1);
        assert_eq!(out.to_csv_row().split(',').count(), 11);
        assert!(out.averages.iter().all(|&(_, v)| v >= 0.0));
    }

    #[test]
    fn test_normalizers_fill_table() {
        let mut table = NormalizerTable::new();
        let config = CalibrationConfig::default();
        let n = normalizers(&mut table, 50, 20, &config, &mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(table.len(), 3);
        assert!(n.kl > 0.0 && n.nd > 0.0 && n.rd > 0.0);
    }

    #[test]
    fn test_run_experiment_summary() {
        let mut rng = StdRng::seed_from_u64(13);
        let rows: Vec<[f64; 2]> =
            (0..20).map(|i| [i as f64 / 20.0, ((i * 7) % 20) as f64 / 20.0]).collect();
        let features = Matrix::from_rows(&rows).unwrap();
        let scores = features.row_means();
        let flags: Vec<bool> = (0..20).map(|i| i % 3 == 0).collect();
        let pop = Population::from_group_flags(features, scores, &flags).unwrap();

        let config = RunConfig::default()
            .with_prototypes(2)
            .with_solver(SolverTolerances::default().with_max_evaluations(300));
        let mut table = NormalizerTable::new();
        let exp =
            run_experiment(&pop, "mean", &config, &ProjectedLbfgs, &mut table, &mut rng).unwrap();

        assert_eq!(exp.summary.users, 20);
        assert_eq!(exp.summary.protected, 7);
        assert_eq!(exp.estimated_ranking.len(), 20);
        assert!(exp.summary.evaluations <= 300);
        let row = exp.summary.to_csv_row();
        assert_eq!(row.split(',').count(), RunSummary::csv_header().split(',').count());
        assert!(row.starts_with("20,7,2,mean,scoreDiff,"));
    }

    #[test]
    fn test_run_ranks_estimated_scores_in_configured_direction() {
        let mut rng = StdRng::seed_from_u64(5);
        let rows: Vec<[f64; 1]> = (0..20).map(|i| [i as f64 / 20.0]).collect();
        let features = Matrix::from_rows(&rows).unwrap();
        let scores = features.row_means();
        let flags: Vec<bool> = (0..20).map(|i| i % 4 == 0).collect();
        let pop = Population::from_group_flags(features, scores, &flags).unwrap();

        let config = RunConfig::default()
            .with_prototypes(3)
            .with_direction(SortDirection::LowerIsBetter)
            .with_solver(SolverTolerances::default().with_max_evaluations(400));
        let mut table = NormalizerTable::new();
        let exp =
            run_experiment(&pop, "x", &config, &ProjectedLbfgs, &mut table, &mut rng).unwrap();

        let estimated = &exp.optimization.results.estimated_scores;
        assert_eq!(exp.estimated_ranking, rank_by_scores(estimated, SortDirection::LowerIsBetter));

        // the reconstruction is monotone in the single attribute, so the
        // lowest input score stays ahead of the highest one
        let input = pop.input_ranking(SortDirection::LowerIsBetter);
        assert_eq!(input[0], 0);
        let pos = |id: usize| exp.estimated_ranking.iter().position(|&x| x == id).unwrap();
        assert!(pos(0) < pos(19));
    }

    #[test]
    fn test_attribute_fairness_rows() {
        // both columns fall with the id; descending puts the protected group
        // (ids 0..6) first, ascending puts it last
        let rows: Vec<[f64; 2]> = (0..20).map(|i| [(20 - i) as f64, (20 - i) as f64]).collect();
        let features = Matrix::from_rows(&rows).unwrap();
        let scores = features.row_means();
        let pop = Population::new(features, scores, (0..6).collect()).unwrap();

        let mut table = NormalizerTable::new();
        let directions = [SortDirection::HigherIsBetter, SortDirection::LowerIsBetter];
        let config = CalibrationConfig::default();
        let mut rng = StdRng::seed_from_u64(9);
        let out = attribute_fairness(&pop, &directions, 10, &config, &mut table, &mut rng).unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(table.len(), 3);
        assert_eq!(out[0].protected_percent, 30);
        assert_eq!(out[1].direction, SortDirection::LowerIsBetter);
        assert!(out[0].scores.nd > 0.0 && out[1].scores.nd > 0.0);
        // rRD only counts prefixes short of protected members
        assert_eq!(out[0].scores.rd, 0.0);
        assert!(out[1].scores.rd > 0.0);
        assert_ne!(out[0].scores, out[1].scores);

        let row = out[1].to_csv_row("German", "sex", "age");
        assert!(row.starts_with("German,20,sex,6,30,age,"));
        assert_eq!(row.split(',').count(), AttributeFairness::csv_header().split(',').count());
    }

    #[test]
    fn test_attribute_fairness_rejects_direction_count() {
        let features = Matrix::from_rows(&[[0.0, 1.0], [1.0, 0.0], [2.0, 2.0]]).unwrap();
        let pop = Population::new(features, vec![0.0, 1.0, 2.0], vec![0]).unwrap();
        let err = attribute_fairness(
            &pop,
            &[SortDirection::HigherIsBetter],
            2,
            &CalibrationConfig::default(),
            &mut NormalizerTable::new(),
            &mut StdRng::seed_from_u64(0),
        );
        assert!(matches!(err, Err(RankFairError::Shape { .. })));
    }

    #[test]
    fn test_run_rejects_cut_point_beyond_population() {
        let features = Matrix::from_rows(&[[0.0], [1.0], [2.0]]).unwrap();
        let pop = Population::new(features, vec![0.0, 1.0, 2.0], vec![0]).unwrap();
        let err = run_experiment(
            &pop,
            "x",
            &RunConfig::default(),
            &ProjectedLbfgs,
            &mut NormalizerTable::new(),
            &mut StdRng::seed_from_u64(0),
        );
        assert!(matches!(err, Err(RankFairError::OutOfRange { .. })));
    }
}
