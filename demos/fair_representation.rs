//! Learn a fair representation of a generated population.
//!
//! Usage: `cargo run --release --example fair_representation -- [accuracy-measure] [k]`
//!
//! The population has two attributes; the protected group is drawn with
//! lower values so the input ranking is visibly unfair. Prints the result row.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rankfair::population::equal_weight_scores;
use rankfair::{
    run_experiment, AccuracyMeasure, Matrix, NormalizerTable, Population, ProjectedLbfgs, RunConfig,
    RunSummary, SolverTolerances,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let accuracy: AccuracyMeasure =
        args.first().map_or(Ok(AccuracyMeasure::ScoreDifference), |s| s.parse())?;
    let k: usize = args.get(1).map_or(Ok(4), |s| s.parse())?;

    let mut rng = StdRng::seed_from_u64(7);
    let users = 120;
    let mut rows = Vec::with_capacity(users);
    let mut flags = Vec::with_capacity(users);
    for i in 0..users {
        let protected = i % 3 == 0;
        let shift = if protected { 0.0 } else { 0.3 };
        rows.push([shift + rng.gen::<f64>() * 0.7, shift + rng.gen::<f64>() * 0.7]);
        flags.push(protected);
    }
    let features = Matrix::from_rows(&rows)?;
    let scores = equal_weight_scores(&features)?;
    let population = Population::from_group_flags(features, scores, &flags)?;

    let config = RunConfig::default()
        .with_prototypes(k)
        .with_accuracy(accuracy)
        .with_solver(SolverTolerances::default().with_max_evaluations(5_000));
    let mut table = NormalizerTable::new();
    let experiment =
        run_experiment(&population, "mean", &config, &ProjectedLbfgs, &mut table, &mut rng)?;

    println!("{}", RunSummary::csv_header());
    println!("{}", experiment.summary.to_csv_row());
    Ok(())
}
