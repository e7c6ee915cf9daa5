//! Synthetic fairness sweep.
//!
//! Usage: `cargo run --example synthetic_sweep -- [users] [protected] [measure] [normalizer-file]`
//!
//! Prints the CSV header and one row of averaged normalized fairness per
//! mixing proportion. Calibrated normalizers are cached in the table file.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rankfair::{synthetic_sweep, FairnessMeasure, NormalizerTable, SweepConfig, SweepResult};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let users: usize = args.first().map_or(Ok(1000), |s| s.parse())?;
    let protected: usize = args.get(1).map_or(Ok(300), |s| s.parse())?;
    let measure: FairnessMeasure =
        args.get(2).map_or(Ok(FairnessMeasure::NormalizedDifference), |s| s.parse())?;
    let table_path = args.get(3).cloned().unwrap_or_else(|| "normalizers.txt".to_owned());

    let mut table = NormalizerTable::load(&table_path)?;
    let mut rng = StdRng::seed_from_u64(2024);
    let config = SweepConfig::default();
    let result = synthetic_sweep(users, protected, measure, &config, &mut table, &mut rng)?;
    table.save(&table_path)?;

    println!("{}", SweepResult::csv_header());
    println!("{}", result.to_csv_row());
    Ok(())
}
