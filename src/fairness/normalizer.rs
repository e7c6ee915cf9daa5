/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Monte-Carlo normalizers and their persisted cache.
//!
//! The normalizer of `(N, K, measure)` approximates the worst raw discounted
//! score a ranking of that population can reach. It is estimated by scoring
//! synthetic rankings at two extreme mixing probabilities and keeping the
//! larger average. Dividing by it maps fairness scores into roughly [0, 1].
//!
//! # Table format
//!
//! One entry per line, `N,K,measure:value`, e.g. `1000,300,rKL:0.8417`.
//! Blank lines and lines starting with `#` are ignored.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use hashbrown::HashMap;
use log::{debug, warn};
use rand::Rng;

use super::{discounted_fairness, generate_unfair_ranking, FairnessMeasure};
use crate::config::CalibrationConfig;
use crate::error::{RankFairError, Result};

/// The two mixing probabilities averaged during calibration.
///
/// rRD is undefined in the fully segregated direction, so it calibrates
/// against a fair coin instead of the near-certain one.
pub fn calibration_probabilities(measure: FairnessMeasure) -> [f64; 2] {
    match measure {
        FairnessMeasure::KlDivergence | FairnessMeasure::NormalizedDifference => [0.0, 0.98],
        FairnessMeasure::RatioDifference => [0.0, 0.5],
    }
}

/// Estimate the normalizer for a population of `users` with `protected` members.
///
/// The identity ranking `0..users` is shuffled by the generator
/// `config.trials` times per probability, each result is scored with
/// normalizer 1, and the larger of the two averages is returned.
pub fn calibrate_normalizer<R: Rng + ?Sized>(
    users: usize,
    protected: usize,
    measure: FairnessMeasure,
    config: &CalibrationConfig,
    rng: &mut R,
) -> Result<f64> {
    if protected == 0 || protected >= users {
        return Err(RankFairError::InvalidProtectedGroup(format!(
            "protected size {protected} must be in 1..{users}"
        )));
    }
    if config.trials == 0 {
        return Err(RankFairError::out_of_range("calibration trials", "must be at least 1"));
    }

    let ranking: Vec<usize> = (0..users).collect();
    let protected_ids: Vec<usize> = (0..protected).collect();

    let mut best = f64::NEG_INFINITY;
    for probability in calibration_probabilities(measure) {
        let mut sum = 0.0;
        for _ in 0..config.trials {
            let sample = generate_unfair_ranking(&ranking, &protected_ids, probability, rng)?;
            sum += discounted_fairness(&sample, &protected_ids, config.cut_point, measure, 1.0)?;
        }
        let average = sum / config.trials as f64;
        debug!("calibration {measure} N={users} K={protected} p={probability}: mean {average:.6}");
        best = best.max(average);
    }
    Ok(best)
}

// ─── NormalizerKey ───────────────────────────────────────────────────────────

/// Identifies one normalizer: population size, protected size, measure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NormalizerKey {
    /// Population size N.
    pub users: usize,
    /// Protected group size K.
    pub protected: usize,
    /// Fairness measure.
    pub measure: FairnessMeasure,
}

impl NormalizerKey {
    /// Key for `(users, protected, measure)`.
    pub fn new(users: usize, protected: usize, measure: FairnessMeasure) -> Self {
        Self { users, protected, measure }
    }
}

impl fmt::Display for NormalizerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.users, self.protected, self.measure)
    }
}

// ─── NormalizerTable ─────────────────────────────────────────────────────────

/// Cache of calibrated normalizers.
#[derive(Clone, Debug, Default)]
pub struct NormalizerTable {
    entries: HashMap<NormalizerKey, f64>,
}

impl NormalizerTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read entries from `reader`. Malformed lines are logged and skipped.
    pub fn parse<R: BufRead>(reader: R) -> Result<Self> {
        let mut table = Self::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match parse_entry(trimmed) {
                Ok((key, value)) => {
                    table.entries.insert(key, value);
                }
                Err(e) => warn!("skipping normalizer line {}: {e}", lineno + 1),
            }
        }
        Ok(table)
    }

    /// Read a table file. A missing file yields an empty table.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match File::open(path) {
            Ok(file) => Self::parse(BufReader::new(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("normalizer file {} not found; starting empty", path.display());
                Ok(Self::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write every entry as `N,K,measure:value`, sorted by key.
    pub fn write<W: Write>(&self, mut writer: W) -> Result<()> {
        let mut keys: Vec<&NormalizerKey> = self.entries.keys().collect();
        keys.sort_unstable_by_key(|k| (k.users, k.protected, k.measure));
        for key in keys {
            writeln!(writer, "{key}:{}", self.entries[key])?;
        }
        Ok(())
    }

    /// Write the table to `path`, replacing any existing file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = io::BufWriter::new(file);
        self.write(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Store a normalizer. Returns the previous value, if any.
    pub fn insert(&mut self, key: NormalizerKey, value: f64) -> Option<f64> {
        self.entries.insert(key, value)
    }

    /// Cached normalizer for `key`.
    pub fn get(&self, key: &NormalizerKey) -> Option<f64> {
        self.entries.get(key).copied()
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached normalizer for `key`, calibrating and caching it on a miss.
    pub fn get_or_calibrate<R: Rng + ?Sized>(
        &mut self,
        key: NormalizerKey,
        config: &CalibrationConfig,
        rng: &mut R,
    ) -> Result<f64> {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = calibrate_normalizer(key.users, key.protected, key.measure, config, rng)?;
        debug!("calibrated normalizer {key}:{value}");
        self.entries.insert(key, value);
        Ok(value)
    }
}

fn parse_entry(line: &str) -> Result<(NormalizerKey, f64)> {
    let malformed = || RankFairError::Parse(line.to_owned());
    let (key, value) = line.split_once(':').ok_or_else(malformed)?;
    let mut parts = key.split(',').map(str::trim);
    let (Some(users), Some(protected), Some(measure), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed());
    };
    let users = users.parse::<usize>().map_err(|_| malformed())?;
    let protected = protected.parse::<usize>().map_err(|_| malformed())?;
    let measure = measure.parse::<FairnessMeasure>()?;
    let value = value.trim().parse::<f64>().map_err(|_| malformed())?;
    Ok((NormalizerKey::new(users, protected, measure), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_probabilities_per_measure() {
        assert_eq!(calibration_probabilities(FairnessMeasure::KlDivergence), [0.0, 0.98]);
        assert_eq!(calibration_probabilities(FairnessMeasure::NormalizedDifference), [0.0, 0.98]);
        assert_eq!(calibration_probabilities(FairnessMeasure::RatioDifference), [0.0, 0.5]);
    }

    #[test]
    fn test_calibration_is_positive_and_seeded() {
        let config = CalibrationConfig::default();
        for m in FairnessMeasure::ALL {
            let a =
                calibrate_normalizer(100, 30, m, &config, &mut StdRng::seed_from_u64(5)).unwrap();
            let b =
                calibrate_normalizer(100, 30, m, &config, &mut StdRng::seed_from_u64(5)).unwrap();
            assert!(a > 0.0, "{m} normalizer {a}");
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_calibration_rejects_degenerate_sizes() {
        let config = CalibrationConfig::default();
        let mut rng = StdRng::seed_from_u64(0);
        let m = FairnessMeasure::NormalizedDifference;
        assert!(calibrate_normalizer(100, 0, m, &config, &mut rng).is_err());
        assert!(calibrate_normalizer(100, 100, m, &config, &mut rng).is_err());
        assert!(calibrate_normalizer(100, 10, m, &config.with_trials(0), &mut rng).is_err());
    }

    #[test]
    fn test_parse_skips_malformed_lines() {
        let text = "100,30,rKL:0.5\n# comment\n\nbad line\n100,30,rXX:1.0\n200,50,rND:0.25\n";
        let table = NormalizerTable::parse(text.as_bytes()).unwrap();
        assert_eq!(table.len(), 2);
        let kl = NormalizerKey::new(100, 30, FairnessMeasure::KlDivergence);
        let nd = NormalizerKey::new(200, 50, FairnessMeasure::NormalizedDifference);
        assert_eq!(table.get(&kl), Some(0.5));
        assert_eq!(table.get(&nd), Some(0.25));
    }

    #[test]
    fn test_write_then_parse() {
        let mut table = NormalizerTable::new();
        table.insert(NormalizerKey::new(200, 50, FairnessMeasure::RatioDifference), 0.75);
        table.insert(NormalizerKey::new(100, 30, FairnessMeasure::KlDivergence), 1.5);
        let mut buf = Vec::new();
        table.write(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf.clone()).unwrap(), "100,30,rKL:1.5\n200,50,rRD:0.75\n");
        let back = NormalizerTable::parse(buf.as_slice()).unwrap();
        assert_eq!(back.len(), 2);
    }

    #[test]
    fn test_missing_file_is_empty_table() {
        let table = NormalizerTable::load("/nonexistent/rankfair/normalizers.txt").unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_get_or_calibrate_caches() {
        let mut table = NormalizerTable::new();
        let key = NormalizerKey::new(60, 20, FairnessMeasure::NormalizedDifference);
        let config = CalibrationConfig::default();
        let first = table.get_or_calibrate(key, &config, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(table.get(&key), Some(first));
        // a different seed would calibrate differently; the cached value wins
        let second = table.get_or_calibrate(key, &config, &mut StdRng::seed_from_u64(99)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_preloaded_entry_skips_calibration() {
        let mut table = NormalizerTable::new();
        let key = NormalizerKey::new(60, 20, FairnessMeasure::KlDivergence);
        table.insert(key, 42.0);
        let v = table
            .get_or_calibrate(key, &CalibrationConfig::default(), &mut StdRng::seed_from_u64(1))
            .unwrap();
        assert_eq!(v, 42.0);
    }
}
