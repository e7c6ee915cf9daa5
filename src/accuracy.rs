/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Ranking-accuracy measures between an estimated and a target scoring.
//!
//! | Measure | Compares | Range | Loss contributed |
//! |---------|----------|-------|------------------|
//! | [`AccuracyMeasure::ScoreDifference`] | sorted score lists, position-wise | ≥ 0 | value |
//! | [`AccuracyMeasure::PositionDifference`] | rank position of each id | [0, 1] | value |
//! | [`AccuracyMeasure::KendallDistance`] | discordant ordered pairs | [0, 1] | value |
//! | [`AccuracyMeasure::SpearmanCorrelation`] | rank correlation | [−1, 1] | −value |
//! | [`AccuracyMeasure::PearsonCorrelation`] | linear correlation | [−1, 1] | −value |
//!
//! The measure is chosen once per run and handed to the objective; nothing
//! re-dispatches on strings inside the optimization loop. String keys are
//! accepted only through [`core::str::FromStr`].

use core::fmt;
use core::str::FromStr;

use crate::error::{RankFairError, Result};
use crate::ranking::{
    is_descending, positions, rank_by_scores, sort_scores, validate_permutation_pair, SortDirection,
};

// ─── AccuracyMeasure ─────────────────────────────────────────────────────────

/// Closed set of ranking-accuracy measures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AccuracyMeasure {
    /// Mean absolute difference between the two score lists sorted best-first.
    ScoreDifference,
    /// Normalized sum of per-individual rank displacement.
    PositionDifference,
    /// Normalized count of discordant ordered pairs.
    KendallDistance,
    /// Spearman rank correlation (negated as a loss).
    SpearmanCorrelation,
    /// Pearson linear correlation (negated as a loss).
    PearsonCorrelation,
}

impl AccuracyMeasure {
    /// Every measure, in declaration order.
    pub const ALL: [AccuracyMeasure; 5] = [
        Self::ScoreDifference,
        Self::PositionDifference,
        Self::KendallDistance,
        Self::SpearmanCorrelation,
        Self::PearsonCorrelation,
    ];

    /// Short key used in configuration and result files.
    pub fn key(self) -> &'static str {
        match self {
            Self::ScoreDifference => "scoreDiff",
            Self::PositionDifference => "positionDiff",
            Self::KendallDistance => "kendallDis",
            Self::SpearmanCorrelation => "spearmanDis",
            Self::PearsonCorrelation => "pearsonDis",
        }
    }

    /// `true` for the correlation measures, whose loss is the negated value.
    pub fn is_correlation(self) -> bool {
        matches!(self, Self::SpearmanCorrelation | Self::PearsonCorrelation)
    }

    /// Loss of `estimated` against `target`: lower is better for every measure.
    ///
    /// Score lists are sorted and permutations derived here (descending,
    /// stable), so callers pass raw per-individual scores.
    pub fn loss(self, estimated: &[f64], target: &[f64]) -> Result<f64> {
        match self {
            Self::ScoreDifference => score_difference(
                &sort_scores(estimated, SortDirection::HigherIsBetter),
                &sort_scores(target, SortDirection::HigherIsBetter),
            ),
            Self::PositionDifference => position_difference(
                &rank_by_scores(estimated, SortDirection::HigherIsBetter),
                &rank_by_scores(target, SortDirection::HigherIsBetter),
            ),
            Self::KendallDistance => kendall_distance(
                &rank_by_scores(estimated, SortDirection::HigherIsBetter),
                &rank_by_scores(target, SortDirection::HigherIsBetter),
            ),
            Self::SpearmanCorrelation => spearman(estimated, target).map(|r| -r),
            Self::PearsonCorrelation => pearson(estimated, target).map(|r| -r),
        }
    }
}

impl fmt::Display for AccuracyMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for AccuracyMeasure {
    type Err = RankFairError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.key() == s)
            .ok_or_else(|| RankFairError::UnknownMeasure { kind: "accuracy", key: s.to_owned() })
    }
}

// ─── Score-based measures ────────────────────────────────────────────────────

/// Mean position-wise absolute difference of two descending score lists.
///
/// Compares the first `min(len)` positions. Both lists must be non-empty and
/// already sorted in descending order.
pub fn score_difference(first: &[f64], second: &[f64]) -> Result<f64> {
    if first.is_empty() || second.is_empty() {
        return Err(RankFairError::Empty("score list"));
    }
    if !is_descending(first) {
        return Err(RankFairError::NotDescending("first"));
    }
    if !is_descending(second) {
        return Err(RankFairError::NotDescending("second"));
    }
    let n = first.len().min(second.len());
    let total: f64 = first.iter().zip(second).map(|(a, b)| (a - b).abs()).sum();
    Ok(total / n as f64)
}

fn check_paired(first: &[f64], second: &[f64]) -> Result<()> {
    if first.is_empty() || second.is_empty() {
        return Err(RankFairError::Empty("score list"));
    }
    if first.len() != second.len() {
        return Err(RankFairError::shape("paired score lists", first.len(), second.len()));
    }
    Ok(())
}

/// Pearson correlation coefficient.
///
/// Returns 0.0 when either list has zero variance (no linear relationship is
/// defined).
pub fn pearson(first: &[f64], second: &[f64]) -> Result<f64> {
    check_paired(first, second)?;
    Ok(pearson_unchecked(first, second))
}

fn pearson_unchecked(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return 0.0;
    }
    (cov / denom).clamp(-1.0, 1.0)
}

/// Spearman rank correlation: Pearson correlation of average ranks.
pub fn spearman(first: &[f64], second: &[f64]) -> Result<f64> {
    check_paired(first, second)?;
    Ok(pearson_unchecked(&average_ranks(first), &average_ranks(second)))
}

/// 1-based ranks in ascending order, ties sharing their mean rank.
fn average_ranks(values: &[f64]) -> Vec<f64> {
    let order = rank_by_scores(values, SortDirection::LowerIsBetter);
    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // positions start..end (0-based) share rank mean((start+1)..=end)
        let shared = (start + end + 1) as f64 / 2.0;
        for &id in &order[start..end] {
            ranks[id] = shared;
        }
        start = end;
    }
    ranks
}

// ─── Permutation-based measures ──────────────────────────────────────────────

/// Normalized position difference between two permutations of the same ids.
///
/// `Σ_id |pos₁(id) − pos₂(id)|` scaled by `2/N²` for even `N` and
/// `2/(N²−1)` for odd `N`. A single-element pair has difference 0.
pub fn position_difference(first: &[usize], second: &[usize]) -> Result<f64> {
    validate_permutation_pair(first, second)?;
    let n = first.len();
    if n == 1 {
        return Ok(0.0);
    }
    let pos_second = positions(second);
    let mut total = 0usize;
    for (pos_first, id) in first.iter().enumerate() {
        let p2 = pos_second[id];
        total += pos_first.abs_diff(p2);
    }
    let n = n as f64;
    let scale = if first.len() % 2 == 0 { n * n } else { n * n - 1.0 };
    Ok(2.0 * total as f64 / scale)
}

/// Kendall distance: discordant ordered pairs divided by `N(N−1)`.
///
/// Counted in O(N log N) as inversions of the second permutation's positions
/// read in the first permutation's order; each unordered discordant pair
/// corresponds to two ordered ones.
pub fn kendall_distance(first: &[usize], second: &[usize]) -> Result<f64> {
    validate_permutation_pair(first, second)?;
    let n = first.len();
    if n == 1 {
        return Ok(0.0);
    }
    let pos_second = positions(second);
    let mut seq: Vec<usize> = first.iter().map(|id| pos_second[id]).collect();
    let mut scratch = vec![0usize; n];
    let inversions = count_inversions(&mut seq, &mut scratch);
    Ok((2 * inversions) as f64 / (n * (n - 1)) as f64)
}

/// Merge sort `seq` in place, returning the number of inversions it had.
fn count_inversions(seq: &mut [usize], scratch: &mut [usize]) -> u64 {
    let n = seq.len();
    if n < 2 {
        return 0;
    }
    let mid = n / 2;
    let mut count = {
        let (left, right) = seq.split_at_mut(mid);
        let (s_left, s_right) = scratch.split_at_mut(mid);
        count_inversions(left, s_left) + count_inversions(right, s_right)
    };

    let (mut i, mut j, mut k) = (0, mid, 0);
    while i < mid && j < n {
        if seq[i] <= seq[j] {
            scratch[k] = seq[i];
            i += 1;
        } else {
            scratch[k] = seq[j];
            count += (mid - i) as u64;
            j += 1;
        }
        k += 1;
    }
    scratch[k..k + (mid - i)].copy_from_slice(&seq[i..mid]);
    k += mid - i;
    scratch[k..k + (n - j)].copy_from_slice(&seq[j..n]);
    seq.copy_from_slice(&scratch[..n]);
    count
}

// ─── Tests ───────────────────────────────────────────────────────────────────
