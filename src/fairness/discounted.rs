/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Discounted prefix accumulation of a fairness divergence over a ranking.
//!
//! ```text
//! score = (1 / normalizer) · Σ_{i ∈ {c, 2c, 3c, …} ≤ N} divergence(prefix_i) / log₂(i + 1)
//! ```
//!
//! One forward scan keeps a running protected count, so each prefix costs
//! O(1) and the whole ranking O(N). Positions after the last multiple of the
//! cut-point contribute nothing.

use hashbrown::HashSet;

use super::FairnessMeasure;
use crate::error::{RankFairError, Result};
use crate::ranking::validate_protected_group;

/// Normalized fairness of `ranking` with respect to `protected`.
///
/// Errors when the ranking or protected group is malformed, when
/// `cut_point` is 0 or exceeds the ranking length, or when `normalizer` is
/// exactly zero. Pass `normalizer = 1.0` for the raw discounted sum.
pub fn discounted_fairness(
    ranking: &[usize],
    protected: &[usize],
    cut_point: usize,
    measure: FairnessMeasure,
    normalizer: f64,
) -> Result<f64> {
    validate_protected_group(ranking, protected)?;
    if cut_point == 0 {
        return Err(RankFairError::out_of_range("cut point", "must be at least 1"));
    }
    if cut_point > ranking.len() {
        return Err(RankFairError::out_of_range(
            "cut point",
            format!("{cut_point} exceeds ranking length {}", ranking.len()),
        ));
    }
    if normalizer == 0.0 {
        return Err(RankFairError::ZeroNormalizer);
    }

    let total = ranking.len();
    let total_protected = protected.len();
    let protected: HashSet<usize> = protected.iter().copied().collect();

    let mut seen_protected = 0usize;
    let mut discounted = 0.0;
    for (pos, id) in ranking.iter().enumerate() {
        if protected.contains(id) {
            seen_protected += 1;
        }
        let prefix_len = pos + 1;
        if prefix_len % cut_point == 0 {
            let gf = measure.divergence(prefix_len, seen_protected, total, total_protected);
            discounted += gf / ((prefix_len + 1) as f64).log2();
        }
    }
    Ok(discounted / normalizer)
}

// ─── FairnessScores ──────────────────────────────────────────────────────────

/// One value per fairness measure.
///
/// Holds either the three calibrated normalizers of a population or the three
/// normalized scores of one ranking.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FairnessScores {
    /// rKL value.
    pub kl: f64,
    /// rND value.
    pub nd: f64,
    /// rRD value.
    pub rd: f64,
}

impl FairnessScores {
    /// Build by evaluating `f` for every measure.
    pub fn try_from_fn(mut f: impl FnMut(FairnessMeasure) -> Result<f64>) -> Result<Self> {
        Ok(Self {
            kl: f(FairnessMeasure::KlDivergence)?,
            nd: f(FairnessMeasure::NormalizedDifference)?,
            rd: f(FairnessMeasure::RatioDifference)?,
        })
    }

    /// Value for `measure`.
    pub fn get(&self, measure: FairnessMeasure) -> f64 {
        match measure {
            FairnessMeasure::KlDivergence => self.kl,
            FairnessMeasure::NormalizedDifference => self.nd,
            FairnessMeasure::RatioDifference => self.rd,
        }
    }

    /// Score `ranking` under all three measures, each divided by its entry in `normalizers`.
    pub fn evaluate(
        ranking: &[usize],
        protected: &[usize],
        cut_point: usize,
        normalizers: &FairnessScores,
    ) -> Result<Self> {
        Self::try_from_fn(|m| {
            discounted_fairness(ranking, protected, cut_point, m, normalizers.get(m))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn identity(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    #[test]
    fn test_nd_literal_accumulation() {
        // N=100, protected = 0..50, identity ranking: prefixes 10..50 are all
        // protected, 60..100 add unprotected members
        let ranking = identity(100);
        let protected = identity(50);
        let nd = FairnessMeasure::NormalizedDifference;
        let got = discounted_fairness(&ranking, &protected, 10, nd, 1.0).unwrap();

        let mut expected = 0.0;
        for i in (10..=100).step_by(10) {
            let k = i.min(50) as f64;
            expected += (k / i as f64 - 0.5).abs() / ((i + 1) as f64).log2();
        }
        assert_abs_diff_eq!(got, expected, epsilon = 1e-12);

        // the first prefix alone contributes |10/10 − 0.5| / log₂ 11
        let first = 0.5 / 11f64.log2();
        assert!(got > first);
    }

    #[test]
    fn test_remainder_rows_are_ignored() {
        // with cut point 4 on 10 items only prefixes 4 and 8 count
        let ranking = identity(10);
        let protected = vec![8, 9];
        let nd = FairnessMeasure::NormalizedDifference;
        let a = discounted_fairness(&ranking, &protected, 4, nd, 1.0).unwrap();
        let expected = 0.2 / 5f64.log2() + 0.2 / 9f64.log2();
        assert_abs_diff_eq!(a, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_normalizer_divides() {
        let ranking = identity(20);
        let protected = identity(5);
        let kl = FairnessMeasure::KlDivergence;
        let raw = discounted_fairness(&ranking, &protected, 5, kl, 1.0).unwrap();
        let half = discounted_fairness(&ranking, &protected, 5, kl, 2.0).unwrap();
        assert_abs_diff_eq!(raw / 2.0, half, epsilon = 1e-12);
    }

    #[test]
    fn test_rejections() {
        let ranking = identity(20);
        let protected = identity(5);
        let m = FairnessMeasure::RatioDifference;
        assert!(matches!(
            discounted_fairness(&ranking, &protected, 5, m, 0.0),
            Err(RankFairError::ZeroNormalizer)
        ));
        assert!(discounted_fairness(&ranking, &protected, 0, m, 1.0).is_err());
        assert!(discounted_fairness(&ranking, &protected, 21, m, 1.0).is_err());
        assert!(discounted_fairness(&ranking, &[], 5, m, 1.0).is_err());
        assert!(discounted_fairness(&ranking, &[25], 5, m, 1.0).is_err());
    }

    #[test]
    fn test_evaluate_all_measures() {
        let ranking = identity(20);
        let protected: Vec<usize> = (10..20).collect();
        let ones = FairnessScores { kl: 1.0, nd: 1.0, rd: 1.0 };
        let scores = FairnessScores::evaluate(&ranking, &protected, 5, &ones).unwrap();
        for m in FairnessMeasure::ALL {
            assert_abs_diff_eq!(
                scores.get(m),
                discounted_fairness(&ranking, &protected, 5, m, 1.0).unwrap(),
                epsilon = 1e-12
            );
        }
    }
}
