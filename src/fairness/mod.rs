/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Set-wise group fairness of rankings: rKL, rND and rRD.
//!
//! A ranking is cut at every multiple of a cut-point; each prefix is compared
//! with the whole population by one of three divergences, the divergences are
//! discounted by `1 / log₂(position + 1)` and summed, and the sum is divided
//! by a calibrated normalizer so that results land in [0, 1].
//!
//! | Item | What it does |
//! |------|--------------|
//! | [`FairnessMeasure`] | Per-prefix divergence formulas |
//! | [`discounted_fairness`] | Discounted, normalized score of a whole ranking |
//! | [`generate_unfair_ranking`] | Synthetic ranking with a controlled mixing probability |
//! | [`calibrate_normalizer`] | Monte-Carlo normalizer for (N, K, measure) |
//! | [`NormalizerTable`] | Keyed normalizer cache with a plain-text persisted form |

use core::fmt;
use core::str::FromStr;

use crate::error::{RankFairError, Result};

pub mod discounted;
pub mod generator;
pub mod normalizer;

pub use discounted::{discounted_fairness, FairnessScores};
pub use generator::generate_unfair_ranking;
pub use normalizer::{
    calibrate_normalizer, calibration_probabilities, NormalizerKey, NormalizerTable,
};

/// Probability substituted for 0 or 1 in the KL divergence to keep `log₂` finite.
pub const KL_BOUNDARY_CLAMP: f64 = 0.001;

// ─── FairnessMeasure ─────────────────────────────────────────────────────────

/// Closed set of group-fairness divergences.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FairnessMeasure {
    /// rKL: KL divergence between prefix and population protected proportions.
    KlDivergence,
    /// rND: absolute difference of prefix and population protected proportions.
    NormalizedDifference,
    /// rRD: shortfall of the prefix protected/unprotected ratio below the population's.
    RatioDifference,
}

impl FairnessMeasure {
    /// Every measure, in declaration order.
    pub const ALL: [FairnessMeasure; 3] =
        [Self::KlDivergence, Self::NormalizedDifference, Self::RatioDifference];

    /// Short key used in normalizer tables and result files.
    pub fn key(self) -> &'static str {
        match self {
            Self::KlDivergence => "rKL",
            Self::NormalizedDifference => "rND",
            Self::RatioDifference => "rRD",
        }
    }

    /// Unnormalized divergence of one prefix.
    ///
    /// - `prefix_len` (n): prefix size, > 0
    /// - `prefix_protected` (k): protected members in the prefix
    /// - `total` (N): population size
    /// - `total_protected` (K): protected members in the population, 0 < K < N
    pub fn divergence(
        self,
        prefix_len: usize,
        prefix_protected: usize,
        total: usize,
        total_protected: usize,
    ) -> f64 {
        let n = prefix_len as f64;
        let k = prefix_protected as f64;
        let big_n = total as f64;
        let big_k = total_protected as f64;
        match self {
            Self::KlDivergence => {
                let p = clamp_boundary(k / n);
                let q = clamp_boundary(big_k / big_n);
                p * (p / q).log2() + (1.0 - p) * ((1.0 - p) / (1.0 - q)).log2()
            }
            Self::NormalizedDifference => (k / n - big_k / big_n).abs(),
            Self::RatioDifference => {
                let input_ratio = big_k / (big_n - big_k);
                let unprotected = prefix_len - prefix_protected;
                let current_ratio = if unprotected == 0 { 0.0 } else { k / unprotected as f64 };
                (input_ratio.min(current_ratio) - input_ratio).abs()
            }
        }
    }
}

fn clamp_boundary(p: f64) -> f64 {
    if p == 0.0 || p == 1.0 {
        KL_BOUNDARY_CLAMP
    } else {
        p
    }
}

impl fmt::Display for FairnessMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for FairnessMeasure {
    type Err = RankFairError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.key() == s)
            .ok_or_else(|| RankFairError::UnknownMeasure { kind: "fairness", key: s.to_owned() })
    }
}
