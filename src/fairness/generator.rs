/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Synthetic rankings with a controlled degree of group mixing.
//!
//! The input ranking is split into its protected and unprotected members,
//! each keeping its relative order. The output is built one position at a
//! time: a coin with weight `probability` picks the protected pool, otherwise
//! the unprotected pool. Once either pool runs dry the rest of the other is
//! appended unchanged.
//!
//! - `probability = 0` ranks every unprotected member before every protected one.
//! - `probability = 0.5` interleaves the groups by a fair coin.
//! - `probability → 1` pushes the protected group to the top.

use hashbrown::HashSet;
use rand::Rng;

use crate::error::{RankFairError, Result};
use crate::ranking::validate_protected_group;

/// Draw a ranking of the same identifiers with mixing governed by `probability`.
///
/// Rejects a malformed ranking or protected group and probabilities outside [0, 1].
pub fn generate_unfair_ranking<R: Rng + ?Sized>(
    ranking: &[usize],
    protected: &[usize],
    probability: f64,
    rng: &mut R,
) -> Result<Vec<usize>> {
    validate_protected_group(ranking, protected)?;
    if !(0.0..=1.0).contains(&probability) {
        return Err(RankFairError::out_of_range(
            "fairness probability",
            format!("{probability} is not in [0, 1]"),
        ));
    }

    let protected: HashSet<usize> = protected.iter().copied().collect();
    let (pro, unpro): (Vec<usize>, Vec<usize>) =
        ranking.iter().partition(|id| protected.contains(*id));

    let mut out = Vec::with_capacity(ranking.len());
    let (mut i, mut j) = (0, 0);
    while i < pro.len() && j < unpro.len() {
        if rng.gen::<f64>() < probability {
            out.push(pro[i]);
            i += 1;
        } else {
            out.push(unpro[j]);
            j += 1;
        }
    }
    out.extend_from_slice(&pro[i..]);
    out.extend_from_slice(&unpro[j..]);
    Ok(out)
}
