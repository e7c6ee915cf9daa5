/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Rankings: derivation from score vectors and permutation validation.
//!
//! A ranking is a permutation of individual identifiers, best first. It is
//! always derived by a *stable* sort of a score vector, so individuals with
//! equal scores keep their input order.

use core::cmp::Ordering;

use hashbrown::{HashMap, HashSet};

use crate::error::{RankFairError, Result};

/// Which end of a score attribute is better.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SortDirection {
    /// Higher scores rank first (the default).
    #[default]
    HigherIsBetter,
    /// Lower scores rank first, e.g. prior counts or risk scores.
    LowerIsBetter,
}

/// Rank identifiers `0..scores.len()` by score.
///
/// The sort is stable: ties keep their prior (index) order. Scores are
/// compared with [`f64::total_cmp`], so NaN never breaks the ordering.
pub fn rank_by_scores(scores: &[f64], direction: SortDirection) -> Vec<usize> {
    let mut ids: Vec<usize> = (0..scores.len()).collect();
    ids.sort_by(|&a, &b| compare(scores[a], scores[b], direction));
    ids
}

/// A copy of `scores` sorted best-first.
pub fn sort_scores(scores: &[f64], direction: SortDirection) -> Vec<f64> {
    let mut sorted = scores.to_vec();
    sorted.sort_by(|&a, &b| compare(a, b, direction));
    sorted
}

fn compare(a: f64, b: f64, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::HigherIsBetter => b.total_cmp(&a),
        SortDirection::LowerIsBetter => a.total_cmp(&b),
    }
}

/// `true` when every element is `>=` its successor.
pub fn is_descending(scores: &[f64]) -> bool {
    scores.windows(2).all(|w| w[0] >= w[1])
}

/// Position of every identifier in `perm`.
pub(crate) fn positions(perm: &[usize]) -> HashMap<usize, usize> {
    perm.iter().enumerate().map(|(pos, &id)| (id, pos)).collect()
}

fn has_repeats(ids: &[usize]) -> bool {
    let mut seen = HashSet::with_capacity(ids.len());
    !ids.iter().all(|id| seen.insert(*id))
}

/// Check that two sequences are permutations of the same identifier set.
///
/// Both must be non-empty, of equal length and free of repeats, and every
/// identifier of `first` must occur in `second`.
pub fn validate_permutation_pair(first: &[usize], second: &[usize]) -> Result<()> {
    if first.is_empty() || second.is_empty() {
        return Err(RankFairError::Empty("permutation"));
    }
    if has_repeats(first) {
        return Err(RankFairError::InvalidPermutation(
            "first permutation contains repeated items".into(),
        ));
    }
    if has_repeats(second) {
        return Err(RankFairError::InvalidPermutation(
            "second permutation contains repeated items".into(),
        ));
    }
    if first.len() != second.len() {
        return Err(RankFairError::InvalidPermutation(format!(
            "permutations differ in length ({} vs {})",
            first.len(),
            second.len()
        )));
    }
    let second_ids: HashSet<usize> = second.iter().copied().collect();
    if let Some(id) = first.iter().find(|id| !second_ids.contains(*id)) {
        return Err(RankFairError::InvalidPermutation(format!(
            "identifier {id} is missing from the second permutation"
        )));
    }
    Ok(())
}

/// Check that `protected` is a proper, non-repeating subset of a repeat-free `ranking`.
pub fn validate_protected_group(ranking: &[usize], protected: &[usize]) -> Result<()> {
    if ranking.is_empty() {
        return Err(RankFairError::Empty("ranking"));
    }
    if protected.is_empty() {
        return Err(RankFairError::Empty("protected group"));
    }
    if protected.len() >= ranking.len() {
        return Err(RankFairError::InvalidProtectedGroup(format!(
            "protected group of size {} is not smaller than the ranking ({})",
            protected.len(),
            ranking.len()
        )));
    }
    if has_repeats(ranking) {
        return Err(RankFairError::InvalidPermutation(
            "ranking contains repeated items".into(),
        ));
    }
    if has_repeats(protected) {
        return Err(RankFairError::InvalidProtectedGroup(
            "protected group contains repeated members".into(),
        ));
    }
    let ranked: HashSet<usize> = ranking.iter().copied().collect();
    if let Some(id) = protected.iter().find(|id| !ranked.contains(*id)) {
        return Err(RankFairError::InvalidProtectedGroup(format!(
            "protected member {id} does not appear in the ranking"
        )));
    }
    Ok(())
}
