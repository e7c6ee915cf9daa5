/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! A scored population split into protected and unprotected groups.
//!
//! Parsing input files is left to the caller; this type starts from arrays
//! that are already in memory and enforces the partition invariants:
//!
//! - N > 0 and P > 0
//! - 0 < protected size < N
//! - the protected and unprotected views are row-disjoint and together cover
//!   every individual

use crate::error::{RankFairError, Result};
use crate::matrix::Matrix;
use crate::ranking::{rank_by_scores, SortDirection};

/// Feature matrix, target scores, and the protected/unprotected partition.
#[derive(Clone, Debug)]
pub struct Population {
    features: Matrix,
    scores: Vec<f64>,
    protected_index: Vec<usize>,
    protected: Matrix,
    unprotected: Matrix,
}

impl Population {
    /// Build from features, target scores, and one group flag per individual
    /// (`true` = protected).
    pub fn from_group_flags(
        features: Matrix,
        scores: Vec<f64>,
        is_protected: &[bool],
    ) -> Result<Self> {
        if is_protected.len() != features.rows() {
            return Err(RankFairError::shape("group flags", features.rows(), is_protected.len()));
        }
        let protected_index: Vec<usize> = is_protected
            .iter()
            .enumerate()
            .filter_map(|(i, &p)| p.then_some(i))
            .collect();
        Self::new(features, scores, protected_index)
    }

    /// Build from features, target scores and the (sorted or unsorted) ids of
    /// protected individuals.
    pub fn new(
        features: Matrix,
        scores: Vec<f64>,
        mut protected_index: Vec<usize>,
    ) -> Result<Self> {
        let n = features.rows();
        if n == 0 {
            return Err(RankFairError::Empty("feature matrix"));
        }
        if features.cols() == 0 {
            return Err(RankFairError::Empty("attribute columns"));
        }
        if scores.len() != n {
            return Err(RankFairError::shape("target scores", n, scores.len()));
        }
        protected_index.sort_unstable();
        protected_index.dedup();
        if protected_index.is_empty() || protected_index.len() >= n {
            return Err(RankFairError::InvalidProtectedGroup(format!(
                "protected group size {} must be in 1..{n}",
                protected_index.len()
            )));
        }
        if let Some(&last) = protected_index.last() {
            if last >= n {
                return Err(RankFairError::InvalidProtectedGroup(format!(
                    "protected id {last} is outside the population of {n}"
                )));
            }
        }

        let mut flags = vec![false; n];
        for &i in &protected_index {
            flags[i] = true;
        }
        let unprotected_index: Vec<usize> = (0..n).filter(|&i| !flags[i]).collect();

        let protected = features.select_rows(&protected_index)?;
        let unprotected = features.select_rows(&unprotected_index)?;
        Ok(Self { features, scores, protected_index, protected, unprotected })
    }

    /// Full feature matrix (N×P).
    pub fn features(&self) -> &Matrix {
        &self.features
    }

    /// Protected rows only.
    pub fn protected(&self) -> &Matrix {
        &self.protected
    }

    /// Unprotected rows only.
    pub fn unprotected(&self) -> &Matrix {
        &self.unprotected
    }

    /// Target scores, one per individual.
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    /// Sorted ids of protected individuals.
    pub fn protected_index(&self) -> &[usize] {
        &self.protected_index
    }

    /// Population size N.
    pub fn len(&self) -> usize {
        self.features.rows()
    }

    /// Always `false`: construction rejects empty populations.
    pub fn is_empty(&self) -> bool {
        self.features.rows() == 0
    }

    /// Number of attributes P.
    pub fn attributes(&self) -> usize {
        self.features.cols()
    }

    /// Protected group size K.
    pub fn protected_len(&self) -> usize {
        self.protected_index.len()
    }

    /// Ranking induced by the target scores.
    pub fn input_ranking(&self, direction: SortDirection) -> Vec<usize> {
        rank_by_scores(&self.scores, direction)
    }
}

/// Equal-weight score of each row: the mean of its attributes.
///
/// Used as the target when no single score column is chosen, and to turn a
/// reconstructed feature vector into an estimated score.
pub fn equal_weight_scores(features: &Matrix) -> Result<Vec<f64>> {
    if features.rows() == 0 {
        return Err(RankFairError::Empty("feature matrix"));
    }
    if features.cols() == 0 {
        return Err(RankFairError::Empty("attribute columns"));
    }
    Ok(features.row_means())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features() -> Matrix {
        Matrix::from_rows(&[[1.0, 3.0], [2.0, 2.0], [0.0, 4.0], [5.0, 5.0]]).unwrap()
    }

    #[test]
    fn test_partition_from_flags() {
        let pop = Population::from_group_flags(
            features(),
            vec![4.0, 3.0, 2.0, 1.0],
            &[false, true, false, true],
        )
        .unwrap();
        assert_eq!(pop.protected_index(), &[1, 3]);
        assert_eq!(pop.protected().rows() + pop.unprotected().rows(), pop.len());
        assert_eq!(pop.protected().row(1), &[5.0, 5.0]);
        assert_eq!(pop.unprotected().row(0), &[1.0, 3.0]);
        assert_eq!(pop.input_ranking(SortDirection::HigherIsBetter), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_rejects_degenerate_groups() {
        let scores = vec![0.0; 4];
        assert!(Population::from_group_flags(features(), scores.clone(), &[false; 4]).is_err());
        assert!(Population::from_group_flags(features(), scores.clone(), &[true; 4]).is_err());
        assert!(Population::new(features(), scores.clone(), vec![9]).is_err());
        assert!(Population::new(features(), vec![0.0; 3], vec![0]).is_err());
    }

    #[test]
    fn test_equal_weight_scores() {
        assert_eq!(equal_weight_scores(&features()).unwrap(), vec![2.0, 2.0, 2.0, 5.0]);
        assert!(equal_weight_scores(&Matrix::zeros(0, 2)).is_err());
    }
}
