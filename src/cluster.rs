/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Soft clustering of individuals onto latent prototypes.
//!
//! Each individual is softly assigned to every prototype through a softmax
//! over negated squared distances:
//!
//! ```text
//! d[i,j] = Σ_p (x[i,p] − z[j,p])²
//! M[i,j] = exp(−d[i,j]) / Σ_j' exp(−d[i,j'])
//! ```
//!
//! # Attribute weights
//!
//! [`squared_distances`] takes a per-attribute weight vector and checks its
//! length, but does **not** scale the distance by it. This matches the
//! reference behaviour the optimizer was tuned against; applying the weights
//! would change the learned representation and is left as an explicit
//! behaviour change for callers to make, not a silent fix.
//!
//! # Invariants
//!
//! - Every membership row is non-negative and sums to 1, unless all of its
//!   affinities underflow to zero, in which case the denominator is
//!   [`UNDERFLOW_DENOMINATOR`].
//! - Rows are independent; row order never affects any row's result.

use crate::error::{RankFairError, Result};
use crate::matrix::Matrix;

/// Softmax denominator substituted when a row's exponentials all underflow to zero.
pub const UNDERFLOW_DENOMINATOR: f64 = 1e-6;

/// Squared Euclidean distance from every individual to every prototype (N×k).
///
/// `weights` must have one entry per attribute; see the module docs for why it
/// is not applied.
pub fn squared_distances(
    features: &Matrix,
    prototypes: &Matrix,
    weights: &[f64],
) -> Result<Matrix> {
    let p = features.cols();
    if prototypes.cols() != p {
        return Err(RankFairError::shape("prototype columns", p, prototypes.cols()));
    }
    if weights.len() != p {
        return Err(RankFairError::shape("attribute weights", p, weights.len()));
    }

    let k = prototypes.rows();
    let mut dists = Matrix::zeros(features.rows(), k);
    for (i, x) in features.iter_rows().enumerate() {
        let out = dists.row_mut(i);
        for (j, z) in prototypes.iter_rows().enumerate() {
            out[j] = x.iter().zip(z).map(|(a, b)| (a - b) * (a - b)).sum();
        }
    }
    Ok(dists)
}

/// Row-wise softmax of negated distances.
pub fn memberships(distances: &Matrix) -> Matrix {
    let mut m = Matrix::zeros(distances.rows(), distances.cols());
    for (i, d) in distances.iter_rows().enumerate() {
        let row = m.row_mut(i);
        let mut denom = 0.0;
        for (slot, &dist) in row.iter_mut().zip(d) {
            *slot = (-dist).exp();
            denom += *slot;
        }
        if denom == 0.0 {
            denom = UNDERFLOW_DENOMINATOR;
        }
        for slot in row.iter_mut() {
            *slot /= denom;
        }
    }
    m
}

/// Distances then memberships in one call.
pub fn soft_assign(features: &Matrix, prototypes: &Matrix, weights: &[f64]) -> Result<Matrix> {
    Ok(memberships(&squared_distances(features, prototypes, weights)?))
}

/// Mean membership vector over all rows: the group's aggregate prototype occupancy.
pub fn mean_membership(memberships: &Matrix) -> Vec<f64> {
    memberships.column_means()
}

/// L1 distance between the mean memberships of two groups.
///
/// This is the in-loop group-fairness loss: zero when both groups occupy the
/// prototypes in identical proportions.
pub fn group_fairness_loss(protected: &Matrix, unprotected: &Matrix) -> Result<f64> {
    if protected.cols() != unprotected.cols() {
        return Err(RankFairError::shape(
            "membership columns",
            protected.cols(),
            unprotected.cols(),
        ));
    }
    let pro = mean_membership(protected);
    let unpro = mean_membership(unprotected);
    Ok(pro.iter().zip(&unpro).map(|(a, b)| (a - b).abs()).sum())
}
