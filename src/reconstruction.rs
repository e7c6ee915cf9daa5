/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Reconstruction of feature vectors from soft prototype assignments.

use crate::error::{RankFairError, Result};
use crate::matrix::Matrix;

/// Reconstructed features and their mean squared reconstruction error.
#[derive(Clone, Debug, PartialEq)]
pub struct Reconstruction {
    /// `x̂ = M · Z`, one row per individual.
    pub matrix: Matrix,
    /// `Σ_i Σ_p (x[i,p] − x̂[i,p])² / N`.
    pub loss: f64,
}

/// Reconstruct each individual as the membership-weighted average of prototypes.
///
/// The loss is summed over attributes and averaged over individuals.
pub fn reconstruct(
    features: &Matrix,
    memberships: &Matrix,
    prototypes: &Matrix,
) -> Result<Reconstruction> {
    if memberships.rows() != features.rows() {
        return Err(RankFairError::shape("membership rows", features.rows(), memberships.rows()));
    }
    if memberships.cols() != prototypes.rows() {
        return Err(RankFairError::shape(
            "membership columns",
            prototypes.rows(),
            memberships.cols(),
        ));
    }
    if prototypes.cols() != features.cols() {
        return Err(RankFairError::shape("prototype columns", features.cols(), prototypes.cols()));
    }

    let x_hat = combine(memberships, prototypes);
    let mut sq_err = 0.0;
    for i in 0..features.rows() {
        let x = features.row(i);
        for (a, b) in x.iter().zip(x_hat.row(i)) {
            sq_err += (a - b) * (a - b);
        }
    }
    let loss = if features.rows() == 0 { 0.0 } else { sq_err / features.rows() as f64 };
    Ok(Reconstruction { matrix: x_hat, loss })
}

/// `M · Z` without shape checks; callers validate.
pub(crate) fn combine(memberships: &Matrix, prototypes: &Matrix) -> Matrix {
    let mut out = Matrix::zeros(memberships.rows(), prototypes.cols());
    for (i, m) in memberships.iter_rows().enumerate() {
        let row = out.row_mut(i);
        for (&w, z) in m.iter().zip(prototypes.iter_rows()) {
            for (slot, &v) in row.iter_mut().zip(z) {
                *slot += w * v;
            }
        }
    }
    out
}
