/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Dense row-major matrix used for features, prototypes and memberships.
//!
//! Every matrix in the crate is small enough to live in one contiguous
//! `Vec<f64>`; row access is a slice borrow, so per-row work (distances,
//! softmax, reconstruction) never copies.

use crate::error::{RankFairError, Result};

/// Row-major `rows × cols` matrix of `f64`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Wrap a flat row-major buffer.
    ///
    /// Fails when `data.len() != rows * cols`.
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(RankFairError::shape("matrix buffer", rows * cols, data.len()));
        }
        Ok(Self { rows, cols, data })
    }

    /// All-zero matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self { rows, cols, data: vec![0.0; rows * cols] }
    }

    /// Build from a list of equally long rows.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self> {
        let cols = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(RankFairError::shape("matrix row", cols, row.len()));
            }
            data.extend_from_slice(row);
        }
        Ok(Self { rows: rows.len(), cols, data })
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `true` when the matrix has no rows or no columns.
    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// Borrow row `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= rows`.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Mutably borrow row `i`.
    pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Element `(i, j)`.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.cols + j]
    }

    /// Copy of column `j`.
    ///
    /// # Panics
    ///
    /// Panics if `j >= cols`.
    pub fn column(&self, j: usize) -> Vec<f64> {
        assert!(j < self.cols, "column {j} out of range for {} columns", self.cols);
        self.iter_rows().map(|r| r[j]).collect()
    }

    /// Iterate over rows in order.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        // chunks_exact(0) panics; a zero-column matrix has an empty buffer
        self.data.chunks_exact(self.cols.max(1))
    }

    /// Flat row-major view of the buffer.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Copy the listed rows, in the listed order, into a new matrix.
    pub fn select_rows(&self, indices: &[usize]) -> Result<Self> {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &i in indices {
            if i >= self.rows {
                return Err(RankFairError::out_of_range(
                    "row index",
                    format!("{i} >= {} rows", self.rows),
                ));
            }
            data.extend_from_slice(self.row(i));
        }
        Ok(Self { rows: indices.len(), cols: self.cols, data })
    }

    /// Column-wise mean, one value per column. Empty matrices yield zeros.
    pub fn column_means(&self) -> Vec<f64> {
        let mut means = vec![0.0; self.cols];
        for row in self.iter_rows() {
            for (m, &v) in means.iter_mut().zip(row) {
                *m += v;
            }
        }
        if self.rows > 0 {
            let n = self.rows as f64;
            for m in &mut means {
                *m /= n;
            }
        }
        means
    }

    /// Row-wise mean, one value per row.
    pub fn row_means(&self) -> Vec<f64> {
        if self.cols == 0 {
            return vec![0.0; self.rows];
        }
        let p = self.cols as f64;
        self.iter_rows().map(|r| r.iter().sum::<f64>() / p).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_wrong_buffer_length() {
        assert!(Matrix::new(2, 3, vec![0.0; 5]).is_err());
        assert!(Matrix::new(2, 3, vec![0.0; 6]).is_ok());
    }

    #[test]
    fn test_from_rows_rejects_ragged_input() {
        let err = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(matches!(err, RankFairError::Shape { .. }));
    }

    #[test]
    fn test_select_rows_preserves_order() {
        let m = Matrix::from_rows(&[[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]]).unwrap();
        let s = m.select_rows(&[2, 0]).unwrap();
        assert_eq!(s.rows(), 2);
        assert_eq!(s.row(0), &[3.0, 3.0]);
        assert_eq!(s.row(1), &[1.0, 1.0]);
        assert!(m.select_rows(&[3]).is_err());
    }

    #[test]
    fn test_column() {
        let m = Matrix::from_rows(&[[1.0, 4.0], [2.0, 5.0], [3.0, 6.0]]).unwrap();
        assert_eq!(m.column(0), vec![1.0, 2.0, 3.0]);
        assert_eq!(m.column(1), vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_means() {
        let m = Matrix::from_rows(&[[1.0, 3.0], [3.0, 5.0]]).unwrap();
        assert_eq!(m.column_means(), vec![2.0, 4.0]);
        assert_eq!(m.row_means(), vec![2.0, 4.0]);
    }

    #[test]
    fn test_iter_rows_on_zero_columns_is_empty() {
        let m = Matrix::zeros(3, 0);
        assert_eq!(m.iter_rows().count(), 0);
        assert!(m.is_empty());
    }
}
