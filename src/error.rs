/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Error taxonomy shared by every module in the crate.
//!
//! Shape and domain errors are raised where they are detected and propagated
//! unchanged; nothing in the crate retries. Numerical edge cases (softmax
//! underflow, KL boundary probabilities, an empty unprotected prefix in rRD)
//! are clamped in place and never surface here.

use thiserror::Error;

/// Errors raised by representation learning and fairness measurement.
#[derive(Debug, Error)]
pub enum RankFairError {
    /// Two containers disagree on a dimension.
    #[error("shape mismatch in {context}: expected {expected}, got {actual}")]
    Shape {
        /// Where the mismatch was detected.
        context: &'static str,
        /// Expected length or dimension.
        expected: usize,
        /// Observed length or dimension.
        actual: usize,
    },

    /// An input that must be non-empty was empty.
    #[error("{0} must not be empty")]
    Empty(&'static str),

    /// A sequence that must be a permutation is not one (repeats, length or id-set mismatch).
    #[error("invalid permutation: {0}")]
    InvalidPermutation(String),

    /// The protected set is not a proper, non-repeating subset of the ranking.
    #[error("invalid protected group: {0}")]
    InvalidProtectedGroup(String),

    /// A score list that must be sorted in descending order is not.
    #[error("{0} score list is not sorted in descending order")]
    NotDescending(&'static str),

    /// A numeric parameter is outside its admissible range.
    #[error("{name} out of range: {detail}")]
    OutOfRange {
        /// Parameter name.
        name: &'static str,
        /// Human-readable description of the violated bound.
        detail: String,
    },

    /// A fairness normalizer of exactly zero was supplied.
    #[error("fairness normalizer equals zero")]
    ZeroNormalizer,

    /// A measure key did not match any known measure.
    #[error("unknown {kind} measure '{key}'")]
    UnknownMeasure {
        /// Measure family (`accuracy` or `fairness`).
        kind: &'static str,
        /// The rejected key.
        key: String,
    },

    /// A normalizer table line could not be parsed.
    #[error("malformed normalizer entry '{0}'")]
    Parse(String),

    /// Reading or writing a normalizer table failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RankFairError {
    /// Shape-mismatch helper.
    pub(crate) fn shape(context: &'static str, expected: usize, actual: usize) -> Self {
        Self::Shape { context, expected, actual }
    }

    /// Out-of-range helper.
    pub(crate) fn out_of_range(name: &'static str, detail: impl Into<String>) -> Self {
        Self::OutOfRange { name, detail: detail.into() }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RankFairError>;
