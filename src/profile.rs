//! The matrix profile output table.

use serde::{Deserialize, Serialize};

use crate::error::{ProfileError, Result};

/// The (top-k) matrix profile of a join.
///
/// Row `i` describes the subsequence starting at position `i` of the query
/// series: its `k` nearest non-trivial neighbours in ascending distance
/// order, the positions of those neighbours in the annotating series, and
/// (self-joins only) the positions of the best neighbour lying strictly to
/// the left and to the right. Rows with no valid neighbour report
/// `f64::INFINITY` and index `-1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixProfile {
    k: usize,
    distances: Vec<f64>,
    indices: Vec<i64>,
    left_indices: Vec<i64>,
    right_indices: Vec<i64>,
}

impl MatrixProfile {
    pub(crate) fn new(
        k: usize,
        distances: Vec<f64>,
        indices: Vec<i64>,
        left_indices: Vec<i64>,
        right_indices: Vec<i64>,
    ) -> Self {
        debug_assert_eq!(distances.len(), indices.len());
        debug_assert_eq!(distances.len(), left_indices.len() * k);

        Self {
            k,
            distances,
            indices,
            left_indices,
            right_indices,
        }
    }

    /// Number of profile rows, `n - (m - 1) * d - 1 + 1`.
    pub fn len(&self) -> usize {
        self.left_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left_indices.is_empty()
    }

    /// Number of neighbours kept per row.
    pub fn k(&self) -> usize {
        self.k
    }

    /// The k nearest-neighbour distances of `row`, ascending.
    pub fn distances(&self, row: usize) -> &[f64] {
        &self.distances[row * self.k..(row + 1) * self.k]
    }

    /// The k matrix profile indices of `row`, parallel to
    /// [`distances`](Self::distances).
    pub fn indices(&self, row: usize) -> &[i64] {
        &self.indices[row * self.k..(row + 1) * self.k]
    }

    /// The classic top-1 matrix profile: nearest-neighbour distance per row.
    pub fn profile(&self) -> Vec<f64> {
        (0..self.len()).map(|row| self.distances(row)[0]).collect()
    }

    /// The top-1 matrix profile index per row.
    pub fn profile_index(&self) -> Vec<i64> {
        (0..self.len()).map(|row| self.indices(row)[0]).collect()
    }

    /// Best neighbour strictly to the left of each row; `-1` when none.
    pub fn left_indices(&self) -> &[i64] {
        &self.left_indices
    }

    /// Best neighbour strictly to the right of each row; `-1` when none.
    pub fn right_indices(&self) -> &[i64] {
        &self.right_indices
    }

    /// Post-condition of every join: a NaN in the nearest-neighbour column
    /// is a kernel bug and fails loudly. Infinite distances (rows without
    /// any valid neighbour) are legal.
    pub(crate) fn check(&self) -> Result<()> {
        for row in 0..self.len() {
            if self.distances(row)[0].is_nan() {
                return Err(ProfileError::DegenerateProfile { row });
            }
        }
        Ok(())
    }
}
