//! Diagonal traversal of the AB-join distance matrix.
//!
//! The virtual `l_A x l_B` distance matrix is never materialized: each
//! worker walks whole diagonals, carrying the centered cross-product `cov`
//! from one cell to the next with a Welford-style update, and scores cells
//! through the Pearson correlation. Every thread owns a private copy of
//! the top-k / left / right buffers for *all* rows, because two diagonals
//! assigned to different threads can land on the same destination row; a
//! single-threaded reduction folds the copies afterwards.

use itertools::izip;
use log::debug;
use rayon::prelude::*;

use crate::config::{EXCL_ZONE_DENOM, P_NORM_THRESHOLD};
use crate::stats::Preprocessed;
use crate::topk;

/// Exclusion zone width for a covered span of `span` samples.
pub(crate) fn excl_zone(span: usize) -> usize {
    (span + EXCL_ZONE_DENOM - 1) / EXCL_ZONE_DENOM
}

/// Read-only state shared by every worker of one join.
pub(crate) struct JoinInputs<'a> {
    pub a: &'a Preprocessed,
    pub b: &'a Preprocessed,
    pub m: usize,
    pub d: usize,
    /// Remapped position -> original position, one map per series.
    pub index_dilated_a: &'a [usize],
    pub index_dilated_b: &'a [usize],
    pub self_join: bool,
    pub k: usize,
}

impl<'a> JoinInputs<'a> {
    fn span(&self) -> usize {
        (self.m - 1) * self.d + 1
    }

    /// Number of profile rows.
    pub(crate) fn rows(&self) -> usize {
        self.a.series.len() - self.span() + 1
    }
}

/// The diagonals of the join to traverse.
///
/// Self-joins with `d = 1` start past the exclusion zone: every cell of a
/// nearer diagonal would be rejected by the in-kernel filter anyway. With
/// `d > 1` a small remapped diagonal offset does not bound the
/// original-index gap, so only the main diagonal is pruned and the
/// in-kernel filter decides cell by cell.
pub(crate) fn join_diagonals(
    n_a: usize,
    n_b: usize,
    m: usize,
    d: usize,
    self_join: bool,
) -> Vec<i64> {
    if self_join {
        let first = if d == 1 {
            excl_zone(m) as i64 + 1
        } else {
            1
        };
        (first..(n_a - m + 1) as i64).collect()
    } else {
        (-((n_a - m) as i64)..=(n_b - m) as i64).collect()
    }
}

/// Number of cells on each diagonal inside the valid rectangle.
pub(crate) fn diagonal_ndist(diags: &[i64], m: usize, n_a: usize, n_b: usize) -> Vec<usize> {
    diags
        .iter()
        .map(|&g| {
            let hi = ((n_a - m + 1) as i64).min((n_b - m + 1) as i64 - g);
            let lo = 0i64.max(-g);
            (hi - lo).max(0) as usize
        })
        .collect()
}

/// Split the diagonal list into `n_chunks` contiguous slices with
/// near-equal cell totals: a greedy running-sum cut against the targets
/// `total * c / n_chunks`. Trailing slices may be empty when there are
/// fewer diagonals than chunks.
pub(crate) fn split_ranges(counts: &[usize], n_chunks: usize) -> Vec<(usize, usize)> {
    let total: usize = counts.iter().sum();
    let mut ranges = Vec::with_capacity(n_chunks);
    let mut start = 0;
    let mut idx = 0;
    let mut acc = 0usize;
    for chunk in 1..=n_chunks {
        let target = (total as f64 * chunk as f64 / n_chunks as f64).round() as usize;
        while idx < counts.len() && acc < target {
            acc += counts[idx];
            idx += 1;
        }
        ranges.push((start, idx));
        start = idx;
    }
    ranges
}

/// One thread's private view of the profile rows.
struct ThreadBuffers {
    rho: Vec<f64>,
    idx: Vec<i64>,
    rho_left: Vec<f64>,
    idx_left: Vec<i64>,
    rho_right: Vec<f64>,
    idx_right: Vec<i64>,
}

impl ThreadBuffers {
    fn new(rows: usize, k: usize) -> Self {
        Self {
            rho: vec![f64::NEG_INFINITY; rows * k],
            idx: vec![-1; rows * k],
            rho_left: vec![f64::NEG_INFINITY; rows],
            idx_left: vec![-1; rows],
            rho_right: vec![f64::NEG_INFINITY; rows],
            idx_right: vec![-1; rows],
        }
    }
}

/// Walk every assigned diagonal, updating this thread's buffers.
///
/// `cov` is carried along each diagonal across skipped cells; the
/// finiteness, validity and exclusion filters gate the profile updates
/// only.
fn compute_diagonal(inp: &JoinInputs, diags: &[i64], cov_terms: &CovTerms, buf: &mut ThreadBuffers) {
    let n_a = inp.a.series.len();
    let n_b = inp.b.series.len();
    let m = inp.m;
    let k = inp.k;
    let m_inverse = 1.0 / m as f64;
    let update = (m as f64 - 1.0) * m_inverse * m_inverse;
    let span = inp.span();
    let last_valid_a = n_a - span;
    let last_valid_b = n_b - span;
    let zone = excl_zone(span);

    for &g in diags {
        let start = 0i64.max(-g) as usize;
        let stop = ((n_a - m + 1) as i64).min((n_b - m + 1) as i64 - g) as usize;
        let mut cov = 0.0;

        for i in start..stop {
            let j = (i as i64 + g) as usize;

            if i == 0 || j == 0 {
                // Matrix edge: centered dot product, the diagonal's seed.
                let mu_b = inp.b.mean[j];
                let mu_a = inp.a.mean[i];
                cov = inp.b.series[j..j + m]
                    .iter()
                    .zip(&inp.a.series[i..i + m])
                    .map(|(&y, &x)| (y - mu_b) * (x - mu_a))
                    .sum::<f64>()
                    * m_inverse;
            } else {
                cov += update
                    * (cov_terms.a[j] * cov_terms.b[i] - cov_terms.c[j] * cov_terms.d[i]);
            }

            if !(inp.b.finite[j] && inp.a.finite[i]) {
                continue;
            }

            let mut pearson = if inp.b.constant[j] || inp.a.constant[i] {
                0.5
            } else {
                cov * inp.b.inv_std[j] * inp.a.inv_std[i]
            };
            if inp.b.constant[j] && inp.a.constant[i] {
                pearson = 1.0;
            }

            let row = inp.index_dilated_a[i];
            let col = inp.index_dilated_b[j];
            // The remapping leaves some trailing positions without a
            // complete covered span.
            if row > last_valid_a || col > last_valid_b {
                continue;
            }
            if inp.self_join && row.abs_diff(col) <= zone {
                continue;
            }

            let rho_row = &mut buf.rho[row * k..(row + 1) * k];
            if pearson > rho_row[0] {
                let idx_row = &mut buf.idx[row * k..(row + 1) * k];
                topk::shift_insert(rho_row, idx_row, pearson, col as i64);
            }

            if inp.self_join {
                // The distance matrix is symmetric: the same cell scores
                // row `col` as well.
                let rho_row = &mut buf.rho[col * k..(col + 1) * k];
                if pearson > rho_row[0] {
                    let idx_row = &mut buf.idx[col * k..(col + 1) * k];
                    topk::shift_insert(rho_row, idx_row, pearson, row as i64);
                }

                if row != col {
                    let (left, right) = if row < col { (row, col) } else { (col, row) };
                    if pearson > buf.rho_left[right] {
                        buf.rho_left[right] = pearson;
                        buf.idx_left[right] = left as i64;
                    }
                    if pearson > buf.rho_right[left] {
                        buf.rho_right[left] = pearson;
                        buf.idx_right[left] = right as i64;
                    }
                }
            }
        }
    }
}

/// The four shared arrays feeding the incremental covariance update.
struct CovTerms {
    a: Vec<f64>,
    b: Vec<f64>,
    c: Vec<f64>,
    d: Vec<f64>,
}

impl CovTerms {
    fn new(inp: &JoinInputs) -> Self {
        let m = inp.m;
        let t_a = &inp.a.series;
        let t_b = &inp.b.series;
        let mean_a_m1 = &inp.a.mean_m1;
        let mean_b_m1 = &inp.b.mean_m1;

        let a = izip!(&t_b[m - 1..], &mean_b_m1[..mean_b_m1.len() - 1])
            .map(|(&x, &mu)| x - mu)
            .collect();
        let b = izip!(&t_a[m - 1..], &mean_a_m1[..mean_a_m1.len() - 1])
            .map(|(&x, &mu)| x - mu)
            .collect();

        // Slot 0 pairs the series tail with the first m-1 window; it is
        // never read because the incremental path needs i > 0 and j > 0.
        let mut c = Vec::with_capacity(mean_b_m1.len());
        c.push(t_b[t_b.len() - 1] - mean_b_m1[0]);
        c.extend(
            izip!(&t_b[..mean_b_m1.len() - 1], &mean_b_m1[1..]).map(|(&x, &mu)| x - mu),
        );
        let mut d = Vec::with_capacity(mean_a_m1.len());
        d.push(t_a[t_a.len() - 1] - mean_a_m1[0]);
        d.extend(
            izip!(&t_a[..mean_a_m1.len() - 1], &mean_a_m1[1..]).map(|(&x, &mu)| x - mu),
        );

        Self { a, b, c, d }
    }
}

/// Per-row kernel results. Top-k correlations are already converted to
/// z-normalized Euclidean distances; the left/right columns keep indices
/// only, their correlations served as merge keys.
pub(crate) struct KernelOutput {
    pub distances: Vec<f64>,
    pub indices: Vec<i64>,
    pub left_indices: Vec<i64>,
    pub right_indices: Vec<i64>,
}

/// Run the join: partition diagonals over the rayon pool, walk them in
/// parallel against per-thread buffers, reduce, and convert.
pub(crate) fn stump_kernel(inp: &JoinInputs) -> KernelOutput {
    let n_a = inp.a.series.len();
    let n_b = inp.b.series.len();
    let rows = inp.rows();
    let k = inp.k;
    let n_threads = rayon::current_num_threads();

    let diags = join_diagonals(n_a, n_b, inp.m, inp.d, inp.self_join);
    let counts = diagonal_ndist(&diags, inp.m, n_a, n_b);
    let ranges = split_ranges(&counts, n_threads);
    debug!(
        "walking {} diagonals ({} cells) across {} threads",
        diags.len(),
        counts.iter().sum::<usize>(),
        n_threads
    );

    let cov_terms = CovTerms::new(inp);

    let mut buffers: Vec<ThreadBuffers> = (0..n_threads)
        .map(|_| ThreadBuffers::new(rows, k))
        .collect();
    buffers
        .par_iter_mut()
        .zip(ranges.par_iter())
        .for_each(|(buf, &(lo, hi))| compute_diagonal(inp, &diags[lo..hi], &cov_terms, buf));

    reduce(inp, buffers)
}

fn reduce(inp: &JoinInputs, buffers: Vec<ThreadBuffers>) -> KernelOutput {
    let rows = inp.rows();
    let k = inp.k;
    let m = inp.m as f64;

    let mut folded = buffers.into_iter();
    let mut acc = match folded.next() {
        Some(first) => first,
        None => ThreadBuffers::new(rows, k),
    };
    let mut tmp_values = vec![0.0; k];
    let mut tmp_indices = vec![0i64; k];
    for buf in folded {
        for row in 0..rows {
            topk::merge_topk(
                &mut acc.rho[row * k..(row + 1) * k],
                &mut acc.idx[row * k..(row + 1) * k],
                &buf.rho[row * k..(row + 1) * k],
                &buf.idx[row * k..(row + 1) * k],
                &mut tmp_values,
                &mut tmp_indices,
            );
        }
        for row in 0..rows {
            if acc.rho_left[row] < buf.rho_left[row] {
                acc.rho_left[row] = buf.rho_left[row];
                acc.idx_left[row] = buf.idx_left[row];
            }
            if acc.rho_right[row] < buf.rho_right[row] {
                acc.rho_right[row] = buf.rho_right[row];
                acc.idx_right[row] = buf.idx_right[row];
            }
        }
    }

    // The buffers hold ascending Pearson correlations; the profile wants
    // ascending distances, so each row is read back to front.
    let mut distances = Vec::with_capacity(rows * k);
    let mut indices = Vec::with_capacity(rows * k);
    for row in 0..rows {
        for slot in (0..k).rev() {
            distances.push(pearson_to_dist(acc.rho[row * k + slot], m));
            indices.push(acc.idx[row * k + slot]);
        }
    }
    KernelOutput {
        distances,
        indices,
        left_indices: acc.idx_left,
        right_indices: acc.idx_right,
    }
}

fn pearson_to_dist(pearson: f64, m: f64) -> f64 {
    let p_norm = (2.0 * m * (1.0 - pearson)).abs();
    if p_norm < P_NORM_THRESHOLD {
        0.0
    } else {
        p_norm.sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_join_diagonals_skip_the_zone() {
        // m = 8 gives an exclusion zone of 2; the first enumerated
        // diagonal is 3.
        let diags = join_diagonals(20, 20, 8, 1, true);
        assert_eq!(diags.first(), Some(&3));
        assert_eq!(diags.last(), Some(&12));
    }

    #[test]
    fn dilated_self_join_keeps_near_diagonals() {
        let diags = join_diagonals(20, 20, 4, 2, true);
        assert_eq!(diags.first(), Some(&1));
    }

    #[test]
    fn ab_join_diagonals_cover_both_signs() {
        let diags = join_diagonals(6, 9, 3, 1, false);
        assert_eq!(diags.first(), Some(&-3));
        assert_eq!(diags.last(), Some(&6));
    }

    #[test]
    fn ndist_matches_brute_force() {
        let (n_a, n_b, m) = (11, 8, 3);
        let diags = join_diagonals(n_a, n_b, m, 1, false);
        let counts = diagonal_ndist(&diags, m, n_a, n_b);
        for (&g, &count) in diags.iter().zip(&counts) {
            let brute = (0..n_a - m + 1)
                .filter(|&i| {
                    let j = i as i64 + g;
                    j >= 0 && j < (n_b - m + 1) as i64
                })
                .count();
            assert_eq!(count, brute, "diagonal {}", g);
        }
    }

    #[test]
    fn ranges_are_contiguous_and_exhaustive() {
        let counts = vec![5, 1, 1, 9, 2, 2, 4, 7, 1, 3];
        let ranges = split_ranges(&counts, 4);
        assert_eq!(ranges.len(), 4);
        assert_eq!(ranges[0].0, 0);
        assert_eq!(ranges[ranges.len() - 1].1, counts.len());
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
        }
        let heaviest = ranges
            .iter()
            .map(|&(lo, hi)| counts[lo..hi].iter().sum::<usize>())
            .max()
            .unwrap();
        // Within one diagonal of the ideal quarter of the 35 cells.
        assert!(heaviest <= 17, "heaviest slice got {} cells", heaviest);
    }

    #[test]
    fn more_chunks_than_diagonals() {
        let ranges = split_ranges(&[4, 4], 5);
        assert_eq!(ranges.len(), 5);
        assert_eq!(ranges[ranges.len() - 1].1, 2);
        let covered: usize = ranges.iter().map(|&(lo, hi)| hi - lo).sum();
        assert_eq!(covered, 2);
    }
}
