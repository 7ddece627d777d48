//! Sliding-window statistics backing z-normalized similarity search.

use crate::config::STDDEV_THRESHOLD;

/// Mean of every window of length `w`, computed from a running cumulative
/// sum. Output length is `ts.len() - w + 1`.
pub fn moving_avg(ts: &[f64], w: usize) -> Vec<f64> {
    debug_assert!(w >= 1 && w <= ts.len());

    let inv_w = 1.0 / w as f64;
    let mut acc = 0.0;
    let mut cumsum = Vec::with_capacity(ts.len() + 1);
    cumsum.push(0.0);
    for &x in ts {
        acc += x;
        cumsum.push(acc);
    }

    (0..=ts.len() - w)
        .map(|i| (cumsum[i + w] - cumsum[i]) * inv_w)
        .collect()
}

/// Population standard deviation of every window of length `w`, via
/// cumulative sums of values and squares. The per-window variance is
/// clamped at zero before the square root.
pub fn moving_std(ts: &[f64], w: usize) -> Vec<f64> {
    debug_assert!(w >= 1 && w <= ts.len());

    let inv_w = 1.0 / w as f64;
    let (mut acc, mut acc_sq) = (0.0, 0.0);
    let mut cumsum = Vec::with_capacity(ts.len() + 1);
    let mut cumsum_sq = Vec::with_capacity(ts.len() + 1);
    cumsum.push(0.0);
    cumsum_sq.push(0.0);
    for &x in ts {
        acc += x;
        acc_sq += x * x;
        cumsum.push(acc);
        cumsum_sq.push(acc_sq);
    }

    (0..=ts.len() - w)
        .map(|i| {
            let mean = (cumsum[i + w] - cumsum[i]) * inv_w;
            let mean_sq = (cumsum_sq[i + w] - cumsum_sq[i]) * inv_w;
            (mean_sq - mean * mean).max(0.0).sqrt()
        })
        .collect()
}

/// Per-series inputs of the diagonal kernel.
///
/// `series` is a cleaned copy with every non-finite sample replaced by
/// `0.0` so that dot products stay defined; `finite` records, per
/// subsequence of length `m`, whether the original samples were all
/// finite. Constant subsequences carry an inverse deviation of `0.0` and
/// are flagged in `constant`.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub series: Vec<f64>,
    pub mean: Vec<f64>,
    pub inv_std: Vec<f64>,
    pub mean_m1: Vec<f64>,
    pub finite: Vec<bool>,
    pub constant: Vec<bool>,
}

/// Compute the window statistics consumed by the diagonal kernel: sliding
/// means at `m` and `m - 1`, inverse sliding standard deviations at `m`,
/// and the finiteness/constancy flags. The caller has already validated
/// `3 <= m <= ts.len()`.
pub fn preprocess_diagonal(ts: &[f64], m: usize) -> Preprocessed {
    debug_assert!(m >= 3 && m <= ts.len());

    let n = ts.len();
    let series: Vec<f64> = ts
        .iter()
        .map(|&x| if x.is_finite() { x } else { 0.0 })
        .collect();

    // Prefix counts of non-finite samples; a window is finite iff the
    // count does not grow across it.
    let mut bad = Vec::with_capacity(n + 1);
    let mut seen = 0usize;
    bad.push(0);
    for &x in ts {
        seen += !x.is_finite() as usize;
        bad.push(seen);
    }
    let finite: Vec<bool> = (0..=n - m).map(|i| bad[i + m] == bad[i]).collect();

    let mean = moving_avg(&series, m);
    let std = moving_std(&series, m);
    let constant: Vec<bool> = std.iter().map(|&s| s < STDDEV_THRESHOLD).collect();
    let inv_std: Vec<f64> = std
        .iter()
        .map(|&s| if s < STDDEV_THRESHOLD { 0.0 } else { 1.0 / s })
        .collect();

    let mean_m1 = moving_avg(&series, m - 1);

    Preprocessed {
        series,
        mean,
        inv_std,
        mean_m1,
        finite,
        constant,
    }
}
