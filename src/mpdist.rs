//! MPdist: a matrix-profile-based similarity measure.
//!
//! Two series count as similar when they share many subsequences,
//! regardless of where those subsequences occur. The measure concatenates
//! the nearest-neighbour profiles of an AB-join and a BA-join and reports
//! the k-th smallest value. MPdist is a measure, not a metric: it ignores
//! the triangle inequality in exchange for scalability.

use serde::{Deserialize, Serialize};

use crate::error::{ProfileError, Result};
use crate::math::{dist_profile, rolling_min, FftMult};
use crate::{stump_with, StumpParams};

/// Strategy collapsing the concatenated AB/BA nearest-neighbour profile
/// into the single reported distance. Implementations may reorder the
/// slice in place.
pub trait Selector {
    fn select(&self, p_abba: &mut [f64]) -> f64;
}

/// Parameters of [`mpdist_with`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpdistParams {
    /// Fraction of the concatenated profile length picking the reported
    /// order statistic; silently clamped into `[0, 1]`. Ignored when `k`
    /// is set.
    pub percentage: f64,
    /// Explicit order statistic to report, capped at the profile length.
    pub k: Option<usize>,
    /// Dispatch seam for the non-normalized back-end.
    pub normalize: bool,
    /// Minkowski order for the non-normalized back-end; ignored when
    /// `normalize` is true.
    pub p: f64,
}

impl Default for MpdistParams {
    fn default() -> Self {
        Self {
            percentage: 0.05,
            k: None,
            normalize: true,
            p: 2.0,
        }
    }
}

/// The concatenated top-1 profiles of the AB-join and the BA-join.
fn compute_p_abba(t_a: &[f64], t_b: &[f64], m: usize) -> Result<Vec<f64>> {
    let params = StumpParams::default();
    let mut p_abba = stump_with(t_a, m, Some(t_b), &params)?.profile();
    p_abba.extend(stump_with(t_b, m, Some(t_a), &params)?.profile());
    Ok(p_abba)
}

/// The `k`-th smallest value of `p_abba` by partial selection. When that
/// order statistic is not finite, fall back to the largest finite value
/// among the `k + 1` smallest; an entirely infinite profile stays
/// infinite.
fn select_value(p_abba: &mut [f64], k: usize) -> f64 {
    let k = k.min(p_abba.len() - 1);
    let (_, kth, _) = p_abba.select_nth_unstable_by(k, f64::total_cmp);
    let mut value = *kth;
    if !value.is_finite() {
        let head = &mut p_abba[..k + 1];
        head.sort_unstable_by(f64::total_cmp);
        let finite = head.iter().filter(|v| v.is_finite()).count();
        value = head[finite.saturating_sub(1)];
    }
    value
}

fn effective_k(k: Option<usize>, percentage: f64, scale: usize, len: usize) -> usize {
    let k = match k {
        Some(k) => k,
        None => (percentage.clamp(0.0, 1.0) * scale as f64).ceil() as usize,
    };
    k.min(len - 1)
}

/// Compute the MPdist measure between two series with the default
/// reporting percentage of 5%.
///
/// ```
/// let a = [-11.1, 23.4, 79.5, 1001.0];
/// let b = [584., -11., 23., 79., 1001., 0., -19.];
/// let d = super_stomp::mpdist(&a, &b, 3).unwrap();
/// assert!((d - 1.9935236191097894e-4).abs() < 1e-8);
/// ```
pub fn mpdist(t_a: &[f64], t_b: &[f64], m: usize) -> Result<f64> {
    mpdist_with(t_a, t_b, m, &MpdistParams::default())
}

/// Compute the MPdist measure with explicit reporting parameters.
pub fn mpdist_with(t_a: &[f64], t_b: &[f64], m: usize, params: &MpdistParams) -> Result<f64> {
    if !params.normalize {
        return Err(ProfileError::Unsupported("the non-normalized MPdist"));
    }

    let mut p_abba = compute_p_abba(t_a, t_b, m)?;
    let k = effective_k(
        params.k,
        params.percentage,
        t_a.len() + t_b.len(),
        p_abba.len(),
    );
    Ok(select_value(&mut p_abba, k))
}

/// Compute the MPdist measure with a caller-supplied selection strategy
/// over the concatenated profile.
pub fn mpdist_select(t_a: &[f64], t_b: &[f64], m: usize, selector: &dyn Selector) -> Result<f64> {
    let mut p_abba = compute_p_abba(t_a, t_b, m)?;
    Ok(selector.select(&mut p_abba))
}

/// The MPdist-based distance profile of a query `q` slid over `t` with
/// step 1: element `i` is the MPdist between `q` and `t[i..i + q.len()]`.
///
/// `mu_q`/`sigma_q` are the window-`m` statistics of `q`, `m_t`/`sigma_t`
/// those of `t` (see [`stats::moving_avg`](crate::stats::moving_avg) and
/// [`stats::moving_std`](crate::stats::moving_std)). The whole
/// `(q - m + 1) x (t - m + 1)` distance matrix is materialized once via
/// FFT sliding dot products; each offset then reads one column of its
/// rolling row-minima and one slice of its column minima.
pub fn mpdist_vect(
    q: &[f64],
    t: &[f64],
    m: usize,
    mu_q: &[f64],
    sigma_q: &[f64],
    m_t: &[f64],
    sigma_t: &[f64],
    percentage: f64,
    k: Option<usize>,
) -> Result<Vec<f64>> {
    let max_window = q.len().min(t.len());
    if m < 3 || m > max_window {
        return Err(ProfileError::WindowSize { m, max: max_window });
    }
    if q.len() > t.len() {
        return Err(ProfileError::SeriesTooShort {
            n: t.len(),
            span: q.len(),
        });
    }
    debug_assert_eq!(mu_q.len(), q.len() - m + 1);
    debug_assert_eq!(sigma_q.len(), q.len() - m + 1);
    debug_assert_eq!(m_t.len(), t.len() - m + 1);
    debug_assert_eq!(sigma_t.len(), t.len() - m + 1);

    let rows = q.len() - m + 1;
    let cols = t.len() - m + 1;
    let n_out = t.len() - q.len() + 1;
    let k = effective_k(k, percentage, 2 * q.len(), 2 * rows);

    let convolver = FftMult::new(t);
    let mut row_mins = Vec::with_capacity(rows);
    let mut col_min = vec![f64::INFINITY; cols];
    for r in 0..rows {
        let dots = convolver.dot(&q[r..r + m]);
        let row = dist_profile(mu_q[r], sigma_q[r], m_t, sigma_t, m, &dots);
        for (best, &value) in col_min.iter_mut().zip(&row) {
            *best = best.min(value);
        }
        row_mins.push(rolling_min(&row, rows));
    }

    let mut p_abba = vec![0.0; 2 * rows];
    let mut out = Vec::with_capacity(n_out);
    for i in 0..n_out {
        for (slot, mins) in p_abba[..rows].iter_mut().zip(&row_mins) {
            *slot = mins[i];
        }
        p_abba[rows..].copy_from_slice(&col_min[i..i + rows]);
        out.push(select_value(&mut p_abba, k));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{moving_avg, moving_std};

    const A: [f64; 4] = [-11.1, 23.4, 79.5, 1001.0];
    const B: [f64; 7] = [584., -11., 23., 79., 1001., 0., -19.];

    #[test]
    fn matches_reference_value() {
        let d = mpdist(&A, &B, 3).unwrap();
        assert!((d - 1.9935236191097894e-4).abs() < 1e-8, "got {}", d);
    }

    #[test]
    fn symmetric_in_its_arguments() {
        let ab = mpdist(&A, &B, 3).unwrap();
        let ba = mpdist(&B, &A, 3).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn monotone_in_k() {
        let mut previous = 0.0;
        for k in 0..7 {
            let params = MpdistParams {
                k: Some(k),
                ..MpdistParams::default()
            };
            let d = mpdist_with(&A, &B, 3, &params).unwrap();
            assert!(d >= previous, "k={} gave {} after {}", k, d, previous);
            previous = d;
        }
    }

    #[test]
    fn percentage_extremes_are_min_and_max() {
        let mut p_abba = compute_p_abba(&A, &B, 3).unwrap();
        p_abba.sort_unstable_by(f64::total_cmp);

        let low = MpdistParams {
            percentage: 0.0,
            ..MpdistParams::default()
        };
        assert_eq!(mpdist_with(&A, &B, 3, &low).unwrap(), p_abba[0]);

        let high = MpdistParams {
            percentage: 1.0,
            ..MpdistParams::default()
        };
        assert_eq!(
            mpdist_with(&A, &B, 3, &high).unwrap(),
            p_abba[p_abba.len() - 1]
        );
    }

    #[test]
    fn custom_selector_is_honored() {
        struct Largest;
        impl Selector for Largest {
            fn select(&self, p_abba: &mut [f64]) -> f64 {
                p_abba.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
            }
        }

        let got = mpdist_select(&A, &B, 3, &Largest).unwrap();
        let mut p_abba = compute_p_abba(&A, &B, 3).unwrap();
        p_abba.sort_unstable_by(f64::total_cmp);
        assert_eq!(got, p_abba[p_abba.len() - 1]);
    }

    #[test]
    fn selection_skips_infinite_tail() {
        let mut p_abba = [0.25, f64::INFINITY, 0.5, f64::INFINITY];
        assert_eq!(select_value(&mut p_abba, 3), 0.5);
        let mut all_inf = [f64::INFINITY, f64::INFINITY];
        assert!(select_value(&mut all_inf, 1).is_infinite());
    }

    #[test]
    fn vector_matches_pointwise_mpdist() {
        let q = [2., -3., 4.5, 0., 1., -2.];
        let t = [0.5, 2., -3., 4.5, 0., 1., -2., 3., 0.25, -1., 2., 5.];
        let m = 3;
        let mu_q = moving_avg(&q, m);
        let sigma_q = moving_std(&q, m);
        let m_t = moving_avg(&t, m);
        let sigma_t = moving_std(&t, m);

        let vect = mpdist_vect(&q, &t, m, &mu_q, &sigma_q, &m_t, &sigma_t, 0.05, None).unwrap();
        assert_eq!(vect.len(), t.len() - q.len() + 1);
        for (i, &got) in vect.iter().enumerate() {
            let want = mpdist(&q, &t[i..i + q.len()], m).unwrap();
            // The FFT path and the diagonal kernel agree to roughly the
            // square root of the zero-distance clamp.
            assert!(
                (got - want).abs() < 1e-6,
                "offset {}: {} vs {}",
                i,
                got,
                want
            );
        }
    }

    #[test]
    fn vector_rejects_bad_window() {
        let q = [1., 2., 3., 4.];
        let t = [1., 2., 3., 4., 5., 6.];
        let err = mpdist_vect(&q, &t, 5, &[], &[], &[], &[], 0.05, None);
        assert!(matches!(err, Err(ProfileError::WindowSize { .. })));
    }
}
