//! Index remapping, FFT-backed sliding dot products and distance math.

use std::collections::VecDeque;
use std::sync::Arc;

use itertools::izip;
use rustfft::num_complex::Complex;
use rustfft::num_traits::Zero;
use rustfft::{FFTplanner, FFT};

use crate::config::{P_NORM_THRESHOLD, STDDEV_THRESHOLD};

/// Reorder `xs` so that every `d`-strided phase becomes contiguous:
/// `concat(xs[0::d], xs[1::d], ..., xs[d-1::d])`.
///
/// The identity for `d = 1`. Applied to `[0, 1, ..., n-1]` it yields the
/// map from remapped position back to original position.
pub fn dilation_mapping<T: Copy>(xs: &[T], d: usize) -> Vec<T> {
    debug_assert!(d >= 1);

    let mut out = Vec::with_capacity(xs.len());
    for phase in 0..d {
        out.extend(xs[phase..].iter().step_by(d).copied());
    }
    out
}

/// Sliding dot products of queries against a fixed series, with the series
/// spectrum computed once. Dot products come out of a circular convolution
/// with the reversed zero-padded query; only the wrap-free tail is kept.
pub struct FftMult {
    fft: Arc<dyn FFT<f64>>,
    ifft: Arc<dyn FFT<f64>>,
    ts_freq: Vec<Complex<f64>>,
    n: usize,
}

impl FftMult {
    pub fn new(ts: &[f64]) -> Self {
        let n = ts.len();
        let mut planner = FFTplanner::new(false);
        let fft = planner.plan_fft(n);
        let mut inverse_planner = FFTplanner::new(true);
        let ifft = inverse_planner.plan_fft(n);

        let mut time: Vec<Complex<f64>> = ts.iter().map(|&x| Complex::new(x, 0.0)).collect();
        let mut ts_freq = vec![Complex::zero(); n];
        fft.process(&mut time, &mut ts_freq);

        Self {
            fft,
            ifft,
            ts_freq,
            n,
        }
    }

    /// Dot product of `query` against every window of the series. Output
    /// length is `n - query.len() + 1`.
    pub fn dot(&self, query: &[f64]) -> Vec<f64> {
        let m = query.len();
        debug_assert!(m >= 1 && m <= self.n);

        let mut reversed: Vec<Complex<f64>> =
            query.iter().rev().map(|&x| Complex::new(x, 0.0)).collect();
        reversed.resize(self.n, Complex::zero());
        let mut query_freq = vec![Complex::zero(); self.n];
        self.fft.process(&mut reversed, &mut query_freq);

        let mut product: Vec<Complex<f64>> = self
            .ts_freq
            .iter()
            .zip(&query_freq)
            .map(|(a, b)| a * b)
            .collect();
        let mut conv = vec![Complex::zero(); self.n];
        self.ifft.process(&mut product, &mut conv);

        // The inverse transform is unnormalized; positions below m - 1
        // carry circular wrap-around and are discarded.
        let scale = 1.0 / self.n as f64;
        conv[m - 1..].iter().map(|c| c.re * scale).collect()
    }
}

/// One-shot convenience over [`FftMult`].
pub fn fft_mult(ts: &[f64], query: &[f64]) -> Vec<f64> {
    FftMult::new(ts).dot(query)
}

/// Z-normalized Euclidean distance profile of a query of length `m` from
/// its sliding dot products `z` against a series with window statistics
/// `m_t`/`sigma_t`.
///
/// Constant subsequences follow the Pearson conventions of the diagonal
/// kernel: both constant gives distance 0, exactly one gives `sqrt(m)`.
/// Squared distances under the near-zero threshold collapse to 0.
pub fn dist_profile(
    mu_q: f64,
    sigma_q: f64,
    m_t: &[f64],
    sigma_t: &[f64],
    m: usize,
    z: &[f64],
) -> Vec<f64> {
    debug_assert_eq!(m_t.len(), z.len());
    debug_assert_eq!(sigma_t.len(), z.len());

    let mf = m as f64;
    let q_constant = sigma_q < STDDEV_THRESHOLD;
    izip!(m_t, sigma_t, z)
        .map(|(&mu, &sigma, &dot)| {
            let t_constant = sigma < STDDEV_THRESHOLD;
            let pearson = if q_constant && t_constant {
                1.0
            } else if q_constant || t_constant {
                0.5
            } else {
                (dot - mf * mu_q * mu) / (mf * sigma_q * sigma)
            };
            let p_norm = (2.0 * mf * (1.0 - pearson)).abs();
            if p_norm < P_NORM_THRESHOLD {
                0.0
            } else {
                p_norm.sqrt()
            }
        })
        .collect()
}

/// Minimum of every window of length `w`, by monotonic deque. NaN orders
/// after every finite value, so a window's minimum ignores NaNs unless the
/// whole window is NaN.
pub(crate) fn rolling_min(xs: &[f64], w: usize) -> Vec<f64> {
    debug_assert!(w >= 1 && w <= xs.len());

    let mut deque: VecDeque<usize> = VecDeque::new();
    let mut out = Vec::with_capacity(xs.len() - w + 1);
    for (i, &x) in xs.iter().enumerate() {
        while let Some(&back) = deque.back() {
            if xs[back].total_cmp(&x).is_ge() {
                deque.pop_back();
            } else {
                break;
            }
        }
        deque.push_back(i);
        if deque[0] + w <= i {
            deque.pop_front();
        }
        if i + 1 >= w {
            out.push(xs[deque[0]]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_dot(ts: &[f64], query: &[f64]) -> Vec<f64> {
        (0..=ts.len() - query.len())
            .map(|i| {
                ts[i..i + query.len()]
                    .iter()
                    .zip(query)
                    .map(|(&a, &b)| a * b)
                    .sum()
            })
            .collect()
    }

    #[test]
    fn dilation_identity() {
        let xs = [1., 2., 3., 4., 5.];
        assert_eq!(dilation_mapping(&xs, 1), xs.to_vec());
    }

    #[test]
    fn dilation_phases_are_contiguous() {
        let xs: Vec<usize> = (0..8).collect();
        assert_eq!(dilation_mapping(&xs, 2), vec![0, 2, 4, 6, 1, 3, 5, 7]);
        assert_eq!(dilation_mapping(&xs, 3), vec![0, 3, 6, 1, 4, 7, 2, 5]);
    }

    #[test]
    fn fft_mult_matches_naive() {
        let ts = [10., 3., 2., 3., 4.5, 6., 0., -1., 2.5, 7.];
        let query = [2., 3., 2.];
        let got = fft_mult(&ts, &query);
        let want = naive_dot(&ts, &query);
        assert_eq!(got.len(), want.len());
        for (g, w) in got.iter().zip(&want) {
            assert!((g - w).abs() < 1e-9, "{} vs {}", g, w);
        }
    }

    #[test]
    fn fft_mult_reuses_series_spectrum() {
        let ts = [1., -2., 4., 8., -16., 32., 5., 0.5];
        let conv = FftMult::new(&ts);
        for m in 2..=4 {
            let query: Vec<f64> = ts[1..1 + m].to_vec();
            let got = conv.dot(&query);
            let want = naive_dot(&ts, &query);
            for (g, w) in got.iter().zip(&want) {
                assert!((g - w).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn dist_profile_constant_rules() {
        let m = 4;
        // Series windows: one constant, one not.
        let sigma_t = [0.0, 2.0];
        let m_t = [5.0, 1.0];
        let z = [0.0, 0.0];
        let both = dist_profile(1.0, 0.0, &m_t, &sigma_t, m, &z);
        assert_eq!(both[0], 0.0);
        assert!((both[1] - (m as f64).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn rolling_min_basic() {
        let xs = [3., 1., 4., 1., 5., 9., 2., 6.];
        assert_eq!(rolling_min(&xs, 3), vec![1., 1., 1., 1., 2., 2.]);
    }

    #[test]
    fn rolling_min_skips_nan() {
        let xs = [3., f64::NAN, 4., 2.];
        let got = rolling_min(&xs, 2);
        assert_eq!(got[0], 3.);
        assert_eq!(got[1], 4.);
        assert_eq!(got[2], 2.);
    }
}
