//!
//!STOMP: parallel top-k matrix profile with dilation and MPdist in Rust!

//! > The matrix profile annotates every subsequence of a time series with the z-normalized Euclidean distance to its nearest non-trivial neighbour, and with that neighbour's position. All-pairs similarity search over subsequences has been scaled to hundreds of millions of observations with the STOMP family of algorithms, which replace the per-window dot products of earlier approaches with a single running cross-product carried along each diagonal of the (never materialized) distance matrix, turned into a Pearson correlation through precomputed window statistics \[a,b\].
//!
//! > Once the profiles of an AB-join and of a BA-join are available, the MPdist measure reports the k-th smallest value of their concatenated nearest-neighbour columns. Two series are thereby considered similar when they share many subsequences, regardless of where those subsequences occur \[c\].
//!
//! Adapted from:

//!```markdown
//!@misc{
//!MatrixProfileII,
//!title={Matrix Profile II: Exploiting a Novel Algorithm and GPUs to Break the One Hundred Million Barrier for Time Series Motifs and Joins},
//!author={ Zhu, Yan and Zimmerman, Zachary and Senobari, Nader Shakibay and Yeh, Chin-Chia Michael and Funning, Gareth and Mueen, Abdullah and Brisk, Philip and Keogh, Eamonn},
//!year={2016},
//!note = {\url{https://www.cs.ucr.edu/~eamonn/MatrixProfile.html}}
//!}
//!```

//!
//!This crate computes the (top-k) matrix profile of a self-join or AB-join
//!with a diagonal-traversal kernel parallelized over all logical cores, a
//!dilation factor for multi-scale pattern search, and the MPdist distance
//!measure (plus its sliding-vector variant) on top of the kernel.
//!
//!## Features
//!
//!`"jemalloc"` enable jemallocator as memory allocator.
//!
//!`"auto"` uses all logical cores to parallelize the kernel. Enabled by
//!default. Disabling this feature exposes [`init_pool()`] to init the
//!global thread pool.
//!
//! ## Examples

//!```
//!use rand::{thread_rng, Rng};
//!
//!let mut rng = thread_rng();
//!let ts = (0..2_000).map(|_| rng.gen()).collect::<Vec<f64>>();
//!let mp = super_stomp::stump(&ts[..], 50).unwrap();
//! //nearest-neighbour distance and position of the first subsequence.
//!dbg!(mp.profile()[0]);
//!dbg!(mp.profile_index()[0]);
//!```

//!```
//!use rand::{thread_rng, Rng};
//!
//!let mut rng = thread_rng();
//!let a = (0..300).map(|_| rng.gen()).collect::<Vec<f64>>();
//!let b = (0..400).map(|_| rng.gen()).collect::<Vec<f64>>();
//! //one scalar similarity score for the pair of series.
//!let d = super_stomp::mpdist(&a[..], &b[..], 25).unwrap();
//!dbg!(d);
//!```

#[cfg(all(not(target_env = "msvc"), feature = "jemallocator"))]
use jemallocator::Jemalloc;

#[cfg(all(not(target_env = "msvc"), feature = "jemallocator"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use serde::{Deserialize, Serialize};

#[cfg(not(feature = "auto"))]
use num_cpus;

pub mod config;
mod diagonal;
mod error;
pub mod math;
mod mpdist;
mod profile;
pub mod stats;
mod topk;

use diagonal::{stump_kernel, JoinInputs};
use math::dilation_mapping;
use stats::preprocess_diagonal;

pub use error::{ProfileError, Result};
pub use mpdist::{mpdist, mpdist_select, mpdist_vect, mpdist_with, MpdistParams, Selector};
pub use profile::MatrixProfile;

/// Parameters of [`stump_with`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StumpParams {
    /// Number of nearest neighbours kept per subsequence.
    pub k: usize,
    /// Dilation factor: subsequences take every `d`-th sample and cover
    /// `(m - 1) * d + 1` original samples.
    pub d: usize,
    /// Dispatch seam for the non-normalized back-end.
    pub normalize: bool,
    /// Minkowski order for the non-normalized back-end; ignored when
    /// `normalize` is true.
    pub p: f64,
}

impl Default for StumpParams {
    fn default() -> Self {
        Self {
            k: 1,
            d: 1,
            normalize: true,
            p: 2.0,
        }
    }
}

/// Compute the top-1 matrix profile of a self-join over `ts` with window
/// length `m`.
///
/// ```
/// let ts = [584., -11., 23., 79., 1001., 0., -19.];
/// let mp = super_stomp::stump(&ts, 3).unwrap();
/// assert_eq!(mp.profile_index(), vec![4, 3, 0, 1, 0]);
/// assert!((mp.profile()[0] - 0.11633857113691416).abs() < 1e-9);
/// ```
pub fn stump(ts: &[f64], m: usize) -> Result<MatrixProfile> {
    stump_with(ts, m, None, &StumpParams::default())
}

/// Compute the (top-k) matrix profile of `t_a` with window length `m`.
///
/// `t_b = None` runs a self-join: the trivial band of matches around every
/// subsequence is excluded and the left/right profile columns are filled.
/// `t_b = Some(series)` runs an AB-join annotating every subsequence of
/// `t_a` with its nearest neighbours in the other series, without
/// exclusion and without left/right columns.
///
/// The profile has `t_a.len() - (m - 1) * d` rows. All validation happens
/// before any work: dilation factor, window length against both series,
/// covered span against both series lengths.
pub fn stump_with(
    t_a: &[f64],
    m: usize,
    t_b: Option<&[f64]>,
    params: &StumpParams,
) -> Result<MatrixProfile> {
    assert!(params.k >= 1, "keep at least one neighbour per row");

    if params.d < 1 {
        return Err(ProfileError::Dilation(params.d));
    }
    if !params.normalize {
        return Err(ProfileError::Unsupported("the non-normalized profile"));
    }
    let max_window = t_b.map_or(t_a.len(), |b| t_a.len().min(b.len()));
    if m < 3 || m > max_window {
        return Err(ProfileError::WindowSize { m, max: max_window });
    }
    let span = (m - 1) * params.d + 1;
    if t_a.len() < span {
        return Err(ProfileError::SeriesTooShort { n: t_a.len(), span });
    }
    if let Some(b) = t_b {
        if b.len() < span {
            return Err(ProfileError::SeriesTooShort { n: b.len(), span });
        }
    }

    let self_join = t_b.is_none();

    let a_remapped = dilation_mapping(t_a, params.d);
    let index_a = dilation_mapping(&(0..t_a.len()).collect::<Vec<usize>>(), params.d);
    let pre_a = preprocess_diagonal(&a_remapped, m);

    let pre_b_owned = t_b.map(|b| preprocess_diagonal(&dilation_mapping(b, params.d), m));
    let index_b_owned =
        t_b.map(|b| dilation_mapping(&(0..b.len()).collect::<Vec<usize>>(), params.d));
    let pre_b = pre_b_owned.as_ref().unwrap_or(&pre_a);
    let index_b = index_b_owned.as_deref().unwrap_or(&index_a);

    let inputs = JoinInputs {
        a: &pre_a,
        b: pre_b,
        m,
        d: params.d,
        index_dilated_a: &index_a,
        index_dilated_b: index_b,
        self_join,
        k: params.k,
    };
    let out = stump_kernel(&inputs);

    let result = MatrixProfile::new(
        params.k,
        out.distances,
        out.indices,
        out.left_indices,
        out.right_indices,
    );
    result.check()?;
    Ok(result)
}

// need to try whether chunks over logical is faster than over physical cores SMT!!
#[cfg(not(feature = "auto"))]
fn cpus() -> usize {
    num_cpus::get()
}

#[cfg(not(feature = "auto"))]
use std::sync::Once;

#[cfg(not(feature = "auto"))]
static JOBS_SET: Once = Once::new();

// Init global pool with [`jobs`] threads.
#[cfg(not(feature = "auto"))]
fn start_pool(jobs: usize) {
    assert!(jobs > 0, "Job count must be at least 1.");
    // silently use at max all available logical cpus
    let jobs = jobs.min(cpus());
    rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build_global()
        .unwrap();
}

// Initialize the threadpool with [`threads`] threads. This method will take effect once and
//  must be called before the first call to [`stump`]. Once the pool has been instantiated the threadpool is final.
// The limitation on the global threadpool being final comes from the ['rayon'] dependency and is subject to change.
#[cfg(not(feature = "auto"))]
pub fn init_pool(threads: usize) {
    JOBS_SET.call_once(|| start_pool(threads));
}
