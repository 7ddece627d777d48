//! Process-wide tuning constants.

/// Denominator deriving the self-join exclusion zone from the covered
/// window span: indices within `ceil(span / EXCL_ZONE_DENOM)` of the query
/// are never reported as neighbours.
pub const EXCL_ZONE_DENOM: usize = 4;

/// Sliding standard deviations below this threshold mark a subsequence as
/// constant; its inverse deviation is stored as `0.0`.
pub const STDDEV_THRESHOLD: f64 = 1e-7;

/// Squared z-normalized distances below this threshold collapse to exactly
/// `0.0` before the square root is taken.
pub const P_NORM_THRESHOLD: f64 = 1e-14;
