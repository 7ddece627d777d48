use thiserror::Error;

/// A type alias for `Result<T, ProfileError>`.
pub type Result<T> = std::result::Result<T, ProfileError>;

/// An error raised while validating inputs to, or checking outputs of, a
/// matrix profile computation.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// The window length must lie between 3 and the shortest input series.
    #[error("window size is {m} but must be between 3 and {max}")]
    WindowSize { m: usize, max: usize },

    /// The dilation factor must be at least 1.
    #[error("dilation factor is {0} but must be at least 1")]
    Dilation(usize),

    /// A dilated subsequence covers `(m - 1) * d + 1` samples; the series
    /// must hold at least one.
    #[error("series of length {n} holds no subsequence spanning {span} samples")]
    SeriesTooShort { n: usize, span: usize },

    /// The requested variant is handled by a different back-end.
    #[error("{0} is not supported by this crate")]
    Unsupported(&'static str),

    /// Post-condition violation: the nearest-neighbour distance column of
    /// the finished profile contains a NaN.
    #[error("profile row {row} holds a NaN nearest-neighbour distance")]
    DegenerateProfile { row: usize },
}
