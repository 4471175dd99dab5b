use thiserror::Error;

/// Possible radiative transfer errors.
#[derive(Error, Debug)]
pub enum RteError {
    /// The coefficient tables don't have mutually consistent dimensions
    #[error("coefficient tables are inconsistent: {0}")]
    InconsistentTable(String),
    /// The inputs don't have the expected shape(s)
    #[error("inputs have the wrong shape: {0}")]
    InconsistentInputs(String),
    /// A gas needed by the k-distribution has no concentration
    #[error("gas `{0}` is required but has no concentration")]
    MissingGas(String),
    /// A volume mixing ratio is negative or larger than one
    #[error("volume mixing ratio of `{0}` is outside [0, 1]")]
    InvalidVmr(String),
    /// Optical properties outside their physical range
    #[error("invalid optical properties: {0}")]
    InvalidOpticalProps(String),
    /// Pressure or temperature outside the range covered by the tables
    #[error("{0} is outside the range covered by the coefficient tables")]
    OutOfRange(&'static str),
    /// The angular quadrature can't be constructed
    #[error("invalid quadrature: {0}")]
    InvalidQuadrature(String),
    /// The cosine of the solar zenith angle must lie in (0, 1]
    #[error("cosine of the solar zenith angle {0} is outside (0, 1]")]
    InvalidSolarZenith(f64),
    /// The computation was cancelled before it finished
    #[error("computation cancelled")]
    Cancelled,
    /// The worker thread pool couldn't be started
    #[error("couldn't build the thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Convenience type for `Result<T, RteError>`.
pub type RteResult<T> = Result<T, RteError>;
