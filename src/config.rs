//! Settings of the block-staged solves.

use std::num::NonZeroUsize;

use crate::error::{RteError, RteResult};
use crate::rte::GaussQuadrature;

/// Settings shared by the longwave and shortwave block-staged solves.
#[derive(Debug, Clone, PartialEq)]
pub struct RteConfig {
    /// Number of columns solved together in one block.
    n_col_block: NonZeroUsize,
    /// Longwave angular quadrature.
    quadrature: GaussQuadrature,
    /// Worker threads, or `None` to let rayon choose.
    num_threads: Option<NonZeroUsize>,
    /// Compute the surface-temperature Jacobian of the upward longwave flux.
    compute_jacobian: bool,
    /// Reject pressures and temperatures outside the tables instead of
    /// extrapolating.
    check_values: bool,
}

impl RteConfig {
    /// Validated settings. `n_quad_angles` selects the standard quadrature
    /// with 1 to 4 angles.
    pub fn new(
        n_col_block: usize,
        n_quad_angles: usize,
        num_threads: Option<usize>,
        compute_jacobian: bool,
        check_values: bool,
    ) -> RteResult<Self> {
        let n_col_block = NonZeroUsize::new(n_col_block).ok_or_else(|| {
            RteError::InconsistentInputs("column block size must be positive".into())
        })?;
        let num_threads = match num_threads {
            None => None,
            Some(n) => Some(NonZeroUsize::new(n).ok_or_else(|| {
                RteError::InconsistentInputs("number of threads must be positive".into())
            })?),
        };
        Ok(Self {
            n_col_block,
            quadrature: GaussQuadrature::new(n_quad_angles)?,
            num_threads,
            compute_jacobian,
            check_values,
        })
    }

    /// Replace the standard quadrature with a custom one.
    pub fn with_quadrature(mut self, quadrature: GaussQuadrature) -> Self {
        self.quadrature = quadrature;
        self
    }

    /// Columns per block.
    pub fn n_col_block(&self) -> usize {
        self.n_col_block.get()
    }

    /// Angles of the longwave integration.
    pub fn quadrature(&self) -> &GaussQuadrature {
        &self.quadrature
    }

    /// Threads of the solve pool, `None` for the rayon default.
    pub fn num_threads(&self) -> Option<usize> {
        self.num_threads.map(NonZeroUsize::get)
    }

    /// Whether longwave solves also return the surface-temperature Jacobian.
    pub fn compute_jacobian(&self) -> bool {
        self.compute_jacobian
    }

    /// Whether out-of-range pressures and temperatures are errors.
    pub fn check_values(&self) -> bool {
        self.check_values
    }

    /// A thread pool with the configured number of threads.
    pub fn thread_pool(&self) -> RteResult<rayon::ThreadPool> {
        Ok(rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads().unwrap_or(0))
            .build()?)
    }
}

impl Default for RteConfig {
    fn default() -> Self {
        Self {
            n_col_block: NonZeroUsize::MIN.saturating_add(3),
            quadrature: GaussQuadrature::default(),
            num_threads: None,
            compute_jacobian: false,
            check_values: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RteConfig::default();
        assert_eq!(config.n_col_block(), 4);
        assert_eq!(config.quadrature().len(), 1);
        assert_eq!(config.num_threads(), None);
        assert!(!config.compute_jacobian());
        assert!(!config.check_values());
        assert_eq!(config, RteConfig::new(4, 1, None, false, false).unwrap());
    }

    #[test]
    fn invalid_settings() {
        assert!(matches!(
            RteConfig::new(0, 1, None, false, false),
            Err(RteError::InconsistentInputs(_))
        ));
        assert!(matches!(
            RteConfig::new(4, 5, None, false, false),
            Err(RteError::InvalidQuadrature(_))
        ));
        assert!(RteConfig::new(4, 1, Some(0), false, false).is_err());
    }

    #[test]
    fn thread_pool_size() {
        let config = RteConfig::new(8, 3, Some(2), true, true).unwrap();
        assert_eq!(config.quadrature().len(), 3);
        assert_eq!(config.thread_pool().unwrap().current_num_threads(), 2);
    }
}
