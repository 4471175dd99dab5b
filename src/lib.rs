//! Radiative fluxes from k-distribution gas optics.
//!
//! The gas optics in [`gas_optics`] turn pressure, temperature, and gas
//! concentrations into optical properties on the g-points of a
//! k-distribution, plus Planck sources for the longwave. Cloud and aerosol
//! properties are added with [`combine`]. The solvers in [`rte`] then
//! compute fluxes on every g-point: without scattering in the longwave, with
//! a two-stream adding method in the shortwave. Finally [`fluxes`] sums them
//! into broadband and per-band fluxes.
//!
//! [`radiation`] strings these steps together for blocks of columns, which
//! is also what the optional Python interface (the `python` feature) calls.

pub mod aerosol_optics;
pub mod atmosphere;
pub mod config;
pub mod error;
pub mod fluxes;
pub mod gas_concs;
pub mod gas_optics;
pub mod optical_props;
pub mod radiation;
pub mod rte;
pub mod source_functions;

#[cfg(feature = "python")]
mod python;

/// Floating-point type of every computation.
#[cfg(not(feature = "single-precision"))]
pub type Float = f64;

/// Floating-point type of every computation.
#[cfg(feature = "single-precision")]
pub type Float = f32;

/// π in [`Float`] precision.
pub const PI: Float = std::f64::consts::PI as Float;

pub use crate::atmosphere::Atmosphere;
pub use crate::config::RteConfig;
pub use crate::error::{RteError, RteResult};
pub use crate::fluxes::{FluxesBroadband, FluxesByband};
pub use crate::gas_concs::GasConcs;
pub use crate::gas_optics::{KDistribution, KDistributionTables};
pub use crate::optical_props::{combine, OneScalar, OpticalProps, OpticalPropsArry, SpectralDisc, TwoStream};
pub use crate::rte::{rte_lw, rte_sw, GaussQuadrature, Orientation};
pub use crate::source_functions::SourceFuncLw;
