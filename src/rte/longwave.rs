//! Longwave solver without scattering.
//!
//! Intensities along each quadrature angle are found with a source that
//! varies linearly in optical depth across the layer, then integrated over
//! the hemisphere into fluxes.

use log::debug;
use ndarray::{Array2, Array3, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

use super::{apply_bc, GaussQuadrature, Orientation};
use crate::error::{RteError, RteResult};
use crate::optical_props::{OneScalar, OpticalProps};
use crate::source_functions::SourceFuncLw;
use crate::{Float, PI};

/// Longwave fluxes on every g-point, (column, level, g-point), in W/m².
#[derive(Debug, Clone)]
pub struct GptFluxesLw {
    pub(crate) flux_up: Array3<Float>,
    pub(crate) flux_dn: Array3<Float>,
    pub(crate) flux_up_jac: Option<Array3<Float>>,
}

impl GptFluxesLw {
    /// Upward flux.
    pub fn flux_up(&self) -> &Array3<Float> {
        &self.flux_up
    }

    /// Downward flux.
    pub fn flux_dn(&self) -> &Array3<Float> {
        &self.flux_dn
    }

    /// Change of the upward flux for a 1 K warmer surface, when requested.
    pub fn flux_up_jac(&self) -> Option<&Array3<Float>> {
        self.flux_up_jac.as_ref()
    }
}

/// Everything the solver needs for one column, shaped (layer, g-point) or
/// (g-point).
struct Column<'a> {
    tau: ArrayView2<'a, Float>,
    lay_source: ArrayView2<'a, Float>,
    /// Level source at each layer's upper boundary
    lev_source_up: ArrayView2<'a, Float>,
    /// Level source at each layer's lower boundary
    lev_source_dn: ArrayView2<'a, Float>,
    sfc_source: ArrayView1<'a, Float>,
    sfc_source_jac: ArrayView1<'a, Float>,
    sfc_emis: ArrayView1<'a, Float>,
    /// Downward flux at the top level
    top_flux: ArrayView1<'a, Float>,
}

struct ColumnFluxes {
    up: Array2<Float>,
    dn: Array2<Float>,
    up_jac: Option<Array2<Float>>,
}

impl Column<'_> {
    fn solve(&self, orientation: Orientation, quadrature: &GaussQuadrature, jacobian: bool) -> ColumnFluxes {
        let (nlay, ngpt) = self.tau.dim();
        let nlev = nlay + 1;
        let top = orientation.top_level(nlay);
        let sfc = orientation.surface_level(nlay);
        let tau_thresh = Float::EPSILON.sqrt();

        let mut fluxes = ColumnFluxes {
            up: Array2::zeros((nlev, ngpt)),
            dn: Array2::zeros((nlev, ngpt)),
            up_jac: jacobian.then(|| Array2::zeros((nlev, ngpt))),
        };
        fluxes.dn.row_mut(top).assign(&self.top_flux);

        let mut trans = vec![0.; nlay];
        let mut src_up = vec![0.; nlay];
        let mut src_dn = vec![0.; nlay];
        let mut i_up = vec![0.; nlev];
        let mut i_dn = vec![0.; nlev];
        let mut i_jac = vec![0.; nlev];

        for (secant, weight) in quadrature.angles() {
            let scale = 2. * PI * weight;
            for gpt in 0..ngpt {
                for lay in 0..nlay {
                    let tau_loc = self.tau[[lay, gpt]] * secant;
                    let t = (-tau_loc).exp();
                    // Second-order expansion where (1 - t)/tau loses precision
                    let fact = if tau_loc > tau_thresh {
                        (1. - t) / tau_loc - t
                    } else {
                        tau_loc * (0.5 - tau_loc / 3.)
                    };
                    let lay_src = self.lay_source[[lay, gpt]];
                    let lev_up = self.lev_source_up[[lay, gpt]];
                    let lev_dn = self.lev_source_dn[[lay, gpt]];
                    trans[lay] = t;
                    src_up[lay] = (1. - t) * lev_up + 2. * fact * (lay_src - lev_up);
                    src_dn[lay] = (1. - t) * lev_dn + 2. * fact * (lay_src - lev_dn);
                }

                // Isotropic intensity of the incident flux
                i_dn[top] = self.top_flux[gpt] / PI;
                for step in orientation.top_down(nlay) {
                    i_dn[step.below] = trans[step.lay] * i_dn[step.above] + src_dn[step.lay];
                }

                let emis = self.sfc_emis[gpt];
                i_up[sfc] = (1. - emis) * i_dn[sfc] + emis * self.sfc_source[gpt];
                i_jac[sfc] = emis * self.sfc_source_jac[gpt];
                for step in orientation.bottom_up(nlay) {
                    i_up[step.above] = trans[step.lay] * i_up[step.below] + src_up[step.lay];
                    i_jac[step.above] = trans[step.lay] * i_jac[step.below];
                }

                for lev in 0..nlev {
                    fluxes.up[[lev, gpt]] += scale * i_up[lev];
                    if lev != top {
                        fluxes.dn[[lev, gpt]] += scale * i_dn[lev];
                    }
                }
                if let Some(up_jac) = &mut fluxes.up_jac {
                    for lev in 0..nlev {
                        up_jac[[lev, gpt]] += scale * i_jac[lev];
                    }
                }
            }
        }
        fluxes
    }
}

/// Longwave fluxes for absorbing-only optical properties.
///
/// `sfc_emis` is the surface emissivity per (column, band) and `inc_flux`
/// an optional downward flux at the top of the atmosphere per (column,
/// g-point), taken to be isotropic. The top level of the downward flux is
/// exactly that boundary flux, or zero without one.
pub fn rte_lw(
    atmos: &OneScalar,
    orientation: Orientation,
    sources: &SourceFuncLw,
    sfc_emis: ArrayView2<'_, Float>,
    inc_flux: Option<ArrayView2<'_, Float>>,
    quadrature: &GaussQuadrature,
    compute_jacobian: bool,
) -> RteResult<GptFluxesLw> {
    let (ncol, nlay, ngpt) = atmos.tau().dim();
    if (sources.ncol(), sources.nlay(), sources.spectral_disc().ngpt()) != (ncol, nlay, ngpt) {
        return Err(RteError::InconsistentInputs(
            "sources and optical properties differ in shape".into(),
        ));
    }
    let sfc_emis = atmos.spectral_disc().expand_by_band(sfc_emis)?;
    if sfc_emis.dim().0 != ncol {
        return Err(RteError::InconsistentInputs(format!(
            "surface emissivity has {} columns, expected {ncol}",
            sfc_emis.dim().0
        )));
    }
    if let Some(inc) = inc_flux {
        if inc.dim() != (ncol, ngpt) {
            return Err(RteError::InconsistentInputs(format!(
                "incident flux has shape {:?}, expected ({ncol}, {ngpt})",
                inc.dim()
            )));
        }
    }
    debug!("input shapes are consistent");

    let nlev = nlay + 1;
    let mut flux_dn = Array3::zeros((ncol, nlev, ngpt));
    apply_bc(flux_dn.view_mut(), orientation, inc_flux, None);
    let top_flux = flux_dn.index_axis(Axis(1), orientation.top_level(nlay)).to_owned();

    let tau = atmos.tau();
    let lay_source = sources.lay_source();
    let sfc_source = sources.sfc_source();
    let sfc_source_jac = sources.sfc_source_jac();
    let (lev_source_up, lev_source_dn) = match orientation {
        Orientation::TopAtFirst => (sources.lev_source_dec(), sources.lev_source_inc()),
        Orientation::SurfaceAtFirst => (sources.lev_source_inc(), sources.lev_source_dec()),
    };

    let mut results = Vec::new();
    (0..ncol)
        .into_par_iter()
        .map(|icol| {
            let column = Column {
                tau: tau.index_axis(Axis(0), icol),
                lay_source: lay_source.index_axis(Axis(0), icol),
                lev_source_up: lev_source_up.index_axis(Axis(0), icol),
                lev_source_dn: lev_source_dn.index_axis(Axis(0), icol),
                sfc_source: sfc_source.row(icol),
                sfc_source_jac: sfc_source_jac.row(icol),
                sfc_emis: sfc_emis.row(icol),
                top_flux: top_flux.row(icol),
            };
            column.solve(orientation, quadrature, compute_jacobian)
        })
        .collect_into_vec(&mut results);

    let mut fluxes = GptFluxesLw {
        flux_up: Array3::zeros((ncol, nlev, ngpt)),
        flux_dn,
        flux_up_jac: compute_jacobian.then(|| Array3::zeros((ncol, nlev, ngpt))),
    };
    for (icol, column) in results.into_iter().enumerate() {
        fluxes.flux_up.index_axis_mut(Axis(0), icol).assign(&column.up);
        fluxes.flux_dn.index_axis_mut(Axis(0), icol).assign(&column.dn);
        if let (Some(all), Some(col)) = (&mut fluxes.flux_up_jac, &column.up_jac) {
            all.index_axis_mut(Axis(0), icol).assign(col);
        }
    }
    Ok(fluxes)
}
