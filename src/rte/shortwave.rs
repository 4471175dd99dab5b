//! Shortwave solvers: direct beam only for absorbing atmospheres, and the
//! two-stream adding method when there is scattering.

use log::debug;
use ndarray::{Array3, ArrayView1, ArrayView2, ArrayViewMut2, Axis, Zip};

use super::{apply_bc, Orientation};
use crate::error::{RteError, RteResult};
use crate::optical_props::{OneScalar, OpticalProps, OpticalPropsArry, TwoStream};
use crate::Float;

/// Shortwave fluxes on every g-point, (column, level, g-point), in W/m².
///
/// `flux_dn` is the total downward flux, diffuse plus direct.
#[derive(Debug, Clone)]
pub struct GptFluxesSw {
    pub(crate) flux_up: Array3<Float>,
    pub(crate) flux_dn: Array3<Float>,
    pub(crate) flux_dn_dir: Array3<Float>,
}

impl GptFluxesSw {
    /// Upward flux.
    pub fn flux_up(&self) -> &Array3<Float> {
        &self.flux_up
    }

    /// Total downward flux.
    pub fn flux_dn(&self) -> &Array3<Float> {
        &self.flux_dn
    }

    /// Direct-beam downward flux.
    pub fn flux_dn_dir(&self) -> &Array3<Float> {
        &self.flux_dn_dir
    }
}

/// Optical properties the shortwave solver can handle.
pub trait ShortwaveSolver: OpticalProps + Sync {
    /// Solve column `icol` in place. The top level of `flux_dn` (diffuse)
    /// and `flux_dir` holds the incident fluxes; on return `flux_dn` is the
    /// total downward flux.
    #[allow(clippy::too_many_arguments)]
    fn solve_column(
        &self,
        icol: usize,
        orientation: Orientation,
        mu0: Float,
        sfc_alb_dir: ArrayView1<'_, Float>,
        sfc_alb_dif: ArrayView1<'_, Float>,
        flux_up: ArrayViewMut2<'_, Float>,
        flux_dn: ArrayViewMut2<'_, Float>,
        flux_dir: ArrayViewMut2<'_, Float>,
    );
}

impl ShortwaveSolver for OneScalar {
    /// Beer-Lambert extinction of the direct beam; no diffuse flux.
    #[allow(clippy::too_many_arguments)]
    fn solve_column(
        &self,
        icol: usize,
        orientation: Orientation,
        mu0: Float,
        _sfc_alb_dir: ArrayView1<'_, Float>,
        _sfc_alb_dif: ArrayView1<'_, Float>,
        mut flux_up: ArrayViewMut2<'_, Float>,
        mut flux_dn: ArrayViewMut2<'_, Float>,
        mut flux_dir: ArrayViewMut2<'_, Float>,
    ) {
        let tau = self.tau().index_axis_move(Axis(0), icol);
        let (nlay, ngpt) = tau.dim();
        for gpt in 0..ngpt {
            for step in orientation.top_down(nlay) {
                flux_dir[[step.below, gpt]] = flux_dir[[step.above, gpt]] * (-tau[[step.lay, gpt]] / mu0).exp();
            }
        }
        flux_up.fill(0.);
        flux_dn.assign(&flux_dir);
    }
}

/// Reflectance and transmittance of one layer.
#[derive(Debug, Clone, Copy, Default)]
struct LayerCoeffs {
    rdif: Float,
    tdif: Float,
    rdir: Float,
    tdir: Float,
    tnoscat: Float,
}

/// Two-stream layer coefficients in the practical improved flux method
/// (Zdunkowski et al., 1980).
fn two_stream(tau: Float, ssa: Float, g: Float, mu0: Float) -> LayerCoeffs {
    const K_MIN: Float = 1e-12;
    const TAU_MIN: Float = 1e-10;
    let eps = Float::EPSILON;

    let tnoscat = (-tau / mu0).exp();
    let tau = tau.max(TAU_MIN);

    let gamma1 = (8. - ssa * (5. + 3. * g)) * 0.25;
    let gamma2 = 3. * (ssa * (1. - g)) * 0.25;
    let gamma3 = (2. - 3. * mu0 * g) * 0.25;
    let gamma4 = 1. - gamma3;
    let alpha1 = gamma1 * gamma4 + gamma2 * gamma3;
    let alpha2 = gamma1 * gamma3 + gamma2 * gamma4;

    let k = ((gamma1 - gamma2) * (gamma1 + gamma2)).max(K_MIN).sqrt();
    let exp_minusktau = (-tau * k).exp();
    let exp_minus2ktau = exp_minusktau * exp_minusktau;

    let rt_term = 1. / (k * (1. + exp_minus2ktau) + gamma1 * (1. - exp_minus2ktau));
    let rdif = rt_term * gamma2 * (1. - exp_minus2ktau);
    let tdif = rt_term * 2. * k * exp_minusktau;

    let k_mu = k * mu0;
    let k_mu2 = 1. - k_mu * k_mu;
    let rt_term = ssa * rt_term / if k_mu2.abs() >= eps { k_mu2 } else { eps };
    let k_gamma3 = k * gamma3;
    let k_gamma4 = k * gamma4;

    let rdir = rt_term
        * ((1. - k_mu) * (alpha2 + k_gamma3)
            - (1. + k_mu) * (alpha2 - k_gamma3) * exp_minus2ktau
            - 2. * (k_gamma3 - alpha2 * k_mu) * exp_minusktau * tnoscat);
    let tdir = -rt_term
        * ((1. + k_mu) * (alpha1 + k_gamma4) * tnoscat
            - (1. - k_mu) * (alpha1 - k_gamma4) * exp_minus2ktau * tnoscat
            - 2. * (k_gamma4 + alpha1 * k_mu) * exp_minusktau);

    // Direct reflection and transmission can't exceed what is removed from
    // the beam
    let rdir = rdir.max(0.).min(1. - tnoscat);
    let tdir = tdir.max(0.).min(1. - tnoscat - rdir);

    LayerCoeffs {
        rdif,
        tdif,
        rdir,
        tdir,
        tnoscat,
    }
}

impl ShortwaveSolver for TwoStream {
    /// Direct-beam sources top-down, then the adding method for the diffuse
    /// fluxes.
    #[allow(clippy::too_many_arguments)]
    fn solve_column(
        &self,
        icol: usize,
        orientation: Orientation,
        mu0: Float,
        sfc_alb_dir: ArrayView1<'_, Float>,
        sfc_alb_dif: ArrayView1<'_, Float>,
        mut flux_up: ArrayViewMut2<'_, Float>,
        mut flux_dn: ArrayViewMut2<'_, Float>,
        mut flux_dir: ArrayViewMut2<'_, Float>,
    ) {
        let tau = self.tau().index_axis_move(Axis(0), icol);
        let ssa = self.ssa().index_axis_move(Axis(0), icol);
        let g = self.g().index_axis_move(Axis(0), icol);
        let (nlay, ngpt) = tau.dim();
        let nlev = nlay + 1;
        let top = orientation.top_level(nlay);
        let sfc = orientation.surface_level(nlay);

        let mut coeffs = vec![LayerCoeffs::default(); nlay];
        let mut src_up = vec![0.; nlay];
        let mut src_dn = vec![0.; nlay];
        let mut denom = vec![0.; nlay];
        let mut albedo = vec![0.; nlev];
        let mut src = vec![0.; nlev];

        for gpt in 0..ngpt {
            for lay in 0..nlay {
                coeffs[lay] = two_stream(tau[[lay, gpt]], ssa[[lay, gpt]], g[[lay, gpt]], mu0);
            }

            // Direct beam and the diffuse sources it feeds
            for step in orientation.top_down(nlay) {
                let c = &coeffs[step.lay];
                let dir_above = flux_dir[[step.above, gpt]];
                src_up[step.lay] = c.rdir * dir_above;
                src_dn[step.lay] = c.tdir * dir_above;
                flux_dir[[step.below, gpt]] = c.tnoscat * dir_above;
            }

            // Adding: albedo and source of the atmosphere below each level
            albedo[sfc] = sfc_alb_dif[gpt];
            src[sfc] = flux_dir[[sfc, gpt]] * sfc_alb_dir[gpt];
            for step in orientation.bottom_up(nlay) {
                let c = &coeffs[step.lay];
                let (lay, above, below) = (step.lay, step.above, step.below);
                denom[lay] = 1. / (1. - c.rdif * albedo[below]);
                albedo[above] = c.rdif + c.tdif * c.tdif * albedo[below] * denom[lay];
                src[above] = src_up[lay] + c.tdif * denom[lay] * (src[below] + albedo[below] * src_dn[lay]);
            }

            flux_up[[top, gpt]] = flux_dn[[top, gpt]] * albedo[top] + src[top];
            for step in orientation.top_down(nlay) {
                let c = &coeffs[step.lay];
                let (lay, above, below) = (step.lay, step.above, step.below);
                flux_dn[[below, gpt]] =
                    (c.tdif * flux_dn[[above, gpt]] + c.rdif * src[below] + src_dn[lay]) * denom[lay];
                flux_up[[below, gpt]] = flux_dn[[below, gpt]] * albedo[below] + src[below];
            }
        }

        flux_dn += &flux_dir;
    }
}

impl ShortwaveSolver for OpticalPropsArry {
    #[allow(clippy::too_many_arguments)]
    fn solve_column(
        &self,
        icol: usize,
        orientation: Orientation,
        mu0: Float,
        sfc_alb_dir: ArrayView1<'_, Float>,
        sfc_alb_dif: ArrayView1<'_, Float>,
        flux_up: ArrayViewMut2<'_, Float>,
        flux_dn: ArrayViewMut2<'_, Float>,
        flux_dir: ArrayViewMut2<'_, Float>,
    ) {
        match self {
            Self::OneScalar(p) => {
                p.solve_column(icol, orientation, mu0, sfc_alb_dir, sfc_alb_dif, flux_up, flux_dn, flux_dir)
            }
            Self::TwoStream(p) => {
                p.solve_column(icol, orientation, mu0, sfc_alb_dir, sfc_alb_dif, flux_up, flux_dn, flux_dir)
            }
        }
    }
}

/// Shortwave fluxes.
///
/// `mu0` is the cosine of the solar zenith angle per column, `inc_flux` the
/// solar flux at the top of the atmosphere normal to the beam (column,
/// g-point), and the surface albedos are per (column, band). An incident
/// diffuse flux is optional.
#[allow(clippy::too_many_arguments, clippy::neg_cmp_op_on_partial_ord)]
pub fn rte_sw<P: ShortwaveSolver>(
    atmos: &P,
    orientation: Orientation,
    mu0: ArrayView1<'_, Float>,
    inc_flux: ArrayView2<'_, Float>,
    sfc_alb_dir: ArrayView2<'_, Float>,
    sfc_alb_dif: ArrayView2<'_, Float>,
    inc_flux_dif: Option<ArrayView2<'_, Float>>,
) -> RteResult<GptFluxesSw> {
    let (ncol, nlay, ngpt) = atmos.tau().dim();
    if mu0.len() != ncol {
        return Err(RteError::InconsistentInputs(format!(
            "mu0 has {} columns, expected {ncol}",
            mu0.len()
        )));
    }
    if let Some(&bad) = mu0.iter().find(|&&m| !(m > 0. && m <= 1.)) {
        return Err(RteError::InvalidSolarZenith(f64::from(bad)));
    }
    let disc = atmos.spectral_disc();
    let sfc_alb_dir = disc.expand_by_band(sfc_alb_dir)?;
    let sfc_alb_dif = disc.expand_by_band(sfc_alb_dif)?;
    let shapes_ok = sfc_alb_dir.dim().0 == ncol
        && sfc_alb_dif.dim().0 == ncol
        && inc_flux.dim() == (ncol, ngpt)
        && inc_flux_dif.map_or(true, |f| f.dim() == (ncol, ngpt));
    if !shapes_ok {
        return Err(RteError::InconsistentInputs(
            "boundary conditions don't match the optical properties".into(),
        ));
    }
    debug!("input shapes are consistent");

    let nlev = nlay + 1;
    let mut fluxes = GptFluxesSw {
        flux_up: Array3::zeros((ncol, nlev, ngpt)),
        flux_dn: Array3::zeros((ncol, nlev, ngpt)),
        flux_dn_dir: Array3::zeros((ncol, nlev, ngpt)),
    };
    apply_bc(fluxes.flux_dn_dir.view_mut(), orientation, Some(inc_flux), Some(mu0));
    apply_bc(fluxes.flux_dn.view_mut(), orientation, inc_flux_dif, None);

    Zip::indexed(fluxes.flux_up.axis_iter_mut(Axis(0)))
        .and(fluxes.flux_dn.axis_iter_mut(Axis(0)))
        .and(fluxes.flux_dn_dir.axis_iter_mut(Axis(0)))
        .and(&mu0)
        .par_for_each(|icol, up, dn, dir, &mu0| {
            atmos.solve_column(
                icol,
                orientation,
                mu0,
                sfc_alb_dir.row(icol),
                sfc_alb_dif.row(icol),
                up,
                dn,
                dir,
            );
        });

    Ok(fluxes)
}
