//! Optical properties of an atmosphere on a spectral discretization.
//!
//! Optical depth, and for the two-stream variant single-scattering albedo and
//! asymmetry factor, are stored per (column, layer, g-point). A container may
//! also be band-resolved (one point per band), which is how cloud and aerosol
//! optics arrive before they are added to the gas optics.

mod combine;

pub use self::combine::{combine, Increment};

use std::ops::Range;

use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3, ArrayViewMut3, Zip};

use crate::error::{RteError, RteResult};
use crate::Float;

/// Spectral discretization: the bands and the g-points each one contains.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralDisc {
    /// Lower and upper wavenumber limits of each band, in cm⁻¹.
    band_lims_wvn: Vec<[Float; 2]>,
    /// Half-open range of g-points in each band.
    band_lims_gpt: Vec<Range<usize>>,
    /// Band index of each g-point.
    gpt_to_band: Vec<usize>,
}

impl SpectralDisc {
    /// Build a discretization from wavenumber limits and g-point ranges.
    ///
    /// The g-point ranges must be non-empty, ascending, and contiguous starting
    /// at 0 so that every g-point belongs to exactly one band.
    pub fn new(band_lims_wvn: Vec<[Float; 2]>, band_lims_gpt: Vec<Range<usize>>) -> RteResult<Self> {
        if band_lims_gpt.is_empty() || band_lims_wvn.len() != band_lims_gpt.len() {
            return Err(RteError::InconsistentTable(format!(
                "{} wavenumber limits for {} g-point ranges",
                band_lims_wvn.len(),
                band_lims_gpt.len()
            )));
        }

        let mut next = 0;
        for (band, range) in band_lims_gpt.iter().enumerate() {
            if range.start != next || range.end <= range.start {
                return Err(RteError::InconsistentTable(format!(
                    "g-points of band {band} ({range:?}) are not contiguous with the previous band"
                )));
            }
            next = range.end;
        }

        let gpt_to_band = band_lims_gpt
            .iter()
            .enumerate()
            .flat_map(|(band, range)| range.clone().map(move |_| band))
            .collect();

        Ok(Self {
            band_lims_wvn,
            band_lims_gpt,
            gpt_to_band,
        })
    }

    /// Build a discretization from the (band, pair) tables of the data store,
    /// where the g-point limits are 1-based and inclusive.
    pub fn from_table(
        band_lims_wvn: ArrayView2<'_, Float>,
        band_lims_gpt: ArrayView2<'_, i32>,
    ) -> RteResult<Self> {
        if band_lims_wvn.dim().1 != 2 || band_lims_gpt.dim().1 != 2 {
            return Err(RteError::InconsistentTable(
                "band limits must have a trailing `pair` dimension of 2".into(),
            ));
        }
        let wvn = band_lims_wvn
            .outer_iter()
            .map(|pair| [pair[0], pair[1]])
            .collect();
        let gpt = band_lims_gpt
            .outer_iter()
            .map(|pair| {
                if pair[0] < 1 || pair[1] < pair[0] {
                    return Err(RteError::InconsistentTable(format!(
                        "invalid g-point limits [{}, {}]",
                        pair[0], pair[1]
                    )));
                }
                Ok((pair[0] - 1) as usize..pair[1] as usize)
            })
            .collect::<RteResult<_>>()?;
        Self::new(wvn, gpt)
    }

    /// A band-resolved discretization with exactly one point per band.
    pub fn by_band(band_lims_wvn: Vec<[Float; 2]>) -> RteResult<Self> {
        let gpt = (0..band_lims_wvn.len()).map(|b| b..b + 1).collect();
        Self::new(band_lims_wvn, gpt)
    }

    /// Number of bands.
    pub fn nband(&self) -> usize {
        self.band_lims_gpt.len()
    }

    /// Number of g-points.
    pub fn ngpt(&self) -> usize {
        self.gpt_to_band.len()
    }

    /// The g-points belonging to `band`.
    pub fn band_gpt_range(&self, band: usize) -> Range<usize> {
        self.band_lims_gpt[band].clone()
    }

    /// All band g-point ranges, in band order.
    pub fn band_lims_gpt(&self) -> &[Range<usize>] {
        &self.band_lims_gpt
    }

    /// Wavenumber limits of every band.
    pub fn band_lims_wvn(&self) -> &[[Float; 2]] {
        &self.band_lims_wvn
    }

    /// The band containing g-point `gpt`.
    pub fn gpt_band(&self, gpt: usize) -> usize {
        self.gpt_to_band[gpt]
    }

    /// Band index of each g-point.
    pub fn gpt_to_band(&self) -> &[usize] {
        &self.gpt_to_band
    }

    /// Expand (column, band) values, such as surface emissivity, to
    /// (column, g-point).
    pub fn expand_by_band(&self, values: ArrayView2<'_, Float>) -> RteResult<Array2<Float>> {
        let (ncol, nband) = values.dim();
        if nband != self.nband() {
            return Err(RteError::InconsistentInputs(format!(
                "expected {} bands, got {nband}",
                self.nband()
            )));
        }
        Ok(Array2::from_shape_fn((ncol, self.ngpt()), |(icol, igpt)| {
            values[[icol, self.gpt_to_band[igpt]]]
        }))
    }
}

/// Capabilities shared by every optical-property variant.
pub trait OpticalProps {
    /// The spectral discretization of the last axis.
    fn spectral_disc(&self) -> &SpectralDisc;

    /// Optical depth, shaped (column, layer, g-point).
    fn tau(&self) -> ArrayView3<'_, Float>;

    /// Check that all values lie in their physical range.
    fn validate(&self) -> RteResult<()>;

    /// Number of columns.
    fn ncol(&self) -> usize {
        self.tau().dim().0
    }

    /// Number of layers.
    fn nlay(&self) -> usize {
        self.tau().dim().1
    }

    /// Number of spectral points.
    fn ngpt(&self) -> usize {
        self.tau().dim().2
    }
}

fn check_points(disc: &SpectralDisc, arrays: &[&Array3<Float>]) -> RteResult<()> {
    let shape = arrays[0].dim();
    if shape.2 != disc.ngpt() {
        return Err(RteError::InconsistentInputs(format!(
            "{} spectral points for a discretization with {}",
            shape.2,
            disc.ngpt()
        )));
    }
    if arrays.iter().any(|a| a.dim() != shape) {
        return Err(RteError::InconsistentInputs(
            "optical property arrays differ in shape".into(),
        ));
    }
    Ok(())
}

// NaN fails the comparisons as well
#[allow(clippy::neg_cmp_op_on_partial_ord)]
fn validate_tau(tau: &Array3<Float>) -> RteResult<()> {
    if tau.iter().any(|&t| !(t >= 0.)) {
        return Err(RteError::InvalidOpticalProps("tau has negative values".into()));
    }
    Ok(())
}

/// Absorption-only optical properties.
#[derive(Debug, Clone)]
pub struct OneScalar {
    disc: SpectralDisc,
    tau: Array3<Float>,
}

impl OneScalar {
    /// Zero optical depth for `ncol` columns and `nlay` layers.
    pub fn new(ncol: usize, nlay: usize, disc: SpectralDisc) -> Self {
        let tau = Array3::zeros((ncol, nlay, disc.ngpt()));
        Self { disc, tau }
    }

    /// Wrap an existing (column, layer, g-point) optical depth.
    pub fn from_tau(disc: SpectralDisc, tau: Array3<Float>) -> RteResult<Self> {
        check_points(&disc, &[&tau])?;
        Ok(Self { disc, tau })
    }

    /// Mutable optical depth.
    pub fn tau_mut(&mut self) -> ArrayViewMut3<'_, Float> {
        self.tau.view_mut()
    }

    /// Copy of the columns in `cols`.
    pub fn subset(&self, cols: Range<usize>) -> Self {
        Self {
            disc: self.disc.clone(),
            tau: self.tau.slice(s![cols, .., ..]).to_owned(),
        }
    }
}

impl OpticalProps for OneScalar {
    fn spectral_disc(&self) -> &SpectralDisc {
        &self.disc
    }

    fn tau(&self) -> ArrayView3<'_, Float> {
        self.tau.view()
    }

    fn validate(&self) -> RteResult<()> {
        validate_tau(&self.tau)
    }
}

/// Two-stream optical properties: optical depth, single-scattering albedo,
/// and asymmetry factor.
#[derive(Debug, Clone)]
pub struct TwoStream {
    disc: SpectralDisc,
    tau: Array3<Float>,
    ssa: Array3<Float>,
    g: Array3<Float>,
}

impl TwoStream {
    /// Zero optical depth, albedo, and asymmetry.
    pub fn new(ncol: usize, nlay: usize, disc: SpectralDisc) -> Self {
        let shape = (ncol, nlay, disc.ngpt());
        Self {
            disc,
            tau: Array3::zeros(shape),
            ssa: Array3::zeros(shape),
            g: Array3::zeros(shape),
        }
    }

    /// Wrap existing arrays, all shaped (column, layer, g-point).
    pub fn from_arrays(
        disc: SpectralDisc,
        tau: Array3<Float>,
        ssa: Array3<Float>,
        g: Array3<Float>,
    ) -> RteResult<Self> {
        check_points(&disc, &[&tau, &ssa, &g])?;
        Ok(Self { disc, tau, ssa, g })
    }

    /// Single-scattering albedo.
    pub fn ssa(&self) -> ArrayView3<'_, Float> {
        self.ssa.view()
    }

    /// Asymmetry factor.
    pub fn g(&self) -> ArrayView3<'_, Float> {
        self.g.view()
    }

    /// Mutable `(tau, ssa, g)`.
    pub fn arrays_mut(
        &mut self,
    ) -> (
        ArrayViewMut3<'_, Float>,
        ArrayViewMut3<'_, Float>,
        ArrayViewMut3<'_, Float>,
    ) {
        (self.tau.view_mut(), self.ssa.view_mut(), self.g.view_mut())
    }

    /// Copy of the columns in `cols`.
    pub fn subset(&self, cols: Range<usize>) -> Self {
        Self {
            disc: self.disc.clone(),
            tau: self.tau.slice(s![cols.clone(), .., ..]).to_owned(),
            ssa: self.ssa.slice(s![cols.clone(), .., ..]).to_owned(),
            g: self.g.slice(s![cols, .., ..]).to_owned(),
        }
    }

    /// Delta-scale the properties with forward-scattering fraction `g²`.
    pub fn delta_scale(&mut self) {
        const EPS: Float = Float::EPSILON;
        Zip::from(&mut self.tau)
            .and(&mut self.ssa)
            .and(&mut self.g)
            .par_for_each(|tau, ssa, g| {
                let f = *g * *g;
                let wf = *ssa * f;
                *tau *= 1. - wf;
                *ssa = (*ssa - wf) / (1. - wf).max(EPS);
                *g = (*g - f) / (1. - f).max(EPS);
            });
    }
}

impl OpticalProps for TwoStream {
    fn spectral_disc(&self) -> &SpectralDisc {
        &self.disc
    }

    fn tau(&self) -> ArrayView3<'_, Float> {
        self.tau.view()
    }

    #[allow(clippy::neg_cmp_op_on_partial_ord)]
    fn validate(&self) -> RteResult<()> {
        validate_tau(&self.tau)?;
        if self.ssa.iter().any(|&w| !(w >= 0. && w <= 1.)) {
            return Err(RteError::InvalidOpticalProps("ssa outside [0, 1]".into()));
        }
        if self.g.iter().any(|&g| !(g >= -1. && g <= 1.)) {
            return Err(RteError::InvalidOpticalProps("g outside [-1, 1]".into()));
        }
        Ok(())
    }
}

/// Optical properties of either variant, as produced by gas optics.
#[derive(Debug, Clone)]
pub enum OpticalPropsArry {
    /// Absorption only
    OneScalar(OneScalar),
    /// Absorption and scattering
    TwoStream(TwoStream),
}

impl OpticalProps for OpticalPropsArry {
    fn spectral_disc(&self) -> &SpectralDisc {
        match self {
            Self::OneScalar(p) => p.spectral_disc(),
            Self::TwoStream(p) => p.spectral_disc(),
        }
    }

    fn tau(&self) -> ArrayView3<'_, Float> {
        match self {
            Self::OneScalar(p) => p.tau(),
            Self::TwoStream(p) => p.tau(),
        }
    }

    fn validate(&self) -> RteResult<()> {
        match self {
            Self::OneScalar(p) => p.validate(),
            Self::TwoStream(p) => p.validate(),
        }
    }
}

impl OpticalPropsArry {
    /// Copy of the columns in `cols`.
    pub fn subset(&self, cols: Range<usize>) -> Self {
        match self {
            Self::OneScalar(p) => p.subset(cols).into(),
            Self::TwoStream(p) => p.subset(cols).into(),
        }
    }
}

impl From<OneScalar> for OpticalPropsArry {
    fn from(p: OneScalar) -> Self {
        Self::OneScalar(p)
    }
}

impl From<TwoStream> for OpticalPropsArry {
    fn from(p: TwoStream) -> Self {
        Self::TwoStream(p)
    }
}
