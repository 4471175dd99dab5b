//! Longwave (Planck) source functions.

use std::ops::Range;

use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3};

use crate::error::{RteError, RteResult};
use crate::optical_props::SpectralDisc;
use crate::Float;

/// Planck sources for a block of columns on every g-point.
///
/// Level sources are stored per layer: `lev_source_inc` is the source at the
/// layer's boundary with the higher level index, `lev_source_dec` the one
/// with the lower level index.
#[derive(Debug, Clone)]
pub struct SourceFuncLw {
    disc: SpectralDisc,
    /// (column, layer, g-point)
    pub(crate) lay_source: Array3<Float>,
    /// (column, layer, g-point)
    pub(crate) lev_source_inc: Array3<Float>,
    /// (column, layer, g-point)
    pub(crate) lev_source_dec: Array3<Float>,
    /// (column, g-point)
    pub(crate) sfc_source: Array2<Float>,
    /// Change of the surface source for a 1 K warmer surface, (column, g-point)
    pub(crate) sfc_source_jac: Array2<Float>,
}

impl SourceFuncLw {
    /// Zero sources for `ncol` columns and `nlay` layers.
    pub fn new(ncol: usize, nlay: usize, disc: SpectralDisc) -> Self {
        let ngpt = disc.ngpt();
        Self {
            disc,
            lay_source: Array3::zeros((ncol, nlay, ngpt)),
            lev_source_inc: Array3::zeros((ncol, nlay, ngpt)),
            lev_source_dec: Array3::zeros((ncol, nlay, ngpt)),
            sfc_source: Array2::zeros((ncol, ngpt)),
            sfc_source_jac: Array2::zeros((ncol, ngpt)),
        }
    }

    /// Wrap existing source arrays.
    pub fn from_arrays(
        disc: SpectralDisc,
        lay_source: Array3<Float>,
        lev_source_inc: Array3<Float>,
        lev_source_dec: Array3<Float>,
        sfc_source: Array2<Float>,
        sfc_source_jac: Array2<Float>,
    ) -> RteResult<Self> {
        let (ncol, nlay, ngpt) = lay_source.dim();
        if ngpt != disc.ngpt()
            || lev_source_inc.dim() != (ncol, nlay, ngpt)
            || lev_source_dec.dim() != (ncol, nlay, ngpt)
            || sfc_source.dim() != (ncol, ngpt)
            || sfc_source_jac.dim() != (ncol, ngpt)
        {
            return Err(RteError::InconsistentInputs(
                "source function arrays differ in shape".into(),
            ));
        }
        Ok(Self {
            disc,
            lay_source,
            lev_source_inc,
            lev_source_dec,
            sfc_source,
            sfc_source_jac,
        })
    }

    /// Spectral discretization of the sources.
    pub fn spectral_disc(&self) -> &SpectralDisc {
        &self.disc
    }

    /// Number of columns.
    pub fn ncol(&self) -> usize {
        self.lay_source.dim().0
    }

    /// Number of layers.
    pub fn nlay(&self) -> usize {
        self.lay_source.dim().1
    }

    /// Layer source, (column, layer, g-point).
    pub fn lay_source(&self) -> ArrayView3<'_, Float> {
        self.lay_source.view()
    }

    /// Source at the higher-index boundary of each layer.
    pub fn lev_source_inc(&self) -> ArrayView3<'_, Float> {
        self.lev_source_inc.view()
    }

    /// Source at the lower-index boundary of each layer.
    pub fn lev_source_dec(&self) -> ArrayView3<'_, Float> {
        self.lev_source_dec.view()
    }

    /// Surface source, (column, g-point).
    pub fn sfc_source(&self) -> ArrayView2<'_, Float> {
        self.sfc_source.view()
    }

    /// Surface source temperature Jacobian, (column, g-point).
    pub fn sfc_source_jac(&self) -> ArrayView2<'_, Float> {
        self.sfc_source_jac.view()
    }

    /// Copy of the columns in `cols`.
    pub fn subset(&self, cols: Range<usize>) -> Self {
        Self {
            disc: self.disc.clone(),
            lay_source: self.lay_source.slice(s![cols.clone(), .., ..]).to_owned(),
            lev_source_inc: self.lev_source_inc.slice(s![cols.clone(), .., ..]).to_owned(),
            lev_source_dec: self.lev_source_dec.slice(s![cols.clone(), .., ..]).to_owned(),
            sfc_source: self.sfc_source.slice(s![cols.clone(), ..]).to_owned(),
            sfc_source_jac: self.sfc_source_jac.slice(s![cols, ..]).to_owned(),
        }
    }
}
