//! The atmospheric state of a set of columns.

use std::ops::Range;

use ndarray::{s, ArrayView1, ArrayView2};

use crate::error::{RteError, RteResult};
use crate::rte::Orientation;
use crate::Float;

/// Borrowed pressure and temperature profiles.
///
/// Layer quantities are (column, layer) and level quantities (column,
/// level) with one more level than layers. Pressures are in Pa and
/// temperatures in K.
#[derive(Debug, Clone, Copy)]
pub struct Atmosphere<'a> {
    pub(crate) play: ArrayView2<'a, Float>,
    pub(crate) plev: ArrayView2<'a, Float>,
    pub(crate) tlay: ArrayView2<'a, Float>,
    pub(crate) tlev: Option<ArrayView2<'a, Float>>,
    pub(crate) col_dry: Option<ArrayView2<'a, Float>>,
}

fn check_dim(name: &str, found: (usize, usize), expected: (usize, usize)) -> RteResult<()> {
    if found != expected {
        return Err(RteError::InconsistentInputs(format!(
            "`{name}` has shape {found:?}, expected {expected:?}"
        )));
    }
    Ok(())
}

impl<'a> Atmosphere<'a> {
    /// Check the shapes of the required profiles.
    pub fn new(
        play: ArrayView2<'a, Float>,
        plev: ArrayView2<'a, Float>,
        tlay: ArrayView2<'a, Float>,
    ) -> RteResult<Self> {
        let (ncol, nlay) = play.dim();
        if ncol == 0 || nlay == 0 {
            return Err(RteError::InconsistentInputs(
                "need at least one column and one layer".into(),
            ));
        }
        check_dim("plev", plev.dim(), (ncol, nlay + 1))?;
        check_dim("tlay", tlay.dim(), (ncol, nlay))?;
        Ok(Self {
            play,
            plev,
            tlay,
            tlev: None,
            col_dry: None,
        })
    }

    /// Use these level temperatures instead of interpolating them.
    pub fn with_tlev(mut self, tlev: ArrayView2<'a, Float>) -> RteResult<Self> {
        check_dim("tlev", tlev.dim(), self.plev.dim())?;
        self.tlev = Some(tlev);
        Ok(self)
    }

    /// Use this dry-air column (molecules/cm²) instead of deriving it from
    /// the level pressures.
    pub fn with_col_dry(mut self, col_dry: ArrayView2<'a, Float>) -> RteResult<Self> {
        check_dim("col_dry", col_dry.dim(), self.play.dim())?;
        self.col_dry = Some(col_dry);
        Ok(self)
    }

    /// Number of columns.
    pub fn ncol(&self) -> usize {
        self.play.dim().0
    }

    /// Number of layers.
    pub fn nlay(&self) -> usize {
        self.play.dim().1
    }

    /// Layer pressure.
    pub fn play(&self) -> ArrayView2<'a, Float> {
        self.play
    }

    /// Level pressure.
    pub fn plev(&self) -> ArrayView2<'a, Float> {
        self.plev
    }

    /// Layer temperature.
    pub fn tlay(&self) -> ArrayView2<'a, Float> {
        self.tlay
    }

    /// Whether layer 0 is at the top, judged from the first column.
    pub fn orientation(&self) -> Orientation {
        Orientation::from_pressure(self.play.row(0))
    }

    /// The columns in `cols`.
    pub fn subset(&self, cols: Range<usize>) -> Self {
        let rows = |a: ArrayView2<'a, Float>| a.slice_move(s![cols.clone(), ..]);
        Self {
            play: rows(self.play),
            plev: rows(self.plev),
            tlay: rows(self.tlay),
            tlev: self.tlev.map(rows),
            col_dry: self.col_dry.map(rows),
        }
    }
}

/// Check that a per-column input has `ncol` entries.
pub(crate) fn check_columns(name: &str, values: ArrayView1<'_, Float>, ncol: usize) -> RteResult<()> {
    if values.len() != ncol {
        return Err(RteError::InconsistentInputs(format!(
            "`{name}` has {} columns, expected {ncol}",
            values.len()
        )));
    }
    Ok(())
}
