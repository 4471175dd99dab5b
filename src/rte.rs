//! Radiative transfer solvers.
//!
//! Both solvers work per column and g-point on fluxes shaped (column, level,
//! g-point). The vertical recurrences are written once, as scans over the
//! [`LayerStep`]s of an [`Orientation`].

mod longwave;
mod shortwave;


pub use self::longwave::{rte_lw, GptFluxesLw};
pub use self::shortwave::{rte_sw, GptFluxesSw, ShortwaveSolver};

use ndarray::{ArrayView1, ArrayView2, ArrayViewMut3, Axis};
use smallvec::SmallVec;

use crate::error::{RteError, RteResult};
use crate::Float;

/// Vertical ordering of the layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Layer 0 is at the top of the atmosphere
    TopAtFirst,
    /// Layer 0 is at the surface
    SurfaceAtFirst,
}

/// One layer, with the indices of the levels bounding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerStep {
    /// Layer index
    pub lay: usize,
    /// Level at the layer's upper boundary
    pub above: usize,
    /// Level at the layer's lower boundary
    pub below: usize,
}

impl Orientation {
    /// `TopAtFirst` when `top_at_1`.
    pub fn from_top_at_1(top_at_1: bool) -> Self {
        if top_at_1 {
            Self::TopAtFirst
        } else {
            Self::SurfaceAtFirst
        }
    }

    /// Pressure decreases upward, so the top is first when the first layer
    /// pressure is the smaller one.
    pub fn from_pressure(play: ArrayView1<'_, Float>) -> Self {
        Self::from_top_at_1(play[0] < play[play.len() - 1])
    }

    /// Whether layer 0 is at the top.
    pub fn top_at_1(self) -> bool {
        self == Self::TopAtFirst
    }

    /// Index of the top-of-atmosphere level.
    pub fn top_level(self, nlay: usize) -> usize {
        match self {
            Self::TopAtFirst => 0,
            Self::SurfaceAtFirst => nlay,
        }
    }

    /// Index of the surface level.
    pub fn surface_level(self, nlay: usize) -> usize {
        match self {
            Self::TopAtFirst => nlay,
            Self::SurfaceAtFirst => 0,
        }
    }

    /// The layers from the top of the atmosphere down to the surface.
    pub fn top_down(self, nlay: usize) -> impl DoubleEndedIterator<Item = LayerStep> {
        (0..nlay).map(move |i| match self {
            Self::TopAtFirst => LayerStep {
                lay: i,
                above: i,
                below: i + 1,
            },
            Self::SurfaceAtFirst => {
                let lay = nlay - 1 - i;
                LayerStep {
                    lay,
                    above: lay + 1,
                    below: lay,
                }
            }
        })
    }

    /// The layers from the surface up to the top of the atmosphere.
    pub fn bottom_up(self, nlay: usize) -> impl Iterator<Item = LayerStep> {
        self.top_down(nlay).rev()
    }
}

/// Set the top-of-atmosphere level of `flux` to `inc_flux` (column, g-point),
/// scaled per column by `factor`, or to zero without an incident flux.
pub fn apply_bc(
    mut flux: ArrayViewMut3<'_, Float>,
    orientation: Orientation,
    inc_flux: Option<ArrayView2<'_, Float>>,
    factor: Option<ArrayView1<'_, Float>>,
) {
    let nlay = flux.dim().1 - 1;
    let mut top = flux.index_axis_mut(Axis(1), orientation.top_level(nlay));
    match inc_flux {
        None => top.fill(0.),
        Some(inc) => {
            top.assign(&inc);
            if let Some(factor) = factor {
                for (mut row, &f) in top.outer_iter_mut().zip(factor) {
                    row *= f;
                }
            }
        }
    }
}

/// Angles (as secants of the zenith angle) and weights of the longwave
/// angular integration.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussQuadrature {
    secants: SmallVec<[Float; 4]>,
    weights: SmallVec<[Float; 4]>,
}

impl GaussQuadrature {
    /// The standard Gauss-Jacobi quadrature with `n` angles, 1 to 4.
    pub fn new(n: usize) -> RteResult<Self> {
        #![allow(clippy::excessive_precision)]
        const SECANTS: [&[Float]; 4] = [
            &[1.66],
            &[1.18350343, 2.81649655],
            &[1.09719858, 1.69338507, 4.70941630],
            &[1.06056257, 1.38282560, 2.40148179, 7.15513024],
        ];
        const WEIGHTS: [&[Float]; 4] = [
            &[0.5],
            &[0.3180413817, 0.1819586183],
            &[0.2009319137, 0.2292411064, 0.0698269799],
            &[0.1355069134, 0.2034645680, 0.1298475476, 0.0311809710],
        ];

        if !(1..=4).contains(&n) {
            return Err(RteError::InvalidQuadrature(format!(
                "{n} angles, the table has 1 to 4"
            )));
        }
        Ok(Self {
            secants: SmallVec::from_slice(SECANTS[n - 1]),
            weights: SmallVec::from_slice(WEIGHTS[n - 1]),
        })
    }

    /// A quadrature from given secants (≥ 1) and positive weights.
    pub fn custom(secants: &[Float], weights: &[Float]) -> RteResult<Self> {
        if secants.is_empty() || secants.len() != weights.len() {
            return Err(RteError::InvalidQuadrature(format!(
                "{} secants and {} weights",
                secants.len(),
                weights.len()
            )));
        }
        if secants.iter().any(|&s| s.is_nan() || s < 1.) || weights.iter().any(|&w| w.is_nan() || w <= 0.) {
            return Err(RteError::InvalidQuadrature(
                "secants must be at least 1 and weights positive".into(),
            ));
        }
        Ok(Self {
            secants: SmallVec::from_slice(secants),
            weights: SmallVec::from_slice(weights),
        })
    }

    /// Number of angles.
    pub fn len(&self) -> usize {
        self.secants.len()
    }

    /// Never true for a constructed quadrature.
    pub fn is_empty(&self) -> bool {
        self.secants.is_empty()
    }

    /// `(secant, weight)` of each angle.
    pub fn angles(&self) -> impl Iterator<Item = (Float, Float)> + '_ {
        self.secants.iter().copied().zip(self.weights.iter().copied())
    }
}

impl Default for GaussQuadrature {
    fn default() -> Self {
        Self {
            secants: SmallVec::from_slice(&[1.66]),
            weights: SmallVec::from_slice(&[0.5]),
        }
    }
}
