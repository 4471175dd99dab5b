//! Adding one set of optical properties to another.
//!
//! Extinction is additive; scattering albedo and asymmetry are weighted by the
//! scattering optical depth of each contribution. Cells where the added
//! contribution has zero optical depth are left exactly as they were.

use ndarray::Zip;

use super::{OneScalar, OpticalProps, OpticalPropsArry, SpectralDisc, TwoStream};
use crate::error::{RteError, RteResult};
use crate::Float;

const EPS: Float = Float::EPSILON;

/// Add the optical properties of another object into this one.
pub trait Increment<Rhs: ?Sized = Self> {
    /// Merge `other` into `self`, in place.
    fn increment(&mut self, other: &Rhs) -> RteResult<()>;
}

/// Merge `b` into `a`, in place.
pub fn combine<A, B>(a: &mut A, b: &B) -> RteResult<()>
where
    A: Increment<B>,
{
    a.increment(b)
}

/// For each g-point of `into`, the matching point of `other`.
///
/// `other` is either on the same spectral points or band-resolved, in which
/// case its single value per band is spread over the band's g-points.
fn point_map(
    into: &SpectralDisc,
    into_shape: (usize, usize, usize),
    other: &impl OpticalProps,
) -> RteResult<Vec<usize>> {
    let (ncol, nlay, ngpt) = into_shape;
    if other.ncol() != ncol || other.nlay() != nlay {
        return Err(RteError::InconsistentInputs(format!(
            "can't combine {}x{} columns/layers into {ncol}x{nlay}",
            other.ncol(),
            other.nlay()
        )));
    }

    if other.ngpt() == ngpt {
        Ok((0..ngpt).collect())
    } else if other.ngpt() == into.nband() {
        Ok(into.gpt_to_band().to_vec())
    } else {
        Err(RteError::InconsistentInputs(format!(
            "can't combine {} spectral points into {ngpt} g-points and {} bands",
            other.ngpt(),
            into.nband()
        )))
    }
}

impl Increment for OneScalar {
    fn increment(&mut self, other: &OneScalar) -> RteResult<()> {
        let map = point_map(&self.disc, self.tau.dim(), other)?;
        let tau2 = other.tau();
        Zip::indexed(&mut self.tau).par_for_each(|(icol, ilay, igpt), tau1| {
            *tau1 += tau2[[icol, ilay, map[igpt]]];
        });
        Ok(())
    }
}

impl Increment<TwoStream> for OneScalar {
    /// Only the absorbed part of the other extinction is added.
    fn increment(&mut self, other: &TwoStream) -> RteResult<()> {
        let map = point_map(&self.disc, self.tau.dim(), other)?;
        let (tau2, ssa2) = (other.tau(), other.ssa());
        Zip::indexed(&mut self.tau).par_for_each(|(icol, ilay, igpt), tau1| {
            let idx = [icol, ilay, map[igpt]];
            *tau1 += tau2[idx] * (1. - ssa2[idx]);
        });
        Ok(())
    }
}

impl Increment for TwoStream {
    fn increment(&mut self, other: &TwoStream) -> RteResult<()> {
        let map = point_map(&self.disc, self.tau.dim(), other)?;
        let (tau2, ssa2, g2) = (other.tau(), other.ssa(), other.g());
        Zip::indexed(&mut self.tau)
            .and(&mut self.ssa)
            .and(&mut self.g)
            .par_for_each(|(icol, ilay, igpt), tau1, ssa1, g1| {
                let idx = [icol, ilay, map[igpt]];
                let tau2 = tau2[idx];
                if tau2 == 0. {
                    return;
                }
                let tau12 = *tau1 + tau2;
                let tauscat12 = *tau1 * *ssa1 + tau2 * ssa2[idx];

                *g1 = (*tau1 * *ssa1 * *g1 + tau2 * ssa2[idx] * g2[idx]) / tauscat12.max(EPS);
                *ssa1 = tauscat12 / tau12.max(EPS);
                *tau1 = tau12;
            });
        Ok(())
    }
}

impl Increment<OneScalar> for TwoStream {
    /// Pure absorption dilutes the single-scattering albedo; asymmetry is
    /// unchanged.
    fn increment(&mut self, other: &OneScalar) -> RteResult<()> {
        let map = point_map(&self.disc, self.tau.dim(), other)?;
        let tau2 = other.tau();
        Zip::indexed(&mut self.tau)
            .and(&mut self.ssa)
            .par_for_each(|(icol, ilay, igpt), tau1, ssa1| {
                let tau2 = tau2[[icol, ilay, map[igpt]]];
                if tau2 == 0. {
                    return;
                }
                let tau12 = *tau1 + tau2;
                *ssa1 = *tau1 * *ssa1 / tau12.max(EPS);
                *tau1 = tau12;
            });
        Ok(())
    }
}

impl Increment for OpticalPropsArry {
    fn increment(&mut self, other: &OpticalPropsArry) -> RteResult<()> {
        match (self, other) {
            (Self::OneScalar(a), Self::OneScalar(b)) => a.increment(b),
            (Self::OneScalar(a), Self::TwoStream(b)) => a.increment(b),
            (Self::TwoStream(a), Self::OneScalar(b)) => a.increment(b),
            (Self::TwoStream(a), Self::TwoStream(b)) => a.increment(b),
        }
    }
}
