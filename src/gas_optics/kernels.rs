//! Per-layer interpolation in the coefficient tables.
//!
//! Weights are found once per layer and flavor, then reused by the major,
//! minor, Rayleigh and Planck-fraction lookups.

use ndarray::{ArrayView3, ArrayView4};
use smallvec::SmallVec;

use super::{KDistribution, MinorAbsorber, LOWER};
use crate::Float;

const TINY: Float = Float::MIN_POSITIVE;

/// Interpolation weights of one flavor in one layer.
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct FlavorWeights {
    /// Mixed column of the key species, per bracketing temperature
    pub col_mix: [Float; 2],
    /// Lower mixing-fraction index, per bracketing temperature
    pub jeta: [usize; 2],
    /// [temperature][eta]
    pub fminor: [[Float; 2]; 2],
    /// [temperature][pressure][eta]
    pub fmajor: [[[Float; 2]; 2]; 2],
}

/// Where a layer sits in the reference grid.
#[derive(Debug, Clone)]
pub(super) struct LayerInterp {
    pub jtemp: usize,
    pub jpress: usize,
    /// 0 below the tropopause, 1 above
    pub itropo: usize,
    /// Indexed by flavor
    pub flavors: SmallVec<[FlavorWeights; 16]>,
}

impl KDistribution {
    /// Locate one layer in temperature, pressure, and mixing fraction.
    ///
    /// Bins are clamped to the table; the fractional weights are not, so
    /// values beyond the table edges are linearly extrapolated.
    pub(super) fn interpolate_layer(&self, play: Float, tlay: Float, col_gas: &[Float]) -> LayerInterp {
        let ntemp = self.temp_ref.len();
        let npres = self.press_ref_log.len();
        let neta = self.kmajor.dim().2;

        let jtemp = self
            .temp_ref
            .partition_point(|&t| t <= tlay)
            .saturating_sub(1)
            .min(ntemp - 2);
        let ftemp = (tlay - self.temp_ref[jtemp]) / (self.temp_ref[jtemp + 1] - self.temp_ref[jtemp]);

        let log_p = play.ln();
        let loc = (log_p - self.press_ref_log[0]) / self.press_ref_log_delta;
        let jpress = (loc.floor().max(0.) as usize).min(npres - 2);
        let fpress = loc - jpress as Float;

        let itropo = if log_p > self.press_ref_trop_log { 0 } else { 1 };

        let flavors = self
            .flavors
            .iter()
            .map(|&[g1, g2]| {
                let mut w = FlavorWeights::default();
                for itemp in 0..2 {
                    let ratio = self.vmr_ref[[jtemp + itemp, g1, itropo]]
                        / self.vmr_ref[[jtemp + itemp, g2, itropo]];
                    let col_mix = col_gas[g1] + ratio * col_gas[g2];
                    let eta = if col_mix > 2. * TINY {
                        col_gas[g1] / col_mix
                    } else {
                        0.5
                    };
                    let loceta = eta * (neta - 1) as Float;
                    let jeta = (loceta.floor().max(0.) as usize).min(neta - 2);
                    let feta = loceta - jeta as Float;
                    let ftemp_term = if itemp == 0 { 1. - ftemp } else { ftemp };

                    w.col_mix[itemp] = col_mix;
                    w.jeta[itemp] = jeta;
                    w.fminor[itemp] = [(1. - feta) * ftemp_term, feta * ftemp_term];
                    for ieta in 0..2 {
                        w.fmajor[itemp][0][ieta] = (1. - fpress) * w.fminor[itemp][ieta];
                        w.fmajor[itemp][1][ieta] = fpress * w.fminor[itemp][ieta];
                    }
                }
                w
            })
            .collect();

        LayerInterp {
            jtemp,
            jpress,
            itropo,
            flavors,
        }
    }
}

impl LayerInterp {
    /// Trilinear interpolation in a (temperature, pressure+1, eta, gpt) table,
    /// each temperature weighted by `scaling`.
    pub fn interpolate3d(&self, flavor: usize, table: ArrayView4<'_, Float>, gpt: usize, scaling: [Float; 2]) -> Float {
        let w = &self.flavors[flavor];
        let jpress = self.jpress + self.itropo;
        let mut sum = 0.;
        for itemp in 0..2 {
            let mut k = 0.;
            for ipress in 0..2 {
                for ieta in 0..2 {
                    k += w.fmajor[itemp][ipress][ieta]
                        * table[[self.jtemp + itemp, jpress + ipress, w.jeta[itemp] + ieta, gpt]];
                }
            }
            sum += scaling[itemp] * k;
        }
        sum
    }

    /// Bilinear interpolation in a (temperature, eta, point) table.
    pub fn interpolate2d(&self, flavor: usize, table: ArrayView3<'_, Float>, point: usize) -> Float {
        let w = &self.flavors[flavor];
        let mut k = 0.;
        for itemp in 0..2 {
            for ieta in 0..2 {
                k += w.fminor[itemp][ieta] * table[[self.jtemp + itemp, w.jeta[itemp] + ieta, point]];
            }
        }
        k
    }

    pub fn is_lower(&self) -> bool {
        self.itropo == LOWER
    }
}

impl MinorAbsorber {
    /// Column amount the contribution is multiplied by.
    pub(super) fn scaling(&self, play: Float, tlay: Float, col_gas: &[Float], idx_h2o: Option<usize>) -> Float {
        let mut scaling = col_gas[self.gas];
        if self.scales_with_density {
            // Pa to hPa
            scaling *= 0.01 * play / tlay;
            if let Some((gas, complement)) = self.scaling_gas {
                let vmr_fact = 1. / col_gas[0].max(TINY);
                let col_h2o = idx_h2o.map_or(0., |i| col_gas[i]);
                let dry_fact = 1. / (1. + col_h2o * vmr_fact);
                let vmr = col_gas[gas] * vmr_fact * dry_fact;
                scaling *= if complement { 1. - vmr } else { vmr };
            }
        }
        scaling
    }
}

/// Linear interpolation on the uniform grid `offset + i·delta`, clamping
/// the bin but not the fraction.
pub(super) fn interpolate1d(value: Float, offset: Float, delta: Float, table: &[Float]) -> Float {
    let loc = (value - offset) / delta;
    let index = (loc.floor().max(0.) as usize).min(table.len() - 2);
    let frac = loc - index as Float;
    table[index] + frac * (table[index + 1] - table[index])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn linear_table_interpolates_exactly() {
        let table = [10., 20., 30.];
        assert_relative_eq!(interpolate1d(225., 200., 50., &table), 15.);
        // Beyond the edges the end segments are extended
        assert_relative_eq!(interpolate1d(150., 200., 50., &table), 0.);
        assert_relative_eq!(interpolate1d(350., 200., 50., &table), 40.);
    }
}
