//! A small k-distribution whose results can be worked out by hand.
//!
//! Two gases (h2o, co2), two bands with g-points {1, 2} and {3}. Reference
//! mixing ratios are all one and kmajor is constant per g-point, so the major
//! optical depth is `k·(col[g1] + col[g2])` whatever the interpolation
//! weights. The Planck table is linear in temperature, `B = (band + 1)·T`.

use ndarray::{arr1, arr2, Array1, Array2, Array3, Array4};

use super::tables::{KDistributionTables, MinorAbsorberTables, SourceTables};
use super::KDistribution;
use crate::Float;

pub(crate) const KMAJOR: [Float; 3] = [1e-22, 2e-22, 3e-22];
pub(crate) const KMINOR: Float = 1e-21;
pub(crate) const KRAYLEIGH: Float = 1e-26;
pub(crate) const PLANCK_FRAC: [Float; 3] = [0.5, 0.5, 1.0];
pub(crate) const SOLAR_QUIET: [Float; 3] = [100., 200., 300.];
pub(crate) const PRESS_TROP: Float = 5000.;

const NTEMP: usize = 3;
const NPRES: usize = 3;
const NETA: usize = 2;
const NGPT: usize = 3;

fn per_gpt(values: [Float; 3]) -> Array4<Float> {
    Array4::from_shape_fn((NTEMP, NPRES + 1, NETA, NGPT), |(_, _, _, g)| values[g])
}

fn base(source: SourceTables, rayleigh: bool) -> KDistributionTables {
    let minor_lower = MinorAbsorberTables {
        kminor: Array3::from_elem((NTEMP, NETA, 2), KMINOR),
        minor_gases: vec!["co2".into()],
        minor_limits_gpt: arr2(&[[1, 2]]),
        minor_scales_with_density: vec![true],
        scaling_gas: vec!["h2o".into()],
        scale_by_complement: vec![false],
        kminor_start: vec![1],
    };
    let minor_upper = MinorAbsorberTables {
        kminor: Array3::zeros((NTEMP, NETA, 0)),
        minor_limits_gpt: Array2::zeros((0, 2)),
        ..Default::default()
    };
    let rayl = || Array3::from_elem((NTEMP, NETA, NGPT), KRAYLEIGH);

    KDistributionTables {
        gas_names: vec!["H2O".into(), "co2".into()],
        // Band 1 has no key species above the tropopause
        key_species: Array3::from_shape_vec((2, 2, 2), vec![1, 2, 1, 2, 1, 2, 0, 0]).unwrap(),
        bnd_limits_wavenumber: arr2(&[[10., 250.], [250., 500.]]),
        bnd_limits_gpt: arr2(&[[1, 2], [3, 3]]),
        press_ref: arr1(&[100000., 10000., 1000.]),
        press_ref_trop: PRESS_TROP,
        temp_ref: arr1(&[200., 250., 300.]),
        vmr_ref: Array3::ones((NTEMP, 3, 2)),
        kmajor: per_gpt(KMAJOR),
        gas_minor: vec!["co2".into()],
        identifier_minor: vec!["co2".into()],
        minor_lower,
        minor_upper,
        rayl_lower: rayleigh.then(rayl),
        rayl_upper: rayleigh.then(rayl),
        source,
    }
}

/// Longwave tables.
pub(crate) fn lw_tables() -> KDistributionTables {
    let totplnk = Array2::from_shape_fn((2, 3), |(b, t)| (b + 1) as Float * (200. + 50. * t as Float));
    base(
        SourceTables::Thermal {
            totplnk,
            plank_fraction: per_gpt(PLANCK_FRAC),
        },
        false,
    )
}

/// Shortwave tables, with Rayleigh scattering.
pub(crate) fn sw_tables() -> KDistributionTables {
    base(
        SourceTables::Solar {
            solar_source_quiet: Array1::from(SOLAR_QUIET.to_vec()),
            solar_source_facular: Array1::ones(NGPT),
            solar_source_sunspot: Array1::zeros(NGPT),
            tsi_default: 1200.,
            mg_default: 0.1495954,
            sb_default: 0.00066,
        },
        true,
    )
}

pub(crate) fn lw_kdist() -> KDistribution {
    KDistribution::new(lw_tables()).unwrap()
}

pub(crate) fn sw_kdist() -> KDistribution {
    KDistribution::new(sw_tables()).unwrap()
}
