use approx::assert_relative_eq;
use ndarray::{Array1, Array2, Array3, Axis};

use super::*;
use crate::gas_optics::test_tables::{lw_kdist, sw_kdist};
use crate::optical_props::{OneScalar, SpectralDisc, TwoStream};

const NCOL: usize = 5;

/// Columns that differ in temperature, two layers each with the top layer
/// first.
struct Columns {
    play: Array2<Float>,
    plev: Array2<Float>,
    tlay: Array2<Float>,
    tsfc: Array1<Float>,
    gas_concs: GasConcs,
}

fn columns() -> Columns {
    let mut gas_concs = GasConcs::new();
    gas_concs
        .set_vmr("h2o", Array2::from_shape_fn((NCOL, 2), |(c, l)| 0.002 * (1 + c + l) as Float))
        .unwrap();
    gas_concs.set_vmr_scalar("co2", 4e-4).unwrap();
    Columns {
        play: Array2::from_shape_fn((NCOL, 2), |(_, l)| [2000., 60000.][l]),
        plev: Array2::from_shape_fn((NCOL, 3), |(_, l)| [1000., 10000., 100000.][l]),
        tlay: Array2::from_shape_fn((NCOL, 2), |(c, l)| 220. + 10. * c as Float + 15. * l as Float),
        tsfc: Array1::from_shape_fn(NCOL, |c| 270. + 5. * c as Float),
        gas_concs,
    }
}

impl Columns {
    fn atmos(&self) -> Atmosphere<'_> {
        Atmosphere::new(self.play.view(), self.plev.view(), self.tlay.view()).unwrap()
    }
}

#[test]
fn column_blocks() {
    let blocks: Vec<_> = ColumnBlocks::new(10, 4).collect();
    assert_eq!(blocks, vec![0..4, 4..8, 8..10]);
    assert_eq!(ColumnBlocks::new(10, 4).len(), 3);
    assert_eq!(ColumnBlocks::new(8, 4).len(), 2);
    assert_eq!(ColumnBlocks::new(0, 4).next(), None);
    assert_eq!(ColumnBlocks::new(3, 0).count(), 3);
}

#[test]
fn longwave_is_independent_of_block_size() {
    let kdist = lw_kdist();
    let cols = columns();
    let sfc_emis = Array2::from_elem((NCOL, 2), 0.95);
    let inputs = LongwaveInputs {
        atmos: cols.atmos(),
        gas_concs: &cols.gas_concs,
        tsfc: cols.tsfc.view(),
        sfc_emis: sfc_emis.view(),
        inc_flux: None,
        extra_optics: None,
    };

    let reference = solve_longwave(&kdist, &inputs, &RteConfig::new(NCOL, 2, None, true, false).unwrap()).unwrap();
    for block in [1, 2, 3] {
        let config = RteConfig::new(block, 2, Some(2), true, false).unwrap();
        let fluxes = solve_longwave(&kdist, &inputs, &config).unwrap();
        assert_eq!(fluxes, reference);
    }

    let broadband = reference.fluxes().broadband();
    assert!(broadband.flux_up().iter().all(|&f| f > 0.));
    // Nothing comes in at the top
    assert!(broadband.flux_dn().column(0).iter().all(|&f| f == 0.));
    let jac = reference.flux_up_jac().unwrap();
    assert!(jac.iter().all(|&j| j > 0.));
}

#[test]
fn longwave_clouds_are_added_as_absorbers() {
    let kdist = lw_kdist();
    let cols = columns();
    let sfc_emis = Array2::from_elem((NCOL, 2), 1.);
    let mut inputs = LongwaveInputs {
        atmos: cols.atmos(),
        gas_concs: &cols.gas_concs,
        tsfc: cols.tsfc.view(),
        sfc_emis: sfc_emis.view(),
        inc_flux: None,
        extra_optics: None,
    };
    let config = RteConfig::default();
    let clear = solve_longwave(&kdist, &inputs, &config).unwrap();

    // A thick, band-resolved, non-scattering cloud in the bottom layer
    let disc = SpectralDisc::by_band(vec![[10., 250.], [250., 500.]]).unwrap();
    let mut tau = Array3::zeros((NCOL, 2, 2));
    tau.index_axis_mut(Axis(1), 1).fill(50.);
    let shape = tau.dim();
    let cloud = OpticalPropsArry::from(
        TwoStream::from_arrays(disc, tau, Array3::zeros(shape), Array3::zeros(shape)).unwrap(),
    );
    inputs.extra_optics = Some(&cloud);
    let cloudy = solve_longwave(&kdist, &inputs, &config).unwrap();

    let clear_dn = clear.fluxes().broadband().flux_dn();
    let cloudy_dn = cloudy.fluxes().broadband().flux_dn();
    for icol in 0..NCOL {
        assert!(cloudy_dn[[icol, 2]] > clear_dn[[icol, 2]]);
    }
}

#[test]
fn longwave_absorbing_extra_optics() {
    let kdist = lw_kdist();
    let cols = columns();
    let sfc_emis = Array2::from_elem((NCOL, 2), 0.9);
    let disc = SpectralDisc::by_band(vec![[10., 250.], [250., 500.]]).unwrap();
    let tau = Array3::from_shape_fn((NCOL, 2, 2), |(c, l, b)| 0.1 * (1 + c + l + b) as Float);

    let absorbing = OpticalPropsArry::from(OneScalar::from_tau(disc.clone(), tau.clone()).unwrap());
    let shape = tau.dim();
    let scattering = OpticalPropsArry::from(
        TwoStream::from_arrays(disc, tau, Array3::zeros(shape), Array3::zeros(shape)).unwrap(),
    );

    let solve = |extra: &OpticalPropsArry| {
        let inputs = LongwaveInputs {
            atmos: cols.atmos(),
            gas_concs: &cols.gas_concs,
            tsfc: cols.tsfc.view(),
            sfc_emis: sfc_emis.view(),
            inc_flux: None,
            extra_optics: Some(extra),
        };
        solve_longwave(&kdist, &inputs, &RteConfig::default()).unwrap()
    };
    // Without scattering both variants carry the same absorption
    assert_eq!(solve(&absorbing), solve(&scattering));
}

#[test]
fn shortwave_is_independent_of_block_size() {
    let kdist = sw_kdist();
    let cols = columns();
    let mu0 = Array1::from_shape_fn(NCOL, |c| 0.2 + 0.15 * c as Float);
    let alb = Array2::from_elem((NCOL, 2), 0.2);
    let inputs = ShortwaveInputs {
        atmos: cols.atmos(),
        gas_concs: &cols.gas_concs,
        mu0: mu0.view(),
        sfc_alb_dir: alb.view(),
        sfc_alb_dif: alb.view(),
        inc_flux_dif: None,
        tsi_scaling: None,
        extra_optics: None,
    };

    let reference = solve_shortwave(&kdist, &inputs, &RteConfig::default()).unwrap();
    for block in [1, 2, 7] {
        let config = RteConfig::new(block, 1, None, false, false).unwrap();
        assert_eq!(solve_shortwave(&kdist, &inputs, &config).unwrap(), reference);
    }

    let broadband = reference.broadband();
    let total_solar = kdist.solar_source().unwrap().sum();
    for icol in 0..NCOL {
        // The beam enters at the top, the first level
        assert_relative_eq!(broadband.flux_dn()[[icol, 0]], total_solar * mu0[icol], max_relative = 1e-12);
        assert_relative_eq!(
            broadband.flux_dn_dir().unwrap()[[icol, 0]],
            total_solar * mu0[icol],
            max_relative = 1e-12
        );
        assert!(broadband.flux_up()[[icol, 0]] > 0.);
    }
}

#[test]
fn strict_range_check() {
    let kdist = lw_kdist();
    let mut cols = columns();
    cols.tlay[[0, 1]] = 350.;
    let sfc_emis = Array2::from_elem((NCOL, 2), 0.95);
    let inputs = LongwaveInputs {
        atmos: cols.atmos(),
        gas_concs: &cols.gas_concs,
        tsfc: cols.tsfc.view(),
        sfc_emis: sfc_emis.view(),
        inc_flux: None,
        extra_optics: None,
    };

    let strict = RteConfig::new(2, 1, None, false, true).unwrap();
    assert!(matches!(
        solve_longwave(&kdist, &inputs, &strict),
        Err(RteError::OutOfRange(_))
    ));
    assert!(solve_longwave(&kdist, &inputs, &RteConfig::default()).is_ok());
}

#[test]
fn mismatched_inputs_are_rejected() {
    let kdist = lw_kdist();
    let cols = columns();
    let sfc_emis = Array2::from_elem((NCOL - 1, 2), 0.95);
    let inputs = LongwaveInputs {
        atmos: cols.atmos(),
        gas_concs: &cols.gas_concs,
        tsfc: cols.tsfc.view(),
        sfc_emis: sfc_emis.view(),
        inc_flux: None,
        extra_optics: None,
    };
    assert!(matches!(
        solve_longwave(&kdist, &inputs, &RteConfig::default()),
        Err(RteError::InconsistentInputs(_))
    ));
}

#[test]
fn cancelled_solve() {
    let kdist = lw_kdist();
    let cols = columns();
    let sfc_emis = Array2::from_elem((NCOL, 2), 0.95);
    let inputs = LongwaveInputs {
        atmos: cols.atmos(),
        gas_concs: &cols.gas_concs,
        tsfc: cols.tsfc.view(),
        sfc_emis: sfc_emis.view(),
        inc_flux: None,
        extra_optics: None,
    };
    let config = RteConfig::default();

    let progress = Progress::new();
    solve_longwave_blocks(&kdist, &inputs, &config, Some(&progress)).unwrap();
    assert_eq!(progress.completed(), NCOL);

    progress.cancel();
    assert!(matches!(
        solve_longwave_blocks(&kdist, &inputs, &config, Some(&progress)),
        Err(RteError::Cancelled)
    ));
}
