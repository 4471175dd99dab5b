use approx::assert_relative_eq;
use ndarray::{arr1, arr2, Array2, Array3, Array4};

use super::test_tables::*;
use super::*;
use crate::optical_props::OpticalProps;

/// One column, top layer above the tropopause and bottom layer below it.
struct Profile {
    play: Array2<Float>,
    plev: Array2<Float>,
    tlay: Array2<Float>,
    tlev: Array2<Float>,
    col_dry: Array2<Float>,
}

const COL_DRY: Float = 1e24;
const VMR_H2O: Float = 0.01;
const VMR_CO2: Float = 4e-4;

fn profile() -> Profile {
    Profile {
        play: arr2(&[[1000., 50000.]]),
        plev: arr2(&[[100., 10000., 100000.]]),
        tlay: arr2(&[[250., 250.]]),
        tlev: arr2(&[[240., 250., 260.]]),
        col_dry: Array2::from_elem((1, 2), COL_DRY),
    }
}

impl Profile {
    fn atmos(&self) -> Atmosphere<'_> {
        Atmosphere::new(self.play.view(), self.plev.view(), self.tlay.view())
            .unwrap()
            .with_tlev(self.tlev.view())
            .unwrap()
            .with_col_dry(self.col_dry.view())
            .unwrap()
    }
}

fn gas_concs(h2o: Float, co2: Float) -> GasConcs {
    let mut concs = GasConcs::new();
    concs.set_vmr_scalar("h2o", h2o).unwrap();
    concs.set_vmr_scalar("co2", co2).unwrap();
    concs
}

#[test]
fn flavors_from_key_species() {
    let kdist = lw_kdist();
    assert_eq!(kdist.flavors, vec![[1, 2], [2, 2]]);
    assert_eq!(kdist.gpoint_flavor[0], vec![0, 0, 0]);
    assert_eq!(kdist.gpoint_flavor[1], vec![0, 0, 1]);
    assert_eq!(kdist.key_gases, vec![1, 2]);
    assert_eq!(kdist.gas_names(), &["h2o".to_string(), "co2".to_string()]);
    assert!(kdist.source_is_internal());
}

#[test]
fn inconsistent_tables_are_rejected() {
    let mut tables = lw_tables();
    tables.kmajor = Array4::zeros((3, 3, 2, 3));
    assert!(matches!(
        KDistribution::new(tables),
        Err(RteError::InconsistentTable(_))
    ));

    let mut tables = sw_tables();
    tables.rayl_upper = None;
    assert!(KDistribution::new(tables).is_err());

    let mut tables = lw_tables();
    tables.key_species[[0, 0, 0]] = 3;
    assert!(KDistribution::new(tables).is_err());

    let mut tables = lw_tables();
    tables.temp_ref = arr1(&[300., 250., 200.]);
    assert!(KDistribution::new(tables).is_err());

    let mut tables = lw_tables();
    tables.minor_lower.kminor_start = vec![2];
    assert!(KDistribution::new(tables).is_err());

    let mut tables = lw_tables();
    tables.minor_lower.kminor = Array3::zeros((3, 3, 2));
    assert!(KDistribution::new(tables).is_err());
}

#[test]
fn major_and_minor_absorption() {
    let kdist = lw_kdist();
    let p = profile();
    let (optics, _) = kdist
        .gas_optics_lw(&p.atmos(), arr1(&[300.]).view(), &gas_concs(VMR_H2O, VMR_CO2))
        .unwrap();
    let tau = optics.tau();

    let col_h2o = VMR_H2O * COL_DRY;
    let col_co2 = VMR_CO2 * COL_DRY;

    // Upper layer: major absorption only, band 1 keyed on co2 alone
    assert_relative_eq!(tau[[0, 0, 0]], KMAJOR[0] * (col_h2o + col_co2), max_relative = 1e-10);
    assert_relative_eq!(tau[[0, 0, 1]], KMAJOR[1] * (col_h2o + col_co2), max_relative = 1e-10);
    assert_relative_eq!(tau[[0, 0, 2]], KMAJOR[2] * 2. * col_co2, max_relative = 1e-10);

    // Lower layer: co2 minor absorption on the first band, scaled by
    // density and the water vapor mixing ratio
    let density = 0.01 * 50000. / 250.;
    let h2o_fraction = VMR_H2O / (1. + VMR_H2O);
    let minor = col_co2 * density * h2o_fraction * KMINOR;
    for gpt in 0..2 {
        assert_relative_eq!(
            tau[[0, 1, gpt]],
            KMAJOR[gpt] * (col_h2o + col_co2) + minor,
            max_relative = 1e-10
        );
    }
    assert_relative_eq!(tau[[0, 1, 2]], KMAJOR[2] * (col_h2o + col_co2), max_relative = 1e-10);
}

#[test]
fn major_absorption_interpolates_on_each_side_of_the_tropopause() {
    // k linear in the (temperature, pressure row, eta) indices, so the
    // interpolated value is the same linear function at fractional indices
    let mut tables = lw_tables();
    tables.kmajor = Array4::from_shape_fn((3, 4, 2, 3), |(t, p, eta, g)| {
        1e-22 * (1 + t + 10 * p + 100 * eta) as Float * (g + 1) as Float
    });
    // Flavor (h2o, co2) mixes co2 with a weight of 4
    tables.vmr_ref = Array3::from_shape_fn((3, 3, 2), |(_, gas, _)| [1., 2., 0.5][gas]);
    tables.minor_lower = MinorAbsorberTables {
        kminor: Array3::zeros((3, 2, 0)),
        minor_limits_gpt: Array2::zeros((0, 2)),
        ..Default::default()
    };
    let kdist = KDistribution::new(tables).unwrap();

    // Halfway between grid points in temperature and log-pressure: the top
    // layer above the tropopause, the bottom one below it
    let ten: Float = 10.;
    let play = arr2(&[[ten.powf(3.5), ten.powf(4.5)]]);
    let plev = arr2(&[[1000., 10000., 100000.]]);
    let tlay = arr2(&[[275., 225.]]);
    let col_dry = Array2::from_elem((1, 2), COL_DRY);
    let atmos = Atmosphere::new(play.view(), plev.view(), tlay.view())
        .unwrap()
        .with_col_dry(col_dry.view())
        .unwrap();
    // h2o and weighted co2 columns are both 1e22, so eta is 0.5
    let concs = gas_concs(0.01, 0.0025);
    let (optics, _) = kdist.gas_optics_lw(&atmos, arr1(&[250.]).view(), &concs).unwrap();
    let tau = optics.tau();

    // Upper: temperature index 1.5, pressure rows 2.5 (offset by one), eta 0.5
    let k_upper = 1e-22 * (1. + 1.5 + 25. + 50.);
    assert_relative_eq!(tau[[0, 0, 0]], 2e22 * k_upper, max_relative = 1e-10);
    assert_relative_eq!(tau[[0, 0, 1]], 2e22 * k_upper * 2., max_relative = 1e-10);
    // The second band's upper flavor is (co2, co2)
    assert_relative_eq!(tau[[0, 0, 2]], 5e21 * k_upper * 3., max_relative = 1e-10);

    // Lower: temperature index 0.5, pressure rows 0.5, eta 0.5
    let k_lower = 1e-22 * (1. + 0.5 + 5. + 50.);
    for g in 0..3 {
        assert_relative_eq!(tau[[0, 1, g]], 2e22 * k_lower * (g + 1) as Float, max_relative = 1e-10);
    }
}

#[test]
fn zero_concentrations_give_zero_tau() {
    let kdist = lw_kdist();
    let p = profile();
    let (optics, sources) = kdist
        .gas_optics_lw(&p.atmos(), arr1(&[300.]).view(), &gas_concs(0., 0.))
        .unwrap();
    assert!(optics.tau().iter().all(|&t| t == 0.));
    assert!(sources.lay_source().iter().all(|s| s.is_finite()));
}

#[test]
fn key_species_must_be_present() {
    let kdist = lw_kdist();
    let p = profile();
    let mut concs = GasConcs::new();
    concs.set_vmr_scalar("h2o", VMR_H2O).unwrap();
    let result = kdist.gas_optics_lw(&p.atmos(), arr1(&[300.]).view(), &concs);
    assert!(matches!(result, Err(RteError::MissingGas(gas)) if gas == "co2"));
}

#[test]
fn planck_sources() {
    let kdist = lw_kdist();
    let p = profile();
    let (_, sources) = kdist
        .gas_optics_lw(&p.atmos(), arr1(&[300.]).view(), &gas_concs(VMR_H2O, VMR_CO2))
        .unwrap();

    // B = (band + 1)·T, scaled by the Planck fraction of each g-point
    let band_factor = [1., 1., 2.];
    for gpt in 0..3 {
        let scale = PLANCK_FRAC[gpt] * band_factor[gpt];
        for lay in 0..2 {
            assert_relative_eq!(sources.lay_source()[[0, lay, gpt]], scale * 250., max_relative = 1e-10);
            assert_relative_eq!(
                sources.lev_source_dec()[[0, lay, gpt]],
                scale * p.tlev[[0, lay]],
                max_relative = 1e-10
            );
            assert_relative_eq!(
                sources.lev_source_inc()[[0, lay, gpt]],
                scale * p.tlev[[0, lay + 1]],
                max_relative = 1e-10
            );
        }
        assert_relative_eq!(sources.sfc_source()[[0, gpt]], scale * 300., max_relative = 1e-10);
        assert_relative_eq!(sources.sfc_source_jac()[[0, gpt]], scale, max_relative = 1e-8);
    }
}

#[test]
fn out_of_range_temperatures_are_extrapolated() {
    let kdist = lw_kdist();
    let mut p = profile();
    p.tlay.fill(400.);
    p.tlev.fill(400.);
    let atmos = p.atmos();

    let (optics, sources) = kdist
        .gas_optics_lw(&atmos, arr1(&[400.]).view(), &gas_concs(VMR_H2O, VMR_CO2))
        .unwrap();
    assert_relative_eq!(
        optics.tau()[[0, 0, 0]],
        KMAJOR[0] * (VMR_H2O + VMR_CO2) * COL_DRY,
        max_relative = 1e-10
    );
    assert_relative_eq!(sources.lay_source()[[0, 0, 0]], 0.5 * 400., max_relative = 1e-10);

    assert!(kdist.check_inputs(&atmos, false).is_ok());
    assert!(matches!(
        kdist.check_inputs(&atmos, true),
        Err(RteError::OutOfRange("temperature"))
    ));
}

#[test]
fn shortwave_rayleigh_and_solar_source() {
    let kdist = sw_kdist();
    let p = profile();
    let scaling = arr1(&[0.5]);
    let (optics, toa_src) = kdist
        .gas_optics_sw(&p.atmos(), &gas_concs(VMR_H2O, VMR_CO2), Some(scaling.view()))
        .unwrap();

    let OpticalPropsArry::TwoStream(optics) = optics else {
        panic!("expected two-stream optical properties");
    };
    let tau_ray = KRAYLEIGH * (1. + VMR_H2O) * COL_DRY;
    let tau_abs = KMAJOR[2] * 2. * VMR_CO2 * COL_DRY;
    assert_relative_eq!(optics.tau()[[0, 0, 2]], tau_abs + tau_ray, max_relative = 1e-10);
    assert_relative_eq!(optics.ssa()[[0, 0, 2]], tau_ray / (tau_abs + tau_ray), max_relative = 1e-10);
    assert!(optics.g().iter().all(|&g| g == 0.));

    for gpt in 0..3 {
        assert_relative_eq!(toa_src[[0, gpt]], 0.5 * SOLAR_QUIET[gpt], max_relative = 1e-6);
    }
}

#[test]
fn shortwave_needs_a_solar_source() {
    let p = profile();
    let result = lw_kdist().gas_optics_sw(&p.atmos(), &gas_concs(VMR_H2O, VMR_CO2), None);
    assert!(matches!(result, Err(RteError::InconsistentInputs(_))));
}

#[test]
fn solar_variability() {
    let mut kdist = sw_kdist();
    assert_eq!(kdist.tsi_default(), Some(1200.));

    kdist.set_solar_variability(0.1495954 + 0.1, 0.00066, None).unwrap();
    let source = kdist.solar_source().unwrap().to_owned();
    for gpt in 0..3 {
        assert_relative_eq!(source[gpt], SOLAR_QUIET[gpt] + 0.1, max_relative = 1e-6);
    }

    kdist.set_solar_variability(0.1495954, 0.00066, Some(1200.)).unwrap();
    let source = kdist.solar_source().unwrap();
    assert_relative_eq!(source.sum(), 1200., max_relative = 1e-10);
    assert_relative_eq!(source[2] / source[0], 3., max_relative = 1e-6);

    assert!(kdist.set_tsi(-1.).is_err());
    assert!(lw_kdist().set_tsi(1360.).is_err());
}

#[test]
fn dry_air_column() {
    let plev = arr2(&[[100000., 90000.]]);
    let dry = get_col_dry(Array2::zeros((1, 1)).view(), plev.view(), None).unwrap();
    assert_relative_eq!(dry[[0, 0]], 2.1201748963565887e24, max_relative = 1e-10);

    let moist = get_col_dry(Array2::from_elem((1, 1), 0.01).view(), plev.view(), None).unwrap();
    assert_relative_eq!(moist[[0, 0]] / dry[[0, 0]], 0.028964 / (0.028964 + 0.018016 * 0.01), max_relative = 1e-10);

    // Gravity is weakest at the equator
    let equator = get_col_dry(Array2::zeros((1, 1)).view(), plev.view(), Some(arr1(&[0.]).view())).unwrap();
    assert_relative_eq!(equator[[0, 0]] / dry[[0, 0]], 9.80665 / (9.80665 - 0.02586), max_relative = 1e-10);

    assert!(get_col_dry(Array2::zeros((1, 2)).view(), plev.view(), None).is_err());
}

#[test]
fn dry_air_column_used_when_absent() {
    let kdist = lw_kdist();
    let p = profile();
    let atmos = Atmosphere::new(p.play.view(), p.plev.view(), p.tlay.view()).unwrap();
    let (optics, _) = kdist
        .gas_optics_lw(&atmos, arr1(&[300.]).view(), &gas_concs(0., VMR_CO2))
        .unwrap();

    let col_dry = get_col_dry(Array2::zeros((1, 2)).view(), p.plev.view(), None).unwrap();
    assert_relative_eq!(
        optics.tau()[[0, 0, 2]],
        KMAJOR[2] * 2. * VMR_CO2 * col_dry[[0, 0]],
        max_relative = 1e-10
    );
}

#[test]
fn level_temperatures() {
    let play = arr2(&[[1000., 10000., 50000.]]);
    let plev = arr2(&[[500., 5000., 30000., 80000.]]);

    let isothermal = interpolate_tlev(play.view(), plev.view(), Array2::from_elem((1, 3), 260.).view());
    for &t in &isothermal {
        assert_relative_eq!(t, 260., max_relative = 1e-12);
    }

    let single = interpolate_tlev(arr2(&[[50000.]]).view(), arr2(&[[0., 100000.]]).view(), arr2(&[[280.]]).view());
    assert_eq!(single, arr2(&[[280., 280.]]));

    // Warmer below, so the level temperatures increase downward
    let tlay = arr2(&[[220., 240., 280.]]);
    let tlev = interpolate_tlev(play.view(), plev.view(), tlay.view());
    assert!(tlev.row(0).windows(2).into_iter().all(|w| w[1] > w[0]));
}
