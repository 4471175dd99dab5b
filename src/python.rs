//! Python interface.
//!
//! NOTE: this is the only module that uses `pyo3`. It converts numpy arrays
//! and dicts into the crate's types, runs the block-staged solves in a
//! dedicated thread pool, and hands the fluxes back as numpy arrays.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, info};
use ndarray::{Array, Array2, Dimension, Ix1};
use numpy::{Element, PyArray2, PyArray3, PyReadonlyArray, PyReadonlyArray1, PyReadonlyArray2, ToPyArray};
use pyo3::exceptions::{PyKeyError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::atmosphere::Atmosphere;
use crate::config::RteConfig;
use crate::error::{RteError, RteResult};
use crate::fluxes::FluxesByband;
use crate::gas_concs::GasConcs;
use crate::gas_optics::{KDistribution, KDistributionTables, MinorAbsorberTables, SourceTables};
use crate::radiation::{
    solve_longwave_blocks, solve_shortwave_blocks, LongwaveFluxes, LongwaveInputs, Progress, ShortwaveInputs,
};
use crate::Float;

impl From<RteError> for PyErr {
    fn from(e: RteError) -> Self {
        PyValueError::new_err(e.to_string())
    }
}

fn item<'py>(tables: &Bound<'py, PyDict>, key: &str) -> PyResult<Bound<'py, PyAny>> {
    tables
        .get_item(key)?
        .ok_or_else(|| PyKeyError::new_err(format!("missing table `{key}`")))
}

fn array<T: Element, D: Dimension>(tables: &Bound<'_, PyDict>, key: &str) -> PyResult<Array<T, D>> {
    let values: PyReadonlyArray<'_, T, D> = item(tables, key)?.extract()?;
    Ok(values.as_array().to_owned())
}

fn optional_array<T: Element, D: Dimension>(
    tables: &Bound<'_, PyDict>,
    key: &str,
) -> PyResult<Option<Array<T, D>>> {
    if tables.contains(key)? {
        array(tables, key).map(Some)
    } else {
        Ok(None)
    }
}

fn flags(tables: &Bound<'_, PyDict>, key: &str) -> PyResult<Vec<bool>> {
    let values: PyReadonlyArray1<'_, i32> = item(tables, key)?.extract()?;
    Ok(values.as_array().iter().map(|&v| v != 0).collect())
}

fn minor_tables(tables: &Bound<'_, PyDict>, half: &str) -> PyResult<MinorAbsorberTables> {
    let key = |name: &str| format!("{name}_{half}");
    Ok(MinorAbsorberTables {
        kminor: array(tables, &key("kminor"))?,
        minor_gases: item(tables, &key("minor_gases"))?.extract()?,
        minor_limits_gpt: array(tables, &key("minor_limits_gpt"))?,
        minor_scales_with_density: flags(tables, &key("minor_scales_with_density"))?,
        scaling_gas: item(tables, &key("scaling_gas"))?.extract()?,
        scale_by_complement: flags(tables, &key("scale_by_complement"))?,
        kminor_start: array::<i32, Ix1>(tables, &key("kminor_start"))?.to_vec(),
    })
}

fn source_tables(tables: &Bound<'_, PyDict>) -> PyResult<SourceTables> {
    if tables.contains("totplnk")? {
        return Ok(SourceTables::Thermal {
            totplnk: array(tables, "totplnk")?,
            plank_fraction: array(tables, "plank_fraction")?,
        });
    }
    Ok(SourceTables::Solar {
        solar_source_quiet: array(tables, "solar_source_quiet")?,
        solar_source_facular: array(tables, "solar_source_facular")?,
        solar_source_sunspot: array(tables, "solar_source_sunspot")?,
        tsi_default: item(tables, "tsi_default")?.extract()?,
        mg_default: item(tables, "mg_default")?.extract()?,
        sb_default: item(tables, "sb_default")?.extract()?,
    })
}

/// Gas optics k-distribution.
///
/// Built from a dict holding the variables of a coefficient file, under
/// their usual names. The minor absorber variables carry a `_lower` or
/// `_upper` suffix, integer tables are int32, and flags are int32 arrays
/// of 0 or 1. A longwave distribution has `totplnk` and `plank_fraction`, a
/// shortwave one the `solar_source_*` terms instead.
#[pyclass(name = "KDistribution")]
struct PyKDistribution {
    inner: KDistribution,
}

#[pymethods]
impl PyKDistribution {
    #[new]
    fn new(tables: &Bound<'_, PyDict>) -> PyResult<Self> {
        let tables = KDistributionTables {
            gas_names: item(tables, "gas_names")?.extract()?,
            key_species: array(tables, "key_species")?,
            bnd_limits_wavenumber: array(tables, "bnd_limits_wavenumber")?,
            bnd_limits_gpt: array(tables, "bnd_limits_gpt")?,
            press_ref: array(tables, "press_ref")?,
            press_ref_trop: item(tables, "press_ref_trop")?.extract()?,
            temp_ref: array(tables, "temp_ref")?,
            vmr_ref: array(tables, "vmr_ref")?,
            kmajor: array(tables, "kmajor")?,
            gas_minor: item(tables, "gas_minor")?.extract()?,
            identifier_minor: item(tables, "identifier_minor")?.extract()?,
            minor_lower: minor_tables(tables, "lower")?,
            minor_upper: minor_tables(tables, "upper")?,
            rayl_lower: optional_array(tables, "rayl_lower")?,
            rayl_upper: optional_array(tables, "rayl_upper")?,
            source: source_tables(tables)?,
        };
        Ok(Self {
            inner: KDistribution::new(tables)?,
        })
    }

    #[getter]
    fn nband(&self) -> usize {
        self.inner.nband()
    }

    #[getter]
    fn ngpt(&self) -> usize {
        self.inner.ngpt()
    }

    #[getter]
    fn gas_names(&self) -> Vec<String> {
        self.inner.gas_names().to_vec()
    }

    /// Scale the solar source to a total solar irradiance in W/m².
    fn set_tsi(&mut self, tsi: Float) -> PyResult<()> {
        Ok(self.inner.set_tsi(tsi)?)
    }

    /// Set the solar source from the Mg and sunspot indices, optionally
    /// scaled to a total solar irradiance.
    #[pyo3(signature = (mg_index, sb_index, tsi=None))]
    fn set_solar_variability(&mut self, mg_index: Float, sb_index: Float, tsi: Option<Float>) -> PyResult<()> {
        Ok(self.inner.set_solar_variability(mg_index, sb_index, tsi)?)
    }
}

/// Broadband and per-band fluxes.
///
/// Broadband fields are dimensioned as (`ncol`, `nlev`) and per-band fields
/// as (`ncol`, `nlev`, `nband`).
#[pyclass]
struct Fluxes {
    fluxes: FluxesByband,
    flux_up_jac: Option<Array2<Float>>,
}

#[pymethods]
impl Fluxes {
    #[getter]
    fn flux_up<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray2<Float>> {
        self.fluxes.broadband().flux_up().to_pyarray(py)
    }

    #[getter]
    fn flux_dn<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray2<Float>> {
        self.fluxes.broadband().flux_dn().to_pyarray(py)
    }

    #[getter]
    fn flux_dn_dir<'py>(&self, py: Python<'py>) -> Option<Bound<'py, PyArray2<Float>>> {
        self.fluxes.broadband().flux_dn_dir().map(|f| f.to_pyarray(py))
    }

    #[getter]
    fn flux_net<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray2<Float>> {
        self.fluxes.broadband().flux_net().to_pyarray(py)
    }

    #[getter]
    fn flux_up_jac<'py>(&self, py: Python<'py>) -> Option<Bound<'py, PyArray2<Float>>> {
        self.flux_up_jac.as_ref().map(|f| f.to_pyarray(py))
    }

    #[getter]
    fn bnd_flux_up<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray3<Float>> {
        self.fluxes.bnd_flux_up().to_pyarray(py)
    }

    #[getter]
    fn bnd_flux_dn<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray3<Float>> {
        self.fluxes.bnd_flux_dn().to_pyarray(py)
    }

    #[getter]
    fn bnd_flux_dn_dir<'py>(&self, py: Python<'py>) -> Option<Bound<'py, PyArray3<Float>>> {
        self.fluxes.bnd_flux_dn_dir().map(|f| f.to_pyarray(py))
    }

    #[getter]
    fn bnd_flux_net<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray3<Float>> {
        self.fluxes.bnd_flux_net().to_pyarray(py)
    }
}

/// Gas concentrations from a dict of gas name to either a scalar or a
/// (`ncol`, `nlay`) array of volume mixing ratios.
fn gas_concs(vmr: &Bound<'_, PyDict>) -> PyResult<GasConcs> {
    let mut concs = GasConcs::new();
    for (name, value) in vmr.iter() {
        let name: String = name.extract()?;
        if let Ok(scalar) = value.extract::<Float>() {
            concs.set_vmr_scalar(&name, scalar)?;
        } else {
            let field: PyReadonlyArray2<'_, Float> = value.extract()?;
            concs.set_vmr(&name, field.as_array().to_owned())?;
        }
    }
    Ok(concs)
}

/// Run `solve` in the thread pool of `config` while this thread reports
/// progress and watches for Python signals, such as a KeyboardInterrupt.
fn run_in_pool<T, F>(py: Python<'_>, config: &RteConfig, ncol: usize, solve: F) -> PyResult<T>
where
    T: Send,
    F: FnOnce(&Progress) -> RteResult<T> + Send,
{
    let pool = config.thread_pool()?;
    let progress = Progress::new();
    let finished = AtomicBool::new(false);
    let mut result = None;

    pool.in_place_scope(|s| -> PyResult<()> {
        s.spawn(|_| {
            result = Some(solve(&progress));
            finished.store(true, Ordering::Relaxed);
        });

        while !progress.is_cancelled() {
            if let Err(e) = py.check_signals() {
                progress.cancel();
                return Err(e);
            }

            let completed = progress.completed();
            let percent = completed as f32 / ncol as f32 * 100.;
            info!("Completed {completed}/{ncol} columns ({percent:0.2}%)");
            if finished.load(Ordering::Relaxed) {
                break;
            }

            py.allow_threads(|| {
                std::thread::sleep(Duration::from_millis(200));
            });
        }
        Ok(())
    })?;

    debug!("copying fluxes");
    result.unwrap_or(Err(RteError::Cancelled)).map_err(Into::into)
}

/// Compute longwave fluxes.
///
/// `play`, `tlay` (`ncol`, `nlay`) and `plev` (`ncol`, `nlay`+1) are the
/// pressure in Pa and temperature in K; `tlev`, `col_dry` and `inc_flux`
/// are optional. `tsfc` is the surface temperature (`ncol`, ) and
/// `sfc_emis` the surface emissivity (`ncol`, `nband`). `gas_vmr` maps gas
/// names to volume mixing ratios.
///
/// The number of worker threads is controlled by `num_threads`. It must be
/// a positive integer, or `None` to automatically choose the number of
/// threads.
#[pyfunction]
#[pyo3(signature = (kdist, play, plev, tlay, tsfc, sfc_emis, gas_vmr, tlev=None, col_dry=None, inc_flux=None, n_quad_angles=1, n_col_block=4, compute_jacobian=false, check_values=false, num_threads=None))]
#[allow(clippy::too_many_arguments)]
fn compute_lw_fluxes(
    py: Python<'_>,
    kdist: PyRef<'_, PyKDistribution>,
    play: PyReadonlyArray2<'_, Float>,
    plev: PyReadonlyArray2<'_, Float>,
    tlay: PyReadonlyArray2<'_, Float>,
    tsfc: PyReadonlyArray1<'_, Float>,
    sfc_emis: PyReadonlyArray2<'_, Float>,
    gas_vmr: &Bound<'_, PyDict>,
    tlev: Option<PyReadonlyArray2<'_, Float>>,
    col_dry: Option<PyReadonlyArray2<'_, Float>>,
    inc_flux: Option<PyReadonlyArray2<'_, Float>>,
    n_quad_angles: usize,
    n_col_block: usize,
    compute_jacobian: bool,
    check_values: bool,
    num_threads: Option<usize>,
) -> PyResult<Fluxes> {
    let config = RteConfig::new(n_col_block, n_quad_angles, num_threads, compute_jacobian, check_values)?;
    let gas_concs = gas_concs(gas_vmr)?;

    let mut atmos = Atmosphere::new(play.as_array(), plev.as_array(), tlay.as_array())?;
    if let Some(tlev) = &tlev {
        atmos = atmos.with_tlev(tlev.as_array())?;
    }
    if let Some(col_dry) = &col_dry {
        atmos = atmos.with_col_dry(col_dry.as_array())?;
    }
    let inputs = LongwaveInputs {
        atmos,
        gas_concs: &gas_concs,
        tsfc: tsfc.as_array(),
        sfc_emis: sfc_emis.as_array(),
        inc_flux: inc_flux.as_ref().map(|f| f.as_array()),
        extra_optics: None,
    };

    let ncol = atmos.ncol();
    info!("Processing longwave fluxes for {ncol} columns");
    let kdist = &kdist.inner;
    let LongwaveFluxes { fluxes, flux_up_jac } = run_in_pool(py, &config, ncol, |progress| {
        solve_longwave_blocks(kdist, &inputs, &config, Some(progress))
    })?;
    Ok(Fluxes { fluxes, flux_up_jac })
}

/// Compute shortwave fluxes.
///
/// Inputs are as for `compute_lw_fluxes`, with `mu0` the cosine of the
/// solar zenith angle (`ncol`, ) and the direct and diffuse surface albedos
/// (`ncol`, `nband`). `tsi_scaling` (`ncol`, ) optionally scales the solar
/// source per column.
#[pyfunction]
#[pyo3(signature = (kdist, play, plev, tlay, mu0, sfc_alb_dir, sfc_alb_dif, gas_vmr, tlev=None, col_dry=None, inc_flux_dif=None, tsi_scaling=None, n_col_block=4, check_values=false, num_threads=None))]
#[allow(clippy::too_many_arguments)]
fn compute_sw_fluxes(
    py: Python<'_>,
    kdist: PyRef<'_, PyKDistribution>,
    play: PyReadonlyArray2<'_, Float>,
    plev: PyReadonlyArray2<'_, Float>,
    tlay: PyReadonlyArray2<'_, Float>,
    mu0: PyReadonlyArray1<'_, Float>,
    sfc_alb_dir: PyReadonlyArray2<'_, Float>,
    sfc_alb_dif: PyReadonlyArray2<'_, Float>,
    gas_vmr: &Bound<'_, PyDict>,
    tlev: Option<PyReadonlyArray2<'_, Float>>,
    col_dry: Option<PyReadonlyArray2<'_, Float>>,
    inc_flux_dif: Option<PyReadonlyArray2<'_, Float>>,
    tsi_scaling: Option<PyReadonlyArray1<'_, Float>>,
    n_col_block: usize,
    check_values: bool,
    num_threads: Option<usize>,
) -> PyResult<Fluxes> {
    let config = RteConfig::new(n_col_block, 1, num_threads, false, check_values)?;
    let gas_concs = gas_concs(gas_vmr)?;

    let mut atmos = Atmosphere::new(play.as_array(), plev.as_array(), tlay.as_array())?;
    if let Some(tlev) = &tlev {
        atmos = atmos.with_tlev(tlev.as_array())?;
    }
    if let Some(col_dry) = &col_dry {
        atmos = atmos.with_col_dry(col_dry.as_array())?;
    }
    let inputs = ShortwaveInputs {
        atmos,
        gas_concs: &gas_concs,
        mu0: mu0.as_array(),
        sfc_alb_dir: sfc_alb_dir.as_array(),
        sfc_alb_dif: sfc_alb_dif.as_array(),
        inc_flux_dif: inc_flux_dif.as_ref().map(|f| f.as_array()),
        tsi_scaling: tsi_scaling.as_ref().map(|s| s.as_array()),
        extra_optics: None,
    };

    let ncol = atmos.ncol();
    info!("Processing shortwave fluxes for {ncol} columns");
    let kdist = &kdist.inner;
    let fluxes = run_in_pool(py, &config, ncol, |progress| {
        solve_shortwave_blocks(kdist, &inputs, &config, Some(progress))
    })?;
    Ok(Fluxes {
        fluxes,
        flux_up_jac: None,
    })
}

/// A Python module implemented in Rust.
#[pymodule]
fn rte_rrtmgp(m: &Bound<'_, PyModule>) -> PyResult<()> {
    pyo3_log::init();

    m.add_function(wrap_pyfunction!(compute_lw_fluxes, m)?)?;
    m.add_function(wrap_pyfunction!(compute_sw_fluxes, m)?)?;
    m.add_class::<PyKDistribution>()?;
    m.add_class::<Fluxes>()?;
    Ok(())
}
