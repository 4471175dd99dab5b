//! Block-staged longwave and shortwave solves.
//!
//! The columns are split into fixed-size blocks. Each block runs gas optics,
//! adds any cloud or aerosol optics, solves for g-point fluxes, and reduces
//! them to broadband and per-band fluxes, which are then copied into the
//! full output. Blocks are solved in parallel and the g-point work arrays
//! only live as long as their block.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use log::{debug, info};
use ndarray::{s, Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;

use crate::atmosphere::{check_columns, Atmosphere};
use crate::config::RteConfig;
use crate::error::{RteError, RteResult};
use crate::fluxes::{sum_gpoints, FluxesByband};
use crate::gas_concs::GasConcs;
use crate::gas_optics::KDistribution;
use crate::optical_props::{combine, OpticalProps, OpticalPropsArry};
use crate::rte::{rte_lw, rte_sw};
use crate::Float;

/// Consecutive ranges of at most `block_size` columns covering `0..ncol`.
#[derive(Debug, Clone)]
pub struct ColumnBlocks {
    ncol: usize,
    block_size: usize,
    start: usize,
}

impl ColumnBlocks {
    /// Blocks of `block_size` columns, treating 0 as 1.
    pub fn new(ncol: usize, block_size: usize) -> Self {
        Self {
            ncol,
            block_size: block_size.max(1),
            start: 0,
        }
    }
}

impl Iterator for ColumnBlocks {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.start >= self.ncol {
            return None;
        }
        let end = (self.start + self.block_size).min(self.ncol);
        let cols = self.start..end;
        self.start = end;
        Some(cols)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = (self.ncol - self.start.min(self.ncol)).div_ceil(self.block_size);
        (n, Some(n))
    }
}

impl ExactSizeIterator for ColumnBlocks {}

/// Progress of a block-staged solve, shared with the thread that started it.
///
/// Setting the cancel flag makes the blocks that haven't started yet fail
/// with [`RteError::Cancelled`].
#[derive(Debug, Default)]
pub struct Progress {
    completed: AtomicUsize,
    cancelled: AtomicBool,
}

impl Progress {
    /// Nothing done and not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of columns finished so far.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// Stop before the next block.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether [`Progress::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

fn check_rows(name: &str, values: ArrayView2<'_, Float>, ncol: usize) -> RteResult<()> {
    if values.nrows() != ncol {
        return Err(RteError::InconsistentInputs(format!(
            "`{name}` has {} columns, expected {ncol}",
            values.nrows()
        )));
    }
    Ok(())
}

fn check_common(
    atmos: &Atmosphere<'_>,
    gas_concs: &GasConcs,
    extra_optics: Option<&OpticalPropsArry>,
) -> RteResult<()> {
    let (ncol, nlay) = (atmos.ncol(), atmos.nlay());
    if gas_concs.shape().is_some_and(|shape| shape != (ncol, nlay)) {
        return Err(RteError::InconsistentInputs(format!(
            "gas concentrations have shape {:?}, the atmosphere ({ncol}, {nlay})",
            gas_concs.shape()
        )));
    }
    if let Some(optics) = extra_optics {
        if (optics.ncol(), optics.nlay()) != (ncol, nlay) {
            return Err(RteError::InconsistentInputs(format!(
                "additional optical properties have {} columns and {} layers, the atmosphere {ncol} and {nlay}",
                optics.ncol(),
                optics.nlay()
            )));
        }
    }
    Ok(())
}

/// Run `solve_block` on each block of columns in parallel, counting finished
/// columns in `progress`, and return the results in column order.
fn run_blocks<T, F>(ncol: usize, config: &RteConfig, progress: Option<&Progress>, solve_block: F) -> Vec<(Range<usize>, RteResult<T>)>
where
    T: Send,
    F: Fn(Range<usize>) -> RteResult<T> + Sync,
{
    let blocks: Vec<_> = ColumnBlocks::new(ncol, config.n_col_block()).collect();
    debug!("split {ncol} columns into {} blocks", blocks.len());

    let mut results = Vec::new();
    blocks
        .par_iter()
        .map(|cols| {
            if progress.is_some_and(Progress::is_cancelled) {
                return Err(RteError::Cancelled);
            }
            let result = solve_block(cols.clone());
            if let Some(progress) = progress {
                progress.completed.fetch_add(cols.len(), Ordering::Relaxed);
            }
            result
        })
        .collect_into_vec(&mut results);
    blocks.into_iter().zip(results).collect()
}

/// Inputs of a longwave solve.
#[derive(Debug, Clone, Copy)]
pub struct LongwaveInputs<'a> {
    /// Pressure and temperature profiles
    pub atmos: Atmosphere<'a>,
    /// Gas concentrations on the same columns and layers
    pub gas_concs: &'a GasConcs,
    /// Surface temperature per column, in K
    pub tsfc: ArrayView1<'a, Float>,
    /// Surface emissivity per (column, band)
    pub sfc_emis: ArrayView2<'a, Float>,
    /// Downward flux at the top of the atmosphere per (column, g-point)
    pub inc_flux: Option<ArrayView2<'a, Float>>,
    /// Cloud or aerosol optics to add to the gas optics, by g-point or band
    pub extra_optics: Option<&'a OpticalPropsArry>,
}

/// Result of a longwave solve.
#[derive(Debug, Clone, PartialEq)]
pub struct LongwaveFluxes {
    fluxes: FluxesByband,
    flux_up_jac: Option<Array2<Float>>,
}

impl LongwaveFluxes {
    /// Broadband and per-band fluxes.
    pub fn fluxes(&self) -> &FluxesByband {
        &self.fluxes
    }

    /// Broadband change of the upward flux for a 1 K warmer surface, when
    /// the Jacobian was requested.
    pub fn flux_up_jac(&self) -> Option<ArrayView2<'_, Float>> {
        self.flux_up_jac.as_ref().map(Array2::view)
    }
}

fn longwave_block(
    kdist: &KDistribution,
    inputs: &LongwaveInputs<'_>,
    config: &RteConfig,
    cols: Range<usize>,
) -> RteResult<(FluxesByband, Option<Array2<Float>>)> {
    let atmos = inputs.atmos.subset(cols.clone());
    let gas_concs = inputs.gas_concs.subset(cols.clone());
    let (mut optics, sources) = kdist.gas_optics_lw(&atmos, inputs.tsfc.slice(s![cols.clone()]), &gas_concs)?;

    // Scattering extra optics only add their absorption
    if let Some(extra) = inputs.extra_optics {
        match extra.subset(cols.clone()) {
            OpticalPropsArry::OneScalar(extra) => combine(&mut optics, &extra)?,
            OpticalPropsArry::TwoStream(extra) => combine(&mut optics, &extra)?,
        }
    }

    let gpt_fluxes = rte_lw(
        &optics,
        atmos.orientation(),
        &sources,
        inputs.sfc_emis.slice(s![cols.clone(), ..]),
        inputs.inc_flux.map(|inc| inc.slice_move(s![cols.clone(), ..])),
        config.quadrature(),
        config.compute_jacobian(),
    )?;
    let fluxes = FluxesByband::reduce(
        gpt_fluxes.flux_up().view(),
        gpt_fluxes.flux_dn().view(),
        None,
        kdist.spectral_disc(),
    )?;
    let jac = gpt_fluxes.flux_up_jac().map(|jac| sum_gpoints(jac.view()));
    Ok((fluxes, jac))
}

/// Longwave fluxes, solved block by block on the current rayon thread pool.
pub fn solve_longwave_blocks(
    kdist: &KDistribution,
    inputs: &LongwaveInputs<'_>,
    config: &RteConfig,
    progress: Option<&Progress>,
) -> RteResult<LongwaveFluxes> {
    let atmos = &inputs.atmos;
    let (ncol, nlay) = (atmos.ncol(), atmos.nlay());
    check_columns("tsfc", inputs.tsfc, ncol)?;
    check_rows("sfc_emis", inputs.sfc_emis, ncol)?;
    if let Some(inc) = inputs.inc_flux {
        check_rows("inc_flux", inc, ncol)?;
    }
    check_common(atmos, inputs.gas_concs, inputs.extra_optics)?;
    debug!("input shapes are consistent");
    if config.check_values() {
        kdist.check_inputs(atmos, true)?;
    }

    info!("Solving longwave fluxes for {ncol} columns and {nlay} layers");
    let results = run_blocks(ncol, config, progress, |cols| {
        longwave_block(kdist, inputs, config, cols)
    });

    let mut fluxes = FluxesByband::new(ncol, nlay + 1, kdist.nband(), false);
    let mut flux_up_jac = config.compute_jacobian().then(|| Array2::zeros((ncol, nlay + 1)));
    for (cols, result) in results {
        let (block, jac) = result?;
        fluxes.assign_columns(cols.clone(), &block)?;
        if let (Some(all), Some(jac)) = (&mut flux_up_jac, &jac) {
            all.slice_mut(s![cols, ..]).assign(jac);
        }
    }
    Ok(LongwaveFluxes { fluxes, flux_up_jac })
}

/// Longwave fluxes, solved block by block in a thread pool sized by
/// `config`.
pub fn solve_longwave(
    kdist: &KDistribution,
    inputs: &LongwaveInputs<'_>,
    config: &RteConfig,
) -> RteResult<LongwaveFluxes> {
    config
        .thread_pool()?
        .install(|| solve_longwave_blocks(kdist, inputs, config, None))
}

/// Inputs of a shortwave solve.
#[derive(Debug, Clone, Copy)]
pub struct ShortwaveInputs<'a> {
    /// Pressure and temperature profiles
    pub atmos: Atmosphere<'a>,
    /// Gas concentrations on the same columns and layers
    pub gas_concs: &'a GasConcs,
    /// Cosine of the solar zenith angle per column
    pub mu0: ArrayView1<'a, Float>,
    /// Surface albedo for direct radiation per (column, band)
    pub sfc_alb_dir: ArrayView2<'a, Float>,
    /// Surface albedo for diffuse radiation per (column, band)
    pub sfc_alb_dif: ArrayView2<'a, Float>,
    /// Diffuse downward flux at the top of the atmosphere per (column, g-point)
    pub inc_flux_dif: Option<ArrayView2<'a, Float>>,
    /// Scaling of the solar source per column
    pub tsi_scaling: Option<ArrayView1<'a, Float>>,
    /// Cloud or aerosol optics to add to the gas optics, by g-point or band
    pub extra_optics: Option<&'a OpticalPropsArry>,
}

fn shortwave_block(
    kdist: &KDistribution,
    inputs: &ShortwaveInputs<'_>,
    cols: Range<usize>,
) -> RteResult<FluxesByband> {
    let atmos = inputs.atmos.subset(cols.clone());
    let gas_concs = inputs.gas_concs.subset(cols.clone());
    let tsi_scaling = inputs.tsi_scaling.map(|scaling| scaling.slice_move(s![cols.clone()]));
    let (mut optics, toa_src) = kdist.gas_optics_sw(&atmos, &gas_concs, tsi_scaling)?;
    if let Some(extra) = inputs.extra_optics {
        combine(&mut optics, &extra.subset(cols.clone()))?;
    }

    let gpt_fluxes = rte_sw(
        &optics,
        atmos.orientation(),
        inputs.mu0.slice(s![cols.clone()]),
        toa_src.view(),
        inputs.sfc_alb_dir.slice(s![cols.clone(), ..]),
        inputs.sfc_alb_dif.slice(s![cols.clone(), ..]),
        inputs.inc_flux_dif.map(|inc| inc.slice_move(s![cols, ..])),
    )?;
    FluxesByband::reduce(
        gpt_fluxes.flux_up().view(),
        gpt_fluxes.flux_dn().view(),
        Some(gpt_fluxes.flux_dn_dir().view()),
        kdist.spectral_disc(),
    )
}

/// Shortwave fluxes, solved block by block on the current rayon thread pool.
pub fn solve_shortwave_blocks(
    kdist: &KDistribution,
    inputs: &ShortwaveInputs<'_>,
    config: &RteConfig,
    progress: Option<&Progress>,
) -> RteResult<FluxesByband> {
    let atmos = &inputs.atmos;
    let (ncol, nlay) = (atmos.ncol(), atmos.nlay());
    check_columns("mu0", inputs.mu0, ncol)?;
    check_rows("sfc_alb_dir", inputs.sfc_alb_dir, ncol)?;
    check_rows("sfc_alb_dif", inputs.sfc_alb_dif, ncol)?;
    if let Some(inc) = inputs.inc_flux_dif {
        check_rows("inc_flux_dif", inc, ncol)?;
    }
    if let Some(scaling) = inputs.tsi_scaling {
        check_columns("tsi_scaling", scaling, ncol)?;
    }
    check_common(atmos, inputs.gas_concs, inputs.extra_optics)?;
    debug!("input shapes are consistent");
    if config.check_values() {
        kdist.check_inputs(atmos, true)?;
    }

    info!("Solving shortwave fluxes for {ncol} columns and {nlay} layers");
    let results = run_blocks(ncol, config, progress, |cols| shortwave_block(kdist, inputs, cols));

    let mut fluxes = FluxesByband::new(ncol, nlay + 1, kdist.nband(), true);
    for (cols, result) in results {
        fluxes.assign_columns(cols, &result?)?;
    }
    Ok(fluxes)
}

/// Shortwave fluxes, solved block by block in a thread pool sized by
/// `config`.
pub fn solve_shortwave(
    kdist: &KDistribution,
    inputs: &ShortwaveInputs<'_>,
    config: &RteConfig,
) -> RteResult<FluxesByband> {
    config
        .thread_pool()?
        .install(|| solve_shortwave_blocks(kdist, inputs, config, None))
}

#[cfg(test)]
mod tests;
