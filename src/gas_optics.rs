//! Gas optics from a correlated k-distribution.
//!
//! Absorption by the major (key) species is interpolated in temperature,
//! pressure, and the mixing fraction of the key-species pair ("flavor").
//! Minor absorbers add their own contributions on selected g-point
//! intervals. Longwave distributions also give Planck sources, shortwave
//! ones Rayleigh scattering and the solar source at the top of atmosphere.

mod kernels;
mod tables;

#[cfg(test)]
pub(crate) mod test_tables;

pub use self::tables::{KDistributionTables, MinorAbsorberTables, SourceTables};

use std::ops::Range;

use log::{debug, warn};
use ndarray::{Array1, Array2, Array3, Array4, ArrayView1, ArrayView2, Axis, Zip};
use rayon::prelude::*;
use smallvec::SmallVec;

use self::kernels::interpolate1d;
use crate::atmosphere::{check_columns, Atmosphere};
use crate::error::{RteError, RteResult};
use crate::gas_concs::GasConcs;
use crate::optical_props::{OneScalar, OpticalPropsArry, SpectralDisc, TwoStream};
use crate::rte::Orientation;
use crate::source_functions::SourceFuncLw;
use crate::Float;

/// Index of the lower atmosphere in tables split at the tropopause.
const LOWER: usize = 0;

const TINY: Float = Float::MIN_POSITIVE;

/// One minor-absorber interval, with indices resolved.
#[derive(Debug, Clone)]
struct MinorAbsorber {
    /// Index into the gas columns (0 is dry air)
    gas: usize,
    gpts: Range<usize>,
    scales_with_density: bool,
    /// Scaling gas column index, and whether to use its complement
    scaling_gas: Option<(usize, bool)>,
    /// 0-based contributor of the interval's first g-point
    kminor_start: usize,
}

#[derive(Debug, Clone, Default)]
struct MinorAbsorbers {
    kminor: Array3<Float>,
    absorbers: Vec<MinorAbsorber>,
}

#[derive(Debug, Clone)]
enum Source {
    Thermal {
        /// Total Planck emission per band on the uniform temperature grid
        totplnk: Vec<Vec<Float>>,
        totplnk_delta: Float,
        plank_fraction: Array4<Float>,
    },
    Solar {
        quiet: Array1<Float>,
        facular: Array1<Float>,
        sunspot: Array1<Float>,
        tsi_default: Float,
        mg_default: Float,
        sb_default: Float,
        /// Current solar source per g-point
        solar_source: Array1<Float>,
    },
}

/// A k-distribution, ready for computing gas optics.
///
/// Immutable once built apart from the solar variability; share it between
/// threads by reference.
#[derive(Debug, Clone)]
pub struct KDistribution {
    disc: SpectralDisc,
    gas_names: Vec<String>,
    /// Gas column indices of all non-empty key species
    key_gases: Vec<usize>,
    /// Key-species pairs as gas column indices
    flavors: Vec<[usize; 2]>,
    /// Flavor of each g-point, for the lower and the upper atmosphere
    gpoint_flavor: [Vec<usize>; 2],
    press_ref_log: Vec<Float>,
    press_ref_log_delta: Float,
    press_ref_trop_log: Float,
    press_ref_min: Float,
    press_ref_max: Float,
    temp_ref: Vec<Float>,
    vmr_ref: Array3<Float>,
    kmajor: Array4<Float>,
    minor: [MinorAbsorbers; 2],
    rayleigh: Option<[Array3<Float>; 2]>,
    source: Source,
    /// Gas column index of water vapor
    idx_h2o: Option<usize>,
}

/// Per-column results, before they are assembled into the output arrays.
struct ColumnOptics {
    /// (layer, g-point)
    tau: Array2<Float>,
    tau_rayleigh: Option<Array2<Float>>,
    planck_frac: Option<Array2<Float>>,
}

struct ColumnSources {
    lay: Array2<Float>,
    lev_inc: Array2<Float>,
    lev_dec: Array2<Float>,
    sfc: Array1<Float>,
    sfc_jac: Array1<Float>,
}

fn resolve_minor(
    tables: &MinorAbsorberTables,
    gas_names: &[String],
    gas_minor: &[String],
    identifier_minor: &[String],
) -> RteResult<MinorAbsorbers> {
    let gas_index = |name: &str| gas_names.iter().position(|g| g == name).map(|i| i + 1);

    let mut absorbers = Vec::with_capacity(tables.minor_gases.len());
    for (i, identifier) in tables.minor_gases.iter().enumerate() {
        let name = identifier_minor
            .iter()
            .position(|id| id == identifier)
            .map_or(identifier.as_str(), |j| gas_minor[j].as_str());
        // Absorbers of gases the distribution doesn't know never contribute
        let Some(gas) = gas_index(name) else {
            debug!("skipping minor absorber `{identifier}`");
            continue;
        };

        let scaling_gas = match tables.scaling_gas[i].trim() {
            "" => None,
            scaling => {
                let idx = gas_index(scaling).ok_or_else(|| {
                    RteError::InconsistentTable(format!("unknown scaling gas `{scaling}`"))
                })?;
                Some((idx, tables.scale_by_complement[i]))
            }
        };

        let limits = tables.minor_limits_gpt.row(i);
        absorbers.push(MinorAbsorber {
            gas,
            gpts: (limits[0] - 1) as usize..limits[1] as usize,
            scales_with_density: tables.minor_scales_with_density[i],
            scaling_gas,
            kminor_start: (tables.kminor_start[i] - 1) as usize,
        });
    }

    Ok(MinorAbsorbers {
        kminor: tables.kminor.clone(),
        absorbers,
    })
}

impl KDistribution {
    /// Check the tables and derive the lookup indices.
    pub fn new(tables: KDistributionTables) -> RteResult<Self> {
        tables.check()?;

        let disc = SpectralDisc::from_table(tables.bnd_limits_wavenumber.view(), tables.bnd_limits_gpt.view())?;
        if disc.ngpt() != tables.kmajor.dim().3 {
            return Err(RteError::InconsistentTable(format!(
                "bands cover {} g-points, kmajor has {}",
                disc.ngpt(),
                tables.kmajor.dim().3
            )));
        }
        let gas_names: Vec<String> = tables
            .gas_names
            .iter()
            .map(|name| name.trim().to_lowercase())
            .collect();

        // Pairs with no key species get the second gas, as both components
        let key_pair = |band: usize, half: usize| -> [usize; 2] {
            match [
                tables.key_species[[band, half, 0]] as usize,
                tables.key_species[[band, half, 1]] as usize,
            ] {
                [0, 0] => [2.min(gas_names.len()); 2],
                pair => pair,
            }
        };

        let mut flavors: Vec<[usize; 2]> = Vec::new();
        for band in 0..disc.nband() {
            for half in 0..2 {
                let pair = key_pair(band, half);
                if !flavors.contains(&pair) {
                    flavors.push(pair);
                }
            }
        }
        let gpoint_flavor = [0, 1].map(|half| {
            disc.gpt_to_band()
                .iter()
                .map(|&band| {
                    let pair = key_pair(band, half);
                    flavors.iter().position(|f| *f == pair).unwrap_or_default()
                })
                .collect()
        });

        let mut key_gases: Vec<usize> = tables
            .key_species
            .iter()
            .filter(|&&k| k > 0)
            .map(|&k| k as usize)
            .collect();
        key_gases.sort_unstable();
        key_gases.dedup();

        let minor = [&tables.minor_lower, &tables.minor_upper]
            .map(|t| resolve_minor(t, &gas_names, &tables.gas_minor, &tables.identifier_minor));
        let [lower, upper] = minor;
        let minor = [lower?, upper?];

        let press_ref_log: Vec<Float> = tables.press_ref.iter().map(|p| p.ln()).collect();
        let npres = press_ref_log.len();
        let press_ref_log_delta = (press_ref_log[npres - 1] - press_ref_log[0]) / (npres - 1) as Float;
        let temp_ref = tables.temp_ref.to_vec();
        let (temp_ref_min, temp_ref_max) = (temp_ref[0], temp_ref[temp_ref.len() - 1]);

        let source = match tables.source {
            SourceTables::Thermal {
                totplnk,
                plank_fraction,
            } => Source::Thermal {
                totplnk_delta: (temp_ref_max - temp_ref_min) / (totplnk.dim().1 - 1) as Float,
                totplnk: totplnk.outer_iter().map(|row| row.to_vec()).collect(),
                plank_fraction,
            },
            SourceTables::Solar {
                solar_source_quiet,
                solar_source_facular,
                solar_source_sunspot,
                tsi_default,
                mg_default,
                sb_default,
            } => Source::Solar {
                solar_source: solar_source_quiet.clone(),
                quiet: solar_source_quiet,
                facular: solar_source_facular,
                sunspot: solar_source_sunspot,
                tsi_default,
                mg_default,
                sb_default,
            },
        };

        let mut kdist = Self {
            idx_h2o: gas_names.iter().position(|g| g == "h2o").map(|i| i + 1),
            disc,
            gas_names,
            key_gases,
            flavors,
            gpoint_flavor,
            press_ref_min: tables.press_ref.iter().copied().fold(Float::INFINITY, Float::min),
            press_ref_max: tables.press_ref.iter().copied().fold(Float::NEG_INFINITY, Float::max),
            press_ref_log,
            press_ref_log_delta,
            press_ref_trop_log: tables.press_ref_trop.ln(),
            temp_ref,
            vmr_ref: tables.vmr_ref,
            kmajor: tables.kmajor,
            minor,
            rayleigh: tables.rayl_lower.zip(tables.rayl_upper).map(|(l, u)| [l, u]),
            source,
        };

        if let Source::Solar {
            mg_default,
            sb_default,
            ..
        } = kdist.source
        {
            kdist.set_solar_variability(mg_default, sb_default, None)?;
        }

        debug!(
            "k-distribution with {} gases, {} bands, {} g-points, {} flavors",
            kdist.gas_names.len(),
            kdist.disc.nband(),
            kdist.disc.ngpt(),
            kdist.flavors.len()
        );
        Ok(kdist)
    }

    /// The bands and g-points of the distribution.
    pub fn spectral_disc(&self) -> &SpectralDisc {
        &self.disc
    }

    /// Number of bands.
    pub fn nband(&self) -> usize {
        self.disc.nband()
    }

    /// Number of g-points.
    pub fn ngpt(&self) -> usize {
        self.disc.ngpt()
    }

    /// Gases known to the distribution, lower case.
    pub fn gas_names(&self) -> &[String] {
        &self.gas_names
    }

    /// Whether the distribution has Planck sources (longwave).
    pub fn source_is_internal(&self) -> bool {
        matches!(self.source, Source::Thermal { .. })
    }

    /// Whether the distribution has a solar source (shortwave).
    pub fn source_is_external(&self) -> bool {
        matches!(self.source, Source::Solar { .. })
    }

    /// Smallest and largest reference pressure, in Pa.
    pub fn press_limits(&self) -> (Float, Float) {
        (self.press_ref_min, self.press_ref_max)
    }

    /// Smallest and largest reference temperature, in K.
    pub fn temp_limits(&self) -> (Float, Float) {
        (self.temp_ref[0], self.temp_ref[self.temp_ref.len() - 1])
    }

    /// Current solar source per g-point, for shortwave distributions.
    pub fn solar_source(&self) -> Option<ArrayView1<'_, Float>> {
        match &self.source {
            Source::Solar { solar_source, .. } => Some(solar_source.view()),
            Source::Thermal { .. } => None,
        }
    }

    /// Default total solar irradiance, for shortwave distributions.
    pub fn tsi_default(&self) -> Option<Float> {
        match self.source {
            Source::Solar { tsi_default, .. } => Some(tsi_default),
            Source::Thermal { .. } => None,
        }
    }

    /// Recompute the solar source from the Mg II and sunspot indices,
    /// optionally normalized to a total solar irradiance `tsi`.
    pub fn set_solar_variability(&mut self, mg_index: Float, sb_index: Float, tsi: Option<Float>) -> RteResult<()> {
        /// Offsets of the mean solar cycle
        const A_OFFSET: Float = 0.1495954;
        const B_OFFSET: Float = 0.00066;

        let Source::Solar {
            quiet,
            facular,
            sunspot,
            solar_source,
            ..
        } = &mut self.source
        else {
            return Err(RteError::InconsistentInputs(
                "the k-distribution has no solar source".into(),
            ));
        };

        Zip::from(solar_source)
            .and(&*quiet)
            .and(&*facular)
            .and(&*sunspot)
            .for_each(|s, &q, &f, &ss| {
                *s = q + (mg_index - A_OFFSET) * f + (sb_index - B_OFFSET) * ss;
            });

        match tsi {
            Some(tsi) => self.set_tsi(tsi),
            None => Ok(()),
        }
    }

    /// Scale the solar source so that it sums to `tsi`.
    pub fn set_tsi(&mut self, tsi: Float) -> RteResult<()> {
        let Source::Solar { solar_source, .. } = &mut self.source else {
            return Err(RteError::InconsistentInputs(
                "the k-distribution has no solar source".into(),
            ));
        };
        if tsi.is_nan() || tsi <= 0. {
            return Err(RteError::InconsistentInputs(format!(
                "total solar irradiance must be positive, got {tsi}"
            )));
        }
        let total = solar_source.sum();
        if total > 0. {
            *solar_source *= tsi / total;
        }
        Ok(())
    }

    /// Check pressures and temperatures against the range of the tables.
    ///
    /// Values outside are extrapolated from the edge bins. With `strict`
    /// that is an error, otherwise only a warning.
    pub fn check_inputs(&self, atmos: &Atmosphere<'_>, strict: bool) -> RteResult<()> {
        let (pmin, pmax) = self.press_limits();
        let (tmin, tmax) = self.temp_limits();
        let outside = |values: ArrayView2<'_, Float>, lo: Float, hi: Float| {
            values.iter().any(|&v| v < lo || v > hi)
        };

        if outside(atmos.play, pmin, pmax) {
            if strict {
                return Err(RteError::OutOfRange("layer pressure"));
            }
            warn!("layer pressures outside [{pmin}, {pmax}] Pa are extrapolated");
        }
        let tlev_outside = atmos.tlev.is_some_and(|t| outside(t, tmin, tmax));
        if outside(atmos.tlay, tmin, tmax) || tlev_outside {
            if strict {
                return Err(RteError::OutOfRange("temperature"));
            }
            warn!("temperatures outside [{tmin}, {tmax}] K are extrapolated");
        }
        Ok(())
    }

    fn check_key_species(&self, gas_concs: &GasConcs) -> RteResult<()> {
        for &gas in &self.key_gases {
            let name = &self.gas_names[gas - 1];
            if !gas_concs.contains(name) {
                return Err(RteError::MissingGas(name.clone()));
            }
        }
        Ok(())
    }

    /// Gas columns in molecules/cm², (column, layer, gas) with dry air first.
    fn col_gas(&self, atmos: &Atmosphere<'_>, gas_concs: &GasConcs) -> RteResult<Array3<Float>> {
        let (ncol, nlay) = (atmos.ncol(), atmos.nlay());
        let col_dry = match atmos.col_dry {
            Some(col_dry) => col_dry.to_owned(),
            None => {
                let vmr_h2o = gas_concs
                    .get_vmr("h2o", ncol, nlay)?
                    .unwrap_or_else(|| Array2::zeros((ncol, nlay)));
                get_col_dry(vmr_h2o.view(), atmos.plev, None)?
            }
        };

        let mut col_gas = Array3::zeros((ncol, nlay, self.gas_names.len() + 1));
        col_gas.index_axis_mut(Axis(2), 0).assign(&col_dry);
        for (i, name) in self.gas_names.iter().enumerate() {
            if let Some(vmr) = gas_concs.get_vmr(name, ncol, nlay)? {
                Zip::from(col_gas.index_axis_mut(Axis(2), i + 1))
                    .and(&vmr)
                    .and(&col_dry)
                    .for_each(|col, &vmr, &dry| *col = vmr * dry);
            }
        }
        Ok(col_gas)
    }

    /// Absorption (and Rayleigh scattering or Planck fractions) of one column.
    fn column_optics(
        &self,
        play: ArrayView1<'_, Float>,
        tlay: ArrayView1<'_, Float>,
        col_gas: ArrayView2<'_, Float>,
    ) -> ColumnOptics {
        let nlay = play.len();
        let ngpt = self.ngpt();
        let mut tau = Array2::zeros((nlay, ngpt));
        let mut tau_rayleigh = self.rayleigh.as_ref().map(|_| Array2::zeros((nlay, ngpt)));
        let mut planck_frac = match self.source {
            Source::Thermal { .. } => Some(Array2::zeros((nlay, ngpt))),
            Source::Solar { .. } => None,
        };

        for ilay in 0..nlay {
            let cols: SmallVec<[Float; 16]> = col_gas.row(ilay).iter().copied().collect();
            let interp = self.interpolate_layer(play[ilay], tlay[ilay], &cols);
            let flavor_of = &self.gpoint_flavor[interp.itropo];

            for gpt in 0..ngpt {
                let flavor = flavor_of[gpt];
                tau[[ilay, gpt]] = interp.interpolate3d(
                    flavor,
                    self.kmajor.view(),
                    gpt,
                    interp.flavors[flavor].col_mix,
                );
            }

            let minor = &self.minor[interp.itropo];
            for absorber in &minor.absorbers {
                let scaling = absorber.scaling(play[ilay], tlay[ilay], &cols, self.idx_h2o);
                let flavor = flavor_of[absorber.gpts.start];
                for gpt in absorber.gpts.clone() {
                    let contributor = absorber.kminor_start + gpt - absorber.gpts.start;
                    tau[[ilay, gpt]] += scaling * interp.interpolate2d(flavor, minor.kminor.view(), contributor);
                }
            }

            if let (Some(tau_rayleigh), Some(rayleigh)) = (&mut tau_rayleigh, &self.rayleigh) {
                let table = if interp.is_lower() { &rayleigh[0] } else { &rayleigh[1] };
                let col_wet = cols[0] + self.idx_h2o.map_or(0., |i| cols[i]);
                for gpt in 0..ngpt {
                    tau_rayleigh[[ilay, gpt]] = col_wet * interp.interpolate2d(flavor_of[gpt], table.view(), gpt);
                }
            }

            if let (Some(planck_frac), Source::Thermal { plank_fraction, .. }) = (&mut planck_frac, &self.source) {
                for gpt in 0..ngpt {
                    planck_frac[[ilay, gpt]] =
                        interp.interpolate3d(flavor_of[gpt], plank_fraction.view(), gpt, [1., 1.]);
                }
            }
        }

        tau.mapv_inplace(|t| t.max(0.));
        ColumnOptics {
            tau,
            tau_rayleigh,
            planck_frac,
        }
    }

    /// Total Planck emission of `band` at `temp`.
    fn planck_function(&self, band: usize, temp: Float) -> Float {
        match &self.source {
            Source::Thermal {
                totplnk,
                totplnk_delta,
                ..
            } => interpolate1d(temp, self.temp_ref[0], *totplnk_delta, &totplnk[band]),
            Source::Solar { .. } => 0.,
        }
    }

    /// Planck sources of one column from its Planck fractions.
    fn column_sources(
        &self,
        planck_frac: &Array2<Float>,
        tlay: ArrayView1<'_, Float>,
        tlev: ArrayView1<'_, Float>,
        tsfc: Float,
        sfc_lay: usize,
    ) -> ColumnSources {
        let (nlay, ngpt) = planck_frac.dim();
        let mut sources = ColumnSources {
            lay: Array2::zeros((nlay, ngpt)),
            lev_inc: Array2::zeros((nlay, ngpt)),
            lev_dec: Array2::zeros((nlay, ngpt)),
            sfc: Array1::zeros(ngpt),
            sfc_jac: Array1::zeros(ngpt),
        };

        for (band, gpts) in self.disc.band_lims_gpt().iter().enumerate() {
            for ilay in 0..nlay {
                let b_lay = self.planck_function(band, tlay[ilay]);
                let b_inc = self.planck_function(band, tlev[ilay + 1]);
                let b_dec = self.planck_function(band, tlev[ilay]);
                for gpt in gpts.clone() {
                    let pfrac = planck_frac[[ilay, gpt]];
                    sources.lay[[ilay, gpt]] = pfrac * b_lay;
                    sources.lev_inc[[ilay, gpt]] = pfrac * b_inc;
                    sources.lev_dec[[ilay, gpt]] = pfrac * b_dec;
                }
            }

            let b_sfc = self.planck_function(band, tsfc);
            let b_sfc_warmer = self.planck_function(band, tsfc + 1.);
            for gpt in gpts.clone() {
                let pfrac = planck_frac[[sfc_lay, gpt]];
                sources.sfc[gpt] = pfrac * b_sfc;
                sources.sfc_jac[gpt] = pfrac * (b_sfc_warmer - b_sfc);
            }
        }
        sources
    }

    /// Longwave optical depth and Planck sources.
    ///
    /// `tsfc` is the surface temperature of each column. Level temperatures
    /// are interpolated from the layers when the atmosphere has none.
    pub fn gas_optics_lw(
        &self,
        atmos: &Atmosphere<'_>,
        tsfc: ArrayView1<'_, Float>,
        gas_concs: &GasConcs,
    ) -> RteResult<(OneScalar, SourceFuncLw)> {
        if !self.source_is_internal() {
            return Err(RteError::InconsistentInputs(
                "longwave gas optics needs a k-distribution with Planck sources".into(),
            ));
        }
        let (ncol, nlay, ngpt) = (atmos.ncol(), atmos.nlay(), self.ngpt());
        check_columns("tsfc", tsfc, ncol)?;
        self.check_key_species(gas_concs)?;
        debug!("input shapes are consistent");
        self.check_inputs(atmos, false)?;

        let col_gas = self.col_gas(atmos, gas_concs)?;
        let tlev = match atmos.tlev {
            Some(tlev) => tlev.to_owned(),
            None => interpolate_tlev(atmos.play, atmos.plev, atmos.tlay),
        };
        let sfc_lay = match atmos.orientation() {
            Orientation::TopAtFirst => nlay - 1,
            Orientation::SurfaceAtFirst => 0,
        };

        let mut results = Vec::new();
        (0..ncol)
            .into_par_iter()
            .map(|icol| {
                let optics = self.column_optics(
                    atmos.play.row(icol),
                    atmos.tlay.row(icol),
                    col_gas.index_axis(Axis(0), icol),
                );
                let sources = optics.planck_frac.as_ref().map(|pfrac| {
                    self.column_sources(pfrac, atmos.tlay.row(icol), tlev.row(icol), tsfc[icol], sfc_lay)
                });
                (optics.tau, sources)
            })
            .collect_into_vec(&mut results);

        let mut tau = Array3::zeros((ncol, nlay, ngpt));
        let mut sources = SourceFuncLw::new(ncol, nlay, self.disc.clone());
        for (icol, (col_tau, col_sources)) in results.into_iter().enumerate() {
            tau.index_axis_mut(Axis(0), icol).assign(&col_tau);
            if let Some(s) = col_sources {
                sources.lay_source.index_axis_mut(Axis(0), icol).assign(&s.lay);
                sources.lev_source_inc.index_axis_mut(Axis(0), icol).assign(&s.lev_inc);
                sources.lev_source_dec.index_axis_mut(Axis(0), icol).assign(&s.lev_dec);
                sources.sfc_source.row_mut(icol).assign(&s.sfc);
                sources.sfc_source_jac.row_mut(icol).assign(&s.sfc_jac);
            }
        }

        Ok((OneScalar::from_tau(self.disc.clone(), tau)?, sources))
    }

    /// Shortwave optical properties and the solar source at the top of the
    /// atmosphere, (column, g-point).
    ///
    /// Distributions with Rayleigh tables give two-stream properties,
    /// otherwise absorption only. `tsi_scaling` scales the solar source of
    /// each column.
    pub fn gas_optics_sw(
        &self,
        atmos: &Atmosphere<'_>,
        gas_concs: &GasConcs,
        tsi_scaling: Option<ArrayView1<'_, Float>>,
    ) -> RteResult<(OpticalPropsArry, Array2<Float>)> {
        let Source::Solar { solar_source, .. } = &self.source else {
            return Err(RteError::InconsistentInputs(
                "shortwave gas optics needs a k-distribution with a solar source".into(),
            ));
        };
        let (ncol, nlay, ngpt) = (atmos.ncol(), atmos.nlay(), self.ngpt());
        if let Some(scaling) = tsi_scaling {
            check_columns("tsi_scaling", scaling, ncol)?;
        }
        self.check_key_species(gas_concs)?;
        debug!("input shapes are consistent");
        self.check_inputs(atmos, false)?;

        let col_gas = self.col_gas(atmos, gas_concs)?;

        let mut results = Vec::new();
        (0..ncol)
            .into_par_iter()
            .map(|icol| {
                self.column_optics(
                    atmos.play.row(icol),
                    atmos.tlay.row(icol),
                    col_gas.index_axis(Axis(0), icol),
                )
            })
            .collect_into_vec(&mut results);

        let mut tau = Array3::zeros((ncol, nlay, ngpt));
        let mut tau_rayleigh = self.rayleigh.as_ref().map(|_| Array3::zeros((ncol, nlay, ngpt)));
        for (icol, optics) in results.into_iter().enumerate() {
            tau.index_axis_mut(Axis(0), icol).assign(&optics.tau);
            if let (Some(all), Some(col)) = (&mut tau_rayleigh, &optics.tau_rayleigh) {
                all.index_axis_mut(Axis(0), icol).assign(col);
            }
        }

        let props: OpticalPropsArry = match tau_rayleigh {
            None => OneScalar::from_tau(self.disc.clone(), tau)?.into(),
            Some(tau_rayleigh) => {
                tau += &tau_rayleigh;
                let ssa = Zip::from(&tau)
                    .and(&tau_rayleigh)
                    .map_collect(|&tau, &ray| if tau > 2. * TINY { ray / tau } else { 0. });
                let g = Array3::zeros((ncol, nlay, ngpt));
                TwoStream::from_arrays(self.disc.clone(), tau, ssa, g)?.into()
            }
        };

        let toa_src = Array2::from_shape_fn((ncol, ngpt), |(icol, igpt)| {
            solar_source[igpt] * tsi_scaling.map_or(1., |s| s[icol])
        });
        Ok((props, toa_src))
    }
}

/// Dry-air column per layer, in molecules/cm², from the water vapor volume
/// mixing ratio (column, layer) and level pressures (column, level) in Pa.
///
/// With `latitude` (degrees) the latitude dependence of gravity is included.
pub fn get_col_dry(
    vmr_h2o: ArrayView2<'_, Float>,
    plev: ArrayView2<'_, Float>,
    latitude: Option<ArrayView1<'_, Float>>,
) -> RteResult<Array2<Float>> {
    #![allow(clippy::excessive_precision)]
    /// Avogadro constant (1/mol)
    const AVOGAD: Float = 6.02214076e23;
    /// Molar mass of dry air (kg/mol)
    const M_DRY: Float = 0.028964;
    /// Molar mass of water vapor (kg/mol)
    const M_H2O: Float = 0.018016;
    /// Standard gravity (m/s²)
    const HELMERT1: Float = 9.80665;
    const HELMERT2: Float = 0.02586;

    let (ncol, nlay) = vmr_h2o.dim();
    if plev.dim() != (ncol, nlay + 1) {
        return Err(RteError::InconsistentInputs(format!(
            "plev has shape {:?}, expected ({ncol}, {})",
            plev.dim(),
            nlay + 1
        )));
    }
    if let Some(lat) = latitude {
        check_columns("latitude", lat, ncol)?;
    }

    Ok(Array2::from_shape_fn((ncol, nlay), |(icol, ilay)| {
        let g0 = match latitude {
            Some(lat) => HELMERT1 - HELMERT2 * (2. * crate::PI * lat[icol] / 180.).cos(),
            None => HELMERT1,
        };
        let delta_plev = (plev[[icol, ilay]] - plev[[icol, ilay + 1]]).abs();
        let fact = 1. / (1. + vmr_h2o[[icol, ilay]]);
        let m_air = (M_DRY + M_H2O * vmr_h2o[[icol, ilay]]) * fact;
        10. * delta_plev * AVOGAD * fact / (1000. * m_air * 100. * g0)
    }))
}

/// Level temperatures interpolated in pressure from the layer temperatures,
/// extrapolated at both ends.
pub fn interpolate_tlev(
    play: ArrayView2<'_, Float>,
    plev: ArrayView2<'_, Float>,
    tlay: ArrayView2<'_, Float>,
) -> Array2<Float> {
    let (ncol, nlay) = play.dim();
    let mut tlev = Array2::zeros((ncol, nlay + 1));

    for (((mut tlev, play), plev), tlay) in tlev
        .outer_iter_mut()
        .zip(play.outer_iter())
        .zip(plev.outer_iter())
        .zip(tlay.outer_iter())
    {
        if nlay == 1 {
            tlev.fill(tlay[0]);
            continue;
        }
        tlev[0] = tlay[0] + (plev[0] - play[0]) * (tlay[1] - tlay[0]) / (play[1] - play[0]);
        for i in 1..nlay {
            tlev[i] = (play[i - 1] * tlay[i - 1] * (plev[i] - play[i])
                + play[i] * tlay[i] * (play[i - 1] - plev[i]))
                / (plev[i] * (play[i - 1] - play[i]));
        }
        tlev[nlay] = tlay[nlay - 1]
            + (plev[nlay] - play[nlay - 1]) * (tlay[nlay - 1] - tlay[nlay - 2])
                / (play[nlay - 1] - play[nlay - 2]);
    }
    tlev
}

#[cfg(test)]
mod tests;
