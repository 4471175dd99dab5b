//! In-memory coefficient tables, laid out like the variables of the
//! k-distribution data files.
//!
//! Every array keeps the dimension order of the data files, so a reader can
//! move each variable across unchanged. Indices stored in the tables
//! (`key_species`, `bnd_limits_gpt`, `minor_limits_gpt`, `kminor_start`) are
//! 1-based as in the files.

use ndarray::{Array1, Array2, Array3, Array4};

use crate::error::{RteError, RteResult};
use crate::Float;

/// Minor absorbers of one half of the atmosphere (lower or upper).
#[derive(Debug, Clone, Default)]
pub struct MinorAbsorberTables {
    /// (temperature, mixing_fraction, contributors)
    pub kminor: Array3<Float>,
    /// Identifier of the absorbing gas of each interval
    pub minor_gases: Vec<String>,
    /// First and last g-point of each interval, (interval, pair)
    pub minor_limits_gpt: Array2<i32>,
    /// Whether the absorption of each interval scales with density
    pub minor_scales_with_density: Vec<bool>,
    /// Gas the absorption is additionally scaled by, empty for none
    pub scaling_gas: Vec<String>,
    /// Scale by the complement of the scaling gas's mixing ratio
    pub scale_by_complement: Vec<bool>,
    /// First contributor of each interval in `kminor`
    pub kminor_start: Vec<i32>,
}

/// The source-term tables, which also decide whether the distribution is
/// longwave or shortwave.
#[derive(Debug, Clone)]
pub enum SourceTables {
    /// Internal (Planck) sources
    Thermal {
        /// Total Planck emission by band, (bnd, temperature_Planck)
        totplnk: Array2<Float>,
        /// (temperature, pressure+1, mixing_fraction, gpt)
        plank_fraction: Array4<Float>,
    },
    /// External (solar) source
    Solar {
        /// Quiet-sun irradiance per g-point
        solar_source_quiet: Array1<Float>,
        /// Facular brightening term per g-point
        solar_source_facular: Array1<Float>,
        /// Sunspot darkening term per g-point
        solar_source_sunspot: Array1<Float>,
        /// Default total solar irradiance
        tsi_default: Float,
        /// Default Mg II index
        mg_default: Float,
        /// Default sunspot index
        sb_default: Float,
    },
}

/// Everything needed to build a [`KDistribution`](super::KDistribution).
#[derive(Debug, Clone)]
pub struct KDistributionTables {
    /// Names of the absorbing gases
    pub gas_names: Vec<String>,
    /// Pair of key species (1-based into `gas_names`, 0 for none) per band
    /// and atmosphere half, (bnd, atmos_layer, pair)
    pub key_species: Array3<i32>,
    /// (bnd, pair), in cm⁻¹
    pub bnd_limits_wavenumber: Array2<Float>,
    /// (bnd, pair)
    pub bnd_limits_gpt: Array2<i32>,
    /// Reference pressures in Pa, log-uniformly spaced
    pub press_ref: Array1<Float>,
    /// Pressure separating the lower and upper atmosphere, in Pa
    pub press_ref_trop: Float,
    /// Reference temperatures in K, ascending and uniformly spaced
    pub temp_ref: Array1<Float>,
    /// Reference volume mixing ratios, (temperature, absorber_ext, atmos_layer)
    /// where absorber 0 is dry air
    pub vmr_ref: Array3<Float>,
    /// (temperature, pressure+1, mixing_fraction, gpt)
    pub kmajor: Array4<Float>,
    /// Names of the minor absorbing gases
    pub gas_minor: Vec<String>,
    /// Identifier of each entry of `gas_minor`
    pub identifier_minor: Vec<String>,
    /// Minor absorbers below the tropopause
    pub minor_lower: MinorAbsorberTables,
    /// Minor absorbers above the tropopause
    pub minor_upper: MinorAbsorberTables,
    /// Rayleigh scattering below the tropopause, (temperature, mixing_fraction, gpt)
    pub rayl_lower: Option<Array3<Float>>,
    /// Rayleigh scattering above the tropopause, (temperature, mixing_fraction, gpt)
    pub rayl_upper: Option<Array3<Float>>,
    /// Source terms
    pub source: SourceTables,
}

fn inconsistent<T>(msg: String) -> RteResult<T> {
    Err(RteError::InconsistentTable(msg))
}

fn strictly_monotonic(values: &Array1<Float>) -> bool {
    let ascending = values.windows(2).into_iter().all(|w| w[1] > w[0]);
    let descending = values.windows(2).into_iter().all(|w| w[1] < w[0]);
    ascending || descending
}

impl MinorAbsorberTables {
    pub(super) fn check(&self, half: &str, ntemp: usize, neta: usize, ngpt: usize) -> RteResult<()> {
        let nminor = self.minor_gases.len();
        let (nt, ne, ncontrib) = self.kminor.dim();
        if nminor > 0 && (nt, ne) != (ntemp, neta) {
            return inconsistent(format!(
                "kminor_{half} is {:?}, expected ({ntemp}, {neta}, _)",
                self.kminor.dim()
            ));
        }
        if self.minor_limits_gpt.dim() != (nminor, 2)
            || self.minor_scales_with_density.len() != nminor
            || self.scaling_gas.len() != nminor
            || self.scale_by_complement.len() != nminor
            || self.kminor_start.len() != nminor
        {
            return inconsistent(format!(
                "minor absorber variables of the {half} atmosphere differ in length"
            ));
        }

        for (i, limits) in self.minor_limits_gpt.outer_iter().enumerate() {
            let (first, last) = (limits[0], limits[1]);
            if first < 1 || last < first || last as usize > ngpt {
                return inconsistent(format!(
                    "minor interval {i} of the {half} atmosphere covers g-points [{first}, {last}]"
                ));
            }
            let start = self.kminor_start[i];
            if start < 1 || (start + last - first) as usize > ncontrib {
                return inconsistent(format!(
                    "minor interval {i} of the {half} atmosphere reaches past kminor_{half}"
                ));
            }
        }
        Ok(())
    }
}

impl KDistributionTables {
    /// Check that the dimensions of all the tables agree.
    pub fn check(&self) -> RteResult<()> {
        let ngas = self.gas_names.len();
        let nbnd = self.bnd_limits_gpt.dim().0;
        let npres = self.press_ref.len();
        let ntemp = self.temp_ref.len();
        let (nt, np, neta, ngpt) = self.kmajor.dim();

        if ngas == 0 {
            return inconsistent("no gases".into());
        }
        if npres < 2 || ntemp < 2 || neta < 2 {
            return inconsistent(format!(
                "need at least 2 pressures, temperatures and mixing fractions, got {npres}, {ntemp} and {neta}"
            ));
        }
        if !strictly_monotonic(&self.press_ref) {
            return inconsistent("press_ref is not strictly monotonic".into());
        }
        if !self.temp_ref.windows(2).into_iter().all(|w| w[1] > w[0]) {
            return inconsistent("temp_ref is not strictly ascending".into());
        }
        if (nt, np) != (ntemp, npres + 1) {
            return inconsistent(format!(
                "kmajor is {:?}, expected ({ntemp}, {}, _, _)",
                self.kmajor.dim(),
                npres + 1
            ));
        }
        if self.key_species.dim() != (nbnd, 2, 2) {
            return inconsistent(format!(
                "key_species is {:?}, expected ({nbnd}, 2, 2)",
                self.key_species.dim()
            ));
        }
        if self.key_species.iter().any(|&k| k < 0 || k as usize > ngas) {
            return inconsistent("key_species refers to an unknown gas".into());
        }
        if self.bnd_limits_wavenumber.dim() != (nbnd, 2) {
            return inconsistent(format!(
                "bnd_limits_wavenumber is {:?}, expected ({nbnd}, 2)",
                self.bnd_limits_wavenumber.dim()
            ));
        }
        if self.bnd_limits_gpt.iter().any(|&g| g < 1 || g as usize > ngpt) {
            return inconsistent(format!("bnd_limits_gpt reaches outside 1..={ngpt}"));
        }
        if self.vmr_ref.dim() != (ntemp, ngas + 1, 2) {
            return inconsistent(format!(
                "vmr_ref is {:?}, expected ({ntemp}, {}, 2)",
                self.vmr_ref.dim(),
                ngas + 1
            ));
        }
        if self.gas_minor.len() != self.identifier_minor.len() {
            return inconsistent("gas_minor and identifier_minor differ in length".into());
        }
        self.minor_lower.check("lower", ntemp, neta, ngpt)?;
        self.minor_upper.check("upper", ntemp, neta, ngpt)?;

        match (&self.rayl_lower, &self.rayl_upper) {
            (None, None) => {}
            (Some(lower), Some(upper)) => {
                if lower.dim() != (ntemp, neta, ngpt) || upper.dim() != (ntemp, neta, ngpt) {
                    return inconsistent(format!(
                        "Rayleigh tables are {:?} and {:?}, expected ({ntemp}, {neta}, {ngpt})",
                        lower.dim(),
                        upper.dim()
                    ));
                }
            }
            _ => return inconsistent("only one of rayl_lower and rayl_upper is given".into()),
        }

        match &self.source {
            SourceTables::Thermal {
                totplnk,
                plank_fraction,
            } => {
                if totplnk.dim().0 != nbnd || totplnk.dim().1 < 2 {
                    return inconsistent(format!(
                        "totplnk is {:?}, expected ({nbnd}, >= 2)",
                        totplnk.dim()
                    ));
                }
                if plank_fraction.dim() != self.kmajor.dim() {
                    return inconsistent(format!(
                        "plank_fraction is {:?}, kmajor is {:?}",
                        plank_fraction.dim(),
                        self.kmajor.dim()
                    ));
                }
            }
            SourceTables::Solar {
                solar_source_quiet,
                solar_source_facular,
                solar_source_sunspot,
                ..
            } => {
                if [solar_source_quiet, solar_source_facular, solar_source_sunspot]
                    .iter()
                    .any(|s| s.len() != ngpt)
                {
                    return inconsistent(format!("solar source terms must have {ngpt} g-points"));
                }
            }
        }
        Ok(())
    }
}
