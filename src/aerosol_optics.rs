//! Band-resolved aerosol optical properties from mass mixing ratios.
//!
//! Each aerosol species is looked up in one of two tables: hydrophobic
//! species by (band, type), hydrophilic species by (band, humidity class,
//! type). The species contributions are summed as extinction, scattering and
//! scattering-weighted asymmetry, then converted into a [`TwoStream`] with one
//! spectral point per band.

use log::debug;
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis, Zip};

use crate::error::{RteError, RteResult};
use crate::optical_props::{SpectralDisc, TwoStream};
use crate::Float;

/// Where a species' optical properties are tabulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AerosolTable {
    /// Column of the hydrophobic tables
    Hydrophobic(usize),
    /// Column of the hydrophilic tables
    Hydrophilic(usize),
}

/// An aerosol species and its table entry.
#[derive(Debug, Clone, PartialEq)]
pub struct AerosolSpecies {
    /// Lower-case name, as in the mass mixing ratio inputs
    pub name: String,
    /// Where its optical properties are tabulated
    pub table: AerosolTable,
}

impl AerosolSpecies {
    /// Species `name` with its table entry.
    pub fn new(name: &str, table: AerosolTable) -> Self {
        Self {
            name: name.to_string(),
            table,
        }
    }
}

/// The eleven species of the CAMS aerosol mass mixing ratios, `aermr01` to
/// `aermr11`, in that order.
///
/// Sea salt (three bins), dust (three bins), organic matter (hydrophilic and
/// hydrophobic), black carbon (twice, same table) and sulfate.
pub fn cams_species() -> Vec<AerosolSpecies> {
    use AerosolTable::{Hydrophilic, Hydrophobic};
    [
        ("aermr01", Hydrophilic(0)),
        ("aermr02", Hydrophilic(1)),
        ("aermr03", Hydrophilic(2)),
        ("aermr04", Hydrophobic(0)),
        ("aermr05", Hydrophobic(7)),
        ("aermr06", Hydrophobic(5)),
        ("aermr07", Hydrophilic(3)),
        ("aermr08", Hydrophobic(9)),
        ("aermr09", Hydrophobic(10)),
        ("aermr10", Hydrophobic(10)),
        ("aermr11", Hydrophilic(4)),
    ]
    .into_iter()
    .map(|(name, table)| AerosolSpecies::new(name, table))
    .collect()
}

/// Mass extinction, single-scattering albedo, and asymmetry of one table.
#[derive(Debug, Clone)]
pub struct AerosolTables<A> {
    /// Mass extinction coefficient, m²/kg
    pub mext: A,
    /// Single-scattering albedo
    pub ssa: A,
    /// Asymmetry parameter
    pub g: A,
}

/// Aerosol lookup tables on a set of bands.
#[derive(Debug, Clone)]
pub struct AerosolOptics {
    disc: SpectralDisc,
    rh_upper: Vec<Float>,
    /// (band, type)
    phobic: AerosolTables<Array2<Float>>,
    /// (band, humidity class, type)
    philic: AerosolTables<Array3<Float>>,
    species: Vec<AerosolSpecies>,
}

impl AerosolOptics {
    /// Build the optics from tables on the bands `band_lims_wvn`.
    ///
    /// `rh_upper` holds the ascending upper relative-humidity bound of each
    /// humidity class of the hydrophilic tables.
    pub fn new(
        band_lims_wvn: Vec<[Float; 2]>,
        rh_upper: Vec<Float>,
        phobic: AerosolTables<Array2<Float>>,
        philic: AerosolTables<Array3<Float>>,
        species: Vec<AerosolSpecies>,
    ) -> RteResult<Self> {
        let disc = SpectralDisc::by_band(band_lims_wvn)?;
        let nband = disc.nband();

        if rh_upper.is_empty() || rh_upper.windows(2).any(|w| w[1] < w[0]) {
            return Err(RteError::InconsistentTable(
                "humidity classes must be non-empty and ascending".into(),
            ));
        }
        let phobic_dim = phobic.mext.dim();
        if phobic_dim.0 != nband || phobic.ssa.dim() != phobic_dim || phobic.g.dim() != phobic_dim {
            return Err(RteError::InconsistentTable(format!(
                "hydrophobic tables must be ({nband}, ntype), mext is {phobic_dim:?}"
            )));
        }
        let philic_dim = philic.mext.dim();
        if (philic_dim.0, philic_dim.1) != (nband, rh_upper.len())
            || philic.ssa.dim() != philic_dim
            || philic.g.dim() != philic_dim
        {
            return Err(RteError::InconsistentTable(format!(
                "hydrophilic tables must be ({nband}, {}, ntype), mext is {philic_dim:?}",
                rh_upper.len()
            )));
        }
        for s in &species {
            let in_range = match s.table {
                AerosolTable::Hydrophobic(i) => i < phobic_dim.1,
                AerosolTable::Hydrophilic(i) => i < philic_dim.2,
            };
            if !in_range {
                return Err(RteError::InconsistentTable(format!(
                    "species `{}` refers to a missing table entry {:?}",
                    s.name, s.table
                )));
            }
        }

        Ok(Self {
            disc,
            rh_upper,
            phobic,
            philic,
            species,
        })
    }

    /// Band-resolved spectral discretization of the output.
    pub fn spectral_disc(&self) -> &SpectralDisc {
        &self.disc
    }

    /// The species, in the order of the mass mixing ratio inputs.
    pub fn species(&self) -> &[AerosolSpecies] {
        &self.species
    }

    /// Humidity class of relative humidity `rh`: the first class whose upper
    /// bound is not below `rh`, or the last class.
    pub fn rh_class(&self, rh: Float) -> usize {
        self.rh_upper
            .iter()
            .position(|&upper| upper >= rh)
            .unwrap_or(self.rh_upper.len() - 1)
    }

    /// Two-stream optical properties of the aerosol mixture.
    ///
    /// `mmr` is shaped (species, column, layer) in the order of
    /// [`species`](Self::species), in kg/kg. `rh` is the relative humidity
    /// and `dpg` the mass of air per unit area, Δp/g in kg/m², both (column,
    /// layer).
    pub fn aerosol_optics(
        &self,
        mmr: ArrayView3<'_, Float>,
        rh: ArrayView2<'_, Float>,
        dpg: ArrayView2<'_, Float>,
    ) -> RteResult<TwoStream> {
        const EPS: Float = Float::EPSILON;

        let (nspecies, ncol, nlay) = mmr.dim();
        if nspecies != self.species.len() || rh.dim() != (ncol, nlay) || dpg.dim() != (ncol, nlay) {
            return Err(RteError::InconsistentInputs(format!(
                "expected {} species and matching humidity and air mass, got mmr {:?}, rh {:?}, dpg {:?}",
                self.species.len(),
                mmr.dim(),
                rh.dim(),
                dpg.dim()
            )));
        }
        debug!("input shapes are consistent");

        let nband = self.disc.nband();
        let mut tau = Array3::zeros((ncol, nlay, nband));
        let mut ssa = Array3::zeros((ncol, nlay, nband));
        let mut g = Array3::zeros((ncol, nlay, nband));

        Zip::from(tau.lanes_mut(Axis(2)))
            .and(ssa.lanes_mut(Axis(2)))
            .and(g.lanes_mut(Axis(2)))
            .and(mmr.lanes(Axis(0)))
            .and(rh)
            .and(dpg)
            .par_for_each(|mut tau, mut ssa, mut g, mmr, &rh, &dpg| {
                let ihum = self.rh_class(rh);
                for band in 0..nband {
                    let mut ext = 0.;
                    let mut sca = 0.;
                    let mut sca_g = 0.;
                    for (species, &mmr) in self.species.iter().zip(mmr) {
                        let (mext, w, asy) = match species.table {
                            AerosolTable::Hydrophobic(i) => (
                                self.phobic.mext[[band, i]],
                                self.phobic.ssa[[band, i]],
                                self.phobic.g[[band, i]],
                            ),
                            AerosolTable::Hydrophilic(i) => (
                                self.philic.mext[[band, ihum, i]],
                                self.philic.ssa[[band, ihum, i]],
                                self.philic.g[[band, ihum, i]],
                            ),
                        };
                        let od = mmr * dpg * mext;
                        ext += od;
                        sca += od * w;
                        sca_g += od * w * asy;
                    }
                    tau[band] = ext;
                    ssa[band] = sca / ext.max(EPS);
                    g[band] = sca_g / sca.max(EPS);
                }
            });

        TwoStream::from_arrays(self.disc.clone(), tau, ssa, g)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use ndarray::{arr2, arr3, Array2, Array3};

    use super::*;
    use crate::optical_props::OpticalProps;

    /// Two bands, two hydrophobic types and one hydrophilic type with two
    /// humidity classes.
    fn optics() -> AerosolOptics {
        let phobic = AerosolTables {
            mext: arr2(&[[1000., 2000.], [500., 800.]]),
            ssa: arr2(&[[0.9, 0.5], [0.8, 0.4]]),
            g: arr2(&[[0.7, 0.6], [0.65, 0.55]]),
        };
        let philic = AerosolTables {
            mext: arr3(&[[[3000.], [6000.]], [[1500.], [3000.]]]),
            ssa: arr3(&[[[1.0], [0.99]], [[0.98], [0.97]]]),
            g: arr3(&[[[0.8], [0.75]], [[0.7], [0.72]]]),
        };
        let species = vec![
            AerosolSpecies::new("dust", AerosolTable::Hydrophobic(0)),
            AerosolSpecies::new("soot", AerosolTable::Hydrophobic(1)),
            AerosolSpecies::new("sea_salt", AerosolTable::Hydrophilic(0)),
        ];
        AerosolOptics::new(
            vec![[820., 2600.], [2600., 4000.]],
            vec![0.5, 0.9],
            phobic,
            philic,
            species,
        )
        .unwrap()
    }

    #[test]
    fn humidity_classes_are_clamped() {
        let optics = optics();
        assert_eq!(optics.rh_class(0.), 0);
        assert_eq!(optics.rh_class(0.5), 0);
        assert_eq!(optics.rh_class(0.51), 1);
        assert_eq!(optics.rh_class(0.9), 1);
        assert_eq!(optics.rh_class(1.2), 1);
    }

    #[test]
    fn single_species() {
        let optics = optics();
        let mut mmr = Array3::zeros((3, 1, 2));
        mmr[[0, 0, 0]] = 1e-8;
        let rh = arr2(&[[0.3, 0.3]]);
        let dpg = arr2(&[[1000., 1000.]]);
        let props = optics.aerosol_optics(mmr.view(), rh.view(), dpg.view()).unwrap();

        assert_eq!(props.ngpt(), 2);
        assert_relative_eq!(props.tau()[[0, 0, 0]], 1e-2, max_relative = 1e-12);
        assert_relative_eq!(props.tau()[[0, 0, 1]], 5e-3, max_relative = 1e-12);
        assert_relative_eq!(props.ssa()[[0, 0, 0]], 0.9, max_relative = 1e-12);
        assert_relative_eq!(props.g()[[0, 0, 1]], 0.65, max_relative = 1e-12);

        // Aerosol-free layer
        assert_eq!(props.tau()[[0, 1, 0]], 0.);
        assert_eq!(props.ssa()[[0, 1, 0]], 0.);
        assert_eq!(props.g()[[0, 1, 0]], 0.);
    }

    #[test]
    fn mixture_weights_by_scattering() {
        let optics = optics();
        let mut mmr = Array3::zeros((3, 2, 1));
        mmr.index_axis_mut(Axis(0), 1).fill(1e-8);
        mmr.index_axis_mut(Axis(0), 2).fill(1e-8);
        // One dry and one humid column
        let rh = arr2(&[[0.2], [0.95]]);
        let dpg = Array2::from_elem((2, 1), 100.);
        let props = optics.aerosol_optics(mmr.view(), rh.view(), dpg.view()).unwrap();

        // Band 0, dry: soot 2e-3 at ssa 0.5, sea salt 3e-3 at ssa 1
        let (tau, ssa, g) = (props.tau(), props.ssa(), props.g());
        assert_relative_eq!(tau[[0, 0, 0]], 5e-3, max_relative = 1e-12);
        assert_relative_eq!(ssa[[0, 0, 0]], 4e-3 / 5e-3, max_relative = 1e-12);
        assert_relative_eq!(
            g[[0, 0, 0]],
            (1e-3 * 0.6 + 3e-3 * 0.8) / 4e-3,
            max_relative = 1e-12
        );
        // Band 0, humid: sea salt from the upper humidity class
        assert_relative_eq!(tau[[1, 0, 0]], 8e-3, max_relative = 1e-12);
    }

    #[test]
    fn inconsistent_tables_are_rejected() {
        let phobic = AerosolTables {
            mext: Array2::zeros((2, 1)),
            ssa: Array2::zeros((2, 1)),
            g: Array2::zeros((2, 1)),
        };
        let philic = AerosolTables {
            mext: Array3::zeros((2, 3, 1)),
            ssa: Array3::zeros((2, 3, 1)),
            g: Array3::zeros((2, 3, 1)),
        };
        let result = AerosolOptics::new(
            vec![[0., 1.], [1., 2.]],
            vec![0.5, 0.9],
            phobic.clone(),
            philic.clone(),
            vec![],
        );
        assert!(matches!(result, Err(RteError::InconsistentTable(_))));

        let result = AerosolOptics::new(
            vec![[0., 1.], [1., 2.]],
            vec![0.3, 0.6, 0.9],
            phobic,
            philic,
            vec![AerosolSpecies::new("x", AerosolTable::Hydrophobic(4))],
        );
        assert!(result.is_err());
    }

    #[test]
    fn cams_table_entries() {
        let species = cams_species();
        assert_eq!(species.len(), 11);
        assert_eq!(species[4].table, AerosolTable::Hydrophobic(7));
        assert_eq!(species[8].table, species[9].table);
        assert_eq!(species[10].name, "aermr11");
    }
}
