//! Reduction of g-point fluxes to broadband and per-band fields.
//!
//! Fluxes are summed over g-points in ascending order. The net flux is
//! always down minus up and is recomputed whenever up or down change, so it
//! can't be set on its own.

use std::ops::Range;

use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3, Axis};

use crate::error::{RteError, RteResult};
use crate::optical_props::SpectralDisc;
use crate::Float;

pub(crate) fn sum_gpoints(gpt_flux: ArrayView3<'_, Float>) -> Array2<Float> {
    gpt_flux.fold_axis(Axis(2), 0., |&acc, &f| acc + f)
}

fn sum_bands(gpt_flux: ArrayView3<'_, Float>, disc: &SpectralDisc) -> Array3<Float> {
    let (ncol, nlev, _) = gpt_flux.dim();
    let mut bnd_flux = Array3::zeros((ncol, nlev, disc.nband()));
    for (band, gpts) in disc.band_lims_gpt().iter().enumerate() {
        bnd_flux
            .index_axis_mut(Axis(2), band)
            .assign(&sum_gpoints(gpt_flux.slice(s![.., .., gpts.clone()])));
    }
    bnd_flux
}

fn check_shapes(
    gpt_flux_up: ArrayView3<'_, Float>,
    gpt_flux_dn: ArrayView3<'_, Float>,
    gpt_flux_dn_dir: Option<ArrayView3<'_, Float>>,
) -> RteResult<()> {
    let shape = gpt_flux_up.dim();
    if gpt_flux_dn.dim() != shape || gpt_flux_dn_dir.is_some_and(|dir| dir.dim() != shape) {
        return Err(RteError::InconsistentInputs(
            "upward, downward and direct fluxes differ in shape".into(),
        ));
    }
    Ok(())
}

/// Fluxes summed over all g-points, (column, level), in W/m².
#[derive(Debug, Clone, PartialEq)]
pub struct FluxesBroadband {
    flux_up: Array2<Float>,
    flux_dn: Array2<Float>,
    flux_dn_dir: Option<Array2<Float>>,
    flux_net: Array2<Float>,
}

impl FluxesBroadband {
    /// Zero fluxes, with a direct component when `with_direct`.
    pub fn new(ncol: usize, nlev: usize, with_direct: bool) -> Self {
        Self {
            flux_up: Array2::zeros((ncol, nlev)),
            flux_dn: Array2::zeros((ncol, nlev)),
            flux_dn_dir: with_direct.then(|| Array2::zeros((ncol, nlev))),
            flux_net: Array2::zeros((ncol, nlev)),
        }
    }

    /// Sum (column, level, g-point) fluxes over the g-points.
    pub fn reduce(
        gpt_flux_up: ArrayView3<'_, Float>,
        gpt_flux_dn: ArrayView3<'_, Float>,
        gpt_flux_dn_dir: Option<ArrayView3<'_, Float>>,
    ) -> RteResult<Self> {
        check_shapes(gpt_flux_up, gpt_flux_dn, gpt_flux_dn_dir)?;
        let flux_up = sum_gpoints(gpt_flux_up);
        let flux_dn = sum_gpoints(gpt_flux_dn);
        let flux_net = &flux_dn - &flux_up;
        Ok(Self {
            flux_up,
            flux_dn,
            flux_dn_dir: gpt_flux_dn_dir.map(sum_gpoints),
            flux_net,
        })
    }

    /// Number of columns.
    pub fn ncol(&self) -> usize {
        self.flux_up.dim().0
    }

    /// Number of levels.
    pub fn nlev(&self) -> usize {
        self.flux_up.dim().1
    }

    /// Upward flux.
    pub fn flux_up(&self) -> ArrayView2<'_, Float> {
        self.flux_up.view()
    }

    /// Total downward flux.
    pub fn flux_dn(&self) -> ArrayView2<'_, Float> {
        self.flux_dn.view()
    }

    /// Direct-beam part of the downward flux, shortwave only.
    pub fn flux_dn_dir(&self) -> Option<ArrayView2<'_, Float>> {
        self.flux_dn_dir.as_ref().map(Array2::view)
    }

    /// Down minus up.
    pub fn flux_net(&self) -> ArrayView2<'_, Float> {
        self.flux_net.view()
    }

    /// Copy the fluxes of a block of columns into `cols`.
    pub fn assign_columns(&mut self, cols: Range<usize>, block: &FluxesBroadband) -> RteResult<()> {
        if cols.end > self.ncol()
            || block.flux_up.dim() != (cols.len(), self.nlev())
            || block.flux_dn_dir.is_some() != self.flux_dn_dir.is_some()
        {
            return Err(RteError::InconsistentInputs(format!(
                "block of shape {:?} doesn't fit columns {cols:?}",
                block.flux_up.dim()
            )));
        }
        self.flux_up.slice_mut(s![cols.clone(), ..]).assign(&block.flux_up);
        self.flux_dn.slice_mut(s![cols.clone(), ..]).assign(&block.flux_dn);
        if let (Some(all), Some(dir)) = (&mut self.flux_dn_dir, &block.flux_dn_dir) {
            all.slice_mut(s![cols.clone(), ..]).assign(dir);
        }
        let net = &block.flux_dn - &block.flux_up;
        self.flux_net.slice_mut(s![cols, ..]).assign(&net);
        Ok(())
    }
}

/// Fluxes summed over all g-points and over the g-points of each band.
///
/// Per-band fields are (column, level, band).
#[derive(Debug, Clone, PartialEq)]
pub struct FluxesByband {
    broadband: FluxesBroadband,
    bnd_flux_up: Array3<Float>,
    bnd_flux_dn: Array3<Float>,
    bnd_flux_dn_dir: Option<Array3<Float>>,
    bnd_flux_net: Array3<Float>,
}

impl FluxesByband {
    /// Zero fluxes, with a direct component when `with_direct`.
    pub fn new(ncol: usize, nlev: usize, nband: usize, with_direct: bool) -> Self {
        Self {
            broadband: FluxesBroadband::new(ncol, nlev, with_direct),
            bnd_flux_up: Array3::zeros((ncol, nlev, nband)),
            bnd_flux_dn: Array3::zeros((ncol, nlev, nband)),
            bnd_flux_dn_dir: with_direct.then(|| Array3::zeros((ncol, nlev, nband))),
            bnd_flux_net: Array3::zeros((ncol, nlev, nband)),
        }
    }

    /// Sum (column, level, g-point) fluxes over all g-points and over the
    /// g-point range of each band of `disc`.
    pub fn reduce(
        gpt_flux_up: ArrayView3<'_, Float>,
        gpt_flux_dn: ArrayView3<'_, Float>,
        gpt_flux_dn_dir: Option<ArrayView3<'_, Float>>,
        disc: &SpectralDisc,
    ) -> RteResult<Self> {
        let broadband = FluxesBroadband::reduce(gpt_flux_up, gpt_flux_dn, gpt_flux_dn_dir)?;
        let ngpt = gpt_flux_up.dim().2;
        if ngpt != disc.ngpt() {
            return Err(RteError::InconsistentInputs(format!(
                "fluxes have {ngpt} g-points, the spectral discretization {}",
                disc.ngpt()
            )));
        }
        let bnd_flux_up = sum_bands(gpt_flux_up, disc);
        let bnd_flux_dn = sum_bands(gpt_flux_dn, disc);
        let bnd_flux_net = &bnd_flux_dn - &bnd_flux_up;
        Ok(Self {
            broadband,
            bnd_flux_up,
            bnd_flux_dn,
            bnd_flux_dn_dir: gpt_flux_dn_dir.map(|dir| sum_bands(dir, disc)),
            bnd_flux_net,
        })
    }

    /// The fluxes summed over all bands.
    pub fn broadband(&self) -> &FluxesBroadband {
        &self.broadband
    }

    /// Number of bands.
    pub fn nband(&self) -> usize {
        self.bnd_flux_up.dim().2
    }

    /// Upward flux per band.
    pub fn bnd_flux_up(&self) -> ArrayView3<'_, Float> {
        self.bnd_flux_up.view()
    }

    /// Total downward flux per band.
    pub fn bnd_flux_dn(&self) -> ArrayView3<'_, Float> {
        self.bnd_flux_dn.view()
    }

    /// Direct-beam downward flux per band, shortwave only.
    pub fn bnd_flux_dn_dir(&self) -> Option<ArrayView3<'_, Float>> {
        self.bnd_flux_dn_dir.as_ref().map(Array3::view)
    }

    /// Down minus up per band.
    pub fn bnd_flux_net(&self) -> ArrayView3<'_, Float> {
        self.bnd_flux_net.view()
    }

    /// Copy the fluxes of a block of columns into `cols`.
    pub fn assign_columns(&mut self, cols: Range<usize>, block: &FluxesByband) -> RteResult<()> {
        if block.nband() != self.nband() {
            return Err(RteError::InconsistentInputs(format!(
                "block has {} bands, expected {}",
                block.nband(),
                self.nband()
            )));
        }
        self.broadband.assign_columns(cols.clone(), &block.broadband)?;
        self.bnd_flux_up
            .slice_mut(s![cols.clone(), .., ..])
            .assign(&block.bnd_flux_up);
        self.bnd_flux_dn
            .slice_mut(s![cols.clone(), .., ..])
            .assign(&block.bnd_flux_dn);
        if let (Some(all), Some(dir)) = (&mut self.bnd_flux_dn_dir, &block.bnd_flux_dn_dir) {
            all.slice_mut(s![cols.clone(), .., ..]).assign(dir);
        }
        let net = &block.bnd_flux_dn - &block.bnd_flux_up;
        self.bnd_flux_net.slice_mut(s![cols, .., ..]).assign(&net);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::{arr3, Array3};

    use super::*;

    fn three_bands() -> SpectralDisc {
        SpectralDisc::new(
            vec![[10., 250.], [250., 500.], [500., 3000.]],
            vec![0..2, 2..3, 3..6],
        )
        .unwrap()
    }

    fn gpt_flux(ncol: usize, nlev: usize, ngpt: usize, offset: Float) -> Array3<Float> {
        Array3::from_shape_fn((ncol, nlev, ngpt), |(c, l, g)| {
            offset + 0.5 * c as Float + 0.25 * l as Float + g as Float
        })
    }

    #[test]
    fn two_point_band_sum() {
        let disc = SpectralDisc::new(vec![[10., 3000.]], vec![0..2]).unwrap();
        let up = arr3(&[[[2.0, 3.0]]]);
        let dn = Array3::zeros((1, 1, 2));
        let fluxes = FluxesByband::reduce(up.view(), dn.view(), None, &disc).unwrap();
        assert_eq!(fluxes.broadband().flux_up()[[0, 0]], 5.0);
        assert_eq!(fluxes.bnd_flux_up()[[0, 0, 0]], 5.0);
        assert_eq!(fluxes.broadband().flux_net()[[0, 0]], -5.0);
    }

    #[test]
    fn net_is_down_minus_up() {
        let up = gpt_flux(3, 4, 6, 1.);
        let dn = gpt_flux(3, 4, 6, 7.);
        let fluxes = FluxesBroadband::reduce(up.view(), dn.view(), None).unwrap();
        assert_eq!(fluxes.flux_net(), &fluxes.flux_dn() - &fluxes.flux_up());
        assert!(fluxes.flux_dn_dir().is_none());
        // Each g-point is 6 W/m² more downward
        assert_abs_diff_eq!(fluxes.flux_net()[[2, 3]], 36., epsilon = 1e-12);
    }

    #[test]
    fn bands_partition_the_broadband_flux() {
        let disc = three_bands();
        let up = gpt_flux(2, 3, 6, 1.);
        let dn = gpt_flux(2, 3, 6, 2.);
        let dir = gpt_flux(2, 3, 6, 0.);
        let fluxes = FluxesByband::reduce(up.view(), dn.view(), Some(dir.view()), &disc).unwrap();

        let band_total = |f: ArrayView3<'_, Float>| f.sum_axis(Axis(2));
        let broadband = fluxes.broadband();
        for (by_band, total) in [
            (fluxes.bnd_flux_up(), broadband.flux_up()),
            (fluxes.bnd_flux_dn(), broadband.flux_dn()),
            (fluxes.bnd_flux_net(), broadband.flux_net()),
            (fluxes.bnd_flux_dn_dir().unwrap(), broadband.flux_dn_dir().unwrap()),
        ] {
            for (a, b) in band_total(by_band).iter().zip(total) {
                assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
            }
        }
        // Band 2 holds g-points 3, 4 and 5
        assert_abs_diff_eq!(fluxes.bnd_flux_up()[[0, 0, 2]], 15., epsilon = 1e-12);
    }

    #[test]
    fn mismatched_fluxes_are_rejected() {
        let up = gpt_flux(2, 3, 6, 1.);
        let dn = gpt_flux(2, 3, 5, 1.);
        assert!(matches!(
            FluxesBroadband::reduce(up.view(), dn.view(), None),
            Err(RteError::InconsistentInputs(_))
        ));

        let disc = SpectralDisc::new(vec![[10., 3000.]], vec![0..4]).unwrap();
        assert!(matches!(
            FluxesByband::reduce(up.view(), up.view(), None, &disc),
            Err(RteError::InconsistentInputs(_))
        ));
    }

    #[test]
    fn blocks_are_assembled_with_net() {
        let disc = three_bands();
        let up = gpt_flux(5, 3, 6, 1.);
        let dn = gpt_flux(5, 3, 6, 4.);
        let whole = FluxesByband::reduce(up.view(), dn.view(), None, &disc).unwrap();

        let mut assembled = FluxesByband::new(5, 3, 3, false);
        for cols in [0..2, 2..4, 4..5] {
            let block = FluxesByband::reduce(
                up.slice(s![cols.clone(), .., ..]),
                dn.slice(s![cols.clone(), .., ..]),
                None,
                &disc,
            )
            .unwrap();
            assembled.assign_columns(cols, &block).unwrap();
        }
        assert_eq!(assembled, whole);

        let block = FluxesBroadband::new(2, 3, false);
        let mut fluxes = FluxesBroadband::new(5, 3, false);
        assert!(fluxes.assign_columns(4..6, &block).is_err());
    }
}
