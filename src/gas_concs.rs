//! Gas concentrations as volume mixing ratios.

use std::collections::HashMap;
use std::ops::Range;

use ndarray::{s, Array2, ArrayView2};

use crate::error::{RteError, RteResult};
use crate::Float;

/// Volume mixing ratio of one gas.
#[derive(Debug, Clone, PartialEq)]
pub enum Vmr {
    /// One value for the whole atmosphere
    Scalar(Float),
    /// One value per (column, layer)
    Field(Array2<Float>),
}

/// Volume mixing ratios keyed by lower-case gas name.
#[derive(Debug, Clone, Default)]
pub struct GasConcs {
    concs: HashMap<String, Vmr>,
    /// (columns, layers) shared by all the fields, once one has been set
    shape: Option<(usize, usize)>,
}

// NaN fails the comparison as well
#[allow(clippy::neg_cmp_op_on_partial_ord)]
fn check_range(name: &str, mut values: impl Iterator<Item = Float>) -> RteResult<()> {
    if values.any(|v| !(v >= 0. && v <= 1.)) {
        return Err(RteError::InvalidVmr(name.to_owned()));
    }
    Ok(())
}

impl GasConcs {
    /// No gases.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a constant volume mixing ratio for `name`.
    pub fn set_vmr_scalar(&mut self, name: &str, vmr: Float) -> RteResult<()> {
        check_range(name, std::iter::once(vmr))?;
        self.concs.insert(name.to_lowercase(), Vmr::Scalar(vmr));
        Ok(())
    }

    /// Set a (column, layer) volume mixing ratio field for `name`.
    pub fn set_vmr(&mut self, name: &str, vmr: Array2<Float>) -> RteResult<()> {
        check_range(name, vmr.iter().copied())?;
        match self.shape {
            Some(shape) if shape != vmr.dim() => {
                return Err(RteError::InconsistentInputs(format!(
                    "vmr of `{name}` has shape {:?}, other gases have {shape:?}",
                    vmr.dim()
                )));
            }
            _ => self.shape = Some(vmr.dim()),
        }
        self.concs.insert(name.to_lowercase(), Vmr::Field(vmr));
        Ok(())
    }

    /// Whether `name` has a concentration.
    pub fn contains(&self, name: &str) -> bool {
        self.concs.contains_key(&name.to_lowercase())
    }

    /// Names of all gases with a concentration.
    pub fn gas_names(&self) -> impl Iterator<Item = &str> {
        self.concs.keys().map(String::as_str)
    }

    /// The stored value for `name`.
    pub fn vmr(&self, name: &str) -> Option<&Vmr> {
        self.concs.get(&name.to_lowercase())
    }

    /// The volume mixing ratio of `name` on `ncol` columns and `nlay` layers,
    /// broadcasting scalars.
    pub fn get_vmr(&self, name: &str, ncol: usize, nlay: usize) -> RteResult<Option<Array2<Float>>> {
        match self.vmr(name) {
            None => Ok(None),
            Some(Vmr::Scalar(v)) => Ok(Some(Array2::from_elem((ncol, nlay), *v))),
            Some(Vmr::Field(field)) if field.dim() == (ncol, nlay) => Ok(Some(field.clone())),
            Some(Vmr::Field(field)) => Err(RteError::InconsistentInputs(format!(
                "vmr of `{name}` has shape {:?}, expected ({ncol}, {nlay})",
                field.dim()
            ))),
        }
    }

    /// Borrow the field of `name` if it is stored per column and layer.
    pub fn field(&self, name: &str) -> Option<ArrayView2<'_, Float>> {
        match self.vmr(name)? {
            Vmr::Field(field) => Some(field.view()),
            Vmr::Scalar(_) => None,
        }
    }

    /// (columns, layers) of the fields, if any field has been set.
    pub fn shape(&self) -> Option<(usize, usize)> {
        self.shape
    }

    /// Copy of the concentrations for the columns in `cols`.
    pub fn subset(&self, cols: Range<usize>) -> Self {
        let concs = self
            .concs
            .iter()
            .map(|(name, vmr)| {
                let vmr = match vmr {
                    Vmr::Scalar(v) => Vmr::Scalar(*v),
                    Vmr::Field(field) => Vmr::Field(field.slice(s![cols.clone(), ..]).to_owned()),
                };
                (name.clone(), vmr)
            })
            .collect();
        Self {
            concs,
            shape: self.shape.map(|(_, nlay)| (cols.len(), nlay)),
        }
    }
}
