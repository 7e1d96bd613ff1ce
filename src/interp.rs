use crate::error::{require_positive, Error, Result};
use crate::grid::{FieldSample, WindGrid};
use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Maps continuous positions to wind and turbulence on a `WindGrid`.
///
/// The scheme is chosen once per run. Positions outside of the grid are
/// clamped onto its boundary, so sampling always yields the value of some
/// valid cell or a weighted mix of valid cells.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Interpolation {
    /// Value of the enclosing cell.
    NearestCell,
    /// Horizontal wind of the column at `reference_height`, scaled with
    /// `(z / reference_height)^exponent`. Turbulence of the enclosing cell.
    PowerLaw { reference_height: f64, exponent: f64 },
    /// Weighted mix of the eight surrounding cell centres. Along axes with a
    /// single cell, and in the half cell next to the domain boundary, this
    /// degrades to the nearest cell value.
    TriLinear,
}

impl Default for Interpolation {
    fn default() -> Self {
        Interpolation::TriLinear
    }
}

impl Interpolation {
    pub fn validate(&self) -> Result<()> {
        if let Interpolation::PowerLaw {
            reference_height,
            exponent,
        } = *self
        {
            require_positive("reference_height", reference_height)?;
            if !exponent.is_finite() || exponent < 0.0 {
                return Err(Error::invalid("exponent", exponent, "must not be negative"));
            }
        }
        Ok(())
    }

    pub fn sample(&self, grid: &WindGrid, position: DVec3) -> FieldSample {
        match *self {
            Interpolation::NearestCell => nearest_cell(grid, position),
            Interpolation::PowerLaw {
                reference_height,
                exponent,
            } => power_law(grid, position, reference_height, exponent),
            Interpolation::TriLinear => tri_linear(grid, position),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Interpolation::NearestCell => "nearest cell",
            Interpolation::PowerLaw { .. } => "power law",
            Interpolation::TriLinear => "tri-linear",
        }
    }
}

fn nearest_cell(grid: &WindGrid, position: DVec3) -> FieldSample {
    let [i, j, k] = grid.enclosing_cell(position);
    *grid.cell(i, j, k)
}

fn power_law(grid: &WindGrid, position: DVec3, reference_height: f64, exponent: f64) -> FieldSample {
    let position = grid.clamp(position);
    let [i, j, k] = grid.enclosing_cell(position);
    let [_, _, k_ref] = grid.enclosing_cell(DVec3::new(position.x, position.y, reference_height));

    let reference = grid.cell(i, j, k_ref).mean;
    let factor = (position.z / reference_height).powf(exponent);

    FieldSample {
        mean: DVec3::new(reference.x * factor, reference.y * factor, 0.0),
        turbulence: grid.cell(i, j, k).turbulence,
    }
}

/// Lower stencil index and weight of the upper neighbour along one axis.
///
/// `s` is the position in units of cells, measured from the first cell centre.
fn stencil(s: f64, n: usize) -> (usize, usize, f64) {
    if n < 2 {
        return (0, 0, 0.0);
    }

    let lower = (s.floor().max(0.0) as usize).min(n - 2);
    let weight = (s - lower as f64).max(0.0).min(1.0);
    (lower, lower + 1, weight)
}

fn tri_linear(grid: &WindGrid, position: DVec3) -> FieldSample {
    let [nx, ny, nz] = grid.cell_counts();
    let s = grid.clamp(position) / grid.spacing() - DVec3::splat(0.5);

    let (i0, i1, wx) = stencil(s.x, nx);
    let (j0, j1, wy) = stencil(s.y, ny);
    let (k0, k1, wz) = stencil(s.z, nz);

    let corners = [
        (i0, j0, k0, (1.0 - wx) * (1.0 - wy) * (1.0 - wz)),
        (i1, j0, k0, wx * (1.0 - wy) * (1.0 - wz)),
        (i0, j1, k0, (1.0 - wx) * wy * (1.0 - wz)),
        (i1, j1, k0, wx * wy * (1.0 - wz)),
        (i0, j0, k1, (1.0 - wx) * (1.0 - wy) * wz),
        (i1, j0, k1, wx * (1.0 - wy) * wz),
        (i0, j1, k1, (1.0 - wx) * wy * wz),
        (i1, j1, k1, wx * wy * wz),
    ];

    corners
        .iter()
        .fold(FieldSample::default(), |acc, &(i, j, k, w)| {
            acc + *grid.cell(i, j, k) * w
        })
}
