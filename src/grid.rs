use crate::error::{require_positive, Error, Result};
use glam::DVec3;
use std::ops::{Add, Mul};

/// Single-point turbulence statistics as produced by the turbulence closure.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Turbulence {
    /// Reynolds stress tensor components in m² s⁻².
    pub txx: f64,
    pub txy: f64,
    pub txz: f64,
    pub tyy: f64,
    pub tyz: f64,
    pub tzz: f64,
    /// Turbulent kinetic energy in m² s⁻².
    pub tke: f64,
    /// Kolmogorov constant times dissipation rate in m² s⁻³.
    pub co_eps: f64,
}

impl Turbulence {
    /// Isotropic turbulence with variance `sigma2` on every axis.
    pub fn isotropic(sigma2: f64, co_eps: f64) -> Self {
        Turbulence {
            txx: sigma2,
            tyy: sigma2,
            tzz: sigma2,
            tke: 1.5 * sigma2,
            co_eps,
            ..Turbulence::default()
        }
    }

    /// Velocity variances along x, y and z.
    pub fn variances(&self) -> DVec3 {
        DVec3::new(self.txx, self.tyy, self.tzz)
    }
}

impl Add for Turbulence {
    type Output = Turbulence;

    fn add(self, o: Turbulence) -> Turbulence {
        Turbulence {
            txx: self.txx + o.txx,
            txy: self.txy + o.txy,
            txz: self.txz + o.txz,
            tyy: self.tyy + o.tyy,
            tyz: self.tyz + o.tyz,
            tzz: self.tzz + o.tzz,
            tke: self.tke + o.tke,
            co_eps: self.co_eps + o.co_eps,
        }
    }
}

impl Mul<f64> for Turbulence {
    type Output = Turbulence;

    fn mul(self, w: f64) -> Turbulence {
        Turbulence {
            txx: self.txx * w,
            txy: self.txy * w,
            txz: self.txz * w,
            tyy: self.tyy * w,
            tyz: self.tyz * w,
            tzz: self.tzz * w,
            tke: self.tke * w,
            co_eps: self.co_eps * w,
        }
    }
}

/// Wind and turbulence at one point, either stored per cell or interpolated.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FieldSample {
    /// Mean velocity in m s⁻¹.
    pub mean: DVec3,
    pub turbulence: Turbulence,
}

impl FieldSample {
    pub fn new(mean: DVec3, turbulence: Turbulence) -> Self {
        FieldSample { mean, turbulence }
    }

    pub fn is_finite(&self) -> bool {
        let t = &self.turbulence;
        self.mean.is_finite()
            && [t.txx, t.txy, t.txz, t.tyy, t.tyz, t.tzz, t.tke, t.co_eps]
                .iter()
                .all(|v| v.is_finite())
    }
}

impl Add for FieldSample {
    type Output = FieldSample;

    fn add(self, o: FieldSample) -> FieldSample {
        FieldSample {
            mean: self.mean + o.mean,
            turbulence: self.turbulence + o.turbulence,
        }
    }
}

impl Mul<f64> for FieldSample {
    type Output = FieldSample;

    fn mul(self, w: f64) -> FieldSample {
        FieldSample {
            mean: self.mean * w,
            turbulence: self.turbulence * w,
        }
    }
}

/// Structured, cell-centred wind and turbulence grid.
///
/// Cell `(i, j, k)` spans `[i dx, (i + 1) dx] x [j dy, (j + 1) dy] x [k dz, (k + 1) dz]`
/// and is stored at `i + j nx + k nx ny`.
#[derive(Debug, Clone)]
pub struct WindGrid {
    nx: usize,
    ny: usize,
    nz: usize,
    spacing: DVec3,
    cells: Vec<FieldSample>,
}

impl WindGrid {
    /// A grid of calm, non-turbulent cells.
    pub fn new(cell_counts: [usize; 3], spacing: [f64; 3]) -> Result<Self> {
        Self::from_fn(cell_counts, spacing, |_| FieldSample::default())
    }

    pub fn uniform(cell_counts: [usize; 3], spacing: [f64; 3], sample: FieldSample) -> Result<Self> {
        Self::from_fn(cell_counts, spacing, |_| sample)
    }

    /// Fills every cell by evaluating `f` at the cell centre.
    pub fn from_fn<F>(cell_counts: [usize; 3], spacing: [f64; 3], mut f: F) -> Result<Self>
    where
        F: FnMut(DVec3) -> FieldSample,
    {
        let [nx, ny, nz] = cell_counts;
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(Error::invalid(
                "cell_counts",
                format!("{:?}", cell_counts),
                "every axis needs at least one cell",
            ));
        }

        let spacing = DVec3::new(
            require_positive("dx", spacing[0])?,
            require_positive("dy", spacing[1])?,
            require_positive("dz", spacing[2])?,
        );

        let mut grid = WindGrid {
            nx,
            ny,
            nz,
            spacing,
            cells: Vec::with_capacity(nx * ny * nz),
        };

        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let centre = grid.cell_centre(i, j, k);
                    grid.cells.push(f(centre));
                }
            }
        }

        Ok(grid)
    }

    pub fn cell_counts(&self) -> [usize; 3] {
        [self.nx, self.ny, self.nz]
    }

    pub fn spacing(&self) -> DVec3 {
        self.spacing
    }

    /// Upper corner of the domain, the lower one is the origin.
    pub fn extent(&self) -> DVec3 {
        DVec3::new(
            self.nx as f64 * self.spacing.x,
            self.ny as f64 * self.spacing.y,
            self.nz as f64 * self.spacing.z,
        )
    }

    pub fn cell_centre(&self, i: usize, j: usize, k: usize) -> DVec3 {
        DVec3::new(i as f64 + 0.5, j as f64 + 0.5, k as f64 + 0.5) * self.spacing
    }

    fn idx(&self, i: usize, j: usize, k: usize) -> usize {
        assert!(i < self.nx && j < self.ny && k < self.nz);
        i + j * self.nx + k * self.nx * self.ny
    }

    pub fn cell(&self, i: usize, j: usize, k: usize) -> &FieldSample {
        &self.cells[self.idx(i, j, k)]
    }

    pub fn set_cell(&mut self, i: usize, j: usize, k: usize, sample: FieldSample) {
        let idx = self.idx(i, j, k);
        self.cells[idx] = sample;
    }

    pub fn contains(&self, position: DVec3) -> bool {
        let extent = self.extent();
        position.cmpge(DVec3::ZERO).all() && position.cmple(extent).all()
    }

    /// Nearest point inside the domain, NaN components end up on the lower face.
    pub fn clamp(&self, position: DVec3) -> DVec3 {
        let extent = self.extent();
        let clamp_axis = |v: f64, max: f64| if v >= 0.0 { v.min(max) } else { 0.0 };
        DVec3::new(
            clamp_axis(position.x, extent.x),
            clamp_axis(position.y, extent.y),
            clamp_axis(position.z, extent.z),
        )
    }

    /// Indices of the cell enclosing `position` after clamping it into the domain.
    pub fn enclosing_cell(&self, position: DVec3) -> [usize; 3] {
        let scaled = self.clamp(position) / self.spacing;
        let axis = |v: f64, n: usize| (v.floor() as usize).min(n - 1);
        [
            axis(scaled.x, self.nx),
            axis(scaled.y, self.ny),
            axis(scaled.z, self.nz),
        ]
    }
}
