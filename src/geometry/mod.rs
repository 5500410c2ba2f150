// dda_core - Core numerical engine for a discrete-dipole-approximation
// electromagnetic scattering solver
// Copyright (C) 2021 Julian Jeggle, Raphael Wittkowski

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Dipole occupancy grid and the per-process lattice derived from it.
//!
//! This module owns the geometric plumbing: materializing a dense
//! occupancy box from a [`ShapeDescriptor`], fixing the cubic spacing,
//! and slicing the result into the Z-slab each rank owns. The actual
//! formulae for predefined particle shapes (sphere, ellipsoid, cylinder,
//! ...) are out of scope — callers supply their own [`ShapeDescriptor`]
//! implementation as a plug-in.

mod read_shape;

pub use read_shape::ReadShape;

use crate::decomposition::partition_slab;
use crate::error::{DdaError, Result};
use crate::types::{Vec3, ROUND_ERR};

/// A dense box describing, for every lattice site, whether it is occupied
/// and (if so) which material it is made of.
#[derive(Debug, Clone)]
pub struct OccupancyGrid {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    /// `material[ix + nx*(iy + ny*iz)]`: `None` for void, `Some(material
    /// index)` for an occupied site.
    pub material: Vec<Option<u8>>,
}

impl OccupancyGrid {
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self { nx, ny, nz, material: vec![None; nx * ny * nz] }
    }

    #[inline(always)]
    pub fn index(&self, ix: usize, iy: usize, iz: usize) -> usize {
        ix + self.nx * (iy + self.ny * iz)
    }

    pub fn set(&mut self, ix: usize, iy: usize, iz: usize, material: u8) {
        let i = self.index(ix, iy, iz);
        self.material[i] = Some(material);
    }

    pub fn ndip_total(&self) -> usize {
        self.material.iter().filter(|m| m.is_some()).count()
    }

    pub fn nmat(&self) -> usize {
        self.material
            .iter()
            .filter_map(|m| *m)
            .map(|m| m as usize + 1)
            .max()
            .unwrap_or(0)
    }
}

/// A source of particle geometry. Implementations materialize the
/// occupancy grid for one particular shape; this crate ships only
/// [`ReadShape`] (geometry read verbatim from an input file), since the
/// predefined-shape formulae (sphere, cylinder, ...) are explicitly out
/// of scope.
pub trait ShapeDescriptor {
    fn occupancy(&self) -> Result<OccupancyGrid>;
}

/// The Z-slab and derived per-site arrays one process owns.
#[derive(Debug, Clone)]
pub struct Lattice {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    /// Dipole spacing, in whatever physical length unit `lambda` was
    /// given in.
    pub d: f64,
    pub ndip_total: usize,
    pub local_z0: usize,
    pub local_z1: usize,
    pub local_ndip: usize,
    /// Physical coordinate of each locally owned site, measured from the
    /// box centre, in the same units as `d`. Row order matches
    /// `material` and is lexicographic over `(z, y, x)`.
    pub dipole_coord: Vec<Vec3>,
    pub material: Vec<u8>,
}

impl Lattice {
    /// Build the lattice this rank owns from a materialized occupancy
    /// grid and a fixed dipole spacing.
    ///
    /// `d` should already reflect any requested volume correction (see
    /// [`resolve_spacing`]) — this function only validates and slices.
    pub fn from_occupancy(grid: &OccupancyGrid, d: f64, rank: usize, num_ranks: usize) -> Result<Lattice> {
        if grid.nx % 2 != 0 || grid.ny % 2 != 0 || grid.nz % 2 != 0 {
            return Err(DdaError::GeometryInconsistent(
                "grid dimensions must be even".into(),
            ));
        }
        if grid.nx < 16 || grid.ny < 16 || grid.nz < 16 {
            return Err(DdaError::GeometryInconsistent(
                "grid dimensions must be at least 16 in every direction".into(),
            ));
        }
        if !(d > 0.0) {
            return Err(DdaError::NumericRange(format!("dipole spacing must be positive, got {}", d)));
        }
        let ndip_total = grid.ndip_total();
        if ndip_total == 0 {
            return Err(DdaError::GeometryInconsistent("occupancy grid is empty".into()));
        }

        let (local_z0, local_z1) = partition_slab(grid.nz, num_ranks, rank);

        // Box centre, in grid-index units (the box spans [0, n) along each axis).
        let cx = (grid.nx as f64 - 1.0) / 2.0;
        let cy = (grid.ny as f64 - 1.0) / 2.0;
        let cz = (grid.nz as f64 - 1.0) / 2.0;

        let mut dipole_coord = Vec::new();
        let mut material = Vec::new();
        for iz in local_z0..local_z1 {
            for iy in 0..grid.ny {
                for ix in 0..grid.nx {
                    if let Some(mat) = grid.material[grid.index(ix, iy, iz)] {
                        dipole_coord.push(Vec3::new(
                            (ix as f64 - cx) * d,
                            (iy as f64 - cy) * d,
                            (iz as f64 - cz) * d,
                        ));
                        material.push(mat);
                    }
                }
            }
        }
        let local_ndip = dipole_coord.len();

        Ok(Lattice {
            nx: grid.nx,
            ny: grid.ny,
            nz: grid.nz,
            d,
            ndip_total,
            local_z0,
            local_z1,
            local_ndip,
            dipole_coord,
            material,
        })
    }
}

/// Resolve the dipole spacing `d` from `lambda`/`dpl`, optionally
/// rescaling it so that `ndip_total * d^3` matches a `nominal_volume`
/// exactly (the `-no_vol_cor` toggle). If both an explicit spacing and a
/// nominal volume are supplied and disagree by more than [`ROUND_ERR`]
/// relative, that is a [`DdaError::GeometryInconsistent`].
pub fn resolve_spacing(
    lambda: f64,
    dpl: f64,
    ndip_total: usize,
    nominal_volume: Option<f64>,
    volume_correction: bool,
) -> Result<f64> {
    let d_nominal = lambda / dpl;
    match (nominal_volume, volume_correction) {
        (Some(vol), true) => {
            if vol <= 0.0 {
                return Err(DdaError::NumericRange("nominal volume must be positive".into()));
            }
            let d_corrected = (vol / ndip_total as f64).cbrt();
            let rel_diff = (d_corrected - d_nominal).abs() / d_nominal;
            if rel_diff > 1e-2 {
                // A large disagreement usually means the occupancy grid
                // does not actually approximate the nominal shape.
                return Err(DdaError::GeometryInconsistent(format!(
                    "volume-corrected spacing {} differs from nominal spacing {} by {:.3}%",
                    d_corrected,
                    d_nominal,
                    rel_diff * 100.0
                )));
            }
            Ok(d_corrected)
        }
        _ => Ok(d_nominal),
    }
}
