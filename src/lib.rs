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

//! Core numerical engine for a discrete-dipole-approximation (DDA)
//! electromagnetic scattering solver: a dipole lattice, an FFT-accelerated
//! matrix-free interaction operator, a family of Krylov solvers for the
//! complex-symmetric linear system, incident-beam generators, and the
//! post-solution cross-section/force/orientation-averaging machinery
//! built on top of them.
//!
//! Usage
//! -----
//! ```
//! use num_complex::Complex64;
//! use dda_core::config::RunConfigBuilder;
//! use dda_core::geometry::{Lattice, OccupancyGrid};
//! use dda_core::polarizability::all_material_alphas;
//! use dda_core::interaction::FftMatVec;
//! use dda_core::solvers::{KrylovSolver, NoCheckpoint, QmrCs};
//! use dda_core::decomposition::SingleProcessCollectives;
//! use dda_core::beam::incident_field;
//!
//! let config = RunConfigBuilder::new()
//!     .lambda(1.0)
//!     .dpl(10.0)
//!     .refr_index(vec![Complex64::new(1.5, 0.01)])
//!     .build()
//!     .unwrap();
//!
//! let mut grid = OccupancyGrid::new(16, 16, 16);
//! for iz in 0..16 { for iy in 0..16 { for ix in 0..16 { grid.set(ix, iy, iz, 0); } } }
//! let lattice = Lattice::from_occupancy(&grid, config.d, 0, 1).unwrap();
//! let alphas = all_material_alphas(&config).unwrap();
//!
//! let matvec = FftMatVec::new(&config, &lattice, &alphas).unwrap();
//! let rhs: Vec<Complex64> = lattice
//!     .dipole_coord
//!     .iter()
//!     .flat_map(|c| incident_field(&config, c))
//!     .collect();
//! let x0 = vec![Complex64::new(0.0, 0.0); rhs.len()];
//! let collectives = SingleProcessCollectives;
//! let outcome = QmrCs.solve(&matvec, &rhs, x0, config.eps, config.max_iter, &collectives, &mut NoCheckpoint).unwrap();
//! let _ = outcome.status;
//! ```

pub mod beam;
pub mod checkpoint;
pub mod config;
pub mod decomposition;
pub mod error;
pub mod geometry;
pub mod integration;
pub mod interaction;
pub mod orientation;
pub mod polarizability;
pub mod postprocess;
pub mod solvers;
pub mod types;
