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

//! Crate-wide error type.
//!
//! Every fallible entry point in this crate returns `Result<T, DdaError>`.
//! Solver non-convergence is deliberately *not* one of these variants: a
//! Krylov solver that exhausts `max_iter` still returns `Ok(SolveOutcome)`
//! with `status: SolveStatus::NotConverged` (see [`crate::solvers`]), since
//! the driver is expected to still write out whatever quantities it can.

use thiserror::Error;

/// Error kinds surfaced by the engine.
#[derive(Error, Debug)]
pub enum DdaError {
    /// A configuration value was out of its allowed range (not a parse
    /// failure of command-line text, which is an external concern, but
    /// e.g. a negative wavelength reaching [`crate::config::RunConfig`]).
    #[error("argument out of range: {0}")]
    ArgumentParse(String),

    /// An input file (shape list, angle parameter block, ...) could not be
    /// opened.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// An input file was opened but its contents did not match the
    /// expected format.
    #[error("malformed input in {file}: {reason}")]
    FileFormat { file: String, reason: String },

    /// A numeric quantity fell outside a physically or numerically valid
    /// range (e.g. a grid spacing that rounds to zero).
    #[error("numeric value out of range: {0}")]
    NumericRange(String),

    /// The occupancy grid, its slab decomposition, or its derived
    /// quantities are mutually inconsistent.
    #[error("geometry is inconsistent: {0}")]
    GeometryInconsistent(String),

    /// A buffer of the requested size could not be allocated.
    #[error("allocation of {0} elements failed")]
    MemoryAllocation(usize),

    /// Two configuration choices are individually valid but mutually
    /// exclusive (e.g. the second-order interaction kernel combined with
    /// reduced-FFT storage or multi-material anisotropy).
    #[error("incompatible configuration: {0}")]
    Incompatibility(String),

    /// A Krylov solver detected a near-zero pivot/denominator it cannot
    /// safely divide by and aborted the current solve.
    #[error("solver breakdown: {0}")]
    SolverBreakdown(&'static str),

    /// A collective operation (all-to-all, all-reduce, all-gather,
    /// broadcast, barrier) failed or was observed to diverge between
    /// ranks.
    #[error("collective operation failed: {0}")]
    CollectiveFailure(String),

    /// A checkpoint snapshot could not be restored: wrong rank count,
    /// wrong format version, or corrupt payload.
    #[error("checkpoint incompatible: {0}")]
    CheckpointIncompatible(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DdaError>;
