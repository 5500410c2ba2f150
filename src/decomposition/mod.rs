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

//! Domain decomposition and the collective operations every other
//! component is built on top of.
//!
//! The particle occupies a dense `Nx x Ny x Nz` box; every rank owns a
//! contiguous slab `[local_z0, local_z1)` along Z. [`partition_slab`] is
//! the single source of truth for that partition so that geometry,
//! the FFT MatVec and checkpoint restart all agree on who owns what.
//!
//! No MPI binding crate is used here: none of the example repositories
//! this crate was grown from depends on one, and fabricating bindings to
//! a library that was never actually vetted would be worse than not
//! having them. [`Collectives`] is the extension seam a real deployment
//! would implement against an MPI (or any other message-passing) library;
//! [`SingleProcessCollectives`] is the only backend shipped here, and is
//! what every test and single-rank user of this crate runs against.

use crate::error::{DdaError, Result};

/// Divide `n` into `num_ranks` nearly-equal contiguous chunks and return
/// the half-open range owned by `rank`. Earlier ranks get the larger
/// remainder chunk, matching the slab split a simple `n / num_ranks` with
/// leftover-to-the-front scheme would give.
pub fn partition_slab(n: usize, num_ranks: usize, rank: usize) -> (usize, usize) {
    assert!(rank < num_ranks, "rank {} out of range for {} ranks", rank, num_ranks);
    let base = n / num_ranks;
    let remainder = n % num_ranks;
    let start = rank * base + rank.min(remainder);
    let extra = if rank < remainder { 1 } else { 0 };
    let end = start + base + extra;
    (start, end)
}

/// The set of blocking collective operations the engine needs. Every
/// method here corresponds to one of the "operations that block/suspend"
/// named by the specification: the FFT MatVec's transpose is an
/// `all_to_all`, every inner product (Krylov residual norms, cross
/// sections) is an `all_reduce_sum`, the radiation-pressure pair sum needs
/// an `all_gather`, and run startup needs one `broadcast` plus one
/// `barrier`.
pub trait Collectives {
    /// Number of ranks taking part in this run.
    fn size(&self) -> usize;
    /// This process's rank, in `[0, size())`.
    fn rank(&self) -> usize;

    /// Sum `value` across all ranks and return the total to every rank.
    fn all_reduce_sum(&self, value: f64) -> Result<f64>;

    /// Sum an array element-wise across all ranks.
    fn all_reduce_sum_vec(&self, values: &[f64]) -> Result<Vec<f64>>;

    /// Redistribute `send` (one contiguous chunk per rank) into `recv`
    /// (every rank's chunk, in rank order). Used for the FFT's transposed
    /// stage.
    fn all_to_all(&self, send: &[num_complex::Complex64], recv: &mut [num_complex::Complex64]) -> Result<()>;

    /// Gather `local` (this rank's contribution) from every rank into one
    /// array, in rank order.
    fn all_gather(&self, local: &[f64]) -> Result<Vec<f64>>;

    /// Broadcast `value` from `root` to every rank.
    fn broadcast(&self, value: i64, root: usize) -> Result<i64>;

    /// Block until every rank has reached this call.
    fn barrier(&self) -> Result<()>;
}

/// The only [`Collectives`] backend shipped in this crate: a single
/// logical rank (`size() == 1`). Every "collective" degenerates to a
/// local no-op copy, which keeps all higher-level code identical whether
/// it will eventually run under a real multi-process backend or not.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcessCollectives;

impl Collectives for SingleProcessCollectives {
    fn size(&self) -> usize {
        1
    }

    fn rank(&self) -> usize {
        0
    }

    fn all_reduce_sum(&self, value: f64) -> Result<f64> {
        Ok(value)
    }

    fn all_reduce_sum_vec(&self, values: &[f64]) -> Result<Vec<f64>> {
        Ok(values.to_vec())
    }

    fn all_to_all(&self, send: &[num_complex::Complex64], recv: &mut [num_complex::Complex64]) -> Result<()> {
        if send.len() != recv.len() {
            return Err(DdaError::CollectiveFailure(format!(
                "all_to_all length mismatch: send={} recv={}",
                send.len(),
                recv.len()
            )));
        }
        recv.copy_from_slice(send);
        Ok(())
    }

    fn all_gather(&self, local: &[f64]) -> Result<Vec<f64>> {
        Ok(local.to_vec())
    }

    fn broadcast(&self, value: i64, root: usize) -> Result<i64> {
        if root != 0 {
            return Err(DdaError::CollectiveFailure(format!(
                "broadcast root {} invalid for a single-process run",
                root
            )));
        }
        Ok(value)
    }

    fn barrier(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_covers_every_index_exactly_once() {
        let n = 37;
        let num_ranks = 5;
        let mut seen = vec![false; n];
        for rank in 0..num_ranks {
            let (start, end) = partition_slab(n, num_ranks, rank);
            for i in start..end {
                assert!(!seen[i], "index {} covered twice", i);
                seen[i] = true;
            }
        }
        assert!(seen.iter().all(|&x| x), "some indices not covered");
    }

    #[test]
    fn partition_is_balanced() {
        let (start, end) = partition_slab(10, 1, 0);
        assert_eq!((start, end), (0, 10));
        let chunks: Vec<_> = (0..4).map(|r| partition_slab(10, 4, r)).collect();
        // sizes differ by at most one
        let sizes: Vec<usize> = chunks.iter().map(|(s, e)| e - s).collect();
        assert!(sizes.iter().max().unwrap() - sizes.iter().min().unwrap() <= 1);
    }

    #[test]
    fn single_process_collectives_are_identity() {
        let c = SingleProcessCollectives;
        assert_eq!(c.all_reduce_sum(3.5).unwrap(), 3.5);
        assert_eq!(c.all_gather(&[1.0, 2.0]).unwrap(), vec![1.0, 2.0]);
        assert_eq!(c.broadcast(42, 0).unwrap(), 42);
        c.barrier().unwrap();
    }
}
