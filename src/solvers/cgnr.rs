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

//! Conjugate gradient on the normal equations `A^H A x = A^H b`. Two
//! `MatVec` applications per iteration (forward and adjoint), robust but
//! the slowest of the four prescriptions since it effectively squares the
//! condition number.

use num_complex::Complex64;
use tracing::trace;

use super::{apply_hermitian_transpose, distributed_dot, CheckpointSink, KrylovSolver, MatVec, SolveOutcome, SolveStatus};
use crate::decomposition::Collectives;
use crate::error::Result;

#[derive(Debug, Default, Clone, Copy)]
pub struct Cgnr;

impl KrylovSolver for Cgnr {
    fn solve(
        &self,
        op: &dyn MatVec,
        b: &[Complex64],
        x0: Vec<Complex64>,
        eps: f64,
        max_iter: usize,
        collectives: &dyn Collectives,
        checkpoint: &mut dyn CheckpointSink,
    ) -> Result<SolveOutcome> {
        let n = op.len();
        let mut x = x0;
        let mut ax = vec![Complex64::new(0.0, 0.0); n];
        op.apply(&x, &mut ax)?;
        let mut r: Vec<Complex64> = b.iter().zip(ax.iter()).map(|(bi, axi)| bi - axi).collect();

        let mut z = vec![Complex64::new(0.0, 0.0); n];
        apply_hermitian_transpose(op, &r, &mut z)?;
        let mut p = z.clone();
        let mut z_norm2 = distributed_dot(collectives, &z, &z)?.re;

        let b_norm = crate::solvers::distributed_norm(collectives, b)?.max(1e-300);

        for iter in 0..max_iter {
            let mut ap = vec![Complex64::new(0.0, 0.0); n];
            op.apply(&p, &mut ap)?;
            let ap_norm2 = distributed_dot(collectives, &ap, &ap)?.re;
            if ap_norm2 < 1e-300 {
                return Ok(SolveOutcome { x, iterations: iter, residual_norm: f64::NAN, status: SolveStatus::Breakdown("||A p|| underflow") });
            }
            let alpha = z_norm2 / ap_norm2;

            for i in 0..n {
                x[i] += alpha * p[i];
                r[i] -= alpha * ap[i];
            }

            let residual_norm = crate::solvers::distributed_norm(collectives, &r)?;
            checkpoint.on_iteration(iter, &x, residual_norm);
            trace!(iter, residual_norm, "cgnr iteration");
            if residual_norm / b_norm <= eps {
                return Ok(SolveOutcome { x, iterations: iter + 1, residual_norm, status: SolveStatus::Converged });
            }

            let mut z_new = vec![Complex64::new(0.0, 0.0); n];
            apply_hermitian_transpose(op, &r, &mut z_new)?;
            let z_new_norm2 = distributed_dot(collectives, &z_new, &z_new)?.re;
            let beta = z_new_norm2 / z_norm2.max(1e-300);
            for i in 0..n {
                p[i] = z_new[i] + beta * p[i];
            }
            z = z_new;
            z_norm2 = z_new_norm2;
        }

        let residual_norm = crate::solvers::distributed_norm(collectives, &r)?;
        Ok(SolveOutcome { x, iterations: max_iter, residual_norm, status: SolveStatus::NotConverged })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decomposition::SingleProcessCollectives;

    /// A diagonal complex-symmetric operator (trivially `A^T == A`), used
    /// across the solver test suites as a known-answer linear system.
    struct DiagonalOp {
        diag: Vec<Complex64>,
    }

    impl MatVec for DiagonalOp {
        fn len(&self) -> usize {
            self.diag.len()
        }
        fn apply(&self, x: &[Complex64], y: &mut [Complex64]) -> Result<()> {
            for i in 0..self.diag.len() {
                y[i] = self.diag[i] * x[i];
            }
            Ok(())
        }
    }

    #[test]
    fn converges_on_diagonal_system() {
        let op = DiagonalOp { diag: vec![Complex64::new(2.0, 0.0), Complex64::new(1.0, 1.0), Complex64::new(0.5, -0.5)] };
        let x_true = vec![Complex64::new(1.0, 0.0), Complex64::new(0.0, 1.0), Complex64::new(2.0, -1.0)];
        let mut b = vec![Complex64::new(0.0, 0.0); 3];
        op.apply(&x_true, &mut b).unwrap();
        let collectives = SingleProcessCollectives;
        let outcome = Cgnr
            .solve(&op, &b, vec![Complex64::new(0.0, 0.0); 3], 1e-10, 100, &collectives, &mut crate::solvers::NoCheckpoint)
            .unwrap();
        assert_eq!(outcome.status, SolveStatus::Converged);
        for i in 0..3 {
            assert!((outcome.x[i] - x_true[i]).norm() < 1e-6);
        }
    }
}
