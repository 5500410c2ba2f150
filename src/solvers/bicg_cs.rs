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

//! Bi-conjugate gradient specialized for complex-symmetric operators
//! (`A^T == A`, not Hermitian). Because the shadow system of generic BiCG
//! is then just the original system's transpose solved with the same
//! operator, the shadow Lanczos vectors collapse onto the primary ones —
//! one `MatVec` per iteration and half the stored vectors of generic
//! BiCG. This is the "conjugate orthogonal CG" (COCG) formulation, using
//! the bilinear form `a^T b` (no conjugation) rather than the Hermitian
//! inner product throughout.

use num_complex::Complex64;
use tracing::trace;

use super::{distributed_norm, CheckpointSink, KrylovSolver, MatVec, SolveOutcome, SolveStatus};
use crate::decomposition::Collectives;
use crate::error::Result;

const BREAKDOWN_EPS: f64 = 1e-300;

/// Distributed complex-symmetric bilinear form `sum(a_i * b_i)` (no
/// conjugation), the natural inner product for complex-symmetric Lanczos.
fn distributed_bilinear(collectives: &dyn Collectives, a: &[Complex64], b: &[Complex64]) -> Result<Complex64> {
    let local_re: f64 = a.iter().zip(b.iter()).map(|(x, y)| (*x * *y).re).sum();
    let local_im: f64 = a.iter().zip(b.iter()).map(|(x, y)| (*x * *y).im).sum();
    let re = collectives.all_reduce_sum(local_re)?;
    let im = collectives.all_reduce_sum(local_im)?;
    Ok(Complex64::new(re, im))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BiCgCs;

impl KrylovSolver for BiCgCs {
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
        let mut p = r.clone();
        let b_norm = distributed_norm(collectives, b)?.max(1e-300);
        let mut rr = distributed_bilinear(collectives, &r, &r)?;

        for iter in 0..max_iter {
            let mut ap = vec![Complex64::new(0.0, 0.0); n];
            op.apply(&p, &mut ap)?;
            let p_ap = distributed_bilinear(collectives, &p, &ap)?;
            if p_ap.norm() < BREAKDOWN_EPS {
                let residual_norm = distributed_norm(collectives, &r)?;
                return Ok(SolveOutcome { x, iterations: iter, residual_norm, status: SolveStatus::Breakdown("p^T A p underflow") });
            }
            let alpha = rr / p_ap;

            for i in 0..n {
                x[i] += alpha * p[i];
                r[i] -= alpha * ap[i];
            }

            let residual_norm = distributed_norm(collectives, &r)?;
            checkpoint.on_iteration(iter, &x, residual_norm);
            trace!(iter, residual_norm, "bicg-cs iteration");
            if residual_norm / b_norm <= eps {
                return Ok(SolveOutcome { x, iterations: iter + 1, residual_norm, status: SolveStatus::Converged });
            }

            let rr_new = distributed_bilinear(collectives, &r, &r)?;
            if rr.norm() < BREAKDOWN_EPS {
                return Ok(SolveOutcome { x, iterations: iter, residual_norm, status: SolveStatus::Breakdown("r^T r underflow") });
            }
            let beta = rr_new / rr;
            for i in 0..n {
                p[i] = r[i] + beta * p[i];
            }
            rr = rr_new;
        }

        let residual_norm = distributed_norm(collectives, &r)?;
        Ok(SolveOutcome { x, iterations: max_iter, residual_norm, status: SolveStatus::NotConverged })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decomposition::SingleProcessCollectives;

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
        let op = DiagonalOp { diag: vec![Complex64::new(1.5, 0.3), Complex64::new(2.0, -0.7), Complex64::new(0.9, 0.1)] };
        let x_true = vec![Complex64::new(1.0, 1.0), Complex64::new(-2.0, 0.5), Complex64::new(0.3, -0.3)];
        let mut b = vec![Complex64::new(0.0, 0.0); 3];
        op.apply(&x_true, &mut b).unwrap();
        let collectives = SingleProcessCollectives;
        let outcome = BiCgCs
            .solve(&op, &b, vec![Complex64::new(0.0, 0.0); 3], 1e-10, 100, &collectives, &mut crate::solvers::NoCheckpoint)
            .unwrap();
        assert_eq!(outcome.status, SolveStatus::Converged);
        for i in 0..3 {
            assert!((outcome.x[i] - x_true[i]).norm() < 1e-6);
        }
    }
}
