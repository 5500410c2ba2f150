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

//! Quasi-minimal residual for complex-symmetric operators. Builds the
//! same complex-symmetric Lanczos process [`super::bicg_cs`] uses, but
//! incrementally QR-factors the resulting tridiagonal system with plane
//! rotations (in the bilinear `c^2+s^2=1` convention appropriate to a
//! symmetric, not Hermitian, tridiagonal matrix) instead of solving it
//! directly. That gives a quasi-minimized residual estimate at every step
//! essentially for free, and is the most numerically robust of the four
//! solvers on indefinite complex-symmetric systems, which is why it is
//! the default [`crate::config::IterativeMethod`].

use num_complex::Complex64;
use tracing::trace;

use super::{distributed_norm, CheckpointSink, KrylovSolver, MatVec, SolveOutcome, SolveStatus};
use crate::decomposition::Collectives;
use crate::error::Result;

const BREAKDOWN_EPS: f64 = 1e-300;

fn bilinear(collectives: &dyn Collectives, a: &[Complex64], b: &[Complex64]) -> Result<Complex64> {
    let local_re: f64 = a.iter().zip(b.iter()).map(|(x, y)| (*x * *y).re).sum();
    let local_im: f64 = a.iter().zip(b.iter()).map(|(x, y)| (*x * *y).im).sum();
    let re = collectives.all_reduce_sum(local_re)?;
    let im = collectives.all_reduce_sum(local_im)?;
    Ok(Complex64::new(re, im))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct QmrCs;

impl KrylovSolver for QmrCs {
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
        let r0: Vec<Complex64> = b.iter().zip(ax.iter()).map(|(bi, axi)| bi - axi).collect();
        let b_norm = distributed_norm(collectives, b)?.max(1e-300);

        let beta1 = distributed_norm(collectives, &r0)?;
        if beta1 / b_norm <= eps {
            return Ok(SolveOutcome { x, iterations: 0, residual_norm: beta1, status: SolveStatus::Converged });
        }

        let mut v_prev = vec![Complex64::new(0.0, 0.0); n];
        let mut v_curr: Vec<Complex64> = r0.iter().map(|c| c / beta1).collect();
        let mut beta_prev = Complex64::new(0.0, 0.0);

        let (mut c_prev2, mut s_prev2) = (Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0));
        let (mut c_prev1, mut s_prev1) = (Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0));
        let mut w_prev2 = vec![Complex64::new(0.0, 0.0); n];
        let mut w_prev1 = vec![Complex64::new(0.0, 0.0); n];
        let mut phibar = Complex64::new(beta1, 0.0);

        for iter in 0..max_iter {
            let mut av = vec![Complex64::new(0.0, 0.0); n];
            op.apply(&v_curr, &mut av)?;
            let alpha = bilinear(collectives, &v_curr, &av)?;

            let mut w: Vec<Complex64> = (0..n)
                .map(|i| av[i] - alpha * v_curr[i] - beta_prev * v_prev[i])
                .collect();
            let beta_curr = Complex64::new(distributed_norm(collectives, &w)?, 0.0);
            if beta_curr.norm() < BREAKDOWN_EPS {
                let residual_norm = phibar.norm();
                return Ok(SolveOutcome { x, iterations: iter, residual_norm, status: SolveStatus::Breakdown("Lanczos breakdown (beta underflow)") });
            }
            for wi in w.iter_mut() {
                *wi /= beta_curr;
            }
            let v_next = w;

            // Apply the two previous plane rotations to this column of the
            // tridiagonal, then compute a fresh rotation eliminating beta_curr.
            let delta_hat = s_prev2 * beta_prev;
            let gamma_hat = c_prev2 * beta_prev;
            let delta = c_prev1 * gamma_hat + s_prev1 * alpha;
            let gamma_bar = -s_prev1 * gamma_hat + c_prev1 * alpha;

            let denom = (gamma_bar * gamma_bar + beta_curr * beta_curr).sqrt();
            if denom.norm() < BREAKDOWN_EPS {
                let residual_norm = phibar.norm();
                return Ok(SolveOutcome { x, iterations: iter, residual_norm, status: SolveStatus::Breakdown("rotation collapse") });
            }
            let c_curr = gamma_bar / denom;
            let s_curr = beta_curr / denom;
            let gamma = denom;

            let w_curr: Vec<Complex64> = (0..n)
                .map(|i| (v_curr[i] - delta * w_prev1[i] - delta_hat * w_prev2[i]) / gamma)
                .collect();

            let phi = c_curr * phibar;
            phibar = -s_curr * phibar;

            for i in 0..n {
                x[i] += phi * w_curr[i];
            }

            let residual_norm = phibar.norm();
            checkpoint.on_iteration(iter, &x, residual_norm);
            trace!(iter, residual_norm, "qmr-cs iteration");
            if residual_norm / b_norm <= eps {
                return Ok(SolveOutcome { x, iterations: iter + 1, residual_norm, status: SolveStatus::Converged });
            }

            v_prev = v_curr;
            v_curr = v_next;
            beta_prev = beta_curr;
            w_prev2 = w_prev1;
            w_prev1 = w_curr;
            c_prev2 = c_prev1;
            s_prev2 = s_prev1;
            c_prev1 = c_curr;
            s_prev1 = s_curr;
        }

        Ok(SolveOutcome { x, iterations: max_iter, residual_norm: phibar.norm(), status: SolveStatus::NotConverged })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decomposition::SingleProcessCollectives;
    use crate::solvers::{KrylovSolver, MatVec, NoCheckpoint, SolveStatus};

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
        let op = DiagonalOp { diag: vec![Complex64::new(4.0, 1.0), Complex64::new(0.6, -0.4), Complex64::new(2.0, 2.0)] };
        let x_true = vec![Complex64::new(0.5, -0.5), Complex64::new(1.0, 0.0), Complex64::new(-1.0, 1.0)];
        let mut b = vec![Complex64::new(0.0, 0.0); 3];
        op.apply(&x_true, &mut b).unwrap();
        let collectives = SingleProcessCollectives;
        let outcome = QmrCs
            .solve(&op, &b, vec![Complex64::new(0.0, 0.0); 3], 1e-10, 100, &collectives, &mut NoCheckpoint)
            .unwrap();
        assert_eq!(outcome.status, SolveStatus::Converged);
        for i in 0..3 {
            assert!((outcome.x[i] - x_true[i]).norm() < 1e-6);
        }
    }
}
