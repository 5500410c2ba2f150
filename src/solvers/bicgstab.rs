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

//! Stabilized bi-conjugate gradient. One `MatVec` plus one shadow `MatVec`
//! per iteration; guards `|rho|` and `|omega|` against underflow and
//! reports a non-fatal breakdown instead of dividing by (near) zero.

use num_complex::Complex64;
use tracing::{trace, warn};

use super::{distributed_dot, distributed_norm, CheckpointSink, KrylovSolver, MatVec, SolveOutcome, SolveStatus};
use crate::decomposition::Collectives;
use crate::error::Result;

const BREAKDOWN_EPS: f64 = 1e-300;

#[derive(Debug, Default, Clone, Copy)]
pub struct BiCgStab;

impl KrylovSolver for BiCgStab {
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
        let r_hat = r.clone();

        let b_norm = distributed_norm(collectives, b)?.max(1e-300);
        let mut rho_prev = Complex64::new(1.0, 0.0);
        let mut alpha = Complex64::new(1.0, 0.0);
        let mut omega = Complex64::new(1.0, 0.0);
        let mut v = vec![Complex64::new(0.0, 0.0); n];
        let mut p = vec![Complex64::new(0.0, 0.0); n];

        for iter in 0..max_iter {
            let rho = distributed_dot(collectives, &r_hat, &r)?;
            if rho.norm() < BREAKDOWN_EPS {
                warn!(iter, "bicgstab: rho underflow");
                let residual_norm = distributed_norm(collectives, &r)?;
                return Ok(SolveOutcome { x, iterations: iter, residual_norm, status: SolveStatus::Breakdown("|rho| underflow") });
            }
            if omega.norm() < BREAKDOWN_EPS {
                warn!(iter, "bicgstab: omega underflow");
                let residual_norm = distributed_norm(collectives, &r)?;
                return Ok(SolveOutcome { x, iterations: iter, residual_norm, status: SolveStatus::Breakdown("|omega| underflow") });
            }
            let beta = (rho / rho_prev) * (alpha / omega);
            for i in 0..n {
                p[i] = r[i] + beta * (p[i] - omega * v[i]);
            }

            op.apply(&p, &mut v)?;
            let rhat_v = distributed_dot(collectives, &r_hat, &v)?;
            if rhat_v.norm() < BREAKDOWN_EPS {
                let residual_norm = distributed_norm(collectives, &r)?;
                return Ok(SolveOutcome { x, iterations: iter, residual_norm, status: SolveStatus::Breakdown("shadow orthogonality collapsed") });
            }
            alpha = rho / rhat_v;

            let mut s = vec![Complex64::new(0.0, 0.0); n];
            for i in 0..n {
                s[i] = r[i] - alpha * v[i];
            }
            let s_norm = distributed_norm(collectives, &s)?;
            if s_norm / b_norm <= eps {
                for i in 0..n {
                    x[i] += alpha * p[i];
                }
                checkpoint.on_iteration(iter, &x, s_norm);
                return Ok(SolveOutcome { x, iterations: iter + 1, residual_norm: s_norm, status: SolveStatus::Converged });
            }

            let mut t = vec![Complex64::new(0.0, 0.0); n];
            op.apply(&s, &mut t)?;
            let t_dot_t = distributed_dot(collectives, &t, &t)?.re;
            if t_dot_t < BREAKDOWN_EPS {
                let residual_norm = distributed_norm(collectives, &r)?;
                return Ok(SolveOutcome { x, iterations: iter, residual_norm, status: SolveStatus::Breakdown("||t|| underflow") });
            }
            omega = distributed_dot(collectives, &t, &s)? / t_dot_t;

            for i in 0..n {
                x[i] += alpha * p[i] + omega * s[i];
                r[i] = s[i] - omega * t[i];
            }

            let residual_norm = distributed_norm(collectives, &r)?;
            checkpoint.on_iteration(iter, &x, residual_norm);
            trace!(iter, residual_norm, "bicgstab iteration");
            if residual_norm / b_norm <= eps {
                return Ok(SolveOutcome { x, iterations: iter + 1, residual_norm, status: SolveStatus::Converged });
            }
            rho_prev = rho;
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
        let op = DiagonalOp { diag: vec![Complex64::new(3.0, 0.5), Complex64::new(1.0, -2.0), Complex64::new(0.8, 0.2)] };
        let x_true = vec![Complex64::new(-1.0, 0.5), Complex64::new(2.0, 0.0), Complex64::new(0.0, -3.0)];
        let mut b = vec![Complex64::new(0.0, 0.0); 3];
        op.apply(&x_true, &mut b).unwrap();
        let collectives = SingleProcessCollectives;
        let outcome = BiCgStab
            .solve(&op, &b, vec![Complex64::new(0.0, 0.0); 3], 1e-10, 100, &collectives, &mut crate::solvers::NoCheckpoint)
            .unwrap();
        assert_eq!(outcome.status, SolveStatus::Converged);
        for i in 0..3 {
            assert!((outcome.x[i] - x_true[i]).norm() < 1e-6);
        }
    }
}
