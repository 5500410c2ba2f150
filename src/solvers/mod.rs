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

//! Krylov solver traits shared by all four iterative methods.
//!
//! [`MatVec`] plays the role the `ODEIVP::rhs` callback plays for an
//! explicit-ODE integrator: the single expensive operation every solver
//! calls once (or twice, for CGNR) per iteration. [`KrylovSolver`] plays
//! the role `ExplicitODESolver` plays: it owns the iteration loop and
//! termination logic and calls back into the operator.

mod cgnr;
mod bicgstab;
mod bicg_cs;
mod qmr_cs;

pub use cgnr::Cgnr;
pub use bicgstab::BiCgStab;
pub use bicg_cs::BiCgCs;
pub use qmr_cs::QmrCs;

use num_complex::Complex64;

use crate::config::IterativeMethod;
use crate::decomposition::Collectives;
use crate::error::Result;

/// The linear operator a Krylov solver iterates against: `A x = (alpha^-1
/// - G) x`, a complex-symmetric (not Hermitian) operator of size
/// `3*local_ndip`.
pub trait MatVec {
    /// Length of the vectors this operator acts on (this rank's share).
    fn len(&self) -> usize;

    /// `y = A x`.
    fn apply(&self, x: &[Complex64], y: &mut [Complex64]) -> Result<()>;

    /// `y = A^T x`. Since `A` is complex-symmetric, `A^T == A`; solvers
    /// that only ever need `A` (BiCGStab, BiCG-CS, QMR-CS) can ignore
    /// this. CGNR's normal-equations formulation needs the conjugate
    /// transpose `A^H x = conj(A(conj(x)))`, which callers build from
    /// this method rather than requiring a fifth trait method.
    fn apply_transpose(&self, x: &[Complex64], y: &mut [Complex64]) -> Result<()> {
        self.apply(x, y)
    }
}

/// Conjugate-transpose application, derived from [`MatVec::apply_transpose`]
/// for any complex-symmetric operator: `A^H x = conj(A(conj(x)))`.
pub fn apply_hermitian_transpose(op: &dyn MatVec, x: &[Complex64], y: &mut [Complex64]) -> Result<()> {
    let conj_x: Vec<Complex64> = x.iter().map(|c| c.conj()).collect();
    let mut tmp = vec![Complex64::new(0.0, 0.0); y.len()];
    op.apply_transpose(&conj_x, &mut tmp)?;
    for (yi, ti) in y.iter_mut().zip(tmp.iter()) {
        *yi = ti.conj();
    }
    Ok(())
}

/// Why a solve call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Converged,
    NotConverged,
    Breakdown(&'static str),
}

/// The result of one solver invocation.
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub x: Vec<Complex64>,
    pub iterations: usize,
    pub residual_norm: f64,
    pub status: SolveStatus,
}

/// Invoked once per iteration boundary; lets a caller persist solver state
/// without the solver itself knowing anything about files or schedules.
pub trait CheckpointSink {
    fn on_iteration(&mut self, iteration: usize, x: &[Complex64], residual_norm: f64);
}

/// A [`CheckpointSink`] that does nothing, for callers that don't need
/// mid-solve checkpointing.
pub struct NoCheckpoint;

impl CheckpointSink for NoCheckpoint {
    fn on_iteration(&mut self, _iteration: usize, _x: &[Complex64], _residual_norm: f64) {}
}

/// Distributed Hermitian inner product `sum(conj(a_i) * b_i)` reduced
/// across ranks, used by every solver for residual/step-size norms.
pub fn distributed_dot(
    collectives: &dyn Collectives,
    a: &[Complex64],
    b: &[Complex64],
) -> Result<Complex64> {
    let local_re: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x.conj() * y).re).sum();
    let local_im: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x.conj() * y).im).sum();
    let re = collectives.all_reduce_sum(local_re)?;
    let im = collectives.all_reduce_sum(local_im)?;
    Ok(Complex64::new(re, im))
}

/// Distributed Euclidean norm, `sqrt(sum |a_i|^2)` across ranks.
pub fn distributed_norm(collectives: &dyn Collectives, a: &[Complex64]) -> Result<f64> {
    let local: f64 = a.iter().map(|c| c.norm_sqr()).sum();
    let total = collectives.all_reduce_sum(local)?;
    Ok(total.sqrt())
}

/// Shared contract for all four iterative methods.
pub trait KrylovSolver {
    #[allow(clippy::too_many_arguments)]
    fn solve(
        &self,
        op: &dyn MatVec,
        b: &[Complex64],
        x0: Vec<Complex64>,
        eps: f64,
        max_iter: usize,
        collectives: &dyn Collectives,
        checkpoint: &mut dyn CheckpointSink,
    ) -> Result<SolveOutcome>;
}

/// Select the [`KrylovSolver`] named by a [`RunConfig`][crate::config::RunConfig]'s
/// `iterative_method`, so a caller driving a run from `RunConfig` alone
/// never has to duplicate this match itself.
pub fn solver_for(method: IterativeMethod) -> Box<dyn KrylovSolver> {
    match method {
        IterativeMethod::Cgnr => Box::new(Cgnr),
        IterativeMethod::BiCgStab => Box::new(BiCgStab),
        IterativeMethod::BiCgCs => Box::new(BiCgCs),
        IterativeMethod::QmrCs => Box::new(QmrCs),
    }
}

#[cfg(test)]
mod dispatch_tests {
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
    fn solver_for_dispatches_every_method_to_a_working_solver() {
        let op = DiagonalOp { diag: vec![Complex64::new(2.0, 0.5), Complex64::new(1.0, -1.0)] };
        let x_true = vec![Complex64::new(1.0, 0.0), Complex64::new(0.0, 2.0)];
        let mut b = vec![Complex64::new(0.0, 0.0); 2];
        op.apply(&x_true, &mut b).unwrap();
        let collectives = SingleProcessCollectives;

        for method in [
            IterativeMethod::Cgnr,
            IterativeMethod::BiCgStab,
            IterativeMethod::BiCgCs,
            IterativeMethod::QmrCs,
        ] {
            let solver = solver_for(method);
            let outcome = solver
                .solve(&op, &b, vec![Complex64::new(0.0, 0.0); 2], 1e-9, 200, &collectives, &mut NoCheckpoint)
                .unwrap();
            assert_eq!(outcome.status, SolveStatus::Converged, "method {:?} failed to converge", method);
        }
    }
}
