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

//! 2-D adaptive Romberg integration over a rectangular angular domain,
//! used both for the scattering cross-section/asymmetry integrals over
//! `(theta, phi)` and, one level up, for the orientation-averaging outer
//! integral over Euler angles.
//!
//! Each axis is refined independently, doubling its sample count each
//! level (`2^J+1` points, or `2^J` for a periodic axis where the last
//! sample aliases the first) and Richardson-extrapolating a Romberg
//! table of depth `J - Jmin + 1` built from the trapezoid estimates at
//! every level seen so far. Termination is on relative change between
//! the last two extrapolated estimates, not on an absolute tolerance,
//! since the integrands here range over many orders of magnitude.

use tracing::warn;

use crate::error::{DdaError, Result};

/// One integration axis: the sampled interval and whether its endpoints
/// alias (periodic `phi`, sampled in `[0, 2*pi)`, does not duplicate the
/// `2*pi` endpoint; `theta` does, since `[0, pi]` is not periodic).
#[derive(Debug, Clone, Copy)]
pub struct AxisSpec {
    pub low: f64,
    pub high: f64,
    pub periodic: bool,
}

impl AxisSpec {
    /// Sample points at refinement level `j`: `2^j + 1` points for a
    /// closed interval, `2^j` for a periodic one (the implicit point at
    /// `high` equals the one at `low` and is never evaluated twice).
    fn points(&self, j: u32) -> Vec<f64> {
        let n = 1usize << j;
        let count = if self.periodic { n } else { n + 1 };
        let step = (self.high - self.low) / n as f64;
        (0..count).map(|i| self.low + i as f64 * step).collect()
    }
}

/// Adaptive 2-D Romberg parameters: the `Jmin`/`Jmax`/`eps` triple driving
/// the angular integrator.
#[derive(Debug, Clone, Copy)]
pub struct RombergParams {
    pub jmin: u32,
    pub jmax: u32,
    pub eps: f64,
}

impl Default for RombergParams {
    fn default() -> Self {
        Self { jmin: 2, jmax: 10, eps: 1e-4 }
    }
}

/// Integrate `f(theta, phi)` over the rectangle `theta_axis x phi_axis`
/// via tensor-product adaptive Romberg, refining both axes together one
/// level at a time. `f` is evaluated on the full sample grid at every
/// level; for the angular integrator this is acceptable since a Krylov
/// solve, not a field evaluation, is the expensive step, and the field
/// at a given direction is cheap relative to it.
pub fn romberg_sphere(
    theta_axis: AxisSpec,
    phi_axis: AxisSpec,
    params: RombergParams,
    mut f: impl FnMut(f64, f64) -> f64,
) -> Result<f64> {
    let mut table: Vec<f64> = Vec::new();
    let mut previous_estimate = f64::NAN;

    for j in params.jmin..=params.jmax {
        let theta_pts = theta_axis.points(j);
        let phi_pts = phi_axis.points(j);
        let raw = trapezoid_2d(&theta_axis, &phi_axis, &theta_pts, &phi_pts, &mut f);

        table.push(raw);
        richardson_extrapolate(&mut table);
        let estimate = *table.last().unwrap();

        if j > params.jmin {
            let rel_change = if estimate.abs() > 1e-300 {
                (estimate - previous_estimate).abs() / estimate.abs()
            } else {
                (estimate - previous_estimate).abs()
            };
            if rel_change <= params.eps {
                return Ok(estimate);
            }
        }
        previous_estimate = estimate;
    }

    warn!(
        jmax = params.jmax,
        last_estimate = previous_estimate,
        "angular integrator did not converge by Jmax"
    );
    Err(DdaError::NumericRange(format!(
        "angular Romberg integration failed to converge within Jmax={}",
        params.jmax
    )))
}

fn trapezoid_2d(
    theta_axis: &AxisSpec,
    phi_axis: &AxisSpec,
    theta_pts: &[f64],
    phi_pts: &[f64],
    f: &mut impl FnMut(f64, f64) -> f64,
) -> f64 {
    let weight = |axis: &AxisSpec, count: usize, i: usize| -> f64 {
        if axis.periodic || (i != 0 && i != count - 1) {
            1.0
        } else {
            0.5
        }
    };
    let mut sum = 0.0;
    for (i, &theta) in theta_pts.iter().enumerate() {
        let wt = weight(theta_axis, theta_pts.len(), i);
        for (j, &phi) in phi_pts.iter().enumerate() {
            let wp = weight(phi_axis, phi_pts.len(), j);
            sum += wt * wp * f(theta, phi);
        }
    }
    let d_theta = (theta_axis.high - theta_axis.low) / (theta_pts.len().max(2) - if theta_axis.periodic { 0 } else { 1 }) as f64;
    let d_phi = (phi_axis.high - phi_axis.low) / (phi_pts.len().max(2) - if phi_axis.periodic { 0 } else { 1 }) as f64;
    sum * d_theta * d_phi
}

/// Richardson-extrapolate the latest raw trapezoid estimate against the
/// growing table in place, Romberg-style (each new column eliminates one
/// more order of the error expansion, factor `4^k` between neighbors).
fn richardson_extrapolate(table: &mut Vec<f64>) {
    let n = table.len();
    for k in 1..n {
        let factor = 4f64.powi(k as i32);
        let refined = table[n - 1 - (k - 1)] + (table[n - 1 - (k - 1)] - table[n - 1 - k]) / (factor - 1.0);
        table[n - 1] = refined;
        if k == n - 1 {
            break;
        }
    }
}

/// 1-D counterpart of [`romberg_sphere`], used by the orientation-averaging
/// driver for each of its three Euler-angle integrals (each with its own
/// [`RombergParams`], per spec). Shares the same trapezoid/Richardson
/// machinery, just along a single axis.
pub fn romberg_1d(axis: AxisSpec, params: RombergParams, mut f: impl FnMut(f64) -> f64) -> Result<f64> {
    let mut table: Vec<f64> = Vec::new();
    let mut previous_estimate = f64::NAN;

    for j in params.jmin..=params.jmax {
        let pts = axis.points(j);
        let raw = trapezoid_1d(&axis, &pts, &mut f);

        table.push(raw);
        richardson_extrapolate(&mut table);
        let estimate = *table.last().unwrap();

        if j > params.jmin {
            let rel_change = if estimate.abs() > 1e-300 {
                (estimate - previous_estimate).abs() / estimate.abs()
            } else {
                (estimate - previous_estimate).abs()
            };
            if rel_change <= params.eps {
                return Ok(estimate);
            }
        }
        previous_estimate = estimate;
    }

    warn!(
        jmax = params.jmax,
        last_estimate = previous_estimate,
        "1-D Romberg integration did not converge by Jmax"
    );
    Err(DdaError::NumericRange(format!(
        "1-D Romberg integration failed to converge within Jmax={}",
        params.jmax
    )))
}

fn trapezoid_1d(axis: &AxisSpec, pts: &[f64], f: &mut impl FnMut(f64) -> f64) -> f64 {
    let count = pts.len();
    let mut sum = 0.0;
    for (i, &x) in pts.iter().enumerate() {
        let w = if axis.periodic || (i != 0 && i != count - 1) { 1.0 } else { 0.5 };
        sum += w * f(x);
    }
    let d = (axis.high - axis.low) / (count.max(2) - if axis.periodic { 0 } else { 1 }) as f64;
    sum * d
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn integrates_constant_function_over_full_sphere_solid_angle() {
        let theta = AxisSpec { low: 0.0, high: PI, periodic: false };
        let phi = AxisSpec { low: 0.0, high: 2.0 * PI, periodic: true };
        let params = RombergParams { jmin: 2, jmax: 6, eps: 1e-6 };
        let result = romberg_sphere(theta, phi, params, |t, _p| t.sin()).unwrap();
        assert!((result - 4.0 * PI).abs() < 1e-3);
    }

    #[test]
    fn periodic_axis_does_not_double_count_endpoint() {
        let axis = AxisSpec { low: 0.0, high: 2.0 * PI, periodic: true };
        let pts = axis.points(3);
        assert_eq!(pts.len(), 8);
        assert!(pts[0] < 1e-12);
    }

    #[test]
    fn nonperiodic_axis_includes_both_endpoints() {
        let axis = AxisSpec { low: 0.0, high: PI, periodic: false };
        let pts = axis.points(3);
        assert_eq!(pts.len(), 9);
        assert!((pts[0]).abs() < 1e-12);
        assert!((pts[8] - PI).abs() < 1e-12);
    }

    #[test]
    fn romberg_1d_integrates_sine_over_half_period() {
        let axis = AxisSpec { low: 0.0, high: PI, periodic: false };
        let params = RombergParams { jmin: 2, jmax: 8, eps: 1e-8 };
        let result = romberg_1d(axis, params, |x| x.sin()).unwrap();
        assert!((result - 2.0).abs() < 1e-4);
    }

    #[test]
    fn fails_with_numeric_range_when_integrand_never_settles() {
        let theta = AxisSpec { low: 0.0, high: PI, periodic: false };
        let phi = AxisSpec { low: 0.0, high: 2.0 * PI, periodic: true };
        let params = RombergParams { jmin: 1, jmax: 2, eps: 1e-15 };
        let result = romberg_sphere(theta, phi, params, |t, p| (t * 37.0).sin() * (p * 53.0).cos());
        assert!(matches!(result, Err(DdaError::NumericRange(_))));
    }
}
