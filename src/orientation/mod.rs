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

//! Orientation averaging: a triple integral over the Euler angles
//! `(alpha, beta, gamma)` of a caller-supplied per-orientation solve,
//! one level above [`crate::integration`]'s angular integrator (whose
//! machinery this module reuses directly for each of the three axes).
//!
//! `beta` is integrated in `cos(beta)`, which absorbs the `sin(beta)`
//! solid-angle weight into the sampling itself rather than needing it as
//! an explicit integrand factor — the same reason the scattering
//! integrator samples `theta` directly but leaves `phi` unweighted.
//! Nesting order (gamma innermost, then beta, then alpha outermost)
//! matches the loop order of the reference implementation's own
//! orientation-averaging driver.
//!
//! This module does not itself assemble a geometry/interaction/solver
//! chain: the caller's `evaluate` closure is expected to run that whole
//! RHS -> Krylov solve -> cross-section chain for one orientation sample
//! and return `None` when the solve breaks down, so that sample is
//! skipped rather than poisoning the average.

use std::collections::HashMap;

use crate::error::Result;
use crate::integration::{romberg_1d, AxisSpec, RombergParams};
use crate::types::Vec3;

/// The post-solution quantities collected for one orientation sample.
#[derive(Debug, Clone, Copy)]
pub struct OrientationSample {
    pub ext: f64,
    pub abs: f64,
    pub sca: f64,
    pub asymmetry: Vec3,
}

/// The three Euler-angle integration domains. `cos_beta` is specified in
/// `cos(beta)` directly, typically `[-1, 1]`.
#[derive(Debug, Clone, Copy)]
pub struct EulerAxes {
    pub alpha: AxisSpec,
    pub cos_beta: AxisSpec,
    pub gamma: AxisSpec,
}

/// Independent Romberg parameters for each axis, per spec.
#[derive(Debug, Clone, Copy)]
pub struct OrientationParams {
    pub alpha: RombergParams,
    pub beta: RombergParams,
    pub gamma: RombergParams,
}

/// Orientation-averaged cross-sections, plus a tally of how many samples
/// were skipped due to solver breakdown.
#[derive(Debug, Clone, Copy)]
pub struct OrientationAverage {
    pub ext: f64,
    pub abs: f64,
    pub sca: f64,
    pub asymmetry: Vec3,
    pub samples_evaluated: usize,
    pub samples_skipped: usize,
}

struct SampleCache<'a> {
    evaluate: &'a mut dyn FnMut(f64, f64, f64) -> Option<OrientationSample>,
    cache: HashMap<(u64, u64, u64), Option<OrientationSample>>,
    evaluated: usize,
    skipped: usize,
}

impl<'a> SampleCache<'a> {
    fn get(&mut self, alpha: f64, beta: f64, gamma: f64) -> Option<OrientationSample> {
        let key = (alpha.to_bits(), beta.to_bits(), gamma.to_bits());
        if let Some(cached) = self.cache.get(&key) {
            return *cached;
        }
        let sample = (self.evaluate)(alpha, beta, gamma);
        match sample {
            Some(_) => self.evaluated += 1,
            None => self.skipped += 1,
        }
        self.cache.insert(key, sample);
        sample
    }
}

fn triple_integrate(
    axes: &EulerAxes,
    params: &OrientationParams,
    cache: &mut SampleCache,
    extractor: fn(Option<&OrientationSample>) -> f64,
) -> Result<f64> {
    romberg_1d(axes.alpha, params.alpha, |alpha| {
        let cache = &mut *cache;
        romberg_1d(axes.cos_beta, params.beta, |cos_beta| {
            let cache = &mut *cache;
            let beta = cos_beta.acos();
            romberg_1d(axes.gamma, params.gamma, |gamma| {
                let sample = cache.get(alpha, beta, gamma);
                extractor(sample.as_ref())
            })
            .unwrap_or(f64::NAN)
        })
        .unwrap_or(f64::NAN)
    })
}

fn extract_one(sample: Option<&OrientationSample>) -> f64 {
    if sample.is_some() { 1.0 } else { 0.0 }
}
fn extract_ext(sample: Option<&OrientationSample>) -> f64 {
    sample.map(|s| s.ext).unwrap_or(0.0)
}
fn extract_abs(sample: Option<&OrientationSample>) -> f64 {
    sample.map(|s| s.abs).unwrap_or(0.0)
}
fn extract_sca(sample: Option<&OrientationSample>) -> f64 {
    sample.map(|s| s.sca).unwrap_or(0.0)
}
fn extract_gx(sample: Option<&OrientationSample>) -> f64 {
    sample.map(|s| s.asymmetry.x).unwrap_or(0.0)
}
fn extract_gy(sample: Option<&OrientationSample>) -> f64 {
    sample.map(|s| s.asymmetry.y).unwrap_or(0.0)
}
fn extract_gz(sample: Option<&OrientationSample>) -> f64 {
    sample.map(|s| s.asymmetry.z).unwrap_or(0.0)
}

/// Average `evaluate`'s per-orientation result over the Euler-angle
/// domain described by `axes`. Symmetry/reduced-FFT storage must already
/// be disabled by the caller whenever this is invoked (an orientation
/// count greater than one forces that, per spec, a configuration-level
/// concern this module does not itself enforce).
pub fn average_over_orientations(
    axes: &EulerAxes,
    params: &OrientationParams,
    evaluate: impl FnMut(f64, f64, f64) -> Option<OrientationSample>,
) -> Result<OrientationAverage> {
    let mut evaluate = evaluate;
    let mut cache = SampleCache { evaluate: &mut evaluate, cache: HashMap::new(), evaluated: 0, skipped: 0 };

    let normalization = triple_integrate(axes, params, &mut cache, extract_one)?;
    let ext = triple_integrate(axes, params, &mut cache, extract_ext)? / normalization;
    let abs = triple_integrate(axes, params, &mut cache, extract_abs)? / normalization;
    let sca = triple_integrate(axes, params, &mut cache, extract_sca)? / normalization;
    let gx = triple_integrate(axes, params, &mut cache, extract_gx)? / normalization;
    let gy = triple_integrate(axes, params, &mut cache, extract_gy)? / normalization;
    let gz = triple_integrate(axes, params, &mut cache, extract_gz)? / normalization;

    Ok(OrientationAverage {
        ext,
        abs,
        sca,
        asymmetry: Vec3::new(gx, gy, gz),
        samples_evaluated: cache.evaluated,
        samples_skipped: cache.skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn axes() -> EulerAxes {
        EulerAxes {
            alpha: AxisSpec { low: 0.0, high: 2.0 * PI, periodic: true },
            cos_beta: AxisSpec { low: -1.0, high: 1.0, periodic: false },
            gamma: AxisSpec { low: 0.0, high: 2.0 * PI, periodic: true },
        }
    }

    fn params() -> OrientationParams {
        let p = RombergParams { jmin: 2, jmax: 6, eps: 1e-4 };
        OrientationParams { alpha: p, beta: p, gamma: p }
    }

    #[test]
    fn constant_sample_averages_to_itself() {
        let result = average_over_orientations(&axes(), &params(), |_, _, _| {
            Some(OrientationSample { ext: 2.0, abs: 1.0, sca: 1.0, asymmetry: Vec3::new(0.1, 0.0, 0.0) })
        })
        .unwrap();
        assert!((result.ext - 2.0).abs() < 1e-3);
        assert!((result.abs - 1.0).abs() < 1e-3);
        assert_eq!(result.samples_skipped, 0);
    }

    #[test]
    fn skipped_samples_are_excluded_from_the_average_and_counted() {
        let result = average_over_orientations(&axes(), &params(), |alpha, _, _| {
            if alpha > PI {
                None
            } else {
                Some(OrientationSample { ext: 4.0, abs: 0.0, sca: 0.0, asymmetry: Vec3::ZERO })
            }
        })
        .unwrap();
        assert!(result.samples_skipped > 0);
        assert!((result.ext - 4.0).abs() < 1e-2);
    }
}
