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

//! Cross-sections and radiation forces computed from a converged dipole
//! polarization `p` and the incident field it was solved against.
//! Formulae confirmed against `crosssec.c`'s `ExtCross`/`AbsCross`/`Frp_mat`.

use num_complex::Complex64;

use crate::config::{PolarizabilityKind, RunConfig};
use crate::decomposition::Collectives;
use crate::error::Result;
use crate::polarizability::AlphaRepresentation;
use crate::types::Vec3;

/// `C_ext` for a plane incident beam, via the optical theorem: the
/// forward-scattering amplitude dotted with the real incident
/// polarization, scaled by `4*pi/k^2`.
///
/// `f_prop` is the scattering amplitude at `n = prop`,
/// `f(n) = -i k^3 * [sum_j p_j exp(-ik n.r_j)]_perp(n)` (transverse
/// projection of the polarization sum), which the caller supplies already
/// computed (it is also needed by the general radiation-pattern
/// integrator, so this function does not recompute it).
pub fn ext_cross_plane(config: &RunConfig, f_prop: &[Complex64; 3]) -> f64 {
    let e = config.inc_pol_per;
    let dot = e.x * f_prop[0] + e.y * f_prop[1] + e.z * f_prop[2];
    (4.0 * std::f64::consts::PI / (config.wavenum * config.wavenum)) * dot.re
}

/// `C_ext` for a general beam: `4 pi k * sum_j Im(p_j . E_inc,j*)`.
pub fn ext_cross_general(
    config: &RunConfig,
    collectives: &dyn Collectives,
    polarization: &[Complex64],
    incident: &[Complex64],
) -> Result<f64> {
    let local: f64 = polarization
        .iter()
        .zip(incident.iter())
        .map(|(p, e)| (p * e.conj()).im)
        .sum();
    let total = collectives.all_reduce_sum(local)?;
    Ok(4.0 * std::f64::consts::PI * config.wavenum * total)
}

/// `C_abs`, Draine form: `4 pi k * sum_j [-Im(1/alpha_j) - (2/3)k^3] |p_j|^2`.
pub fn abs_cross_draine(
    config: &RunConfig,
    collectives: &dyn Collectives,
    polarization: &[Complex64],
    alpha_per_dipole: &[AlphaRepresentation],
) -> Result<f64> {
    let k3 = (2.0 / 3.0) * config.wavenum.powi(3);
    let mut local = 0.0;
    for (i, alpha) in alpha_per_dipole.iter().enumerate() {
        for axis in 0..3 {
            let p = polarization[3 * i + axis];
            let alpha_inv = alpha.component(axis).inv();
            local += (-alpha_inv.im - k3) * p.norm_sqr();
        }
    }
    let total = collectives.all_reduce_sum(local)?;
    Ok(4.0 * std::f64::consts::PI * config.wavenum * total)
}

/// `C_abs`, second-order form: a per-material multiplier,
/// `4 pi / d^3 * (-Im(1/chi)) * (1 + (kd Im m)^2) / |m^2-1|^2`, `chi =
/// (m^2-1)/(4 pi)`, confirmed against `AbsCross`'s `SQ_SO` branch.
pub fn abs_cross_second_order(
    config: &RunConfig,
    collectives: &dyn Collectives,
    polarization: &[Complex64],
    material_of_dipole: &[u8],
) -> Result<f64> {
    let mut multiplier = vec![0.0; config.refr_index.len()];
    for (mat, &m) in config.refr_index.iter().enumerate() {
        let chi = (m * m - Complex64::new(1.0, 0.0)) / (4.0 * std::f64::consts::PI);
        let denom = (m * m - Complex64::new(1.0, 0.0)).norm_sqr();
        let factor = 1.0 + (config.kd * m.im).powi(2);
        multiplier[mat] = (4.0 * std::f64::consts::PI / config.d.powi(3)) * (-chi.inv().im) * factor / denom;
    }
    let mut local = 0.0;
    for (i, &mat) in material_of_dipole.iter().enumerate() {
        let p2: f64 = (0..3).map(|axis| polarization[3 * i + axis].norm_sqr()).sum();
        local += multiplier[mat as usize] * p2;
    }
    let total = collectives.all_reduce_sum(local)?;
    Ok(total)
}

/// Dispatch on [`PolarizabilityKind`]: `SecondOrder` uses the SO
/// absorption cross-section, everything else uses the Draine form.
pub fn abs_cross(
    config: &RunConfig,
    collectives: &dyn Collectives,
    polarization: &[Complex64],
    alpha_per_dipole: &[AlphaRepresentation],
    material_of_dipole: &[u8],
) -> Result<f64> {
    match config.polarizability {
        PolarizabilityKind::SecondOrder => abs_cross_second_order(config, collectives, polarization, material_of_dipole),
        _ => abs_cross_draine(config, collectives, polarization, alpha_per_dipole),
    }
}

/// One far-field scattering sample: direction `(theta, phi)` and the
/// squared scattering amplitude in that direction, `|E_sca|^2`. Produced
/// by the caller's far-field evaluator and consumed by
/// [`crate::integration`] to build `C_sca`/`g.C_sca`.
#[derive(Debug, Clone, Copy)]
pub struct ScatteringSample {
    pub theta: f64,
    pub phi: f64,
    pub intensity: f64,
}

impl ScatteringSample {
    pub fn direction(&self) -> Vec3 {
        Vec3::new(
            self.theta.sin() * self.phi.cos(),
            self.theta.sin() * self.phi.sin(),
            self.theta.cos(),
        )
    }
}

/// `C_sca = (4 pi / k^2) * Romberg_integral(|E_sca(theta,phi)|^2)`, where
/// `integral` is already the (unscaled) solid-angle integral produced by
/// [`crate::integration::romberg_sphere`].
pub fn sca_cross_from_integral(config: &RunConfig, integral: f64) -> f64 {
    (4.0 * std::f64::consts::PI / (config.wavenum * config.wavenum)) * integral
}

/// Per-dipole, then total, radiation force via explicit O(N^2) pair
/// summation. Each rank owns a slab of targets but needs every other
/// dipole's position/polarization/material, hence the all-gather.
pub struct GatheredDipoles {
    pub coord: Vec<Vec3>,
    pub polarization: Vec<[Complex64; 3]>,
    pub material: Vec<u8>,
}

pub fn gather_dipoles(
    collectives: &dyn Collectives,
    local_coord: &[Vec3],
    local_polarization: &[Complex64],
    local_material: &[u8],
) -> Result<GatheredDipoles> {
    let local_flat: Vec<f64> = local_coord.iter().flat_map(|c| [c.x, c.y, c.z]).collect();
    let gathered_coord = collectives.all_gather(&local_flat)?;
    let coord: Vec<Vec3> = gathered_coord.chunks_exact(3).map(|c| Vec3::new(c[0], c[1], c[2])).collect();

    let local_pol_flat: Vec<f64> = local_polarization.iter().flat_map(|c| [c.re, c.im]).collect();
    let gathered_pol = collectives.all_gather(&local_pol_flat)?;
    let polarization: Vec<[Complex64; 3]> = gathered_pol
        .chunks_exact(6)
        .map(|c| {
            [
                Complex64::new(c[0], c[1]),
                Complex64::new(c[2], c[3]),
                Complex64::new(c[4], c[5]),
            ]
        })
        .collect();

    let local_mat_flat: Vec<f64> = local_material.iter().map(|&m| m as f64).collect();
    let gathered_mat = collectives.all_gather(&local_mat_flat)?;
    let material: Vec<u8> = gathered_mat.iter().map(|&m| m.round() as u8).collect();

    Ok(GatheredDipoles { coord, polarization, material })
}

/// Radiation force on one local target dipole: the incident-photon term
/// `Finc` plus the pairwise scattering term `Fsca` summed against every
/// other dipole in the particle (the `i == j` self term is skipped).
/// Ported from `Frp_mat` (`crosssec.c`), not a re-derivation: `Finc`'s
/// z-only convention and `Fsca`'s `ab1`/`ab2`/`c1`/`c2` coefficients are
/// taken verbatim from that function's arithmetic.
pub fn radiation_force_on(
    target_coord: &Vec3,
    target_polarization: &[Complex64; 3],
    target_incident: &[Complex64; 3],
    all: &GatheredDipoles,
    wavenum: f64,
) -> Vec3 {
    let mut dummy = Complex64::new(0.0, 0.0);
    for comp in 0..3 {
        dummy += target_polarization[comp] * target_incident[comp].conj();
    }
    let finc_z = wavenum * dummy.im / 2.0;

    let mut fsca = [0.0f64; 3];
    for (other_coord, other_pol) in all.coord.iter().zip(all.polarization.iter()) {
        let r = target_coord.sub(other_coord);
        let r2 = r.dot(&r);
        if r2 < 1e-20 {
            continue;
        }
        let dist = r2.sqrt();
        let n = r.scale(1.0 / dist);

        let phase = Complex64::new((wavenum * dist).cos(), (wavenum * dist).sin());
        let ab1 = Complex64::new(3.0 / (r2 * r2) - wavenum * wavenum / r2, -3.0 * wavenum / (dist * r2)) * phase;
        let ab2 = Complex64::new(-wavenum * wavenum / r2, wavenum.powi(3) / dist) * phase;

        let mut pn_j = Complex64::new(0.0, 0.0);
        let mut pn_l = Complex64::new(0.0, 0.0);
        let mut inp = Complex64::new(0.0, 0.0);
        for comp in 0..3 {
            let n_comp = Complex64::new(n.component(comp), 0.0);
            pn_j += target_polarization[comp].conj() * n_comp;
            pn_l += n_comp * other_pol[comp];
            inp += target_polarization[comp].conj() * other_pol[comp];
        }

        for comp in 0..3 {
            let n_comp = Complex64::new(n.component(comp), 0.0);
            let c1 = -5.0 * pn_j * pn_l * n_comp + inp * n_comp + pn_j * other_pol[comp] + target_polarization[comp].conj() * pn_l;
            let c2 = -pn_j * pn_l * n_comp + inp * n_comp;
            fsca[comp] += (c1 * ab1).re / 2.0 + (c2 * ab2).re / 2.0;
        }
    }

    Vec3::new(fsca[0], fsca[1], finc_z + fsca[2])
}

#[cfg(not(target_arch = "wasm32"))]
fn ceil_div(x: usize, y: usize) -> usize {
    debug_assert!(x > 0);
    1 + (x - 1) / y
}

/// Radiation force on every locally owned target, batched across a thread
/// pool the same way the FFT MatVec batches its plane transforms: each
/// thread gets a contiguous slice of targets and runs the full O(N) pair
/// sum against `all` for each one, so the total cost per rank remains
/// O(local_ndip * ndip_total) but is spread across `thread_pool`'s workers.
/// Falls back to the serial per-target loop when the pool has fewer than
/// two threads or there is nothing to split.
#[cfg(not(target_arch = "wasm32"))]
pub fn radiation_forces_parallel(
    target_coord: &[Vec3],
    target_polarization: &[[Complex64; 3]],
    target_incident: &[[Complex64; 3]],
    all: &GatheredDipoles,
    wavenum: f64,
    thread_pool: &mut scoped_threadpool::Pool,
) -> Vec<Vec3> {
    let n = target_coord.len();
    let num_threads = thread_pool.thread_count() as usize;
    if num_threads < 2 || n < 2 {
        return target_coord
            .iter()
            .zip(target_polarization.iter())
            .zip(target_incident.iter())
            .map(|((c, p), e)| radiation_force_on(c, p, e, all, wavenum))
            .collect();
    }

    let chunk_size = ceil_div(n, num_threads).max(1);
    let mut forces = vec![Vec3::ZERO; n];
    let coord_chunks = target_coord.chunks(chunk_size);
    let pol_chunks = target_polarization.chunks(chunk_size);
    let inc_chunks = target_incident.chunks(chunk_size);
    let out_chunks = forces.chunks_mut(chunk_size);
    thread_pool.scoped(|scope| {
        for (coord_chunk, pol_chunk, inc_chunk, out_chunk) in itertools::izip!(coord_chunks, pol_chunks, inc_chunks, out_chunks) {
            scope.execute(move || {
                for (i, out) in out_chunk.iter_mut().enumerate() {
                    *out = radiation_force_on(&coord_chunk[i], &pol_chunk[i], &inc_chunk[i], all, wavenum);
                }
            });
        }
    });
    forces
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfigBuilder;
    use crate::decomposition::SingleProcessCollectives;

    fn config() -> RunConfig {
        RunConfigBuilder::default()
            .lambda(1.0)
            .dpl(10.0)
            .refr_index(vec![Complex64::new(1.5, 0.01)])
            .prop(Vec3::new(0.0, 0.0, 1.0))
            .build()
            .unwrap()
    }

    #[test]
    fn abs_cross_draine_is_nonnegative_for_lossy_material() {
        let config = config();
        let collectives = SingleProcessCollectives;
        let alphas = crate::polarizability::all_material_alphas(&config).unwrap();
        let polarization = vec![Complex64::new(1.0, 0.0); 3];
        let value = abs_cross_draine(&config, &collectives, &polarization, &alphas).unwrap();
        assert!(value > 0.0);
    }

    #[test]
    fn sca_cross_scales_linearly_with_integral() {
        let config = config();
        let a = sca_cross_from_integral(&config, 1.0);
        let b = sca_cross_from_integral(&config, 2.0);
        assert!((2.0 * a - b).abs() < 1e-12);
    }

    #[test]
    fn gather_dipoles_roundtrips_single_process() {
        let collectives = SingleProcessCollectives;
        let coord = vec![Vec3::new(1.0, 2.0, 3.0), Vec3::new(-1.0, 0.0, 0.5)];
        let polarization = vec![
            Complex64::new(1.0, 0.0), Complex64::new(0.0, 1.0), Complex64::new(0.5, 0.5),
            Complex64::new(0.2, -0.1), Complex64::new(0.0, 0.0), Complex64::new(1.0, 1.0),
        ];
        let material = vec![0u8, 1u8];
        let gathered = gather_dipoles(&collectives, &coord, &polarization, &material).unwrap();
        assert_eq!(gathered.coord, coord);
        assert_eq!(gathered.material, material);
    }

    #[test]
    fn radiation_force_skips_self_term() {
        let all = GatheredDipoles {
            coord: vec![Vec3::new(0.0, 0.0, 0.0)],
            polarization: vec![[Complex64::new(1.0, 0.0); 3]],
            material: vec![0],
        };
        let zero_incident = [Complex64::new(0.0, 0.0); 3];
        let force = radiation_force_on(&Vec3::ZERO, &[Complex64::new(1.0, 0.0); 3], &zero_incident, &all, 1.0);
        assert_eq!(force, Vec3::ZERO);
    }

    #[test]
    fn radiation_force_incident_term_matches_finc_formula() {
        // A single dipole with no neighbours: Fsca is identically zero, so
        // the whole force reduces to Finc, z-component only, per Frp_mat.
        let all = GatheredDipoles {
            coord: vec![Vec3::new(0.0, 0.0, 0.0)],
            polarization: vec![[Complex64::new(1.0, 0.0); 3]],
            material: vec![0],
        };
        let target_polarization = [Complex64::new(1.0, 0.5); 3];
        let target_incident = [Complex64::new(0.2, -0.3); 3];
        let wavenum = 1.7;

        let dummy: Complex64 = (0..3).map(|c| target_polarization[c] * target_incident[c].conj()).sum();
        let expected_finc_z = wavenum * dummy.im / 2.0;

        let force = radiation_force_on(&Vec3::ZERO, &target_polarization, &target_incident, &all, wavenum);
        assert_eq!(force.x, 0.0);
        assert_eq!(force.y, 0.0);
        assert!((force.z - expected_finc_z).abs() < 1e-12);
    }

    #[test]
    fn radiation_forces_parallel_matches_serial_evaluation() {
        let all = GatheredDipoles {
            coord: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
                Vec3::new(0.0, 0.0, 1.0),
            ],
            polarization: vec![
                [Complex64::new(1.0, 0.1); 3],
                [Complex64::new(0.5, -0.2); 3],
                [Complex64::new(0.2, 0.3); 3],
                [Complex64::new(-0.3, 0.1); 3],
            ],
            material: vec![0, 0, 0, 0],
        };
        let incident = vec![
            [Complex64::new(1.0, 0.0); 3],
            [Complex64::new(0.0, 1.0); 3],
            [Complex64::new(0.3, -0.1); 3],
            [Complex64::new(-0.2, 0.2); 3],
        ];
        let serial: Vec<Vec3> = all
            .coord
            .iter()
            .zip(all.polarization.iter())
            .zip(incident.iter())
            .map(|((c, p), e)| radiation_force_on(c, p, e, &all, 1.3))
            .collect();

        let mut pool = scoped_threadpool::Pool::new(3);
        let parallel = radiation_forces_parallel(&all.coord, &all.polarization, &incident, &all, 1.3, &mut pool);

        for (s, p) in serial.iter().zip(parallel.iter()) {
            assert!((s.x - p.x).abs() < 1e-12);
            assert!((s.y - p.y).abs() < 1e-12);
            assert!((s.z - p.z).abs() < 1e-12);
        }
    }
}
