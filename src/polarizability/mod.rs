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

//! Per-material complex polarizability, one of the five prescriptions
//! in [`crate::config::PolarizabilityKind`].
//!
//! Every prescription starts from the Clausius-Mossotti value and adds a
//! correction that is either isotropic (a single scalar applies to all
//! three axes) or, for CLDR, genuinely per-axis. [`AlphaRepresentation`]
//! carries that distinction through to the interaction MatVec without
//! forcing the isotropic majority of runs to pay for a 3-vector they
//! don't need.

use num_complex::Complex64;
use std::f64::consts::PI;

use crate::config::{PolarizabilityKind, RunConfig};
use crate::error::{DdaError, Result};
use crate::types::Vec3;

const LDR_B1: f64 = 1.8915316;
const LDR_B2: f64 = -0.1648469;
const LDR_B3: f64 = 1.7700004;

const SO_B1: f64 = 1.5867182;
const SO_B2: f64 = 0.13488017;
const SO_B3: f64 = 0.11895826;

/// The polarizability of one material, as consumed by the interaction
/// MatVec: either one scalar shared by all three axes, or three distinct
/// diagonal entries (CLDR only).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlphaRepresentation {
    Scalar(Complex64),
    Diagonal([Complex64; 3]),
}

impl AlphaRepresentation {
    pub fn component(&self, axis: usize) -> Complex64 {
        match self {
            AlphaRepresentation::Scalar(a) => *a,
            AlphaRepresentation::Diagonal(a) => a[axis],
        }
    }

    pub fn is_anisotropic(&self) -> bool {
        matches!(self, AlphaRepresentation::Diagonal(_))
    }

    /// `1/α`, applied per axis. Used directly by the MatVec's `α⁻¹·x` term.
    pub fn inverse(&self) -> AlphaRepresentation {
        match self {
            AlphaRepresentation::Scalar(a) => AlphaRepresentation::Scalar(a.inv()),
            AlphaRepresentation::Diagonal(a) => {
                AlphaRepresentation::Diagonal([a[0].inv(), a[1].inv(), a[2].inv()])
            }
        }
    }
}

/// Clausius-Mossotti polarizability, `α = (3/4π)·(m²−1)/(m²+2)·d³`.
fn clausius_mossotti(m: Complex64, d: f64) -> Complex64 {
    let m2 = m * m;
    (3.0 / (4.0 * PI)) * (m2 - Complex64::new(1.0, 0.0)) / (m2 + Complex64::new(2.0, 0.0))
        * d.powi(3)
}

/// Radiative-reaction correction folded into the inverse polarizability:
/// `1/α_RR = 1/α_CM − i·(2/3)·k³`.
fn radiative_reaction(alpha_cm: Complex64, k: f64) -> Complex64 {
    let correction = Complex64::new(0.0, (2.0 / 3.0) * k.powi(3));
    (alpha_cm.inv() - correction).inv()
}

/// `S` factor for the isotropic LDR/SO corrections: `Σᵢ (propᵢ·eᵢ)²`
/// evaluated for one incident polarization, or averaged over both
/// polarizations when `average_incident_pol` is set. This mirrors
/// [`RunConfig::ldr_s_factor`] but is kept private to this module's
/// internal call sites that only have `prop`/`e` in hand directly.
fn s_factor(prop: &Vec3, e: &Vec3) -> f64 {
    let px = prop.x * e.x;
    let py = prop.y * e.y;
    let pz = prop.z * e.z;
    px * px + py * py + pz * pz
}

/// Lattice-dispersion-relation correction, scalar (same for all axes):
/// `α_LDR = α_CM / [1 + (α_CM/d³)·(b₁ + b₂·m² + b₃·m²·S)·(kd)²]`
/// (Draine & Goodman 1993), folding the dipole-spacing-dependent term
/// multiplicatively into the denominator of `α_CM`.
fn ldr_correction(alpha_cm: Complex64, m: Complex64, d: f64, kd: f64, s: f64) -> Complex64 {
    let m2 = m * m;
    let bracket = Complex64::new(1.0, 0.0)
        + (alpha_cm / d.powi(3)) * (LDR_B1 + LDR_B2 * m2 + LDR_B3 * m2 * s) * kd * kd;
    alpha_cm / bracket
}

/// Second-order correction, same functional form as LDR but with the SO
/// constants; kept separate because ADDA documents it as a distinct,
/// development-quality prescription rather than a parameterization of LDR.
fn so_correction(alpha_cm: Complex64, m: Complex64, d: f64, kd: f64, s: f64) -> Complex64 {
    let m2 = m * m;
    let bracket = Complex64::new(1.0, 0.0)
        + (alpha_cm / d.powi(3)) * (SO_B1 + SO_B2 * m2 + SO_B3 * m2 * s) * kd * kd;
    alpha_cm / bracket
}

/// Compute the polarizability tensor for a single material under the
/// prescription and incident geometry carried by `config`.
///
/// `kd` and `d` come from `config`; `refr_index[material]` selects `m`.
/// Returns [`DdaError::Incompatibility`] if the configuration already
/// rejected SO+anisotropy/SO+reduced-storage combinations — that check
/// lives in `RunConfigBuilder::build` so it only needs to run once per
/// run rather than once per material.
pub fn material_alpha(config: &RunConfig, material: usize) -> Result<AlphaRepresentation> {
    let m = *config
        .refr_index
        .get(material)
        .ok_or_else(|| DdaError::GeometryInconsistent(format!("material index {} has no refractive index", material)))?;
    let d = config.d;
    let kd = config.kd;
    let alpha_cm = clausius_mossotti(m, d);

    match config.polarizability {
        PolarizabilityKind::ClausiusMossotti => Ok(AlphaRepresentation::Scalar(alpha_cm)),
        PolarizabilityKind::RadiativeReaction => {
            Ok(AlphaRepresentation::Scalar(radiative_reaction(alpha_cm, config.wavenum)))
        }
        PolarizabilityKind::Ldr { average_incident_pol } => {
            let s = if average_incident_pol {
                0.5 * (s_factor(&config.prop, &config.inc_pol_per) + s_factor(&config.prop, &config.inc_pol_par))
            } else {
                s_factor(&config.prop, &config.inc_pol_per)
            };
            Ok(AlphaRepresentation::Scalar(ldr_correction(alpha_cm, m, d, kd, s)))
        }
        PolarizabilityKind::Cldr => {
            let diag = [
                ldr_correction(alpha_cm, m, d, kd, config.prop.x * config.prop.x),
                ldr_correction(alpha_cm, m, d, kd, config.prop.y * config.prop.y),
                ldr_correction(alpha_cm, m, d, kd, config.prop.z * config.prop.z),
            ];
            Ok(AlphaRepresentation::Diagonal(diag))
        }
        PolarizabilityKind::SecondOrder => {
            let s = s_factor(&config.prop, &config.inc_pol_per);
            Ok(AlphaRepresentation::Scalar(so_correction(alpha_cm, m, d, kd, s)))
        }
    }
}

/// Compute the polarizability for every material in `config.refr_index`,
/// in material-index order.
pub fn all_material_alphas(config: &RunConfig) -> Result<Vec<AlphaRepresentation>> {
    (0..config.refr_index.len()).map(|i| material_alpha(config, i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfigBuilder;

    fn base_builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
            .lambda(1.0)
            .dpl(10.0)
            .refr_index(vec![Complex64::new(1.5, 0.01)])
            .prop(Vec3::new(0.0, 0.0, 1.0))
    }

    #[test]
    fn clausius_mossotti_matches_closed_form() {
        let config = base_builder().polarizability(PolarizabilityKind::ClausiusMossotti).build().unwrap();
        let alpha = material_alpha(&config, 0).unwrap();
        let m = config.refr_index[0];
        let expected = clausius_mossotti(m, config.d);
        assert_eq!(alpha, AlphaRepresentation::Scalar(expected));
    }

    #[test]
    fn radiative_reaction_adds_positive_imaginary_part_to_inverse() {
        let config = base_builder().polarizability(PolarizabilityKind::RadiativeReaction).build().unwrap();
        let alpha_rr = material_alpha(&config, 0).unwrap().component(0);
        let alpha_cm = clausius_mossotti(config.refr_index[0], config.d);
        // 1/alpha_RR = 1/alpha_CM - i*(2/3)k^3, so Im(1/alpha_RR) < Im(1/alpha_CM).
        assert!(alpha_rr.inv().im < alpha_cm.inv().im);
    }

    #[test]
    fn ldr_is_isotropic_scalar() {
        let config = base_builder()
            .polarizability(PolarizabilityKind::Ldr { average_incident_pol: false })
            .build()
            .unwrap();
        let alpha = material_alpha(&config, 0).unwrap();
        assert!(!alpha.is_anisotropic());
    }

    #[test]
    fn ldr_average_incident_pol_matches_averaged_s_not_s_of_prop() {
        // prop = (0,0,1): inc_pol_per = (1,0,0), inc_pol_par = (0,1,0), so
        // S is 0 for both polarizations and the averaged S must be 0 too,
        // giving the same alpha as the un-averaged (per) branch here.
        let averaged = base_builder()
            .polarizability(PolarizabilityKind::Ldr { average_incident_pol: true })
            .build()
            .unwrap();
        let per = base_builder()
            .polarizability(PolarizabilityKind::Ldr { average_incident_pol: false })
            .build()
            .unwrap();
        let alpha_averaged = material_alpha(&averaged, 0).unwrap();
        let alpha_per = material_alpha(&per, 0).unwrap();
        match (alpha_averaged, alpha_per) {
            (AlphaRepresentation::Scalar(a), AlphaRepresentation::Scalar(b)) => {
                assert!((a - b).norm() < 1e-12);
            }
            _ => panic!("expected scalar representations"),
        }
    }

    #[test]
    fn cldr_is_anisotropic_for_oblique_propagation() {
        let config = base_builder()
            .prop(Vec3::new(0.0, 0.6, 0.8))
            .polarizability(PolarizabilityKind::Cldr)
            .build()
            .unwrap();
        let alpha = material_alpha(&config, 0).unwrap();
        assert!(alpha.is_anisotropic());
        match alpha {
            AlphaRepresentation::Diagonal(d) => {
                assert!((d[1] - d[2]).norm() > 1e-12);
            }
            _ => panic!("expected diagonal representation"),
        }
    }

    #[test]
    fn second_order_rejected_with_cldr_combo_at_config_level() {
        // SO + reduced symmetry is rejected at RunConfigBuilder::build,
        // exercised in config.rs's own tests; here we only check SO in
        // isolation still produces a usable scalar.
        let config = base_builder().polarizability(PolarizabilityKind::SecondOrder).build().unwrap();
        let alpha = material_alpha(&config, 0).unwrap();
        assert!(!alpha.is_anisotropic());
    }

    #[test]
    fn missing_material_index_is_an_error() {
        let config = base_builder().polarizability(PolarizabilityKind::ClausiusMossotti).build().unwrap();
        let result = material_alpha(&config, 5);
        assert!(matches!(result, Err(DdaError::GeometryInconsistent(_))));
    }
}
