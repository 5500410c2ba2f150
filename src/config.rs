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

//! Immutable run configuration.
//!
//! Rather than scattering options across process-wide globals that every
//! component reads from directly, all of it lives in one [`RunConfig`],
//! built once through [`RunConfigBuilder`] and passed by reference to
//! every component. Nothing in this crate mutates it after construction.

use crate::error::{DdaError, Result};
use crate::types::Vec3;

/// Which closed-form prescription is used to turn a refractive index into
/// a dipole polarizability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolarizabilityKind {
    /// Clausius-Mossotti.
    ClausiusMossotti,
    /// Clausius-Mossotti with the radiative-reaction correction.
    RadiativeReaction,
    /// Lattice Dispersion Relation.
    Ldr {
        /// Average the `S` factor over both incident polarizations rather
        /// than using only the active one.
        average_incident_pol: bool,
    },
    /// Corrected LDR: anisotropic, one value per axis.
    Cldr,
    /// Second-order formulation.
    SecondOrder,
}

impl PolarizabilityKind {
    /// Whether this prescription produces a per-axis (anisotropic) `alpha`
    /// rather than a single scalar shared by all three axes.
    pub fn is_anisotropic(&self) -> bool {
        matches!(self, PolarizabilityKind::Cldr)
    }
}

/// Which formula is used for the interaction tensor itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    /// Exact point-dipole Green's tensor.
    PointDipole,
    /// Second-order formulation, with near/median/far corrections.
    SecondOrder,
}

/// Which Krylov method drives the iterative solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum IterativeMethod {
    Cgnr,
    BiCgStab,
    BiCgCs,
    QmrCs,
}

/// Shape of the incident beam.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BeamKind {
    Plane,
    LMinus { width: f64 },
    Davis3 { width: f64 },
    Barton5 { width: f64 },
}

/// Whether (and how) reduced-storage symmetry of the interaction tensor is
/// exploited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymmetryMode {
    /// Store all eight octants of `Ghat`.
    Full,
    /// Store one octant and reconstruct the rest via sign flips. Rejected
    /// together with [`InteractionKind::SecondOrder`] and with any
    /// anisotropic polarizability.
    Reduced,
}

/// Checkpointing policy, matching `CHP_NONE..CHP_ALWAYS` one-to-one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointKind {
    None,
    Normal,
    Regular,
    Always,
}

/// The full set of immutable parameters a single orientation/polarization
/// solve is run under. Orientation averaging constructs one logical
/// `RunConfig` up front and only swaps the rotated beam geometry per
/// sample; everything else here is constant for the whole run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Vacuum wavelength.
    pub lambda: f64,
    /// Wavenumber `k = 2*pi/lambda`.
    pub wavenum: f64,
    /// Dipole spacing.
    pub d: f64,
    /// `k*d`, used throughout the polarizability and kernel formulae.
    pub kd: f64,
    /// Complex refractive index per material (`len() <= MAX_NMAT`).
    pub refr_index: Vec<num_complex::Complex64>,
    /// Propagation direction (unit vector).
    pub prop: Vec3,
    /// Perpendicular incident polarization ("e_per").
    pub inc_pol_per: Vec3,
    /// Parallel incident polarization ("e_par").
    pub inc_pol_par: Vec3,
    pub polarizability: PolarizabilityKind,
    pub interaction: InteractionKind,
    pub symmetry: SymmetryMode,
    pub iterative_method: IterativeMethod,
    pub eps: f64,
    pub max_iter: usize,
    pub beam: BeamKind,
    /// Centre of the incident beam, in units of `d`, from the box centre.
    pub beam_center: Vec3,
    pub checkpoint: CheckpointKind,
    /// Rescale `d` so the realized volume matches the nominal shape volume
    /// exactly (`true` unless `-no_vol_cor` was given).
    pub volume_correction: bool,
}

impl RunConfig {
    /// `S = sum (prop_i * e_i)^2` for the given incident polarization `e`,
    /// the factor LDR/CLDR need. See [`crate::polarizability`].
    pub fn ldr_s_factor(&self, e: &Vec3) -> f64 {
        let px = self.prop.x * e.x;
        let py = self.prop.y * e.y;
        let pz = self.prop.z * e.z;
        px * px + py * py + pz * pz
    }
}

/// Builder that validates every field before producing a [`RunConfig`].
/// Range and consistency checks happen here, once, on already-parsed
/// values; parsing command-line text is out of scope.
pub struct RunConfigBuilder {
    lambda: Option<f64>,
    dpl: Option<f64>,
    refr_index: Vec<num_complex::Complex64>,
    prop: Vec3,
    polarizability: PolarizabilityKind,
    interaction: InteractionKind,
    symmetry: SymmetryMode,
    iterative_method: IterativeMethod,
    eps: f64,
    max_iter: usize,
    beam: BeamKind,
    beam_center: Vec3,
    checkpoint: CheckpointKind,
    volume_correction: bool,
}

impl Default for RunConfigBuilder {
    fn default() -> Self {
        Self {
            lambda: None,
            dpl: None,
            refr_index: Vec::new(),
            prop: Vec3::new(0.0, 0.0, 1.0),
            polarizability: PolarizabilityKind::Ldr { average_incident_pol: false },
            interaction: InteractionKind::PointDipole,
            symmetry: SymmetryMode::Full,
            iterative_method: IterativeMethod::QmrCs,
            eps: 1e-5,
            max_iter: 500,
            beam: BeamKind::Plane,
            beam_center: Vec3::ZERO,
            checkpoint: CheckpointKind::None,
            volume_correction: true,
        }
    }
}

impl RunConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lambda(mut self, lambda: f64) -> Self {
        self.lambda = Some(lambda);
        self
    }

    pub fn dpl(mut self, dpl: f64) -> Self {
        self.dpl = Some(dpl);
        self
    }

    pub fn refr_index(mut self, refr_index: Vec<num_complex::Complex64>) -> Self {
        self.refr_index = refr_index;
        self
    }

    pub fn prop(mut self, prop: Vec3) -> Self {
        self.prop = prop;
        self
    }

    pub fn polarizability(mut self, kind: PolarizabilityKind) -> Self {
        self.polarizability = kind;
        self
    }

    pub fn interaction(mut self, kind: InteractionKind) -> Self {
        self.interaction = kind;
        self
    }

    pub fn symmetry(mut self, mode: SymmetryMode) -> Self {
        self.symmetry = mode;
        self
    }

    pub fn iterative_method(mut self, method: IterativeMethod) -> Self {
        self.iterative_method = method;
        self
    }

    pub fn eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn beam(mut self, beam: BeamKind) -> Self {
        self.beam = beam;
        self
    }

    pub fn beam_center(mut self, center: Vec3) -> Self {
        self.beam_center = center;
        self
    }

    pub fn checkpoint(mut self, kind: CheckpointKind) -> Self {
        self.checkpoint = kind;
        self
    }

    pub fn volume_correction(mut self, enabled: bool) -> Self {
        self.volume_correction = enabled;
        self
    }

    /// Validate every field and construct the perpendicular/parallel
    /// incident polarization pair from `prop`, handling the `prop = (0,0,1)`
    /// special case so we never divide by zero when `|prop_z| == 1`.
    pub fn build(self) -> Result<RunConfig> {
        let lambda = self
            .lambda
            .ok_or_else(|| DdaError::ArgumentParse("lambda not set".into()))?;
        if !(lambda > 0.0) {
            return Err(DdaError::NumericRange(format!("lambda must be positive, got {}", lambda)));
        }
        let dpl = self
            .dpl
            .ok_or_else(|| DdaError::ArgumentParse("dpl not set".into()))?;
        if !(dpl > 0.0) {
            return Err(DdaError::NumericRange(format!("dpl must be positive, got {}", dpl)));
        }
        if self.refr_index.is_empty() {
            return Err(DdaError::ArgumentParse("at least one refractive index is required".into()));
        }
        if self.refr_index.len() > crate::types::MAX_NMAT {
            return Err(DdaError::NumericRange(format!(
                "at most {} materials are supported, got {}",
                crate::types::MAX_NMAT,
                self.refr_index.len()
            )));
        }
        let prop_norm = self.prop.norm();
        if (prop_norm - 1.0).abs() > 1e-9 {
            return Err(DdaError::NumericRange(format!(
                "propagation vector must be a unit vector, norm was {}",
                prop_norm
            )));
        }
        if self.eps <= 0.0 {
            return Err(DdaError::NumericRange("eps must be positive".into()));
        }
        if self.max_iter == 0 {
            return Err(DdaError::NumericRange("max_iter must be positive".into()));
        }
        if self.interaction == InteractionKind::SecondOrder && self.symmetry == SymmetryMode::Reduced {
            return Err(DdaError::Incompatibility(
                "second-order interaction kernel cannot combine with reduced-FFT symmetry".into(),
            ));
        }
        if self.interaction == InteractionKind::SecondOrder && self.polarizability.is_anisotropic() {
            return Err(DdaError::Incompatibility(
                "second-order interaction kernel cannot combine with anisotropic (CLDR) polarizability".into(),
            ));
        }
        if self.polarizability.is_anisotropic() && self.symmetry == SymmetryMode::Reduced {
            return Err(DdaError::Incompatibility(
                "reduced-FFT symmetry cannot combine with anisotropic polarizability".into(),
            ));
        }

        let (inc_pol_per, inc_pol_par) = perpendicular_basis(&self.prop);

        let wavenum = std::f64::consts::TAU / lambda;
        let d = lambda / dpl;
        let kd = wavenum * d;

        Ok(RunConfig {
            lambda,
            wavenum,
            d,
            kd,
            refr_index: self.refr_index,
            prop: self.prop,
            inc_pol_per,
            inc_pol_par,
            polarizability: self.polarizability,
            interaction: self.interaction,
            symmetry: self.symmetry,
            iterative_method: self.iterative_method,
            eps: self.eps,
            max_iter: self.max_iter,
            beam: self.beam,
            beam_center: self.beam_center,
            checkpoint: self.checkpoint,
            volume_correction: self.volume_correction,
        })
    }
}

/// Build a right-handed orthonormal pair `(e_per, e_par)` spanning the
/// plane perpendicular to `prop`, with the `prop = z` special case
/// hard-wired to `e_per = x`, `e_par = y` so the general construction
/// never has to divide by `sqrt(1 - prop_z^2)` near zero.
fn perpendicular_basis(prop: &Vec3) -> (Vec3, Vec3) {
    if (prop.z.abs() - 1.0).abs() < 1e-12 {
        return (Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0));
    }
    // e_per = z x prop, normalized; e_par = prop x e_per.
    let z = Vec3::new(0.0, 0.0, 1.0);
    let e_per = z.cross(prop).normalized();
    let e_par = prop.cross(&e_per).normalized();
    (e_per, e_par)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    fn base_builder() -> RunConfigBuilder {
        RunConfigBuilder::new()
            .lambda(std::f64::consts::TAU)
            .dpl(10.0)
            .refr_index(vec![Complex64::new(1.5, 0.0)])
    }

    #[test]
    fn prop_z_special_case_is_exact() {
        let cfg = base_builder().prop(Vec3::new(0.0, 0.0, 1.0)).build().unwrap();
        assert_eq!(cfg.inc_pol_per, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(cfg.inc_pol_par, Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn perpendicular_basis_is_orthonormal_for_oblique_prop() {
        let prop = Vec3::new(1.0, 1.0, 1.0).normalized();
        let cfg = base_builder().prop(prop).build().unwrap();
        assert!(cfg.inc_pol_per.dot(&cfg.inc_pol_par).abs() < 1e-12);
        assert!(cfg.inc_pol_per.dot(&cfg.prop).abs() < 1e-12);
        assert!((cfg.inc_pol_per.norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_so_with_reduced_symmetry() {
        let result = base_builder()
            .interaction(InteractionKind::SecondOrder)
            .symmetry(SymmetryMode::Reduced)
            .build();
        assert!(matches!(result, Err(DdaError::Incompatibility(_))));
    }

    #[test]
    fn rejects_so_with_cldr() {
        let result = base_builder()
            .interaction(InteractionKind::SecondOrder)
            .polarizability(PolarizabilityKind::Cldr)
            .build();
        assert!(matches!(result, Err(DdaError::Incompatibility(_))));
    }

    #[test]
    fn rejects_non_unit_prop() {
        let result = base_builder().prop(Vec3::new(1.0, 1.0, 0.0)).build();
        assert!(matches!(result, Err(DdaError::NumericRange(_))));
    }

    #[test]
    fn ldr_s_factor_is_per_component_sum_not_dot_squared() {
        // Oblique prop with an e that has two nonzero components: the
        // per-component sum sum(prop_i * e_i)^2 and the squared dot
        // product dot(prop, e)^2 disagree here (1/3 vs 2/3), which is
        // exactly the bug the per-axis formula must avoid reintroducing.
        let prop = Vec3::new(1.0, 1.0, 1.0).normalized();
        let cfg = base_builder().prop(prop).build().unwrap();
        let e = Vec3::new(1.0, 1.0, 0.0).normalized();
        assert!((cfg.ldr_s_factor(&e) - 1.0 / 3.0).abs() < 1e-12);
        assert!((cfg.prop.dot(&e).powi(2) - 2.0 / 3.0).abs() < 1e-12);
    }
}
