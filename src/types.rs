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

//! Small shared numeric types used across the whole crate.

use num_complex::Complex64;

/// Maximum number of distinct materials a particle may be built from.
pub const MAX_NMAT: usize = 10;

/// Numbers smaller than this (compared to unity) are treated as zero.
pub const ROUND_ERR: f64 = 1e-15;

/// `k*R^2/d < G_BOUND_CLOSE` selects the 'close' correction branch of the
/// second-order interaction kernel.
pub const G_BOUND_CLOSE: f64 = 1.0;
/// `k*R < G_BOUND_MEDIAN` selects the 'median' correction branch of the
/// second-order interaction kernel.
pub const G_BOUND_MEDIAN: f64 = 1.0;

/// A real 3-vector, used for dipole coordinates, propagation directions
/// and incident polarizations.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(&self, other: &Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: &Vec3) -> Vec3 {
        Vec3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn scale(&self, s: f64) -> Vec3 {
        Vec3::new(self.x * s, self.y * s, self.z * s)
    }

    pub fn add(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn sub(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    /// Component indexed by axis (0=x, 1=y, 2=z).
    pub fn component(&self, axis: usize) -> f64 {
        match axis {
            0 => self.x,
            1 => self.y,
            2 => self.z,
            _ => panic!("Vec3 axis out of range: {}", axis),
        }
    }

    pub fn normalized(&self) -> Vec3 {
        self.scale(1.0 / self.norm())
    }
}

/// A diagonal 3x3 complex tensor, stored as three scalar components. Used
/// both for the anisotropic polarizability (one value per axis) and for
/// per-axis quantities derived from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Diag3 {
    pub x: Complex64,
    pub y: Complex64,
    pub z: Complex64,
}

impl Diag3 {
    pub fn isotropic(value: Complex64) -> Self {
        Self { x: value, y: value, z: value }
    }

    pub fn component(&self, axis: usize) -> Complex64 {
        match axis {
            0 => self.x,
            1 => self.y,
            2 => self.z,
            _ => panic!("Diag3 axis out of range: {}", axis),
        }
    }
}

/// A complex 3-vector (e.g. one dipole's polarization or incident field).
pub type CVec3 = [Complex64; 3];

pub fn cvec3_zero() -> CVec3 {
    [Complex64::new(0.0, 0.0); 3]
}

pub fn cvec3_dot(a: &CVec3, b: &CVec3) -> Complex64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Hermitian inner product `a . conj(b)`.
pub fn cvec3_dot_conj(a: &CVec3, b: &CVec3) -> Complex64 {
    a[0] * b[0].conj() + a[1] * b[1].conj() + a[2] * b[2].conj()
}

pub fn cvec3_norm2(a: &CVec3) -> f64 {
    a.iter().map(|c| c.norm_sqr()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec3_basic_algebra() {
        let a = Vec3::new(1.0, 0.0, 0.0);
        let b = Vec3::new(0.0, 1.0, 0.0);
        assert_eq!(a.cross(&b), Vec3::new(0.0, 0.0, 1.0));
        assert!((a.dot(&b)).abs() < 1e-15);
        assert!((a.norm() - 1.0).abs() < 1e-15);
    }

    #[test]
    fn cvec3_norm_matches_dot_conj() {
        let v: CVec3 = [
            Complex64::new(1.0, 2.0),
            Complex64::new(0.0, -1.0),
            Complex64::new(3.0, 0.0),
        ];
        let n2 = cvec3_norm2(&v);
        let dot = cvec3_dot_conj(&v, &v).re;
        assert!((n2 - dot).abs() < 1e-12);
    }
}
