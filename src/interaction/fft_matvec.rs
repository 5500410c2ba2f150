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

//! FFT-accelerated application of `y = alpha^-1 . x - G_conv(x)`.
//!
//! The 3D transform is separable: forward transform along one axis,
//! permute, forward transform along the next, repeated for the third
//! axis; the inverse mirrors it. The three padded axes generally differ
//! in length (`2*Nx`, `2*Ny`, `2*Nz` need not be equal), so [`permute3`]
//! is a rectangular axis permutation through a scratch buffer rather
//! than an in-place square transpose.
//!
//! This crate's `FftMatVec` requires a single-process lattice
//! (`local_z0 == 0`, `local_z1 == nz`): the `Collectives::all_to_all`
//! hook that a distributed build would use for the Y/Z-slab transpose is
//! defined on the [`crate::decomposition::Collectives`] trait, but wiring
//! a real multi-rank transpose through it is left to a production
//! MPI-backed implementation of that trait, consistent with this crate
//! shipping only [`crate::decomposition::SingleProcessCollectives`].

use std::cell::RefCell;
use std::sync::Arc;

use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use super::kernel::{interaction_tensor, SymTensor3};
use crate::config::RunConfig;
use crate::error::{DdaError, Result};
use crate::geometry::Lattice;
use crate::polarizability::AlphaRepresentation;
use crate::solvers::MatVec;

/// `ceil(x/y)` for `x > 0`, the chunk-size helper the teacher's own
/// `convolve_2d_parallel` uses to size per-thread row batches.
#[cfg(not(target_arch = "wasm32"))]
fn ceil_div(x: usize, y: usize) -> usize {
    debug_assert!(x > 0);
    1 + (x - 1) / y
}

/// Permute a 3D array (`n[0]` fastest, `n[1]`, `n[2]` slowest) so that the
/// axis named by `perm[0]` becomes fastest, `perm[1]` next, `perm[2]`
/// slowest. `perm` is a permutation of `{0,1,2}` read as "which original
/// axis index lands in this new slot".
fn permute3(src: &[Complex64], n: [usize; 3], perm: [usize; 3]) -> Vec<Complex64> {
    let (n0, n1, n2) = (n[0], n[1], n[2]);
    let dims_new = [n[perm[0]], n[perm[1]], n[perm[2]]];
    let mut dst = vec![Complex64::new(0.0, 0.0); n0 * n1 * n2];
    for i2 in 0..n2 {
        for i1 in 0..n1 {
            for i0 in 0..n0 {
                let src_idx = i0 + n0 * (i1 + n1 * i2);
                let orig = [i0, i1, i2];
                let new_idx = [orig[perm[0]], orig[perm[1]], orig[perm[2]]];
                let dst_idx = new_idx[0] + dims_new[0] * (new_idx[1] + dims_new[1] * new_idx[2]);
                dst[dst_idx] = src[src_idx];
            }
        }
    }
    dst
}

/// Everything needed to apply a 1D FFT (forward or inverse) to every
/// batched row of a flattened multi-dimensional buffer.
struct AxisTransform {
    fft: Arc<dyn Fft<f64>>,
}

impl AxisTransform {
    fn new(fft: Arc<dyn Fft<f64>>) -> Self {
        Self { fft }
    }

    /// Serial application: a single call into `rustfft`, which already
    /// treats `buffer` as a batch of `buffer.len() / fft.len()` consecutive
    /// transforms.
    fn apply(&self, buffer: &mut [Complex64]) {
        let mut scratch = vec![Complex64::new(0.0, 0.0); self.fft.get_inplace_scratch_len()];
        self.fft.process_with_scratch(buffer, &mut scratch);
    }

    /// Parallel application, generalized from the teacher's
    /// `convolve_2d_parallel`: split the batch of rows into
    /// `thread_pool.thread_count()` contiguous chunks (each an exact
    /// multiple of the transform length, so no row straddles a chunk
    /// boundary) and process them concurrently. Falls back to the serial
    /// path when the pool has fewer than two threads, exactly as the
    /// teacher's own code does.
    #[cfg(not(target_arch = "wasm32"))]
    fn apply_parallel(&self, buffer: &mut [Complex64], thread_pool: &mut scoped_threadpool::Pool) {
        let num_threads = thread_pool.thread_count() as usize;
        if num_threads < 2 {
            return self.apply(buffer);
        }
        let row_len = self.fft.len();
        let num_rows = buffer.len() / row_len;
        let rows_per_chunk = ceil_div(num_rows, num_threads).max(1);
        let chunk_size = row_len * rows_per_chunk;
        thread_pool.scoped(|scope| {
            for buffer_chunk in buffer.chunks_mut(chunk_size) {
                let fft = self.fft.clone();
                let mut local_scratch = vec![Complex64::new(0.0, 0.0); fft.get_inplace_scratch_len()];
                scope.execute(move || {
                    fft.process_with_scratch(buffer_chunk, &mut local_scratch);
                });
            }
        });
    }
}

/// Matrix-free application of `y = alpha^-1 . x - G_conv(x)` over a
/// doubled, zero-padded grid, precomputing `Ghat` once at construction.
pub struct FftMatVec {
    gx: usize,
    gy: usize,
    gz: usize,
    /// `Ghat`, stored in the frequency-domain `(z, x, y)` layout the
    /// forward transform pipeline produces, already scaled by
    /// `1/(gx*gy*gz)` so the inverse transform needs no extra division:
    /// the normalization factor is baked in here rather than applied
    /// again on every inverse transform.
    ghat: Vec<SymTensor3>,
    /// Flattened `(x,y,z)`-order padded-grid index for each locally owned
    /// dipole, used for both scatter (before the forward transform) and
    /// gather (after the inverse transform).
    site_grid_index: Vec<usize>,
    alpha_inv: Vec<AlphaRepresentation>,
    fft_x: AxisTransform,
    ifft_x: AxisTransform,
    fft_y: AxisTransform,
    ifft_y: AxisTransform,
    fft_z: AxisTransform,
    ifft_z: AxisTransform,
    /// Per-process thread pool the plane transforms are batched across,
    /// generalized from the teacher's `convolve_2d_parallel`. Wrapped in a
    /// `RefCell` since [`MatVec::apply`] takes `&self` but
    /// `scoped_threadpool::Pool::scoped` needs `&mut`.
    #[cfg(not(target_arch = "wasm32"))]
    thread_pool: RefCell<scoped_threadpool::Pool>,
}

impl FftMatVec {
    pub fn new(config: &RunConfig, lattice: &Lattice, alphas: &[AlphaRepresentation]) -> Result<Self> {
        if lattice.local_z0 != 0 || lattice.local_z1 != lattice.nz {
            return Err(DdaError::Incompatibility(
                "FftMatVec requires a single-process lattice (local slab == full box); \
                 a distributed transpose would go through Collectives::all_to_all, but no \
                 backend beyond SingleProcessCollectives ships in this crate".into(),
            ));
        }
        let (nx, ny, nz) = (lattice.nx, lattice.ny, lattice.nz);
        let (gx, gy, gz) = (2 * nx, 2 * ny, 2 * nz);

        let mut planner = FftPlanner::new();
        let fft_x = AxisTransform::new(planner.plan_fft_forward(gx));
        let ifft_x = AxisTransform::new(planner.plan_fft_inverse(gx));
        let fft_y = AxisTransform::new(planner.plan_fft_forward(gy));
        let ifft_y = AxisTransform::new(planner.plan_fft_inverse(gy));
        let fft_z = AxisTransform::new(planner.plan_fft_forward(gz));
        let ifft_z = AxisTransform::new(planner.plan_fft_inverse(gz));

        let ghat = build_ghat(config, gx, gy, gz, &fft_x, &fft_y, &fft_z);

        let cx = (nx as f64 - 1.0) / 2.0;
        let cy = (ny as f64 - 1.0) / 2.0;
        let cz = (nz as f64 - 1.0) / 2.0;
        let mut site_grid_index = Vec::with_capacity(lattice.dipole_coord.len());
        for coord in &lattice.dipole_coord {
            let ix = (coord.x / config.d + cx).round() as usize;
            let iy = (coord.y / config.d + cy).round() as usize;
            let iz = (coord.z / config.d + cz).round() as usize;
            if ix >= nx || iy >= ny || iz >= nz {
                return Err(DdaError::GeometryInconsistent(format!(
                    "dipole coordinate {:?} maps outside the {}x{}x{} box", coord, nx, ny, nz
                )));
            }
            site_grid_index.push(ix + gx * (iy + gy * iz));
        }

        let alpha_inv: Vec<AlphaRepresentation> = lattice
            .material
            .iter()
            .map(|&mat| alphas[mat as usize].inverse())
            .collect();

        #[cfg(not(target_arch = "wasm32"))]
        let thread_pool = {
            let num_threads = std::thread::available_parallelism()
                .map(|n| n.get() as u32)
                .unwrap_or(1);
            RefCell::new(scoped_threadpool::Pool::new(num_threads))
        };

        Ok(Self {
            gx,
            gy,
            gz,
            ghat,
            site_grid_index,
            alpha_inv,
            fft_x,
            ifft_x,
            fft_y,
            ifft_y,
            fft_z,
            ifft_z,
            #[cfg(not(target_arch = "wasm32"))]
            thread_pool,
        })
    }

    /// Dispatch one axis transform through the per-process thread pool,
    /// falling back to the serial path on targets (wasm32) where
    /// `scoped_threadpool` is unavailable.
    #[cfg(not(target_arch = "wasm32"))]
    fn apply_axis(&self, axis: &AxisTransform, buffer: &mut [Complex64]) {
        let mut pool = self.thread_pool.borrow_mut();
        axis.apply_parallel(buffer, &mut pool);
    }

    #[cfg(target_arch = "wasm32")]
    fn apply_axis(&self, axis: &AxisTransform, buffer: &mut [Complex64]) {
        axis.apply(buffer);
    }

    /// Forward transform, `(x,y,z)` (x fastest) in, `(z,x,y)` (z fastest) out.
    fn forward_transform(&self, mut field: Vec<Complex64>) -> Vec<Complex64> {
        self.apply_axis(&self.fft_x, &mut field);
        let mut field = permute3(&field, [self.gx, self.gy, self.gz], [1, 0, 2]);
        self.apply_axis(&self.fft_y, &mut field);
        let mut field = permute3(&field, [self.gy, self.gx, self.gz], [2, 1, 0]);
        self.apply_axis(&self.fft_z, &mut field);
        field
    }

    /// Inverse of [`Self::forward_transform`]: `(z,x,y)` in, `(x,y,z)` out.
    fn inverse_transform(&self, mut field: Vec<Complex64>) -> Vec<Complex64> {
        self.apply_axis(&self.ifft_z, &mut field);
        let mut field = permute3(&field, [self.gz, self.gx, self.gy], [2, 1, 0]);
        self.apply_axis(&self.ifft_y, &mut field);
        let mut field = permute3(&field, [self.gy, self.gx, self.gz], [1, 0, 2]);
        self.apply_axis(&self.ifft_x, &mut field);
        field
    }
}

fn build_ghat(
    config: &RunConfig,
    gx: usize,
    gy: usize,
    gz: usize,
    fft_x: &AxisTransform,
    fft_y: &AxisTransform,
    fft_z: &AxisTransform,
) -> Vec<SymTensor3> {
    let total = gx * gy * gz;
    let mut components: [Vec<Complex64>; 6] = [
        vec![Complex64::new(0.0, 0.0); total],
        vec![Complex64::new(0.0, 0.0); total],
        vec![Complex64::new(0.0, 0.0); total],
        vec![Complex64::new(0.0, 0.0); total],
        vec![Complex64::new(0.0, 0.0); total],
        vec![Complex64::new(0.0, 0.0); total],
    ];

    let wrap = |i: usize, n: usize| -> f64 {
        if i <= n / 2 { i as f64 } else { i as f64 - n as f64 }
    };

    for iz in 0..gz {
        let rz = wrap(iz, gz) * config.d;
        for iy in 0..gy {
            let ry = wrap(iy, gy) * config.d;
            for ix in 0..gx {
                let rx = wrap(ix, gx) * config.d;
                let idx = ix + gx * (iy + gy * iz);
                let t = if rx == 0.0 && ry == 0.0 && rz == 0.0 {
                    SymTensor3::ZERO
                } else {
                    interaction_tensor(config, rx, ry, rz)
                };
                components[0][idx] = t.xx;
                components[1][idx] = t.yy;
                components[2][idx] = t.zz;
                components[3][idx] = t.xy;
                components[4][idx] = t.xz;
                components[5][idx] = t.yz;
            }
        }
    }

    let norm = 1.0 / total as f64;
    let freq: Vec<Vec<Complex64>> = components
        .into_iter()
        .map(|mut field| {
            fft_x.apply(&mut field);
            let mut field = permute3(&field, [gx, gy, gz], [1, 0, 2]);
            fft_y.apply(&mut field);
            let mut field = permute3(&field, [gy, gx, gz], [2, 1, 0]);
            fft_z.apply(&mut field);
            field.iter_mut().for_each(|c| *c *= norm);
            field
        })
        .collect();

    (0..total)
        .map(|k| SymTensor3 {
            xx: freq[0][k],
            yy: freq[1][k],
            zz: freq[2][k],
            xy: freq[3][k],
            xz: freq[4][k],
            yz: freq[5][k],
        })
        .collect()
}

impl MatVec for FftMatVec {
    fn len(&self) -> usize {
        3 * self.site_grid_index.len()
    }

    fn apply(&self, x: &[Complex64], y: &mut [Complex64]) -> Result<()> {
        let local_ndip = self.site_grid_index.len();
        if x.len() != 3 * local_ndip || y.len() != 3 * local_ndip {
            return Err(DdaError::NumericRange(format!(
                "FftMatVec operates on vectors of length {}, got x={} y={}",
                3 * local_ndip, x.len(), y.len()
            )));
        }
        let total = self.gx * self.gy * self.gz;
        let mut field_x = vec![Complex64::new(0.0, 0.0); total];
        let mut field_y = vec![Complex64::new(0.0, 0.0); total];
        let mut field_z = vec![Complex64::new(0.0, 0.0); total];
        for (i, &idx) in self.site_grid_index.iter().enumerate() {
            field_x[idx] = x[3 * i];
            field_y[idx] = x[3 * i + 1];
            field_z[idx] = x[3 * i + 2];
        }

        let freq_x = self.forward_transform(field_x);
        let freq_y = self.forward_transform(field_y);
        let freq_z = self.forward_transform(field_z);

        let mut out_x = vec![Complex64::new(0.0, 0.0); total];
        let mut out_y = vec![Complex64::new(0.0, 0.0); total];
        let mut out_z = vec![Complex64::new(0.0, 0.0); total];
        for k in 0..total {
            let p = self.ghat[k].apply(&[freq_x[k], freq_y[k], freq_z[k]]);
            out_x[k] = p[0];
            out_y[k] = p[1];
            out_z[k] = p[2];
        }

        let conv_x = self.inverse_transform(out_x);
        let conv_y = self.inverse_transform(out_y);
        let conv_z = self.inverse_transform(out_z);

        for (i, &idx) in self.site_grid_index.iter().enumerate() {
            let ai = self.alpha_inv[i];
            y[3 * i] = ai.component(0) * x[3 * i] - conv_x[idx];
            y[3 * i + 1] = ai.component(1) * x[3 * i + 1] - conv_y[idx];
            y[3 * i + 2] = ai.component(2) * x[3 * i + 2] - conv_z[idx];
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfigBuilder;
    use crate::geometry::OccupancyGrid;
    use crate::polarizability::all_material_alphas;
    use crate::types::Vec3;

    fn small_config() -> RunConfig {
        RunConfigBuilder::default()
            .lambda(1.0)
            .dpl(8.0)
            .refr_index(vec![num_complex::Complex64::new(1.3, 0.0)])
            .prop(Vec3::new(0.0, 0.0, 1.0))
            .build()
            .unwrap()
    }

    fn tiny_lattice() -> Lattice {
        let mut grid = OccupancyGrid::new(16, 16, 16);
        grid.set(8, 8, 8, 0);
        grid.set(8, 8, 9, 0);
        Lattice::from_occupancy(&grid, 1.0, 0, 1).unwrap()
    }

    #[test]
    fn matvec_on_zero_input_is_zero() {
        let config = small_config();
        let lattice = tiny_lattice();
        let alphas = all_material_alphas(&config).unwrap();
        let op = FftMatVec::new(&config, &lattice, &alphas).unwrap();
        let x = vec![Complex64::new(0.0, 0.0); op.len()];
        let mut y = vec![Complex64::new(0.0, 0.0); op.len()];
        op.apply(&x, &mut y).unwrap();
        assert!(y.iter().all(|c| c.norm() < 1e-12));
    }

    #[test]
    fn matvec_single_dipole_diagonal_matches_alpha_inverse() {
        // With only one occupied site the convolution has nothing to couple
        // to at zero lag beyond the (excluded) self term, so y should equal
        // alpha^-1 . x exactly.
        let config = small_config();
        let mut grid = OccupancyGrid::new(16, 16, 16);
        grid.set(8, 8, 8, 0);
        let lattice = Lattice::from_occupancy(&grid, 1.0, 0, 1).unwrap();
        let alphas = all_material_alphas(&config).unwrap();
        let op = FftMatVec::new(&config, &lattice, &alphas).unwrap();
        let x = vec![Complex64::new(1.0, 0.5), Complex64::new(0.0, 0.0), Complex64::new(-0.3, 0.1)];
        let mut y = vec![Complex64::new(0.0, 0.0); 3];
        op.apply(&x, &mut y).unwrap();
        let alpha_inv = alphas[0].inverse();
        for axis in 0..3 {
            let expected = alpha_inv.component(axis) * x[axis];
            assert!((y[axis] - expected).norm() < 1e-8, "axis {} mismatch: {:?} vs {:?}", axis, y[axis], expected);
        }
    }

    #[test]
    fn rejects_multi_rank_lattice() {
        let config = small_config();
        let mut grid = OccupancyGrid::new(16, 16, 16);
        grid.set(8, 8, 8, 0);
        let lattice = Lattice::from_occupancy(&grid, 1.0, 0, 2).unwrap();
        let alphas = all_material_alphas(&config).unwrap();
        let result = FftMatVec::new(&config, &lattice, &alphas);
        assert!(matches!(result, Err(DdaError::Incompatibility(_))));
    }

    #[test]
    fn parallel_axis_transform_matches_serial() {
        let mut planner = FftPlanner::new();
        let row_len = 8usize;
        let num_rows = 12usize;
        let serial_axis = AxisTransform::new(planner.plan_fft_forward(row_len));
        let parallel_axis = AxisTransform::new(planner.plan_fft_forward(row_len));

        let input: Vec<Complex64> = (0..row_len * num_rows)
            .map(|i| Complex64::new(i as f64 * 0.1, -(i as f64) * 0.05))
            .collect();

        let mut serial_buf = input.clone();
        serial_axis.apply(&mut serial_buf);

        let mut parallel_buf = input;
        let mut pool = scoped_threadpool::Pool::new(4);
        parallel_axis.apply_parallel(&mut parallel_buf, &mut pool);

        for (s, p) in serial_buf.iter().zip(parallel_buf.iter()) {
            assert!((s - p).norm() < 1e-9, "{:?} vs {:?}", s, p);
        }
    }
}
