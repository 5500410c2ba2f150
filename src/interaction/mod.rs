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

//! The hot path: `y = alpha^-1 . x - G_conv(x)`, where `G_conv` is the
//! dipole-dipole interaction tensor applied via FFT-accelerated
//! convolution on a doubled (zero-padded) grid.

pub mod kernel;
mod fft_matvec;

pub use fft_matvec::FftMatVec;
