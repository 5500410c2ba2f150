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

//! Mid-solve checkpoint snapshots: one file per process plus a sidecar
//! recording the rank count and this crate's own checkpoint format
//! version, so a restart with the wrong process count or an incompatible
//! build is rejected outright rather than silently misreading bytes.

use std::fs;
use std::path::Path;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::IterativeMethod;
use crate::error::{DdaError, Result};

/// Bumped whenever [`Snapshot`]'s shape changes in a way that would make
/// an old file misread as a new one.
pub const FORMAT_VERSION: u32 = 1;

/// Everything one process needs to resume a Krylov solve mid-flight.
/// `history` holds the solver-specific carry vectors across iterations
/// (QMR-CS: 2, BiCG-CS: 2, BiCGStab: 3) in the order that solver's
/// `solve` loop expects them; a solver that doesn't match the recorded
/// `solver` kind on restart is a caller bug, not something this module
/// can validate generically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub solver: IterativeMethod,
    pub iteration: usize,
    pub residual_norm: f64,
    pub pvec: Vec<Complex64>,
    pub history: Vec<Vec<Complex64>>,
    pub orientation_cursor: usize,
    pub polarization_cursor: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    format_version: u32,
    rank_count: usize,
}

fn rank_file_name(rank: usize) -> String {
    format!("rank_{:06}.bin", rank)
}

fn sidecar_path(directory: &Path) -> std::path::PathBuf {
    directory.join("checkpoint.meta")
}

/// Write `snapshot` for `rank` into `directory`, (re)writing the sidecar
/// with the current `rank_count` every time — cheap, and keeps the
/// sidecar always consistent with whichever rank wrote most recently.
pub fn save(directory: &Path, rank: usize, rank_count: usize, snapshot: &Snapshot) -> Result<()> {
    fs::create_dir_all(directory)
        .map_err(|e| DdaError::FileNotFound(format!("{}: {}", directory.display(), e)))?;

    let sidecar = Sidecar { format_version: FORMAT_VERSION, rank_count };
    let sidecar_bytes = bincode::serialize(&sidecar)
        .map_err(|e| DdaError::CheckpointIncompatible(format!("failed to encode sidecar: {}", e)))?;
    fs::write(sidecar_path(directory), sidecar_bytes)
        .map_err(|e| DdaError::FileNotFound(format!("{}: {}", directory.display(), e)))?;

    let snapshot_bytes = bincode::serialize(snapshot)
        .map_err(|e| DdaError::CheckpointIncompatible(format!("failed to encode snapshot: {}", e)))?;
    fs::write(directory.join(rank_file_name(rank)), snapshot_bytes)
        .map_err(|e| DdaError::FileNotFound(format!("{}: {}", directory.display(), e)))?;

    info!(rank, iteration = snapshot.iteration, "checkpoint written");
    Ok(())
}

/// Load `rank`'s snapshot from `directory`, rejecting a mismatched
/// format version or process count before touching the per-rank file.
pub fn load(directory: &Path, rank: usize, rank_count: usize) -> Result<Snapshot> {
    let sidecar_bytes = fs::read(sidecar_path(directory))
        .map_err(|e| DdaError::FileNotFound(format!("{}: {}", directory.display(), e)))?;
    let sidecar: Sidecar = bincode::deserialize(&sidecar_bytes)
        .map_err(|e| DdaError::CheckpointIncompatible(format!("corrupt sidecar: {}", e)))?;

    if sidecar.format_version != FORMAT_VERSION {
        return Err(DdaError::CheckpointIncompatible(format!(
            "checkpoint format version {} does not match this build's version {}",
            sidecar.format_version, FORMAT_VERSION
        )));
    }
    if sidecar.rank_count != rank_count {
        return Err(DdaError::CheckpointIncompatible(format!(
            "checkpoint was written for {} process(es), restart has {}",
            sidecar.rank_count, rank_count
        )));
    }

    let snapshot_bytes = fs::read(directory.join(rank_file_name(rank)))
        .map_err(|e| DdaError::FileNotFound(format!("{}: {}", directory.display(), e)))?;
    bincode::deserialize(&snapshot_bytes)
        .map_err(|e| DdaError::CheckpointIncompatible(format!("corrupt snapshot for rank {}: {}", rank, e)))
}

/// `fresh -> running -> (checkpoint? -> running)* -> done`, enforced
/// explicitly rather than left as a convention every call site has to
/// remember.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Fresh,
    Running,
    Done,
}

#[derive(Debug)]
pub struct RunLifecycle {
    state: RunState,
}

impl Default for RunLifecycle {
    fn default() -> Self {
        Self { state: RunState::Fresh }
    }
}

impl RunLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn start(&mut self) -> Result<()> {
        if self.state != RunState::Fresh {
            return Err(DdaError::Incompatibility(format!("cannot start a run from state {:?}", self.state)));
        }
        self.state = RunState::Running;
        Ok(())
    }

    /// Record that a checkpoint was written; the run stays `Running`.
    pub fn checkpoint(&mut self) -> Result<()> {
        if self.state != RunState::Running {
            return Err(DdaError::Incompatibility(format!("cannot checkpoint from state {:?}", self.state)));
        }
        Ok(())
    }

    pub fn finish(&mut self) -> Result<()> {
        if self.state != RunState::Running {
            return Err(DdaError::Incompatibility(format!("cannot finish a run from state {:?}", self.state)));
        }
        self.state = RunState::Done;
        Ok(())
    }
}

/// Whether iteration `iteration` of a solve should write a checkpoint,
/// per [`crate::config::CheckpointKind`]. `interval` is the Regular
/// policy's period; `forced` is an external trigger (e.g. an approaching
/// wall-clock limit) that the Normal policy responds to but the
/// Always/Regular policies ignore since they have their own cadence.
pub fn should_checkpoint(
    kind: crate::config::CheckpointKind,
    iteration: usize,
    interval: usize,
    forced: bool,
) -> bool {
    use crate::config::CheckpointKind::*;
    match kind {
        None => false,
        Always => true,
        Regular => interval > 0 && iteration % interval == 0,
        Normal => forced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CheckpointKind;
    use tempfile_shim::TempDir;

    /// A tiny self-contained temp-directory helper so this module's tests
    /// don't need an extra dev-dependency just for directory cleanup.
    mod tempfile_shim {
        use std::path::PathBuf;

        pub struct TempDir {
            path: PathBuf,
        }

        impl TempDir {
            pub fn new(label: &str) -> Self {
                let mut path = std::env::temp_dir();
                path.push(format!("dda_core_checkpoint_test_{}_{}", label, std::process::id()));
                Self { path }
            }

            pub fn path(&self) -> &std::path::Path {
                &self.path
            }
        }

        impl Drop for TempDir {
            fn drop(&mut self) {
                let _ = std::fs::remove_dir_all(&self.path);
            }
        }
    }

    fn sample_snapshot() -> Snapshot {
        Snapshot {
            solver: IterativeMethod::QmrCs,
            iteration: 12,
            residual_norm: 1e-6,
            pvec: vec![Complex64::new(1.0, 0.0), Complex64::new(0.0, -1.0)],
            history: vec![vec![Complex64::new(0.5, 0.5)], vec![Complex64::new(0.0, 0.0)]],
            orientation_cursor: 3,
            polarization_cursor: 1,
        }
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = TempDir::new("roundtrip");
        let snapshot = sample_snapshot();
        save(dir.path(), 0, 1, &snapshot).unwrap();
        let loaded = load(dir.path(), 0, 1).unwrap();
        assert_eq!(loaded.iteration, snapshot.iteration);
        assert_eq!(loaded.pvec, snapshot.pvec);
    }

    #[test]
    fn load_rejects_mismatched_rank_count() {
        let dir = TempDir::new("rank-mismatch");
        save(dir.path(), 0, 2, &sample_snapshot()).unwrap();
        let result = load(dir.path(), 0, 4);
        assert!(matches!(result, Err(DdaError::CheckpointIncompatible(_))));
    }

    #[test]
    fn lifecycle_rejects_checkpoint_before_start() {
        let mut lifecycle = RunLifecycle::new();
        assert!(lifecycle.checkpoint().is_err());
        lifecycle.start().unwrap();
        lifecycle.checkpoint().unwrap();
        lifecycle.finish().unwrap();
        assert!(lifecycle.start().is_err());
    }

    #[test]
    fn should_checkpoint_policies() {
        assert!(!should_checkpoint(CheckpointKind::None, 10, 5, true));
        assert!(should_checkpoint(CheckpointKind::Always, 1, 5, false));
        assert!(should_checkpoint(CheckpointKind::Regular, 10, 5, false));
        assert!(!should_checkpoint(CheckpointKind::Regular, 11, 5, false));
        assert!(should_checkpoint(CheckpointKind::Normal, 3, 5, true));
        assert!(!should_checkpoint(CheckpointKind::Normal, 3, 5, false));
    }
}
