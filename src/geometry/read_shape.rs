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

//! `-shape read`: geometry taken verbatim from an input file, one line
//! per dipole (`x y z [material]`). This is part of the engine's input
//! *file format*, not a shape formula, so — unlike sphere/cylinder/etc. —
//! it stays in scope.

use std::io::BufRead;

use super::{OccupancyGrid, ShapeDescriptor};
use crate::error::{DdaError, Result};

/// A [`ShapeDescriptor`] that reads an explicit dipole list: one
/// whitespace-separated `x y z [material]` triple/quadruple per line,
/// `#` starts a line comment, blank lines are skipped. Material indices
/// are 0-based and default to 0 when omitted.
pub struct ReadShape {
    grid: OccupancyGrid,
}

impl ReadShape {
    /// Parse the dipole list from `reader` and materialize its occupancy
    /// grid immediately. Parsing up front (rather than lazily inside
    /// [`ShapeDescriptor::occupancy`]) lets `ShapeDescriptor` stay a
    /// plain `&self` query, matching shapes that can be asked for their
    /// geometry more than once.
    pub fn new(mut reader: impl BufRead, source_name: impl Into<String>) -> Result<Self> {
        let source_name = source_name.into();
        let mut sites: Vec<(i64, i64, i64, u8)> = Vec::new();
        let mut line_no = 0usize;
        let mut line = String::new();
        loop {
            line.clear();
            let bytes_read = reader
                .read_line(&mut line)
                .map_err(|e| DdaError::FileFormat { file: source_name.clone(), reason: e.to_string() })?;
            if bytes_read == 0 {
                break;
            }
            line_no += 1;
            let content = match line.find('#') {
                Some(idx) => &line[..idx],
                None => line.as_str(),
            };
            let tokens: Vec<&str> = content.split_whitespace().collect();
            if tokens.is_empty() {
                continue;
            }
            if tokens.len() != 3 && tokens.len() != 4 {
                return Err(DdaError::FileFormat {
                    file: source_name.clone(),
                    reason: format!("line {}: expected 'x y z [material]', got {:?}", line_no, tokens),
                });
            }
            let parse_int = |s: &str| -> Result<i64> {
                s.parse::<i64>().map_err(|_| DdaError::FileFormat {
                    file: source_name.clone(),
                    reason: format!("line {}: '{}' is not an integer", line_no, s),
                })
            };
            let x = parse_int(tokens[0])?;
            let y = parse_int(tokens[1])?;
            let z = parse_int(tokens[2])?;
            let material = if tokens.len() == 4 {
                let m = parse_int(tokens[3])?;
                if m < 0 || m as usize >= crate::types::MAX_NMAT {
                    return Err(DdaError::FileFormat {
                        file: source_name.clone(),
                        reason: format!("line {}: material index {} out of range", line_no, m),
                    });
                }
                m as u8
            } else {
                0
            };
            sites.push((x, y, z, material));
        }
        if sites.is_empty() {
            return Err(DdaError::FileFormat {
                file: source_name.clone(),
                reason: "no dipoles found".into(),
            });
        }

        let (min_x, max_x) = min_max(sites.iter().map(|s| s.0));
        let (min_y, max_y) = min_max(sites.iter().map(|s| s.1));
        let (min_z, max_z) = min_max(sites.iter().map(|s| s.2));

        let nx = round_up_even_min16((max_x - min_x + 1) as usize);
        let ny = round_up_even_min16((max_y - min_y + 1) as usize);
        let nz = round_up_even_min16((max_z - min_z + 1) as usize);

        let mut grid = OccupancyGrid::new(nx, ny, nz);
        for (x, y, z, material) in sites {
            let ix = (x - min_x) as usize;
            let iy = (y - min_y) as usize;
            let iz = (z - min_z) as usize;
            grid.set(ix, iy, iz, material);
        }
        Ok(Self { grid })
    }
}

impl ShapeDescriptor for ReadShape {
    fn occupancy(&self) -> Result<OccupancyGrid> {
        Ok(self.grid.clone())
    }
}

fn min_max(values: impl Iterator<Item = i64>) -> (i64, i64) {
    values.fold((i64::MAX, i64::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

fn round_up_even_min16(n: usize) -> usize {
    let n = n.max(16);
    if n % 2 == 0 {
        n
    } else {
        n + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_simple_dipole_list() {
        let text = "# comment\n0 0 0\n1 0 0 2\n\n0 1 0 # inline comment\n";
        let shape = ReadShape::new(Cursor::new(text), "test.txt").unwrap();
        let grid = shape.occupancy().unwrap();
        assert!(grid.nx >= 16 && grid.nx % 2 == 0);
        assert_eq!(grid.ndip_total(), 3);
    }

    #[test]
    fn rejects_malformed_line() {
        let text = "0 0\n";
        let result = ReadShape::new(Cursor::new(text), "test.txt");
        assert!(matches!(result, Err(DdaError::FileFormat { .. })));
    }

    #[test]
    fn rejects_empty_file() {
        let text = "# only a comment\n";
        let result = ReadShape::new(Cursor::new(text), "test.txt");
        assert!(matches!(result, Err(DdaError::FileFormat { .. })));
    }
}
