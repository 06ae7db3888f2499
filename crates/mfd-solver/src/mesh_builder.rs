//! Structured Cartesian mesh builder.
//!
//! Produces a [`PolyMesh`] on an axis-aligned box in 2-D or 3-D with either
//! uniform or per-axis graded spacing. Cells are numbered x-fastest. Faces
//! are grouped by normal axis; within a group they are numbered x-fastest on
//! the face grid. Every face normal points along `+e_axis`, so each cell sees
//! its lower faces with orientation `-1` and its upper faces with `+1`.
//!
//! Per-cell face order is `x-, x+, y-, y+` (then `z-, z+` in 3-D). The six
//! (or four) box sides are registered as face sets named `xmin`, `xmax`,
//! `ymin`, `ymax`, `zmin`, `zmax`.

use crate::error::{MfdError, Result};
use crate::mesh::{Cell, Face, PolyMesh};

const SIDE_NAMES: [[&str; 2]; 3] = [["xmin", "xmax"], ["ymin", "ymax"], ["zmin", "zmax"]];

/// Builds a Cartesian box mesh
#[derive(Debug, Clone)]
pub struct BoxMeshBuilder {
    dimension: usize,
    coords: Vec<Vec<f64>>,
}

impl BoxMeshBuilder {
    /// Uniform `nx × ny` mesh of the unit square
    pub fn new_2d(nx: usize, ny: usize) -> Self {
        Self {
            dimension: 2,
            coords: vec![uniform(0.0, 1.0, nx), uniform(0.0, 1.0, ny)],
        }
    }

    /// Uniform `nx × ny × nz` mesh of the unit cube
    pub fn new_3d(nx: usize, ny: usize, nz: usize) -> Self {
        Self {
            dimension: 3,
            coords: vec![
                uniform(0.0, 1.0, nx),
                uniform(0.0, 1.0, ny),
                uniform(0.0, 1.0, nz),
            ],
        }
    }

    /// Stretch the box to `[lower, upper]`, keeping the cell counts uniform
    pub fn extent(mut self, lower: &[f64], upper: &[f64]) -> Self {
        for axis in 0..self.dimension {
            let n = self.coords[axis].len().saturating_sub(1);
            self.coords[axis] = uniform(lower[axis], upper[axis], n);
        }
        self
    }

    /// Replace the node coordinates along one axis (graded spacing)
    pub fn axis_coordinates(mut self, axis: usize, coords: Vec<f64>) -> Self {
        if axis < self.dimension {
            self.coords[axis] = coords;
        }
        self
    }

    fn cells_along(&self, axis: usize) -> usize {
        if axis < self.dimension {
            self.coords[axis].len() - 1
        } else {
            1
        }
    }

    fn width(&self, axis: usize, i: usize) -> f64 {
        if axis < self.dimension {
            self.coords[axis][i + 1] - self.coords[axis][i]
        } else {
            1.0
        }
    }

    fn mid(&self, axis: usize, i: usize) -> f64 {
        if axis < self.dimension {
            0.5 * (self.coords[axis][i] + self.coords[axis][i + 1])
        } else {
            0.0
        }
    }

    fn validate(&self) -> Result<()> {
        for (axis, coords) in self.coords.iter().enumerate() {
            if coords.len() < 2 {
                return Err(MfdError::Configuration(format!(
                    "Box mesh needs at least one cell along axis {}",
                    axis
                )));
            }
            if coords.windows(2).any(|w| w[1] <= w[0]) {
                return Err(MfdError::Configuration(format!(
                    "Box mesh coordinates along axis {} must be strictly increasing",
                    axis
                )));
            }
        }
        Ok(())
    }

    /// Build the mesh
    pub fn build(&self) -> Result<PolyMesh> {
        self.validate()?;
        let d = self.dimension;
        let n = [self.cells_along(0), self.cells_along(1), self.cells_along(2)];

        // Face grid per normal axis: one extra layer along that axis
        let mut offsets = [0usize; 3];
        let mut grids = [[0usize; 3]; 3];
        let mut total = 0;
        for axis in 0..d {
            let mut grid = n;
            grid[axis] += 1;
            grids[axis] = grid;
            offsets[axis] = total;
            total += grid[0] * grid[1] * grid[2];
        }

        let face_id = |axis: usize, idx: [usize; 3]| -> usize {
            let g = grids[axis];
            offsets[axis] + idx[0] + g[0] * (idx[1] + g[1] * idx[2])
        };

        let mut faces = Vec::with_capacity(total);
        let mut sides: [[Vec<usize>; 2]; 3] = Default::default();
        for axis in 0..d {
            let g = grids[axis];
            for k in 0..g[2] {
                for j in 0..g[1] {
                    for i in 0..g[0] {
                        let idx = [i, j, k];
                        let mut centroid = [0.0; 3];
                        let mut area = 1.0;
                        for b in 0..d {
                            if b == axis {
                                centroid[b] = self.coords[b][idx[b]];
                            } else {
                                centroid[b] = self.mid(b, idx[b]);
                                area *= self.width(b, idx[b]);
                            }
                        }
                        let mut normal = [0.0; 3];
                        normal[axis] = area;

                        let id = faces.len();
                        debug_assert_eq!(id, face_id(axis, idx));
                        if idx[axis] == 0 {
                            sides[axis][0].push(id);
                        } else if idx[axis] == n[axis] {
                            sides[axis][1].push(id);
                        }
                        faces.push(Face::new(centroid, normal));
                    }
                }
            }
        }

        let mut cells = Vec::with_capacity(n[0] * n[1] * n[2]);
        for k in 0..n[2] {
            for j in 0..n[1] {
                for i in 0..n[0] {
                    let idx = [i, j, k];
                    let mut cell_faces = Vec::with_capacity(2 * d);
                    let mut dirs = Vec::with_capacity(2 * d);
                    let mut centroid = [0.0; 3];
                    let mut volume = 1.0;
                    for axis in 0..d {
                        let mut upper = idx;
                        upper[axis] += 1;
                        cell_faces.push(face_id(axis, idx));
                        dirs.push(-1);
                        cell_faces.push(face_id(axis, upper));
                        dirs.push(1);
                        centroid[axis] = self.mid(axis, idx[axis]);
                        volume *= self.width(axis, idx[axis]);
                    }
                    cells.push(Cell::new(cell_faces, dirs, centroid, volume));
                }
            }
        }

        let mut mesh = PolyMesh::serial(d, cells, faces)?;
        for axis in 0..d {
            let [lower, upper] = std::mem::take(&mut sides[axis]);
            mesh.add_face_set(SIDE_NAMES[axis][0], lower)?;
            mesh.add_face_set(SIDE_NAMES[axis][1], upper)?;
        }

        log::debug!(
            "Built {}-D box mesh: {} cells, {} faces",
            d,
            n[0] * n[1] * n[2],
            total
        );
        Ok(mesh)
    }
}

fn uniform(lower: f64, upper: f64, n: usize) -> Vec<f64> {
    let h = (upper - lower) / n.max(1) as f64;
    (0..=n).map(|i| lower + h * i as f64).collect()
}
