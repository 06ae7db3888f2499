//! Material coefficients: absolute conductivity tensors and relative
//! conductivity scalars.

use crate::error::{MfdError, Result};
use nalgebra::{DMatrix, DVector};

/// Symmetric positive-definite `d × d` conductivity tensor
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: DMatrix<f64>,
}

impl Tensor {
    /// Isotropic tensor `k I`
    pub fn isotropic(dimension: usize, k: f64) -> Self {
        Self {
            data: DMatrix::from_diagonal_element(dimension, dimension, k),
        }
    }

    /// Identity tensor, used when no coefficient is supplied
    pub fn identity(dimension: usize) -> Self {
        Self::isotropic(dimension, 1.0)
    }

    /// Diagonal (axis-aligned anisotropic) tensor
    pub fn diagonal(values: &[f64]) -> Self {
        Self {
            data: DMatrix::from_diagonal(&DVector::from_column_slice(values)),
        }
    }

    /// Full tensor; must be square
    pub fn full(data: DMatrix<f64>) -> Result<Self> {
        if !data.is_square() {
            return Err(MfdError::Configuration(format!(
                "Conductivity tensor must be square, got {}x{}",
                data.nrows(),
                data.ncols()
            )));
        }
        Ok(Self { data })
    }

    pub fn dimension(&self) -> usize {
        self.data.nrows()
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    pub fn trace(&self) -> f64 {
        self.data.trace()
    }

    /// Symmetric to round-off and Cholesky-factorisable
    pub fn is_spd(&self) -> bool {
        let scale = self.data.amax().max(f64::MIN_POSITIVE);
        let symmetric = (&self.data - self.data.transpose()).amax() <= 1e-12 * scale;
        symmetric && self.data.clone().cholesky().is_some()
    }

    pub fn inverse(&self) -> Option<DMatrix<f64>> {
        self.data.clone().try_inverse()
    }

    /// `K v`
    pub fn apply(&self, v: &DVector<f64>) -> DVector<f64> {
        &self.data * v
    }
}

/// Relative conductivity (mobility) scalars.
///
/// Either component may be absent, in which case it is taken as `1`. The
/// face component, when present, covers used faces (owned plus ghosts).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelativeConductivity {
    pub cell: Option<Vec<f64>>,
    pub face: Option<Vec<f64>>,
}

impl RelativeConductivity {
    pub fn new(cell: Option<Vec<f64>>, face: Option<Vec<f64>>) -> Self {
        Self { cell, face }
    }

    /// Uniform cell scaling, no face component
    pub fn uniform_cell(num_cells: usize, value: f64) -> Self {
        Self {
            cell: Some(vec![value; num_cells]),
            face: None,
        }
    }

    /// Check component lengths against the mesh and that every value is
    /// positive and finite
    pub fn validate(&self, num_owned_cells: usize, num_used_faces: usize) -> Result<()> {
        for (kind, values) in [("cell", &self.cell), ("face", &self.face)] {
            let Some(values) = values else { continue };
            if let Some((i, v)) = values
                .iter()
                .enumerate()
                .find(|(_, v)| !(v.is_finite() && **v > 0.0))
            {
                return Err(MfdError::Configuration(format!(
                    "Relative conductivity {} value {} at index {} is not positive and finite",
                    kind, v, i
                )));
            }
        }
        if let Some(cell) = &self.cell {
            if cell.len() < num_owned_cells {
                return Err(MfdError::Configuration(format!(
                    "Relative conductivity has {} cell values, mesh has {} owned cells",
                    cell.len(),
                    num_owned_cells
                )));
            }
        }
        if let Some(face) = &self.face {
            if face.len() != num_used_faces {
                return Err(MfdError::Configuration(format!(
                    "Relative conductivity has {} face values, mesh has {} used faces",
                    face.len(),
                    num_used_faces
                )));
            }
        }
        Ok(())
    }

    pub fn cell_value(&self, c: usize) -> f64 {
        self.cell.as_ref().map_or(1.0, |v| v[c])
    }

    /// Face component with ghosts, filled with `1` when absent
    pub fn face_values(&self, num_used_faces: usize) -> Vec<f64> {
        self.face
            .clone()
            .unwrap_or_else(|| vec![1.0; num_used_faces])
    }
}
