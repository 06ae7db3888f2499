//! Vectors with one cell component and one face component.

use crate::mesh::{MeshTopology, Parallel};
use nalgebra::DVector;

/// Owned-cell and owned-face components of a solution, right-hand side,
/// residual or flux.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeVector {
    pub cell: DVector<f64>,
    pub face: DVector<f64>,
}

impl CompositeVector {
    pub fn zeros(num_cells: usize, num_faces: usize) -> Self {
        Self {
            cell: DVector::zeros(num_cells),
            face: DVector::zeros(num_faces),
        }
    }

    /// Zero vector sized to the owned entities of `mesh`
    pub fn for_mesh(mesh: &dyn MeshTopology) -> Self {
        Self::zeros(mesh.num_cells(Parallel::Owned), mesh.num_faces(Parallel::Owned))
    }

    pub fn from_parts(cell: DVector<f64>, face: DVector<f64>) -> Self {
        Self { cell, face }
    }

    pub fn same_shape(&self, other: &Self) -> bool {
        self.cell.len() == other.cell.len() && self.face.len() == other.face.len()
    }

    pub fn fill(&mut self, value: f64) {
        self.cell.fill(value);
        self.face.fill(value);
    }

    /// `self = alpha * x + beta * self`
    pub fn update(&mut self, alpha: f64, x: &Self, beta: f64) {
        self.cell.axpy(alpha, &x.cell, beta);
        self.face.axpy(alpha, &x.face, beta);
    }

    pub fn dot(&self, other: &Self) -> f64 {
        self.cell.dot(&other.cell) + self.face.dot(&other.face)
    }

    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn norm_inf(&self) -> f64 {
        self.cell.amax().max(self.face.amax())
    }
}
