//! Post-processing of a converged pressure solution.
//!
//! Recovers the conservative face flux and a least-squares cell velocity.

use crate::composite_vector::CompositeVector;
use crate::error::{MfdError, Result};
use crate::matrix_mfd::{AssemblyState, MatrixMfd};
use crate::mesh::{MeshTopology, Parallel};
use nalgebra::{DMatrix, DVector};
use serde::Serialize;

/// Min/max/mean summary of a field
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl MatrixMfd {
    /// Face flux (in the orientation of each face normal) from a solution.
    ///
    /// Every owned face is set by the first owned cell that visits it, using
    /// the face block taken before boundary elimination. A face left unset
    /// is an invariant violation.
    pub fn derive_flux(&self, solution: &CompositeVector) -> Result<DVector<f64>> {
        self.require("derive_flux", AssemblyState::ElementalBuilt)?;
        let mesh = &*self.mesh;
        let ncells = mesh.num_cells(Parallel::Owned);
        let nfaces_owned = mesh.num_faces(Parallel::Owned);
        let nfaces_used = mesh.num_faces(Parallel::Used);
        if solution.cell.len() != ncells || solution.face.len() != nfaces_owned {
            return Err(MfdError::Invariant(format!(
                "derive_flux: solution has {} cells and {} faces, mesh has {} and {}",
                solution.cell.len(),
                solution.face.len(),
                ncells,
                nfaces_owned
            )));
        }

        let pf = self.ghosted_faces(&solution.face)?;
        let mut flux = vec![0.0; nfaces_used];
        let mut done = vec![false; nfaces_used];

        for (c, block) in self.blocks.iter().enumerate() {
            let (faces, dirs) = mesh.cell_faces_and_dirs(c);
            let dp: DVector<f64> =
                DVector::from_iterator(faces.len(), faces.iter().map(|&f| solution.cell[c] - pf[f]));

            for (n, &f) in faces.iter().enumerate() {
                if done[f] {
                    continue;
                }
                let s = block.aff_free.row(n).transpose().dot(&dp);
                flux[f] = s * f64::from(dirs[n]) * self.krel_face[f];
                done[f] = true;
            }
        }

        if let Some(f) = done[..nfaces_owned].iter().position(|d| !d) {
            return Err(MfdError::Invariant(format!(
                "derive_flux: owned face {} was not visited by any owned cell",
                f
            )));
        }

        flux.truncate(nfaces_owned);
        Ok(DVector::from_vec(flux))
    }

    /// Cell velocity from face fluxes (`ncells × d`).
    ///
    /// Least-squares fit `Σ ν νᵀ u = Σ ν flux` over the faces of each cell,
    /// `ν` the area-weighted face normal.
    pub fn derive_cell_velocity(&self, flux: &DVector<f64>) -> Result<DMatrix<f64>> {
        derive_cell_velocity(&*self.mesh, &self.ghosted_faces(flux)?)
    }
}

/// Cell velocity from face fluxes given on all used faces
pub fn derive_cell_velocity(mesh: &dyn MeshTopology, flux: &[f64]) -> Result<DMatrix<f64>> {
    let ncells = mesh.num_cells(Parallel::Owned);
    let d = mesh.space_dimension();
    if flux.len() != mesh.num_faces(Parallel::Used) {
        return Err(MfdError::Invariant(format!(
            "derive_cell_velocity: {} flux values for {} used faces",
            flux.len(),
            mesh.num_faces(Parallel::Used)
        )));
    }

    let mut velocity = DMatrix::zeros(ncells, d);
    for c in 0..ncells {
        let (faces, _) = mesh.cell_faces_and_dirs(c);
        let mut matrix = DMatrix::zeros(d, d);
        let mut rhs = DVector::zeros(d);
        for &f in faces {
            let normal = mesh.face_normal(f);
            for i in 0..d {
                rhs[i] += normal[i] * flux[f];
                for j in 0..d {
                    matrix[(i, j)] += normal[i] * normal[j];
                }
            }
        }

        let chol = matrix.cholesky().ok_or_else(|| {
            MfdError::Numerical(format!(
                "velocity normal equations of cell {} are not positive definite",
                c
            ))
        })?;
        let u = chol.solve(&rhs);
        velocity.row_mut(c).copy_from(&u.transpose());
    }
    Ok(velocity)
}

/// Summary of a field; `None` for an empty field
pub fn compute_statistics(values: &[f64]) -> Option<FieldStatistics> {
    if values.is_empty() {
        return None;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    Some(FieldStatistics { min, max, mean })
}

/// Net flux leaving the domain through `faces`, given each face's outward
/// sign
pub fn boundary_outflow(flux: &DVector<f64>, faces: &[usize], dirs: &[i32]) -> f64 {
    faces
        .iter()
        .zip(dirs)
        .map(|(&f, &dir)| flux[f] * f64::from(dir))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary_conditions::BoundaryConditions;
    use crate::config::MatrixMfdConfig;
    use crate::mesh_builder::BoxMeshBuilder;
    use approx::assert_abs_diff_eq;
    use std::sync::Arc;

    fn linear_pressure(mesh: &dyn MeshTopology, gradient: [f64; 3]) -> CompositeVector {
        let mut p = CompositeVector::for_mesh(mesh);
        for c in 0..p.cell.len() {
            let x = mesh.cell_centroid(c);
            p.cell[c] = (0..3).map(|i| gradient[i] * x[i]).sum();
        }
        for f in 0..p.face.len() {
            let x = mesh.face_centroid(f);
            p.face[f] = (0..3).map(|i| gradient[i] * x[i]).sum();
        }
        p
    }

    fn stiffness(mesh: Arc<dyn MeshTopology>, method: &str) -> MatrixMfd {
        let mut op = MatrixMfd::new(mesh, MatrixMfdConfig::new(method)).unwrap();
        op.create_mass_matrices(None).unwrap();
        op.create_stiffness_matrices(None).unwrap();
        op
    }

    #[test]
    fn test_flux_of_linear_pressure() {
        let mesh: Arc<dyn MeshTopology> = Arc::new(
            BoxMeshBuilder::new_2d(3, 2)
                .axis_coordinates(0, vec![0.0, 0.3, 0.5, 1.0])
                .build()
                .unwrap(),
        );
        for method in ["polyhedra", "optimized", "support operator", "two point flux"] {
            let op = stiffness(mesh.clone(), method);
            // p = -x gives u = e_x with K = I
            let p = linear_pressure(&*mesh, [-1.0, 0.0, 0.0]);
            let flux = op.derive_flux(&p).unwrap();
            for f in 0..flux.len() {
                let n = mesh.face_normal(f);
                assert_abs_diff_eq!(flux[f], n[0], epsilon = 1e-12);
            }

            let u = op.derive_cell_velocity(&flux).unwrap();
            for c in 0..u.nrows() {
                assert_abs_diff_eq!(u[(c, 0)], 1.0, epsilon = 1e-12);
                assert_abs_diff_eq!(u[(c, 1)], 0.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_flux_uses_block_before_elimination() {
        let mesh: Arc<dyn MeshTopology> = Arc::new(BoxMeshBuilder::new_2d(2, 1).build().unwrap());
        let mut op = stiffness(mesh.clone(), "polyhedra");
        let p = linear_pressure(&*mesh, [0.0, 2.0, 0.0]);
        let before = op.derive_flux(&p).unwrap();

        let mut bcs = BoundaryConditions::for_mesh(&*mesh);
        bcs.set_dirichlet(0, 1.0).unwrap();
        op.apply_boundary_conditions(&bcs).unwrap();
        let after = op.derive_flux(&p).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_flux_scaled_by_face_krel() {
        use crate::coefficients::RelativeConductivity;
        let mesh: Arc<dyn MeshTopology> = Arc::new(BoxMeshBuilder::new_2d(1, 1).build().unwrap());
        let mut op = MatrixMfd::new(mesh.clone(), MatrixMfdConfig::new("polyhedra")).unwrap();
        op.create_mass_matrices(None).unwrap();
        op.create_stiffness_matrices(Some(&RelativeConductivity::new(
            None,
            Some(vec![1.0, 3.0, 1.0, 1.0]),
        )))
        .unwrap();
        let p = linear_pressure(&*mesh, [-1.0, 0.0, 0.0]);
        let flux = op.derive_flux(&p).unwrap();
        assert_abs_diff_eq!(flux[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(flux[1], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_velocity_rejects_mismatched_flux_length() {
        let mesh: Arc<dyn MeshTopology> = Arc::new(BoxMeshBuilder::new_2d(2, 1).build().unwrap());
        let op = stiffness(mesh.clone(), "polyhedra");
        let nf = mesh.num_faces(Parallel::Owned);
        for len in [nf - 1, nf + 3] {
            let err = op.derive_cell_velocity(&DVector::zeros(len)).unwrap_err();
            assert!(matches!(err, MfdError::Invariant(_)), "{}", err);
        }
        assert!(op.derive_cell_velocity(&DVector::zeros(nf)).is_ok());
    }

    #[test]
    fn test_flux_before_stiffness_is_rejected() {
        let mesh: Arc<dyn MeshTopology> = Arc::new(BoxMeshBuilder::new_2d(1, 1).build().unwrap());
        let op = MatrixMfd::new(mesh.clone(), MatrixMfdConfig::new("polyhedra")).unwrap();
        let p = CompositeVector::for_mesh(&*mesh);
        assert!(op.derive_flux(&p).unwrap_err().is_configuration());
    }

    #[test]
    fn test_compute_statistics() {
        let stats = compute_statistics(&[1.0, -2.0, 4.0]).unwrap();
        assert_eq!(stats.min, -2.0);
        assert_eq!(stats.max, 4.0);
        assert_eq!(stats.mean, 1.0);
        assert!(compute_statistics(&[]).is_none());
    }

    #[test]
    fn test_boundary_outflow() {
        let flux = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        assert_eq!(boundary_outflow(&flux, &[0, 2], &[-1, 1]), 2.0);
    }
}
