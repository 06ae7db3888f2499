//! Block linear operator on composite (cell, face) vectors.
//!
//! `apply` is the forward product of the assembled block system.
//! `apply_inverse` performs static condensation: eliminate the cell
//! unknowns, solve the reduced face system with the preconditioner, and
//! back-substitute.

use crate::assembly::GlobalOperator;
use crate::composite_vector::CompositeVector;
use crate::error::{MfdError, Result};
use crate::krylov::{self, PcgConfig, PcgResult};
use crate::matrix_mfd::{AssemblyState, MatrixMfd};
use crate::mesh::Parallel;
use crate::sparse;
use nalgebra::DVector;

impl MatrixMfd {
    fn check_shape(&self, operation: &str, v: &CompositeVector) -> Result<()> {
        let nc = self.mesh.num_cells(Parallel::Owned);
        let nf = self.mesh.num_faces(Parallel::Owned);
        if v.cell.len() != nc || v.face.len() != nf {
            return Err(MfdError::Invariant(format!(
                "{}: vector has {} cells and {} faces, operator has {} and {}",
                operation,
                v.cell.len(),
                v.face.len(),
                nc,
                nf
            )));
        }
        Ok(())
    }

    /// Owned face values extended with ghost copies from their owners
    pub(crate) fn ghosted_faces(&self, owned: &DVector<f64>) -> Result<Vec<f64>> {
        let nf = self.mesh.num_faces(Parallel::Owned);
        if owned.len() != nf {
            return Err(MfdError::Invariant(format!(
                "face vector has {} entries, mesh owns {} faces",
                owned.len(),
                nf
            )));
        }
        let mut ghosted = vec![0.0; self.mesh.num_faces(Parallel::Used)];
        ghosted[..owned.len()].copy_from_slice(owned.as_slice());
        self.mesh
            .comm()
            .broadcast_to_ghosts(self.mesh.face_layout(), &mut ghosted)?;
        Ok(ghosted)
    }

    /// `Afcᵀ xc` on used faces, summed onto owned faces
    fn afc_transpose_times(&self, global: &GlobalOperator, xc: &[f64]) -> Result<Vec<f64>> {
        let mut y = vec![0.0; self.mesh.num_faces(Parallel::Used)];
        sparse::multiply_transpose(global.afc(), xc, &mut y);
        self.mesh.comm().combine(self.mesh.face_layout(), &mut y)?;
        y.truncate(self.mesh.num_faces(Parallel::Owned));
        Ok(y)
    }

    /// `Y = A X`
    pub fn apply(&self, x: &CompositeVector, y: &mut CompositeVector) -> Result<()> {
        self.require("apply", AssemblyState::Assembled)?;
        let global = self.global("apply")?;
        self.check_shape("apply", x)?;
        self.check_shape("apply", y)?;

        let xf = self.ghosted_faces(&x.face)?;
        let coupling = self.afc_transpose_times(global, x.cell.as_slice())?;

        sparse::multiply(&global.aff, x.face.as_slice(), y.face.as_mut_slice());
        for (yf, c) in y.face.iter_mut().zip(&coupling) {
            *yf += c;
        }

        sparse::multiply(&global.acf, &xf, y.cell.as_mut_slice());
        for ((yc, acc), xc) in y.cell.iter_mut().zip(global.acc.iter()).zip(x.cell.iter()) {
            *yc += acc * xc;
        }
        Ok(())
    }

    /// `Y ≈ A⁻¹ X` through the Schur complement and the preconditioner
    pub fn apply_inverse(&self, x: &CompositeVector, y: &mut CompositeVector) -> Result<()> {
        self.require("apply_inverse", AssemblyState::Preconditioned)?;
        let global = self.global("apply_inverse")?;
        let prec = self
            .preconditioner
            .as_ref()
            .ok_or_else(|| MfdError::Configuration("no preconditioner configured".to_string()))?;
        self.check_shape("apply_inverse", x)?;
        self.check_shape("apply_inverse", y)?;

        // Forward elimination
        let tc = x.cell.component_div(&global.acc);
        let coupling = self.afc_transpose_times(global, tc.as_slice())?;
        let tf: Vec<f64> = x.face.iter().zip(&coupling).map(|(xf, c)| xf - c).collect();

        // Reduced face solve
        prec.apply_inverse(&tf, y.face.as_mut_slice())?;

        // Back substitution
        let yf = self.ghosted_faces(&y.face)?;
        sparse::multiply(&global.acf, &yf, y.cell.as_mut_slice());
        for ((yc, xc), acc) in y.cell.iter_mut().zip(x.cell.iter()).zip(global.acc.iter()) {
            *yc = (xc - *yc) / acc;
        }
        Ok(())
    }

    /// `apply_inverse` with input and output in the same storage
    pub fn apply_inverse_in_place(&self, xy: &mut CompositeVector) -> Result<()> {
        let x = xy.clone();
        self.apply_inverse(&x, xy)
    }

    /// `r = f - A x`; returns `‖r‖`
    pub fn compute_residual(&self, x: &CompositeVector, r: &mut CompositeVector) -> Result<f64> {
        self.apply(x, r)?;
        let global = self.global("compute_residual")?;
        r.update(1.0, &global.rhs, -1.0);
        Ok(r.norm())
    }

    /// `r = A x - f`; returns `‖r‖`
    pub fn compute_negative_residual(
        &self,
        x: &CompositeVector,
        r: &mut CompositeVector,
    ) -> Result<f64> {
        self.apply(x, r)?;
        let global = self.global("compute_negative_residual")?;
        r.update(-1.0, &global.rhs, 1.0);
        Ok(r.norm())
    }

    /// Conjugate gradients on the block system with `apply_inverse` as the
    /// preconditioner, starting from the current `x`.
    pub fn solve(&self, x: &mut CompositeVector, config: &PcgConfig) -> Result<PcgResult> {
        let rhs = self.global("solve")?.rhs.clone();
        krylov::pcg(
            |v, av| self.apply(v, av),
            |r, z| self.apply_inverse(r, z),
            &rhs,
            x,
            config,
        )
    }

    fn replace_reduced_by_aff(&mut self, operation: &'static str) -> Result<()> {
        self.require(operation, AssemblyState::Assembled)?;
        let aff = self.global(operation)?.aff.clone();
        let prec = self
            .preconditioner
            .as_mut()
            .ok_or_else(|| MfdError::Configuration("no preconditioner configured".to_string()))?;
        prec.update(&aff)?;
        self.sff = Some(aff);
        self.state = AssemblyState::Preconditioned;
        Ok(())
    }

    /// Solve the face-only system `Aff uf = ff - Afcᵀ uc` for the face part
    /// of `u` given its cell part. `Sff` is replaced by `Aff`.
    pub fn update_consistent_face_constraints(&mut self, u: &mut CompositeVector) -> Result<()> {
        let operation = "update_consistent_face_constraints";
        self.check_shape(operation, u)?;
        self.replace_reduced_by_aff(operation)?;

        let global = self.global(operation)?;
        let coupling = self.afc_transpose_times(global, u.cell.as_slice())?;
        let rhs_f: Vec<f64> = global
            .rhs
            .face
            .iter()
            .zip(&coupling)
            .map(|(f, c)| f - c)
            .collect();

        let prec = self
            .preconditioner
            .as_ref()
            .ok_or_else(|| MfdError::Configuration("no preconditioner configured".to_string()))?;
        prec.apply_inverse(&rhs_f, u.face.as_mut_slice())
    }

    /// Face part of a correction: `Aff Puf = uf - Afcᵀ Puc`.
    /// `Sff` is replaced by `Aff`.
    pub fn update_consistent_face_correction(
        &mut self,
        u: &CompositeVector,
        pu: &mut CompositeVector,
    ) -> Result<()> {
        let operation = "update_consistent_face_correction";
        self.check_shape(operation, u)?;
        self.check_shape(operation, pu)?;
        self.replace_reduced_by_aff(operation)?;

        let global = self.global(operation)?;
        let coupling = self.afc_transpose_times(global, pu.cell.as_slice())?;
        let update: Vec<f64> = u.face.iter().zip(&coupling).map(|(f, c)| f - c).collect();

        let prec = self
            .preconditioner
            .as_ref()
            .ok_or_else(|| MfdError::Configuration("no preconditioner configured".to_string()))?;
        prec.apply_inverse(&update, pu.face.as_mut_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary_conditions::BoundaryConditions;
    use crate::config::MatrixMfdConfig;
    use crate::mesh::MeshTopology;
    use crate::mesh_builder::BoxMeshBuilder;
    use std::sync::Arc;

    fn preconditioned(preconditioner: &str) -> (Arc<dyn MeshTopology>, MatrixMfd) {
        let mesh: Arc<dyn MeshTopology> = Arc::new(BoxMeshBuilder::new_2d(3, 2).build().unwrap());
        let config = MatrixMfdConfig::new("polyhedra").with_preconditioner(preconditioner);
        let mut op = MatrixMfd::new(mesh.clone(), config).unwrap();
        op.create_mass_matrices(None).unwrap();
        let mut bcs = BoundaryConditions::for_mesh(&*mesh);
        bcs.set_dirichlet(0, 1.0).unwrap();
        op.update(None, &bcs).unwrap();
        (mesh, op)
    }

    fn sample(mesh: &dyn MeshTopology) -> CompositeVector {
        let mut v = CompositeVector::for_mesh(mesh);
        for (i, x) in v.cell.iter_mut().enumerate() {
            *x = 1.0 + i as f64;
        }
        for (i, x) in v.face.iter_mut().enumerate() {
            *x = 0.5 * i as f64 - 1.0;
        }
        v
    }

    #[test]
    fn direct_apply_inverse_inverts_apply() {
        let (mesh, op) = preconditioned("Direct");
        let x = sample(&*mesh);
        let mut ax = CompositeVector::for_mesh(&*mesh);
        op.apply(&x, &mut ax).unwrap();
        let mut back = CompositeVector::for_mesh(&*mesh);
        op.apply_inverse(&ax, &mut back).unwrap();

        back.update(-1.0, &x, 1.0);
        assert!(back.norm_inf() < 1e-10);
    }

    #[test]
    fn in_place_matches_out_of_place() {
        let (mesh, op) = preconditioned("ILU");
        let x = sample(&*mesh);
        let mut y = CompositeVector::for_mesh(&*mesh);
        op.apply_inverse(&x, &mut y).unwrap();
        let mut xy = x.clone();
        op.apply_inverse_in_place(&mut xy).unwrap();
        assert_eq!(xy, y);
    }

    #[test]
    fn residual_signs_are_opposite() {
        let (mesh, op) = preconditioned("Direct");
        let x = sample(&*mesh);
        let mut r = CompositeVector::for_mesh(&*mesh);
        let mut nr = CompositeVector::for_mesh(&*mesh);
        let norm = op.compute_residual(&x, &mut r).unwrap();
        let nnorm = op.compute_negative_residual(&x, &mut nr).unwrap();
        assert!((norm - nnorm).abs() < 1e-12);
        r.update(1.0, &nr, 1.0);
        assert!(r.norm_inf() < 1e-12);
    }

    #[test]
    fn apply_inverse_needs_preconditioner() {
        let mesh: Arc<dyn MeshTopology> = Arc::new(BoxMeshBuilder::new_2d(1, 1).build().unwrap());
        let mut op = MatrixMfd::new(mesh.clone(), MatrixMfdConfig::new("polyhedra")).unwrap();
        op.create_mass_matrices(None).unwrap();
        op.update(None, &BoundaryConditions::for_mesh(&*mesh)).unwrap();

        let x = CompositeVector::for_mesh(&*mesh);
        let mut y = x.clone();
        assert!(op.apply(&x, &mut y).is_ok());
        assert!(op.apply_inverse(&x, &mut y).unwrap_err().is_configuration());
        assert!(op.update_preconditioner().unwrap_err().is_configuration());
    }

    #[test]
    fn consistent_face_constraints_leave_rhs_untouched() {
        let (mesh, mut op) = preconditioned("Direct");
        let rhs_before = op.rhs().unwrap().clone();
        let mut u = sample(&*mesh);
        op.update_consistent_face_constraints(&mut u).unwrap();
        assert_eq!(op.rhs().unwrap(), &rhs_before);

        // Face rows of A u now match the face rhs
        let mut au = CompositeVector::for_mesh(&*mesh);
        op.apply(&u, &mut au).unwrap();
        for (a, f) in au.face.iter().zip(rhs_before.face.iter()) {
            assert!((a - f).abs() < 1e-10);
        }
    }
}
