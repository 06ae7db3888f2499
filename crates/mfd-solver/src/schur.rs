//! Face Schur complement of the block system.
//!
//! Eliminating the cell unknown of each cell gives the local face matrix
//! `S = Aff - Afc Acfᵀ / Acc`. Local matrices are summed into the global
//! `Sff` on the face-face pattern. Dirichlet faces keep an identity row and
//! column.

use crate::assembly::SparsityGraphs;
use crate::boundary_conditions::BoundaryConditions;
use crate::elemental::ElementalBlocks;
use crate::error::{MfdError, Result};
use crate::mesh::MeshTopology;
use crate::sparse;
use nalgebra::DMatrix;
use nalgebra_sparse::CsrMatrix;

/// Relative threshold below which a cell diagonal is treated as zero
pub const ACC_TOLERANCE: f64 = 1e-14;

/// Local Schur matrix of one cell
pub fn local_schur(
    c: usize,
    block: &ElementalBlocks,
    faces: &[usize],
    bcs: &BoundaryConditions,
) -> Result<DMatrix<f64>> {
    let scale = block.aff_free.amax().max(block.acc.abs());
    if block.acc.abs() <= ACC_TOLERANCE * scale || block.acc == 0.0 {
        return Err(MfdError::Numerical(format!(
            "cell {} has a vanishing diagonal Acc = {:e}",
            c, block.acc
        )));
    }

    let n = faces.len();
    let mut schur = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            schur[(i, j)] = block.aff[(i, j)] - block.afc[i] * block.acf[j] / block.acc;
        }
    }

    for (i, &f) in faces.iter().enumerate() {
        if bcs.is_dirichlet(f) {
            for j in 0..n {
                schur[(i, j)] = 0.0;
                schur[(j, i)] = 0.0;
            }
            schur[(i, i)] = 1.0;
        }
    }
    Ok(schur)
}

/// Rebuild `sff` from the current elemental blocks
pub fn compute_schur_complement(
    mesh: &dyn MeshTopology,
    graphs: &SparsityGraphs,
    blocks: &[ElementalBlocks],
    bcs: &BoundaryConditions,
    sff: &mut CsrMatrix<f64>,
) -> Result<()> {
    sparse::set_zero(sff);
    for (c, block) in blocks.iter().enumerate() {
        let (faces, _) = mesh.cell_faces_and_dirs(c);
        let schur = local_schur(c, block, faces, bcs)?;
        for (i, &fi) in faces.iter().enumerate() {
            let row = graphs.owner(fi);
            for (j, &fj) in faces.iter().enumerate() {
                sparse::sum_into(sff, row, graphs.owner(fj), schur[(i, j)])?;
            }
        }
    }
    log::debug!("Computed face Schur complement ({} nonzeros)", sff.nnz());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elemental::{create_mass_matrices, create_stiffness_matrices, MfdMethod};
    use crate::mesh_builder::BoxMeshBuilder;
    use approx::assert_relative_eq;

    #[test]
    fn local_schur_annihilates_constants() {
        // Without boundary conditions S·1 = 0 (pressure is defined up to a constant)
        let mesh = BoxMeshBuilder::new_2d(1, 1).build().unwrap();
        let (mass, _) = create_mass_matrices(&mesh, MfdMethod::Polyhedra, None).unwrap();
        let (blocks, _) = create_stiffness_matrices(&mesh, &mass, None).unwrap();
        let bcs = BoundaryConditions::for_mesh(&mesh);
        let (faces, _) = mesh.cell_faces_and_dirs(0);
        let s = local_schur(0, &blocks[0], faces, &bcs).unwrap();
        for i in 0..4 {
            assert_relative_eq!(s.row(i).sum(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn dirichlet_face_is_identity() {
        let mesh = BoxMeshBuilder::new_2d(2, 1).build().unwrap();
        let (mass, _) = create_mass_matrices(&mesh, MfdMethod::TwoPointFlux, None).unwrap();
        let (mut blocks, krel) = create_stiffness_matrices(&mesh, &mass, None).unwrap();
        let mut bcs = BoundaryConditions::for_mesh(&mesh);
        bcs.set_dirichlet(0, 1.0).unwrap();
        bcs.eliminate(&mesh, &mut blocks, &krel).unwrap();

        let graphs = SparsityGraphs::build(&mesh).unwrap();
        let mut sff = sparse::zeros_on(&graphs.ff).unwrap();
        compute_schur_complement(&mesh, &graphs, &blocks, &bcs, &mut sff).unwrap();
        assert_eq!(sparse::get(&sff, 0, 0), 1.0);
        assert_eq!(sparse::get(&sff, 0, 1), 0.0);
        assert_eq!(sparse::get(&sff, 1, 0), 0.0);
        assert!(sparse::is_symmetric(&sff, 1e-12));
    }

    #[test]
    fn zero_acc_is_fatal() {
        let mesh = BoxMeshBuilder::new_2d(1, 1).build().unwrap();
        let (mass, _) = create_mass_matrices(&mesh, MfdMethod::Polyhedra, None).unwrap();
        let (mut blocks, _) = create_stiffness_matrices(&mesh, &mass, None).unwrap();
        blocks[0].acc = 0.0;
        let bcs = BoundaryConditions::for_mesh(&mesh);
        let (faces, _) = mesh.cell_faces_and_dirs(0);
        let err = local_schur(0, &blocks[0], faces, &bcs).unwrap_err();
        assert!(matches!(err, MfdError::Numerical(_)));
        assert!(err.to_string().contains("cell 0"));
    }
}
