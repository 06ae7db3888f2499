//! Global sparse assembly of the elemental blocks.
//!
//! The block system is
//!
//! ```text
//! | Aff  Afcᵀ | | pf |   | Ff |
//! | Acf  Acc  | | pc | = | Fc |
//! ```
//!
//! with `Aff` on owned faces, `Acf`/`Afc` on owned cells × used faces and a
//! diagonal `Acc`. The sparsity graphs depend on the mesh only and are built
//! once; numeric assembly rewrites values in place.

use crate::composite_vector::CompositeVector;
use crate::elemental::ElementalBlocks;
use crate::error::{MfdError, Result};
use crate::mesh::{MeshTopology, Parallel};
use crate::sparse;
use nalgebra::DVector;
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::CsrMatrix;
use std::collections::BTreeSet;

/// Face-face and cell-face sparsity patterns
#[derive(Debug, Clone)]
pub struct SparsityGraphs {
    /// Owned faces × owned faces
    pub ff: SparsityPattern,
    /// Owned cells × used faces
    pub cf: SparsityPattern,
    /// Owned row of every used face (ghosts resolved to their owner)
    face_owner: Vec<usize>,
}

impl SparsityGraphs {
    /// Build the graphs from the face lists of all owned cells
    pub fn build(mesh: &dyn MeshTopology) -> Result<Self> {
        let ncells = mesh.num_cells(Parallel::Owned);
        let nfaces_owned = mesh.num_faces(Parallel::Owned);
        let nfaces_used = mesh.num_faces(Parallel::Used);
        let layout = mesh.face_layout();

        let face_owner = (0..nfaces_used)
            .map(|f| {
                let gid = layout.global_id(f);
                layout.owned_index(gid).ok_or_else(|| {
                    MfdError::Invariant(format!(
                        "face {} (global id {}) has no owner on this process",
                        f, gid
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut ff_rows = vec![BTreeSet::new(); nfaces_owned];
        let mut cf_rows = Vec::with_capacity(ncells);
        for c in 0..ncells {
            let (faces, _) = mesh.cell_faces_and_dirs(c);
            for &fi in faces {
                for &fj in faces {
                    ff_rows[face_owner[fi]].insert(face_owner[fj]);
                }
            }
            cf_rows.push(faces.iter().copied().collect::<BTreeSet<_>>());
        }

        let ff = sparse::pattern_from_rows(nfaces_owned, &ff_rows)?;
        let cf = sparse::pattern_from_rows(nfaces_used, &cf_rows)?;
        log::debug!(
            "Sparsity graphs: ff {} nonzeros, cf {} nonzeros",
            ff.nnz(),
            cf.nnz()
        );

        Ok(Self { ff, cf, face_owner })
    }

    /// Owned row for a used face
    pub fn owner(&self, face: usize) -> usize {
        self.face_owner[face]
    }
}

/// Assembled global block operator and right-hand side
#[derive(Debug, Clone)]
pub struct GlobalOperator {
    pub aff: CsrMatrix<f64>,
    pub acf: CsrMatrix<f64>,
    /// `None` when the operator is declared symmetric (shares `acf`)
    afc: Option<CsrMatrix<f64>>,
    pub acc: DVector<f64>,
    pub rhs: CompositeVector,
}

impl GlobalOperator {
    /// Allocate zero-valued matrices on the graphs
    pub fn allocate(graphs: &SparsityGraphs, symmetric: bool) -> Result<Self> {
        let acf = sparse::zeros_on(&graphs.cf)?;
        let afc = if symmetric {
            None
        } else {
            Some(sparse::zeros_on(&graphs.cf)?)
        };
        let ncells = graphs.cf.major_dim();
        let nfaces = graphs.ff.major_dim();
        Ok(Self {
            aff: sparse::zeros_on(&graphs.ff)?,
            acf,
            afc,
            acc: DVector::zeros(ncells),
            rhs: CompositeVector::zeros(ncells, nfaces),
        })
    }

    /// Cell→face block in transposed (cells × used faces) orientation
    pub fn afc(&self) -> &CsrMatrix<f64> {
        self.afc.as_ref().unwrap_or(&self.acf)
    }

    pub fn is_symmetric_storage(&self) -> bool {
        self.afc.is_none()
    }

    /// Write the elemental blocks into the global matrices and rhs
    pub fn assemble(
        &mut self,
        mesh: &dyn MeshTopology,
        graphs: &SparsityGraphs,
        blocks: &[ElementalBlocks],
    ) -> Result<()> {
        sparse::set_zero(&mut self.aff);
        let nfaces_used = mesh.num_faces(Parallel::Used);
        let nfaces_owned = mesh.num_faces(Parallel::Owned);
        let mut ff_ghosted = vec![0.0; nfaces_used];

        for (c, block) in blocks.iter().enumerate() {
            let (faces, _) = mesh.cell_faces_and_dirs(c);

            self.acc[c] = block.acc;
            for (n, &fi) in faces.iter().enumerate() {
                sparse::replace(&mut self.acf, c, fi, block.acf[n])?;
                if let Some(afc) = self.afc.as_mut() {
                    sparse::replace(afc, c, fi, block.afc[n])?;
                }
                let row = graphs.owner(fi);
                for (m, &fm) in faces.iter().enumerate() {
                    sparse::sum_into(&mut self.aff, row, graphs.owner(fm), block.aff[(n, m)])?;
                }
            }

            self.rhs.cell[c] = block.fc;
            for (n, &f) in faces.iter().enumerate() {
                ff_ghosted[f] += block.ff[n];
            }
        }

        mesh.comm().combine(mesh.face_layout(), &mut ff_ghosted)?;
        self.rhs
            .face
            .copy_from_slice(&ff_ghosted[..nfaces_owned]);

        log::debug!("Assembled global matrices for {} cells", blocks.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::GhostLayout;
    use crate::elemental::{create_mass_matrices, create_stiffness_matrices, MfdMethod};
    use crate::mesh::{Cell, Face, PolyMesh};
    use crate::mesh_builder::BoxMeshBuilder;

    fn assembled(mesh: &PolyMesh, symmetric: bool) -> (SparsityGraphs, GlobalOperator, Vec<ElementalBlocks>) {
        let (mass, _) = create_mass_matrices(mesh, MfdMethod::Polyhedra, None).unwrap();
        let (blocks, _) = create_stiffness_matrices(mesh, &mass, None).unwrap();
        let graphs = SparsityGraphs::build(mesh).unwrap();
        let mut op = GlobalOperator::allocate(&graphs, symmetric).unwrap();
        op.assemble(mesh, &graphs, &blocks).unwrap();
        (graphs, op, blocks)
    }

    #[test]
    fn graph_sizes_for_two_cells() {
        let mesh = BoxMeshBuilder::new_2d(2, 1).build().unwrap();
        let graphs = SparsityGraphs::build(&mesh).unwrap();
        // 7 faces; the shared face couples to all 7, others to their cell's 4
        assert_eq!(graphs.ff.major_dim(), 7);
        assert_eq!(graphs.ff.nnz(), 6 * 4 + 7);
        assert_eq!(graphs.cf.nnz(), 8);
    }

    #[test]
    fn shared_face_diagonal_sums_both_cells() {
        let mesh = BoxMeshBuilder::new_2d(2, 1).build().unwrap();
        let (_, op, blocks) = assembled(&mesh, false);
        let shared = mesh.cell_faces_and_dirs(0).0[1];
        let expected = blocks[0].aff[(1, 1)] + blocks[1].aff[(0, 0)];
        assert!((sparse::get(&op.aff, shared, shared) - expected).abs() < 1e-14);
        assert!(sparse::is_symmetric(&op.aff, 1e-12));
        assert_eq!(op.acc[1], blocks[1].acc);
        assert!(!op.is_symmetric_storage());
    }

    #[test]
    fn symmetric_storage_shares_acf() {
        let mesh = BoxMeshBuilder::new_2d(1, 1).build().unwrap();
        let (_, op, _) = assembled(&mesh, true);
        assert!(op.is_symmetric_storage());
        assert_eq!(op.afc().values(), op.acf.values());
    }

    #[test]
    fn ghost_face_load_combines_onto_owner() {
        // Single square cell whose right face is a ghost copy of its left face
        // (periodic in x): used faces 0..4 owned, 4 is a ghost of global id 0.
        let faces = vec![
            Face::new([0.0, 0.5, 0.0], [1.0, 0.0, 0.0]),
            Face::new([0.5, 0.0, 0.0], [0.0, 1.0, 0.0]),
            Face::new([0.5, 1.0, 0.0], [0.0, 1.0, 0.0]),
            Face::new([1.0, 0.5, 0.0], [1.0, 0.0, 0.0]),
            Face::new([1.0, 0.5, 0.0], [1.0, 0.0, 0.0]),
        ];
        let cells = vec![Cell::new(vec![0, 4, 1, 2], vec![-1, 1, -1, 1], [0.5, 0.5, 0.0], 1.0)];
        let face_layout = GhostLayout::new(vec![0, 1, 2, 3, 0], 4).unwrap();
        let mesh = PolyMesh::new(2, cells, faces, GhostLayout::serial(1), face_layout).unwrap();

        let (mass, _) = create_mass_matrices(&mesh, MfdMethod::Polyhedra, None).unwrap();
        let (mut blocks, _) = create_stiffness_matrices(&mesh, &mass, None).unwrap();
        blocks[0].ff[0] = 1.0;
        blocks[0].ff[1] = 2.0;

        let graphs = SparsityGraphs::build(&mesh).unwrap();
        assert_eq!(graphs.owner(4), 0);
        let mut op = GlobalOperator::allocate(&graphs, false).unwrap();
        op.assemble(&mesh, &graphs, &blocks).unwrap();
        assert_eq!(op.rhs.face[0], 3.0);
        assert_eq!(op.rhs.face.len(), 4);
    }
}
