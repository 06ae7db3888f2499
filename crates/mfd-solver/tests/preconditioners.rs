//! Every preconditioner available in this build drives conjugate gradients
//! to the exact solution of a linear-pressure problem.

use mfd_solver::preconditioner::BlockIluParameters;
use mfd_solver::{
    BoundaryConditions, BoundaryMarker, BoxMeshBuilder, CompositeVector, MatrixMfd,
    MatrixMfdConfig, MeshTopology, PcgConfig, PolyMesh, PreconditionerKind,
};
use std::sync::Arc;

fn problem() -> (Arc<PolyMesh>, BoundaryConditions) {
    let mesh = Arc::new(BoxMeshBuilder::new_2d(8, 8).build().expect("box"));
    let mut bcs = BoundaryConditions::for_mesh(&*mesh);
    bcs.on_sides(&mesh, "xmin", BoundaryMarker::Dirichlet, 1.0)
        .expect("xmin");
    bcs.on_sides(&mesh, "xmax", BoundaryMarker::Dirichlet, 0.0)
        .expect("xmax");
    (mesh, bcs)
}

fn exact(mesh: &dyn MeshTopology) -> CompositeVector {
    let mut p = CompositeVector::for_mesh(mesh);
    for c in 0..p.cell.len() {
        p.cell[c] = 1.0 - mesh.cell_centroid(c)[0];
    }
    for f in 0..p.face.len() {
        p.face[f] = 1.0 - mesh.face_centroid(f)[0];
    }
    p
}

fn solve_with(config: MatrixMfdConfig) -> (usize, f64) {
    let (mesh, bcs) = problem();
    let mut op = MatrixMfd::new(mesh.clone(), config).expect("configuration");
    op.create_mass_matrices(None).expect("mass");
    op.update(None, &bcs).expect("update sequence");

    let mut solution = CompositeVector::for_mesh(&*mesh);
    let pcg = PcgConfig {
        tolerance: 1e-12,
        max_iterations: 400,
    };
    let result = op.solve(&mut solution, &pcg).expect("solve");
    assert!(result.converged, "{:?}", op.preconditioner_name());

    solution.update(-1.0, &exact(&*mesh), 1.0);
    (result.iterations, solution.norm_inf())
}

#[test]
fn test_every_available_variant_converges() {
    for kind in PreconditionerKind::ALL {
        if !kind.is_available() {
            continue;
        }
        let config = MatrixMfdConfig::new("polyhedra").with_preconditioner(kind.name());
        let (iterations, error) = solve_with(config);
        assert!(error < 1e-8, "{}: error {} after {} iterations", kind, error, iterations);
    }
}

#[test]
fn test_direct_converges_in_one_iteration() {
    let (iterations, error) =
        solve_with(MatrixMfdConfig::new("polyhedra").with_preconditioner("Direct"));
    assert_eq!(iterations, 1);
    assert!(error < 1e-10);
}

#[test]
fn test_block_ilu_with_overlap() {
    let mut config = MatrixMfdConfig::new("polyhedra").with_preconditioner("Block ILU");
    config.block_ilu = BlockIluParameters {
        overlap: 1,
        local_parts: 4,
        ..Default::default()
    };
    let (_, error) = solve_with(config);
    assert!(error < 1e-8);
}

#[test]
fn test_preconditioner_rebuilt_after_coefficient_change() {
    let (mesh, bcs) = problem();
    let config = MatrixMfdConfig::new("polyhedra").with_preconditioner("ML");
    let mut op = MatrixMfd::new(mesh.clone(), config).expect("configuration");
    op.create_mass_matrices(None).expect("mass");
    op.update(None, &bcs).expect("first update");

    let krel = mfd_solver::RelativeConductivity::uniform_cell(64, 4.0);
    op.update(Some(&krel), &bcs).expect("second update");

    // Uniform scaling of the conductivity leaves the pressure unchanged
    let mut solution = CompositeVector::for_mesh(&*mesh);
    let result = op.solve(&mut solution, &PcgConfig::default()).expect("solve");
    assert!(result.converged);
    solution.update(-1.0, &exact(&*mesh), 1.0);
    assert!(solution.norm_inf() < 1e-7);
}

#[cfg(not(feature = "hypre"))]
#[test]
fn test_hypre_variants_need_the_feature() {
    let (mesh, _) = problem();
    for name in ["HYPRE AMG", "HYPRE Euclid", "HYPRE ParaSails"] {
        let config = MatrixMfdConfig::new("polyhedra").with_preconditioner(name);
        let err = MatrixMfd::new(mesh.clone(), config).expect_err("not in this build");
        assert!(err.is_configuration());
        assert!(err.to_string().contains("not supported in this build"));
    }
}
