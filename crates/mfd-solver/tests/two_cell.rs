//! Two cells side by side with no-flow outer faces.

use mfd_solver::{
    BoundaryConditions, BoundaryMarker, BoxMeshBuilder, CompositeVector, MatrixMfd,
    MatrixMfdConfig, MeshTopology, MfdMethod, PcgConfig, PolyMesh, Tensor,
};
use std::sync::Arc;

fn two_cells() -> PolyMesh {
    BoxMeshBuilder::new_3d(2, 1, 1)
        .extent(&[0.0, 0.0, 0.0], &[2.0, 1.0, 1.0])
        .build()
        .expect("two-cell mesh")
}

/// Cell and face values of `p(x) = a + b·x`
fn linear(mesh: &dyn MeshTopology, a: f64, b: f64) -> CompositeVector {
    let mut p = CompositeVector::for_mesh(mesh);
    for c in 0..p.cell.len() {
        p.cell[c] = a + b * mesh.cell_centroid(c)[0];
    }
    for f in 0..p.face.len() {
        p.face[f] = a + b * mesh.face_centroid(f)[0];
    }
    p
}

fn assembled(
    method: MfdMethod,
    preconditioner: Option<&str>,
    bcs_of: impl Fn(&PolyMesh) -> BoundaryConditions,
) -> (Arc<PolyMesh>, MatrixMfd) {
    let mesh = Arc::new(two_cells());
    let bcs = bcs_of(&*mesh);
    let mut config = MatrixMfdConfig::new(method.name());
    config.preconditioner = preconditioner.map(str::to_string);
    let mut op = MatrixMfd::new(mesh.clone(), config).expect("valid configuration");
    let k = vec![Tensor::isotropic(3, 2.0); 2];
    op.create_mass_matrices(Some(&k)).expect("mass matrices");
    op.update(None, &bcs).expect("update sequence");
    (mesh, op)
}

#[test]
fn test_constant_pressure_is_in_the_kernel() {
    // Pure no-flow problem: the reduced matrix is singular, so no preconditioner
    let no_flow = |m: &PolyMesh| {
        let mut bcs = BoundaryConditions::for_mesh(m);
        let sides: Vec<String> = m.face_set_names().map(str::to_string).collect();
        for side in &sides {
            bcs.on_sides(m, side, BoundaryMarker::Flux, 0.0).expect("side");
        }
        assert_eq!(bcs.counts(), (0, 10));
        bcs
    };
    for method in MfdMethod::ALL {
        let (mesh, op) = assembled(method, None, no_flow);
        let p = linear(&*mesh, 3.0, 0.0);
        let mut r = CompositeVector::for_mesh(&*mesh);
        let norm = op.compute_residual(&p, &mut r).expect("residual");
        assert!(norm < 1e-12, "{}: residual {}", method, norm);
    }
}

#[test]
fn test_residual_vanishes_at_exact_linear_solution() {
    let bcs_of = |m: &PolyMesh| {
        let mut bcs = BoundaryConditions::for_mesh(m);
        bcs.on_sides(m, "xmin", BoundaryMarker::Dirichlet, 1.0).expect("xmin");
        bcs.on_sides(m, "xmax", BoundaryMarker::Dirichlet, -1.0).expect("xmax");
        bcs
    };
    for method in MfdMethod::ALL {
        let (mesh, op) = assembled(method, Some("Direct"), bcs_of);
        let exact = linear(&*mesh, 1.0, -1.0);
        let mut r = CompositeVector::for_mesh(&*mesh);
        let norm = op.compute_residual(&exact, &mut r).expect("residual");
        assert!(norm < 1e-12, "{}: residual {}", method, norm);
    }
}

#[test]
fn test_flux_boundary_drives_uniform_flow() {
    // Inflow of 2 through xmin, p = 0 on xmax, K = 2: p = 2 - x, flux = 2
    let bcs_of = |m: &PolyMesh| {
        let mut bcs = BoundaryConditions::for_mesh(m);
        bcs.on_sides(m, "xmin", BoundaryMarker::Flux, -2.0).expect("xmin");
        bcs.on_sides(m, "xmax", BoundaryMarker::Dirichlet, 0.0).expect("xmax");
        bcs
    };
    let (mesh, op) = assembled(MfdMethod::Polyhedra, Some("Direct"), bcs_of);

    let mut solution = CompositeVector::for_mesh(&*mesh);
    let result = op.solve(&mut solution, &PcgConfig::default()).expect("solve");
    assert!(result.converged);

    let exact = linear(&*mesh, 2.0, -1.0);
    let mut diff = solution.clone();
    diff.update(-1.0, &exact, 1.0);
    assert!(diff.norm_inf() < 1e-10, "error {}", diff.norm_inf());

    let flux = op.derive_flux(&solution).expect("flux");
    let xmin = mesh.face_set("xmin").expect("xmin")[0];
    let xmax = mesh.face_set("xmax").expect("xmax")[0];
    assert!((flux[xmin] - 2.0).abs() < 1e-10);
    assert!((flux[xmax] - 2.0).abs() < 1e-10);
}
