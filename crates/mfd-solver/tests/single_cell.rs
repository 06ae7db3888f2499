//! Single unit-cube cell with Dirichlet data on all six faces.

use approx::assert_abs_diff_eq;
use mfd_solver::{
    BoundaryConditions, BoxMeshBuilder, CompositeVector, MatrixMfd, MatrixMfdConfig, MeshTopology,
    MfdMethod,
};
use std::sync::Arc;

fn solve_cube(method: MfdMethod, values: [f64; 6]) -> (Arc<dyn MeshTopology>, MatrixMfd, CompositeVector) {
    let mesh: Arc<dyn MeshTopology> =
        Arc::new(BoxMeshBuilder::new_3d(1, 1, 1).build().expect("unit cube"));
    let config = MatrixMfdConfig::new(method.name()).with_preconditioner("Direct");
    let mut op = MatrixMfd::new(mesh.clone(), config).expect("valid configuration");

    let mut bcs = BoundaryConditions::for_mesh(&*mesh);
    for (f, &v) in values.iter().enumerate() {
        bcs.set_dirichlet(f, v).expect("face exists");
    }

    op.create_mass_matrices(None).expect("mass matrices");
    op.update(None, &bcs).expect("update sequence");

    let rhs = op.rhs().expect("assembled").clone();
    let mut solution = CompositeVector::for_mesh(&*mesh);
    op.apply_inverse(&rhs, &mut solution).expect("reduced solve");
    (mesh, op, solution)
}

#[test]
fn test_dirichlet_face_values_are_reproduced() {
    for method in MfdMethod::ALL {
        let (_, _, solution) = solve_cube(method, [0.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
        assert_eq!(
            solution.face.as_slice(),
            &[0.0, 0.0, 0.0, 0.0, 0.0, 1.0],
            "{}",
            method
        );
    }
}

#[test]
fn test_polyhedra_cell_pressure_is_face_average() {
    // Every column of the cube's inverse mass matrix sums to one
    let (_, _, solution) = solve_cube(MfdMethod::Polyhedra, [0.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
    assert_abs_diff_eq!(solution.cell[0], 1.0 / 6.0, epsilon = 1e-14);
}

#[test]
fn test_linear_field_gives_uniform_flux() {
    // p = z: bottom 0, top 1, lateral faces at their centroid height
    let values = [0.5, 0.5, 0.5, 0.5, 0.0, 1.0];
    for method in MfdMethod::ALL {
        let (mesh, op, solution) = solve_cube(method, values);
        assert_abs_diff_eq!(solution.cell[0], 0.5, epsilon = 1e-12);

        let flux = op.derive_flux(&solution).expect("flux");
        // u = -grad p = -e_z; face normals point along +e_z
        assert_abs_diff_eq!(flux[4], -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(flux[5], -1.0, epsilon = 1e-12);
        for f in 0..4 {
            assert_abs_diff_eq!(flux[f], 0.0, epsilon = 1e-12);
        }

        let velocity = op.derive_cell_velocity(&flux).expect("velocity");
        assert_eq!(velocity.shape(), (1, mesh.space_dimension()));
        assert_abs_diff_eq!(velocity[(0, 2)], -1.0, epsilon = 1e-12);
    }
}

#[test]
fn test_residual_vanishes_at_solution() {
    let (mesh, op, solution) = solve_cube(MfdMethod::SupportOperator, [1.0, 2.0, 0.0, 0.5, 0.0, 1.0]);
    let mut r = CompositeVector::for_mesh(&*mesh);
    let norm = op.compute_residual(&solution, &mut r).expect("residual");
    assert!(norm < 1e-12, "residual {}", norm);
}
