//! Inverse mass matrix kernels.
//!
//! Every kernel returns a symmetric `n × n` matrix `W` satisfying the
//! consistency condition `W R = N K`, where row `i` of `R` is
//! `x_f - x_c` and row `i` of `N` is the outward area-weighted normal of
//! face `i`. Kernels differ only in the stability term added on the
//! complement of `range(R)`.

use super::ElementalStatus;
use crate::coefficients::Tensor;
use crate::mesh::MeshTopology;
use nalgebra::DMatrix;

/// Stability multipliers scanned by the optimized kernels, in order
pub const OPTIMIZED_MULTIPLIERS: [f64; 5] = [1.0, 0.5, 2.0, 0.25, 4.0];

/// Relative tolerance for the two-point consistency check
const CONSISTENCY_TOL: f64 = 1e-10;

/// Kernel signature shared by every method
pub type MassInverseKernel = fn(&CellGeometry, &Tensor) -> (ElementalStatus, DMatrix<f64>);

/// Local geometry of one cell
#[derive(Debug, Clone)]
pub struct CellGeometry {
    pub dimension: usize,
    pub volume: f64,
    /// `n × d`, face centroid minus cell centroid
    pub r: DMatrix<f64>,
    /// `n × d`, outward area-weighted normals
    pub n: DMatrix<f64>,
    pub areas: Vec<f64>,
}

impl CellGeometry {
    pub fn from_mesh(mesh: &dyn MeshTopology, cell: usize) -> Self {
        let d = mesh.space_dimension();
        let (faces, dirs) = mesh.cell_faces_and_dirs(cell);
        let xc = mesh.cell_centroid(cell);
        let nfaces = faces.len();

        let mut r = DMatrix::zeros(nfaces, d);
        let mut n = DMatrix::zeros(nfaces, d);
        let mut areas = Vec::with_capacity(nfaces);
        for (i, (&f, &dir)) in faces.iter().zip(dirs).enumerate() {
            let xf = mesh.face_centroid(f);
            let normal = mesh.face_normal(f);
            for k in 0..d {
                r[(i, k)] = xf[k] - xc[k];
                n[(i, k)] = normal[k] * dir as f64;
            }
            areas.push(mesh.face_area(f));
        }

        Self {
            dimension: d,
            volume: mesh.cell_volume(cell),
            r,
            n,
            areas,
        }
    }

    pub fn num_faces(&self) -> usize {
        self.areas.len()
    }

    /// Face count and coefficient preconditions shared by all kernels
    fn admissible(&self, k: &Tensor) -> bool {
        self.num_faces() > self.dimension
            && k.dimension() == self.dimension
            && self.volume > 0.0
            && k.is_spd()
    }

    /// Consistency term `N K Nᵀ / |c|`
    fn consistency(&self, k: &Tensor) -> DMatrix<f64> {
        &self.n * k.matrix() * self.n.transpose() / self.volume
    }

    /// `I - P`, `P` the orthogonal projector onto `range(R)`
    fn complement_of_r(&self) -> Option<DMatrix<f64>> {
        complement_projector(&self.r)
    }

    /// `‖W R - N K‖ ≤ tol · ‖N K‖`
    pub fn is_consistent(&self, w: &DMatrix<f64>, k: &Tensor) -> bool {
        let target = &self.n * k.matrix();
        let err = (w * &self.r - &target).amax();
        err <= CONSISTENCY_TOL * target.amax().max(f64::MIN_POSITIVE)
    }
}

fn complement_projector(a: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let gram = a.transpose() * a;
    let gram_inv = gram.cholesky()?.inverse();
    let p = a * gram_inv * a.transpose();
    Some(DMatrix::identity(a.nrows(), a.nrows()) - p)
}

fn mean_diagonal(m: &DMatrix<f64>) -> f64 {
    m.trace() / m.nrows() as f64
}

fn symmetrize(w: DMatrix<f64>) -> DMatrix<f64> {
    (&w + w.transpose()) * 0.5
}

fn failed(nfaces: usize) -> (ElementalStatus, DMatrix<f64>) {
    (ElementalStatus::Failed, DMatrix::zeros(nfaces, nfaces))
}

/// Sum of positive off-diagonal entries
fn positive_off_diagonal_mass(w: &DMatrix<f64>) -> f64 {
    let mut mass = 0.0;
    for i in 0..w.nrows() {
        for j in 0..w.ncols() {
            if i != j && w[(i, j)] > 0.0 {
                mass += w[(i, j)];
            }
        }
    }
    mass
}

/// `W0 + ω (I - P)`, `ω` the mean diagonal of `W0`
pub fn polyhedra(geom: &CellGeometry, k: &Tensor) -> (ElementalStatus, DMatrix<f64>) {
    if !geom.admissible(k) {
        return failed(geom.num_faces());
    }
    let Some(stab) = geom.complement_of_r() else {
        return failed(geom.num_faces());
    };
    let w0 = geom.consistency(k);
    let omega = mean_diagonal(&w0);
    (ElementalStatus::Ok, symmetrize(w0 + stab * omega))
}

/// `W0 + (I - P) D (I - P)`, `D = diag(W0)`
pub fn polyhedra_scaled(geom: &CellGeometry, k: &Tensor) -> (ElementalStatus, DMatrix<f64>) {
    if !geom.admissible(k) {
        return failed(geom.num_faces());
    }
    let Some(stab) = geom.complement_of_r() else {
        return failed(geom.num_faces());
    };
    let w0 = geom.consistency(k);
    let d = DMatrix::from_diagonal(&w0.diagonal());
    let scaled = &stab * d * &stab;
    (ElementalStatus::Ok, symmetrize(w0 + scaled))
}

fn optimized_search(
    geom: &CellGeometry,
    k: &Tensor,
    scaled: bool,
) -> (ElementalStatus, DMatrix<f64>) {
    if !geom.admissible(k) {
        return failed(geom.num_faces());
    }
    let Some(stab) = geom.complement_of_r() else {
        return failed(geom.num_faces());
    };
    let w0 = geom.consistency(k);
    let base = if scaled {
        let d = DMatrix::from_diagonal(&w0.diagonal());
        &stab * d * &stab
    } else {
        &stab * mean_diagonal(&w0)
    };

    let mut best: Option<(f64, DMatrix<f64>)> = None;
    for &t in &OPTIMIZED_MULTIPLIERS {
        let w = symmetrize(&w0 + &base * t);
        let mass = positive_off_diagonal_mass(&w);
        if best.as_ref().is_none_or(|(m, _)| mass < *m) {
            best = Some((mass, w));
        }
    }

    match best {
        Some((mass, w)) => {
            let scale = w.amax().max(f64::MIN_POSITIVE);
            let status = if mass <= 1e-14 * scale {
                ElementalStatus::Ok
            } else {
                ElementalStatus::Passed
            };
            (status, w)
        }
        None => failed(geom.num_faces()),
    }
}

/// Scan stability multipliers for an M-matrix-signed `W`
pub fn optimized(geom: &CellGeometry, k: &Tensor) -> (ElementalStatus, DMatrix<f64>) {
    optimized_search(geom, k, false)
}

/// Scaled-stability variant of [`optimized`]
pub fn optimized_scaled(geom: &CellGeometry, k: &Tensor) -> (ElementalStatus, DMatrix<f64>) {
    optimized_search(geom, k, true)
}

/// Hexahedra (quadrilaterals in 2-D): the two-point matrix when it is
/// consistent on the cell, the optimized search otherwise. Other face
/// counts use [`polyhedra`].
pub fn hexahedra_monotone(geom: &CellGeometry, k: &Tensor) -> (ElementalStatus, DMatrix<f64>) {
    if geom.num_faces() != 2 * geom.dimension {
        return polyhedra(geom, k);
    }
    let (status, w) = two_point_flux(geom, k);
    if status == ElementalStatus::Ok && geom.is_consistent(&w, k) {
        return (status, w);
    }
    optimized(geom, k)
}

/// Diagonal `W_ii = |f| n̂ᵀ K n̂ / |(x_f - x_c)·n̂|`
pub fn two_point_flux(geom: &CellGeometry, k: &Tensor) -> (ElementalStatus, DMatrix<f64>) {
    if !geom.admissible(k) {
        return failed(geom.num_faces());
    }
    let nfaces = geom.num_faces();
    let mut w = DMatrix::zeros(nfaces, nfaces);
    for i in 0..nfaces {
        let area = geom.areas[i];
        if area <= 0.0 {
            return failed(nfaces);
        }
        let unit = geom.n.row(i).transpose() / area;
        let knn = (k.matrix() * &unit).dot(&unit);
        let dist = geom.r.row(i).transpose().dot(&unit).abs();
        if dist <= f64::EPSILON * geom.r.row(i).norm().max(f64::MIN_POSITIVE) {
            return failed(nfaces);
        }
        w[(i, i)] = area * knn / dist;
    }
    (ElementalStatus::Ok, w)
}

/// Invert `M = R K⁻¹ Rᵀ / |c| + ω (I - Q)`, `Q` the projector onto `range(N)`
pub fn support_operator(geom: &CellGeometry, k: &Tensor) -> (ElementalStatus, DMatrix<f64>) {
    if !geom.admissible(k) {
        return failed(geom.num_faces());
    }
    let Some(k_inv) = k.inverse() else {
        return failed(geom.num_faces());
    };
    let Some(stab) = complement_projector(&geom.n) else {
        return failed(geom.num_faces());
    };
    let m0 = &geom.r * k_inv * geom.r.transpose() / geom.volume;
    let omega = mean_diagonal(&m0);
    let m = symmetrize(m0 + stab * omega);

    match m.cholesky() {
        Some(chol) => (ElementalStatus::Ok, symmetrize(chol.inverse())),
        None => failed(geom.num_faces()),
    }
}
