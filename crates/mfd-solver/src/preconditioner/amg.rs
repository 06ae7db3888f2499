//! Aggregation-based algebraic multigrid.
//!
//! The hierarchy is built by greedy aggregation of the strength graph, a
//! piecewise-constant tentative prolongator and (optionally) one damped
//! Jacobi smoothing step of that prolongator. Coarse operators are Galerkin
//! products `Pᵀ A P`; the coarsest level is solved with a dense LU.
//!
//! Two configurations are provided:
//! - `"ML"`: smoothed aggregation with forward Gauss-Seidel pre-smoothing and
//!   backward Gauss-Seidel post-smoothing,
//! - `"HYPRE AMG"` (feature `hypre`): classical strength threshold,
//!   unsmoothed aggregation, symmetric Gauss-Seidel and several V-cycles
//!   per application.

#[cfg(feature = "hypre")]
use super::config::HypreAmgParameters;
use super::config::MlParameters;
use super::traits::{check_apply, not_computed, Preconditioner};
use crate::error::{MfdError, Result};
use crate::sparse;
use nalgebra::{DMatrix, DVector, Dyn, LU};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

const UNAGGREGATED: usize = usize::MAX;
const POWER_ITERATIONS: usize = 15;

/// Strength-of-connection rule
#[derive(Debug, Clone, Copy)]
pub(crate) enum Strength {
    /// `|a_ij| > θ sqrt(|a_ii a_jj|)`
    Symmetric(f64),
    /// `-a_ij ≥ θ max_k(-a_ik)`
    #[cfg(feature = "hypre")]
    Classical(f64),
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Smoother {
    /// Forward sweeps before, backward sweeps after the coarse correction
    GaussSeidel,
    /// Forward then backward sweep on both sides
    #[cfg(feature = "hypre")]
    SymmetricGaussSeidel,
}

impl Smoother {
    fn is_symmetric(self) -> bool {
        match self {
            Smoother::GaussSeidel => false,
            #[cfg(feature = "hypre")]
            Smoother::SymmetricGaussSeidel => true,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct AmgSetup {
    pub max_levels: usize,
    pub strength: Strength,
    /// Prolongator smoothing factor; `None` keeps the tentative prolongator
    pub damping: Option<f64>,
    pub coarse_max_size: usize,
    pub sweeps: usize,
    pub smoother: Smoother,
}

struct Level {
    a: CsrMatrix<f64>,
    diag: Vec<f64>,
    p: CsrMatrix<f64>,
    r: CsrMatrix<f64>,
}

/// Multigrid hierarchy
pub struct Hierarchy {
    levels: Vec<Level>,
    coarse: LU<f64, Dyn, Dyn>,
    coarse_size: usize,
    smoother: Smoother,
    sweeps: usize,
}

fn diagonal_of(a: &CsrMatrix<f64>) -> Result<Vec<f64>> {
    let diag = sparse::diagonal(a);
    if let Some(i) = diag.iter().position(|&d| d == 0.0 || !d.is_finite()) {
        return Err(MfdError::Numerical(format!(
            "multigrid level has zero diagonal in row {}",
            i
        )));
    }
    Ok(diag)
}

/// Symmetric strength graph (diagonal excluded)
fn strength_graph(a: &CsrMatrix<f64>, diag: &[f64], rule: Strength) -> Vec<Vec<usize>> {
    let n = a.nrows();
    let offsets = a.row_offsets();
    let cols = a.col_indices();
    let vals = a.values();
    let mut graph = vec![Vec::new(); n];

    for i in 0..n {
        let row = offsets[i]..offsets[i + 1];
        match rule {
            Strength::Symmetric(theta) => {
                for k in row {
                    let j = cols[k];
                    if j != i && vals[k].abs() > theta * (diag[i] * diag[j]).abs().sqrt() {
                        graph[i].push(j);
                    }
                }
            }
            #[cfg(feature = "hypre")]
            Strength::Classical(theta) => {
                let max_neg = row
                    .clone()
                    .filter(|&k| cols[k] != i)
                    .map(|k| -vals[k])
                    .fold(0.0, f64::max);
                if max_neg > 0.0 {
                    for k in row {
                        let j = cols[k];
                        if j != i && -vals[k] >= theta * max_neg {
                            graph[i].push(j);
                        }
                    }
                }
            }
        }
    }

    // Symmetrise so that aggregation sees an undirected graph
    let mut sym = graph.clone();
    for (i, nbrs) in graph.iter().enumerate() {
        for &j in nbrs {
            if !sym[j].contains(&i) {
                sym[j].push(i);
            }
        }
    }
    for nbrs in &mut sym {
        nbrs.sort_unstable();
    }
    sym
}

/// Greedy aggregation; returns the aggregate of every row and the count
pub(crate) fn aggregate(strong: &[Vec<usize>]) -> (Vec<usize>, usize) {
    let n = strong.len();
    let mut agg = vec![UNAGGREGATED; n];
    let mut count = 0;

    // Roots whose whole neighbourhood is still free
    for i in 0..n {
        if agg[i] == UNAGGREGATED && strong[i].iter().all(|&j| agg[j] == UNAGGREGATED) {
            agg[i] = count;
            for &j in &strong[i] {
                agg[j] = count;
            }
            count += 1;
        }
    }

    // Attach leftovers to a neighbouring aggregate
    let snapshot = agg.clone();
    for i in 0..n {
        if agg[i] == UNAGGREGATED {
            if let Some(&j) = strong[i].iter().find(|&&j| snapshot[j] != UNAGGREGATED) {
                agg[i] = snapshot[j];
            }
        }
    }

    // Anything still free seeds a new aggregate
    for i in 0..n {
        if agg[i] == UNAGGREGATED {
            agg[i] = count;
            for &j in &strong[i] {
                if agg[j] == UNAGGREGATED {
                    agg[j] = count;
                }
            }
            count += 1;
        }
    }

    (agg, count)
}

fn tentative_prolongator(agg: &[usize], count: usize) -> Result<CsrMatrix<f64>> {
    let mut sizes = vec![0usize; count];
    for &a in agg {
        sizes[a] += 1;
    }
    let mut coo = CooMatrix::new(agg.len(), count);
    for (i, &a) in agg.iter().enumerate() {
        coo.push(i, a, 1.0 / (sizes[a] as f64).sqrt());
    }
    Ok(CsrMatrix::from(&coo))
}

/// Power-iteration estimate of `ρ(D⁻¹A)`
fn spectral_radius(a: &CsrMatrix<f64>, diag: &[f64]) -> f64 {
    let n = a.nrows();
    let mut x: Vec<f64> = (0..n).map(|i| 1.0 + (i % 7) as f64 * 0.1).collect();
    let mut y = vec![0.0; n];
    let mut rho = 0.0;
    for _ in 0..POWER_ITERATIONS {
        let norm = x.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm == 0.0 {
            break;
        }
        x.iter_mut().for_each(|v| *v /= norm);
        sparse::multiply(a, &x, &mut y);
        for (yi, di) in y.iter_mut().zip(diag) {
            *yi /= di;
        }
        rho = y.iter().map(|v| v * v).sum::<f64>().sqrt();
        std::mem::swap(&mut x, &mut y);
    }
    rho
}

/// `P = (I - ω/ρ D⁻¹ A) P0`
fn smooth_prolongator(
    a: &CsrMatrix<f64>,
    diag: &[f64],
    p0: &CsrMatrix<f64>,
    damping: f64,
) -> CsrMatrix<f64> {
    let rho = spectral_radius(a, diag).max(f64::MIN_POSITIVE);
    let omega = damping / rho;
    let ap = a * p0;

    let mut coo = CooMatrix::new(p0.nrows(), p0.ncols());
    for (i, j, v) in p0.triplet_iter() {
        coo.push(i, j, *v);
    }
    for (i, j, v) in ap.triplet_iter() {
        coo.push(i, j, -omega * v / diag[i]);
    }
    CsrMatrix::from(&coo)
}

impl Hierarchy {
    pub(crate) fn build(matrix: &CsrMatrix<f64>, setup: &AmgSetup) -> Result<Self> {
        if matrix.nrows() != matrix.ncols() {
            return Err(MfdError::Sparse(format!(
                "multigrid needs a square matrix, got {}x{}",
                matrix.nrows(),
                matrix.ncols()
            )));
        }

        let mut levels = Vec::new();
        let mut a = matrix.clone();
        while levels.len() + 1 < setup.max_levels.max(1) && a.nrows() > setup.coarse_max_size {
            let diag = diagonal_of(&a)?;
            let strong = strength_graph(&a, &diag, setup.strength);
            let (agg, count) = aggregate(&strong);
            if count == 0 || count >= a.nrows() {
                break;
            }

            let p0 = tentative_prolongator(&agg, count)?;
            let p = match setup.damping {
                Some(damping) if damping > 0.0 => smooth_prolongator(&a, &diag, &p0, damping),
                _ => p0,
            };
            let r = p.transpose();
            let coarse = &(&r * &a) * &p;
            levels.push(Level { a, diag, p, r });
            a = coarse;
        }

        let coarse_size = a.nrows();
        let coarse = DMatrix::from(&a).lu();
        if !coarse.is_invertible() {
            return Err(MfdError::Numerical(format!(
                "multigrid coarse matrix ({} rows) is singular",
                coarse_size
            )));
        }

        Ok(Self {
            levels,
            coarse,
            coarse_size,
            smoother: setup.smoother,
            sweeps: setup.sweeps,
        })
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len() + 1
    }

    pub fn size(&self) -> usize {
        self.levels
            .first()
            .map_or(self.coarse_size, |l| l.a.nrows())
    }

    /// Operator complexity `Σ nnz(A_l) / nnz(A_0)`
    pub fn operator_complexity(&self) -> f64 {
        let fine = self.levels.first().map_or(0, |l| l.a.nnz());
        if fine == 0 {
            return 1.0;
        }
        let total: usize = self.levels.iter().map(|l| l.a.nnz()).sum();
        (total as f64 + (self.coarse_size * self.coarse_size) as f64) / fine as f64
    }

    /// One V-cycle on `A x = b` starting from the current `x`
    pub fn v_cycle(&self, b: &[f64], x: &mut [f64]) -> Result<()> {
        self.cycle(0, b, x)
    }

    fn cycle(&self, l: usize, b: &[f64], x: &mut [f64]) -> Result<()> {
        let Some(level) = self.levels.get(l) else {
            let sol = self
                .coarse
                .solve(&DVector::from_column_slice(b))
                .ok_or_else(|| MfdError::Numerical("multigrid coarse solve failed".to_string()))?;
            x.copy_from_slice(sol.as_slice());
            return Ok(());
        };

        let symmetric = self.smoother.is_symmetric();
        for _ in 0..self.sweeps {
            forward_gauss_seidel(&level.a, &level.diag, b, x);
            if symmetric {
                backward_gauss_seidel(&level.a, &level.diag, b, x);
            }
        }

        let n = level.a.nrows();
        let mut residual = vec![0.0; n];
        sparse::multiply(&level.a, x, &mut residual);
        for (ri, bi) in residual.iter_mut().zip(b) {
            *ri = bi - *ri;
        }

        let nc = level.p.ncols();
        let mut bc = vec![0.0; nc];
        sparse::multiply(&level.r, &residual, &mut bc);
        let mut xc = vec![0.0; nc];
        self.cycle(l + 1, &bc, &mut xc)?;

        let mut correction = vec![0.0; n];
        sparse::multiply(&level.p, &xc, &mut correction);
        for (xi, ci) in x.iter_mut().zip(&correction) {
            *xi += ci;
        }

        for _ in 0..self.sweeps {
            if symmetric {
                forward_gauss_seidel(&level.a, &level.diag, b, x);
            }
            backward_gauss_seidel(&level.a, &level.diag, b, x);
        }
        Ok(())
    }
}

fn gauss_seidel_row(a: &CsrMatrix<f64>, diag: &[f64], b: &[f64], x: &mut [f64], i: usize) {
    let offsets = a.row_offsets();
    let cols = a.col_indices();
    let vals = a.values();
    let mut sum = b[i];
    for k in offsets[i]..offsets[i + 1] {
        let j = cols[k];
        if j != i {
            sum -= vals[k] * x[j];
        }
    }
    x[i] = sum / diag[i];
}

fn forward_gauss_seidel(a: &CsrMatrix<f64>, diag: &[f64], b: &[f64], x: &mut [f64]) {
    for i in 0..a.nrows() {
        gauss_seidel_row(a, diag, b, x, i);
    }
}

fn backward_gauss_seidel(a: &CsrMatrix<f64>, diag: &[f64], b: &[f64], x: &mut [f64]) {
    for i in (0..a.nrows()).rev() {
        gauss_seidel_row(a, diag, b, x, i);
    }
}

/// Smoothed-aggregation multigrid (`"ML"`)
pub struct MlPreconditioner {
    params: MlParameters,
    hierarchy: Option<Hierarchy>,
}

impl MlPreconditioner {
    pub fn new(params: MlParameters) -> Self {
        Self {
            params,
            hierarchy: None,
        }
    }

    pub fn hierarchy(&self) -> Option<&Hierarchy> {
        self.hierarchy.as_ref()
    }

    fn setup(&self) -> AmgSetup {
        AmgSetup {
            max_levels: self.params.max_levels,
            strength: Strength::Symmetric(self.params.aggregation_threshold),
            damping: Some(self.params.damping_factor),
            coarse_max_size: self.params.coarse_max_size,
            sweeps: self.params.smoother_sweeps,
            smoother: Smoother::GaussSeidel,
        }
    }
}

impl Preconditioner for MlPreconditioner {
    fn name(&self) -> &'static str {
        "ML"
    }

    fn update(&mut self, matrix: &CsrMatrix<f64>) -> Result<()> {
        self.hierarchy = None;
        let hierarchy = Hierarchy::build(matrix, &self.setup())?;
        log::debug!(
            "ML hierarchy: {} levels, operator complexity {:.2}",
            hierarchy.num_levels(),
            hierarchy.operator_complexity()
        );
        self.hierarchy = Some(hierarchy);
        Ok(())
    }

    fn apply_inverse(&self, r: &[f64], z: &mut [f64]) -> Result<()> {
        let h = self.hierarchy.as_ref().ok_or_else(|| not_computed(self.name()))?;
        check_apply(self.name(), h.size(), r, z)?;
        z.iter_mut().for_each(|v| *v = 0.0);
        for _ in 0..self.params.cycle_applications.max(1) {
            h.v_cycle(r, z)?;
        }
        Ok(())
    }

    fn is_computed(&self) -> bool {
        self.hierarchy.is_some()
    }
}

/// Classical-parameter multigrid (`"HYPRE AMG"`)
#[cfg(feature = "hypre")]
pub struct HypreAmgPreconditioner {
    params: HypreAmgParameters,
    hierarchy: Option<Hierarchy>,
}

#[cfg(feature = "hypre")]
impl HypreAmgPreconditioner {
    pub fn new(params: HypreAmgParameters) -> Self {
        Self {
            params,
            hierarchy: None,
        }
    }

    fn setup(&self) -> AmgSetup {
        AmgSetup {
            max_levels: self.params.max_levels,
            strength: Strength::Classical(self.params.strong_threshold),
            damping: None,
            coarse_max_size: 9,
            sweeps: self.params.smoothing_sweeps,
            smoother: Smoother::SymmetricGaussSeidel,
        }
    }
}

#[cfg(feature = "hypre")]
impl Preconditioner for HypreAmgPreconditioner {
    fn name(&self) -> &'static str {
        "HYPRE AMG"
    }

    fn update(&mut self, matrix: &CsrMatrix<f64>) -> Result<()> {
        self.hierarchy = None;
        let hierarchy = Hierarchy::build(matrix, &self.setup())?;
        log::debug!(
            "HYPRE AMG hierarchy: {} levels, operator complexity {:.2}",
            hierarchy.num_levels(),
            hierarchy.operator_complexity()
        );
        self.hierarchy = Some(hierarchy);
        Ok(())
    }

    fn apply_inverse(&self, r: &[f64], z: &mut [f64]) -> Result<()> {
        let h = self.hierarchy.as_ref().ok_or_else(|| not_computed(self.name()))?;
        check_apply(self.name(), h.size(), r, z)?;
        z.iter_mut().for_each(|v| *v = 0.0);

        let level0 = h.levels.first();
        let rnorm0 = r.iter().map(|v| v * v).sum::<f64>().sqrt();
        let mut residual = vec![0.0; r.len()];
        for _ in 0..self.params.cycles.max(1) {
            h.v_cycle(r, z)?;
            if self.params.tolerance > 0.0 {
                if let Some(level) = level0 {
                    sparse::multiply(&level.a, z, &mut residual);
                    let rnorm = residual
                        .iter()
                        .zip(r)
                        .map(|(ax, b)| (b - ax) * (b - ax))
                        .sum::<f64>()
                        .sqrt();
                    if rnorm <= self.params.tolerance * rnorm0 {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn is_computed(&self) -> bool {
        self.hierarchy.is_some()
    }
}
