//! Sparse approximate inverse (`"HYPRE ParaSails"`).
//!
//! The pattern of row `i` is the set of rows reachable from `i` in
//! `levels + 1` steps of the thresholded matrix graph. On that pattern `J`
//! the local system `A(J,J) m = e_i` is solved densely, small entries are
//! filtered and the result is symmetrised.

use super::config::HypreParaSailsParameters;
use super::traits::{check_apply, not_computed, Preconditioner};
use crate::error::{MfdError, Result};
use crate::sparse;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::prelude::*;
use std::collections::BTreeSet;

pub struct ParaSailsPreconditioner {
    params: HypreParaSailsParameters,
    inverse: Option<CsrMatrix<f64>>,
}

impl ParaSailsPreconditioner {
    pub fn new(params: HypreParaSailsParameters) -> Self {
        Self {
            params,
            inverse: None,
        }
    }

    pub fn approximate_inverse(&self) -> Option<&CsrMatrix<f64>> {
        self.inverse.as_ref()
    }
}

/// Off-diagonal neighbours with `|a_ij| ≥ threshold · sqrt(|a_ii a_jj|)`
fn thresholded_graph(a: &CsrMatrix<f64>, threshold: f64) -> Vec<Vec<usize>> {
    let diag = sparse::diagonal(a);
    (0..a.nrows())
        .map(|i| {
            let row = a.row(i);
            row.col_indices()
                .iter()
                .zip(row.values())
                .filter(|&(&j, &v)| j != i && v.abs() >= threshold * (diag[i] * diag[j]).abs().sqrt())
                .map(|(&j, _)| j)
                .collect()
        })
        .collect()
}

fn row_pattern(graph: &[Vec<usize>], i: usize, depth: usize) -> Vec<usize> {
    let mut pattern = BTreeSet::from([i]);
    let mut frontier = vec![i];
    for _ in 0..depth {
        let mut next = Vec::new();
        for &k in &frontier {
            for &j in &graph[k] {
                if pattern.insert(j) {
                    next.push(j);
                }
            }
        }
        frontier = next;
    }
    pattern.into_iter().collect()
}

fn local_inverse_row(
    a: &CsrMatrix<f64>,
    i: usize,
    pattern: &[usize],
    filter: f64,
) -> Result<Vec<(usize, f64)>> {
    let m = pattern.len();
    let local = DMatrix::from_fn(m, m, |r, c| sparse::get(a, pattern[r], pattern[c]));
    let mut e = DVector::zeros(m);
    let pos = pattern.binary_search(&i).map_err(|_| {
        MfdError::Invariant(format!("ParaSails pattern of row {} misses its diagonal", i))
    })?;
    e[pos] = 1.0;

    let x = local.lu().solve(&e).ok_or_else(|| {
        MfdError::Numerical(format!("ParaSails local system of row {} is singular", i))
    })?;

    let cutoff = filter * x.amax();
    Ok(pattern
        .iter()
        .zip(x.iter())
        .filter(|&(&j, v)| j == i || v.abs() >= cutoff)
        .map(|(&j, &v)| (j, v))
        .collect())
}

impl Preconditioner for ParaSailsPreconditioner {
    fn name(&self) -> &'static str {
        "HYPRE ParaSails"
    }

    fn update(&mut self, matrix: &CsrMatrix<f64>) -> Result<()> {
        self.inverse = None;
        let n = matrix.nrows();
        if matrix.ncols() != n {
            return Err(MfdError::Sparse(format!(
                "ParaSails needs a square matrix, got {}x{}",
                n,
                matrix.ncols()
            )));
        }

        let graph = thresholded_graph(matrix, self.params.threshold);
        let depth = self.params.levels + 1;
        let filter = self.params.filter;
        let rows = (0..n)
            .into_par_iter()
            .map(|i| local_inverse_row(matrix, i, &row_pattern(&graph, i, depth), filter))
            .collect::<Result<Vec<_>>>()?;

        let mut coo = CooMatrix::new(n, n);
        for (i, row) in rows.iter().enumerate() {
            for &(j, v) in row {
                coo.push(i, j, 0.5 * v);
                coo.push(j, i, 0.5 * v);
            }
        }
        let inverse = CsrMatrix::from(&coo);
        log::debug!(
            "ParaSails: {} rows, {} nonzeros in approximate inverse",
            n,
            inverse.nnz()
        );
        self.inverse = Some(inverse);
        Ok(())
    }

    fn apply_inverse(&self, r: &[f64], z: &mut [f64]) -> Result<()> {
        let inverse = self.inverse.as_ref().ok_or_else(|| not_computed(self.name()))?;
        check_apply(self.name(), inverse.nrows(), r, z)?;
        sparse::multiply(inverse, r, z);
        Ok(())
    }

    fn is_computed(&self) -> bool {
        self.inverse.is_some()
    }
}
