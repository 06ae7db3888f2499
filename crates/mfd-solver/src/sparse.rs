//! Helpers over `nalgebra_sparse::CsrMatrix` with a fixed sparsity pattern.
//!
//! Assembly writes into preallocated patterns; nothing here changes the
//! structure of a matrix once it exists.

use crate::error::{MfdError, Result};
use nalgebra::{DMatrixView, DMatrixViewMut};
use nalgebra_sparse::ops::serial::spmm_csr_dense;
use nalgebra_sparse::ops::Op;
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::{CsrMatrix, SparseEntryMut};
use std::collections::BTreeSet;

/// Build a pattern from per-row column sets
pub fn pattern_from_rows(ncols: usize, rows: &[BTreeSet<usize>]) -> Result<SparsityPattern> {
    let mut offsets = Vec::with_capacity(rows.len() + 1);
    let mut indices = Vec::with_capacity(rows.iter().map(|r| r.len()).sum());
    offsets.push(0);
    for row in rows {
        indices.extend(row.iter().copied());
        offsets.push(indices.len());
    }
    SparsityPattern::try_from_offsets_and_indices(rows.len(), ncols, offsets, indices)
        .map_err(|e| MfdError::Sparse(format!("Failed to build sparsity pattern: {:?}", e)))
}

/// Zero-valued matrix on `pattern`
pub fn zeros_on(pattern: &SparsityPattern) -> Result<CsrMatrix<f64>> {
    let values = vec![0.0; pattern.nnz()];
    CsrMatrix::try_from_pattern_and_values(pattern.clone(), values)
        .map_err(|e| MfdError::Sparse(format!("Failed to allocate CSR matrix: {:?}", e)))
}

/// Stored entry at `(row, col)`; entries outside the pattern are an error
fn stored_entry(m: &mut CsrMatrix<f64>, row: usize, col: usize) -> Result<&mut f64> {
    match m.get_entry_mut(row, col) {
        Some(SparseEntryMut::NonZero(v)) => Ok(v),
        _ => Err(MfdError::Sparse(format!(
            "Entry ({}, {}) is not in the sparsity pattern",
            row, col
        ))),
    }
}

/// `m(row, col) += value`
pub fn sum_into(m: &mut CsrMatrix<f64>, row: usize, col: usize, value: f64) -> Result<()> {
    *stored_entry(m, row, col)? += value;
    Ok(())
}

/// `m(row, col) = value`
pub fn replace(m: &mut CsrMatrix<f64>, row: usize, col: usize, value: f64) -> Result<()> {
    *stored_entry(m, row, col)? = value;
    Ok(())
}

/// Value at `(row, col)`, zero outside the pattern
pub fn get(m: &CsrMatrix<f64>, row: usize, col: usize) -> f64 {
    m.get_entry(row, col).map_or(0.0, |e| e.into_value())
}

pub fn set_zero(m: &mut CsrMatrix<f64>) {
    m.values_mut().iter_mut().for_each(|v| *v = 0.0);
}

fn spmv(m: Op<&CsrMatrix<f64>>, x: &[f64], y: &mut [f64]) {
    y.iter_mut().for_each(|v| *v = 0.0);
    let (nx, ny) = (x.len(), y.len());
    spmm_csr_dense(
        0.0,
        DMatrixViewMut::from_slice(y, ny, 1),
        1.0,
        m,
        Op::NoOp(DMatrixView::from_slice(x, nx, 1)),
    );
}

/// `y = m x`
pub fn multiply(m: &CsrMatrix<f64>, x: &[f64], y: &mut [f64]) {
    spmv(Op::NoOp(m), x, y);
}

/// `y = mᵀ x`
pub fn multiply_transpose(m: &CsrMatrix<f64>, x: &[f64], y: &mut [f64]) {
    spmv(Op::Transpose(m), x, y);
}

pub fn diagonal(m: &CsrMatrix<f64>) -> Vec<f64> {
    (0..m.nrows().min(m.ncols())).map(|i| get(m, i, i)).collect()
}

/// Symmetric to within `tol` relative to the largest entry
pub fn is_symmetric(m: &CsrMatrix<f64>, tol: f64) -> bool {
    if m.nrows() != m.ncols() {
        return false;
    }
    let scale = m.values().iter().fold(0.0f64, |a, v| a.max(v.abs())).max(1.0);
    m.triplet_iter()
        .all(|(i, j, v)| (v - get(m, j, i)).abs() <= tol * scale)
}

/// Row adjacency (column lists) of a square matrix, diagonal excluded
pub fn adjacency(m: &CsrMatrix<f64>) -> Vec<Vec<usize>> {
    m.row_iter()
        .enumerate()
        .map(|(i, row)| row.col_indices().iter().copied().filter(|&j| j != i).collect())
        .collect()
}

/// Principal submatrix on the sorted index set `rows`, as a CSR matrix in
/// local numbering
pub fn principal_submatrix(m: &CsrMatrix<f64>, rows: &[usize]) -> Result<CsrMatrix<f64>> {
    let mut local = vec![usize::MAX; m.ncols()];
    for (l, &g) in rows.iter().enumerate() {
        local[g] = l;
    }

    let mut offsets = Vec::with_capacity(rows.len() + 1);
    let mut indices = Vec::new();
    let mut values = Vec::new();
    offsets.push(0);
    for &g in rows {
        let row = m.row(g);
        for (&j, &v) in row.col_indices().iter().zip(row.values()) {
            let l = local[j];
            if l != usize::MAX {
                indices.push(l);
                values.push(v);
            }
        }
        offsets.push(indices.len());
    }
    CsrMatrix::try_from_csr_data(rows.len(), rows.len(), offsets, indices, values)
        .map_err(|e| MfdError::Sparse(format!("Failed to extract submatrix: {:?}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    fn tridiagonal(n: usize) -> CsrMatrix<f64> {
        let rows: Vec<BTreeSet<usize>> = (0..n)
            .map(|i| {
                let mut s = BTreeSet::new();
                if i > 0 {
                    s.insert(i - 1);
                }
                s.insert(i);
                if i + 1 < n {
                    s.insert(i + 1);
                }
                s
            })
            .collect();
        let mut m = zeros_on(&pattern_from_rows(n, &rows).unwrap()).unwrap();
        for i in 0..n {
            replace(&mut m, i, i, 2.0).unwrap();
            if i > 0 {
                replace(&mut m, i, i - 1, -1.0).unwrap();
                replace(&mut m, i - 1, i, -1.0).unwrap();
            }
        }
        m
    }

    #[test]
    fn sum_into_respects_pattern() {
        let mut m = tridiagonal(4);
        sum_into(&mut m, 1, 2, 0.5).unwrap();
        assert_eq!(get(&m, 1, 2), -0.5);
        assert!(sum_into(&mut m, 0, 3, 1.0).is_err());
        assert_eq!(get(&m, 0, 3), 0.0);
    }

    #[test]
    fn multiply_and_transpose() {
        let mut m = tridiagonal(3);
        replace(&mut m, 0, 1, -2.0).unwrap();
        let x = [1.0, 2.0, 3.0];
        let mut y = [0.0; 3];
        multiply(&m, &x, &mut y);
        assert_eq!(y, [-2.0, 0.0, 4.0]);

        multiply_transpose(&m, &x, &mut y);
        assert_eq!(y, [0.0, -1.0, 4.0]);
        assert!(!is_symmetric(&m, 1e-12));
    }

    #[test]
    fn dense_and_diagonal() {
        let m = tridiagonal(3);
        let d = DMatrix::from(&m);
        assert_eq!(d[(1, 0)], -1.0);
        assert_eq!(diagonal(&m), vec![2.0; 3]);
        assert!(is_symmetric(&m, 1e-12));
        assert_eq!(adjacency(&m)[1], vec![0, 2]);
    }

    #[test]
    fn submatrix_extraction() {
        let m = tridiagonal(5);
        let sub = principal_submatrix(&m, &[1, 2, 4]).unwrap();
        let d = DMatrix::from(&sub);
        assert_eq!(d[(0, 1)], -1.0);
        assert_eq!(d[(1, 2)], 0.0);
        assert_eq!(d[(2, 2)], 2.0);
    }
}
