//! Incomplete LU factorisation with level-of-fill.
//!
//! Symbolic phase computes the ILU(k) pattern: a fill entry created while
//! eliminating row `i` with pivot row `k` gets level
//! `lev(i,k) + lev(k,j) + 1` and is kept when that level does not exceed
//! the configured level of fill.
//! Numeric phase is the usual IKJ elimination restricted to that pattern,
//! with `L` unit lower triangular and `U` stored with its diagonal.

use super::config::IluParameters;
use super::traits::{check_apply, not_computed, Preconditioner};
use crate::error::{MfdError, Result};
use nalgebra_sparse::CsrMatrix;
use std::collections::BTreeMap;

/// Combined `L\U` factors in CSR layout
#[derive(Debug, Clone)]
pub struct IluFactors {
    row_offsets: Vec<usize>,
    col_indices: Vec<usize>,
    values: Vec<f64>,
    /// Position of the diagonal in each row
    diag: Vec<usize>,
}

impl IluFactors {
    pub fn compute(matrix: &CsrMatrix<f64>, params: &IluParameters) -> Result<Self> {
        let n = matrix.nrows();
        if matrix.ncols() != n {
            return Err(MfdError::Sparse(format!(
                "ILU needs a square matrix, got {}x{}",
                n,
                matrix.ncols()
            )));
        }

        let (row_offsets, col_indices, diag) = symbolic(matrix, params.level_of_fill);
        let mut factors = Self {
            values: vec![0.0; col_indices.len()],
            row_offsets,
            col_indices,
            diag,
        };
        factors.numeric(matrix, params)?;
        Ok(factors)
    }

    pub fn size(&self) -> usize {
        self.diag.len()
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    fn numeric(&mut self, matrix: &CsrMatrix<f64>, params: &IluParameters) -> Result<()> {
        let n = self.size();
        let a_offsets = matrix.row_offsets();
        let a_cols = matrix.col_indices();
        let a_vals = matrix.values();
        // Position of column j in the current row, usize::MAX when absent
        let mut position = vec![usize::MAX; n];

        for i in 0..n {
            let start = self.row_offsets[i];
            let end = self.row_offsets[i + 1];
            for k in start..end {
                position[self.col_indices[k]] = k;
                self.values[k] = 0.0;
            }
            for k in a_offsets[i]..a_offsets[i + 1] {
                let p = position[a_cols[k]];
                if p != usize::MAX {
                    self.values[p] += a_vals[k];
                }
            }

            let d = self.diag[i];
            let aii = self.values[d];
            let sign = if aii < 0.0 { -1.0 } else { 1.0 };
            self.values[d] = params.relative_threshold * aii + sign * params.absolute_threshold;

            for kk in start..d {
                let k = self.col_indices[kk];
                let pivot = self.values[self.diag[k]];
                let lik = self.values[kk] / pivot;
                self.values[kk] = lik;
                for kj in self.diag[k] + 1..self.row_offsets[k + 1] {
                    let p = position[self.col_indices[kj]];
                    if p != usize::MAX {
                        self.values[p] -= lik * self.values[kj];
                    }
                }
            }

            let uii = self.values[d];
            if uii == 0.0 || !uii.is_finite() {
                return Err(MfdError::Numerical(format!(
                    "ILU produced a zero pivot in row {}",
                    i
                )));
            }

            for k in start..end {
                position[self.col_indices[k]] = usize::MAX;
            }
        }
        Ok(())
    }

    /// `z = U⁻¹ L⁻¹ r`
    pub fn solve(&self, r: &[f64], z: &mut [f64]) {
        let n = self.size();
        z.copy_from_slice(&r[..n]);
        for i in 0..n {
            let mut sum = z[i];
            for k in self.row_offsets[i]..self.diag[i] {
                sum -= self.values[k] * z[self.col_indices[k]];
            }
            z[i] = sum;
        }
        for i in (0..n).rev() {
            let mut sum = z[i];
            for k in self.diag[i] + 1..self.row_offsets[i + 1] {
                sum -= self.values[k] * z[self.col_indices[k]];
            }
            z[i] = sum / self.values[self.diag[i]];
        }
    }
}

/// ILU(k) pattern; the diagonal is always included.
fn symbolic(matrix: &CsrMatrix<f64>, max_level: usize) -> (Vec<usize>, Vec<usize>, Vec<usize>) {
    let n = matrix.nrows();
    let offsets = matrix.row_offsets();
    let cols = matrix.col_indices();

    // Strict upper part of every processed row with its fill levels
    let mut upper: Vec<Vec<(usize, usize)>> = Vec::with_capacity(n);
    let mut row_offsets = Vec::with_capacity(n + 1);
    let mut col_indices = Vec::new();
    let mut diag = Vec::with_capacity(n);
    row_offsets.push(0);

    for i in 0..n {
        let mut row: BTreeMap<usize, usize> = cols[offsets[i]..offsets[i + 1]]
            .iter()
            .map(|&j| (j, 0))
            .collect();
        row.insert(i, 0);

        let mut next = row.range(..i).next().map(|(&k, _)| k);
        while let Some(k) = next {
            let lev_ik = row[&k];
            for &(j, lev_kj) in &upper[k] {
                let level = lev_ik + lev_kj + 1;
                if level <= max_level {
                    row.entry(j)
                        .and_modify(|l| *l = (*l).min(level))
                        .or_insert(level);
                }
            }
            next = row.range(k + 1..i).next().map(|(&k, _)| k);
        }

        for (&j, _) in row.iter() {
            if j == i {
                diag.push(col_indices.len());
            }
            col_indices.push(j);
        }
        row_offsets.push(col_indices.len());
        upper.push(row.range(i + 1..).map(|(&j, &l)| (j, l)).collect());
    }

    (row_offsets, col_indices, diag)
}

/// Incomplete LU preconditioner. Also serves the Euclid variant, which is
/// ILU(k) with a different default level.
pub struct IluPreconditioner {
    name: &'static str,
    params: IluParameters,
    factors: Option<IluFactors>,
}

impl IluPreconditioner {
    pub fn new(params: IluParameters) -> Self {
        Self::named("ILU", params)
    }

    pub(crate) fn named(name: &'static str, params: IluParameters) -> Self {
        Self {
            name,
            params,
            factors: None,
        }
    }

    pub fn factors(&self) -> Option<&IluFactors> {
        self.factors.as_ref()
    }
}

impl Preconditioner for IluPreconditioner {
    fn name(&self) -> &'static str {
        self.name
    }

    fn update(&mut self, matrix: &CsrMatrix<f64>) -> Result<()> {
        self.factors = None;
        let factors = IluFactors::compute(matrix, &self.params)?;
        log::debug!(
            "{}({}) factors: {} rows, {} nonzeros",
            self.name,
            self.params.level_of_fill,
            factors.size(),
            factors.nnz()
        );
        self.factors = Some(factors);
        Ok(())
    }

    fn apply_inverse(&self, r: &[f64], z: &mut [f64]) -> Result<()> {
        let factors = self.factors.as_ref().ok_or_else(|| not_computed(self.name))?;
        check_apply(self.name, factors.size(), r, z)?;
        factors.solve(r, z);
        Ok(())
    }

    fn is_computed(&self) -> bool {
        self.factors.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse;
    use nalgebra::{DMatrix, DVector};
    use nalgebra_sparse::CooMatrix;

    fn laplacian_2d(m: usize) -> CsrMatrix<f64> {
        let n = m * m;
        let mut coo = CooMatrix::new(n, n);
        for j in 0..m {
            for i in 0..m {
                let row = i + m * j;
                coo.push(row, row, 4.0);
                if i > 0 {
                    coo.push(row, row - 1, -1.0);
                }
                if i + 1 < m {
                    coo.push(row, row + 1, -1.0);
                }
                if j > 0 {
                    coo.push(row, row - m, -1.0);
                }
                if j + 1 < m {
                    coo.push(row, row + m, -1.0);
                }
            }
        }
        CsrMatrix::from(&coo)
    }

    #[test]
    fn tridiagonal_ilu0_is_exact() {
        let dense = DMatrix::from_fn(5, 5, |i, j| match i.abs_diff(j) {
            0 => 2.0,
            1 => -1.0,
            _ => 0.0,
        });
        let csr = CsrMatrix::from(&CooMatrix::from(&dense));
        let mut prec = IluPreconditioner::new(IluParameters::default());
        prec.update(&csr).unwrap();

        let b = [1.0, 0.0, 2.0, 0.0, 1.0];
        let mut x = [0.0; 5];
        prec.apply_inverse(&b, &mut x).unwrap();
        let ax = &dense * DVector::from_column_slice(&x);
        for i in 0..5 {
            assert!((ax[i] - b[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn fill_grows_with_level() {
        let a = laplacian_2d(4);
        let ilu0 = IluFactors::compute(&a, &IluParameters::default()).unwrap();
        assert_eq!(ilu0.nnz(), a.nnz());

        let params = IluParameters {
            level_of_fill: 1,
            ..Default::default()
        };
        let ilu1 = IluFactors::compute(&a, &params).unwrap();
        assert!(ilu1.nnz() > ilu0.nnz());

        let full = IluParameters {
            level_of_fill: 100,
            ..Default::default()
        };
        let exact = IluFactors::compute(&a, &full).unwrap();
        let b: Vec<f64> = (0..16).map(|i| i as f64).collect();
        let mut x = vec![0.0; 16];
        exact.solve(&b, &mut x);
        let mut ax = vec![0.0; 16];
        sparse::multiply(&a, &x, &mut ax);
        for i in 0..16 {
            assert!((ax[i] - b[i]).abs() < 1e-10);
        }
    }

    #[test]
    fn zero_pivot_is_numerical_error() {
        let dense = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 1.0, 0.0]);
        let csr = CsrMatrix::from(&CooMatrix::from(&dense));
        let err = IluFactors::compute(&csr, &IluParameters::default()).unwrap_err();
        assert!(matches!(err, MfdError::Numerical(_)));
    }

    #[test]
    fn absolute_threshold_rescues_zero_diagonal() {
        let dense = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 1.0, 0.0]);
        let csr = CsrMatrix::from(&CooMatrix::from(&dense));
        let params = IluParameters {
            absolute_threshold: 2.0,
            ..Default::default()
        };
        assert!(IluFactors::compute(&csr, &params).is_ok());
    }

    #[test]
    fn apply_before_update_fails() {
        let prec = IluPreconditioner::new(IluParameters::default());
        let err = prec.apply_inverse(&[1.0], &mut [0.0]).unwrap_err();
        assert!(err.is_configuration());
    }
}
