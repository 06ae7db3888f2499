//! Overlapping additive Schwarz with ILU subdomain solves.
//!
//! Rows are split into contiguous parts, each part is grown by `overlap`
//! layers of matrix-graph neighbours, and every subdomain gets its own ILU
//! factorisation. Subdomain corrections are summed (combine mode `Add`).

use super::config::{BlockIluParameters, CombineMode};
use super::ilu::IluFactors;
use super::traits::{check_apply, not_computed, Preconditioner};
use crate::error::{MfdError, Result};
use crate::sparse;
use nalgebra_sparse::CsrMatrix;
use std::collections::BTreeSet;

struct Subdomain {
    rows: Vec<usize>,
    factors: IluFactors,
}

pub struct BlockIluPreconditioner {
    params: BlockIluParameters,
    size: usize,
    subdomains: Vec<Subdomain>,
}

impl BlockIluPreconditioner {
    pub fn new(mut params: BlockIluParameters) -> Self {
        if params.combine_mode != CombineMode::Add {
            log::warn!(
                "Block ILU combine mode {:?} replaced by Add",
                params.combine_mode
            );
            params.combine_mode = CombineMode::Add;
        }
        Self {
            params,
            size: 0,
            subdomains: Vec::new(),
        }
    }

    pub fn params(&self) -> &BlockIluParameters {
        &self.params
    }

    pub fn num_subdomains(&self) -> usize {
        self.subdomains.len()
    }

    /// Sorted row sets of every subdomain after overlap extension
    pub fn subdomain_rows(&self) -> impl Iterator<Item = &[usize]> {
        self.subdomains.iter().map(|s| s.rows.as_slice())
    }
}

/// Contiguous parts of `0..n`, grown by `overlap` graph layers
pub(crate) fn overlapping_parts(
    adjacency: &[Vec<usize>],
    parts: usize,
    overlap: usize,
) -> Vec<Vec<usize>> {
    let n = adjacency.len();
    let parts = parts.clamp(1, n.max(1));
    let chunk = n.div_ceil(parts);

    (0..parts)
        .map(|p| {
            let lo = (p * chunk).min(n);
            let hi = ((p + 1) * chunk).min(n);
            let mut rows: BTreeSet<usize> = (lo..hi).collect();
            let mut frontier: Vec<usize> = rows.iter().copied().collect();
            for _ in 0..overlap {
                let mut grown = Vec::new();
                for &i in &frontier {
                    for &j in &adjacency[i] {
                        if rows.insert(j) {
                            grown.push(j);
                        }
                    }
                }
                frontier = grown;
            }
            rows.into_iter().collect()
        })
        .filter(|rows: &Vec<usize>| !rows.is_empty())
        .collect()
}

impl Preconditioner for BlockIluPreconditioner {
    fn name(&self) -> &'static str {
        "Block ILU"
    }

    fn update(&mut self, matrix: &CsrMatrix<f64>) -> Result<()> {
        self.subdomains.clear();
        self.size = 0;
        if matrix.nrows() != matrix.ncols() {
            return Err(MfdError::Sparse(format!(
                "Block ILU needs a square matrix, got {}x{}",
                matrix.nrows(),
                matrix.ncols()
            )));
        }

        let adjacency = sparse::adjacency(matrix);
        let parts = overlapping_parts(&adjacency, self.params.local_parts, self.params.overlap);
        let mut subdomains = Vec::with_capacity(parts.len());
        for rows in parts {
            let local = sparse::principal_submatrix(matrix, &rows)?;
            let factors = IluFactors::compute(&local, &self.params.ilu)?;
            subdomains.push(Subdomain { rows, factors });
        }

        log::debug!(
            "Block ILU: {} subdomains, overlap {}",
            subdomains.len(),
            self.params.overlap
        );
        self.subdomains = subdomains;
        self.size = matrix.nrows();
        Ok(())
    }

    fn apply_inverse(&self, r: &[f64], z: &mut [f64]) -> Result<()> {
        if !self.is_computed() {
            return Err(not_computed(self.name()));
        }
        check_apply(self.name(), self.size, r, z)?;

        z.iter_mut().for_each(|v| *v = 0.0);
        for sub in &self.subdomains {
            let local_r: Vec<f64> = sub.rows.iter().map(|&i| r[i]).collect();
            let mut local_z = vec![0.0; local_r.len()];
            sub.factors.solve(&local_r, &mut local_z);
            for (&i, v) in sub.rows.iter().zip(local_z) {
                z[i] += v;
            }
        }
        Ok(())
    }

    fn is_computed(&self) -> bool {
        !self.subdomains.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{DMatrix, DVector};
    use nalgebra_sparse::CooMatrix;

    fn path_adjacency(n: usize) -> Vec<Vec<usize>> {
        (0..n)
            .map(|i| {
                let mut v = Vec::new();
                if i > 0 {
                    v.push(i - 1);
                }
                if i + 1 < n {
                    v.push(i + 1);
                }
                v
            })
            .collect()
    }

    #[test]
    fn parts_grow_by_overlap() {
        let adj = path_adjacency(8);
        let parts = overlapping_parts(&adj, 2, 0);
        assert_eq!(parts, vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7]]);

        let parts = overlapping_parts(&adj, 2, 1);
        assert_eq!(parts[0], vec![0, 1, 2, 3, 4]);
        assert_eq!(parts[1], vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn combine_mode_is_forced_to_add() {
        let params = BlockIluParameters {
            combine_mode: CombineMode::Zero,
            ..Default::default()
        };
        let prec = BlockIluPreconditioner::new(params);
        assert_eq!(prec.params().combine_mode, CombineMode::Add);
    }

    #[test]
    fn single_part_matches_plain_ilu() {
        let dense = DMatrix::from_fn(6, 6, |i, j| match i.abs_diff(j) {
            0 => 3.0,
            1 => -1.0,
            _ => 0.0,
        });
        let csr = CsrMatrix::from(&CooMatrix::from(&dense));
        let mut prec = BlockIluPreconditioner::new(BlockIluParameters::default());
        prec.update(&csr).unwrap();
        assert_eq!(prec.num_subdomains(), 1);

        let b = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut x = [0.0; 6];
        prec.apply_inverse(&b, &mut x).unwrap();
        // Tridiagonal ILU(0) is exact
        let ax = &dense * DVector::from_column_slice(&x);
        for i in 0..6 {
            assert!((ax[i] - b[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn overlapping_subdomains_sum_corrections() {
        let dense = DMatrix::from_diagonal_element(4, 4, 2.0);
        let csr = CsrMatrix::from(&CooMatrix::from(&dense));
        let params = BlockIluParameters {
            local_parts: 2,
            ..Default::default()
        };
        let mut prec = BlockIluPreconditioner::new(params);
        prec.update(&csr).unwrap();
        assert_eq!(prec.num_subdomains(), 2);

        let mut z = [0.0; 4];
        prec.apply_inverse(&[2.0, 4.0, 6.0, 8.0], &mut z).unwrap();
        assert_eq!(z, [1.0, 2.0, 3.0, 4.0]);
    }
}
