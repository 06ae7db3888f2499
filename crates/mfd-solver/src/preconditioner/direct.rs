//! Exact inverse through a dense LU factorisation.
//!
//! Only meant for small reduced systems and for checking the other
//! variants.

use super::traits::{check_apply, not_computed, Preconditioner};
use crate::error::{MfdError, Result};
use nalgebra::{DMatrix, DVector, Dyn, LU};
use nalgebra_sparse::CsrMatrix;

#[derive(Default)]
pub struct DirectPreconditioner {
    lu: Option<LU<f64, Dyn, Dyn>>,
}

impl DirectPreconditioner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Preconditioner for DirectPreconditioner {
    fn name(&self) -> &'static str {
        "Direct"
    }

    fn update(&mut self, matrix: &CsrMatrix<f64>) -> Result<()> {
        self.lu = None;
        let lu = DMatrix::from(matrix).lu();
        if !lu.is_invertible() {
            return Err(MfdError::Numerical(
                "Singular matrix in LU decomposition".to_string(),
            ));
        }
        self.lu = Some(lu);
        Ok(())
    }

    fn apply_inverse(&self, r: &[f64], z: &mut [f64]) -> Result<()> {
        let lu = self.lu.as_ref().ok_or_else(|| not_computed(self.name()))?;
        check_apply(self.name(), lu.l().nrows(), r, z)?;
        let x = lu
            .solve(&DVector::from_column_slice(r))
            .ok_or_else(|| MfdError::Numerical("LU solve failed".to_string()))?;
        z.copy_from_slice(x.as_slice());
        Ok(())
    }

    fn is_computed(&self) -> bool {
        self.lu.is_some()
    }
}
