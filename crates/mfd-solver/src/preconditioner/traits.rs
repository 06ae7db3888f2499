//! Preconditioner trait definitions.
//!
//! A preconditioner approximates the inverse of the reduced face matrix.
//! The operator only needs two things from it: a full rebuild from a new
//! matrix and the application of the approximate inverse to one vector.

use crate::error::{MfdError, Result};
use nalgebra_sparse::CsrMatrix;

/// Approximate inverse of a square sparse matrix.
pub trait Preconditioner: Send + Sync {
    /// Configuration name of this variant (e.g. `"ILU"`).
    fn name(&self) -> &'static str;

    /// Destroy any existing state and rebuild from `matrix`.
    fn update(&mut self, matrix: &CsrMatrix<f64>) -> Result<()>;

    /// `z ≈ matrix⁻¹ r`. Fails if `update` has not succeeded yet.
    fn apply_inverse(&self, r: &[f64], z: &mut [f64]) -> Result<()>;

    /// True once `update` has succeeded.
    fn is_computed(&self) -> bool;
}

pub(crate) fn not_computed(name: &str) -> MfdError {
    MfdError::Configuration(format!("{} preconditioner has not been computed", name))
}

/// Size guard shared by `apply_inverse` implementations.
pub(crate) fn check_apply(name: &str, n: usize, r: &[f64], z: &[f64]) -> Result<()> {
    if r.len() != n || z.len() != n {
        return Err(MfdError::Invariant(format!(
            "{} preconditioner built for size {}, applied to vectors of size {} and {}",
            name,
            n,
            r.len(),
            z.len()
        )));
    }
    Ok(())
}
