//! Preconditioned conjugate gradients on composite vectors.

use crate::composite_vector::CompositeVector;
use crate::error::{MfdError, Result};
use serde::{Deserialize, Serialize};

/// Iteration controls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcgConfig {
    /// Stop when `‖r‖ ≤ tolerance · ‖b‖`
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for PcgConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_iterations: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PcgResult {
    pub iterations: usize,
    pub residual_norm: f64,
    pub converged: bool,
}

/// Solve `A x = b` starting from `x`.
///
/// `apply` computes `A v`, `precondition` computes `M⁻¹ r`; both must be
/// symmetric positive definite.
pub fn pcg<A, P>(
    apply: A,
    precondition: P,
    b: &CompositeVector,
    x: &mut CompositeVector,
    config: &PcgConfig,
) -> Result<PcgResult>
where
    A: Fn(&CompositeVector, &mut CompositeVector) -> Result<()>,
    P: Fn(&CompositeVector, &mut CompositeVector) -> Result<()>,
{
    let bnorm = b.norm();
    let target = config.tolerance * if bnorm > 0.0 { bnorm } else { 1.0 };

    let mut r = b.clone();
    let mut ap = b.clone();
    apply(x, &mut ap)?;
    r.update(-1.0, &ap, 1.0);
    let mut rnorm = r.norm();
    if rnorm <= target {
        return Ok(PcgResult {
            iterations: 0,
            residual_norm: rnorm,
            converged: true,
        });
    }

    let mut z = b.clone();
    precondition(&r, &mut z)?;
    let mut p = z.clone();
    let mut rz = r.dot(&z);

    for it in 1..=config.max_iterations {
        apply(&p, &mut ap)?;
        let pap = p.dot(&ap);
        if pap <= 0.0 || !pap.is_finite() {
            return Err(MfdError::Numerical(format!(
                "PCG breakdown at iteration {}: pᵀAp = {:e}",
                it, pap
            )));
        }
        let alpha = rz / pap;
        x.update(alpha, &p, 1.0);
        r.update(-alpha, &ap, 1.0);
        rnorm = r.norm();
        log::trace!("PCG iteration {}: ‖r‖ = {:e}", it, rnorm);
        if rnorm <= target {
            log::debug!("PCG converged in {} iterations, ‖r‖ = {:e}", it, rnorm);
            return Ok(PcgResult {
                iterations: it,
                residual_norm: rnorm,
                converged: true,
            });
        }

        precondition(&r, &mut z)?;
        let rz_new = r.dot(&z);
        let beta = rz_new / rz;
        rz = rz_new;
        p.update(1.0, &z, beta);
    }

    log::warn!(
        "PCG did not converge in {} iterations, ‖r‖ = {:e} (target {:e})",
        config.max_iterations,
        rnorm,
        target
    );
    Ok(PcgResult {
        iterations: config.max_iterations,
        residual_norm: rnorm,
        converged: false,
    })
}
