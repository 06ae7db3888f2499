//! Error types for mfd-solver
//!
//! Every variant is fatal for the current assembly cycle. Nothing inside the
//! crate retries or degrades; the caller decides whether to restart with
//! different inputs (for example a smaller time step).

use crate::matrix_mfd::AssemblyState;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MfdError>;

#[derive(Error, Debug)]
pub enum MfdError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Configuration error: {operation} requires state {required}, current state is {current:?}")]
    OutOfOrder {
        operation: &'static str,
        required: &'static str,
        current: AssemblyState,
    },

    #[error("Numerical failure: {0}")]
    Numerical(String),

    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Sparse matrix error: {0}")]
    Sparse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MfdError {
    /// True for the configuration class (bad names, unsupported variants, call order).
    pub fn is_configuration(&self) -> bool {
        matches!(self, MfdError::Configuration(_) | MfdError::OutOfOrder { .. })
    }
}
