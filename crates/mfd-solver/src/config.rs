//! Operator configuration.
//!
//! ```json
//! {
//!   "MFD method": "optimized",
//!   "preconditioner": "ML",
//!   "symmetric": true,
//!   "ML Parameters": { "max levels": 5 }
//! }
//! ```

use crate::elemental::MfdMethod;
use crate::error::Result;
use crate::preconditioner::{
    BlockIluParameters, HypreAmgParameters, HypreEuclidParameters, HypreParaSailsParameters,
    IluParameters, MlParameters, PreconditionerKind,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixMfdConfig {
    #[serde(rename = "MFD method")]
    pub method: String,

    #[serde(rename = "preconditioner", default, skip_serializing_if = "Option::is_none")]
    pub preconditioner: Option<String>,

    /// Share one cell-face block for both couplings
    #[serde(rename = "symmetric", default)]
    pub symmetric: bool,

    #[serde(rename = "ML Parameters", default)]
    pub ml: MlParameters,

    #[serde(rename = "ILU Parameters", default)]
    pub ilu: IluParameters,

    #[serde(rename = "Block ILU Parameters", default)]
    pub block_ilu: BlockIluParameters,

    #[serde(rename = "HYPRE AMG Parameters", default)]
    pub hypre_amg: HypreAmgParameters,

    #[serde(rename = "HYPRE Euclid Parameters", default)]
    pub hypre_euclid: HypreEuclidParameters,

    #[serde(rename = "HYPRE ParaSails Parameters", default)]
    pub hypre_parasails: HypreParaSailsParameters,
}

impl MatrixMfdConfig {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            preconditioner: None,
            symmetric: false,
            ml: MlParameters::default(),
            ilu: IluParameters::default(),
            block_ilu: BlockIluParameters::default(),
            hypre_amg: HypreAmgParameters::default(),
            hypre_euclid: HypreEuclidParameters::default(),
            hypre_parasails: HypreParaSailsParameters::default(),
        }
    }

    pub fn with_preconditioner(mut self, name: impl Into<String>) -> Self {
        self.preconditioner = Some(name.into());
        self
    }

    pub fn with_symmetric(mut self, symmetric: bool) -> Self {
        self.symmetric = symmetric;
        self
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn method(&self) -> Result<MfdMethod> {
        self.method.parse()
    }

    /// `None` when no preconditioner is configured
    pub fn preconditioner_kind(&self) -> Result<Option<PreconditionerKind>> {
        self.preconditioner
            .as_deref()
            .map(str::parse)
            .transpose()
    }
}
