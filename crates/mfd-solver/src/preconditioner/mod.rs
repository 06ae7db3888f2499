//! Preconditioners for the reduced face-only system.
//!
//! The Schur complement `Sff` is handed to one of a closed set of variants,
//! selected by name once at construction. Every variant implements
//! [`Preconditioner`]; `update` always rebuilds from scratch.
//!
//! # Variants
//!
//! ```text
//!                 Sff (CSR, owned faces)
//!                         │
//!                         ▼
//!              PreconditionerKind::create
//!    ┌──────┬──────┬──────┴──────┬───────────────────────────┐
//!    ▼      ▼      ▼             ▼                           ▼
//!   ML     ILU  Block ILU      Direct           HYPRE AMG / Euclid / ParaSails
//!  (SA-AMG) (k)  (Schwarz)    (dense LU)            (feature `hypre`)
//! ```

pub mod amg;
pub mod block_ilu;
pub mod config;
pub mod direct;
pub mod ilu;
#[cfg(feature = "hypre")]
pub mod parasails;
pub mod traits;

pub use amg::MlPreconditioner;
#[cfg(feature = "hypre")]
pub use amg::HypreAmgPreconditioner;
pub use block_ilu::BlockIluPreconditioner;
pub use config::*;
pub use direct::DirectPreconditioner;
pub use ilu::{IluFactors, IluPreconditioner};
#[cfg(feature = "hypre")]
pub use parasails::ParaSailsPreconditioner;
pub use traits::Preconditioner;

use crate::config::MatrixMfdConfig;
use crate::error::{MfdError, Result};
use std::fmt;
use std::str::FromStr;

/// Preconditioner variant selected by configuration name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreconditionerKind {
    Ml,
    Ilu,
    BlockIlu,
    Direct,
    HypreAmg,
    HypreEuclid,
    HypreParaSails,
}

impl PreconditionerKind {
    pub const ALL: [PreconditionerKind; 7] = [
        PreconditionerKind::Ml,
        PreconditionerKind::Ilu,
        PreconditionerKind::BlockIlu,
        PreconditionerKind::Direct,
        PreconditionerKind::HypreAmg,
        PreconditionerKind::HypreEuclid,
        PreconditionerKind::HypreParaSails,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PreconditionerKind::Ml => "ML",
            PreconditionerKind::Ilu => "ILU",
            PreconditionerKind::BlockIlu => "Block ILU",
            PreconditionerKind::Direct => "Direct",
            PreconditionerKind::HypreAmg => "HYPRE AMG",
            PreconditionerKind::HypreEuclid => "HYPRE Euclid",
            PreconditionerKind::HypreParaSails => "HYPRE ParaSails",
        }
    }

    /// Name of the option sub-list read by this variant
    pub fn parameters_key(self) -> Option<&'static str> {
        match self {
            PreconditionerKind::Ml => Some("ML Parameters"),
            PreconditionerKind::Ilu => Some("ILU Parameters"),
            PreconditionerKind::BlockIlu => Some("Block ILU Parameters"),
            PreconditionerKind::Direct => None,
            PreconditionerKind::HypreAmg => Some("HYPRE AMG Parameters"),
            PreconditionerKind::HypreEuclid => Some("HYPRE Euclid Parameters"),
            PreconditionerKind::HypreParaSails => Some("HYPRE ParaSails Parameters"),
        }
    }

    /// Whether this build can construct the variant
    pub fn is_available(self) -> bool {
        match self {
            PreconditionerKind::HypreAmg
            | PreconditionerKind::HypreEuclid
            | PreconditionerKind::HypreParaSails => cfg!(feature = "hypre"),
            _ => true,
        }
    }

    /// Build an uncomputed preconditioner with the option bag from `config`.
    pub fn create(self, config: &MatrixMfdConfig) -> Result<Box<dyn Preconditioner>> {
        if !self.is_available() {
            return Err(unsupported(self));
        }
        log::debug!("creating {} preconditioner", self.name());

        let prec: Box<dyn Preconditioner> = match self {
            PreconditionerKind::Ml => Box::new(MlPreconditioner::new(config.ml.clone())),
            PreconditionerKind::Ilu => Box::new(IluPreconditioner::new(config.ilu.clone())),
            PreconditionerKind::BlockIlu => {
                Box::new(BlockIluPreconditioner::new(config.block_ilu.clone()))
            }
            PreconditionerKind::Direct => Box::new(DirectPreconditioner::new()),
            #[cfg(feature = "hypre")]
            PreconditionerKind::HypreAmg => {
                Box::new(HypreAmgPreconditioner::new(config.hypre_amg.clone()))
            }
            #[cfg(feature = "hypre")]
            PreconditionerKind::HypreEuclid => Box::new(IluPreconditioner::named(
                "HYPRE Euclid",
                IluParameters {
                    level_of_fill: config.hypre_euclid.level,
                    ..Default::default()
                },
            )),
            #[cfg(feature = "hypre")]
            PreconditionerKind::HypreParaSails => Box::new(ParaSailsPreconditioner::new(
                config.hypre_parasails.clone(),
            )),
            #[cfg(not(feature = "hypre"))]
            PreconditionerKind::HypreAmg
            | PreconditionerKind::HypreEuclid
            | PreconditionerKind::HypreParaSails => return Err(unsupported(self)),
        };
        Ok(prec)
    }
}

fn unsupported(kind: PreconditionerKind) -> MfdError {
    MfdError::Configuration(format!(
        "preconditioner \"{}\" is not supported in this build (enable feature `hypre`)",
        kind.name()
    ))
}

impl fmt::Display for PreconditionerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PreconditionerKind {
    type Err = MfdError;

    fn from_str(s: &str) -> Result<Self> {
        PreconditionerKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| {
                MfdError::Configuration(format!("unexpected preconditioner \"{}\"", s))
            })
    }
}
