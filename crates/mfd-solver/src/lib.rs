//! Mixed finite-difference (MFD) operator for Darcy flow.
//!
//! This crate builds per-cell MFD matrices on polyhedral meshes, assembles
//! the cell/face block system, reduces it to a face-only Schur complement,
//! preconditions the reduced system and recovers fluxes and velocities
//! from a solution.

pub mod assembly;
pub mod boundary_conditions;
pub mod coefficients;
pub mod comm;
pub mod composite_vector;
pub mod config;
pub mod elemental;
pub mod error;
pub mod krylov;
pub mod matrix_mfd;
pub mod mesh;
pub mod mesh_builder;
pub mod operator;
pub mod postprocess;
pub mod preconditioner;
pub mod schur;
pub mod sparse;

pub use assembly::{GlobalOperator, SparsityGraphs};
pub use boundary_conditions::{BoundaryConditions, BoundaryMarker};
pub use coefficients::{RelativeConductivity, Tensor};
pub use comm::{Communicator, GhostLayout, SerialCommunicator};
pub use composite_vector::CompositeVector;
pub use config::MatrixMfdConfig;
pub use elemental::{ElementalBlocks, ElementalDiagnostics, ElementalStatus, MfdMethod};
pub use error::{MfdError, Result};
pub use krylov::{pcg, PcgConfig, PcgResult};
pub use matrix_mfd::{AssemblyState, MatrixMfd};
pub use mesh::{Cell, Face, MeshStatistics, MeshTopology, Parallel, PolyMesh};
pub use mesh_builder::BoxMeshBuilder;
pub use postprocess::{boundary_outflow, compute_statistics, FieldStatistics};
pub use preconditioner::{Preconditioner, PreconditionerKind};
