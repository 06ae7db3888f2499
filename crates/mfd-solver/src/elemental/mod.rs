//! Per-cell elemental matrices.
//!
//! For each owned cell this module builds the local inverse mass matrix
//! with the configured [`MfdMethod`], scales it by the relative
//! conductivity into the four stiffness blocks, and holds the local loads
//! that boundary elimination later modifies.

pub mod kernels;

use crate::coefficients::{RelativeConductivity, Tensor};
use crate::comm::Communicator;
use crate::error::{MfdError, Result};
use crate::mesh::{MeshTopology, Parallel};
use kernels::{CellGeometry, MassInverseKernel};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use std::fmt;
use std::str::FromStr;

/// Discretisation scheme for the local inverse mass matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MfdMethod {
    Polyhedra,
    PolyhedraScaled,
    Optimized,
    OptimizedScaled,
    HexahedraMonotone,
    TwoPointFlux,
    SupportOperator,
}

impl MfdMethod {
    pub const ALL: [MfdMethod; 7] = [
        MfdMethod::Polyhedra,
        MfdMethod::PolyhedraScaled,
        MfdMethod::Optimized,
        MfdMethod::OptimizedScaled,
        MfdMethod::HexahedraMonotone,
        MfdMethod::TwoPointFlux,
        MfdMethod::SupportOperator,
    ];

    /// Configuration name
    pub fn name(&self) -> &'static str {
        match self {
            MfdMethod::Polyhedra => "polyhedra",
            MfdMethod::PolyhedraScaled => "polyhedra scaled",
            MfdMethod::Optimized => "optimized",
            MfdMethod::OptimizedScaled => "optimized scaled",
            MfdMethod::HexahedraMonotone => "hexahedra monotone",
            MfdMethod::TwoPointFlux => "two point flux",
            MfdMethod::SupportOperator => "support operator",
        }
    }

    /// Resolve to the kernel function
    pub fn kernel(&self) -> MassInverseKernel {
        match self {
            MfdMethod::Polyhedra => kernels::polyhedra,
            MfdMethod::PolyhedraScaled => kernels::polyhedra_scaled,
            MfdMethod::Optimized => kernels::optimized,
            MfdMethod::OptimizedScaled => kernels::optimized_scaled,
            MfdMethod::HexahedraMonotone => kernels::hexahedra_monotone,
            MfdMethod::TwoPointFlux => kernels::two_point_flux,
            MfdMethod::SupportOperator => kernels::support_operator,
        }
    }
}

impl fmt::Display for MfdMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MfdMethod {
    type Err = MfdError;

    fn from_str(s: &str) -> Result<Self> {
        MfdMethod::ALL
            .iter()
            .copied()
            .find(|m| m.name() == s)
            .ok_or_else(|| {
                MfdError::Configuration(format!("unexpected discretization method \"{}\"", s))
            })
    }
}

/// Outcome of one elemental construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementalStatus {
    /// Fully successful
    Ok,
    /// Usable but some optional property (e.g. monotonicity) was not achieved
    Passed,
    /// Fatal
    Failed,
}

/// Global counts of `Ok` and `Passed` cells
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElementalDiagnostics {
    pub ok: usize,
    pub passed: usize,
}

/// Dense local blocks of one owned cell
#[derive(Debug, Clone, PartialEq)]
pub struct ElementalBlocks {
    /// Face-face block (inverse mass matrix scaled by cell krel)
    pub aff: DMatrix<f64>,
    /// Face→cell coupling
    pub acf: DVector<f64>,
    /// Cell→face coupling
    pub afc: DVector<f64>,
    pub acc: f64,
    /// Local face load
    pub ff: DVector<f64>,
    /// Local cell load
    pub fc: f64,
    /// Copy of `aff` taken before boundary elimination, used for flux recovery
    pub aff_free: DMatrix<f64>,
}

impl ElementalBlocks {
    fn from_mass_inverse(w: DMatrix<f64>) -> Self {
        let n = w.nrows();
        Self {
            aff_free: w.clone(),
            aff: w,
            acf: DVector::zeros(n),
            afc: DVector::zeros(n),
            acc: 0.0,
            ff: DVector::zeros(n),
            fc: 0.0,
        }
    }

    pub fn num_faces(&self) -> usize {
        self.aff.nrows()
    }

    /// Largest violation of the two conservation identities
    /// (`Aff` row + `Afc` and `Σ Acf + Acc`), relative to the block size
    pub fn conservation_defect(&self) -> f64 {
        let scale = self.aff.amax().max(f64::MIN_POSITIVE);
        let rows = (0..self.num_faces())
            .map(|i| (self.aff.row(i).sum() + self.afc[i]).abs())
            .fold(0.0, f64::max);
        let cols = (self.acf.sum() + self.acc).abs();
        rows.max(cols) / scale
    }
}

/// Build the inverse mass matrices of all owned cells.
///
/// Fails on the first `Failed` cell; `Ok`/`Passed` counts are reduced over
/// the communicator.
pub fn create_mass_matrices(
    mesh: &dyn MeshTopology,
    method: MfdMethod,
    k: Option<&[Tensor]>,
) -> Result<(Vec<DMatrix<f64>>, ElementalDiagnostics)> {
    let ncells = mesh.num_cells(Parallel::Owned);
    let d = mesh.space_dimension();
    if let Some(k) = k {
        if k.len() != ncells {
            return Err(MfdError::Configuration(format!(
                "{} conductivity tensors supplied for {} owned cells",
                k.len(),
                ncells
            )));
        }
    }

    let kernel = method.kernel();
    let identity = Tensor::identity(d);
    let results: Vec<(ElementalStatus, DMatrix<f64>)> = (0..ncells)
        .into_par_iter()
        .map(|c| {
            let geom = CellGeometry::from_mesh(mesh, c);
            let kc = k.map_or(&identity, |k| &k[c]);
            kernel(&geom, kc)
        })
        .collect();

    let mut local = ElementalDiagnostics::default();
    let mut mass = Vec::with_capacity(ncells);
    for (c, (status, w)) in results.into_iter().enumerate() {
        match status {
            ElementalStatus::Failed => {
                return Err(MfdError::Numerical(format!(
                    "elemental matrix construction failed in cell {} (method \"{}\")",
                    c, method
                )));
            }
            ElementalStatus::Ok => local.ok += 1,
            ElementalStatus::Passed => local.passed += 1,
        }
        mass.push(w);
    }

    let diagnostics = reduce(mesh.comm(), local);
    if diagnostics.passed > 0 {
        log::warn!(
            "{} of {} cells passed without an M-matrix-signed mass inverse",
            diagnostics.passed,
            diagnostics.ok + diagnostics.passed
        );
    }
    log::info!(
        "Elemental mass matrices ({}): {} ok, {} passed",
        method,
        diagnostics.ok,
        diagnostics.passed
    );
    Ok((mass, diagnostics))
}

fn reduce(comm: &dyn Communicator, local: ElementalDiagnostics) -> ElementalDiagnostics {
    ElementalDiagnostics {
        ok: comm.sum_all(local.ok),
        passed: comm.sum_all(local.passed),
    }
}

/// Scale the inverse mass matrices by relative conductivity into stiffness
/// blocks. Returns the blocks and the face conductivity with ghosts.
pub fn create_stiffness_matrices(
    mesh: &dyn MeshTopology,
    mass: &[DMatrix<f64>],
    krel: Option<&RelativeConductivity>,
) -> Result<(Vec<ElementalBlocks>, Vec<f64>)> {
    let ncells = mesh.num_cells(Parallel::Owned);
    let nfaces_used = mesh.num_faces(Parallel::Used);
    let default_krel = RelativeConductivity::default();
    let krel = krel.unwrap_or(&default_krel);
    krel.validate(ncells, nfaces_used)?;
    let krel_face = krel.face_values(nfaces_used);

    let blocks = mass
        .iter()
        .enumerate()
        .map(|(c, w)| {
            let (faces, _) = mesh.cell_faces_and_dirs(c);
            let mut blocks = ElementalBlocks::from_mass_inverse(w * krel.cell_value(c));
            let n = faces.len();

            let mut matsum = 0.0;
            for j in 0..n {
                let mut colsum = 0.0;
                let mut rowsum = 0.0;
                for i in 0..n {
                    colsum += blocks.aff[(i, j)] * krel_face[faces[i]];
                    rowsum += blocks.aff[(j, i)];
                }
                blocks.acf[j] = -colsum;
                blocks.afc[j] = -rowsum;
                matsum += colsum;
            }
            blocks.acc = matsum;
            blocks.aff_free = blocks.aff.clone();
            blocks
        })
        .collect();

    Ok((blocks, krel_face))
}

/// Add a per-cell storage term to `Acc`
pub fn add_accumulation_terms(blocks: &mut [ElementalBlocks], terms: &[f64]) -> Result<()> {
    if terms.len() != blocks.len() {
        return Err(MfdError::Configuration(format!(
            "{} accumulation terms supplied for {} owned cells",
            terms.len(),
            blocks.len()
        )));
    }
    for (block, &term) in blocks.iter_mut().zip(terms) {
        if term < 0.0 {
            return Err(MfdError::Configuration(format!(
                "accumulation term {} is negative",
                term
            )));
        }
        block.acc += term;
    }
    Ok(())
}

/// Zero the local loads
pub fn create_rhs_vectors(blocks: &mut [ElementalBlocks]) {
    for block in blocks {
        block.ff.fill(0.0);
        block.fc = 0.0;
    }
}
