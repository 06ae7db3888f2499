//! The mixed finite-difference operator and its update sequence.
//!
//! A [`MatrixMfd`] owns everything built from one mesh: elemental blocks,
//! sparsity graphs, global matrices, the reduced face matrix and the
//! preconditioner. The update sequence is
//!
//! ```text
//! create_mass_matrices
//!   → create_stiffness_matrices      (ElementalBuilt)
//!   → [add_accumulation_terms, add_cell_sources]
//!   → apply_boundary_conditions
//!   → assemble_global_matrices       (Assembled)
//!   → compute_schur_complement       (Reduced)
//!   → update_preconditioner          (Preconditioned)
//! ```
//!
//! Calls made in the wrong state fail with [`MfdError::OutOfOrder`].
//! New coefficients restart the sequence at `create_stiffness_matrices`;
//! the sparsity graphs survive for the lifetime of the instance.

use crate::assembly::{GlobalOperator, SparsityGraphs};
use crate::boundary_conditions::BoundaryConditions;
use crate::coefficients::{RelativeConductivity, Tensor};
use crate::config::MatrixMfdConfig;
use crate::elemental::{self, ElementalBlocks, ElementalDiagnostics, MfdMethod};
use crate::error::{MfdError, Result};
use crate::mesh::{MeshTopology, Parallel};
use crate::preconditioner::Preconditioner;
use crate::schur;
use crate::sparse;
use nalgebra::DMatrix;
use nalgebra_sparse::CsrMatrix;
use std::fmt;
use std::sync::Arc;

/// Position in the update sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AssemblyState {
    Uninitialized,
    ElementalBuilt,
    Assembled,
    Reduced,
    Preconditioned,
}

impl AssemblyState {
    pub fn name(self) -> &'static str {
        match self {
            AssemblyState::Uninitialized => "Uninitialized",
            AssemblyState::ElementalBuilt => "ElementalBuilt",
            AssemblyState::Assembled => "Assembled",
            AssemblyState::Reduced => "Reduced",
            AssemblyState::Preconditioned => "Preconditioned",
        }
    }
}

impl fmt::Display for AssemblyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub struct MatrixMfd {
    pub(crate) mesh: Arc<dyn MeshTopology>,
    method: MfdMethod,
    config: MatrixMfdConfig,

    mass: Option<Vec<DMatrix<f64>>>,
    pub(crate) blocks: Vec<ElementalBlocks>,
    pub(crate) krel_face: Vec<f64>,
    diagnostics: ElementalDiagnostics,
    bcs: Option<BoundaryConditions>,

    pub(crate) graphs: Option<SparsityGraphs>,
    pub(crate) global: Option<GlobalOperator>,
    pub(crate) sff: Option<CsrMatrix<f64>>,
    pub(crate) preconditioner: Option<Box<dyn Preconditioner>>,

    pub(crate) state: AssemblyState,
}

impl fmt::Debug for MatrixMfd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatrixMfd")
            .field("method", &self.method)
            .field("state", &self.state)
            .field("cells", &self.blocks.len())
            .field(
                "preconditioner",
                &self.preconditioner.as_ref().map(|p| p.name()),
            )
            .finish()
    }
}

impl MatrixMfd {
    /// Resolve the method and preconditioner names. Unknown names and
    /// preconditioners missing from this build are configuration errors.
    pub fn new(mesh: Arc<dyn MeshTopology>, config: MatrixMfdConfig) -> Result<Self> {
        let method = config.method()?;
        let preconditioner = config
            .preconditioner_kind()?
            .map(|kind| kind.create(&config))
            .transpose()?;

        log::debug!(
            "MatrixMfd: method \"{}\", preconditioner {:?}, {} owned cells, {} owned faces",
            method,
            preconditioner.as_ref().map(|p| p.name()),
            mesh.num_cells(Parallel::Owned),
            mesh.num_faces(Parallel::Owned)
        );

        Ok(Self {
            mesh,
            method,
            config,
            mass: None,
            blocks: Vec::new(),
            krel_face: Vec::new(),
            diagnostics: ElementalDiagnostics::default(),
            bcs: None,
            graphs: None,
            global: None,
            sff: None,
            preconditioner,
            state: AssemblyState::Uninitialized,
        })
    }

    pub fn mesh(&self) -> &dyn MeshTopology {
        &*self.mesh
    }

    pub fn method(&self) -> MfdMethod {
        self.method
    }

    pub fn config(&self) -> &MatrixMfdConfig {
        &self.config
    }

    pub fn state(&self) -> AssemblyState {
        self.state
    }

    pub fn diagnostics(&self) -> ElementalDiagnostics {
        self.diagnostics
    }

    pub fn elemental_blocks(&self) -> &[ElementalBlocks] {
        &self.blocks
    }

    /// Face relative conductivity on used faces, as set by the last
    /// `create_stiffness_matrices`
    pub fn krel_face(&self) -> &[f64] {
        &self.krel_face
    }

    pub fn preconditioner_name(&self) -> Option<&'static str> {
        self.preconditioner.as_ref().map(|p| p.name())
    }

    pub(crate) fn require(&self, operation: &'static str, required: AssemblyState) -> Result<()> {
        if self.state < required {
            return Err(MfdError::OutOfOrder {
                operation,
                required: required.name(),
                current: self.state,
            });
        }
        Ok(())
    }

    pub(crate) fn global(&self, operation: &'static str) -> Result<&GlobalOperator> {
        self.global.as_ref().ok_or(MfdError::OutOfOrder {
            operation,
            required: AssemblyState::Assembled.name(),
            current: self.state,
        })
    }

    // ---- Elemental phase ----

    /// Build the local inverse mass matrices. `k` defaults to the identity
    /// tensor in every cell.
    pub fn create_mass_matrices(&mut self, k: Option<&[Tensor]>) -> Result<()> {
        self.mass = None;
        self.blocks.clear();
        self.state = AssemblyState::Uninitialized;

        let (mass, diagnostics) = elemental::create_mass_matrices(&*self.mesh, self.method, k)?;
        self.mass = Some(mass);
        self.diagnostics = diagnostics;
        Ok(())
    }

    /// Scale the mass matrices by relative conductivity into fresh stiffness
    /// blocks with zero loads.
    pub fn create_stiffness_matrices(&mut self, krel: Option<&RelativeConductivity>) -> Result<()> {
        let mass = self.mass.as_ref().ok_or(MfdError::OutOfOrder {
            operation: "create_stiffness_matrices",
            required: "mass matrices created",
            current: self.state,
        })?;
        let (blocks, krel_face) = elemental::create_stiffness_matrices(&*self.mesh, mass, krel)?;
        self.blocks = blocks;
        self.krel_face = krel_face;
        self.bcs = None;
        self.state = AssemblyState::ElementalBuilt;
        Ok(())
    }

    fn require_unconstrained(&self, operation: &'static str) -> Result<()> {
        if self.state != AssemblyState::ElementalBuilt || self.bcs.is_some() {
            return Err(MfdError::OutOfOrder {
                operation,
                required: "ElementalBuilt without boundary conditions",
                current: self.state,
            });
        }
        Ok(())
    }

    /// Add a per-cell storage coefficient to `Acc`
    pub fn add_accumulation_terms(&mut self, terms: &[f64]) -> Result<()> {
        self.require_unconstrained("add_accumulation_terms")?;
        elemental::add_accumulation_terms(&mut self.blocks, terms)
    }

    /// Add per-cell volumetric sources to the cell loads
    pub fn add_cell_sources(&mut self, sources: &[f64]) -> Result<()> {
        self.require_unconstrained("add_cell_sources")?;
        if sources.len() != self.blocks.len() {
            return Err(MfdError::Configuration(format!(
                "{} cell sources supplied for {} owned cells",
                sources.len(),
                self.blocks.len()
            )));
        }
        for (block, &q) in self.blocks.iter_mut().zip(sources) {
            block.fc += q;
        }
        Ok(())
    }

    /// Zero the local loads
    pub fn create_rhs_vectors(&mut self) -> Result<()> {
        self.require_unconstrained("create_rhs_vectors")?;
        elemental::create_rhs_vectors(&mut self.blocks);
        Ok(())
    }

    /// Eliminate boundary conditions from the local blocks. Allowed once per
    /// set of stiffness blocks.
    pub fn apply_boundary_conditions(&mut self, bcs: &BoundaryConditions) -> Result<()> {
        self.require_unconstrained("apply_boundary_conditions")?;
        bcs.eliminate(&*self.mesh, &mut self.blocks, &self.krel_face)?;
        self.bcs = Some(bcs.clone());
        Ok(())
    }

    pub fn boundary_conditions(&self) -> Option<&BoundaryConditions> {
        self.bcs.as_ref()
    }

    // ---- Global phase ----

    /// Build the sparsity graphs and allocate the global containers. Only
    /// the first call does any work.
    pub fn symbolic_assemble_global_matrices(&mut self) -> Result<()> {
        if self.graphs.is_some() {
            return Ok(());
        }
        let graphs = SparsityGraphs::build(&*self.mesh)?;
        self.global = Some(GlobalOperator::allocate(&graphs, self.config.symmetric)?);
        self.sff = Some(sparse::zeros_on(&graphs.ff)?);
        self.graphs = Some(graphs);
        Ok(())
    }

    /// Zero and refill the global matrices from the elemental blocks
    pub fn assemble_global_matrices(&mut self) -> Result<()> {
        if self.state != AssemblyState::ElementalBuilt {
            return Err(MfdError::OutOfOrder {
                operation: "assemble_global_matrices",
                required: AssemblyState::ElementalBuilt.name(),
                current: self.state,
            });
        }
        self.symbolic_assemble_global_matrices()?;
        let (Some(graphs), Some(global)) = (self.graphs.as_ref(), self.global.as_mut()) else {
            return Err(MfdError::Invariant(
                "global containers missing after symbolic assembly".to_string(),
            ));
        };
        global.assemble(&*self.mesh, graphs, &self.blocks)?;
        self.state = AssemblyState::Assembled;
        Ok(())
    }

    /// Reduce to the face-only Schur complement `Sff`
    pub fn compute_schur_complement(&mut self) -> Result<()> {
        if self.state != AssemblyState::Assembled {
            return Err(MfdError::OutOfOrder {
                operation: "compute_schur_complement",
                required: AssemblyState::Assembled.name(),
                current: self.state,
            });
        }
        let empty;
        let bcs = match self.bcs.as_ref() {
            Some(bcs) => bcs,
            None => {
                empty = BoundaryConditions::for_mesh(&*self.mesh);
                &empty
            }
        };
        let (Some(graphs), Some(sff)) = (self.graphs.as_ref(), self.sff.as_mut()) else {
            return Err(MfdError::Invariant(
                "reduced matrix missing after assembly".to_string(),
            ));
        };
        schur::compute_schur_complement(&*self.mesh, graphs, &self.blocks, bcs, sff)?;
        self.state = AssemblyState::Reduced;
        Ok(())
    }

    /// Rebuild the preconditioner from the current `Sff`
    pub fn update_preconditioner(&mut self) -> Result<()> {
        self.require("update_preconditioner", AssemblyState::Reduced)?;
        let sff = self.sff.as_ref().ok_or(MfdError::OutOfOrder {
            operation: "update_preconditioner",
            required: AssemblyState::Reduced.name(),
            current: self.state,
        })?;
        let prec = self
            .preconditioner
            .as_mut()
            .ok_or_else(|| MfdError::Configuration("no preconditioner configured".to_string()))?;
        prec.update(sff)?;
        log::info!("Updated {} preconditioner ({} rows)", prec.name(), sff.nrows());
        self.state = AssemblyState::Preconditioned;
        Ok(())
    }

    /// Run the whole sequence from stiffness construction to the
    /// preconditioner for new coefficients and boundary conditions.
    pub fn update(
        &mut self,
        krel: Option<&RelativeConductivity>,
        bcs: &BoundaryConditions,
    ) -> Result<()> {
        self.create_stiffness_matrices(krel)?;
        self.apply_boundary_conditions(bcs)?;
        self.assemble_global_matrices()?;
        self.compute_schur_complement()?;
        if self.preconditioner.is_some() {
            self.update_preconditioner()?;
        }
        Ok(())
    }

    // ---- Accessors ----

    pub fn aff(&self) -> Option<&CsrMatrix<f64>> {
        self.global.as_ref().map(|g| &g.aff)
    }

    pub fn acf(&self) -> Option<&CsrMatrix<f64>> {
        self.global.as_ref().map(|g| &g.acf)
    }

    /// Cell→face coupling in transposed (cells × used faces) orientation
    pub fn afc(&self) -> Option<&CsrMatrix<f64>> {
        self.global.as_ref().map(|g| g.afc())
    }

    pub fn acc(&self) -> Option<&nalgebra::DVector<f64>> {
        self.global.as_ref().map(|g| &g.acc)
    }

    pub fn rhs(&self) -> Option<&crate::composite_vector::CompositeVector> {
        self.global.as_ref().map(|g| &g.rhs)
    }

    pub fn sff(&self) -> Option<&CsrMatrix<f64>> {
        if self.state >= AssemblyState::Reduced {
            self.sff.as_ref()
        } else {
            None
        }
    }
}
