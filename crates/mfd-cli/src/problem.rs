//! JSON problem description and the report produced by `mfd-cli solve`.

use mfd_solver::{
    boundary_outflow, compute_statistics, BoundaryConditions, BoundaryMarker, BoxMeshBuilder,
    CompositeVector, FieldStatistics, MatrixMfd, MatrixMfdConfig, MeshTopology, Parallel,
    PcgConfig, PolyMesh, RelativeConductivity, Tensor,
};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Deserialize)]
pub struct MeshSpec {
    /// Cells per axis; two or three entries
    pub cells: Vec<usize>,
    #[serde(default)]
    pub lower: Option<Vec<f64>>,
    #[serde(default)]
    pub upper: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ConductivitySpec {
    Isotropic(f64),
    Diagonal(Vec<f64>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoundarySpec {
    pub side: String,
    #[serde(rename = "type")]
    pub marker: BoundaryMarker,
    #[serde(default)]
    pub value: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Problem {
    pub mesh: MeshSpec,
    pub operator: MatrixMfdConfig,
    #[serde(default)]
    pub conductivity: Option<ConductivitySpec>,
    #[serde(default)]
    pub relative_conductivity: Option<f64>,
    #[serde(default)]
    pub boundary: Vec<BoundarySpec>,
    /// Uniform storage coefficient added to every cell
    #[serde(default)]
    pub accumulation: Option<f64>,
    /// Uniform volumetric source in every cell
    #[serde(default)]
    pub source: Option<f64>,
    #[serde(default)]
    pub solver: PcgConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SideFlux {
    pub side: String,
    pub outflow: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub timestamp: String,
    pub method: String,
    pub preconditioner: Option<String>,
    pub cells: usize,
    pub faces: usize,
    pub elemental_ok: usize,
    pub elemental_passed: usize,
    pub iterations: usize,
    pub residual_norm: f64,
    pub converged: bool,
    pub pressure: Option<FieldStatistics>,
    pub speed: Option<FieldStatistics>,
    pub boundary_flux: Vec<SideFlux>,
}

impl Problem {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn build_mesh(&self) -> Result<PolyMesh, Box<dyn Error>> {
        let cells = &self.mesh.cells;
        let builder = match cells.as_slice() {
            [nx, ny] => BoxMeshBuilder::new_2d(*nx, *ny),
            [nx, ny, nz] => BoxMeshBuilder::new_3d(*nx, *ny, *nz),
            _ => return Err(format!("mesh needs 2 or 3 cell counts, got {}", cells.len()).into()),
        };
        let builder = match (&self.mesh.lower, &self.mesh.upper) {
            (Some(lower), Some(upper)) if lower.len() == cells.len() && upper.len() == cells.len() => {
                builder.extent(lower, upper)
            }
            (None, None) => builder,
            _ => return Err("mesh lower/upper must both be given with one entry per axis".into()),
        };
        Ok(builder.build()?)
    }

    fn tensors(&self, dimension: usize, ncells: usize) -> Result<Option<Vec<Tensor>>, Box<dyn Error>> {
        let tensor = match &self.conductivity {
            None => return Ok(None),
            Some(ConductivitySpec::Isotropic(k)) => Tensor::isotropic(dimension, *k),
            Some(ConductivitySpec::Diagonal(values)) if values.len() == dimension => {
                Tensor::diagonal(values)
            }
            Some(ConductivitySpec::Diagonal(values)) => {
                return Err(format!(
                    "diagonal conductivity needs {} entries, got {}",
                    dimension,
                    values.len()
                )
                .into())
            }
        };
        Ok(Some(vec![tensor; ncells]))
    }

    /// Run the full update sequence, solve and post-process.
    pub fn run(&self) -> Result<Report, Box<dyn Error>> {
        let mesh = Arc::new(self.build_mesh()?);
        log::info!("{}", mesh.statistics().format());
        let ncells = mesh.num_cells(Parallel::Owned);

        let mut bcs = BoundaryConditions::for_mesh(&*mesh);
        for spec in &self.boundary {
            bcs.on_sides(&mesh, &spec.side, spec.marker, spec.value)?;
        }

        let mut op = MatrixMfd::new(mesh.clone(), self.operator.clone())?;
        let k = self.tensors(mesh.space_dimension(), ncells)?;
        op.create_mass_matrices(k.as_deref())?;

        let krel = self
            .relative_conductivity
            .map(|v| RelativeConductivity::uniform_cell(ncells, v));
        op.create_stiffness_matrices(krel.as_ref())?;
        if let Some(term) = self.accumulation {
            op.add_accumulation_terms(&vec![term; ncells])?;
        }
        if let Some(q) = self.source {
            let sources: Vec<f64> = (0..ncells).map(|c| q * mesh.cell_volume(c)).collect();
            op.add_cell_sources(&sources)?;
        }
        op.apply_boundary_conditions(&bcs)?;
        op.assemble_global_matrices()?;
        op.compute_schur_complement()?;
        op.update_preconditioner()?;

        let mut solution = CompositeVector::for_mesh(&*mesh);
        let result = op.solve(&mut solution, &self.solver)?;
        if !result.converged {
            log::warn!("solver stopped at residual {:e}", result.residual_norm);
        }

        let flux = op.derive_flux(&solution)?;
        let velocity = op.derive_cell_velocity(&flux)?;
        let speeds: Vec<f64> = velocity.row_iter().map(|row| row.norm()).collect();

        let boundary_flux = mesh
            .face_set_names()
            .filter_map(|side| {
                let faces = mesh.face_set(side)?;
                let dir = if side.ends_with("min") { -1 } else { 1 };
                Some(SideFlux {
                    side: side.to_string(),
                    outflow: boundary_outflow(&flux, faces, &vec![dir; faces.len()]),
                })
            })
            .collect();

        let diagnostics = op.diagnostics();
        Ok(Report {
            timestamp: chrono::Utc::now().to_rfc3339(),
            method: op.method().to_string(),
            preconditioner: op.preconditioner_name().map(str::to_string),
            cells: ncells,
            faces: mesh.num_faces(Parallel::Owned),
            elemental_ok: diagnostics.ok,
            elemental_passed: diagnostics.passed,
            iterations: result.iterations,
            residual_norm: result.residual_norm,
            converged: result.converged,
            pressure: compute_statistics(solution.cell.as_slice()),
            speed: compute_statistics(&speeds),
            boundary_flux,
        })
    }
}
