//! Boundary conditions on faces and their elimination from the local blocks.
//!
//! A face carries at most one condition:
//! - Dirichlet: prescribed face pressure, eliminated symmetrically from the
//!   local system,
//! - Flux: prescribed outward Darcy flux density, moved into the local face
//!   load.
//!
//! Faces without a condition are natural (no-flow) boundaries.

use crate::elemental::ElementalBlocks;
use crate::error::{MfdError, Result};
use crate::mesh::{MeshTopology, Parallel, PolyMesh};
use serde::{Deserialize, Serialize};

/// Condition kind on a face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryMarker {
    #[default]
    None,
    Dirichlet,
    Flux,
}

/// Per used face marker and value
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryConditions {
    markers: Vec<BoundaryMarker>,
    values: Vec<f64>,
}

impl BoundaryConditions {
    /// No conditions on `num_used_faces` faces
    pub fn new(num_used_faces: usize) -> Self {
        Self {
            markers: vec![BoundaryMarker::None; num_used_faces],
            values: vec![0.0; num_used_faces],
        }
    }

    /// Sized to the used faces of `mesh`
    pub fn for_mesh(mesh: &dyn MeshTopology) -> Self {
        Self::new(mesh.num_faces(Parallel::Used))
    }

    /// From explicit marker and value arrays
    pub fn from_parts(markers: Vec<BoundaryMarker>, values: Vec<f64>) -> Result<Self> {
        if markers.len() != values.len() {
            return Err(MfdError::Configuration(format!(
                "{} boundary markers but {} boundary values",
                markers.len(),
                values.len()
            )));
        }
        Ok(Self { markers, values })
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn marker(&self, face: usize) -> BoundaryMarker {
        self.markers[face]
    }

    pub fn value(&self, face: usize) -> f64 {
        self.values[face]
    }

    pub fn markers(&self) -> &[BoundaryMarker] {
        &self.markers
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn is_dirichlet(&self, face: usize) -> bool {
        self.markers[face] == BoundaryMarker::Dirichlet
    }

    fn check_face(&self, face: usize) -> Result<()> {
        if face >= self.markers.len() {
            return Err(MfdError::Configuration(format!(
                "Boundary condition on face {} but only {} faces exist",
                face,
                self.markers.len()
            )));
        }
        Ok(())
    }

    /// Set a condition on one face, replacing any previous one
    pub fn set(&mut self, face: usize, marker: BoundaryMarker, value: f64) -> Result<()> {
        self.check_face(face)?;
        self.markers[face] = marker;
        self.values[face] = value;
        Ok(())
    }

    pub fn set_dirichlet(&mut self, face: usize, value: f64) -> Result<()> {
        self.set(face, BoundaryMarker::Dirichlet, value)
    }

    pub fn set_flux(&mut self, face: usize, value: f64) -> Result<()> {
        self.set(face, BoundaryMarker::Flux, value)
    }

    /// Apply the same condition to a list of faces
    pub fn set_on_faces(&mut self, faces: &[usize], marker: BoundaryMarker, value: f64) -> Result<()> {
        for &f in faces {
            self.set(f, marker, value)?;
        }
        Ok(())
    }

    /// Apply the same condition to every face in a named set (e.g. `"xmin"`)
    pub fn on_sides(
        &mut self,
        mesh: &PolyMesh,
        side: &str,
        marker: BoundaryMarker,
        value: f64,
    ) -> Result<()> {
        let faces = mesh.face_set(side).ok_or_else(|| {
            MfdError::Configuration(format!("Unknown boundary side '{}'", side))
        })?;
        self.set_on_faces(faces, marker, value)
    }

    /// Count of faces per marker kind: `(dirichlet, flux)`
    pub fn counts(&self) -> (usize, usize) {
        self.markers.iter().fold((0, 0), |(d, q), m| match m {
            BoundaryMarker::Dirichlet => (d + 1, q),
            BoundaryMarker::Flux => (d, q + 1),
            BoundaryMarker::None => (d, q),
        })
    }

    /// Eliminate the conditions from the local blocks of every owned cell.
    ///
    /// Must run after relative-conductivity scaling and before assembly.
    /// `krel_face` covers used faces.
    pub fn eliminate(
        &self,
        mesh: &dyn MeshTopology,
        blocks: &mut [ElementalBlocks],
        krel_face: &[f64],
    ) -> Result<()> {
        let nused = mesh.num_faces(Parallel::Used);
        if self.markers.len() != nused {
            return Err(MfdError::Configuration(format!(
                "Boundary conditions cover {} faces, mesh has {} used faces",
                self.markers.len(),
                nused
            )));
        }

        for (c, block) in blocks.iter_mut().enumerate() {
            let (faces, _) = mesh.cell_faces_and_dirs(c);
            let nfaces = faces.len();

            for n in 0..nfaces {
                let f = faces[n];
                let value = self.values[f];
                match self.markers[f] {
                    BoundaryMarker::Dirichlet => {
                        for m in 0..nfaces {
                            block.ff[m] -= block.aff[(m, n)] * value;
                            block.aff[(n, m)] = 0.0;
                            block.aff[(m, n)] = 0.0;
                        }
                        block.fc -= block.acf[n] * value;
                        block.acf[n] = 0.0;
                        block.afc[n] = 0.0;

                        block.aff[(n, n)] = 1.0;
                        block.ff[n] = value;
                    }
                    BoundaryMarker::Flux => {
                        if value.abs() > 0.0 {
                            block.ff[n] -= value * mesh.face_area(f) / krel_face[f];
                        }
                    }
                    BoundaryMarker::None => {}
                }
            }
        }

        let (ndir, nflux) = self.counts();
        log::debug!(
            "Eliminated boundary conditions: {} Dirichlet faces, {} flux faces",
            ndir,
            nflux
        );
        Ok(())
    }
}
