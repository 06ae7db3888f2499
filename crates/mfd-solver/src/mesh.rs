//! Polyhedral mesh data structures for the MFD discretisation.
//!
//! The operator only ever talks to the mesh through [`MeshTopology`]; the
//! concrete [`PolyMesh`] stores explicit cell/face geometry and is what the
//! box builder and the tests produce.

use crate::comm::{Communicator, GhostLayout, SerialCommunicator};
use crate::error::{MfdError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Point or vector in physical space (unused trailing components are zero in 2-D)
pub type Point = [f64; 3];

/// Entity range selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parallel {
    /// Entities owned by this process
    Owned,
    /// Owned entities followed by ghosts
    Used,
}

/// Geometry and connectivity queries required by the operator.
///
/// Must stay immutable for the duration of an assembly cycle.
pub trait MeshTopology: Send + Sync {
    /// Space dimension (2 or 3)
    fn space_dimension(&self) -> usize;

    fn num_cells(&self, kind: Parallel) -> usize;

    fn num_faces(&self, kind: Parallel) -> usize;

    /// Local face ids of a cell and their orientation signs (`+1` when the
    /// face normal points out of the cell).
    fn cell_faces_and_dirs(&self, cell: usize) -> (&[usize], &[i32]);

    fn cell_centroid(&self, cell: usize) -> Point;

    fn cell_volume(&self, cell: usize) -> f64;

    fn face_area(&self, face: usize) -> f64;

    /// Area-weighted normal in the face's own orientation
    fn face_normal(&self, face: usize) -> Point;

    fn face_centroid(&self, face: usize) -> Point;

    fn face_layout(&self) -> &GhostLayout;

    fn cell_layout(&self) -> &GhostLayout;

    fn comm(&self) -> &dyn Communicator;
}

/// A face of the mesh
#[derive(Debug, Clone, PartialEq)]
pub struct Face {
    /// Face centroid
    pub centroid: Point,
    /// Area-weighted normal
    pub normal: Point,
    /// Face area (length in 2-D)
    pub area: f64,
}

impl Face {
    /// Create a face whose area is the length of `normal`
    pub fn new(centroid: Point, normal: Point) -> Self {
        let area = norm(&normal);
        Self {
            centroid,
            normal,
            area,
        }
    }
}

/// A cell of the mesh
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// Local face ids
    pub faces: Vec<usize>,
    /// Orientation sign of each face relative to this cell
    pub dirs: Vec<i32>,
    /// Cell centroid
    pub centroid: Point,
    /// Cell volume (area in 2-D)
    pub volume: f64,
}

impl Cell {
    /// Create a new cell
    pub fn new(faces: Vec<usize>, dirs: Vec<i32>, centroid: Point, volume: f64) -> Self {
        Self {
            faces,
            dirs,
            centroid,
            volume,
        }
    }
}

/// Explicit polyhedral mesh
#[derive(Clone)]
pub struct PolyMesh {
    dimension: usize,
    cells: Vec<Cell>,
    faces: Vec<Face>,
    cell_layout: GhostLayout,
    face_layout: GhostLayout,
    comm: Arc<dyn Communicator>,
    /// Named face sets (e.g. box sides)
    face_sets: BTreeMap<String, Vec<usize>>,
}

impl std::fmt::Debug for PolyMesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolyMesh")
            .field("dimension", &self.dimension)
            .field("cells", &self.cells.len())
            .field("faces", &self.faces.len())
            .field("face_sets", &self.face_sets.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PolyMesh {
    /// Create a mesh where every entity is owned and global ids equal local ids
    pub fn serial(dimension: usize, cells: Vec<Cell>, faces: Vec<Face>) -> Result<Self> {
        let cell_layout = GhostLayout::serial(cells.len());
        let face_layout = GhostLayout::serial(faces.len());
        Self::new(dimension, cells, faces, cell_layout, face_layout)
    }

    /// Create a mesh with explicit ownership layouts
    pub fn new(
        dimension: usize,
        cells: Vec<Cell>,
        faces: Vec<Face>,
        cell_layout: GhostLayout,
        face_layout: GhostLayout,
    ) -> Result<Self> {
        let mesh = Self {
            dimension,
            cells,
            faces,
            cell_layout,
            face_layout,
            comm: Arc::new(SerialCommunicator),
            face_sets: BTreeMap::new(),
        };
        mesh.validate()?;
        Ok(mesh)
    }

    /// Replace the communicator
    pub fn with_communicator(mut self, comm: Arc<dyn Communicator>) -> Self {
        self.comm = comm;
        self
    }

    /// Register a named face set
    pub fn add_face_set(&mut self, name: impl Into<String>, faces: Vec<usize>) -> Result<()> {
        let name = name.into();
        if let Some(&bad) = faces.iter().find(|&&f| f >= self.faces.len()) {
            return Err(MfdError::Invariant(format!(
                "Face set '{}' references non-existent face {}",
                name, bad
            )));
        }
        self.face_sets.insert(name, faces);
        Ok(())
    }

    /// Look up a named face set
    pub fn face_set(&self, name: &str) -> Option<&[usize]> {
        self.face_sets.get(name).map(|v| v.as_slice())
    }

    /// Names of all registered face sets
    pub fn face_set_names(&self) -> impl Iterator<Item = &str> {
        self.face_sets.keys().map(|k| k.as_str())
    }

    pub fn cell(&self, c: usize) -> &Cell {
        &self.cells[c]
    }

    pub fn face(&self, f: usize) -> &Face {
        &self.faces[f]
    }

    /// Used cells adjacent to each used face
    pub fn face_cells(&self) -> Vec<Vec<usize>> {
        let mut adjacency = vec![Vec::new(); self.faces.len()];
        for (c, cell) in self.cells.iter().enumerate() {
            for &f in &cell.faces {
                adjacency[f].push(c);
            }
        }
        adjacency
    }

    /// Faces touched by exactly one cell
    pub fn boundary_faces(&self) -> Vec<usize> {
        self.face_cells()
            .iter()
            .enumerate()
            .filter(|(_, cells)| cells.len() == 1)
            .map(|(f, _)| f)
            .collect()
    }

    /// Validate the mesh
    pub fn validate(&self) -> Result<()> {
        if self.dimension != 2 && self.dimension != 3 {
            return Err(MfdError::Invariant(format!(
                "Unsupported space dimension {}",
                self.dimension
            )));
        }
        if self.cell_layout.num_used() != self.cells.len() {
            return Err(MfdError::Invariant(format!(
                "Cell layout describes {} cells, mesh has {}",
                self.cell_layout.num_used(),
                self.cells.len()
            )));
        }
        if self.face_layout.num_used() != self.faces.len() {
            return Err(MfdError::Invariant(format!(
                "Face layout describes {} faces, mesh has {}",
                self.face_layout.num_used(),
                self.faces.len()
            )));
        }

        for (c, cell) in self.cells.iter().enumerate() {
            if cell.faces.len() != cell.dirs.len() {
                return Err(MfdError::Invariant(format!(
                    "Cell {} has {} faces but {} orientation signs",
                    c,
                    cell.faces.len(),
                    cell.dirs.len()
                )));
            }
            if let Some(&f) = cell.faces.iter().find(|&&f| f >= self.faces.len()) {
                return Err(MfdError::Invariant(format!(
                    "Cell {} references non-existent face {}",
                    c, f
                )));
            }
            if let Some(&d) = cell.dirs.iter().find(|&&d| d != 1 && d != -1) {
                return Err(MfdError::Invariant(format!(
                    "Cell {} has orientation sign {}, expected +1 or -1",
                    c, d
                )));
            }
            if cell.volume <= 0.0 {
                return Err(MfdError::Invariant(format!(
                    "Cell {} has non-positive volume {}",
                    c, cell.volume
                )));
            }
        }
        Ok(())
    }

    /// Get mesh statistics
    pub fn statistics(&self) -> MeshStatistics {
        MeshStatistics {
            dimension: self.dimension,
            num_owned_cells: self.cell_layout.num_owned(),
            num_owned_faces: self.face_layout.num_owned(),
            num_ghost_faces: self.face_layout.num_used() - self.face_layout.num_owned(),
            num_boundary_faces: self.boundary_faces().len(),
            total_volume: self.cells[..self.cell_layout.num_owned()]
                .iter()
                .map(|c| c.volume)
                .sum(),
        }
    }
}

impl MeshTopology for PolyMesh {
    fn space_dimension(&self) -> usize {
        self.dimension
    }

    fn num_cells(&self, kind: Parallel) -> usize {
        match kind {
            Parallel::Owned => self.cell_layout.num_owned(),
            Parallel::Used => self.cell_layout.num_used(),
        }
    }

    fn num_faces(&self, kind: Parallel) -> usize {
        match kind {
            Parallel::Owned => self.face_layout.num_owned(),
            Parallel::Used => self.face_layout.num_used(),
        }
    }

    fn cell_faces_and_dirs(&self, cell: usize) -> (&[usize], &[i32]) {
        let c = &self.cells[cell];
        (&c.faces, &c.dirs)
    }

    fn cell_centroid(&self, cell: usize) -> Point {
        self.cells[cell].centroid
    }

    fn cell_volume(&self, cell: usize) -> f64 {
        self.cells[cell].volume
    }

    fn face_area(&self, face: usize) -> f64 {
        self.faces[face].area
    }

    fn face_normal(&self, face: usize) -> Point {
        self.faces[face].normal
    }

    fn face_centroid(&self, face: usize) -> Point {
        self.faces[face].centroid
    }

    fn face_layout(&self) -> &GhostLayout {
        &self.face_layout
    }

    fn cell_layout(&self) -> &GhostLayout {
        &self.cell_layout
    }

    fn comm(&self) -> &dyn Communicator {
        self.comm.as_ref()
    }
}

/// Mesh statistics for reporting
#[derive(Debug, Clone)]
pub struct MeshStatistics {
    pub dimension: usize,
    pub num_owned_cells: usize,
    pub num_owned_faces: usize,
    pub num_ghost_faces: usize,
    pub num_boundary_faces: usize,
    pub total_volume: f64,
}

impl MeshStatistics {
    /// Format as a human-readable string
    pub fn format(&self) -> String {
        [
            format!("Dimension: {}", self.dimension),
            format!("Cells: {}", self.num_owned_cells),
            format!(
                "Faces: {} owned, {} ghost, {} on boundary",
                self.num_owned_faces, self.num_ghost_faces, self.num_boundary_faces
            ),
            format!("Volume: {:.6e}", self.total_volume),
        ]
        .join("\n")
    }
}

pub(crate) fn norm(v: &Point) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_segment_mesh() -> PolyMesh {
        // 1-D strip of two unit squares in 2-D: faces 0..=2 along x, 3..=6 along y
        let faces = vec![
            Face::new([0.0, 0.5, 0.0], [1.0, 0.0, 0.0]),
            Face::new([1.0, 0.5, 0.0], [1.0, 0.0, 0.0]),
            Face::new([2.0, 0.5, 0.0], [1.0, 0.0, 0.0]),
            Face::new([0.5, 0.0, 0.0], [0.0, 1.0, 0.0]),
            Face::new([1.5, 0.0, 0.0], [0.0, 1.0, 0.0]),
            Face::new([0.5, 1.0, 0.0], [0.0, 1.0, 0.0]),
            Face::new([1.5, 1.0, 0.0], [0.0, 1.0, 0.0]),
        ];
        let cells = vec![
            Cell::new(vec![0, 1, 3, 5], vec![-1, 1, -1, 1], [0.5, 0.5, 0.0], 1.0),
            Cell::new(vec![1, 2, 4, 6], vec![-1, 1, -1, 1], [1.5, 0.5, 0.0], 1.0),
        ];
        PolyMesh::serial(2, cells, faces).unwrap()
    }

    #[test]
    fn face_area_from_normal() {
        let face = Face::new([0.0; 3], [0.0, 3.0, 4.0]);
        assert_eq!(face.area, 5.0);
    }

    #[test]
    fn boundary_faces_exclude_shared_face() {
        let mesh = two_segment_mesh();
        let boundary = mesh.boundary_faces();
        assert_eq!(boundary.len(), 6);
        assert!(!boundary.contains(&1));
    }

    #[test]
    fn statistics_counts() {
        let stats = two_segment_mesh().statistics();
        assert_eq!(stats.num_owned_cells, 2);
        assert_eq!(stats.num_owned_faces, 7);
        assert_eq!(stats.num_ghost_faces, 0);
        assert_eq!(stats.total_volume, 2.0);
        assert!(stats.format().contains("Cells: 2"));
    }

    #[test]
    fn rejects_bad_orientation() {
        let faces = vec![Face::new([0.0; 3], [1.0, 0.0, 0.0])];
        let cells = vec![Cell::new(vec![0], vec![2], [0.0; 3], 1.0)];
        let err = PolyMesh::serial(2, cells, faces).unwrap_err();
        assert!(err.to_string().contains("orientation sign 2"));
    }

    #[test]
    fn rejects_dangling_face_reference() {
        let faces = vec![Face::new([0.0; 3], [1.0, 0.0, 0.0])];
        let cells = vec![Cell::new(vec![0, 4], vec![1, -1], [0.0; 3], 1.0)];
        let err = PolyMesh::serial(2, cells, faces).unwrap_err();
        assert!(err.to_string().contains("non-existent face 4"));
    }

    #[test]
    fn face_sets_are_checked() {
        let mut mesh = two_segment_mesh();
        mesh.add_face_set("left", vec![0]).unwrap();
        assert_eq!(mesh.face_set("left"), Some(&[0usize][..]));
        assert!(mesh.add_face_set("bad", vec![99]).is_err());
    }
}
