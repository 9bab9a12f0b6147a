//! Core mesh data structures.

use nalgebra::Vector2;
use tw_core::{DofId, ElemId};

use crate::error::{MeshError, MeshResult};

/// A mesh node carrying one degree of freedom per transport model.
#[derive(Debug, Clone, PartialEq)]
pub struct Dof {
    pub id: DofId,
    pub x: f64,
    pub y: f64,
    /// Bed elevation (positive up).
    pub z: f64,
}

impl Dof {
    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }
}

/// Precomputed linear shape-function data for one triangle.
///
/// `grad[i]` is the (constant) gradient of the shape function of local node `i`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shape {
    pub area: f64,
    pub grad: [Vector2<f64>; 3],
}

impl Shape {
    /// Compute shape data from three corner positions.
    ///
    /// Works for either orientation; `area` is always non-negative.
    pub fn from_corners(p: [Vector2<f64>; 3]) -> Self {
        let two_a = (p[1].x - p[0].x) * (p[2].y - p[0].y) - (p[2].x - p[0].x) * (p[1].y - p[0].y);
        let mut grad = [Vector2::zeros(); 3];
        if two_a != 0.0 {
            for (i, g) in grad.iter_mut().enumerate() {
                let j = (i + 1) % 3;
                let k = (i + 2) % 3;
                *g = Vector2::new((p[j].y - p[k].y) / two_a, (p[k].x - p[j].x) / two_a);
            }
        }
        Self {
            area: 0.5 * two_a.abs(),
            grad,
        }
    }

    /// Gradient of a linear field given its three nodal values.
    #[inline]
    pub fn gradient(&self, values: [f64; 3]) -> Vector2<f64> {
        self.grad[0] * values[0] + self.grad[1] * values[1] + self.grad[2] * values[2]
    }

    /// Length scale of the triangle, used when no flow direction exists.
    pub fn size(&self) -> f64 {
        (2.0 * self.area).sqrt()
    }
}

/// A mesh triangle.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub id: ElemId,
    pub dofs: [DofId; 3],
    pub shape: Shape,
}

impl Element {
    /// DOF indices as `usize`, ready for slice access.
    #[inline]
    pub fn nodes(&self) -> [usize; 3] {
        [self.dofs[0].idx(), self.dofs[1].idx(), self.dofs[2].idx()]
    }
}

/// The mesh: a validated collection of DOFs and triangles.
///
/// The mesh stores:
/// - All DOFs and elements in vectors (indexed by their IDs).
/// - Compact adjacency: for each DOF, which elements are incident.
/// - DOFs on the outer boundary (edges with a single incident element).
#[derive(Debug, Clone)]
pub struct Mesh {
    pub(crate) dofs: Vec<Dof>,
    pub(crate) elements: Vec<Element>,

    /// DOF i's elements are in dof_elems[dof_elem_offsets[i]..dof_elem_offsets[i+1]].
    pub(crate) dof_elem_offsets: Vec<usize>,
    pub(crate) dof_elems: Vec<ElemId>,

    pub(crate) boundary: Vec<DofId>,
    pub(crate) on_boundary: Vec<bool>,
    pub(crate) edge_count: usize,
}

impl Mesh {
    pub fn dof_count(&self) -> usize {
        self.dofs.len()
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Number of unique triangle edges.
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn dofs(&self) -> &[Dof] {
        &self.dofs
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn dof(&self, id: DofId) -> Option<&Dof> {
        self.dofs.get(id.idx())
    }

    pub fn element(&self, id: ElemId) -> Option<&Element> {
        self.elements.get(id.idx())
    }

    /// Elements incident to a DOF.
    pub fn incident_elements(&self, dof: DofId) -> &[ElemId] {
        let idx = dof.idx();
        if idx >= self.dofs.len() {
            return &[];
        }
        &self.dof_elems[self.dof_elem_offsets[idx]..self.dof_elem_offsets[idx + 1]]
    }

    /// Number of elements incident to a DOF.
    pub fn incident_count(&self, dof: DofId) -> usize {
        self.incident_elements(dof).len()
    }

    /// DOFs sharing an element with `dof`, sorted and without `dof` itself.
    pub fn neighbours(&self, dof: DofId) -> Vec<DofId> {
        let mut out: Vec<DofId> = self
            .incident_elements(dof)
            .iter()
            .filter_map(|&e| self.element(e))
            .flat_map(|e| e.dofs)
            .filter(|&d| d != dof)
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// DOFs on the outer boundary, in ascending order.
    pub fn boundary_dofs(&self) -> &[DofId] {
        &self.boundary
    }

    pub fn is_boundary(&self, dof: DofId) -> bool {
        self.on_boundary.get(dof.idx()).copied().unwrap_or(false)
    }

    /// Update the bed elevation of one DOF (morphodynamic models).
    pub fn set_elevation(&mut self, dof: DofId, z: f64) -> MeshResult<()> {
        if !z.is_finite() {
            return Err(MeshError::NonFiniteCoordinate { dof });
        }
        let node = self
            .dofs
            .get_mut(dof.idx())
            .ok_or(MeshError::IdNotFound { what: "DofId" })?;
        node.z = z;
        Ok(())
    }
}
