//! Incremental mesh builder.

use std::collections::HashMap;

use nalgebra::Vector2;
use tw_core::{DofId, ElemId};

use crate::error::MeshResult;
use crate::mesh::{Dof, Element, Mesh, Shape};
use crate::validate;

/// Builder for constructing a mesh incrementally.
///
/// Use `add_dof` and `add_element` to build up the mesh,
/// then call `build()` to validate and freeze it into a `Mesh`.
#[derive(Debug, Default)]
pub struct MeshBuilder {
    dofs: Vec<Dof>,
    triangles: Vec<[DofId; 3]>,
}

impl MeshBuilder {
    /// Create a new empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a DOF at `(x, y)` with bed elevation `z` and return its ID.
    pub fn add_dof(&mut self, x: f64, y: f64, z: f64) -> DofId {
        let id = DofId::from_usize(self.dofs.len());
        self.dofs.push(Dof { id, x, y, z });
        id
    }

    /// Add a triangle and return its ID.
    pub fn add_element(&mut self, a: DofId, b: DofId, c: DofId) -> ElemId {
        let id = ElemId::from_usize(self.triangles.len());
        self.triangles.push([a, b, c]);
        id
    }

    /// Regular channel of `nx * ny` cells of size `dx * dy`, each cell split
    /// along its rising diagonal. DOF `(i, j)` has index `j * (nx + 1) + i`.
    pub fn rectangle(nx: usize, ny: usize, dx: f64, dy: f64, z: f64) -> Self {
        let mut builder = Self::new();
        for j in 0..=ny {
            for i in 0..=nx {
                builder.add_dof(i as f64 * dx, j as f64 * dy, z);
            }
        }
        let at = |i: usize, j: usize| DofId::from_usize(j * (nx + 1) + i);
        for j in 0..ny {
            for i in 0..nx {
                builder.add_element(at(i, j), at(i + 1, j), at(i + 1, j + 1));
                builder.add_element(at(i, j), at(i + 1, j + 1), at(i, j + 1));
            }
        }
        builder
    }

    /// Build and validate the mesh.
    ///
    /// This performs validation, computes shape data and constructs the
    /// compact DOF-to-element adjacency.
    pub fn build(self) -> MeshResult<Mesh> {
        validate::validate_dofs(&self.dofs)?;
        validate::validate_triangles(self.dofs.len(), &self.triangles)?;

        let elements: Vec<Element> = self
            .triangles
            .iter()
            .enumerate()
            .map(|(i, &dofs)| {
                let corners = dofs.map(|d| self.dofs[d.idx()].position());
                Element {
                    id: ElemId::from_usize(i),
                    dofs,
                    shape: Shape::from_corners(corners),
                }
            })
            .collect();

        validate::validate_shapes(&elements, characteristic_scale(&self.dofs))?;

        let (dof_elem_offsets, dof_elems) = Self::build_adjacency(self.dofs.len(), &elements);
        validate::validate_adjacency(&self.dofs, &dof_elem_offsets)?;

        let (edge_count, on_boundary) = Self::classify_edges(self.dofs.len(), &elements);
        let boundary = on_boundary
            .iter()
            .enumerate()
            .filter(|&(_, &b)| b)
            .map(|(i, _)| DofId::from_usize(i))
            .collect();

        Ok(Mesh {
            dofs: self.dofs,
            elements,
            dof_elem_offsets,
            dof_elems,
            boundary,
            on_boundary,
            edge_count,
        })
    }

    /// Build compact adjacency lists: for each DOF, collect its incident elements.
    fn build_adjacency(dof_count: usize, elements: &[Element]) -> (Vec<usize>, Vec<ElemId>) {
        let mut counts = vec![0usize; dof_count];
        for e in elements {
            for d in e.nodes() {
                counts[d] += 1;
            }
        }

        let mut offsets = Vec::with_capacity(dof_count + 1);
        offsets.push(0);
        for c in &counts {
            offsets.push(offsets[offsets.len() - 1] + c);
        }

        // Elements are visited in ID order, so each list comes out sorted.
        let mut cursor = offsets.clone();
        let mut flat = vec![ElemId::from_index(0); offsets[dof_count]];
        for e in elements {
            for d in e.nodes() {
                flat[cursor[d]] = e.id;
                cursor[d] += 1;
            }
        }

        (offsets, flat)
    }

    /// Count unique edges and flag DOFs on edges owned by a single element.
    fn classify_edges(dof_count: usize, elements: &[Element]) -> (usize, Vec<bool>) {
        let mut edges: HashMap<(usize, usize), u32> = HashMap::new();
        for e in elements {
            let n = e.nodes();
            for k in 0..3 {
                let (a, b) = (n[k], n[(k + 1) % 3]);
                *edges.entry((a.min(b), a.max(b))).or_default() += 1;
            }
        }

        let mut on_boundary = vec![false; dof_count];
        for (&(a, b), &count) in &edges {
            if count == 1 {
                on_boundary[a] = true;
                on_boundary[b] = true;
            }
        }
        (edges.len(), on_boundary)
    }
}

fn characteristic_scale(dofs: &[Dof]) -> f64 {
    let (mut min, mut max) = (Vector2::repeat(f64::MAX), Vector2::repeat(f64::MIN));
    for d in dofs {
        min = min.inf(&d.position());
        max = max.sup(&d.position());
    }
    if dofs.is_empty() {
        return 1.0;
    }
    (max - min).norm().max(f64::MIN_POSITIVE)
}
