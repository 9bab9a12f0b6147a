//! The mesh together with the per-entity registries models share.

use crate::mesh::Mesh;
use crate::registry::ExtensionRegistry;

/// Shared simulation domain.
///
/// Fields are public so a model can read the mesh while mutating its own
/// records in `dofs` or `elements`.
#[derive(Debug)]
pub struct Domain {
    pub mesh: Mesh,
    /// One record per model per DOF.
    pub dofs: ExtensionRegistry,
    /// Per-element caches published by upstream models.
    pub elements: ExtensionRegistry,
}

impl Domain {
    pub fn new(mesh: Mesh) -> Self {
        let dofs = ExtensionRegistry::new(mesh.dof_count());
        let elements = ExtensionRegistry::new(mesh.element_count());
        Self {
            mesh,
            dofs,
            elements,
        }
    }

    pub fn dof_count(&self) -> usize {
        self.mesh.dof_count()
    }

    pub fn element_count(&self) -> usize {
        self.mesh.element_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MeshBuilder;

    #[test]
    fn registries_match_mesh_sizes() {
        let mesh = MeshBuilder::rectangle(2, 1, 1.0, 1.0, 0.0).build().unwrap();
        let domain = Domain::new(mesh);
        assert_eq!(domain.dofs.len(), 6);
        assert_eq!(domain.elements.len(), 4);
    }
}
