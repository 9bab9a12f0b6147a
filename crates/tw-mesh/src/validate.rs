//! Mesh validation.

use tw_core::{DofId, ElemId};

use crate::error::{MeshError, MeshResult};
use crate::mesh::{Dof, Element};

/// Relative area below which a triangle counts as degenerate.
const DEGENERATE_REL_AREA: f64 = 1e-12;

pub(crate) fn validate_dofs(dofs: &[Dof]) -> MeshResult<()> {
    for d in dofs {
        if !(d.x.is_finite() && d.y.is_finite() && d.z.is_finite()) {
            return Err(MeshError::NonFiniteCoordinate { dof: d.id });
        }
    }
    Ok(())
}

pub(crate) fn validate_triangles(dof_count: usize, triangles: &[[DofId; 3]]) -> MeshResult<()> {
    for (i, tri) in triangles.iter().enumerate() {
        let elem = ElemId::from_usize(i);
        for &dof in tri {
            if dof.idx() >= dof_count {
                return Err(MeshError::InvalidDofRef { elem, dof });
            }
        }
        if tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2] {
            return Err(MeshError::DuplicateDofs { elem });
        }
    }
    Ok(())
}

pub(crate) fn validate_shapes(elements: &[Element], scale: f64) -> MeshResult<()> {
    let min_area = DEGENERATE_REL_AREA * scale * scale;
    for e in elements {
        if !(e.shape.area > min_area) {
            return Err(MeshError::DegenerateElement {
                elem: e.id,
                area: e.shape.area,
            });
        }
    }
    Ok(())
}

pub(crate) fn validate_adjacency(dofs: &[Dof], offsets: &[usize]) -> MeshResult<()> {
    for d in dofs {
        let i = d.id.idx();
        if offsets[i + 1] == offsets[i] {
            return Err(MeshError::OrphanDof { dof: d.id });
        }
    }
    Ok(())
}
