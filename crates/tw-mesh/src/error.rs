//! Mesh-specific error types.

use tw_core::{DofId, ElemId};

pub type MeshResult<T> = Result<T, MeshError>;

/// Mesh construction, validation and registry errors.
#[derive(Debug, Clone, PartialEq)]
pub enum MeshError {
    /// An element refers to a DOF that doesn't exist.
    InvalidDofRef { elem: ElemId, dof: DofId },

    /// An element lists the same DOF twice.
    DuplicateDofs { elem: ElemId },

    /// An element has (near) zero area.
    DegenerateElement { elem: ElemId, area: f64 },

    /// A DOF is not part of any element.
    OrphanDof { dof: DofId },

    /// A coordinate is NaN or infinite.
    NonFiniteCoordinate { dof: DofId },

    /// An entity index is outside the registry.
    EntityOutOfRange { index: usize, len: usize },

    /// A record of this extension type is already attached to the entity.
    DuplicateExtension { entity: usize, type_name: &'static str },

    /// ID not found.
    IdNotFound { what: &'static str },
}

impl std::fmt::Display for MeshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MeshError::InvalidDofRef { elem, dof } => {
                write!(f, "Element {} refers to non-existent DOF {}", elem, dof)
            }
            MeshError::DuplicateDofs { elem } => {
                write!(f, "Element {} lists the same DOF more than once", elem)
            }
            MeshError::DegenerateElement { elem, area } => {
                write!(f, "Element {} is degenerate (area {:e})", elem, area)
            }
            MeshError::OrphanDof { dof } => {
                write!(f, "DOF {} is not part of any element", dof)
            }
            MeshError::NonFiniteCoordinate { dof } => {
                write!(f, "DOF {} has a non-finite coordinate", dof)
            }
            MeshError::EntityOutOfRange { index, len } => {
                write!(f, "Entity {} out of range (len={})", index, len)
            }
            MeshError::DuplicateExtension { entity, type_name } => {
                write!(
                    f,
                    "Entity {} already carries an extension record of type {}",
                    entity, type_name
                )
            }
            MeshError::IdNotFound { what } => {
                write!(f, "{} not found in mesh", what)
            }
        }
    }
}

impl std::error::Error for MeshError {}
