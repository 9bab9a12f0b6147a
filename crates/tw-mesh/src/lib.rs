//! tw-mesh: mesh layer for tidewater.
//!
//! Provides:
//! - Triangular mesh data structures (Dof, Element, Shape, Mesh)
//! - Incremental mesh builder with validation
//! - Typed per-entity extension registry for model-specific state
//! - `Domain`: the mesh together with its DOF and element registries
//!
//! # Example
//!
//! ```
//! use tw_mesh::MeshBuilder;
//!
//! let mut builder = MeshBuilder::new();
//! let a = builder.add_dof(0.0, 0.0, -5.0);
//! let b = builder.add_dof(1.0, 0.0, -5.0);
//! let c = builder.add_dof(0.0, 1.0, -5.0);
//! builder.add_element(a, b, c);
//! let mesh = builder.build().unwrap();
//!
//! assert_eq!(mesh.dof_count(), 3);
//! assert_eq!(mesh.element_count(), 1);
//! ```

pub mod builder;
pub mod domain;
pub mod error;
pub mod mesh;
pub mod registry;
pub(crate) mod validate;

// Re-exports for ergonomics
pub use builder::MeshBuilder;
pub use domain::Domain;
pub use error::{MeshError, MeshResult};
pub use mesh::{Dof, Element, Mesh, Shape};
pub use registry::{ExtKind, Extension, ExtensionRegistry};
