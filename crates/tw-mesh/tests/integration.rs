//! Integration tests for tw-mesh.

use tw_core::DofId;
use tw_mesh::{Domain, MeshBuilder, MeshError};

#[test]
fn build_two_triangle_square() {
    // 3 --- 2
    // | \ e1|
    // |e0 \ |
    // 0 --- 1
    let mut builder = MeshBuilder::new();
    let n0 = builder.add_dof(0.0, 0.0, -1.0);
    let n1 = builder.add_dof(1.0, 0.0, -1.0);
    let n2 = builder.add_dof(1.0, 1.0, -1.0);
    let n3 = builder.add_dof(0.0, 1.0, -1.0);
    let e0 = builder.add_element(n0, n1, n3);
    let e1 = builder.add_element(n1, n2, n3);

    let mesh = builder.build().unwrap();

    assert_eq!(mesh.dof_count(), 4);
    assert_eq!(mesh.element_count(), 2);
    assert_eq!(mesh.edge_count(), 5);
    assert_eq!(mesh.incident_elements(n1), &[e0, e1]);
    assert_eq!(mesh.incident_elements(n0), &[e0]);
    assert_eq!(mesh.neighbours(n0), vec![n1, n3]);
    assert_eq!(mesh.boundary_dofs().len(), 4);

    let total: f64 = mesh.elements().iter().map(|e| e.shape.area).sum();
    assert!((total - 1.0).abs() < 1e-12);
}

#[test]
fn rectangle_interior_node_is_not_on_boundary() {
    let mesh = MeshBuilder::rectangle(2, 2, 1.0, 1.0, -1.0).build().unwrap();
    let centre = DofId::from_index(4);
    assert!(!mesh.is_boundary(centre));
    assert!(mesh.is_boundary(DofId::from_index(0)));
    assert_eq!(mesh.boundary_dofs().len(), 8);
}

#[test]
fn invalid_dof_reference_is_rejected() {
    let mut builder = MeshBuilder::new();
    let a = builder.add_dof(0.0, 0.0, 0.0);
    let b = builder.add_dof(1.0, 0.0, 0.0);
    builder.add_element(a, b, DofId::from_index(7));

    let err = builder.build().unwrap_err();
    assert!(matches!(err, MeshError::InvalidDofRef { .. }));
}

#[test]
fn degenerate_triangle_is_rejected() {
    let mut builder = MeshBuilder::new();
    let a = builder.add_dof(0.0, 0.0, 0.0);
    let b = builder.add_dof(1.0, 0.0, 0.0);
    let c = builder.add_dof(2.0, 0.0, 0.0);
    builder.add_element(a, b, c);

    let err = builder.build().unwrap_err();
    assert!(matches!(err, MeshError::DegenerateElement { .. }));
}

#[test]
fn orphan_dof_is_rejected() {
    let mut builder = MeshBuilder::new();
    let a = builder.add_dof(0.0, 0.0, 0.0);
    let b = builder.add_dof(1.0, 0.0, 0.0);
    let c = builder.add_dof(0.0, 1.0, 0.0);
    builder.add_dof(5.0, 5.0, 0.0);
    builder.add_element(a, b, c);

    let err = builder.build().unwrap_err();
    assert_eq!(
        err,
        MeshError::OrphanDof {
            dof: DofId::from_index(3)
        }
    );
}

#[test]
fn repeated_dof_is_rejected() {
    let mut builder = MeshBuilder::new();
    let a = builder.add_dof(0.0, 0.0, 0.0);
    let b = builder.add_dof(1.0, 0.0, 0.0);
    builder.add_element(a, b, a);

    assert!(matches!(
        builder.build().unwrap_err(),
        MeshError::DuplicateDofs { .. }
    ));
}

#[test]
fn elevation_updates_are_checked() {
    let mut mesh = MeshBuilder::rectangle(1, 1, 1.0, 1.0, -3.0).build().unwrap();
    let d = DofId::from_index(2);
    mesh.set_elevation(d, -2.5).unwrap();
    assert_eq!(mesh.dof(d).unwrap().z, -2.5);
    assert!(mesh.set_elevation(d, f64::NAN).is_err());
    assert!(mesh.set_elevation(DofId::from_index(99), 0.0).is_err());
}

#[test]
fn domain_registries_start_empty() {
    let mesh = MeshBuilder::rectangle(2, 2, 10.0, 10.0, -5.0).build().unwrap();
    let domain = Domain::new(mesh);
    assert_eq!(domain.dof_count(), 9);
    assert_eq!(domain.element_count(), 8);
    assert!(domain.dofs.kind_names().is_empty());
    assert!(domain.elements.get::<f64>(0).is_none());
}
