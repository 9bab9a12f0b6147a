//! Initial conditions for scalar fields.

use std::path::PathBuf;

use tw_mesh::Mesh;

use crate::error::{TransportError, TransportResult};

#[derive(Clone, Debug, PartialEq)]
pub enum InitialCondition {
    Constant(f64),
    /// Inverse-distance interpolation of the boundary values at the start
    /// time.
    FromBoundaries,
    /// A record of a previous run's result stream.
    FromResult { path: PathBuf, record: usize },
}

impl Default for InitialCondition {
    fn default() -> Self {
        InitialCondition::Constant(0.0)
    }
}

/// Inverse-distance-squared interpolation of `(dof, value)` samples onto
/// every DOF. Sample DOFs keep their value exactly.
pub fn inverse_distance(mesh: &Mesh, samples: &[(usize, f64)]) -> TransportResult<Vec<f64>> {
    if samples.is_empty() {
        return Err(TransportError::InvalidArg {
            what: "interpolation from boundaries needs at least one boundary condition",
        });
    }
    let dofs = mesh.dofs();
    let points: Vec<_> = samples
        .iter()
        .map(|&(i, v)| (dofs[i].position(), v))
        .collect();

    let values = dofs
        .iter()
        .map(|dof| {
            let p = dof.position();
            let mut weight_sum = 0.0;
            let mut value_sum = 0.0;
            for (q, v) in &points {
                let d2 = (p - q).norm_squared();
                if d2 == 0.0 {
                    return *v;
                }
                let w = 1.0 / d2;
                weight_sum += w;
                value_sum += w * v;
            }
            value_sum / weight_sum
        })
        .collect();
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tw_mesh::MeshBuilder;

    #[test]
    fn samples_are_reproduced_and_midpoint_is_average() {
        let mesh = MeshBuilder::rectangle(2, 1, 1.0, 1.0, -1.0).build().unwrap();
        // nodes 0 (0,0) and 2 (2,0); node 1 (1,0) is halfway
        let values = inverse_distance(&mesh, &[(0, 10.0), (2, 20.0)]).unwrap();
        assert_eq!(values[0], 10.0);
        assert_eq!(values[2], 20.0);
        assert!((values[1] - 15.0).abs() < 1e-12);
        assert!(values.iter().all(|v| (10.0..=20.0).contains(v)));
    }

    #[test]
    fn no_samples_is_an_error() {
        let mesh = MeshBuilder::rectangle(1, 1, 1.0, 1.0, -1.0).build().unwrap();
        assert!(inverse_distance(&mesh, &[]).is_err());
    }
}
