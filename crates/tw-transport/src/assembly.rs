//! Stabilized element assembly for linear triangles.
//!
//! For one element and one scalar field this computes, per local node, the
//! Galerkin residual (advection, depth-weighted eddy diffusion, sources) with
//! a blended consistent mass matrix, plus a streamline-upwind correction.
//! Contributions are per unit area: the mass rows sum to 1/3, so the caller
//! normalizes the accumulated node value by `3 / incident_elements`.
//!
//! The consistent mass matrix is inverted approximately by lagging its
//! off-diagonal part onto the previous time derivative. That part is kept
//! apart from the lumped residual as a correction, and [`NodeResidual::limited`]
//! bounds it per node so it can neither reverse the lumped trend nor step past
//! it. With the lumped trend as a bound, a boundary step cannot produce
//! new extrema.

use nalgebra::Vector2;
use tw_core::SimConfig;
use tw_mesh::Shape;

/// Below this mean depth the depth-gradient diffusion term is dropped.
const DEPTH_EPS: f64 = 1e-9;

/// Below this eddy diffusivity the Péclet damping is skipped.
const DIFFUSIVITY_EPS: f64 = 1e-12;

/// Below this Péclet number `coth(Pe) - 1/Pe` is replaced by `Pe / 3`.
const SMALL_PECLET: f64 = 1e-4;

/// Wet state of an element whose three nodes are all dry.
pub const DRY: u8 = 3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AssemblyParams {
    pub wetting_factor: f64,
    pub velocity_threshold: f64,
    pub optimal_peclet: bool,
}

impl AssemblyParams {
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            wetting_factor: config.wet_dry.wetting_factor,
            velocity_threshold: config.stabilization.velocity_threshold,
            optimal_peclet: config.stabilization.optimal_peclet,
        }
    }
}

impl Default for AssemblyParams {
    fn default() -> Self {
        Self::from_config(&SimConfig::default())
    }
}

/// Per-node inputs gathered before the element loop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeInput {
    pub value: f64,
    /// Time derivative from the previous rate evaluation.
    pub dcdt: f64,
    pub source: f64,
    pub velocity: Vector2<f64>,
    pub depth: f64,
}

impl NodeInput {
    pub fn at_rest(value: f64, depth: f64) -> Self {
        Self {
            value,
            dcdt: 0.0,
            source: 0.0,
            velocity: Vector2::zeros(),
            depth,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ElementInput<'a> {
    pub shape: &'a Shape,
    pub nodes: [NodeInput; 3],
    pub mean_velocity: Vector2<f64>,
    pub eddy_diffusivity: f64,
    /// Number of dry nodes, 0..=3.
    pub wet_state: u8,
}

/// Residual of one node, split into its lumped-mass part and the
/// consistent-mass correction.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NodeResidual {
    pub lumped: f64,
    pub correction: f64,
}

impl NodeResidual {
    pub const ZERO: NodeResidual = NodeResidual {
        lumped: 0.0,
        correction: 0.0,
    };

    pub fn total(self) -> f64 {
        self.lumped + self.correction
    }

    pub fn scaled(self, factor: f64) -> Self {
        Self {
            lumped: self.lumped * factor,
            correction: self.correction * factor,
        }
    }

    /// Corrected rate, kept between zero and the lumped rate.
    ///
    /// NaN passes through unchanged.
    pub fn limited(self) -> f64 {
        let total = self.total();
        if total.is_nan() {
            total
        } else if self.lumped > 0.0 {
            total.clamp(0.0, self.lumped)
        } else if self.lumped < 0.0 {
            total.clamp(self.lumped, 0.0)
        } else {
            0.0
        }
    }
}

impl std::ops::AddAssign for NodeResidual {
    fn add_assign(&mut self, rhs: Self) {
        self.lumped += rhs.lumped;
        self.correction += rhs.correction;
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ElementContribution {
    pub residual: [NodeResidual; 3],
    /// Admissible local time step; infinite when unconstrained.
    pub dt: f64,
}

impl ElementContribution {
    pub const SKIPPED: ElementContribution = ElementContribution {
        residual: [NodeResidual::ZERO; 3],
        dt: f64::INFINITY,
    };

    /// True when adding this contribution would change nothing.
    pub fn is_empty(&self) -> bool {
        self.residual.iter().all(|r| *r == NodeResidual::ZERO)
    }
}

/// Optimal streamline-upwind factor `coth(Pe) - 1/Pe`.
pub fn optimal_factor(peclet: f64) -> f64 {
    if peclet < SMALL_PECLET {
        peclet / 3.0
    } else {
        1.0 / peclet.tanh() - 1.0 / peclet
    }
}

/// Stabilization parameter and local time step for one element.
///
/// Returns `(tau, dt)`. Below the velocity threshold there is neither
/// stabilization nor a step limit.
pub fn stabilization(
    shape: &Shape,
    velocity: Vector2<f64>,
    eddy_diffusivity: f64,
    params: &AssemblyParams,
) -> (f64, f64) {
    let speed = velocity.norm();
    if speed < params.velocity_threshold {
        return (0.0, f64::INFINITY);
    }

    // Element length along the flow direction.
    let projected: f64 = shape.grad.iter().map(|g| velocity.dot(g).abs()).sum();
    let h_e = if projected > 0.0 {
        2.0 * speed / projected
    } else {
        shape.size()
    };

    let tau = 0.5 * h_e / speed;
    let dt = tau;

    let damping = if params.optimal_peclet && eddy_diffusivity > DIFFUSIVITY_EPS {
        optimal_factor(speed * h_e / (2.0 * eddy_diffusivity))
    } else {
        1.0
    };
    (tau * damping, dt)
}

/// Residual contribution of one element to its three nodes.
pub fn assemble(input: &ElementInput<'_>, params: &AssemblyParams) -> ElementContribution {
    if input.wet_state >= DRY {
        return ElementContribution::SKIPPED;
    }

    let shape = input.shape;
    let n = &input.nodes;
    let k = input.eddy_diffusivity;

    let grad_c = shape.gradient([n[0].value, n[1].value, n[2].value]);
    let depths = [n[0].depth, n[1].depth, n[2].depth];
    let grad_h = shape.gradient(depths);

    let h_min = depths.iter().copied().fold(f64::INFINITY, f64::min);
    let h_max = depths.iter().copied().fold(0.0, f64::max);
    let h_mean = (depths[0] + depths[1] + depths[2]) / 3.0;
    let depth_ratio = if h_max > 0.0 {
        (h_min / h_max).max(0.0)
    } else {
        0.0
    };
    let wf = params.wetting_factor.min(depth_ratio);

    // Pointwise right-hand side at each node.
    let mut g = [0.0; 3];
    for (j, gj) in g.iter_mut().enumerate() {
        let mut v = n[j].source - n[j].velocity.dot(&grad_c);
        if h_mean > DEPTH_EPS {
            v += k / h_mean * grad_h.dot(&grad_c);
        }
        *gj = v;
    }

    // Consistent minus lumped mass weights.
    let diag = -wf / 6.0;
    let off = wf / 12.0;

    let (tau, dt) = stabilization(shape, input.mean_velocity, k, params);
    let g_mean = (g[0] + g[1] + g[2]) / 3.0;
    let d_mean = (n[0].dcdt + n[1].dcdt + n[2].dcdt) / 3.0;
    let strong_residual = d_mean - g_mean;

    let mut residual = [NodeResidual::ZERO; 3];
    for (i, r) in residual.iter_mut().enumerate() {
        let j = (i + 1) % 3;
        let l = (i + 2) % 3;
        let diffusion = k * shape.grad[i].dot(&grad_c);
        let upwind = tau * input.mean_velocity.dot(&shape.grad[i]) * strong_residual;
        let mass = diag * g[i] + off * (g[j] + g[l]);
        let lagged = wf / 6.0 * n[i].dcdt - wf / 12.0 * (n[j].dcdt + n[l].dcdt);
        *r = NodeResidual {
            lumped: g[i] / 3.0 - diffusion - upwind,
            correction: mass + lagged,
        };
    }

    ElementContribution { residual, dt }
}
