//! End-to-end runs on the two-triangle square.
//!
//! Node layout (1 m x 1 m, bed at -1 m, level 0):
//!
//! ```text
//! 2 --- 3
//! |   / |
//! | /   |
//! 0 --- 1
//! ```

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use tw_core::{Accumulation, DofId, SimConfig, TimeSeries};
use tw_mesh::{Domain, MeshBuilder};
use tw_results::{BoundaryCondition, Field, ResultReader};
use tw_sim::{ModelIndex, SimOptions, Simulation};
use tw_transport::{
    CurrentParams, ElementExecutor, InitialCondition, PrescribedCurrent, Salinity,
    ScalarTransport, TransportOptions, UniformFlow,
};

fn unique_temp_file(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("tw_sim_{name}_{nanos}"));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(format!("{name}.twr"))
}

fn held(dof: u32, value: f64) -> BoundaryCondition {
    BoundaryCondition {
        dof: DofId::from_index(dof),
        series: TimeSeries::constant(value),
    }
}

/// Square with a still current and one salinity model.
fn square(
    config: &SimConfig,
    eddy_diffusivity: f64,
    transport: TransportOptions,
    options: SimOptions,
) -> (Simulation, ModelIndex) {
    let mesh = MeshBuilder::rectangle(1, 1, 1.0, 1.0, -1.0).build().unwrap();
    let mut sim = Simulation::new(Domain::new(mesh), options).unwrap();

    let current = PrescribedCurrent::new(
        "current",
        UniformFlow::new(0.0, 0.0, 0.0),
        sim.domain_mut(),
        config,
        CurrentParams {
            eddy_diffusivity,
            ..CurrentParams::default()
        },
    )
    .unwrap();
    sim.add_self_stepping(current).unwrap();

    let exec = ElementExecutor::new(Some(2), Accumulation::Locked).unwrap();
    let salt = ScalarTransport::new("salt", Salinity, sim.domain_mut(), config, exec, transport)
        .unwrap();
    let idx = sim.add_ode(salt).unwrap();
    (sim, idx)
}

#[test]
fn still_water_stays_exactly_constant() {
    let c0 = 5.0;
    let (mut sim, idx) = square(
        &SimConfig::default(),
        0.5,
        TransportOptions {
            initial: InitialCondition::Constant(c0),
            boundary: vec![held(0, c0), held(1, c0)],
            output: None,
        },
        SimOptions {
            end: 3600.0,
            interval: 600.0,
            max_step: Some(60.0),
            ..SimOptions::default()
        },
    );
    sim.setup().unwrap();
    while sim.advance_interval().unwrap() {
        assert!(sim.state(idx).unwrap().iter().all(|c| *c == c0));
    }
    assert_eq!(sim.summary().sub_steps, 60);
    assert!(!sim.summary().diverged());
}

/// Holds node 0 at `c1` from a uniform `c0` start and checks every other
/// node after each interval. Returns the final state.
fn boundary_step(config: &SimConfig, eddy_diffusivity: f64, c0: f64, c1: f64) -> Vec<f64> {
    let (mut sim, idx) = square(
        config,
        eddy_diffusivity,
        TransportOptions {
            initial: InitialCondition::Constant(c0),
            boundary: vec![held(0, c1)],
            output: None,
        },
        SimOptions {
            end: 100.0,
            interval: 1.0,
            max_step: Some(1.0),
            ..SimOptions::default()
        },
    );
    sim.setup().unwrap();

    let (lo, hi) = (c0.min(c1), c0.max(c1));
    let toward = (c1 - c0).signum();
    let tol = 1e-12;
    let mut previous = sim.state(idx).unwrap().to_vec();
    let mut step = 0;
    while sim.advance_interval().unwrap() {
        step += 1;
        let state = sim.state(idx).unwrap();
        assert_eq!(state[0], c1);
        for node in 1..4 {
            let moved = toward * (state[node] - previous[node]);
            assert!(moved >= -tol, "step {step}, node {node} moved away: {}", state[node]);
            assert!(
                state[node] >= lo - tol && state[node] <= hi + tol,
                "step {step}, node {node} left the range: {}",
                state[node]
            );
        }
        previous = state.to_vec();
    }
    previous
}

#[test]
fn boundary_step_spreads_monotonically_without_overshoot() {
    let config = SimConfig::default();
    assert_eq!(config.wet_dry.wetting_factor, 1.0);

    let rising = boundary_step(&config, 0.1, 2.0, 8.0);
    assert!(rising[1] > 7.5);
    assert!(rising[3] > 7.5);

    let falling = boundary_step(&config, 0.1, 8.0, 2.0);
    assert!(falling[3] < 2.5);
}

#[test]
fn weak_diffusion_never_pulls_the_far_node_below_its_start() {
    let state = boundary_step(&SimConfig::default(), 0.01, 2.0, 8.0);
    assert!(state[3] > 2.0);
}

#[test]
fn injected_nan_is_written_and_run_continues() {
    let path = unique_temp_file("nan");
    let c0 = 5.0;
    let (mut sim, idx) = square(
        &SimConfig::default(),
        0.5,
        TransportOptions {
            initial: InitialCondition::Constant(c0),
            boundary: vec![held(0, c0), held(1, c0)],
            output: Some(path.clone()),
        },
        SimOptions {
            end: 20.0,
            interval: 10.0,
            max_step: Some(2.5),
            ..SimOptions::default()
        },
    );
    sim.setup().unwrap();
    assert!(sim.advance_interval().unwrap());
    sim.state_mut(idx).unwrap()[3] = f64::NAN;

    let summary = sim.run().unwrap();
    assert_eq!(summary.diverged_at, Some(12.5));
    assert_eq!(summary.diverged_model.as_deref(), Some("salt"));
    assert_eq!(sim.time(), 20.0);

    // initial, first interval, three diverged sub-steps, second interval
    let mut reader = ResultReader::open(&path).unwrap();
    assert_eq!(reader.record_count(), 6);
    let (t, values) = reader.read_field(2, Field::Salinity).unwrap();
    assert_eq!(t, 12.5);
    assert!(values[3].is_nan());
    let (t, values) = reader.read_field(5, Field::Salinity).unwrap();
    assert_eq!(t, 20.0);
    assert!(values[3].is_nan());
}

#[test]
fn start_from_previous_result() {
    let path = unique_temp_file("restart");
    let (mut first, _) = square(
        &SimConfig::default(),
        0.1,
        TransportOptions {
            initial: InitialCondition::Constant(1.0),
            boundary: vec![held(0, 9.0)],
            output: Some(path.clone()),
        },
        SimOptions {
            end: 20.0,
            interval: 10.0,
            max_step: Some(1.0),
            ..SimOptions::default()
        },
    );
    first.run().unwrap();
    let last: Vec<f64> = first.state(ModelIndex(1)).unwrap().to_vec();

    let (mut second, idx) = square(
        &SimConfig::default(),
        0.1,
        TransportOptions {
            initial: InitialCondition::FromResult {
                path: path.clone(),
                record: 2,
            },
            boundary: vec![held(0, 9.0)],
            output: None,
        },
        SimOptions::default(),
    );
    second.setup().unwrap();
    for (restarted, original) in second.state(idx).unwrap().iter().zip(&last) {
        assert!((restarted - original).abs() <= 1e-6 * original.abs().max(1.0));
    }
}
