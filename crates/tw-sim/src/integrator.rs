//! Explicit single-step integrators for ODE-style models.

use tw_mesh::Domain;
use tw_transport::OdeModel;

use crate::error::{SimError, SimResult};

/// Integrator selection, decided once per run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IntegratorType {
    /// 1st order, one rate evaluation per step.
    #[default]
    ForwardEuler,
    /// Explicit trapezoidal predictor-corrector, two rate evaluations per step.
    Heun,
}

/// Advance one model's state vector by `dt`.
pub trait Integrator {
    /// `rate` is scratch space of the state's length; on return it holds
    /// the rate actually applied.
    fn step(
        &self,
        model: &mut dyn OdeModel,
        t: f64,
        dt: f64,
        state: &mut [f64],
        rate: &mut [f64],
        domain: &mut Domain,
    ) -> SimResult<()>;
}

fn evaluate(
    model: &mut dyn OdeModel,
    t: f64,
    state: &mut [f64],
    rate: &mut [f64],
    domain: &mut Domain,
) -> SimResult<()> {
    model
        .rate_of_change(t, state, rate, domain)
        .map_err(SimError::model(model.name()))
}

/// Forward Euler (explicit, 1st order).
#[derive(Clone, Copy, Debug)]
pub struct ForwardEuler;

impl Integrator for ForwardEuler {
    fn step(
        &self,
        model: &mut dyn OdeModel,
        t: f64,
        dt: f64,
        state: &mut [f64],
        rate: &mut [f64],
        domain: &mut Domain,
    ) -> SimResult<()> {
        evaluate(model, t, state, rate, domain)?;
        for (x, r) in state.iter_mut().zip(rate.iter()) {
            *x += dt * r;
        }
        Ok(())
    }
}

/// Heun's method (explicit, 2nd order).
#[derive(Clone, Copy, Debug)]
pub struct Heun;

impl Integrator for Heun {
    fn step(
        &self,
        model: &mut dyn OdeModel,
        t: f64,
        dt: f64,
        state: &mut [f64],
        rate: &mut [f64],
        domain: &mut Domain,
    ) -> SimResult<()> {
        evaluate(model, t, state, rate, domain)?;

        let mut predicted: Vec<f64> = state
            .iter()
            .zip(rate.iter())
            .map(|(x, k1)| x + dt * k1)
            .collect();
        let mut k2 = vec![0.0; state.len()];
        evaluate(model, t + dt, &mut predicted, &mut k2, domain)?;

        for ((x, k1), k2) in state.iter_mut().zip(rate.iter_mut()).zip(&k2) {
            *k1 = 0.5 * (*k1 + k2);
            *x += dt * *k1;
        }
        Ok(())
    }
}

impl IntegratorType {
    pub fn step(
        self,
        model: &mut dyn OdeModel,
        t: f64,
        dt: f64,
        state: &mut [f64],
        rate: &mut [f64],
        domain: &mut Domain,
    ) -> SimResult<()> {
        match self {
            IntegratorType::ForwardEuler => ForwardEuler.step(model, t, dt, state, rate, domain),
            IntegratorType::Heun => Heun.step(model, t, dt, state, rate, domain),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tw_mesh::MeshBuilder;
    use tw_transport::{ResultOutput, TransportResult};

    /// dC/dt = -lambda C at every DOF.
    struct Decay {
        lambda: f64,
        evaluations: usize,
    }

    impl ResultOutput for Decay {
        fn write_result(&mut self, _t: f64, _state: &[f64], _domain: &Domain) -> TransportResult<()> {
            Ok(())
        }

        fn records_written(&self) -> usize {
            0
        }
    }

    impl OdeModel for Decay {
        fn name(&self) -> &str {
            "decay"
        }

        fn initial_state(&mut self, _t: f64, domain: &mut Domain) -> TransportResult<Vec<f64>> {
            Ok(vec![1.0; domain.dof_count()])
        }

        fn rate_of_change(
            &mut self,
            _t: f64,
            state: &mut [f64],
            rate: &mut [f64],
            _domain: &mut Domain,
        ) -> TransportResult<()> {
            self.evaluations += 1;
            for (r, x) in rate.iter_mut().zip(state.iter()) {
                *r = -self.lambda * x;
            }
            Ok(())
        }

        fn max_time_step(&self) -> Option<f64> {
            None
        }
    }

    fn domain() -> Domain {
        Domain::new(MeshBuilder::rectangle(1, 1, 1.0, 1.0, -1.0).build().unwrap())
    }

    fn integrate(kind: IntegratorType, steps: usize, dt: f64) -> (f64, usize) {
        let mut domain = domain();
        let mut model = Decay {
            lambda: 1.0,
            evaluations: 0,
        };
        let mut state = model.initial_state(0.0, &mut domain).unwrap();
        let mut rate = vec![0.0; state.len()];
        for k in 0..steps {
            kind.step(&mut model, k as f64 * dt, dt, &mut state, &mut rate, &mut domain)
                .unwrap();
        }
        (state[0], model.evaluations)
    }

    #[test]
    fn euler_single_step() {
        let (x, evals) = integrate(IntegratorType::ForwardEuler, 1, 0.1);
        assert!((x - 0.9).abs() < 1e-15);
        assert_eq!(evals, 1);
    }

    #[test]
    fn heun_single_step() {
        let (x, evals) = integrate(IntegratorType::Heun, 1, 0.1);
        // 1 - dt + dt^2 / 2
        assert!((x - 0.905).abs() < 1e-15);
        assert_eq!(evals, 2);
    }

    #[test]
    fn heun_is_more_accurate_than_euler() {
        let exact = (-1.0f64).exp();
        let (euler, _) = integrate(IntegratorType::ForwardEuler, 20, 0.05);
        let (heun, _) = integrate(IntegratorType::Heun, 20, 0.05);
        assert!((heun - exact).abs() < 0.1 * (euler - exact).abs());
    }
}
