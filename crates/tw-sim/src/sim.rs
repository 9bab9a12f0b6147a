//! Multi-model simulation runner.
//!
//! All models share one [`Domain`]. Each sub-step takes the smallest step
//! any model admits, clipped to the end of the current result interval, and
//! advances the models in insertion order. Later models therefore see what
//! earlier models published in the same sub-step.
//!
//! Non-finite state values do not stop the run. Once any model diverges,
//! every model writes a result record after each sub-step so the failure can
//! be inspected.

use tracing::{debug, info, warn};
use tw_mesh::Domain;
use tw_transport::{OdeModel, SelfStepping};

use crate::error::{SimError, SimResult};
use crate::integrator::IntegratorType;
use crate::model::{ModelIndex, ModelSlot};

/// Options for a simulation run.
#[derive(Clone, Debug)]
pub struct SimOptions {
    /// Start time (seconds)
    pub start: f64,
    /// End time (seconds)
    pub end: f64,
    /// Result interval (seconds); `<= 0` writes after every sub-step
    pub interval: f64,
    /// Optional cap on every sub-step (seconds)
    pub max_step: Option<f64>,
    pub integrator: IntegratorType,
    /// Suppress per-sub-step diagnostics.
    pub release: bool,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            start: 0.0,
            end: 3600.0,
            interval: 600.0,
            max_step: None,
            integrator: IntegratorType::default(),
            release: false,
        }
    }
}

impl SimOptions {
    pub fn validate(&self) -> SimResult<()> {
        if !self.start.is_finite() || !self.end.is_finite() || !self.interval.is_finite() {
            return Err(SimError::InvalidArg {
                what: "start, end and interval must be finite",
            });
        }
        if self.end < self.start {
            return Err(SimError::InvalidArg {
                what: "end must not precede start",
            });
        }
        if let Some(cap) = self.max_step {
            if !(cap > 0.0) {
                return Err(SimError::InvalidArg {
                    what: "max_step must be positive",
                });
            }
        }
        Ok(())
    }

    pub fn is_adaptive(&self) -> bool {
        self.interval <= 0.0
    }
}

/// Progress after one result interval.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimProgress {
    pub t: f64,
    pub start: f64,
    pub end: f64,
    pub intervals: usize,
    pub sub_steps: usize,
    pub last_step: f64,
    pub diverged: bool,
}

impl SimProgress {
    /// Completed fraction of the run, 0..=1.
    pub fn fraction(&self) -> f64 {
        let span = self.end - self.start;
        if span > 0.0 {
            ((self.t - self.start) / span).clamp(0.0, 1.0)
        } else {
            1.0
        }
    }
}

/// Outcome of a run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub intervals: usize,
    pub sub_steps: usize,
    /// Smallest sub-step taken (infinite before the first step).
    pub min_step: f64,
    pub max_step: f64,
    /// Time after the first sub-step that left a non-finite value.
    pub diverged_at: Option<f64>,
    /// Name of the first diverged model.
    pub diverged_model: Option<String>,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self {
            intervals: 0,
            sub_steps: 0,
            min_step: f64::INFINITY,
            max_step: 0.0,
            diverged_at: None,
            diverged_model: None,
        }
    }
}

impl RunSummary {
    pub fn diverged(&self) -> bool {
        self.diverged_at.is_some()
    }

    fn record_step(&mut self, dt: f64) {
        self.sub_steps += 1;
        self.min_step = self.min_step.min(dt);
        self.max_step = self.max_step.max(dt);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Building,
    Running,
}

pub struct Simulation {
    domain: Domain,
    options: SimOptions,
    models: Vec<ModelSlot>,
    t: f64,
    last_step: f64,
    phase: Phase,
    summary: RunSummary,
}

impl Simulation {
    pub fn new(domain: Domain, options: SimOptions) -> SimResult<Self> {
        options.validate()?;
        Ok(Self {
            domain,
            t: options.start,
            last_step: 0.0,
            options,
            models: Vec::new(),
            phase: Phase::Building,
            summary: RunSummary::default(),
        })
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Models are built against the domain before they are added.
    pub fn domain_mut(&mut self) -> &mut Domain {
        &mut self.domain
    }

    pub fn options(&self) -> &SimOptions {
        &self.options
    }

    pub fn time(&self) -> f64 {
        self.t
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn models(&self) -> &[ModelSlot] {
        &self.models
    }

    pub fn model(&self, index: ModelIndex) -> Option<&ModelSlot> {
        self.models.get(index.0)
    }

    fn push(&mut self, slot: ModelSlot) -> SimResult<ModelIndex> {
        if self.phase != Phase::Building {
            return Err(SimError::State {
                what: "models must be added before setup",
            });
        }
        debug!(model = slot.name(), position = self.models.len(), "model added");
        self.models.push(slot);
        Ok(ModelIndex(self.models.len() - 1))
    }

    pub fn add_ode(&mut self, model: impl OdeModel + 'static) -> SimResult<ModelIndex> {
        self.push(ModelSlot::Ode {
            model: Box::new(model),
            state: Vec::new(),
            rate: Vec::new(),
        })
    }

    pub fn add_self_stepping(&mut self, model: impl SelfStepping + 'static) -> SimResult<ModelIndex> {
        self.push(ModelSlot::Stepping(Box::new(model)))
    }

    /// State vector of an ODE-style model, for inspection or injection.
    pub fn state(&self, index: ModelIndex) -> Option<&[f64]> {
        self.models.get(index.0).map(ModelSlot::state)
    }

    pub fn state_mut(&mut self, index: ModelIndex) -> Option<&mut [f64]> {
        match self.models.get_mut(index.0)? {
            ModelSlot::Ode { state, .. } => Some(state.as_mut_slice()),
            ModelSlot::Stepping(_) => None,
        }
    }

    /// Initialize every model in insertion order, evaluate the first rates
    /// and write the initial records.
    pub fn setup(&mut self) -> SimResult<()> {
        if self.phase != Phase::Building {
            return Err(SimError::State {
                what: "setup already done",
            });
        }
        if self.models.is_empty() {
            return Err(SimError::InvalidArg {
                what: "no models to run",
            });
        }
        let t = self.options.start;
        let domain = &mut self.domain;
        let n = domain.dof_count();

        for slot in &mut self.models {
            match slot {
                ModelSlot::Stepping(model) => model
                    .initialize(t, domain)
                    .map_err(SimError::model(model.name()))?,
                ModelSlot::Ode { model, state, rate } => {
                    *state = model
                        .initial_state(t, domain)
                        .map_err(SimError::model(model.name()))?;
                    *rate = vec![0.0; n];
                }
            }
        }

        // Step limits are only known after a first rate evaluation.
        for slot in &mut self.models {
            if let ModelSlot::Ode { model, state, rate } = slot {
                model
                    .rate_of_change(t, state, rate, domain)
                    .map_err(SimError::model(model.name()))?;
            }
        }

        self.phase = Phase::Running;
        self.t = t;
        self.write_results()?;
        info!(
            models = self.models.len(),
            dofs = n,
            start = t,
            end = self.options.end,
            "simulation set up"
        );
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.t >= self.options.end
    }

    fn write_results(&mut self) -> SimResult<()> {
        let t = self.t;
        for slot in &mut self.models {
            slot.write_result(t, &self.domain)
                .map_err(SimError::model(slot.name()))?;
        }
        Ok(())
    }

    /// Global sub-step: the smallest admissible step of any model.
    fn global_step(&self, remaining: f64) -> f64 {
        self.models
            .iter()
            .filter_map(ModelSlot::max_time_step)
            .chain(self.options.max_step)
            .filter(|dt| *dt > 0.0)
            .fold(remaining, f64::min)
    }

    fn sub_step(&mut self, dt: f64) -> SimResult<()> {
        let t = self.t;
        let integrator = self.options.integrator;
        let domain = &mut self.domain;
        for slot in &mut self.models {
            match slot {
                ModelSlot::Stepping(model) => model
                    .time_step(t, dt, domain)
                    .map_err(SimError::model(model.name()))?,
                ModelSlot::Ode { model, state, rate } => {
                    integrator.step(model.as_mut(), t, dt, state, rate, domain)?
                }
            }
        }
        Ok(())
    }

    /// Name of the first model holding a non-finite value.
    fn diverged_model(&self) -> Option<(&str, usize)> {
        self.models
            .iter()
            .find_map(|m| m.first_non_finite().map(|i| (m.name(), i)))
    }

    /// Advance to the end of the next result interval and write results.
    ///
    /// Returns `false` once the end time has been reached.
    pub fn advance_interval(&mut self) -> SimResult<bool> {
        if self.phase != Phase::Running {
            return Err(SimError::State {
                what: "setup must run before advancing",
            });
        }
        if self.is_finished() {
            return Ok(false);
        }

        let end = self.options.end;
        let adaptive = self.options.is_adaptive();
        let target = if adaptive {
            end
        } else {
            (self.t + self.options.interval).min(end)
        };

        loop {
            let remaining = target - self.t;
            let dt = self.global_step(remaining);
            self.sub_step(dt)?;
            self.t = if dt >= remaining { target } else { self.t + dt };
            self.summary.record_step(dt);
            self.last_step = dt;
            if !self.options.release {
                debug!(t = self.t, dt, "sub-step");
            }

            let diverged = match self.diverged_model() {
                Some((name, dof)) => {
                    if self.summary.diverged_at.is_none() {
                        warn!(model = name, dof, t = self.t, "non-finite state, run continues");
                        let name = name.to_string();
                        self.summary.diverged_at = Some(self.t);
                        self.summary.diverged_model = Some(name);
                    }
                    true
                }
                None => false,
            };

            let reached = self.t >= target;
            if adaptive || reached {
                break;
            }
            if diverged {
                self.write_results()?;
            }
        }

        self.summary.intervals += 1;
        self.write_results()?;
        info!(
            t = self.t,
            sub_steps = self.summary.sub_steps,
            "interval done"
        );
        Ok(true)
    }

    /// Run to the end time.
    pub fn run(&mut self) -> SimResult<RunSummary> {
        self.run_with_progress(|_| {})
    }

    /// Run to the end time, reporting progress after every interval.
    pub fn run_with_progress<F>(&mut self, mut on_progress: F) -> SimResult<RunSummary>
    where
        F: FnMut(&SimProgress),
    {
        if self.phase == Phase::Building {
            self.setup()?;
        }
        while self.advance_interval()? {
            on_progress(&SimProgress {
                t: self.t,
                start: self.options.start,
                end: self.options.end,
                intervals: self.summary.intervals,
                sub_steps: self.summary.sub_steps,
                last_step: self.last_step,
                diverged: self.summary.diverged(),
            });
        }
        self.finish()?;
        Ok(self.summary.clone())
    }

    /// Flush every result stream.
    pub fn finish(&mut self) -> SimResult<()> {
        for slot in &mut self.models {
            slot.flush().map_err(SimError::model(slot.name()))?;
        }
        Ok(())
    }
}
