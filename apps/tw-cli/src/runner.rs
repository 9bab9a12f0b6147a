//! Turns a run definition into a ready-to-run simulation.

use std::path::{Path, PathBuf};

use tw_core::{DofId, SimConfig, TimeSeries};
use tw_mesh::{Domain, MeshBuilder};
use tw_project::{
    CURRENT_MODEL_NAME, InitialDef, IntegratorDef, KineticsDef, MeshDef, ModelDef, NpzdDef, RunDef,
    resolve_path,
};
use tw_results::{Field, FieldMask, ModelOutput, RunStore, read_boundary_file};
use tw_sim::{IntegratorType, SimOptions, Simulation};
use tw_transport::{
    CurrentParams, Detritus, ElementExecutor, InitialCondition, Nitrogen, NpzdParams,
    Phytoplankton, PrescribedCurrent, Salinity, ScalarTransport, SourceTerm, Tracer,
    TransportOptions, UniformFlow, Zooplankton,
};

use crate::error::CliResult;

/// Where a run writes its result streams.
pub struct OutputTarget<'a> {
    pub store: &'a RunStore,
    pub run_id: &'a str,
}

impl OutputTarget<'_> {
    fn path(&self, model: &str) -> PathBuf {
        self.store.result_path(self.run_id, model)
    }
}

/// A built simulation and the streams it will write.
pub struct PreparedRun {
    pub simulation: Simulation,
    pub outputs: Vec<ModelOutput>,
}

/// Build the domain, the current and every transport model of `run`.
///
/// Relative paths inside the definition resolve against `base_dir`.
/// `threads` overrides the worker count of the definition.
pub fn prepare(
    run: &RunDef,
    base_dir: &Path,
    threads: Option<usize>,
    target: Option<&OutputTarget<'_>>,
) -> CliResult<PreparedRun> {
    let mut config = run.settings.to_config();
    if threads.is_some() {
        config.threads = threads;
    }
    config.validate()?;

    let mesh = match run.mesh {
        MeshDef::Rectangle {
            nx,
            ny,
            dx_m,
            dy_m,
            bed_m,
        } => MeshBuilder::rectangle(nx, ny, dx_m, dy_m, bed_m).build()?,
    };
    let node_count = mesh.dof_count();

    let options = SimOptions {
        start: run.time.start_s,
        end: run.time.end_s,
        interval: run.time.interval_s,
        max_step: run.time.max_step_s,
        integrator: match run.settings.integrator {
            IntegratorDef::ForwardEuler => IntegratorType::ForwardEuler,
            IntegratorDef::Heun => IntegratorType::Heun,
        },
        release: config.release,
    };
    let mut simulation = Simulation::new(Domain::new(mesh), options)?;
    let mut outputs = Vec::new();

    let c = &run.current;
    let mut flow = UniformFlow::new(c.u_mps, c.v_mps, c.level_m);
    if !c.tide.is_empty() {
        let points = c.tide.iter().map(|&[t, level]| (t, level)).collect();
        flow = flow.with_level(TimeSeries::new(points)?);
    }
    let current_output = target.filter(|_| c.output).map(|t| t.path(CURRENT_MODEL_NAME));
    if let Some(path) = &current_output {
        outputs.push(model_output(
            CURRENT_MODEL_NAME,
            path,
            FieldMask::EMPTY
                .with(Field::Position)
                .with(Field::Depth)
                .with(Field::Velocity),
        ));
    }
    let params = CurrentParams {
        eddy_diffusivity: c.eddy_diffusivity_m2ps,
        dispersion: c.dispersion,
        open_boundary: c.open_boundary.iter().map(|&i| DofId::from_usize(i)).collect(),
        max_step: c.max_step_s,
        output: current_output,
    };
    let current = PrescribedCurrent::new(
        CURRENT_MODEL_NAME,
        flow,
        simulation.domain_mut(),
        &config,
        params,
    )?;
    simulation.add_self_stepping(current)?;

    let executor = ElementExecutor::from_config(&config)?;
    let npzd = npzd_params(&run.npzd);
    for model in &run.models {
        let boundary = match &model.boundary_file {
            Some(file) => read_boundary_file(&resolve_path(base_dir, file), Some(node_count))?,
            None => Vec::new(),
        };
        let options = TransportOptions {
            initial: initial_condition(&model.initial, base_dir),
            boundary,
            output: target.filter(|_| model.output).map(|t| t.path(&model.name)),
        };
        let built = match model.kinetics {
            KineticsDef::Salinity => {
                add_transport(&mut simulation, model, Salinity, &config, &executor, options)?
            }
            KineticsDef::Tracer { half_life_s } => add_transport(
                &mut simulation,
                model,
                Tracer::with_half_life(half_life_s),
                &config,
                &executor,
                options,
            )?,
            KineticsDef::Nitrogen => add_transport(
                &mut simulation,
                model,
                Nitrogen(npzd),
                &config,
                &executor,
                options,
            )?,
            KineticsDef::Phytoplankton => add_transport(
                &mut simulation,
                model,
                Phytoplankton(npzd),
                &config,
                &executor,
                options,
            )?,
            KineticsDef::Zooplankton => add_transport(
                &mut simulation,
                model,
                Zooplankton(npzd),
                &config,
                &executor,
                options,
            )?,
            KineticsDef::Detritus => add_transport(
                &mut simulation,
                model,
                Detritus(npzd),
                &config,
                &executor,
                options,
            )?,
        };
        outputs.extend(built);
    }

    Ok(PreparedRun {
        simulation,
        outputs,
    })
}

fn add_transport<S: SourceTerm>(
    simulation: &mut Simulation,
    model: &ModelDef,
    source: S,
    config: &SimConfig,
    executor: &ElementExecutor,
    options: TransportOptions,
) -> CliResult<Option<ModelOutput>> {
    let output = options
        .output
        .as_deref()
        .map(|path| model_output(&model.name, path, FieldMask::EMPTY.with(source.output_field())));
    let transport = ScalarTransport::new(
        model.name.as_str(),
        source,
        simulation.domain_mut(),
        config,
        executor.clone(),
        options,
    )?;
    simulation.add_ode(transport)?;
    Ok(output)
}

fn model_output(name: &str, path: &Path, mask: FieldMask) -> ModelOutput {
    ModelOutput {
        name: name.to_string(),
        file: path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default(),
        mask,
    }
}

fn initial_condition(initial: &InitialDef, base_dir: &Path) -> InitialCondition {
    match initial {
        InitialDef::Constant { value } => InitialCondition::Constant(*value),
        InitialDef::FromBoundaries => InitialCondition::FromBoundaries,
        InitialDef::FromResult { path, record } => InitialCondition::FromResult {
            path: resolve_path(base_dir, path),
            record: *record,
        },
    }
}

fn npzd_params(def: &NpzdDef) -> NpzdParams {
    NpzdParams {
        max_growth: def.max_growth,
        nutrient_half_saturation: def.nutrient_half_saturation,
        light_limitation: def.light_limitation,
        phyto_mortality: def.phyto_mortality,
        max_grazing: def.max_grazing,
        grazing_half_saturation: def.grazing_half_saturation,
        assimilation: def.assimilation,
        zoo_mortality: def.zoo_mortality,
        remineralization: def.remineralization,
    }
}
