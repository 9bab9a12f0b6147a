mod error;
mod runner;

use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use tw_core::timing::{self, PerfStats};
use tw_results::{
    Field, ResultReader, RunManifest, RunOutcome, RunStore, TimeWindow,
    compute_run_id_with_inputs, timestamp_now,
};
use tw_sim::SimProgress;

use crate::error::{CliError, CliResult};
use crate::runner::OutputTarget;

const SOLVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "tw-cli")]
#[command(about = "Tidewater CLI - Estuarine transport simulation tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a run definition
    Validate {
        /// Path to the run YAML file
        run_path: PathBuf,
    },
    /// Run a simulation
    Run {
        /// Path to the run YAML file
        run_path: PathBuf,
        /// Worker threads for the element loops
        #[arg(long)]
        threads: Option<usize>,
        /// Run store directory (defaults to .tidewater/runs next to the run file)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Skip cache and force re-run
        #[arg(long)]
        no_cache: bool,
    },
    /// List stored runs of a run definition
    Runs {
        /// Path to the run YAML file
        run_path: PathBuf,
        /// Run store directory
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show the header and records of a result stream
    Inspect {
        /// Path to a .twr result file
        file: PathBuf,
        /// Record to print field statistics for
        #[arg(short, long)]
        record: Option<usize>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
    if std::env::var_os("TW_TIMING").is_some() {
        timing::enable_timing();
    }

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { run_path } => cmd_validate(&run_path),
        Commands::Run {
            run_path,
            threads,
            out,
            no_cache,
        } => cmd_run(&run_path, threads, out, !no_cache),
        Commands::Runs { run_path, out } => cmd_runs(&run_path, out),
        Commands::Inspect { file, record } => cmd_inspect(&file, record),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            clear_progress_line();
            eprintln!("✗ {err}");
            ExitCode::FAILURE
        }
    }
}

fn cmd_validate(run_path: &Path) -> CliResult<()> {
    println!("Validating run: {}", run_path.display());
    let run = tw_project::load_yaml(run_path)?;
    println!("✓ Run is valid");
    println!("  Nodes:  {}", run.mesh.node_count());
    println!("  Models: {}", run.models.len());
    for model in &run.models {
        println!("    {} ({})", model.name, model.kinetics.label());
    }
    Ok(())
}

fn open_store(run_path: &Path, out: Option<PathBuf>) -> CliResult<RunStore> {
    let store = match out {
        Some(dir) => RunStore::new(dir)?,
        None => RunStore::for_definition(&absolute(run_path)?)?,
    };
    Ok(store)
}

fn absolute(path: &Path) -> CliResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| CliError::InvalidInput(e.to_string()))?;
    Ok(cwd.join(path))
}

fn cmd_run(
    run_path: &Path,
    threads: Option<usize>,
    out: Option<PathBuf>,
    use_cache: bool,
) -> CliResult<()> {
    let run = tw_project::load_yaml(run_path)?;
    let store = open_store(run_path, out)?;
    let base_dir = absolute(run_path)?
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let run_id =
        compute_run_id_with_inputs(&run, SOLVER_VERSION, &run.input_files(&base_dir))?;

    if use_cache && store.has_run(&run_id) {
        let manifest = store.load_manifest(&run_id)?;
        println!("✓ Loaded from cache: {}", manifest.run_id);
        print_outcome(&manifest.outcome);
        return Ok(());
    }

    println!("Running simulation: {}", run.name);
    let config = run.settings.to_config();
    println!(
        "  t = {:.1} .. {:.1} s ({} .. {}), interval = {:.1} s",
        run.time.start_s,
        run.time.end_s,
        config.date_at(run.time.start_s),
        config.date_at(run.time.end_s),
        run.time.interval_s
    );

    store.create_run_dir(&run_id)?;
    let target = OutputTarget {
        store: &store,
        run_id: &run_id,
    };

    timing::loop_timing::reset_all();
    let setup_start = Instant::now();
    let mut prepared = runner::prepare(&run, &base_dir, threads, Some(&target))?;
    let setup_time_s = setup_start.elapsed().as_secs_f64();

    let run_start = Instant::now();
    let mut last_emit = Instant::now();
    let mut last_fraction = -1.0f64;
    let summary = prepared.simulation.run_with_progress(|progress| {
        let fraction = progress.fraction();
        if (fraction - last_fraction).abs() >= 0.005 || last_emit.elapsed().as_millis() >= 100 {
            render_cli_progress(progress, run_start.elapsed().as_secs_f64());
            last_fraction = fraction;
            last_emit = Instant::now();
        }
    })?;
    clear_progress_line();
    let run_time_s = run_start.elapsed().as_secs_f64();

    let records = prepared
        .simulation
        .models()
        .iter()
        .map(|m| m.records_written())
        .max()
        .unwrap_or(0);
    let outcome = RunOutcome {
        sub_steps: summary.sub_steps,
        records,
        min_step_s: (summary.sub_steps > 0).then_some(summary.min_step),
        max_step_s: (summary.sub_steps > 0).then_some(summary.max_step),
        diverged_at_s: summary.diverged_at,
    };
    let manifest = RunManifest {
        run_id: run_id.clone(),
        run_name: run.name.clone(),
        timestamp: timestamp_now(),
        solver_version: SOLVER_VERSION.to_string(),
        time: TimeWindow {
            start_s: run.time.start_s,
            end_s: run.time.end_s,
            interval_s: run.time.interval_s,
        },
        models: prepared.outputs,
        outcome,
    };
    store.save_manifest(&manifest)?;

    if let Some(model) = &summary.diverged_model {
        println!(
            "✗ Simulation diverged in '{}' at t = {:.3} s: {}",
            model,
            summary.diverged_at.unwrap_or(f64::NAN),
            run_id
        );
    } else {
        println!("✓ Simulation completed: {}", run_id);
    }
    println!("  Results: {}", store.run_dir(&run_id).display());
    print_outcome(&manifest.outcome);

    PerfStats {
        setup_time_s,
        run_time_s,
        sub_steps: summary.sub_steps,
        intervals: summary.intervals,
    }
    .print_summary();

    Ok(())
}

fn print_outcome(outcome: &RunOutcome) {
    println!("  Records:   {}", outcome.records);
    println!("  Sub-steps: {}", outcome.sub_steps);
    if let (Some(min), Some(max)) = (outcome.min_step_s, outcome.max_step_s) {
        println!("  Step:      {:.3} .. {:.3} s", min, max);
    }
    if let Some(t) = outcome.diverged_at_s {
        println!("  Diverged:  t = {:.3} s", t);
    }
}

fn clear_progress_line() {
    print!("\r{}\r", " ".repeat(120));
    let _ = io::stdout().flush();
}

fn render_cli_progress(progress: &SimProgress, elapsed_s: f64) {
    let width = 28usize;
    let fraction = progress.fraction();
    let filled = ((fraction * width as f64).round() as usize).min(width);
    let bar = format!(
        "{}{}",
        "#".repeat(filled),
        "-".repeat(width.saturating_sub(filled))
    );
    print!(
        "\r[{}] {:>6.2}%  t={:.1}/{:.1}s  steps={}  dt={:.3}s{}  elapsed={:.1}s",
        bar,
        fraction * 100.0,
        progress.t,
        progress.end,
        progress.sub_steps,
        progress.last_step,
        if progress.diverged { "  DIVERGED" } else { "" },
        elapsed_s
    );
    let _ = io::stdout().flush();
}

fn cmd_runs(run_path: &Path, out: Option<PathBuf>) -> CliResult<()> {
    let run = tw_project::load_yaml(run_path)?;
    let store = open_store(run_path, out)?;
    let runs = store.list_runs(Some(run.name.as_str()))?;

    if runs.is_empty() {
        println!("No stored runs found for: {}", run.name);
    } else {
        println!("Stored runs for '{}':", run.name);
        for manifest in runs {
            let status = if manifest.outcome.diverged() {
                "diverged"
            } else {
                "ok"
            };
            println!(
                "  {} ({}, {} records, {})",
                manifest.run_id, manifest.timestamp, manifest.outcome.records, status
            );
        }
    }
    Ok(())
}

fn cmd_inspect(file: &Path, record: Option<usize>) -> CliResult<()> {
    let mut reader = ResultReader::open(file)?;
    let header = reader.header().clone();
    let count = reader.record_count();

    println!("Result stream: {}", file.display());
    println!("  Title:    {}", header.title);
    println!("  Nodes:    {}", header.node_count);
    println!("  Elements: {}", header.elements.len());
    println!("  Edges:    {}", header.edge_count);
    println!("  Boundary: {}", header.boundary.len());
    let fields: Vec<String> = header.mask.fields().map(|f| format!("{f:?}")).collect();
    println!("  Fields:   {}", fields.join(", "));
    println!("  Records:  {}", count);

    match record {
        None => {
            for k in 0..count {
                println!("    [{}] t = {:.3} s", k, reader.read_time(k)?);
            }
        }
        Some(k) => {
            println!("\nRecord {}:", k);
            let mut time = None;
            let fields: Vec<Field> = header.mask.fields().collect();
            for field in fields {
                let (t, values) = reader.read_field(k, field)?;
                time.get_or_insert(t);
                print_field_stats(field, &values);
            }
            if let Some(t) = time {
                println!("  t = {:.3} s", t);
            }
        }
    }
    Ok(())
}

fn print_field_stats(field: Field, values: &[f64]) {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let non_finite = values.len() - finite.len();
    if finite.is_empty() {
        println!("  {:?}: no finite values ({} non-finite)", field, non_finite);
        return;
    }
    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = finite.iter().sum::<f64>() / finite.len() as f64;
    print!(
        "  {:?}: min={:.4} max={:.4} mean={:.4}",
        field, min, max, mean
    );
    if non_finite > 0 {
        print!("  non-finite={}", non_finite);
    }
    println!();
}
