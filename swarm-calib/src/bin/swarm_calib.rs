use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use swarm_calib::core::space::sphere_parameters;
use swarm_calib::prelude::*;
use swarm_calib::{ClockTime, SphereOracle};
use tracing_subscriber::EnvFilter;

/// Particle swarm calibration of traffic simulator parameters.
#[derive(Debug, Parser)]
#[command(name = "swarm_calib", version, about)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct CommonArgs {
    /// JSON calibration config; built-in defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    iterations: Option<usize>,

    #[arg(long, global = true)]
    swarm_size: Option<usize>,

    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Simulator executable
    #[arg(long, global = true)]
    executable: Option<PathBuf>,

    /// Simulation start time (HH:MM)
    #[arg(long, global = true)]
    start: Option<ClockTime>,

    /// Simulation end time (HH:MM)
    #[arg(long, global = true)]
    end: Option<ClockTime>,

    /// File the simulator records its series to
    #[arg(long, global = true)]
    result_file: Option<PathBuf>,

    /// Private directory for the simulator's recording (one per worker)
    #[arg(long, global = true)]
    record_path: Option<PathBuf>,

    /// Extra simulator option, forwarded verbatim (repeatable)
    #[arg(long = "sim-arg", global = true, allow_hyphen_values = true)]
    sim_args: Vec<String>,

    /// Write run artifacts under <DIR>/runs/<run_id>/
    #[arg(long, global = true)]
    runs_dir: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// One particle at the default vector for one generation
    #[arg(long, global = true)]
    debug_default: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the simulator locally, one particle at a time
    Local {
        /// Observed detector data
        observed: PathBuf,
    },
    /// Submit one cluster job per particle and join them each generation
    Distributed,
    /// Score a single parameter vector and print the fitness
    Fitness {
        observed: PathBuf,
        /// `name=value,...` for every parameter
        #[arg(long)]
        params: String,
    },
    /// Optimize the 4-D sphere function without a simulator
    Sphere,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.common.log_json);

    let mut config = match &cli.common.config {
        Some(path) => CalibrationConfig::load_json(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CalibrationConfig::default(),
    };
    if matches!(cli.command, Command::Sphere) {
        config.parameters = sphere_parameters(4);
    }
    apply_overrides(&mut config, &cli.common);

    let mut calibration = Calibration::new(config).context("invalid calibration config")?;
    if let Some(dir) = &cli.common.runs_dir {
        calibration = calibration.with_runs_dir(dir);
    }

    let report = match &cli.command {
        Command::Local { observed } => {
            let observed = calibration
                .load_observed(observed)
                .with_context(|| format!("reading observed data {}", observed.display()))?;
            let mut oracle = calibration.local_oracle(observed);
            calibration.run(OracleMode::Local, &mut oracle)?
        }
        Command::Distributed => {
            let mut oracle = calibration
                .distributed_oracle()
                .context("configuring job queue")?;
            calibration.run(OracleMode::Distributed, &mut oracle)?
        }
        Command::Fitness { observed, params } => {
            let observed = calibration
                .load_observed(observed)
                .with_context(|| format!("reading observed data {}", observed.display()))?;
            let fitness = calibration.evaluate_once(observed, params)?;
            // Job result artifacts hold exactly this line.
            println!("{fitness}");
            return Ok(());
        }
        Command::Sphere => calibration.run(OracleMode::Sphere, &mut SphereOracle::new())?,
    };

    for (name, value) in report.best_parameters() {
        println!("{name} = {value}");
    }
    println!("fitness = {}", report.outcome.best_fitness);
    if let Some(dir) = &report.run_dir {
        println!("run = {}", dir.display());
    }
    Ok(())
}

fn apply_overrides(config: &mut CalibrationConfig, args: &CommonArgs) {
    if let Some(iterations) = args.iterations {
        config.swarm.iterations = iterations;
    }
    if let Some(size) = args.swarm_size {
        config.swarm.num_particles = size;
    }
    if args.seed.is_some() {
        config.swarm.seed = args.seed;
    }
    if let Some(executable) = &args.executable {
        config.simulation.executable = executable.clone();
    }
    if let Some(start) = args.start {
        config.simulation.start_time = start;
    }
    if let Some(end) = args.end {
        config.simulation.end_time = end;
    }
    if let Some(result_file) = &args.result_file {
        config.simulation.result_file = result_file.clone();
    }
    if let Some(record_path) = &args.record_path {
        config.simulation.record_dir = Some(record_path.clone());
    }
    config.simulation.extra_args.extend(args.sim_args.iter().cloned());
    if args.debug_default {
        config.debug_default();
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Logs go to stderr; stdout carries the fitness for cluster workers.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
