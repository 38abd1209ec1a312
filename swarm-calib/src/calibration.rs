//! Calibration driver: wires a validated configuration, an oracle, the swarm
//! and the run artifact bundle together.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use swarm_calib_core::observe::{BestRecord, RunId};
use swarm_calib_core::series::{parse_observed, ObservedSeries};
use swarm_calib_core::swarm::{Swarm, SwarmOutcome};
use swarm_calib_core::traits::FitnessOracle;
use swarm_calib_oracle::command::parse_parameter_args;
use swarm_calib_oracle::{DistributedOracle, LocalOracle, QsubQueue};
use tracing::{info, warn};

use crate::artifacts::{RunArtifactBundle, RunArtifactSink};
use crate::config::{CalibrationConfig, CalibrationPlan};
use crate::Result;

const RECORD_SCHEMA_VERSION: u32 = 1;

/// Which oracle strategy a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleMode {
    Local,
    Distributed,
    Sphere,
}

impl OracleMode {
    pub fn as_str(self) -> &'static str {
        match self {
            OracleMode::Local => "local",
            OracleMode::Distributed => "distributed",
            OracleMode::Sphere => "sphere",
        }
    }
}

impl fmt::Display for OracleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a finished calibration.
#[derive(Debug, Clone)]
pub struct CalibrationReport {
    pub run_id: RunId,
    pub names: Vec<String>,
    pub outcome: SwarmOutcome,
    /// Bundle directory, when artifacts were written
    pub run_dir: Option<PathBuf>,
}

impl CalibrationReport {
    /// `name=value` pairs of the best position.
    pub fn best_parameters(&self) -> Vec<(String, f64)> {
        self.names
            .iter()
            .cloned()
            .zip(self.outcome.best_position.iter().copied())
            .collect()
    }
}

/// A validated calibration ready to run against any oracle.
#[derive(Debug, Clone)]
pub struct Calibration {
    config: CalibrationConfig,
    plan: CalibrationPlan,
    runs_dir: Option<PathBuf>,
}

impl Calibration {
    /// Validate `config`; nothing is executed yet.
    pub fn new(config: CalibrationConfig) -> Result<Self> {
        let plan = config.validate()?;
        Ok(Self {
            config,
            plan,
            runs_dir: None,
        })
    }

    /// Write a run bundle under `<dir>/runs/<run_id>/`.
    pub fn with_runs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runs_dir = Some(dir.into());
        self
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub fn plan(&self) -> &CalibrationPlan {
        &self.plan
    }

    /// Read and transform an observed-data file.
    pub fn load_observed(&self, path: impl AsRef<Path>) -> Result<ObservedSeries> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let observed = parse_observed(&raw, self.config.transform);
        if observed.is_empty() {
            warn!(path = %path.display(), "observed data has no usable records; every fitness will be +inf");
        }
        Ok(observed)
    }

    /// Sequential oracle scoring against `observed`.
    pub fn local_oracle(&self, observed: ObservedSeries) -> LocalOracle {
        LocalOracle::new(self.config.oracle_command(), observed, self.config.result_path())
    }

    /// Cluster oracle built from the `distributed` section.
    pub fn distributed_oracle(&self) -> Result<DistributedOracle<QsubQueue>> {
        let section = &self.config.distributed;
        let oracle = DistributedOracle::new(section.queue()?, self.config.names())
            .with_worker_args(section.worker_args.clone())
            .with_poll_interval(section.poll_interval())
            .with_job_timeout(section.job_timeout());
        Ok(match &section.record_root {
            Some(root) => oracle.with_record_root(root),
            None => oracle,
        })
    }

    /// Evaluate a single `name=value,...` parameter string with the local
    /// strategy, as a cluster worker does.
    pub fn evaluate_once(&self, observed: ObservedSeries, params: &str) -> Result<f64> {
        let position = parse_parameter_args(&self.config.names(), params)?;
        let mut oracle = self.local_oracle(observed);
        Ok(oracle.evaluate(&position)?)
    }

    /// Run the full iteration budget against `oracle`.
    pub fn run<O: FitnessOracle + ?Sized>(
        &self,
        mode: OracleMode,
        oracle: &mut O,
    ) -> Result<CalibrationReport> {
        let run_id = RunId::generate();
        let sink = match &self.runs_dir {
            Some(base) => Some(RunArtifactSink::new(RunArtifactBundle::create(
                base,
                run_id,
                mode.as_str(),
                &self.config,
            )?)),
            None => None,
        };

        info!(
            %run_id,
            %mode,
            particles = self.plan.swarm.num_particles,
            iterations = self.plan.swarm.iterations,
            dimensions = self.plan.space.len(),
            "calibration started"
        );

        let mut swarm = Swarm::new(self.plan.space.clone(), self.plan.swarm.clone())?;
        for _ in 0..self.plan.swarm.iterations {
            let record = swarm.step(oracle)?;
            if let Some(sink) = &sink {
                sink.append_generation(&record)?;
            }
        }
        let outcome = swarm.outcome();
        let names = self.plan.space.names();

        info!(
            %run_id,
            best_fitness = outcome.best_fitness,
            best = ?outcome.best_position,
            generations = outcome.generations,
            "calibration finished"
        );

        let run_dir = match &sink {
            Some(sink) => {
                sink.write_best(&BestRecord {
                    schema_version: RECORD_SCHEMA_VERSION,
                    run_id,
                    generations: outcome.generations,
                    names: names.clone(),
                    position: outcome.best_position.clone(),
                    fitness: outcome.best_fitness,
                })?;
                sink.finalize_manifest()?;
                Some(sink.bundle().run_dir().to_path_buf())
            }
            None => None,
        };

        Ok(CalibrationReport {
            run_id,
            names,
            outcome,
            run_dir,
        })
    }
}
