//! Calibration configuration.
//!
//! One immutable [`CalibrationConfig`] value describes a whole run. It is
//! loaded from JSON (every section optional), adjusted by command-line
//! overrides, then checked once by [`CalibrationConfig::validate`] before any
//! simulator is started.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use swarm_calib_core::algorithms::{InitMode, ParticleSwarmConfig};
use swarm_calib_core::series::{ClockTime, DataTransform};
use swarm_calib_core::space::{idm_mobil_parameters, ParameterSpace, ParameterSpec};
use swarm_calib_oracle::command::{OracleCommand, DEFAULT_TIME_STEP};
use swarm_calib_oracle::queue::{QsubQueue, DEFAULT_RESULTS_DIR, DEFAULT_RESULT_PREFIX};

use crate::{Error, Result};

/// Full run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Calibrated parameters, in simulator argument order
    pub parameters: Vec<ParameterSpec>,
    pub swarm: ParticleSwarmConfig,
    pub simulation: SimulationConfig,
    /// Conversion from raw sensor values to simulator units
    pub transform: DataTransform,
    pub distributed: DistributedConfig,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            parameters: idm_mobil_parameters(),
            swarm: ParticleSwarmConfig::default(),
            simulation: SimulationConfig::default(),
            transform: DataTransform::default(),
            distributed: DistributedConfig::default(),
        }
    }
}

/// How to run the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub executable: PathBuf,
    /// Wall-clock time of simulation second zero
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    /// Integration step in seconds
    pub time_step: f64,
    /// Options forwarded verbatim (map, car/control scripts, truck share...)
    pub extra_args: Vec<String>,
    /// File the simulator records its `(time, value)` series to
    pub result_file: PathBuf,
    /// Private directory passed as `--record-path`; when set the result
    /// file is read from inside it
    pub record_dir: Option<PathBuf>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("../../disim"),
            start_time: ClockTime::MIDNIGHT,
            end_time: ClockTime::from_hms(24, 0, 0),
            time_step: DEFAULT_TIME_STEP,
            extra_args: Vec::new(),
            result_file: PathBuf::from("logs/result.txt"),
            record_dir: None,
        }
    }
}

/// How to reach the cluster job queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributedConfig {
    /// Submission program and its fixed arguments
    pub submit_command: Vec<String>,
    /// Worker arguments placed before `--params` in every submission
    pub worker_args: Vec<String>,
    pub results_dir: PathBuf,
    pub result_prefix: String,
    pub poll_interval_ms: u64,
    /// `None` waits forever for a job's result
    pub job_timeout_secs: Option<u64>,
    /// Parent of the per-job record directories handed to workers
    pub record_root: Option<PathBuf>,
}

impl Default for DistributedConfig {
    fn default() -> Self {
        Self {
            submit_command: vec!["qsub".to_string(), "swarm_calib_fitness.sh".to_string()],
            worker_args: Vec::new(),
            results_dir: PathBuf::from(DEFAULT_RESULTS_DIR),
            result_prefix: DEFAULT_RESULT_PREFIX.to_string(),
            poll_interval_ms: 1000,
            job_timeout_secs: Some(4 * 60 * 60),
            record_root: Some(PathBuf::from("logs/records")),
        }
    }
}

impl DistributedConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_secs.map(Duration::from_secs)
    }

    /// Job queue described by this section.
    pub fn queue(&self) -> Result<QsubQueue> {
        Ok(QsubQueue::new(&self.submit_command)?
            .with_results(&self.results_dir, self.result_prefix.clone()))
    }
}

/// A configuration that passed validation.
#[derive(Debug, Clone)]
pub struct CalibrationPlan {
    pub space: ParameterSpace,
    pub swarm: ParticleSwarmConfig,
    pub start: ClockTime,
    pub end: ClockTime,
}

impl CalibrationConfig {
    /// Create a new builder
    pub fn builder() -> CalibrationConfigBuilder {
        CalibrationConfigBuilder::new()
    }

    /// Read a JSON configuration file.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check everything that can be checked without running the simulator.
    pub fn validate(&self) -> Result<CalibrationPlan> {
        let space = ParameterSpace::new(&self.parameters, self.swarm.vmax_factor)?;
        if self.swarm.num_particles == 0 {
            return Err(swarm_calib_core::Error::EmptySwarm.into());
        }
        let (start, end) = (self.simulation.start_time, self.simulation.end_time);
        if end <= start {
            return Err(swarm_calib_core::Error::InvalidTime(format!(
                "end time {end} is not after start time {start}"
            ))
            .into());
        }
        if !(self.simulation.time_step > 0.0 && self.simulation.time_step.is_finite()) {
            return Err(invalid(format!(
                "time step must be positive, got {}",
                self.simulation.time_step
            )));
        }
        if self.distributed.poll_interval_ms == 0 {
            return Err(invalid("poll interval must be non-zero"));
        }
        Ok(CalibrationPlan {
            space,
            swarm: self.swarm.clone(),
            start,
            end,
        })
    }

    /// Parameter names in simulator argument order.
    pub fn names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    /// Simulator invocation for this configuration.
    pub fn oracle_command(&self) -> OracleCommand {
        let command = OracleCommand::new(&self.simulation.executable, self.names())
            .with_window(self.simulation.start_time, self.simulation.end_time)
            .with_time_step(self.simulation.time_step)
            .with_extra_args(self.simulation.extra_args.clone());
        match &self.simulation.record_dir {
            Some(dir) => command.with_record_dir(dir),
            None => command,
        }
    }

    /// Where the simulator's series is read from.
    pub fn result_path(&self) -> PathBuf {
        let result_file = &self.simulation.result_file;
        match (&self.simulation.record_dir, result_file.file_name()) {
            (Some(dir), Some(name)) => dir.join(name),
            _ => result_file.clone(),
        }
    }

    /// Pin every particle to the default vector for a single one-generation run.
    pub fn debug_default(&mut self) {
        self.swarm.num_particles = 1;
        self.swarm.iterations = 1;
        self.swarm.init = InitMode::Default;
    }
}

fn invalid(msg: impl Into<String>) -> Error {
    swarm_calib_core::Error::InvalidConfig(msg.into()).into()
}

/// Builder for [`CalibrationConfig`]
#[derive(Debug, Default)]
pub struct CalibrationConfigBuilder {
    config: CalibrationConfig,
}

impl CalibrationConfigBuilder {
    /// Create a new builder starting from the defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the parameter table
    pub fn parameters(mut self, parameters: Vec<ParameterSpec>) -> Self {
        self.config.parameters = parameters;
        self
    }

    /// Set the number of particles
    pub fn swarm_size(mut self, size: usize) -> Self {
        self.config.swarm.num_particles = size;
        self
    }

    /// Set the number of generations
    pub fn iterations(mut self, iterations: usize) -> Self {
        self.config.swarm.iterations = iterations;
        self
    }

    /// Fix the random seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.swarm.seed = Some(seed);
        self
    }

    /// Set the particle placement at start-up
    pub fn init(mut self, init: InitMode) -> Self {
        self.config.swarm.init = init;
        self
    }

    /// Set the simulator executable
    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.simulation.executable = path.into();
        self
    }

    /// Set the simulated wall-clock window
    pub fn window(mut self, start: ClockTime, end: ClockTime) -> Self {
        self.config.simulation.start_time = start;
        self.config.simulation.end_time = end;
        self
    }

    /// Set the simulator's result file
    pub fn result_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.simulation.result_file = path.into();
        self
    }

    /// Record into a private directory (`--record-path`)
    pub fn record_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.simulation.record_dir = Some(dir.into());
        self
    }

    /// Set pass-through simulator options
    pub fn extra_args(mut self, args: Vec<String>) -> Self {
        self.config.simulation.extra_args = args;
        self
    }

    /// Set the observed-data transform
    pub fn transform(mut self, transform: DataTransform) -> Self {
        self.config.transform = transform;
        self
    }

    /// Set the job queue submission command
    pub fn submit_command(mut self, command: Vec<String>) -> Self {
        self.config.distributed.submit_command = command;
        self
    }

    /// Set the per-job timeout (`None` waits forever)
    pub fn job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.distributed.job_timeout_secs = timeout.map(|t| t.as_secs());
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<CalibrationConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
