//! # SwarmCalib
//!
//! Calibrates the free parameters of a traffic simulator's car-following and
//! lane-changing models against field sensor data, using particle swarm
//! optimization over a bounded, periodic parameter space.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use swarm_calib::prelude::*;
//!
//! # fn main() -> swarm_calib::Result<()> {
//! let config = CalibrationConfig::load_json("calibration.json")?;
//! let calibration = Calibration::new(config)?.with_runs_dir(".");
//! let observed = calibration.load_observed("data/Huntington_speed.txt")?;
//! let mut oracle = calibration.local_oracle(observed);
//! let report = calibration.run(OracleMode::Local, &mut oracle)?;
//! println!("best fitness {}", report.outcome.best_fitness);
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate Structure
//!
//! - [`swarm_calib_core`]: parameter space, swarm, series alignment
//! - [`swarm_calib_oracle`]: local and distributed fitness oracles
//! - [`swarm_calib_runtime`]: clock abstraction for the distributed fan-in

#![forbid(unsafe_code)]

use std::path::PathBuf;

// Re-export sub-crates
pub use swarm_calib_core as core;
pub use swarm_calib_oracle as oracle;
pub use swarm_calib_runtime as runtime;

// Re-export commonly used items at the top level
pub use swarm_calib_core::{
    algorithms::{InitMode, ParticleSwarmConfig},
    observe::{BestRecord, GenerationRecord, RunId},
    series::{ClockTime, DataTransform},
    space::{ParameterSpace, ParameterSpec},
    swarm::{Swarm, SwarmOutcome},
    traits::FitnessOracle,
};

pub use swarm_calib_oracle::{DistributedOracle, LocalOracle, QsubQueue, SphereOracle};

/// Run artifact bundle writing/validation.
pub mod artifacts;

/// Calibration driver.
pub mod calibration;

/// Calibration configuration and builder.
pub mod config;

pub use calibration::{Calibration, CalibrationReport, OracleMode};
pub use config::{CalibrationConfig, CalibrationConfigBuilder, CalibrationPlan};

/// Prelude module for convenient imports
///
/// ```rust
/// use swarm_calib::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::prelude::*;
    pub use crate::oracle::prelude::*;

    pub use crate::{Calibration, CalibrationConfig, CalibrationReport, OracleMode};
}

/// Result type for calibration runs
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the calibration facade
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration or a failed swarm step
    #[error(transparent)]
    Core(#[from] swarm_calib_core::Error),
    /// Oracle infrastructure failure
    #[error(transparent)]
    Oracle(#[from] swarm_calib_oracle::Error),
    /// A configuration file is not valid JSON for [`CalibrationConfig`]
    #[error("failed to parse config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// Reading inputs or writing run artifacts failed
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
