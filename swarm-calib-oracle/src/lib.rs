//! # SwarmCalib Oracle
//!
//! Fitness oracles that run the traffic simulator.
//!
//! This crate provides:
//! - The simulator command-line contract ([`command`])
//! - [`LocalOracle`]: one blocking simulator run per particle
//! - [`DistributedOracle`]: one cluster job per particle, joined at the
//!   generation barrier with timeout and cancellation
//! - The [`JobQueue`] seam with a qsub-style implementation and a mock
//! - [`SphereOracle`] for optimizer smoke runs without a simulator

pub mod command;
pub mod debug;
pub mod distributed;
pub mod local;
pub mod queue;
pub mod traits;

mod mock;
pub use mock::MockJobQueue;

pub use command::{format_parameter_args, parse_parameter_args, OracleCommand};
pub use debug::{sphere, SphereOracle};
pub use distributed::{CancelToken, DistributedOracle};
pub use local::LocalOracle;
pub use queue::{extract_job_id, QsubQueue};
pub use traits::{parse_fitness_artifact, FitnessJob, JobFailure, JobId, JobQueue, JobStatus};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::command::*;
    pub use crate::distributed::*;
    pub use crate::local::*;
    pub use crate::traits::*;
}

/// Result type for oracle operations
pub type Result<T> = core::result::Result<T, Error>;

/// Oracle infrastructure errors.
///
/// A simulator run that produces no usable output is not an error; it scores
/// `+inf`. These variants cover failures to run anything at all.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The simulator or submission program could not be started
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// The job queue rejected a submission
    #[error("job submission failed: {0}")]
    Submit(String),
    /// The job queue accepted a submission but printed no job id
    #[error("no job id in submission output `{0}`")]
    MissingJobId(String),
    /// Filesystem error outside of result reading
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The internal async runtime could not be built
    #[error("async runtime: {0}")]
    Runtime(String),
    /// `name=value` parameter arguments did not match the parameter names
    #[error("invalid parameter arguments: {0}")]
    InvalidArgs(String),
}

impl From<Error> for swarm_calib_core::Error {
    fn from(err: Error) -> Self {
        swarm_calib_core::Error::oracle(err)
    }
}
