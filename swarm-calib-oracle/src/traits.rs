//! Job queue abstraction for the distributed oracle
//!
//! A [`JobQueue`] starts one fitness worker per submission and names the file
//! the worker's scalar result will appear in. Completion is observed by the
//! oracle, not reported by the queue.

use core::fmt;
use std::path::PathBuf;

use swarm_calib_core::traits::sanitize_fitness;

use crate::Result;

/// Identifier assigned by the job queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cluster job queue seam.
#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    /// Submit one worker with `args` appended to the queue's own arguments.
    async fn submit(&self, args: &[String]) -> Result<JobId>;

    /// File holding the worker's scalar fitness once the job finishes.
    fn result_path(&self, id: JobId) -> PathBuf;

    /// Other per-job files to delete with the result (scheduler logs).
    fn scratch_paths(&self, _id: JobId) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// Why a job produced no fitness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobFailure {
    /// The result did not appear before the job timeout
    TimedOut,
    /// The fan-in was cancelled while the job was outstanding
    Cancelled,
    /// The result file exists but does not hold a number
    MalformedArtifact,
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobFailure::TimedOut => write!(f, "timed out"),
            JobFailure::Cancelled => write!(f, "cancelled"),
            JobFailure::MalformedArtifact => write!(f, "malformed result artifact"),
        }
    }
}

/// Resolution state of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JobStatus {
    Pending,
    Complete(f64),
    Failed(JobFailure),
}

impl JobStatus {
    /// Fitness to hand to the swarm; anything but a completed job is `+inf`.
    pub fn fitness(&self) -> f64 {
        match self {
            JobStatus::Complete(f) => sanitize_fitness(*f),
            JobStatus::Pending | JobStatus::Failed(_) => f64::INFINITY,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

/// One particle's evaluation within a single generation.
#[derive(Debug, Clone, PartialEq)]
pub struct FitnessJob {
    pub id: JobId,
    /// Index of the particle in the generation's batch
    pub particle: usize,
    pub status: JobStatus,
}

impl FitnessJob {
    pub fn new(id: JobId, particle: usize) -> Self {
        Self {
            id,
            particle,
            status: JobStatus::Pending,
        }
    }
}

/// Interpret a worker's result file contents.
///
/// An empty file is still being written. Otherwise the first whitespace
/// separated token must be a float (`inf` included).
pub fn parse_fitness_artifact(raw: &str) -> JobStatus {
    match raw.split_whitespace().next() {
        None => JobStatus::Pending,
        Some(token) => match token.parse::<f64>() {
            Ok(f) => JobStatus::Complete(f),
            Err(_) => JobStatus::Failed(JobFailure::MalformedArtifact),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_completed_jobs_have_finite_fitness() {
        assert_eq!(JobStatus::Complete(2.5).fitness(), 2.5);
        assert_eq!(JobStatus::Complete(f64::NAN).fitness(), f64::INFINITY);
        assert_eq!(JobStatus::Pending.fitness(), f64::INFINITY);
        assert_eq!(
            JobStatus::Failed(JobFailure::TimedOut).fitness(),
            f64::INFINITY
        );
        assert!(!JobStatus::Pending.is_resolved());
        assert!(JobStatus::Failed(JobFailure::Cancelled).is_resolved());
    }

    #[test]
    fn artifact_parsing() {
        assert_eq!(parse_fitness_artifact(""), JobStatus::Pending);
        assert_eq!(parse_fitness_artifact("  \n"), JobStatus::Pending);
        assert_eq!(parse_fitness_artifact("12.5\n"), JobStatus::Complete(12.5));
        assert_eq!(
            parse_fitness_artifact("inf\n"),
            JobStatus::Complete(f64::INFINITY)
        );
        assert_eq!(
            parse_fitness_artifact("Traceback\n"),
            JobStatus::Failed(JobFailure::MalformedArtifact)
        );
    }
}
