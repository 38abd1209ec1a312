//! Cluster oracle: fan out one job per particle, fan in at the generation
//! barrier.
//!
//! Each submitted job gets a watcher future that polls for its result file
//! on the [`SwarmRuntime`] clock. All watchers are joined before the
//! generation's scores are returned, so the swarm's Move phase never overlaps
//! an outstanding job. A watcher resolves to a failed job (scored `+inf`)
//! when the job timeout elapses or the [`CancelToken`] fires. Result,
//! scheduler and record files are removed once every watcher has finished.
//!
//! Workers run concurrently, so each submission can be given its own record
//! directory (`--record-path <root>/<pid>-<n>`) instead of a shared result
//! file.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use swarm_calib_core::traits::FitnessOracle;
use swarm_calib_runtime::tokio_runtime::TokioRuntime;
use swarm_calib_runtime::SwarmRuntime;
use tracing::{debug, info, warn};

use crate::command::{format_parameter_args, RECORD_PATH_FLAG};
use crate::traits::{parse_fitness_artifact, FitnessJob, JobFailure, JobId, JobQueue, JobStatus};
use crate::{Error, Result};

/// Default delay between result checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Default per-generation wait before outstanding jobs are failed.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(4 * 60 * 60);
/// Flag placed before the `name=value,...` argument of each submission.
pub const PARAMS_FLAG: &str = "--params";

/// Shared flag that fails every outstanding job at the next poll.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Evaluates a generation as one batch of cluster jobs.
pub struct DistributedOracle<Q, R = TokioRuntime> {
    queue: Q,
    clock: R,
    names: Vec<String>,
    worker_args: Vec<String>,
    poll_interval: Duration,
    job_timeout: Option<Duration>,
    cancel: CancelToken,
    record_root: Option<PathBuf>,
    submitted: AtomicU64,
    /// Built on first blocking use; async callers never need one.
    executor: Option<tokio::runtime::Runtime>,
}

impl<Q: JobQueue> DistributedOracle<Q, TokioRuntime> {
    /// Oracle submitting to `queue`, passing parameters in `names` order.
    pub fn new(queue: Q, names: Vec<String>) -> Self {
        Self::with_clock(queue, names, TokioRuntime::new())
    }
}

impl<Q: JobQueue, R: SwarmRuntime> DistributedOracle<Q, R> {
    /// Oracle polling on `clock` instead of the Tokio timer.
    pub fn with_clock(queue: Q, names: Vec<String>, clock: R) -> Self {
        Self {
            queue,
            clock,
            names,
            worker_args: Vec::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            job_timeout: Some(DEFAULT_JOB_TIMEOUT),
            cancel: CancelToken::new(),
            record_root: None,
            submitted: AtomicU64::new(0),
            executor: None,
        }
    }

    /// Arguments placed before `--params <name=value,...>` in every submission.
    pub fn with_worker_args(mut self, args: Vec<String>) -> Self {
        self.worker_args = args;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// `None` waits forever for every job.
    pub fn with_job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Give every submission a private record directory under `root`.
    pub fn with_record_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.record_root = Some(root.into());
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Arguments submitted for one position.
    pub fn submission_args(&self, position: &[f64], record_dir: Option<&Path>) -> Vec<String> {
        let mut args = self.worker_args.clone();
        if let Some(dir) = record_dir {
            args.push(RECORD_PATH_FLAG.to_string());
            args.push(dir.display().to_string());
        }
        args.push(PARAMS_FLAG.to_string());
        args.push(format_parameter_args(&self.names, position));
        args
    }

    fn next_record_dir(&self) -> Option<PathBuf> {
        self.record_root.as_ref().map(|root| {
            let n = self.submitted.fetch_add(1, Ordering::SeqCst);
            root.join(format!("{}-{n}", std::process::id()))
        })
    }

    /// Submit, wait for and clean up one generation's jobs.
    ///
    /// Scores come back in `positions` order. A submission failure aborts
    /// the generation with the first error, after removing the files of the
    /// jobs that were accepted; every other failure is a `+inf` score.
    pub async fn run_generation(&self, positions: &[&[f64]]) -> Result<Vec<f64>> {
        let record_dirs: Vec<Option<PathBuf>> =
            positions.iter().map(|_| self.next_record_dir()).collect();
        let submissions = positions.iter().zip(&record_dirs).map(|(position, dir)| {
            let args = self.submission_args(position, dir.as_deref());
            async move { self.queue.submit(&args).await }
        });

        let mut jobs = Vec::with_capacity(positions.len());
        let mut first_error = None;
        for (particle, submitted) in join_all(submissions).await.into_iter().enumerate() {
            match submitted {
                Ok(id) => jobs.push(FitnessJob::new(id, particle)),
                Err(e) => {
                    warn!(particle, error = %e, "job submission failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            self.cleanup(&jobs, &record_dirs);
            return Err(e);
        }
        info!(jobs = jobs.len(), "generation submitted");

        let deadline = self
            .job_timeout
            .map(|t| self.clock.now().saturating_add(t.as_millis() as u64));
        let statuses = join_all(jobs.iter().map(|job| self.watch(job.id, deadline))).await;

        for (job, status) in jobs.iter_mut().zip(statuses) {
            job.status = status;
            match status {
                JobStatus::Failed(reason) => {
                    warn!(job_id = %job.id, particle = job.particle, %reason, "job failed, scoring +inf")
                }
                _ => debug!(
                    job_id = %job.id,
                    particle = job.particle,
                    fitness = status.fitness(),
                    "job complete"
                ),
            }
        }

        self.cleanup(&jobs, &record_dirs);
        Ok(jobs.iter().map(|job| job.status.fitness()).collect())
    }

    /// Resolve one job by polling for its result file.
    async fn watch(&self, id: JobId, deadline: Option<u64>) -> JobStatus {
        let path = self.queue.result_path(id);
        let mut unterminated: Option<String> = None;
        loop {
            if self.cancel.is_cancelled() {
                return JobStatus::Failed(JobFailure::Cancelled);
            }
            match fs::read_to_string(&path) {
                Ok(raw) if artifact_settled(&raw, unterminated.as_deref()) => {
                    match parse_fitness_artifact(&raw) {
                        JobStatus::Pending => {}
                        resolved => return resolved,
                    }
                }
                Ok(raw) => unterminated = Some(raw),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => debug!(job_id = %id, error = %e, "result not readable yet"),
            }
            if deadline.is_some_and(|d| self.clock.now() >= d) {
                return JobStatus::Failed(JobFailure::TimedOut);
            }
            self.clock.sleep(self.poll_interval).await;
        }
    }

    /// Remove every job's result and scheduler files and the generation's
    /// record directories.
    fn cleanup(&self, jobs: &[FitnessJob], record_dirs: &[Option<PathBuf>]) {
        for job in jobs {
            remove_if_present(&self.queue.result_path(job.id));
            for path in self.queue.scratch_paths(job.id) {
                remove_if_present(&path);
            }
        }
        for dir in record_dirs.iter().flatten() {
            match fs::remove_dir_all(dir) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = %dir.display(), error = %e, "failed to remove record directory"),
            }
        }
    }
}

/// A result is complete once its line is terminated, or when it has not
/// changed since the previous poll.
fn artifact_settled(raw: &str, previous: Option<&str>) -> bool {
    raw.ends_with('\n') || previous == Some(raw)
}

fn remove_if_present(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove job artifact"),
    }
}

/// Blocking entry point for the synchronous swarm loop.
///
/// Drives the fan-in on a private current-thread runtime, so it must not be
/// called from inside a Tokio runtime; async callers use
/// [`DistributedOracle::run_generation`] and get an error here.
impl<Q: JobQueue, R: SwarmRuntime> FitnessOracle for DistributedOracle<Q, R> {
    fn evaluate(&mut self, position: &[f64]) -> swarm_calib_core::Result<f64> {
        let scores = self.evaluate_generation(&[position])?;
        Ok(scores.first().copied().unwrap_or(f64::INFINITY))
    }

    fn evaluate_generation(&mut self, positions: &[&[f64]]) -> swarm_calib_core::Result<Vec<f64>> {
        for position in positions {
            if position.len() != self.names.len() {
                return Err(swarm_calib_core::Error::DimensionMismatch {
                    expected: self.names.len(),
                    actual: position.len(),
                });
            }
        }
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(Error::Runtime(
                "blocking evaluation inside an async runtime; await `run_generation` instead"
                    .to_string(),
            )
            .into());
        }
        if self.executor.is_none() {
            let executor = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| Error::Runtime(e.to_string()))?;
            self.executor = Some(executor);
        }
        let Some(executor) = &self.executor else {
            return Err(Error::Runtime("executor unavailable".to_string()).into());
        };
        Ok(executor.block_on(self.run_generation(positions))?)
    }
}
