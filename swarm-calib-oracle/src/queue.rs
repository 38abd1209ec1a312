//! qsub-style job queue.
//!
//! Submission runs `<program> <script> <worker args...>` and reads the job id
//! from the first run of digits the program prints. The worker is expected to
//! write its scalar fitness to `<results_dir>/<prefix><id>.out`; the scheduler
//! leaves `<script>.o<id>` and `<script>.e<id>` in the working directory.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::traits::{JobId, JobQueue};
use crate::{Error, Result};

/// Default results directory, relative to the working directory.
pub const DEFAULT_RESULTS_DIR: &str = "logs";
/// Default result file prefix.
pub const DEFAULT_RESULT_PREFIX: &str = "job";

/// Pull the job id out of a submission program's stdout.
pub fn extract_job_id(stdout: &str) -> Result<JobId> {
    let digits: String = stdout
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits
        .parse::<u64>()
        .map(JobId)
        .map_err(|_| Error::MissingJobId(stdout.trim().to_string()))
}

/// Submits workers through an external batch scheduler.
#[derive(Debug, Clone)]
pub struct QsubQueue {
    program: String,
    base_args: Vec<String>,
    results_dir: PathBuf,
    result_prefix: String,
    scratch_dir: PathBuf,
}

impl QsubQueue {
    /// `command` is the submission program followed by its fixed arguments,
    /// typically `["qsub", "fitness_job.sh"]`.
    pub fn new(command: &[String]) -> Result<Self> {
        let (program, base_args) = command
            .split_first()
            .ok_or_else(|| Error::Submit("empty submit command".to_string()))?;
        Ok(Self {
            program: program.clone(),
            base_args: base_args.to_vec(),
            results_dir: PathBuf::from(DEFAULT_RESULTS_DIR),
            result_prefix: DEFAULT_RESULT_PREFIX.to_string(),
            scratch_dir: PathBuf::from("."),
        })
    }

    pub fn with_results(mut self, dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        self.results_dir = dir.into();
        self.result_prefix = prefix.into();
        self
    }

    /// Directory the scheduler writes its `.o`/`.e` files to.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Job name the scheduler derives from the submitted script.
    fn job_name(&self) -> Option<String> {
        let script = self.base_args.last()?;
        Path::new(script)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    }
}

#[async_trait::async_trait]
impl JobQueue for QsubQueue {
    async fn submit(&self, args: &[String]) -> Result<JobId> {
        let output = Command::new(&self.program)
            .args(&self.base_args)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| Error::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(Error::Submit(format!(
                "`{}` exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let id = extract_job_id(&stdout)?;
        debug!(job_id = %id, "job submitted");
        Ok(id)
    }

    fn result_path(&self, id: JobId) -> PathBuf {
        self.results_dir
            .join(format!("{}{}.out", self.result_prefix, id))
    }

    fn scratch_paths(&self, id: JobId) -> Vec<PathBuf> {
        match self.job_name() {
            Some(name) => vec![
                self.scratch_dir.join(format!("{name}.o{id}")),
                self.scratch_dir.join(format!("{name}.e{id}")),
            ],
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn job_id_is_first_digit_run() {
        assert_eq!(
            extract_job_id("Your job 4821 (\"fitness.sh\") has been submitted").unwrap(),
            JobId(4821)
        );
        assert_eq!(extract_job_id("12345.headnode\n").unwrap(), JobId(12345));
        assert!(matches!(
            extract_job_id("queue full"),
            Err(Error::MissingJobId(_))
        ));
    }

    #[test]
    fn naming_conventions() {
        let queue = QsubQueue::new(&strings(&["qsub", "scripts/fitness_job.sh"]))
            .unwrap()
            .with_scratch_dir("/work");
        assert_eq!(queue.result_path(JobId(7)), PathBuf::from("logs/job7.out"));
        assert_eq!(
            queue.scratch_paths(JobId(7)),
            vec![
                PathBuf::from("/work/fitness_job.sh.o7"),
                PathBuf::from("/work/fitness_job.sh.e7"),
            ]
        );

        let bare = QsubQueue::new(&strings(&["submit"]))
            .unwrap()
            .with_results("out", "r");
        assert_eq!(bare.result_path(JobId(3)), PathBuf::from("out/r3.out"));
        assert!(bare.scratch_paths(JobId(3)).is_empty());
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(matches!(QsubQueue::new(&[]), Err(Error::Submit(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn submit_runs_program_and_parses_id() {
        let queue = QsubQueue::new(&strings(&["sh", "-c", "echo \"job $0 $1 queued as 99\""])).unwrap();
        let id = queue.submit(&strings(&["x", "y"])).await.unwrap();
        assert_eq!(id, JobId(99));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_submission_is_an_error() {
        let queue = QsubQueue::new(&strings(&["sh", "-c", "echo nope >&2; exit 3"])).unwrap();
        assert!(matches!(queue.submit(&[]).await, Err(Error::Submit(_))));
    }
}
