//! Mock job queue for testing
//!
//! Every submission completes instantly: the position is recovered from the
//! `name=value,...` argument, scored with a closure and written to the job's
//! result file together with a fake scheduler log. A `--record-path <dir>`
//! argument gets a recorded series file, as a worker's simulator would leave.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::command::{parse_parameter_args, RECORD_PATH_FLAG};
use crate::traits::{JobId, JobQueue};
use crate::{Error, Result};

type FitnessFn = Box<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// In-process job queue writing result files under a directory.
pub struct MockJobQueue {
    dir: PathBuf,
    names: Vec<String>,
    fitness: FitnessFn,
    next_id: AtomicU64,
    stalled: HashSet<u64>,
    malformed: HashSet<u64>,
    unterminated: HashSet<u64>,
    reject_from: Option<u64>,
    submissions: Mutex<Vec<Vec<String>>>,
}

impl MockJobQueue {
    /// Queue scoring each submission with `fitness`. Job ids start at 1.
    pub fn new<F>(dir: &Path, names: Vec<String>, fitness: F) -> Self
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        Self {
            dir: dir.to_path_buf(),
            names,
            fitness: Box::new(fitness),
            next_id: AtomicU64::new(1),
            stalled: HashSet::new(),
            malformed: HashSet::new(),
            unterminated: HashSet::new(),
            reject_from: None,
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// Jobs that never write a result.
    pub fn with_stalled(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.stalled.extend(ids);
        self
    }

    /// Jobs whose result file holds garbage.
    pub fn with_malformed(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.malformed.extend(ids);
        self
    }

    /// Jobs whose result lacks the trailing newline.
    pub fn with_unterminated(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.unterminated.extend(ids);
        self
    }

    /// Fail every submission.
    pub fn with_rejected_submissions(self) -> Self {
        self.with_rejected_after(0)
    }

    /// Accept the first `accepted` submissions, then fail the rest.
    pub fn with_rejected_after(mut self, accepted: u64) -> Self {
        self.reject_from = Some(accepted);
        self
    }

    /// Argument lists received so far, in submission order.
    pub fn submissions(&self) -> Vec<Vec<String>> {
        self.submissions
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Ids handed out so far.
    pub fn submitted_ids(&self) -> Vec<JobId> {
        (1..self.next_id.load(Ordering::SeqCst)).map(JobId).collect()
    }
}

#[async_trait::async_trait]
impl JobQueue for MockJobQueue {
    async fn submit(&self, args: &[String]) -> Result<JobId> {
        {
            let Ok(mut log) = self.submissions.lock() else {
                return Err(Error::Submit("mock queue log poisoned".to_string()));
            };
            if self.reject_from.is_some_and(|n| log.len() as u64 >= n) {
                return Err(Error::Submit("mock queue rejects submissions".to_string()));
            }
            log.push(args.to_vec());
        }
        let id = JobId(self.next_id.fetch_add(1, Ordering::SeqCst));

        let raw = args.last().map(String::as_str).unwrap_or_default();
        let position = parse_parameter_args(&self.names, raw)?;
        fs::write(self.dir.join(format!("mock.o{id}")), "")?;
        if let Some(i) = args.iter().position(|a| a == RECORD_PATH_FLAG) {
            if let Some(dir) = args.get(i + 1) {
                fs::create_dir_all(dir)?;
                fs::write(Path::new(dir).join("result.txt"), "0 0\n")?;
            }
        }
        if self.stalled.contains(&id.0) {
            return Ok(id);
        }
        let body = if self.malformed.contains(&id.0) {
            "Segmentation fault\n".to_string()
        } else if self.unterminated.contains(&id.0) {
            (self.fitness)(&position).to_string()
        } else {
            format!("{}\n", (self.fitness)(&position))
        };
        fs::write(self.result_path(id), body)?;
        Ok(id)
    }

    fn result_path(&self, id: JobId) -> PathBuf {
        self.dir.join(format!("job{id}.out"))
    }

    fn scratch_paths(&self, id: JobId) -> Vec<PathBuf> {
        vec![self.dir.join(format!("mock.o{id}"))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submit_writes_scored_result() {
        let dir = std::env::temp_dir().join(format!("swarm_calib_mockq_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let queue = MockJobQueue::new(&dir, vec!["x".to_string()], |p| p[0] * 2.0);

        let id = queue.submit(&["x=1.5".to_string()]).await.unwrap();
        assert_eq!(id, JobId(1));
        assert_eq!(fs::read_to_string(queue.result_path(id)).unwrap(), "3\n");
        assert_eq!(queue.submitted_ids(), vec![JobId(1)]);

        assert!(matches!(
            queue.submit(&["y=1".to_string()]).await,
            Err(Error::InvalidArgs(_))
        ));
        fs::remove_dir_all(&dir).ok();
    }
}
