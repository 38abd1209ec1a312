//! Sequential oracle: one blocking simulator run per evaluation.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use swarm_calib_core::series::{parse_oracle_output, score, ObservedSeries};
use swarm_calib_core::traits::FitnessOracle;
use tracing::{debug, warn};

use crate::command::OracleCommand;
use crate::{Error, Result};

/// Runs the simulator in the foreground and scores its result file against
/// the observed series.
#[derive(Debug, Clone)]
pub struct LocalOracle {
    command: OracleCommand,
    observed: ObservedSeries,
    result_file: PathBuf,
    runs: u64,
}

impl LocalOracle {
    pub fn new(command: OracleCommand, observed: ObservedSeries, result_file: impl Into<PathBuf>) -> Self {
        Self {
            command,
            observed,
            result_file: result_file.into(),
            runs: 0,
        }
    }

    pub fn command(&self) -> &OracleCommand {
        &self.command
    }

    pub fn result_file(&self) -> &Path {
        &self.result_file
    }

    /// Number of simulator processes started so far.
    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// Run the simulator once for `position` and score the output.
    ///
    /// The previous result file is removed first, so a run that writes
    /// nothing scores `+inf` instead of reusing stale output. Concurrent
    /// oracles must not share a result file; give each its own record
    /// directory.
    pub fn run(&mut self, position: &[f64]) -> Result<f64> {
        if let Some(dir) = self.command.record_dir() {
            fs::create_dir_all(dir)?;
        }
        match fs::remove_file(&self.result_file) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(Error::Io(e)),
        }

        let status = self
            .command
            .to_command(position)
            .stdout(Stdio::null())
            .status()
            .map_err(|source| Error::Spawn {
                program: self.command.executable().display().to_string(),
                source,
            })?;
        self.runs += 1;
        if !status.success() {
            warn!(%status, "simulator exited unsuccessfully");
        }

        let raw = match fs::read_to_string(&self.result_file) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    path = %self.result_file.display(),
                    error = %e,
                    "simulator result unreadable, scoring +inf"
                );
                return Ok(f64::INFINITY);
            }
        };

        let fitness = score(&self.observed, &parse_oracle_output(&raw), self.command.start());
        if fitness.is_infinite() {
            warn!("no observed timestamp inside the simulated window, scoring +inf");
        }
        debug!(fitness, "local evaluation finished");
        Ok(fitness)
    }
}

impl FitnessOracle for LocalOracle {
    fn evaluate(&mut self, position: &[f64]) -> swarm_calib_core::Result<f64> {
        if position.len() != self.command.names().len() {
            return Err(swarm_calib_core::Error::DimensionMismatch {
                expected: self.command.names().len(),
                actual: position.len(),
            });
        }
        Ok(self.run(position)?)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::{SystemTime, UNIX_EPOCH};
    use swarm_calib_core::series::ClockTime;

    fn temp_dir(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "swarm_calib_local_{tag}_{}_{}",
            std::process::id(),
            nanos
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// A fake simulator that writes `body` to `out` and echoes its arguments.
    fn fake_simulator(dir: &Path, out: &Path, body: &str) -> PathBuf {
        let script = dir.join("sim.sh");
        fs::write(
            &script,
            format!(
                "#!/bin/sh\necho \"$@\" > {}\nprintf '{}' > {}\n",
                dir.join("argv").display(),
                body,
                out.display()
            ),
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    fn observed() -> ObservedSeries {
        [
            (ClockTime::from_hms(5, 0, 5), 15.0),
            (ClockTime::from_hms(5, 0, 10), 20.0),
        ]
        .into_iter()
        .collect()
    }

    fn command(script: &Path) -> OracleCommand {
        OracleCommand::new(script, vec!["a".to_string(), "b".to_string()])
            .with_window(ClockTime::from_hms(5, 0, 0), ClockTime::from_hms(5, 1, 0))
    }

    #[test]
    fn scores_simulator_output() {
        let dir = temp_dir("score");
        let out = dir.join("result.txt");
        let script = fake_simulator(&dir, &out, "0 10\\n10 20\\n");
        let mut oracle = LocalOracle::new(command(&script), observed(), &out);

        // t=5 interpolates to 15 (exact), t=10 hits 20 (exact).
        let f = oracle.evaluate(&[1.5, 2.0]).unwrap();
        assert_eq!(f, 0.0);
        assert_eq!(oracle.runs(), 1);

        let argv = fs::read_to_string(dir.join("argv")).unwrap();
        assert!(argv.contains("--start-time=05:00"));
        assert!(argv.contains("--duration=60"));
        assert!(argv.trim_end().ends_with("--lua-args=a=1.5,b=2"));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_output_scores_infinity_and_clears_stale_results() {
        let dir = temp_dir("stale");
        let out = dir.join("result.txt");
        fs::write(&out, "0 15\n10 20\n").unwrap();
        let script = dir.join("noop.sh");
        fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let mut oracle = LocalOracle::new(command(&script), observed(), &out);
        assert_eq!(oracle.evaluate(&[0.0, 0.0]).unwrap(), f64::INFINITY);
        assert!(!out.exists());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn disjoint_output_scores_infinity() {
        let dir = temp_dir("disjoint");
        let out = dir.join("result.txt");
        let script = fake_simulator(&dir, &out, "100 10\\n200 20\\n");
        let mut oracle = LocalOracle::new(command(&script), observed(), &out);
        assert_eq!(oracle.evaluate(&[0.0, 0.0]).unwrap(), f64::INFINITY);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_executable_is_an_error() {
        let dir = temp_dir("spawn");
        let mut oracle = LocalOracle::new(
            command(&dir.join("does-not-exist")),
            observed(),
            dir.join("result.txt"),
        );
        let err = oracle.evaluate(&[0.0, 0.0]).unwrap_err();
        assert!(matches!(err, swarm_calib_core::Error::Oracle(_)));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn wrong_dimension_is_rejected_before_running() {
        let dir = temp_dir("dims");
        let mut oracle = LocalOracle::new(
            command(&dir.join("does-not-exist")),
            observed(),
            dir.join("result.txt"),
        );
        assert!(matches!(
            oracle.evaluate(&[0.0]),
            Err(swarm_calib_core::Error::DimensionMismatch { .. })
        ));
        assert_eq!(oracle.runs(), 0);
        fs::remove_dir_all(&dir).ok();
    }
}
