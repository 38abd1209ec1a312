//! Simulator command-line contract.
//!
//! ```text
//! <executable> <extra args...> [--record-path=<dir>] --time-step=<dt> \
//!     --start-time=<HH:MM> --duration=<secs> --record --nogui \
//!     --lua-args=<name=value,...>
//! ```
//!
//! The process is executed directly (no shell), so the `--lua-args` value is
//! passed without surrounding quotes.

use std::path::{Path, PathBuf};
use std::process::Command;

use swarm_calib_core::series::ClockTime;

use crate::{Error, Result};

/// Default simulator integration step in seconds.
pub const DEFAULT_TIME_STEP: f64 = 0.5;

/// Prefix of the parameter argument.
pub const LUA_ARGS_FLAG: &str = "--lua-args=";

/// Directory the simulator writes its recorded series into.
pub const RECORD_PATH_FLAG: &str = "--record-path";

/// Everything needed to build one simulator invocation except the position.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleCommand {
    executable: PathBuf,
    extra_args: Vec<String>,
    start: ClockTime,
    end: ClockTime,
    time_step: f64,
    record_dir: Option<PathBuf>,
    names: Vec<String>,
}

impl OracleCommand {
    /// Command for `executable` passing parameters in `names` order.
    pub fn new(executable: impl Into<PathBuf>, names: Vec<String>) -> Self {
        Self {
            executable: executable.into(),
            extra_args: Vec::new(),
            start: ClockTime::MIDNIGHT,
            end: ClockTime::MIDNIGHT,
            time_step: DEFAULT_TIME_STEP,
            record_dir: None,
            names,
        }
    }

    /// Simulated wall-clock window.
    pub fn with_window(mut self, start: ClockTime, end: ClockTime) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn with_time_step(mut self, time_step: f64) -> Self {
        self.time_step = time_step;
        self
    }

    /// Options forwarded verbatim ahead of the run flags (map, scripts, ...).
    pub fn with_extra_args(mut self, extra_args: Vec<String>) -> Self {
        self.extra_args = extra_args;
        self
    }

    /// Private recording directory for this run.
    pub fn with_record_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.record_dir = Some(dir.into());
        self
    }

    pub fn record_dir(&self) -> Option<&Path> {
        self.record_dir.as_deref()
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn start(&self) -> ClockTime {
        self.start
    }

    /// Whole seconds from start to end (zero if the window is inverted).
    pub fn duration_secs(&self) -> u32 {
        self.end.seconds().saturating_sub(self.start.seconds())
    }

    /// `--record-path` (when set), `--time-step`, `--start-time`,
    /// `--duration`, `--record`, `--nogui`.
    pub fn run_flags(&self) -> Vec<String> {
        let mut flags = Vec::with_capacity(6);
        if let Some(dir) = &self.record_dir {
            flags.push(format!("{RECORD_PATH_FLAG}={}", dir.display()));
        }
        flags.extend([
            format!("--time-step={}", self.time_step),
            format!("--start-time={}", self.start),
            format!("--duration={}", self.duration_secs()),
            "--record".to_string(),
            "--nogui".to_string(),
        ]);
        flags
    }

    /// `--lua-args=name1=value1,...` for `position`.
    pub fn parameter_arg(&self, position: &[f64]) -> String {
        format!("{LUA_ARGS_FLAG}{}", format_parameter_args(&self.names, position))
    }

    /// Full argument list for one run.
    pub fn args(&self, position: &[f64]) -> Vec<String> {
        let mut args = self.extra_args.clone();
        args.extend(self.run_flags());
        args.push(self.parameter_arg(position));
        args
    }

    /// A ready-to-spawn process for `position`.
    pub fn to_command(&self, position: &[f64]) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.args(self.args(position));
        cmd
    }
}

/// Join `name=value` pairs with commas, in `names` order.
pub fn format_parameter_args(names: &[String], position: &[f64]) -> String {
    names
        .iter()
        .zip(position)
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Inverse of [`format_parameter_args`].
///
/// Accepts an optional `--lua-args=` prefix, surrounding double quotes and a
/// trailing comma. Every name must appear exactly once and nothing else may.
pub fn parse_parameter_args(names: &[String], raw: &str) -> Result<Vec<f64>> {
    let body = raw.trim();
    let body = body.strip_prefix(LUA_ARGS_FLAG).unwrap_or(body);
    let body = body.trim_matches('"');

    let mut values: Vec<Option<f64>> = vec![None; names.len()];
    for pair in body.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| Error::InvalidArgs(format!("`{pair}` is not name=value")))?;
        let index = names
            .iter()
            .position(|n| n == name.trim())
            .ok_or_else(|| Error::InvalidArgs(format!("unknown parameter `{}`", name.trim())))?;
        let value: f64 = value
            .trim()
            .parse()
            .map_err(|_| Error::InvalidArgs(format!("`{pair}` has a non-numeric value")))?;
        if values[index].replace(value).is_some() {
            return Err(Error::InvalidArgs(format!("parameter `{}` repeated", names[index])));
        }
    }

    names
        .iter()
        .zip(values)
        .map(|(name, v)| v.ok_or_else(|| Error::InvalidArgs(format!("missing parameter `{name}`"))))
        .collect()
}
