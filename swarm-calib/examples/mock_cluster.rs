//! Mock Cluster Example
//!
//! Runs a small calibration through the distributed fan-in, with a mock job
//! queue standing in for the scheduler and the sphere function for the
//! simulator.

use std::time::Duration;

use swarm_calib::core::space::sphere_parameters;
use swarm_calib::oracle::{sphere, MockJobQueue};
use swarm_calib::prelude::*;
use swarm_calib::DistributedOracle;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("SwarmCalib Mock Cluster Example");
    println!("===============================");

    let config = CalibrationConfig::builder()
        .parameters(sphere_parameters(3))
        .swarm_size(8)
        .iterations(25)
        .seed(7)
        .build()?;

    let scratch = std::env::temp_dir().join(format!("swarm_calib_mock_{}", std::process::id()));
    std::fs::create_dir_all(&scratch)?;

    let queue = MockJobQueue::new(&scratch, config.names(), sphere);
    let mut oracle = DistributedOracle::new(queue, config.names())
        .with_poll_interval(Duration::from_millis(5))
        .with_job_timeout(Some(Duration::from_secs(5)));

    let calibration = Calibration::new(config)?.with_runs_dir(&scratch);
    let report = calibration.run(OracleMode::Distributed, &mut oracle)?;

    println!("\nJobs submitted: {}", oracle.queue().submissions().len());
    for (name, value) in report.best_parameters() {
        println!("  {name} = {value:.4}");
    }
    println!("Best fitness: {:.6}", report.outcome.best_fitness);
    if let Some(dir) = &report.run_dir {
        println!("Run bundle: {}", dir.display());
    }

    Ok(())
}
