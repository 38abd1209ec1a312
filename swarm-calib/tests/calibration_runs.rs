//! Facade runs: config loading, the driver and the run bundle it leaves behind.

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use swarm_calib::artifacts::RunArtifactBundle;
use swarm_calib::core::space::sphere_parameters;
use swarm_calib::prelude::*;
use swarm_calib::{Error, SphereOracle};

fn temp_dir(tag: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "swarm_calib_facade_{tag}_{}_{}",
        std::process::id(),
        nanos
    ));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn sphere_run_leaves_a_valid_bundle() {
    let base = temp_dir("bundle");
    let config = CalibrationConfig::builder()
        .parameters(sphere_parameters(4))
        .swarm_size(6)
        .iterations(12)
        .seed(11)
        .build()
        .unwrap();
    let calibration = Calibration::new(config).unwrap().with_runs_dir(&base);

    let report = calibration
        .run(OracleMode::Sphere, &mut SphereOracle::new())
        .unwrap();
    let run_dir = report.run_dir.clone().unwrap();
    assert!(run_dir.starts_with(base.join("runs")));

    let bundle = RunArtifactBundle::open(&run_dir).unwrap();
    bundle.validate_manifest().unwrap();
    assert_eq!(bundle.run_id(), report.run_id);
    assert_eq!(bundle.run_file().unwrap().mode, "sphere");

    let generations = bundle.read_generations().unwrap();
    assert_eq!(generations.len(), 12);
    assert!(generations.iter().all(|g| g.particles.len() == 6));
    for pair in generations.windows(2) {
        assert!(pair[1].global_best_fitness <= pair[0].global_best_fitness);
    }

    let best = bundle.read_best().unwrap();
    assert_eq!(best.position, report.outcome.best_position);
    assert_eq!(best.fitness, report.outcome.best_fitness);
    assert_eq!(best.names, vec!["x0", "x1", "x2", "x3"]);
    assert_eq!(
        generations.last().unwrap().global_best_fitness,
        best.fitness
    );

    fs::remove_dir_all(&base).ok();
}

#[test]
fn partial_json_config_keeps_defaults() {
    let dir = temp_dir("config");
    let path = dir.join("calibration.json");
    fs::write(
        &path,
        r#"{
            "parameters": [{"name": "v0", "default": 30.0, "lower": 25.0, "upper": 38.0}],
            "swarm": {"size": 3, "iterations": 2, "seed": 9},
            "simulation": {"start_time": "06:00", "end_time": "09:30"},
            "transform": {"kind": "per_lane", "factor": 1.609344}
        }"#,
    )
    .unwrap();

    let config = CalibrationConfig::load_json(&path).unwrap();
    assert_eq!(config.swarm.num_particles, 3);
    assert_eq!(config.swarm.seed, Some(9));
    assert_eq!(config.swarm.social, 2.0);
    assert_eq!(config.simulation.time_step, 0.5);
    assert_eq!(config.names(), vec!["v0"]);

    let plan = Calibration::new(config).unwrap().plan().clone();
    assert_eq!(plan.start.seconds_since(ClockTime::MIDNIGHT), 21_600.0);
    assert_eq!(plan.end.seconds_since(plan.start), 12_600.0);

    fs::write(&path, "{ \"swarm\": ").unwrap();
    assert!(matches!(
        CalibrationConfig::load_json(&path),
        Err(Error::ConfigParse { .. })
    ));
    fs::remove_dir_all(&dir).ok();
}

#[cfg(unix)]
#[test]
fn fitness_worker_scores_one_vector() {
    use std::os::unix::fs::PermissionsExt;

    let dir = temp_dir("worker");
    let out = dir.join("speed.txt");
    let script = dir.join("sim.sh");
    fs::write(
        &script,
        format!(
            "#!/bin/sh\nfor a in \"$@\"; do case \"$a\" in --lua-args=*) v=${{a#--lua-args=v=}};; esac; done\n\
             printf '0 %s\\n600 %s\\n' \"$v\" \"$v\" > {}\n",
            out.display()
        ),
    )
    .unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    let observed_path = dir.join("observed.txt");
    fs::write(
        &observed_path,
        "1/15/2024 06:02 20.0 3 1\n1/15/2024 06:07 20.0 3 1\n",
    )
    .unwrap();

    let config = CalibrationConfig::builder()
        .parameters(vec![ParameterSpec::new("v", 10.0, 0.0, 40.0)])
        .executable(&script)
        .result_file(&out)
        .window(ClockTime::from_hms(6, 0, 0), ClockTime::from_hms(6, 10, 0))
        .transform(DataTransform::Scale { factor: 1.0 })
        .build()
        .unwrap();
    let calibration = Calibration::new(config).unwrap();

    let observed = calibration.load_observed(&observed_path).unwrap();
    let fitness = calibration.evaluate_once(observed.clone(), "v=18").unwrap();
    assert!((fitness - 2.0).abs() < 1e-9, "{fitness}");

    assert!(calibration.evaluate_once(observed.clone(), "w=18").is_err());
    assert!(calibration.evaluate_once(observed, "").is_err());
    fs::remove_dir_all(&dir).ok();
}

#[cfg(unix)]
#[test]
fn concurrent_workers_record_into_separate_directories() {
    use std::os::unix::fs::PermissionsExt;
    use std::thread;
    use std::time::Duration;

    let dir = temp_dir("concurrent");
    // Writes its series straight away, then keeps running.
    let script = dir.join("sim.sh");
    fs::write(
        &script,
        "#!/bin/sh\nfor a in \"$@\"; do case \"$a\" in\n\
         --record-path=*) rp=${a#--record-path=};;\n\
         --lua-args=*) v=${a#--lua-args=v=};;\n\
         esac; done\n\
         printf '0 %s\\n600 %s\\n' \"$v\" \"$v\" > \"$rp/speed.txt\"\nsleep 1\n",
    )
    .unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    let observed_path = dir.join("observed.txt");
    fs::write(
        &observed_path,
        "1/15/2024 06:02 10.0 3 1\n1/15/2024 06:07 10.0 3 1\n",
    )
    .unwrap();

    let worker = |record: &str| {
        let config = CalibrationConfig::builder()
            .parameters(vec![ParameterSpec::new("v", 10.0, 0.0, 40.0)])
            .executable(&script)
            .result_file("speed.txt")
            .record_dir(dir.join(record))
            .window(ClockTime::from_hms(6, 0, 0), ClockTime::from_hms(6, 10, 0))
            .transform(DataTransform::Scale { factor: 1.0 })
            .build()
            .unwrap();
        Calibration::new(config).unwrap()
    };
    let slow = worker("job1");
    let late = worker("job2");
    let observed = slow.load_observed(&observed_path).unwrap();

    let (slow_fitness, late_fitness) = thread::scope(|scope| {
        let first = scope.spawn(|| slow.evaluate_once(observed.clone(), "v=10").unwrap());
        let second = scope.spawn(|| {
            thread::sleep(Duration::from_millis(300));
            late.evaluate_once(observed.clone(), "v=30").unwrap()
        });
        (first.join().unwrap(), second.join().unwrap())
    });

    assert_eq!(slow_fitness, 0.0);
    assert_eq!(late_fitness, 20.0);
    assert!(dir.join("job1/speed.txt").exists());
    assert!(dir.join("job2/speed.txt").exists());
    fs::remove_dir_all(&dir).ok();
}
