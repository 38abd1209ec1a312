//! Run artifact bundle writer/validator.
//!
//! Every calibration run writes `runs/<run_id>/`:
//!
//! - `run.json`: run id, creation time, crate version, oracle mode and the
//!   configuration snapshot
//! - `generations.ndjson`: one [`GenerationRecord`] per generation
//! - `best.json`: the final [`BestRecord`]
//! - `manifest.json`: path-addressed SHA-256 digests of all the above

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use swarm_calib_core::observe::{BestRecord, GenerationRecord, RunId};

use crate::config::CalibrationConfig;

const SCHEMA_VERSION_V1: u32 = 1;
const RUN_FILE: &str = "run.json";
const GENERATIONS_FILE: &str = "generations.ndjson";
const BEST_FILE: &str = "best.json";
const MANIFEST_FILE: &str = "manifest.json";

/// Files a bundle may hold besides the manifest; `best.json` appears once a
/// run finishes.
const BUNDLE_FILES: [(&str, bool); 3] = [
    (RUN_FILE, true),
    (GENERATIONS_FILE, true),
    (BEST_FILE, false),
];

#[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
struct ManifestV1 {
    schema_version: u32,
    run_id: RunId,
    files: BTreeMap<String, FileDigest>,
}

#[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
struct FileDigest {
    sha256: String,
    bytes: u64,
}

impl FileDigest {
    fn of(path: &Path) -> io::Result<Self> {
        let bytes = fs::read(path)?;
        let sha256 = Sha256::digest(&bytes)
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        Ok(Self {
            sha256,
            bytes: bytes.len() as u64,
        })
    }
}

/// Contents of `run.json`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunFileV1 {
    pub schema_version: u32,
    pub run_id: RunId,
    pub created_unix_nanos: u64,
    pub swarm_calib_version: String,
    /// Oracle strategy (`local`, `distributed`, `sphere`)
    pub mode: String,
    pub config: CalibrationConfig,
}

/// A writer/validator for a single run artifact bundle (`runs/<run_id>/...`).
#[derive(Debug, Clone)]
pub struct RunArtifactBundle {
    run_dir: PathBuf,
    run_id: RunId,
}

/// Artifact sink shared between producers; one writer at a time.
#[derive(Debug)]
pub struct RunArtifactSink {
    bundle: RunArtifactBundle,
    lock: Mutex<()>,
}

impl RunArtifactSink {
    pub fn new(bundle: RunArtifactBundle) -> Self {
        Self {
            bundle,
            lock: Mutex::new(()),
        }
    }

    pub fn bundle(&self) -> &RunArtifactBundle {
        &self.bundle
    }

    fn guard(&self) -> io::Result<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| io::Error::other("artifact sink mutex poisoned"))
    }

    pub fn append_generation(&self, record: &GenerationRecord) -> io::Result<()> {
        let _g = self.guard()?;
        self.bundle.append_generation(record)
    }

    pub fn write_best(&self, best: &BestRecord) -> io::Result<()> {
        let _g = self.guard()?;
        self.bundle.write_best(best)
    }

    pub fn finalize_manifest(&self) -> io::Result<()> {
        let _g = self.guard()?;
        self.bundle.finalize_manifest()
    }

    pub fn validate_manifest(&self) -> io::Result<()> {
        let _g = self.guard()?;
        self.bundle.validate_manifest()
    }
}

impl RunArtifactBundle {
    /// Open an existing bundle directory (`runs/<run_id>/...`) by reading `run.json`.
    pub fn open(run_dir: impl AsRef<Path>) -> io::Result<Self> {
        let run_dir = run_dir.as_ref().to_path_buf();
        let run_file: RunFileV1 = read_json(&run_dir.join(RUN_FILE))?;
        Ok(Self {
            run_dir,
            run_id: run_file.run_id,
        })
    }

    /// Create a new bundle directory at `<base>/runs/<run_id>/`.
    pub fn create(
        base: impl AsRef<Path>,
        run_id: RunId,
        mode: &str,
        config: &CalibrationConfig,
    ) -> io::Result<Self> {
        if !run_id.is_valid() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "run_id must be non-zero",
            ));
        }

        let run_dir = base.as_ref().join("runs").join(run_id.to_string());
        if run_dir.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "run artifact bundle already exists",
            ));
        }
        fs::create_dir_all(&run_dir)?;

        let created_unix_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
            .min(u64::MAX as u128) as u64;

        let run_file = RunFileV1 {
            schema_version: SCHEMA_VERSION_V1,
            run_id,
            created_unix_nanos,
            swarm_calib_version: env!("CARGO_PKG_VERSION").to_string(),
            mode: mode.to_string(),
            config: config.clone(),
        };
        write_json(&run_dir.join(RUN_FILE), &run_file)?;
        File::create(run_dir.join(GENERATIONS_FILE))?;

        let bundle = Self { run_dir, run_id };
        // Emit an initial manifest so a bundle is valid immediately.
        bundle.finalize_manifest()?;
        Ok(bundle)
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn run_file(&self) -> io::Result<RunFileV1> {
        read_json(&self.run_dir.join(RUN_FILE))
    }

    pub fn append_generation(&self, record: &GenerationRecord) -> io::Result<()> {
        append_ndjson(&self.run_dir.join(GENERATIONS_FILE), record)
    }

    /// All generation records written so far, in order.
    pub fn read_generations(&self) -> io::Result<Vec<GenerationRecord>> {
        let file = File::open(self.run_dir.join(GENERATIONS_FILE))?;
        let mut out = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            out.push(serde_json::from_str(&line).map_err(|e| invalid_data(e.to_string()))?);
        }
        Ok(out)
    }

    pub fn write_best(&self, best: &BestRecord) -> io::Result<()> {
        write_json(&self.run_dir.join(BEST_FILE), best)
    }

    pub fn read_best(&self) -> io::Result<BestRecord> {
        read_json(&self.run_dir.join(BEST_FILE))
    }

    /// Digest the bundle's current files into `manifest.json`.
    pub fn finalize_manifest(&self) -> io::Result<()> {
        let manifest = ManifestV1 {
            schema_version: SCHEMA_VERSION_V1,
            run_id: self.run_id,
            files: self.digest_files()?,
        };
        write_json(&self.run_dir.join(MANIFEST_FILE), &manifest)
    }

    /// Check `manifest.json` against the bytes on disk.
    pub fn validate_manifest(&self) -> io::Result<()> {
        let manifest: ManifestV1 = read_json(&self.run_dir.join(MANIFEST_FILE))?;
        if manifest.schema_version != SCHEMA_VERSION_V1 {
            return Err(invalid_data("unsupported manifest schema_version"));
        }
        if manifest.run_id != self.run_id {
            return Err(invalid_data("manifest run_id mismatch"));
        }

        let current = self.digest_files()?;
        for (name, recorded) in &manifest.files {
            match current.get(name) {
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("missing file listed in manifest: {name}"),
                    ))
                }
                Some(actual) if actual != recorded => {
                    return Err(invalid_data(format!("{name} changed since the manifest")))
                }
                Some(_) => {}
            }
        }
        if let Some(name) = current.keys().find(|name| !manifest.files.contains_key(*name)) {
            return Err(invalid_data(format!("{name} is not in the manifest")));
        }
        Ok(())
    }

    fn digest_files(&self) -> io::Result<BTreeMap<String, FileDigest>> {
        let mut files = BTreeMap::new();
        for (name, required) in BUNDLE_FILES {
            let path = self.run_dir.join(name);
            if !path.exists() {
                if required {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("missing required bundle file: {name}"),
                    ));
                }
                continue;
            }
            files.insert(name.to_string(), FileDigest::of(&path)?);
        }
        Ok(files)
    }
}

fn invalid_data(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// Pretty JSON written beside `path` and renamed over it, so readers never
/// see a partial document.
fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let json = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, path)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> io::Result<T> {
    let file = File::open(path)?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| invalid_data(e.to_string()))
}

fn append_ndjson<T: serde::Serialize>(path: &Path, record: &T) -> io::Result<()> {
    let mut line = serde_json::to_vec(record).map_err(io::Error::other)?;
    line.push(b'\n');
    OpenOptions::new().append(true).open(path)?.write_all(&line)
}
