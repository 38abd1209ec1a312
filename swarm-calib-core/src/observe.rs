//! Run identifiers and per-generation records.
//!
//! These are the schemas the artifact writer persists (`generations.ndjson`,
//! `best.json`). They carry plain vectors so they serialize the same way
//! regardless of which oracle produced the scores.

use core::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Error parsing a hex-encoded ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseIdError {
    /// The input had the wrong length for the target ID type.
    #[error("invalid id length")]
    InvalidLength,
    /// The input contained non-hex characters.
    #[error("invalid hex in id")]
    InvalidHex,
    /// All-zero IDs are invalid by contract.
    #[error("all-zero id is invalid")]
    AllZeroInvalid,
}

const HEX_LOWER: &[u8; 16] = b"0123456789abcdef";

fn decode_hex_nibble(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// 16-byte calibration run identifier, rendered as 32 lowercase hex chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId([u8; 16]);

impl RunId {
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// All-zero ids are reserved.
    pub fn is_valid(&self) -> bool {
        self.0.iter().any(|b| *b != 0)
    }

    /// Derive a fresh id: `sha256(unix_nanos_be || pid_be)[0..16]`.
    pub fn generate() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let mut hasher = Sha256::new();
        hasher.update(nanos.to_be_bytes());
        hasher.update(std::process::id().to_be_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        if bytes.iter().all(|b| *b == 0) {
            bytes[15] = 1;
        }
        Self(bytes)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(
                f,
                "{}{}",
                HEX_LOWER[(b >> 4) as usize] as char,
                HEX_LOWER[(b & 0x0f) as usize] as char
            )?;
        }
        Ok(())
    }
}

impl FromStr for RunId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 32 {
            return Err(ParseIdError::InvalidLength);
        }
        let mut out = [0u8; 16];
        for (i, slot) in out.iter_mut().enumerate() {
            let hi = decode_hex_nibble(bytes[i * 2]).ok_or(ParseIdError::InvalidHex)?;
            let lo = decode_hex_nibble(bytes[i * 2 + 1]).ok_or(ParseIdError::InvalidHex)?;
            *slot = (hi << 4) | lo;
        }
        let id = Self(out);
        if !id.is_valid() {
            return Err(ParseIdError::AllZeroInvalid);
        }
        Ok(id)
    }
}

impl Serialize for RunId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RunId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Serialize `+inf` fitness as JSON `null`; JSON has no infinity.
mod fitness_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if v.is_finite() {
            serializer.serialize_f64(*v)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}

/// One particle's state at the end of a generation's evaluation phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleRecord {
    pub index: usize,
    pub position: Vec<f64>,
    #[serde(with = "fitness_serde")]
    pub fitness: f64,
    #[serde(with = "fitness_serde")]
    pub best_fitness: f64,
}

/// Everything known after one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub schema_version: u32,
    pub generation: u64,
    pub particles: Vec<ParticleRecord>,
    pub global_best: Vec<f64>,
    #[serde(with = "fitness_serde")]
    pub global_best_fitness: f64,
    /// Whether the global best improved during this generation
    pub improved: bool,
}

/// Final outcome of a calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestRecord {
    pub schema_version: u32,
    pub run_id: RunId,
    pub generations: u64,
    pub names: Vec<String>,
    pub position: Vec<f64>,
    #[serde(with = "fitness_serde")]
    pub fitness: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_hex_roundtrip() {
        let id = RunId::from_bytes([0xab; 16]);
        let s = id.to_string();
        assert_eq!(s, "ab".repeat(16));
        assert_eq!(s.parse::<RunId>().unwrap(), id);
        assert_eq!("AB".repeat(16).parse::<RunId>().unwrap(), id);
    }

    #[test]
    fn run_id_parse_errors() {
        assert_eq!("abc".parse::<RunId>(), Err(ParseIdError::InvalidLength));
        assert_eq!("zz".repeat(16).parse::<RunId>(), Err(ParseIdError::InvalidHex));
        assert_eq!("00".repeat(16).parse::<RunId>(), Err(ParseIdError::AllZeroInvalid));
    }

    #[test]
    fn generated_ids_are_valid() {
        assert!(RunId::generate().is_valid());
    }

    #[test]
    fn infinite_fitness_serializes_as_null() {
        let rec = ParticleRecord {
            index: 0,
            position: vec![1.0],
            fitness: f64::INFINITY,
            best_fitness: 2.5,
        };
        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains("\"fitness\":null"));
        let back: ParticleRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rec);
    }
}
