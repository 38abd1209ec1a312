//! Observed and simulated series, and their alignment into a scalar score.
//!
//! Observed sensor records are keyed by wall-clock time of day. Oracle output
//! is a list of `(elapsed seconds, value)` samples. Scoring converts each
//! observed timestamp to seconds since the run start, linearly interpolates
//! the oracle series at that instant and takes the RMSE over every timestamp
//! that falls inside the oracle's time domain.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Error;

/// Miles to kilometres, the default observed-data conversion.
pub const MPH_TO_KMH: f64 = 1.609344;

/// Time of day with one-second resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(u32);

impl ClockTime {
    pub const MIDNIGHT: ClockTime = ClockTime(0);

    pub fn from_hms(hours: u32, minutes: u32, seconds: u32) -> Self {
        Self(hours * 3600 + minutes * 60 + seconds)
    }

    /// Seconds since midnight.
    pub fn seconds(self) -> u32 {
        self.0
    }

    /// Signed seconds from `start` to `self`.
    pub fn seconds_since(self, start: ClockTime) -> f64 {
        f64::from(self.0) - f64::from(start.0)
    }
}

impl FromStr for ClockTime {
    type Err = Error;

    /// Parse `HH:MM` or `HH:MM:SS`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidTime(s.to_string());
        let mut parts = s.trim().split(':');
        let mut next = |max: u32| -> Result<Option<u32>, Error> {
            match parts.next() {
                None => Ok(None),
                Some(p) if !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()) => {
                    let v: u32 = p.parse().map_err(|_| invalid())?;
                    if v > max {
                        return Err(invalid());
                    }
                    Ok(Some(v))
                }
                Some(_) => Err(invalid()),
            }
        };
        let hours = next(47)?.ok_or_else(invalid)?;
        let minutes = next(59)?.ok_or_else(invalid)?;
        let seconds = next(59)?.unwrap_or(0);
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self::from_hms(hours, minutes, seconds))
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (h, m, s) = (self.0 / 3600, (self.0 / 60) % 60, self.0 % 60);
        if s == 0 {
            write!(f, "{h:02}:{m:02}")
        } else {
            write!(f, "{h:02}:{m:02}:{s:02}")
        }
    }
}

impl Serialize for ClockTime {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Conversion applied to each raw sensor record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataTransform {
    /// `value * factor`
    Scale { factor: f64 },
    /// `a * value + b`
    Affine { a: f64, b: f64 },
    /// `value * lanes * factor`, for per-lane quantities such as flow
    PerLane { factor: f64 },
}

impl Default for DataTransform {
    fn default() -> Self {
        DataTransform::Scale {
            factor: MPH_TO_KMH,
        }
    }
}

impl DataTransform {
    /// Apply to a record's value; `None` if the variant needs a lane count
    /// the record lacks.
    pub fn apply(&self, value: f64, lanes: Option<f64>) -> Option<f64> {
        match *self {
            DataTransform::Scale { factor } => Some(value * factor),
            DataTransform::Affine { a, b } => Some(a * value + b),
            DataTransform::PerLane { factor } => lanes.map(|n| value * n * factor),
        }
    }
}

/// Reference values keyed by time of day. Immutable once parsed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservedSeries {
    samples: BTreeMap<ClockTime, f64>,
}

impl ObservedSeries {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, at: ClockTime) -> Option<f64> {
        self.samples.get(&at).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClockTime, f64)> + '_ {
        self.samples.iter().map(|(t, v)| (*t, *v))
    }
}

impl FromIterator<(ClockTime, f64)> for ObservedSeries {
    fn from_iter<I: IntoIterator<Item = (ClockTime, f64)>>(iter: I) -> Self {
        Self {
            samples: iter.into_iter().collect(),
        }
    }
}

/// One `(time, value)` sample of oracle output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds since the simulation start
    pub time: f64,
    pub value: f64,
}

/// Samples produced by one oracle invocation, in file order.
///
/// Alignment assumes non-decreasing sample times.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OracleSeries {
    samples: Vec<Sample>,
}

impl OracleSeries {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Linear interpolation at `t`, using the first sample pair with
    /// `x1 <= t <= x2`. `None` outside the sampled domain.
    pub fn interpolate(&self, t: f64) -> Option<f64> {
        self.samples.windows(2).find_map(|w| {
            let (a, b) = (w[0], w[1]);
            if t >= a.time && t <= b.time {
                if b.time == a.time {
                    Some(a.value)
                } else {
                    Some(a.value + (t - a.time) * (b.value - a.value) / (b.time - a.time))
                }
            } else {
                None
            }
        })
    }
}

impl FromIterator<(f64, f64)> for OracleSeries {
    fn from_iter<I: IntoIterator<Item = (f64, f64)>>(iter: I) -> Self {
        Self {
            samples: iter
                .into_iter()
                .map(|(time, value)| Sample { time, value })
                .collect(),
        }
    }
}

/// An observed value paired with the oracle's interpolated value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignedPair {
    pub at: ClockTime,
    /// Seconds since the run start
    pub elapsed: f64,
    pub observed: f64,
    pub simulated: f64,
}

fn is_date_prefixed(line: &str) -> bool {
    let mut groups = 0;
    let mut digits = 0;
    for b in line.bytes() {
        if b.is_ascii_digit() {
            digits += 1;
        } else if b == b'/' && digits > 0 && groups < 2 {
            groups += 1;
            digits = 0;
        } else {
            break;
        }
    }
    groups == 2 && digits > 0
}

/// Parse raw sensor records.
///
/// Only lines starting with a `digits/digits/digits` date are used. Fields are
/// split on every character other than `[0-9./:]`, counting the line
/// terminator as a trailing separator: the timestamp is field 1, the value
/// the fourth field from the end and the lane count the third from the end.
/// Lines whose fields do not parse are skipped. A repeated timestamp keeps
/// the last record.
pub fn parse_observed(raw: &str, transform: DataTransform) -> ObservedSeries {
    let mut samples = BTreeMap::new();
    let mut skipped = 0usize;
    for line in raw.lines() {
        if !is_date_prefixed(line) {
            continue;
        }
        let mut fields: Vec<&str> = line
            .split(|c: char| !(c.is_ascii_digit() || c == '.' || c == '/' || c == ':'))
            .collect();
        fields.push("");

        let n = fields.len();
        if n < 5 {
            skipped += 1;
            continue;
        }
        let Ok(at) = fields[1].parse::<ClockTime>() else {
            skipped += 1;
            continue;
        };
        let Ok(value) = fields[n - 4].parse::<f64>() else {
            skipped += 1;
            continue;
        };
        let lanes = fields[n - 3].parse::<f64>().ok();
        match transform.apply(value, lanes) {
            Some(v) => {
                samples.insert(at, v);
            }
            None => skipped += 1,
        }
    }
    debug!(records = samples.len(), skipped, "parsed observed series");
    ObservedSeries { samples }
}

/// Parse oracle output: the first two numeric tokens of each line, splitting
/// on anything other than `[0-9.]`. Lines with fewer than two numeric tokens
/// are ignored.
pub fn parse_oracle_output(raw: &str) -> OracleSeries {
    let mut samples = Vec::new();
    for line in raw.lines() {
        let mut tokens = line
            .split(|c: char| !(c.is_ascii_digit() || c == '.'))
            .filter(|t| !t.is_empty());
        let (Some(t), Some(v)) = (tokens.next(), tokens.next()) else {
            continue;
        };
        if let (Ok(time), Ok(value)) = (t.parse::<f64>(), v.parse::<f64>()) {
            samples.push(Sample { time, value });
        }
    }
    OracleSeries { samples }
}

/// Pair every observed timestamp inside the oracle's time domain with the
/// interpolated oracle value. `start` is the wall-clock time of simulation
/// second zero.
pub fn align(observed: &ObservedSeries, oracle: &OracleSeries, start: ClockTime) -> Vec<AlignedPair> {
    observed
        .iter()
        .filter_map(|(at, value)| {
            let elapsed = at.seconds_since(start);
            oracle.interpolate(elapsed).map(|simulated| AlignedPair {
                at,
                elapsed,
                observed: value,
                simulated,
            })
        })
        .collect()
}

/// Root-mean-square error over aligned pairs; `+inf` when there are none.
pub fn rmse(pairs: &[AlignedPair]) -> f64 {
    if pairs.is_empty() {
        return f64::INFINITY;
    }
    let sum: f64 = pairs
        .iter()
        .map(|p| (p.observed - p.simulated).powi(2))
        .sum();
    (sum / pairs.len() as f64).sqrt()
}

/// Align and score in one step.
pub fn score(observed: &ObservedSeries, oracle: &OracleSeries, start: ClockTime) -> f64 {
    rmse(&align(observed, oracle, start))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> ClockTime {
        ClockTime::from_hms(h, m, 0)
    }

    #[test]
    fn clock_time_parses_and_formats() {
        assert_eq!("05:00".parse::<ClockTime>().unwrap().seconds(), 18_000);
        assert_eq!("08:30:15".parse::<ClockTime>().unwrap().seconds(), 30_615);
        assert_eq!(at(5, 0).to_string(), "05:00");
        assert_eq!(ClockTime::from_hms(8, 30, 15).to_string(), "08:30:15");
        for bad in ["", "5", "aa:bb", "05:60", "05:00:00:00", "-1:00", "05:"] {
            assert!(
                matches!(bad.parse::<ClockTime>(), Err(Error::InvalidTime(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn clock_time_serde_uses_strings() {
        let json = serde_json::to_string(&at(6, 15)).unwrap();
        assert_eq!(json, "\"06:15\"");
        let back: ClockTime = serde_json::from_str(&json).unwrap();
        assert_eq!(back, at(6, 15));
        assert!(serde_json::from_str::<ClockTime>("\"nope\"").is_err());
    }

    #[test]
    fn transforms() {
        let kmh = DataTransform::default().apply(10.0, None).unwrap();
        assert!((kmh - 16.09344).abs() < 1e-9);
        assert_eq!(DataTransform::Affine { a: 2.0, b: 1.0 }.apply(3.0, None), Some(7.0));
        assert_eq!(DataTransform::PerLane { factor: 0.5 }.apply(100.0, Some(4.0)), Some(200.0));
        assert_eq!(DataTransform::PerLane { factor: 0.5 }.apply(100.0, None), None);

        let t: DataTransform = serde_json::from_str(r#"{"kind":"affine","a":1.0,"b":-2.0}"#).unwrap();
        assert_eq!(t, DataTransform::Affine { a: 1.0, b: -2.0 });
    }

    #[test]
    fn parses_sensor_records() {
        let raw = "Hour\tSpeed (mph)\t# Lane Points\t% Observed\n\
                   01/05/2011 05:00\t65.0\t4\t100\n\
                   01/05/2011 05:05\t60.5\t4\t100\n\
                   garbage line\n\
                   01/05/2011 xx:yy\t60.5\t4\t100\n";
        let obs = parse_observed(raw, DataTransform::Scale { factor: 1.0 });
        assert_eq!(obs.len(), 2);
        assert_eq!(obs.get(at(5, 0)), Some(65.0));
        assert_eq!(obs.get(at(5, 5)), Some(60.5));
    }

    #[test]
    fn per_lane_uses_lane_field() {
        let raw = "01/05/2011 05:00\t300\t3\t100\n";
        let obs = parse_observed(raw, DataTransform::PerLane { factor: 1.0 });
        assert_eq!(obs.get(at(5, 0)), Some(900.0));
    }

    #[test]
    fn repeated_timestamp_keeps_last_record() {
        let raw = "01/05/2011 05:00\t10\t3\t100\n01/05/2011 05:00\t20\t3\t100\n";
        let obs = parse_observed(raw, DataTransform::Scale { factor: 1.0 });
        assert_eq!(obs.len(), 1);
        assert_eq!(obs.get(at(5, 0)), Some(20.0));
    }

    #[test]
    fn date_prefix_detection() {
        assert!(is_date_prefixed("1/2/2011 rest"));
        assert!(!is_date_prefixed("1/2 05:00"));
        assert!(!is_date_prefixed("/1/2/3"));
        assert!(!is_date_prefixed("Hour 1/2/3"));
    }

    #[test]
    fn parses_oracle_output_pairs() {
        let raw = "# time speed\n0 10.5\n30.0\t12.0 99\nonly 7\n\n60 14\n";
        let series = parse_oracle_output(raw);
        assert_eq!(
            series.samples(),
            &[
                Sample { time: 0.0, value: 10.5 },
                Sample { time: 30.0, value: 12.0 },
                Sample { time: 60.0, value: 14.0 },
            ]
        );
        assert!(parse_oracle_output("").is_empty());
    }

    #[test]
    fn interpolation_is_exact_at_midpoint() {
        let oracle: OracleSeries = [(0.0, 10.0), (10.0, 20.0)].into_iter().collect();
        assert_eq!(oracle.interpolate(5.0), Some(15.0));
        assert_eq!(oracle.interpolate(0.0), Some(10.0));
        assert_eq!(oracle.interpolate(10.0), Some(20.0));
        assert_eq!(oracle.interpolate(10.5), None);

        let start = at(5, 0);
        let observed: ObservedSeries = [(ClockTime::from_hms(5, 0, 5), 15.0)].into_iter().collect();
        let pairs = align(&observed, &oracle, start);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].simulated, 15.0);
        assert_eq!(pairs[0].elapsed, 5.0);
        assert_eq!(score(&observed, &oracle, start), 0.0);
    }

    #[test]
    fn repeated_sample_time_does_not_divide_by_zero() {
        let oracle: OracleSeries = [(0.0, 1.0), (5.0, 3.0), (5.0, 9.0)].into_iter().collect();
        assert_eq!(oracle.interpolate(5.0), Some(3.0));
    }

    #[test]
    fn rmse_over_aligned_pairs_only() {
        let start = at(5, 0);
        let oracle: OracleSeries = [(0.0, 10.0), (600.0, 10.0)].into_iter().collect();
        let observed: ObservedSeries = [
            (at(5, 0), 13.0),
            (at(5, 5), 6.0),
            (at(5, 30), 1000.0), // outside the simulated domain
            (at(4, 55), 1000.0), // before the run start
        ]
        .into_iter()
        .collect();
        let pairs = align(&observed, &oracle, start);
        assert_eq!(pairs.len(), 2);
        // sqrt((9 + 16) / 2)
        assert!((score(&observed, &oracle, start) - (12.5f64).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn disjoint_domains_score_infinity() {
        let start = at(5, 0);
        let oracle: OracleSeries = [(7200.0, 10.0), (7260.0, 10.0)].into_iter().collect();
        let observed: ObservedSeries = [(at(5, 0), 13.0), (at(5, 5), 6.0)].into_iter().collect();
        assert_eq!(score(&observed, &oracle, start), f64::INFINITY);
        assert_eq!(score(&observed, &OracleSeries::default(), start), f64::INFINITY);
        assert_eq!(score(&ObservedSeries::default(), &oracle, start), f64::INFINITY);
    }
}
