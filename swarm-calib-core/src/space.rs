//! Bounded parameter space with periodic boundaries.
//!
//! Each dimension carries `(default, lower, upper)` and a velocity cap of
//! `(upper - lower) * vmax_factor`. Coordinates leaving the box re-enter from
//! the opposite bound (toroidal wrap) instead of being clamped, so a particle
//! keeps its momentum at a wall.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Velocity cap factor applied to each dimension's range width.
pub const DEFAULT_VMAX_FACTOR: f64 = 1.0;

/// Named calibration parameter as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Name passed to the oracle (`name=value`)
    pub name: String,
    /// Default value, also the initial global best
    pub default: f64,
    /// Inclusive lower bound
    pub lower: f64,
    /// Inclusive upper bound
    pub upper: f64,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, default: f64, lower: f64, upper: f64) -> Self {
        Self {
            name: name.into(),
            default,
            lower,
            upper,
        }
    }
}

/// The IDM car-following and MOBIL lane-changing parameters, with speeds in m/s.
pub fn idm_mobil_parameters() -> Vec<ParameterSpec> {
    vec![
        ParameterSpec::new("v0", 120.0 / 3.6, 90.0 / 3.6, 140.0 / 3.6),
        ParameterSpec::new("v0_truck", 85.0 / 3.6, 70.0 / 3.6, 120.0 / 3.6),
        ParameterSpec::new("a", 1.0, 0.2, 4.0),
        ParameterSpec::new("a_truck", 0.7, 0.2, 4.0),
        ParameterSpec::new("b", 1.0, 0.5, 4.0),
        ParameterSpec::new("gamma", 4.0, 1.0, 8.0),
        ParameterSpec::new("t", 1.5, 0.5, 3.0),
        ParameterSpec::new("t_truck", 1.5, 0.5, 3.0),
        ParameterSpec::new("s0", 2.5, 0.5, 5.0),
        ParameterSpec::new("s0_truck", 4.0, 0.5, 10.0),
        ParameterSpec::new("b_safe", 8.0, 0.5, 8.0),
        ParameterSpec::new("p", 0.25, 0.0, 1.0),
    ]
}

/// A `dims`-dimensional `[-1, 1]` box centered on the origin, for optimizer smoke runs.
pub fn sphere_parameters(dims: usize) -> Vec<ParameterSpec> {
    (0..dims)
        .map(|i| ParameterSpec::new(format!("x{i}"), 0.0, -1.0, 1.0))
        .collect()
}

/// One validated dimension of a [`ParameterSpace`].
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    name: String,
    default: f64,
    lower: f64,
    upper: f64,
    velocity_cap: f64,
}

impl Dimension {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_value(&self) -> f64 {
        self.default
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    pub fn velocity_cap(&self) -> f64 {
        self.velocity_cap
    }

    /// Range width `upper - lower`.
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn contains(&self, x: f64) -> bool {
        x >= self.lower && x <= self.upper
    }

    /// Clamp a velocity component into `[-cap, cap]`.
    pub fn clamp_velocity(&self, v: f64) -> f64 {
        v.min(self.velocity_cap).max(-self.velocity_cap)
    }

    /// Bring `x` back into `[lower, upper]` by shifting it a whole number of
    /// range widths.
    ///
    /// A zero-width dimension (or a non-finite `x`) collapses to `lower`.
    pub fn wrap(&self, x: f64) -> f64 {
        let width = self.width();
        if width <= 0.0 || !x.is_finite() {
            return self.lower;
        }
        // Overshoot lands in (lower, upper], undershoot in [lower, upper).
        let wrapped = if x > self.upper {
            self.upper - (self.upper - x).rem_euclid(width)
        } else if x < self.lower {
            self.lower + (x - self.lower).rem_euclid(width)
        } else {
            x
        };
        wrapped.clamp(self.lower, self.upper)
    }
}

/// Validated bounds and velocity caps, fixed for a calibration run.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpace {
    dims: Vec<Dimension>,
}

impl ParameterSpace {
    /// Validate `specs` and derive velocity caps.
    ///
    /// Fails if a bound is not finite, `lower > upper`, a default lies outside
    /// its bounds, a name repeats, or `vmax_factor` is negative.
    pub fn new(specs: &[ParameterSpec], vmax_factor: f64) -> Result<Self> {
        if specs.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one parameter is required".to_string(),
            ));
        }
        if !vmax_factor.is_finite() || vmax_factor < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "vmax factor must be a non-negative number, got {vmax_factor}"
            )));
        }

        let mut dims: Vec<Dimension> = Vec::with_capacity(specs.len());
        for spec in specs {
            if !spec.lower.is_finite() || !spec.upper.is_finite() || spec.lower > spec.upper {
                return Err(Error::InvalidBounds {
                    name: spec.name.clone(),
                    lower: spec.lower,
                    upper: spec.upper,
                });
            }
            if !(spec.default >= spec.lower && spec.default <= spec.upper) {
                return Err(Error::InvalidDefault {
                    name: spec.name.clone(),
                    default: spec.default,
                    lower: spec.lower,
                    upper: spec.upper,
                });
            }
            if dims.iter().any(|d| d.name == spec.name) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate parameter `{}`",
                    spec.name
                )));
            }
            dims.push(Dimension {
                name: spec.name.clone(),
                default: spec.default,
                lower: spec.lower,
                upper: spec.upper,
                velocity_cap: (spec.upper - spec.lower) * vmax_factor,
            });
        }

        Ok(Self { dims })
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn dimension(&self, i: usize) -> &Dimension {
        &self.dims[i]
    }

    pub fn len(&self) -> usize {
        self.dims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dims.is_empty()
    }

    /// Parameter names in oracle argument order.
    pub fn names(&self) -> Vec<String> {
        self.dims.iter().map(|d| d.name.clone()).collect()
    }

    pub fn defaults(&self) -> Vec<f64> {
        self.dims.iter().map(|d| d.default).collect()
    }

    pub fn velocity_caps(&self) -> Vec<f64> {
        self.dims.iter().map(|d| d.velocity_cap).collect()
    }

    /// Wrap coordinate `x` of dimension `i` back into bounds.
    pub fn wrap(&self, i: usize, x: f64) -> f64 {
        self.dims[i].wrap(x)
    }

    /// Whether every coordinate of `position` lies within its bounds.
    pub fn contains(&self, position: &[f64]) -> bool {
        position.len() == self.dims.len()
            && self.dims.iter().zip(position).all(|(d, &x)| d.contains(x))
    }

    /// Check that `v` has one coordinate per dimension.
    pub fn check_len(&self, v: &[f64]) -> Result<()> {
        if v.len() != self.dims.len() {
            return Err(Error::DimensionMismatch {
                expected: self.dims.len(),
                actual: v.len(),
            });
        }
        Ok(())
    }
}
