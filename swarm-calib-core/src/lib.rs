//! # SwarmCalib Core
//!
//! Core search and scoring primitives for calibrating a traffic simulator
//! against field sensor data.
//!
//! This crate provides:
//! - A bounded, periodic parameter space ([`space`])
//! - Particle swarm optimization with a generational barrier ([`algorithms`], [`swarm`])
//! - Observed/simulated series parsing and RMSE alignment ([`series`])
//! - The [`traits::FitnessOracle`] seam that hides how fitness is computed
//! - Serializable per-generation run records ([`observe`])
//!
//! The crate has no async runtime dependency; oracle strategies that need one
//! live in `swarm-calib-oracle`.

pub mod algorithms;
pub mod observe;
pub mod series;
pub mod space;
pub mod swarm;
pub mod traits;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::algorithms::*;
    pub use crate::series::*;
    pub use crate::space::*;
    pub use crate::swarm::*;
    pub use crate::traits::*;
}

/// Result type for SwarmCalib core operations
pub type Result<T> = core::result::Result<T, Error>;

/// Error type for SwarmCalib core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A dimension's lower bound exceeds its upper bound (or a bound is not finite)
    #[error("invalid bounds for `{name}`: lower {lower} > upper {upper}")]
    InvalidBounds { name: String, lower: f64, upper: f64 },
    /// A dimension's default value lies outside its bounds
    #[error("default {default} for `{name}` lies outside [{lower}, {upper}]")]
    InvalidDefault {
        name: String,
        default: f64,
        lower: f64,
        upper: f64,
    },
    /// A vector does not have one coordinate per dimension
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    /// A swarm needs at least one particle
    #[error("swarm must contain at least one particle")]
    EmptySwarm,
    /// A clock time string could not be parsed
    #[error("malformed time `{0}` (expected HH:MM or HH:MM:SS)")]
    InvalidTime(String),
    /// Any other configuration problem detected before the first oracle call
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The oracle infrastructure failed (not a degenerate fitness)
    #[error("oracle failure: {0}")]
    Oracle(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap an oracle-side error.
    pub fn oracle<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Oracle(Box::new(err))
    }

    /// Whether this error is a configuration error (fatal before any oracle call).
    pub fn is_config(&self) -> bool {
        !matches!(self, Error::Oracle(_))
    }
}
