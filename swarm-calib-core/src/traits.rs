//! Core traits for SwarmCalib
//!
//! The optimizer only ever sees fitness through [`FitnessOracle`]; whether a
//! score comes from a local subprocess, a cluster job or a closed-form test
//! function is up to the implementation.

use crate::Result;

/// Turns a parameter vector into a scalar fitness (lower is better).
///
/// Degenerate evaluations (nothing to compare, a failed simulation, a lost
/// job) return `f64::INFINITY`. `Err` is reserved for infrastructure failures
/// that should stop the run.
pub trait FitnessOracle {
    /// Evaluate a single position, blocking until the score is known.
    fn evaluate(&mut self, position: &[f64]) -> Result<f64>;

    /// Evaluate one generation's positions, returning scores in input order.
    ///
    /// The default evaluates strictly sequentially.
    fn evaluate_generation(&mut self, positions: &[&[f64]]) -> Result<Vec<f64>> {
        positions.iter().map(|p| self.evaluate(p)).collect()
    }
}

impl<O: FitnessOracle + ?Sized> FitnessOracle for &mut O {
    fn evaluate(&mut self, position: &[f64]) -> Result<f64> {
        (**self).evaluate(position)
    }

    fn evaluate_generation(&mut self, positions: &[&[f64]]) -> Result<Vec<f64>> {
        (**self).evaluate_generation(positions)
    }
}

impl<O: FitnessOracle + ?Sized> FitnessOracle for Box<O> {
    fn evaluate(&mut self, position: &[f64]) -> Result<f64> {
        (**self).evaluate(position)
    }

    fn evaluate_generation(&mut self, positions: &[&[f64]]) -> Result<Vec<f64>> {
        (**self).evaluate_generation(positions)
    }
}

/// Adapter turning a closure into an oracle.
#[derive(Debug, Clone)]
pub struct FnOracle<F>(pub F);

impl<F> FitnessOracle for FnOracle<F>
where
    F: FnMut(&[f64]) -> f64,
{
    fn evaluate(&mut self, position: &[f64]) -> Result<f64> {
        Ok((self.0)(position))
    }
}

/// Map NaN to `+inf` so a broken score can never win a strict comparison.
pub fn sanitize_fitness(f: f64) -> f64 {
    if f.is_nan() {
        f64::INFINITY
    } else {
        f
    }
}
