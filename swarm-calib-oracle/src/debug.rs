//! Closed-form oracle for exercising the optimizer without a simulator.

use swarm_calib_core::traits::FitnessOracle;

/// `f(x) = Σ xᵢ²`, minimized at the origin.
pub fn sphere(position: &[f64]) -> f64 {
    position.iter().map(|x| x * x).sum()
}

/// Sphere function oracle that counts its evaluations.
#[derive(Debug, Clone, Default)]
pub struct SphereOracle {
    evaluations: u64,
}

impl SphereOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }
}

impl FitnessOracle for SphereOracle {
    fn evaluate(&mut self, position: &[f64]) -> swarm_calib_core::Result<f64> {
        self.evaluations += 1;
        Ok(sphere(position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_is_sum_of_squares() {
        let mut oracle = SphereOracle::new();
        assert_eq!(oracle.evaluate(&[0.0, 0.0, 0.0, 0.0]).unwrap(), 0.0);
        assert_eq!(oracle.evaluate(&[1.0, -0.5]).unwrap(), 1.25);
        let scores = oracle
            .evaluate_generation(&[&[1.0][..], &[2.0][..]])
            .unwrap();
        assert_eq!(scores, vec![1.0, 4.0]);
        assert_eq!(oracle.evaluations(), 4);
    }
}
