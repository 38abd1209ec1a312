//! Particle swarm optimization
//!
//! Velocity update per dimension `i`, with one `(rp, rg)` draw per particle
//! per generation:
//!
//! ```text
//! v[i] <- K0 * (K1*v[i] + K2*rp*(pbest[i]-x[i]) + K3*rg*(gbest[i]-x[i]))
//! v[i] <- clamp(v[i], -cap[i], cap[i])
//! x[i] <- wrap(x[i] + v[i])
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::space::ParameterSpace;
use crate::traits::{sanitize_fitness, FitnessOracle};
use crate::Result;

/// Particle Swarm Optimization (PSO) configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleSwarmConfig {
    /// Number of particles in the swarm
    #[serde(alias = "size")]
    pub num_particles: usize,
    /// Number of generations to run (no early stopping)
    pub iterations: usize,
    /// Constriction factor K0 applied to the whole velocity update
    pub constriction: f64,
    /// Inertia weight K1 (momentum)
    pub inertia: f64,
    /// Cognitive coefficient K2 (attraction to personal best)
    pub cognitive: f64,
    /// Social coefficient K3 (attraction to global best)
    pub social: f64,
    /// Velocity cap as a fraction of each dimension's range
    pub vmax_factor: f64,
    /// How particles are placed at start-up
    pub init: InitMode,
    /// Seed for reproducible runs; `None` draws from OS entropy
    pub seed: Option<u64>,
}

impl Default for ParticleSwarmConfig {
    fn default() -> Self {
        Self {
            num_particles: 5,
            iterations: 100,
            constriction: 1.0,
            inertia: 0.5,
            cognitive: 2.0,
            social: 2.0,
            vmax_factor: crate::space::DEFAULT_VMAX_FACTOR,
            init: InitMode::Random,
            seed: None,
        }
    }
}

/// Particle placement at swarm start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitMode {
    /// Uniform in each dimension's bounds
    #[default]
    Random,
    /// Every particle starts at the default vector (debug runs)
    Default,
}

/// Particle state in PSO
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    /// Current position (parameters)
    pub position: Vec<f64>,
    /// Current velocity
    pub velocity: Vec<f64>,
    /// Personal best position
    pub best_position: Vec<f64>,
    /// Personal best fitness
    pub best_fitness: f64,
    /// Fitness of the current position, `+inf` until evaluated
    pub fitness: f64,
}

impl Particle {
    /// Sample a particle in `space`.
    ///
    /// Velocity is always uniform in `[-cap, cap]`, even when the position is
    /// pinned to the defaults.
    pub fn initialize<R: Rng + ?Sized>(space: &ParameterSpace, mode: InitMode, rng: &mut R) -> Self {
        let mut position = Vec::with_capacity(space.len());
        let mut velocity = Vec::with_capacity(space.len());
        for dim in space.dimensions() {
            let x = match mode {
                InitMode::Random => rng.gen_range(dim.lower()..=dim.upper()),
                InitMode::Default => dim.default_value(),
            };
            let cap = dim.velocity_cap();
            position.push(x);
            velocity.push(rng.gen_range(-cap..=cap));
        }
        Self::from_state(position, velocity)
    }

    /// Build a particle with an explicit position and velocity and no memory.
    pub fn from_state(position: Vec<f64>, velocity: Vec<f64>) -> Self {
        Self {
            best_position: position.clone(),
            position,
            velocity,
            best_fitness: f64::INFINITY,
            fitness: f64::INFINITY,
        }
    }

    /// Evaluate the current position through `oracle` and record the result.
    pub fn evaluate<O: FitnessOracle + ?Sized>(&mut self, oracle: &mut O) -> Result<f64> {
        let f = oracle.evaluate(&self.position)?;
        Ok(self.record_fitness(f))
    }

    /// Store the fitness of the current position.
    ///
    /// Only a strict improvement replaces the personal best, so the first
    /// position found with a given score is kept. Returns the sanitized fitness.
    pub fn record_fitness(&mut self, fitness: f64) -> f64 {
        self.fitness = sanitize_fitness(fitness);
        if self.fitness < self.best_fitness {
            self.best_fitness = self.fitness;
            self.best_position.clone_from(&self.position);
        }
        self.fitness
    }

    /// Move towards the personal and global bests with fresh `(rp, rg)` draws.
    pub fn update<R: Rng + ?Sized>(
        &mut self,
        global_best: &[f64],
        space: &ParameterSpace,
        config: &ParticleSwarmConfig,
        rng: &mut R,
    ) {
        let rp: f64 = rng.gen();
        let rg: f64 = rng.gen();
        self.update_with(global_best, space, config, rp, rg);
    }

    /// Velocity and position update with explicit random coefficients.
    ///
    /// # Panics
    ///
    /// If `global_best` and the particle differ in dimension.
    pub fn update_with(
        &mut self,
        global_best: &[f64],
        space: &ParameterSpace,
        config: &ParticleSwarmConfig,
        rp: f64,
        rg: f64,
    ) {
        debug_assert_eq!(global_best.len(), self.position.len(), "global best dimension");
        for (i, dim) in space.dimensions().iter().enumerate() {
            let x = self.position[i];
            let v = config.constriction
                * (config.inertia * self.velocity[i]
                    + config.cognitive * rp * (self.best_position[i] - x)
                    + config.social * rg * (global_best[i] - x));
            let v = dim.clamp_velocity(v);
            self.velocity[i] = v;
            self.position[i] = dim.wrap(x + v);
        }
    }
}
