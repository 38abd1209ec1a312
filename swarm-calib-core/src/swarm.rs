//! Generational swarm driver.
//!
//! Each generation runs two phases strictly in order:
//!
//! 1. **Evaluate**: the oracle scores every particle; personal and global
//!    bests are updated in particle order with a strict-improvement rule.
//! 2. **Move**: every particle moves using the global best as it stands after
//!    the whole evaluation phase.
//!
//! No particle moves while any evaluation of its generation is outstanding.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::algorithms::{Particle, ParticleSwarmConfig};
use crate::observe::{GenerationRecord, ParticleRecord};
use crate::space::{ParameterSpace, ParameterSpec};
use crate::traits::FitnessOracle;
use crate::{Error, Result};

const RECORD_SCHEMA_VERSION: u32 = 1;

/// Best position found by a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct SwarmOutcome {
    pub best_position: Vec<f64>,
    pub best_fitness: f64,
    pub generations: u64,
}

/// A particle swarm over a fixed parameter space.
#[derive(Debug, Clone)]
pub struct Swarm<R = StdRng> {
    space: ParameterSpace,
    config: ParticleSwarmConfig,
    particles: Vec<Particle>,
    global_best: Vec<f64>,
    global_best_fitness: f64,
    generation: u64,
    rng: R,
}

impl Swarm<StdRng> {
    /// Create a swarm seeded from `config.seed` (or OS entropy).
    pub fn new(space: ParameterSpace, config: ParticleSwarmConfig) -> Result<Self> {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(space, config, rng)
    }

    /// Validate `specs` with `config.vmax_factor` and create the swarm.
    pub fn from_specs(specs: &[ParameterSpec], config: ParticleSwarmConfig) -> Result<Self> {
        let space = ParameterSpace::new(specs, config.vmax_factor)?;
        Self::new(space, config)
    }
}

impl<R: Rng> Swarm<R> {
    /// Create a swarm driven by `rng`.
    ///
    /// The global best starts at the default vector with `+inf` fitness.
    pub fn with_rng(space: ParameterSpace, config: ParticleSwarmConfig, mut rng: R) -> Result<Self> {
        if config.num_particles == 0 {
            return Err(Error::EmptySwarm);
        }
        let coefficients = [
            config.constriction,
            config.inertia,
            config.cognitive,
            config.social,
        ];
        if coefficients.iter().any(|k| !k.is_finite()) {
            return Err(Error::InvalidConfig(
                "swarm coefficients must be finite".to_string(),
            ));
        }

        let particles = (0..config.num_particles)
            .map(|_| Particle::initialize(&space, config.init, &mut rng))
            .collect();

        Ok(Self {
            global_best: space.defaults(),
            global_best_fitness: f64::INFINITY,
            space,
            config,
            particles,
            generation: 0,
            rng,
        })
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    pub fn config(&self) -> &ParticleSwarmConfig {
        &self.config
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn global_best(&self) -> &[f64] {
        &self.global_best
    }

    pub fn global_best_fitness(&self) -> f64 {
        self.global_best_fitness
    }

    /// Number of completed generations.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Run one generation: evaluate every particle, then move every particle.
    pub fn step<O: FitnessOracle + ?Sized>(&mut self, oracle: &mut O) -> Result<GenerationRecord> {
        let generation = self.generation;

        let scores = {
            let positions: Vec<&[f64]> = self
                .particles
                .iter()
                .map(|p| p.position.as_slice())
                .collect();
            oracle.evaluate_generation(&positions)?
        };
        if scores.len() != self.particles.len() {
            return Err(Error::DimensionMismatch {
                expected: self.particles.len(),
                actual: scores.len(),
            });
        }

        let mut improved = false;
        let mut records = Vec::with_capacity(self.particles.len());
        for (index, (particle, score)) in self.particles.iter_mut().zip(scores).enumerate() {
            let fitness = particle.record_fitness(score);
            debug!(
                generation,
                particle = index,
                fitness,
                position = ?particle.position,
                "evaluated particle"
            );
            if fitness < self.global_best_fitness {
                self.global_best_fitness = fitness;
                self.global_best.clone_from(&particle.position);
                improved = true;
            }
            records.push(ParticleRecord {
                index,
                position: particle.position.clone(),
                fitness,
                best_fitness: particle.best_fitness,
            });
        }

        info!(
            generation,
            best_fitness = self.global_best_fitness,
            improved,
            best = ?self.global_best,
            "generation evaluated"
        );

        let record = GenerationRecord {
            schema_version: RECORD_SCHEMA_VERSION,
            generation,
            particles: records,
            global_best: self.global_best.clone(),
            global_best_fitness: self.global_best_fitness,
            improved,
        };

        let Self {
            space,
            config,
            particles,
            global_best,
            rng,
            ..
        } = self;
        for particle in particles.iter_mut() {
            particle.update(global_best.as_slice(), space, config, &mut *rng);
        }
        self.generation += 1;

        Ok(record)
    }

    /// Run the configured number of generations.
    pub fn run<O: FitnessOracle + ?Sized>(&mut self, oracle: &mut O) -> Result<SwarmOutcome> {
        self.run_with(oracle, |_| Ok(()))
    }

    /// Run the configured number of generations, handing each generation's
    /// record to `observer`. An observer error stops the run.
    pub fn run_with<O, F>(&mut self, oracle: &mut O, mut observer: F) -> Result<SwarmOutcome>
    where
        O: FitnessOracle + ?Sized,
        F: FnMut(&GenerationRecord) -> Result<()>,
    {
        for _ in 0..self.config.iterations {
            let record = self.step(oracle)?;
            observer(&record)?;
        }
        Ok(self.outcome())
    }

    /// Current best as a run outcome.
    pub fn outcome(&self) -> SwarmOutcome {
        SwarmOutcome {
            best_position: self.global_best.clone(),
            best_fitness: self.global_best_fitness,
            generations: self.generation,
        }
    }
}
