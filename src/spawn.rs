//! Initial population.
//!
//! Positions are uniform over the world box, headings uniform over the cube
//! `[-1, 1]^3` (then normalized), speeds uniform between `min_speed` and half
//! of `max_speed`. Runs are reproducible when seeded.

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::color::spawn_color;
use crate::kernel::FALLBACK_HEADING;
use crate::params::SimulationParams;
use crate::particle::Particle;
use crate::spatial::WorldBounds;

/// Direction samples shorter than this are replaced by the fallback heading.
const MIN_DIRECTION_LENGTH: f32 = 1.0e-3;

/// Random source plus the world box, with helpers for the spawn distributions.
pub struct SpawnContext {
    bounds: WorldBounds,
    rng: StdRng,
}

impl SpawnContext {
    /// Seeded context; the same seed reproduces the same population.
    pub fn seeded(bounds: WorldBounds, seed: u64) -> Self {
        Self {
            bounds,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Context seeded from OS entropy.
    pub fn from_entropy(bounds: WorldBounds) -> Self {
        Self {
            bounds,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn bounds(&self) -> WorldBounds {
        self.bounds
    }

    /// Random point inside the world box.
    pub fn random_in_bounds(&mut self) -> Vec3 {
        let b = self.bounds;
        Vec3::new(
            self.rng.gen_range(b.min.x..=b.max.x),
            self.rng.gen_range(b.min.y..=b.max.y),
            self.rng.gen_range(b.min.z..=b.max.z),
        )
    }

    /// Unit vector from a uniform sample of `[-1, 1]^3`.
    ///
    /// Not uniform on the sphere; corners are slightly favored.
    pub fn random_direction(&mut self) -> Vec3 {
        let v = Vec3::new(
            self.rng.gen_range(-1.0..=1.0),
            self.rng.gen_range(-1.0..=1.0),
            self.rng.gen_range(-1.0..=1.0),
        );
        if v.length() < MIN_DIRECTION_LENGTH {
            FALLBACK_HEADING
        } else {
            v.normalize()
        }
    }

    /// Initial speed in `[min_speed, max(min_speed, max_speed / 2)]`.
    pub fn random_speed(&mut self, min_speed: f32, max_speed: f32) -> f32 {
        let hi = min_speed.max(max_speed * 0.5);
        self.rng.gen_range(min_speed..=hi)
    }

    /// One freshly spawned particle.
    pub fn particle(&mut self, params: &SimulationParams) -> Particle {
        let position = self.random_in_bounds();
        let heading = self.random_direction();
        let speed = self.random_speed(params.min_speed, params.max_speed);
        let color = spawn_color(heading, speed, params.min_speed, params.max_speed);
        Particle::new(position, heading * speed, color)
    }
}

/// `count` particles drawn from `ctx`.
pub fn spawn_population(
    count: u32,
    params: &SimulationParams,
    ctx: &mut SpawnContext,
) -> Vec<Particle> {
    let params = params.sanitized();
    (0..count).map(|_| ctx.particle(&params)).collect()
}
