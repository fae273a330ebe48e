//! Flock configuration and the CPU backend.
//!
//! [`Flock`] owns the two particle buffers and the cell lists and runs one
//! tick as three phases on the rayon pool: clear the cell heads, file every
//! particle into its cell, then step every particle from the current buffer
//! into the next one. Each phase is a single parallel call, so its return is
//! the barrier before the next phase. The buffers swap once the step phase
//! has finished.
//!
//! Changing the particle count or the neighbor radius needs new storage. Such
//! a change is recorded as pending and clears the readiness flag; it is
//! applied before the next tick (or by [`Flock::apply_pending`]), which
//! regenerates the whole population.

use log::{info, warn};
use rayon::prelude::*;

use crate::buffers::{clamp_particle_count, PingPong, ReadyFlag, DEFAULT_PARTICLE_COUNT};
use crate::error::FlockError;
use crate::grid::CellGrid;
use crate::kernel::step_particle;
use crate::params::SimulationParams;
use crate::particle::Particle;
use crate::spatial::{GridLayout, WorldBounds, DEFAULT_MAX_CELL_COUNT};
use crate::spawn::{spawn_population, SpawnContext};
use crate::time::clamp_delta;

/// Settings fixed at construction.
///
/// ```ignore
/// let flock = Flock::new(
///     FlockConfig::new()
///         .with_particle_count(20_000)
///         .with_params(SimulationParams { boundary: BoundaryMode::Wrap, ..Default::default() })
///         .with_seed(7),
/// );
/// ```
#[derive(Clone, Debug)]
pub struct FlockConfig {
    pub(crate) particle_count: u32,
    pub(crate) bounds: WorldBounds,
    pub(crate) params: SimulationParams,
    pub(crate) max_cell_count: u32,
    pub(crate) seed: Option<u64>,
}

impl Default for FlockConfig {
    fn default() -> Self {
        Self {
            particle_count: DEFAULT_PARTICLE_COUNT,
            bounds: WorldBounds::default(),
            params: SimulationParams::default(),
            max_cell_count: DEFAULT_MAX_CELL_COUNT,
            seed: None,
        }
    }
}

impl FlockConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requested population; clamped to `1..=MAX_PARTICLES` on use.
    pub fn with_particle_count(mut self, count: u32) -> Self {
        self.particle_count = count;
        self
    }

    pub fn with_bounds(mut self, bounds: WorldBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_params(mut self, params: SimulationParams) -> Self {
        self.params = params;
        self
    }

    /// Ceiling on the number of grid cells. `0` disables the density defense.
    pub fn with_max_cell_count(mut self, max_cell_count: u32) -> Self {
        self.max_cell_count = max_cell_count;
        self
    }

    /// Seed for population generation. Unseeded flocks draw from OS entropy.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn particle_count(&self) -> u32 {
        clamp_particle_count(self.particle_count)
    }

    pub fn bounds(&self) -> WorldBounds {
        self.bounds
    }

    pub fn params(&self) -> SimulationParams {
        self.params
    }

    pub(crate) fn spawner(&self) -> SpawnContext {
        match self.seed {
            Some(seed) => SpawnContext::seeded(self.bounds, seed),
            None => SpawnContext::from_entropy(self.bounds),
        }
    }

    pub(crate) fn layout_for(&self, params: &SimulationParams) -> GridLayout {
        GridLayout::new(self.bounds, params.neighbor_radius, self.max_cell_count)
    }
}

/// Reallocation requested but not yet carried out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct PendingRealloc {
    pub(crate) particle_count: Option<u32>,
    pub(crate) grid: bool,
}

impl PendingRealloc {
    pub(crate) fn is_pending(&self) -> bool {
        self.particle_count.is_some() || self.grid
    }
}

/// Boids flock simulated on the CPU.
pub struct Flock {
    config: FlockConfig,
    params: SimulationParams,
    layout: GridLayout,
    grid: CellGrid,
    particles: PingPong<Particle>,
    spawner: SpawnContext,
    ready: ReadyFlag,
    pending: PendingRealloc,
    particle_count: u32,
    tick_count: u64,
    truncated: usize,
}

impl Flock {
    pub fn new(config: FlockConfig) -> Self {
        let params = config.params.sanitized();
        let particle_count = config.particle_count();
        let layout = config.layout_for(&params);
        let mut spawner = config.spawner();
        let population = spawn_population(particle_count, &params, &mut spawner);

        info!(
            "flock: {} particles, grid {}x{}x{} ({} cells, cell size {:.3})",
            particle_count,
            layout.dims().x,
            layout.dims().y,
            layout.dims().z,
            layout.cell_count(),
            layout.cell_size()
        );

        Self {
            grid: CellGrid::new(layout.cell_count() as usize, particle_count as usize),
            particles: PingPong::new(population),
            config,
            params,
            layout,
            spawner,
            ready: ReadyFlag::new(true),
            pending: PendingRealloc::default(),
            particle_count,
            tick_count: 0,
            truncated: 0,
        }
    }

    /// The current buffer: the state produced by the last tick.
    ///
    /// While a reallocation is pending this is still the old population;
    /// check [`Flock::is_ready`] first.
    pub fn particles(&self) -> &[Particle] {
        self.particles.current()
    }

    pub fn particle_count(&self) -> u32 {
        self.particle_count
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    /// Replace the parameters used from the next tick on.
    ///
    /// A neighbor radius change resizes the grid, which schedules a
    /// reallocation.
    pub fn set_params(&mut self, params: SimulationParams) {
        let params = params.sanitized();
        if self.params.neighbor_radius_changed(&params) {
            self.pending.grid = true;
            self.ready.set(false);
        }
        self.params = params;
    }

    /// Schedule a resize to `count` particles (clamped to `1..=MAX_PARTICLES`).
    pub fn request_particle_count(&mut self, count: u32) {
        let count = clamp_particle_count(count);
        self.pending.particle_count = (count != self.particle_count).then_some(count);
        self.ready.set(!self.pending.is_pending());
    }

    /// Carry out a scheduled reallocation now. Returns whether one happened.
    pub fn apply_pending(&mut self) -> bool {
        if !self.pending.is_pending() {
            return false;
        }
        let pending = std::mem::take(&mut self.pending);
        if let Some(count) = pending.particle_count {
            self.particle_count = count;
        }
        self.reallocate();
        true
    }

    fn reallocate(&mut self) {
        self.layout = self.config.layout_for(&self.params);
        self.grid.resize(self.layout.cell_count() as usize, self.particle_count as usize);
        let population = spawn_population(self.particle_count, &self.params, &mut self.spawner);
        self.particles.reset(population);
        self.ready.set(true);

        info!(
            "flock reallocated: {} particles, grid {}x{}x{} ({} cells, cell size {:.3})",
            self.particle_count,
            self.layout.dims().x,
            self.layout.dims().y,
            self.layout.dims().z,
            self.layout.cell_count(),
            self.layout.cell_size()
        );
    }

    /// `true` when no reallocation is pending and the buffers hold a full population.
    pub fn is_ready(&self) -> bool {
        self.ready.is_ready()
    }

    /// Handle on the readiness flag for observers outside the simulation.
    pub fn ready_flag(&self) -> ReadyFlag {
        self.ready.clone()
    }

    /// Advance the simulation by `dt` seconds (clamped, then scaled by `sim_speed`).
    pub fn tick(&mut self, dt: f32) {
        self.apply_pending();
        let dt = clamp_delta(dt) * self.params.sim_speed;

        self.grid.clear();
        self.grid.build(self.particles.current(), &self.layout);

        let grid = &self.grid;
        let layout = &self.layout;
        let params = &self.params;
        let (current, next) = self.particles.split_mut();
        self.truncated = next
            .par_iter_mut()
            .enumerate()
            .map(|(i, out)| {
                let report = step_particle(i as u32, current, grid, layout, params, dt);
                *out = report.particle;
                report.truncated as usize
            })
            .sum();

        self.particles.swap();
        self.tick_count += 1;
    }

    /// Overwrite the current population, e.g. to restore a snapshot.
    ///
    /// Rejected while a reallocation is pending or when the length does not
    /// match the allocated particle count.
    pub fn replace_particles(&mut self, particles: Vec<Particle>) -> Result<(), FlockError> {
        if self.pending.is_pending() {
            warn!("particle injection rejected: reallocation pending");
            return Err(FlockError::NotReady);
        }
        let expected = self.particle_count as usize;
        if particles.len() != expected {
            warn!(
                "particle injection rejected: expected {} particles, got {}",
                expected,
                particles.len()
            );
            return Err(FlockError::ParticleCountMismatch { expected, actual: particles.len() });
        }
        self.particles.reset(particles);
        Ok(())
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    /// Cell lists as built during the last tick.
    pub fn grid(&self) -> &CellGrid {
        &self.grid
    }

    pub fn bounds(&self) -> WorldBounds {
        self.config.bounds
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Particles whose neighbor scan hit the cap during the last tick.
    pub fn truncated_scans(&self) -> usize {
        self.truncated
    }
}
