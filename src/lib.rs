//! # gridflock
//!
//! Boids flocking on a uniform spatial hash grid, with a parallel CPU backend
//! and a wgpu compute backend that share one contract.
//!
//! ## Quick Start
//!
//! ```ignore
//! use gridflock::prelude::*;
//!
//! let mut flock = Flock::new(
//!     FlockConfig::new()
//!         .with_particle_count(20_000)
//!         .with_params(SimulationParams { boundary: BoundaryMode::Wrap, ..Default::default() })
//!         .with_seed(7),
//! );
//! let mut time = Time::new();
//! loop {
//!     flock.tick(time.update());
//!     render(flock.particles());
//! }
//! ```
//!
//! ## One tick
//!
//! Every tick runs three phases with a full barrier between them:
//!
//! 1. **Clear**: every cell head is reset to [`EMPTY_CELL`].
//! 2. **Build**: every particle pushes itself onto its cell's list with an
//!    atomic exchange on the cell head. This is the only contested write.
//! 3. **Step**: every particle scans the 27 surrounding cells (examining at
//!    most [`NEIGHBOR_SCAN_LIMIT`] others), applies separation, alignment and
//!    cohesion, clamps acceleration and speed, integrates, enforces the
//!    boundary and derives its color. It writes only its own slot of the
//!    other particle buffer.
//!
//! The buffers then swap. Changing the particle count or the neighbor radius
//! reallocates storage and regenerates the population; the
//! [`ReadyFlag`] is cleared until that completes.
//!
//! ## Backends
//!
//! | Backend | Parallelism | State lives in |
//! |---------|-------------|----------------|
//! | [`Flock`] | rayon, one task per cell or particle | host memory |
//! | [`GpuFlock`] | wgpu compute, workgroups of 256 | GPU buffers |

pub mod buffers;
pub mod color;
pub mod error;
pub mod flock;
pub mod gpu;
pub mod grid;
pub mod kernel;
pub mod params;
pub mod particle;
pub mod spatial;
pub mod spawn;
pub mod time;
pub mod uniforms;

pub use bytemuck;
pub use glam::{Vec3, Vec4};

pub use buffers::{clamp_particle_count, PingPong, ReadyFlag, DEFAULT_PARTICLE_COUNT, MAX_PARTICLES};
pub use error::{FlockError, GpuError};
pub use flock::{Flock, FlockConfig};
pub use gpu::{GpuContext, GpuFlock};
pub use grid::CellGrid;
pub use kernel::NEIGHBOR_SCAN_LIMIT;
pub use params::{BoundaryMode, ColorMode, SimulationParams};
pub use particle::Particle;
pub use spatial::{GridLayout, WorldBounds, EMPTY_CELL};
pub use spawn::SpawnContext;
pub use time::Time;

/// Convenient re-exports for common usage.
///
/// ```ignore
/// use gridflock::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{FlockError, GpuError};
    pub use crate::flock::{Flock, FlockConfig};
    pub use crate::gpu::{GpuContext, GpuFlock};
    pub use crate::params::{BoundaryMode, ColorMode, SimulationParams};
    pub use crate::particle::Particle;
    pub use crate::spatial::WorldBounds;
    pub use crate::time::Time;
    pub use crate::{Vec3, Vec4};
}
