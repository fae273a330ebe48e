//! Uniform spatial hash grid over an axis-aligned world box.
//!
//! The grid itself is just arithmetic: [`GridLayout`] maps positions to cells
//! and enumerates the 27-cell neighborhood. The per-cell linked lists live in
//! [`crate::grid::CellGrid`] on the CPU and in storage buffers on the GPU;
//! both are built with the clear/build kernels whose WGSL is defined here.

use glam::{IVec3, UVec3, Vec3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::particle::PARTICLE_WGSL;
use crate::uniforms::FLOCK_UNIFORMS_WGSL;

/// Marks an empty cell head or the end of a cell's list.
pub const EMPTY_CELL: u32 = u32::MAX;

/// Smallest cell size ever used, whatever the neighbor radius.
pub const MIN_CELL_SIZE: f32 = 0.5;

/// Default ceiling on the total number of cells.
pub const DEFAULT_MAX_CELL_COUNT: u32 = 1 << 20;

/// Retries of the geometric cell-size scale-up.
const DENSITY_DEFENSE_RETRIES: usize = 4;

/// Axis-aligned world box `[min, max]`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WorldBounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self::cube(10.0)
    }
}

impl WorldBounds {
    /// Builds a box from two corners, in either order.
    ///
    /// Degenerate axes are widened to a small positive extent so that cell
    /// math and random spawning stay well defined.
    pub fn new(a: Vec3, b: Vec3) -> Self {
        let min = a.min(b);
        let mut max = a.max(b);
        for axis in 0..3 {
            if max[axis] - min[axis] < 1.0e-3 {
                max[axis] = min[axis] + 1.0e-3;
            }
        }
        Self { min, max }
    }

    /// Cube centered on the origin, `[-half_size, half_size]^3`.
    pub fn cube(half_size: f32) -> Self {
        let h = half_size.abs();
        Self::new(Vec3::splat(-h), Vec3::splat(h))
    }

    #[inline]
    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }
}

/// Cell size, dimensions and cell count derived from the world box and the
/// neighbor radius.
///
/// Only recomputed when the particle count or the neighbor radius changes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridLayout {
    bounds: WorldBounds,
    cell_size: f32,
    dims: UVec3,
    cell_count: u32,
}

impl GridLayout {
    /// Sizes cells to at least `neighbor_radius`, then enlarges them until the
    /// cell count fits under `max_cell_count` (a zero ceiling disables the check).
    pub fn new(bounds: WorldBounds, neighbor_radius: f32, max_cell_count: u32) -> Self {
        let radius = if neighbor_radius.is_finite() { neighbor_radius } else { MIN_CELL_SIZE };
        let mut layout = Self::with_cell_size(bounds, radius.max(MIN_CELL_SIZE));

        if max_cell_count > 0 && layout.cell_count > max_cell_count {
            let requested = (layout.cell_size, layout.cell_count);
            // Usually one pass; ceil() can overshoot slightly.
            for _ in 0..DENSITY_DEFENSE_RETRIES {
                if layout.cell_count <= max_cell_count {
                    break;
                }
                let scale = (layout.cell_count as f32 / max_cell_count as f32).cbrt();
                layout = Self::with_cell_size(bounds, layout.cell_size * scale * 1.001);
            }
            log::warn!(
                "grid of {} cells exceeds budget {}; cell size enlarged {:.3} -> {:.3}",
                requested.1,
                max_cell_count,
                requested.0,
                layout.cell_size
            );
        }

        layout
    }

    fn with_cell_size(bounds: WorldBounds, cell_size: f32) -> Self {
        let size = bounds.extent();
        let axis = |extent: f32| ((extent / cell_size).ceil() as u32).max(1);
        let dims = UVec3::new(axis(size.x), axis(size.y), axis(size.z));
        let cell_count = dims.x.saturating_mul(dims.y).saturating_mul(dims.z);
        Self { bounds, cell_size, dims, cell_count }
    }

    #[inline]
    pub fn bounds(&self) -> WorldBounds {
        self.bounds
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    #[inline]
    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    #[inline]
    pub fn cell_count(&self) -> u32 {
        self.cell_count
    }

    /// Integer cell coordinates of `pos`, clamped into the grid.
    ///
    /// Positions that drifted outside the box (or are not finite) land in the
    /// nearest border cell.
    pub fn cell_coords(&self, pos: Vec3) -> IVec3 {
        let rel = ((pos - self.bounds.min) / self.cell_size).floor();
        let hi = (self.dims - UVec3::ONE).as_vec3();
        // f32::max/min drop NaN, so a NaN coordinate ends up at 0.
        let clamped = Vec3::new(
            rel.x.max(0.0).min(hi.x),
            rel.y.max(0.0).min(hi.y),
            rel.z.max(0.0).min(hi.z),
        );
        clamped.as_ivec3()
    }

    /// `x + dims.x * (y + dims.y * z)`. `cell` must be inside the grid.
    #[inline]
    pub fn flatten(&self, cell: IVec3) -> usize {
        let d = self.dims.as_ivec3();
        (cell.x + d.x * (cell.y + d.y * cell.z)) as usize
    }

    #[inline]
    pub fn cell_index(&self, pos: Vec3) -> usize {
        self.flatten(self.cell_coords(pos))
    }

    pub fn in_grid(&self, cell: IVec3) -> bool {
        let d = self.dims.as_ivec3();
        cell.cmpge(IVec3::ZERO).all() && cell.cmplt(d).all()
    }

    /// Flat indices of the up-to-27 cells around `center`, z-major then y then x,
    /// skipping cells outside the grid.
    pub fn neighborhood(&self, center: IVec3) -> impl Iterator<Item = usize> + '_ {
        (-1..=1).flat_map(move |dz| {
            (-1..=1).flat_map(move |dy| {
                (-1..=1).filter_map(move |dx| {
                    let cell = center + IVec3::new(dx, dy, dz);
                    self.in_grid(cell).then(|| self.flatten(cell))
                })
            })
        })
    }
}

/// Cell coordinate helpers shared by the build and step kernels.
///
/// Mirrors [`GridLayout::cell_coords`] and [`GridLayout::flatten`].
pub const GRID_WGSL: &str = r#"
const EMPTY_CELL: u32 = 0xFFFFFFFFu;

fn cell_coords(pos: vec3<f32>) -> vec3<i32> {
    let rel = floor((pos - params.world_min.xyz) / params.cell_size);
    let hi = vec3<f32>(params.grid_dims.xyz - vec3<u32>(1u));
    // NaN lands at 0 on that axis, as on the CPU.
    let magnitude = bitcast<vec3<u32>>(rel) & vec3<u32>(0x7fffffffu);
    let is_nan = magnitude > vec3<u32>(0x7f800000u);
    return vec3<i32>(clamp(select(rel, vec3<f32>(0.0), is_nan), vec3<f32>(0.0), hi));
}

fn flatten_cell(cell: vec3<i32>) -> u32 {
    let dims = vec3<i32>(params.grid_dims.xyz);
    return u32(cell.x + dims.x * (cell.y + dims.y * cell.z));
}
"#;

/// Resets every cell head to the empty sentinel. One invocation per cell.
pub const CLEAR_BODY_WGSL: &str = r#"
@group(0) @binding(2) var<storage, read_write> cell_heads: array<u32>;
@group(0) @binding(4) var<uniform> params: FlockParams;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let idx = global_id.x;
    if idx >= params.grid_dims.w {
        return;
    }
    cell_heads[idx] = EMPTY_CELL;
}
"#;

/// Files every particle into its cell's list. One invocation per particle.
///
/// The atomic exchange is the only contested operation of the whole tick:
/// concurrent inserts into one cell each receive a distinct previous head, so
/// no entry is ever lost.
pub const BUILD_BODY_WGSL: &str = r#"
@group(0) @binding(0) var<storage, read> particles_in: array<Particle>;
@group(0) @binding(2) var<storage, read_write> cell_heads: array<atomic<u32>>;
@group(0) @binding(3) var<storage, read_write> next_index: array<u32>;
@group(0) @binding(4) var<uniform> params: FlockParams;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let idx = global_id.x;
    if idx >= params.particle_count {
        return;
    }

    let cell = flatten_cell(cell_coords(particles_in[idx].position.xyz));
    let previous = atomicExchange(&cell_heads[cell], idx);
    next_index[idx] = previous;
}
"#;

/// Complete WGSL source of the clear kernel.
pub fn clear_shader_source() -> String {
    format!("{FLOCK_UNIFORMS_WGSL}\n{GRID_WGSL}\n{CLEAR_BODY_WGSL}")
}

/// Complete WGSL source of the build kernel.
pub fn build_shader_source() -> String {
    format!("{PARTICLE_WGSL}\n{FLOCK_UNIFORMS_WGSL}\n{GRID_WGSL}\n{BUILD_BODY_WGSL}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grid_dims() {
        let layout = GridLayout::new(WorldBounds::default(), 2.0, DEFAULT_MAX_CELL_COUNT);
        assert_eq!(layout.cell_size(), 2.0);
        assert_eq!(layout.dims(), UVec3::splat(10));
        assert_eq!(layout.cell_count(), 1000);
    }

    #[test]
    fn test_cell_size_never_below_minimum() {
        let layout = GridLayout::new(WorldBounds::default(), 0.05, 0);
        assert_eq!(layout.cell_size(), MIN_CELL_SIZE);
        assert_eq!(layout.dims(), UVec3::splat(40));
    }

    #[test]
    fn test_density_defense_caps_cell_count() {
        let layout = GridLayout::new(WorldBounds::cube(100.0), 0.05, 1000);
        assert!(layout.cell_count() <= 1000, "got {}", layout.cell_count());
        assert!(layout.cell_size() > MIN_CELL_SIZE);
    }

    #[test]
    fn test_density_defense_untouched_when_under_budget() {
        let layout = GridLayout::new(WorldBounds::default(), 1.0, 1 << 20);
        assert_eq!(layout.cell_size(), 1.0);
    }

    #[test]
    fn test_cell_coords_clamp_outside_points() {
        let layout = GridLayout::new(WorldBounds::default(), 2.0, 0);
        assert_eq!(layout.cell_coords(Vec3::splat(-50.0)), IVec3::ZERO);
        assert_eq!(layout.cell_coords(Vec3::splat(50.0)), IVec3::splat(9));
        assert_eq!(layout.cell_coords(Vec3::splat(10.0)), IVec3::splat(9));
        assert_eq!(layout.cell_coords(Vec3::splat(f32::NAN)), IVec3::ZERO);
    }

    #[test]
    fn test_flatten_order() {
        let layout = GridLayout::new(WorldBounds::default(), 2.0, 0);
        assert_eq!(layout.flatten(IVec3::new(1, 0, 0)), 1);
        assert_eq!(layout.flatten(IVec3::new(0, 1, 0)), 10);
        assert_eq!(layout.flatten(IVec3::new(0, 0, 1)), 100);
        assert_eq!(layout.flatten(IVec3::splat(9)), 999);
    }

    #[test]
    fn test_neighborhood_interior_and_corner() {
        let layout = GridLayout::new(WorldBounds::default(), 2.0, 0);
        assert_eq!(layout.neighborhood(IVec3::splat(5)).count(), 27);
        assert_eq!(layout.neighborhood(IVec3::ZERO).count(), 8);
        assert_eq!(layout.neighborhood(IVec3::new(0, 5, 5)).count(), 18);
    }

    #[test]
    fn test_bounds_normalize_corners() {
        let b = WorldBounds::new(Vec3::new(1.0, -1.0, 0.0), Vec3::new(-1.0, 1.0, 0.0));
        assert_eq!(b.min, Vec3::new(-1.0, -1.0, 0.0));
        assert!(b.max.z > b.min.z);
        assert!(b.contains(Vec3::new(0.0, 0.0, 0.0)));
    }
}
