//! Neighbor query and force/integration engine.
//!
//! Each particle is advanced independently from the current buffer into its
//! own slot of the next buffer:
//!
//! 1. gather up to [`NEIGHBOR_SCAN_LIMIT`] candidates from the 27 surrounding cells
//! 2. accumulate cohesion/alignment/separation sums over candidates in range
//! 3. turn the sums into steering vectors and a weighted acceleration
//! 4. clamp the acceleration to `max_accel`
//! 5. explicit Euler step
//! 6. clamp the speed into `[min_speed, max_speed]`, with a fixed fallback heading
//! 7. wrap or hard-clamp the position into the world box
//! 8. derive the presentation color
//!
//! The stages are separate functions so they can be tested in isolation;
//! [`step_particle`] chains them. [`STEP_BODY_WGSL`] is the same pipeline
//! for the GPU.

use glam::{Vec3, Vec4};

use crate::color::derive_color;
use crate::grid::CellGrid;
use crate::params::{BoundaryMode, SimulationParams};
use crate::particle::{Particle, PARTICLE_WGSL};
use crate::spatial::{GridLayout, WorldBounds, GRID_WGSL};
use crate::uniforms::FLOCK_UNIFORMS_WGSL;

/// Most particles examined per particle per tick.
pub const NEIGHBOR_SCAN_LIMIT: usize = 64;

/// Speeds below this are treated as zero.
pub const SPEED_EPSILON: f32 = 1.0e-6;

/// Squared distance under which two particles count as coincident and
/// contribute no separation.
pub const SEPARATION_EPSILON: f32 = 1.0e-8;

/// Heading substituted for a vanishing velocity.
pub const FALLBACK_HEADING: Vec3 = Vec3::X;

/// Candidate neighbors of one particle, at most [`NEIGHBOR_SCAN_LIMIT`].
#[derive(Clone, Debug)]
pub struct NeighborSet {
    indices: [u32; NEIGHBOR_SCAN_LIMIT],
    len: usize,
    truncated: bool,
}

impl NeighborSet {
    /// Candidate indices sorted ascending.
    pub fn as_slice(&self) -> &[u32] {
        &self.indices[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the scan stopped at the cap with particles left unexamined.
    /// Only a non-truncated set is guaranteed to hold every particle in range.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

/// Examine the cells around `position` and collect other particles' indices.
///
/// The set is sorted before it is returned so that accumulation order does
/// not depend on within-cell list order: below the cap, results are
/// bit-identical whatever interleaving built the grid.
pub fn gather_neighbors(
    index: u32,
    position: Vec3,
    grid: &CellGrid,
    layout: &GridLayout,
) -> NeighborSet {
    let mut set = NeighborSet {
        indices: [0; NEIGHBOR_SCAN_LIMIT],
        len: 0,
        truncated: false,
    };

    'cells: for cell in layout.neighborhood(layout.cell_coords(position)) {
        for other in grid.cell_iter(cell) {
            if other == index {
                continue;
            }
            if set.len == NEIGHBOR_SCAN_LIMIT {
                set.truncated = true;
                break 'cells;
            }
            set.indices[set.len] = other;
            set.len += 1;
        }
    }

    set.indices[..set.len].sort_unstable();
    set
}

/// Running sums over the neighbors in range.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NeighborSums {
    pub position_sum: Vec3,
    pub velocity_sum: Vec3,
    /// Neighbors inside `neighbor_radius`.
    pub count: u32,
    /// Sum of `offset / d²` over neighbors inside `separation_radius`.
    pub repulsion_sum: Vec3,
    pub separation_count: u32,
}

/// `true` when a squared distance is strictly inside `radius`.
#[inline]
pub fn within_radius(distance_sq: f32, radius: f32) -> bool {
    distance_sq < radius * radius
}

pub fn accumulate(
    position: Vec3,
    candidates: &[u32],
    particles: &[Particle],
    params: &SimulationParams,
) -> NeighborSums {
    let mut sums = NeighborSums::default();

    for &j in candidates {
        let other = &particles[j as usize];
        let other_pos = other.position();
        let offset = position - other_pos;
        let d2 = offset.length_squared();

        if !within_radius(d2, params.neighbor_radius) {
            continue;
        }
        sums.position_sum += other_pos;
        sums.velocity_sum += other.velocity();
        sums.count += 1;

        if within_radius(d2, params.separation_radius) && d2 > SEPARATION_EPSILON {
            // unit direction weighted by 1/d
            sums.repulsion_sum += offset / d2;
            sums.separation_count += 1;
        }
    }

    sums
}

/// The three flocking rules as steering vectors.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Steering {
    pub cohesion: Vec3,
    pub alignment: Vec3,
    pub separation: Vec3,
}

pub fn steering(position: Vec3, velocity: Vec3, sums: &NeighborSums) -> Steering {
    let mut out = Steering::default();
    if sums.count > 0 {
        let inv = 1.0 / sums.count as f32;
        out.cohesion = sums.position_sum * inv - position;
        out.alignment = sums.velocity_sum * inv - velocity;
    }
    if sums.separation_count > 0 {
        out.separation = sums.repulsion_sum / sums.separation_count as f32;
    }
    out
}

/// Steering force away from the faces, growing linearly across the margin band.
pub fn boundary_avoidance(
    position: Vec3,
    bounds: &WorldBounds,
    margin: f32,
    strength: f32,
) -> Vec3 {
    let margin = margin.max(1.0e-4);
    let inner_min = bounds.min + Vec3::splat(margin);
    let inner_max = bounds.max - Vec3::splat(margin);
    let push_up = (inner_min - position).max(Vec3::ZERO);
    let push_down = (position - inner_max).max(Vec3::ZERO);
    (push_up - push_down) / margin * strength
}

/// Weighted rule sum plus center pull and, in soft mode, boundary avoidance.
/// Not yet clamped.
pub fn acceleration(
    position: Vec3,
    steer: &Steering,
    params: &SimulationParams,
    bounds: &WorldBounds,
) -> Vec3 {
    let mut accel = steer.separation * params.weight_separation
        + steer.alignment * params.weight_alignment
        + steer.cohesion * params.weight_cohesion;

    accel += (bounds.center() - position) * params.center_attraction;

    if params.boundary == BoundaryMode::Soft {
        accel += boundary_avoidance(
            position,
            bounds,
            params.boundary_margin,
            params.boundary_strength,
        );
    }

    accel
}

/// Rescale `v` onto `max_len` if it is longer, keeping its direction.
pub fn clamp_length(v: Vec3, max_len: f32) -> Vec3 {
    let len = v.length();
    if len > max_len && len > 0.0 {
        v * (max_len / len)
    } else {
        v
    }
}

/// Explicit Euler: velocity first, then position with the new velocity.
#[inline]
pub fn integrate(position: Vec3, velocity: Vec3, accel: Vec3, dt: f32) -> (Vec3, Vec3) {
    let velocity = velocity + accel * dt;
    (position + velocity * dt, velocity)
}

/// Rescale `velocity` so its magnitude lies in `[min_speed, max_speed]`.
///
/// A numerically vanishing velocity has no direction to keep; it is replaced
/// by [`FALLBACK_HEADING`] at `min_speed` instead of being normalized.
pub fn clamp_speed(velocity: Vec3, min_speed: f32, max_speed: f32) -> Vec3 {
    let speed = velocity.length();
    if speed.is_nan() || speed < SPEED_EPSILON {
        return FALLBACK_HEADING * min_speed;
    }
    let target = speed.max(min_speed).min(max_speed);
    velocity * (target / speed)
}

fn wrap_axis(p: f32, lo: f32, hi: f32) -> f32 {
    let extent = hi - lo;
    let q = if p > hi {
        p - extent
    } else if p < lo {
        p + extent
    } else {
        p
    };
    if q < lo || q > hi {
        // moved more than a full box in one tick
        lo + (q - lo).rem_euclid(extent)
    } else {
        q
    }
}

/// Post-integration containment, independent of any steering force.
pub fn enforce_boundary(position: Vec3, bounds: &WorldBounds, mode: BoundaryMode) -> Vec3 {
    match mode {
        BoundaryMode::Wrap => Vec3::new(
            wrap_axis(position.x, bounds.min.x, bounds.max.x),
            wrap_axis(position.y, bounds.min.y, bounds.max.y),
            wrap_axis(position.z, bounds.min.z, bounds.max.z),
        ),
        BoundaryMode::Soft => position.max(bounds.min).min(bounds.max),
    }
}

/// What one step did to a particle, besides the new state.
#[derive(Clone, Copy, Debug)]
pub struct StepReport {
    pub particle: Particle,
    /// Acceleration actually applied (after the clamp).
    pub acceleration: Vec3,
    pub neighbor_count: u32,
    pub truncated: bool,
}

/// Advance particle `index` by `dt` (already scaled by `sim_speed`).
///
/// Reads only the current buffer and the grid; the result belongs in slot
/// `index` of the next buffer.
pub fn step_particle(
    index: u32,
    particles: &[Particle],
    grid: &CellGrid,
    layout: &GridLayout,
    params: &SimulationParams,
    dt: f32,
) -> StepReport {
    let me = &particles[index as usize];
    let position = me.position();
    let velocity = me.velocity();
    let bounds = layout.bounds();

    let neighbors = gather_neighbors(index, position, grid, layout);
    let sums = accumulate(position, neighbors.as_slice(), particles, params);
    let steer = steering(position, velocity, &sums);
    let accel = clamp_length(acceleration(position, &steer, params, &bounds), params.max_accel);

    let (new_position, new_velocity) = integrate(position, velocity, accel, dt);
    let new_velocity = clamp_speed(new_velocity, params.min_speed, params.max_speed);

    let new_position = if new_position.is_finite() {
        enforce_boundary(new_position, &bounds, params.boundary)
    } else {
        bounds.center()
    };
    let new_velocity = if new_velocity.is_finite() {
        new_velocity
    } else {
        FALLBACK_HEADING * params.min_speed
    };

    let color: Vec4 = derive_color(params, new_velocity, sums.count);

    StepReport {
        particle: Particle::new(new_position, new_velocity, color),
        acceleration: accel,
        neighbor_count: sums.count,
        truncated: neighbors.is_truncated(),
    }
}

/// Step kernel. One invocation per particle; reads `particles_in`, the cell
/// lists, and writes only its own slot of `particles_out`.
///
/// Candidates are accumulated in list order rather than sorted, so GPU output
/// matches the CPU path only up to float reassociation.
pub const STEP_BODY_WGSL: &str = r#"
const NEIGHBOR_SCAN_LIMIT: u32 = 64u;
const SPEED_EPSILON: f32 = 1e-6;
const SEPARATION_EPSILON: f32 = 1e-8;
const FALLBACK_HEADING: vec3<f32> = vec3<f32>(1.0, 0.0, 0.0);
const BASE_ALPHA: f32 = 0.35;
const SPEED_ALPHA: f32 = 0.65;
const TAU: f32 = 6.283185307;

@group(0) @binding(0) var<storage, read> particles_in: array<Particle>;
@group(0) @binding(1) var<storage, read_write> particles_out: array<Particle>;
@group(0) @binding(2) var<storage, read> cell_heads: array<u32>;
@group(0) @binding(3) var<storage, read> next_index: array<u32>;
@group(0) @binding(4) var<uniform> params: FlockParams;

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> vec3<f32> {
    let k = vec3<f32>(1.0, 2.0 / 3.0, 1.0 / 3.0);
    let p = abs(fract(vec3<f32>(h) + k) * 6.0 - vec3<f32>(3.0));
    return mix(vec3<f32>(1.0), clamp(p - vec3<f32>(1.0), vec3<f32>(0.0), vec3<f32>(1.0)), s) * v;
}

fn speed_fraction(speed: f32) -> f32 {
    let span = max(params.max_speed - params.min_speed, 1e-6);
    return clamp((speed - params.min_speed) / span, 0.0, 1.0);
}

fn boundary_avoidance(pos: vec3<f32>) -> vec3<f32> {
    let margin = max(params.boundary_margin, 1e-4);
    let inner_min = params.world_min.xyz + vec3<f32>(margin);
    let inner_max = params.world_max.xyz - vec3<f32>(margin);
    let push_up = max(inner_min - pos, vec3<f32>(0.0));
    let push_down = max(pos - inner_max, vec3<f32>(0.0));
    return (push_up - push_down) / margin * params.boundary_strength;
}

// Exponent bits all set means inf or NaN.
fn is_finite3(v: vec3<f32>) -> bool {
    let exponent = bitcast<vec3<u32>>(v) & vec3<u32>(0x7f800000u);
    return all(exponent != vec3<u32>(0x7f800000u));
}

fn wrap_position(p: vec3<f32>) -> vec3<f32> {
    let lo = params.world_min.xyz;
    let hi = params.world_max.xyz;
    let extent = hi - lo;
    var q = select(p, p - extent, p > hi);
    q = select(q, q + extent, p < lo);
    let folded = lo + (q - lo) - extent * floor((q - lo) / extent);
    q = select(q, folded, q < lo);
    return select(q, folded, q > hi);
}

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let idx = global_id.x;
    if idx >= params.particle_count {
        return;
    }

    let me = particles_in[idx];
    let pos = me.position.xyz;
    let vel = me.velocity.xyz;

    let r2 = params.neighbor_radius * params.neighbor_radius;
    let s2 = params.separation_radius * params.separation_radius;

    var position_sum = vec3<f32>(0.0);
    var velocity_sum = vec3<f32>(0.0);
    var count = 0u;
    var repulsion_sum = vec3<f32>(0.0);
    var separation_count = 0u;
    var examined = 0u;

    let home = cell_coords(pos);
    let dims = vec3<i32>(params.grid_dims.xyz);

    for (var dz = -1; dz <= 1; dz++) {
        for (var dy = -1; dy <= 1; dy++) {
            for (var dx = -1; dx <= 1; dx++) {
                let cell = home + vec3<i32>(dx, dy, dz);
                if any(cell < vec3<i32>(0)) || any(cell >= dims) {
                    continue;
                }
                var j = cell_heads[flatten_cell(cell)];
                loop {
                    if j == EMPTY_CELL || examined >= NEIGHBOR_SCAN_LIMIT {
                        break;
                    }
                    if j != idx {
                        examined += 1u;
                        let other = particles_in[j];
                        let offset = pos - other.position.xyz;
                        let d2 = dot(offset, offset);
                        if d2 < r2 {
                            position_sum += other.position.xyz;
                            velocity_sum += other.velocity.xyz;
                            count += 1u;
                            if d2 < s2 && d2 > SEPARATION_EPSILON {
                                repulsion_sum += offset / d2;
                                separation_count += 1u;
                            }
                        }
                    }
                    j = next_index[j];
                }
            }
        }
    }

    var cohesion = vec3<f32>(0.0);
    var alignment = vec3<f32>(0.0);
    var separation = vec3<f32>(0.0);
    if count > 0u {
        let inv = 1.0 / f32(count);
        cohesion = position_sum * inv - pos;
        alignment = velocity_sum * inv - vel;
    }
    if separation_count > 0u {
        separation = repulsion_sum / f32(separation_count);
    }

    var accel = separation * params.weight_separation
        + alignment * params.weight_alignment
        + cohesion * params.weight_cohesion;
    let center = 0.5 * (params.world_min.xyz + params.world_max.xyz);
    accel += (center - pos) * params.center_attraction;
    if params.wrap_bounds == 0u {
        accel += boundary_avoidance(pos);
    }

    let accel_len = length(accel);
    if accel_len > params.max_accel && accel_len > 0.0 {
        accel *= params.max_accel / accel_len;
    }

    var new_vel = vel + accel * params.dt;
    var new_pos = pos + new_vel * params.dt;

    let speed = length(new_vel);
    if !(speed >= SPEED_EPSILON) {
        new_vel = FALLBACK_HEADING * params.min_speed;
    } else {
        new_vel *= clamp(speed, params.min_speed, params.max_speed) / speed;
    }
    if !is_finite3(new_vel) {
        new_vel = FALLBACK_HEADING * params.min_speed;
    }

    if !is_finite3(new_pos) {
        new_pos = center;
    } else if params.wrap_bounds != 0u {
        new_pos = wrap_position(new_pos);
    } else {
        new_pos = clamp(new_pos, params.world_min.xyz, params.world_max.xyz);
    }

    let speed_t = speed_fraction(length(new_vel));
    var t = 0.0;
    switch params.color_mode {
        case 1u: {
            t = atan2(new_vel.z, new_vel.x) / TAU + 0.5;
        }
        case 2u: {
            t = speed_t;
        }
        case 3u: {
            if count > 0u {
                let fill = clamp(f32(count) / f32(NEIGHBOR_SCAN_LIMIT), 0.0, 1.0);
                t = pow(fill, params.density_curve);
            }
        }
        default: {
            t = 0.0;
        }
    }
    let hue = fract(params.hue_offset + params.hue_range * t);
    let rgb = hsv_to_rgb(hue, params.saturation, params.value);

    particles_out[idx] = Particle(
        vec4<f32>(new_pos, 1.0),
        vec4<f32>(new_vel, 0.0),
        vec4<f32>(rgb, BASE_ALPHA + SPEED_ALPHA * speed_t),
    );
}
"#;

/// Complete WGSL source of the step kernel.
pub fn step_shader_source() -> String {
    format!("{PARTICLE_WGSL}\n{FLOCK_UNIFORMS_WGSL}\n{GRID_WGSL}\n{STEP_BODY_WGSL}")
}
