//! Uniform block shared by the clear, build and step kernels.
//!
//! Everything a kernel needs for one tick is packed into a single 144-byte
//! `FlockParams` uniform: the world box, the grid shape, the scaled time
//! delta and the rule/limit/color parameters. Vectors are stored as
//! `vec4` so the Rust and WGSL layouts agree without hidden padding.

use bytemuck::{Pod, Zeroable};

use crate::params::SimulationParams;
use crate::spatial::GridLayout;

/// CPU mirror of the WGSL `FlockParams` struct.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct FlockUniforms {
    pub world_min: [f32; 4],
    pub world_max: [f32; 4],
    /// `xyz` = grid dimensions, `w` = cell count.
    pub grid_dims: [u32; 4],
    pub cell_size: f32,
    /// Already multiplied by `sim_speed`.
    pub dt: f32,
    pub neighbor_radius: f32,
    pub separation_radius: f32,
    pub weight_separation: f32,
    pub weight_alignment: f32,
    pub weight_cohesion: f32,
    pub min_speed: f32,
    pub max_speed: f32,
    pub max_accel: f32,
    pub center_attraction: f32,
    pub boundary_margin: f32,
    pub boundary_strength: f32,
    pub wrap_bounds: u32,
    pub color_mode: u32,
    pub particle_count: u32,
    pub hue_offset: f32,
    pub hue_range: f32,
    pub saturation: f32,
    pub value: f32,
    pub density_curve: f32,
    pub _pad: [u32; 3],
}

impl FlockUniforms {
    pub fn new(
        params: &SimulationParams,
        layout: &GridLayout,
        particle_count: u32,
        dt: f32,
    ) -> Self {
        let bounds = layout.bounds();
        let dims = layout.dims();
        Self {
            world_min: bounds.min.extend(0.0).to_array(),
            world_max: bounds.max.extend(0.0).to_array(),
            grid_dims: [dims.x, dims.y, dims.z, layout.cell_count()],
            cell_size: layout.cell_size(),
            dt,
            neighbor_radius: params.neighbor_radius,
            separation_radius: params.separation_radius,
            weight_separation: params.weight_separation,
            weight_alignment: params.weight_alignment,
            weight_cohesion: params.weight_cohesion,
            min_speed: params.min_speed,
            max_speed: params.max_speed,
            max_accel: params.max_accel,
            center_attraction: params.center_attraction,
            boundary_margin: params.boundary_margin,
            boundary_strength: params.boundary_strength,
            wrap_bounds: params.is_wrap() as u32,
            color_mode: params.color_mode.as_u32(),
            particle_count,
            hue_offset: params.hue_offset,
            hue_range: params.hue_range,
            saturation: params.saturation,
            value: params.value,
            density_curve: params.density_curve,
            _pad: [0; 3],
        }
    }
}

/// WGSL declaration of the uniform block. Field order must match [`FlockUniforms`].
pub const FLOCK_UNIFORMS_WGSL: &str = r#"
struct FlockParams {
    world_min: vec4<f32>,
    world_max: vec4<f32>,
    grid_dims: vec4<u32>,
    cell_size: f32,
    dt: f32,
    neighbor_radius: f32,
    separation_radius: f32,
    weight_separation: f32,
    weight_alignment: f32,
    weight_cohesion: f32,
    min_speed: f32,
    max_speed: f32,
    max_accel: f32,
    center_attraction: f32,
    boundary_margin: f32,
    boundary_strength: f32,
    wrap_bounds: u32,
    color_mode: u32,
    particle_count: u32,
    hue_offset: f32,
    hue_range: f32,
    saturation: f32,
    value: f32,
    density_curve: f32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
};
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::BoundaryMode;
    use crate::spatial::WorldBounds;

    #[test]
    fn test_uniform_size_is_16_byte_multiple() {
        assert_eq!(std::mem::size_of::<FlockUniforms>(), 144);
        assert_eq!(std::mem::size_of::<FlockUniforms>() % 16, 0);
    }

    #[test]
    fn test_uniforms_from_params() {
        let params = SimulationParams {
            boundary: BoundaryMode::Wrap,
            ..Default::default()
        }
        .sanitized();
        let layout = GridLayout::new(WorldBounds::default(), 2.0, 0);
        let u = FlockUniforms::new(&params, &layout, 500, 0.016);

        assert_eq!(u.grid_dims, [10, 10, 10, 1000]);
        assert_eq!(u.world_min, [-10.0, -10.0, -10.0, 0.0]);
        assert_eq!(u.wrap_bounds, 1);
        assert_eq!(u.color_mode, 1);
        assert_eq!(u.particle_count, 500);
        assert_eq!(u.dt, 0.016);
    }
}
