//! Derived particle color.
//!
//! Presentation only: a pure function of already-computed physical state that
//! never feeds back into the dynamics.

use std::f32::consts::TAU;

use glam::{Vec3, Vec4};

use crate::kernel::NEIGHBOR_SCAN_LIMIT;
use crate::params::{ColorMode, SimulationParams};

/// Alpha at minimum speed.
pub const BASE_ALPHA: f32 = 0.35;
/// Alpha added at maximum speed.
pub const SPEED_ALPHA: f32 = 0.65;

#[inline]
fn fract(x: f32) -> f32 {
    x - x.floor()
}

/// HSV to RGB, all components in `[0, 1]`. Same formula as the step kernel.
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Vec3 {
    let k = Vec3::new(1.0, 2.0 / 3.0, 1.0 / 3.0);
    let p = Vec3::new(fract(h + k.x), fract(h + k.y), fract(h + k.z)) * 6.0 - Vec3::splat(3.0);
    let p = p.abs();
    let chroma = (p - Vec3::ONE).clamp(Vec3::ZERO, Vec3::ONE);
    Vec3::ONE.lerp(chroma, s) * v
}

/// Speed normalized into `[min_speed, max_speed]`, clamped to `[0, 1]`.
pub fn speed_fraction(speed: f32, min_speed: f32, max_speed: f32) -> f32 {
    let span = (max_speed - min_speed).max(1.0e-6);
    ((speed - min_speed) / span).clamp(0.0, 1.0)
}

/// The hue driver `t` for the active color mode.
pub fn color_parameter(params: &SimulationParams, velocity: Vec3, neighbor_count: u32) -> f32 {
    match params.color_mode {
        ColorMode::Solid => 0.0,
        ColorMode::Heading => velocity.z.atan2(velocity.x) / TAU + 0.5,
        ColorMode::Speed => speed_fraction(velocity.length(), params.min_speed, params.max_speed),
        ColorMode::Density => {
            if neighbor_count == 0 {
                0.0
            } else {
                let density = (neighbor_count as f32 / NEIGHBOR_SCAN_LIMIT as f32).clamp(0.0, 1.0);
                density.powf(params.density_curve)
            }
        }
    }
}

/// RGBA for a particle that just finished its step.
pub fn derive_color(params: &SimulationParams, velocity: Vec3, neighbor_count: u32) -> Vec4 {
    let t = color_parameter(params, velocity, neighbor_count);
    let hue = fract(params.hue_offset + params.hue_range * t);
    let rgb = hsv_to_rgb(hue, params.saturation, params.value);
    let speed_t = speed_fraction(velocity.length(), params.min_speed, params.max_speed);
    rgb.extend(BASE_ALPHA + SPEED_ALPHA * speed_t)
}

/// Color given to freshly spawned particles, before their first step.
pub fn spawn_color(heading: Vec3, speed: f32, min_speed: f32, max_speed: f32) -> Vec4 {
    let rgb = Vec3::splat(0.2) + heading.abs() * 0.8;
    rgb.extend(BASE_ALPHA + SPEED_ALPHA * speed_fraction(speed, min_speed, max_speed))
}
