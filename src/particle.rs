//! The particle record shared by the CPU and GPU pipelines.
//!
//! A particle is identified only by its index into a flat array. The layout is
//! fixed at 48 bytes (three `vec4<f32>`), so the same bytes can be uploaded to a
//! storage buffer, bound as a vertex buffer by a renderer, and read back.

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

/// One boid.
///
/// `position.w` is always `1.0` (homogeneous point) and `velocity.w` is always
/// `0.0`. `color` is presentation-only and never feeds back into the dynamics.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Particle {
    pub position: [f32; 4],
    pub velocity: [f32; 4],
    pub color: [f32; 4],
}

impl Particle {
    pub fn new(position: Vec3, velocity: Vec3, color: Vec4) -> Self {
        Self {
            position: position.extend(1.0).to_array(),
            velocity: velocity.extend(0.0).to_array(),
            color: color.to_array(),
        }
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        Vec3::new(self.position[0], self.position[1], self.position[2])
    }

    #[inline]
    pub fn velocity(&self) -> Vec3 {
        Vec3::new(self.velocity[0], self.velocity[1], self.velocity[2])
    }

    #[inline]
    pub fn color(&self) -> Vec4 {
        Vec4::from_array(self.color)
    }

    #[inline]
    pub fn speed(&self) -> f32 {
        self.velocity().length()
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position.extend(1.0).to_array();
    }

    pub fn set_velocity(&mut self, velocity: Vec3) {
        self.velocity = velocity.extend(0.0).to_array();
    }
}

/// WGSL definition matching [`Particle`] byte for byte.
pub const PARTICLE_WGSL: &str = r#"
struct Particle {
    position: vec4<f32>,
    velocity: vec4<f32>,
    color: vec4<f32>,
};
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_particle_layout_is_48_bytes() {
        assert_eq!(std::mem::size_of::<Particle>(), 48);
        assert_eq!(std::mem::align_of::<Particle>(), 4);
    }

    #[test]
    fn test_homogeneous_components() {
        let p = Particle::new(Vec3::new(1.0, 2.0, 3.0), Vec3::new(4.0, 5.0, 6.0), Vec4::ONE);
        assert_eq!(p.position[3], 1.0);
        assert_eq!(p.velocity[3], 0.0);
        assert_eq!(p.position(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(p.velocity(), Vec3::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn test_setters_keep_w() {
        let mut p = Particle::default();
        p.set_position(Vec3::splat(2.0));
        p.set_velocity(Vec3::X);
        assert_eq!(p.position, [2.0, 2.0, 2.0, 1.0]);
        assert_eq!(p.velocity, [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(p.speed(), 1.0);
    }

    #[test]
    fn test_cast_to_bytes() {
        let particles = [Particle::default(); 3];
        let bytes: &[u8] = bytemuck::cast_slice(&particles);
        assert_eq!(bytes.len(), 144);
    }
}
