//! Per-tick simulation parameters.
//!
//! The caller owns these values and hands them to the flock every time they
//! change. They are assumed valid, but both backends pass them through
//! [`SimulationParams::sanitized`] first: a single tick of corrupted state
//! would otherwise persist forever, since each tick's output is the next
//! tick's input.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Edge-of-world policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BoundaryMode {
    /// Steer away from the faces inside a margin band, then hard-clamp into the box.
    #[default]
    Soft,
    /// Toroidal topology: leaving through one face re-enters through the opposite one.
    Wrap,
}

/// Scalar that drives the derived particle hue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ColorMode {
    /// Constant hue (`hue_offset`).
    Solid,
    /// Yaw of the velocity in the XZ plane.
    #[default]
    Heading,
    /// Speed normalized into `[min_speed, max_speed]`.
    Speed,
    /// Neighbor count normalized by the scan cap, shaped by `density_curve`.
    Density,
}

impl ColorMode {
    /// Numeric id used by the GPU kernel.
    pub fn as_u32(self) -> u32 {
        match self {
            ColorMode::Solid => 0,
            ColorMode::Heading => 1,
            ColorMode::Speed => 2,
            ColorMode::Density => 3,
        }
    }

    /// Out-of-range ids fall back to `Solid`.
    pub fn from_u32(id: u32) -> Self {
        match id {
            1 => ColorMode::Heading,
            2 => ColorMode::Speed,
            3 => ColorMode::Density,
            _ => ColorMode::Solid,
        }
    }
}

/// Flocking rules, limits, boundary handling and coloring.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SimulationParams {
    /// Alignment/cohesion neighborhood. Also sets the grid cell size.
    pub neighbor_radius: f32,
    /// Separation neighborhood, never larger than `neighbor_radius` after sanitizing.
    pub separation_radius: f32,
    pub weight_separation: f32,
    pub weight_alignment: f32,
    pub weight_cohesion: f32,
    pub min_speed: f32,
    pub max_speed: f32,
    /// Acceleration magnitude ceiling applied before integration.
    pub max_accel: f32,
    /// Time-scale multiplier applied to every tick's delta.
    pub sim_speed: f32,
    /// Pull toward the world center, proportional to distance.
    pub center_attraction: f32,
    pub boundary: BoundaryMode,
    /// Width of the soft-boundary band.
    pub boundary_margin: f32,
    /// Soft-boundary steering gain at full penetration of the band.
    pub boundary_strength: f32,
    pub color_mode: ColorMode,
    pub hue_offset: f32,
    pub hue_range: f32,
    pub saturation: f32,
    pub value: f32,
    /// Exponent applied to the normalized density in [`ColorMode::Density`].
    pub density_curve: f32,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            neighbor_radius: 1.34,
            separation_radius: 2.07,
            weight_separation: 1.85,
            weight_alignment: 1.37,
            weight_cohesion: 0.5,
            min_speed: 1.0,
            max_speed: 10.0,
            max_accel: 8.0,
            sim_speed: 1.0,
            center_attraction: 0.3,
            boundary: BoundaryMode::Soft,
            boundary_margin: 5.0,
            boundary_strength: 10.0,
            color_mode: ColorMode::Heading,
            hue_offset: 0.0,
            hue_range: 0.7,
            saturation: 0.4,
            value: 1.0,
            density_curve: 1.0,
        }
    }
}

/// Clamp into `[lo, hi]`, replacing non-finite input with `fallback` first.
fn limit(value: f32, lo: f32, hi: f32, fallback: f32) -> f32 {
    let v = if value.is_finite() { value } else { fallback };
    v.max(lo).min(hi)
}

impl SimulationParams {
    /// Clamp every field into its supported range.
    ///
    /// Idempotent. Note that the default `separation_radius` is larger than the
    /// default `neighbor_radius` and is pulled down to it here.
    pub fn sanitized(&self) -> Self {
        let d = Self::default();

        let neighbor_radius = limit(self.neighbor_radius, 0.05, 50.0, d.neighbor_radius);
        let min_speed = limit(self.min_speed, 0.0, 1000.0, d.min_speed);
        let max_speed_floor = (min_speed + 1.0e-3).max(0.01);

        Self {
            neighbor_radius,
            separation_radius: limit(
                self.separation_radius,
                0.01,
                neighbor_radius,
                d.separation_radius,
            ),
            weight_separation: limit(self.weight_separation, 0.0, 50.0, d.weight_separation),
            weight_alignment: limit(self.weight_alignment, 0.0, 50.0, d.weight_alignment),
            weight_cohesion: limit(self.weight_cohesion, 0.0, 50.0, d.weight_cohesion),
            min_speed,
            max_speed: limit(self.max_speed, max_speed_floor, 1000.0, d.max_speed),
            max_accel: limit(self.max_accel, 0.0, 10000.0, d.max_accel),
            sim_speed: limit(self.sim_speed, 0.1, 2.0, d.sim_speed),
            center_attraction: limit(self.center_attraction, 0.0, 1000.0, d.center_attraction),
            boundary: self.boundary,
            boundary_margin: limit(self.boundary_margin, 0.01, 1000.0, d.boundary_margin),
            boundary_strength: limit(self.boundary_strength, 0.0, 10000.0, d.boundary_strength),
            color_mode: self.color_mode,
            hue_offset: limit(self.hue_offset, 0.0, 1.0, d.hue_offset),
            hue_range: limit(self.hue_range, 0.0, 1.0, d.hue_range),
            saturation: limit(self.saturation, 0.0, 1.0, d.saturation),
            value: limit(self.value, 0.0, 1.0, d.value),
            density_curve: limit(self.density_curve, 0.1, 8.0, d.density_curve),
        }
    }

    /// Whether switching from `self` to `other` moves the neighbor radius enough
    /// to require a new grid (and therefore a reallocation).
    pub fn neighbor_radius_changed(&self, other: &SimulationParams) -> bool {
        (self.neighbor_radius - other.neighbor_radius).abs() > NEIGHBOR_RADIUS_EPSILON
    }

    pub fn is_wrap(&self) -> bool {
        self.boundary == BoundaryMode::Wrap
    }
}

/// Smallest neighbor radius change that triggers a grid rebuild.
pub const NEIGHBOR_RADIUS_EPSILON: f32 = 1.0e-4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sanitizes_separation_radius() {
        let p = SimulationParams::default().sanitized();
        assert_eq!(p.separation_radius, p.neighbor_radius);
        assert_eq!(p.neighbor_radius, 1.34);
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let p = SimulationParams {
            neighbor_radius: 0.0,
            min_speed: 5.0,
            max_speed: 1.0,
            boundary_strength: 1.0e9,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(p, p.sanitized());
    }

    #[test]
    fn test_sanitize_speed_ordering() {
        let p = SimulationParams {
            min_speed: 5.0,
            max_speed: 1.0,
            ..Default::default()
        }
        .sanitized();
        assert!(p.max_speed > p.min_speed);
        assert!((p.max_speed - 5.001).abs() < 1e-4);
    }

    #[test]
    fn test_sanitize_non_finite_falls_back() {
        let p = SimulationParams {
            neighbor_radius: f32::NAN,
            max_accel: f32::INFINITY,
            hue_range: f32::NEG_INFINITY,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(p.neighbor_radius, 1.34);
        assert_eq!(p.max_accel, 8.0);
        assert_eq!(p.hue_range, 0.7);
    }

    #[test]
    fn test_sanitize_clamps_ranges() {
        let p = SimulationParams {
            neighbor_radius: 0.0,
            separation_radius: 0.0,
            weight_separation: -3.0,
            sim_speed: 10.0,
            boundary_margin: 0.0,
            density_curve: 100.0,
            saturation: 2.0,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(p.neighbor_radius, 0.05);
        assert_eq!(p.separation_radius, 0.01);
        assert_eq!(p.weight_separation, 0.0);
        assert_eq!(p.sim_speed, 2.0);
        assert_eq!(p.boundary_margin, 0.01);
        assert_eq!(p.density_curve, 8.0);
        assert_eq!(p.saturation, 1.0);
    }

    #[test]
    fn test_neighbor_radius_changed_threshold() {
        let a = SimulationParams::default();
        let b = SimulationParams { neighbor_radius: a.neighbor_radius + 5.0e-5, ..a };
        let c = SimulationParams { neighbor_radius: a.neighbor_radius + 0.5, ..a };
        assert!(!a.neighbor_radius_changed(&b));
        assert!(a.neighbor_radius_changed(&c));
    }

    #[test]
    fn test_color_mode_ids_round_trip() {
        for mode in [ColorMode::Solid, ColorMode::Heading, ColorMode::Speed, ColorMode::Density] {
            assert_eq!(ColorMode::from_u32(mode.as_u32()), mode);
        }
        assert_eq!(ColorMode::from_u32(42), ColorMode::Solid);
    }
}
