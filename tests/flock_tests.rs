//! Kernel invariants and lifecycle behavior of the CPU flock.

use gridflock::kernel::{step_particle, FALLBACK_HEADING};
use gridflock::prelude::*;
use gridflock::{CellGrid, GridLayout, MAX_PARTICLES};

fn seeded(count: u32, params: SimulationParams, seed: u64) -> Flock {
    Flock::new(
        FlockConfig::new()
            .with_particle_count(count)
            .with_params(params)
            .with_seed(seed),
    )
}

fn lone_particle(params: SimulationParams, position: Vec3, velocity: Vec3) -> Flock {
    let mut flock = seeded(1, params, 0);
    flock
        .replace_particles(vec![Particle::new(position, velocity, Vec4::ONE)])
        .unwrap();
    flock
}

fn extreme_params() -> SimulationParams {
    SimulationParams {
        neighbor_radius: 2.0,
        separation_radius: 2.0,
        weight_separation: 50.0,
        weight_alignment: 50.0,
        weight_cohesion: 50.0,
        min_speed: 0.0,
        max_speed: 1000.0,
        max_accel: 10_000.0,
        sim_speed: 2.0,
        center_attraction: 0.0,
        boundary_margin: 0.01,
        boundary_strength: 10_000.0,
        ..Default::default()
    }
}

#[test]
fn test_wrap_reenters_opposite_face() {
    let params = SimulationParams {
        boundary: BoundaryMode::Wrap,
        center_attraction: 0.0,
        ..Default::default()
    };

    let mut flock = lone_particle(params, Vec3::new(9.95, 3.0, -2.0), Vec3::new(5.0, 0.0, 0.0));
    flock.tick(0.02);
    let p = flock.particles()[0].position();
    assert!((p.x - -9.95).abs() < 1e-4, "x = {}", p.x);
    assert!((p.y - 3.0).abs() < 1e-6);
    assert!((p.z - -2.0).abs() < 1e-6);

    let mut flock = lone_particle(params, Vec3::new(1.0, -9.95, 0.0), Vec3::new(0.0, -5.0, 0.0));
    flock.tick(0.02);
    let p = flock.particles()[0].position();
    assert!((p.y - 9.95).abs() < 1e-4, "y = {}", p.y);
    assert!((p.x - 1.0).abs() < 1e-6);
}

#[test]
fn test_wrap_is_per_axis_on_every_face() {
    let params = SimulationParams {
        boundary: BoundaryMode::Wrap,
        center_attraction: 0.0,
        ..Default::default()
    };
    let cases = [
        // (start, velocity, expected)
        (Vec3::new(-9.95, 4.0, 1.5), Vec3::new(-5.0, 0.0, 0.0), Vec3::new(9.95, 4.0, 1.5)),
        (Vec3::new(-3.0, 2.5, 9.95), Vec3::new(0.0, 0.0, 5.0), Vec3::new(-3.0, 2.5, -9.95)),
        (Vec3::new(6.0, -7.0, -9.95), Vec3::new(0.0, 0.0, -5.0), Vec3::new(6.0, -7.0, 9.95)),
    ];

    for (start, velocity, expected) in cases {
        let mut flock = lone_particle(params, start, velocity);
        flock.tick(0.02);
        let p = flock.particles()[0].position();
        assert!(
            (p - expected).abs().max_element() < 1e-4,
            "{start} wrapped to {p}, expected {expected}"
        );
    }
}

#[test]
fn test_soft_boundary_contains_under_extreme_params() {
    let mut flock = seeded(2_000, extreme_params(), 3);
    let bounds = flock.bounds();
    for _ in 0..30 {
        flock.tick(0.05);
        for p in flock.particles() {
            let pos = p.position();
            assert!(pos.is_finite());
            assert!(bounds.contains(pos), "escaped to {pos}");
        }
    }
}

#[test]
fn test_wrap_contains_under_extreme_params() {
    let params = SimulationParams { boundary: BoundaryMode::Wrap, ..extreme_params() };
    let mut flock = seeded(2_000, params, 4);
    let bounds = flock.bounds();
    for _ in 0..30 {
        flock.tick(0.05);
        assert!(flock.particles().iter().all(|p| bounds.contains(p.position())));
    }
}

#[test]
fn test_speed_stays_in_range() {
    let params = SimulationParams { min_speed: 2.0, max_speed: 4.0, ..Default::default() };
    let mut flock = seeded(3_000, params, 8);
    for _ in 0..10 {
        flock.tick(0.016);
        for p in flock.particles() {
            let speed = p.speed();
            assert!(speed >= 2.0 * (1.0 - 1e-5), "speed {speed}");
            assert!(speed <= 4.0 * (1.0 + 1e-5), "speed {speed}");
        }
    }
}

#[test]
fn test_vanishing_velocity_gets_fallback_heading() {
    let params = SimulationParams { min_speed: 2.0, center_attraction: 0.0, ..Default::default() };
    let mut flock = lone_particle(params, Vec3::ZERO, Vec3::ZERO);
    flock.tick(0.016);
    assert_eq!(flock.particles()[0].velocity(), FALLBACK_HEADING * 2.0);
}

#[test]
fn test_acceleration_never_exceeds_limit() {
    let params = SimulationParams { max_accel: 3.0, ..extreme_params() }.sanitized();
    let flock = seeded(4_000, params, 12);
    let particles = flock.particles();
    let layout = GridLayout::new(flock.bounds(), params.neighbor_radius, 1 << 20);
    let grid = CellGrid::new(layout.cell_count() as usize, particles.len());
    grid.clear();
    grid.build(particles, &layout);

    for i in 0..particles.len() as u32 {
        let report = step_particle(i, particles, &grid, &layout, &params, 0.05);
        assert!(
            report.acceleration.length() <= params.max_accel * (1.0 + 1e-5),
            "particle {i}: |a| = {}",
            report.acceleration.length()
        );
    }
}

#[test]
fn test_runs_are_bit_identical() {
    let params = SimulationParams::default();
    let mut a = seeded(2_000, params, 77);
    let mut b = seeded(2_000, params, 77);
    assert_eq!(a.particles(), b.particles());

    for _ in 0..5 {
        a.tick(0.016);
        b.tick(0.016);
        assert_eq!(a.truncated_scans(), 0);
        assert_eq!(a.particles(), b.particles());
    }
}

#[test]
fn test_sim_speed_scales_delta() {
    let fast = SimulationParams { sim_speed: 2.0, ..Default::default() };
    let mut a = seeded(500, fast, 21);
    let mut b = seeded(500, SimulationParams::default(), 21);
    a.tick(0.01);
    b.tick(0.02);
    assert_eq!(a.particles(), b.particles());
}

#[test]
fn test_oversized_delta_is_clamped() {
    let mut a = seeded(500, SimulationParams::default(), 22);
    let mut b = seeded(500, SimulationParams::default(), 22);
    a.tick(3.0);
    b.tick(0.05);
    assert_eq!(a.particles(), b.particles());
}

#[test]
fn test_resize_clamps_and_respawns_inside_bounds() {
    let mut flock = seeded(100, SimulationParams::default(), 1);
    let bounds = flock.bounds();

    flock.request_particle_count(150_000);
    assert!(!flock.is_ready());
    flock.tick(0.016);
    assert!(flock.is_ready());
    assert_eq!(flock.particle_count(), MAX_PARTICLES);
    assert_eq!(flock.particles().len(), MAX_PARTICLES as usize);
    assert!(flock.particles().iter().all(|p| bounds.contains(p.position())));

    flock.request_particle_count(0);
    assert!(flock.apply_pending());
    assert_eq!(flock.particles().len(), 1);
    assert!(bounds.contains(flock.particles()[0].position()));
}

#[test]
fn test_readiness_visible_to_observers() {
    let mut flock = seeded(50, SimulationParams::default(), 2);
    let observer = flock.ready_flag();
    assert!(observer.is_ready());

    flock.set_params(SimulationParams { neighbor_radius: 3.0, ..*flock.params() });
    assert!(!observer.is_ready());

    flock.tick(0.016);
    assert!(observer.is_ready());
    assert_eq!(flock.layout().cell_size(), 3.0);
}

#[test]
fn test_requesting_current_count_cancels_resize() {
    let mut flock = seeded(50, SimulationParams::default(), 2);
    flock.request_particle_count(80);
    flock.request_particle_count(50);
    assert!(flock.is_ready());
    assert!(!flock.apply_pending());
}
