//! Benchmarks for the CPU tick and its phases.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use gridflock::spawn::{spawn_population, SpawnContext};
use gridflock::{CellGrid, Flock, FlockConfig, GridLayout, SimulationParams, WorldBounds};

fn bench_grid_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid_build");
    let bounds = WorldBounds::default();
    let params = SimulationParams::default().sanitized();

    for count in [10_000u32, 60_000, 100_000] {
        let particles = spawn_population(count, &params, &mut SpawnContext::seeded(bounds, 1));
        let layout = GridLayout::new(bounds, params.neighbor_radius, 1 << 20);
        let grid = CellGrid::new(layout.cell_count() as usize, particles.len());

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                grid.clear();
                grid.build(black_box(&particles), &layout);
            })
        });
    }
    group.finish();
}

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");
    group.sample_size(20);

    for count in [10_000u32, 60_000] {
        let mut flock = Flock::new(FlockConfig::new().with_particle_count(count).with_seed(1));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| flock.tick(black_box(1.0 / 60.0)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_grid_build, bench_tick);
criterion_main!(benches);
