//! Flock simulated with wgpu compute.
//!
//! One tick records three compute passes into a single encoder: clear the
//! cell heads, file every particle with `atomicExchange`, step every particle
//! into the other particle buffer. Passes are ordered and wgpu inserts the
//! storage barriers between them, so no pass observes a partial predecessor.
//! Step bind groups exist for both buffer orientations; swapping buffers is
//! flipping an index.

use log::{info, warn};
use wgpu::util::DeviceExt;

use super::{await_buffer_map, GpuContext, WORKGROUP_SIZE};
use crate::buffers::{clamp_particle_count, ReadyFlag};
use crate::error::FlockError;
use crate::flock::{FlockConfig, PendingRealloc};
use crate::kernel::step_shader_source;
use crate::params::SimulationParams;
use crate::particle::Particle;
use crate::spatial::{build_shader_source, clear_shader_source, GridLayout, WorldBounds};
use crate::spawn::{spawn_population, SpawnContext};
use crate::time::clamp_delta;
use crate::uniforms::FlockUniforms;

struct FlockPipelines {
    clear: wgpu::ComputePipeline,
    build: wgpu::ComputePipeline,
    step: wgpu::ComputePipeline,
}

impl FlockPipelines {
    fn new(device: &wgpu::Device) -> Self {
        let clear = create_compute_pipeline(device, &clear_shader_source(), "Clear Cells");
        let build = create_compute_pipeline(device, &build_shader_source(), "Build Cell Lists");
        let step = create_compute_pipeline(device, &step_shader_source(), "Flock Step");
        Self { clear, build, step }
    }
}

/// Everything sized by the particle count or the grid.
struct FlockResources {
    particle_buffers: [wgpu::Buffer; 2],
    #[allow(dead_code)] // bound through the bind groups
    cell_heads: wgpu::Buffer,
    #[allow(dead_code)]
    next_index: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    clear_bind_group: wgpu::BindGroup,
    /// Indexed by the current buffer.
    build_bind_groups: [wgpu::BindGroup; 2],
    step_bind_groups: [wgpu::BindGroup; 2],
}

impl FlockResources {
    fn new(
        device: &wgpu::Device,
        pipelines: &FlockPipelines,
        layout: &GridLayout,
        population: &[Particle],
    ) -> Self {
        let particle_usage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::VERTEX
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST;

        let particle_buffers = [
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Particles A"),
                contents: bytemuck::cast_slice(population),
                usage: particle_usage,
            }),
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Particles B"),
                contents: bytemuck::cast_slice(population),
                usage: particle_usage,
            }),
        ];

        let cell_heads = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Cell Heads"),
            size: (layout.cell_count() as u64) * std::mem::size_of::<u32>() as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let next_index = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Next Index"),
            size: (population.len() as u64) * std::mem::size_of::<u32>() as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Flock Params"),
            size: std::mem::size_of::<FlockUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let clear_bind_group =
            create_clear_bind_group(device, &pipelines.clear, &cell_heads, &uniform_buffer);
        let build_bind_groups = [0usize, 1].map(|current| {
            create_build_bind_group(
                device,
                &pipelines.build,
                &particle_buffers[current],
                &cell_heads,
                &next_index,
                &uniform_buffer,
            )
        });
        let step_bind_groups = [0usize, 1].map(|current| {
            create_step_bind_group(
                device,
                &pipelines.step,
                &particle_buffers[current],
                &particle_buffers[current ^ 1],
                &cell_heads,
                &next_index,
                &uniform_buffer,
            )
        });

        Self {
            particle_buffers,
            cell_heads,
            next_index,
            uniform_buffer,
            clear_bind_group,
            build_bind_groups,
            step_bind_groups,
        }
    }
}

/// Boids flock simulated on a wgpu device.
///
/// Same contract as [`crate::Flock`]; the particle state lives in GPU
/// buffers and is only copied back on [`GpuFlock::read_particles`].
pub struct GpuFlock {
    ctx: GpuContext,
    config: FlockConfig,
    params: SimulationParams,
    layout: GridLayout,
    particle_count: u32,
    spawner: SpawnContext,
    ready: ReadyFlag,
    pending: PendingRealloc,
    pipelines: FlockPipelines,
    resources: FlockResources,
    current: usize,
    tick_count: u64,
}

impl GpuFlock {
    pub fn new(ctx: GpuContext, config: FlockConfig) -> Self {
        let params = config.params().sanitized();
        let particle_count = config.particle_count();
        let layout = config.layout_for(&params);
        let mut spawner = config.spawner();
        let population = spawn_population(particle_count, &params, &mut spawner);

        let pipelines = FlockPipelines::new(&ctx.device);
        let resources = FlockResources::new(&ctx.device, &pipelines, &layout, &population);

        info!(
            "gpu flock: {} particles, grid {}x{}x{} ({} cells, cell size {:.3})",
            particle_count,
            layout.dims().x,
            layout.dims().y,
            layout.dims().z,
            layout.cell_count(),
            layout.cell_size()
        );

        Self {
            ctx,
            config,
            params,
            layout,
            particle_count,
            spawner,
            ready: ReadyFlag::new(true),
            pending: PendingRealloc::default(),
            pipelines,
            resources,
            current: 0,
            tick_count: 0,
        }
    }

    pub fn particle_count(&self) -> u32 {
        self.particle_count
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn set_params(&mut self, params: SimulationParams) {
        let params = params.sanitized();
        if self.params.neighbor_radius_changed(&params) {
            self.pending.grid = true;
            self.ready.set(false);
        }
        self.params = params;
    }

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

        self.layout = self.config.layout_for(&self.params);
        let population = spawn_population(self.particle_count, &self.params, &mut self.spawner);
        self.resources =
            FlockResources::new(&self.ctx.device, &self.pipelines, &self.layout, &population);
        self.current = 0;
        self.ready.set(true);

        info!(
            "gpu flock reallocated: {} particles, grid {}x{}x{} ({} cells, cell size {:.3})",
            self.particle_count,
            self.layout.dims().x,
            self.layout.dims().y,
            self.layout.dims().z,
            self.layout.cell_count(),
            self.layout.cell_size()
        );
        true
    }

    pub fn is_ready(&self) -> bool {
        self.ready.is_ready()
    }

    pub fn ready_flag(&self) -> ReadyFlag {
        self.ready.clone()
    }

    /// Record clear, build and step into `encoder`, then swap buffers.
    ///
    /// For callers that batch the simulation with their own rendering work.
    /// Several ticks may be recorded into one encoder: each copies its own
    /// uniforms into place ahead of its passes.
    pub fn encode_tick(&mut self, encoder: &mut wgpu::CommandEncoder, dt: f32) {
        self.apply_pending();
        let dt = clamp_delta(dt) * self.params.sim_speed;

        let uniforms = FlockUniforms::new(&self.params, &self.layout, self.particle_count, dt);
        let staging = self
            .ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Flock Uniforms Staging"),
                contents: bytemuck::cast_slice(&[uniforms]),
                usage: wgpu::BufferUsages::COPY_SRC,
            });
        encoder.copy_buffer_to_buffer(
            &staging,
            0,
            &self.resources.uniform_buffer,
            0,
            std::mem::size_of::<FlockUniforms>() as u64,
        );

        let cell_workgroups = self.layout.cell_count().div_ceil(WORKGROUP_SIZE);
        let particle_workgroups = self.particle_count.div_ceil(WORKGROUP_SIZE);

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Clear Cells"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipelines.clear);
            pass.set_bind_group(0, &self.resources.clear_bind_group, &[]);
            pass.dispatch_workgroups(cell_workgroups, 1, 1);
        }

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Build Cell Lists"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipelines.build);
            pass.set_bind_group(0, &self.resources.build_bind_groups[self.current], &[]);
            pass.dispatch_workgroups(particle_workgroups, 1, 1);
        }

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Flock Step"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipelines.step);
            pass.set_bind_group(0, &self.resources.step_bind_groups[self.current], &[]);
            pass.dispatch_workgroups(particle_workgroups, 1, 1);
        }

        self.current ^= 1;
        self.tick_count += 1;
    }

    /// Advance the simulation by `dt` seconds and submit the work.
    pub fn tick(&mut self, dt: f32) {
        let mut encoder = self.ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Flock Tick"),
        });
        self.encode_tick(&mut encoder, dt);
        self.ctx.queue.submit(Some(encoder.finish()));
    }

    /// The buffer holding the latest state, for binding as a vertex buffer.
    pub fn current_buffer(&self) -> &wgpu::Buffer {
        &self.resources.particle_buffers[self.current]
    }

    /// Copy the current buffer back to the host. Blocks until the GPU is done.
    ///
    /// Fails with [`FlockError::NotReady`] while a reallocation is pending, and
    /// with [`FlockError::Gpu`] when the staging buffer cannot be mapped.
    pub fn read_particles(&self) -> Result<Vec<Particle>, FlockError> {
        if self.pending.is_pending() {
            return Err(FlockError::NotReady);
        }
        let size = self.particle_count as u64 * std::mem::size_of::<Particle>() as u64;
        let staging = self.ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self.ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Particle Readback"),
        });
        encoder.copy_buffer_to_buffer(self.current_buffer(), 0, &staging, 0, size);
        self.ctx.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.ctx.device.poll(wgpu::Maintain::Wait);
        await_buffer_map(rx)?;

        let particles = {
            let data = slice.get_mapped_range();
            bytemuck::cast_slice::<u8, Particle>(&data).to_vec()
        };
        staging.unmap();
        Ok(particles)
    }

    /// Overwrite the current buffer with `particles`.
    pub fn upload_particles(&mut self, particles: &[Particle]) -> Result<(), FlockError> {
        if self.pending.is_pending() {
            warn!("particle upload rejected: reallocation pending");
            return Err(FlockError::NotReady);
        }
        let expected = self.particle_count as usize;
        if particles.len() != expected {
            warn!(
                "particle upload rejected: expected {} particles, got {}",
                expected,
                particles.len()
            );
            return Err(FlockError::ParticleCountMismatch { expected, actual: particles.len() });
        }
        self.ctx
            .queue
            .write_buffer(self.current_buffer(), 0, bytemuck::cast_slice(particles));
        Ok(())
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    pub fn bounds(&self) -> WorldBounds {
        self.config.bounds()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }
}

fn create_compute_pipeline(
    device: &wgpu::Device,
    source: &str,
    label: &str,
) -> wgpu::ComputePipeline {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: None, // Auto layout
        module: &module,
        entry_point: Some("main"),
        compilation_options: Default::default(),
        cache: None,
    })
}

fn create_clear_bind_group(
    device: &wgpu::Device,
    pipeline: &wgpu::ComputePipeline,
    cell_heads: &wgpu::Buffer,
    params: &wgpu::Buffer,
) -> wgpu::BindGroup {
    let layout = pipeline.get_bind_group_layout(0);
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Clear Bind Group"),
        layout: &layout,
        entries: &[
            wgpu::BindGroupEntry { binding: 2, resource: cell_heads.as_entire_binding() },
            wgpu::BindGroupEntry { binding: 4, resource: params.as_entire_binding() },
        ],
    })
}

fn create_build_bind_group(
    device: &wgpu::Device,
    pipeline: &wgpu::ComputePipeline,
    particles: &wgpu::Buffer,
    cell_heads: &wgpu::Buffer,
    next_index: &wgpu::Buffer,
    params: &wgpu::Buffer,
) -> wgpu::BindGroup {
    let layout = pipeline.get_bind_group_layout(0);
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Build Bind Group"),
        layout: &layout,
        entries: &[
            wgpu::BindGroupEntry { binding: 0, resource: particles.as_entire_binding() },
            wgpu::BindGroupEntry { binding: 2, resource: cell_heads.as_entire_binding() },
            wgpu::BindGroupEntry { binding: 3, resource: next_index.as_entire_binding() },
            wgpu::BindGroupEntry { binding: 4, resource: params.as_entire_binding() },
        ],
    })
}

fn create_step_bind_group(
    device: &wgpu::Device,
    pipeline: &wgpu::ComputePipeline,
    particles_in: &wgpu::Buffer,
    particles_out: &wgpu::Buffer,
    cell_heads: &wgpu::Buffer,
    next_index: &wgpu::Buffer,
    params: &wgpu::Buffer,
) -> wgpu::BindGroup {
    let layout = pipeline.get_bind_group_layout(0);
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Step Bind Group"),
        layout: &layout,
        entries: &[
            wgpu::BindGroupEntry { binding: 0, resource: particles_in.as_entire_binding() },
            wgpu::BindGroupEntry { binding: 1, resource: particles_out.as_entire_binding() },
            wgpu::BindGroupEntry { binding: 2, resource: cell_heads.as_entire_binding() },
            wgpu::BindGroupEntry { binding: 3, resource: next_index.as_entire_binding() },
            wgpu::BindGroupEntry { binding: 4, resource: params.as_entire_binding() },
        ],
    })
}
