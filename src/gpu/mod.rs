//! GPU backend.
//!
//! [`GpuContext`] acquires a headless device; [`GpuFlock`] runs the clear,
//! build and step kernels on it.

mod flock_gpu;

use std::sync::Arc;

use log::debug;

use crate::error::GpuError;

pub use flock_gpu::GpuFlock;

pub(crate) const WORKGROUP_SIZE: u32 = 256;

/// Device and queue shared by GPU flocks (and by a renderer, if any).
#[derive(Clone)]
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub adapter_info: Option<wgpu::AdapterInfo>,
}

impl GpuContext {
    /// Request a high-performance adapter and a device without a surface.
    pub async fn new() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let info = adapter.get_info();
        debug!("gpu adapter: {} ({:?}, {:?})", info.name, info.device_type, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("gridflock device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults()
                        .using_resolution(adapter.limits()),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_info: Some(info),
        })
    }

    /// [`GpuContext::new`] driven to completion on the current thread.
    pub fn new_blocking() -> Result<Self, GpuError> {
        pollster::block_on(Self::new())
    }

    /// Wrap a device the caller already owns.
    pub fn from_device(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            adapter_info: None,
        }
    }
}

/// Wait for a `map_async` callback delivered over `rx`.
pub(crate) fn await_buffer_map(
    rx: std::sync::mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>,
) -> Result<(), GpuError> {
    match rx.recv() {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            log::error!("buffer map failed: {:?}", e);
            Err(GpuError::BufferMapping(e.to_string()))
        }
        Err(_) => {
            log::error!("buffer map channel disconnected, device possibly lost");
            Err(GpuError::BufferMapping("map callback dropped".into()))
        }
    }
}
