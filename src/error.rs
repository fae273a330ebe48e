//! Error types for gridflock.
//!
//! Ticking never fails: invalid inputs are clamped and non-finite state is
//! repaired in place. Errors only come from acquiring or reading back GPU
//! resources and from handing the flock a population of the wrong size.

use std::fmt;

/// Errors that can occur during GPU setup or readback.
#[derive(Debug)]
pub enum GpuError {
    /// No compatible GPU adapter found.
    NoAdapter,
    /// Failed to create GPU device.
    DeviceCreation(wgpu::RequestDeviceError),
    /// Failed to map buffer for reading.
    BufferMapping(String),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::NoAdapter => write!(
                f,
                "No compatible GPU adapter found. \
                 Ensure your system has a GPU with WebGPU/Vulkan/Metal/DX12 support."
            ),
            GpuError::DeviceCreation(e) => write!(f, "Failed to create GPU device: {}", e),
            GpuError::BufferMapping(msg) => write!(f, "Failed to map GPU buffer: {}", msg),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::DeviceCreation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wgpu::RequestDeviceError> for GpuError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        GpuError::DeviceCreation(e)
    }
}

/// Errors returned by flock operations.
#[derive(Debug)]
pub enum FlockError {
    /// A replacement population does not match the allocated particle count.
    ParticleCountMismatch { expected: usize, actual: usize },
    /// Storage is being reallocated; the buffers are not safe to touch.
    NotReady,
    /// GPU backend failure.
    Gpu(GpuError),
}

impl fmt::Display for FlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlockError::ParticleCountMismatch { expected, actual } => {
                write!(f, "Expected {} particles, got {}", expected, actual)
            }
            FlockError::NotReady => write!(f, "Particle buffers are being reallocated"),
            FlockError::Gpu(e) => write!(f, "GPU error: {}", e),
        }
    }
}

impl std::error::Error for FlockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FlockError::Gpu(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GpuError> for FlockError {
    fn from(e: GpuError) -> Self {
        FlockError::Gpu(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_display_messages() {
        let e = FlockError::ParticleCountMismatch { expected: 10, actual: 3 };
        assert_eq!(e.to_string(), "Expected 10 particles, got 3");
        assert!(GpuError::BufferMapping("lost".into()).to_string().contains("lost"));
    }

    #[test]
    fn test_gpu_error_is_source() {
        let e = FlockError::from(GpuError::NoAdapter);
        assert!(e.source().is_some());
        assert!(FlockError::NotReady.source().is_none());
    }
}
