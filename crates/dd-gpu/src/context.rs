//! Shared GPU context and device buffers.

use std::sync::Arc;

use crate::error::{GpuError, GpuResult};

/// Role of a device buffer in the kernel argument list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferRole {
    /// Read by the kernel, written by the host.
    ReadOnly,
    /// Read and written on device.
    ReadWrite,
    /// Written by the kernel, read back by the host.
    WriteOnly,
}

impl BufferRole {
    pub(crate) fn usages(&self) -> wgpu::BufferUsages {
        match self {
            BufferRole::ReadOnly => wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            BufferRole::ReadWrite => {
                wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC
            }
            BufferRole::WriteOnly => wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        }
    }

    /// Storage binding type for the bind-group layout; must agree with the
    /// access mode the generated WGSL declares.
    pub(crate) fn binding_type(&self) -> wgpu::BufferBindingType {
        match self {
            BufferRole::ReadOnly => wgpu::BufferBindingType::Storage { read_only: true },
            _ => wgpu::BufferBindingType::Storage { read_only: false },
        }
    }
}

/// A device buffer together with its role and size.
pub struct DeviceBuffer {
    pub(crate) buffer: wgpu::Buffer,
    pub(crate) role: BufferRole,
    pub(crate) size: u64,
}

impl DeviceBuffer {
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn role(&self) -> BufferRole {
        self.role
    }
}

/// Shared GPU context.
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    /// Create the context (async).
    pub async fn new() -> GpuResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|err| GpuError::Init(err.to_string()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Using device: {} ({:?})",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("dedispersion device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    experimental_features: wgpu::ExperimentalFeatures::disabled(),
                    memory_hints: wgpu::MemoryHints::Performance,
                    trace: wgpu::Trace::Off,
                },
            )
            .await
            .map_err(|err| GpuError::Init(err.to_string()))?;

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_info,
        })
    }

    /// Create the context (blocking).
    pub fn new_blocking() -> GpuResult<Self> {
        pollster::block_on(Self::new())
    }

    /// Device name used as the tuning-catalogue key.
    pub fn device_name(&self) -> &str {
        &self.adapter_info.name
    }

    /// Allocate a zero-initialised device buffer.
    pub fn create_buffer(&self, label: &str, size: u64, role: BufferRole) -> GpuResult<DeviceBuffer> {
        let error_scope = self
            .device
            .push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: role.usages(),
            mapped_at_creation: false,
        });
        if let Some(err) = pollster::block_on(error_scope.pop()) {
            return Err(GpuError::OutOfMemory(err.to_string()));
        }
        Ok(DeviceBuffer { buffer, role, size })
    }

    /// Non-blocking host-to-device transfer; the write lands with the next
    /// queue submission.
    pub fn write_buffer(&self, buffer: &DeviceBuffer, data: &[u8]) {
        self.queue.write_buffer(&buffer.buffer, 0, data);
    }

    pub fn write_buffer_u32(&self, buffer: &DeviceBuffer, data: &[u32]) {
        self.write_buffer(buffer, bytemuck::cast_slice(data));
    }

    pub fn write_buffer_f32(&self, buffer: &DeviceBuffer, data: &[f32]) {
        self.write_buffer(buffer, bytemuck::cast_slice(data));
    }

    /// Blocking device-to-host readback of a whole buffer as words.
    pub fn read_buffer_u32(&self, buffer: &DeviceBuffer) -> GpuResult<Vec<u32>> {
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback staging"),
            size: buffer.size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback encoder"),
            });
        encoder.copy_buffer_to_buffer(&buffer.buffer, 0, &staging, 0, buffer.size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = flume::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.poll_wait()?;
        receiver
            .recv()
            .map_err(|err| GpuError::Fatal(err.to_string()))?
            .map_err(|err| GpuError::Launch(err.to_string()))?;

        let data = slice.get_mapped_range();
        let words: Vec<u32> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging.unmap();
        Ok(words)
    }

    /// Block until the queue drains.
    pub(crate) fn poll_wait(&self) -> GpuResult<()> {
        let _ = self.device.poll(wgpu::PollType::wait_indefinitely());
        Ok(())
    }
}
