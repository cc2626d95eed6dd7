//! Compiled kernels: shader module, pipeline, binding and timed launches.

use std::time::{Duration, Instant};

use crate::context::{BufferRole, DeviceBuffer, GpuContext};
use crate::error::{GpuError, GpuResult};

/// An executable kernel handle.
pub struct Kernel {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    entry: String,
}

impl Kernel {
    /// Compile kernel source for a named entry point.
    ///
    /// `roles` describes the positional argument layout; it must match the
    /// storage access modes the source declares. Compilation runs inside a
    /// validation error scope so a broken kernel surfaces as
    /// `GpuError::Compile` carrying the compiler log instead of a device
    /// panic.
    pub fn compile(
        ctx: &GpuContext,
        source: &str,
        entry: &str,
        roles: &[BufferRole],
    ) -> GpuResult<Self> {
        let entries: Vec<wgpu::BindGroupLayoutEntry> = roles
            .iter()
            .enumerate()
            .map(|(binding, role)| wgpu::BindGroupLayoutEntry {
                binding: binding as u32,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: role.binding_type(),
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();

        let error_scope = ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = ctx
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(entry),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        let layout = ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(entry),
                entries: &entries,
            });
        let pipeline_layout = ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(entry),
                bind_group_layouts: &[&layout],
                immediate_size: 0,
            });
        let pipeline = ctx
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some(entry),
                compilation_options: Default::default(),
                cache: None,
            });

        if let Some(err) = pollster::block_on(error_scope.pop()) {
            return Err(GpuError::Compile(err.to_string()));
        }

        Ok(Self {
            pipeline,
            layout,
            entry: entry.to_string(),
        })
    }

    /// Bind device buffers in positional order.
    pub fn bind(&self, ctx: &GpuContext, buffers: &[&DeviceBuffer]) -> wgpu::BindGroup {
        let entries: Vec<wgpu::BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buffer.buffer.as_entire_binding(),
            })
            .collect();
        ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&self.entry),
            layout: &self.layout,
            entries: &entries,
        })
    }

    /// Enqueue one launch over a 3D global range with the given block shape
    /// and wait for completion; returns the wall-clock duration of the
    /// submission.
    ///
    /// `global` must be a multiple of `local` in every dimension.
    pub fn run(
        &self,
        ctx: &GpuContext,
        bind_group: &wgpu::BindGroup,
        global: [u32; 3],
        local: [u32; 3],
    ) -> GpuResult<Duration> {
        for d in 0..3 {
            if local[d] == 0 || global[d] % local[d] != 0 {
                return Err(GpuError::Launch(format!(
                    "global range {global:?} is not divisible by block {local:?}"
                )));
            }
        }
        let groups = [
            global[0] / local[0],
            global[1] / local[1],
            global[2] / local[2],
        ];

        let oom_scope = ctx.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let validation_scope = ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let start = Instant::now();

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(&self.entry),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(&self.entry),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
        }
        ctx.queue.submit(std::iter::once(encoder.finish()));
        ctx.poll_wait()?;

        let elapsed = start.elapsed();
        let validation = pollster::block_on(validation_scope.pop());
        let out_of_memory = pollster::block_on(oom_scope.pop());
        if let Some(err) = out_of_memory {
            return Err(GpuError::OutOfMemory(err.to_string()));
        }
        if let Some(err) = validation {
            return Err(GpuError::Launch(err.to_string()));
        }
        Ok(elapsed)
    }
}
