// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! WGSL launch path over wgpu.
//!
//! The device is created once per process and requires `SUBGROUP` support;
//! the probed minimum subgroup size bounds the accepted lane-group widths.
//! Dispatch shape must agree with the workgroup size baked into the emitted
//! source, so both come from the plan's lane count.

use std::sync::mpsc;

use once_cell::sync::OnceCell;
use wgpu::util::DeviceExt;

use crate::caps::LaneCaps;
use crate::error::{backend, config, unsupported, Result};
use crate::ir::Dialect;
use crate::kernel::KernelPlan;
use crate::layout::RecordLayout;
use crate::registry::cached_source;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Params {
    n_total: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
}

struct GpuCtx {
    device: wgpu::Device,
    queue: wgpu::Queue,
    subgroup_width: usize,
}

static CTX: OnceCell<GpuCtx> = OnceCell::new();

fn create_ctx() -> Result<GpuCtx> {
    let instance = wgpu::Instance::default();
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))
    .ok_or_else(|| backend("no wgpu adapter available"))?;
    if !adapter.features().contains(wgpu::Features::SUBGROUP) {
        return Err(backend("adapter does not support subgroup operations"));
    }
    let mut subgroup_width = adapter.limits().min_subgroup_size as usize;
    if subgroup_width == 0 {
        tracing::debug!("adapter does not report a subgroup size, assuming 32");
        subgroup_width = 32;
    }
    let (device, queue) = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("st.cornerturn.device"),
            required_features: wgpu::Features::SUBGROUP,
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
        },
        None,
    ))
    .map_err(|e| backend(&format!("device request failed: {e}")))?;
    tracing::debug!(subgroup_width, "wgpu context ready");
    Ok(GpuCtx {
        device,
        queue,
        subgroup_width,
    })
}

fn ctx() -> Result<&'static GpuCtx> {
    CTX.get_or_try_init(create_ctx)
}

/// Round-trip `input` through the plan's WGSL kernel.
///
/// Scalar `f32` element types on both sides; `input` is the flat element
/// array, `records * lanes` floats.
pub fn launch_f32(plan: &KernelPlan, input: &[f32]) -> Result<Vec<f32>> {
    let lanes = plan.lanes();
    if plan.input().wgsl_name()? != "f32" || plan.output().wgsl_name()? != "f32" {
        return Err(unsupported(
            "wgsl",
            "launch_f32 drives scalar f32 kernels only",
        ));
    }
    if input.len() % lanes != 0 {
        return Err(config(&format!(
            "input of {} elements is not a whole number of {lanes}-lane records",
            input.len()
        )));
    }
    let records = input.len() / lanes;
    if records == 0 {
        return Ok(Vec::new());
    }
    if records
        .checked_mul(lanes)
        .map_or(true, |flat| flat > u32::MAX as usize)
    {
        return Err(config("flat index space exceeds the 32-bit kernel bound"));
    }

    let gpu = ctx()?;
    LaneCaps::wgsl(gpu.subgroup_width).validate_group(lanes)?;
    let source = cached_source(plan, Dialect::Wgsl)?;
    let module = gpu
        .device
        .create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(plan.name()),
            source: wgpu::ShaderSource::Wgsl(source.as_ref().into()),
        });

    let bgl = gpu
        .device
        .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("st.cornerturn.bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });
    let pipeline_layout = gpu
        .device
        .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("st.cornerturn.pl"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });
    let pipeline = gpu
        .device
        .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(plan.name()),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some(plan.name()),
            compilation_options: Default::default(),
            cache: None,
        });

    let out_bytes = (records * lanes * std::mem::size_of::<f32>()) as u64;
    let in_buf = gpu
        .device
        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("st.cornerturn.in"),
            contents: bytemuck::cast_slice(input),
            usage: wgpu::BufferUsages::STORAGE,
        });
    let out_buf = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("st.cornerturn.out"),
        size: out_bytes,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    });
    let params = Params {
        n_total: records as u32,
        _pad0: 0,
        _pad1: 0,
        _pad2: 0,
    };
    let params_buf = gpu
        .device
        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("st.cornerturn.params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
    let staging = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("st.cornerturn.staging"),
        size: out_bytes,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let bind = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("st.cornerturn.bind"),
        layout: &bgl,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: in_buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: out_buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: params_buf.as_entire_binding(),
            },
        ],
    });

    let layout = RecordLayout::new(records, lanes);
    // Must match the workgroup_size baked into the emitted source.
    let workgroup = lanes.max(64) as u32;
    let groups = (layout.padded() as u32).div_ceil(workgroup);
    tracing::debug!(
        kernel = plan.name(),
        records,
        lanes,
        groups,
        workgroup,
        "dispatching corner-turn kernel"
    );

    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("st.cornerturn.encoder"),
        });
    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(plan.name()),
            timestamp_writes: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind, &[]);
        pass.dispatch_workgroups(groups, 1, 1);
    }
    encoder.copy_buffer_to_buffer(&out_buf, 0, &staging, 0, out_bytes);
    gpu.queue.submit(Some(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |res| {
        let _ = tx.send(res);
    });
    let _ = gpu.device.poll(wgpu::Maintain::Wait);
    rx.recv()
        .map_err(|_| backend("map callback dropped"))?
        .map_err(|e| backend(&format!("readback map failed: {e}")))?;
    let mapped = slice.get_mapped_range();
    let out: Vec<f32> = bytemuck::cast_slice(&mapped).to_vec();
    drop(mapped);
    staging.unmap();
    Ok(out)
}
